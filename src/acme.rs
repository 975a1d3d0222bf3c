//! ACME HTTP-01 challenge service.
//!
//! Certificate issuance requires answering
//! `GET /.well-known/acme-challenge/<token>` over plain HTTP for domains
//! that may not have any deployment bound yet. The control plane writes
//! pending key authorizations to the object store; this handler serves
//! them before any host resolution happens.

use std::sync::Arc;

use http::{StatusCode, header};
use tracing::{debug, warn};

use crate::blob::{BlobError, ObjectStore, acme_challenge_key};
use crate::body::GatewayBody;
use crate::error::GatewayError;
use crate::types::Response;

/// Path prefix the plain HTTP listener intercepts.
pub const CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// Serves pending ACME challenges from the object store.
pub struct AcmeChallenges {
    store: Arc<dyn ObjectStore>,
}

impl AcmeChallenges {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Extracts the challenge token if this path is a challenge request.
    /// Tokens are base64url, so anything else is not ours.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use origan_gateway::acme::AcmeChallenges;
    ///
    /// assert_eq!(
    ///     AcmeChallenges::token_for("/.well-known/acme-challenge/abc123"),
    ///     Some("abc123")
    /// );
    /// assert_eq!(AcmeChallenges::token_for("/index.html"), None);
    /// ```
    pub fn token_for(path: &str) -> Option<&str> {
        let token = path.strip_prefix(CHALLENGE_PREFIX)?;
        (!token.is_empty()
            && token
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'))
        .then_some(token)
    }

    /// Responds with the key authorization bytes, or 404 for tokens the
    /// store no longer has (stale challenges are expected).
    pub async fn serve(&self, token: &str) -> Response {
        match self.store.get(&acme_challenge_key(token)).await {
            Ok(object) => match object.collect().await {
                Ok(key_auth) => {
                    debug!(token, "served acme challenge");
                    hyper::Response::builder()
                        .status(StatusCode::OK)
                        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
                        .header(header::CONTENT_LENGTH, key_auth.len())
                        .body(GatewayBody::from(key_auth))
                        .expect("static challenge response")
                }
                Err(BlobError::NotFound) => GatewayError::NotFoundPath.into_response(),
                Err(BlobError::Transient(reason)) => {
                    warn!(token, %reason, "acme challenge read failed");
                    GatewayError::Unavailable(reason).into_response()
                }
            },
            Err(BlobError::NotFound) => GatewayError::NotFoundPath.into_response(),
            Err(BlobError::Transient(reason)) => {
                warn!(token, %reason, "acme challenge read failed");
                GatewayError::Unavailable(reason).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryStore;
    use http_body_util::BodyExt;

    #[test]
    fn token_extraction() {
        assert_eq!(
            AcmeChallenges::token_for("/.well-known/acme-challenge/abc123"),
            Some("abc123")
        );
        assert_eq!(AcmeChallenges::token_for("/.well-known/acme-challenge/"), None);
        assert_eq!(
            AcmeChallenges::token_for("/.well-known/acme-challenge/../escape"),
            None
        );
        assert_eq!(AcmeChallenges::token_for("/index.html"), None);
    }

    #[tokio::test]
    async fn serves_pending_token() {
        let store = Arc::new(MemoryStore::new());
        store.put("acme-challenges/abc123", "abc123.key-auth-bytes".as_bytes().to_vec());
        let acme = AcmeChallenges::new(store);

        let response = acme.serve("abc123").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"abc123.key-auth-bytes");
    }

    #[tokio::test]
    async fn unknown_token_is_404() {
        let acme = AcmeChallenges::new(Arc::new(MemoryStore::new()));
        let response = acme.serve("nope").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
