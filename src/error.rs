//! Gateway error taxonomy and user-visible failure pages.
//!
//! Every failure on the request path is classified into one of these
//! variants; the pipeline converts the variant into a response with a
//! generic HTML page. Variants carry an internal detail string that is
//! logged but never sent to clients, since responses must not reveal upstream
//! URLs, deployment ids, or stack traces.
//!
//! The type is `Clone` because single-flight waiters inherit the leader's
//! outcome, and cached negative entries replay the same error to later
//! requests.

use http::{StatusCode, header};
use thiserror::Error;

use crate::{body::GatewayBody, types::Response};

/// Classified request-path failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Missing or invalid `Host` header, or a path traversal attempt.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The control plane has no deployment bound to this hostname.
    #[error("no deployment for domain")]
    NotFoundDomain,

    /// The deployment's manifest has no resource matching the path.
    #[error("no matching resource")]
    NotFoundPath,

    /// No certificate on record for the SNI hostname and no fallback.
    #[error("no certificate for hostname")]
    NotFoundCert,

    /// A collaborator failed transiently and no stale entry could cover.
    #[error("temporarily unavailable: {0}")]
    Unavailable(String),

    /// The runner did not produce response headers in time, or the
    /// request exceeded its total deadline.
    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),

    /// The runner refused the connection or failed below the function.
    #[error("upstream error: {0}")]
    UpstreamError(String),

    /// The manifest names a static blob that the object store no longer
    /// has. Distinct from 404: the URL matched, the artifact is gone.
    #[error("manifest references missing blob: {0}")]
    InternalManifestBroken(String),

    /// Uncaught internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status for the user-visible response.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFoundDomain | GatewayError::NotFoundPath => StatusCode::NOT_FOUND,
            GatewayError::NotFoundCert => StatusCode::NOT_FOUND,
            GatewayError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamError(_) => StatusCode::BAD_GATEWAY,
            GatewayError::InternalManifestBroken(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Builds the generic error response for this failure.
    ///
    /// The body is a small static HTML page keyed off the status code
    /// only; the variant's detail never leaves the process.
    pub fn into_response(self) -> Response {
        let status = self.status();
        let mut builder = hyper::Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "text/html; charset=utf-8");
        if matches!(self, GatewayError::Unavailable(_)) {
            builder = builder.header(header::RETRY_AFTER, "5");
        }
        builder
            .body(GatewayBody::from(error_page(status)))
            .expect("static error response")
    }
}

/// Renders the generic HTML body for an error status.
pub fn error_page(status: StatusCode) -> String {
    let reason = status.canonical_reason().unwrap_or("Error");
    format!(
        "<!doctype html>\n<html>\n<head><title>{code} {reason}</title></head>\n\
         <body>\n<h1>{code} {reason}</h1>\n<p>{hint}</p>\n</body>\n</html>\n",
        code = status.as_u16(),
        reason = reason,
        hint = match status {
            StatusCode::NOT_FOUND => "The page you are looking for could not be found.",
            StatusCode::SERVICE_UNAVAILABLE => "The service is briefly unavailable. Please retry.",
            StatusCode::GATEWAY_TIMEOUT => "The upstream service took too long to respond.",
            StatusCode::BAD_GATEWAY => "The upstream service returned an invalid response.",
            StatusCode::BAD_REQUEST => "The request could not be understood.",
            _ => "Something went wrong while serving this request.",
        },
    )
}
