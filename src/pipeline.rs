//! Per-request pipeline.
//!
//! Every accepted request walks the same states: ACME check (plain
//! listener only) → host resolution → manifest routing → dispatch to the
//! static or dynamic handler, each failure mapped to its terminal status
//! by [`GatewayError`]. The whole handler runs under the per-request
//! deadline; streaming response bodies are bounded separately by the
//! proxy's idle timeout.

use std::net::IpAddr;
use std::time::Instant;

use bytes::Bytes;
use http::{Method, StatusCode, header};
use hyper::body::Body;
use tracing::info;

use crate::acme::AcmeChallenges;
use crate::body::GatewayBody;
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::manifest::{DeploymentDescriptor, ResourceKind};
use crate::redirect;
use crate::router;
use crate::types::{BoxError, Response};

/// Which listener a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl Gateway {
    /// Handles one request end to end and emits the access log event.
    ///
    /// Generic over the request body so tests can drive the pipeline
    /// with buffered bodies; the listeners pass hyper's `Incoming`.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use std::net::{IpAddr, Ipv4Addr};
    /// use std::sync::Arc;
    /// use origan_gateway::Gateway;
    /// use origan_gateway::pipeline::Scheme;
    /// use origan_gateway::types::Request;
    ///
    /// # async fn example(gateway: Arc<Gateway>, req: Request) {
    /// let client_ip = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
    /// let response = gateway.handle(req, client_ip, Scheme::Https).await;
    /// println!("served with {}", response.status());
    /// # }
    /// ```
    pub async fn handle<B>(
        &self,
        req: hyper::Request<B>,
        client_ip: IpAddr,
        scheme: Scheme,
    ) -> Response
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let started = Instant::now();
        let method = req.method().clone();
        let host = host_of(&req).unwrap_or_default();
        let path = req.uri().path().to_string();

        let response = self.dispatch(req, client_ip, scheme).await;

        info!(
            %method,
            host,
            path,
            scheme = scheme.as_str(),
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request"
        );
        response
    }

    async fn dispatch<B>(&self, req: hyper::Request<B>, client_ip: IpAddr, scheme: Scheme) -> Response
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        if req.uri().path() == "/health" {
            return health();
        }

        // Challenges are served before any host resolution: the domain
        // being validated has no deployment yet.
        if scheme == Scheme::Http && matches!(*req.method(), Method::GET | Method::HEAD) {
            if let Some(token) = AcmeChallenges::token_for(req.uri().path()) {
                return self.acme.serve(token).await;
            }
        }

        let Some(host) = host_of(&req) else {
            return GatewayError::BadRequest("missing or invalid Host header".into())
                .into_response();
        };

        if scheme == Scheme::Http && self.config().redirect_to_https {
            let path_and_query = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/");
            return redirect::permanent(format!("https://{host}{path_and_query}"));
        }

        let descriptor = match self.config_cache().resolve(&host).await {
            Ok(descriptor) => descriptor,
            Err(error) => return error.into_response(),
        };

        let (parts, body) = req.into_parts();
        let resource = match router::route(&descriptor, parts.uri.path()) {
            Ok(Some(resource)) => resource,
            Ok(None) => return self.not_found(&descriptor, &parts).await,
            Err(error) => return error.into_response(),
        };

        let outcome = match resource.kind {
            ResourceKind::Static => {
                tokio::time::timeout(
                    self.config().request_timeout_static,
                    self.static_files.serve(&descriptor, resource, &parts),
                )
                .await
            }
            ResourceKind::Dynamic => {
                tokio::time::timeout(
                    self.config().request_timeout_dynamic,
                    self.proxy.forward(
                        &descriptor,
                        resource,
                        parts,
                        body,
                        client_ip,
                        scheme.as_str(),
                    ),
                )
                .await
            }
        };

        match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => error.into_response(),
            Err(_) => GatewayError::UpstreamTimeout("request deadline exceeded".into())
                .into_response(),
        }
    }

    /// 404 for a path no resource matched, preferring the deployment's
    /// own page when the manifest advertises one.
    async fn not_found(
        &self,
        descriptor: &DeploymentDescriptor,
        parts: &http::request::Parts,
    ) -> Response {
        if let Some(page) = descriptor.custom_not_found() {
            match self
                .static_files
                .serve_with_status(descriptor, page, parts, StatusCode::NOT_FOUND)
                .await
            {
                Ok(response) => return response,
                Err(_) => {}
            }
        }
        GatewayError::NotFoundPath.into_response()
    }
}

/// Health probe: never consults a collaborator.
fn health() -> Response {
    hyper::Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(GatewayBody::from(r#"{"status":"ok"}"#))
        .expect("static health response")
}

/// The request's hostname: the `Host` header for HTTP/1.1, the URI
/// authority for HTTP/2.
fn host_of<B>(req: &hyper::Request<B>) -> Option<String> {
    let raw = match req.headers().get(header::HOST) {
        Some(value) => value.to_str().ok()?,
        None => req.uri().authority()?.as_str(),
    };
    crate::host::normalize_hostname(raw)
}
