//! Reverse proxy to the function runner.
//!
//! A matched dynamic resource forwards to
//! `<runnerBase>/<deploymentId>/<functionRef>` over a pooled connection.
//! Request and response bodies stream through without buffering; the
//! client disconnecting drops the upstream request, and a stalled
//! response body is cut by an idle timeout rather than a wall clock so
//! long downloads survive.

use std::net::IpAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, HeaderName, HeaderValue, Request, Uri, header};
use hyper::body::{Body, Frame, SizeHint};
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::TokioExecutor;
use pin_project_lite::pin_project;
use tracing::warn;

use crate::body::GatewayBody;
use crate::error::GatewayError;
use crate::manifest::{DeploymentDescriptor, ManifestResource};
use crate::types::{BoxError, Response};

/// TCP connect deadline for the runner.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Maximum silence between body bytes on a streaming response.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Hop-by-hop headers, never forwarded in either direction.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// A runner response carrying this header failed below the function; the
/// gateway replaces it with its own 502 page.
const RUNNER_ERROR_HEADER: &str = "x-origan-runner-error";

/// Streaming reverse proxy to the function runner.
pub struct RunnerProxy {
    client: Client<HttpConnector, GatewayBody>,
    base_url: String,
    headers_timeout: Duration,
}

impl RunnerProxy {
    pub fn new(base_url: &str, headers_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        connector.set_connect_timeout(Some(CONNECT_TIMEOUT));
        Self {
            client: Client::builder(TokioExecutor::new()).build(connector),
            base_url: base_url.trim_end_matches('/').to_string(),
            headers_timeout,
        }
    }

    /// Forwards a request to the deployment's function and streams the
    /// response back.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use std::net::{IpAddr, Ipv4Addr};
    /// use origan_gateway::manifest::{DeploymentDescriptor, ManifestResource};
    /// use origan_gateway::proxy::RunnerProxy;
    /// use origan_gateway::types::Request;
    ///
    /// # async fn example(
    /// #     proxy: &RunnerProxy,
    /// #     descriptor: &DeploymentDescriptor,
    /// #     resource: &ManifestResource,
    /// #     req: Request,
    /// # ) -> Result<(), Box<dyn std::error::Error>> {
    /// let client_ip = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
    /// let (parts, body) = req.into_parts();
    /// let response = proxy
    ///     .forward(descriptor, resource, parts, body, client_ip, "https")
    ///     .await?;
    /// println!("runner answered {}", response.status());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn forward<B>(
        &self,
        descriptor: &DeploymentDescriptor,
        resource: &ManifestResource,
        parts: Parts,
        body: B,
        client_ip: IpAddr,
        scheme: &'static str,
    ) -> Result<Response, GatewayError>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let uri = self.upstream_uri(descriptor, resource, &parts)?;
        let mut upstream = Request::builder()
            .method(parts.method.clone())
            .uri(uri)
            .body(GatewayBody::new(body))
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        *upstream.headers_mut() = forward_headers(&parts, descriptor, client_ip, scheme);

        let response = tokio::time::timeout(self.headers_timeout, self.client.request(upstream))
            .await
            .map_err(|_| GatewayError::UpstreamTimeout("runner headers timeout".into()))?
            .map_err(|e| {
                if e.is_connect() {
                    GatewayError::UpstreamError(format!("runner connect failed: {e}"))
                } else {
                    GatewayError::UpstreamError(e.to_string())
                }
            })?;

        if response.headers().contains_key(RUNNER_ERROR_HEADER)
            && response.status().is_server_error()
        {
            return Err(GatewayError::UpstreamError(format!(
                "runner framework error {}",
                response.status()
            )));
        }

        let (mut head, body) = response.into_parts();
        for name in HOP_BY_HOP {
            head.headers.remove(name);
        }
        let body = GatewayBody::new(IdleTimeoutBody::new(body, IDLE_TIMEOUT));
        Ok(hyper::Response::from_parts(head, body))
    }

    /// `<base>/<deploymentId>/<functionRef>`, preserving the original
    /// query string.
    fn upstream_uri(
        &self,
        descriptor: &DeploymentDescriptor,
        resource: &ManifestResource,
        parts: &Parts,
    ) -> Result<Uri, GatewayError> {
        let mut uri = format!(
            "{}/{}/{}",
            self.base_url, descriptor.deployment_id, resource.resource_path
        );
        if let Some(query) = parts.uri.query() {
            uri.push('?');
            uri.push_str(query);
        }
        uri.parse::<Uri>()
            .map_err(|e| GatewayError::Internal(format!("bad upstream uri: {e}")))
    }
}

/// Builds the header set forwarded to the runner: the client's headers
/// minus hop-by-hop, plus forwarding metadata, deployment identity, and
/// the deployment's environment variables.
fn forward_headers(
    parts: &Parts,
    descriptor: &DeploymentDescriptor,
    client_ip: IpAddr,
    scheme: &'static str,
) -> HeaderMap {
    let mut headers = parts.headers.clone();
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove(header::HOST);

    let forwarded_for = match parts
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        Some(existing) => format!("{existing}, {client_ip}"),
        None => client_ip.to_string(),
    };
    insert(&mut headers, "x-forwarded-for", &forwarded_for);
    if let Some(host) = parts.headers.get(header::HOST) {
        headers.insert(HeaderName::from_static("x-forwarded-host"), host.clone());
    } else if let Some(authority) = parts.uri.authority() {
        insert(&mut headers, "x-forwarded-host", authority.as_str());
    }
    insert(&mut headers, "x-forwarded-proto", scheme);
    insert(&mut headers, "x-origan-deployment", &descriptor.deployment_id);
    insert(&mut headers, "x-origan-project", &descriptor.project_id);

    for (name, value) in &descriptor.env_vars {
        let header_name = format!("x-origan-env-{}", name.to_ascii_lowercase());
        let Ok(header_name) = header_name.parse::<HeaderName>() else {
            warn!(var = %name, "env var name not header-safe, skipped");
            continue;
        };
        let Ok(header_value) = HeaderValue::from_str(value) else {
            warn!(var = %name, "env var value not header-safe, skipped");
            continue;
        };
        headers.insert(header_name, header_value);
    }

    headers
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

pin_project! {
    /// Body wrapper that errors out when the inner stream goes silent
    /// for longer than the idle window.
    pub struct IdleTimeoutBody<B> {
        #[pin]
        inner: B,
        #[pin]
        sleep: tokio::time::Sleep,
        idle: Duration,
    }
}

impl<B> IdleTimeoutBody<B> {
    pub fn new(inner: B, idle: Duration) -> Self {
        Self {
            inner,
            sleep: tokio::time::sleep(idle),
            idle,
        }
    }
}

impl<B> Body for IdleTimeoutBody<B>
where
    B: Body<Data = bytes::Bytes>,
    B::Error: Into<BoxError>,
{
    type Data = bytes::Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();
        match this.inner.poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                let deadline = tokio::time::Instant::now() + *this.idle;
                this.sleep.as_mut().reset(deadline);
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e.into()))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => match this.sleep.poll(cx) {
                Poll::Ready(()) => Poll::Ready(Some(Err(Box::new(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "upstream body idle timeout",
                ))))),
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }
}
