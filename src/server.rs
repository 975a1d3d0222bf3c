//! Plain HTTP listener.
//!
//! Serves ACME challenges, the health probe, and (by default) a 308
//! upgrade redirect to HTTPS; with the redirect disabled the full
//! pipeline runs over plain HTTP. One task per connection; the accept
//! loop is bounded by a connection semaphore that doubles as the drain
//! tracker on shutdown.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use hyper::{server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, watch};
use tracing::{debug, info, warn};

use crate::gateway::Gateway;
use crate::pipeline::Scheme;
use crate::types::Request;

/// Wait for in-flight connections this long after shutdown begins.
pub(crate) const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs the plain HTTP accept loop until `shutdown` fires, then drains.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use origan_gateway::{Gateway, serve_http};
/// use tokio::net::TcpListener;
/// use tokio::sync::watch;
///
/// # async fn example(gateway: Arc<Gateway>) -> anyhow::Result<()> {
/// let listener = TcpListener::bind(gateway.config().http_addr()).await?;
/// let (_shutdown_tx, shutdown_rx) = watch::channel(false);
/// serve_http(gateway, listener, shutdown_rx).await?;
/// # Ok(())
/// # }
/// ```
pub async fn serve_http(
    gateway: Arc<Gateway>,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let max_connections = gateway.config().max_connections;
    let semaphore = Arc::new(Semaphore::new(max_connections));
    info!(addr = %listener.local_addr()?, "http listener ready");

    loop {
        let permit = tokio::select! {
            _ = shutdown.changed() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => {
                permit.expect("connection semaphore is never closed")
            }
        };
        let (stream, client_addr) = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    continue;
                }
            }
        };

        let gateway = Arc::clone(&gateway);
        tokio::spawn(async move {
            let _permit = permit;
            let client_ip = client_addr.ip();
            let io = TokioIo::new(stream);
            let service = service_fn(move |req: Request| {
                let gateway = Arc::clone(&gateway);
                async move { Ok::<_, Infallible>(gateway.handle(req, client_ip, Scheme::Http).await) }
            });

            let mut http = http1::Builder::new();
            http.keep_alive(true);
            if let Err(err) = http.serve_connection(io, service).await {
                debug!(%client_addr, error = %err, "http connection ended with error");
            }
        });
    }

    drain(&semaphore, max_connections).await;
    Ok(())
}

/// Re-acquiring every permit means every connection task has finished.
pub(crate) async fn drain(semaphore: &Semaphore, max_connections: usize) {
    let all = u32::try_from(max_connections).unwrap_or(u32::MAX);
    if tokio::time::timeout(DRAIN_TIMEOUT, semaphore.acquire_many(all))
        .await
        .is_err()
    {
        warn!("shutdown drain timed out with connections still open");
    }
}
