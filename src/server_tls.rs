//! HTTPS listener with per-SNI certificate resolution.
//!
//! Each accepted connection reads the ClientHello first (lazy acceptor),
//! resolves the offered hostname through the certificate cache (which
//! may suspend on a single-flight object-store fetch) and only then
//! completes the handshake with a per-connection rustls config. ALPN
//! selects HTTP/2 or HTTP/1.1.

use std::convert::Infallible;
use std::sync::Arc;

use hyper::server::conn::{http1, http2};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, watch};
use tokio_rustls::LazyConfigAcceptor;
use tracing::{debug, info, warn};

use crate::certs::server_config;
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::pipeline::Scheme;
use crate::server::drain;
use crate::types::Request;

/// Runs the TLS accept loop until `shutdown` fires, then drains.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use origan_gateway::{Gateway, serve_https};
/// use tokio::net::TcpListener;
/// use tokio::sync::watch;
///
/// # async fn example(gateway: Arc<Gateway>) -> anyhow::Result<()> {
/// let listener = TcpListener::bind(gateway.config().https_addr()).await?;
/// let (_shutdown_tx, shutdown_rx) = watch::channel(false);
/// serve_https(gateway, listener, shutdown_rx).await?;
/// # Ok(())
/// # }
/// ```
pub async fn serve_https(
    gateway: Arc<Gateway>,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let max_connections = gateway.config().max_connections;
    let semaphore = Arc::new(Semaphore::new(max_connections));
    info!(addr = %listener.local_addr()?, "https listener ready");

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
            if let Err(err) = serve_connection(gateway, stream, client_addr).await {
                debug!(%client_addr, error = %err, "https connection ended with error");
            }
        });
    }

    drain(&semaphore, max_connections).await;
    Ok(())
}

async fn serve_connection(
    gateway: Arc<Gateway>,
    stream: TcpStream,
    client_addr: std::net::SocketAddr,
) -> anyhow::Result<()> {
    let handshake_timeout = gateway.config().handshake_timeout;
    let tls_stream = tokio::time::timeout(handshake_timeout, async {
        let start = LazyConfigAcceptor::new(rustls::server::Acceptor::default(), stream).await?;

        let sni = start.client_hello().server_name().map(str::to_string);
        let certified = match sni {
            Some(sni) => {
                gateway.cert_store().resolve(&sni).await.map_err(|err| {
                    match &err {
                        GatewayError::NotFoundCert => {
                            debug!(sni, "no certificate for hostname, failing handshake")
                        }
                        other => warn!(sni, error = %other, "certificate resolution failed"),
                    }
                    anyhow::anyhow!("no usable certificate for {sni}")
                })?
            }
            // No SNI at all: only the configured fallback can answer.
            None => gateway
                .cert_store()
                .fallback()
                .ok_or_else(|| anyhow::anyhow!("client sent no SNI and no fallback is set"))?,
        };

        let config = server_config(certified);
        anyhow::Ok(start.into_stream(config).await?)
    })
    .await
    .map_err(|_| anyhow::anyhow!("TLS handshake timed out"))??;

    let is_h2 = tls_stream
        .get_ref()
        .1
        .alpn_protocol()
        .is_some_and(|proto| proto == b"h2");

    let client_ip = client_addr.ip();
    let service = service_fn(move |req: Request| {
        let gateway = Arc::clone(&gateway);
        async move { Ok::<_, Infallible>(gateway.handle(req, client_ip, Scheme::Https).await) }
    });
    let io = TokioIo::new(tls_stream);

    if is_h2 {
        http2::Builder::new(TokioExecutor::new())
            .serve_connection(io, service)
            .await?;
    } else {
        let mut http = http1::Builder::new();
        http.keep_alive(true);
        http.serve_connection(io, service).await?;
    }
    Ok(())
}
