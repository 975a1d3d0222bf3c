//! Edge gateway for the Origan deployment platform.
//!
//! The gateway is the only component on the request hot path: it
//! terminates TLS for an unbounded set of customer domains, maps each
//! request's host and path to an immutable deployment artifact, and
//! serves the response either from object storage (buffered through a
//! bounded in-memory cache) or by streaming through a reverse proxy to
//! the function runner.
//!
//! # Architecture
//! - [gateway::Gateway] owns every cache and client; listeners share it
//!   behind an `Arc`, tests build one with in-memory fakes.
//! - [server] and [server_tls] accept connections; the TLS listener
//!   resolves certificates per SNI through [certs::CertStore] before
//!   completing the handshake.
//! - The request pipeline ([pipeline]) resolves the hostname through
//!   [config_cache::ConfigCache], routes the path against the
//!   deployment manifest ([router]), and dispatches to the static
//!   handler ([static_files]) or the runner proxy ([proxy]).
//! - [singleflight::SingleFlight] backs all three caches so concurrent
//!   cold lookups collapse into one fetch.
//!
//! # Compatibility
//! - Runtime: `tokio`
//! - HTTP: `hyper` 1.x, TLS via `rustls`

/// ACME HTTP-01 challenge service.
pub mod acme;

/// Bounded-memory LRU cache of buffered static artifacts.
pub mod artifact_cache;

/// Object store access (S3-compatible).
pub mod blob;

/// Unified response body type.
pub mod body;

/// Certificate cache and SNI resolution.
pub mod certs;

/// Gateway configuration loading.
pub mod config;

/// Hostname → deployment descriptor cache.
pub mod config_cache;

/// Control plane client.
pub mod control;

/// Error taxonomy and user-visible failure pages.
pub mod error;

/// Gateway assembly: caches and clients behind one struct.
pub mod gateway;

/// Hostname extraction and normalization.
pub mod host;

/// Deployment descriptors and manifest parsing.
pub mod manifest;

/// Per-request pipeline and dispatch.
pub mod pipeline;

/// Reverse proxy to the function runner.
pub mod proxy;

/// Redirect response helpers.
pub mod redirect;

/// Manifest routing.
pub mod router;

/// Plain HTTP listener.
pub mod server;

/// HTTPS listener with per-SNI certificate loading.
pub mod server_tls;

/// Generic per-key call coalescing.
pub mod singleflight;

/// Static asset responses.
pub mod static_files;

/// Background cache sweeper.
pub mod sweeper;

/// Core type aliases.
pub mod types;

pub use error::GatewayError;
pub use gateway::Gateway;
pub use server::serve_http;
pub use server_tls::serve_https;
