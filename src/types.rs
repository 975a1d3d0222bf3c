//! Core type aliases used throughout the gateway.
//!
//! Inbound requests carry hyper's streaming `Incoming` body; every response
//! uses [`GatewayBody`](crate::body::GatewayBody) so handlers can return
//! buffered pages, cached artifacts, and proxied streams through one type.

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use hyper::body::Incoming;

use crate::body::GatewayBody;

/// HTTP request type as received from a client connection.
pub type Request = hyper::Request<Incoming>;

/// HTTP response type produced by every gateway handler.
pub type Response = hyper::Response<GatewayBody>;

/// Boxed body type backing [`GatewayBody`].
pub(crate) type BoxBody = UnsyncBoxBody<Bytes, BoxError>;

/// Boxed error type for body streams and connection tasks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
