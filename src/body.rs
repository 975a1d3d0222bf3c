//! Unified HTTP response body for the gateway.
//!
//! `GatewayBody` wraps hyper's body machinery so the same response type can
//! carry a fully buffered error page, a cached artifact served from memory,
//! or a stream proxied from the object store or the function runner without
//! buffering. Streaming sources are boxed; buffered sources go through
//! [`http_body_util::Full`] and keep their exact length for `Content-Length`.
//!
//! # Examples
//!
//! ```rust
//! use origan_gateway::body::GatewayBody;
//! use bytes::Bytes;
//! use futures_util::stream;
//!
//! // Buffered body with a known length
//! let page = GatewayBody::from("<html>hi</html>");
//!
//! // Streaming body from a fallible chunk source
//! let chunks = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from("chunk"))]);
//! let streamed = GatewayBody::from_stream(chunks);
//! ```

use std::{
    fmt::Debug,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use http_body_util::{BodyExt, Empty, StreamBody};
use hyper::body::{Body, Frame, SizeHint};

use crate::types::{BoxBody, BoxError};

/// HTTP body wrapper with buffered and streaming constructors.
pub struct GatewayBody(BoxBody);

impl GatewayBody {
    /// Wraps any body implementation, erasing its concrete type.
    pub fn new<B>(body: B) -> Self
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Self(body.map_err(|e| e.into()).boxed_unsync())
    }

    /// Creates a streaming body from a stream of byte chunks.
    ///
    /// Each item is a `Result<Bytes, E>`; errors abort the stream and are
    /// surfaced to hyper, which resets the connection mid-body. Used for
    /// blob downloads too large to cache and for proxied runner responses.
    pub fn from_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError> + Debug + 'static,
    {
        let stream = stream.map_err(Into::into).map_ok(Frame::data);
        Self(StreamBody::new(stream).boxed_unsync())
    }

    /// Creates an empty body for header-only responses (204, 304, HEAD).
    pub fn empty() -> Self {
        Self::new(Empty::new())
    }
}

impl Default for GatewayBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<&'static str> for GatewayBody {
    fn from(buf: &'static str) -> Self {
        Self::new(http_body_util::Full::from(buf))
    }
}

macro_rules! body_from_impl {
    ($ty:ty) => {
        impl From<$ty> for GatewayBody {
            fn from(buf: $ty) -> Self {
                Self::new(http_body_util::Full::from(buf))
            }
        }
    };
}

body_from_impl!(String);
body_from_impl!(Vec<u8>);
body_from_impl!(Bytes);

impl Body for GatewayBody {
    type Data = Bytes;
    type Error = BoxError;

    #[inline]
    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.0).poll_frame(cx)
    }

    #[inline]
    fn size_hint(&self) -> SizeHint {
        self.0.size_hint()
    }

    #[inline]
    fn is_end_stream(&self) -> bool {
        self.0.is_end_stream()
    }
}
