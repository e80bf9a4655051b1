use std::fmt;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, Stream, StreamExt};

use crate::types::Result;

/// A request or response payload.
///
/// Bodies come in two flavors: fully buffered bytes (cheap to clone and to
/// replay across retry attempts) and single-use streams. [`Body::buffer`]
/// converts a streaming body into a buffered one, which is what the retry
/// and failover middlewares rely on to re-present identical bytes to every
/// attempt.
pub struct Body(Inner);

enum Inner {
    Empty,
    Full(Bytes),
    Streaming(BoxStream<'static, Result<Bytes>>),
}

impl Body {
    /// An empty body.
    #[must_use]
    pub const fn empty() -> Self {
        Self(Inner::Empty)
    }

    /// Wrap a stream of byte chunks into a body.
    ///
    /// The resulting body is single-use until [`Body::buffer`] is called.
    pub fn wrap_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self(Inner::Streaming(stream.boxed()))
    }

    /// The buffered bytes of this body, if it is not streaming.
    ///
    /// An empty body yields an empty slice.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.0 {
            Inner::Empty => Some(&[]),
            Inner::Full(bytes) => Some(bytes),
            Inner::Streaming(_) => None,
        }
    }

    /// Read the whole body into memory, replacing it with the buffered
    /// variant, and return the bytes.
    ///
    /// Calling this on an already-buffered body is cheap. Streaming bodies
    /// are drained chunk by chunk; the first chunk error is returned as-is
    /// and the body is left partially consumed.
    ///
    /// # Errors
    ///
    /// Returns the underlying stream error.
    pub async fn buffer(&mut self) -> Result<Bytes> {
        let bytes = match &mut self.0 {
            Inner::Empty => Bytes::new(),
            Inner::Full(bytes) => bytes.clone(),
            Inner::Streaming(stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                buf.freeze()
            }
        };
        self.0 = Inner::Full(bytes.clone());
        Ok(bytes)
    }

    /// Turn the body into a stream of byte chunks.
    pub(crate) fn into_stream(self) -> BoxStream<'static, Result<Bytes>> {
        match self.0 {
            Inner::Empty => stream::empty().boxed(),
            Inner::Full(bytes) => stream::once(async move { Ok(bytes) }).boxed(),
            Inner::Streaming(stream) => stream,
        }
    }

    /// Convert into the body type of the underlying HTTP client.
    ///
    /// `None` means "no body" so that bodyless requests stay bodyless on
    /// the wire.
    pub(crate) fn into_reqwest(self) -> Option<reqwest::Body> {
        match self.0 {
            Inner::Empty => None,
            Inner::Full(bytes) => Some(reqwest::Body::from(bytes)),
            Inner::Streaming(stream) => Some(reqwest::Body::wrap_stream(stream)),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        if bytes.is_empty() {
            Self(Inner::Empty)
        } else {
            Self(Inner::Full(bytes))
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from(Bytes::from(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::from(Bytes::from(text))
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Self::from(Bytes::from_static(text.as_bytes()))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Inner::Empty => f.write_str("Body::Empty"),
            Inner::Full(bytes) => f.debug_tuple("Body::Full").field(&bytes.len()).finish(),
            Inner::Streaming(_) => f.write_str("Body::Streaming"),
        }
    }
}
