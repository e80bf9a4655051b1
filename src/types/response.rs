use bytes::Bytes;
use futures::TryStreamExt;
use http::{HeaderMap, StatusCode};
use url::Url;

use crate::types::{Body, ErrorKind, Result};

/// The response type flowing through the middleware stack.
///
/// [`reqwest::Response`] cannot be cloned or have its body re-read, which
/// makes it a poor fit for middlewares that buffer, inspect and replay
/// bodies. This type carries the response head eagerly and the body as a
/// [`Body`], so middlewares can buffer it once and hand identical bytes to
/// both their predicates and the caller.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    url: Url,
    body: Body,
}

impl Response {
    /// Create a response with an empty body.
    #[must_use]
    pub fn new(status: StatusCode, url: Url) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            url,
            body: Body::empty(),
        }
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// The HTTP status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// The response headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the response headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The final URL of the response.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// The response body.
    #[must_use]
    pub const fn body(&self) -> &Body {
        &self.body
    }

    /// Mutable access to the response body.
    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    /// Consume the response, returning its body.
    #[must_use]
    pub fn into_body(self) -> Body {
        self.body
    }

    /// Map the body through `f`, leaving the head untouched.
    #[must_use]
    pub fn map_body(mut self, f: impl FnOnce(Body) -> Body) -> Self {
        self.body = f(self.body);
        self
    }

    /// Buffer the body in place and return the bytes.
    ///
    /// After this call the body can be read again, so an inspection (say,
    /// by a retry predicate) does not consume the bytes seen by the caller.
    ///
    /// # Errors
    ///
    /// Returns the underlying body stream error.
    pub async fn buffer(&mut self) -> Result<Bytes> {
        self.body.buffer().await
    }

    /// Read the full response body.
    ///
    /// # Errors
    ///
    /// Returns the underlying body stream error.
    pub async fn bytes(mut self) -> Result<Bytes> {
        self.body.buffer().await
    }

    /// Read the full response body as text, replacing invalid UTF-8.
    ///
    /// # Errors
    ///
    /// Returns the underlying body stream error.
    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl From<reqwest::Response> for Response {
    fn from(res: reqwest::Response) -> Self {
        let status = res.status();
        let headers = res.headers().clone();
        let url = res.url().clone();
        let body = Body::wrap_stream(res.bytes_stream().map_err(ErrorKind::NetworkRequest));
        Self {
            status,
            headers,
            url,
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("http://example.com/").unwrap()
    }

    #[tokio::test]
    async fn buffer_then_read_sees_same_bytes() {
        let mut res = Response::new(StatusCode::OK, url()).with_body(Body::from("body bytes"));

        let first = res.buffer().await.unwrap();
        let second = res.bytes().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn text_is_lossy() {
        let res = Response::new(StatusCode::OK, url())
            .with_body(Body::from(vec![0x68, 0x69, 0xff]));
        assert_eq!(res.text().await.unwrap(), "hi\u{fffd}");
    }

    #[test]
    fn map_body_keeps_head() {
        let res = Response::new(StatusCode::IM_A_TEAPOT, url())
            .map_body(|_| Body::from("replaced"));
        assert_eq!(res.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(res.body().as_bytes(), Some(&b"replaced"[..]));
    }
}
