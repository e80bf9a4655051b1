use thiserror::Error;

/// Kinds of errors surfaced by the middleware stack.
///
/// Note: The error messages can change over time, so don't match on the output.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The request was canceled, or the limiter it was waiting on was closed.
    ///
    /// This is the single canonical cancellation value: every awaiting site
    /// (enqueue, reply wait, backoff sleep, in-flight round trip) maps its
    /// cancellation signal to this variant.
    #[error("request canceled")]
    RequestCanceled,

    /// Network error while handling the request.
    #[error("Network error")]
    NetworkRequest(#[source] reqwest::Error),

    /// The request URI cannot be handed to the underlying HTTP client.
    #[error("Cannot parse request URI `{0}`: {1}")]
    InvalidRequestUri(String, #[source] url::ParseError),

    /// The request itself could not be built.
    #[error("Cannot build request")]
    Http(#[from] http::Error),

    /// The configured priority header is not a valid HTTP header name.
    #[error("Invalid priority header name `{0}`")]
    InvalidPriorityHeader(String),

    /// A limiter configuration selected no dispatch strategy, or both at once.
    #[error("Invalid limiter configuration: {0}")]
    InvalidLimiterConfig(String),
}

/// The crate-wide result type.
pub type Result<T> = std::result::Result<T, ErrorKind>;
