//! The innermost transport: an adapter from the middleware contract onto
//! [`reqwest`].

use async_trait::async_trait;
use url::Url;

use crate::transport::Transport;
use crate::types::{cancel_signal, ErrorKind, Request, Response, Result};

/// A [`Transport`] backed by a [`reqwest::Client`].
///
/// Sits at the bottom of every middleware stack (directly, or through
/// [`crate::default_transport`]) and performs the actual network round
/// trip. The request's cancellation signal is honored while the round trip
/// is in flight.
#[derive(Debug, Clone, Default)]
pub struct ClientTransport {
    client: reqwest::Client,
}

impl ClientTransport {
    /// Wrap an existing client, preserving its connection pool and
    /// configuration.
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ClientTransport {
    async fn round_trip(&self, req: Request) -> Result<Response> {
        let cancel = cancel_signal(&req);
        let req = into_reqwest(req)?;

        tokio::select! {
            res = self.client.execute(req) => {
                let res = res.map_err(ErrorKind::NetworkRequest)?;
                Ok(Response::from(res))
            }
            () = cancel.fired() => Err(ErrorKind::RequestCanceled),
        }
    }

    fn cancel_request(&self, req: &Request) {
        // The signal is shared with any in-flight `round_trip` for this
        // request, which aborts the racing `execute` above.
        cancel_signal(req).fire();
    }
}

fn into_reqwest(req: Request) -> Result<reqwest::Request> {
    let (parts, body) = req.into_parts();
    let url = Url::parse(&parts.uri.to_string())
        .map_err(|e| ErrorKind::InvalidRequestUri(parts.uri.to_string(), e))?;

    let mut out = reqwest::Request::new(parts.method, url);
    *out.headers_mut() = parts.headers;
    *out.version_mut() = parts.version;
    *out.body_mut() = body.into_reqwest();
    Ok(out)
}
