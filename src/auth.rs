//! Basic authentication middleware.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use headers::{Authorization, HeaderMapExt};

use crate::hooks::{notify_on_eof, TrackedRequests};
use crate::transport::{default_transport, Transport};
use crate::types::{
    clone_request, ensure_request_id, request_id, Body, Request, RequestId, Response, Result,
};

/// A [`Transport`] that authorizes every request with HTTP basic auth.
///
/// Each request is shallow-cloned with a deep-copied header map, the clone
/// gets the `Authorization` header and a fresh [`RequestId`], and the
/// original-to-clone mapping is kept until the response body has been
/// consumed (or dropped), so [`Transport::cancel_request`] by the original
/// request can be routed to the clone the inner transport actually saw.
pub struct BasicAuth {
    username: String,
    password: String,
    transport: Option<Arc<dyn Transport>>,
    inflight: Arc<TrackedRequests>,
}

impl BasicAuth {
    /// A basic-auth middleware over [`crate::default_transport`].
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            transport: None,
            inflight: Arc::default(),
        }
    }

    /// Set the inner transport.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    fn base(&self) -> Arc<dyn Transport> {
        self.transport.clone().unwrap_or_else(default_transport)
    }

    /// The clone sent towards the inner transport: same request line and
    /// headers plus credentials, fresh identity, shared cancel signal.
    fn authorized_clone(&self, req: &Request, body: Body) -> Request {
        let mut clone = clone_request(req, body);
        clone.extensions_mut().insert(RequestId::next());
        clone
            .headers_mut()
            .typed_insert(Authorization::basic(&self.username, &self.password));
        clone
    }
}

#[async_trait]
impl Transport for BasicAuth {
    async fn round_trip(&self, mut req: Request) -> Result<Response> {
        let original = ensure_request_id(&mut req);
        let body = std::mem::take(req.body_mut());
        let authorized = self.authorized_clone(&req, body);

        self.inflight
            .insert(original, clone_request(&authorized, Body::empty()));

        match self.base().round_trip(authorized).await {
            Err(err) => {
                self.inflight.remove(original);
                Err(err)
            }
            Ok(res) => {
                let inflight = Arc::clone(&self.inflight);
                Ok(res.map_body(move |body| {
                    notify_on_eof(body, move || {
                        inflight.remove(original);
                    })
                }))
            }
        }
    }

    fn cancel_request(&self, req: &Request) {
        let Some(original) = request_id(req) else {
            return;
        };
        if let Some(clone) = self.inflight.remove(original) {
            self.base().cancel_request(&clone);
        }
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"********")
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}
