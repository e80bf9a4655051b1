//! The middleware contract.
//!
//! Every middleware in this crate implements [`Transport`] and wraps
//! another `Transport`, so a stack is assembled by plain composition:
//!
//! rate limit -> retry -> basic auth -> failover -> [`crate::ClientTransport`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::client::ClientTransport;
use crate::types::{Request, Response, Result};

/// A single HTTP round trip, composable by wrapping.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Perform one round trip for `req`.
    async fn round_trip(&self, req: Request) -> Result<Response>;

    /// Cancel an in-flight request, identified by its [`crate::RequestId`].
    ///
    /// This is an escape hatch for callers that only hold a request value;
    /// implementations forward it to their inner transport, translating
    /// the identity where they cloned the request on the way in. The
    /// default implementation does nothing.
    fn cancel_request(&self, req: &Request) {
        let _ = req;
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn round_trip(&self, req: Request) -> Result<Response> {
        (**self).round_trip(req).await
    }

    fn cancel_request(&self, req: &Request) {
        (**self).cancel_request(req);
    }
}

/// The process-default transport, a shared [`ClientTransport`] over a
/// default [`reqwest::Client`].
///
/// Middlewares constructed without an explicit inner transport delegate
/// here, so a bare middleware is usable out of the box.
pub fn default_transport() -> Arc<dyn Transport> {
    static DEFAULT: Lazy<Arc<ClientTransport>> = Lazy::new(|| Arc::new(ClientTransport::default()));
    Arc::clone(&DEFAULT) as Arc<dyn Transport>
}

/// An adapter to allow the use of ordinary functions as transports.
///
/// If `f` is an async function with the appropriate signature,
/// `TransportFn::new(f)` is a [`Transport`] that calls `f`.
pub struct TransportFn<F>(F);

impl<F> TransportFn<F> {
    /// Lift `f` into a [`Transport`].
    pub const fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> Transport for TransportFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response>> + Send,
{
    async fn round_trip(&self, req: Request) -> Result<Response> {
        (self.0)(req).await
    }
}

impl<F> fmt::Debug for TransportFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportFn").finish_non_exhaustive()
    }
}
