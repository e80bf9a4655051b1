//! Failover middleware: retry a failed first attempt against a spare
//! transport.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use crate::transport::{default_transport, Transport};
use crate::types::{cancel_signal, clone_request, Body, Request, Response, Result};

/// Decides whether the base outcome warrants the spare transport.
pub type UseSpareFn = Arc<dyn Fn(&Result<Response>) -> bool + Send + Sync>;

/// A [`Transport`] that falls back to a spare transport when the base one
/// fails.
///
/// The request body is buffered once so the spare sees the same bytes the
/// base did. The default predicate fails over on transport errors only.
pub struct Recover {
    base: Option<Arc<dyn Transport>>,
    spare: Option<Arc<dyn Transport>>,
    use_spare_fn: Option<UseSpareFn>,
}

impl Recover {
    /// A failover middleware; base and spare both default to
    /// [`crate::default_transport`] until set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: None,
            spare: None,
            use_spare_fn: None,
        }
    }

    /// Set the primary transport.
    #[must_use]
    pub fn with_base(mut self, base: Arc<dyn Transport>) -> Self {
        self.base = Some(base);
        self
    }

    /// Set the fallback transport.
    #[must_use]
    pub fn with_spare(mut self, spare: Arc<dyn Transport>) -> Self {
        self.spare = Some(spare);
        self
    }

    /// Set the failover predicate.
    #[must_use]
    pub fn with_use_spare_fn(
        mut self,
        f: impl Fn(&Result<Response>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.use_spare_fn = Some(Arc::new(f));
        self
    }

    fn base_transport(&self) -> Arc<dyn Transport> {
        self.base.clone().unwrap_or_else(default_transport)
    }

    fn spare_transport(&self) -> Arc<dyn Transport> {
        self.spare.clone().unwrap_or_else(default_transport)
    }

    fn use_spare(&self, outcome: &Result<Response>) -> bool {
        match &self.use_spare_fn {
            Some(f) => f(outcome),
            None => outcome.is_err(),
        }
    }
}

impl Default for Recover {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for Recover {
    async fn round_trip(&self, mut req: Request) -> Result<Response> {
        let body = req.body_mut().buffer().await?;

        let first = clone_request(&req, Body::from(body.clone()));
        let outcome = self.base_transport().round_trip(first).await;
        if self.use_spare(&outcome) {
            debug!("base transport failed for {}, using spare", req.uri());
            let second = clone_request(&req, Body::from(body));
            return self.spare_transport().round_trip(second).await;
        }
        outcome
    }

    fn cancel_request(&self, req: &Request) {
        cancel_signal(req).fire();
        self.base_transport().cancel_request(req);
        self.spare_transport().cancel_request(req);
    }
}

impl fmt::Debug for Recover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recover")
            .field("base", &self.base)
            .field("spare", &self.spare)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use http::StatusCode;
    use url::Url;

    use super::*;
    use crate::transport::TransportFn;
    use crate::types::ErrorKind;

    fn url() -> Url {
        Url::parse("http://test.local/").unwrap()
    }

    fn capturing_transport(
        bodies: &Arc<Mutex<Vec<bytes::Bytes>>>,
        status: StatusCode,
    ) -> Arc<dyn Transport> {
        let bodies = Arc::clone(bodies);
        Arc::new(TransportFn::new(move |mut req: Request| {
            let bodies = Arc::clone(&bodies);
            async move {
                let buffered = req.body_mut().buffer().await?;
                bodies.lock().unwrap().push(buffered);
                Ok(Response::new(status, url()))
            }
        }))
    }

    fn failing_transport(bodies: &Arc<Mutex<Vec<bytes::Bytes>>>) -> Arc<dyn Transport> {
        let bodies = Arc::clone(bodies);
        Arc::new(TransportFn::new(move |mut req: Request| {
            let bodies = Arc::clone(&bodies);
            async move {
                let buffered = req.body_mut().buffer().await?;
                bodies.lock().unwrap().push(buffered);
                Err(ErrorKind::RequestCanceled)
            }
        }))
    }

    fn request() -> Request {
        http::Request::post("http://test.local/")
            .body(Body::from("identical payload"))
            .unwrap()
    }

    #[tokio::test]
    async fn spare_sees_identical_bytes_on_failure() {
        let base_bodies = Arc::default();
        let spare_bodies = Arc::default();
        let recover = Recover::new()
            .with_base(failing_transport(&base_bodies))
            .with_spare(capturing_transport(&spare_bodies, StatusCode::OK));

        let res = recover.round_trip(request()).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let base_bodies = base_bodies.lock().unwrap();
        let spare_bodies = spare_bodies.lock().unwrap();
        assert_eq!(base_bodies.len(), 1);
        assert_eq!(spare_bodies.len(), 1);
        assert_eq!(base_bodies[0], spare_bodies[0]);
        assert_eq!(&base_bodies[0][..], b"identical payload");
    }

    #[tokio::test]
    async fn spare_is_not_consulted_on_success() {
        let base_bodies = Arc::default();
        let spare_calls = Arc::new(AtomicUsize::new(0));
        let spare = {
            let spare_calls = Arc::clone(&spare_calls);
            Arc::new(TransportFn::new(move |_req: Request| {
                let spare_calls = Arc::clone(&spare_calls);
                async move {
                    spare_calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Response::new(StatusCode::OK, url()))
                }
            }))
        };
        let recover = Recover::new()
            .with_base(capturing_transport(&base_bodies, StatusCode::IM_A_TEAPOT))
            .with_spare(spare);

        let res = recover.round_trip(request()).await.unwrap();
        // A response is a response; only errors fail over by default.
        assert_eq!(res.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(spare_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn custom_predicate_can_fail_over_on_status() {
        let base_bodies = Arc::default();
        let spare_bodies = Arc::default();
        let recover = Recover::new()
            .with_base(capturing_transport(&base_bodies, StatusCode::SERVICE_UNAVAILABLE))
            .with_spare(capturing_transport(&spare_bodies, StatusCode::OK))
            .with_use_spare_fn(|outcome| {
                !matches!(outcome, Ok(res) if res.status().is_success())
            });

        let res = recover.round_trip(request()).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(spare_bodies.lock().unwrap().len(), 1);
    }
}
