//! Retry middleware with exponential backoff.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use crate::transport::{default_transport, Transport};
use crate::types::{cancel_signal, clone_request, Body, ErrorKind, Request, Response, Result};

/// Decides whether an outcome warrants another attempt.
pub type RetryFn = Arc<dyn Fn(&Result<Response>) -> bool + Send + Sync>;

/// A [`Transport`] that retries failed round trips with exponentially
/// growing delays.
///
/// The request body is buffered once and identical bytes are re-presented
/// to every attempt; response bodies are buffered before the predicate
/// runs, so its inspection never consumes the bytes handed to the caller.
///
/// Delays start at `min` and grow by `factor` (optionally jittered) after
/// each attempt. The loop stops when the predicate declines **or** the
/// current delay has reached `max`. The cap means "after this delay we
/// stop retrying", so the final sleep itself may exceed it when jitter is
/// in play.
pub struct ExponentialBackoff {
    transport: Option<Arc<dyn Transport>>,
    min: Duration,
    max: Duration,
    factor: f64,
    randomize_factor: f64,
    retry_fn: Option<RetryFn>,
}

impl ExponentialBackoff {
    /// A retry middleware over [`crate::default_transport`].
    ///
    /// The default predicate retries on transport errors only; successful
    /// responses are returned regardless of their status code.
    #[must_use]
    pub fn new(min: Duration, max: Duration, factor: f64) -> Self {
        Self {
            transport: None,
            min,
            max,
            factor,
            randomize_factor: 0.0,
            retry_fn: None,
        }
    }

    /// Set the inner transport.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Jitter each delay by a uniform factor in `[1 - rf, 1 + rf]`.
    /// Values above 1 are clamped to 1.
    #[must_use]
    pub fn with_randomize_factor(mut self, randomize_factor: f64) -> Self {
        self.randomize_factor = randomize_factor;
        self
    }

    /// Set the retry predicate.
    #[must_use]
    pub fn with_retry_fn(
        mut self,
        f: impl Fn(&Result<Response>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.retry_fn = Some(Arc::new(f));
        self
    }

    fn base(&self) -> Arc<dyn Transport> {
        self.transport.clone().unwrap_or_else(default_transport)
    }

    fn should_retry(&self, outcome: &Result<Response>) -> bool {
        match &self.retry_fn {
            Some(f) => f(outcome),
            None => outcome.is_err(),
        }
    }

    fn next_wait(&self, current: Duration) -> Duration {
        let mut jitter = 1.0;
        if self.randomize_factor > 0.0 {
            let rf = self.randomize_factor.min(1.0);
            jitter = (rand::random::<f64>() - 0.5) * 2.0 * rf + 1.0;
        }
        current.mul_f64(self.factor * jitter)
    }
}

#[async_trait]
impl Transport for ExponentialBackoff {
    async fn round_trip(&self, mut req: Request) -> Result<Response> {
        let cancel = cancel_signal(&req);
        let body = req.body_mut().buffer().await?;
        let base = self.base();

        let mut current = self.min;
        let mut attempt = 1u32;
        loop {
            let fresh = clone_request(&req, Body::from(body.clone()));
            let mut outcome = base.round_trip(fresh).await;
            if let Ok(res) = outcome.as_mut() {
                res.buffer().await?;
            }

            if !self.should_retry(&outcome) || current >= self.max {
                return outcome;
            }

            debug!(
                "attempt {attempt} for {} failed, retrying in {current:?}",
                req.uri()
            );
            tokio::select! {
                () = cancel.fired() => return Err(ErrorKind::RequestCanceled),
                () = tokio::time::sleep(current) => {}
            }
            current = self.next_wait(current);
            attempt += 1;
        }
    }

    fn cancel_request(&self, req: &Request) {
        cancel_signal(req).fire();
        self.base().cancel_request(req);
    }
}

impl fmt::Debug for ExponentialBackoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExponentialBackoff")
            .field("min", &self.min)
            .field("max", &self.max)
            .field("factor", &self.factor)
            .field("randomize_factor", &self.randomize_factor)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}
