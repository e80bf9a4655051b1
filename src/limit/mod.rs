//! Group-aware rate limiting for HTTP clients.
//!
//! Two public middlewares share one engine: [`RateLimit::interval`] keeps
//! at least a fixed duration between dispatch starts within a group, and
//! [`RateLimit::max_concurrent`] bounds the number of in-flight round
//! trips per group. Requests are grouped by a key function (URL host by
//! default) and scheduled in three priority classes read from a request
//! header.
//!
//! The factories produce limiter instances that share their groups, so
//! call sites can be configured independently while one global quota is
//! preserved.

mod channel;
mod config;
mod dispatch;
mod group;
mod key;
mod priority;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::HeaderName;
use tokio::sync::oneshot;

use crate::transport::{default_transport, Transport};
use crate::types::{cancel_signal, ErrorKind, Request, Response, Result};
use channel::RequestPayload;
use dispatch::Strategy;
use group::Coordinator;

pub use config::LimiterConfig;
pub use group::GroupClosedHook;
pub use key::{constant_group_key, group_key_by_host, GroupKeyFn};
pub use priority::{Priority, DEFAULT_PRIORITY_HEADER};

/// A rate-limiting [`Transport`].
///
/// Requests are partitioned into groups by a key function; each group gets
/// its own priority channel and dispatcher enforcing the configured quota.
/// Groups are created on first use and, when an expiry interval is
/// configured, torn down again once idle.
///
/// Dropping a limiter does not stop its groups; call [`RateLimit::close`]
/// to shut the engine down. Requests waiting at that point (and any issued
/// afterwards) fail with [`ErrorKind::RequestCanceled`].
pub struct RateLimit {
    transport: Option<Arc<dyn Transport>>,
    group_key_fn: GroupKeyFn,
    priority_header: HeaderName,
    expire_check_interval: Option<Duration>,
    strategy: Strategy,
    coordinator: Arc<Coordinator>,
    on_group_closed: Option<GroupClosedHook>,
}

impl RateLimit {
    /// A limiter that keeps at least `interval` between dispatch starts
    /// within each group. In-flight round trips may still overlap.
    #[must_use]
    pub fn interval(interval: Duration) -> Self {
        Self::with_strategy(Strategy::Interval(interval), Arc::default())
    }

    /// A limiter that keeps at most `limit` round trips in flight within
    /// each group. Values below 1 are treated as 1.
    #[must_use]
    pub fn max_concurrent(limit: usize) -> Self {
        Self::with_strategy(Strategy::MaxConcurrent(limit), Arc::default())
    }

    fn with_strategy(strategy: Strategy, coordinator: Arc<Coordinator>) -> Self {
        Self {
            transport: None,
            group_key_fn: Arc::new(key::group_key_by_host),
            priority_header: HeaderName::from_static(DEFAULT_PRIORITY_HEADER),
            expire_check_interval: None,
            strategy,
            coordinator,
            on_group_closed: None,
        }
    }

    /// Set the inner transport. Defaults to [`default_transport`].
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the function that maps a request to its group key.
    ///
    /// Defaults to [`group_key_by_host`]. Requests mapped to the empty
    /// string bypass the limiter entirely.
    #[must_use]
    pub fn with_group_key_fn(
        mut self,
        f: impl Fn(&Request) -> String + Send + Sync + 'static,
    ) -> Self {
        self.group_key_fn = Arc::new(f);
        self
    }

    /// Set the header consulted for a request's [`Priority`]. Defaults to
    /// [`DEFAULT_PRIORITY_HEADER`].
    #[must_use]
    pub fn with_priority_header(mut self, name: HeaderName) -> Self {
        self.priority_header = name;
        self
    }

    /// Tear down groups that have had no waiters for roughly this long.
    /// Without it, groups live until [`RateLimit::close`].
    #[must_use]
    pub fn with_expire_check_interval(mut self, every: Duration) -> Self {
        self.expire_check_interval = Some(every);
        self
    }

    /// Observe group teardown by the expiry sweep; the hook receives the
    /// group key. Useful for tests and lifecycle instrumentation.
    #[must_use]
    pub fn with_group_closed_hook(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_group_closed = Some(Arc::new(hook));
        self
    }

    /// Shut down the limiter: wake every waiting request with
    /// [`ErrorKind::RequestCanceled`] and stop all group tasks.
    ///
    /// Idempotent. For limiters produced by a factory this closes the
    /// shared engine, i.e. every sibling instance as well.
    pub fn close(&self) {
        self.coordinator.close.fire();
    }

    fn base(&self) -> Arc<dyn Transport> {
        self.transport.clone().unwrap_or_else(default_transport)
    }
}

#[async_trait]
impl Transport for RateLimit {
    async fn round_trip(&self, req: Request) -> Result<Response> {
        let key = (self.group_key_fn)(&req);
        if key.is_empty() {
            return self.base().round_trip(req).await;
        }

        let cancel = cancel_signal(&req);
        let priority = Priority::from_request(&req, &self.priority_header);
        let guard = self.coordinator.checkout(
            &key,
            self.strategy,
            self.expire_check_interval,
            self.on_group_closed.clone(),
        );

        let (reply, reply_rx) = oneshot::channel();
        let transport = self.base();
        let payload = RequestPayload {
            responder: Box::pin(async move { transport.round_trip(req).await }),
            reply,
        };

        let close = &self.coordinator.close;
        tokio::select! {
            sent = guard.group().port(priority).send(payload) => {
                if sent.is_err() {
                    return Err(ErrorKind::RequestCanceled);
                }
            }
            () = close.fired() => return Err(ErrorKind::RequestCanceled),
            () = cancel.fired() => return Err(ErrorKind::RequestCanceled),
        }

        tokio::select! {
            reply = reply_rx => reply.unwrap_or_else(|_| Err(ErrorKind::RequestCanceled)),
            () = close.fired() => Err(ErrorKind::RequestCanceled),
            () = cancel.fired() => Err(ErrorKind::RequestCanceled),
        }
    }

    fn cancel_request(&self, req: &Request) {
        cancel_signal(req).fire();
        self.base().cancel_request(req);
    }
}

impl fmt::Debug for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimit")
            .field("strategy", &self.strategy)
            .field("priority_header", &self.priority_header)
            .field("expire_check_interval", &self.expire_check_interval)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

/// Produces [`RateLimit`] instances that share one interval-paced engine.
///
/// Instances may differ in key function, priority header or inner
/// transport, but requests with the same group key share the same group,
/// and therefore the same pacing, across all of them.
#[derive(Debug, Clone)]
pub struct IntervalTransportFactory {
    interval: Duration,
    expire_check_interval: Option<Duration>,
    coordinator: Arc<Coordinator>,
}

impl IntervalTransportFactory {
    /// A factory for limiters pacing each group to one dispatch per
    /// `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            expire_check_interval: None,
            coordinator: Arc::default(),
        }
    }

    /// Expire idle groups after roughly this long (see
    /// [`RateLimit::with_expire_check_interval`]).
    #[must_use]
    pub fn with_expire_check_interval(mut self, every: Duration) -> Self {
        self.expire_check_interval = Some(every);
        self
    }

    /// Produce a limiter bound to the shared engine.
    #[must_use]
    pub fn transport(&self) -> RateLimit {
        let mut limiter = RateLimit::with_strategy(
            Strategy::Interval(self.interval),
            Arc::clone(&self.coordinator),
        );
        limiter.expire_check_interval = self.expire_check_interval;
        limiter
    }

    /// Shut down the shared engine and every limiter produced from it.
    pub fn close(&self) {
        self.coordinator.close.fire();
    }
}

/// Produces [`RateLimit`] instances that share one concurrency-bounded
/// engine; the counterpart of [`IntervalTransportFactory`] for
/// [`RateLimit::max_concurrent`].
#[derive(Debug, Clone)]
pub struct MaxConcurrentTransportFactory {
    max_concurrent: usize,
    expire_check_interval: Option<Duration>,
    coordinator: Arc<Coordinator>,
}

impl MaxConcurrentTransportFactory {
    /// A factory for limiters allowing at most `limit` in-flight round
    /// trips per group.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            max_concurrent: limit,
            expire_check_interval: None,
            coordinator: Arc::default(),
        }
    }

    /// Expire idle groups after roughly this long.
    #[must_use]
    pub fn with_expire_check_interval(mut self, every: Duration) -> Self {
        self.expire_check_interval = Some(every);
        self
    }

    /// Produce a limiter bound to the shared engine.
    #[must_use]
    pub fn transport(&self) -> RateLimit {
        let mut limiter = RateLimit::with_strategy(
            Strategy::MaxConcurrent(self.max_concurrent),
            Arc::clone(&self.coordinator),
        );
        limiter.expire_check_interval = self.expire_check_interval;
        limiter
    }

    /// Shut down the shared engine and every limiter produced from it.
    pub fn close(&self) {
        self.coordinator.close.fire();
    }
}
