//! `tollgate` is a library of composable HTTP client middlewares.
//!
//! Every middleware implements the single-operation [`Transport`] contract
//! and wraps another transport, so a client stack is assembled by plain
//! composition. For example rate limit, then retry, then basic auth, down
//! to the [`ClientTransport`] doing the actual network round trip:
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use tollgate::{Body, ExponentialBackoff, RateLimit, Transport};
//!
//! #[tokio::main]
//! async fn main() -> tollgate::Result<()> {
//!     let retry = ExponentialBackoff::new(
//!         Duration::from_millis(10),
//!         Duration::from_millis(400),
//!         1.9,
//!     );
//!     let limiter = RateLimit::interval(Duration::from_millis(100))
//!         .with_transport(Arc::new(retry));
//!
//!     let req = http::Request::get("https://example.com/").body(Body::empty())?;
//!     let res = limiter.round_trip(req).await?;
//!     println!("{}", res.status());
//!     Ok(())
//! }
//! ```
//!
//! The core of the crate is the rate-limiting engine behind
//! [`RateLimit::interval`] and [`RateLimit::max_concurrent`]: requests are
//! partitioned into groups (by URL host unless configured otherwise), each
//! group multiplexes three priority classes onto one dispatch stream, and
//! idle groups can be expired. The factories share that engine across many
//! limiter instances so differently-configured call sites still respect
//! one global quota.

#![warn(clippy::all, clippy::pedantic)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rustdoc::invalid_html_tags,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_extern_crates
)]
#![allow(clippy::module_name_repetitions)]

mod auth;
mod backoff;
mod client;
mod hooks;
mod recover;
mod signal;
mod transport;
mod types;

/// Group-aware rate limiting: the interval and max-concurrency limiters
/// plus the factories for sharing one engine across instances.
pub mod limit;

pub use crate::{
    auth::BasicAuth,
    backoff::{ExponentialBackoff, RetryFn},
    client::ClientTransport,
    limit::{
        constant_group_key, group_key_by_host, GroupKeyFn, IntervalTransportFactory,
        LimiterConfig, MaxConcurrentTransportFactory, Priority, RateLimit,
        DEFAULT_PRIORITY_HEADER,
    },
    recover::{Recover, UseSpareFn},
    signal::Signal,
    transport::{default_transport, Transport, TransportFn},
    types::{
        attach_cancel_signal, cancel_signal, clone_request, ensure_request_id, request_id, Body,
        ErrorKind, Request, RequestId, Response, Result,
    },
};
