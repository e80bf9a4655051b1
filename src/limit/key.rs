//! Group key functions.

use crate::types::Request;

/// The key every request in one group shares, computed per request.
///
/// An empty key means "do not limit": the request bypasses the limiter and
/// goes straight to the inner transport.
pub type GroupKeyFn = std::sync::Arc<dyn Fn(&Request) -> String + Send + Sync>;

/// Group requests by the host of their URI (the default).
///
/// Hostnames are lowercased so `API.example.com` and `api.example.com`
/// share a quota. Requests without a host yield the empty key and bypass
/// limiting.
#[must_use]
pub fn group_key_by_host(req: &Request) -> String {
    req.uri().host().map(str::to_lowercase).unwrap_or_default()
}

/// Place every request in one shared group, i.e. one global quota.
#[must_use]
pub fn constant_group_key(_req: &Request) -> String {
    "__constant_group_key__".to_owned()
}
