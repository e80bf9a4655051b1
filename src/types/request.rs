use std::sync::atomic::{AtomicU64, Ordering};

use crate::signal::Signal;
use crate::types::Body;

/// The request type flowing through the middleware stack.
///
/// Middlewares communicate out-of-band data through the request extensions:
/// a [`RequestId`] for identity (the `cancel_request` escape hatch routes by
/// it) and a cancellation [`Signal`].
pub type Request = http::Request<Body>;

/// Process-unique identity of a request.
///
/// Requests are values that get cloned and moved through the stack, so
/// cancellation routing cannot rely on object identity; it relies on this
/// id instead. Clones produced for an inner transport carry a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// The id of a request, if one has been assigned.
#[must_use]
pub fn request_id(req: &Request) -> Option<RequestId> {
    req.extensions().get::<RequestId>().copied()
}

/// The id of a request, assigning a fresh one if necessary.
pub fn ensure_request_id(req: &mut Request) -> RequestId {
    if let Some(id) = request_id(req) {
        return id;
    }
    let id = RequestId::next();
    req.extensions_mut().insert(id);
    id
}

/// Attach a cancellation signal to a request and return a handle to it.
///
/// Firing the returned signal cancels the request at whatever awaiting
/// site currently holds it: a limiter queue, a backoff sleep, or the
/// in-flight round trip itself. Calling this on a request that already
/// carries a signal returns the existing one.
pub fn attach_cancel_signal(req: &mut Request) -> Signal {
    if let Some(signal) = req.extensions().get::<Signal>() {
        return signal.clone();
    }
    let signal = Signal::new();
    req.extensions_mut().insert(signal.clone());
    signal
}

/// The cancellation signal of a request.
///
/// Requests without one get an inert signal that never fires, so awaiting
/// sites can select on it unconditionally.
#[must_use]
pub fn cancel_signal(req: &Request) -> Signal {
    req.extensions()
        .get::<Signal>()
        .cloned()
        .unwrap_or_default()
}

/// Shallow clone of a request with a deep-copied header map.
///
/// The clone shares nothing with the original except the extensions this
/// crate knows about (id and cancellation signal); mutating the clone's
/// headers leaves the original untouched. The body is supplied by the
/// caller because bodies are not generally cloneable.
#[must_use]
pub fn clone_request(req: &Request, body: Body) -> Request {
    let mut clone = http::Request::new(body);
    *clone.method_mut() = req.method().clone();
    *clone.uri_mut() = req.uri().clone();
    *clone.version_mut() = req.version();

    let headers = clone.headers_mut();
    for (name, value) in req.headers() {
        headers.append(name.clone(), value.clone());
    }

    if let Some(id) = request_id(req) {
        clone.extensions_mut().insert(id);
    }
    if let Some(signal) = req.extensions().get::<Signal>() {
        clone.extensions_mut().insert(signal.clone());
    }

    clone
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Request {
        http::Request::builder()
            .method("POST")
            .uri("http://example.com/path")
            .header("x-one", "1")
            .header("x-many", "a")
            .header("x-many", "b")
            .body(Body::from("payload"))
            .unwrap()
    }

    #[test]
    fn ids_are_unique_and_sticky() {
        let mut a = request();
        let mut b = request();

        assert!(request_id(&a).is_none());
        let id_a = ensure_request_id(&mut a);
        let id_b = ensure_request_id(&mut b);
        assert_ne!(id_a, id_b);

        // Asking again returns the same id.
        assert_eq!(ensure_request_id(&mut a), id_a);
        assert_eq!(request_id(&a), Some(id_a));
    }

    #[test]
    fn cancel_signal_is_shared() {
        let mut req = request();
        let handle = attach_cancel_signal(&mut req);
        let observed = cancel_signal(&req);

        handle.fire();
        assert!(observed.is_fired());
    }

    #[test]
    fn missing_cancel_signal_is_inert() {
        let req = request();
        assert!(!cancel_signal(&req).is_fired());
    }

    #[test]
    fn clone_deep_copies_headers() {
        let mut req = request();
        let id = ensure_request_id(&mut req);
        let signal = attach_cancel_signal(&mut req);

        let mut clone = clone_request(&req, Body::from("payload"));
        assert_eq!(clone.method(), req.method());
        assert_eq!(clone.uri(), req.uri());
        assert_eq!(
            clone.headers().get_all("x-many").iter().count(),
            req.headers().get_all("x-many").iter().count()
        );
        assert_eq!(request_id(&clone), Some(id));

        clone.headers_mut().insert("x-one", "changed".parse().unwrap());
        assert_eq!(req.headers().get("x-one").unwrap(), "1");

        // The cancellation signal is shared, not copied.
        signal.fire();
        assert!(cancel_signal(&clone).is_fired());
    }
}
