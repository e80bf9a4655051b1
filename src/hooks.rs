//! Cleanup plumbing shared by the middlewares: an on-EOF body hook and a
//! map of in-flight request clones for cancellation routing.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::{BoxStream, Stream};

use crate::types::{Body, Request, RequestId, Result};

type Hook = Box<dyn FnOnce() + Send + 'static>;

/// Wrap `body` so that `hook` runs exactly once: on the first end-of-stream
/// observed by the reader, or when the body is dropped unread.
pub(crate) fn notify_on_eof(body: Body, hook: impl FnOnce() + Send + 'static) -> Body {
    Body::wrap_stream(NotifyOnEof {
        inner: body.into_stream(),
        hook: Some(Box::new(hook)),
    })
}

struct NotifyOnEof {
    inner: BoxStream<'static, Result<Bytes>>,
    hook: Option<Hook>,
}

impl NotifyOnEof {
    fn run_hook(&mut self) {
        if let Some(hook) = self.hook.take() {
            hook();
        }
    }
}

impl Stream for NotifyOnEof {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_next(cx);
        if matches!(poll, Poll::Ready(None)) {
            this.run_hook();
        }
        poll
    }
}

impl Drop for NotifyOnEof {
    fn drop(&mut self) {
        self.run_hook();
    }
}

/// In-flight request clones, keyed by the id of the request they were
/// cloned from.
///
/// Middlewares that send a modified clone towards the inner transport
/// record it here so `cancel_request` can be routed: the caller cancels by
/// the original request, the inner transport only knows the clone.
///
/// All operations are idempotent; removing an entry twice is a no-op.
#[derive(Debug, Default)]
pub(crate) struct TrackedRequests {
    inflight: Mutex<HashMap<RequestId, Request>>,
}

impl TrackedRequests {
    /// # Panics
    ///
    /// Panics if the map mutex is poisoned.
    pub(crate) fn insert(&self, original: RequestId, clone: Request) {
        self.inflight.lock().unwrap().insert(original, clone);
    }

    /// # Panics
    ///
    /// Panics if the map mutex is poisoned.
    pub(crate) fn remove(&self, original: RequestId) -> Option<Request> {
        self.inflight.lock().unwrap().remove(&original)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inflight.lock().unwrap().len()
    }
}
