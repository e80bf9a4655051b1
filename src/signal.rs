//! A broadcast close/cancel primitive.
//!
//! The limiter's close signal, per-group teardown and per-request
//! cancellation all share the same shape: fired at most once, observed by
//! many tasks, and safe to fire from any of its clones. This module wraps
//! [`tokio::sync::watch`] into that shape, much like [`crate::types`] wraps
//! other channel plumbing into domain types.

use std::sync::Arc;

use tokio::sync::watch;

/// A one-shot broadcast signal.
///
/// Clones observe and fire the same underlying signal. Firing is
/// idempotent; a fired signal stays fired.
#[derive(Debug, Clone)]
pub struct Signal {
    tx: Arc<watch::Sender<bool>>,
}

impl Signal {
    /// Create a signal in the un-fired state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the signal, waking every task waiting in [`Signal::fired`].
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the signal has fired.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal fires. Returns immediately if it already has.
    pub async fn fired(&self) {
        let mut rx = self.tx.subscribe();
        // `wait_for` checks the current value first, so a signal fired
        // before this call resolves immediately.
        let _ = rx.wait_for(|fired| *fired).await;
    }

    /// Fire this signal whenever `parent` fires.
    ///
    /// The link is one-directional: firing this signal leaves `parent`
    /// untouched. The linking task exits once either side has fired.
    pub fn follow(&self, parent: &Self) {
        let parent = parent.clone();
        let child = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = parent.fired() => child.fire(),
                () = child.fired() => {}
            }
        });
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}
