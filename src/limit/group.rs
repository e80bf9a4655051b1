//! Group lifecycle: creation on first use, waiter refcounting, and idle
//! expiry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::debug;
use tokio::sync::mpsc;

use crate::limit::channel::RequestPayload;
use crate::limit::dispatch::Strategy;
use crate::limit::Priority;
use crate::signal::Signal;

/// Called with the group key after a group has been torn down by the
/// expiry sweep.
pub type GroupClosedHook = Arc<dyn Fn(&str) + Send + Sync>;

/// One group: the requests sharing a key share this channel and its
/// dispatcher, and therefore one quota.
#[derive(Debug)]
pub(crate) struct Group {
    ports: crate::limit::channel::PriorityPorts,
    close: Signal,
    waiters: AtomicUsize,
}

impl Group {
    pub(crate) fn port(&self, priority: Priority) -> &mpsc::Sender<RequestPayload> {
        self.ports.port(priority)
    }

    fn waiters(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }
}

/// Holds a group checked out for one request; dropping it releases the
/// waiter count. The decrement must not depend on the happy path, since
/// cancellation can unwind the caller at any awaiting site.
#[derive(Debug)]
pub(crate) struct GroupGuard {
    group: Arc<Group>,
}

impl GroupGuard {
    pub(crate) fn group(&self) -> &Group {
        &self.group
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        self.group.waiters.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The state shared by every limiter produced from one factory: the close
/// signal and the live groups. Passed around behind an `Arc`, never as a
/// process-global.
#[derive(Debug, Default)]
pub(crate) struct Coordinator {
    pub(crate) close: Signal,
    groups: Mutex<HashMap<String, Arc<Group>>>,
}

impl Coordinator {
    /// Look up or create the group for `key` and register one waiter on
    /// it.
    ///
    /// Creation starts the group's priority channel and dispatcher, ties
    /// their shutdown to the coordinator close signal, and starts the idle
    /// watcher when an expiry interval is configured.
    ///
    /// # Panics
    ///
    /// Panics if the group map mutex is poisoned.
    pub(crate) fn checkout(
        self: &Arc<Self>,
        key: &str,
        strategy: Strategy,
        expire_check_interval: Option<Duration>,
        on_group_closed: Option<GroupClosedHook>,
    ) -> GroupGuard {
        let group = {
            let mut groups = self.groups.lock().unwrap();
            if let Some(group) = groups.get(key) {
                group.waiters.fetch_add(1, Ordering::SeqCst);
                return GroupGuard {
                    group: Arc::clone(group),
                };
            }

            let close = Signal::new();
            close.follow(&self.close);
            let group = Arc::new(Group {
                ports: strategy.start(&close),
                close,
                waiters: AtomicUsize::new(1),
            });
            groups.insert(key.to_owned(), Arc::clone(&group));
            group
        };
        debug!("created rate limit group `{key}`");

        if let Some(every) = expire_check_interval {
            spawn_expiry_watcher(
                Arc::clone(self),
                key.to_owned(),
                Arc::clone(&group),
                every,
                on_group_closed,
            );
        }

        GroupGuard { group }
    }

    #[cfg(test)]
    pub(crate) fn group_count(&self) -> usize {
        self.groups.lock().unwrap().len()
    }
}

/// Wakes every `every`; once the group has no waiters it removes the map
/// entry, fires the group's own close signal and reports the teardown.
///
/// Only the per-group signal is fired here; a single idle group expiring
/// must never close the whole coordinator.
fn spawn_expiry_watcher(
    coordinator: Arc<Coordinator>,
    key: String,
    group: Arc<Group>,
    every: Duration,
    on_group_closed: Option<GroupClosedHook>,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = group.close.fired() => return,
                () = tokio::time::sleep(every) => {}
            }
            let expired = {
                let mut groups = coordinator.groups.lock().unwrap();
                match groups.get(&key) {
                    Some(current) if Arc::ptr_eq(current, &group) && group.waiters() == 0 => {
                        groups.remove(&key);
                        true
                    }
                    // A successor group under the same key is not ours to
                    // tear down.
                    Some(_) => return,
                    None => return,
                }
            };
            if expired {
                group.close.fire();
                debug!("rate limit group `{key}` expired");
                if let Some(hook) = &on_group_closed {
                    hook(&key);
                }
                return;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn coordinator() -> Arc<Coordinator> {
        Arc::new(Coordinator::default())
    }

    #[tokio::test]
    async fn checkout_reuses_live_groups() {
        let coordinator = coordinator();
        let strategy = Strategy::MaxConcurrent(1);

        let a = coordinator.checkout("one", strategy, None, None);
        let b = coordinator.checkout("one", strategy, None, None);
        let other = coordinator.checkout("two", strategy, None, None);

        assert!(std::ptr::eq(a.group(), b.group()));
        assert!(!std::ptr::eq(a.group(), other.group()));
        assert_eq!(coordinator.group_count(), 2);
        assert_eq!(a.group().waiters(), 2);

        drop(b);
        assert_eq!(a.group().waiters(), 1);
    }

    #[tokio::test]
    async fn idle_groups_expire_and_busy_ones_do_not() {
        let coordinator = coordinator();
        let closed = Arc::new(AtomicUsize::new(0));
        let hook: GroupClosedHook = {
            let closed = Arc::clone(&closed);
            Arc::new(move |_key| {
                closed.fetch_add(1, Ordering::SeqCst);
            })
        };

        let guard = coordinator.checkout(
            "key",
            Strategy::MaxConcurrent(1),
            Some(Duration::from_millis(20)),
            Some(hook),
        );

        // Still checked out: several sweeps must leave it alone.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(coordinator.group_count(), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 0);

        drop(guard);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(coordinator.group_count(), 0);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn coordinator_close_reaches_group_signals() {
        let coordinator = coordinator();
        let guard = coordinator.checkout("key", Strategy::MaxConcurrent(1), None, None);

        coordinator.close.fire();
        guard.group().close.fired().await;
    }
}
