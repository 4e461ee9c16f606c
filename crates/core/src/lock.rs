//! Per-resource exclusive access with FIFO hand-off.
//!
//! [`LockManager`] serialises read-modify-write sequences on a named resource (one per
//! collection) while leaving distinct resources fully concurrent. It is an ordinary value
//! owned by whoever builds the store, so each test can have its own.
//!
//! ## Protocol
//!
//! - A resource is *checked out* while its name is present in the manager's map.
//! - [`LockManager::acquire`] on a free resource checks it out immediately. On a busy
//!   resource the request is queued behind earlier ones and resolves when ownership is handed
//!   to it.
//! - Dropping the returned [`ResourceGuard`] releases the resource: ownership passes directly
//!   to the oldest live waiter, or the resource becomes free if nobody is waiting.
//!
//! Waiters that give up (their future is dropped) are skipped. If ownership had already been
//! handed to a waiter that is dropped before observing it, the waiter passes it on, so an
//! abandoned request never stalls the queue.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

type Waiters = VecDeque<oneshot::Sender<()>>;

#[derive(Debug, Default)]
pub struct LockManager {
    resources: Mutex<HashMap<String, Waiters>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn resources(&self) -> MutexGuard<'_, HashMap<String, Waiters>> {
        // No code path panics while holding the map lock, so a poisoned map is still consistent.
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits for exclusive access to `name`.
    ///
    /// Requests on the same name are granted in arrival order.
    pub async fn acquire(self: &Arc<Self>, name: &str) -> ResourceGuard {
        loop {
            let queued = {
                let mut resources = self.resources();
                match resources.entry(name.to_owned()) {
                    Entry::Vacant(entry) => {
                        entry.insert(VecDeque::new());
                        None
                    }
                    Entry::Occupied(mut entry) => {
                        let (tx, rx) = oneshot::channel();
                        entry.get_mut().push_back(tx);
                        Some(rx)
                    }
                }
            };

            let Some(rx) = queued else {
                tracing::debug!(resource = name, "resource checked out");
                return self.guard(name);
            };

            tracing::debug!(resource = name, "resource busy, request queued");
            let waiter = Waiter {
                manager: self,
                name,
                rx: Some(rx),
            };
            if waiter.handed_over().await {
                tracing::debug!(resource = name, "resource handed over to queued request");
                return self.guard(name);
            }
        }
    }

    fn guard(self: &Arc<Self>, name: &str) -> ResourceGuard {
        ResourceGuard {
            manager: Arc::clone(self),
            name: name.to_owned(),
        }
    }

    /// Passes `name` to the next live waiter, or frees it.
    fn release(&self, name: &str) {
        let mut resources = self.resources();
        let Some(waiters) = resources.get_mut(name) else {
            return;
        };

        while let Some(next) = waiters.pop_front() {
            if next.send(()).is_ok() {
                return;
            }
        }

        resources.remove(name);
        tracing::debug!(resource = name, "resource released");
    }

    /// True while some holder has `name` checked out.
    pub fn is_held(&self, name: &str) -> bool {
        self.resources().contains_key(name)
    }

    /// Number of requests queued behind the current holder of `name`.
    pub fn queued(&self, name: &str) -> usize {
        self.resources().get(name).map_or(0, VecDeque::len)
    }
}

/// A queued request for a busy resource.
struct Waiter<'a> {
    manager: &'a LockManager,
    name: &'a str,
    rx: Option<oneshot::Receiver<()>>,
}

impl Waiter<'_> {
    /// Resolves once ownership has been handed to this waiter.
    ///
    /// Returns false only if the sending side vanished without handing over, in which case
    /// the caller retries from the start.
    async fn handed_over(mut self) -> bool {
        let Some(rx) = self.rx.as_mut() else {
            return false;
        };
        let handed = rx.await.is_ok();
        self.rx = None;
        handed
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            if rx.try_recv().is_ok() {
                // Ownership arrived after the caller gave up; pass it on.
                self.manager.release(self.name);
            }
        }
    }
}

/// Exclusive access to one resource. Released on drop.
#[derive(Debug)]
pub struct ResourceGuard {
    manager: Arc<LockManager>,
    name: String,
}

impl ResourceGuard {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Releases the resource now rather than at end of scope.
    pub fn release(self) {}
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        self.manager.release(&self.name);
    }
}
