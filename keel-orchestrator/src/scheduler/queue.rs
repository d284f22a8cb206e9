//! Work queue of plan IDs

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::Notify;
use tracing::{debug, warn};

/// FIFO of plan IDs shared by producers and workers
///
/// The same plan may be queued any number of times; every `add` yields one
/// dequeue. After [`shut_down`](Self::shut_down) no new items are accepted
/// and idle workers are released.
#[derive(Default)]
pub struct WorkQueue {
    items: Mutex<VecDeque<i64>>,
    notify: Notify,
    shutting_down: AtomicBool,
    processing: AtomicUsize,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, plan_id: i64) {
        if self.is_shutting_down() {
            warn!("Queue is shut down, dropping plan {}", plan_id);
            return;
        }

        self.lock_items().push_back(plan_id);
        debug!("Queued plan {}", plan_id);
        self.notify.notify_one();
    }

    /// Waits for the next plan ID
    ///
    /// Returns `None` once the queue is shut down. Items still queued at
    /// that point are not handed out.
    pub async fn get(&self) -> Option<i64> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_shutting_down() {
                return None;
            }

            let (next, remaining) = {
                let mut items = self.lock_items();
                (items.pop_front(), items.len())
            };

            if let Some(plan_id) = next {
                self.processing.fetch_add(1, Ordering::SeqCst);
                // Pass a pending wakeup on to the next idle worker
                if remaining > 0 {
                    self.notify.notify_one();
                }
                return Some(plan_id);
            }

            notified.await;
        }
    }

    /// Marks a dequeued item as finished
    pub fn done(&self, plan_id: i64) {
        self.processing.fetch_sub(1, Ordering::SeqCst);
        debug!("Finished plan {}", plan_id);
    }

    pub fn shut_down(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.lock_items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items handed out and not yet marked done
    pub fn in_flight(&self) -> usize {
        self.processing.load(Ordering::SeqCst)
    }

    fn lock_items(&self) -> std::sync::MutexGuard<'_, VecDeque<i64>> {
        // The guarded deque is always left consistent, so a poisoned lock is
        // still usable
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }
}
