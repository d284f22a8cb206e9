//! Per-plan leases
//!
//! A lease is taken without waiting. A worker that finds the plan already
//! leased records a follow-up run on it and moves on; the holder performs
//! the follow-ups before giving the lease back, so no worker is parked on a
//! busy plan and every dequeue still yields one run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

/// Follow-up runs owed per leased plan
type Entries = Arc<Mutex<HashMap<i64, usize>>>;

/// Hands out at most one live lease per plan
#[derive(Default, Clone)]
pub struct PlanLocks {
    entries: Entries,
}

impl PlanLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lease of `plan_id`
    ///
    /// Returns `None` when another lease is live; the holder then owes one
    /// more run of the plan.
    pub fn try_acquire(&self, plan_id: i64) -> Option<PlanLease> {
        let mut entries = lock_entries(&self.entries);

        if let Some(pending) = entries.get_mut(&plan_id) {
            *pending += 1;
            return None;
        }

        entries.insert(plan_id, 0);
        Some(PlanLease {
            plan_id,
            entries: Arc::clone(&self.entries),
            released: false,
        })
    }

    /// Number of plans with a live lease
    pub fn len(&self) -> usize {
        lock_entries(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive right to run a plan
pub struct PlanLease {
    plan_id: i64,
    entries: Entries,
    released: bool,
}

impl PlanLease {
    pub fn plan_id(&self) -> i64 {
        self.plan_id
    }

    /// Claims an owed follow-up run, or releases the lease if none is owed
    ///
    /// Both happen under one lock, so a follow-up recorded concurrently is
    /// never lost.
    pub fn next_run(&mut self) -> bool {
        let mut entries = lock_entries(&self.entries);

        match entries.get_mut(&self.plan_id) {
            Some(pending) if *pending > 0 => {
                *pending -= 1;
                true
            }
            _ => {
                entries.remove(&self.plan_id);
                self.released = true;
                false
            }
        }
    }
}

impl Drop for PlanLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let mut entries = lock_entries(&self.entries);
        if let Some(pending) = entries.remove(&self.plan_id) {
            if pending > 0 {
                warn!(
                    "Lease of plan {} dropped with {} follow-up run(s) owed",
                    self.plan_id, pending
                );
            }
        }
    }
}

fn lock_entries(entries: &Mutex<HashMap<i64, usize>>) -> MutexGuard<'_, HashMap<i64, usize>> {
    entries.lock().unwrap_or_else(|e| e.into_inner())
}
