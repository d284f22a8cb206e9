//! Scheduler layer
//!
//! Plan IDs flow through an explicit [`WorkQueue`] into a fixed pool of
//! workers. Each worker takes the plan's lease from [`PlanLocks`] before
//! running its pipeline, so two dequeues of the same plan never overlap. A
//! dequeue of a leased plan becomes a follow-up run of the lease holder.

pub mod lock;
pub mod queue;
pub mod worker;

pub use lock::{PlanLease, PlanLocks};
pub use queue::WorkQueue;
pub use worker::WorkerPool;
