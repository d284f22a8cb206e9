//! Worker pool
//!
//! Each worker loops: dequeue a plan, take its lease, run it, mark it done.
//! A failing or panicking run is logged and the worker moves on to the next
//! plan. A plan whose lease is held elsewhere is handed to the holder as a
//! follow-up run instead of blocking the worker.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::{PlanLocks, WorkQueue};
use crate::error::Result;
use crate::pipeline::PipelineRunner;

/// Something that can run a plan once
#[async_trait]
pub trait PlanProcessor: Send + Sync {
    async fn process(&self, plan_id: i64) -> Result<()>;
}

#[async_trait]
impl PlanProcessor for PipelineRunner {
    async fn process(&self, plan_id: i64) -> Result<()> {
        self.run(plan_id).await
    }
}

pub struct WorkerPool {
    queue: Arc<WorkQueue>,
    processor: Arc<dyn PlanProcessor>,
    locks: PlanLocks,
}

impl WorkerPool {
    pub fn new(queue: Arc<WorkQueue>, processor: Arc<dyn PlanProcessor>) -> Self {
        Self {
            queue,
            processor,
            locks: PlanLocks::new(),
        }
    }

    /// Runs `worker_count` workers until `shutdown` turns true
    ///
    /// Shutdown stops the queue; workers finish the plan they are on and
    /// exit. Returns once every worker has exited.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>, worker_count: usize) {
        info!("Starting worker pool with {} worker(s)", worker_count);

        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            workers.spawn(worker_loop(
                worker_id,
                Arc::clone(&self.queue),
                Arc::clone(&self.processor),
                self.locks.clone(),
            ));
        }

        let queue = Arc::clone(&self.queue);
        let watcher = tokio::spawn(async move {
            while !*shutdown.borrow_and_update() {
                // A dropped sender also stops the pool
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            info!("Shutdown requested, stopping work queue");
            queue.shut_down();
        });

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                warn!("Worker task panicked: {}", e);
            }
        }
        watcher.abort();

        info!("Worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<WorkQueue>,
    processor: Arc<dyn PlanProcessor>,
    locks: PlanLocks,
) {
    while let Some(plan_id) = queue.get().await {
        let Some(mut lease) = locks.try_acquire(plan_id) else {
            info!(
                "Worker {}: plan {} is running elsewhere, deferred to its holder",
                worker_id, plan_id
            );
            queue.done(plan_id);
            continue;
        };

        loop {
            run_once(worker_id, plan_id, &processor).await;
            if !lease.next_run() {
                break;
            }
        }

        queue.done(plan_id);
    }

    info!("Worker {} stopped", worker_id);
}

/// Runs the plan on its own task so a panic stays inside it
async fn run_once(worker_id: usize, plan_id: i64, processor: &Arc<dyn PlanProcessor>) {
    info!("Worker {} processing plan {}", worker_id, plan_id);

    let processor = Arc::clone(processor);
    let run = tokio::spawn(async move { processor.process(plan_id).await });

    match run.await {
        Ok(Ok(())) => info!("Worker {} finished plan {}", worker_id, plan_id),
        Ok(Err(e)) => error!("Worker {}: plan {} failed: {}", worker_id, plan_id, e),
        Err(e) => error!("Worker {}: plan {} panicked: {}", worker_id, plan_id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    const PANICKING_PLAN: i64 = 666;

    /// Records every run and the peak overlap per plan
    #[derive(Default)]
    struct Recorder {
        state: Mutex<RecorderState>,
    }

    #[derive(Default)]
    struct RecorderState {
        processed: Vec<i64>,
        running: HashMap<i64, usize>,
        peak: HashMap<i64, usize>,
    }

    #[async_trait]
    impl PlanProcessor for Recorder {
        async fn process(&self, plan_id: i64) -> Result<()> {
            {
                let mut state = self.state.lock().unwrap();
                let running = state.running.entry(plan_id).or_default();
                *running += 1;
                let now = *running;
                let peak = state.peak.entry(plan_id).or_default();
                *peak = (*peak).max(now);
            }

            tokio::time::sleep(Duration::from_millis(30)).await;

            {
                let mut state = self.state.lock().unwrap();
                *state.running.entry(plan_id).or_default() -= 1;
                state.processed.push(plan_id);
            }

            if plan_id < 0 {
                return Err(Error::Validation("negative plan".to_string()));
            }
            if plan_id == PANICKING_PLAN {
                panic!("plan {} blew up", plan_id);
            }
            Ok(())
        }
    }

    async fn wait_for(recorder: &Recorder, count: usize) {
        for _ in 0..200 {
            if recorder.state.lock().unwrap().processed.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {} runs", count);
    }

    #[tokio::test]
    async fn test_every_item_runs_once_and_shutdown_stops_pool() {
        let queue = Arc::new(WorkQueue::new());
        let recorder = Arc::new(Recorder::default());
        let pool = WorkerPool::new(
            Arc::clone(&queue),
            Arc::clone(&recorder) as Arc<dyn PlanProcessor>,
        );
        let (tx, rx) = watch::channel(false);

        for plan_id in [1, 2, 3, -4] {
            queue.add(plan_id);
        }

        let handle = tokio::spawn(async move { pool.run(rx, 3).await });
        wait_for(&recorder, 4).await;

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();

        let mut processed = recorder.state.lock().unwrap().processed.clone();
        processed.sort();
        assert_eq!(processed, vec![-4, 1, 2, 3]);
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_same_plan_never_overlaps() {
        let queue = Arc::new(WorkQueue::new());
        let recorder = Arc::new(Recorder::default());
        let pool = WorkerPool::new(
            Arc::clone(&queue),
            Arc::clone(&recorder) as Arc<dyn PlanProcessor>,
        );
        let (tx, rx) = watch::channel(false);

        queue.add(7);
        queue.add(7);
        queue.add(7);

        let handle = tokio::spawn(async move { pool.run(rx, 3).await });
        wait_for(&recorder, 3).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let state = recorder.state.lock().unwrap();
        assert_eq!(state.processed, vec![7, 7, 7]);
        assert_eq!(state.peak[&7], 1);
    }

    #[tokio::test]
    async fn test_busy_plan_does_not_hold_up_other_plans() {
        let queue = Arc::new(WorkQueue::new());
        let recorder = Arc::new(Recorder::default());
        let pool = WorkerPool::new(
            Arc::clone(&queue),
            Arc::clone(&recorder) as Arc<dyn PlanProcessor>,
        );
        let (tx, rx) = watch::channel(false);

        queue.add(7);
        queue.add(7);
        queue.add(8);

        let handle = tokio::spawn(async move { pool.run(rx, 2).await });
        wait_for(&recorder, 3).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let state = recorder.state.lock().unwrap();
        // Plan 8 finishes while the second run of 7 is still owed
        let mut processed = state.processed.clone();
        assert_eq!(processed.pop(), Some(7));
        processed.sort();
        assert_eq!(processed, vec![7, 8]);
        assert_eq!(state.peak[&7], 1);
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_panicking_run_does_not_lose_the_worker() {
        let queue = Arc::new(WorkQueue::new());
        let recorder = Arc::new(Recorder::default());
        let pool = WorkerPool::new(
            Arc::clone(&queue),
            Arc::clone(&recorder) as Arc<dyn PlanProcessor>,
        );
        let (tx, rx) = watch::channel(false);

        queue.add(PANICKING_PLAN);
        queue.add(2);
        queue.add(PANICKING_PLAN);

        let handle = tokio::spawn(async move { pool.run(rx, 1).await });
        wait_for(&recorder, 3).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let state = recorder.state.lock().unwrap();
        assert_eq!(state.processed, vec![PANICKING_PLAN, 2, PANICKING_PLAN]);
        assert_eq!(queue.in_flight(), 0);
    }
}
