//! Time-boxed worker fan-out and counter aggregation
//!
//! [`LoadRunner`] computes one deadline, spawns a flat pool of workers and
//! waits for all of them. Workers only check the deadline at the top of their
//! loop; a batch already in flight is allowed to finish, so a run overshoots
//! its duration by at most the slowest in-flight round trip.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace};

use crate::batch::BatchBuilder;
use crate::executor::{BatchExecutor, OpOutcome};

// Fallback horizon when `now + duration` does not fit in an Instant
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Counters shared by every worker of one run
///
/// Updated with one atomic increment per event, never behind a lock.
#[derive(Debug, Default)]
pub struct RunTotals {
    attempted: AtomicU64,
    failed: AtomicU64,
}

impl RunTotals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one operation outcome from an executed batch
    pub fn record(&self, outcome: &OpOutcome) {
        self.attempted.fetch_add(1, Ordering::Relaxed);
        if outcome.is_failure() {
            self.failed.fetch_add(1, Ordering::Release);
        }
    }

    /// Fold a batch that could not be executed at all
    pub fn record_rejection(&self) {
        self.failed.fetch_add(1, Ordering::Release);
    }

    /// Current values of both counters
    ///
    /// `failed` is loaded first so a snapshot never shows an operation
    /// failure without the attempt recorded before it.
    pub fn snapshot(&self) -> RunSummary {
        let failed = self.failed.load(Ordering::Acquire);
        let attempted = self.attempted.load(Ordering::Relaxed);
        RunSummary { attempted, failed }
    }
}

/// Final totals of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Operation outcomes observed, successful or not
    pub attempted: u64,
    /// Failed operations plus one per rejected batch
    pub failed: u64,
}

impl RunSummary {
    /// `attempted - failed`
    ///
    /// Signed: rejected batches add to `failed` only, so this goes negative
    /// when a store rejects most batches outright.
    pub fn successful(&self) -> i64 {
        self.attempted as i64 - self.failed as i64
    }
}

/// Runs a fixed number of workers against one store for a fixed duration
#[derive(Debug, Clone)]
pub struct LoadRunner {
    workers: usize,
    duration: Duration,
    progress_interval: Option<Duration>,
}

impl LoadRunner {
    pub fn new(workers: usize, duration: Duration) -> Self {
        Self {
            workers,
            duration,
            progress_interval: None,
        }
    }

    /// Log a counter snapshot at `info` every `interval` while the run lasts
    pub fn progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = Some(interval).filter(|i| !i.is_zero());
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Run to completion and return the totals
    pub async fn run<E>(&self, executor: Arc<E>) -> RunSummary
    where
        E: BatchExecutor + ?Sized + 'static,
    {
        self.run_with_totals(executor, Arc::new(RunTotals::new()))
            .await
    }

    /// Run to completion, accumulating into caller-provided counters
    ///
    /// Lets callers watch `totals` while the run is in progress. The returned
    /// summary is taken after every worker has stopped.
    pub async fn run_with_totals<E>(&self, executor: Arc<E>, totals: Arc<RunTotals>) -> RunSummary
    where
        E: BatchExecutor + ?Sized + 'static,
    {
        let start = Instant::now();
        let deadline = start
            .checked_add(self.duration)
            .unwrap_or_else(|| start + FAR_FUTURE);

        debug!(
            "Starting {} workers for {:?}",
            self.workers, self.duration
        );

        let mut workers = JoinSet::new();
        for worker_id in 0..self.workers {
            workers.spawn(worker_loop(
                worker_id,
                Arc::clone(&executor),
                Arc::clone(&totals),
                deadline,
            ));
        }

        let reporter = self
            .progress_interval
            .map(|interval| tokio::spawn(report_progress(Arc::clone(&totals), interval)));

        let mut iterations = 0u64;
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(n) => iterations += n,
                Err(e) => error!("Worker task failed: {}", e),
            }
        }

        if let Some(reporter) = reporter {
            reporter.abort();
        }

        let summary = totals.snapshot();
        debug!(
            iterations,
            attempted = summary.attempted,
            failed = summary.failed,
            elapsed = ?start.elapsed(),
            "Load run finished"
        );
        summary
    }
}

/// Run `workers` workers against `executor` for `duration`
pub async fn run<E>(executor: Arc<E>, workers: usize, duration: Duration) -> RunSummary
where
    E: BatchExecutor + ?Sized + 'static,
{
    LoadRunner::new(workers, duration).run(executor).await
}

/// One worker: build, execute, tally until the deadline
///
/// Returns the number of batches it submitted.
async fn worker_loop<E>(
    worker_id: usize,
    executor: Arc<E>,
    totals: Arc<RunTotals>,
    deadline: Instant,
) -> u64
where
    E: BatchExecutor + ?Sized,
{
    let mut builder = BatchBuilder::new(worker_id);
    let mut iterations = 0u64;

    while Instant::now() < deadline {
        let batch = builder.next_batch();

        match executor.execute(batch).await {
            Ok(outcomes) => {
                for outcome in &outcomes {
                    totals.record(outcome);
                }
            }
            Err(e) => {
                totals.record_rejection();
                trace!(worker_id, "Batch rejected: {}", e);
            }
        }

        iterations += 1;

        // A zero-latency executor never suspends; give the scheduler a turn
        // so the other workers and the deadline check keep running.
        tokio::task::yield_now().await;
    }

    trace!(worker_id, iterations, "Worker stopped");
    iterations
}

async fn report_progress(totals: Arc<RunTotals>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let snapshot = totals.snapshot();
        info!(
            "Progress: {} operations, {} errors",
            snapshot.attempted, snapshot.failed
        );
    }
}
