//! Deterministic in-memory executors
//!
//! Enabled for this crate's tests and, through the `test-utils` feature, for
//! downstream test suites. A [`FakeExecutor`] never touches the network; it
//! answers every batch according to a fixed [`Behavior`] and keeps counts so
//! tests can compare the runner's totals with what actually happened.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::batch::Batch;
use crate::executor::{BatchExecutor, OpOutcome};

/// How a [`FakeExecutor`] answers
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Every operation succeeds
    Succeed,
    /// Every batch is rejected as a whole
    Reject,
    /// The batch executes; operations at these indices fail
    FailOps(Vec<usize>),
    /// Every n-th call (1-based) is rejected, the rest succeed
    RejectEvery(u64),
}

/// Batch-level failure produced by [`FakeExecutor`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeRejection;

impl fmt::Display for FakeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("batch rejected by fake executor")
    }
}

impl std::error::Error for FakeRejection {}

/// Scripted executor for runner tests
#[derive(Debug)]
pub struct FakeExecutor {
    behavior: Behavior,
    latency: Option<Duration>,
    calls: AtomicU64,
    rejected: AtomicU64,
    record_keys: bool,
    keys: Mutex<Vec<String>>,
}

impl FakeExecutor {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            latency: None,
            calls: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            record_keys: false,
            keys: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(Behavior::Succeed)
    }

    pub fn rejecting() -> Self {
        Self::new(Behavior::Reject)
    }

    /// Sleep this long inside every call, simulating a network round trip
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Remember the scalar key of every batch seen
    pub fn recording_keys(mut self) -> Self {
        self.record_keys = true;
        self
    }

    /// Number of `execute` calls that completed
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Acquire)
    }

    /// Number of calls answered with a rejection
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Acquire)
    }

    /// Scalar keys seen so far, in arrival order
    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().clone()
    }

    /// Number of distinct scalar keys seen so far
    pub fn distinct_keys(&self) -> usize {
        self.keys.lock().iter().collect::<HashSet<_>>().len()
    }
}

#[async_trait]
impl BatchExecutor for FakeExecutor {
    type Error = FakeRejection;

    async fn execute(&self, batch: &Batch) -> Result<Vec<OpOutcome>, Self::Error> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self.record_keys {
            self.keys.lock().push(batch.scalar_key().to_string());
        }

        let call = self.calls.fetch_add(1, Ordering::AcqRel) + 1;

        let reject = match &self.behavior {
            Behavior::Reject => true,
            Behavior::RejectEvery(n) => *n > 0 && call % n == 0,
            Behavior::Succeed | Behavior::FailOps(_) => false,
        };
        if reject {
            self.rejected.fetch_add(1, Ordering::AcqRel);
            return Err(FakeRejection);
        }

        let outcomes = (0..batch.len())
            .map(|index| match &self.behavior {
                Behavior::FailOps(failing) if failing.contains(&index) => {
                    OpOutcome::Failure(format!("ERR injected failure at {index}"))
                }
                _ => OpOutcome::Success,
            })
            .collect();
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchBuilder;

    #[test]
    fn test_succeeding_executor() {
        let fake = FakeExecutor::succeeding();
        let mut builder = BatchBuilder::new(0);

        let outcomes = tokio_test::block_on(fake.execute(builder.build_at(1))).unwrap();
        assert_eq!(outcomes, vec![OpOutcome::Success; 4]);
        assert_eq!(fake.calls(), 1);
        assert_eq!(fake.rejected(), 0);
    }

    #[test]
    fn test_fail_ops_marks_selected_indices() {
        let fake = FakeExecutor::new(Behavior::FailOps(vec![1, 3]));
        let mut builder = BatchBuilder::new(0);

        let outcomes = tokio_test::block_on(fake.execute(builder.build_at(1))).unwrap();
        let failures: Vec<bool> = outcomes.iter().map(OpOutcome::is_failure).collect();
        assert_eq!(failures, [false, true, false, true]);
    }

    #[test]
    fn test_reject_every_third_call() {
        let fake = FakeExecutor::new(Behavior::RejectEvery(3));
        let mut builder = BatchBuilder::new(0);

        let results: Vec<bool> = (0..9)
            .map(|ts| tokio_test::block_on(fake.execute(builder.build_at(ts))).is_err())
            .collect();

        assert_eq!(
            results,
            [false, false, true, false, false, true, false, false, true]
        );
        assert_eq!(fake.calls(), 9);
        assert_eq!(fake.rejected(), 3);
    }

    #[test]
    fn test_records_keys() {
        let fake = FakeExecutor::rejecting().recording_keys();
        let mut builder = BatchBuilder::new(4);

        let _ = tokio_test::block_on(fake.execute(builder.build_at(10)));
        let _ = tokio_test::block_on(fake.execute(builder.build_at(11)));

        assert_eq!(fake.keys(), ["k4-10", "k4-11"]);
        assert_eq!(fake.distinct_keys(), 2);
    }
}
