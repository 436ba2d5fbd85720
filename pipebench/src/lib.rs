//! # pipebench
//!
//! A fixed-duration load harness for key-value stores that speak a
//! request/response protocol with pipelining.
//!
//! ## How a run works
//!
//! A [`LoadRunner`] spawns a flat pool of workers. Every worker loops until a
//! shared deadline passes:
//!
//! 1. build a [`Batch`] of four operations addressed to fresh keys,
//! 2. hand it to a [`BatchExecutor`] as one network round trip,
//! 3. fold the outcome into two shared atomic counters.
//!
//! When every worker has stopped the runner returns a [`RunSummary`] with the
//! number of operation outcomes observed (`attempted`) and the number of
//! failures (`failed`).
//!
//! ## Counting rules
//!
//! - An operation that executed adds one to `attempted`, and one to `failed`
//!   if the store reported an error for it.
//! - A batch the executor could not run at all (connection refused, timeout)
//!   adds one to `failed` and nothing to `attempted`.
//!
//! The runner never retries and never returns an error: failures are the
//! measurement.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use async_trait::async_trait;
//! use pipebench::{Batch, BatchExecutor, LoadRunner, OpOutcome};
//!
//! struct Noop;
//!
//! #[async_trait]
//! impl BatchExecutor for Noop {
//!     type Error = std::io::Error;
//!
//!     async fn execute(&self, batch: &Batch) -> Result<Vec<OpOutcome>, Self::Error> {
//!         Ok(vec![OpOutcome::Success; batch.len()])
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let summary = LoadRunner::new(4, Duration::from_millis(20))
//!     .run(Arc::new(Noop))
//!     .await;
//! assert_eq!(summary.failed, 0);
//! assert_eq!(summary.attempted % 4, 0);
//! # }
//! ```

pub mod batch;
pub mod executor;
pub mod runner;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;


pub use batch::{BATCH_SIZE, Batch, BatchBuilder, Operation};
pub use executor::{BatchExecutor, OpOutcome};
pub use runner::{LoadRunner, RunSummary, RunTotals, run};
