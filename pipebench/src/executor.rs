//! The store capability the runner drives
//!
//! The runner only needs "execute this batch as one round trip and tell me
//! what happened to each operation". Network clients implement
//! [`BatchExecutor`]; tests use the fakes in [`crate::testing`].

use async_trait::async_trait;
use std::sync::Arc;

use crate::batch::Batch;

/// Result of one operation inside an executed batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpOutcome {
    Success,
    /// The store rejected this operation; carries the store's reason
    Failure(String),
}

impl OpOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, OpOutcome::Failure(_))
    }
}

/// Executes a batch as a single pipelined round trip
///
/// `Ok` must carry one outcome per operation, in submission order. `Err`
/// means the batch as a whole could not be executed (connection failure,
/// timeout, pool exhaustion).
#[async_trait]
pub trait BatchExecutor: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn execute(&self, batch: &Batch) -> Result<Vec<OpOutcome>, Self::Error>;
}

#[async_trait]
impl<T: BatchExecutor + ?Sized> BatchExecutor for Arc<T> {
    type Error = T::Error;

    async fn execute(&self, batch: &Batch) -> Result<Vec<OpOutcome>, Self::Error> {
        (**self).execute(batch).await
    }
}
