//! Per-iteration batch construction
//!
//! Every worker owns one [`BatchBuilder`]. Each call formats three fresh keys
//! into buffers the builder reuses, so steady-state iterations do not allocate.
//!
//! # Key layout
//!
//! ```text
//! k{worker_id}-{unix_nanos}        scalar key
//! k{worker_id}-{unix_nanos}:hash   hash key
//! k{worker_id}-{unix_nanos}:list   list key
//! ```
//!
//! The worker id keeps concurrent workers apart even when they read the same
//! clock tick. The `-` separator keeps `(1, 23)` and `(12, 3)` apart.

use std::fmt::Write;
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of operations in every batch
pub const BATCH_SIZE: usize = 4;

const SCALAR_VALUE: &str = "value";
const HASH_FIELDS: &[(&str, &str)] = &[("field1", "value1"), ("field2", "value2")];
const LIST_ITEMS: &[&str] = &["item1", "item2", "item3"];

const HASH_SUFFIX: &str = ":hash";
const LIST_SUFFIX: &str = ":list";

// "k" + u64 digits + "-" + u128 digits + suffix
const KEY_CAPACITY: usize = 72;

/// A single store command inside a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation<'a> {
    /// Set a scalar value with no expiry
    Set { key: &'a str, value: &'static str },
    /// Set named fields on a hash
    HSet {
        key: &'a str,
        fields: &'static [(&'static str, &'static str)],
    },
    /// Prepend items onto a list
    LPush {
        key: &'a str,
        items: &'static [&'static str],
    },
    /// Read a scalar value
    Get { key: &'a str },
}

impl<'a> Operation<'a> {
    /// The key this operation is addressed to
    pub fn key(&self) -> &'a str {
        match *self {
            Operation::Set { key, .. }
            | Operation::HSet { key, .. }
            | Operation::LPush { key, .. }
            | Operation::Get { key } => key,
        }
    }

    /// Command name as sent on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Set { .. } => "SET",
            Operation::HSet { .. } => "HSET",
            Operation::LPush { .. } => "LPUSH",
            Operation::Get { .. } => "GET",
        }
    }
}

/// The keys of one iteration and the fixed operation sequence over them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    scalar_key: String,
    hash_key: String,
    list_key: String,
}

impl Batch {
    fn with_capacity() -> Self {
        Self {
            scalar_key: String::with_capacity(KEY_CAPACITY),
            hash_key: String::with_capacity(KEY_CAPACITY),
            list_key: String::with_capacity(KEY_CAPACITY),
        }
    }

    pub fn scalar_key(&self) -> &str {
        &self.scalar_key
    }

    pub fn hash_key(&self) -> &str {
        &self.hash_key
    }

    pub fn list_key(&self) -> &str {
        &self.list_key
    }

    /// Operations in submission order: SET, HSET, LPUSH, GET
    pub fn operations(&self) -> [Operation<'_>; BATCH_SIZE] {
        [
            Operation::Set {
                key: &self.scalar_key,
                value: SCALAR_VALUE,
            },
            Operation::HSet {
                key: &self.hash_key,
                fields: HASH_FIELDS,
            },
            Operation::LPush {
                key: &self.list_key,
                items: LIST_ITEMS,
            },
            Operation::Get {
                key: &self.scalar_key,
            },
        ]
    }

    pub fn len(&self) -> usize {
        BATCH_SIZE
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Worker-local batch factory
///
/// Holds the worker identity, the scratch key buffers and the last timestamp
/// handed out. Never shared between workers.
#[derive(Debug)]
pub struct BatchBuilder {
    worker_id: usize,
    last_timestamp: Option<u128>,
    batch: Batch,
}

impl BatchBuilder {
    pub fn new(worker_id: usize) -> Self {
        Self {
            worker_id,
            last_timestamp: None,
            batch: Batch::with_capacity(),
        }
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Build the batch for an explicit timestamp
    ///
    /// The result depends only on `(worker_id, timestamp_nanos)`.
    pub fn build_at(&mut self, timestamp_nanos: u128) -> &Batch {
        let batch = &mut self.batch;

        batch.scalar_key.clear();
        // Formatting into a String is infallible
        let _ = write!(batch.scalar_key, "k{}-{}", self.worker_id, timestamp_nanos);

        batch.hash_key.clear();
        batch.hash_key.push_str(&batch.scalar_key);
        batch.hash_key.push_str(HASH_SUFFIX);

        batch.list_key.clear();
        batch.list_key.push_str(&batch.scalar_key);
        batch.list_key.push_str(LIST_SUFFIX);

        &self.batch
    }

    /// Build the batch for the current wall-clock time
    ///
    /// If the clock has not moved since the previous call the timestamp is
    /// bumped by one nanosecond, so a worker never reuses a key.
    pub fn next_batch(&mut self) -> &Batch {
        let mut now = unix_nanos();
        if let Some(last) = self.last_timestamp {
            if now <= last {
                now = last + 1;
            }
        }
        self.last_timestamp = Some(now);
        self.build_at(now)
    }
}

/// Nanoseconds since the Unix epoch, or 0 if the clock is set before it
pub fn unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_key_layout() {
        let mut builder = BatchBuilder::new(7);
        let batch = builder.build_at(1_700_000_000_123_456_789);

        assert_eq!(batch.scalar_key(), "k7-1700000000123456789");
        assert_eq!(batch.hash_key(), "k7-1700000000123456789:hash");
        assert_eq!(batch.list_key(), "k7-1700000000123456789:list");
    }

    #[test]
    fn test_operation_sequence() {
        let mut builder = BatchBuilder::new(3);
        let batch = builder.build_at(42);
        let ops = batch.operations();

        assert_eq!(ops.len(), BATCH_SIZE);
        assert_eq!(
            ops[0],
            Operation::Set {
                key: "k3-42",
                value: "value"
            }
        );
        assert_eq!(
            ops[1],
            Operation::HSet {
                key: "k3-42:hash",
                fields: &[("field1", "value1"), ("field2", "value2")]
            }
        );
        assert_eq!(
            ops[2],
            Operation::LPush {
                key: "k3-42:list",
                items: &["item1", "item2", "item3"]
            }
        );
        assert_eq!(ops[3], Operation::Get { key: "k3-42" });

        let names: Vec<_> = ops.iter().map(Operation::name).collect();
        assert_eq!(names, ["SET", "HSET", "LPUSH", "GET"]);
    }

    #[test]
    fn test_build_at_is_idempotent() {
        let mut a = BatchBuilder::new(11);
        let mut b = BatchBuilder::new(11);

        let first = a.build_at(987_654_321).clone();
        let second = a.build_at(987_654_321).clone();
        let other_builder = b.build_at(987_654_321).clone();

        assert_eq!(first, second);
        assert_eq!(first, other_builder);
        assert_eq!(first.operations(), second.operations());
    }

    #[test]
    fn test_same_tick_different_workers() {
        let tick = 1_000_000_000_000;
        let keys: HashSet<String> = (0..1000)
            .map(|id| BatchBuilder::new(id).build_at(tick).scalar_key().to_string())
            .collect();

        assert_eq!(keys.len(), 1000);
    }

    #[test]
    fn test_separator_prevents_digit_collisions() {
        let a = BatchBuilder::new(1).build_at(23).scalar_key().to_string();
        let b = BatchBuilder::new(12).build_at(3).scalar_key().to_string();

        assert_ne!(a, b);
    }

    #[test]
    fn test_next_batch_never_repeats_keys() {
        let mut builder = BatchBuilder::new(0);
        let mut seen = HashSet::new();

        for _ in 0..10_000 {
            let key = builder.next_batch().scalar_key().to_string();
            assert!(seen.insert(key), "worker reused a key");
        }
    }

    #[test]
    fn test_buffers_are_reused() {
        let mut builder = BatchBuilder::new(5);
        let ptr = builder.build_at(1).scalar_key().as_ptr();

        for ts in 2..100 {
            builder.build_at(ts);
        }

        assert_eq!(builder.build_at(100).scalar_key().as_ptr(), ptr);
    }

    #[test]
    fn test_operation_keys() {
        let mut builder = BatchBuilder::new(2);
        let batch = builder.build_at(9);
        let keys: Vec<_> = batch.operations().iter().map(Operation::key).collect();

        assert_eq!(keys, ["k2-9", "k2-9:hash", "k2-9:list", "k2-9"]);
    }
}
