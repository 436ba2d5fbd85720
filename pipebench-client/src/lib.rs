//! Pipelined RESP client for pipebench
//!
//! This crate provides an async client that sends whole batches of commands
//! to a Redis-compatible store in one round trip, over a bounded pool of TCP
//! connections. [`StoreClient`] implements [`pipebench::BatchExecutor`], so it
//! can be handed straight to a [`pipebench::LoadRunner`].

pub mod client;
pub mod command;
pub mod connection;
pub mod error;
pub mod pool;
pub mod resp;

pub use client::{ClientBuilder, StoreClient};
pub use command::Command;
pub use error::{ClientError, Result};
pub use pool::{ConnectionPool, PoolConfig, PoolStats};
pub use resp::{RespParser, RespSerializer, RespValue};

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
