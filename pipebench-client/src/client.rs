use async_trait::async_trait;
use bytes::BytesMut;
use pipebench::{Batch, BatchExecutor, OpOutcome};
use std::net::ToSocketAddrs;
use std::time::Duration;
use tracing::{debug, warn};

use crate::command::{Command, encode_operation};
use crate::error::{ClientError, Result};
use crate::pool::{ConnectionPool, PoolConfig, PoolStats};
use crate::resp::RespValue;

/// Builder for creating a StoreClient
#[derive(Default)]
pub struct ClientBuilder {
    pool_config: PoolConfig,
}

impl ClientBuilder {
    /// Create a new client builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing pool configuration
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Set maximum number of connections in use at once
    pub fn max_connections(mut self, max: usize) -> Self {
        self.pool_config.max_size = max;
        self
    }

    /// Set number of connections opened before the first request
    pub fn min_idle_connections(mut self, min: usize) -> Self {
        self.pool_config.min_idle = min;
        self
    }

    /// Set retries for pipelines that failed at the transport level
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.pool_config.max_retries = retries;
        self
    }

    /// Set connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.connect_timeout = timeout;
        self
    }

    /// Set read timeout (0 means no timeout)
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.read_timeout = timeout;
        self
    }

    /// Set write timeout (0 means no timeout)
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.write_timeout = timeout;
        self
    }

    /// Set how long a request waits for a free connection
    pub fn pool_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.pool_timeout = timeout;
        self
    }

    /// Set idle connection timeout (0 means no timeout)
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.idle_timeout = timeout;
        self
    }

    /// Set how often idle connections are checked for expiry
    pub fn idle_check_frequency(mut self, frequency: Duration) -> Self {
        self.pool_config.idle_check_frequency = frequency;
        self
    }

    /// Enable or disable TCP nodelay
    pub fn tcp_nodelay(mut self, nodelay: bool) -> Self {
        self.pool_config.tcp_nodelay = nodelay;
        self
    }

    /// Authenticate every connection with `AUTH password`
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.pool_config.password = Some(password.into());
        self
    }

    /// Build the client with the given address
    ///
    /// Fails if the address does not resolve. An unreachable store is not an
    /// error here: the pool logs a warning and every request fails later.
    pub async fn build(self, addr: impl ToSocketAddrs) -> Result<StoreClient> {
        let addr = addr
            .to_socket_addrs()
            .map_err(|e| ClientError::InvalidAddress(e.to_string()))?
            .next()
            .ok_or_else(|| ClientError::InvalidAddress("address resolved to nothing".to_string()))?;

        let pool = ConnectionPool::new(addr, self.pool_config);

        match pool.warm_up().await {
            Ok(opened) => debug!("Pre-warmed {} connections to {}", opened, addr),
            Err(e) => warn!("Could not pre-warm connections to {}: {}", addr, e),
        }
        pool.spawn_reaper();

        Ok(StoreClient { pool })
    }
}

/// Pipelining client for a RESP store
#[derive(Clone)]
pub struct StoreClient {
    pool: ConnectionPool,
}

impl StoreClient {
    /// Create a new client with default configuration
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        ClientBuilder::new().build(addr).await
    }

    /// Create a new client builder for advanced configuration
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Send commands as one pipeline
    ///
    /// The outer `Result` covers the round trip; each inner one is the
    /// store's answer to one command.
    pub async fn pipeline(
        &self,
        commands: &[Command],
    ) -> Result<Vec<std::result::Result<RespValue, String>>> {
        let mut request = BytesMut::new();
        for command in commands {
            command.encode(&mut request);
        }

        let replies = self.send(&request, commands.len()).await?;
        Ok(replies
            .into_iter()
            .map(|reply| match reply {
                RespValue::Error(message) => Err(message),
                other => Ok(other),
            })
            .collect())
    }

    /// Round-trip a `PING`
    pub async fn ping(&self) -> Result<()> {
        let mut replies = self.pipeline(&[Command::new("PING")]).await?;
        match replies.pop() {
            Some(Ok(_)) => Ok(()),
            Some(Err(message)) => Err(ClientError::Protocol(message)),
            None => Err(ClientError::ConnectionClosed),
        }
    }

    /// Close idle connections; later requests fail with `PoolClosed`
    pub fn close(&self) {
        self.pool.close();
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    async fn send(&self, request: &[u8], expected: usize) -> Result<Vec<RespValue>> {
        let retries = self.pool.config().max_retries;
        let mut attempt = 0;
        loop {
            match self.pool.pipeline(request, expected).await {
                Err(e) if attempt < retries && e.is_retryable() => {
                    attempt += 1;
                    debug!("Retrying pipeline ({}/{}): {}", attempt, retries, e);
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl BatchExecutor for StoreClient {
    type Error = ClientError;

    async fn execute(&self, batch: &Batch) -> Result<Vec<OpOutcome>> {
        let operations = batch.operations();
        let mut request = BytesMut::with_capacity(256);
        for op in &operations {
            encode_operation(&mut request, op);
        }

        let replies = self.send(&request, operations.len()).await?;
        Ok(replies
            .into_iter()
            .map(|reply| match reply {
                RespValue::Error(message) => OpOutcome::Failure(message),
                _ => OpOutcome::Success,
            })
            .collect())
    }
}
