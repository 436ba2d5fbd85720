//! Bounded connection pool
//!
//! A semaphore caps the number of connections in use; idle connections wait
//! in a LIFO stack so the warmest socket is reused first. A background reaper
//! closes connections that have been idle longer than `idle_timeout`.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, timeout};
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::resp::RespValue;

/// Pool and socket tunables
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Maximum number of connections in use at once
    pub max_size: usize,
    /// Connections opened up front by [`ConnectionPool::warm_up`]
    pub min_idle: usize,
    /// Extra attempts for a pipeline that failed at the transport level
    pub max_retries: usize,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// How long to wait for a free connection slot
    pub pool_timeout: Duration,
    /// Idle connections older than this are closed (zero keeps them forever)
    pub idle_timeout: Duration,
    /// How often the reaper looks for expired idle connections
    pub idle_check_frequency: Duration,
    pub tcp_nodelay: bool,
    /// Sent with `AUTH` on every new connection
    pub password: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            min_idle: 2_000,
            max_retries: 0,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_millis(25),
            write_timeout: Duration::from_millis(25),
            pool_timeout: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(15),
            idle_check_frequency: Duration::from_secs(15),
            tcp_nodelay: true,
            password: None,
        }
    }
}

struct PoolInner {
    addr: SocketAddr,
    config: PoolConfig,
    idle: Mutex<VecDeque<Connection>>,
    slots: Arc<Semaphore>,
}

impl PoolInner {
    fn is_expired(&self, conn: &Connection, now: Instant) -> bool {
        !self.config.idle_timeout.is_zero() && conn.idle_for(now) >= self.config.idle_timeout
    }

    fn take_idle(&self) -> Option<Connection> {
        let now = Instant::now();
        let mut idle = self.idle.lock();
        while let Some(conn) = idle.pop_back() {
            if !self.is_expired(&conn, now) {
                return Some(conn);
            }
        }
        None
    }

    fn checkin(&self, conn: Connection) {
        let mut idle = self.idle.lock();
        if idle.len() < self.config.max_size {
            idle.push_back(conn);
        }
    }

    fn reap(&self) -> usize {
        let now = Instant::now();
        let mut idle = self.idle.lock();
        let before = idle.len();
        idle.retain(|conn| !self.is_expired(conn, now));
        before - idle.len()
    }
}

/// Shared handle to a pool of connections to one address
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    pub fn new(addr: SocketAddr, config: PoolConfig) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_size.min(Semaphore::MAX_PERMITS)));
        Self {
            inner: Arc::new(PoolInner {
                addr,
                idle: Mutex::new(VecDeque::with_capacity(config.min_idle)),
                config,
                slots,
            }),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.inner.addr
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Open `min_idle` connections concurrently
    ///
    /// Returns how many were opened. Fails only if none could be opened.
    pub async fn warm_up(&self) -> Result<usize> {
        let target = self.inner.config.min_idle.min(self.inner.config.max_size);
        if target == 0 {
            return Ok(0);
        }

        let mut tasks = JoinSet::new();
        for _ in 0..target {
            let inner = Arc::clone(&self.inner);
            tasks.spawn(async move { Connection::connect(inner.addr, &inner.config).await });
        }

        let mut opened = 0;
        let mut first_error = None;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Ok(conn)) => {
                    self.inner.checkin(conn);
                    opened += 1;
                }
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => warn!("Warm-up task failed: {}", e),
            }
        }

        match first_error {
            Some(e) if opened == 0 => Err(e),
            Some(e) => {
                warn!(
                    "Opened {} of {} idle connections to {}: {}",
                    opened, target, self.inner.addr, e
                );
                Ok(opened)
            }
            None => Ok(opened),
        }
    }

    /// Start the idle-connection reaper
    ///
    /// The task holds a weak reference and exits once the pool is dropped.
    pub fn spawn_reaper(&self) {
        let config = &self.inner.config;
        if config.idle_timeout.is_zero() || config.idle_check_frequency.is_zero() {
            return;
        }

        let pool: Weak<PoolInner> = Arc::downgrade(&self.inner);
        let period = config.idle_check_frequency;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(pool) = pool.upgrade() else {
                    break;
                };
                let closed = pool.reap();
                if closed > 0 {
                    debug!("Closed {} idle connections to {}", closed, pool.addr);
                }
            }
        });
    }

    /// Send an encoded pipeline on a pooled connection
    ///
    /// The connection goes back to the pool only if the exchange completed;
    /// after a transport error or timeout it is dropped.
    pub async fn pipeline(&self, request: &[u8], expected: usize) -> Result<Vec<RespValue>> {
        let config = &self.inner.config;

        let acquire = Arc::clone(&self.inner.slots).acquire_owned();
        let slot = if config.pool_timeout.is_zero() {
            acquire.await
        } else {
            timeout(config.pool_timeout, acquire)
                .await
                .map_err(|_| ClientError::PoolTimeout)?
        };
        let _slot = slot.map_err(|_| ClientError::PoolClosed)?;

        let mut conn = match self.inner.take_idle() {
            Some(conn) => conn,
            None => Connection::connect(self.inner.addr, config).await?,
        };

        match conn.pipeline(request, expected, config).await {
            Ok(replies) => {
                self.inner.checkin(conn);
                Ok(replies)
            }
            Err(e) => {
                debug!("Dropping connection to {}: {}", self.inner.addr, e);
                Err(e)
            }
        }
    }

    /// Close every idle connection and refuse further checkouts
    pub fn close(&self) {
        self.inner.slots.close();
        self.inner.idle.lock().clear();
    }

    pub fn stats(&self) -> PoolStats {
        let config = &self.inner.config;
        let available = self.inner.slots.available_permits();
        PoolStats {
            idle_connections: self.inner.idle.lock().len(),
            in_use: config.max_size.saturating_sub(available),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub idle_connections: usize,
    pub in_use: usize,
}
