//! A single pipelined RESP connection

use bytes::{Buf, BytesMut};
use std::future::Future;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::command::Command;
use crate::error::{ClientError, Result};
use crate::pool::PoolConfig;
use crate::resp::{RespParser, RespValue};

const READ_BUFFER_SIZE: usize = 4 * 1024;
const MAX_READ_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// A TCP connection that sends whole pipelines and reads their replies
pub struct Connection {
    stream: TcpStream,
    read_buf: BytesMut,
    parser: RespParser,
    last_used: Instant,
}

impl Connection {
    /// Open a connection and authenticate if a password is configured
    pub async fn connect(addr: SocketAddr, config: &PoolConfig) -> Result<Self> {
        let stream = with_timeout(config.connect_timeout, async {
            TcpStream::connect(addr).await.map_err(ClientError::from)
        })
        .await?;

        if config.tcp_nodelay {
            stream.set_nodelay(true)?;
        }

        let mut conn = Connection {
            stream,
            read_buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            parser: RespParser::new(),
            last_used: Instant::now(),
        };

        if let Some(password) = &config.password {
            conn.authenticate(password, config).await?;
        }

        debug!("Opened connection to {}", addr);
        Ok(conn)
    }

    async fn authenticate(&mut self, password: &str, config: &PoolConfig) -> Result<()> {
        let mut request = BytesMut::new();
        Command::new("AUTH").arg(password).encode(&mut request);

        let replies = self.pipeline(&request, 1, config).await?;
        match replies.into_iter().next() {
            Some(RespValue::Error(message)) => Err(ClientError::Auth(message)),
            Some(_) => Ok(()),
            None => Err(ClientError::ConnectionClosed),
        }
    }

    /// Write an encoded pipeline and read exactly `expected` replies
    ///
    /// Error replies are returned as [`RespValue::Error`]; only transport and
    /// framing problems produce `Err`. After an `Err` the connection state is
    /// unknown and it must not be reused.
    pub async fn pipeline(
        &mut self,
        request: &[u8],
        expected: usize,
        config: &PoolConfig,
    ) -> Result<Vec<RespValue>> {
        let stream = &mut self.stream;
        with_timeout(config.write_timeout, async move {
            stream.write_all(request).await?;
            stream.flush().await.map_err(ClientError::from)
        })
        .await?;

        let mut replies = Vec::with_capacity(expected);
        with_timeout(config.read_timeout, self.read_replies(&mut replies, expected)).await?;

        self.last_used = Instant::now();
        Ok(replies)
    }

    async fn read_replies(&mut self, replies: &mut Vec<RespValue>, expected: usize) -> Result<()> {
        while replies.len() < expected {
            if let Some((value, consumed)) = self.parser.parse(&self.read_buf)? {
                self.read_buf.advance(consumed);
                replies.push(value);
                continue;
            }

            if self.read_buf.len() > MAX_READ_BUFFER_SIZE {
                return Err(ClientError::Protocol(
                    "Reply exceeds read buffer limit".to_string(),
                ));
            }

            self.read_buf.reserve(READ_BUFFER_SIZE);
            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(ClientError::ConnectionClosed);
            }
        }
        Ok(())
    }

    /// Time since the last completed pipeline
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used)
    }
}

/// Apply a timeout; `Duration::ZERO` disables it
async fn with_timeout<T>(limit: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    if limit.is_zero() {
        return fut.await;
    }
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| ClientError::Timeout)?
}
