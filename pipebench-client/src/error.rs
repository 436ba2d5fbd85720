use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timeout")]
    Timeout,

    #[error("Timed out waiting for a pooled connection")]
    PoolTimeout,

    #[error("Connection pool closed")]
    PoolClosed,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl ClientError {
    /// Whether the request may succeed on a fresh connection
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_) | ClientError::Timeout | ClientError::ConnectionClosed
        )
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
