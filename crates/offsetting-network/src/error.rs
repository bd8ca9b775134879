use thiserror::Error;

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("subscribe failed: {0}")]
    Subscribe(String),
}
