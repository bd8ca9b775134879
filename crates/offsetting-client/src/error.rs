use std::time::Duration;

use offsetting_network::NetworkError;
use offsetting_protocol::ProtocolError;
use offsetting_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("no response on '{topic}' within {after:?}")]
    Timeout { topic: String, after: Duration },

    #[error("a request on '{0}' is already in flight")]
    RequestInFlight(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unusable energy usage: {0}")]
    InvalidUsage(String),
}

impl ClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout { .. })
    }
}
