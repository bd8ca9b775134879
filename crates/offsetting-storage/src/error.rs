use thiserror::Error;

/// Failures while staging a document. None of them are retried.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid gateway endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("gateway unreachable: {0}")]
    Connect(String),

    #[error("gateway rejected credentials (HTTP {0})")]
    Unauthorized(u16),

    #[error("gateway returned HTTP {status}: {body}")]
    Gateway { status: u16, body: String },

    #[error("malformed document: {0}")]
    Document(String),

    #[error("malformed gateway response: {0}")]
    InvalidResponse(String),

    #[error("credentials unavailable: {0}")]
    Credentials(String),
}
