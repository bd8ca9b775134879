use thiserror::Error;

/// Errors raised by the protocol layer.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("crypto error: {0}")]
    Crypto(String),
}
