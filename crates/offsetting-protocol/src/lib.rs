//! Offsetting Protocol - accounts, signed claims and wire messages
//!
//! Implements the message shapes exchanged with the offsetting agent over
//! the pub/sub bus, the dict-literal payload codec, and Ed25519 account
//! handling used to sign offset claims.

pub mod claim;
pub mod codec;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod messages;

pub use claim::{technics_digest, verify_claim_signature, ClaimSigner};
pub use constants::*;
pub use crypto::Account;
pub use error::*;
pub use messages::*;
