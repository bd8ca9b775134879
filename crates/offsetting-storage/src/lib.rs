//! Offsetting Storage - content-addressed staging
//!
//! Claim technics are uploaded to a content-addressed store before a claim
//! is signed; the returned CID is what the claim references.

pub mod error;
pub mod gateway;
pub mod ipfs;
pub mod memory;
pub mod store;

pub use error::StorageError;
pub use gateway::{gateway_url, GatewayAuth};
pub use ipfs::IpfsGateway;
pub use memory::MemoryStore;
pub use store::{stage, ContentStore};
