//! Offsetting Network - pub/sub transport adapters
//!
//! The bus offers no request/response pairing and no delivery guarantee.
//! This crate only moves payload bytes: connect-and-publish, and
//! subscriptions whose listening loop runs on its own task so the caller's
//! scheduler is never blocked.

pub mod error;
pub mod memory;
pub mod rpc;
pub mod transport;

pub use error::NetworkError;
pub use memory::MemoryBus;
pub use rpc::{RpcPubSub, RpcPubSubConfig};
pub use transport::{Flow, MessageHandler, PubSub, SubscriptionHandle};
