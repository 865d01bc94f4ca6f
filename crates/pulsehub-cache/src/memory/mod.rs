//! In-memory store and broadcast channel for single-instance deployments.

pub mod pubsub;
pub mod store;

pub use pubsub::MemoryPubSub;
pub use store::MemoryCacheProvider;
