//! Core traits defined in `pulsehub-core` and implemented by other crates.

pub mod cache;
pub mod collaborators;
pub mod pubsub;

pub use cache::CacheProvider;
pub use collaborators::{
    ContentRepository, ContentSummary, CounterpartLookup, GroupDirectory, MessageRepository,
    RelationshipLookup, StoredMessage,
};
pub use pubsub::PubSubProvider;
