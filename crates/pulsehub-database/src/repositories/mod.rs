//! Repository adapters implementing the core collaborator traits.

pub mod content;
pub mod group;
pub mod marketplace;
pub mod message;
pub mod relationship;

pub use content::FeedContentRepository;
pub use group::GroupRepository;
pub use marketplace::MarketplaceRepository;
pub use message::ChatMessageRepository;
pub use relationship::RelationshipRepository;
