//! Presence: the shared online/offline record and relationship-scoped
//! notification.

pub mod status;
pub mod tracker;

pub use status::PresenceStore;
pub use tracker::PresenceTracker;
