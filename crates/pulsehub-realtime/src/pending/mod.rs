//! Offline queue: message identifiers waiting for a disconnected owner,
//! the body cache they are resolved against, and the reconnect drain.

pub mod content;
pub mod drain;
pub mod queue;

pub use content::MessageCache;
pub use drain::{DrainReport, PendingDrainer};
pub use queue::{OwnerKey, PendingQueue};
