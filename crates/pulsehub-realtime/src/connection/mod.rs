//! Live connections: the Session, the registry indexing them, heartbeat
//! timing, and client-frame intake.

pub mod heartbeat;
pub mod inbound;
pub mod registry;
pub mod session;

pub use heartbeat::{HeartbeatConfig, ReadDeadline};
pub use inbound::handle_client_frame;
pub use registry::Registry;
pub use session::{DeliveryOutcome, Session, SessionState};
