//! Wire handling for inbound payloads and client frames.

pub mod frame;
pub mod serializer;
pub mod validator;

pub use frame::{CallSignalFrame, ClientFrame, TypingFrame};
pub use serializer::{decode_client_frame, decode_inbound_value};
pub use validator::validate_frame;
