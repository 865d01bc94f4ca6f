//! JWT claims and validation.

pub mod claims;
pub mod decoder;

pub use claims::{Claims, TokenType};
pub use decoder::JwtDecoder;
