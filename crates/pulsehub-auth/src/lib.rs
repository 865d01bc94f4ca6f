//! # pulsehub-auth
//!
//! Verifies the access tokens clients present when opening a Session.
//! Tokens are issued elsewhere on the platform; this crate only decodes
//! them and honours the shared revocation list.

pub mod jwt;

pub use jwt::{Claims, JwtDecoder, TokenType};
