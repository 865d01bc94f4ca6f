//! # pulsehub-core
//!
//! Core crate for pulsehub, the real-time delivery hub. Contains the
//! configuration schema, typed identifiers, the inbound/outbound event
//! contract, the collaborator and shared-store traits, and the unified
//! error system.
//!
//! This crate has **no** internal dependencies on other pulsehub crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
