//! # pulsehub-cache
//!
//! Shared-store providers for pulsehub. The same backend holds presence
//! records, pending lists and cached message bodies, and carries the
//! cross-instance broadcast channel.
//!
//! - **memory**: In-process store using [moka](https://crates.io/crates/moka)
//!   and a tokio broadcast channel (single instance only)
//! - **redis**: Redis-backed store and pub/sub using the
//!   [redis](https://crates.io/crates/redis) crate
//!
//! The provider is selected at runtime based on configuration.

pub mod keys;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use provider::CacheManager;
