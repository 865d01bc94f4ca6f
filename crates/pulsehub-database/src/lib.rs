//! # pulsehub-database
//!
//! PostgreSQL connection management and the repository adapters that
//! answer the hub's collaborator lookups (relationships, group
//! membership, chat messages, feed content, marketplace counterparts).
//!
//! The schema is owned by the platform; this crate only reads it and
//! stamps delivery acknowledgments.

pub mod connection;
pub mod repositories;

pub use connection::DatabasePool;
