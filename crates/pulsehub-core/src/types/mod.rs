//! Core type definitions used across the pulsehub workspace.

pub mod id;

pub use id::*;
