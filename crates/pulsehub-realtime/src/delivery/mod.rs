//! Recipient resolution and live/offline delivery.

pub mod engine;

pub use engine::{DeliveryEngine, DispatchReport, Provenance};
