//! Privacy-scoped audience resolution for feed events.

pub mod classifier;

pub use classifier::{Audience, FanoutPlan, PrivacyClassifier};
