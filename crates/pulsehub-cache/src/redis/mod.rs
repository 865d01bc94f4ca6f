//! Redis store and broadcast provider.

pub mod client;
pub mod operations;
pub mod pubsub;

pub use client::RedisClient;
pub use operations::RedisCacheProvider;
pub use pubsub::RedisPubSub;
