// src/services/mod.rs
pub mod feed;
pub mod metrics;
pub mod query;
pub mod sample;
pub mod scheduler;
pub mod store;
pub mod suitability;
