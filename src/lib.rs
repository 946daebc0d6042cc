pub mod concurrency;
pub mod config;
pub mod discover;
pub mod display;
pub mod e2e;
pub mod errors;
pub mod generator;
pub mod latency_table;
pub mod merge;
pub mod stats;
pub mod store;
pub mod sweep;
pub mod types;
