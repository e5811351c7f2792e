//! Real-time vessel feed ingestion, merging, caching, and validation core
//! for a port digital-twin. Ingests the four vessel XML feeds, normalizes
//! timestamps and categories, merges with status precedence, serves through
//! a TTL cache kept fresh by a file watcher and periodic scheduler guarded
//! by a circuit breaker, and cross-references against historical container
//! throughput.

pub mod analysis;
pub mod breaker;
pub mod cache;
pub mod categorize;
pub mod config;
pub mod crossref;
pub mod error;
pub mod loader;
pub mod manager;
pub mod merge;
pub mod model;
pub mod parser;
pub mod scheduler;
pub mod throughput;
pub mod timestamp;
pub mod validate;
pub mod watcher;

pub use config::VesselCoreConfig;
pub use manager::RealTimeManager;
pub use model::{FeedFrame, FeedId, MergedVesselView, Status, VesselRecord};
