//! Multi-source price oracle
//!
//! Features:
//! - Concurrent fan-out to on-chain, streaming and REST sources
//! - Quality filtering and weighted/median aggregation
//! - Freshness-bounded cache with hit-count eviction
//! - Fast and slow maintenance cadences
//! - Request, cache and error metrics

pub mod aggregator;
pub mod cache;
pub mod filter;
pub mod metrics;
pub mod oracle;
pub mod scheduler;
pub mod sources;

pub use aggregator::Aggregator;
pub use cache::{CacheEntry, CacheStats, PriceCache};
pub use filter::{QualityFilter, Rejection};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use oracle::{PairPrice, PriceOracle};
pub use scheduler::{ScheduledWork, UpdateScheduler};
pub use sources::{build_adapters, SourceAdapter};
