//! Request/response metrics
//!
//! Mutated only by oracle operations, under the oracle's lock.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Latency samples kept before compaction
pub const LATENCY_WINDOW: usize = 1_000;
/// Most recent samples retained when the window overflows
pub const LATENCY_RETAIN: usize = 500;
/// Weight of the previous error rate on each error
pub const ERROR_DECAY: f64 = 0.9;

/// Read-only copy of the oracle metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub price_updates: u64,
    pub last_update_time_ms: Option<u64>,
    pub average_response_time_ms: f64,
    pub error_rate: f64,
    pub sources_online: usize,
    pub total_sources: usize,
}

impl MetricsSnapshot {
    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / lookups as f64
    }
}

#[derive(Debug, Default)]
pub struct MetricsCollector {
    total_requests: u64,
    cache_hits: u64,
    cache_misses: u64,
    price_updates: u64,
    last_update_time_ms: Option<u64>,
    latencies_ms: Vec<f64>,
    error_rate: f64,
    sources_online: usize,
    total_sources: usize,
}

impl MetricsCollector {
    pub fn new(total_sources: usize) -> Self {
        Self {
            total_sources,
            sources_online: total_sources,
            ..Default::default()
        }
    }

    pub fn record_request(&mut self) {
        self.total_requests += 1;
    }

    pub fn record_hit(&mut self) {
        self.cache_hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.cache_misses += 1;
    }

    pub fn record_update(&mut self, now_ms: u64) {
        self.price_updates += 1;
        self.last_update_time_ms = Some(now_ms);
    }

    /// Append a latency sample; past the window only the newest half is kept
    pub fn record_latency(&mut self, latency: Duration) {
        self.latencies_ms.push(latency.as_secs_f64() * 1_000.0);
        if self.latencies_ms.len() > LATENCY_WINDOW {
            let excess = self.latencies_ms.len() - LATENCY_RETAIN;
            self.latencies_ms.drain(..excess);
        }
    }

    /// Decayed error rate: `rate * 0.9 + 0.1`. Only errors move it.
    pub fn record_error(&mut self) {
        self.error_rate = self.error_rate * ERROR_DECAY + (1.0 - ERROR_DECAY);
    }

    pub fn set_sources_online(&mut self, online: usize) {
        self.sources_online = online.min(self.total_sources);
    }

    pub fn average_response_time_ms(&self) -> f64 {
        if self.latencies_ms.is_empty() {
            return 0.0;
        }
        self.latencies_ms.iter().sum::<f64>() / self.latencies_ms.len() as f64
    }

    pub fn sample_count(&self) -> usize {
        self.latencies_ms.len()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests,
            cache_hits: self.cache_hits,
            cache_misses: self.cache_misses,
            price_updates: self.price_updates,
            last_update_time_ms: self.last_update_time_ms,
            average_response_time_ms: self.average_response_time_ms(),
            error_rate: self.error_rate,
            sources_online: self.sources_online,
            total_sources: self.total_sources,
        }
    }
}
