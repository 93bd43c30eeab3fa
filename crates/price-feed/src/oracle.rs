//! Price oracle - coordinates sources, filter, aggregator, cache and metrics

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use oracle_core::{
    format_fixed, now_ms, AggregatedQuote, OracleConfig, OracleError, OracleResult, Quote,
    SourceError, SourceId, TokenPair,
};

use crate::aggregator::Aggregator;
use crate::cache::{CacheStats, PriceCache};
use crate::filter::QualityFilter;
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::scheduler::{ScheduledWork, UpdateScheduler};
use crate::sources::{build_adapters, SourceAdapter};

/// Outcome for one pair of a batch request
#[derive(Debug)]
pub struct PairPrice {
    pub pair: TokenPair,
    pub result: OracleResult<AggregatedQuote>,
}

impl PairPrice {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Everything the request path and the scheduled cadences share
struct OracleCore {
    config: OracleConfig,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    filter: QualityFilter,
    aggregator: Aggregator,
    cache: PriceCache,
    metrics: Mutex<MetricsCollector>,
    fetch_permits: Semaphore,
}

impl OracleCore {
    async fn get_price(&self, pair: TokenPair) -> OracleResult<AggregatedQuote> {
        let started = Instant::now();

        // Request and hit/miss are counted under one lock
        if let Some(entry) = self.cache.get(&pair) {
            let mut metrics = self.metrics.lock();
            metrics.record_request();
            metrics.record_hit();
            metrics.record_latency(started.elapsed());
            return Ok(entry.data);
        }

        {
            let mut metrics = self.metrics.lock();
            metrics.record_request();
            metrics.record_miss();
        }

        let result = self.refresh(pair).await;
        if result.is_ok() {
            self.metrics.lock().record_latency(started.elapsed());
        }
        result
    }

    /// Fetch, filter, aggregate and cache, bypassing the cache probe
    async fn refresh(&self, pair: TokenPair) -> OracleResult<AggregatedQuote> {
        let quotes = self.fetch_all(pair).await;

        let now = now_ms();
        let (accepted, rejected) = self.filter.split(quotes, now);
        for (source, reason) in &rejected {
            debug!("Rejected {} quote for {}: {}", source, pair, reason);
        }

        if accepted.is_empty() {
            self.metrics.lock().record_error();
            warn!(
                "No valid price data for {} ({} quotes rejected)",
                pair,
                rejected.len()
            );
            return Err(OracleError::NoValidPriceData(pair));
        }

        let aggregated = self.aggregator.aggregate(pair, accepted, now)?;
        self.cache.put(pair, aggregated.clone());
        self.metrics.lock().record_update(now);

        debug!(
            "Aggregated {}: weighted={} median={} sources={}",
            pair,
            format_fixed(aggregated.weighted_price),
            format_fixed(aggregated.median_price),
            aggregated.source_count()
        );

        Ok(aggregated)
    }

    /// Query every source concurrently; quotes come back in completion order.
    ///
    /// Failures are logged and dropped without affecting sibling fetches.
    async fn fetch_all(&self, pair: TokenPair) -> Vec<Quote> {
        let timeout = self.config.request_timeout();

        let mut pending: FuturesUnordered<_> = self
            .adapters
            .iter()
            .map(|adapter| async move {
                let outcome = tokio::time::timeout(timeout, async {
                    let _permit = self
                        .fetch_permits
                        .acquire()
                        .await
                        .map_err(|_| SourceError::Disconnected)?;
                    adapter.fetch(pair, timeout).await
                })
                .await
                .unwrap_or_else(|_| Err(SourceError::Timeout(adapter.id().clone())));
                (adapter.id(), outcome)
            })
            .collect();

        let mut quotes = Vec::with_capacity(self.adapters.len());
        let mut reachable = 0;

        while let Some((source, outcome)) = pending.next().await {
            match outcome.and_then(|quote| check_quote(source, pair, quote)) {
                Ok(quote) => {
                    reachable += 1;
                    quotes.push(quote);
                }
                Err(e) if e.is_no_data() => {
                    reachable += 1;
                    debug!("{} has no data for {}: {}", source, pair, e);
                }
                Err(e) => warn!("{} fetch failed for {}: {}", source, pair, e),
            }
        }

        self.metrics.lock().set_sources_online(reachable);
        quotes
    }

    fn online_sources(&self) -> usize {
        self.adapters.iter().filter(|a| a.is_online()).count()
    }
}

/// Reject quotes that break the data model or answer a different pair
fn check_quote(source: &SourceId, pair: TokenPair, quote: Quote) -> Result<Quote, SourceError> {
    if quote.pair() != pair {
        return Err(SourceError::InvalidResponse(format!(
            "{} answered {} for {}",
            source,
            quote.pair(),
            pair
        )));
    }
    quote
        .validate()
        .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;
    Ok(quote)
}

#[async_trait]
impl ScheduledWork for OracleCore {
    async fn fast_tick(&self) {
        let watch_pairs = &self.config.watch_pairs;

        if !watch_pairs.is_empty() {
            let results =
                futures::future::join_all(watch_pairs.iter().map(|p| self.refresh(*p))).await;
            let refreshed = results.iter().filter(|r| r.is_ok()).count();
            debug!("Refreshed {}/{} watched pairs", refreshed, watch_pairs.len());
        }

        let online = self.online_sources();
        self.metrics.lock().set_sources_online(online);
        debug!("{}/{} sources online", online, self.adapters.len());
    }

    async fn slow_tick(&self) {
        let (expired, evicted) = self.cache.maintain();
        let stats = self.cache.stats();
        debug!(
            "Cache maintenance: {} expired, {} evicted, {}/{} entries",
            expired, evicted, stats.entries, stats.capacity
        );
    }
}

/// Consensus price oracle over a set of market-data sources
///
/// Owns its cache, metrics and scheduled tasks. `start`/`stop` bound the
/// scheduled work; price requests are served either way.
pub struct PriceOracle {
    core: Arc<OracleCore>,
    scheduler: tokio::sync::Mutex<Option<UpdateScheduler>>,
    running: AtomicBool,
}

impl PriceOracle {
    pub fn new(config: OracleConfig, adapters: Vec<Arc<dyn SourceAdapter>>) -> OracleResult<Self> {
        config.validate()?;

        let core = OracleCore {
            filter: QualityFilter::new(&config.quality),
            aggregator: Aggregator::new(&config.source_weights),
            cache: PriceCache::new(config.cache_capacity, config.quality.max_age()),
            metrics: Mutex::new(MetricsCollector::new(adapters.len())),
            fetch_permits: Semaphore::new(config.max_concurrent_requests),
            adapters,
            config,
        };

        Ok(Self {
            core: Arc::new(core),
            scheduler: tokio::sync::Mutex::new(None),
            running: AtomicBool::new(false),
        })
    }

    /// Build the oracle with adapters for every configured source
    pub fn from_config(config: OracleConfig) -> OracleResult<Self> {
        config.validate()?;
        let adapters = build_adapters(&config);
        Self::new(config, adapters)
    }

    /// Connect persistent sources and start both cadences. Idempotent.
    pub async fn start(&self) -> OracleResult<()> {
        let mut scheduler = self.scheduler.lock().await;
        if scheduler.is_some() {
            return Ok(());
        }

        info!("Starting price oracle: {}", self.core.config.digest());

        for adapter in &self.core.adapters {
            if let Err(e) = adapter.connect().await {
                warn!("Failed to connect {}: {}", adapter.id(), e);
            }
        }

        *scheduler = Some(UpdateScheduler::start(
            Arc::clone(&self.core),
            self.core.config.fast_interval(),
            self.core.config.slow_interval(),
        ));
        self.running.store(true, Ordering::SeqCst);

        Ok(())
    }

    /// Stop both cadences, then close persistent connections. Idempotent.
    ///
    /// No scheduled work runs after this returns. In-flight requests finish
    /// or time out on their own.
    pub async fn stop(&self) {
        let mut scheduler = self.scheduler.lock().await;
        let Some(active) = scheduler.take() else {
            return;
        };

        info!("Stopping price oracle");
        self.running.store(false, Ordering::SeqCst);
        active.stop().await;

        for adapter in &self.core.adapters {
            adapter.disconnect().await;
        }

        info!("Price oracle stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Consensus price for `pair`, from cache when fresh
    pub async fn get_price(&self, pair: TokenPair) -> OracleResult<AggregatedQuote> {
        self.core.get_price(pair).await
    }

    /// Recompute `pair` from the sources, replacing any cached value
    pub async fn refresh(&self, pair: TokenPair) -> OracleResult<AggregatedQuote> {
        self.core.refresh(pair).await
    }

    /// Evaluate each pair independently; one failure never affects the others
    pub async fn get_batch_prices(&self, pairs: &[TokenPair]) -> Vec<PairPrice> {
        let requests = pairs.iter().map(|pair| async move {
            PairPrice {
                pair: *pair,
                result: self.core.get_price(*pair).await,
            }
        });
        futures::future::join_all(requests).await
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.core.metrics.lock().snapshot()
    }

    pub fn cache_len(&self) -> usize {
        self.core.cache.len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.core.cache.stats()
    }

    pub fn config(&self) -> &OracleConfig {
        &self.core.config
    }

    pub fn sources(&self) -> Vec<SourceId> {
        self.core.adapters.iter().map(|a| a.id().clone()).collect()
    }
}
