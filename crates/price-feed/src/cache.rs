//! Aggregated price cache
//!
//! Uses DashMap keyed by the directional token pair. Freshness is judged on
//! read, so an expired entry is a miss even before the sweep removes it.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use oracle_core::{AggregatedQuote, TokenPair};

/// Share of remaining entries dropped per eviction round
const EVICTION_FRACTION: usize = 5; // 1/5 = 20%

/// Cached aggregation result
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: AggregatedQuote,
    pub stored_at: Instant,
    pub hits: u64,
    /// Insertion order, breaks hit-count ties (oldest evicted first)
    seq: u64,
}

impl CacheEntry {
    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }

    /// Servable to callers
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        self.age() < max_age
    }

    /// Eligible for the expiry sweep
    pub fn is_expired(&self, max_age: Duration) -> bool {
        self.age() > max_age
    }
}

/// Bounded pair -> aggregated quote store with TTL and approximate-LFU eviction
#[derive(Debug)]
pub struct PriceCache {
    entries: DashMap<TokenPair, CacheEntry>,
    capacity: usize,
    max_age: Duration,
    next_seq: AtomicU64,
    evictions: AtomicU64,
}

impl PriceCache {
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            max_age,
            next_seq: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Fresh entry for `pair`, counting the hit
    pub fn get(&self, pair: &TokenPair) -> Option<CacheEntry> {
        let mut entry = self.entries.get_mut(pair)?;
        if !entry.is_fresh(self.max_age) {
            return None;
        }
        entry.hits += 1;
        Some(entry.clone())
    }

    /// Insert or replace the entry for `pair`
    pub fn put(&self, pair: TokenPair, data: AggregatedQuote) {
        let entry = CacheEntry {
            data,
            stored_at: Instant::now(),
            hits: 1,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };
        self.entries.insert(pair, entry);
    }

    /// Remove every entry older than the max age; returns how many went
    pub fn sweep_expired(&self) -> usize {
        let max_age = self.max_age;
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(max_age);
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            debug!("Swept {} expired cache entries", removed);
        }
        removed
    }

    /// Drop the least-hit 20% of entries, repeatedly, until at or under capacity.
    ///
    /// Ties go to insertion order, oldest first. Returns how many were evicted.
    pub fn evict_if_over_capacity(&self) -> usize {
        let mut evicted = 0;

        while self.entries.len() > self.capacity {
            let mut ranked: Vec<(TokenPair, u64, u64)> = self
                .entries
                .iter()
                .map(|e| (*e.key(), e.value().hits, e.value().seq))
                .collect();
            ranked.sort_unstable_by_key(|(_, hits, seq)| (*hits, *seq));

            let batch = (ranked.len() / EVICTION_FRACTION).max(1);
            for (pair, _, _) in ranked.into_iter().take(batch) {
                if self.entries.remove(&pair).is_some() {
                    evicted += 1;
                }
            }
        }

        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            debug!(
                "Evicted {} cache entries, {} remain (capacity {})",
                evicted,
                self.entries.len(),
                self.capacity
            );
        }
        evicted
    }

    /// Expiry sweep followed by capacity eviction
    pub fn maintain(&self) -> (usize, usize) {
        let expired = self.sweep_expired();
        let evicted = self.evict_if_over_capacity();
        (expired, evicted)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, pair: &TokenPair) -> bool {
        self.entries.contains_key(pair)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            capacity: self.capacity,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Statistics about the cache
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub evictions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};
    use oracle_core::{Quote, SourceId};

    const MAX_AGE: Duration = Duration::from_secs(30);

    fn pair(i: u8) -> TokenPair {
        TokenPair::new(Address::repeat_byte(i), Address::repeat_byte(0xee))
    }

    fn aggregated(pair: TokenPair, price: u64) -> AggregatedQuote {
        let quote = Quote {
            source: SourceId::Chainlink,
            token_a: pair.token_a,
            token_b: pair.token_b,
            price: U256::from(price),
            liquidity: U256::ZERO,
            volume_24h: U256::ZERO,
            timestamp_ms: 1,
            block_height: 0,
            confidence: 99,
            spread: 0.0,
            slippage: 0.0,
        };
        AggregatedQuote {
            token_a: pair.token_a,
            token_b: pair.token_b,
            weighted_price: U256::from(price),
            median_price: U256::from(price),
            sources: vec![quote],
            confidence: 99.0,
            spread: 0.0,
            liquidity: U256::ZERO,
            volume_24h: U256::ZERO,
            price_impact: 0.0,
            volatility: 0.0,
            timestamp_ms: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_trip_counts_hits() {
        let cache = PriceCache::new(10, MAX_AGE);
        let data = aggregated(pair(1), 42);
        cache.put(pair(1), data.clone());

        let first = cache.get(&pair(1)).unwrap();
        assert_eq!(first.data, data);
        assert_eq!(first.hits, 2);

        let second = cache.get(&pair(1)).unwrap();
        assert_eq!(second.hits, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pair_is_directional() {
        let cache = PriceCache::new(10, MAX_AGE);
        cache.put(pair(1), aggregated(pair(1), 42));

        assert!(cache.get(&pair(1).reversed()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_a_miss_before_sweep() {
        let cache = PriceCache::new(10, MAX_AGE);
        cache.put(pair(1), aggregated(pair(1), 42));

        tokio::time::advance(MAX_AGE).await;

        assert!(cache.get(&pair(1)).is_none());
        // Still physically present until the sweep runs
        assert_eq!(cache.len(), 1);
        // Exactly max age is not past the sweep threshold
        assert_eq!(cache.sweep_expired(), 0);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.sweep_expired(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacement_resets_entry() {
        let cache = PriceCache::new(10, MAX_AGE);
        cache.put(pair(1), aggregated(pair(1), 42));
        cache.get(&pair(1));
        cache.get(&pair(1));

        tokio::time::advance(Duration::from_secs(20)).await;
        cache.put(pair(1), aggregated(pair(1), 43));

        tokio::time::advance(Duration::from_secs(20)).await;
        let entry = cache.get(&pair(1)).unwrap();
        assert_eq!(entry.data.weighted_price, U256::from(43));
        assert_eq!(entry.hits, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_keeps_most_hit_entries() {
        let cache = PriceCache::new(10, MAX_AGE);

        // Entry i gets i extra hits
        for i in 0..12u8 {
            cache.put(pair(i), aggregated(pair(i), i as u64));
            for _ in 0..i {
                cache.get(&pair(i));
            }
        }

        let evicted = cache.evict_if_over_capacity();
        assert_eq!(evicted, 2);
        assert_eq!(cache.len(), 10);
        assert!(!cache.contains(&pair(0)));
        assert!(!cache.contains(&pair(1)));
        for i in 2..12u8 {
            assert!(cache.contains(&pair(i)));
        }
        assert_eq!(cache.stats().evictions, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_ties_drop_oldest_first() {
        let cache = PriceCache::new(4, MAX_AGE);
        for i in 0..6u8 {
            cache.put(pair(i), aggregated(pair(i), 1));
        }

        // 6 entries, 20% -> 1 per round, two rounds
        assert_eq!(cache.evict_if_over_capacity(), 2);
        assert!(!cache.contains(&pair(0)));
        assert!(!cache.contains(&pair(1)));
        assert!(cache.contains(&pair(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_may_overshoot_below_capacity() {
        let cache = PriceCache::new(10, MAX_AGE);
        for i in 0..11u8 {
            cache.put(pair(i), aggregated(pair(i), 1));
        }

        // 11 / 5 = 2 removed in one round
        assert_eq!(cache.evict_if_over_capacity(), 2);
        assert_eq!(cache.len(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_under_capacity_is_noop() {
        let cache = PriceCache::new(10, MAX_AGE);
        cache.put(pair(1), aggregated(pair(1), 1));
        assert_eq!(cache.maintain(), (0, 0));
        assert_eq!(cache.len(), 1);
    }
}
