//! Quote aggregation - combines accepted quotes into one consensus price

use alloy_primitives::U256;
use rust_decimal::Decimal;
use std::collections::HashMap;

use oracle_core::{
    scale_weight, to_f64, AggregatedQuote, OracleError, OracleResult, Quote, SourceId, TokenPair,
    WEIGHT_SCALE,
};

/// Weighted/median price combiner
///
/// Weights are scaled to integers once (`round(weight * 1000)`) so the
/// weighted sum stays exact in fixed point.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    weights: HashMap<SourceId, u64>,
}

impl Aggregator {
    pub fn new(weights: &HashMap<SourceId, Decimal>) -> Self {
        Self {
            weights: weights
                .iter()
                .map(|(source, weight)| (source.clone(), scale_weight(*weight)))
                .collect(),
        }
    }

    /// Integer weight of a source; unmapped sources weigh 1 (scaled)
    pub fn scaled_weight(&self, source: &SourceId) -> u64 {
        self.weights.get(source).copied().unwrap_or(WEIGHT_SCALE)
    }

    /// Combine accepted quotes for `pair`, stamped with `now_ms`.
    ///
    /// Quotes are expected to have passed the quality filter already.
    pub fn aggregate(
        &self,
        pair: TokenPair,
        quotes: Vec<Quote>,
        now_ms: u64,
    ) -> OracleResult<AggregatedQuote> {
        if quotes.is_empty() {
            return Err(OracleError::EmptyInput);
        }

        let count = quotes.len() as f64;
        let weighted_price = self.weighted_price(&quotes);
        let median_price = median_price(&quotes);

        let liquidity = quotes
            .iter()
            .fold(U256::ZERO, |acc, q| acc.saturating_add(q.liquidity));
        let volume_24h = quotes
            .iter()
            .fold(U256::ZERO, |acc, q| acc.saturating_add(q.volume_24h));

        let confidence = quotes.iter().map(|q| q.confidence as f64).sum::<f64>() / count;
        let spread = quotes.iter().map(|q| q.spread).sum::<f64>() / count;

        Ok(AggregatedQuote {
            token_a: pair.token_a,
            token_b: pair.token_b,
            weighted_price,
            median_price,
            confidence,
            spread,
            liquidity,
            volume_24h,
            price_impact: price_impact(&quotes),
            volatility: volatility(&quotes),
            timestamp_ms: now_ms,
            sources: quotes,
        })
    }

    /// `sum(price * w) / sum(w)` over scaled integer weights; zero if all weights are zero
    pub fn weighted_price(&self, quotes: &[Quote]) -> U256 {
        let mut weighted_sum = U256::ZERO;
        let mut total_weight = U256::ZERO;

        for quote in quotes {
            let weight = U256::from(self.scaled_weight(&quote.source));
            weighted_sum = weighted_sum.saturating_add(quote.price.saturating_mul(weight));
            total_weight += weight;
        }

        if total_weight.is_zero() {
            return U256::ZERO;
        }

        weighted_sum / total_weight
    }
}

/// Element at index `n / 2` of the sorted prices (upper median for even `n`)
pub fn median_price(quotes: &[Quote]) -> U256 {
    let mut prices: Vec<U256> = quotes.iter().map(|q| q.price).collect();
    prices.sort_unstable();
    prices.get(prices.len() / 2).copied().unwrap_or(U256::ZERO)
}

/// `(max - min) / max` across quote prices; 0 for fewer than two quotes
pub fn price_impact(quotes: &[Quote]) -> f64 {
    if quotes.len() < 2 {
        return 0.0;
    }

    let max = quotes.iter().map(|q| q.price).max().unwrap_or(U256::ZERO);
    let min = quotes.iter().map(|q| q.price).min().unwrap_or(U256::ZERO);

    if max.is_zero() {
        return 0.0;
    }

    to_f64(max - min) / to_f64(max)
}

/// Coefficient of variation (population stddev / mean) of quote prices
pub fn volatility(quotes: &[Quote]) -> f64 {
    if quotes.len() < 2 {
        return 0.0;
    }

    let prices: Vec<f64> = quotes.iter().map(|q| to_f64(q.price)).collect();
    let n = prices.len() as f64;
    let mean = prices.iter().sum::<f64>() / n;

    if mean == 0.0 {
        return 0.0;
    }

    let variance = prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt() / mean
}
