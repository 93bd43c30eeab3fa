//! Quote and aggregated quote types

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult, SourceId, TokenPair};

/// One source's observation of a token-pair price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub source: SourceId,
    pub token_a: Address,
    pub token_b: Address,
    /// Price of `token_a` in `token_b`, 1e18 fixed point
    pub price: U256,
    /// 1e18 fixed point, zero when the source does not report it
    pub liquidity: U256,
    /// 1e18 fixed point, zero when the source does not report it
    pub volume_24h: U256,
    pub timestamp_ms: u64,
    /// Zero for off-chain sources
    pub block_height: u64,
    /// Source-declared reliability, 0-100
    pub confidence: u8,
    pub spread: f64,
    pub slippage: f64,
}

impl Quote {
    pub fn pair(&self) -> TokenPair {
        TokenPair::new(self.token_a, self.token_b)
    }

    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.timestamp_ms)
    }

    pub fn is_stale(&self, max_age_ms: u64, now_ms: u64) -> bool {
        self.age_ms(now_ms) > max_age_ms
    }

    pub fn is_on_chain(&self) -> bool {
        self.block_height > 0
    }

    /// Check the data-model invariants a source must honour
    pub fn validate(&self) -> CoreResult<()> {
        if self.confidence > 100 {
            return Err(CoreError::InvalidQuote(format!(
                "{}: confidence {} > 100",
                self.source, self.confidence
            )));
        }
        if !(self.spread.is_finite() && self.spread >= 0.0) {
            return Err(CoreError::InvalidQuote(format!(
                "{}: spread {} is not a non-negative fraction",
                self.source, self.spread
            )));
        }
        if !(self.slippage.is_finite() && self.slippage >= 0.0) {
            return Err(CoreError::InvalidQuote(format!(
                "{}: slippage {} is not a non-negative fraction",
                self.source, self.slippage
            )));
        }
        Ok(())
    }
}

/// Combined result across the accepted quotes for a pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedQuote {
    pub token_a: Address,
    pub token_b: Address,
    pub weighted_price: U256,
    pub median_price: U256,
    /// Accepted quotes in fetch completion order
    pub sources: Vec<Quote>,
    pub confidence: f64,
    pub spread: f64,
    pub liquidity: U256,
    pub volume_24h: U256,
    pub price_impact: f64,
    pub volatility: f64,
    pub timestamp_ms: u64,
}

impl AggregatedQuote {
    pub fn pair(&self) -> TokenPair {
        TokenPair::new(self.token_a, self.token_b)
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn source_ids(&self) -> Vec<SourceId> {
        self.sources.iter().map(|q| q.source.clone()).collect()
    }
}
