//! Quote quality filter
//!
//! Pure predicate over quotes: no I/O, no logging, order preserved.

use alloy_primitives::U256;
use std::fmt;

use oracle_core::{QualityConfig, Quote, SourceId};

/// Why a quote was turned away
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    LowConfidence { confidence: u8, min: u8 },
    WideSpread { spread: f64, max: f64 },
    Stale { age_ms: u64, max_ms: u64 },
    ThinLiquidity { liquidity: U256, min: U256 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::LowConfidence { confidence, min } => {
                write!(f, "confidence {} < {}", confidence, min)
            }
            Rejection::WideSpread { spread, max } => write!(f, "spread {:.6} > {:.6}", spread, max),
            Rejection::Stale { age_ms, max_ms } => write!(f, "age {}ms > {}ms", age_ms, max_ms),
            Rejection::ThinLiquidity { liquidity, min } => {
                write!(f, "liquidity {} < {}", liquidity, min)
            }
        }
    }
}

/// Accepts or rejects quotes against configured thresholds
#[derive(Debug, Clone)]
pub struct QualityFilter {
    min_confidence: u8,
    max_spread: f64,
    max_age_ms: u64,
    min_liquidity: U256,
}

impl QualityFilter {
    pub fn new(config: &QualityConfig) -> Self {
        Self {
            min_confidence: config.min_confidence,
            max_spread: config.max_spread,
            max_age_ms: config.max_age_ms,
            min_liquidity: config.min_liquidity_fixed(),
        }
    }

    /// Check one quote at time `now_ms`
    pub fn check(&self, quote: &Quote, now_ms: u64) -> Result<(), Rejection> {
        if quote.confidence < self.min_confidence {
            return Err(Rejection::LowConfidence {
                confidence: quote.confidence,
                min: self.min_confidence,
            });
        }

        if quote.spread > self.max_spread {
            return Err(Rejection::WideSpread {
                spread: quote.spread,
                max: self.max_spread,
            });
        }

        if quote.is_stale(self.max_age_ms, now_ms) {
            return Err(Rejection::Stale {
                age_ms: quote.age_ms(now_ms),
                max_ms: self.max_age_ms,
            });
        }

        // Zero means "not reported" (off-chain sources), not "no liquidity"
        if !quote.liquidity.is_zero() && quote.liquidity < self.min_liquidity {
            return Err(Rejection::ThinLiquidity {
                liquidity: quote.liquidity,
                min: self.min_liquidity,
            });
        }

        Ok(())
    }

    pub fn accepts(&self, quote: &Quote, now_ms: u64) -> bool {
        self.check(quote, now_ms).is_ok()
    }

    /// Keep the quotes that pass every threshold
    pub fn filter(&self, quotes: Vec<Quote>, now_ms: u64) -> Vec<Quote> {
        self.split(quotes, now_ms).0
    }

    /// Survivors plus the rejected sources with their reasons
    pub fn split(
        &self,
        quotes: Vec<Quote>,
        now_ms: u64,
    ) -> (Vec<Quote>, Vec<(SourceId, Rejection)>) {
        let mut accepted = Vec::with_capacity(quotes.len());
        let mut rejected = Vec::new();

        for quote in quotes {
            match self.check(&quote, now_ms) {
                Ok(()) => accepted.push(quote),
                Err(reason) => rejected.push((quote.source.clone(), reason)),
            }
        }

        (accepted, rejected)
    }
}
