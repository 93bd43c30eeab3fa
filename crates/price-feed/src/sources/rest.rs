//! Off-chain HTTP price API source

use alloy_primitives::U256;
use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use oracle_core::{
    now_ms, to_fixed, Quote, RestSourceConfig, SourceError, SourceId, SourceKind, SourceResult,
    TokenPair,
};

use super::{transport_error, SourceAdapter};

/// Body of `GET {base_url}/price?base=..&quote=..`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestPriceResponse {
    pub price: Decimal,
    #[serde(default)]
    pub volume_24h: Option<Decimal>,
    #[serde(default)]
    pub liquidity: Option<Decimal>,
    #[serde(default)]
    pub spread: Option<f64>,
    #[serde(default)]
    pub confidence: Option<u8>,
    /// Milliseconds since epoch; response time when absent
    #[serde(default)]
    pub timestamp: Option<u64>,
}

pub struct RestApiAdapter {
    id: SourceId,
    config: RestSourceConfig,
    client: reqwest::Client,
    online: AtomicBool,
}

impl RestApiAdapter {
    pub fn new(config: RestSourceConfig, client: reqwest::Client) -> Self {
        Self {
            id: config.source.clone(),
            config,
            client,
            online: AtomicBool::new(true),
        }
    }

    async fn request(&self, pair: TokenPair, timeout: Duration) -> SourceResult<Quote> {
        let url = format!("{}/price", self.config.base_url.trim_end_matches('/'));

        let mut request = self
            .client
            .get(&url)
            .timeout(timeout)
            .query(&[
                ("base", pair.token_a.to_string()),
                ("quote", pair.token_b.to_string()),
            ]);
        if let Some(key) = &self.config.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(&self.id, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(SourceError::NoData(pair)),
            status if !status.is_success() => {
                return Err(SourceError::Transport(format!(
                    "{}: HTTP {}",
                    self.id, status
                )))
            }
            _ => {}
        }

        let body: RestPriceResponse = response
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponse(format!("{}: {}", self.id, e)))?;

        self.to_quote(pair, body)
    }

    fn to_quote(&self, pair: TokenPair, body: RestPriceResponse) -> SourceResult<Quote> {
        let price = to_fixed(body.price).ok_or_else(|| {
            SourceError::InvalidResponse(format!("{}: negative price {}", self.id, body.price))
        })?;

        Ok(Quote {
            source: self.id.clone(),
            token_a: pair.token_a,
            token_b: pair.token_b,
            price,
            liquidity: body.liquidity.and_then(to_fixed).unwrap_or(U256::ZERO),
            volume_24h: body.volume_24h.and_then(to_fixed).unwrap_or(U256::ZERO),
            timestamp_ms: body.timestamp.unwrap_or_else(now_ms),
            block_height: 0,
            confidence: body.confidence.unwrap_or(self.config.default_confidence),
            spread: body.spread.unwrap_or(0.0),
            slippage: 0.0,
        })
    }
}

#[async_trait]
impl SourceAdapter for RestApiAdapter {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::RestApi
    }

    async fn fetch(&self, pair: TokenPair, timeout: Duration) -> SourceResult<Quote> {
        let result = self.request(pair, timeout).await;
        let reachable = match &result {
            Ok(_) => true,
            Err(e) => e.is_no_data() || matches!(e, SourceError::InvalidResponse(_)),
        };
        self.online.store(reachable, Ordering::Relaxed);
        result
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }
}
