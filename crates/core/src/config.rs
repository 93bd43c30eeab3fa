//! Configuration types

use alloy_primitives::{Address, U256};
use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::fixed::to_fixed;
use crate::pools::MAX_FEE_BPS;
use crate::{ChainId, CoreError, CoreResult, SourceId, TokenPair};

/// Quote acceptance thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub min_confidence: u8,
    pub max_spread: f64,
    pub max_age_ms: u64,
    /// Whole tokens; quotes reporting no liquidity are exempt
    pub min_liquidity: Decimal,
}

impl QualityConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms)
    }

    pub fn min_liquidity_fixed(&self) -> U256 {
        to_fixed(self.min_liquidity).unwrap_or(U256::ZERO)
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_confidence: 70,
            max_spread: 0.05,  // 5%
            max_age_ms: 30_000,
            min_liquidity: Decimal::ZERO,
        }
    }
}

/// Reconnect policy for sources holding a persistent connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    pub reconnect_delay_ms: u64,
    pub max_reconnects: u32,
}

impl WebSocketConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 5_000,
            max_reconnects: 10,
        }
    }
}

/// Constant-product pool read by an on-chain source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexPoolConfig {
    pub source: SourceId,
    pub pool: Address,
    pub token0: Address,
    pub token1: Address,
    pub decimals0: u8,
    pub decimals1: u8,
    #[serde(default = "default_fee_bps")]
    pub fee_bps: u16,
    /// Whole tokens sold to estimate slippage
    #[serde(default = "default_reference_trade")]
    pub reference_trade: Decimal,
    #[serde(default = "default_dex_confidence")]
    pub confidence: u8,
}

fn default_fee_bps() -> u16 {
    30
}

fn default_reference_trade() -> Decimal {
    Decimal::ONE
}

fn default_dex_confidence() -> u8 {
    90
}

/// Streaming oracle feed endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSourceConfig {
    pub source: SourceId,
    pub ws_url: String,
    /// Raw text frame sent after connecting, if the feed needs one
    #[serde(default)]
    pub subscribe: Option<String>,
    /// Confidence reported for ticks that carry none
    #[serde(default = "default_feed_confidence")]
    pub default_confidence: u8,
}

fn default_feed_confidence() -> u8 {
    95
}

/// HTTP price API endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestSourceConfig {
    pub source: SourceId,
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_rest_confidence")]
    pub default_confidence: u8,
}

fn default_rest_confidence() -> u8 {
    80
}

/// Per-adapter connection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub dex_pools: Vec<DexPoolConfig>,
    pub feeds: Vec<FeedSourceConfig>,
    pub rest_apis: Vec<RestSourceConfig>,
}

/// Complete oracle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub network: ChainId,
    pub rpc_url: String,
    pub enabled_sources: Vec<SourceId>,
    /// Unmapped sources weigh 1
    pub source_weights: HashMap<SourceId, Decimal>,
    /// Pairs refreshed proactively on the fast cadence
    pub watch_pairs: Vec<TokenPair>,
    pub fast_interval_ms: u64,
    pub slow_interval_ms: u64,
    pub cache_capacity: usize,
    pub request_timeout_ms: u64,
    pub max_concurrent_requests: usize,
    pub quality: QualityConfig,
    pub websocket: WebSocketConfig,
    pub sources: SourcesConfig,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            network: ChainId::Ethereum,
            rpc_url: "http://127.0.0.1:8545".to_string(),
            enabled_sources: vec![
                SourceId::UniswapV2,
                SourceId::SushiSwap,
                SourceId::Chainlink,
                SourceId::CoinGecko,
            ],
            source_weights: HashMap::new(),
            watch_pairs: vec![],
            fast_interval_ms: 5_000,
            slow_interval_ms: 60_000,
            cache_capacity: 1_000,
            request_timeout_ms: 5_000,
            max_concurrent_requests: 10,
            quality: QualityConfig::default(),
            websocket: WebSocketConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

impl OracleConfig {
    /// Load configuration from defaults, `config/default`, an optional file,
    /// then `ORACLE_*` environment variables (`__` separates nested keys,
    /// e.g. `ORACLE_QUALITY__MIN_CONFIDENCE`).
    pub fn load(path: Option<&str>) -> CoreResult<Self> {
        let mut builder = Config::builder()
            .add_source(File::with_name("config/default").required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("ORACLE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("enabled_sources"),
            )
            .build()?;

        let oracle_config: OracleConfig = config.try_deserialize()?;
        oracle_config.validate()?;
        Ok(oracle_config)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.enabled_sources.is_empty() {
            return Err(CoreError::InvalidConfig("no sources enabled".into()));
        }
        if self.fast_interval_ms == 0 || self.slow_interval_ms == 0 {
            return Err(CoreError::InvalidConfig("update intervals must be non-zero".into()));
        }
        if self.cache_capacity == 0 {
            return Err(CoreError::InvalidConfig("cache_capacity must be non-zero".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(CoreError::InvalidConfig("request_timeout_ms must be non-zero".into()));
        }
        if self.max_concurrent_requests == 0 {
            return Err(CoreError::InvalidConfig(
                "max_concurrent_requests must be non-zero".into(),
            ));
        }
        if self.quality.min_confidence > 100 {
            return Err(CoreError::InvalidConfig(format!(
                "min_confidence {} > 100",
                self.quality.min_confidence
            )));
        }
        if !(self.quality.max_spread >= 0.0) {
            return Err(CoreError::InvalidConfig(format!(
                "max_spread {} must be >= 0",
                self.quality.max_spread
            )));
        }
        if self.quality.min_liquidity.is_sign_negative() && !self.quality.min_liquidity.is_zero() {
            return Err(CoreError::InvalidConfig("min_liquidity must be >= 0".into()));
        }
        if let Some((source, weight)) = self
            .source_weights
            .iter()
            .find(|(_, w)| w.is_sign_negative() && !w.is_zero())
        {
            return Err(CoreError::InvalidConfig(format!(
                "weight for {} is negative: {}",
                source, weight
            )));
        }
        if let Some(pool) = self
            .sources
            .dex_pools
            .iter()
            .find(|p| p.fee_bps > MAX_FEE_BPS)
        {
            return Err(CoreError::InvalidConfig(format!(
                "{} pool {} fee_bps {} > {}",
                pool.source, pool.pool, pool.fee_bps, MAX_FEE_BPS
            )));
        }
        Ok(())
    }

    /// Weight of a source, 1 when unmapped
    pub fn weight_for(&self, source: &SourceId) -> Decimal {
        self.source_weights
            .get(source)
            .copied()
            .unwrap_or(Decimal::ONE)
    }

    pub fn fast_interval(&self) -> Duration {
        Duration::from_millis(self.fast_interval_ms)
    }

    pub fn slow_interval(&self) -> Duration {
        Duration::from_millis(self.slow_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Short summary for startup logs
    pub fn digest(&self) -> String {
        let sources: Vec<&str> = self.enabled_sources.iter().map(|s| s.name()).collect();
        format!(
            "network={} sources={:?} fast={}ms slow={}ms capacity={} min_conf={} max_age={}ms",
            self.network,
            sources,
            self.fast_interval_ms,
            self.slow_interval_ms,
            self.cache_capacity,
            self.quality.min_confidence,
            self.quality.max_age_ms,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = OracleConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fast_interval(), Duration::from_secs(5));
        assert_eq!(config.weight_for(&SourceId::Pyth), Decimal::ONE);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = OracleConfig::default();
        config.cache_capacity = 0;
        assert!(matches!(config.validate(), Err(CoreError::InvalidConfig(_))));

        let mut config = OracleConfig::default();
        config.quality.min_confidence = 101;
        assert!(config.validate().is_err());

        let mut config = OracleConfig::default();
        config.quality.max_spread = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = OracleConfig::default();
        config.source_weights.insert(SourceId::Chainlink, Decimal::from(-1));
        assert!(config.validate().is_err());

        let mut config = OracleConfig::default();
        config.enabled_sources.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_fee_over_hundred_percent() {
        let pool = DexPoolConfig {
            source: SourceId::UniswapV2,
            pool: Address::repeat_byte(9),
            token0: Address::repeat_byte(1),
            token1: Address::repeat_byte(2),
            decimals0: 6,
            decimals1: 18,
            fee_bps: 20_000,
            reference_trade: Decimal::ONE,
            confidence: 90,
        };

        let mut config = OracleConfig::default();
        config.sources.dex_pools.push(pool.clone());
        assert!(matches!(config.validate(), Err(CoreError::InvalidConfig(_))));

        let mut config = OracleConfig::default();
        config.sources.dex_pools.push(DexPoolConfig {
            fee_bps: MAX_FEE_BPS,
            ..pool
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("oracle-config-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
network = "arbitrum"
enabled_sources = ["chainlink", "uniswap-v2"]
cache_capacity = 50

[source_weights]
chainlink = 2.5

[quality]
min_confidence = 80
min_liquidity = 1000

[[sources.rest_apis]]
source = "coingecko"
base_url = "https://api.example.com"
"#
        )
        .unwrap();

        let config = OracleConfig::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.network, ChainId::Arbitrum);
        assert_eq!(config.enabled_sources, vec![SourceId::Chainlink, SourceId::UniswapV2]);
        assert_eq!(config.cache_capacity, 50);
        assert_eq!(config.weight_for(&SourceId::Chainlink), Decimal::new(25, 1));
        assert_eq!(config.quality.min_confidence, 80);
        assert_eq!(config.quality.max_age_ms, 30_000);
        assert_eq!(
            config.quality.min_liquidity_fixed(),
            crate::PRICE_SCALE * U256::from(1000)
        );
        assert_eq!(config.sources.rest_apis.len(), 1);
        assert_eq!(config.sources.rest_apis[0].default_confidence, 80);
    }
}
