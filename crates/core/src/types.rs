//! Core type definitions

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported blockchain networks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainId {
    #[default]
    Ethereum,
    Arbitrum,
    Base,
    Polygon,
}

impl ChainId {
    pub fn chain_id(&self) -> u64 {
        match self {
            ChainId::Ethereum => 1,
            ChainId::Arbitrum => 42161,
            ChainId::Base => 8453,
            ChainId::Polygon => 137,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChainId::Ethereum => "ethereum",
            ChainId::Arbitrum => "arbitrum",
            ChainId::Base => "base",
            ChainId::Polygon => "polygon",
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Capability class of a market-data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// On-chain AMM pool read over JSON-RPC
    Dex,
    /// Streaming oracle feed over a persistent connection
    OracleFeed,
    /// Off-chain HTTP price API
    RestApi,
}

/// Identifier of a market-data source
///
/// Serialized as its kebab-case name so it can key maps in config files.
/// Unknown names parse as `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum SourceId {
    UniswapV2,
    SushiSwap,
    UniswapV3,
    Chainlink,
    Pyth,
    CoinGecko,
    Binance,
    Custom(String),
}

impl SourceId {
    pub fn name(&self) -> &str {
        match self {
            SourceId::UniswapV2 => "uniswap-v2",
            SourceId::SushiSwap => "sushiswap",
            SourceId::UniswapV3 => "uniswap-v3",
            SourceId::Chainlink => "chainlink",
            SourceId::Pyth => "pyth",
            SourceId::CoinGecko => "coingecko",
            SourceId::Binance => "binance",
            SourceId::Custom(name) => name,
        }
    }

    /// Default capability class for the well-known sources
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceId::UniswapV2 | SourceId::SushiSwap | SourceId::UniswapV3 => SourceKind::Dex,
            SourceId::Chainlink | SourceId::Pyth => SourceKind::OracleFeed,
            SourceId::CoinGecko | SourceId::Binance | SourceId::Custom(_) => SourceKind::RestApi,
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "uniswap-v2" => SourceId::UniswapV2,
            "sushiswap" => SourceId::SushiSwap,
            "uniswap-v3" => SourceId::UniswapV3,
            "chainlink" => SourceId::Chainlink,
            "pyth" => SourceId::Pyth,
            "coingecko" => SourceId::CoinGecko,
            "binance" => SourceId::Binance,
            other => SourceId::Custom(other.to_string()),
        }
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        SourceId::from(s.as_str())
    }
}

impl From<SourceId> for String {
    fn from(id: SourceId) -> Self {
        id.name().to_string()
    }
}

impl FromStr for SourceId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(SourceId::from(s))
    }
}

/// Directional token pair: price of `token_a` quoted in `token_b`
///
/// `(A, B)` and `(B, A)` are distinct keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenPair {
    pub token_a: Address,
    pub token_b: Address,
}

impl TokenPair {
    pub fn new(token_a: Address, token_b: Address) -> Self {
        Self { token_a, token_b }
    }

    pub fn reversed(&self) -> Self {
        Self {
            token_a: self.token_b,
            token_b: self.token_a,
        }
    }

    /// Order the tokens by address, for callers that want `(A,B) == (B,A)`
    pub fn canonical(&self) -> Self {
        if self.token_a <= self.token_b {
            *self
        } else {
            self.reversed()
        }
    }
}

impl fmt::Display for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.token_a, self.token_b)
    }
}

/// Wall-clock time in milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_ids() {
        assert_eq!(ChainId::Ethereum.chain_id(), 1);
        assert_eq!(ChainId::Arbitrum.chain_id(), 42161);
        assert_eq!(ChainId::Base.chain_id(), 8453);
    }

    #[test]
    fn test_source_id_parsing() {
        assert_eq!(SourceId::from("Chainlink"), SourceId::Chainlink);
        assert_eq!(SourceId::from("uniswap-v3").kind(), SourceKind::Dex);
        assert_eq!(
            SourceId::from("my-feed"),
            SourceId::Custom("my-feed".to_string())
        );
        assert_eq!(SourceId::Custom("my-feed".into()).to_string(), "my-feed");
    }

    #[test]
    fn test_source_id_as_map_key() {
        let json = r#"{"chainlink": 2.0, "uniswap-v2": 3.0}"#;
        let weights: std::collections::HashMap<SourceId, f64> = serde_json::from_str(json).unwrap();
        assert_eq!(weights[&SourceId::Chainlink], 2.0);
        assert_eq!(weights[&SourceId::UniswapV2], 3.0);
    }

    #[test]
    fn test_pair_is_directional() {
        let a = Address::repeat_byte(1);
        let b = Address::repeat_byte(2);
        let ab = TokenPair::new(a, b);
        let ba = TokenPair::new(b, a);

        assert_ne!(ab, ba);
        assert_eq!(ab.reversed(), ba);
        assert_eq!(ba.canonical(), ab);
    }
}
