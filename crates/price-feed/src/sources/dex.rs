//! On-chain constant-product pool source (JSON-RPC over HTTP)

use alloy_primitives::{hex, Address, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use oracle_core::{
    now_ms, to_token_units, ConstantProductPool, DexPoolConfig, Quote, SourceError, SourceId,
    SourceKind, SourceResult, TokenPair,
};

use super::{transport_error, SourceAdapter};

/// `getReserves()` selector
const GET_RESERVES: &str = "0x0902f1ac";

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Reads reserves of configured pools and prices pairs from them
pub struct DexAdapter {
    id: SourceId,
    rpc_url: String,
    pools: Vec<DexPoolConfig>,
    client: reqwest::Client,
    request_id: AtomicU64,
    online: AtomicBool,
}

impl DexAdapter {
    pub fn new(
        id: SourceId,
        rpc_url: String,
        pools: Vec<DexPoolConfig>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            id,
            rpc_url,
            pools,
            client,
            request_id: AtomicU64::new(1),
            online: AtomicBool::new(true),
        }
    }

    fn pool_for(&self, pair: &TokenPair) -> Option<&DexPoolConfig> {
        self.pools.iter().find(|p| {
            (p.token0 == pair.token_a && p.token1 == pair.token_b)
                || (p.token0 == pair.token_b && p.token1 == pair.token_a)
        })
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> SourceResult<String> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .client
            .post(&self.rpc_url)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(&self.id, e))?;

        if !response.status().is_success() {
            return Err(SourceError::Transport(format!(
                "{}: {} returned HTTP {}",
                self.id,
                method,
                response.status()
            )));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponse(format!("{}: {}", self.id, e)))?;

        if let Some(err) = body.error {
            return Err(SourceError::Transport(format!(
                "{}: {} failed ({}): {}",
                self.id, method, err.code, err.message
            )));
        }

        body.result
            .ok_or_else(|| SourceError::InvalidResponse(format!("{}: {} has no result", self.id, method)))
    }

    async fn block_number(&self, timeout: Duration) -> SourceResult<u64> {
        let result = self
            .call("eth_blockNumber", serde_json::json!([]), timeout)
            .await?;
        u64::from_str_radix(result.trim_start_matches("0x"), 16)
            .map_err(|e| SourceError::InvalidResponse(format!("block number {}: {}", result, e)))
    }

    async fn reserves(&self, pool: Address, timeout: Duration) -> SourceResult<(U256, U256)> {
        let params = serde_json::json!([
            { "to": pool.to_string(), "data": GET_RESERVES },
            "latest"
        ]);
        let result = self.call("eth_call", params, timeout).await?;
        decode_reserves(&result)
    }

    async fn fetch_from_chain(
        &self,
        pair: TokenPair,
        pool_config: &DexPoolConfig,
        timeout: Duration,
    ) -> SourceResult<Quote> {
        let block_number = self.block_number(timeout).await?;
        let (reserve0, reserve1) = self.reserves(pool_config.pool, timeout).await?;

        let pool = ConstantProductPool {
            address: pool_config.pool,
            token0: pool_config.token0,
            token1: pool_config.token1,
            decimals0: pool_config.decimals0,
            decimals1: pool_config.decimals1,
            reserve0,
            reserve1,
            fee_bps: pool_config.fee_bps,
            block_number,
        };

        let price = pool.spot_price(pair.token_a).ok_or(SourceError::NoData(pair))?;

        let base_decimals = if pair.token_a == pool.token0 {
            pool.decimals0
        } else {
            pool.decimals1
        };
        let trade = to_token_units(pool_config.reference_trade, base_decimals).unwrap_or(U256::ZERO);
        let slippage = if trade.is_zero() {
            0.0
        } else {
            pool.price_impact(trade, pair.token_a).clamp(0.0, 1.0)
        };

        debug!(
            "{} pool {} block {} reserves {}/{}",
            self.id, pool.address, block_number, reserve0, reserve1
        );

        Ok(Quote {
            source: self.id.clone(),
            token_a: pair.token_a,
            token_b: pair.token_b,
            price,
            liquidity: pool.normalized_reserve(pair.token_b),
            volume_24h: U256::ZERO,
            timestamp_ms: now_ms(),
            block_height: block_number,
            confidence: pool_config.confidence,
            spread: pool.fee_fraction(),
            slippage,
        })
    }
}

/// Decode `(uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast)`
fn decode_reserves(result: &str) -> SourceResult<(U256, U256)> {
    let bytes = hex::decode(result.trim_start_matches("0x"))
        .map_err(|e| SourceError::InvalidResponse(format!("getReserves: {}", e)))?;

    if bytes.len() < 64 {
        return Err(SourceError::InvalidResponse(format!(
            "getReserves returned {} bytes",
            bytes.len()
        )));
    }

    Ok((
        U256::from_be_slice(&bytes[0..32]),
        U256::from_be_slice(&bytes[32..64]),
    ))
}

#[async_trait]
impl SourceAdapter for DexAdapter {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Dex
    }

    async fn fetch(&self, pair: TokenPair, timeout: Duration) -> SourceResult<Quote> {
        let pool_config = self.pool_for(&pair).ok_or(SourceError::Unsupported(pair))?;

        let result = self.fetch_from_chain(pair, pool_config, timeout).await;
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
