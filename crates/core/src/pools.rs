//! Constant-product pool math used by on-chain sources

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::fixed::{pow10, PRICE_SCALE};

/// Fee denominator; a fee of this many basis points is 100%
pub const MAX_FEE_BPS: u16 = 10_000;

/// Uniswap V2 style pool (constant product) with token decimals attached
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstantProductPool {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    pub decimals0: u8,
    pub decimals1: u8,
    pub reserve0: U256,
    pub reserve1: U256,
    pub fee_bps: u16,  // Usually 30 (0.3%)
    pub block_number: u64,
}

impl ConstantProductPool {
    pub fn contains(&self, token: Address) -> bool {
        token == self.token0 || token == self.token1
    }

    /// (reserve_in, reserve_out, decimals_in, decimals_out) when selling `token_in`
    fn sides(&self, token_in: Address) -> (U256, U256, u8, u8) {
        if token_in == self.token0 {
            (self.reserve0, self.reserve1, self.decimals0, self.decimals1)
        } else {
            (self.reserve1, self.reserve0, self.decimals1, self.decimals0)
        }
    }

    /// Calculate output amount using constant product formula
    /// amountOut = (amountIn * fee * reserveOut) / (reserveIn * 10000 + amountIn * fee)
    pub fn get_amount_out(&self, amount_in: U256, token_in: Address) -> U256 {
        if amount_in.is_zero() {
            return U256::ZERO;
        }

        let (reserve_in, reserve_out, _, _) = self.sides(token_in);

        if reserve_in.is_zero() || reserve_out.is_zero() {
            return U256::ZERO;
        }

        // A fee at or above 100% leaves nothing to trade
        let fee_multiplier = U256::from(MAX_FEE_BPS.saturating_sub(self.fee_bps));
        let amount_in_with_fee = amount_in * fee_multiplier;
        let numerator = amount_in_with_fee * reserve_out;
        let denominator = reserve_in * U256::from(MAX_FEE_BPS) + amount_in_with_fee;

        numerator / denominator
    }

    /// Spot price of one whole `base` token in the other token, 1e18 fixed point.
    ///
    /// Reserves are normalised by token decimals. `None` if the pool is empty.
    pub fn spot_price(&self, base: Address) -> Option<U256> {
        let (reserve_in, reserve_out, dec_in, dec_out) = self.sides(base);
        if reserve_in.is_zero() || reserve_out.is_zero() {
            return None;
        }

        let numerator = reserve_out * pow10(dec_in) * PRICE_SCALE;
        let denominator = reserve_in * pow10(dec_out);
        Some(numerator / denominator)
    }

    /// Reserve of `token` expressed in 1e18 units
    pub fn normalized_reserve(&self, token: Address) -> U256 {
        let (reserve, _, decimals, _) = self.sides(token);
        reserve * PRICE_SCALE / pow10(decimals)
    }

    /// Calculate price impact for a trade
    pub fn price_impact(&self, amount_in: U256, token_in: Address) -> f64 {
        let amount_out = self.get_amount_out(amount_in, token_in);
        if amount_out.is_zero() || amount_in.is_zero() {
            return 1.0;
        }

        let in_f64: f64 = amount_in.to_string().parse().unwrap_or(0.0);
        let out_f64: f64 = amount_out.to_string().parse().unwrap_or(0.0);

        let (reserve_in, reserve_out, _, _) = self.sides(token_in);

        let r_in: f64 = reserve_in.to_string().parse().unwrap_or(1.0);
        let r_out: f64 = reserve_out.to_string().parse().unwrap_or(1.0);

        let spot = r_out / r_in;
        let effective = out_f64 / in_f64;

        1.0 - (effective / spot)
    }

    /// Get fee as a fraction
    pub fn fee_fraction(&self) -> f64 {
        self.fee_bps as f64 / MAX_FEE_BPS as f64
    }
}
