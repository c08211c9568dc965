//! Price feed sources and decimal normalization.
//!
//! Every source quotes with its own number of fractional digits (8 for the
//! Chainlink-style aggregator, 6 for the Compound-style view, operator-chosen
//! for the coin-info store). [`normalize`] brings a raw quote onto the WAD
//! scale before anything downstream touches it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use usm_math::{MathError, U256};

use crate::{OracleError, Result};

/// Rescale a raw integer price quoted with `source_decimals` fractional
/// digits to the WAD (18-decimal) scale.
///
/// # Errors
///
/// - [`MathError::Overflow`] if the rescaled value exceeds 256 bits
pub fn normalize(raw: U256, source_decimals: u32) -> Result<U256> {
    let ten = U256::from(10u64);
    if source_decimals <= 18 {
        let factor = ten
            .checked_pow(U256::from(18 - source_decimals))
            .ok_or(MathError::Overflow)?;
        Ok(raw.checked_mul(factor).ok_or(MathError::Overflow)?)
    } else {
        let factor = ten
            .checked_pow(U256::from(source_decimals - 18))
            .ok_or(MathError::Overflow)?;
        Ok(raw / factor)
    }
}

/// One keyed record in a [`DirectFeed`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinInfo {
    /// Raw price in the feed's source decimals.
    pub price: U256,
    /// Circulating supply as reported by the operator (informational).
    pub supply: U256,
    /// Unix seconds of the operator's last write.
    pub last_update: u64,
    /// Full symbol name, e.g. `"ETH/USD"`.
    pub symbol: String,
}

/// Operator-written key/value price store.
///
/// Reads of symbols never written return the all-zero record rather than
/// failing; only [`DirectFeed::latest_price`] treats a zero price as an
/// error, since the engine divides by the price. Input validation beyond
/// that is the operator's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectFeed {
    symbol: String,
    source_decimals: u32,
    coins: HashMap<String, CoinInfo>,
}

impl DirectFeed {
    /// Create a feed quoting `symbol` with `source_decimals` fractional
    /// digits.
    pub fn new(symbol: impl Into<String>, source_decimals: u32) -> Self {
        Self {
            symbol: symbol.into(),
            source_decimals,
            coins: HashMap::new(),
        }
    }

    /// Overwrite the record for `symbol`.
    pub fn update_coin_info(&mut self, symbol: &str, price: U256, supply: U256, last_update: u64) {
        tracing::debug!(symbol, %price, last_update, "coin info updated");
        self.coins.insert(
            symbol.to_owned(),
            CoinInfo {
                price,
                supply,
                last_update,
                symbol: symbol.to_owned(),
            },
        );
    }

    /// Read the record for `symbol`, or the all-zero record if never written.
    pub fn get_coin_info(&self, symbol: &str) -> CoinInfo {
        self.coins.get(symbol).cloned().unwrap_or_default()
    }

    /// The feed's quoted price, normalized to WAD.
    ///
    /// # Errors
    ///
    /// - [`OracleError::ZeroPrice`] if the record is unset or zero
    pub fn latest_price(&self) -> Result<U256> {
        let info = self.get_coin_info(&self.symbol);
        if info.price.is_zero() {
            return Err(OracleError::ZeroPrice {
                symbol: self.symbol.clone(),
            });
        }
        normalize(info.price, self.source_decimals)
    }
}

/// Push-value feed in the Chainlink/Compound shape: a single latest value
/// with fixed source decimals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedFeed {
    symbol: String,
    source_decimals: u32,
    value: U256,
    updated_at: u64,
}

impl AggregatedFeed {
    /// Create a feed for `symbol` with `source_decimals` fractional digits
    /// and no value yet.
    pub fn new(symbol: impl Into<String>, source_decimals: u32) -> Self {
        Self {
            symbol: symbol.into(),
            source_decimals,
            value: U256::zero(),
            updated_at: 0,
        }
    }

    /// Push a new raw value.
    pub fn set_value(&mut self, value: U256, updated_at: u64) {
        tracing::debug!(symbol = %self.symbol, %value, updated_at, "feed value updated");
        self.value = value;
        self.updated_at = updated_at;
    }

    /// Unix seconds of the last push.
    pub fn updated_at(&self) -> u64 {
        self.updated_at
    }

    /// The latest pushed value, normalized to WAD.
    ///
    /// # Errors
    ///
    /// - [`OracleError::ZeroPrice`] if no nonzero value was ever pushed
    pub fn latest_price(&self) -> Result<U256> {
        if self.value.is_zero() {
            return Err(OracleError::ZeroPrice {
                symbol: self.symbol.clone(),
            });
        }
        normalize(self.value, self.source_decimals)
    }
}
