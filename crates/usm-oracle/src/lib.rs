//! # usm-oracle
//!
//! Collateral price feeds and median aggregation.
//!
//! The engine prices everything off a single ETH/USD reference, assembled
//! from one or three underlying feeds and normalized to the WAD scale. Feeds
//! come in three shapes: a keyed coin-info store written by an operator, a
//! push-value feed quoting with a fixed number of source decimals, and a
//! two-sample TWAP over a trading pair's cumulative prices. The aggregator
//! caches the combined price; the cache moves only on an explicit
//! [`MedianAggregator::refresh`].
//!
//! ## Modules
//!
//! - [`feed`] — feed sources and decimal normalization
//! - [`twap`] — cumulative-price TWAP over a pooled pair
//! - [`median`] — median-of-three selection
//! - [`aggregator`] — feed combination and the refresh-driven price cache

pub mod aggregator;
pub mod feed;
pub mod median;
pub mod twap;

pub use aggregator::{CachedPrice, MedianAggregator, PriceFeed};
pub use feed::{normalize, AggregatedFeed, CoinInfo, DirectFeed};
pub use median::median3;
pub use twap::{compute_twap, CumulativeSample, PooledTwapFeed};

/// Error types for oracle operations.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// No price has been cached yet; `refresh` must run first.
    #[error("no cached price: refresh the aggregator first")]
    PriceNotCached,

    /// The two TWAP samples do not span any time.
    #[error("no time elapsed between cumulative samples at {timestamp}")]
    ZeroElapsedTime {
        /// Timestamp shared by both samples.
        timestamp: u64,
    },

    /// A feed produced a zero price, which the engine cannot divide by.
    #[error("feed returned a zero price for {symbol}")]
    ZeroPrice {
        /// Symbol the price was requested for.
        symbol: String,
    },

    /// Fixed-point arithmetic failed while normalizing or averaging.
    #[error(transparent)]
    Math(#[from] usm_math::MathError),
}

/// Convenience result type for oracle operations.
pub type Result<T> = std::result::Result<T, OracleError>;
