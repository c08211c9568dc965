//! # usm-engine
//!
//! The USM/FUM reserve engine: a two-token system over a single collateral
//! pool. USM is the stable token, created and redeemed at the oracle price;
//! FUM is the leveraged equity token absorbing the pool's price risk. Four
//! operations move state — `fund`/`defund` trade FUM against collateral,
//! `mint`/`burn` trade USM — each an atomic transaction quoting off the
//! cached oracle price, guarded before anything is written.
//!
//! ## Modules
//!
//! - [`ledger`] — the collateral pool and token supplies
//! - [`adjustment`] — lazily-decayed buy/sell skew and FUM price floor
//! - [`curve`] — quote prices and the closed-form trade integrals
//! - [`protocol`] — the operation state machine tying it together

pub mod adjustment;
pub mod curve;
pub mod ledger;
pub mod protocol;

pub use adjustment::{AdjustmentState, TimedValue};
pub use ledger::ReserveLedger;
pub use protocol::Protocol;

use usm_math::{MathError, U256};
use usm_oracle::OracleError;

/// Debt ratio ceiling: USM debt may back at most 80% of the pool's value.
pub const MAX_DEBT_RATIO: U256 = U256([800_000_000_000_000_000, 0, 0, 0]);

/// Half-life of the buy/sell adjustment's decay back to neutral, seconds.
pub const BUY_SELL_ADJUSTMENT_HALF_LIFE: u64 = 60;

/// Half-life of the minimum FUM buy price's decay to zero, seconds.
pub const MIN_FUM_BUY_PRICE_HALF_LIFE: u64 = 86_400;

/// Which side of a quote the caller is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Caller acquires the token; prices round against the buyer.
    Buy,
    /// Caller disposes of the token; prices round against the seller.
    Sell,
}

/// Error types for engine operations. Every error is fatal to the operation
/// that raised it; no state is written on the error path.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A zero amount was passed where a trade was expected.
    #[error("amount must be nonzero")]
    InvalidAmount,

    /// USM cannot be created or destroyed before any FUM exists.
    #[error("no FUM supply: fund before minting")]
    NoFumSupply,

    /// Redemption larger than the outstanding supply.
    #[error("requested {requested} exceeds outstanding supply {supply}")]
    InsufficientSupply {
        /// Amount the caller asked to redeem.
        requested: U256,
        /// Outstanding supply of the token.
        supply: U256,
    },

    /// The trade would leave the debt ratio above [`MAX_DEBT_RATIO`].
    #[error("debt ratio would exceed the maximum")]
    DebtRatioAboveMax,

    /// The pool is underwater; USM redemption is suspended above 100%.
    #[error("debt ratio is above 100%")]
    DebtRatioAbove100,

    /// The computed output fell below the caller's bound.
    #[error("output {actual} below caller minimum {minimum}")]
    Slippage {
        /// The caller's minimum acceptable output.
        minimum: U256,
        /// The output the trade would have produced.
        actual: U256,
    },

    /// The price pipeline failed.
    #[error(transparent)]
    Oracle(#[from] OracleError),

    /// Fixed-point arithmetic failed.
    #[error(transparent)]
    Math(#[from] MathError),
}

/// Convenience result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
