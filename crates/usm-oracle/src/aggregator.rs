//! Feed combination and the refresh-driven price cache.
//!
//! The aggregator combines either a single feed or a median of three, and
//! owns the one price the engine trades against. The cached price moves only
//! when [`MedianAggregator::refresh`] runs: quoting and state transitions in
//! the engine read the cache, never the live feeds, so one operation sees
//! one price.

use serde::{Deserialize, Serialize};
use usm_math::U256;

use crate::feed::{AggregatedFeed, DirectFeed};
use crate::median::median3;
use crate::twap::PooledTwapFeed;
use crate::{OracleError, Result};

/// One underlying price source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PriceFeed {
    /// Operator-written coin-info store.
    Direct(DirectFeed),
    /// Push-value feed with fixed source decimals.
    Aggregated(AggregatedFeed),
    /// Cumulative-price TWAP over a pooled pair.
    PooledTwap(PooledTwapFeed),
}

impl PriceFeed {
    /// The feed's current price, normalized to WAD.
    ///
    /// # Errors
    ///
    /// Propagates the underlying feed's error.
    pub fn latest_price(&self) -> Result<U256> {
        match self {
            PriceFeed::Direct(feed) => feed.latest_price(),
            PriceFeed::Aggregated(feed) => feed.latest_price(),
            PriceFeed::PooledTwap(feed) => feed.latest_price(),
        }
    }

    fn commit(&mut self) {
        if let PriceFeed::PooledTwap(feed) = self {
            feed.commit_sample();
        }
    }
}

/// The price the engine trades against, and when it was refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPrice {
    /// WAD price of the collateral in quote terms.
    pub value: U256,
    /// Unix seconds of the refresh that produced it.
    pub cached_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Feeds {
    Single(Box<PriceFeed>),
    Triple(Box<[PriceFeed; 3]>),
}

/// One or three feeds plus the explicit-refresh price cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedianAggregator {
    feeds: Feeds,
    cached: Option<CachedPrice>,
}

impl MedianAggregator {
    /// Aggregator over a single feed.
    pub fn single(feed: PriceFeed) -> Self {
        Self {
            feeds: Feeds::Single(Box::new(feed)),
            cached: None,
        }
    }

    /// Aggregator taking the median of three feeds.
    pub fn median(a: PriceFeed, b: PriceFeed, c: PriceFeed) -> Self {
        Self {
            feeds: Feeds::Triple(Box::new([a, b, c])),
            cached: None,
        }
    }

    /// Combined live price: the single feed's price, or the median of three.
    ///
    /// Does not touch the cache.
    ///
    /// # Errors
    ///
    /// Propagates the first failing feed's error.
    pub fn latest_price(&self) -> Result<U256> {
        match &self.feeds {
            Feeds::Single(feed) => feed.latest_price(),
            Feeds::Triple(feeds) => {
                let a = feeds[0].latest_price()?;
                let b = feeds[1].latest_price()?;
                let c = feeds[2].latest_price()?;
                Ok(median3(a, b, c))
            }
        }
    }

    /// Recompute the combined price, commit TWAP samples, and move the cache.
    ///
    /// Quoting happens before the commit so TWAP feeds average over the
    /// window that was open when `refresh` was called.
    ///
    /// # Errors
    ///
    /// Propagates feed errors; the cache is untouched on failure.
    pub fn refresh(&mut self, now: u64) -> Result<U256> {
        let value = self.latest_price()?;
        match &mut self.feeds {
            Feeds::Single(feed) => feed.commit(),
            Feeds::Triple(feeds) => {
                for feed in feeds.iter_mut() {
                    feed.commit();
                }
            }
        }
        tracing::debug!(%value, now, "price cache refreshed");
        self.cached = Some(CachedPrice {
            value,
            cached_at: now,
        });
        Ok(value)
    }

    /// The cached price.
    ///
    /// # Errors
    ///
    /// - [`OracleError::PriceNotCached`] if `refresh` has never succeeded
    pub fn read_cached(&self) -> Result<CachedPrice> {
        self.cached.ok_or(OracleError::PriceNotCached)
    }

    /// Mutable access to an underlying feed, for operator updates and pair
    /// readings. Index 0 for a single-feed aggregator.
    pub fn feed_mut(&mut self, index: usize) -> Option<&mut PriceFeed> {
        match &mut self.feeds {
            Feeds::Single(feed) => (index == 0).then_some(feed.as_mut()),
            Feeds::Triple(feeds) => feeds.get_mut(index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::DirectFeed;
    use crate::twap::CumulativeSample;
    use usm_math::WAD;

    fn direct_250() -> PriceFeed {
        let mut feed = DirectFeed::new("ETH/USD", 18);
        feed.update_coin_info("ETH/USD", WAD * U256::from(250u64), U256::zero(), 1);
        PriceFeed::Direct(feed)
    }

    #[test]
    fn test_cache_empty_until_refresh() {
        let mut agg = MedianAggregator::single(direct_250());
        assert!(matches!(
            agg.read_cached(),
            Err(OracleError::PriceNotCached)
        ));
        agg.refresh(100).expect("refresh");
        let cached = agg.read_cached().expect("cached");
        assert_eq!(cached.value, WAD * U256::from(250u64));
        assert_eq!(cached.cached_at, 100);
    }

    #[test]
    fn test_cache_holds_until_next_refresh() {
        let mut agg = MedianAggregator::single(direct_250());
        agg.refresh(100).expect("refresh");
        if let Some(PriceFeed::Direct(feed)) = agg.feed_mut(0) {
            feed.update_coin_info("ETH/USD", WAD * U256::from(300u64), U256::zero(), 150);
        }
        // Live price moved; the cache has not.
        assert_eq!(agg.latest_price().expect("live"), WAD * U256::from(300u64));
        assert_eq!(
            agg.read_cached().expect("cached").value,
            WAD * U256::from(250u64)
        );
        agg.refresh(200).expect("refresh");
        assert_eq!(
            agg.read_cached().expect("cached").value,
            WAD * U256::from(300u64)
        );
    }

    #[test]
    fn test_failed_refresh_leaves_cache() {
        let mut agg = MedianAggregator::single(direct_250());
        agg.refresh(100).expect("refresh");
        if let Some(PriceFeed::Direct(feed)) = agg.feed_mut(0) {
            feed.update_coin_info("ETH/USD", U256::zero(), U256::zero(), 150);
        }
        assert!(agg.refresh(200).is_err());
        let cached = agg.read_cached().expect("cached survives");
        assert_eq!(cached.value, WAD * U256::from(250u64));
        assert_eq!(cached.cached_at, 100);
    }

    #[test]
    fn test_median_of_three_feeds() {
        let mut chainlink = AggregatedFeed::new("ETH/USD", 8);
        chainlink.set_value(U256::from(38_598_000_000u64), 1_606_780_564);
        let mut compound = AggregatedFeed::new("ETH/USD", 6);
        compound.set_value(U256::from(414_174_999u64), 1_606_780_564);
        let twap = PooledTwapFeed::new(
            18,
            6,
            true,
            CumulativeSample {
                cumulative0: U256::zero(),
                cumulative1: U256::from_dec_str("31377639132666967530700283664103")
                    .expect("fixture"),
                timestamp: 1_606_780_664,
            },
        );
        let mut agg = MedianAggregator::median(
            PriceFeed::Aggregated(chainlink),
            PriceFeed::Aggregated(compound),
            PriceFeed::PooledTwap(twap),
        );
        if let Some(PriceFeed::PooledTwap(feed)) = agg.feed_mut(2) {
            feed.set_pair_reading(CumulativeSample {
                cumulative0: U256::zero(),
                cumulative1: U256::from_dec_str("31378725947216452626380862836246")
                    .expect("fixture"),
                timestamp: 1_606_781_003,
            });
        }
        let price = agg.refresh(1_606_781_003).expect("refresh");
        // TWAP lands at 617.44, so the Compound quote is the median.
        assert_eq!(price, U256::from(414_174_999_000_000_000_000u128));
        assert_eq!(agg.read_cached().expect("cached").value, price);
    }
}
