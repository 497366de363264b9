//! # Valuation Oracle Client
//!
//! The vault never computes prices; it asks a [`PriceOracle`] and decides
//! whether the answer is usable. One lookup is one synchronous call that
//! either yields a [`PriceQuote`] or fails the whole operation. Retrying a
//! stale feed is the caller's business, which is why [`OracleError::Stale`]
//! is distinguishable from the permanent failures.
//!
//! A quote is usable when:
//!
//! 1. its age (`|now - publish_time|`) is at most the configured maximum,
//! 2. its price is strictly positive, and
//! 3. its confidence interval is at most `max_confidence_bps` of the price.
//!
//! Age is measured in both directions. A quote stamped ahead of `now` is
//! as untrustworthy as one stamped behind it, so clock skew counts against
//! the same limit as staleness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::config::BPS_DENOMINATOR;
use crate::types::FeedId;

/// Oracle lookup and quote-validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// The oracle has no price for this feed.
    #[error("no price data for feed {0}")]
    NoData(FeedId),

    /// The quote is older than the allowed maximum.
    #[error("stale price for feed {feed}: age {age_secs}s exceeds {max_age_secs}s")]
    Stale {
        feed: FeedId,
        age_secs: u64,
        max_age_secs: u64,
    },

    /// The quote is unusable: non-positive price or excessive uncertainty.
    #[error("invalid price for feed {feed}: {reason}")]
    InvalidPrice { feed: FeedId, reason: String },
}

/// A price quote as returned by the oracle.
///
/// The real price is `price * 10^exponent`, quoted in base-asset whole
/// units. `confidence` uses the same scale as `price`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price: i64,
    pub confidence: u64,
    pub exponent: i32,
    pub publish_time: DateTime<Utc>,
}

impl PriceQuote {
    /// A quote published right now with zero confidence interval.
    pub fn fresh(price: i64, exponent: i32) -> Self {
        Self {
            price,
            confidence: 0,
            exponent,
            publish_time: Utc::now(),
        }
    }

    /// Distance between `now` and the publish time, in either direction.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        let delta = now - self.publish_time;
        let delta = if delta < chrono::Duration::zero() { -delta } else { delta };
        delta.to_std().unwrap_or(Duration::MAX)
    }

    /// Validates this quote against the staleness and confidence limits and
    /// returns the price as an unsigned magnitude.
    pub fn validate(
        &self,
        feed: FeedId,
        now: DateTime<Utc>,
        max_age: Duration,
        max_confidence_bps: u32,
    ) -> Result<u128, OracleError> {
        let age = self.age_at(now);
        if age > max_age {
            return Err(OracleError::Stale {
                feed,
                age_secs: age.as_secs(),
                max_age_secs: max_age.as_secs(),
            });
        }

        if self.price <= 0 {
            return Err(OracleError::InvalidPrice {
                feed,
                reason: format!("non-positive price {}", self.price),
            });
        }
        let price = self.price as u128;

        // confidence / price <= max_bps / 10_000, cross-multiplied.
        let lhs = (self.confidence as u128).saturating_mul(BPS_DENOMINATOR as u128);
        let rhs = price.saturating_mul(max_confidence_bps as u128);
        if lhs > rhs {
            return Err(OracleError::InvalidPrice {
                feed,
                reason: format!(
                    "confidence {} exceeds {} bps of price {}",
                    self.confidence, max_confidence_bps, self.price
                ),
            });
        }

        Ok(price)
    }
}

/// An external price-feed service.
pub trait PriceOracle {
    /// Returns the latest quote for `feed`, or [`OracleError::NoData`].
    fn get_price(&self, feed: &FeedId) -> Result<PriceQuote, OracleError>;
}

/// An oracle answering from a fixed table of quotes.
///
/// Useful for tests, dry runs, and embedding the vault behind a cache that
/// is refreshed out-of-band.
#[derive(Debug, Clone, Default)]
pub struct FixedPriceOracle {
    quotes: HashMap<FeedId, PriceQuote>,
}

impl FixedPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets (or replaces) the quote for `feed`.
    pub fn set_quote(&mut self, feed: FeedId, quote: PriceQuote) {
        self.quotes.insert(feed, quote);
    }

    /// Forgets the quote for `feed`; subsequent lookups return `NoData`.
    pub fn clear(&mut self, feed: &FeedId) {
        self.quotes.remove(feed);
    }
}

impl PriceOracle for FixedPriceOracle {
    fn get_price(&self, feed: &FeedId) -> Result<PriceQuote, OracleError> {
        self.quotes
            .get(feed)
            .copied()
            .ok_or(OracleError::NoData(*feed))
    }
}
