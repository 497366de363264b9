//! # Multi-Asset Deposit Router
//!
//! Converts a deposit of any accepted asset into base units before the
//! ledger sees it. The router is read-only: it validates, prices, and
//! converts. Moving custody and minting shares are the vault's job, and
//! happen only after the router has produced a number.
//!
//! ## Conversion
//!
//! For an asset with `d_a` decimals priced at `price * 10^exponent` base
//! units per whole token, in a vault whose base asset has `d_b` decimals:
//!
//! ```text
//! base_equivalent = floor(amount * price * 10^(d_b + exponent - d_a))
//! ```
//!
//! A negative shift divides, a positive one multiplies. Example: 0.01 WBTC
//! (`amount = 1_000_000`, `d_a = 8`) at $50,000 (`price = 5_000_000`,
//! `exponent = -2`) into a 6-decimal base: shift is `6 - 2 - 8 = -4`, so
//! `5_000_000_000_000 / 10^4 = 500_000_000`, i.e. exactly 500.00.

use chrono::{DateTime, Utc};
use meridian_protocol::config::VaultConfig;
use meridian_protocol::oracle::{OracleError, PriceOracle};
use meridian_protocol::types::{Address, Amount, FeedId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::asset_registry::AssetRegistry;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Routing failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// The asset is unknown or no longer accepted.
    #[error("token {0} is not accepted")]
    TokenNotAccepted(Address),

    /// Zero-amount deposits are rejected.
    #[error("invalid amount: deposits must be non-zero")]
    InvalidAmount,

    /// The quote is older than the vault's maximum price age.
    #[error("stale price for feed {feed}: {age_secs}s old, maximum {max_age_secs}s")]
    PriceStale {
        feed: FeedId,
        age_secs: u64,
        max_age_secs: u64,
    },

    /// The quote is non-positive or too uncertain.
    #[error("invalid price for feed {feed}: {reason}")]
    InvalidPrice { feed: FeedId, reason: String },

    /// The oracle has no quote for the feed.
    #[error("no price available for feed {0}")]
    PriceUnavailable(FeedId),

    /// The conversion left the `u128` range.
    #[error("conversion overflow")]
    Overflow,
}

impl From<OracleError> for RouterError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::NoData(feed) => RouterError::PriceUnavailable(feed),
            OracleError::Stale {
                feed,
                age_secs,
                max_age_secs,
            } => RouterError::PriceStale {
                feed,
                age_secs,
                max_age_secs,
            },
            OracleError::InvalidPrice { feed, reason } => RouterError::InvalidPrice { feed, reason },
        }
    }
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Converts `amount` of an asset into base units. Rounds down.
pub fn to_base_units(
    amount: Amount,
    price: u128,
    exponent: i32,
    asset_decimals: u8,
    base_decimals: u8,
) -> Result<Amount, RouterError> {
    let value = amount.checked_mul(price).ok_or(RouterError::Overflow)?;
    let shift = i64::from(base_decimals) + i64::from(exponent) - i64::from(asset_decimals);

    if shift >= 0 {
        let exp = u32::try_from(shift).map_err(|_| RouterError::Overflow)?;
        let factor = 10u128.checked_pow(exp).ok_or(RouterError::Overflow)?;
        value.checked_mul(factor).ok_or(RouterError::Overflow)
    } else {
        let exp = u32::try_from(-shift).map_err(|_| RouterError::Overflow)?;
        // A divisor beyond u128 rounds everything down to zero.
        Ok(match 10u128.checked_pow(exp) {
            Some(divisor) => value / divisor,
            None => 0,
        })
    }
}

/// Result of a token deposit preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDepositPreview {
    /// Value of the deposit in base units.
    pub base_equivalent: Amount,
    /// Shares the deposit would mint.
    pub shares: Amount,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Prices deposits against one vault's configuration and asset table.
#[derive(Debug, Clone, Copy)]
pub struct DepositRouter<'a> {
    config: &'a VaultConfig,
    registry: &'a AssetRegistry,
}

impl<'a> DepositRouter<'a> {
    pub fn new(config: &'a VaultConfig, registry: &'a AssetRegistry) -> Self {
        Self { config, registry }
    }

    /// Validates a deposit of `amount` of `asset` and returns its base
    /// equivalent.
    ///
    /// The base asset converts 1:1 without touching the oracle. Any other
    /// asset is priced by its feed, and the quote must be no older than the
    /// vault's maximum price age at `now`.
    pub fn quote<O: PriceOracle + ?Sized>(
        &self,
        oracle: &O,
        asset: &Address,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<Amount, RouterError> {
        let config = self
            .registry
            .get(asset)
            .filter(|c| c.accepted)
            .ok_or(RouterError::TokenNotAccepted(*asset))?;
        if amount == 0 {
            return Err(RouterError::InvalidAmount);
        }
        if *asset == self.config.base_asset {
            return Ok(amount);
        }

        let feed = config.price_feed;
        let quote = oracle.get_price(&feed)?;
        let price = quote.validate(
            feed,
            now,
            self.config.max_price_age(),
            self.config.max_confidence_bps,
        )?;
        let base_equivalent = to_base_units(
            amount,
            price,
            quote.exponent,
            config.decimals,
            self.config.base_decimals,
        )?;

        tracing::debug!(
            %asset,
            amount,
            price,
            exponent = quote.exponent,
            base_equivalent,
            "priced token deposit"
        );
        Ok(base_equivalent)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_protocol::oracle::{FixedPriceOracle, PriceQuote};

    fn usdc() -> Address {
        Address::derive("usdc")
    }

    fn wbtc() -> Address {
        Address::derive("wbtc")
    }

    fn btc_feed() -> FeedId {
        FeedId::derive("BTC/USD")
    }

    fn setup() -> (VaultConfig, AssetRegistry, FixedPriceOracle) {
        let config = VaultConfig::new(Address::derive("vault"), usdc(), 6);
        let mut registry = AssetRegistry::new(usdc(), 6);
        registry.configure(usdc(), FeedId::NO_ORACLE, 6, Some(6)).unwrap();
        registry.configure(wbtc(), btc_feed(), 8, Some(8)).unwrap();
        let mut oracle = FixedPriceOracle::new();
        oracle.set_quote(btc_feed(), PriceQuote::fresh(5_000_000, -2));
        (config, registry, oracle)
    }

    #[test]
    fn wbtc_at_fifty_thousand() {
        assert_eq!(to_base_units(1_000_000, 5_000_000, -2, 8, 6), Ok(500_000_000));
    }

    #[test]
    fn positive_shift_multiplies() {
        // 1 whole 2-decimal token at price 3 (exponent 0) into 6 decimals.
        assert_eq!(to_base_units(100, 3, 0, 2, 6), Ok(3_000_000));
    }

    #[test]
    fn conversion_rounds_down() {
        // 1 unit of an 18-decimal token at $1 is far below one base unit.
        assert_eq!(to_base_units(1, 1, 0, 18, 6), Ok(0));
        assert_eq!(to_base_units(1_999_999_999_999, 1, 0, 18, 6), Ok(1));
    }

    #[test]
    fn overflow_detected() {
        assert_eq!(to_base_units(Amount::MAX, 2, 0, 6, 6), Err(RouterError::Overflow));
        assert_eq!(to_base_units(1, 1, 60, 0, 0), Err(RouterError::Overflow));
    }

    #[test]
    fn base_asset_skips_oracle() {
        let (config, registry, _) = setup();
        let empty = FixedPriceOracle::new();
        let router = DepositRouter::new(&config, &registry);
        assert_eq!(router.quote(&empty, &usdc(), 1_000, Utc::now()), Ok(1_000));
    }

    #[test]
    fn quote_uses_feed() {
        let (config, registry, oracle) = setup();
        let router = DepositRouter::new(&config, &registry);
        assert_eq!(
            router.quote(&oracle, &wbtc(), 1_000_000, Utc::now()),
            Ok(500_000_000)
        );
    }

    #[test]
    fn stale_quote_rejected() {
        let (config, registry, mut oracle) = setup();
        let mut quote = PriceQuote::fresh(5_000_000, -2);
        quote.publish_time = Utc::now() - chrono::Duration::seconds(3_600);
        oracle.set_quote(btc_feed(), quote);

        let router = DepositRouter::new(&config, &registry);
        let err = router.quote(&oracle, &wbtc(), 1_000_000, Utc::now()).unwrap_err();
        assert!(matches!(err, RouterError::PriceStale { max_age_secs: 60, .. }));
    }

    #[test]
    fn negative_price_rejected() {
        let (config, registry, mut oracle) = setup();
        oracle.set_quote(btc_feed(), PriceQuote::fresh(-1, -2));
        let router = DepositRouter::new(&config, &registry);
        let err = router.quote(&oracle, &wbtc(), 1, Utc::now()).unwrap_err();
        assert!(matches!(err, RouterError::InvalidPrice { .. }));
    }

    #[test]
    fn missing_quote_is_unavailable() {
        let (config, registry, mut oracle) = setup();
        oracle.clear(&btc_feed());
        let router = DepositRouter::new(&config, &registry);
        assert_eq!(
            router.quote(&oracle, &wbtc(), 1, Utc::now()),
            Err(RouterError::PriceUnavailable(btc_feed()))
        );
    }

    #[test]
    fn unaccepted_token_checked_before_amount() {
        let (config, mut registry, oracle) = setup();
        registry.remove(&wbtc()).unwrap();
        let router = DepositRouter::new(&config, &registry);
        assert_eq!(
            router.quote(&oracle, &wbtc(), 0, Utc::now()),
            Err(RouterError::TokenNotAccepted(wbtc()))
        );
        assert_eq!(
            router.quote(&oracle, &usdc(), 0, Utc::now()),
            Err(RouterError::InvalidAmount)
        );
    }
}
