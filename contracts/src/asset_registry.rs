//! # Asset Registry
//!
//! The sole source of truth for which assets a vault accepts, how precise
//! they are, and which price feed values them.
//!
//! Two rules keep valuation honest:
//!
//! 1. Only the base asset may use the no-oracle sentinel feed. It is valued
//!    1:1 by definition; everything else must be priced.
//! 2. Declared decimals must match the asset's native precision as reported
//!    by custody. A registry that thinks WBTC has 18 decimals mints ten
//!    orders of magnitude too many shares.
//!
//! Removal is a soft delete: the entry stays, `accepted` goes false, and
//! shares already minted against the asset are unaffected.

use meridian_protocol::config::MAX_DECIMALS;
use meridian_protocol::types::{Address, FeedId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Asset configuration failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    /// The null address is not an asset.
    #[error("invalid address: the null address is not an asset")]
    InvalidAddress,

    /// A non-base asset was configured with the no-oracle sentinel.
    #[error("asset {0} requires a price feed")]
    MissingPriceFeed(Address),

    /// The base asset was configured with a real price feed.
    #[error("base asset {0} must use the no-oracle feed")]
    BaseAssetRequiresNoOracle(Address),

    /// Declared decimals disagree with the asset's native precision.
    #[error("decimals mismatch for {asset}: declared {declared}, native {native}")]
    DecimalsMismatch {
        asset: Address,
        declared: u8,
        native: u8,
    },

    /// Declared decimals exceed what the conversion math supports.
    #[error("decimals {0} exceed the supported maximum")]
    InvalidDecimals(u8),

    /// Custody has never heard of this asset.
    #[error("asset {0} is not supported by custody")]
    UnsupportedAsset(Address),

    /// The asset was never configured.
    #[error("asset {0} is not configured")]
    TokenNotConfigured(Address),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Configuration of one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfig {
    pub asset: Address,
    /// Whether new deposits of this asset are routed.
    pub accepted: bool,
    /// Price feed, or [`FeedId::NO_ORACLE`] for the base asset.
    pub price_feed: FeedId,
    /// Native decimal precision.
    pub decimals: u8,
    /// Insertion order. Survives removal and reconfiguration.
    pub position: u64,
}

impl AssetConfig {
    /// `true` if this asset is valued without an oracle lookup.
    pub fn is_unpriced(&self) -> bool {
        self.price_feed == FeedId::NO_ORACLE
    }
}

/// The per-vault asset table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRegistry {
    base_asset: Address,
    base_decimals: u8,
    assets: BTreeMap<Address, AssetConfig>,
    next_position: u64,
}

impl AssetRegistry {
    pub fn new(base_asset: Address, base_decimals: u8) -> Self {
        Self {
            base_asset,
            base_decimals,
            assets: BTreeMap::new(),
            next_position: 0,
        }
    }

    /// Rebuilds a registry from persisted configs.
    pub fn from_configs<I>(base_asset: Address, base_decimals: u8, configs: I) -> Self
    where
        I: IntoIterator<Item = AssetConfig>,
    {
        let assets: BTreeMap<Address, AssetConfig> =
            configs.into_iter().map(|c| (c.asset, c)).collect();
        let next_position = assets
            .values()
            .map(|c| c.position + 1)
            .max()
            .unwrap_or(0);
        Self {
            base_asset,
            base_decimals,
            assets,
            next_position,
        }
    }

    pub fn base_asset(&self) -> &Address {
        &self.base_asset
    }

    /// Adds or reconfigures `asset` and marks it accepted.
    ///
    /// `native_decimals` is the precision custody reports for the asset, or
    /// `None` if custody does not know it. Returns `true` if the asset was
    /// new.
    pub fn configure(
        &mut self,
        asset: Address,
        price_feed: FeedId,
        decimals: u8,
        native_decimals: Option<u8>,
    ) -> Result<bool, AssetError> {
        if asset.is_zero() {
            return Err(AssetError::InvalidAddress);
        }
        if decimals > MAX_DECIMALS {
            return Err(AssetError::InvalidDecimals(decimals));
        }

        let is_base = asset == self.base_asset;
        if is_base && price_feed != FeedId::NO_ORACLE {
            return Err(AssetError::BaseAssetRequiresNoOracle(asset));
        }
        if !is_base && price_feed == FeedId::NO_ORACLE {
            return Err(AssetError::MissingPriceFeed(asset));
        }

        let native = native_decimals.ok_or(AssetError::UnsupportedAsset(asset))?;
        let expected = if is_base { self.base_decimals } else { native };
        if decimals != native || decimals != expected {
            return Err(AssetError::DecimalsMismatch {
                asset,
                declared: decimals,
                native,
            });
        }

        match self.assets.get_mut(&asset) {
            Some(existing) => {
                existing.accepted = true;
                existing.price_feed = price_feed;
                existing.decimals = decimals;
                Ok(false)
            }
            None => {
                let position = self.next_position;
                self.next_position += 1;
                self.assets.insert(
                    asset,
                    AssetConfig {
                        asset,
                        accepted: true,
                        price_feed,
                        decimals,
                        position,
                    },
                );
                Ok(true)
            }
        }
    }

    /// Stops accepting `asset`. The config is kept.
    pub fn remove(&mut self, asset: &Address) -> Result<(), AssetError> {
        if asset.is_zero() {
            return Err(AssetError::InvalidAddress);
        }
        let config = self
            .assets
            .get_mut(asset)
            .ok_or(AssetError::TokenNotConfigured(*asset))?;
        config.accepted = false;
        Ok(())
    }

    pub fn get(&self, asset: &Address) -> Option<&AssetConfig> {
        self.assets.get(asset)
    }

    pub fn is_accepted(&self, asset: &Address) -> bool {
        self.assets.get(asset).map(|c| c.accepted).unwrap_or(false)
    }

    /// Accepted assets, in the order they were first configured.
    pub fn accepted_tokens(&self) -> Vec<Address> {
        let mut accepted: Vec<&AssetConfig> =
            self.assets.values().filter(|c| c.accepted).collect();
        accepted.sort_by_key(|c| c.position);
        accepted.into_iter().map(|c| c.asset).collect()
    }

    /// The underlying table, keyed by asset address.
    pub fn configs(&self) -> &BTreeMap<Address, AssetConfig> {
        &self.assets
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
