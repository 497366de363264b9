//! # Vault Configuration & Constants
//!
//! Every magic number in the vault lives here. If you're hardcoding a
//! staleness window or a basis-point denominator somewhere else, move it.
//!
//! Per-vault parameters live in [`VaultConfig`], which is loaded from TOML
//! at vault creation time and persisted alongside the ledger. Changing a
//! vault's base asset after the first deposit is not supported: every share
//! ever minted is denominated in it.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::types::Address;

// ---------------------------------------------------------------------------
// Oracle Parameters
// ---------------------------------------------------------------------------

/// Default maximum age of a price quote. Anything older is stale and
/// rejected; minting against an hour-old BTC price is how vaults get drained.
pub const DEFAULT_MAX_PRICE_AGE: Duration = Duration::from_secs(60);

/// Default ceiling on quote confidence, as a fraction of price in basis
/// points. 200 bps = the oracle is unsure by at most 2%.
pub const DEFAULT_MAX_CONFIDENCE_BPS: u32 = 200;

/// Basis-point denominator. 10_000 bps = 100%.
pub const BPS_DENOMINATOR: u32 = 10_000;

// ---------------------------------------------------------------------------
// Asset Parameters
// ---------------------------------------------------------------------------

/// Highest decimal precision an asset may declare. Beyond 24 the scaled
/// products in the conversion math start crowding `u128`.
pub const MAX_DECIMALS: u8 = 24;

// ---------------------------------------------------------------------------
// Call Encoding
// ---------------------------------------------------------------------------

/// Width of an encoded amount word in protocol call arguments (big-endian
/// `u128`).
pub const WORD_LENGTH: usize = 16;

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// sled tree holding asset configuration, keyed by asset address.
pub const TREE_ASSETS: &str = "assets";

/// sled tree holding per-holder share balances.
pub const TREE_HOLDERS: &str = "holders";

/// sled tree holding strategy adapters, keyed by strategy id.
pub const TREE_STRATEGIES: &str = "strategies";

/// sled tree holding role grants, keyed by `role || principal`.
pub const TREE_ROLES: &str = "roles";

/// sled tree holding the vault config and ledger totals.
pub const TREE_METADATA: &str = "metadata";

/// Metadata key of the persisted [`VaultConfig`].
pub const META_CONFIG_KEY: &[u8] = b"config";

/// Metadata key of the persisted ledger totals.
pub const META_LEDGER_KEY: &[u8] = b"ledger";

// ---------------------------------------------------------------------------
// VaultConfig
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating a [`VaultConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Per-vault parameters.
///
/// ```toml
/// vault = "0x…"
/// base_asset = "0x…"
/// base_decimals = 6
/// max_price_age_secs = 60
/// max_confidence_bps = 200
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// The vault's own custody account.
    pub vault: Address,
    /// The asset every share is denominated in.
    pub base_asset: Address,
    /// Native precision of the base asset.
    pub base_decimals: u8,
    /// Maximum accepted quote age, in seconds.
    #[serde(default = "default_max_price_age_secs")]
    pub max_price_age_secs: u64,
    /// Maximum accepted quote confidence, in bps of price.
    #[serde(default = "default_max_confidence_bps")]
    pub max_confidence_bps: u32,
}

fn default_max_price_age_secs() -> u64 {
    DEFAULT_MAX_PRICE_AGE.as_secs()
}

fn default_max_confidence_bps() -> u32 {
    DEFAULT_MAX_CONFIDENCE_BPS
}

impl VaultConfig {
    /// Creates a config with default oracle limits.
    pub fn new(vault: Address, base_asset: Address, base_decimals: u8) -> Self {
        Self {
            vault,
            base_asset,
            base_decimals,
            max_price_age_secs: default_max_price_age_secs(),
            max_confidence_bps: default_max_confidence_bps(),
        }
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Maximum accepted quote age.
    pub fn max_price_age(&self) -> Duration {
        Duration::from_secs(self.max_price_age_secs)
    }

    /// Checks internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vault.is_zero() {
            return Err(ConfigError::Invalid("vault address is null".into()));
        }
        if self.base_asset.is_zero() {
            return Err(ConfigError::Invalid("base asset is null".into()));
        }
        if self.vault == self.base_asset {
            return Err(ConfigError::Invalid(
                "vault and base asset must differ".into(),
            ));
        }
        if self.base_decimals > MAX_DECIMALS {
            return Err(ConfigError::Invalid(format!(
                "base decimals {} exceed maximum {}",
                self.base_decimals, MAX_DECIMALS
            )));
        }
        if self.max_price_age_secs == 0 {
            return Err(ConfigError::Invalid("max price age must be positive".into()));
        }
        if self.max_confidence_bps > BPS_DENOMINATOR {
            return Err(ConfigError::Invalid(format!(
                "max confidence {} bps exceeds {}",
                self.max_confidence_bps, BPS_DENOMINATOR
            )));
        }
        Ok(())
    }
}
