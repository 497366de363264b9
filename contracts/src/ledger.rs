//! # Vault Ledger
//!
//! Share/asset accounting for one vault. The ledger tracks three totals:
//!
//! - `total_shares` (S): every share in existence.
//! - `total_assets` (A): base-unit value the shares have a claim on,
//!   whether it sits idle in custody or is deployed to a strategy.
//! - `residual`: base-unit value nobody has a claim on (see below).
//!
//! plus a per-holder share balance. Share price is `A / S`.
//!
//! ## Rounding
//!
//! Every conversion rounds against the caller:
//!
//! | Operation  | Computes            | Rounds |
//! |------------|---------------------|--------|
//! | `deposit`  | shares for assets   | down   |
//! | `mint`     | assets for shares   | up     |
//! | `withdraw` | shares for assets   | up     |
//! | `redeem`   | assets for shares   | down   |
//!
//! So no sequence of calls can extract more value than it put in, and the
//! share price never falls because of someone else's rounding.
//!
//! ## Residual
//!
//! When a burn takes S to zero, whatever A remains belongs to no one. It is
//! moved to `residual`, where it no longer inflates the price of the next
//! first deposit, and can only leave through an explicit admin sweep.

use meridian_protocol::types::{Address, Amount};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Ledger failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Zero-valued deposits, mints, withdrawals, and redemptions are
    /// rejected outright.
    #[error("amount must be non-zero")]
    ZeroAmount,

    /// The deposit is too small to buy a single share.
    #[error("deposit of {assets} rounds to zero shares")]
    ZeroShares { assets: Amount },

    /// The redemption is too small to pay out a single unit.
    #[error("redemption of {shares} shares rounds to zero assets")]
    ZeroAssets { shares: Amount },

    /// Shares exist but back nothing; pricing new shares is undefined.
    #[error("vault is insolvent: {shares} shares outstanding against zero assets")]
    Insolvent { shares: Amount },

    /// The owner does not hold enough shares.
    #[error("insufficient shares for {owner}: holds {available}, needs {required}")]
    InsufficientShares {
        owner: Address,
        available: Amount,
        required: Amount,
    },

    /// The request exceeds what the vault holds in total.
    #[error("requested {requested} exceeds available {available}")]
    ExceedsTotal { requested: Amount, available: Amount },

    /// Not enough idle (undeployed) base value to pay out.
    #[error("insufficient liquidity: requested {requested}, idle {idle}")]
    InsufficientLiquidity { requested: Amount, idle: Amount },

    /// Only the owner may spend their shares.
    #[error("{caller} may not spend shares of {owner}")]
    NotOwner { caller: Address, owner: Address },

    /// Shares cannot be issued to or paid out to the null address.
    #[error("invalid receiver: the null address")]
    InvalidReceiver,

    /// There is no residual value to sweep.
    #[error("no residual value to sweep")]
    NoResidual,

    /// A total would leave the `u128` range.
    #[error("arithmetic overflow in share accounting")]
    Overflow,
}

// ---------------------------------------------------------------------------
// Math
// ---------------------------------------------------------------------------

/// Rounding direction of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Down,
    Up,
}

/// `value * numerator / denominator`, rounded as requested.
///
/// The product is taken in 256 bits, so only a quotient that does not fit
/// in an [`Amount`] is an overflow. `denominator` must be non-zero.
pub fn mul_div(
    value: Amount,
    numerator: Amount,
    denominator: Amount,
    rounding: Rounding,
) -> Result<Amount, LedgerError> {
    let product = U256::from(value) * U256::from(numerator);
    let (mut quotient, remainder) = product.div_mod(U256::from(denominator));
    if rounding == Rounding::Up && !remainder.is_zero() {
        quotient = quotient + U256::one();
    }
    if quotient.bits() > 128 {
        return Err(LedgerError::Overflow);
    }
    Ok(quotient.low_u128())
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Persisted ledger totals. Holder balances are stored separately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTotals {
    pub total_shares: Amount,
    pub total_assets: Amount,
    pub residual: Amount,
}

/// The share ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultLedger {
    totals: LedgerTotals,
    holders: BTreeMap<Address, Amount>,
}

impl VaultLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a ledger from persisted parts.
    pub fn from_parts<I>(totals: LedgerTotals, holders: I) -> Self
    where
        I: IntoIterator<Item = (Address, Amount)>,
    {
        Self {
            totals,
            holders: holders.into_iter().filter(|(_, s)| *s > 0).collect(),
        }
    }

    pub fn totals(&self) -> LedgerTotals {
        self.totals
    }

    pub fn total_shares(&self) -> Amount {
        self.totals.total_shares
    }

    /// Base value backing outstanding shares: idle cash plus deployed
    /// principal. Un-harvested rewards are not included.
    pub fn total_assets(&self) -> Amount {
        self.totals.total_assets
    }

    pub fn residual(&self) -> Amount {
        self.totals.residual
    }

    pub fn balance_of(&self, holder: &Address) -> Amount {
        self.holders.get(holder).copied().unwrap_or(0)
    }

    pub fn holders(&self) -> &BTreeMap<Address, Amount> {
        &self.holders
    }

    /// Base value held in vault custody: everything tracked, minus what is
    /// deployed to strategies.
    pub fn idle(&self, deployed: Amount) -> Amount {
        self.totals
            .total_assets
            .saturating_add(self.totals.residual)
            .saturating_sub(deployed)
    }

    /// Fails unless `amount` can be paid from idle value.
    pub fn require_liquidity(&self, amount: Amount, deployed: Amount) -> Result<(), LedgerError> {
        let idle = self.idle(deployed);
        if amount > idle {
            return Err(LedgerError::InsufficientLiquidity {
                requested: amount,
                idle,
            });
        }
        Ok(())
    }

    // -- conversions ---------------------------------------------------------

    /// Shares worth `assets` at the current rate. 1:1 on an empty vault.
    pub fn convert_to_shares(&self, assets: Amount, rounding: Rounding) -> Result<Amount, LedgerError> {
        let LedgerTotals {
            total_shares,
            total_assets,
            ..
        } = self.totals;
        if total_shares == 0 {
            return Ok(assets);
        }
        if total_assets == 0 {
            return Err(LedgerError::Insolvent {
                shares: total_shares,
            });
        }
        mul_div(assets, total_shares, total_assets, rounding)
    }

    /// Assets worth `shares` at the current rate. 1:1 on an empty vault.
    pub fn convert_to_assets(&self, shares: Amount, rounding: Rounding) -> Result<Amount, LedgerError> {
        let LedgerTotals {
            total_shares,
            total_assets,
            ..
        } = self.totals;
        if total_shares == 0 {
            return Ok(shares);
        }
        mul_div(shares, total_assets, total_shares, rounding)
    }

    // -- previews ------------------------------------------------------------

    /// Shares a deposit of `assets` would mint.
    pub fn preview_deposit(&self, assets: Amount) -> Result<Amount, LedgerError> {
        if assets == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let shares = self.convert_to_shares(assets, Rounding::Down)?;
        if shares == 0 {
            return Err(LedgerError::ZeroShares { assets });
        }
        Ok(shares)
    }

    /// Assets required to mint exactly `shares`.
    pub fn preview_mint(&self, shares: Amount) -> Result<Amount, LedgerError> {
        if shares == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        if self.totals.total_shares > 0 && self.totals.total_assets == 0 {
            return Err(LedgerError::Insolvent {
                shares: self.totals.total_shares,
            });
        }
        self.convert_to_assets(shares, Rounding::Up)
    }

    /// Shares that must be burned to withdraw exactly `assets`.
    pub fn preview_withdraw(&self, assets: Amount) -> Result<Amount, LedgerError> {
        if assets == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        if assets > self.totals.total_assets {
            return Err(LedgerError::ExceedsTotal {
                requested: assets,
                available: self.totals.total_assets,
            });
        }
        self.convert_to_shares(assets, Rounding::Up)
    }

    /// Assets a redemption of `shares` would pay out.
    pub fn preview_redeem(&self, shares: Amount) -> Result<Amount, LedgerError> {
        if shares == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        if shares > self.totals.total_shares {
            return Err(LedgerError::ExceedsTotal {
                requested: shares,
                available: self.totals.total_shares,
            });
        }
        let assets = self.convert_to_assets(shares, Rounding::Down)?;
        if assets == 0 {
            return Err(LedgerError::ZeroAssets { shares });
        }
        Ok(assets)
    }

    // -- mutations -----------------------------------------------------------

    /// Credits `assets` and mints the corresponding shares to `receiver`.
    /// Returns the shares minted.
    pub fn deposit(&mut self, assets: Amount, receiver: &Address) -> Result<Amount, LedgerError> {
        let shares = self.preview_deposit(assets)?;
        self.issue(receiver, shares, assets)?;
        Ok(shares)
    }

    /// Mints exactly `shares` to `receiver`. Returns the assets owed.
    pub fn mint(&mut self, shares: Amount, receiver: &Address) -> Result<Amount, LedgerError> {
        let assets = self.preview_mint(shares)?;
        self.issue(receiver, shares, assets)?;
        Ok(assets)
    }

    /// Burns the shares `owner` needs to withdraw `assets`. Returns the
    /// shares burned.
    pub fn withdraw(&mut self, assets: Amount, owner: &Address) -> Result<Amount, LedgerError> {
        let shares = self.preview_withdraw(assets)?;
        self.burn(owner, shares, assets)?;
        Ok(shares)
    }

    /// Burns `shares` from `owner`. Returns the assets paid out.
    pub fn redeem(&mut self, shares: Amount, owner: &Address) -> Result<Amount, LedgerError> {
        self.require_shares(owner, shares)?;
        let assets = self.preview_redeem(shares)?;
        self.burn(owner, shares, assets)?;
        Ok(assets)
    }

    /// Realized base-asset gain (harvested rewards) raises the share price.
    /// With no shares outstanding the gain is residual.
    pub fn record_gain(&mut self, amount: Amount) -> Result<(), LedgerError> {
        let slot = if self.totals.total_shares == 0 {
            &mut self.totals.residual
        } else {
            &mut self.totals.total_assets
        };
        *slot = slot.checked_add(amount).ok_or(LedgerError::Overflow)?;
        Ok(())
    }

    /// Zeroes the residual and returns what it held.
    pub fn take_residual(&mut self) -> Result<Amount, LedgerError> {
        if self.totals.residual == 0 {
            return Err(LedgerError::NoResidual);
        }
        Ok(std::mem::take(&mut self.totals.residual))
    }

    fn require_shares(&self, owner: &Address, required: Amount) -> Result<(), LedgerError> {
        let available = self.balance_of(owner);
        if available < required {
            return Err(LedgerError::InsufficientShares {
                owner: *owner,
                available,
                required,
            });
        }
        Ok(())
    }

    fn issue(&mut self, receiver: &Address, shares: Amount, assets: Amount) -> Result<(), LedgerError> {
        if receiver.is_zero() {
            return Err(LedgerError::InvalidReceiver);
        }
        let total_shares = self
            .totals
            .total_shares
            .checked_add(shares)
            .ok_or(LedgerError::Overflow)?;
        let total_assets = self
            .totals
            .total_assets
            .checked_add(assets)
            .ok_or(LedgerError::Overflow)?;
        let balance = self
            .balance_of(receiver)
            .checked_add(shares)
            .ok_or(LedgerError::Overflow)?;

        self.totals.total_shares = total_shares;
        self.totals.total_assets = total_assets;
        self.holders.insert(*receiver, balance);
        Ok(())
    }

    fn burn(&mut self, owner: &Address, shares: Amount, assets: Amount) -> Result<(), LedgerError> {
        self.require_shares(owner, shares)?;
        let remaining = self.balance_of(owner) - shares;
        let total_shares = self
            .totals
            .total_shares
            .checked_sub(shares)
            .ok_or(LedgerError::Overflow)?;
        let total_assets = self
            .totals
            .total_assets
            .checked_sub(assets)
            .ok_or(LedgerError::Overflow)?;

        if remaining == 0 {
            self.holders.remove(owner);
        } else {
            self.holders.insert(*owner, remaining);
        }
        self.totals.total_shares = total_shares;
        self.totals.total_assets = total_assets;

        if total_shares == 0 && total_assets > 0 {
            self.totals.residual = self
                .totals
                .residual
                .checked_add(total_assets)
                .ok_or(LedgerError::Overflow)?;
            self.totals.total_assets = 0;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
