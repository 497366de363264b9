//! # Custody Primitives
//!
//! The vault does not hold tokens itself; it asks a [`Custody`] backend to
//! move them. A backend is anything with standard fungible-balance transfer
//! semantics: a token program, a bank ledger, or [`InMemoryCustody`].
//!
//! Only three things are needed from it:
//!
//! - `transfer(asset, from, to, amount)`: fails on insufficient balance,
//!   never partially applies.
//! - `balance_of(asset, account)`.
//! - `decimals(asset)`: the asset's native precision, used to reject
//!   misconfigured assets before anyone deposits them.
//!
//! The vault-level wrappers [`move_in`] and [`move_out`] pin one side of the
//! transfer to the vault's own account.

use std::collections::HashMap;
use thiserror::Error;

use crate::types::{Address, Amount};

/// Custody failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CustodyError {
    /// The sender does not hold enough of the asset.
    #[error("insufficient balance of {asset} in {account}: available {available}, requested {requested}")]
    InsufficientBalance {
        asset: Address,
        account: Address,
        available: Amount,
        requested: Amount,
    },

    /// Crediting would overflow the recipient's balance.
    #[error("balance overflow for {asset} in {account}")]
    Overflow { asset: Address, account: Address },

    /// The custody backend does not know this asset.
    #[error("unknown asset {0}")]
    UnknownAsset(Address),
}

/// A fungible-balance custody backend.
pub trait Custody {
    /// Moves `amount` of `asset` from `from` to `to`, all or nothing.
    fn transfer(
        &mut self,
        asset: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), CustodyError>;

    /// Current balance of `account` in `asset`.
    fn balance_of(&self, asset: &Address, account: &Address) -> Amount;

    /// Native decimal precision of `asset`.
    fn decimals(&self, asset: &Address) -> Result<u8, CustodyError>;
}

/// Pulls `amount` of `asset` from `from` into the vault's account.
pub fn move_in<C: Custody + ?Sized>(
    custody: &mut C,
    vault: &Address,
    asset: &Address,
    from: &Address,
    amount: Amount,
) -> Result<(), CustodyError> {
    custody.transfer(asset, from, vault, amount)
}

/// Pays `amount` of `asset` out of the vault's account to `to`.
pub fn move_out<C: Custody + ?Sized>(
    custody: &mut C,
    vault: &Address,
    asset: &Address,
    to: &Address,
    amount: Amount,
) -> Result<(), CustodyError> {
    custody.transfer(asset, vault, to, amount)
}

/// A custody backend kept entirely in memory.
///
/// Assets must be registered with their decimals before they can be
/// minted into accounts. Balances are `asset -> (account -> amount)`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCustody {
    decimals: HashMap<Address, u8>,
    balances: HashMap<Address, HashMap<Address, Amount>>,
}

impl InMemoryCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an asset and its native precision.
    pub fn register_asset(&mut self, asset: Address, decimals: u8) {
        self.decimals.insert(asset, decimals);
        self.balances.entry(asset).or_default();
    }

    /// Creates `amount` of `asset` out of thin air in `account`.
    pub fn mint(
        &mut self,
        asset: &Address,
        account: &Address,
        amount: Amount,
    ) -> Result<Amount, CustodyError> {
        let ledger = self
            .balances
            .get_mut(asset)
            .ok_or(CustodyError::UnknownAsset(*asset))?;
        let balance = ledger.entry(*account).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(CustodyError::Overflow {
            asset: *asset,
            account: *account,
        })?;
        Ok(*balance)
    }

    /// Sum of all balances of `asset`.
    pub fn total_supply(&self, asset: &Address) -> Amount {
        self.balances
            .get(asset)
            .map(|ledger| ledger.values().sum())
            .unwrap_or(0)
    }
}

impl Custody for InMemoryCustody {
    fn transfer(
        &mut self,
        asset: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), CustodyError> {
        let ledger = self
            .balances
            .get_mut(asset)
            .ok_or(CustodyError::UnknownAsset(*asset))?;

        let available = ledger.get(from).copied().unwrap_or(0);
        if available < amount {
            return Err(CustodyError::InsufficientBalance {
                asset: *asset,
                account: *from,
                available,
                requested: amount,
            });
        }
        if from == to {
            return Ok(());
        }

        let credited = ledger
            .get(to)
            .copied()
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or(CustodyError::Overflow {
                asset: *asset,
                account: *to,
            })?;

        ledger.insert(*from, available - amount);
        ledger.insert(*to, credited);
        Ok(())
    }

    fn balance_of(&self, asset: &Address, account: &Address) -> Amount {
        self.balances
            .get(asset)
            .and_then(|ledger| ledger.get(account))
            .copied()
            .unwrap_or(0)
    }

    fn decimals(&self, asset: &Address) -> Result<u8, CustodyError> {
        self.decimals
            .get(asset)
            .copied()
            .ok_or(CustodyError::UnknownAsset(*asset))
    }
}
