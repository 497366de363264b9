//! # Vault Errors
//!
//! Every component has its own error enum; [`VaultError`] unifies them at
//! the vault boundary. Callers that need to branch (retry a stale price,
//! surface a permission problem, page someone about storage) should match
//! on [`VaultError::kind`] rather than on individual variants.

use meridian_protocol::access::AccessError;
use meridian_protocol::config::ConfigError;
use meridian_protocol::custody::CustodyError;
use meridian_protocol::storage::DbError;
use thiserror::Error;

use crate::asset_registry::AssetError;
use crate::deposit_router::RouterError;
use crate::ledger::LedgerError;
use crate::strategy_adapter::StrategyError;

/// Coarse failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller lacks a required role.
    Authorization,
    /// Bad input: zero amounts, null addresses, unknown assets or strategies.
    Validation,
    /// Missing, stale, or unusable price data.
    Oracle,
    /// An external protocol call failed.
    Integration,
    /// Insufficient shares, balance, or liquidity; arithmetic overflow.
    Accounting,
    /// Persistence failed.
    Storage,
}

/// Any failure of a vault operation.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error(transparent)]
    Custody(#[from] CustodyError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// `create` was called on a store that already holds a vault.
    #[error("a vault is already initialized in this store")]
    AlreadyInitialized,

    /// `open` was called on a store with no vault in it.
    #[error("no vault is initialized in this store")]
    NotInitialized,

    /// Persisted data could not be interpreted.
    #[error("corrupt vault store: {0}")]
    Corrupt(String),
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::Access(AccessError::Unauthorized { .. }) => ErrorKind::Authorization,
            VaultError::Access(_) => ErrorKind::Validation,
            VaultError::Asset(_) => ErrorKind::Validation,
            VaultError::Ledger(e) => match e {
                LedgerError::ZeroAmount
                | LedgerError::ZeroShares { .. }
                | LedgerError::ZeroAssets { .. }
                | LedgerError::InvalidReceiver
                | LedgerError::NoResidual => ErrorKind::Validation,
                LedgerError::NotOwner { .. } => ErrorKind::Authorization,
                _ => ErrorKind::Accounting,
            },
            VaultError::Router(e) => match e {
                RouterError::TokenNotAccepted(_) | RouterError::InvalidAmount => {
                    ErrorKind::Validation
                }
                RouterError::PriceStale { .. }
                | RouterError::InvalidPrice { .. }
                | RouterError::PriceUnavailable(_) => ErrorKind::Oracle,
                RouterError::Overflow => ErrorKind::Accounting,
            },
            VaultError::Strategy(e) => match e {
                StrategyError::NotVault { .. } => ErrorKind::Authorization,
                StrategyError::Protocol(_) => ErrorKind::Integration,
                StrategyError::Custody(_) | StrategyError::Overflow => ErrorKind::Accounting,
                _ => ErrorKind::Validation,
            },
            VaultError::Custody(_) => ErrorKind::Accounting,
            VaultError::Db(_) | VaultError::Corrupt(_) => ErrorKind::Storage,
            VaultError::Config(_)
            | VaultError::AlreadyInitialized
            | VaultError::NotInitialized => ErrorKind::Validation,
        }
    }

    /// `true` for failures that may succeed unchanged later: a stale quote
    /// can be refreshed, a storage hiccup can clear. Everything else will
    /// fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VaultError::Router(RouterError::PriceStale { .. }) | VaultError::Db(_)
        )
    }
}
