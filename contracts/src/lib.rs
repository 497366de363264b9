// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Meridian Vault Contracts
//!
//! The accounting core of a multi-asset custodial vault. Depositors hand
//! over assets and receive fungible shares; operators forward idle capital
//! into external yield protocols through strategy adapters.
//!
//! - **Vault Ledger**: share/asset accounting with rounding that always
//!   favors the vault over the individual.
//! - **Asset Registry**: which assets are accepted, at what precision,
//!   priced by which feed.
//! - **Deposit Router**: converts non-base deposits into base units via
//!   the oracle before any share is minted.
//! - **Strategy Adapter**: the execute / harvest / emergency-exit state
//!   machine around one external protocol.
//! - **Strategy Registry**: the set of adapters a vault may allocate to.
//! - **Vault**: owns all of the above, gates every mutating entry point
//!   by role, and commits each operation to disk as one transaction.
//!
//! ## Design Principles
//!
//! 1. All monetary operations use checked arithmetic. Overflow is an
//!    accounting error, never a wrap.
//! 2. State transitions are explicit: the adapter is `Idle` or `Deployed`,
//!    not a pile of flags.
//! 3. A failed operation leaves every balance, share count, and strategy
//!    byte-identical to before the call.
//! 4. Every public type is serializable (serde) for storage and events.

pub mod asset_registry;
pub mod deposit_router;
pub mod error;
pub mod events;
pub mod ledger;
pub mod strategy_adapter;
pub mod strategy_registry;
pub mod vault;

pub use error::{ErrorKind, VaultError};
pub use events::VaultEvent;
pub use vault::Vault;
