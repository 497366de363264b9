//! # Storage Module
//!
//! Durable persistence for vault state. A vault that forgets its share
//! balances on restart is not a vault, it's a donation box.
//!
//! ## Data Flow
//!
//! ```text
//! Vault operation → draft state → diff vs committed → Changeset → VaultDb
//!                                                                 (sled)
//! ```
//!
//! Operations never write directly. They mutate a draft; the draft is
//! diffed against the last committed state, and the resulting
//! [`Changeset`] is applied in a single multi-tree sled transaction.
//!
//! ## Design Decisions
//!
//! 1. **sled trees as tables.** Assets, holders, strategies, roles, and
//!    metadata each get their own tree so restarts can reload each table
//!    independently.
//!
//! 2. **Bincode for on-disk serialization.** Compact, fast, deterministic.
//!    JSON is for events and debugging; bincode is for storage.

pub mod db;

pub use db::{Changeset, DbError, DbResult, Table, VaultDb, Write};
