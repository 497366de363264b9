// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Meridian Protocol: Core Library
//!
//! The primitives underneath a Meridian vault. Nothing in here knows what a
//! share is; that lives in `meridian-contracts`. What lives here is
//! everything a vault needs from the outside world, and the vocabulary it
//! uses to talk about it.
//!
//! ## Architecture
//!
//! - **types**: Addresses, price-feed ids, function selectors. Fixed-width
//!   bytes, hex on the wire.
//! - **access**: The role gate. Admin, manager, agent; nothing inherited.
//! - **oracle**: Price quotes and the rules for trusting them.
//! - **custody**: Fungible-balance transfers. The vault asks, custody moves.
//! - **call**: The one primitive every yield protocol is reached through.
//! - **storage**: sled-backed persistence with all-or-nothing commits.
//! - **config**: Constants and per-vault parameters.
//! - **telemetry**: `tracing` subscriber bootstrap for embedders.
//!
//! ## Design Philosophy
//!
//! 1. If it touches money, it uses checked arithmetic.
//! 2. External services are traits. The vault never assumes a chain.
//! 3. Failures are typed, so callers can tell "retry later" from "never".

pub mod access;
pub mod call;
pub mod config;
pub mod custody;
pub mod oracle;
pub mod storage;
pub mod telemetry;
pub mod types;

pub use types::{Address, Amount, FeedId, FunctionId};
