//! # Vault Events
//!
//! Every state change a vault commits is described by one or more
//! [`VaultEvent`]s. Operations buffer their events while they run; the
//! buffer is only published (logged via `tracing` and queued for
//! [`Vault::take_events`](crate::vault::Vault::take_events)) once the
//! operation has been committed to storage. A failed operation publishes
//! nothing.

use meridian_protocol::access::Role;
use meridian_protocol::types::{Address, Amount, FeedId};
use serde::{Deserialize, Serialize};

/// Which strategy entry point the registry routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyAction {
    Execute,
    Harvest,
    EmergencyExit,
    ClaimRewards,
}

/// A committed vault state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultEvent {
    // -- ledger --
    Deposit {
        sender: Address,
        receiver: Address,
        assets: Amount,
        shares: Amount,
    },
    Withdraw {
        sender: Address,
        receiver: Address,
        owner: Address,
        assets: Amount,
        shares: Amount,
    },
    ResidualSwept {
        to: Address,
        amount: Amount,
    },

    // -- assets & routing --
    TokenConfigured {
        asset: Address,
        price_feed: FeedId,
        decimals: u8,
    },
    TokenRemoved {
        asset: Address,
    },
    TokenDeposited {
        sender: Address,
        asset: Address,
        amount: Amount,
        base_equivalent: Amount,
        receiver: Address,
        shares: Amount,
    },

    // -- strategies --
    StrategyAdded {
        strategy: Address,
    },
    StrategyRemoved {
        strategy: Address,
    },
    StrategyExecuted {
        strategy: Address,
        action: StrategyAction,
    },
    StrategyDeposit {
        strategy: Address,
        target: Address,
        amount: Amount,
    },
    Executed {
        strategy: Address,
        amount: Amount,
        deployed_balance: Amount,
    },
    StrategyWithdraw {
        strategy: Address,
        target: Address,
        amount: Amount,
    },
    EmergencyExited {
        strategy: Address,
        amount: Amount,
    },
    RewardsHarvested {
        strategy: Address,
        token: Address,
        amount: Amount,
    },
    ClaimRewardsFailed {
        strategy: Address,
        reason: String,
    },
    RewardTokenAdded {
        strategy: Address,
        token: Address,
    },
    StrategyPaused {
        strategy: Address,
        paused: bool,
    },

    // -- roles --
    RoleGranted {
        role: Role,
        account: Address,
        sender: Address,
    },
    RoleRevoked {
        role: Role,
        account: Address,
        sender: Address,
    },
}

impl VaultEvent {
    /// The variant name. Also the outer key of the JSON encoding.
    pub fn name(&self) -> &'static str {
        match self {
            VaultEvent::Deposit { .. } => "Deposit",
            VaultEvent::Withdraw { .. } => "Withdraw",
            VaultEvent::ResidualSwept { .. } => "ResidualSwept",
            VaultEvent::TokenConfigured { .. } => "TokenConfigured",
            VaultEvent::TokenRemoved { .. } => "TokenRemoved",
            VaultEvent::TokenDeposited { .. } => "TokenDeposited",
            VaultEvent::StrategyAdded { .. } => "StrategyAdded",
            VaultEvent::StrategyRemoved { .. } => "StrategyRemoved",
            VaultEvent::StrategyExecuted { .. } => "StrategyExecuted",
            VaultEvent::StrategyDeposit { .. } => "StrategyDeposit",
            VaultEvent::Executed { .. } => "Executed",
            VaultEvent::StrategyWithdraw { .. } => "StrategyWithdraw",
            VaultEvent::EmergencyExited { .. } => "EmergencyExited",
            VaultEvent::RewardsHarvested { .. } => "RewardsHarvested",
            VaultEvent::ClaimRewardsFailed { .. } => "ClaimRewardsFailed",
            VaultEvent::RewardTokenAdded { .. } => "RewardTokenAdded",
            VaultEvent::StrategyPaused { .. } => "StrategyPaused",
            VaultEvent::RoleGranted { .. } => "RoleGranted",
            VaultEvent::RoleRevoked { .. } => "RoleRevoked",
        }
    }

    /// JSON encoding, as written to the structured log.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"{}\":null}}", self.name()))
    }

    /// Publishes this event to the tracing subscriber.
    pub fn log(&self) {
        match self {
            VaultEvent::ClaimRewardsFailed { strategy, reason } => {
                tracing::warn!(event = self.name(), %strategy, %reason, "reward claim failed");
            }
            _ => {
                tracing::info!(event = self.name(), payload = %self.to_json(), "vault event");
            }
        }
    }
}
