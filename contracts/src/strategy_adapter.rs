//! # Strategy Adapter
//!
//! A generic execution envelope around one external yield protocol. The
//! adapter knows nothing protocol-specific: its [`ProtocolBinding`] names
//! the target and the four entry points (deposit, withdraw, claim, balance),
//! and the caller supplies any extra call data. One adapter type therefore
//! fronts any number of lending markets, staking pools, or LP wrappers.
//!
//! ## State Machine
//!
//! ```text
//!            execute(amount)            execute(amount)
//!   Idle ────────────────────▶ Deployed ◀──────────────┐
//!    ▲                            │  │                  │
//!    │      emergency_exit()      │  └──────────────────┘
//!    └────────────────────────────┘      harvest() keeps state
//! ```
//!
//! ## Failure Policy
//!
//! Funds-moving calls (deposit, withdraw) fail loudly: a reverted withdraw
//! aborts the exit and the tracked balance stays put. The claim step of a
//! harvest is best-effort: a revert is reported as
//! [`VaultEvent::ClaimRewardsFailed`] and the sweep carries on, so a broken
//! reward integration can never wedge the vault.

use meridian_protocol::call::{decode_word, ProtocolCall, ProtocolClient, ProtocolError};
use meridian_protocol::custody::{Custody, CustodyError};
use meridian_protocol::types::{Address, Amount, FunctionId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::VaultEvent;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Strategy failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    /// Adapter operations may only be invoked by the owning vault.
    #[error("caller {caller} is not the vault")]
    NotVault { caller: Address },

    #[error("invalid amount: must be non-zero")]
    InvalidAmount,

    #[error("strategy {0} is paused")]
    StrategyPaused(Address),

    #[error("strategy {0} has no deployed balance")]
    NoUnderlyingBalance(Address),

    #[error("invalid token address: the null address")]
    InvalidTokenAddress,

    #[error("reward token {0} already added")]
    TokenAlreadyAdded(Address),

    /// Null id or target in an adapter definition, or an id or target
    /// that aliases another account of the same strategy.
    #[error("invalid address in strategy definition")]
    InvalidAddress,

    #[error("strategy {0} already exists")]
    StrategyAlreadyExists(Address),

    #[error("strategy {0} does not exist")]
    StrategyDoesNotExist(Address),

    #[error("strategy {id} still has {deployed} deployed")]
    StrategyStillDeployed { id: Address, deployed: Amount },

    /// The adapter belongs to a different vault or deploys a different asset.
    #[error("strategy {0} is bound to another vault or asset")]
    BindingMismatch(Address),

    #[error("deployed balance overflow")]
    Overflow,

    /// An external protocol call failed.
    #[error("protocol call failed: {0}")]
    Protocol(#[from] ProtocolError),

    /// Custody refused a transfer.
    #[error("custody transfer failed: {0}")]
    Custody(#[from] CustodyError),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Where an adapter's capital goes and how it is called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolBinding {
    /// The protocol contract; deployed funds are held here.
    pub target: Address,
    pub deposit_fn: FunctionId,
    pub withdraw_fn: FunctionId,
    pub claim_fn: FunctionId,
    pub balance_fn: FunctionId,
}

impl ProtocolBinding {
    /// A binding with the conventional lending-market signatures.
    pub fn standard(target: Address) -> Self {
        Self {
            target,
            deposit_fn: FunctionId::from_signature("deposit(uint128,bytes)"),
            withdraw_fn: FunctionId::from_signature("withdraw(uint128,bytes)"),
            claim_fn: FunctionId::from_signature("claimRewards(bytes)"),
            balance_fn: FunctionId::from_signature("balanceOf(address)"),
        }
    }
}

/// Derived lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyState {
    Idle,
    Deployed,
}

/// Outcome of a harvest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestReport {
    /// The claim revert reason, if the claim step failed.
    pub claim_failure: Option<String>,
    /// `(token, amount)` for every reward token swept to the vault.
    pub swept: Vec<(Address, Amount)>,
}

/// One strategy: binding plus bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyAdapter {
    /// Strategy id. Also the adapter's own custody account, where rewards
    /// accrue until harvested.
    pub id: Address,
    /// The only principal allowed to drive this adapter.
    pub vault: Address,
    /// The asset this strategy deploys.
    pub asset: Address,
    pub binding: ProtocolBinding,
    deployed_balance: Amount,
    paused: bool,
    reward_tokens: Vec<Address>,
}

impl StrategyAdapter {
    pub fn new(id: Address, vault: Address, asset: Address, binding: ProtocolBinding) -> Self {
        Self {
            id,
            vault,
            asset,
            binding,
            deployed_balance: 0,
            paused: false,
            reward_tokens: Vec::new(),
        }
    }

    pub fn deployed_balance(&self) -> Amount {
        self.deployed_balance
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn reward_tokens(&self) -> &[Address] {
        &self.reward_tokens
    }

    pub fn state(&self) -> StrategyState {
        if self.deployed_balance == 0 {
            StrategyState::Idle
        } else {
            StrategyState::Deployed
        }
    }

    fn only_vault(&self, caller: &Address) -> Result<(), StrategyError> {
        if *caller != self.vault {
            return Err(StrategyError::NotVault { caller: *caller });
        }
        Ok(())
    }

    /// Deploys `amount` of the vault's asset into the protocol.
    ///
    /// Custody moves first; if the protocol then rejects the deposit the
    /// transfer is reversed before the error is returned.
    pub fn execute<C, P>(
        &mut self,
        caller: &Address,
        amount: Amount,
        data: &[u8],
        custody: &mut C,
        protocol: &mut P,
        events: &mut Vec<VaultEvent>,
    ) -> Result<Amount, StrategyError>
    where
        C: Custody + ?Sized,
        P: ProtocolClient + ?Sized,
    {
        self.only_vault(caller)?;
        if amount == 0 {
            return Err(StrategyError::InvalidAmount);
        }
        if self.paused {
            return Err(StrategyError::StrategyPaused(self.id));
        }
        let deployed = self
            .deployed_balance
            .checked_add(amount)
            .ok_or(StrategyError::Overflow)?;

        let target = self.binding.target;
        custody.transfer(&self.asset, &self.vault, &target, amount)?;
        let call = ProtocolCall::with_amount(target, self.binding.deposit_fn, amount, data);
        if let Err(err) = protocol.call(&call) {
            custody.transfer(&self.asset, &target, &self.vault, amount)?;
            return Err(err.into());
        }

        self.deployed_balance = deployed;
        events.push(VaultEvent::StrategyDeposit {
            strategy: self.id,
            target,
            amount,
        });
        events.push(VaultEvent::Executed {
            strategy: self.id,
            amount,
            deployed_balance: deployed,
        });
        Ok(deployed)
    }

    /// Pulls the full deployed balance back to the vault. Returns the
    /// amount recovered.
    pub fn emergency_exit<C, P>(
        &mut self,
        caller: &Address,
        data: &[u8],
        custody: &mut C,
        protocol: &mut P,
        events: &mut Vec<VaultEvent>,
    ) -> Result<Amount, StrategyError>
    where
        C: Custody + ?Sized,
        P: ProtocolClient + ?Sized,
    {
        self.only_vault(caller)?;
        let amount = self.deployed_balance;
        if amount == 0 {
            return Err(StrategyError::NoUnderlyingBalance(self.id));
        }

        let target = self.binding.target;
        let call = ProtocolCall::with_amount(target, self.binding.withdraw_fn, amount, data);
        protocol.call(&call)?;
        custody.transfer(&self.asset, &target, &self.vault, amount)?;

        self.deployed_balance = 0;
        events.push(VaultEvent::StrategyWithdraw {
            strategy: self.id,
            target,
            amount,
        });
        events.push(VaultEvent::EmergencyExited {
            strategy: self.id,
            amount,
        });
        Ok(amount)
    }

    /// Claims rewards (best-effort) and sweeps every known reward token
    /// from the adapter to the vault. The deployed balance is untouched.
    pub fn harvest<C, P>(
        &mut self,
        caller: &Address,
        data: &[u8],
        custody: &mut C,
        protocol: &mut P,
        events: &mut Vec<VaultEvent>,
    ) -> Result<HarvestReport, StrategyError>
    where
        C: Custody + ?Sized,
        P: ProtocolClient + ?Sized,
    {
        self.only_vault(caller)?;
        let mut report = HarvestReport::default();

        let claim = ProtocolCall::new(self.binding.target, self.binding.claim_fn, data.to_vec());
        if let Err(err) = protocol.call(&claim) {
            let reason = err.to_string();
            events.push(VaultEvent::ClaimRewardsFailed {
                strategy: self.id,
                reason: reason.clone(),
            });
            report.claim_failure = Some(reason);
        }

        for token in &self.reward_tokens {
            let amount = custody.balance_of(token, &self.id);
            if amount == 0 {
                continue;
            }
            custody.transfer(token, &self.id, &self.vault, amount)?;
            events.push(VaultEvent::RewardsHarvested {
                strategy: self.id,
                token: *token,
                amount,
            });
            report.swept.push((*token, amount));
        }
        Ok(report)
    }

    /// Calls the claim entry point alone. Unlike [`harvest`](Self::harvest),
    /// a revert is returned to the caller.
    pub fn claim_rewards<P>(
        &mut self,
        caller: &Address,
        data: &[u8],
        protocol: &mut P,
    ) -> Result<Vec<u8>, StrategyError>
    where
        P: ProtocolClient + ?Sized,
    {
        self.only_vault(caller)?;
        let claim = ProtocolCall::new(self.binding.target, self.binding.claim_fn, data.to_vec());
        Ok(protocol.call(&claim)?)
    }

    pub fn add_reward_token(
        &mut self,
        caller: &Address,
        token: Address,
        events: &mut Vec<VaultEvent>,
    ) -> Result<(), StrategyError> {
        self.only_vault(caller)?;
        if token.is_zero() {
            return Err(StrategyError::InvalidTokenAddress);
        }
        if self.reward_tokens.contains(&token) {
            return Err(StrategyError::TokenAlreadyAdded(token));
        }
        self.reward_tokens.push(token);
        events.push(VaultEvent::RewardTokenAdded {
            strategy: self.id,
            token,
        });
        Ok(())
    }

    /// Pausing blocks `execute` only; harvest and exit stay available.
    pub fn set_paused(
        &mut self,
        caller: &Address,
        paused: bool,
        events: &mut Vec<VaultEvent>,
    ) -> Result<(), StrategyError> {
        self.only_vault(caller)?;
        self.paused = paused;
        events.push(VaultEvent::StrategyPaused {
            strategy: self.id,
            paused,
        });
        Ok(())
    }

    /// The protocol's own view of this position, decoded from a single
    /// amount word.
    pub fn get_balance<P: ProtocolClient + ?Sized>(&self, protocol: &P) -> Result<Amount, StrategyError> {
        let call = ProtocolCall::new(
            self.binding.target,
            self.binding.balance_fn,
            self.id.as_bytes().to_vec(),
        );
        let response = protocol.query(&call)?;
        Ok(decode_word(self.binding.target, &response)?)
    }

    /// Read-only passthrough to any protocol function.
    pub fn query_protocol<P: ProtocolClient + ?Sized>(
        &self,
        protocol: &P,
        function: FunctionId,
        args: Vec<u8>,
    ) -> Result<Vec<u8>, StrategyError> {
        let call = ProtocolCall::new(self.binding.target, function, args);
        Ok(protocol.query(&call)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_protocol::call::{encode_word, SimulatedProtocol};
    use meridian_protocol::custody::InMemoryCustody;

    struct Fixture {
        adapter: StrategyAdapter,
        custody: InMemoryCustody,
        protocol: SimulatedProtocol,
        events: Vec<VaultEvent>,
    }

    fn vault() -> Address {
        Address::derive("vault")
    }

    fn usdc() -> Address {
        Address::derive("usdc")
    }

    fn fixture() -> Fixture {
        let mut custody = InMemoryCustody::new();
        custody.register_asset(usdc(), 6);
        custody.mint(&usdc(), &vault(), 1_000).unwrap();
        let adapter = StrategyAdapter::new(
            Address::derive("lending-adapter"),
            vault(),
            usdc(),
            ProtocolBinding::standard(Address::derive("lending-market")),
        );
        Fixture {
            adapter,
            custody,
            protocol: SimulatedProtocol::new(),
            events: Vec::new(),
        }
    }

    impl Fixture {
        fn execute(&mut self, amount: Amount) -> Result<Amount, StrategyError> {
            self.adapter.execute(
                &vault(),
                amount,
                &[],
                &mut self.custody,
                &mut self.protocol,
                &mut self.events,
            )
        }

        fn exit(&mut self) -> Result<Amount, StrategyError> {
            self.adapter.emergency_exit(
                &vault(),
                &[],
                &mut self.custody,
                &mut self.protocol,
                &mut self.events,
            )
        }
    }

    #[test]
    fn execute_then_exit_returns_principal() {
        let mut f = fixture();
        assert_eq!(f.adapter.state(), StrategyState::Idle);
        assert_eq!(f.execute(100).unwrap(), 100);
        assert_eq!(f.adapter.state(), StrategyState::Deployed);
        assert_eq!(f.custody.balance_of(&usdc(), &vault()), 900);

        assert_eq!(f.exit().unwrap(), 100);
        assert_eq!(f.adapter.deployed_balance(), 0);
        assert_eq!(f.custody.balance_of(&usdc(), &vault()), 1_000);
        assert_eq!(
            f.exit(),
            Err(StrategyError::NoUnderlyingBalance(f.adapter.id))
        );
    }

    #[test]
    fn execute_call_carries_amount_word_and_data() {
        let mut f = fixture();
        f.adapter
            .execute(
                &vault(),
                42,
                &[0xEE],
                &mut f.custody,
                &mut f.protocol,
                &mut f.events,
            )
            .unwrap();
        let call = &f.protocol.calls()[0];
        assert_eq!(call.function, f.adapter.binding.deposit_fn);
        assert_eq!(call.args[..16], encode_word(42));
        assert_eq!(call.args[16..], [0xEE]);
        assert!(matches!(f.events[1], VaultEvent::Executed { amount: 42, .. }));
    }

    #[test]
    fn only_vault_may_drive_adapter() {
        let mut f = fixture();
        let mallory = Address::derive("mallory");
        let err = f
            .adapter
            .execute(&mallory, 1, &[], &mut f.custody, &mut f.protocol, &mut f.events)
            .unwrap_err();
        assert_eq!(err, StrategyError::NotVault { caller: mallory });
        assert!(f.adapter.set_paused(&mallory, true, &mut f.events).is_err());
        assert!(f.protocol.calls().is_empty());
    }

    #[test]
    fn reverted_deposit_restores_custody() {
        let mut f = fixture();
        f.protocol.fail(f.adapter.binding.deposit_fn);
        let err = f.execute(100).unwrap_err();
        assert!(matches!(err, StrategyError::Protocol(_)));
        assert_eq!(f.custody.balance_of(&usdc(), &vault()), 1_000);
        assert_eq!(f.adapter.deployed_balance(), 0);
        assert!(f.events.is_empty());
    }

    #[test]
    fn reverted_withdraw_keeps_balance() {
        let mut f = fixture();
        f.execute(100).unwrap();
        f.protocol.fail(f.adapter.binding.withdraw_fn);
        assert!(matches!(f.exit(), Err(StrategyError::Protocol(_))));
        assert_eq!(f.adapter.deployed_balance(), 100);
    }

    #[test]
    fn paused_blocks_execute_only() {
        let mut f = fixture();
        f.execute(100).unwrap();
        f.adapter.set_paused(&vault(), true, &mut f.events).unwrap();
        assert_eq!(f.execute(1), Err(StrategyError::StrategyPaused(f.adapter.id)));
        assert_eq!(f.exit().unwrap(), 100);
    }

    #[test]
    fn harvest_survives_claim_failure() {
        let mut f = fixture();
        let reward = Address::derive("gov-token");
        f.custody.register_asset(reward, 18);
        f.custody.mint(&reward, &f.adapter.id, 5).unwrap();
        f.adapter.add_reward_token(&vault(), reward, &mut f.events).unwrap();
        f.execute(100).unwrap();
        f.protocol.fail(f.adapter.binding.claim_fn);

        let report = f
            .adapter
            .harvest(&vault(), &[], &mut f.custody, &mut f.protocol, &mut f.events)
            .unwrap();
        assert!(report.claim_failure.is_some());
        assert_eq!(report.swept, vec![(reward, 5)]);
        assert_eq!(f.custody.balance_of(&reward, &vault()), 5);
        assert_eq!(f.adapter.deployed_balance(), 100);
        assert!(f
            .events
            .iter()
            .any(|e| matches!(e, VaultEvent::ClaimRewardsFailed { .. })));
    }

    #[test]
    fn claim_rewards_propagates_failure() {
        let mut f = fixture();
        f.protocol.fail(f.adapter.binding.claim_fn);
        let err = f
            .adapter
            .claim_rewards(&vault(), &[], &mut f.protocol)
            .unwrap_err();
        assert!(matches!(err, StrategyError::Protocol(_)));
    }

    #[test]
    fn reward_token_validation() {
        let mut f = fixture();
        let reward = Address::derive("gov-token");
        assert_eq!(
            f.adapter.add_reward_token(&vault(), Address::ZERO, &mut f.events),
            Err(StrategyError::InvalidTokenAddress)
        );
        f.adapter.add_reward_token(&vault(), reward, &mut f.events).unwrap();
        assert_eq!(
            f.adapter.add_reward_token(&vault(), reward, &mut f.events),
            Err(StrategyError::TokenAlreadyAdded(reward))
        );
        assert_eq!(f.adapter.reward_tokens(), &[reward]);
    }

    #[test]
    fn balance_query_decodes_word() {
        let mut f = fixture();
        f.protocol
            .respond(f.adapter.binding.balance_fn, encode_word(250).to_vec());
        assert_eq!(f.adapter.get_balance(&f.protocol).unwrap(), 250);

        f.protocol.respond(f.adapter.binding.balance_fn, vec![1, 2]);
        assert!(matches!(
            f.adapter.get_balance(&f.protocol),
            Err(StrategyError::Protocol(ProtocolError::MalformedResponse { .. }))
        ));
    }
}
