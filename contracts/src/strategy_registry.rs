//! # Strategy Registry
//!
//! The set of strategies a vault may allocate to, keyed by strategy id. The
//! registry owns every adapter outright; agent-issued calls are routed
//! through it so an unregistered id fails with
//! [`StrategyError::StrategyDoesNotExist`] before anything is touched.

use meridian_protocol::call::ProtocolClient;
use meridian_protocol::custody::Custody;
use meridian_protocol::types::{Address, Amount, FunctionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::events::{StrategyAction, VaultEvent};
use crate::strategy_adapter::{HarvestReport, StrategyAdapter, StrategyError};

/// Registered strategies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyRegistry {
    strategies: BTreeMap<Address, StrategyAdapter>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a registry from persisted adapters.
    pub fn from_adapters<I: IntoIterator<Item = StrategyAdapter>>(adapters: I) -> Self {
        Self {
            strategies: adapters.into_iter().map(|a| (a.id, a)).collect(),
        }
    }

    /// Registers `adapter` for the vault at `vault`, deploying `asset`.
    ///
    /// The adapter id, the vault and the protocol target must be three
    /// distinct accounts.
    pub fn add(
        &mut self,
        adapter: StrategyAdapter,
        vault: &Address,
        asset: &Address,
    ) -> Result<(), StrategyError> {
        let (id, target) = (adapter.id, adapter.binding.target);
        if id.is_zero() || target.is_zero() {
            return Err(StrategyError::InvalidAddress);
        }
        if id == *vault || id == target || target == *vault {
            return Err(StrategyError::InvalidAddress);
        }
        if adapter.vault != *vault || adapter.asset != *asset {
            return Err(StrategyError::BindingMismatch(adapter.id));
        }
        if self.strategies.contains_key(&adapter.id) {
            return Err(StrategyError::StrategyAlreadyExists(adapter.id));
        }
        self.strategies.insert(adapter.id, adapter);
        Ok(())
    }

    /// Unregisters `id`. Refused while capital is still deployed, since the
    /// vault would lose track of it.
    pub fn remove(&mut self, id: &Address) -> Result<StrategyAdapter, StrategyError> {
        let adapter = self.get(id)?;
        if adapter.deployed_balance() > 0 {
            return Err(StrategyError::StrategyStillDeployed {
                id: *id,
                deployed: adapter.deployed_balance(),
            });
        }
        self.strategies
            .remove(id)
            .ok_or(StrategyError::StrategyDoesNotExist(*id))
    }

    pub fn get(&self, id: &Address) -> Result<&StrategyAdapter, StrategyError> {
        self.strategies
            .get(id)
            .ok_or(StrategyError::StrategyDoesNotExist(*id))
    }

    fn get_mut(&mut self, id: &Address) -> Result<&mut StrategyAdapter, StrategyError> {
        self.strategies
            .get_mut(id)
            .ok_or(StrategyError::StrategyDoesNotExist(*id))
    }

    pub fn is_strategy(&self, id: &Address) -> bool {
        self.strategies.contains_key(id)
    }

    pub fn ids(&self) -> Vec<Address> {
        self.strategies.keys().copied().collect()
    }

    pub fn adapters(&self) -> &BTreeMap<Address, StrategyAdapter> {
        &self.strategies
    }

    /// Sum of deployed balances across all strategies.
    pub fn deployed_total(&self) -> Result<Amount, StrategyError> {
        self.strategies
            .values()
            .try_fold(0u128, |acc, a| acc.checked_add(a.deployed_balance()))
            .ok_or(StrategyError::Overflow)
    }

    // -- routed operations ---------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn execute<C, P>(
        &mut self,
        id: &Address,
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
        let deployed = self
            .get_mut(id)?
            .execute(caller, amount, data, custody, protocol, events)?;
        routed(events, id, StrategyAction::Execute);
        Ok(deployed)
    }

    pub fn harvest<C, P>(
        &mut self,
        id: &Address,
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
        let report = self
            .get_mut(id)?
            .harvest(caller, data, custody, protocol, events)?;
        routed(events, id, StrategyAction::Harvest);
        Ok(report)
    }

    pub fn emergency_exit<C, P>(
        &mut self,
        id: &Address,
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
        let recovered = self
            .get_mut(id)?
            .emergency_exit(caller, data, custody, protocol, events)?;
        routed(events, id, StrategyAction::EmergencyExit);
        Ok(recovered)
    }

    pub fn claim_rewards<P: ProtocolClient + ?Sized>(
        &mut self,
        id: &Address,
        caller: &Address,
        data: &[u8],
        protocol: &mut P,
        events: &mut Vec<VaultEvent>,
    ) -> Result<Vec<u8>, StrategyError> {
        let response = self.get_mut(id)?.claim_rewards(caller, data, protocol)?;
        routed(events, id, StrategyAction::ClaimRewards);
        Ok(response)
    }

    pub fn add_reward_token(
        &mut self,
        id: &Address,
        caller: &Address,
        token: Address,
        events: &mut Vec<VaultEvent>,
    ) -> Result<(), StrategyError> {
        self.get_mut(id)?.add_reward_token(caller, token, events)
    }

    pub fn set_paused(
        &mut self,
        id: &Address,
        caller: &Address,
        paused: bool,
        events: &mut Vec<VaultEvent>,
    ) -> Result<(), StrategyError> {
        self.get_mut(id)?.set_paused(caller, paused, events)
    }

    pub fn balance<P: ProtocolClient + ?Sized>(
        &self,
        id: &Address,
        protocol: &P,
    ) -> Result<Amount, StrategyError> {
        self.get(id)?.get_balance(protocol)
    }

    pub fn query<P: ProtocolClient + ?Sized>(
        &self,
        id: &Address,
        protocol: &P,
        function: FunctionId,
        args: Vec<u8>,
    ) -> Result<Vec<u8>, StrategyError> {
        self.get(id)?.query_protocol(protocol, function, args)
    }
}

fn routed(events: &mut Vec<VaultEvent>, id: &Address, action: StrategyAction) {
    tracing::debug!(strategy = %id, ?action, "strategy call routed");
    events.push(VaultEvent::StrategyExecuted {
        strategy: *id,
        action,
    });
}
