//! # Vault
//!
//! The aggregate. A [`Vault`] owns every table (roles, assets, ledger,
//! strategies) plus handles to its external collaborators: the price
//! oracle, the custody backend, and the protocol client strategies call
//! through. Every mutating entry point is gated by role and runs as one
//! transaction.
//!
//! ## Transactions
//!
//! ```text
//!   clone state ─▶ draft ─▶ run operation ─▶ diff(draft, committed)
//!                    │                               │
//!                    │ error: drop draft + events     ▼
//!                    ▼                      VaultDb::commit (one sled txn)
//!               nothing changed                      │
//!                                                    ▼
//!                                      draft becomes state, events publish
//! ```
//!
//! Operations validate and book against the draft before touching custody
//! or any protocol, so a rejected call has no external side effects
//! either. Custody moves happen last and are all-or-nothing; shares booked
//! on the draft only become visible once custody has moved.

use chrono::Utc;
use meridian_protocol::access::{Role, RoleGate};
use meridian_protocol::call::ProtocolClient;
use meridian_protocol::config::{VaultConfig, META_CONFIG_KEY, META_LEDGER_KEY};
use meridian_protocol::custody::{move_in, move_out, Custody};
use meridian_protocol::oracle::PriceOracle;
use meridian_protocol::storage::{Changeset, Table, VaultDb};
use meridian_protocol::types::{Address, Amount, FeedId, FunctionId};

use crate::asset_registry::{AssetConfig, AssetError, AssetRegistry};
use crate::deposit_router::{DepositRouter, TokenDepositPreview};
use crate::error::VaultError;
use crate::events::VaultEvent;
use crate::ledger::{LedgerError, LedgerTotals, VaultLedger};
use crate::strategy_adapter::{HarvestReport, StrategyAdapter};
use crate::strategy_registry::StrategyRegistry;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Everything a vault persists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultState {
    pub config: VaultConfig,
    pub roles: RoleGate,
    pub assets: AssetRegistry,
    pub ledger: VaultLedger,
    pub strategies: StrategyRegistry,
}

impl VaultState {
    fn empty(config: VaultConfig) -> Self {
        let assets = AssetRegistry::new(config.base_asset, config.base_decimals);
        Self {
            config,
            roles: RoleGate::default(),
            assets,
            ledger: VaultLedger::new(),
            strategies: StrategyRegistry::new(),
        }
    }

    /// The writes that turn `before` into `self`.
    fn changes_since(&self, before: &VaultState) -> Result<Changeset, VaultError> {
        let mut changes = Changeset::new();

        if self.config != before.config {
            changes.put(Table::Metadata, META_CONFIG_KEY, &self.config)?;
        }
        if self.ledger.totals() != before.ledger.totals() {
            changes.put(Table::Metadata, META_LEDGER_KEY, &self.ledger.totals())?;
        }
        changes.diff_maps(
            Table::Holders,
            before.ledger.holders(),
            self.ledger.holders(),
            address_key,
        )?;
        changes.diff_maps(
            Table::Assets,
            before.assets.configs(),
            self.assets.configs(),
            address_key,
        )?;
        changes.diff_maps(
            Table::Strategies,
            before.strategies.adapters(),
            self.strategies.adapters(),
            address_key,
        )?;

        for (role, account) in self.roles.grants() {
            if !before.roles.has_role(account, *role) {
                changes.put_raw(Table::Roles, &role_key(*role, account), Vec::new());
            }
        }
        for (role, account) in before.roles.grants() {
            if !self.roles.has_role(account, *role) {
                changes.delete(Table::Roles, &role_key(*role, account));
            }
        }
        Ok(changes)
    }

    fn load(db: &VaultDb, config: VaultConfig) -> Result<Self, VaultError> {
        let totals: LedgerTotals = db.get(Table::Metadata, META_LEDGER_KEY)?.unwrap_or_default();

        let holders = db
            .scan::<Amount>(Table::Holders)?
            .into_iter()
            .map(|(key, shares)| Ok((address_from_key(&key)?, shares)))
            .collect::<Result<Vec<_>, VaultError>>()?;

        let assets = db
            .scan::<AssetConfig>(Table::Assets)?
            .into_iter()
            .map(|(_, c)| c);

        let strategies = db
            .scan::<StrategyAdapter>(Table::Strategies)?
            .into_iter()
            .map(|(_, a)| a);

        let grants = db
            .keys(Table::Roles)?
            .iter()
            .map(|key| role_from_key(key))
            .collect::<Result<Vec<_>, VaultError>>()?;

        Ok(Self {
            assets: AssetRegistry::from_configs(config.base_asset, config.base_decimals, assets),
            roles: RoleGate::from_grants(grants),
            ledger: VaultLedger::from_parts(totals, holders),
            strategies: StrategyRegistry::from_adapters(strategies),
            config,
        })
    }
}

fn address_key(address: &Address) -> Vec<u8> {
    address.as_bytes().to_vec()
}

fn address_from_key(key: &[u8]) -> Result<Address, VaultError> {
    let bytes: [u8; Address::LEN] = key
        .try_into()
        .map_err(|_| VaultError::Corrupt(format!("bad address key of {} bytes", key.len())))?;
    Ok(Address::from_bytes(bytes))
}

fn role_key(role: Role, account: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + Address::LEN);
    key.push(role.tag());
    key.extend_from_slice(account.as_bytes());
    key
}

fn role_from_key(key: &[u8]) -> Result<(Role, Address), VaultError> {
    let (tag, account) = key
        .split_first()
        .ok_or_else(|| VaultError::Corrupt("empty role key".into()))?;
    let role = Role::from_tag(*tag)
        .ok_or_else(|| VaultError::Corrupt(format!("unknown role tag {}", tag)))?;
    Ok((role, address_from_key(account)?))
}

// ---------------------------------------------------------------------------
// Transaction Context
// ---------------------------------------------------------------------------

/// What an operation gets to touch while it runs.
struct Ctx<'a, O, C, P> {
    state: &'a mut VaultState,
    oracle: &'a O,
    custody: &'a mut C,
    protocol: &'a mut P,
    events: &'a mut Vec<VaultEvent>,
}

impl<O, C: Custody, P> Ctx<'_, O, C, P> {
    fn vault(&self) -> Address {
        self.state.config.vault
    }

    fn base_asset(&self) -> Address {
        self.state.config.base_asset
    }

    fn require(&self, caller: &Address, role: Role) -> Result<(), VaultError> {
        Ok(self.state.roles.require(caller, role)?)
    }

    fn deployed(&self) -> Result<Amount, VaultError> {
        Ok(self.state.strategies.deployed_total()?)
    }

    /// Books `base_equivalent` worth of shares for `receiver`, then pulls
    /// `amount` of `asset` in from `sender`.
    fn deposit_into_ledger(
        &mut self,
        sender: &Address,
        asset: &Address,
        amount: Amount,
        base_equivalent: Amount,
        receiver: &Address,
    ) -> Result<Amount, VaultError> {
        let shares = self.state.ledger.deposit(base_equivalent, receiver)?;
        let vault = self.vault();
        move_in(&mut *self.custody, &vault, asset, sender, amount)?;
        self.events.push(VaultEvent::Deposit {
            sender: *sender,
            receiver: *receiver,
            assets: base_equivalent,
            shares,
        });
        Ok(shares)
    }

    /// Pays `assets` of the base asset out to `receiver`.
    fn pay_out(&mut self, receiver: &Address, assets: Amount) -> Result<(), VaultError> {
        let (vault, base) = (self.vault(), self.base_asset());
        move_out(&mut *self.custody, &vault, &base, receiver, assets)?;
        Ok(())
    }
}

fn only_owner(caller: &Address, owner: &Address) -> Result<(), VaultError> {
    if caller != owner {
        return Err(LedgerError::NotOwner {
            caller: *caller,
            owner: *owner,
        }
        .into());
    }
    Ok(())
}

fn valid_receiver(receiver: &Address) -> Result<(), VaultError> {
    if receiver.is_zero() {
        return Err(LedgerError::InvalidReceiver.into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// A multi-asset vault bound to its store and external collaborators.
pub struct Vault<O, C, P> {
    state: VaultState,
    db: VaultDb,
    oracle: O,
    custody: C,
    protocol: P,
    events: Vec<VaultEvent>,
}

impl<O, C, P> Vault<O, C, P>
where
    O: PriceOracle,
    C: Custody,
    P: ProtocolClient,
{
    // -- lifecycle -----------------------------------------------------------

    /// Initializes a new vault in an empty store. `admin` receives the
    /// admin role and nothing else.
    pub fn create(
        db: VaultDb,
        config: VaultConfig,
        admin: Address,
        oracle: O,
        custody: C,
        protocol: P,
    ) -> Result<Self, VaultError> {
        config.validate()?;
        if db.contains(Table::Metadata, META_CONFIG_KEY)? {
            return Err(VaultError::AlreadyInitialized);
        }
        let native = custody.decimals(&config.base_asset)?;
        if native != config.base_decimals {
            return Err(AssetError::DecimalsMismatch {
                asset: config.base_asset,
                declared: config.base_decimals,
                native,
            }
            .into());
        }

        let empty = VaultState::empty(config.clone());
        let mut state = VaultState::empty(config);
        state.roles = RoleGate::new(admin)?;

        let mut changes = state.changes_since(&empty)?;
        changes.put(Table::Metadata, META_CONFIG_KEY, &state.config)?;
        changes.put(Table::Metadata, META_LEDGER_KEY, &state.ledger.totals())?;
        db.commit(&changes)?;

        tracing::info!(
            vault = %state.config.vault,
            base_asset = %state.config.base_asset,
            %admin,
            "vault created"
        );
        Ok(Self {
            state,
            db,
            oracle,
            custody,
            protocol,
            events: Vec::new(),
        })
    }

    /// Reloads a vault previously created in `db`.
    pub fn open(db: VaultDb, oracle: O, custody: C, protocol: P) -> Result<Self, VaultError> {
        let config: VaultConfig = db
            .get(Table::Metadata, META_CONFIG_KEY)?
            .ok_or(VaultError::NotInitialized)?;
        let state = VaultState::load(&db, config)?;

        tracing::info!(
            vault = %state.config.vault,
            holders = state.ledger.holders().len(),
            strategies = state.strategies.adapters().len(),
            "vault reopened"
        );
        Ok(Self {
            state,
            db,
            oracle,
            custody,
            protocol,
            events: Vec::new(),
        })
    }

    /// Releases the store and hands back the collaborators.
    pub fn into_parts(self) -> (O, C, P) {
        (self.oracle, self.custody, self.protocol)
    }

    fn transact<T, F>(&mut self, op: &'static str, f: F) -> Result<T, VaultError>
    where
        F: FnOnce(&mut Ctx<'_, O, C, P>) -> Result<T, VaultError>,
    {
        let mut draft = self.state.clone();
        let mut events = Vec::new();
        let result = f(&mut Ctx {
            state: &mut draft,
            oracle: &self.oracle,
            custody: &mut self.custody,
            protocol: &mut self.protocol,
            events: &mut events,
        });

        let out = match result {
            Ok(out) => out,
            Err(err) => {
                tracing::warn!(op, kind = ?err.kind(), error = %err, "operation rejected");
                return Err(err);
            }
        };

        let changes = draft.changes_since(&self.state)?;
        self.db.commit(&changes)?;
        self.state = draft;

        tracing::debug!(op, writes = changes.len(), events = events.len(), "operation committed");
        for event in &events {
            event.log();
        }
        self.events.extend(events);
        Ok(out)
    }

    /// Drains the events published since the last call.
    pub fn take_events(&mut self) -> Vec<VaultEvent> {
        std::mem::take(&mut self.events)
    }

    // -- accessors -----------------------------------------------------------

    pub fn config(&self) -> &VaultConfig {
        &self.state.config
    }

    pub fn state(&self) -> &VaultState {
        &self.state
    }

    pub fn db(&self) -> &VaultDb {
        &self.db
    }

    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    pub fn custody(&self) -> &C {
        &self.custody
    }

    pub fn custody_mut(&mut self) -> &mut C {
        &mut self.custody
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    pub fn protocol_mut(&mut self) -> &mut P {
        &mut self.protocol
    }

    // -- asset registry ------------------------------------------------------

    pub fn configure_token(
        &mut self,
        caller: &Address,
        asset: Address,
        price_feed: FeedId,
        decimals: u8,
    ) -> Result<(), VaultError> {
        self.transact("configure_token", |ctx| {
            ctx.require(caller, Role::Manager)?;
            let native = ctx.custody.decimals(&asset).ok();
            ctx.state.assets.configure(asset, price_feed, decimals, native)?;
            ctx.events.push(VaultEvent::TokenConfigured {
                asset,
                price_feed,
                decimals,
            });
            Ok(())
        })
    }

    pub fn remove_token(&mut self, caller: &Address, asset: &Address) -> Result<(), VaultError> {
        self.transact("remove_token", |ctx| {
            ctx.require(caller, Role::Manager)?;
            ctx.state.assets.remove(asset)?;
            ctx.events.push(VaultEvent::TokenRemoved { asset: *asset });
            Ok(())
        })
    }

    pub fn get_accepted_tokens(&self) -> Vec<Address> {
        self.state.assets.accepted_tokens()
    }

    pub fn get_token(&self, asset: &Address) -> Option<&AssetConfig> {
        self.state.assets.get(asset)
    }

    // -- ledger --------------------------------------------------------------

    /// Deposits `amount` of the base asset from `caller`, minting shares to
    /// `receiver`. Open to anyone.
    pub fn deposit(
        &mut self,
        caller: &Address,
        amount: Amount,
        receiver: &Address,
    ) -> Result<Amount, VaultError> {
        self.transact("deposit", |ctx| {
            let base = ctx.base_asset();
            ctx.deposit_into_ledger(caller, &base, amount, amount, receiver)
        })
    }

    /// Mints exactly `shares` to `receiver`, pulling the required base
    /// assets from `caller`. Returns the assets charged.
    pub fn mint(
        &mut self,
        caller: &Address,
        shares: Amount,
        receiver: &Address,
    ) -> Result<Amount, VaultError> {
        self.transact("mint", |ctx| {
            let assets = ctx.state.ledger.mint(shares, receiver)?;
            let (vault, base) = (ctx.vault(), ctx.base_asset());
            move_in(&mut *ctx.custody, &vault, &base, caller, assets)?;
            ctx.events.push(VaultEvent::Deposit {
                sender: *caller,
                receiver: *receiver,
                assets,
                shares,
            });
            Ok(assets)
        })
    }

    /// Routes a deposit of any accepted asset. Agent-only; the asset is
    /// pulled from the calling agent.
    pub fn deposit_token(
        &mut self,
        caller: &Address,
        asset: &Address,
        amount: Amount,
        receiver: &Address,
    ) -> Result<Amount, VaultError> {
        self.transact("deposit_token", |ctx| {
            ctx.require(caller, Role::Agent)?;
            let base_equivalent = DepositRouter::new(&ctx.state.config, &ctx.state.assets).quote(
                ctx.oracle,
                asset,
                amount,
                Utc::now(),
            )?;
            let shares = ctx.deposit_into_ledger(caller, asset, amount, base_equivalent, receiver)?;
            ctx.events.push(VaultEvent::TokenDeposited {
                sender: *caller,
                asset: *asset,
                amount,
                base_equivalent,
                receiver: *receiver,
                shares,
            });
            Ok(shares)
        })
    }

    /// Withdraws exactly `assets` of the base asset to `receiver`, burning
    /// the owner's shares. Only the owner may call. Returns shares burned.
    pub fn withdraw(
        &mut self,
        caller: &Address,
        assets: Amount,
        receiver: &Address,
        owner: &Address,
    ) -> Result<Amount, VaultError> {
        self.transact("withdraw", |ctx| {
            only_owner(caller, owner)?;
            valid_receiver(receiver)?;
            let deployed = ctx.deployed()?;
            ctx.state.ledger.require_liquidity(assets, deployed)?;
            let shares = ctx.state.ledger.withdraw(assets, owner)?;
            ctx.pay_out(receiver, assets)?;
            ctx.events.push(VaultEvent::Withdraw {
                sender: *caller,
                receiver: *receiver,
                owner: *owner,
                assets,
                shares,
            });
            Ok(shares)
        })
    }

    /// Burns `shares` from the owner and pays the base assets to
    /// `receiver`. Only the owner may call. Returns assets paid.
    pub fn redeem(
        &mut self,
        caller: &Address,
        shares: Amount,
        receiver: &Address,
        owner: &Address,
    ) -> Result<Amount, VaultError> {
        self.transact("redeem", |ctx| {
            only_owner(caller, owner)?;
            valid_receiver(receiver)?;
            let idle = ctx.state.ledger.idle(ctx.deployed()?);
            let assets = ctx.state.ledger.redeem(shares, owner)?;
            if assets > idle {
                return Err(LedgerError::InsufficientLiquidity {
                    requested: assets,
                    idle,
                }
                .into());
            }
            ctx.pay_out(receiver, assets)?;
            ctx.events.push(VaultEvent::Withdraw {
                sender: *caller,
                receiver: *receiver,
                owner: *owner,
                assets,
                shares,
            });
            Ok(assets)
        })
    }

    /// Pays the unclaimable residual out to `to`. Admin-only.
    pub fn sweep_residual(&mut self, caller: &Address, to: &Address) -> Result<Amount, VaultError> {
        self.transact("sweep_residual", |ctx| {
            ctx.require(caller, Role::Admin)?;
            valid_receiver(to)?;
            let idle = ctx.state.ledger.idle(ctx.deployed()?);
            let amount = ctx.state.ledger.take_residual()?;
            if amount > idle {
                return Err(LedgerError::InsufficientLiquidity {
                    requested: amount,
                    idle,
                }
                .into());
            }
            ctx.pay_out(to, amount)?;
            ctx.events.push(VaultEvent::ResidualSwept { to: *to, amount });
            Ok(amount)
        })
    }

    pub fn preview_deposit(&self, assets: Amount) -> Result<Amount, VaultError> {
        Ok(self.state.ledger.preview_deposit(assets)?)
    }

    pub fn preview_mint(&self, shares: Amount) -> Result<Amount, VaultError> {
        Ok(self.state.ledger.preview_mint(shares)?)
    }

    pub fn preview_withdraw(&self, assets: Amount) -> Result<Amount, VaultError> {
        Ok(self.state.ledger.preview_withdraw(assets)?)
    }

    pub fn preview_redeem(&self, shares: Amount) -> Result<Amount, VaultError> {
        Ok(self.state.ledger.preview_redeem(shares)?)
    }

    /// Replays the routing checks and conversion of
    /// [`deposit_token`](Self::deposit_token) without moving anything.
    pub fn preview_token_deposit(
        &self,
        asset: &Address,
        amount: Amount,
    ) -> Result<TokenDepositPreview, VaultError> {
        let base_equivalent = DepositRouter::new(&self.state.config, &self.state.assets).quote(
            &self.oracle,
            asset,
            amount,
            Utc::now(),
        )?;
        let shares = self.state.ledger.preview_deposit(base_equivalent)?;
        Ok(TokenDepositPreview {
            base_equivalent,
            shares,
        })
    }

    pub fn total_assets(&self) -> Amount {
        self.state.ledger.total_assets()
    }

    pub fn total_shares(&self) -> Amount {
        self.state.ledger.total_shares()
    }

    pub fn residual(&self) -> Amount {
        self.state.ledger.residual()
    }

    pub fn balance_of(&self, holder: &Address) -> Amount {
        self.state.ledger.balance_of(holder)
    }

    /// Base value in vault custody and free to pay out or deploy.
    pub fn idle_assets(&self) -> Result<Amount, VaultError> {
        let deployed = self.state.strategies.deployed_total()?;
        Ok(self.state.ledger.idle(deployed))
    }

    // -- strategies ----------------------------------------------------------

    pub fn add_strategy(&mut self, caller: &Address, adapter: StrategyAdapter) -> Result<(), VaultError> {
        self.transact("add_strategy", |ctx| {
            ctx.require(caller, Role::Manager)?;
            let (vault, base) = (ctx.vault(), ctx.base_asset());
            let id = adapter.id;
            ctx.state.strategies.add(adapter, &vault, &base)?;
            ctx.events.push(VaultEvent::StrategyAdded { strategy: id });
            Ok(())
        })
    }

    pub fn remove_strategy(&mut self, caller: &Address, id: &Address) -> Result<(), VaultError> {
        self.transact("remove_strategy", |ctx| {
            ctx.require(caller, Role::Manager)?;
            ctx.state.strategies.remove(id)?;
            ctx.events.push(VaultEvent::StrategyRemoved { strategy: *id });
            Ok(())
        })
    }

    /// Deploys `amount` of idle base asset into strategy `id`. Returns the
    /// strategy's new deployed balance.
    pub fn execute_strategy(
        &mut self,
        caller: &Address,
        id: &Address,
        amount: Amount,
        data: &[u8],
    ) -> Result<Amount, VaultError> {
        self.transact("execute_strategy", |ctx| {
            ctx.require(caller, Role::Agent)?;
            ctx.state.strategies.get(id)?;
            let deployed = ctx.deployed()?;
            ctx.state.ledger.require_liquidity(amount, deployed)?;
            let vault = ctx.vault();
            Ok(ctx.state.strategies.execute(
                id,
                &vault,
                amount,
                data,
                &mut *ctx.custody,
                &mut *ctx.protocol,
                &mut *ctx.events,
            )?)
        })
    }

    /// Claims (best-effort) and sweeps rewards of strategy `id`. Base-asset
    /// rewards are booked as a gain for shareholders.
    pub fn harvest_strategy(
        &mut self,
        caller: &Address,
        id: &Address,
        data: &[u8],
    ) -> Result<HarvestReport, VaultError> {
        self.transact("harvest_strategy", |ctx| {
            ctx.require(caller, Role::Agent)?;
            let vault = ctx.vault();
            let report = ctx.state.strategies.harvest(
                id,
                &vault,
                data,
                &mut *ctx.custody,
                &mut *ctx.protocol,
                &mut *ctx.events,
            )?;
            let base = ctx.base_asset();
            for (token, amount) in &report.swept {
                if *token == base {
                    ctx.state.ledger.record_gain(*amount)?;
                }
            }
            Ok(report)
        })
    }

    /// Pulls the full deployed balance of strategy `id` back into the
    /// vault. Returns the amount recovered.
    pub fn emergency_exit_strategy(
        &mut self,
        caller: &Address,
        id: &Address,
        data: &[u8],
    ) -> Result<Amount, VaultError> {
        self.transact("emergency_exit_strategy", |ctx| {
            ctx.require(caller, Role::Agent)?;
            let vault = ctx.vault();
            Ok(ctx.state.strategies.emergency_exit(
                id,
                &vault,
                data,
                &mut *ctx.custody,
                &mut *ctx.protocol,
                &mut *ctx.events,
            )?)
        })
    }

    /// Calls the claim entry point of strategy `id`. Unlike a harvest, a
    /// revert fails the call.
    pub fn claim_rewards_strategy(
        &mut self,
        caller: &Address,
        id: &Address,
        data: &[u8],
    ) -> Result<Vec<u8>, VaultError> {
        self.transact("claim_rewards_strategy", |ctx| {
            ctx.require(caller, Role::Agent)?;
            let vault = ctx.vault();
            Ok(ctx.state.strategies.claim_rewards(
                id,
                &vault,
                data,
                &mut *ctx.protocol,
                &mut *ctx.events,
            )?)
        })
    }

    pub fn add_reward_token(
        &mut self,
        caller: &Address,
        id: &Address,
        token: Address,
    ) -> Result<(), VaultError> {
        self.transact("add_reward_token", |ctx| {
            ctx.require(caller, Role::Agent)?;
            let vault = ctx.vault();
            Ok(ctx
                .state
                .strategies
                .add_reward_token(id, &vault, token, &mut *ctx.events)?)
        })
    }

    pub fn set_strategy_paused(
        &mut self,
        caller: &Address,
        id: &Address,
        paused: bool,
    ) -> Result<(), VaultError> {
        self.transact("set_strategy_paused", |ctx| {
            ctx.require(caller, Role::Agent)?;
            let vault = ctx.vault();
            Ok(ctx
                .state
                .strategies
                .set_paused(id, &vault, paused, &mut *ctx.events)?)
        })
    }

    pub fn is_strategy(&self, id: &Address) -> bool {
        self.state.strategies.is_strategy(id)
    }

    pub fn strategies(&self) -> Vec<Address> {
        self.state.strategies.ids()
    }

    pub fn strategy(&self, id: &Address) -> Option<&StrategyAdapter> {
        self.state.strategies.adapters().get(id)
    }

    /// The protocol's own report of strategy `id`'s position.
    pub fn strategy_balance(&self, id: &Address) -> Result<Amount, VaultError> {
        Ok(self.state.strategies.balance(id, &self.protocol)?)
    }

    pub fn query_strategy(
        &self,
        id: &Address,
        function: FunctionId,
        args: Vec<u8>,
    ) -> Result<Vec<u8>, VaultError> {
        Ok(self.state.strategies.query(id, &self.protocol, function, args)?)
    }

    // -- roles ---------------------------------------------------------------

    /// Grants `role` to `account`. Admin-only. Returns `false` if the grant
    /// already existed.
    pub fn grant_role(
        &mut self,
        caller: &Address,
        role: Role,
        account: Address,
    ) -> Result<bool, VaultError> {
        self.transact("grant_role", |ctx| {
            let added = ctx.state.roles.grant_role(caller, role, account)?;
            if added {
                ctx.events.push(VaultEvent::RoleGranted {
                    role,
                    account,
                    sender: *caller,
                });
            }
            Ok(added)
        })
    }

    pub fn revoke_role(
        &mut self,
        caller: &Address,
        role: Role,
        account: &Address,
    ) -> Result<bool, VaultError> {
        self.transact("revoke_role", |ctx| {
            let removed = ctx.state.roles.revoke_role(caller, role, account)?;
            if removed {
                ctx.events.push(VaultEvent::RoleRevoked {
                    role,
                    account: *account,
                    sender: *caller,
                });
            }
            Ok(removed)
        })
    }

    pub fn renounce_role(&mut self, caller: &Address, role: Role) -> Result<(), VaultError> {
        self.transact("renounce_role", |ctx| {
            ctx.state.roles.renounce_role(caller, role)?;
            ctx.events.push(VaultEvent::RoleRevoked {
                role,
                account: *caller,
                sender: *caller,
            });
            Ok(())
        })
    }

    pub fn has_role(&self, account: &Address, role: Role) -> bool {
        self.state.roles.has_role(account, role)
    }

    pub fn has_manager_role(&self, account: &Address) -> bool {
        self.has_role(account, Role::Manager)
    }

    pub fn has_agent_role(&self, account: &Address) -> bool {
        self.has_role(account, Role::Agent)
    }

    /// Every holder of `role`, in address order.
    pub fn role_members(&self, role: Role) -> Vec<Address> {
        self.state.roles.members(role)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
