//! Integration tests for strategy allocation through the vault.
//!
//! Covers the adapter state machine end to end: execute and emergency exit,
//! best-effort harvesting, pausing, liquidity limits, and removal rules.

use meridian_contracts::events::{StrategyAction, VaultEvent};
use meridian_contracts::ledger::LedgerError;
use meridian_contracts::strategy_adapter::{ProtocolBinding, StrategyAdapter, StrategyError, StrategyState};
use meridian_contracts::{ErrorKind, Vault, VaultError};
use meridian_protocol::access::Role;
use meridian_protocol::call::{encode_word, SimulatedProtocol};
use meridian_protocol::config::VaultConfig;
use meridian_protocol::custody::{Custody, InMemoryCustody};
use meridian_protocol::oracle::FixedPriceOracle;
use meridian_protocol::storage::VaultDb;
use meridian_protocol::types::{Address, FeedId, FunctionId};

type TestVault = Vault<FixedPriceOracle, InMemoryCustody, SimulatedProtocol>;

fn addr(label: &str) -> Address {
    Address::derive(label)
}

fn usdc() -> Address {
    addr("usdc")
}

fn gov() -> Address {
    addr("gov-token")
}

fn strategy_id() -> Address {
    addr("lending-adapter")
}

fn binding() -> ProtocolBinding {
    ProtocolBinding::standard(addr("lending-market"))
}

/// Helper: a vault holding 1,000 USDC from Alice with one lending strategy
/// registered. Manager and agent roles are granted.
fn setup() -> TestVault {
    let mut custody = InMemoryCustody::new();
    custody.register_asset(usdc(), 6);
    custody.register_asset(gov(), 18);
    custody.mint(&usdc(), &addr("alice"), 1_000).unwrap();

    let config = VaultConfig::new(addr("vault"), usdc(), 6);
    let mut vault = Vault::create(
        VaultDb::open_temporary().unwrap(),
        config,
        addr("admin"),
        FixedPriceOracle::new(),
        custody,
        SimulatedProtocol::new(),
    )
    .unwrap();

    let admin = addr("admin");
    vault.grant_role(&admin, Role::Manager, addr("manager")).unwrap();
    vault.grant_role(&admin, Role::Agent, addr("agent")).unwrap();
    vault
        .configure_token(&addr("manager"), usdc(), FeedId::NO_ORACLE, 6)
        .unwrap();
    vault
        .add_strategy(
            &addr("manager"),
            StrategyAdapter::new(strategy_id(), addr("vault"), usdc(), binding()),
        )
        .unwrap();
    vault.deposit(&addr("alice"), 1_000, &addr("alice")).unwrap();
    vault.take_events();
    vault
}

/// Tracked base value must equal base custody held by the vault plus what
/// strategies report deployed, and deployed principal must sit at the
/// protocol target.
fn assert_backed(vault: &TestVault) {
    let deployed: u128 = vault
        .strategies()
        .iter()
        .filter_map(|id| vault.strategy(id))
        .map(|s| s.deployed_balance())
        .sum();
    let custody = vault.custody();
    assert_eq!(
        vault.total_assets() + vault.residual(),
        custody.balance_of(&usdc(), &vault.config().vault) + deployed
    );
    assert_eq!(custody.balance_of(&usdc(), &binding().target), deployed);
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn execute_then_emergency_exit_returns_principal() {
    let mut vault = setup();
    let agent = addr("agent");
    let vault_account = vault.config().vault;

    assert_eq!(vault.execute_strategy(&agent, &strategy_id(), 100, &[]).unwrap(), 100);
    let adapter = vault.strategy(&strategy_id()).unwrap();
    assert_eq!(adapter.deployed_balance(), 100);
    assert_eq!(adapter.state(), StrategyState::Deployed);
    assert_eq!(vault.custody().balance_of(&usdc(), &vault_account), 900);
    assert_eq!(vault.total_assets(), 1_000);
    assert_eq!(vault.idle_assets().unwrap(), 900);

    let events = vault.take_events();
    let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["StrategyDeposit", "Executed", "StrategyExecuted"]);

    assert_eq!(
        vault.emergency_exit_strategy(&agent, &strategy_id(), &[]).unwrap(),
        100
    );
    assert_eq!(vault.custody().balance_of(&usdc(), &vault_account), 1_000);
    assert_eq!(vault.strategy(&strategy_id()).unwrap().deployed_balance(), 0);
    assert_eq!(vault.strategy(&strategy_id()).unwrap().state(), StrategyState::Idle);

    let err = vault
        .emergency_exit_strategy(&agent, &strategy_id(), &[])
        .unwrap_err();
    assert!(matches!(
        err,
        VaultError::Strategy(StrategyError::NoUnderlyingBalance(_))
    ));
}

#[test]
fn failed_withdraw_aborts_exit_loudly() {
    let mut vault = setup();
    let agent = addr("agent");
    vault.execute_strategy(&agent, &strategy_id(), 400, &[]).unwrap();
    vault.protocol_mut().fail(binding().withdraw_fn);

    let err = vault
        .emergency_exit_strategy(&agent, &strategy_id(), &[])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integration);
    assert_eq!(vault.strategy(&strategy_id()).unwrap().deployed_balance(), 400);

    vault.protocol_mut().recover(&binding().withdraw_fn);
    assert_eq!(
        vault.emergency_exit_strategy(&agent, &strategy_id(), &[]).unwrap(),
        400
    );
}

#[test]
fn failed_deposit_leaves_custody_and_balance() {
    let mut vault = setup();
    let agent = addr("agent");
    vault.protocol_mut().fail(binding().deposit_fn);

    let err = vault
        .execute_strategy(&agent, &strategy_id(), 100, &[])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integration);
    assert_eq!(vault.strategy(&strategy_id()).unwrap().deployed_balance(), 0);
    assert_eq!(vault.custody().balance_of(&usdc(), &vault.config().vault), 1_000);
}

#[test]
fn execute_limited_to_idle_cash() {
    let mut vault = setup();
    let agent = addr("agent");
    vault.execute_strategy(&agent, &strategy_id(), 700, &[]).unwrap();

    let err = vault
        .execute_strategy(&agent, &strategy_id(), 301, &[])
        .unwrap_err();
    assert!(matches!(
        err,
        VaultError::Ledger(LedgerError::InsufficientLiquidity {
            requested: 301,
            idle: 300
        })
    ));

    // Withdrawals are bounded the same way.
    let alice = addr("alice");
    let err = vault.withdraw(&alice, 500, &alice, &alice).unwrap_err();
    assert!(matches!(
        err,
        VaultError::Ledger(LedgerError::InsufficientLiquidity { .. })
    ));
    vault.withdraw(&alice, 300, &alice, &alice).unwrap();
}

// ---------------------------------------------------------------------------
// Harvest
// ---------------------------------------------------------------------------

#[test]
fn harvest_survives_failing_claim() {
    let mut vault = setup();
    let agent = addr("agent");
    vault.add_reward_token(&agent, &strategy_id(), gov()).unwrap();
    vault.execute_strategy(&agent, &strategy_id(), 100, &[]).unwrap();
    vault.custody_mut().mint(&gov(), &strategy_id(), 42).unwrap();
    vault.protocol_mut().fail(binding().claim_fn);
    vault.take_events();

    let report = vault.harvest_strategy(&agent, &strategy_id(), &[]).unwrap();
    assert!(report.claim_failure.is_some());
    assert_eq!(report.swept, vec![(gov(), 42)]);
    assert_eq!(vault.strategy(&strategy_id()).unwrap().deployed_balance(), 100);
    assert_eq!(vault.custody().balance_of(&gov(), &vault.config().vault), 42);

    let events = vault.take_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, VaultEvent::ClaimRewardsFailed { .. })));
    assert!(events.contains(&VaultEvent::StrategyExecuted {
        strategy: strategy_id(),
        action: StrategyAction::Harvest,
    }));

    // The strict claim path does propagate.
    let err = vault
        .claim_rewards_strategy(&agent, &strategy_id(), &[])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integration);
}

#[test]
fn base_asset_rewards_raise_share_price() {
    let mut vault = setup();
    let agent = addr("agent");
    vault.add_reward_token(&agent, &strategy_id(), usdc()).unwrap();
    vault.custody_mut().mint(&usdc(), &strategy_id(), 100).unwrap();

    vault.harvest_strategy(&agent, &strategy_id(), &[]).unwrap();
    assert_eq!(vault.total_assets(), 1_100);
    assert_eq!(vault.total_shares(), 1_000);
    assert_eq!(vault.preview_redeem(1_000).unwrap(), 1_100);
}

#[test]
fn residual_sweep_after_last_share_burned() {
    let mut custody = InMemoryCustody::new();
    custody.register_asset(usdc(), 6);
    custody.mint(&usdc(), &addr("alice"), 3).unwrap();
    let mut vault = Vault::create(
        VaultDb::open_temporary().unwrap(),
        VaultConfig::new(addr("vault"), usdc(), 6),
        addr("admin"),
        FixedPriceOracle::new(),
        custody,
        SimulatedProtocol::new(),
    )
    .unwrap();
    let (admin, manager, agent, alice) = (addr("admin"), addr("manager"), addr("agent"), addr("alice"));
    vault.grant_role(&admin, Role::Manager, manager).unwrap();
    vault.grant_role(&admin, Role::Agent, agent).unwrap();
    vault
        .add_strategy(
            &manager,
            StrategyAdapter::new(strategy_id(), addr("vault"), usdc(), binding()),
        )
        .unwrap();
    vault.add_reward_token(&agent, &strategy_id(), usdc()).unwrap();

    vault.deposit(&alice, 3, &alice).unwrap();
    vault.custody_mut().mint(&usdc(), &strategy_id(), 1).unwrap();
    vault.harvest_strategy(&agent, &strategy_id(), &[]).unwrap();
    assert_eq!(vault.total_assets(), 4);

    // Withdrawing 3 of 4 burns ceil(3 * 3 / 4) = 3 shares: all of them.
    assert_eq!(vault.withdraw(&alice, 3, &alice, &alice).unwrap(), 3);
    assert_eq!(vault.total_shares(), 0);
    assert_eq!(vault.residual(), 1);

    let treasury = addr("treasury");
    assert_eq!(vault.sweep_residual(&admin, &treasury).unwrap(), 1);
    assert_eq!(vault.custody().balance_of(&usdc(), &treasury), 1);
    assert_eq!(vault.residual(), 0);
    assert!(matches!(
        vault.sweep_residual(&admin, &treasury),
        Err(VaultError::Ledger(LedgerError::NoResidual))
    ));
}

// ---------------------------------------------------------------------------
// Controls
// ---------------------------------------------------------------------------

#[test]
fn pause_blocks_execute_but_not_exit() {
    let mut vault = setup();
    let agent = addr("agent");
    vault.execute_strategy(&agent, &strategy_id(), 50, &[]).unwrap();
    vault.set_strategy_paused(&agent, &strategy_id(), true).unwrap();

    let err = vault
        .execute_strategy(&agent, &strategy_id(), 50, &[])
        .unwrap_err();
    assert!(matches!(err, VaultError::Strategy(StrategyError::StrategyPaused(_))));
    vault.harvest_strategy(&agent, &strategy_id(), &[]).unwrap();
    assert_eq!(vault.emergency_exit_strategy(&agent, &strategy_id(), &[]).unwrap(), 50);
}

#[test]
fn strategy_management_rules() {
    let mut vault = setup();
    let manager = addr("manager");
    let agent = addr("agent");

    let err = vault
        .add_strategy(
            &manager,
            StrategyAdapter::new(strategy_id(), addr("vault"), usdc(), binding()),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        VaultError::Strategy(StrategyError::StrategyAlreadyExists(_))
    ));

    vault.execute_strategy(&agent, &strategy_id(), 10, &[]).unwrap();
    let err = vault.remove_strategy(&manager, &strategy_id()).unwrap_err();
    assert!(matches!(
        err,
        VaultError::Strategy(StrategyError::StrategyStillDeployed { deployed: 10, .. })
    ));

    vault.emergency_exit_strategy(&agent, &strategy_id(), &[]).unwrap();
    vault.remove_strategy(&manager, &strategy_id()).unwrap();
    assert!(!vault.is_strategy(&strategy_id()));

    let err = vault
        .harvest_strategy(&agent, &strategy_id(), &[])
        .unwrap_err();
    assert!(matches!(
        err,
        VaultError::Strategy(StrategyError::StrategyDoesNotExist(_))
    ));
}

#[test]
fn strategy_accounts_must_be_distinct() {
    let mut vault = setup();
    let manager = addr("manager");
    let snapshot = vault.state().clone();

    let self_sweeping = StrategyAdapter::new(
        addr("vault"),
        addr("vault"),
        usdc(),
        ProtocolBinding::standard(addr("other-market")),
    );
    let into_target = StrategyAdapter::new(
        addr("other-market"),
        addr("vault"),
        usdc(),
        ProtocolBinding::standard(addr("other-market")),
    );
    let target_is_vault = StrategyAdapter::new(
        addr("other-adapter"),
        addr("vault"),
        usdc(),
        ProtocolBinding::standard(addr("vault")),
    );
    for adapter in [self_sweeping, into_target, target_is_vault] {
        let err = vault.add_strategy(&manager, adapter).unwrap_err();
        assert!(matches!(err, VaultError::Strategy(StrategyError::InvalidAddress)));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
    assert_eq!(vault.state(), &snapshot);
}

#[test]
fn custody_backs_ledger_through_strategy_cycle() {
    let mut vault = setup();
    let agent = addr("agent");
    let alice = addr("alice");
    assert_backed(&vault);

    vault.add_reward_token(&agent, &strategy_id(), usdc()).unwrap();
    vault.execute_strategy(&agent, &strategy_id(), 400, &[]).unwrap();
    assert_backed(&vault);

    vault.custody_mut().mint(&usdc(), &strategy_id(), 50).unwrap();
    vault.harvest_strategy(&agent, &strategy_id(), &[]).unwrap();
    assert_eq!(vault.total_assets(), 1_050);
    assert_backed(&vault);

    // Nothing left to sweep: a second harvest books no gain.
    vault.harvest_strategy(&agent, &strategy_id(), &[]).unwrap();
    assert_eq!(vault.total_assets(), 1_050);
    assert_backed(&vault);

    vault.withdraw(&alice, 300, &alice, &alice).unwrap();
    assert_backed(&vault);

    vault.emergency_exit_strategy(&agent, &strategy_id(), &[]).unwrap();
    assert_backed(&vault);

    let remaining = vault.balance_of(&alice);
    vault.redeem(&alice, remaining, &alice, &alice).unwrap();
    assert_eq!(vault.total_shares(), 0);
    assert_backed(&vault);
    assert_eq!(vault.custody().balance_of(&usdc(), &alice), 1_050);
}

#[test]
fn strategy_calls_require_agent() {
    let mut vault = setup();
    let manager = addr("manager");
    let snapshot = vault.state().clone();

    for err in [
        vault.execute_strategy(&manager, &strategy_id(), 10, &[]).err(),
        vault.emergency_exit_strategy(&manager, &strategy_id(), &[]).err(),
        vault.harvest_strategy(&manager, &strategy_id(), &[]).err(),
    ] {
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::Authorization));
    }
    let err = vault.remove_strategy(&addr("agent"), &strategy_id()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert_eq!(vault.state(), &snapshot);
    assert!(vault.protocol().calls().is_empty());
}

#[test]
fn protocol_queries_pass_through() {
    let mut vault = setup();
    vault
        .protocol_mut()
        .respond(binding().balance_fn, encode_word(1_234).to_vec());
    assert_eq!(vault.strategy_balance(&strategy_id()).unwrap(), 1_234);

    let apy = FunctionId::from_signature("currentApy()");
    vault.protocol_mut().respond(apy, vec![0, 0, 1, 244]);
    assert_eq!(
        vault.query_strategy(&strategy_id(), apy, Vec::new()).unwrap(),
        vec![0, 0, 1, 244]
    );
    assert_eq!(vault.strategies(), vec![strategy_id()]);
}
