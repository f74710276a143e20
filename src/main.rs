//! Synthetic Index Peg Maintenance Simulation.
//!
//! Demonstrates the full control loop lifecycle including reflective price
//! tracking, band-constrained swaps, commit/reveal recentering, arbitrage
//! delegation, and circuit breaker escalation.

use peg_core::*;
use rust_decimal_macros::dec;

fn main() {
    println!("Synthetic Index Peg Maintenance Simulation");
    println!("Reflective Control Loop, Concentrated Liquidity Band\n");

    scenario_1_quiet_market();
    scenario_2_arbitrage_delegation();
    scenario_3_band_trading();
    scenario_4_commit_reveal_recenter();
    scenario_5_breaker_escalation();
    scenario_6_emergency_shutdown();

    println!("\nAll simulations completed successfully.");
}

fn seeded_controller() -> (Controller<MockOracle, MockArbitrage>, AdminCap) {
    let mut config = ControllerConfig::default();
    config.sync_every_tick = true;

    let mut band = BandManager::new(BandConfig::default()).unwrap();
    band.deposit(
        ProviderId(1),
        Amount::new_unchecked(dec!(1_000_000)),
        Amount::new_unchecked(dec!(1_000_000)),
    )
    .unwrap();

    let oracle = MockOracle::new(dec!(1.00), Timestamp::from_secs(0));
    let (mut ctl, cap) = Controller::new(
        config,
        band,
        oracle,
        MockArbitrage::new(),
        Price::new_unchecked(dec!(1.00)),
        Timestamp::from_secs(0),
    )
    .unwrap();
    ctl.fund_vault(&cap, Token::Synth, Amount::new_unchecked(dec!(100_000)));
    ctl.fund_vault(&cap, Token::Reserve, Amount::new_unchecked(dec!(100_000)));
    (ctl, cap)
}

fn tick(ctl: &mut Controller<MockOracle, MockArbitrage>, block: u64) -> SyncReport {
    ctl.set_block(block);
    let now = Timestamp::from_secs(block as i64 * 60);
    ctl.oracle_mut().set_timestamp(now);
    ctl.sync(now).unwrap()
}

/// A healthy peg: deviations stay below the action floor.
fn scenario_1_quiet_market() {
    println!("Scenario 1: Quiet Market\n");

    let (mut ctl, _cap) = seeded_controller();
    println!("  Band seeded with 1,000,000 / 1,000,000 at 1.00");

    for block in 1..=3 {
        let report = tick(&mut ctl, block);
        println!(
            "  [block {}] reflective {} market {} deviation {} -> {:?}",
            block, report.reflective_price, report.market_price, report.deviation, report.action
        );
        assert_eq!(report.action, SyncAction::None);
    }
    println!();
}

/// A 30 bps gap is too small for a recenter and lands with the arbitrage
/// collaborator.
fn scenario_2_arbitrage_delegation() {
    println!("Scenario 2: Arbitrage Delegation\n");

    let (mut ctl, _cap) = seeded_controller();
    ctl.oracle_mut().set_price(dec!(1.003));

    let report = tick(&mut ctl, 1);
    println!(
        "  Oracle at 1.003, market at {}: deviation {}",
        report.market_price, report.deviation
    );
    match report.action {
        SyncAction::ArbitrageExecuted { bought_synth, amount } => {
            println!(
                "  Collaborator {} {} synth\n",
                if bought_synth { "bought" } else { "sold" },
                amount
            );
        }
        other => println!("  Unexpected action: {other:?}\n"),
    }
}

/// Swaps accrue fees and the per-token accounting identity holds throughout.
fn scenario_3_band_trading() {
    println!("Scenario 3: Band-Constrained Trading\n");

    let (mut ctl, _cap) = seeded_controller();

    ctl.set_block(1);
    let result = ctl
        .swap(Token::Reserve, Amount::new_unchecked(dec!(5_000)), Amount::zero())
        .unwrap();
    println!(
        "  Swapped 5,000 reserve in: {} synth out, fee {}, implied price {}",
        result.amount_out, result.fee, result.implied_price
    );

    ctl.set_block(2);
    let result = ctl
        .swap(Token::Synth, Amount::new_unchecked(dec!(5_000)), Amount::zero())
        .unwrap();
    println!(
        "  Swapped 5,000 synth in: {} reserve out, implied price {}",
        result.amount_out, result.implied_price
    );

    ctl.band().check_accounting().unwrap();
    println!(
        "  Accounting holds: fees {} synth / {} reserve accrued\n",
        ctl.band().accrued_fees(Token::Synth),
        ctl.band().accrued_fees(Token::Reserve)
    );

    // a swap that would push the implied price past the band fails whole
    ctl.set_block(3);
    let err = ctl
        .swap(Token::Reserve, Amount::new_unchecked(dec!(50_000)), Amount::zero())
        .unwrap_err();
    println!("  Oversized swap rejected: {err}");
    println!("  Event log holds {} entries\n", ctl.events().len());
}

/// The full recenter pipeline: commit under divergence, reveal once the
/// reflective price has converged back toward the market.
fn scenario_4_commit_reveal_recenter() {
    println!("Scenario 4: Commit/Reveal Recentering\n");

    let (mut ctl, _cap) = seeded_controller();

    // accrue fee coverage through round-trip trading
    for block in 1..=16 {
        let (token, amount) = if block % 2 == 1 {
            (Token::Reserve, dec!(9_000))
        } else {
            (Token::Synth, dec!(9_000))
        };
        ctl.band_mut()
            .swap(token, Amount::new_unchecked(amount), Amount::zero(), block)
            .unwrap();
    }
    println!(
        "  Fees accrued: {} synth / {} reserve",
        ctl.band().accrued_fees(Token::Synth),
        ctl.band().accrued_fees(Token::Reserve)
    );

    let before = ctl.band().position().unwrap().clone();
    println!(
        "  Band before: [{}, {}] implied {}",
        before.lower_bound,
        before.upper_bound,
        ctl.band().current_price().unwrap()
    );

    ctl.oracle_mut().set_price(dec!(1.02));
    let report = tick(&mut ctl, 17);
    println!("  Oracle spikes to 1.02: {:?}", report.action);

    let report = tick(&mut ctl, 18);
    println!("  Commit maturing, deviation {}: {:?}", report.deviation, report.action);

    ctl.oracle_mut().set_price(dec!(1.002));
    let report = tick(&mut ctl, 20);
    println!("  Oracle reverts to 1.002: {:?}", report.action);
    assert_eq!(report.action, SyncAction::Recentered);

    let after = ctl.band().position().unwrap();
    println!(
        "  Band after: [{}, {}] implied {}\n",
        after.lower_bound,
        after.upper_bound,
        ctl.band().current_price().unwrap()
    );
}

/// Sustained divergence walks the breaker up to Halt; only an administrative
/// reset restores syncing.
fn scenario_5_breaker_escalation() {
    println!("Scenario 5: Circuit Breaker Escalation\n");

    let (mut ctl, cap) = seeded_controller();
    ctl.set_arbitrage_enabled(&cap, false);
    ctl.set_band_integration(&cap, false);
    ctl.oracle_mut().set_price(dec!(1.10));

    for block in 1..=30 {
        ctl.set_block(block);
        let now = Timestamp::from_secs(block as i64 * 60);
        ctl.oracle_mut().set_timestamp(now);
        match ctl.sync(now) {
            Ok(report) => {
                if report.breaker_level > BreakerLevel::Normal {
                    println!(
                        "  [block {}] deviation {} -> breaker {}",
                        block,
                        report.deviation,
                        report.breaker_level.name()
                    );
                }
            }
            Err(ControllerError::Halted) => {
                println!("  [block {block}] sync refused: breaker at Halt");
                break;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    ctl.emergency_set_price(&cap, Price::new_unchecked(dec!(1.00)))
        .unwrap();
    ctl.emergency_reset_breaker(&cap, BreakerLevel::Normal);
    println!("  Admin reset: reflective price forced to 1.00, breaker Normal\n");
}

/// Shutdown freezes the band and providers claim pro-rata.
fn scenario_6_emergency_shutdown() {
    println!("Scenario 6: Emergency Shutdown\n");

    let (mut ctl, cap) = seeded_controller();
    ctl.band_mut()
        .deposit(
            ProviderId(2),
            Amount::new_unchecked(dec!(500_000)),
            Amount::new_unchecked(dec!(500_000)),
        )
        .unwrap();

    ctl.emergency_shutdown(&cap).unwrap();
    println!("  Band shut down; trading disabled");

    let err = ctl
        .band_mut()
        .swap(Token::Reserve, Amount::new_unchecked(dec!(100)), Amount::zero(), 1)
        .unwrap_err();
    println!("  Swap rejected: {err}");

    let (a1, b1) = ctl.band_mut().claim(ProviderId(1)).unwrap();
    let (a2, b2) = ctl.band_mut().claim(ProviderId(2)).unwrap();
    println!("  Provider 1 claimed {a1} / {b1}");
    println!("  Provider 2 claimed {a2} / {b2}");
}
