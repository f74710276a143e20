// 8.1 controller/core.rs: main controller. owns the reflective engine,
// deviation history, breaker, band manager, and collaborator handles.

use super::config::{
    ControllerConfig, ControllerConfigError, MAX_STALENESS_SECS, MAX_SYNC_INTERVAL_SECS,
    MIN_STALENESS_SECS, MIN_SYNC_INTERVAL_SECS,
};
use super::results::{ControllerError, SyncAction, SyncReport};
use crate::arbitrage::ReserveArbitrage;
use crate::band::{BandError, BandManager};
use crate::breaker::{BreakerLevel, BreakerTransition, CircuitBreaker};
use crate::commit_reveal::{CommitError, StateHash};
use crate::deviation::{DeviationSample, DeviationTracker};
use crate::events::{
    ArbitrageExecutedEvent, ArbitragePendingEvent, BreakerEscalatedEvent, BreakerOverriddenEvent,
    BreakerRecoveredEvent, EmergencyPriceSetEvent, Event, EventCollector, EventEmitter,
    EventPayload, PriceSyncedEvent, RecenterCommittedEvent, RecenteredEvent, VaultFundedEvent,
};
use crate::oracle::OracleAggregator;
use crate::reflective::ReflectivePriceEngine;
use crate::types::{AdminCap, Amount, BlockNumber, Bps, Price, SignedBps, Timestamp, Token};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Below this absolute deviation a sync cycle takes no corrective action.
const ACTION_FLOOR_BPS: u64 = 10;
/// At or above this the recenter pipeline is preferred over arbitrage.
const RECENTER_BRANCH_BPS: u64 = 70;
/// A matured commit is only revealed once the gap is back inside this bound.
const EXEC_DRIFT_BOUND_BPS: u64 = 50;
/// Fraction of the relevant band reserve offered to the arbitrage
/// collaborator per cycle.
const ARB_TRADE_FRACTION: Decimal = dec!(0.01);

/// One retained sync observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub block: BlockNumber,
    pub timestamp: Timestamp,
    pub reflective_price: Price,
    pub market_price: Price,
    pub deviation: SignedBps,
}

/** 8.2: controller struct. all peg state lives here */
#[derive(Debug)]
pub struct Controller<O: OracleAggregator, A: ReserveArbitrage> {
    pub(super) config: ControllerConfig,
    pub(super) reflective: ReflectivePriceEngine,
    pub(super) tracker: DeviationTracker,
    pub(super) breaker: CircuitBreaker,
    pub(super) band: BandManager,
    pub(super) oracle: O,
    pub(super) arbitrage: A,
    pub(super) events: EventCollector,
    pub(super) observations: Vec<PriceObservation>,
    pub(super) paused: bool,
    pub(super) current_block: BlockNumber,
    pub(super) current_time: Timestamp,
    pub(super) last_sync: Option<Timestamp>,
    pub(super) pending_commit: Option<StateHash>,
}

impl<O: OracleAggregator, A: ReserveArbitrage> Controller<O, A> {
    /// Construct the controller and mint the one admin capability. Every
    /// administrative operation requires a reference to the returned cap;
    /// there is no other way to obtain one.
    pub fn new(
        config: ControllerConfig,
        band: BandManager,
        oracle: O,
        arbitrage: A,
        initial_price: Price,
        now: Timestamp,
    ) -> Result<(Self, AdminCap), ControllerConfigError> {
        config.validate()?;
        let reflective = ReflectivePriceEngine::new(initial_price, config.max_delta_bps, now);
        let events = EventCollector::with_capacity(config.max_observations);
        let controller = Self {
            config,
            reflective,
            tracker: DeviationTracker::new(),
            breaker: CircuitBreaker::new(),
            band,
            oracle,
            arbitrage,
            events,
            observations: Vec::new(),
            paused: false,
            current_block: 0,
            current_time: now,
            last_sync: None,
            pending_commit: None,
        };
        Ok((controller, AdminCap::mint()))
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, millis: i64) {
        self.current_time = Timestamp::from_millis(self.current_time.as_millis() + millis);
    }

    pub fn set_block(&mut self, block: BlockNumber) {
        self.current_block = block;
    }

    pub fn block(&self) -> BlockNumber {
        self.current_block
    }

    pub fn advance_block(&mut self, blocks: u64) {
        self.current_block += blocks;
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn reflective_price(&self) -> Price {
        self.reflective.price()
    }

    pub fn breaker_level(&self) -> BreakerLevel {
        self.breaker.level
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn band(&self) -> &BandManager {
        &self.band
    }

    pub fn band_mut(&mut self) -> &mut BandManager {
        &mut self.band
    }

    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    pub fn arbitrage_mut(&mut self) -> &mut A {
        &mut self.arbitrage
    }

    pub fn events(&self) -> &[Event] {
        self.events.events()
    }

    pub fn observations(&self) -> &[PriceObservation] {
        &self.observations
    }

    pub fn pending_commit(&self) -> Option<StateHash> {
        self.pending_commit
    }

    /// One full control cycle: oracle read, reflective update, deviation
    /// record, breaker evaluation, then the corrective action branch.
    pub fn sync(&mut self, now: Timestamp) -> Result<SyncReport, ControllerError> {
        if self.paused {
            return Err(ControllerError::Paused);
        }
        if self.breaker.level == BreakerLevel::Halt {
            return Err(ControllerError::Halted);
        }
        if !self.config.sync_every_tick {
            if let Some(last) = self.last_sync {
                let interval_ms = self.config.sync_interval_secs * 1000;
                let elapsed = now.elapsed_since(last);
                if elapsed < interval_ms {
                    return Err(ControllerError::NotDue {
                        remaining_ms: interval_ms - elapsed,
                    });
                }
            }
        }
        self.current_time = now;

        let reading = self.oracle.aggregated_price()?;

        // the cycle is all-or-nothing: engine, deviation history, and breaker
        // mutations are staged and committed only once the corrective branch
        // has succeeded. a failed sync leaves them untouched, so retries
        // cannot compound reflective updates inside one interval
        let mut reflective_engine = self.reflective.clone();
        let reflective = reflective_engine.update(
            reading.price.value(),
            reading.timestamp,
            now,
            self.config.max_staleness_secs * 1000,
        )?;

        // the band's implied price is the market; with no live band the
        // reflective price stands in and deviation reads zero
        let market = self.band.current_price().unwrap_or(reflective);
        let deviation = SignedBps::between(reflective, market);

        let mut tracker = self.tracker.clone();
        tracker.record(DeviationSample {
            block: self.current_block,
            deviation_bps: deviation.abs(),
            signed_bps: deviation.value(),
            timestamp: now,
        });

        let mut breaker = self.breaker;
        let transition = breaker.evaluate(&tracker, self.current_block, &self.config.breaker);

        let action = self.dispatch(reflective, deviation, now)?;

        self.reflective = reflective_engine;
        self.tracker = tracker;
        self.breaker = breaker;
        self.observations.push(PriceObservation {
            block: self.current_block,
            timestamp: now,
            reflective_price: reflective,
            market_price: market,
            deviation,
        });
        if self.observations.len() > self.config.max_observations {
            self.observations.remove(0);
        }
        self.last_sync = Some(now);

        match transition {
            BreakerTransition::Escalated { from, to } => {
                self.emit_event(EventPayload::BreakerEscalated(BreakerEscalatedEvent {
                    block: self.current_block,
                    from,
                    to,
                    deviation,
                }));
                if self.config.verbose {
                    println!(
                        "[block {}] breaker escalated {} -> {} at {}",
                        self.current_block,
                        from.name(),
                        to.name(),
                        deviation
                    );
                }
            }
            BreakerTransition::Recovered { from } => {
                self.emit_event(EventPayload::BreakerRecovered(BreakerRecoveredEvent {
                    block: self.current_block,
                    from,
                }));
            }
            BreakerTransition::Unchanged => {}
        }
        self.emit_event(EventPayload::PriceSynced(PriceSyncedEvent {
            block: self.current_block,
            reflective_price: reflective,
            market_price: market,
            deviation,
            breaker_level: self.breaker.level,
        }));
        if self.config.verbose {
            println!(
                "[block {}] sync: reflective {} market {} dev {} action {:?}",
                self.current_block, reflective, market, deviation, action
            );
        }

        Ok(SyncReport {
            reflective_price: reflective,
            market_price: market,
            deviation,
            breaker_level: self.breaker.level,
            action,
        })
    }

    // corrective action branch of the sync cycle. a matured commit takes
    // priority once the gap has converged back inside the reveal bound;
    // otherwise large gaps feed the recenter pipeline and mid-size gaps the
    // arbitrage collaborator.
    fn dispatch(
        &mut self,
        reflective: Price,
        deviation: SignedBps,
        now: Timestamp,
    ) -> Result<SyncAction, ControllerError> {
        let dev = deviation.abs();

        if self.config.band_integration_enabled {
            if let Some(hash) = self.pending_commit {
                if self.band.recenter_ready(&hash, self.current_block)
                    && dev <= EXEC_DRIFT_BOUND_BPS
                {
                    return self.reveal_commit(hash, reflective, now);
                }
            }

            if dev >= RECENTER_BRANCH_BPS
                && self.pending_commit.is_none()
                && self.band.can_recenter(reflective)
            {
                let hash = self.band.commit_recenter(self.current_block)?;
                self.pending_commit = Some(hash);
                self.emit_event(EventPayload::RecenterCommitted(RecenterCommittedEvent {
                    block: self.current_block,
                    ready_block: self.current_block + self.band.recenter_delay_blocks(),
                }));
                return Ok(SyncAction::RecenterCommitted);
            }
        }

        if dev < ACTION_FLOOR_BPS {
            return Ok(SyncAction::None);
        }
        Ok(self.delegate_arbitrage(deviation))
    }

    fn reveal_commit(
        &mut self,
        hash: StateHash,
        reflective: Price,
        now: Timestamp,
    ) -> Result<SyncAction, ControllerError> {
        match self
            .band
            .execute_recenter(hash, reflective, self.current_block, now)
        {
            Ok(outcome) => {
                self.pending_commit = None;
                self.emit_event(EventPayload::Recentered(RecenteredEvent {
                    block: self.current_block,
                    price: outcome.price,
                    fee_charged: outcome.fee_charged,
                    forced: false,
                }));
                Ok(SyncAction::Recentered)
            }
            Err(err) => {
                // a mismatched commit can never mature into a valid reveal;
                // drop it so the next cycle can commit fresh
                if matches!(err, BandError::Commit(CommitError::StateMismatch)) {
                    self.band.drop_commit(&hash);
                    self.pending_commit = None;
                }
                Err(err.into())
            }
        }
    }

    // failures here are reported, never propagated: the collaborator is
    // best-effort by contract
    fn delegate_arbitrage(&mut self, deviation: SignedBps) -> SyncAction {
        if !self.config.arbitrage_enabled {
            return self.arbitrage_pending(deviation, "arbitrage disabled");
        }
        let (willing, _) = self.arbitrage.can_execute();
        if !willing {
            return self.arbitrage_pending(deviation, "collaborator declined");
        }

        // market below reflective: synth is cheap, buy it back
        let buy = deviation.value() < 0;
        let reserve = match self.band.position() {
            Some(pos) if buy => pos.reserve_b,
            Some(pos) => pos.reserve_a,
            None => return self.arbitrage_pending(deviation, "no band liquidity"),
        };
        let max_amount = reserve.mul(ARB_TRADE_FRACTION);
        if max_amount.is_zero() {
            return self.arbitrage_pending(deviation, "no band liquidity");
        }

        match self.arbitrage.execute(buy, max_amount) {
            Ok(amount) => {
                self.emit_event(EventPayload::ArbitrageExecuted(ArbitrageExecutedEvent {
                    block: self.current_block,
                    bought_synth: buy,
                    amount,
                }));
                SyncAction::ArbitrageExecuted {
                    bought_synth: buy,
                    amount,
                }
            }
            Err(err) => {
                let reason = err.to_string();
                self.arbitrage_pending(deviation, &reason)
            }
        }
    }

    fn arbitrage_pending(&mut self, deviation: SignedBps, reason: &str) -> SyncAction {
        self.emit_event(EventPayload::ArbitragePending(ArbitragePendingEvent {
            block: self.current_block,
            deviation,
            reason: reason.to_string(),
        }));
        SyncAction::ArbitragePending
    }

    // ---- band passthroughs. the controller is the audited facade: going
    // through it lands the matching event in the log ----

    pub fn swap(
        &mut self,
        token_in: Token,
        amount_in: Amount,
        min_amount_out: Amount,
    ) -> Result<crate::band::SwapResult, ControllerError> {
        let result = self
            .band
            .swap(token_in, amount_in, min_amount_out, self.current_block)?;
        self.emit_event(EventPayload::SwapExecuted(
            crate::events::SwapExecutedEvent::from_result(self.current_block, &result),
        ));
        Ok(result)
    }

    pub fn deposit_liquidity(
        &mut self,
        provider: crate::band::ProviderId,
        amount_a: Amount,
        amount_b: Amount,
    ) -> Result<Decimal, ControllerError> {
        let minted = self.band.deposit(provider, amount_a, amount_b)?;
        self.emit_event(EventPayload::LiquidityDeposited(
            crate::events::LiquidityDepositedEvent {
                provider: provider.0,
                amount_a,
                amount_b,
                shares_minted: minted,
            },
        ));
        Ok(minted)
    }

    pub fn withdraw_liquidity(
        &mut self,
        provider: crate::band::ProviderId,
        shares: Decimal,
    ) -> Result<(Amount, Amount), ControllerError> {
        let (out_a, out_b) = self.band.withdraw(provider, shares)?;
        self.emit_event(EventPayload::LiquidityWithdrawn(
            crate::events::LiquidityWithdrawnEvent {
                provider: provider.0,
                amount_a: out_a,
                amount_b: out_b,
                shares_burned: shares,
            },
        ));
        Ok((out_a, out_b))
    }

    pub fn emergency_shutdown(&mut self, _cap: &AdminCap) -> Result<(), ControllerError> {
        self.band.emergency_shutdown()?;
        self.emit_event(EventPayload::EmergencyShutdown);
        Ok(())
    }

    // ---- administrative surface. every entry takes the capability token ----

    pub fn pause(&mut self, _cap: &AdminCap) {
        self.paused = true;
        self.emit_event(EventPayload::Paused);
    }

    pub fn unpause(&mut self, _cap: &AdminCap) {
        self.paused = false;
        self.emit_event(EventPayload::Unpaused);
    }

    pub fn set_sync_interval(
        &mut self,
        _cap: &AdminCap,
        secs: i64,
    ) -> Result<(), ControllerError> {
        if !(MIN_SYNC_INTERVAL_SECS..=MAX_SYNC_INTERVAL_SECS).contains(&secs) {
            return Err(ControllerConfigError::InvalidSyncInterval(secs).into());
        }
        self.config.sync_interval_secs = secs;
        self.emit_config_updated("sync_interval_secs");
        Ok(())
    }

    pub fn set_max_delta(&mut self, _cap: &AdminCap, max_delta: Bps) -> Result<(), ControllerError> {
        self.reflective.set_max_delta(max_delta)?;
        self.config.max_delta_bps = max_delta;
        self.emit_config_updated("max_delta_bps");
        Ok(())
    }

    pub fn set_max_staleness(&mut self, _cap: &AdminCap, secs: i64) -> Result<(), ControllerError> {
        if !(MIN_STALENESS_SECS..=MAX_STALENESS_SECS).contains(&secs) {
            return Err(ControllerConfigError::InvalidStaleness(secs).into());
        }
        self.config.max_staleness_secs = secs;
        self.emit_config_updated("max_staleness_secs");
        Ok(())
    }

    pub fn set_breaker_params(
        &mut self,
        _cap: &AdminCap,
        params: crate::breaker::BreakerParams,
    ) -> Result<(), ControllerError> {
        params
            .validate()
            .map_err(ControllerConfigError::from)?;
        self.config.breaker = params;
        self.emit_config_updated("breaker");
        Ok(())
    }

    pub fn set_band_integration(&mut self, _cap: &AdminCap, enabled: bool) {
        self.config.band_integration_enabled = enabled;
        self.emit_config_updated("band_integration_enabled");
    }

    pub fn set_arbitrage_enabled(&mut self, _cap: &AdminCap, enabled: bool) {
        self.config.arbitrage_enabled = enabled;
        self.emit_config_updated("arbitrage_enabled");
    }

    pub fn set_recenter_delay(&mut self, _cap: &AdminCap, blocks: u64) -> Result<(), ControllerError> {
        self.band.set_recenter_delay_blocks(blocks).map_err(BandError::from)?;
        self.emit_config_updated("recenter_delay_blocks");
        Ok(())
    }

    pub fn set_band_config(
        &mut self,
        _cap: &AdminCap,
        config: crate::band::BandConfig,
    ) -> Result<(), ControllerError> {
        self.band.set_config(config).map_err(BandError::from)?;
        self.emit_config_updated("band_config");
        Ok(())
    }

    /// Top up the band's internal vault. Tokens are locked for recentering
    /// and never enter the trading position directly.
    pub fn fund_vault(&mut self, _cap: &AdminCap, token: Token, amount: Amount) {
        self.band.fund_vault(token, amount);
        self.emit_event(EventPayload::VaultFunded(VaultFundedEvent {
            block: self.current_block,
            token,
            amount,
        }));
    }

    /// Manual breaker set. Bypasses window evaluation entirely; the only way
    /// out of Halt.
    pub fn emergency_reset_breaker(&mut self, _cap: &AdminCap, level: BreakerLevel) {
        let from = self.breaker.level;
        self.breaker.override_level(level, self.current_block);
        self.emit_event(EventPayload::BreakerOverridden(BreakerOverriddenEvent {
            block: self.current_block,
            from,
            to: level,
        }));
    }

    /// Direct reflective price set, permitted only while the breaker has the
    /// market in Throttle or Halt.
    pub fn emergency_set_price(
        &mut self,
        _cap: &AdminCap,
        price: Price,
    ) -> Result<(), ControllerError> {
        if self.breaker.level < BreakerLevel::Throttle {
            return Err(ControllerError::EmergencyNotArmed {
                level: self.breaker.level,
            });
        }
        let old_price = self.reflective.price();
        self.reflective.force_set(price, self.current_time);
        self.emit_event(EventPayload::EmergencyPriceSet(EmergencyPriceSetEvent {
            block: self.current_block,
            old_price,
            new_price: price,
        }));
        Ok(())
    }

    /// First half of the timelocked force-recenter escape hatch.
    pub fn propose_force_recenter(&mut self, _cap: &AdminCap) -> Result<(), ControllerError> {
        self.band.propose_force_recenter(self.current_time)?;
        Ok(())
    }

    /// Second half. Bypasses the commit gate and the cooldown, keeps every
    /// other recenter check.
    pub fn execute_force_recenter(&mut self, _cap: &AdminCap) -> Result<(), ControllerError> {
        let reflective = self.reflective.price();
        let outcome = self.band.execute_force_recenter(
            reflective,
            self.current_block,
            self.current_time,
        )?;
        self.emit_event(EventPayload::Recentered(RecenteredEvent {
            block: self.current_block,
            price: outcome.price,
            fee_charged: outcome.fee_charged,
            forced: true,
        }));
        Ok(())
    }

    fn emit_config_updated(&mut self, field: &str) {
        self.emit_event(EventPayload::ConfigUpdated(
            crate::events::ConfigUpdatedEvent {
                field: field.to_string(),
            },
        ));
    }

    fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(self.events.next_id(), self.current_time, payload);
        self.events.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::MockArbitrage;
    use crate::band::{BandConfig, ProviderId};
    use crate::oracle::MockOracle;

    fn seeded_band() -> BandManager {
        let mut band = BandManager::new(BandConfig::default()).unwrap();
        band.deposit(
            ProviderId(1),
            Amount::new_unchecked(dec!(1_000_000)),
            Amount::new_unchecked(dec!(1_000_000)),
        )
        .unwrap();
        band.fund_vault(Token::Synth, Amount::new_unchecked(dec!(100_000)));
        band.fund_vault(Token::Reserve, Amount::new_unchecked(dec!(100_000)));
        band.seed_fees(dec!(2000), dec!(2000));
        band
    }

    fn controller() -> (Controller<MockOracle, MockArbitrage>, AdminCap) {
        let mut config = ControllerConfig::default();
        config.sync_every_tick = true;
        let oracle = MockOracle::new(dec!(1.00), Timestamp::from_secs(0));
        Controller::new(
            config,
            seeded_band(),
            oracle,
            MockArbitrage::new(),
            Price::new_unchecked(dec!(1.00)),
            Timestamp::from_secs(0),
        )
        .unwrap()
    }

    fn sync_at(
        ctl: &mut Controller<MockOracle, MockArbitrage>,
        block: BlockNumber,
        secs: i64,
    ) -> Result<SyncReport, ControllerError> {
        ctl.set_block(block);
        ctl.oracle_mut().set_timestamp(Timestamp::from_secs(secs));
        ctl.sync(Timestamp::from_secs(secs))
    }

    #[test]
    fn quiet_market_takes_no_action() {
        let (mut ctl, _cap) = controller();
        let report = sync_at(&mut ctl, 1, 60).unwrap();
        assert_eq!(report.action, SyncAction::None);
        assert_eq!(report.deviation, SignedBps::new(0));
        assert_eq!(report.breaker_level, BreakerLevel::Normal);
    }

    #[test]
    fn paused_controller_refuses_sync() {
        let (mut ctl, cap) = controller();
        ctl.pause(&cap);
        assert_eq!(ctl.sync(Timestamp::from_secs(60)), Err(ControllerError::Paused));
        ctl.unpause(&cap);
        assert!(ctl.sync(Timestamp::from_secs(60)).is_ok());
    }

    #[test]
    fn sync_respects_interval() {
        let (mut ctl, _cap) = controller();
        ctl.config.sync_every_tick = false;
        sync_at(&mut ctl, 1, 0).unwrap();
        let early = sync_at(&mut ctl, 2, 30);
        assert_eq!(early, Err(ControllerError::NotDue { remaining_ms: 30_000 }));
        assert!(sync_at(&mut ctl, 3, 60).is_ok());
    }

    #[test]
    fn mid_deviation_delegates_to_arbitrage() {
        let (mut ctl, _cap) = controller();
        // oracle at 1.003: reflective chases to 1.003, market stays 1.00,
        // 30 bps gap lands in the arbitrage branch
        ctl.oracle_mut().set_price(dec!(1.003));
        let report = sync_at(&mut ctl, 1, 60).unwrap();
        assert!(matches!(
            report.action,
            SyncAction::ArbitrageExecuted { bought_synth: true, .. }
        ));
    }

    #[test]
    fn arbitrage_failure_is_swallowed_as_pending() {
        let (mut ctl, _cap) = controller();
        ctl.oracle_mut().set_price(dec!(1.003));
        ctl.arbitrage_mut().fail_next();
        let report = sync_at(&mut ctl, 1, 60).unwrap();
        assert_eq!(report.action, SyncAction::ArbitragePending);
    }

    #[test]
    fn below_floor_deviation_is_ignored() {
        let (mut ctl, _cap) = controller();
        ctl.oracle_mut().set_price(dec!(1.0005));
        let report = sync_at(&mut ctl, 1, 60).unwrap();
        // 5 bps gap: below the action floor
        assert_eq!(report.action, SyncAction::None);
    }

    #[test]
    fn large_deviation_commits_then_reveals_after_convergence() {
        let (mut ctl, _cap) = controller();

        // oracle spikes 2%: reflective chases (within the 3% cap), band
        // authorizes and a commit is placed
        ctl.oracle_mut().set_price(dec!(1.02));
        let report = sync_at(&mut ctl, 1, 60).unwrap();
        assert_eq!(report.action, SyncAction::RecenterCommitted);
        assert!(ctl.pending_commit().is_some());

        // still diverged while the commit matures: falls through to arbitrage
        let report = sync_at(&mut ctl, 2, 120).unwrap();
        assert_eq!(
            report.action,
            SyncAction::ArbitrageExecuted {
                bought_synth: true,
                amount: Amount::new_unchecked(dec!(9900))
            }
        );

        // oracle reverts toward the band; reflective converges inside the
        // reveal bound and the matured commit executes
        ctl.oracle_mut().set_price(dec!(1.002));
        let report = sync_at(&mut ctl, 4, 240).unwrap();
        assert_eq!(report.action, SyncAction::Recentered);
        assert!(ctl.pending_commit().is_none());

        let pos = ctl.band().position().unwrap();
        let implied = pos.reserve_b.value() / pos.reserve_a.value();
        assert!((implied - report.reflective_price.value()).abs() < dec!(0.0001));
    }

    #[test]
    fn band_mutation_between_commit_and_reveal_is_rejected() {
        let (mut ctl, _cap) = controller();
        ctl.oracle_mut().set_price(dec!(1.02));
        let report = sync_at(&mut ctl, 1, 60).unwrap();
        assert_eq!(report.action, SyncAction::RecenterCommitted);
        let hash = ctl.pending_commit().unwrap();

        // a swap lands while the commit matures
        ctl.band_mut()
            .swap(
                Token::Reserve,
                Amount::new_unchecked(dec!(9_900)),
                Amount::zero(),
                2,
            )
            .unwrap();

        // converged: the reveal is attempted, detects the mutation, and the
        // dead commit is dropped so the pipeline can restart
        ctl.oracle_mut().set_price(dec!(1.0205));
        let result = sync_at(&mut ctl, 4, 240);
        assert!(matches!(
            result,
            Err(ControllerError::Band(BandError::Commit(CommitError::StateMismatch)))
        ));
        assert_eq!(ctl.pending_commit(), None);
        assert!(!ctl.band().gate.has_commit(&hash));
    }

    #[test]
    fn failed_reveal_commits_no_sync_state() {
        let (mut ctl, _cap) = controller();
        ctl.oracle_mut().set_price(dec!(1.02));
        sync_at(&mut ctl, 1, 60).unwrap();

        let reflective_before = ctl.reflective_price();
        let observations_before = ctl.observations().len();
        let breaker_before = ctl.breaker_level();

        // a swap invalidates the matured commit, then convergence sends the
        // next sync into the reveal branch, which fails on the stale digest
        ctl.band_mut()
            .swap(
                Token::Reserve,
                Amount::new_unchecked(dec!(9_900)),
                Amount::zero(),
                2,
            )
            .unwrap();
        ctl.oracle_mut().set_price(dec!(1.0205));
        assert!(sync_at(&mut ctl, 4, 240).is_err());

        // the aborted cycle left no trace: a retry starts from the same
        // reflective price rather than stacking another capped step on a
        // half-finished one
        assert_eq!(ctl.reflective_price(), reflective_before);
        assert_eq!(ctl.observations().len(), observations_before);
        assert_eq!(ctl.breaker_level(), breaker_before);

        assert!(sync_at(&mut ctl, 5, 300).is_ok());
        assert_eq!(ctl.observations().len(), observations_before + 1);
    }

    #[test]
    fn halted_breaker_blocks_sync_until_reset() {
        let (mut ctl, cap) = controller();
        ctl.oracle_mut().set_price(dec!(1.10));

        // reflective chases at the 3% cap; once the gap has exceeded 500 bps
        // for 5 samples the breaker hits Halt. arbitrage is disabled to keep
        // the market from being "fixed" by the mock.
        ctl.set_arbitrage_enabled(&cap, false);
        ctl.set_band_integration(&cap, false);
        let mut halted = false;
        for block in 1..=20 {
            match sync_at(&mut ctl, block, block as i64 * 60) {
                Ok(_) => {}
                Err(ControllerError::Halted) => {
                    halted = true;
                    break;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert!(halted);
        assert_eq!(ctl.breaker_level(), BreakerLevel::Halt);

        // emergency price set is armed at Halt
        ctl.emergency_set_price(&cap, Price::new_unchecked(dec!(1.00)))
            .unwrap();
        assert_eq!(ctl.reflective_price(), Price::new_unchecked(dec!(1.00)));

        // manual reset is the only way out
        ctl.emergency_reset_breaker(&cap, BreakerLevel::Normal);
        ctl.oracle_mut().set_price(dec!(1.00));
        assert!(sync_at(&mut ctl, 21, 21 * 60).is_ok());
    }

    #[test]
    fn emergency_price_set_requires_throttle() {
        let (mut ctl, cap) = controller();
        let result = ctl.emergency_set_price(&cap, Price::new_unchecked(dec!(1.00)));
        assert_eq!(
            result,
            Err(ControllerError::EmergencyNotArmed {
                level: BreakerLevel::Normal
            })
        );
    }

    #[test]
    fn admin_setters_validate_ranges() {
        let (mut ctl, cap) = controller();
        assert!(ctl.set_sync_interval(&cap, 5).is_err());
        assert!(ctl.set_sync_interval(&cap, 120).is_ok());
        assert!(ctl.set_max_delta(&cap, Bps::new(0)).is_err());
        assert!(ctl.set_max_delta(&cap, Bps::new(500)).is_ok());
        assert!(ctl.set_max_staleness(&cap, 10).is_err());
        assert!(ctl.set_recenter_delay(&cap, 11).is_err());
        assert!(ctl.set_recenter_delay(&cap, 5).is_ok());
    }

    #[test]
    fn facade_operations_land_in_the_event_log() {
        let (mut ctl, cap) = controller();
        ctl.set_block(5);

        ctl.swap(Token::Reserve, Amount::new_unchecked(dec!(100)), Amount::zero())
            .unwrap();
        let minted = ctl
            .deposit_liquidity(
                ProviderId(2),
                Amount::new_unchecked(dec!(1_000)),
                Amount::new_unchecked(dec!(1_000)),
            )
            .unwrap();
        ctl.withdraw_liquidity(ProviderId(2), minted).unwrap();

        let payloads: Vec<_> = ctl.events().iter().map(|e| &e.payload).collect();
        assert!(matches!(payloads[0], EventPayload::SwapExecuted(_)));
        assert!(matches!(payloads[1], EventPayload::LiquidityDeposited(_)));
        assert!(matches!(payloads[2], EventPayload::LiquidityWithdrawn(_)));

        ctl.emergency_shutdown(&cap).unwrap();
        assert!(matches!(
            ctl.events().last().unwrap().payload,
            EventPayload::EmergencyShutdown
        ));
    }

    #[test]
    fn admin_capability_routes_band_mutation() {
        let (mut ctl, cap) = controller();
        ctl.set_block(3);

        ctl.fund_vault(&cap, Token::Reserve, Amount::new_unchecked(dec!(500)));
        assert!(matches!(
            ctl.events().last().unwrap().payload,
            EventPayload::VaultFunded(_)
        ));

        let mut config = BandConfig::default();
        config.half_width_bps = Bps::new(300);
        ctl.set_band_config(&cap, config).unwrap();
        assert_eq!(ctl.band().config().half_width_bps, Bps::new(300));
        assert!(matches!(
            ctl.events().last().unwrap().payload,
            EventPayload::ConfigUpdated(_)
        ));

        // invalid configs bounce at the same boundary
        let mut bad = BandConfig::default();
        bad.half_width_bps = Bps::new(5);
        assert!(ctl.set_band_config(&cap, bad).is_err());
    }

    #[test]
    fn observation_log_is_bounded() {
        let (mut ctl, _cap) = controller();
        ctl.config.max_observations = 4;
        for block in 1..=10 {
            sync_at(&mut ctl, block, block as i64 * 60).unwrap();
        }
        assert_eq!(ctl.observations().len(), 4);
        assert_eq!(ctl.observations()[0].block, 7);
    }

    #[test]
    fn force_recenter_flows_through_controller() {
        let (mut ctl, cap) = controller();

        ctl.set_time(Timestamp::from_secs(0));
        ctl.propose_force_recenter(&cap).unwrap();

        ctl.set_time(Timestamp::from_secs(100));
        assert!(matches!(
            ctl.execute_force_recenter(&cap),
            Err(ControllerError::Band(BandError::TimelockNotExpired { .. }))
        ));

        ctl.set_time(Timestamp::from_secs(24 * 3600 + 1));
        ctl.execute_force_recenter(&cap).unwrap();
        assert!(ctl.band().last_recenter().is_some());
    }
}
