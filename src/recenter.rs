//! Band recentering.
//!
//! Relocates the trading band onto the reflective price using vaulted
//! reserves only. No market swap is ever part of a recenter: relocation must
//! not itself move the market price. The whole protocol stages its result on
//! scratch values and applies in one shot, so a failure at any step leaves
//! position, vault, and fee pools bit-identical to their pre-call values.

use crate::band::{BandError, BandManager, LiquidityPosition, RecenterRecord};
use crate::commit_reveal::StateHash;
use crate::types::{Amount, BlockNumber, Price, SignedBps, Timestamp, Token};
use crate::vault::ReserveVault;
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;

/// Authorization floor: the band only recenters for moves of at least 1%,
/// deliberately coarser than the controller's own 70 bps branch. Smaller
/// moves are deferred to the reserve-arbitrage collaborator.
const RECENTER_MIN_DEVIATION_BPS: u64 = 100;

/// Execution-time bound: the live market price must sit within 0.5% of the
/// reflective price at reveal, or the recenter aborts.
const EXEC_DRIFT_BOUND: Decimal = dec!(0.005);

/// Last-resort borrow bound: the vault may go into debt up to this fraction
/// of the current position reserve per token.
const BORROW_LIMIT_FRACTION: Decimal = dec!(0.10);

/// Everything a successful recenter mutates, staged before application.
#[derive(Debug, Clone)]
struct StagedRecenter {
    position: LiquidityPosition,
    vault: ReserveVault,
    fees_a: Amount,
    fees_b: Amount,
    record: RecenterRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecenterOutcome {
    pub price: Price,
    pub unlocked_a: Decimal,
    pub unlocked_b: Decimal,
    pub fee_charged: Amount,
}

impl BandManager {
    /// Whether the band authorizes a recenter toward `reflective` right now.
    /// Needs both reserves live and a deviation at or above the coarse floor
    /// (1%, or the configured trigger when that is stricter).
    pub fn can_recenter(&self, reflective: Price) -> bool {
        let Some(pos) = self.position.as_ref() else {
            return false;
        };
        if pos.reserve_a.is_zero() || pos.reserve_b.is_zero() || self.is_shut_down() {
            return false;
        }
        let market = Price::new_unchecked(pos.reserve_b.value() / pos.reserve_a.value());
        let deviation = SignedBps::between(reflective, market).abs();
        let floor = RECENTER_MIN_DEVIATION_BPS.max(self.config.recenter_trigger_bps.value() as u64);
        deviation >= floor
    }

    /// Phase one: commit the digest of current band state. The reveal becomes
    /// executable `delay_blocks` later, provided nothing covered changed.
    pub(crate) fn commit_recenter(&mut self, block: BlockNumber) -> Result<StateHash, BandError> {
        self.ensure_live()?;
        let hash = self.state_hash();
        self.gate.commit(hash, block)?;
        Ok(hash)
    }

    /// Whether a committed recenter is executable at `block`.
    pub fn recenter_ready(&self, hash: &StateHash, block: BlockNumber) -> bool {
        self.gate.ready(hash, block)
    }

    /// Phase two: validate the commit, stage the recenter, then consume the
    /// commit and apply atomically.
    pub(crate) fn execute_recenter(
        &mut self,
        hash: StateHash,
        reflective: Price,
        block: BlockNumber,
        now: Timestamp,
    ) -> Result<RecenterOutcome, BandError> {
        self.ensure_live()?;
        let current = self.state_hash();
        self.gate.validate(hash, block, current)?;

        let (staged, outcome) = self.stage_recenter(reflective, block, now, false)?;
        self.gate.consume(&hash);
        self.apply_recenter(staged, block);
        self.check_accounting()?;
        Ok(outcome)
    }

    /// Propose the emergency force-recenter. Execution unlocks after the
    /// configured timelock and bypasses both the gate and the cooldown.
    pub(crate) fn propose_force_recenter(&mut self, now: Timestamp) -> Result<(), BandError> {
        self.ensure_live()?;
        self.force_proposed_at = Some(now);
        Ok(())
    }

    pub(crate) fn execute_force_recenter(
        &mut self,
        reflective: Price,
        block: BlockNumber,
        now: Timestamp,
    ) -> Result<RecenterOutcome, BandError> {
        self.ensure_live()?;
        let proposed = self.force_proposed_at.ok_or(BandError::NoForceProposal)?;
        let unlock_ms = self.config.force_timelock_secs * 1000;
        let elapsed = now.elapsed_since(proposed);
        if elapsed < unlock_ms {
            return Err(BandError::TimelockNotExpired {
                remaining_ms: unlock_ms - elapsed,
            });
        }

        let (staged, outcome) = self.stage_recenter(reflective, block, now, true)?;
        self.force_proposed_at = None;
        self.apply_recenter(staged, block);
        self.check_accounting()?;
        Ok(outcome)
    }

    // the whole protocol, computed on scratch values. nothing on self is
    // touched until apply_recenter.
    fn stage_recenter(
        &self,
        reflective: Price,
        block: BlockNumber,
        now: Timestamp,
        skip_cooldown: bool,
    ) -> Result<(StagedRecenter, RecenterOutcome), BandError> {
        if !skip_cooldown {
            if let Some(last) = self.last_recenter {
                let until_block = last.block + self.config.recenter_cooldown_blocks;
                if block < until_block {
                    return Err(BandError::CooldownActive { until_block });
                }
            }
        }

        let pos = self.position.as_ref().ok_or(BandError::NoLiquidity)?;
        if pos.reserve_a.is_zero() || pos.reserve_b.is_zero() {
            return Err(BandError::NoLiquidity);
        }

        // price-freshness re-validation at execution time
        let market = Price::new_unchecked(pos.reserve_b.value() / pos.reserve_a.value());
        let drift = reflective.relative_delta(market).abs();
        if drift > EXEC_DRIFT_BOUND {
            return Err(BandError::PriceDrifted {
                drift_bps: SignedBps::between(reflective, market).abs(),
            });
        }

        let p = reflective.value();

        // estimated impermanent loss of a full band shift: ~halfWidth^2 / 2 of
        // notional, valued in the reserve asset at the reflective price (not
        // spot, which the committer could have nudged)
        let half = self.config.half_width_bps.as_fraction();
        let notional = checked_mul(pos.reserve_a.value(), p)? + pos.reserve_b.value();
        let estimated_loss = checked_mul(notional, half * half)? / dec!(2);
        let required = estimated_loss * Decimal::from(self.config.fee_coverage_pct) / dec!(100);

        let fee_value_a = checked_mul(self.fees_a.value(), p)?;
        let available = fee_value_a + self.fees_b.value();
        if available < required {
            return Err(BandError::InsufficientFeeCoverage {
                required: Amount::new_unchecked(required),
                available: Amount::new_unchecked(available),
            });
        }

        // target reserves: a'*b' = k and b'/a' = p
        let (target_a, target_b) = geometric_targets(pos.reserve_a.value(), pos.reserve_b.value(), p)?;

        // relocate via the vault only
        let mut vault = self.vault;
        let delta_a = target_a - pos.reserve_a.value();
        let delta_b = target_b - pos.reserve_b.value();
        settle_delta(&mut vault, Token::Synth, delta_a, pos.reserve_a)?;
        settle_delta(&mut vault, Token::Reserve, delta_b, pos.reserve_b)?;

        // deduct the required fee proportionally from both pools, valued at
        // the reflective price. pools accrued at historical prices are valued
        // at today's price here; see the drift note in DESIGN.md.
        let mut fees_a = self.fees_a;
        let mut fees_b = self.fees_b;
        if required > Decimal::ZERO && available > Decimal::ZERO {
            let deduct_a_value = required * fee_value_a / available;
            let deduct_a = Amount::new_unchecked(deduct_a_value / p);
            let deduct_b = Amount::new_unchecked(required - deduct_a_value);
            fees_a = fees_a.sub_saturating(deduct_a);
            fees_b = fees_b.sub_saturating(deduct_b);
            // deducted fees replenish the vault for future relocations
            vault.deposit(Token::Synth, deduct_a);
            vault.deposit(Token::Reserve, deduct_b);
        }

        let position = LiquidityPosition {
            reserve_a: Amount::new_unchecked(target_a),
            reserve_b: Amount::new_unchecked(target_b),
            lower_bound: Price::new_unchecked(p * (Decimal::ONE - half)),
            upper_bound: Price::new_unchecked(p * (Decimal::ONE + half)),
            liquidity_shares: pos.liquidity_shares,
        };

        let record = RecenterRecord {
            block,
            price: reflective,
            timestamp: now,
        };

        let outcome = RecenterOutcome {
            price: reflective,
            unlocked_a: delta_a,
            unlocked_b: delta_b,
            fee_charged: Amount::new_unchecked(required),
        };

        Ok((
            StagedRecenter {
                position,
                vault,
                fees_a,
                fees_b,
                record,
            },
            outcome,
        ))
    }

    fn apply_recenter(&mut self, staged: StagedRecenter, block: BlockNumber) {
        self.position = Some(staged.position);
        self.vault = staged.vault;
        self.fees_a = staged.fees_a;
        self.fees_b = staged.fees_b;
        self.last_recenter = Some(staged.record);
        // trading gate holds for the remainder of this block
        self.trading_gate_block = Some(block);
    }
}

fn checked_mul(a: Decimal, b: Decimal) -> Result<Decimal, BandError> {
    a.checked_mul(b).ok_or(BandError::Overflow)
}

/// Apply one token's reserve delta against the vault: increases unlock from
/// the vault (with the bounded borrow fallback), decreases deposit back.
fn settle_delta(
    vault: &mut ReserveVault,
    token: Token,
    delta: Decimal,
    current_reserve: Amount,
) -> Result<(), BandError> {
    if delta > Decimal::ZERO {
        let borrow_limit = current_reserve.mul(BORROW_LIMIT_FRACTION);
        vault.unlock_with_borrow(token, Amount::new_unchecked(delta), borrow_limit)?;
    } else if delta < Decimal::ZERO {
        vault.deposit(token, Amount::new_unchecked(-delta));
    }
    Ok(())
}

/// Target reserves preserving the constant product at the reflective price:
/// a' = sqrt(k/p), b' = sqrt(k*p). When the raw product would overflow, both
/// reserves are scaled down, the math done at reduced magnitude, and the
/// results scaled back with explicit overflow checks.
fn geometric_targets(
    reserve_a: Decimal,
    reserve_b: Decimal,
    price: Decimal,
) -> Result<(Decimal, Decimal), BandError> {
    const SCALE_STEP: Decimal = dec!(1_000_000);

    let mut sa = reserve_a;
    let mut sb = reserve_b;
    let mut scale = Decimal::ONE;
    let mut k = sa.checked_mul(sb);
    while k.is_none() {
        sa /= SCALE_STEP;
        sb /= SCALE_STEP;
        scale = scale.checked_mul(SCALE_STEP).ok_or(BandError::Overflow)?;
        k = sa.checked_mul(sb);
    }
    let k = k.expect("loop exits with Some");

    let target_a = (k / price).sqrt().ok_or(BandError::Overflow)?;
    let target_b = k
        .checked_mul(price)
        .ok_or(BandError::Overflow)?
        .sqrt()
        .ok_or(BandError::Overflow)?;

    let target_a = target_a.checked_mul(scale).ok_or(BandError::Overflow)?;
    let target_b = target_b.checked_mul(scale).ok_or(BandError::Overflow)?;
    Ok((target_a, target_b))
}
