// 4.0 band.rs: concentrated liquidity band manager. holds the working AMM
// reserves and the band bounds around the reflective price, executes swaps
// under band constraints, and keeps the per-token accounting identity
// (ledger = position + vault + fees) checkable after every mutation.
// the recenter protocol itself lives in recenter.rs.

use crate::commit_reveal::CommitRevealGate;
use crate::types::{Amount, BlockNumber, Bps, Price, Timestamp, Token};
use crate::vault::{ReserveVault, VaultError};
use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Soft tolerance at the band edges: 0.01% of the pre-swap price. Avoids
/// griefing swaps that land exactly on a bound.
const BAND_EPSILON: Decimal = dec!(0.0001);

/// Accounting identity tolerance, 1% per token.
const ACCOUNTING_TOLERANCE: Decimal = dec!(0.01);

/// Liquidity provider handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderId(pub u64);

// 4.1: band parameters. validated on every update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandConfig {
    /// Half-width of the trading band around the reflective price.
    pub half_width_bps: Bps,
    /// Deviation at which the controller may ask for a recenter.
    pub recenter_trigger_bps: Bps,
    /// Percent of estimated recenter loss that accrued fees must cover.
    pub fee_coverage_pct: u32,
    /// Swap fee.
    pub fee_rate_bps: Bps,
    /// Minimum blocks between recenters.
    pub recenter_cooldown_blocks: u64,
    /// Timelock on the force-recenter emergency path, in seconds.
    pub force_timelock_secs: i64,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            half_width_bps: Bps::new(200),
            recenter_trigger_bps: Bps::new(150),
            fee_coverage_pct: 100,
            fee_rate_bps: Bps::new(30),
            recenter_cooldown_blocks: 10,
            force_timelock_secs: 24 * 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BandConfigError {
    #[error("half width {0} outside [10, 500] bps")]
    HalfWidth(u32),

    #[error("recenter trigger {trigger} outside [half_width/2, half_width] = [{min}, {max}] bps")]
    RecenterTrigger { trigger: u32, min: u32, max: u32 },

    #[error("fee coverage {0}% outside [50, 200]")]
    FeeCoverage(u32),

    #[error("fee rate {0} above 100 bps")]
    FeeRate(u32),

    #[error("force timelock {0}s outside [1h, 7d]")]
    ForceTimelock(i64),
}

impl BandConfig {
    pub fn validate(&self) -> Result<(), BandConfigError> {
        let hw = self.half_width_bps.value();
        if !(10..=500).contains(&hw) {
            return Err(BandConfigError::HalfWidth(hw));
        }
        let trigger = self.recenter_trigger_bps.value();
        if trigger < hw / 2 || trigger > hw {
            return Err(BandConfigError::RecenterTrigger {
                trigger,
                min: hw / 2,
                max: hw,
            });
        }
        if !(50..=200).contains(&self.fee_coverage_pct) {
            return Err(BandConfigError::FeeCoverage(self.fee_coverage_pct));
        }
        if self.fee_rate_bps.value() > 100 {
            return Err(BandConfigError::FeeRate(self.fee_rate_bps.value()));
        }
        if !(3600..=7 * 24 * 3600).contains(&self.force_timelock_secs) {
            return Err(BandConfigError::ForceTimelock(self.force_timelock_secs));
        }
        Ok(())
    }
}

// 4.2: the working AMM position. reserve_a is the synth side, reserve_b the
// reserve-asset side; implied price = reserve_b / reserve_a.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityPosition {
    pub reserve_a: Amount,
    pub reserve_b: Amount,
    pub lower_bound: Price,
    pub upper_bound: Price,
    pub liquidity_shares: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BandError {
    #[error("amount must be positive")]
    InvalidAmount,

    #[error("no liquidity in position")]
    NoLiquidity,

    #[error("trading disabled: recenter executed in this block")]
    TradingDisabled,

    #[error("slippage exceeded: out {amount_out}, minimum {min_amount_out}")]
    SlippageExceeded {
        amount_out: Amount,
        min_amount_out: Amount,
    },

    #[error("post-swap price {implied} outside band [{lower}, {upper}]")]
    PriceOutOfBand {
        implied: Price,
        lower: Price,
        upper: Price,
    },

    #[error("price drifted during execution: {drift_bps} bps above the 50 bps bound")]
    PriceDrifted { drift_bps: u64 },

    #[error("insufficient fee coverage: required {required}, available {available}")]
    InsufficientFeeCoverage { required: Amount, available: Amount },

    #[error("recenter cooldown active until block {until_block}")]
    CooldownActive { until_block: BlockNumber },

    #[error("arithmetic overflow in reserve computation")]
    Overflow,

    #[error("band manager is shut down")]
    ShutDown,

    #[error("no emergency shutdown in effect")]
    NotShutDown,

    #[error("unknown liquidity provider")]
    UnknownProvider,

    #[error("per-token accounting mismatch for {token:?}: ledger {ledger}, tracked {tracked}")]
    AccountingMismatch {
        token: Token,
        ledger: Decimal,
        tracked: Decimal,
    },

    #[error("force recenter timelock not expired: {remaining_ms}ms remaining")]
    TimelockNotExpired { remaining_ms: i64 },

    #[error("no force recenter proposal pending")]
    NoForceProposal,

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Commit(#[from] crate::commit_reveal::CommitError),

    #[error(transparent)]
    Config(#[from] BandConfigError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapResult {
    pub token_in: Token,
    pub amount_in: Amount,
    pub fee: Amount,
    pub amount_out: Amount,
    pub implied_price: Price,
}

/// Metadata of the last successful recenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecenterRecord {
    pub block: BlockNumber,
    pub price: Price,
    pub timestamp: Timestamp,
}

// 4.3: the manager. owns position, vault, fee pools, ledger balances, the
// commit/reveal gate, and the trading gate. all mutation is all-or-nothing.
#[derive(Debug, Clone)]
pub struct BandManager {
    pub(crate) config: BandConfig,
    pub(crate) position: Option<LiquidityPosition>,
    pub(crate) shares: HashMap<ProviderId, Decimal>,
    pub(crate) vault: ReserveVault,
    pub(crate) fees_a: Amount,
    pub(crate) fees_b: Amount,
    // total tokens held by the contract, per token
    pub(crate) ledger_a: Amount,
    pub(crate) ledger_b: Amount,
    pub(crate) gate: CommitRevealGate,
    pub(crate) trading_gate_block: Option<BlockNumber>,
    pub(crate) last_recenter: Option<RecenterRecord>,
    pub(crate) force_proposed_at: Option<Timestamp>,
    pub(crate) claims: Option<(Amount, Amount)>,
}

impl BandManager {
    pub fn new(config: BandConfig) -> Result<Self, BandConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            position: None,
            shares: HashMap::new(),
            vault: ReserveVault::new(),
            fees_a: Amount::zero(),
            fees_b: Amount::zero(),
            ledger_a: Amount::zero(),
            ledger_b: Amount::zero(),
            gate: CommitRevealGate::new(),
            trading_gate_block: None,
            last_recenter: None,
            force_proposed_at: None,
            claims: None,
        })
    }

    pub fn config(&self) -> &BandConfig {
        &self.config
    }

    pub(crate) fn set_config(&mut self, config: BandConfig) -> Result<(), BandConfigError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn position(&self) -> Option<&LiquidityPosition> {
        self.position.as_ref()
    }

    pub fn accrued_fees(&self, token: Token) -> Amount {
        match token {
            Token::Synth => self.fees_a,
            Token::Reserve => self.fees_b,
        }
    }

    pub fn ledger_balance(&self, token: Token) -> Amount {
        match token {
            Token::Synth => self.ledger_a,
            Token::Reserve => self.ledger_b,
        }
    }

    pub fn vault(&self) -> &ReserveVault {
        &self.vault
    }

    pub fn last_recenter(&self) -> Option<RecenterRecord> {
        self.last_recenter
    }

    pub fn recenter_delay_blocks(&self) -> u64 {
        self.gate.delay_blocks()
    }

    pub(crate) fn set_recenter_delay_blocks(
        &mut self,
        blocks: u64,
    ) -> Result<(), crate::commit_reveal::CommitError> {
        self.gate.set_delay_blocks(blocks)
    }

    /// Discard a commit that can never mature into a valid reveal.
    pub(crate) fn drop_commit(&mut self, hash: &crate::commit_reveal::StateHash) {
        self.gate.consume(hash);
    }

    pub fn is_shut_down(&self) -> bool {
        self.claims.is_some()
    }

    /// Decimal-normalized implied price of the current position.
    pub fn current_price(&self) -> Result<Price, BandError> {
        let pos = self.position.as_ref().ok_or(BandError::NoLiquidity)?;
        if pos.reserve_a.is_zero() || pos.reserve_b.is_zero() {
            return Err(BandError::NoLiquidity);
        }
        Ok(Price::new_unchecked(
            pos.reserve_b.value() / pos.reserve_a.value(),
        ))
    }

    /// Fund the internal vault. Tokens enter the ledger and the locked
    /// balance together. Capability-gated at the controller boundary.
    pub(crate) fn fund_vault(&mut self, token: Token, amount: Amount) {
        self.vault.deposit(token, amount);
        match token {
            Token::Synth => self.ledger_a = self.ledger_a.add(amount),
            Token::Reserve => self.ledger_b = self.ledger_b.add(amount),
        }
    }

    // 4.4: liquidity lifecycle.

    /// Deposit both tokens. The first deposit bootstraps the band bounds
    /// around the implied price and mints sqrt(a*b) shares; later deposits
    /// mint pro-rata on the limiting side.
    pub fn deposit(
        &mut self,
        provider: ProviderId,
        amount_a: Amount,
        amount_b: Amount,
    ) -> Result<Decimal, BandError> {
        self.ensure_live()?;
        if amount_a.is_zero() || amount_b.is_zero() {
            return Err(BandError::InvalidAmount);
        }

        let (minted, taken_a, taken_b) = match &mut self.position {
            None => {
                let implied = amount_b.value() / amount_a.value();
                let half = self.config.half_width_bps.as_fraction();
                let minted = (amount_a.value() * amount_b.value())
                    .sqrt()
                    .ok_or(BandError::Overflow)?;
                self.position = Some(LiquidityPosition {
                    reserve_a: amount_a,
                    reserve_b: amount_b,
                    lower_bound: Price::new_unchecked(implied * (Decimal::ONE - half)),
                    upper_bound: Price::new_unchecked(implied * (Decimal::ONE + half)),
                    liquidity_shares: minted,
                });
                (minted, amount_a, amount_b)
            }
            Some(pos) => {
                // mint on the limiting side and take only the matching
                // amounts, so an unbalanced deposit cannot shift the
                // implied price; the excess stays with the caller
                let ratio_a = amount_a.value() / pos.reserve_a.value();
                let ratio_b = amount_b.value() / pos.reserve_b.value();
                let ratio = ratio_a.min(ratio_b);
                let taken_a = pos.reserve_a.mul(ratio);
                let taken_b = pos.reserve_b.mul(ratio);
                let minted = pos.liquidity_shares * ratio;
                pos.reserve_a = pos.reserve_a.add(taken_a);
                pos.reserve_b = pos.reserve_b.add(taken_b);
                pos.liquidity_shares += minted;
                (minted, taken_a, taken_b)
            }
        };

        *self.shares.entry(provider).or_insert(Decimal::ZERO) += minted;
        self.ledger_a = self.ledger_a.add(taken_a);
        self.ledger_b = self.ledger_b.add(taken_b);
        self.check_accounting()?;
        Ok(minted)
    }

    /// Burn shares for a pro-rata slice of both reserves.
    pub fn withdraw(
        &mut self,
        provider: ProviderId,
        shares: Decimal,
    ) -> Result<(Amount, Amount), BandError> {
        self.ensure_live()?;
        if shares <= Decimal::ZERO {
            return Err(BandError::InvalidAmount);
        }
        let held = *self.shares.get(&provider).ok_or(BandError::UnknownProvider)?;
        if shares > held {
            return Err(BandError::InvalidAmount);
        }
        let pos = self.position.as_mut().ok_or(BandError::NoLiquidity)?;

        let fraction = shares / pos.liquidity_shares;
        let out_a = pos.reserve_a.mul(fraction);
        let out_b = pos.reserve_b.mul(fraction);

        pos.reserve_a = pos.reserve_a.sub_saturating(out_a);
        pos.reserve_b = pos.reserve_b.sub_saturating(out_b);
        pos.liquidity_shares -= shares;
        if pos.liquidity_shares.is_zero() {
            self.position = None;
        }

        *self.shares.get_mut(&provider).expect("checked above") -= shares;
        self.ledger_a = self.ledger_a.sub_saturating(out_a);
        self.ledger_b = self.ledger_b.sub_saturating(out_b);
        self.check_accounting()?;
        Ok((out_a, out_b))
    }

    // 4.5: trading.

    /// Constant-product swap under the band constraint. State is validated on
    /// scratch values and committed only after every check passes.
    pub fn swap(
        &mut self,
        token_in: Token,
        amount_in: Amount,
        min_amount_out: Amount,
        block: BlockNumber,
    ) -> Result<SwapResult, BandError> {
        self.ensure_live()?;
        if amount_in.is_zero() {
            return Err(BandError::InvalidAmount);
        }
        if self.trading_gate_block == Some(block) {
            return Err(BandError::TradingDisabled);
        }
        let pos = self.position.as_ref().ok_or(BandError::NoLiquidity)?;
        if pos.reserve_a.is_zero() || pos.reserve_b.is_zero() {
            return Err(BandError::NoLiquidity);
        }

        let pre_price = pos.reserve_b.value() / pos.reserve_a.value();

        let fee = amount_in.mul(self.config.fee_rate_bps.as_fraction());
        let in_after_fee = amount_in.sub_saturating(fee);

        let (reserve_in, reserve_out) = match token_in {
            Token::Synth => (pos.reserve_a, pos.reserve_b),
            Token::Reserve => (pos.reserve_b, pos.reserve_a),
        };

        // constant product, rounded toward the pool
        let raw_out = reserve_out.value() * in_after_fee.value()
            / (reserve_in.value() + in_after_fee.value());
        let amount_out = Amount::new_unchecked(
            raw_out.round_dp_with_strategy(18, RoundingStrategy::ToZero),
        );

        if amount_out < min_amount_out {
            return Err(BandError::SlippageExceeded {
                amount_out,
                min_amount_out,
            });
        }

        let (new_a, new_b) = match token_in {
            Token::Synth => (
                pos.reserve_a.add(in_after_fee),
                pos.reserve_b.sub_saturating(amount_out),
            ),
            Token::Reserve => (
                pos.reserve_a.sub_saturating(amount_out),
                pos.reserve_b.add(in_after_fee),
            ),
        };
        if new_a.is_zero() || new_b.is_zero() {
            return Err(BandError::NoLiquidity);
        }

        let implied = Price::new_unchecked(new_b.value() / new_a.value());
        let epsilon = pre_price * BAND_EPSILON;
        let lower = pos.lower_bound.value() - epsilon;
        let upper = pos.upper_bound.value() + epsilon;
        if implied.value() < lower || implied.value() > upper {
            return Err(BandError::PriceOutOfBand {
                implied,
                lower: Price::new_unchecked(lower.max(Decimal::new(1, 18))),
                upper: Price::new_unchecked(upper),
            });
        }

        // all checks passed: commit state, then ledger (effects before interactions)
        let pos = self.position.as_mut().expect("position checked above");
        pos.reserve_a = new_a;
        pos.reserve_b = new_b;
        match token_in {
            Token::Synth => {
                self.fees_a = self.fees_a.add(fee);
                self.ledger_a = self.ledger_a.add(amount_in);
                self.ledger_b = self.ledger_b.sub_saturating(amount_out);
            }
            Token::Reserve => {
                self.fees_b = self.fees_b.add(fee);
                self.ledger_b = self.ledger_b.add(amount_in);
                self.ledger_a = self.ledger_a.sub_saturating(amount_out);
            }
        }
        self.check_accounting()?;

        Ok(SwapResult {
            token_in,
            amount_in,
            fee,
            amount_out,
            implied_price: implied,
        })
    }

    // 4.6: invariants.

    /// Per-token accounting identity, checked after every mutating operation:
    /// ledger >= (position + vault + fees) * (1 - tolerance).
    pub fn check_accounting(&self) -> Result<(), BandError> {
        for token in [Token::Synth, Token::Reserve] {
            let (position, fees, ledger) = match token {
                Token::Synth => (
                    self.position.as_ref().map(|p| p.reserve_a).unwrap_or(Amount::zero()),
                    self.fees_a,
                    self.ledger_a,
                ),
                Token::Reserve => (
                    self.position.as_ref().map(|p| p.reserve_b).unwrap_or(Amount::zero()),
                    self.fees_b,
                    self.ledger_b,
                ),
            };
            let tracked = position.value() + self.vault.net(token) + fees.value();
            let floor = tracked * (Decimal::ONE - ACCOUNTING_TOLERANCE);
            if ledger.value() < floor {
                return Err(BandError::AccountingMismatch {
                    token,
                    ledger: ledger.value(),
                    tracked,
                });
            }
        }
        Ok(())
    }

    pub(crate) fn ensure_live(&self) -> Result<(), BandError> {
        if self.is_shut_down() {
            return Err(BandError::ShutDown);
        }
        Ok(())
    }

    // 4.7: emergency shutdown and pro-rata claims.

    /// Zero the position into a claims pool. Normal operation refuses
    /// afterwards; providers withdraw via `claim`.
    pub fn emergency_shutdown(&mut self) -> Result<(), BandError> {
        self.ensure_live()?;
        let (pool_a, pool_b) = match self.position.take() {
            Some(pos) => (pos.reserve_a, pos.reserve_b),
            None => (Amount::zero(), Amount::zero()),
        };
        // accrued fees belong to the providers; they join the claims pool
        let pool_a = pool_a.add(self.fees_a);
        let pool_b = pool_b.add(self.fees_b);
        self.fees_a = Amount::zero();
        self.fees_b = Amount::zero();
        self.claims = Some((pool_a, pool_b));
        Ok(())
    }

    /// Pay out a provider's pro-rata slice of the claims pool.
    pub fn claim(&mut self, provider: ProviderId) -> Result<(Amount, Amount), BandError> {
        let (pool_a, pool_b) = self.claims.ok_or(BandError::NotShutDown)?;
        let held = self
            .shares
            .remove(&provider)
            .ok_or(BandError::UnknownProvider)?;
        let total: Decimal = held + self.shares.values().sum::<Decimal>();
        if total.is_zero() {
            return Err(BandError::UnknownProvider);
        }
        let fraction = held / total;
        let out_a = pool_a.mul(fraction);
        let out_b = pool_b.mul(fraction);

        self.claims = Some((pool_a.sub_saturating(out_a), pool_b.sub_saturating(out_b)));
        self.ledger_a = self.ledger_a.sub_saturating(out_a);
        self.ledger_b = self.ledger_b.sub_saturating(out_b);
        Ok((out_a, out_b))
    }
}

#[cfg(test)]
impl BandManager {
    /// Credit accrued fees (and the matching ledger balances) directly.
    pub(crate) fn seed_fees(&mut self, a: Decimal, b: Decimal) {
        self.fees_a = self.fees_a.add(Amount::new_unchecked(a));
        self.fees_b = self.fees_b.add(Amount::new_unchecked(b));
        self.ledger_a = self.ledger_a.add(Amount::new_unchecked(a));
        self.ledger_b = self.ledger_b.add(Amount::new_unchecked(b));
    }
}
