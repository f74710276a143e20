//! Circuit breaker state machine.
//!
//! Four-level supervisor over automated peg maintenance. Escalation is
//! immediate once a deviation threshold has persisted for its window;
//! de-escalation needs a sustained clean window and drops straight back to
//! Normal. The asymmetry is the hysteresis: flapping between levels on a
//! single noisy sample is not possible.

use crate::deviation::{DeviationTracker, DEVIATION_CAPACITY};
use crate::types::BlockNumber;
use serde::{Deserialize, Serialize};

// Normal < Warn < Throttle < Halt, total order used by the transition policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerLevel {
    Normal = 0,
    Warn = 1,
    Throttle = 2,
    Halt = 3,
}

impl BreakerLevel {
    pub fn name(&self) -> &'static str {
        match self {
            BreakerLevel::Normal => "normal",
            BreakerLevel::Warn => "warn",
            BreakerLevel::Throttle => "throttle",
            BreakerLevel::Halt => "halt",
        }
    }
}

/// Thresholds and persistence windows driving the breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerParams {
    pub warn_threshold_bps: u64,
    pub throttle_threshold_bps: u64,
    pub halt_threshold_bps: u64,
    /// Consecutive-ish sample counts required at each threshold.
    pub warn_blocks: usize,
    pub throttle_blocks: usize,
    pub halt_blocks: usize,
    /// Clean samples required before dropping back to Normal.
    pub recover_blocks: usize,
}

impl Default for BreakerParams {
    fn default() -> Self {
        Self {
            warn_threshold_bps: 100,
            throttle_threshold_bps: 200,
            halt_threshold_bps: 500,
            warn_blocks: 10,
            throttle_blocks: 10,
            halt_blocks: 5,
            recover_blocks: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BreakerConfigError {
    #[error("thresholds must satisfy warn <= throttle <= halt <= 10000")]
    ThresholdOrdering,

    #[error("window {0} outside [1, {DEVIATION_CAPACITY}]")]
    WindowOutOfRange(usize),
}

impl BreakerParams {
    pub fn validate(&self) -> Result<(), BreakerConfigError> {
        if self.warn_threshold_bps > self.throttle_threshold_bps
            || self.throttle_threshold_bps > self.halt_threshold_bps
            || self.halt_threshold_bps > 10_000
        {
            return Err(BreakerConfigError::ThresholdOrdering);
        }
        for window in [
            self.warn_blocks,
            self.throttle_blocks,
            self.halt_blocks,
            self.recover_blocks,
        ] {
            if window == 0 || window > DEVIATION_CAPACITY {
                return Err(BreakerConfigError::WindowOutOfRange(window));
            }
        }
        Ok(())
    }
}

/// Current breaker state. Mutated only by `evaluate` and the manual override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreaker {
    pub level: BreakerLevel,
    pub activated_at_block: Option<BlockNumber>,
}

/// What one evaluation did, for event reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerTransition {
    Unchanged,
    Escalated { from: BreakerLevel, to: BreakerLevel },
    Recovered { from: BreakerLevel },
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self {
            level: BreakerLevel::Normal,
            activated_at_block: None,
        }
    }

    /// Run one evaluation cycle against the deviation history.
    ///
    /// Raises immediately when the computed target exceeds the current level.
    /// Lowers only when the most recent `recover_blocks` samples are all below
    /// the warn threshold, and then drops directly to Normal.
    pub fn evaluate(
        &mut self,
        tracker: &DeviationTracker,
        now_block: BlockNumber,
        params: &BreakerParams,
    ) -> BreakerTransition {
        let target = Self::target_level(tracker, params);

        if target > self.level {
            let from = self.level;
            self.level = target;
            self.activated_at_block = Some(now_block);
            return BreakerTransition::Escalated { from, to: target };
        }

        if self.level > BreakerLevel::Normal
            && tracker.all_below(params.recover_blocks, params.warn_threshold_bps)
        {
            let from = self.level;
            self.level = BreakerLevel::Normal;
            self.activated_at_block = None;
            return BreakerTransition::Recovered { from };
        }

        BreakerTransition::Unchanged
    }

    // most severe level whose persistence condition holds, checked top down
    fn target_level(tracker: &DeviationTracker, params: &BreakerParams) -> BreakerLevel {
        if tracker.count_above(params.halt_blocks, params.halt_threshold_bps) >= params.halt_blocks
            && tracker.max_over(params.halt_blocks) >= params.halt_threshold_bps
        {
            return BreakerLevel::Halt;
        }
        if tracker.count_above(params.throttle_blocks, params.throttle_threshold_bps)
            >= params.throttle_blocks
        {
            return BreakerLevel::Throttle;
        }
        if tracker.count_above(params.warn_blocks, params.warn_threshold_bps) >= params.warn_blocks
        {
            return BreakerLevel::Warn;
        }
        BreakerLevel::Normal
    }

    /// Administrative override. Bypasses windows entirely; the caller is
    /// responsible for reporting it. Not validated against history.
    pub fn override_level(&mut self, level: BreakerLevel, now_block: BlockNumber) {
        self.level = level;
        self.activated_at_block = if level == BreakerLevel::Normal {
            None
        } else {
            Some(now_block)
        };
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deviation::DeviationSample;
    use crate::types::Timestamp;

    fn feed(tracker: &mut DeviationTracker, start_block: u64, samples: &[u64]) {
        for (i, &bps) in samples.iter().enumerate() {
            tracker.record(DeviationSample {
                block: start_block + i as u64,
                deviation_bps: bps,
                signed_bps: bps as i64,
                timestamp: Timestamp::from_millis((start_block + i as u64) as i64 * 1000),
            });
        }
    }

    #[test]
    fn default_params_are_valid() {
        assert!(BreakerParams::default().validate().is_ok());
    }

    #[test]
    fn threshold_ordering_enforced() {
        let mut params = BreakerParams::default();
        params.warn_threshold_bps = 300;
        assert_eq!(
            params.validate(),
            Err(BreakerConfigError::ThresholdOrdering)
        );

        let mut params = BreakerParams::default();
        params.halt_threshold_bps = 10_001;
        assert!(params.validate().is_err());
    }

    #[test]
    fn window_bounds_enforced() {
        let mut params = BreakerParams::default();
        params.halt_blocks = 0;
        assert!(params.validate().is_err());

        params.halt_blocks = DEVIATION_CAPACITY + 1;
        assert!(matches!(
            params.validate(),
            Err(BreakerConfigError::WindowOutOfRange(_))
        ));
    }

    #[test]
    fn warn_after_persistence_window() {
        // sustained 120bps with warn threshold 100 over 10 blocks
        let params = BreakerParams::default();
        let mut tracker = DeviationTracker::new();
        let mut breaker = CircuitBreaker::new();

        for block in 0..50u64 {
            feed(&mut tracker, block, &[120]);
            let transition = breaker.evaluate(&tracker, block, &params);
            if block < 9 {
                assert_eq!(breaker.level, BreakerLevel::Normal, "block {block}");
            } else if block == 9 {
                assert_eq!(
                    transition,
                    BreakerTransition::Escalated {
                        from: BreakerLevel::Normal,
                        to: BreakerLevel::Warn
                    }
                );
            } else {
                // 120 < throttle threshold 200: stays at Warn forever
                assert_eq!(breaker.level, BreakerLevel::Warn, "block {block}");
                assert_eq!(transition, BreakerTransition::Unchanged);
            }
        }
    }

    #[test]
    fn halt_on_large_persistent_deviation() {
        let params = BreakerParams::default();
        let mut tracker = DeviationTracker::new();
        let mut breaker = CircuitBreaker::new();

        feed(&mut tracker, 0, &[600, 600, 600, 600, 600]);
        let transition = breaker.evaluate(&tracker, 4, &params);

        assert_eq!(breaker.level, BreakerLevel::Halt);
        assert_eq!(breaker.activated_at_block, Some(4));
        assert!(matches!(
            transition,
            BreakerTransition::Escalated { to: BreakerLevel::Halt, .. }
        ));
    }

    #[test]
    fn single_spike_does_not_escalate() {
        let params = BreakerParams::default();
        let mut tracker = DeviationTracker::new();
        let mut breaker = CircuitBreaker::new();

        feed(&mut tracker, 0, &[5, 5, 900, 5, 5]);
        breaker.evaluate(&tracker, 4, &params);
        assert_eq!(breaker.level, BreakerLevel::Normal);
    }

    #[test]
    fn recovery_needs_sustained_clean_window() {
        let params = BreakerParams::default();
        let mut tracker = DeviationTracker::new();
        let mut breaker = CircuitBreaker::new();

        feed(&mut tracker, 0, &[250; 10]);
        breaker.evaluate(&tracker, 9, &params);
        assert_eq!(breaker.level, BreakerLevel::Throttle);

        // 19 clean samples: one short of recover_blocks, still throttled
        feed(&mut tracker, 10, &[10; 19]);
        assert_eq!(breaker.evaluate(&tracker, 28, &params), BreakerTransition::Unchanged);
        assert_eq!(breaker.level, BreakerLevel::Throttle);

        // 20th clean sample: drops straight to Normal, no Warn stopover
        feed(&mut tracker, 29, &[10]);
        assert_eq!(
            breaker.evaluate(&tracker, 29, &params),
            BreakerTransition::Recovered { from: BreakerLevel::Throttle }
        );
        assert_eq!(breaker.level, BreakerLevel::Normal);
        assert_eq!(breaker.activated_at_block, None);
    }

    #[test]
    fn evaluate_never_lowers_without_recovery() {
        let params = BreakerParams::default();
        let mut tracker = DeviationTracker::new();
        let mut breaker = CircuitBreaker::new();

        feed(&mut tracker, 0, &[250; 10]);
        breaker.evaluate(&tracker, 9, &params);
        assert_eq!(breaker.level, BreakerLevel::Throttle);

        // deviation eased to warn territory but not clean: level must hold
        feed(&mut tracker, 10, &[150; 10]);
        breaker.evaluate(&tracker, 19, &params);
        assert_eq!(breaker.level, BreakerLevel::Throttle);
    }

    #[test]
    fn manual_override_bypasses_windows() {
        let mut breaker = CircuitBreaker::new();
        breaker.override_level(BreakerLevel::Halt, 7);
        assert_eq!(breaker.level, BreakerLevel::Halt);
        assert_eq!(breaker.activated_at_block, Some(7));

        breaker.override_level(BreakerLevel::Normal, 8);
        assert_eq!(breaker.level, BreakerLevel::Normal);
        assert_eq!(breaker.activated_at_block, None);
    }
}
