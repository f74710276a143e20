//! Reflective price engine.
//!
//! The reflective price is the internal reference the whole control loop
//! converges on. Each sync applies a capped multiplicative update toward the
//! oracle price: no single update can move the reference by more than the
//! configured cap, regardless of how far the oracle reading jumps. That cap is
//! the manipulation-resistance property everything downstream relies on.

use crate::types::{Bps, Price, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Bounds on the admin-tunable per-update cap: 0.01% to 50%.
pub const MIN_DELTA_BPS: u32 = 1;
pub const MAX_DELTA_BPS: u32 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ReflectiveError {
    #[error("oracle timestamp is in the future")]
    FutureTimestamp,

    #[error("oracle reading is stale: age {age_ms}ms, max {max_age_ms}ms")]
    StaleOracle { age_ms: i64, max_age_ms: i64 },

    #[error("oracle price must be positive")]
    InvalidOraclePrice,

    #[error("per-update cap {0} outside [{MIN_DELTA_BPS}, {MAX_DELTA_BPS}] bps")]
    InvalidDeltaCap(u32),
}

/// Holds the reference price and applies capped updates to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectivePriceEngine {
    price: Price,
    last_update: Timestamp,
    max_delta: Bps,
}

impl ReflectivePriceEngine {
    pub fn new(initial_price: Price, max_delta: Bps, now: Timestamp) -> Self {
        Self {
            price: initial_price,
            last_update: now,
            max_delta,
        }
    }

    pub fn price(&self) -> Price {
        self.price
    }

    pub fn last_update(&self) -> Timestamp {
        self.last_update
    }

    pub fn max_delta(&self) -> Bps {
        self.max_delta
    }

    pub fn set_max_delta(&mut self, max_delta: Bps) -> Result<(), ReflectiveError> {
        if max_delta.value() < MIN_DELTA_BPS || max_delta.value() > MAX_DELTA_BPS {
            return Err(ReflectiveError::InvalidDeltaCap(max_delta.value()));
        }
        self.max_delta = max_delta;
        Ok(())
    }

    /// Apply one capped update from a fresh oracle reading.
    ///
    /// The raw ratio oracle/previous is clamped to [1-Δ, 1+Δ], so the result
    /// is always strictly positive and within Δ of the previous value in
    /// relative terms.
    pub fn update(
        &mut self,
        oracle_price: Decimal,
        oracle_ts: Timestamp,
        now: Timestamp,
        max_staleness_ms: i64,
    ) -> Result<Price, ReflectiveError> {
        if oracle_ts > now {
            return Err(ReflectiveError::FutureTimestamp);
        }
        let age_ms = now.elapsed_since(oracle_ts);
        if age_ms > max_staleness_ms {
            return Err(ReflectiveError::StaleOracle {
                age_ms,
                max_age_ms: max_staleness_ms,
            });
        }
        if oracle_price <= Decimal::ZERO {
            return Err(ReflectiveError::InvalidOraclePrice);
        }

        let delta = self.max_delta.as_fraction();
        let raw_ratio = oracle_price / self.price.value();
        let clamped = raw_ratio
            .max(Decimal::ONE - delta)
            .min(Decimal::ONE + delta);

        // previous > 0 and clamped >= 1 - 0.5 > 0, so the product stays positive
        self.price = Price::new_unchecked(self.price.value() * clamped);
        self.last_update = now;
        Ok(self.price)
    }

    /// Direct price set for the emergency path. The controller gates this on
    /// breaker level >= Throttle; the engine itself only records it.
    pub fn force_set(&mut self, price: Price, now: Timestamp) {
        self.price = price;
        self.last_update = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn engine(price: Decimal, cap_bps: u32) -> ReflectivePriceEngine {
        ReflectivePriceEngine::new(
            Price::new_unchecked(price),
            Bps::new(cap_bps),
            Timestamp::from_millis(0),
        )
    }

    #[test]
    fn oracle_spike_is_capped() {
        // reflective 1.00, cap 3%, oracle 1.10 -> 1.03
        let mut eng = engine(dec!(1.00), 300);
        let result = eng
            .update(dec!(1.10), Timestamp::from_millis(900), Timestamp::from_millis(1000), 60_000)
            .unwrap();
        assert_eq!(result.value(), dec!(1.03));
    }

    #[test]
    fn oracle_crash_is_capped() {
        let mut eng = engine(dec!(1.00), 300);
        let result = eng
            .update(dec!(0.50), Timestamp::from_millis(0), Timestamp::from_millis(0), 60_000)
            .unwrap();
        assert_eq!(result.value(), dec!(0.97));
    }

    #[test]
    fn small_move_passes_through_uncapped() {
        let mut eng = engine(dec!(1.00), 300);
        let result = eng
            .update(dec!(1.01), Timestamp::from_millis(0), Timestamp::from_millis(0), 60_000)
            .unwrap();
        assert_eq!(result.value(), dec!(1.01));
    }

    #[test]
    fn stale_oracle_rejected() {
        let mut eng = engine(dec!(1.00), 300);
        let result = eng.update(
            dec!(1.01),
            Timestamp::from_millis(0),
            Timestamp::from_millis(120_000),
            60_000,
        );
        assert!(matches!(result, Err(ReflectiveError::StaleOracle { age_ms: 120_000, .. })));
        assert_eq!(eng.price().value(), dec!(1.00));
    }

    #[test]
    fn future_timestamp_rejected() {
        let mut eng = engine(dec!(1.00), 300);
        let result = eng.update(
            dec!(1.01),
            Timestamp::from_millis(2000),
            Timestamp::from_millis(1000),
            60_000,
        );
        assert_eq!(result, Err(ReflectiveError::FutureTimestamp));
    }

    #[test]
    fn zero_oracle_price_rejected() {
        let mut eng = engine(dec!(1.00), 300);
        let result = eng.update(
            dec!(0),
            Timestamp::from_millis(0),
            Timestamp::from_millis(0),
            60_000,
        );
        assert_eq!(result, Err(ReflectiveError::InvalidOraclePrice));
    }

    #[test]
    fn delta_cap_bounds_enforced() {
        let mut eng = engine(dec!(1.00), 300);
        assert!(eng.set_max_delta(Bps::new(0)).is_err());
        assert!(eng.set_max_delta(Bps::new(5001)).is_err());
        assert!(eng.set_max_delta(Bps::new(1)).is_ok());
        assert!(eng.set_max_delta(Bps::new(5000)).is_ok());
    }

    #[test]
    fn convergence_over_multiple_syncs() {
        let mut eng = engine(dec!(1.00), 300);
        // oracle holds at 1.10; reflective walks up 3% per tick until it lands
        for tick in 1..=5 {
            let now = Timestamp::from_millis(tick * 1000);
            eng.update(dec!(1.10), now, now, 60_000).unwrap();
        }
        // 1.03^3 = 1.092727 < 1.10, the fourth tick closes the remaining gap
        let gap = (eng.price().value() - dec!(1.10)).abs();
        assert!(gap < dec!(0.0000001), "price {} did not converge", eng.price());
    }
}
