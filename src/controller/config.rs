//! Controller configuration options.

use crate::breaker::{BreakerConfigError, BreakerParams};
use crate::types::Bps;
use serde::{Deserialize, Serialize};

pub const MIN_SYNC_INTERVAL_SECS: i64 = 10;
pub const MAX_SYNC_INTERVAL_SECS: i64 = 300;
pub const MIN_STALENESS_SECS: i64 = 60;
pub const MAX_STALENESS_SECS: i64 = 1800;

/// Controller configuration. Rate caps and staleness bounds are admin
/// tunable within fixed ranges; out-of-range values are rejected whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Minimum seconds between sync cycles.
    pub sync_interval_secs: i64,
    /// Per-update cap on the reflective price move, in bps.
    pub max_delta_bps: Bps,
    /// Oracle readings older than this are rejected.
    pub max_staleness_secs: i64,
    /// Dispatch recenters through the band manager.
    pub band_integration_enabled: bool,
    /// Delegate mid-size deviations to the arbitrage collaborator.
    pub arbitrage_enabled: bool,
    /// Ignore the sync interval and run every tick. Simulation only.
    pub sync_every_tick: bool,
    pub breaker: BreakerParams,
    /// Maximum number of price observations to retain in memory.
    pub max_observations: usize,
    /// Enable verbose logging.
    pub verbose: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: 60,
            max_delta_bps: Bps::new(300),
            max_staleness_secs: 300,
            band_integration_enabled: true,
            arbitrage_enabled: true,
            sync_every_tick: false,
            breaker: BreakerParams::default(),
            max_observations: 1000,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerConfigError {
    #[error("sync interval {0}s outside [{MIN_SYNC_INTERVAL_SECS}, {MAX_SYNC_INTERVAL_SECS}]")]
    InvalidSyncInterval(i64),

    #[error("max delta {0} bps outside [1, 5000]")]
    InvalidMaxDelta(u32),

    #[error("staleness bound {0}s outside [{MIN_STALENESS_SECS}, {MAX_STALENESS_SECS}]")]
    InvalidStaleness(i64),

    #[error(transparent)]
    Breaker(#[from] BreakerConfigError),
}

impl ControllerConfig {
    /// Tighter rate caps and a hair-trigger breaker for cautious rollouts.
    pub fn conservative() -> Self {
        Self {
            sync_interval_secs: 30,
            max_delta_bps: Bps::new(100),
            max_staleness_secs: 120,
            breaker: BreakerParams {
                warn_threshold_bps: 50,
                throttle_threshold_bps: 100,
                halt_threshold_bps: 300,
                warn_blocks: 5,
                throttle_blocks: 5,
                halt_blocks: 3,
                recover_blocks: 30,
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ControllerConfigError> {
        if !(MIN_SYNC_INTERVAL_SECS..=MAX_SYNC_INTERVAL_SECS).contains(&self.sync_interval_secs) {
            return Err(ControllerConfigError::InvalidSyncInterval(
                self.sync_interval_secs,
            ));
        }
        let delta = self.max_delta_bps.value();
        if !(crate::reflective::MIN_DELTA_BPS..=crate::reflective::MAX_DELTA_BPS).contains(&delta) {
            return Err(ControllerConfigError::InvalidMaxDelta(delta));
        }
        if !(MIN_STALENESS_SECS..=MAX_STALENESS_SECS).contains(&self.max_staleness_secs) {
            return Err(ControllerConfigError::InvalidStaleness(
                self.max_staleness_secs,
            ));
        }
        self.breaker.validate()?;
        Ok(())
    }
}
