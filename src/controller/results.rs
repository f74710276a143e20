// 8.0.2: result types and errors for controller operations.

use super::config::ControllerConfigError;
use crate::band::BandError;
use crate::breaker::BreakerLevel;
use crate::oracle::OracleError;
use crate::reflective::ReflectiveError;
use crate::types::{Amount, Price, SignedBps};

/// What one sync cycle observed and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub reflective_price: Price,
    pub market_price: Price,
    pub deviation: SignedBps,
    pub breaker_level: BreakerLevel,
    pub action: SyncAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Deviation below the action floor.
    None,
    /// A recenter commit was placed; it matures over the gate delay.
    RecenterCommitted,
    /// A matured commit was revealed and the band recentered.
    Recentered,
    /// The arbitrage collaborator moved `amount` toward the peg.
    ArbitrageExecuted { bought_synth: bool, amount: Amount },
    /// Action was warranted but could not happen this cycle.
    ArbitragePending,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    #[error("controller is paused")]
    Paused,

    #[error("circuit breaker at Halt; sync refused until administrative reset")]
    Halted,

    #[error("sync not due: {remaining_ms}ms until next interval")]
    NotDue { remaining_ms: i64 },

    #[error("emergency price set requires breaker >= Throttle, currently {level:?}")]
    EmergencyNotArmed { level: BreakerLevel },

    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("reflective price error: {0}")]
    Reflective(#[from] ReflectiveError),

    #[error("band error: {0}")]
    Band(#[from] BandError),

    #[error("config error: {0}")]
    Config(#[from] ControllerConfigError),
}
