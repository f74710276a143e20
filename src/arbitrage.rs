// 9.1 arbitrage.rs: reserve-arbitrage collaborator boundary. the peg-stability
// reserve module sizes and executes corrective swaps for moderate deviations.
// its failures are never fatal to the sync cycle; the controller downgrades
// them to a pending signal.

use crate::types::{Amount, SignedBps};
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArbitrageError {
    #[error("arbitrage module disabled")]
    Disabled,

    #[error("insufficient reserve: requested {requested}, available {available}")]
    InsufficientReserve { requested: Amount, available: Amount },

    #[error("execution reverted: {reason}")]
    ExecutionFailed { reason: String },
}

/// Peg-stability reserve collaborator. `buy` means buying the synth with
/// reserve asset (market below peg); selling otherwise.
pub trait ReserveArbitrage {
    fn can_execute(&self) -> (bool, SignedBps);

    fn execute(&mut self, buy: bool, max_amount: Amount) -> Result<Amount, ArbitrageError>;
}

/// Scriptable collaborator for tests and simulation.
#[derive(Debug, Clone)]
pub struct MockArbitrage {
    deviation: SignedBps,
    willing: bool,
    fail_next: bool,
    pub executions: Vec<(bool, Amount)>,
}

impl MockArbitrage {
    pub fn new() -> Self {
        Self {
            deviation: SignedBps::new(0),
            willing: true,
            fail_next: false,
            executions: Vec::new(),
        }
    }

    pub fn set_deviation(&mut self, deviation: SignedBps) {
        self.deviation = deviation;
    }

    pub fn set_willing(&mut self, willing: bool) {
        self.willing = willing;
    }

    pub fn fail_next(&mut self) {
        self.fail_next = true;
    }
}

impl Default for MockArbitrage {
    fn default() -> Self {
        Self::new()
    }
}

impl ReserveArbitrage for MockArbitrage {
    fn can_execute(&self) -> (bool, SignedBps) {
        (self.willing, self.deviation)
    }

    fn execute(&mut self, buy: bool, max_amount: Amount) -> Result<Amount, ArbitrageError> {
        if self.fail_next {
            self.fail_next = false;
            return Err(ArbitrageError::ExecutionFailed {
                reason: "scripted failure".to_string(),
            });
        }
        if !self.willing {
            return Err(ArbitrageError::Disabled);
        }
        self.executions.push((buy, max_amount));
        Ok(max_amount.mul(Decimal::new(99, 2)))
    }
}
