// 8.0: peg controller. coordinates oracle reads, reflective price updates,
// deviation tracking, breaker evaluation, and band/arbitrage dispatch.
// deterministic and event-driven with no external I/O.

mod config;
mod core;
mod results;

pub use config::{ControllerConfig, ControllerConfigError};
pub use core::{Controller, PriceObservation};
pub use results::{ControllerError, SyncAction, SyncReport};
