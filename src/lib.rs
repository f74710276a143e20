// peg-core: synthetic index token peg maintenance engine.
// controller-first architecture: the reflective control loop decides, the
// band manager and collaborators execute. all computation is deterministic
// with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: Price, Amount, Bps, SignedBps, Token, AdminCap
//   2.x  reflective.rs: capped multiplicative reflective price engine
//   3.x  deviation.rs: 50-slot ring buffer of peg deviations
//   3.1  breaker.rs: 4-level circuit breaker with recovery hysteresis
//   4.x  band.rs: concentrated liquidity band: swaps, deposits, accounting
//   5.x  vault.rs: locked reserve vault with bounded borrow
//   6.x  recenter.rs: atomic vault-funded band recentering
//   7.x  commit_reveal.rs: state-hash commit gate for recenters
//   8.x  controller/: sync cycle, config, admin surface
//   9.x  oracle.rs: oracle aggregation (mocked)
//   9.1  arbitrage.rs: reserve-arbitrage collaborator (mocked)
//   10.x events.rs: state transition events for audit

// control loop modules
pub mod breaker;
pub mod controller;
pub mod deviation;
pub mod reflective;
pub mod types;

// liquidity modules
pub mod band;
pub mod commit_reveal;
pub mod recenter;
pub mod vault;

// integration modules
pub mod arbitrage;
pub mod events;
pub mod oracle;

// re exports for convenience
pub use arbitrage::*;
pub use band::*;
pub use breaker::*;
pub use commit_reveal::*;
pub use controller::*;
pub use deviation::*;
pub use events::*;
pub use oracle::*;
pub use recenter::*;
pub use reflective::*;
pub use types::*;
pub use vault::*;
