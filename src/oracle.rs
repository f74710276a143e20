// 9.0 oracle.rs: oracle boundary. the controller is agnostic to whether the
// aggregated price comes from a median of on-chain feeds, a TWAP service, or a
// test fixture. aggregation itself (outlier filtering, time weighting) happens
// upstream; this module only defines the consuming interface.

use crate::types::{Price, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One aggregated reading. Already outlier-filtered and time-weighted upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleReading {
    pub price: Price,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("oracle aggregator unavailable")]
    Unavailable,

    #[error("oracle returned a non-positive price")]
    InvalidPrice,
}

/// Aggregated price source consumed by the controller each sync cycle.
pub trait OracleAggregator {
    fn aggregated_price(&self) -> Result<OracleReading, OracleError>;
}

/// Test/simulation oracle with settable price, timestamp, and health.
#[derive(Debug, Clone)]
pub struct MockOracle {
    price: Decimal,
    timestamp: Timestamp,
    healthy: bool,
}

impl MockOracle {
    pub fn new(price: Decimal, timestamp: Timestamp) -> Self {
        Self {
            price,
            timestamp,
            healthy: true,
        }
    }

    pub fn set_price(&mut self, price: Decimal) {
        self.price = price;
    }

    pub fn set_timestamp(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    pub fn set_reading(&mut self, price: Decimal, timestamp: Timestamp) {
        self.price = price;
        self.timestamp = timestamp;
    }

    pub fn set_healthy(&mut self, healthy: bool) {
        self.healthy = healthy;
    }
}

impl OracleAggregator for MockOracle {
    fn aggregated_price(&self) -> Result<OracleReading, OracleError> {
        if !self.healthy {
            return Err(OracleError::Unavailable);
        }
        let price = Price::new(self.price).ok_or(OracleError::InvalidPrice)?;
        Ok(OracleReading {
            price,
            timestamp: self.timestamp,
        })
    }
}
