// 1.0: all the primitives live here. nothing in the controller works without these types.
// prices, token amounts, basis points, timestamps, blocks. each is a newtype so the
// compiler catches unit mixups.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Block height on the sequential ledger.
pub type BlockNumber = u64;

// 1.1: the two sides of the managed pair. Synth is the synthetic index token,
// Reserve is the external reference asset it is pegged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Token {
    Synth,
    Reserve,
}

impl Token {
    pub fn other(&self) -> Self {
        match self {
            Token::Synth => Token::Reserve,
            Token::Reserve => Token::Synth,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Token::Synth => "SYNTH",
            Token::Reserve => "RSV",
        }
    }
}

// 1.2: price of the synth in reserve units. must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    #[must_use]
    pub fn new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn new_unchecked(value: Decimal) -> Self {
        debug_assert!(value > Decimal::ZERO);
        Self(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Relative deviation of `other` from `self` as a fraction, signed.
    pub fn relative_delta(&self, other: Price) -> Decimal {
        (other.0 - self.0) / self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 1.3: token quantity. reserves, vault balances, fees, swap amounts all use this.
// stays non-negative; vault debt is tracked separately from these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    #[must_use]
    pub fn new(value: Decimal) -> Option<Self> {
        if value >= Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn new_unchecked(value: Decimal) -> Self {
        debug_assert!(value >= Decimal::ZERO);
        Self(value)
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn add(&self, other: Amount) -> Self {
        Self(self.0 + other.0)
    }

    /// Saturates at zero rather than going negative.
    pub fn sub_saturating(&self, other: Amount) -> Self {
        Self((self.0 - other.0).max(Decimal::ZERO))
    }

    pub fn mul(&self, factor: Decimal) -> Self {
        Self(self.0 * factor)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialOrd for Amount {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Amount {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

// 1.4: basis points. 100 bps = 1%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bps(u32);

impl Bps {
    pub fn new(bps: u32) -> Self {
        Self(bps)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn as_fraction(&self) -> Decimal {
        Decimal::new(self.0 as i64, 4)
    }
}

impl fmt::Display for Bps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}

// 1.5: signed deviation in basis points. negative = market below reflective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignedBps(i64);

impl SignedBps {
    pub fn new(bps: i64) -> Self {
        Self(bps)
    }

    /// Signed deviation of `market` from `reference`, rounded to whole bps.
    pub fn between(reference: Price, market: Price) -> Self {
        let frac = reference.relative_delta(market) * dec!(10000);
        Self(frac.round().to_i64().unwrap_or(i64::MAX))
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn abs(&self) -> u64 {
        self.0.unsigned_abs()
    }
}

impl fmt::Display for SignedBps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}

// 1.6: millisecond timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn from_secs(secs: i64) -> Self {
        Self(secs * 1000)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn elapsed_since(&self, earlier: Timestamp) -> i64 {
        self.0 - earlier.0
    }
}

// 1.7: capability token for administrative calls. every mutating config or
// emergency operation requires a reference to one, checked at the call boundary.
// the only mint is controller construction, which hands the single cap to the
// caller; it cannot be conjured afterwards.
#[derive(Debug)]
pub struct AdminCap {
    _priv: (),
}

impl AdminCap {
    pub(crate) fn mint() -> Self {
        Self { _priv: () }
    }
}
