// 10.0: every state change produces an event. used for audit trails, state
// reconstruction, and notifying external systems. the EventPayload enum lists
// all event types.

use crate::band::SwapResult;
use crate::breaker::BreakerLevel;
use crate::types::{Amount, BlockNumber, Price, SignedBps, Timestamp, Token};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Control loop events
    PriceSynced(PriceSyncedEvent),
    ArbitrageExecuted(ArbitrageExecutedEvent),
    ArbitragePending(ArbitragePendingEvent),

    // Breaker events
    BreakerEscalated(BreakerEscalatedEvent),
    BreakerRecovered(BreakerRecoveredEvent),
    BreakerOverridden(BreakerOverriddenEvent),

    // Band events
    SwapExecuted(SwapExecutedEvent),
    LiquidityDeposited(LiquidityDepositedEvent),
    LiquidityWithdrawn(LiquidityWithdrawnEvent),
    RecenterCommitted(RecenterCommittedEvent),
    Recentered(RecenteredEvent),
    VaultFunded(VaultFundedEvent),

    // Admin events
    EmergencyPriceSet(EmergencyPriceSetEvent),
    Paused,
    Unpaused,
    EmergencyShutdown,
    ConfigUpdated(ConfigUpdatedEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSyncedEvent {
    pub block: BlockNumber,
    pub reflective_price: Price,
    pub market_price: Price,
    pub deviation: SignedBps,
    pub breaker_level: BreakerLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageExecutedEvent {
    pub block: BlockNumber,
    pub bought_synth: bool,
    pub amount: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitragePendingEvent {
    pub block: BlockNumber,
    pub deviation: SignedBps,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerEscalatedEvent {
    pub block: BlockNumber,
    pub from: BreakerLevel,
    pub to: BreakerLevel,
    pub deviation: SignedBps,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerRecoveredEvent {
    pub block: BlockNumber,
    pub from: BreakerLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerOverriddenEvent {
    pub block: BlockNumber,
    pub from: BreakerLevel,
    pub to: BreakerLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapExecutedEvent {
    pub block: BlockNumber,
    pub token_in: Token,
    pub amount_in: Amount,
    pub fee: Amount,
    pub amount_out: Amount,
    pub implied_price: Price,
}

impl SwapExecutedEvent {
    pub fn from_result(block: BlockNumber, result: &SwapResult) -> Self {
        Self {
            block,
            token_in: result.token_in,
            amount_in: result.amount_in,
            fee: result.fee,
            amount_out: result.amount_out,
            implied_price: result.implied_price,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityDepositedEvent {
    pub provider: u64,
    pub amount_a: Amount,
    pub amount_b: Amount,
    pub shares_minted: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityWithdrawnEvent {
    pub provider: u64,
    pub amount_a: Amount,
    pub amount_b: Amount,
    pub shares_burned: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultFundedEvent {
    pub block: BlockNumber,
    pub token: Token,
    pub amount: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecenterCommittedEvent {
    pub block: BlockNumber,
    pub ready_block: BlockNumber,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecenteredEvent {
    pub block: BlockNumber,
    pub price: Price,
    pub fee_charged: Amount,
    pub forced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyPriceSetEvent {
    pub block: BlockNumber,
    pub old_price: Price,
    pub new_price: Price,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigUpdatedEvent {
    pub field: String,
}

pub trait EventEmitter {
    fn emit(&mut self, event: Event);
}

/// In-memory ring of recent events. Oldest entries are dropped past capacity
/// so a long-running loop cannot grow without bound.
#[derive(Debug)]
pub struct EventCollector {
    events: Vec<Event>,
    capacity: usize,
    next_id: u64,
}

impl EventCollector {
    pub const DEFAULT_CAPACITY: usize = 1000;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::new(),
            capacity: capacity.max(1),
            next_id: 1,
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl Default for EventCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEmitter for EventCollector {
    fn emit(&mut self, event: Event) {
        if self.events.len() == self.capacity {
            self.events.remove(0);
        }
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn event_collector() {
        let mut collector = EventCollector::new();

        let event = Event::new(
            collector.next_id(),
            Timestamp::from_millis(1000),
            EventPayload::PriceSynced(PriceSyncedEvent {
                block: 1,
                reflective_price: Price::new_unchecked(dec!(1.00)),
                market_price: Price::new_unchecked(dec!(1.004)),
                deviation: SignedBps::new(40),
                breaker_level: BreakerLevel::Normal,
            }),
        );

        collector.emit(event);
        assert_eq!(collector.events().len(), 1);

        collector.clear();
        assert!(collector.events().is_empty());
    }

    #[test]
    fn collector_drops_oldest_past_capacity() {
        let mut collector = EventCollector::with_capacity(3);
        for i in 0..5 {
            let event = Event::new(
                collector.next_id(),
                Timestamp::from_millis(i),
                EventPayload::Paused,
            );
            collector.emit(event);
        }
        assert_eq!(collector.events().len(), 3);
        assert_eq!(collector.events()[0].id, EventId(3));
        assert_eq!(collector.events()[2].id, EventId(5));
    }

    #[test]
    fn swap_event_from_result() {
        let result = SwapResult {
            token_in: Token::Reserve,
            amount_in: Amount::new_unchecked(dec!(100)),
            fee: Amount::new_unchecked(dec!(0.3)),
            amount_out: Amount::new_unchecked(dec!(99.2)),
            implied_price: Price::new_unchecked(dec!(1.0002)),
        };
        let event = SwapExecutedEvent::from_result(7, &result);
        assert_eq!(event.block, 7);
        assert_eq!(event.fee, Amount::new_unchecked(dec!(0.3)));
    }
}
