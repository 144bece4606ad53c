use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Participant id of the synthetic market-maker that owns each instrument's opening inventory.
pub const MARKET_MAKER_ID: &str = "exchange";

pub type OrderId = u64;
pub type TxId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    BUY,
    SELL
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::BUY => Side::SELL,
            Side::SELL => Side::BUY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { Open, Filled, Cancelled }

// Order as submitted by a client, an agent or the seeding step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    #[serde(alias = "traderId")]
    pub participant_id: String,
    #[serde(alias = "stockId")]
    pub instrument_id: String,
    #[serde(alias = "type")]
    pub side: Side,
    pub price: Decimal,
    pub quantity: u64,
}

// Order in the book (mutable remaining)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub participant_id: String,
    pub instrument_id: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: u64,
    pub remaining: u64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }

    /// Consume `qty` from the remaining quantity, moving to `Filled` when nothing is left.
    pub(crate) fn fill(&mut self, qty: u64) {
        debug_assert!(self.is_open() && qty <= self.remaining);
        self.remaining -= qty;
        if self.remaining == 0 {
            self.status = OrderStatus::Filled;
        }
    }

    pub(crate) fn cancel(&mut self) {
        debug_assert!(self.is_open());
        self.status = OrderStatus::Cancelled;
    }
}

// Executed trade, append-only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TxId,
    pub buyer_id: String,
    pub seller_id: String,
    pub instrument_id: String,
    pub price: Decimal,
    pub quantity: u64,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub id: String,
    pub name: String,
    #[serde(alias = "currentPrice")]
    pub price: Decimal,
    /// Inventory still held by the market-maker.
    #[serde(alias = "amount")]
    pub supply: u64,
}

/// Which slice of the book or the transaction log a query is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Instrument(String),
    Participant(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentDetail {
    #[serde(flatten)]
    pub instrument: Instrument,
    pub open_orders: Vec<Order>,
    pub last_transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantSummary {
    pub id: String,
    pub name: String,
}

/// Point-in-time view pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub instruments: Vec<Instrument>,
    pub taken_at: DateTime<Utc>,
}
