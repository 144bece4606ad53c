use std::fmt;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::engine::types::{OrderId, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Participant,
    Instrument,
    Order,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Participant => write!(f, "participant"),
            EntityKind::Instrument => write!(f, "instrument"),
            EntityKind::Order => write!(f, "order"),
        }
    }
}

/// Rejections raised by the exchange. All of them are detected before any state is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("invalid order: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("participant {participant_id} already has an open {existing:?} order for {instrument_id}")]
    Conflict { participant_id: String, instrument_id: String, existing: Side },

    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error("insufficient holdings: have {holdings} shares, {pending} already pending sale, only {available} available")]
    InsufficientHoldings { holdings: u64, pending: u64, available: i64 },

    #[error("order {order_id} is already closed")]
    AlreadyClosed { order_id: OrderId },
}

impl ExchangeError {
    pub(crate) fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        ExchangeError::NotFound { kind, id: id.into() }
    }

    /// Short label used for metrics and API error codes.
    pub fn reason(&self) -> &'static str {
        match self {
            ExchangeError::Validation(_) => "validation",
            ExchangeError::NotFound { .. } => "not_found",
            ExchangeError::Conflict { .. } => "conflict",
            ExchangeError::InsufficientFunds { .. } => "insufficient_funds",
            ExchangeError::InsufficientHoldings { .. } => "insufficient_holdings",
            ExchangeError::AlreadyClosed { .. } => "already_closed",
        }
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;
