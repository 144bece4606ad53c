use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::engine::{Exchange, Instrument};

/// Where agents get their recent price samples from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalSource {
    /// Prices actually observed by the exchange.
    #[default]
    History,
    /// Deterministic waves around the current price.
    Synthetic,
}

impl SignalSource {
    /// Up to `count` samples for `instrument`, oldest first.
    pub fn samples(self, exchange: &Exchange, instrument: &Instrument, count: usize, now: DateTime<Utc>) -> Vec<Decimal> {
        match self {
            SignalSource::History => exchange.price_samples(&instrument.id, count).unwrap_or_default(),
            SignalSource::Synthetic => synthetic_series(&instrument.id, instrument.price, count, now.timestamp() / 30),
        }
    }
}

/// Three overlaid waves seeded by the instrument id and shifted every 30 s bucket, clamped
/// to ±5 % of `price`.
pub fn synthetic_series(instrument_id: &str, price: Decimal, count: usize, bucket: i64) -> Vec<Decimal> {
    let seed: i64 = instrument_id.chars().map(|c| c as i64).sum();

    (0..count as i64)
        .map(|i| {
            let v = ((i + seed) as f64).sin() * 0.02
                + ((i.wrapping_mul(seed).wrapping_add(bucket)) as f64).cos() * 0.015
                + ((2 * i + bucket) as f64).sin() * 0.01;
            let v = Decimal::from_f64(v.clamp(-0.05, 0.05)).unwrap_or_default();
            price * (Decimal::ONE + v)
        })
        .collect()
}
