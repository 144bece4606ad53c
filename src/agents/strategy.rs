//! Pure trading signal evaluation. Nothing here touches the exchange; the pool feeds in
//! the current view of one instrument and submits whatever intent comes back.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::engine::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Momentum,
    Contrarian,
}

impl Strategy {
    /// Number of recent price samples the strategy asks for.
    pub fn window(self) -> usize {
        match self {
            Strategy::Momentum => 5,
            Strategy::Contrarian => 10,
        }
    }

    /// Fewer samples than this and the instrument is skipped.
    pub fn min_samples(self) -> usize {
        match self {
            Strategy::Momentum => 2,
            Strategy::Contrarian => 5,
        }
    }
}

/// Order sizing and trigger parameters shared by both strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Sizing {
    pub max_order_value: Decimal,
    pub min_order_value: Decimal,
    /// Fraction of cash committed per buy.
    pub risk_fraction: Decimal,
    /// Momentum trigger, or the contrarian band half-width, as a fraction.
    pub threshold: Decimal,
}

/// What the agent sees of one instrument when deciding.
#[derive(Debug, Clone, Copy)]
pub struct MarketView<'a> {
    pub price: Decimal,
    /// Oldest first.
    pub samples: &'a [Decimal],
    pub cash: Decimal,
    pub holdings: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub side: Side,
    pub quantity: u64,
    pub price: Decimal,
}

pub fn evaluate(strategy: Strategy, sizing: &Sizing, view: &MarketView<'_>) -> Option<Intent> {
    if view.samples.len() < strategy.min_samples() || view.price <= Decimal::ZERO {
        return None;
    }
    match strategy {
        Strategy::Momentum => momentum(sizing, view),
        Strategy::Contrarian => contrarian(sizing, view),
    }
}

fn momentum(sizing: &Sizing, view: &MarketView<'_>) -> Option<Intent> {
    let first = *view.samples.first()?;
    let last = *view.samples.last()?;
    let change = (last - first).checked_div(first)?;

    if change > sizing.threshold {
        buy(sizing, view, dec!(1.001))
    } else if change < -sizing.threshold {
        sell(view, view.holdings / 2, dec!(0.999))
    } else {
        None
    }
}

fn contrarian(sizing: &Sizing, view: &MarketView<'_>) -> Option<Intent> {
    let total: Decimal = view.samples.iter().sum();
    let avg = total / Decimal::from(view.samples.len());

    if view.price < avg * (Decimal::ONE - sizing.threshold) {
        buy(sizing, view, dec!(1.002))
    } else if view.price > avg * (Decimal::ONE + sizing.threshold) {
        sell(view, view.holdings / 3, dec!(0.998))
    } else {
        None
    }
}

fn buy(sizing: &Sizing, view: &MarketView<'_>, markup: Decimal) -> Option<Intent> {
    let quantity = buy_quantity(sizing, view.cash, view.price);
    (quantity > 0).then(|| Intent { side: Side::BUY, quantity, price: order_price(view.price * markup) })
}

fn sell(view: &MarketView<'_>, quantity: u64, markdown: Decimal) -> Option<Intent> {
    (quantity > 0).then(|| Intent { side: Side::SELL, quantity, price: order_price(view.price * markdown) })
}

/// `floor(clamp(cash × risk) / price)`, capping at the max notional before raising to the min.
pub fn buy_quantity(sizing: &Sizing, cash: Decimal, price: Decimal) -> u64 {
    if price <= Decimal::ZERO {
        return 0;
    }
    let notional = cash
        .saturating_mul(sizing.risk_fraction)
        .min(sizing.max_order_value)
        .max(sizing.min_order_value);
    notional.checked_div(price).and_then(|q| q.floor().to_u64()).unwrap_or(0)
}

fn order_price(raw: Decimal) -> Decimal {
    raw.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
