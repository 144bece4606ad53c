use rust_decimal::Decimal;
use tracing::{debug, instrument, trace};

use crate::engine::types::{Order, OrderId, Side};

// Crossing produced by one pass over the book
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fill {
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub buyer_id: String,
    pub seller_id: String,
    /// Price of the resting (earlier-booked) order.
    pub price: Decimal,
    pub quantity: u64,
}

/// One instrument's open interest. Both sides are kept in insertion order; there is no
/// price-level index, so matching is time priority only.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct OrderBook {
    bids: Vec<Order>,
    asks: Vec<Order>,
}

impl OrderBook {
    pub fn new() -> Self {
        OrderBook { bids: Vec::new(), asks: Vec::new() }
    }

    pub fn insert(&mut self, order: Order) {
        debug!(id = order.id, side = ?order.side, price = %order.price, qty = order.remaining, "Added order to book");
        match order.side {
            Side::BUY => self.bids.push(order),
            Side::SELL => self.asks.push(order),
        }
    }

    pub fn bids(&self) -> &[Order] {
        &self.bids
    }

    pub fn asks(&self) -> &[Order] {
        &self.asks
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.bids.iter().chain(self.asks.iter()).find(|o| o.id == id)
    }

    pub fn open_orders(&self) -> impl Iterator<Item = &Order> {
        self.bids.iter().chain(self.asks.iter()).filter(|o| o.is_open())
    }

    pub fn has_open(&self, participant_id: &str, side: Side) -> bool {
        let orders = match side {
            Side::BUY => &self.bids,
            Side::SELL => &self.asks,
        };
        orders.iter().any(|o| o.is_open() && o.participant_id == participant_id)
    }

    /// Quantity still committed to the participant's open sell orders.
    pub fn pending_sell_quantity(&self, participant_id: &str) -> u64 {
        self.asks
            .iter()
            .filter(|o| o.is_open() && o.participant_id == participant_id)
            .map(|o| o.remaining)
            .sum()
    }

    /// Walk bids in insertion order and, for each open bid, the asks in insertion order,
    /// executing every pair that crosses. Orders from the same participant never trade.
    #[instrument(level = "trace", skip(self))]
    pub fn cross(&mut self) -> Vec<Fill> {
        let mut fills = Vec::new();

        for bid in self.bids.iter_mut() {
            if !bid.is_open() { continue; }

            for ask in self.asks.iter_mut() {
                if !ask.is_open() { continue; }
                if ask.participant_id == bid.participant_id {
                    trace!(bid = bid.id, ask = ask.id, "Skipping self-trade");
                    continue;
                }
                if bid.price < ask.price { continue; }

                let qty = std::cmp::min(bid.remaining, ask.remaining);
                let price = if bid.id < ask.id { bid.price } else { ask.price };
                bid.fill(qty);
                ask.fill(qty);

                debug!(bid = bid.id, ask = ask.id, price = %price, qty = qty, "Fill executed");
                fills.push(Fill {
                    buy_order_id: bid.id,
                    sell_order_id: ask.id,
                    buyer_id: bid.participant_id.clone(),
                    seller_id: ask.participant_id.clone(),
                    price,
                    quantity: qty,
                });

                if bid.remaining == 0 { break; }
            }
        }

        fills
    }

    /// Drop every order that is no longer open from both sides.
    pub fn purge_closed(&mut self) {
        self.bids.retain(Order::is_open);
        self.asks.retain(Order::is_open);
    }

    /// Cancel an open order and take it out of the book.
    pub fn cancel(&mut self, id: OrderId) -> Option<Order> {
        for orders in [&mut self.bids, &mut self.asks] {
            if let Some(pos) = orders.iter().position(|o| o.id == id && o.is_open()) {
                let mut order = orders.remove(pos);
                order.cancel();
                return Some(order);
            }
        }
        None
    }
}
