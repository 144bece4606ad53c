//! Rolling window of observed prices per instrument.
//!
//! Fed by trade executions, oscillator ticks and the opening price, and read by the
//! agent strategies when sampling recent prices.

use std::collections::VecDeque;

use ahash::AHashMap;
use rust_decimal::Decimal;

pub const DEFAULT_HISTORY_CAPACITY: usize = 32;

#[derive(Debug)]
pub struct PriceHistory {
    capacity: usize,
    series: AHashMap<String, VecDeque<Decimal>>,
}

impl PriceHistory {
    pub fn new(capacity: usize) -> Self {
        PriceHistory { capacity: capacity.max(1), series: AHashMap::new() }
    }

    pub fn record(&mut self, instrument_id: &str, price: Decimal) {
        let capacity = self.capacity;
        let deque = self
            .series
            .entry(instrument_id.to_string())
            .or_insert_with(|| VecDeque::with_capacity(capacity));
        if deque.len() == capacity {
            deque.pop_front();
        }
        deque.push_back(price);
    }

    /// The most recent `count` prices, oldest first.
    pub fn last(&self, instrument_id: &str, count: usize) -> Vec<Decimal> {
        match self.series.get(instrument_id) {
            Some(deque) => {
                let skip = deque.len().saturating_sub(count);
                deque.iter().skip(skip).copied().collect()
            }
            None => Vec::new(),
        }
    }
}

impl Default for PriceHistory {
    fn default() -> Self {
        PriceHistory::new(DEFAULT_HISTORY_CAPACITY)
    }
}
