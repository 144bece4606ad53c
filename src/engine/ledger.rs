use std::collections::BTreeMap;

use ahash::AHashMap;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::engine::types::ParticipantSummary;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub cash: Decimal,
    pub initial_cash: Decimal,
    pub holdings: BTreeMap<String, u64>,
}

impl Participant {
    pub fn new(id: impl Into<String>, name: impl Into<String>, cash: Decimal) -> Self {
        Participant {
            id: id.into(),
            name: name.into(),
            cash,
            initial_cash: cash,
            holdings: BTreeMap::new(),
        }
    }

    pub fn holding(&self, instrument_id: &str) -> u64 {
        self.holdings.get(instrument_id).copied().unwrap_or(0)
    }

    // Fill notionals are capped at order entry, so these only saturate on absurd balances
    // and settlement never panics halfway through a trade.
    fn settle_buy(&mut self, instrument_id: &str, quantity: u64, price: Decimal) {
        self.cash = self.cash.saturating_sub(price.saturating_mul(Decimal::from(quantity)));
        *self.holdings.entry(instrument_id.to_string()).or_insert(0) += quantity;
    }

    fn settle_sell(&mut self, instrument_id: &str, quantity: u64, price: Decimal) {
        self.cash = self.cash.saturating_add(price.saturating_mul(Decimal::from(quantity)));
        let held = self.holdings.entry(instrument_id.to_string()).or_insert(0);
        // open sells never exceed holdings, so this cannot underflow
        debug_assert!(*held >= quantity);
        *held = held.saturating_sub(quantity);
    }
}

/// Cash and holdings of every registered participant.
#[derive(Debug, Default)]
pub struct Ledger {
    participants: AHashMap<String, Participant>,
}

impl Ledger {
    pub fn new() -> Self {
        Ledger { participants: AHashMap::new() }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.participants.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Participant> {
        self.participants.get(id)
    }

    /// Returns false if the id was already taken.
    pub fn insert(&mut self, participant: Participant) -> bool {
        if self.participants.contains_key(&participant.id) {
            return false;
        }
        self.participants.insert(participant.id.clone(), participant);
        true
    }

    pub fn summaries(&self) -> Vec<ParticipantSummary> {
        self.participants
            .values()
            .map(|p| ParticipantSummary { id: p.id.clone(), name: p.name.clone() })
            .collect()
    }

    /// Apply one execution to the buyer's and seller's accounts. Ids that are not in the
    /// ledger (the market-maker) are left alone; the caller adjusts instrument supply.
    pub fn settle(&mut self, buyer_id: &str, seller_id: &str, instrument_id: &str, quantity: u64, price: Decimal) {
        if let Some(buyer) = self.participants.get_mut(buyer_id) {
            buyer.settle_buy(instrument_id, quantity, price);
        }
        if let Some(seller) = self.participants.get_mut(seller_id) {
            seller.settle_sell(instrument_id, quantity, price);
        }
    }
}
