use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use itertools::Itertools;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info, instrument, warn};

use crate::engine::book::{Fill, OrderBook};
use crate::engine::error::{EntityKind, ExchangeError, ExchangeResult};
use crate::engine::history::{PriceHistory, DEFAULT_HISTORY_CAPACITY};
use crate::engine::ledger::{Ledger, Participant};
use crate::engine::seed::MarketSeed;
use crate::engine::types::{
    Instrument, InstrumentDetail, MarketSnapshot, Order, OrderId, OrderRequest, OrderStatus,
    ParticipantSummary, Scope, Side, Transaction, TxId, MARKET_MAKER_ID,
};

/// Largest price × quantity an order (or a seeded market-maker quote) may carry. Every fill
/// is priced off one of its two orders, so no settlement can exceed it either.
pub const MAX_ORDER_NOTIONAL: Decimal = dec!(1_000_000_000_000_000_000);

/// Price × quantity, rejected when it overflows or exceeds [`MAX_ORDER_NOTIONAL`].
fn order_notional(price: Decimal, quantity: u64) -> ExchangeResult<Decimal> {
    price
        .checked_mul(Decimal::from(quantity))
        .filter(|n| *n <= MAX_ORDER_NOTIONAL)
        .ok_or_else(|| ExchangeError::Validation(format!("order notional overflows the {MAX_ORDER_NOTIONAL} limit")))
}

/// Price move applied by [`Exchange::perturb_prices`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceChange {
    pub instrument_id: String,
    pub old: Decimal,
    pub new: Decimal,
}

// Everything the single lock guards
#[derive(Debug)]
struct ExchangeState {
    instruments: BTreeMap<String, Instrument>,
    books: BTreeMap<String, OrderBook>,
    ledger: Ledger,
    transactions: Vec<Transaction>,
    history: PriceHistory,
    next_order_id: OrderId,
    next_tx_id: TxId,
}

/// The shared market: registry, ledger, books and transaction log behind one lock.
///
/// Cloning is cheap and every clone sees the same state. Mutations hold the write lock for
/// their whole validate-book-cross-settle sequence, queries hold the read lock.
#[derive(Debug, Clone)]
pub struct Exchange {
    state: Arc<RwLock<ExchangeState>>,
}

impl Default for Exchange {
    fn default() -> Self {
        Exchange::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl Exchange {
    pub fn new(history_capacity: usize) -> Self {
        let state = ExchangeState {
            instruments: BTreeMap::new(),
            books: BTreeMap::new(),
            ledger: Ledger::new(),
            transactions: Vec::new(),
            history: PriceHistory::new(history_capacity),
            next_order_id: 1,
            next_tx_id: 1,
        };
        Exchange { state: Arc::new(RwLock::new(state)) }
    }

    /// Seed instruments and participants. Every instrument gets one standing sell order
    /// from the market-maker for its whole supply at the listed price.
    #[instrument(skip_all, fields(instruments = seed.instruments.len(), participants = seed.participants.len()))]
    pub fn load_initial_state(&self, seed: &MarketSeed) -> ExchangeResult<()> {
        if let Some(bad) = seed.instruments.iter().find(|i| i.price <= Decimal::ZERO) {
            return Err(ExchangeError::Validation(format!("instrument {} has a non-positive price", bad.id)));
        }
        for i in &seed.instruments {
            order_notional(i.price, i.supply)?;
        }

        let mut state = self.state.write();
        for seed in &seed.instruments {
            if state.instruments.contains_key(&seed.id) {
                warn!(id = %seed.id, "Duplicate instrument in seed, keeping the first");
                continue;
            }
            state.instruments.insert(seed.id.clone(), Instrument {
                id: seed.id.clone(),
                name: seed.name.clone(),
                price: seed.price,
                supply: seed.supply,
            });
            state.books.insert(seed.id.clone(), OrderBook::new());
            state.history.record(&seed.id, seed.price);

            if seed.supply > 0 {
                let id = state.issue_order_id();
                let order = Order {
                    id,
                    participant_id: MARKET_MAKER_ID.to_string(),
                    instrument_id: seed.id.clone(),
                    side: Side::SELL,
                    price: seed.price,
                    quantity: seed.supply,
                    remaining: seed.supply,
                    status: OrderStatus::Open,
                    created_at: Utc::now(),
                };
                if let Some(book) = state.books.get_mut(&seed.id) {
                    book.insert(order);
                }
            }
        }
        for p in &seed.participants {
            if !state.register(&p.id, &p.name, p.cash) {
                warn!(id = %p.id, "Duplicate participant in seed, keeping the first");
            }
        }

        info!(instruments = state.instruments.len(), "Exchange loaded successfully");
        Ok(())
    }

    /// Onboard a participant. A taken id is a no-op; the return value says whether the
    /// participant was created.
    pub fn register_participant(&self, id: &str, name: &str, initial_cash: Decimal) -> bool {
        let created = self.state.write().register(id, name, initial_cash);
        if created {
            info!(id, name, cash = %initial_cash, "Registered new participant");
        } else {
            warn!(id, "Participant already exists, registration ignored");
        }
        created
    }

    #[instrument(skip(self, req), fields(participant = %req.participant_id, instrument = %req.instrument_id, side = ?req.side, price = %req.price, qty = req.quantity))]
    pub fn place_order(&self, req: OrderRequest) -> ExchangeResult<Order> {
        let result = self.state.write().place_order(req);
        match &result {
            Ok(order) => {
                metrics::counter!("exsim_orders_accepted_total").increment(1);
                debug!(id = order.id, status = ?order.status, remaining = order.remaining, "Order accepted");
            }
            Err(e) => {
                metrics::counter!("exsim_orders_rejected_total", "reason" => e.reason()).increment(1);
                debug!(error = %e, "Order rejected");
            }
        }
        result
    }

    #[instrument(skip(self))]
    pub fn cancel_order(&self, order_id: OrderId) -> ExchangeResult<Order> {
        let mut state = self.state.write();
        for book in state.books.values_mut() {
            if let Some(order) = book.cancel(order_id) {
                info!(id = order_id, instrument = %order.instrument_id, "Order cancelled");
                return Ok(order);
            }
        }
        if order_id > 0 && order_id < state.next_order_id {
            Err(ExchangeError::AlreadyClosed { order_id })
        } else {
            Err(ExchangeError::not_found(EntityKind::Order, order_id.to_string()))
        }
    }

    /// Apply `shock` to every instrument, in id order, as one step. The closure returns the
    /// proposed new price; it is written only when positive and different from the current
    /// one. Every instrument's resulting price is recorded in the history.
    pub fn perturb_prices<F>(&self, mut shock: F) -> Vec<PriceChange>
    where
        F: FnMut(&Instrument) -> Option<Decimal>,
    {
        let mut state = self.state.write();
        let ExchangeState { instruments, history, .. } = &mut *state;

        let mut changes = Vec::new();
        for instrument in instruments.values_mut() {
            if let Some(new) = shock(instrument) {
                if new > Decimal::ZERO && new != instrument.price {
                    changes.push(PriceChange {
                        instrument_id: instrument.id.clone(),
                        old: instrument.price,
                        new,
                    });
                    instrument.price = new;
                }
            }
            history.record(&instrument.id, instrument.price);
        }
        changes
    }

    pub fn list_instruments(&self) -> Vec<Instrument> {
        self.state
            .read()
            .instruments
            .values()
            .cloned()
            .sorted_by(|a, b| id_order(&a.id, &b.id))
            .collect()
    }

    pub fn instrument(&self, id: &str) -> ExchangeResult<Instrument> {
        self.state.read().instrument(id).cloned()
    }

    pub fn instrument_detail(&self, id: &str, limit: usize) -> ExchangeResult<InstrumentDetail> {
        let state = self.state.read();
        let scope = Scope::Instrument(id.to_string());
        Ok(InstrumentDetail {
            instrument: state.instrument(id)?.clone(),
            open_orders: state.open_orders(&scope)?,
            last_transactions: state.recent_transactions(&scope, limit)?,
        })
    }

    pub fn list_participants(&self) -> Vec<ParticipantSummary> {
        self.state
            .read()
            .ledger
            .summaries()
            .into_iter()
            .sorted_by(|a, b| id_order(&a.id, &b.id))
            .collect()
    }

    pub fn participant(&self, id: &str) -> ExchangeResult<Participant> {
        self.state
            .read()
            .ledger
            .get(id)
            .cloned()
            .ok_or_else(|| ExchangeError::not_found(EntityKind::Participant, id))
    }

    pub fn list_open_orders(&self, scope: &Scope) -> ExchangeResult<Vec<Order>> {
        self.state.read().open_orders(scope)
    }

    /// Up to `limit` transactions touching `scope`, newest first.
    pub fn recent_transactions(&self, scope: &Scope, limit: usize) -> ExchangeResult<Vec<Transaction>> {
        self.state.read().recent_transactions(scope, limit)
    }

    /// cash + Σ holdings × current price − initial cash
    pub fn profit_loss(&self, participant_id: &str) -> ExchangeResult<Decimal> {
        let state = self.state.read();
        let participant = state
            .ledger
            .get(participant_id)
            .ok_or_else(|| ExchangeError::not_found(EntityKind::Participant, participant_id))?;

        let holdings_value: Decimal = participant
            .holdings
            .iter()
            .filter_map(|(id, qty)| state.instruments.get(id).map(|i| i.price.saturating_mul(Decimal::from(*qty))))
            .fold(Decimal::ZERO, Decimal::saturating_add);
        Ok(participant.cash.saturating_add(holdings_value).saturating_sub(participant.initial_cash))
    }

    /// The last `count` recorded prices for an instrument, oldest first.
    pub fn price_samples(&self, instrument_id: &str, count: usize) -> ExchangeResult<Vec<Decimal>> {
        let state = self.state.read();
        state.instrument(instrument_id)?;
        Ok(state.history.last(instrument_id, count))
    }

    pub fn snapshot(&self) -> MarketSnapshot {
        MarketSnapshot { instruments: self.list_instruments(), taken_at: Utc::now() }
    }
}

impl ExchangeState {
    fn issue_order_id(&mut self) -> OrderId {
        let id = self.next_order_id;
        self.next_order_id += 1;
        id
    }

    fn register(&mut self, id: &str, name: &str, cash: Decimal) -> bool {
        if id == MARKET_MAKER_ID {
            return false;
        }
        self.ledger.insert(Participant::new(id, name, cash))
    }

    fn instrument(&self, id: &str) -> ExchangeResult<&Instrument> {
        self.instruments
            .get(id)
            .ok_or_else(|| ExchangeError::not_found(EntityKind::Instrument, id))
    }

    fn book(&self, id: &str) -> ExchangeResult<&OrderBook> {
        self.books
            .get(id)
            .ok_or_else(|| ExchangeError::not_found(EntityKind::Instrument, id))
    }

    fn ensure_participant(&self, id: &str) -> ExchangeResult<()> {
        if id == MARKET_MAKER_ID || self.ledger.contains(id) {
            Ok(())
        } else {
            Err(ExchangeError::not_found(EntityKind::Participant, id))
        }
    }

    fn validate(&self, req: &OrderRequest) -> ExchangeResult<()> {
        if req.quantity == 0 {
            return Err(ExchangeError::Validation("quantity must be greater than 0".into()));
        }
        if req.price <= Decimal::ZERO {
            return Err(ExchangeError::Validation("price must be greater than 0".into()));
        }
        // applies to the market-maker too, which skips the funds check below
        let required = order_notional(req.price, req.quantity)?;

        self.ensure_participant(&req.participant_id)?;
        let book = self.book(&req.instrument_id)?;

        // The market-maker has no ledger entry and may quote both sides
        let Some(participant) = self.ledger.get(&req.participant_id) else {
            return Ok(());
        };

        let opposite = req.side.opposite();
        if book.has_open(&participant.id, opposite) {
            return Err(ExchangeError::Conflict {
                participant_id: participant.id.clone(),
                instrument_id: req.instrument_id.clone(),
                existing: opposite,
            });
        }

        match req.side {
            Side::BUY => {
                if participant.cash < required {
                    return Err(ExchangeError::InsufficientFunds { required, available: participant.cash });
                }
            }
            Side::SELL => {
                let holdings = participant.holding(&req.instrument_id);
                let pending = book.pending_sell_quantity(&participant.id);
                let available = holdings as i64 - pending as i64;
                if available < req.quantity as i64 {
                    return Err(ExchangeError::InsufficientHoldings { holdings, pending, available });
                }
            }
        }
        Ok(())
    }

    fn place_order(&mut self, req: OrderRequest) -> ExchangeResult<Order> {
        self.validate(&req)?;

        let id = self.issue_order_id();
        let order = Order {
            id,
            participant_id: req.participant_id,
            instrument_id: req.instrument_id.clone(),
            side: req.side,
            price: req.price,
            quantity: req.quantity,
            remaining: req.quantity,
            status: OrderStatus::Open,
            created_at: Utc::now(),
        };

        let (fills, placed) = {
            let book = self
                .books
                .get_mut(&req.instrument_id)
                .ok_or_else(|| ExchangeError::not_found(EntityKind::Instrument, &req.instrument_id))?;
            book.insert(order);
            let fills = book.cross();
            let placed = book.get(id).cloned();
            book.purge_closed();
            (fills, placed)
        };

        for fill in fills {
            self.settle(&req.instrument_id, fill);
        }

        placed.ok_or_else(|| ExchangeError::not_found(EntityKind::Order, id.to_string()))
    }

    fn settle(&mut self, instrument_id: &str, fill: Fill) {
        if let Some(instrument) = self.instruments.get_mut(instrument_id) {
            instrument.price = fill.price;
            if fill.seller_id == MARKET_MAKER_ID {
                instrument.supply = instrument.supply.saturating_sub(fill.quantity);
                debug!(instrument = instrument_id, qty = fill.quantity, remaining = instrument.supply, "Market-maker sold inventory");
            } else if fill.buyer_id == MARKET_MAKER_ID {
                instrument.supply += fill.quantity;
                debug!(instrument = instrument_id, qty = fill.quantity, available = instrument.supply, "Market-maker bought back inventory");
            }
        }

        self.ledger.settle(&fill.buyer_id, &fill.seller_id, instrument_id, fill.quantity, fill.price);
        self.history.record(instrument_id, fill.price);

        let id = self.next_tx_id;
        self.next_tx_id += 1;
        info!(
            buyer = %fill.buyer_id, seller = %fill.seller_id, instrument = instrument_id,
            buy_order = fill.buy_order_id, sell_order = fill.sell_order_id,
            qty = fill.quantity, price = %fill.price, "Trade executed"
        );
        self.transactions.push(Transaction {
            id,
            buyer_id: fill.buyer_id,
            seller_id: fill.seller_id,
            instrument_id: instrument_id.to_string(),
            price: fill.price,
            quantity: fill.quantity,
            executed_at: Utc::now(),
        });
        metrics::counter!("exsim_trades_total").increment(1);
    }

    fn open_orders(&self, scope: &Scope) -> ExchangeResult<Vec<Order>> {
        match scope {
            Scope::Instrument(id) => Ok(self.book(id)?.open_orders().cloned().collect()),
            Scope::Participant(id) => {
                self.ensure_participant(id)?;
                Ok(self
                    .books
                    .values()
                    .flat_map(OrderBook::open_orders)
                    .filter(|o| &o.participant_id == id)
                    .cloned()
                    .collect())
            }
        }
    }

    fn recent_transactions(&self, scope: &Scope, limit: usize) -> ExchangeResult<Vec<Transaction>> {
        let matches: Box<dyn Fn(&Transaction) -> bool + '_> = match scope {
            Scope::Instrument(id) => {
                self.instrument(id)?;
                Box::new(move |tx| &tx.instrument_id == id)
            }
            Scope::Participant(id) => {
                self.ensure_participant(id)?;
                Box::new(move |tx| &tx.buyer_id == id || &tx.seller_id == id)
            }
        };
        Ok(self
            .transactions
            .iter()
            .rev()
            .filter(|tx| matches(tx))
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Numeric ids sort numerically and ahead of everything else; the rest sort as strings.
fn id_order(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::seed::{InstrumentSeed, ParticipantSeed};
    use rust_decimal_macros::dec;

    fn seed() -> MarketSeed {
        MarketSeed {
            instruments: vec![
                InstrumentSeed { id: "X".into(), name: "X Corp".into(), price: dec!(100), supply: 1000 },
                InstrumentSeed { id: "Y".into(), name: "Y Corp".into(), price: dec!(50), supply: 200 },
            ],
            participants: vec![
                ParticipantSeed { id: "P".into(), name: "Pat".into(), cash: dec!(10000) },
                ParticipantSeed { id: "Q".into(), name: "Quinn".into(), cash: dec!(10000) },
                ParticipantSeed { id: "R".into(), name: "Robin".into(), cash: dec!(10000) },
            ],
        }
    }

    fn exchange() -> Exchange {
        let ex = Exchange::default();
        ex.load_initial_state(&seed()).unwrap();
        ex
    }

    fn req(who: &str, instrument: &str, side: Side, price: Decimal, quantity: u64) -> OrderRequest {
        OrderRequest {
            participant_id: who.into(),
            instrument_id: instrument.into(),
            side,
            price,
            quantity,
        }
    }

    fn maker_remaining(ex: &Exchange, instrument: &str) -> u64 {
        ex.list_open_orders(&Scope::Instrument(instrument.into()))
            .unwrap()
            .iter()
            .filter(|o| o.participant_id == MARKET_MAKER_ID)
            .map(|o| o.remaining)
            .sum()
    }

    #[test]
    fn test_load_creates_market_maker_orders() {
        let ex = exchange();
        assert_eq!(maker_remaining(&ex, "X"), 1000);
        assert_eq!(maker_remaining(&ex, "Y"), 200);
        assert_eq!(ex.price_samples("X", 5).unwrap(), vec![dec!(100)]);
    }

    #[test]
    fn test_buy_from_market_maker_executes_at_resting_price() {
        let ex = exchange();
        let order = ex.place_order(req("P", "X", Side::BUY, dec!(105), 10)).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.remaining, 0);

        let p = ex.participant("P").unwrap();
        assert_eq!(p.cash, dec!(9000));
        assert_eq!(p.holding("X"), 10);

        let txs = ex.recent_transactions(&Scope::Instrument("X".into()), 10).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].price, dec!(100));
        assert_eq!(txs[0].seller_id, MARKET_MAKER_ID);
        assert_eq!(maker_remaining(&ex, "X"), 990);

        let x = ex.instrument("X").unwrap();
        assert_eq!(x.supply, 990);
        assert_eq!(x.price, dec!(100));
    }

    #[test]
    fn test_sell_without_holdings_is_rejected() {
        let ex = exchange();
        let err = ex.place_order(req("Q", "X", Side::SELL, dec!(50), 5)).unwrap_err();
        assert_eq!(err, ExchangeError::InsufficientHoldings { holdings: 0, pending: 0, available: 0 });
        assert!(ex.list_open_orders(&Scope::Participant("Q".into())).unwrap().is_empty());
    }

    #[test]
    fn test_pending_sells_reduce_availability() {
        let ex = exchange();
        ex.place_order(req("R", "X", Side::BUY, dec!(100), 20)).unwrap();
        let first = ex.place_order(req("R", "X", Side::SELL, dec!(150), 10)).unwrap();
        assert_eq!(first.status, OrderStatus::Open);

        let err = ex.place_order(req("R", "X", Side::SELL, dec!(155), 15)).unwrap_err();
        assert_eq!(err, ExchangeError::InsufficientHoldings { holdings: 20, pending: 10, available: 10 });
        assert!(err.to_string().contains("have 20 shares, 10 already pending sale, only 10 available"));
    }

    #[test]
    fn test_market_maker_never_trades_with_itself() {
        let ex = exchange();
        let buy = ex.place_order(req(MARKET_MAKER_ID, "X", Side::BUY, dec!(105), 10)).unwrap();
        assert_eq!(buy.status, OrderStatus::Open);
        assert_eq!(maker_remaining(&ex, "X"), 1010);
        assert_eq!(ex.list_open_orders(&Scope::Instrument("X".into())).unwrap().len(), 2);
        assert!(ex.recent_transactions(&Scope::Instrument("X".into()), 10).unwrap().is_empty());
    }

    #[test]
    fn test_opposite_side_open_order_conflicts() {
        let ex = exchange();
        ex.place_order(req("R", "X", Side::BUY, dec!(100), 20)).unwrap();
        ex.place_order(req("R", "X", Side::SELL, dec!(150), 5)).unwrap();
        let err = ex.place_order(req("R", "X", Side::BUY, dec!(90), 1)).unwrap_err();
        assert!(matches!(err, ExchangeError::Conflict { existing: Side::SELL, .. }));
    }

    #[test]
    fn test_validation_runs_before_lookup() {
        let ex = exchange();
        let err = ex.place_order(req("nobody", "X", Side::BUY, dec!(0), 1)).unwrap_err();
        assert!(matches!(err, ExchangeError::Validation(_)));
        let err = ex.place_order(req("nobody", "X", Side::BUY, dec!(1), 0)).unwrap_err();
        assert!(matches!(err, ExchangeError::Validation(_)));
        let err = ex.place_order(req("nobody", "X", Side::BUY, dec!(1), 1)).unwrap_err();
        assert!(matches!(err, ExchangeError::NotFound { kind: EntityKind::Participant, .. }));
        let err = ex.place_order(req("P", "ZZZ", Side::BUY, dec!(1), 1)).unwrap_err();
        assert!(matches!(err, ExchangeError::NotFound { kind: EntityKind::Instrument, .. }));
    }

    #[test]
    fn test_oversized_notional_is_rejected_without_panicking() {
        let ex = exchange();
        let err = ex.place_order(req("P", "X", Side::BUY, dec!(7_000_000_000_000_000_000), 100_000_000_000)).unwrap_err();
        assert!(matches!(err, ExchangeError::Validation(_)));

        let err = ex.place_order(req("P", "X", Side::BUY, Decimal::MAX, u64::MAX)).unwrap_err();
        assert!(matches!(err, ExchangeError::Validation(_)));
        assert_eq!(ex.list_open_orders(&Scope::Participant("P".into())).unwrap().len(), 0);
    }

    #[test]
    fn test_market_maker_bid_is_bounded_so_settlement_cannot_overflow() {
        let ex = exchange();
        ex.place_order(req("P", "X", Side::BUY, dec!(100), 10)).unwrap();

        let huge = Decimal::MAX / dec!(5);
        let err = ex.place_order(req(MARKET_MAKER_ID, "X", Side::BUY, huge, 10)).unwrap_err();
        assert!(matches!(err, ExchangeError::Validation(_)));

        // the largest bid the maker may post still settles cleanly
        let price = MAX_ORDER_NOTIONAL / dec!(10);
        ex.place_order(req(MARKET_MAKER_ID, "X", Side::BUY, price, 10)).unwrap();
        let sold = ex.place_order(req("P", "X", Side::SELL, dec!(1), 10)).unwrap();
        assert_eq!(sold.status, OrderStatus::Filled);

        let p = ex.participant("P").unwrap();
        assert_eq!(p.holding("X"), 0);
        assert_eq!(p.cash, dec!(9000) + MAX_ORDER_NOTIONAL);
        assert_eq!(ex.instrument("X").unwrap().price, price);
        assert_eq!(ex.recent_transactions(&Scope::Participant("P".into()), 10).unwrap().len(), 2);
        assert!(ex.profit_loss("P").is_ok());
    }

    #[test]
    fn test_insufficient_funds() {
        let ex = exchange();
        let err = ex.place_order(req("P", "X", Side::BUY, dec!(101), 100)).unwrap_err();
        assert_eq!(err, ExchangeError::InsufficientFunds { required: dec!(10100), available: dec!(10000) });
    }

    #[test]
    fn test_trade_between_participants_moves_cash_and_price() {
        let ex = exchange();
        // drain the maker so R's ask is the only liquidity
        let all = ex.place_order(req("R", "Y", Side::BUY, dec!(50), 200)).unwrap();
        assert_eq!(all.status, OrderStatus::Filled);
        assert_eq!(ex.instrument("Y").unwrap().supply, 0);

        ex.place_order(req("R", "Y", Side::SELL, dec!(60), 5)).unwrap();
        let q = ex.place_order(req("Q", "Y", Side::BUY, dec!(65), 3)).unwrap();
        assert_eq!(q.status, OrderStatus::Filled);

        let txs = ex.recent_transactions(&Scope::Participant("R".into()), 10).unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].seller_id, "R");
        assert_eq!(txs[0].buyer_id, "Q");
        assert_eq!(txs[0].price, dec!(60));

        let r = ex.participant("R").unwrap();
        assert_eq!(r.holding("Y"), 197);
        assert_eq!(r.cash, dec!(180));
        assert_eq!(ex.participant("Q").unwrap().cash, dec!(9820));
        assert_eq!(ex.instrument("Y").unwrap().price, dec!(60));
        assert_eq!(ex.instrument("Y").unwrap().supply, 0);

        let open = ex.list_open_orders(&Scope::Participant("R".into())).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].remaining, 2);
    }

    #[test]
    fn test_cancel_order_lifecycle() {
        let ex = exchange();
        let resting = ex.place_order(req("P", "X", Side::BUY, dec!(90), 5)).unwrap();
        let cancelled = ex.cancel_order(resting.id).unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.remaining, 5);

        assert_eq!(ex.cancel_order(resting.id).unwrap_err(), ExchangeError::AlreadyClosed { order_id: resting.id });
        assert!(matches!(ex.cancel_order(9_999).unwrap_err(), ExchangeError::NotFound { kind: EntityKind::Order, .. }));

        let filled = ex.place_order(req("P", "X", Side::BUY, dec!(100), 1)).unwrap();
        assert_eq!(ex.cancel_order(filled.id).unwrap_err(), ExchangeError::AlreadyClosed { order_id: filled.id });
    }

    #[test]
    fn test_profit_loss_marks_to_market() {
        let ex = exchange();
        ex.place_order(req("P", "X", Side::BUY, dec!(100), 10)).unwrap();
        assert_eq!(ex.profit_loss("P").unwrap(), dec!(0));

        ex.perturb_prices(|i| if i.id == "X" { Some(dec!(110)) } else { None });
        assert_eq!(ex.profit_loss("P").unwrap(), dec!(100));
        assert!(ex.profit_loss("ghost").is_err());
    }

    #[test]
    fn test_register_participant_is_idempotent() {
        let ex = exchange();
        assert!(ex.register_participant("bot", "Bot", dec!(500)));
        assert!(!ex.register_participant("bot", "Other", dec!(1)));
        assert!(!ex.register_participant(MARKET_MAKER_ID, "Exchange", dec!(1)));
        assert_eq!(ex.participant("bot").unwrap().cash, dec!(500));
    }

    #[test]
    fn test_perturb_prices_skips_unchanged_and_non_positive() {
        let ex = exchange();
        let changes = ex.perturb_prices(|i| match i.id.as_str() {
            "X" => Some(dec!(100)),
            _ => Some(dec!(-1)),
        });
        assert!(changes.is_empty());
        assert_eq!(ex.instrument("Y").unwrap().price, dec!(50));
        assert_eq!(ex.price_samples("X", 5).unwrap(), vec![dec!(100), dec!(100)]);
    }

    #[test]
    fn test_listing_orders_numeric_ids_numerically() {
        let ex = Exchange::default();
        let mk = |id: &str| InstrumentSeed { id: id.into(), name: id.into(), price: dec!(1), supply: 0 };
        ex.load_initial_state(&MarketSeed {
            instruments: vec![mk("10"), mk("2"), mk("B"), mk("1"), mk("A")],
            participants: vec![],
        })
        .unwrap();
        let ids: Vec<_> = ex.list_instruments().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["1", "2", "10", "A", "B"]);
    }

    #[test]
    fn test_recent_transactions_newest_first_and_limited() {
        let ex = exchange();
        for _ in 0..3 {
            ex.place_order(req("P", "X", Side::BUY, dec!(100), 1)).unwrap();
        }
        let txs = ex.recent_transactions(&Scope::Participant("P".into()), 2).unwrap();
        assert_eq!(txs.len(), 2);
        assert!(txs[0].id > txs[1].id);

        let detail = ex.instrument_detail("X", 10).unwrap();
        assert_eq!(detail.last_transactions.len(), 3);
        assert_eq!(detail.open_orders.len(), 1);
    }

    #[test]
    fn test_seed_rejects_non_positive_price() {
        let ex = Exchange::default();
        let bad = MarketSeed {
            instruments: vec![InstrumentSeed { id: "Z".into(), name: "Z".into(), price: dec!(0), supply: 1 }],
            participants: vec![],
        };
        assert!(matches!(ex.load_initial_state(&bad), Err(ExchangeError::Validation(_))));
        assert!(ex.list_instruments().is_empty());
    }

    #[test]
    fn test_seed_rejects_unbounded_opening_quote() {
        let ex = Exchange::default();
        let bad = MarketSeed {
            instruments: vec![InstrumentSeed { id: "Z".into(), name: "Z".into(), price: Decimal::MAX, supply: 2 }],
            participants: vec![],
        };
        assert!(matches!(ex.load_initial_state(&bad), Err(ExchangeError::Validation(_))));
        assert!(ex.list_instruments().is_empty());
    }
}
