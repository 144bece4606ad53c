use std::collections::BTreeMap;

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use exsim_rs::engine::seed::{InstrumentSeed, MarketSeed, ParticipantSeed};
use exsim_rs::engine::{Exchange, OrderRequest, OrderStatus, Scope, Side, MARKET_MAKER_ID};

const PARTICIPANTS: [&str; 4] = ["p1", "p2", "p3", MARKET_MAKER_ID];
const INSTRUMENTS: [&str; 2] = ["X", "Y"];
const OPENING_SUPPLY: u64 = 50;
const OPENING_CASH: Decimal = dec!(5000);

#[derive(Debug, Clone)]
enum Op {
    Place { who: usize, instrument: usize, buy: bool, price: u32, quantity: u64 },
    Cancel { id: u64 },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..PARTICIPANTS.len(), 0..INSTRUMENTS.len(), any::<bool>(), 90u32..=110, 1u64..=20)
            .prop_map(|(who, instrument, buy, price, quantity)| Op::Place { who, instrument, buy, price, quantity }),
        1 => (1u64..80).prop_map(|id| Op::Cancel { id }),
    ]
}

fn exchange() -> Exchange {
    let ex = Exchange::default();
    ex.load_initial_state(&MarketSeed {
        instruments: INSTRUMENTS
            .iter()
            .map(|id| InstrumentSeed { id: id.to_string(), name: id.to_string(), price: dec!(100), supply: OPENING_SUPPLY })
            .collect(),
        participants: PARTICIPANTS[..3]
            .iter()
            .map(|id| ParticipantSeed { id: id.to_string(), name: id.to_string(), cash: OPENING_CASH })
            .collect(),
    })
    .unwrap();
    ex
}

fn check_invariants(ex: &Exchange) {
    for who in &PARTICIPANTS[..3] {
        let participant = ex.participant(who).unwrap();
        let open = ex.list_open_orders(&Scope::Participant(who.to_string())).unwrap();
        let txs = ex.recent_transactions(&Scope::Participant(who.to_string()), usize::MAX).unwrap();

        let mut net: BTreeMap<&str, i64> = BTreeMap::new();
        let mut cash = OPENING_CASH;
        for tx in &txs {
            assert_ne!(tx.buyer_id, tx.seller_id, "self-trade executed");
            let notional = tx.price * Decimal::from(tx.quantity);
            if tx.buyer_id == *who {
                *net.entry(tx.instrument_id.as_str()).or_default() += tx.quantity as i64;
                cash -= notional;
            } else {
                *net.entry(tx.instrument_id.as_str()).or_default() -= tx.quantity as i64;
                cash += notional;
            }
        }
        assert_eq!(participant.cash, cash, "cash does not reconcile for {who}");

        for instrument in INSTRUMENTS {
            let held = participant.holding(instrument);
            assert_eq!(held as i64, net.get(instrument).copied().unwrap_or(0), "holdings drift for {who}/{instrument}");

            let mine: Vec<_> = open.iter().filter(|o| o.instrument_id == instrument).collect();
            let buys = mine.iter().any(|o| o.side == Side::BUY);
            let sells: u64 = mine.iter().filter(|o| o.side == Side::SELL).map(|o| o.remaining).sum();
            assert!(!(buys && sells > 0), "{who} quotes both sides of {instrument}");
            assert!(sells <= held, "{who} has {sells} pending against {held} held in {instrument}");
        }
    }

    for instrument in INSTRUMENTS {
        for order in ex.list_open_orders(&Scope::Instrument(instrument.to_string())).unwrap() {
            assert_eq!(order.status, OrderStatus::Open);
            assert!(order.remaining > 0 && order.remaining <= order.quantity);
        }

        let maker_net: i64 = ex
            .recent_transactions(&Scope::Instrument(instrument.to_string()), usize::MAX)
            .unwrap()
            .iter()
            .map(|tx| {
                if tx.seller_id == MARKET_MAKER_ID {
                    tx.quantity as i64
                } else if tx.buyer_id == MARKET_MAKER_ID {
                    -(tx.quantity as i64)
                } else {
                    0
                }
            })
            .sum();
        let supply = ex.instrument(instrument).unwrap().supply as i64;
        assert_eq!(supply, OPENING_SUPPLY as i64 - maker_net, "supply drift for {instrument}");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_interleavings_keep_book_consistent(ops in prop::collection::vec(op(), 1..120)) {
        let ex = exchange();
        for op in ops {
            match op {
                Op::Place { who, instrument, buy, price, quantity } => {
                    let req = OrderRequest {
                        participant_id: PARTICIPANTS[who].to_string(),
                        instrument_id: INSTRUMENTS[instrument].to_string(),
                        // the maker only posts bids; its asks are the seeded inventory
                        side: if buy || PARTICIPANTS[who] == MARKET_MAKER_ID { Side::BUY } else { Side::SELL },
                        price: Decimal::from(price),
                        quantity,
                    };
                    if let Ok(order) = ex.place_order(req) {
                        prop_assert!(order.remaining <= order.quantity);
                        prop_assert_eq!(order.status == OrderStatus::Filled, order.remaining == 0);
                        prop_assert_ne!(order.status, OrderStatus::Cancelled);
                    }
                }
                Op::Cancel { id } => {
                    if let Ok(order) = ex.cancel_order(id) {
                        prop_assert_eq!(order.status, OrderStatus::Cancelled);
                        prop_assert!(order.remaining > 0);
                        prop_assert!(ex.cancel_order(id).is_err());
                    }
                }
            }
            check_invariants(&ex);
        }
    }
}

#[test]
fn market_maker_may_quote_both_sides_without_trading_itself() {
    let ex = exchange();
    let bid = ex
        .place_order(OrderRequest {
            participant_id: MARKET_MAKER_ID.into(),
            instrument_id: "X".into(),
            side: Side::BUY,
            price: dec!(120),
            quantity: 5,
        })
        .unwrap();
    assert_eq!(bid.status, OrderStatus::Open);

    let open = ex.list_open_orders(&Scope::Instrument("X".into())).unwrap();
    assert_eq!(open.len(), 2);
    assert!(open.iter().all(|o| o.participant_id == MARKET_MAKER_ID));
    assert!(ex.recent_transactions(&Scope::Instrument("X".into()), 10).unwrap().is_empty());
}
