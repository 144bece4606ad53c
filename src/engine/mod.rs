// Matching engine entrypoint
pub mod types;
pub mod error;
pub mod book;       // per-instrument insertion-ordered bids/asks and crossing
pub mod ledger;     // participant cash and holdings
pub mod history;    // bounded price samples per instrument
pub mod seed;       // opening state from the JSON seed file
pub mod exchange;   // the locked aggregate every caller goes through

pub use error::{EntityKind, ExchangeError, ExchangeResult};
pub use exchange::{Exchange, PriceChange};
pub use types::*;
