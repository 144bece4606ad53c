//! Opening market state, parsed from the JSON seed file.
//!
//! The field aliases accept the historical `shares`/`traders` layout as well as the
//! `instruments`/`participants` one.

use std::path::Path;

use anyhow::Context;
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstrumentSeed {
    pub id: String,
    pub name: String,
    #[serde(alias = "currentPrice")]
    pub price: Decimal,
    #[serde(alias = "amount")]
    pub supply: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ParticipantSeed {
    pub id: String,
    pub name: String,
    #[serde(alias = "money")]
    pub cash: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MarketSeed {
    #[serde(default, alias = "shares")]
    pub instruments: Vec<InstrumentSeed>,
    #[serde(default, alias = "traders")]
    pub participants: Vec<ParticipantSeed>,
}

impl MarketSeed {
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading seed file {}", path.display()))?;
        Ok(Self::from_json_str(&raw)?)
    }
}
