//! Runtime settings: built-in defaults, then an optional TOML file, then `EXSIM__*`
//! environment variables, then command-line flags.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::agents::{default_roster, AgentConfig, SignalSource};
use crate::engine::history::DEFAULT_HISTORY_CAPACITY;
use crate::market_data::broadcaster::DEFAULT_QUEUE_CAPACITY;
use crate::market_data::oscillator::DEFAULT_MAX_SHOCK;

pub const DEFAULT_CONFIG_FILE: &str = "config/exsim.toml";
pub const ENV_PREFIX: &str = "EXSIM";

#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about = "Continuous double-auction market simulator", long_about = None)]
pub struct Cli {
    /// Settings file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Market seed file (JSON)
    #[arg(short, long)]
    pub seed: Option<PathBuf>,

    /// Address the HTTP server binds to
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long)]
    pub log: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub listen: String,
    /// Prometheus scrape endpoint, only bound with the `metrics-exporter` feature.
    pub metrics_listen: String,
    pub log: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            listen: "0.0.0.0:8080".into(),
            metrics_listen: "0.0.0.0:9000".into(),
            log: "info,exsim_rs=debug".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MarketSettings {
    pub seed_file: PathBuf,
}

impl Default for MarketSettings {
    fn default() -> Self {
        MarketSettings { seed_file: PathBuf::from("config/market.json") }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OscillatorSettings {
    pub interval_ms: u64,
    pub max_shock: f64,
    /// Fixed RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
}

impl Default for OscillatorSettings {
    fn default() -> Self {
        OscillatorSettings { interval_ms: 10_000, max_shock: DEFAULT_MAX_SHOCK, rng_seed: None }
    }
}

impl OscillatorSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BroadcasterSettings {
    pub interval_ms: u64,
    pub queue_capacity: usize,
}

impl Default for BroadcasterSettings {
    fn default() -> Self {
        BroadcasterSettings { interval_ms: 2_000, queue_capacity: DEFAULT_QUEUE_CAPACITY }
    }
}

impl BroadcasterSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    pub capacity: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        HistorySettings { capacity: DEFAULT_HISTORY_CAPACITY }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub enabled: bool,
    pub tick_interval_ms: u64,
    pub signal_source: SignalSource,
    pub roster: Vec<AgentConfig>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        AgentSettings {
            enabled: true,
            tick_interval_ms: 5_000,
            signal_source: SignalSource::History,
            roster: default_roster(),
        }
    }
}

impl AgentSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub market: MarketSettings,
    pub oscillator: OscillatorSettings,
    pub broadcaster: BroadcasterSettings,
    pub history: HistorySettings,
    pub agents: AgentSettings,
}

impl Settings {
    /// Layer every source. A missing default file is fine; a missing explicit one is not.
    pub fn load(cli: &Cli) -> anyhow::Result<Settings> {
        let file = match &cli.config {
            Some(path) => config::File::from(path.clone()).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let builder = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .set_override_option("server.listen", cli.listen.clone())?
            .set_override_option("server.log", cli.log.clone())?
            .set_override_option(
                "market.seed_file",
                cli.seed.as_ref().map(|p| p.to_string_lossy().into_owned()),
            )?;

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.oscillator.interval_ms > 0, "oscillator.interval_ms must be positive");
        anyhow::ensure!(self.broadcaster.interval_ms > 0, "broadcaster.interval_ms must be positive");
        anyhow::ensure!(self.agents.tick_interval_ms > 0, "agents.tick_interval_ms must be positive");
        anyhow::ensure!(
            (0.0..1.0).contains(&self.oscillator.max_shock),
            "oscillator.max_shock must be in [0, 1)"
        );
        anyhow::ensure!(self.broadcaster.queue_capacity > 0, "broadcaster.queue_capacity must be positive");
        Ok(())
    }
}
