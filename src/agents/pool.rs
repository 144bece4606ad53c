use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, trace, warn};

use crate::agents::signal::SignalSource;
use crate::agents::strategy::{evaluate, Intent, MarketView, Sizing, Strategy};
use crate::engine::{Exchange, OrderRequest};
use crate::tasks::{spawn_periodic, TaskHandle};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("agent not found: {0}")]
    NotFound(String),
    #[error("agent {0} is already running")]
    AlreadyRunning(String),
    #[error("agent {0} is not running")]
    NotRunning(String),
}

impl AgentError {
    pub fn reason(&self) -> &'static str {
        match self {
            AgentError::NotFound(_) => "not_found",
            AgentError::AlreadyRunning(_) => "already_running",
            AgentError::NotRunning(_) => "not_running",
        }
    }
}

fn default_active() -> bool {
    true
}

/// Static description of one agent, as read from the settings roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    pub strategy: Strategy,
    #[serde(flatten)]
    pub sizing: Sizing,
    /// Minimum gap between two orders on the same instrument; 0 disables.
    #[serde(default)]
    pub cooldown_secs: u64,
    pub initial_cash: Decimal,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub id: String,
    pub name: String,
    pub strategy: Strategy,
    pub active: bool,
    pub orders_placed: u64,
    pub profit_loss: Decimal,
    pub last_action: Option<DateTime<Utc>>,
    pub config: AgentConfig,
}

#[derive(Debug)]
struct Agent {
    config: AgentConfig,
    active: bool,
    orders_placed: u64,
    profit_loss: Decimal,
    last_action: Option<DateTime<Utc>>,
    // last accepted order per instrument
    last_order_at: AHashMap<String, DateTime<Utc>>,
}

impl Agent {
    fn status(&self) -> AgentStatus {
        AgentStatus {
            id: self.config.id.clone(),
            name: self.config.name.clone(),
            strategy: self.config.strategy,
            active: self.active,
            orders_placed: self.orders_placed,
            profit_loss: self.profit_loss,
            last_action: self.last_action,
            config: self.config.clone(),
        }
    }
}

fn cooling_down(last_order_at: &AHashMap<String, DateTime<Utc>>, cooldown_secs: u64, instrument_id: &str, now: DateTime<Utc>) -> bool {
    let Some(at) = last_order_at.get(instrument_id) else {
        return false;
    };
    // a cooldown too long to represent never expires
    i64::try_from(cooldown_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|cooldown| at.checked_add_signed(cooldown))
        .map_or(true, |until| now < until)
}

// What one agent did during a tick, applied back under the agents lock
struct TickOutcome {
    id: String,
    orders: u64,
    ordered: Vec<String>,
    profit_loss: Option<Decimal>,
}

/// Autonomous participants trading through the public order entry on a fixed schedule.
#[derive(Clone)]
pub struct AgentPool {
    exchange: Exchange,
    signal: SignalSource,
    agents: Arc<RwLock<Vec<Agent>>>,
}

impl AgentPool {
    pub fn new(exchange: Exchange, signal: SignalSource) -> Self {
        AgentPool { exchange, signal, agents: Arc::new(RwLock::new(Vec::new())) }
    }

    /// Add an agent and register it as a participant. Returns false if the id is taken.
    pub fn add(&self, config: AgentConfig) -> bool {
        if self.agents.read().iter().any(|a| a.config.id == config.id) {
            warn!(id = %config.id, "Agent already registered");
            return false;
        }
        if !self.exchange.register_participant(&config.id, &config.name, config.initial_cash) {
            debug!(id = %config.id, "Agent reuses an existing participant account");
        }

        info!(id = %config.id, strategy = ?config.strategy, active = config.active, "Agent added");
        let mut agents = self.agents.write();
        if agents.iter().any(|a| a.config.id == config.id) {
            return false;
        }
        agents.push(Agent {
            active: config.active,
            config,
            orders_placed: 0,
            profit_loss: Decimal::ZERO,
            last_action: None,
            last_order_at: AHashMap::new(),
        });
        true
    }

    pub fn list(&self) -> Vec<AgentStatus> {
        self.agents.read().iter().map(Agent::status).collect()
    }

    pub fn get(&self, id: &str) -> Result<AgentStatus, AgentError> {
        self.agents
            .read()
            .iter()
            .find(|a| a.config.id == id)
            .map(Agent::status)
            .ok_or_else(|| AgentError::NotFound(id.to_string()))
    }

    pub fn start(&self, id: &str) -> Result<AgentStatus, AgentError> {
        self.update(id, |agent| {
            if agent.active {
                return Err(AgentError::AlreadyRunning(agent.config.id.clone()));
            }
            agent.active = true;
            Ok(())
        })
    }

    pub fn stop(&self, id: &str) -> Result<AgentStatus, AgentError> {
        self.update(id, |agent| {
            if !agent.active {
                return Err(AgentError::NotRunning(agent.config.id.clone()));
            }
            agent.active = false;
            Ok(())
        })
    }

    pub fn toggle(&self, id: &str) -> Result<AgentStatus, AgentError> {
        self.update(id, |agent| {
            agent.active = !agent.active;
            Ok(())
        })
    }

    fn update<F>(&self, id: &str, f: F) -> Result<AgentStatus, AgentError>
    where
        F: FnOnce(&mut Agent) -> Result<(), AgentError>,
    {
        let mut agents = self.agents.write();
        let agent = agents
            .iter_mut()
            .find(|a| a.config.id == id)
            .ok_or_else(|| AgentError::NotFound(id.to_string()))?;
        f(agent)?;
        info!(id, active = agent.active, "Agent state changed");
        Ok(agent.status())
    }

    /// Run every active agent once against the current market. Returns the number of
    /// orders the exchange accepted.
    #[instrument(skip(self))]
    pub fn tick(&self, now: DateTime<Utc>) -> u64 {
        // snapshot under the agents lock, trade without it
        let snapshot: Vec<(AgentConfig, AHashMap<String, DateTime<Utc>>)> = self
            .agents
            .read()
            .iter()
            .filter(|a| a.active)
            .map(|a| (a.config.clone(), a.last_order_at.clone()))
            .collect();
        if snapshot.is_empty() {
            trace!("No active agents");
            return 0;
        }

        let instruments = self.exchange.list_instruments();
        let mut outcomes = Vec::with_capacity(snapshot.len());

        for (config, last_order_at) in snapshot {
            let mut outcome = TickOutcome { id: config.id.clone(), orders: 0, ordered: Vec::new(), profit_loss: None };

            for instrument in &instruments {
                if cooling_down(&last_order_at, config.cooldown_secs, &instrument.id, now) {
                    trace!(agent = %config.id, instrument = %instrument.id, "Cooling down");
                    continue;
                }
                let participant = match self.exchange.participant(&config.id) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(agent = %config.id, error = %e, "Agent has no account");
                        break;
                    }
                };

                let samples = self.signal.samples(&self.exchange, instrument, config.strategy.window(), now);
                if samples.len() < config.strategy.min_samples() {
                    debug!(agent = %config.id, instrument = %instrument.id, samples = samples.len(), "Not enough price history");
                    continue;
                }

                let view = MarketView {
                    price: instrument.price,
                    samples: &samples,
                    cash: participant.cash,
                    holdings: participant.holding(&instrument.id),
                };
                let Some(intent) = evaluate(config.strategy, &config.sizing, &view) else {
                    continue;
                };

                if self.submit(&config, &instrument.id, &intent) {
                    outcome.orders += 1;
                    outcome.ordered.push(instrument.id.clone());
                }
            }

            outcome.profit_loss = self.exchange.profit_loss(&config.id).ok();
            outcomes.push(outcome);
        }

        let accepted = outcomes.iter().map(|o| o.orders).sum();
        let mut agents = self.agents.write();
        for outcome in outcomes {
            let Some(agent) = agents.iter_mut().find(|a| a.config.id == outcome.id) else {
                continue;
            };
            agent.orders_placed += outcome.orders;
            if outcome.orders > 0 {
                agent.last_action = Some(now);
            }
            for instrument_id in outcome.ordered {
                agent.last_order_at.insert(instrument_id, now);
            }
            if let Some(pnl) = outcome.profit_loss {
                agent.profit_loss = pnl;
            }
        }
        accepted
    }

    fn submit(&self, config: &AgentConfig, instrument_id: &str, intent: &Intent) -> bool {
        let req = OrderRequest {
            participant_id: config.id.clone(),
            instrument_id: instrument_id.to_string(),
            side: intent.side,
            price: intent.price,
            quantity: intent.quantity,
        };
        match self.exchange.place_order(req) {
            Ok(order) => {
                info!(
                    agent = %config.id, instrument = instrument_id, side = ?intent.side,
                    qty = intent.quantity, price = %intent.price, status = ?order.status, "Agent order placed"
                );
                metrics::counter!("exsim_agent_orders_total", "agent" => config.id.clone()).increment(1);
                true
            }
            Err(e) => {
                warn!(agent = %config.id, instrument = instrument_id, side = ?intent.side, error = %e, "Agent order failed");
                false
            }
        }
    }

    pub fn spawn(self, period: Duration) -> TaskHandle {
        spawn_periodic("agent-pool", period, move || {
            let accepted = self.tick(Utc::now());
            debug!(accepted, "Agent tick done");
            ControlFlow::Continue(())
        })
    }
}

/// The two bots the simulator ships with.
pub fn default_roster() -> Vec<AgentConfig> {
    use rust_decimal_macros::dec;

    vec![
        AgentConfig {
            id: "momentum-bot-1".into(),
            name: "Momentum Hunter".into(),
            strategy: Strategy::Momentum,
            sizing: Sizing {
                max_order_value: dec!(5000),
                min_order_value: dec!(100),
                risk_fraction: dec!(0.10),
                threshold: dec!(0.025),
            },
            cooldown_secs: 30,
            initial_cash: dec!(50000),
            active: true,
        },
        AgentConfig {
            id: "contrarian-bot-1".into(),
            name: "Contrarian Trader".into(),
            strategy: Strategy::Contrarian,
            sizing: Sizing {
                max_order_value: dec!(3000),
                min_order_value: dec!(200),
                risk_fraction: dec!(0.15),
                threshold: dec!(0.007),
            },
            cooldown_secs: 45,
            initial_cash: dec!(40000),
            active: true,
        },
    ]
}
