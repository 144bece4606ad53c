// Autonomous trading agents
pub mod strategy;   // pure momentum / contrarian evaluation
pub mod signal;     // recent price samples: real history or synthetic waves
pub mod pool;       // scheduled pool driving every active agent

pub use pool::{default_roster, AgentConfig, AgentError, AgentPool, AgentStatus};
pub use signal::SignalSource;
pub use strategy::{Sizing, Strategy};
