pub mod engine;
pub mod market_data;
pub mod agents;
pub mod api;
pub mod config;
pub mod tasks;
pub mod telemetry;
