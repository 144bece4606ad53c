use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use exsim_rs::agents::AgentPool;
use exsim_rs::api::{self, AppState};
use exsim_rs::config::{Cli, Settings};
use exsim_rs::engine::seed::MarketSeed;
use exsim_rs::engine::Exchange;
use exsim_rs::market_data::{Broadcaster, PriceOscillator};
use exsim_rs::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env

    let cli = Cli::parse();
    let settings = Settings::load(&cli).context("loading settings")?;

    telemetry::init_tracing(&settings.server.log);
    let metrics_addr: SocketAddr = settings
        .server
        .metrics_listen
        .parse()
        .with_context(|| format!("invalid metrics address {}", settings.server.metrics_listen))?;
    telemetry::init_metrics(metrics_addr)?;

    // 1) Seed the market
    let seed = MarketSeed::from_json_file(&settings.market.seed_file)?;
    let exchange = Exchange::new(settings.history.capacity);
    exchange.load_initial_state(&seed)?;

    // 2) Agents trade through the same order entry as everyone else
    let agents = AgentPool::new(exchange.clone(), settings.agents.signal_source);
    for config in settings.agents.roster.iter().cloned() {
        agents.add(config);
    }

    // 3) Background tasks
    let rng = match settings.oscillator.rng_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let oscillator = PriceOscillator::new(exchange.clone(), rng, settings.oscillator.max_shock)
        .spawn(settings.oscillator.interval());
    let agent_task = settings
        .agents
        .enabled
        .then(|| agents.clone().spawn(settings.agents.tick_interval()));

    let broadcaster = Broadcaster::new(
        exchange.clone(),
        settings.broadcaster.interval(),
        settings.broadcaster.queue_capacity,
    );

    // 4) Serve until Ctrl-C
    let app = api::router(AppState {
        exchange: exchange.clone(),
        agents: agents.clone(),
        broadcaster: broadcaster.clone(),
    });
    let listener = tokio::net::TcpListener::bind(&settings.server.listen)
        .await
        .with_context(|| format!("binding {}", settings.server.listen))?;
    info!(addr = %settings.server.listen, instruments = seed.instruments.len(), "Exchange simulator listening");

    let on_shutdown = broadcaster.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
            // closes every WebSocket stream so connections can drain
            on_shutdown.shutdown();
        })
        .await?;

    // 5) Tear down
    if let Some(task) = agent_task {
        task.stop().await;
    }
    oscillator.stop().await;
    info!("Bye");
    Ok(())
}
