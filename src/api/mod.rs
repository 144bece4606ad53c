//! HTTP and WebSocket surface. Every handler maps onto one exchange or agent-pool call.

pub mod error;
pub mod routes;
pub mod ws;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::agents::AgentPool;
use crate::engine::Exchange;
use crate::market_data::Broadcaster;

pub use error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub exchange: Exchange,
    pub agents: AgentPool,
    pub broadcaster: Broadcaster,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/instruments", get(routes::list_instruments))
        .route("/instruments/:id", get(routes::get_instrument))
        .route("/instruments/:id/history", get(routes::instrument_history))
        .route("/orders", post(routes::place_order))
        .route("/orders/:id", delete(routes::cancel_order))
        .route("/participants", get(routes::list_participants))
        .route("/participants/:id", get(routes::get_participant))
        .route("/participants/:id/transactions", get(routes::participant_transactions))
        .route("/agents", get(routes::list_agents))
        .route("/agents/:id/start", post(routes::start_agent))
        .route("/agents/:id/stop", post(routes::stop_agent))
        .route("/agents/:id/toggle", post(routes::toggle_agent));

    Router::new()
        .route("/health", get(routes::health))
        .route("/ws", get(ws::ws_handler))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
