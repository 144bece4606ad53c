use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agents::AgentStatus;
use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::engine::ledger::Participant;
use crate::engine::{Instrument, InstrumentDetail, Order, OrderId, OrderRequest, ParticipantSummary, Scope, Transaction};

const DETAIL_TRANSACTIONS: usize = 10;
const PARTICIPANT_TRANSACTIONS: usize = 8;
const DEFAULT_HISTORY_POINTS: usize = 32;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub instruments: usize,
    pub subscribers: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        instruments: state.exchange.list_instruments().len(),
        subscribers: state.broadcaster.subscriber_count(),
    })
}

pub async fn list_instruments(State(state): State<AppState>) -> Json<Vec<Instrument>> {
    Json(state.exchange.list_instruments())
}

pub async fn get_instrument(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<InstrumentDetail>> {
    Ok(Json(state.exchange.instrument_detail(&id, DETAIL_TRANSACTIONS)?))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceHistoryView {
    pub instrument_id: String,
    pub prices: Vec<Decimal>,
}

pub async fn instrument_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<PriceHistoryView>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_POINTS);
    let prices = state.exchange.price_samples(&id, limit)?;
    Ok(Json(PriceHistoryView { instrument_id: id, prices }))
}

pub async fn place_order(
    State(state): State<AppState>,
    payload: Result<Json<OrderRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Order>)> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let order = state.exchange.place_order(req)?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> ApiResult<Json<Order>> {
    Ok(Json(state.exchange.cancel_order(id)?))
}

pub async fn list_participants(State(state): State<AppState>) -> Json<Vec<ParticipantSummary>> {
    Json(state.exchange.list_participants())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    #[serde(flatten)]
    pub participant: Participant,
    pub open_orders: Vec<Order>,
}

pub async fn get_participant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ParticipantView>> {
    let participant = state.exchange.participant(&id)?;
    let open_orders = state.exchange.list_open_orders(&Scope::Participant(id))?;
    Ok(Json(ParticipantView { participant, open_orders }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantActivity {
    pub transactions: Vec<Transaction>,
    pub profit_loss: Decimal,
}

pub async fn participant_transactions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ParticipantActivity>> {
    let transactions = state
        .exchange
        .recent_transactions(&Scope::Participant(id.clone()), PARTICIPANT_TRANSACTIONS)?;
    let profit_loss = state.exchange.profit_loss(&id)?;
    Ok(Json(ParticipantActivity { transactions, profit_loss }))
}

pub async fn list_agents(State(state): State<AppState>) -> Json<Vec<AgentStatus>> {
    Json(state.agents.list())
}

pub async fn start_agent(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<AgentStatus>> {
    debug!(%id, "Start requested");
    Ok(Json(state.agents.start(&id)?))
}

pub async fn stop_agent(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<AgentStatus>> {
    debug!(%id, "Stop requested");
    Ok(Json(state.agents.stop(&id)?))
}

pub async fn toggle_agent(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<AgentStatus>> {
    debug!(%id, "Toggle requested");
    Ok(Json(state.agents.toggle(&id)?))
}
