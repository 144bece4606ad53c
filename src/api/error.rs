use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::agents::AgentError;
use crate::engine::ExchangeError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Exchange(e) => match e {
                ExchangeError::Validation(_) => StatusCode::BAD_REQUEST,
                ExchangeError::NotFound { .. } => StatusCode::NOT_FOUND,
                ExchangeError::Conflict { .. } | ExchangeError::AlreadyClosed { .. } => StatusCode::CONFLICT,
                ExchangeError::InsufficientFunds { .. } | ExchangeError::InsufficientHoldings { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
            },
            ApiError::Agent(AgentError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Agent(_) => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Exchange(e) => e.reason(),
            ApiError::Agent(e) => e.reason(),
            ApiError::BadRequest(_) => "bad_request",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.code(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EntityKind;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::from(ExchangeError::Validation("x".into())), StatusCode::BAD_REQUEST),
            (ExchangeError::NotFound { kind: EntityKind::Order, id: "1".into() }.into(), StatusCode::NOT_FOUND),
            (ExchangeError::AlreadyClosed { order_id: 1 }.into(), StatusCode::CONFLICT),
            (
                ExchangeError::InsufficientFunds { required: dec!(2), available: dec!(1) }.into(),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (AgentError::AlreadyRunning("a".into()).into(), StatusCode::CONFLICT),
            (AgentError::NotFound("a".into()).into(), StatusCode::NOT_FOUND),
            (ApiError::BadRequest("nope".into()), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err}");
        }
    }

    #[test]
    fn test_message_is_domain_text() {
        let err = ApiError::from(ExchangeError::InsufficientHoldings { holdings: 0, pending: 0, available: 0 });
        assert_eq!(err.code(), "insufficient_holdings");
        assert!(err.to_string().starts_with("insufficient holdings"));
    }
}
