use crate::models::League;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;

/// Failures of the persistence layer
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to access snapshot file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to (de)serialize snapshot: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("no pick with id {0}")]
    UnknownPick(u64),
}

/// Failures talking to the score provider. Always recovered per game.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned status {0}")]
    Status(u16),
    #[error("malformed provider payload: {0}")]
    Malformed(String),
}

/// Errors surfaced by the REST layer
#[derive(Debug, thiserror::Error)]
pub enum PickemError {
    #[error("{0}")]
    Validation(String),
    #[error("picks for {league} week {week} locked at {locked_at}")]
    Locked {
        week: u32,
        league: League,
        locked_at: DateTime<Utc>,
    },
    #[error("{0}")]
    NotFound(String),
    #[error("missing or invalid admin token")]
    Unauthorized,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("score provider unavailable: {0}")]
    Provider(#[from] ProviderError),
}

// Bodies that fail to parse are validation errors, not policy violations
impl From<JsonRejection> for PickemError {
    fn from(rejection: JsonRejection) -> Self {
        PickemError::Validation(rejection.body_text())
    }
}

impl PickemError {
    fn code(&self) -> &'static str {
        match self {
            PickemError::Validation(_) => "invalid_request",
            PickemError::Locked { .. } => "picks_locked",
            PickemError::NotFound(_) => "not_found",
            PickemError::Unauthorized => "unauthorized",
            PickemError::Store(_) => "storage_failure",
            PickemError::Provider(_) => "provider_unavailable",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            PickemError::Validation(_) => StatusCode::BAD_REQUEST,
            PickemError::Locked { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PickemError::NotFound(_) => StatusCode::NOT_FOUND,
            PickemError::Unauthorized => StatusCode::UNAUTHORIZED,
            PickemError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PickemError::Provider(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for PickemError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let mut body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        if let PickemError::Locked { locked_at, .. } = &self {
            body["locked_at"] = json!(locked_at);
        }

        (status, Json(body)).into_response()
    }
}

pub type PickemResult<T> = std::result::Result<T, PickemError>;
