//! API error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::domain::error::OrchestratorError;

/// Orchestrator rejection rendered as `{error, code}`.
#[derive(Debug)]
pub struct ApiError(pub OrchestratorError);

impl ApiError {
    /// 409 for caller-recoverable rejections, 500 for internal failures.
    pub const fn status(&self) -> StatusCode {
        match self.0 {
            OrchestratorError::CapacityExceeded { .. } | OrchestratorError::AlreadyRunning { .. } => {
                StatusCode::CONFLICT
            }
            OrchestratorError::LaunchFailed { .. } | OrchestratorError::PortConflict { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.0.to_string(),
            "code": self.0.code(),
        }));
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let conflict = ApiError(OrchestratorError::CapacityExceeded { running: 5, max: 5 });
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let running = ApiError(OrchestratorError::AlreadyRunning {
            strategy_id: 1,
            port: 8082,
        });
        assert_eq!(running.status(), StatusCode::CONFLICT);

        let launch = ApiError(OrchestratorError::LaunchFailed {
            strategy_id: 1,
            reason: "no such file".to_string(),
        });
        assert_eq!(launch.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(launch.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
