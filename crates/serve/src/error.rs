use axum::http::StatusCode;

/// An error response: an HTTP status wrapping an `anyhow::Error`. Handlers
/// return `Result<Json<T>, ApiError>`; database errors default to 503 since
/// the only relational failure the surface can meaningfully report is
/// unavailability.
#[derive(Debug, thiserror::Error)]
#[error("status: {status}, error: {error}")]
pub struct ApiError {
    pub status: StatusCode,
    #[source]
    pub error: anyhow::Error,
}

impl ApiError {
    pub fn new(status: StatusCode, error: anyhow::Error) -> ApiError {
        ApiError { status, error }
    }

    pub fn not_found(what: &str) -> ApiError {
        ApiError::new(StatusCode::NOT_FOUND, anyhow::anyhow!("{what} not found"))
    }

    pub fn bad_request(message: impl Into<String>) -> ApiError {
        ApiError::new(StatusCode::BAD_REQUEST, anyhow::anyhow!(message.into()))
    }

    pub fn conflict(message: impl Into<String>) -> ApiError {
        ApiError::new(StatusCode::CONFLICT, anyhow::anyhow!(message.into()))
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(error: sqlx::Error) -> ApiError {
        tracing::error!(?error, "API responding with database error");
        ApiError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            error: anyhow::anyhow!("database unavailable, please retry the request"),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error,
        }
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = axum::Json(serde_json::json!({
            "status": self.status.as_u16(),
            "error": format!("{:#}", self.error),
        }));
        (self.status, body).into_response()
    }
}
