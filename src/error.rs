use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<duckdb::Error> for MonitorError {
    fn from(err: duckdb::Error) -> Self {
        MonitorError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::Serialization(err.to_string())
    }
}

impl MonitorError {
    /// Re-labels a storage failure seen while fetching samples as a fetch
    /// failure. Query errors keep their own variant.
    pub fn into_fetch(self) -> Self {
        match self {
            MonitorError::Database(msg) | MonitorError::Internal(msg) => MonitorError::Fetch(msg),
            other => other,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            MonitorError::Fetch(_) => StatusCode::BAD_GATEWAY,
            MonitorError::Serialization(_) | MonitorError::InvalidQuery(_) => {
                StatusCode::BAD_REQUEST
            }
            MonitorError::NotFound(_) => StatusCode::NOT_FOUND,
            MonitorError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
            MonitorError::Database(_) | MonitorError::Config(_) | MonitorError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for MonitorError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            MonitorError::Fetch("backend down".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            MonitorError::InvalidQuery("interval".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            MonitorError::NotFound("view".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            MonitorError::Unsupported("ingest".into()).status(),
            StatusCode::NOT_IMPLEMENTED
        );
    }

    #[test]
    fn test_into_fetch() {
        let err = MonitorError::Database("connection closed".into()).into_fetch();
        assert!(matches!(err, MonitorError::Fetch(_)));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);

        let err = MonitorError::InvalidQuery("unknown metric".into()).into_fetch();
        assert!(matches!(err, MonitorError::InvalidQuery(_)));
    }

    #[test]
    fn test_json_error_converts() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: MonitorError = err.into();
        assert!(matches!(err, MonitorError::Serialization(_)));
    }
}
