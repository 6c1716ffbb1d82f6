//! Error handling module
//!
//! Provides unified error types and handling for the entire application.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Catalog query failed for {object} `{name}`: {message}")]
    Catalog {
        object: String,
        name: String,
        message: String,
    },

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Container error: {0}")]
    Container(String),

    #[error("SQL execution failed: {message}")]
    SqlExecution { sql: String, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Wrap a database error with the catalog object class and name it was reading
    pub fn catalog(object: impl Into<String>, name: impl Into<String>, err: sqlx::Error) -> Self {
        AppError::Catalog {
            object: object.into(),
            name: name.into(),
            message: err.to_string(),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match &self {
            AppError::Sqlx(e) => {
                error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                    Some(e.to_string()),
                )
            }
            AppError::Connection(msg) => (
                StatusCode::BAD_GATEWAY,
                "CONNECTION_ERROR",
                msg.clone(),
                None,
            ),
            AppError::Catalog { object, name, message } => {
                error!("Catalog error on {} `{}`: {}", object, name, message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CATALOG_ERROR",
                    format!("Failed to read {object} `{name}` from the catalog"),
                    Some(message.clone()),
                )
            }
            AppError::Generation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "GENERATION_ERROR",
                msg.clone(),
                None,
            ),
            AppError::Container(msg) => {
                error!("Container error: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "CONTAINER_ERROR",
                    msg.clone(),
                    None,
                )
            }
            AppError::SqlExecution { sql, message } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "SQL_EXECUTION_ERROR",
                message.clone(),
                Some(sql.clone()),
            ),
            AppError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
                msg.clone(),
                None,
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                msg.clone(),
                None,
            ),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                msg.clone(),
                None,
            ),
            AppError::Config(msg) => {
                error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIG_ERROR",
                    "A configuration error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            message,
            error: details,
            code: Some(error_code.to_string()),
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, AppError>;
