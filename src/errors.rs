use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

use crate::authz::errors::AuthzError;

#[derive(Debug, Error, Diagnostic)]
pub enum TribuneError {
    #[error("Database error: {0}")]
    #[diagnostic(code(tribune::db))]
    Db(#[from] sea_orm::DbErr),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Authz(#[from] AuthzError),

    #[error("Database not configured")]
    #[diagnostic(
        code(tribune::no_database),
        help("Set `database.url` (or TRIBUNE__DATABASE__URL) to enable database-backed routes")
    )]
    NoDatabase,

    #[error("Bad request: {0}")]
    #[diagnostic(code(tribune::bad_request))]
    BadRequest(String),

    #[error("{0}")]
    #[diagnostic(code(tribune::other))]
    Other(String),
}

impl IntoResponse for TribuneError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            TribuneError::Authz(e) => return e.into_response(),
            TribuneError::NoDatabase => (
                StatusCode::SERVICE_UNAVAILABLE,
                "database not configured".to_string(),
            ),
            TribuneError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            other => {
                tracing::error!(error = %other, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
