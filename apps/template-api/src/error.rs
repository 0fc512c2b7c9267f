//! Error types for Template API

use annotate_core::{EditError, ExportError, StorageError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Edit(e) => match e {
                EditError::NotFound(_) => StatusCode::NOT_FOUND,
                EditError::EmptyText | EditError::InvalidColor(_) => StatusCode::BAD_REQUEST,
                EditError::NoDocument => StatusCode::UNPROCESSABLE_ENTITY,
            },
            ApiError::Export(e) => match e {
                ExportError::ExportInProgress => StatusCode::CONFLICT,
                ExportError::NoAttachment | ExportError::UnsupportedAttachment(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                ExportError::DocumentParse(_) => StatusCode::UNPROCESSABLE_ENTITY,
                ExportError::SourceFetch(_) => StatusCode::BAD_GATEWAY,
                ExportError::Compose(_) | ExportError::Serialize(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Storage(StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Storage(StorageError::Backend(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!("{}", self);
            match self {
                ApiError::Export(_) => self.to_string(),
                ApiError::Storage(_) => "Storage error".to_string(),
                _ => "Internal error".to_string(),
            }
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
