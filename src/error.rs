//! Unified error type for the HTTP surface. Every handler returns
//! `Result<T, AppError>`; `IntoResponse` maps each variant to the status
//! code called for in the error handling design (spec §7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
	#[error("validation error: {0}")]
	Validation(String),

	#[error("authentication error: {0}")]
	Authentication(String),

	#[error("authorization error: {0}")]
	Authorization(String),

	#[error("not found: {0}")]
	NotFound(String),

	#[error("conflict: {0}")]
	Conflict(String),

	#[error("storage error: {0}")]
	Storage(#[from] sqlx::Error),

	#[error("internal error: {0}")]
	Internal(#[from] anyhow::Error),
}

impl AppError {
	fn status(&self) -> StatusCode {
		match self {
			AppError::Validation(_) => StatusCode::BAD_REQUEST,
			AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
			AppError::Authorization(_) => StatusCode::FORBIDDEN,
			AppError::NotFound(_) => StatusCode::NOT_FOUND,
			AppError::Conflict(_) => StatusCode::CONFLICT,
			AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

#[derive(Serialize)]
struct ErrorBody {
	error: String,
}

impl IntoResponse for AppError {
	fn into_response(self) -> Response {
		let status = self.status();
		if status == StatusCode::INTERNAL_SERVER_ERROR {
			tracing::error!(error = %self, "request failed");
		} else {
			tracing::debug!(error = %self, "request rejected");
		}
		let body = ErrorBody {
			error: self.to_string(),
		};
		(status, axum::Json(body)).into_response()
	}
}

pub type AppResult<T> = Result<T, AppError>;
