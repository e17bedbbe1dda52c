//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use vantage_core::Error as CoreError;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Core(#[from] CoreError),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Core(e) => core_status(e),
    }
  }
}

fn core_status(err: &CoreError) -> StatusCode {
  match err {
    CoreError::MetricNotFound(_)
    | CoreError::ViewNotFound(_)
    | CoreError::UnknownAgent(_) => StatusCode::NOT_FOUND,
    CoreError::SchemaMismatch { .. } | CoreError::Classification(_) => {
      StatusCode::UNPROCESSABLE_ENTITY
    }
    CoreError::ViewNotReady { .. } => StatusCode::CONFLICT,
    CoreError::Connection(_)
    | CoreError::Timeout { .. }
    | CoreError::Introspection(_) => StatusCode::SERVICE_UNAVAILABLE,
    // Report the stage's cause, not the wrapper.
    CoreError::ViewCreation { source, .. } => core_status(source),
    _ => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::warn!(%status, error = %self, "request failed");
    }
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}
