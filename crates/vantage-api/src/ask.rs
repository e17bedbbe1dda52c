//! Handler for `POST /ask`.
//!
//! Body: `{"question": "...", "dashboard_state": {...}, "recent_history": [...]}`.
//! Only `question` is required. Without `recent_history` the server's own
//! conversation history is used.

use std::sync::Arc;

use axum::{Json, extract::State};
use serde::Deserialize;
use vantage_agents::{AskResponse, Pipeline};
use vantage_core::{
  engine::AnalyticsEngine,
  intent::{HistoryTurn, QueryContext},
};

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct AskBody {
  pub question:        String,
  #[serde(default)]
  pub dashboard_state: serde_json::Value,
  #[serde(default)]
  pub recent_history:  Vec<HistoryTurn>,
}

/// `POST /ask`
pub async fn handler<E: AnalyticsEngine + 'static>(
  State(pipeline): State<Arc<Pipeline<E>>>,
  Json(body): Json<AskBody>,
) -> Result<Json<AskResponse>, ApiError> {
  let question = body.question.trim();
  if question.is_empty() {
    return Err(ApiError::BadRequest("question must not be empty".into()));
  }
  let context = QueryContext {
    dashboard_state: body.dashboard_state,
    recent_history:  body.recent_history,
  };
  let response = pipeline.ask(question, context).await?;
  Ok(Json(response))
}
