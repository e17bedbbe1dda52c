//! Handler for `POST /schema/refresh`.

use std::sync::Arc;

use axum::{Json, extract::State};
use tracing::info;
use vantage_agents::{Pipeline, SchemaRefresh};
use vantage_core::engine::AnalyticsEngine;

use crate::error::ApiError;

/// `POST /schema/refresh`: recapture now; views built from an older schema
/// are invalidated.
pub async fn refresh<E: AnalyticsEngine + 'static>(
  State(pipeline): State<Arc<Pipeline<E>>>,
) -> Result<Json<SchemaRefresh>, ApiError> {
  let refresh = pipeline.refresh_schema().await?;
  info!(
    fingerprint = %refresh.fingerprint,
    invalidated = refresh.invalidated.len(),
    "schema refreshed"
  );
  Ok(Json(refresh))
}
