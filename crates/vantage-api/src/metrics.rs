//! Handler for `GET /metrics`.

use std::sync::Arc;

use axum::{Json, extract::State};
use vantage_agents::Pipeline;
use vantage_core::{engine::AnalyticsEngine, metric::MetricDefinition};

/// `GET /metrics`: the catalog in priority order.
pub async fn list<E: AnalyticsEngine + 'static>(
  State(pipeline): State<Arc<Pipeline<E>>>,
) -> Json<Vec<MetricDefinition>> {
  Json(pipeline.views().catalog().all().to_vec())
}
