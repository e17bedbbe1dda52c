//! Handlers for `/views` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/views` | Every registered descriptor |
//! | `POST`   | `/views/sweep` | Measure and optimize every loaded view |
//! | `POST`   | `/views/{metric}` | Ensure the view exists and is loaded |
//! | `DELETE` | `/views/{metric}` | Drop the view; 404 if none is registered |
//! | `POST`   | `/views/{metric}/measure` | Time the view |
//! | `POST`   | `/views/{metric}/optimize` | Reload if slower than the threshold |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use vantage_agents::Pipeline;
use vantage_core::{
  engine::AnalyticsEngine,
  view::{OptimizationOutcome, Performance, ViewDescriptor},
};
use vantage_views::SweepEntry;

use crate::error::ApiError;

type Shared<E> = State<Arc<Pipeline<E>>>;

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /views`
pub async fn list<E: AnalyticsEngine + 'static>(
  State(pipeline): Shared<E>,
) -> Json<Vec<ViewDescriptor>> {
  Json(pipeline.views().list())
}

// ─── Ensure ───────────────────────────────────────────────────────────────────

/// `POST /views/{metric}`: 201 with the loaded descriptor.
pub async fn ensure<E: AnalyticsEngine + 'static>(
  State(pipeline): Shared<E>,
  Path(metric): Path<String>,
) -> Result<(StatusCode, Json<ViewDescriptor>), ApiError> {
  let snapshot = pipeline.snapshot().await?;
  let view = pipeline.views().ensure(&metric, &snapshot).await?;
  Ok((StatusCode::CREATED, Json(view)))
}

// ─── Remove ───────────────────────────────────────────────────────────────────

/// `DELETE /views/{metric}`
pub async fn remove<E: AnalyticsEngine + 'static>(
  State(pipeline): Shared<E>,
  Path(metric): Path<String>,
) -> Result<StatusCode, ApiError> {
  pipeline
    .views()
    .remove(&metric)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("no view registered for {metric}")))?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Maintenance ──────────────────────────────────────────────────────────────

/// `POST /views/{metric}/measure`
pub async fn measure<E: AnalyticsEngine + 'static>(
  State(pipeline): Shared<E>,
  Path(metric): Path<String>,
) -> Result<Json<Performance>, ApiError> {
  Ok(Json(pipeline.views().measure(&metric).await?))
}

/// `POST /views/{metric}/optimize`
pub async fn optimize<E: AnalyticsEngine + 'static>(
  State(pipeline): Shared<E>,
  Path(metric): Path<String>,
) -> Result<Json<OptimizationOutcome>, ApiError> {
  Ok(Json(pipeline.views().optimize_if_needed(&metric).await?))
}

/// `POST /views/sweep`
pub async fn sweep<E: AnalyticsEngine + 'static>(
  State(pipeline): Shared<E>,
) -> Json<Vec<SweepEntry>> {
  Json(pipeline.views().sweep().await)
}
