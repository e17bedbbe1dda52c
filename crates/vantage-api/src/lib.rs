//! JSON HTTP API over the question pipeline and the view manager.
//!
//! | Method   | Path | Handler |
//! |----------|------|---------|
//! | `POST`   | `/ask` | [`ask::handler`] |
//! | `GET`    | `/metrics` | [`metrics::list`] |
//! | `GET`    | `/views` | [`views::list`] |
//! | `POST`   | `/views/sweep` | [`views::sweep`] |
//! | `POST`   | `/views/{metric}` | [`views::ensure`] |
//! | `DELETE` | `/views/{metric}` | [`views::remove`] |
//! | `POST`   | `/views/{metric}/measure` | [`views::measure`] |
//! | `POST`   | `/views/{metric}/optimize` | [`views::optimize`] |
//! | `POST`   | `/schema/refresh` | [`schema::refresh`] |

pub mod ask;
pub mod error;
pub mod metrics;
pub mod schema;
pub mod views;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use vantage_agents::Pipeline;
use vantage_core::engine::AnalyticsEngine;

pub use error::ApiError;

/// Build the API router for `pipeline`.
pub fn api_router<E>(pipeline: Arc<Pipeline<E>>) -> Router<()>
where
  E: AnalyticsEngine + 'static,
{
  Router::new()
    .route("/ask", post(ask::handler::<E>))
    .route("/metrics", get(metrics::list::<E>))
    .route("/views", get(views::list::<E>))
    .route("/views/sweep", post(views::sweep::<E>))
    .route(
      "/views/{metric}",
      post(views::ensure::<E>).delete(views::remove::<E>),
    )
    .route("/views/{metric}/measure", post(views::measure::<E>))
    .route("/views/{metric}/optimize", post(views::optimize::<E>))
    .route("/schema/refresh", post(schema::refresh::<E>))
    .with_state(pipeline)
}

#[cfg(test)]
mod tests {
  use async_trait::async_trait;
  use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
  };
  use chrono::NaiveDate;
  use serde_json::{Value, json};
  use tower::ServiceExt;
  use vantage_agents::{
    AgentRegistry, AgentRouter, Classifier, ClassifierSettings, PipelineSettings,
    RouterSettings, RoutingTable, Synthesizer, SynthesizerSettings,
    agents::{AnalystSettings, default_profiles},
  };
  use vantage_core::{
    metric::MetricCatalog,
    reasoner::{Prompt, Reasoner, ReasonerError},
  };
  use vantage_store_sqlite::{SAMPLE_DATA, SqliteEngine};
  use vantage_views::{ViewManager, ViewSettings};

  use super::*;

  /// A reasoner that is never reachable; every answer takes the fallback path.
  struct Offline;

  #[async_trait]
  impl Reasoner for Offline {
    async fn reason(&self, _prompt: &Prompt) -> Result<Value, ReasonerError> {
      Err(ReasonerError::Unavailable("offline".into()))
    }
  }

  async fn app() -> Router<()> {
    let engine = SqliteEngine::open_in_memory().await.unwrap();
    engine.execute_batch(SAMPLE_DATA).await.unwrap();

    let catalog = Arc::new(MetricCatalog::embedded().unwrap());
    let views = Arc::new(ViewManager::new(
      Arc::new(engine),
      Arc::clone(&catalog),
      ViewSettings {
        reference_date: NaiveDate::from_ymd_opt(2025, 6, 30),
        ..Default::default()
      },
    ));
    let reasoner: Arc<dyn Reasoner> = Arc::new(Offline);
    let registry = Arc::new(AgentRegistry::from_profiles(
      &default_profiles(),
      Arc::clone(&views),
      Arc::clone(&reasoner),
      AnalystSettings::default(),
    ));
    let classifier = Classifier::new(
      Arc::clone(&reasoner),
      catalog,
      registry.profiles(),
      RoutingTable::default(),
      ClassifierSettings::default(),
    );
    let pipeline = Pipeline::new(
      views,
      classifier,
      AgentRouter::new(registry, RouterSettings::default()),
      Synthesizer::new(reasoner, SynthesizerSettings::default()),
      PipelineSettings::default(),
    );
    api_router(Arc::new(pipeline))
  }

  async fn send(
    app: &Router<()>,
    method: &str,
    uri: &str,
    body: Option<Value>,
  ) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
      Some(json) => builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap(),
      None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
  }

  // ── Metrics ─────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn metrics_lists_the_catalog() {
    let app = app().await;
    let (status, body) = send(&app, "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
      .as_array()
      .unwrap()
      .iter()
      .map(|m| m["name"].as_str().unwrap())
      .collect();
    assert_eq!(names.len(), 5);
    assert!(names.contains(&"cash_flow_analysis"));
  }

  // ── Views ───────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn view_lifecycle_over_http() {
    let app = app().await;

    let (status, body) = send(&app, "POST", "/views/cash_flow_analysis", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["state"], "LOADED");
    assert_eq!(body["view_name"], "analytics_cash_flow_analysis");

    let (status, body) = send(&app, "GET", "/views", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = send(&app, "POST", "/views/cash_flow_analysis/measure", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["row_count"], 5);

    let (status, body) = send(&app, "POST", "/views/sweep", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["metric_name"], "cash_flow_analysis");

    let (status, _) = send(&app, "DELETE", "/views/cash_flow_analysis", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = send(&app, "DELETE", "/views/cash_flow_analysis", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("cash_flow_analysis"));
  }

  #[tokio::test]
  async fn unknown_metric_is_404() {
    let app = app().await;
    let (status, body) = send(&app, "POST", "/views/churn_rate", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "metric not found: churn_rate");
  }

  #[tokio::test]
  async fn measuring_an_unregistered_view_is_404() {
    let app = app().await;
    let (status, _) = send(&app, "POST", "/views/revenue_trend/measure", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  // ── Ask ─────────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn ask_answers_on_the_fallback_path() {
    let app = app().await;
    let (status, body) = send(
      &app,
      "POST",
      "/ask",
      Some(json!({ "question": "Why is our cash flow declining?" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["intent"]["degraded"], true);
    assert_eq!(body["answer"]["quality"], "degraded");
    assert!(!body["answer"]["direct_answer"].as_str().unwrap().is_empty());
  }

  #[tokio::test]
  async fn blank_question_is_400() {
    let app = app().await;
    let (status, _) = send(&app, "POST", "/ask", Some(json!({ "question": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  // ── Schema ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn schema_refresh_reports_fingerprint() {
    let app = app().await;
    let (status, body) = send(&app, "POST", "/schema/refresh", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fingerprint"].as_str().unwrap().len(), 64);
    assert!(body["tables"].as_u64().unwrap() >= 3);
    assert_eq!(body["invalidated"], json!([]));
  }
}
