//! Integration tests for `SqliteEngine` against an in-memory database.

use std::sync::Arc;

use chrono::NaiveDate;
use vantage_core::{
  engine::AnalyticsEngine, metric::MetricCatalog, view::ViewState,
};
use vantage_views::{ViewManager, ViewSettings, introspect};

use crate::{Error, SAMPLE_DATA, SqliteEngine};

async fn engine() -> SqliteEngine {
  let e = SqliteEngine::open_in_memory()
    .await
    .expect("in-memory engine");
  e.execute_batch(SAMPLE_DATA).await.expect("sample data");
  e
}

fn manager(engine: SqliteEngine) -> ViewManager<SqliteEngine> {
  let settings = ViewSettings {
    reference_date: NaiveDate::from_ymd_opt(2025, 6, 30),
    ..Default::default()
  };
  ViewManager::new(
    Arc::new(engine),
    Arc::new(MetricCatalog::embedded().unwrap()),
    settings,
  )
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn introspection_sees_tables_and_keys() {
  let e = engine().await;
  let snap = introspect::capture(&e).await.unwrap();

  assert_eq!(snap.tables().len(), 3);
  let projects = snap.table("projects_oltp").unwrap();
  assert_eq!(projects.columns[0].name, "project_id");
  assert!(projects.columns[0].is_key);
  assert!(!projects.column("project_type").unwrap().nullable);
  assert_eq!(projects.relationships.len(), 1);
  assert_eq!(projects.relationships[0].to_table, "customers_oltp");
  assert_eq!(snap.relationships().count(), 2);
}

#[tokio::test]
async fn fingerprint_ignores_materialised_copies() {
  let e = engine().await;
  let views = manager(e.clone());
  let before = introspect::capture(&e).await.unwrap();

  views.ensure("cash_flow_analysis", &before).await.unwrap();
  assert!(e.is_loaded("analytics_cash_flow_analysis").await.unwrap());

  let after = introspect::capture(&e).await.unwrap();
  assert_eq!(before.fingerprint(), after.fingerprint());
}

// ─── Views ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn every_catalog_metric_loads() {
  let e = engine().await;
  let views = manager(e.clone());
  let snap = introspect::capture(&e).await.unwrap();

  let catalog = MetricCatalog::embedded().unwrap();
  let outcomes = views
    .ensure_all(catalog.all().iter().map(|m| m.name.as_str()), &snap)
    .await;
  for outcome in &outcomes {
    assert!(outcome.error.is_none(), "{}: {:?}", outcome.metric_name, outcome.error);
    assert_eq!(outcome.view.as_ref().unwrap().state, ViewState::Loaded);
  }
  assert_eq!(outcomes.len(), catalog.len());
}

#[tokio::test]
async fn cash_flow_rows() {
  let e = engine().await;
  let views = manager(e.clone());
  let snap = introspect::capture(&e).await.unwrap();
  views.ensure("cash_flow_analysis", &snap).await.unwrap();

  let rows = views.rows("cash_flow_analysis", 10).await.unwrap();
  let periods: Vec<&str> = rows.iter().map(|r| r["period"].as_str().unwrap()).collect();
  assert_eq!(periods, vec!["2025-05", "2025-03", "2025-02", "2024-04", "2024-03"]);

  // The pending payment in June is not counted.
  assert_eq!(rows[0]["invoiced"].as_f64(), Some(5000.0));
  assert_eq!(rows[0]["collected"].as_f64(), Some(0.0));
  assert_eq!(rows[0]["collection_rate"].as_f64(), Some(0.0));
  assert_eq!(rows[1]["collected"].as_f64(), Some(8000.0));
}

#[tokio::test]
async fn trend_baselines_follow_the_calendar() {
  let e = engine().await;
  // April 2025 has no invoices; May 2024 is the only year-earlier month.
  e.execute_batch(
    "INSERT INTO financial_transactions_oltp (transaction_id, project_id, \
     transaction_date, transaction_type, amount, status) VALUES \
     (107, 12, '2024-05-10', 'INVOICE', 4000, 'COMPLETED');",
  )
  .await
  .unwrap();
  let views = manager(e.clone());
  let snap = introspect::capture(&e).await.unwrap();
  views.ensure("business_trends", &snap).await.unwrap();

  let rows = views.rows("business_trends", 10).await.unwrap();
  let periods: Vec<&str> = rows.iter().map(|r| r["period"].as_str().unwrap()).collect();
  assert_eq!(periods, vec!["2025-05", "2025-02", "2024-05", "2024-03"]);

  assert_eq!(rows[0]["revenue"].as_f64(), Some(5000.0));
  assert!(rows[0]["prior_period_revenue"].is_null());
  assert!(rows[0]["period_growth_pct"].is_null());
  assert_eq!(rows[0]["prior_year_revenue"].as_f64(), Some(4000.0));
  assert_eq!(rows[0]["yoy_growth_pct"].as_f64(), Some(25.0));

  // February 2024 and January 2025 are both empty.
  assert!(rows[1]["prior_year_revenue"].is_null());
  assert!(rows[1]["prior_period_revenue"].is_null());
  assert!(rows[2]["prior_period_revenue"].is_null());
}

#[tokio::test]
async fn customer_health_rows() {
  let e = engine().await;
  let views = manager(e.clone());
  let snap = introspect::capture(&e).await.unwrap();
  views.ensure("customer_health_score", &snap).await.unwrap();

  let rows = views.rows("customer_health_score", 10).await.unwrap();
  // Hooli is inactive.
  assert_eq!(rows.len(), 3);
  for row in &rows {
    let score = row["health_score"].as_f64().unwrap();
    assert!((0.0..=100.0).contains(&score));
  }

  assert_eq!(rows[0]["customer_name"], "Acme");
  assert!((rows[0]["health_score"].as_f64().unwrap() - 92.0).abs() < 1e-9);
  assert_eq!(rows[0]["health_category"], "GOOD");
  assert_eq!(rows[0]["days_since_last_project"].as_i64(), Some(60));

  assert_eq!(rows[1]["customer_name"], "Initech");
  assert!((rows[1]["health_score"].as_f64().unwrap() - 46.0).abs() < 1e-9);
  assert_eq!(rows[1]["days_since_last_project"].as_i64(), Some(9999));

  assert_eq!(rows[2]["customer_name"], "Globex");
  assert_eq!(rows[2]["health_score"].as_f64(), Some(0.0));
  assert_eq!(rows[2]["health_category"], "POOR");
}

#[tokio::test]
async fn unload_and_drop() {
  let e = engine().await;
  let views = manager(e.clone());
  let snap = introspect::capture(&e).await.unwrap();
  views.ensure("project_efficiency", &snap).await.unwrap();

  e.secondary_unload("analytics_project_efficiency").await.unwrap();
  assert!(!e.is_loaded("analytics_project_efficiency").await.unwrap());
  // Probes fall back to the view itself: two (project_type, status) groups.
  assert_eq!(e.probe("analytics_project_efficiency").await.unwrap(), 2);

  views.remove("project_efficiency").await.unwrap();
  assert!(e.probe("analytics_project_efficiency").await.is_err());
}

#[tokio::test]
async fn replacing_a_view_discards_its_copy() {
  let e = engine().await;
  e.create_or_replace_view("analytics_x", "SELECT 1 AS one").await.unwrap();
  e.secondary_load("analytics_x").await.unwrap();
  assert!(e.is_loaded("analytics_x").await.unwrap());

  e.create_or_replace_view("analytics_x", "SELECT 2 AS two").await.unwrap();
  assert!(!e.is_loaded("analytics_x").await.unwrap());
  let rows = e.fetch_rows("analytics_x", 5).await.unwrap();
  assert_eq!(rows[0]["two"], 2);
}

#[tokio::test]
async fn invalid_identifiers_are_rejected() {
  let e = engine().await;
  let err = e
    .create_or_replace_view("x; DROP TABLE projects_oltp", "SELECT 1")
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidIdentifier(_)));
}
