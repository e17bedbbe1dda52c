//! A recording in-process engine for manager tests.

use std::{
  collections::HashSet,
  io,
  sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use vantage_core::{
  engine::{AnalyticsEngine, CatalogColumn, CatalogRelationship, Dialect, Row},
  schema::SchemaSnapshot,
};

#[derive(Default)]
pub struct MockEngine {
  pub creates:  AtomicUsize,
  pub loads:    AtomicUsize,
  pub unloads:  AtomicUsize,
  pub drops:    AtomicUsize,
  pub probes:   AtomicUsize,
  failing:      Mutex<HashSet<&'static str>>,
  create_delay: Mutex<Duration>,
  probe_delay:  Mutex<Duration>,
}

impl MockEngine {
  /// Make every call of `operation` (`create`, `load`, `unload`, `drop`,
  /// `probe`, `fetch`) fail until cleared.
  pub fn fail_on(&self, operation: &'static str) {
    self.failing.lock().unwrap().insert(operation);
  }

  pub fn clear_failures(&self) { self.failing.lock().unwrap().clear(); }

  pub fn set_create_delay(&self, delay: Duration) {
    *self.create_delay.lock().unwrap() = delay;
  }

  pub fn set_probe_delay(&self, delay: Duration) {
    *self.probe_delay.lock().unwrap() = delay;
  }

  fn check(&self, operation: &'static str) -> io::Result<()> {
    if self.failing.lock().unwrap().contains(operation) {
      return Err(io::Error::other(format!("{operation} failed")));
    }
    Ok(())
  }
}

impl AnalyticsEngine for MockEngine {
  type Error = io::Error;

  fn dialect(&self) -> Dialect { Dialect::MySql }

  async fn list_columns(&self) -> io::Result<Vec<CatalogColumn>> { Ok(Vec::new()) }

  async fn list_relationships(&self) -> io::Result<Vec<CatalogRelationship>> {
    Ok(Vec::new())
  }

  async fn create_or_replace_view(&self, _view_name: &str, _sql_body: &str) -> io::Result<()> {
    let delay = *self.create_delay.lock().unwrap();
    if !delay.is_zero() {
      tokio::time::sleep(delay).await;
    }
    self.creates.fetch_add(1, Ordering::SeqCst);
    self.check("create")
  }

  async fn drop_view(&self, _view_name: &str) -> io::Result<()> {
    self.drops.fetch_add(1, Ordering::SeqCst);
    self.check("drop")
  }

  async fn secondary_load(&self, _view_name: &str) -> io::Result<()> {
    self.loads.fetch_add(1, Ordering::SeqCst);
    self.check("load")
  }

  async fn secondary_unload(&self, _view_name: &str) -> io::Result<()> {
    self.unloads.fetch_add(1, Ordering::SeqCst);
    self.check("unload")
  }

  async fn probe(&self, _view_name: &str) -> io::Result<u64> {
    let delay = *self.probe_delay.lock().unwrap();
    if !delay.is_zero() {
      tokio::time::sleep(delay).await;
    }
    self.probes.fetch_add(1, Ordering::SeqCst);
    self.check("probe")?;
    Ok(12)
  }

  async fn fetch_rows(&self, view_name: &str, _limit: usize) -> io::Result<Vec<Row>> {
    self.check("fetch")?;
    let mut row = Row::new();
    row.insert("view".into(), serde_json::Value::String(view_name.to_owned()));
    Ok(vec![row])
  }
}

/// The three operational tables with every column the generator reads.
pub fn sample_snapshot() -> SchemaSnapshot {
  SchemaSnapshot::builder()
    .table("financial_transactions_oltp", &[
      ("transaction_id", "INTEGER"),
      ("project_id", "INTEGER"),
      ("transaction_date", "DATE"),
      ("transaction_type", "TEXT"),
      ("amount", "REAL"),
      ("status", "TEXT"),
    ])
    .table("projects_oltp", &[
      ("project_id", "INTEGER"),
      ("customer_id", "INTEGER"),
      ("project_type", "TEXT"),
      ("status", "TEXT"),
      ("start_date", "DATE"),
      ("end_date", "DATE"),
      ("budget_amount", "REAL"),
      ("actual_cost", "REAL"),
    ])
    .table("customers_oltp", &[
      ("customer_id", "INTEGER"),
      ("customer_name", "TEXT"),
      ("risk_score", "REAL"),
      ("average_payment_days", "REAL"),
    ])
    .build()
}
