//! The [`AnalyticsEngine`] trait: a relational store that can hold views and
//! load them into an accelerated secondary engine.
//!
//! Implemented by storage backends (e.g. `vantage-store-sqlite`). The view
//! manager and the agents depend on this abstraction, never on a concrete
//! backend.

use std::future::Future;

use serde::{Deserialize, Serialize};
use strum::Display;

/// SQL flavour the engine speaks. The generator renders per dialect.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Dialect {
  /// MySQL 8 with the HeatWave secondary engine.
  MySql,
  Sqlite,
}

/// One row of the store's column catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogColumn {
  pub table:     String,
  pub column:    String,
  pub data_type: String,
  pub nullable:  bool,
  pub is_key:    bool,
  /// 1-based position within the table.
  pub ordinal:   u32,
}

/// One row of the store's foreign-key catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRelationship {
  pub from_table: String,
  pub to_table:   String,
  pub via_column: String,
}

/// A row read from a view, keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Abstraction over the operational store plus its analytics accelerator.
///
/// View names passed in are always pre-validated identifiers. All methods
/// return `Send` futures so callers can run them on a multi-threaded
/// runtime.
pub trait AnalyticsEngine: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn dialect(&self) -> Dialect;

  // ── Catalog ───────────────────────────────────────────────────────────

  /// Every column of every base table, ordered by table then ordinal.
  fn list_columns(
    &self,
  ) -> impl Future<Output = Result<Vec<CatalogColumn>, Self::Error>> + Send + '_;

  fn list_relationships(
    &self,
  ) -> impl Future<Output = Result<Vec<CatalogRelationship>, Self::Error>>
  + Send
  + '_;

  // ── DDL ───────────────────────────────────────────────────────────────

  /// Create the view, replacing any existing definition of the same name.
  fn create_or_replace_view<'a>(
    &'a self,
    view_name: &'a str,
    sql_body: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn drop_view<'a>(
    &'a self,
    view_name: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Materialise the view into the accelerated engine.
  fn secondary_load<'a>(
    &'a self,
    view_name: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Evict the view from the accelerated engine.
  fn secondary_unload<'a>(
    &'a self,
    view_name: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Queries ───────────────────────────────────────────────────────────

  /// A cheap probe (row count) used to time the view.
  fn probe<'a>(
    &'a self,
    view_name: &'a str,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  fn fetch_rows<'a>(
    &'a self,
    view_name: &'a str,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Row>, Self::Error>> + Send + 'a;
}
