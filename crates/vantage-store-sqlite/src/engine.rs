//! [`SqliteEngine`]: the SQLite implementation of [`AnalyticsEngine`].

use std::path::Path;

use tracing::debug;
use vantage_core::{
  engine::{AnalyticsEngine, CatalogColumn, CatalogRelationship, Dialect, Row},
  schema::is_sql_identifier,
};

use crate::{
  Error, Result,
  encode::value_to_json,
  schema::{RAPID_SUFFIX, SCHEMA},
};

// ─── Engine ──────────────────────────────────────────────────────────────────

/// An analytics engine backed by a single SQLite file.
///
/// Clones share one background connection thread.
#[derive(Clone)]
pub struct SqliteEngine {
  conn: tokio_rusqlite::Connection,
}

impl SqliteEngine {
  /// Open (or create) a database at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let engine = Self { conn };
    engine.init_schema().await?;
    Ok(engine)
  }

  /// Open an in-memory database with the schema applied.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let engine = Self { conn };
    engine.init_schema().await?;
    Ok(engine)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a batch of statements, e.g. to load fixture data.
  pub async fn execute_batch(&self, sql: impl Into<String>) -> Result<()> {
    let sql = sql.into();
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Whether the view currently has a materialised copy.
  pub async fn is_loaded(&self, view_name: &str) -> Result<bool> {
    let rapid = rapid_name(view_name)?;
    let loaded = self
      .conn
      .call(move |conn| Ok(table_exists(conn, &rapid)?))
      .await?;
    Ok(loaded)
  }
}

fn checked(name: &str) -> Result<String> {
  if is_sql_identifier(name) {
    Ok(name.to_owned())
  } else {
    Err(Error::InvalidIdentifier(name.to_owned()))
  }
}

fn rapid_name(view_name: &str) -> Result<String> {
  checked(view_name).map(|v| format!("{v}{RAPID_SUFFIX}"))
}

fn table_exists(conn: &rusqlite::Connection, name: &str) -> rusqlite::Result<bool> {
  conn.query_row(
    "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
    [name],
    |row| row.get(0),
  )
}

// ─── AnalyticsEngine impl ────────────────────────────────────────────────────

impl AnalyticsEngine for SqliteEngine {
  type Error = Error;

  fn dialect(&self) -> Dialect { Dialect::Sqlite }

  // ── Catalog ───────────────────────────────────────────────────────────────

  async fn list_columns(&self) -> Result<Vec<CatalogColumn>> {
    let columns = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT m.name, p.name, p.type, p.\"notnull\", p.pk, p.cid
           FROM sqlite_master m
           JOIN pragma_table_info(m.name) p
           WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%'
           ORDER BY m.name, p.cid",
        )?;
        let rows = stmt
          .query_map([], |row| {
            let not_null: bool = row.get(3)?;
            let pk: i64 = row.get(4)?;
            let cid: i64 = row.get(5)?;
            Ok(CatalogColumn {
              table:     row.get(0)?,
              column:    row.get(1)?,
              data_type: row.get(2)?,
              nullable:  !not_null && pk == 0,
              is_key:    pk > 0,
              ordinal:   u32::try_from(cid + 1).unwrap_or(u32::MAX),
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    // Materialised copies are an engine detail, not part of the schema.
    Ok(columns.into_iter().filter(|c| !c.table.ends_with(RAPID_SUFFIX)).collect())
  }

  async fn list_relationships(&self) -> Result<Vec<CatalogRelationship>> {
    let rels = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT m.name, f.\"table\", f.\"from\"
           FROM sqlite_master m
           JOIN pragma_foreign_key_list(m.name) f
           WHERE m.type = 'table'
           ORDER BY m.name, f.id, f.seq",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(CatalogRelationship {
              from_table: row.get(0)?,
              to_table:   row.get(1)?,
              via_column: row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rels)
  }

  // ── DDL ───────────────────────────────────────────────────────────────────

  async fn create_or_replace_view(&self, view_name: &str, sql_body: &str) -> Result<()> {
    let view = checked(view_name)?;
    let rapid = rapid_name(view_name)?;
    let body = sql_body.to_owned();
    debug!(view = %view, "create or replace view");

    self
      .conn
      .call(move |conn| {
        // A replaced definition invalidates any materialised copy.
        let tx = conn.transaction()?;
        tx.execute_batch(&format!(
          "DROP TABLE IF EXISTS {rapid};
           DROP VIEW IF EXISTS {view};
           CREATE VIEW {view} AS {body};"
        ))?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn drop_view(&self, view_name: &str) -> Result<()> {
    let view = checked(view_name)?;
    let rapid = rapid_name(view_name)?;
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&format!(
          "DROP TABLE IF EXISTS {rapid};
           DROP VIEW IF EXISTS {view};"
        ))?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn secondary_load(&self, view_name: &str) -> Result<()> {
    let view = checked(view_name)?;
    let rapid = rapid_name(view_name)?;
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute_batch(&format!(
          "DROP TABLE IF EXISTS {rapid};
           CREATE TABLE {rapid} AS SELECT * FROM {view};"
        ))?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn secondary_unload(&self, view_name: &str) -> Result<()> {
    let rapid = rapid_name(view_name)?;
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {rapid};"))?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Queries ───────────────────────────────────────────────────────────────

  async fn probe(&self, view_name: &str) -> Result<u64> {
    let view = checked(view_name)?;
    let rapid = rapid_name(view_name)?;
    let count: i64 = self
      .conn
      .call(move |conn| {
        let source = if table_exists(conn, &rapid)? { rapid } else { view };
        let n = conn.query_row(&format!("SELECT COUNT(*) FROM {source}"), [], |row| {
          row.get(0)
        })?;
        Ok(n)
      })
      .await?;
    Ok(u64::try_from(count).unwrap_or(0))
  }

  async fn fetch_rows(&self, view_name: &str, limit: usize) -> Result<Vec<Row>> {
    let view = checked(view_name)?;
    let rapid = rapid_name(view_name)?;
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = self
      .conn
      .call(move |conn| {
        let source = if table_exists(conn, &rapid)? { rapid } else { view };
        let mut stmt = conn.prepare(&format!("SELECT * FROM {source} LIMIT ?1"))?;
        let names: Vec<String> =
          stmt.column_names().into_iter().map(str::to_owned).collect();
        let rows = stmt
          .query_map([limit], |row| {
            let mut out = Row::new();
            for (i, name) in names.iter().enumerate() {
              out.insert(name.clone(), value_to_json(row.get_ref(i)?));
            }
            Ok(out)
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }
}
