//! Schema introspection: read the store's catalog into a [`SchemaSnapshot`].
//!
//! Stateless between calls. Whether to reuse an earlier snapshot is the
//! caller's decision.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use tracing::{debug, instrument};
use vantage_core::{
  Error, Result,
  engine::{AnalyticsEngine, CatalogColumn, CatalogRelationship},
  schema::{ColumnInfo, Relationship, SchemaSnapshot, TableInfo, is_sql_identifier},
};

/// Capture a fresh snapshot from `engine`.
///
/// Engine failures surface as [`Error::Connection`]; catalog rows that do
/// not describe a coherent schema surface as [`Error::Introspection`].
#[instrument(skip_all)]
pub async fn capture<E: AnalyticsEngine>(engine: &E) -> Result<SchemaSnapshot> {
  let columns = engine.list_columns().await.map_err(Error::connection)?;
  let relationships = engine
    .list_relationships()
    .await
    .map_err(Error::connection)?;

  let snapshot = assemble(columns, relationships)?;
  debug!(
    tables = snapshot.tables().len(),
    columns = snapshot.column_count(),
    fingerprint = snapshot.fingerprint(),
    "captured schema snapshot"
  );
  Ok(snapshot)
}

/// Build a snapshot from raw catalog rows, validating them on the way.
pub fn assemble(
  mut columns: Vec<CatalogColumn>,
  relationships: Vec<CatalogRelationship>,
) -> Result<SchemaSnapshot> {
  columns.sort_by(|a, b| (&a.table, a.ordinal).cmp(&(&b.table, b.ordinal)));

  let mut tables: BTreeMap<String, TableInfo> = BTreeMap::new();
  let mut seen: HashSet<(String, String)> = HashSet::new();
  for col in columns {
    if !is_sql_identifier(&col.table) {
      return Err(Error::Introspection(format!(
        "catalog returned invalid table name {:?}",
        col.table
      )));
    }
    if !is_sql_identifier(&col.column) {
      return Err(Error::Introspection(format!(
        "catalog returned invalid column name {:?} in {}",
        col.column, col.table
      )));
    }
    let key = (col.table.to_ascii_lowercase(), col.column.to_ascii_lowercase());
    if !seen.insert(key) {
      return Err(Error::Introspection(format!(
        "column {}.{} listed twice",
        col.table, col.column
      )));
    }

    tables.entry(col.table).or_default().columns.push(ColumnInfo {
      name:      col.column,
      data_type: col.data_type,
      nullable:  col.nullable,
      is_key:    col.is_key,
    });
  }

  for rel in relationships {
    let Some(from) = tables.get_mut(&rel.from_table) else {
      return Err(Error::Introspection(format!(
        "relationship from unknown table {}",
        rel.from_table
      )));
    };
    if !from.has_column(&rel.via_column) {
      return Err(Error::Introspection(format!(
        "relationship column {}.{} does not exist",
        rel.from_table, rel.via_column
      )));
    }
    from.relationships.push(Relationship {
      from_table: rel.from_table,
      to_table:   rel.to_table,
      via_column: rel.via_column,
    });
  }

  // `to_table` may only be checked once every table is known.
  for table in tables.values() {
    for rel in &table.relationships {
      if !tables.contains_key(&rel.to_table) {
        return Err(Error::Introspection(format!(
          "relationship {}.{} references unknown table {}",
          rel.from_table, rel.via_column, rel.to_table
        )));
      }
    }
  }

  Ok(SchemaSnapshot::new(tables, Utc::now()))
}
