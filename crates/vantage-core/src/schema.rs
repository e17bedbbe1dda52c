//! [`SchemaSnapshot`]: an immutable picture of the operational store's
//! catalog at one point in time.
//!
//! Snapshots are never edited. A refresh produces a new snapshot with a new
//! `snapshot_id`; two snapshots describing the same tables share a
//! fingerprint.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// `true` if `s` can be spliced into SQL as a bare identifier.
///
/// Table and view names come from configuration and from the store's own
/// catalog; both are checked with this before any SQL is rendered.
pub fn is_sql_identifier(s: &str) -> bool {
  let mut chars = s.chars();
  match chars.next() {
    Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
    _ => return false,
  }
  s.len() <= 64 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ─── Parts ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
  pub name:      String,
  pub data_type: String,
  pub nullable:  bool,
  pub is_key:    bool,
}

impl ColumnInfo {
  pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
    Self {
      name:      name.into(),
      data_type: data_type.into(),
      nullable:  true,
      is_key:    false,
    }
  }

  pub fn key(mut self) -> Self {
    self.is_key = true;
    self.nullable = false;
    self
  }
}

/// A foreign-key style link: `from_table.via_column` references `to_table`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Relationship {
  pub from_table: String,
  pub to_table:   String,
  pub via_column: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableInfo {
  /// In ordinal position order.
  pub columns:       Vec<ColumnInfo>,
  /// Relationships where this table is the `from_table`.
  pub relationships: Vec<Relationship>,
}

impl TableInfo {
  pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
    self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
  }

  pub fn has_column(&self, name: &str) -> bool { self.column(name).is_some() }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SchemaSnapshot {
  snapshot_id: Uuid,
  tables:      BTreeMap<String, TableInfo>,
  captured_at: DateTime<Utc>,
  fingerprint: String,
}

impl SchemaSnapshot {
  pub fn new(
    tables: BTreeMap<String, TableInfo>,
    captured_at: DateTime<Utc>,
  ) -> Self {
    let fingerprint = fingerprint(&tables);
    Self { snapshot_id: Uuid::new_v4(), tables, captured_at, fingerprint }
  }

  /// Start a snapshot by hand; mostly useful in tests and fixtures.
  pub fn builder() -> SnapshotBuilder { SnapshotBuilder::default() }

  pub fn snapshot_id(&self) -> Uuid { self.snapshot_id }

  pub fn captured_at(&self) -> DateTime<Utc> { self.captured_at }

  /// Hex SHA-256 over the table, column and relationship listing. Stable
  /// across captures of an unchanged schema.
  pub fn fingerprint(&self) -> &str { &self.fingerprint }

  pub fn tables(&self) -> &BTreeMap<String, TableInfo> { &self.tables }

  pub fn table(&self, name: &str) -> Option<&TableInfo> {
    self.tables.get(name).or_else(|| {
      self
        .tables
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
    })
  }

  pub fn has_table(&self, name: &str) -> bool { self.table(name).is_some() }

  pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
    self.tables.values().flat_map(|t| t.relationships.iter())
  }

  pub fn column_count(&self) -> usize {
    self.tables.values().map(|t| t.columns.len()).sum()
  }
}

fn fingerprint(tables: &BTreeMap<String, TableInfo>) -> String {
  let mut hasher = Sha256::new();
  for (name, table) in tables {
    hasher.update(b"T");
    hasher.update(name.as_bytes());
    for col in &table.columns {
      hasher.update(b"\0C");
      hasher.update(col.name.as_bytes());
      hasher.update(b"\0");
      hasher.update(col.data_type.to_ascii_lowercase().as_bytes());
      hasher.update([u8::from(col.nullable), u8::from(col.is_key)]);
    }
    let mut rels: Vec<&Relationship> = table.relationships.iter().collect();
    rels.sort();
    for rel in rels {
      hasher.update(b"\0R");
      hasher.update(rel.to_table.as_bytes());
      hasher.update(b"\0");
      hasher.update(rel.via_column.as_bytes());
    }
    hasher.update(b"\n");
  }
  hex::encode(hasher.finalize())
}

// ─── Builder ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SnapshotBuilder {
  tables:      BTreeMap<String, TableInfo>,
  captured_at: Option<DateTime<Utc>>,
}

impl SnapshotBuilder {
  /// Add a table whose columns are all nullable, non-key, typed as given.
  pub fn table(mut self, name: &str, columns: &[(&str, &str)]) -> Self {
    let entry = self.tables.entry(name.to_owned()).or_default();
    entry
      .columns
      .extend(columns.iter().map(|(c, t)| ColumnInfo::new(*c, *t)));
    self
  }

  pub fn relationship(mut self, from: &str, to: &str, via: &str) -> Self {
    self
      .tables
      .entry(from.to_owned())
      .or_default()
      .relationships
      .push(Relationship {
        from_table: from.to_owned(),
        to_table:   to.to_owned(),
        via_column: via.to_owned(),
      });
    self
  }

  pub fn captured_at(mut self, at: DateTime<Utc>) -> Self {
    self.captured_at = Some(at);
    self
  }

  pub fn build(self) -> SchemaSnapshot {
    SchemaSnapshot::new(self.tables, self.captured_at.unwrap_or_else(Utc::now))
  }
}
