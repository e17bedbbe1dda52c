//! Metric definitions and the static [`MetricCatalog`].
//!
//! A metric is a named analytical question ("how is cash flow trending?")
//! bound to the source tables and aggregation shape that answer it. The
//! catalog is loaded once at startup, validated, and never mutated.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{Error, Result, schema::is_sql_identifier};

/// The catalog that ships with the binary, used when no `catalog_path` is
/// configured.
pub const DEFAULT_CATALOG: &str = include_str!("../catalog.toml");

/// Words that describe the *shape* of a metric rather than its subject.
/// Stripped from the tail of a metric name when deriving match phrases.
const GENERIC_SUFFIXES: &[&str] =
  &["analysis", "score", "trend", "trends", "metrics", "summary"];

// ─── Enums ───────────────────────────────────────────────────────────────────

/// Business area a metric belongs to. Drives the SQL construction strategy.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MetricCategory {
  Financial,
  Operational,
  Customer,
  Trend,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AggregationKind {
  Sum,
  Avg,
  /// Derived ratios and scores computed from several aggregates.
  Calculated,
  /// Window functions comparing a period against earlier periods.
  Window,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TimeDimension {
  Monthly,
  Quarterly,
  /// A single snapshot as of the reference date over the lookback window.
  Current,
  /// No date restriction at all.
  Lifetime,
}

impl TimeDimension {
  /// Whether rows are bucketed into calendar periods.
  pub fn is_periodic(self) -> bool {
    matches!(self, Self::Monthly | Self::Quarterly)
  }

  /// Number of periods that make up one year, for year-over-year offsets.
  pub fn periods_per_year(self) -> Option<u32> {
    match self {
      Self::Monthly => Some(12),
      Self::Quarterly => Some(4),
      Self::Current | Self::Lifetime => None,
    }
  }
}

/// Declaration order gives `Low < Medium < High`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
  Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Priority {
  Low,
  #[default]
  Medium,
  High,
}

// ─── Definition ──────────────────────────────────────────────────────────────

/// A single catalog entry. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
  /// Unique key; also the suffix of the generated view name.
  pub name:             String,
  pub category:         MetricCategory,
  /// Ordered: each category strategy assigns a role to each position.
  pub source_tables:    Vec<String>,
  pub aggregation_kind: AggregationKind,
  pub time_dimension:   TimeDimension,
  #[serde(default)]
  pub priority:         Priority,
  #[serde(default)]
  pub description:      String,
  /// Extra phrases that identify this metric in a free-text question.
  #[serde(default)]
  pub keywords:         Vec<String>,
  /// Overrides the generator's default lookback window.
  #[serde(default)]
  pub lookback_months:  Option<u32>,
}

impl MetricDefinition {
  /// Lower-cased phrases matched against normalised question text.
  ///
  /// Always includes the metric name with underscores as spaces, the name
  /// with a trailing generic word removed (`cash_flow_analysis` →
  /// `cash flow`), and every configured keyword.
  pub fn match_phrases(&self) -> Vec<String> {
    let words: Vec<&str> = self.name.split('_').filter(|w| !w.is_empty()).collect();
    let mut phrases = vec![words.join(" ")];

    if let Some((last, head)) = words.split_last()
      && !head.is_empty()
      && GENERIC_SUFFIXES.contains(last)
    {
      phrases.push(head.join(" "));
    }

    phrases.extend(self.keywords.iter().map(|k| k.trim().to_lowercase()));
    phrases.retain(|p| !p.is_empty());
    phrases.dedup();
    phrases
  }

  fn validate(&self) -> Result<()> {
    let fail = |why: String| {
      Err(Error::InvalidCatalog(format!("metric {:?}: {why}", self.name)))
    };

    if !is_sql_identifier(&self.name) {
      return fail("name is not a valid SQL identifier".into());
    }
    if self.source_tables.is_empty() {
      return fail("no source tables".into());
    }
    if let Some(bad) = self.source_tables.iter().find(|t| !is_sql_identifier(t)) {
      return fail(format!("source table {bad:?} is not a valid SQL identifier"));
    }
    if self.aggregation_kind == AggregationKind::Window
      && !self.time_dimension.is_periodic()
    {
      return fail(format!(
        "window aggregation needs a periodic time dimension, got {}",
        self.time_dimension
      ));
    }
    if self.lookback_months == Some(0) {
      return fail("lookback_months must be positive".into());
    }
    Ok(())
  }
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CatalogFile {
  #[serde(default)]
  metrics: Vec<MetricDefinition>,
}

/// Read-only registry of metric definitions.
///
/// Entries are held sorted by priority (descending) then name (ascending),
/// so [`MetricCatalog::all`] is deterministic.
#[derive(Debug, Clone)]
pub struct MetricCatalog {
  metrics: Vec<MetricDefinition>,
  index:   HashMap<String, usize>,
}

impl MetricCatalog {
  /// Build a catalog from definitions, rejecting duplicates and invalid
  /// entries.
  pub fn new(mut metrics: Vec<MetricDefinition>) -> Result<Self> {
    for metric in &metrics {
      metric.validate()?;
    }

    metrics.sort_by(|a, b| {
      b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name))
    });

    let mut index = HashMap::with_capacity(metrics.len());
    for (i, metric) in metrics.iter().enumerate() {
      if index.insert(metric.name.clone(), i).is_some() {
        return Err(Error::InvalidCatalog(format!(
          "duplicate metric {:?}",
          metric.name
        )));
      }
    }

    Ok(Self { metrics, index })
  }

  /// Parse a catalog from a TOML document with a `[[metrics]]` array.
  pub fn from_toml(source: &str) -> Result<Self> {
    let file: CatalogFile = toml::from_str(source)
      .map_err(|e| Error::InvalidCatalog(e.to_string()))?;
    Self::new(file.metrics)
  }

  /// The catalog compiled into the binary.
  pub fn embedded() -> Result<Self> { Self::from_toml(DEFAULT_CATALOG) }

  pub fn get(&self, name: &str) -> Result<&MetricDefinition> {
    self
      .index
      .get(name)
      .map(|&i| &self.metrics[i])
      .ok_or_else(|| Error::MetricNotFound(name.to_owned()))
  }

  pub fn contains(&self, name: &str) -> bool { self.index.contains_key(name) }

  /// Every definition, highest priority first, ties broken by name.
  pub fn all(&self) -> &[MetricDefinition] { &self.metrics }

  pub fn len(&self) -> usize { self.metrics.len() }

  pub fn is_empty(&self) -> bool { self.metrics.is_empty() }

  /// Order `names` the way [`MetricCatalog::all`] orders them. Unknown names
  /// are reported as [`Error::MetricNotFound`].
  pub fn ordered<'a>(
    &'a self,
    names: impl IntoIterator<Item = &'a str>,
  ) -> Result<Vec<&'a MetricDefinition>> {
    let mut positions = names
      .into_iter()
      .map(|n| {
        self
          .index
          .get(n)
          .copied()
          .ok_or_else(|| Error::MetricNotFound(n.to_owned()))
      })
      .collect::<Result<Vec<_>>>()?;
    positions.sort_unstable();
    positions.dedup();
    Ok(positions.into_iter().map(|i| &self.metrics[i]).collect())
  }
}
