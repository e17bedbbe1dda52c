//! View SQL generation: a pure function of (metric, schema snapshot).
//!
//! Dispatches on [`MetricCategory`] to a strategy. Each strategy reads the
//! metric's `source_tables` by position, checks the columns it needs against
//! the snapshot, and renders a `SELECT` for the engine's [`Dialect`]. The
//! only date in the output is the injected
//! [`GenerationParams::reference_date`], so output is byte-stable for equal
//! inputs.

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use vantage_core::{
  Error, Result,
  engine::Dialect,
  metric::{AggregationKind, MetricCategory, MetricDefinition, TimeDimension},
  schema::SchemaSnapshot,
};

use crate::{
  dialect::{date_literal, days_between, period_index, period_label},
  health::{HealthInputs, HealthWeights, category_sql, score_sql},
};

// ─── Parameters ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
  /// "Today" for every date window and age calculation.
  pub reference_date:          NaiveDate,
  /// Used when a metric does not set `lookback_months`.
  pub default_lookback_months: u32,
  pub health:                  HealthWeights,
}

impl GenerationParams {
  pub fn new(reference_date: NaiveDate) -> Self {
    Self {
      reference_date,
      default_lookback_months: 24,
      health: HealthWeights::default(),
    }
  }
}

// ─── Table roles ─────────────────────────────────────────────────────────────

const TRANSACTION_COLUMNS: &[&str] =
  &["transaction_date", "transaction_type", "amount", "project_id"];
const PROJECT_JOIN_COLUMNS: &[&str] = &["project_id", "customer_id"];
const PROJECT_COLUMNS: &[&str] = &[
  "project_type",
  "status",
  "start_date",
  "end_date",
  "budget_amount",
  "actual_cost",
];
const CUSTOMER_COLUMNS: &[&str] =
  &["customer_id", "customer_name", "risk_score", "average_payment_days"];
const CUSTOMER_PROJECT_COLUMNS: &[&str] =
  &["project_id", "customer_id", "start_date", "budget_amount"];

/// Placeholder age for customers who never had a project.
const NO_PROJECT_DAYS: u32 = 9999;

// ─── Generator ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SqlGenerator {
  dialect: Dialect,
  params:  GenerationParams,
}

impl SqlGenerator {
  pub fn new(dialect: Dialect, params: GenerationParams) -> Self {
    Self { dialect, params }
  }

  pub fn dialect(&self) -> Dialect { self.dialect }

  pub fn params(&self) -> &GenerationParams { &self.params }

  /// Render the view body for `metric` against `schema`.
  ///
  /// Fails with [`Error::SchemaMismatch`] when a source table or a required
  /// column is missing from the snapshot.
  pub fn generate(
    &self,
    metric: &MetricDefinition,
    schema: &SchemaSnapshot,
  ) -> Result<String> {
    let ctx = Ctx::new(self, metric, schema)?;
    let sql = match metric.category {
      MetricCategory::Financial
        if metric.aggregation_kind == AggregationKind::Calculated =>
      {
        ctx.cash_flow()?
      }
      MetricCategory::Financial => ctx.financial_rollup()?,
      MetricCategory::Operational => ctx.operational()?,
      MetricCategory::Customer => ctx.customer_health()?,
      MetricCategory::Trend => ctx.trend()?,
    };
    Ok(sql)
  }
}

/// Everything one `generate` call needs, resolved up front.
struct Ctx<'a> {
  dialect: Dialect,
  params:  &'a GenerationParams,
  metric:  &'a MetricDefinition,
  schema:  &'a SchemaSnapshot,
  today:   String,
  since:   String,
}

impl<'a> Ctx<'a> {
  fn new(
    generator: &'a SqlGenerator,
    metric: &'a MetricDefinition,
    schema: &'a SchemaSnapshot,
  ) -> Result<Self> {
    let dialect = generator.dialect;
    let params = &generator.params;
    let months = metric
      .lookback_months
      .unwrap_or(params.default_lookback_months);
    let since = params
      .reference_date
      .checked_sub_months(Months::new(months))
      .ok_or_else(|| {
        Error::InvalidCatalog(format!(
          "lookback of {months} months for {} is out of range",
          metric.name
        ))
      })?;

    Ok(Self {
      dialect,
      params,
      metric,
      schema,
      today: date_literal(dialect, params.reference_date),
      since: date_literal(dialect, since),
    })
  }

  fn mismatch(&self, detail: String) -> Error {
    Error::SchemaMismatch { metric: self.metric.name.clone(), detail }
  }

  /// The source table at `position`, checked for `columns`.
  fn table(&self, position: usize, columns: &[&str]) -> Result<&'a str> {
    let name = self
      .metric
      .source_tables
      .get(position)
      .ok_or_else(|| {
        self.mismatch(format!("expected a source table at position {position}"))
      })?
      .as_str();
    let table = self
      .schema
      .table(name)
      .ok_or_else(|| self.mismatch(format!("source table {name} not found")))?;

    let missing: Vec<&str> = columns
      .iter()
      .copied()
      .filter(|c| !table.has_column(c))
      .collect();
    if !missing.is_empty() {
      return Err(
        self.mismatch(format!("table {name} lacks columns: {}", missing.join(", "))),
      );
    }
    Ok(name)
  }

  fn optional_table(&self, position: usize, columns: &[&str]) -> Result<Option<&'a str>> {
    if self.metric.source_tables.len() <= position {
      return Ok(None);
    }
    self.table(position, columns).map(Some)
  }

  fn has_column(&self, table: &str, column: &str) -> bool {
    self.schema.table(table).is_some_and(|t| t.has_column(column))
  }

  fn period(&self, column: &str) -> Option<String> {
    period_label(self.dialect, self.metric.time_dimension, column)
  }

  /// Date-window predicates on `column` for the metric's time dimension.
  fn window(&self, column: &str) -> Vec<String> {
    match self.metric.time_dimension {
      TimeDimension::Lifetime => Vec::new(),
      _ => vec![
        format!("{column} >= {}", self.since),
        format!("{column} <= {}", self.today),
      ],
    }
  }

  fn days_since(&self, column: &str) -> String {
    days_between(self.dialect, &self.today, column)
  }

  // ── Financial ─────────────────────────────────────────────────────────

  /// `SUM(CASE WHEN ft.transaction_type = 'X' THEN ft.amount ELSE 0 END)`,
  /// or the `AVG` form for averaging metrics.
  fn amount_of(&self, transaction_type: &str) -> String {
    match self.metric.aggregation_kind {
      AggregationKind::Avg => format!(
        "AVG(CASE WHEN ft.transaction_type = '{transaction_type}' THEN ft.amount END)"
      ),
      _ => format!(
        "SUM(CASE WHEN ft.transaction_type = '{transaction_type}' THEN ft.amount \
         ELSE 0 END)"
      ),
    }
  }

  fn financial_rollup(&self) -> Result<String> {
    let facts = self.table(0, TRANSACTION_COLUMNS)?;
    let projects = self.optional_table(1, PROJECT_JOIN_COLUMNS)?;

    let revenue = self.amount_of("INVOICE");
    let costs = self.amount_of("COST");
    let mut q = Query::select_from(format!("{facts} ft"));
    if let Some(period) = self.period("ft.transaction_date") {
      q.periodic(period);
    }
    q.column(format!("{revenue} AS revenue"));
    q.column(format!("{costs} AS costs"));
    q.column(format!("{revenue} - {costs} AS net_profit"));
    q.column("COUNT(DISTINCT ft.project_id) AS active_projects");
    if let Some(projects) = projects {
      q.join(format!("LEFT JOIN {projects} p ON ft.project_id = p.project_id"));
      q.column("COUNT(DISTINCT p.customer_id) AS active_customers");
    }
    q.filters.extend(self.window("ft.transaction_date"));
    if self.has_column(facts, "status") {
      q.filter("ft.status = 'COMPLETED'");
    }
    Ok(q.render())
  }

  fn cash_flow(&self) -> Result<String> {
    let facts = self.table(0, &["transaction_date", "transaction_type", "amount"])?;

    let invoiced = self.amount_of("INVOICE");
    let collected = self.amount_of("PAYMENT");
    let mut q = Query::select_from(format!("{facts} ft"));
    if let Some(period) = self.period("ft.transaction_date") {
      q.periodic(period);
    }
    q.column(format!("{invoiced} AS invoiced"));
    q.column(format!("{collected} AS collected"));
    q.column(format!("{invoiced} - {collected} AS outstanding_ar"));
    q.column(format!(
      "CASE WHEN {invoiced} > 0 THEN 100.0 * {collected} / {invoiced} ELSE 0.0 END \
       AS collection_rate"
    ));
    q.column(format!(
      "AVG({}) AS avg_days_outstanding",
      self.days_since("ft.transaction_date")
    ));
    q.filters.extend(self.window("ft.transaction_date"));
    if self.has_column(facts, "status") {
      q.filter("ft.status = 'COMPLETED'");
    }
    q.filter("ft.transaction_type IN ('INVOICE', 'PAYMENT')");
    Ok(q.render())
  }

  // ── Operational ───────────────────────────────────────────────────────

  fn operational(&self) -> Result<String> {
    let projects = self.table(0, PROJECT_COLUMNS)?;
    let d = self.dialect;

    let mut q = Query::select_from(format!("{projects} p"));
    let period = self.period("p.start_date");
    if let Some(period) = &period {
      q.periodic(period.clone());
    }
    q.column("p.project_type");
    q.column("p.status");
    q.column("COUNT(*) AS project_count");
    q.column(format!(
      "AVG(CASE WHEN p.end_date IS NOT NULL THEN {} ELSE {} END) AS avg_duration_days",
      days_between(d, "p.end_date", "p.start_date"),
      self.days_since("p.start_date"),
    ));
    q.column(
      "AVG(CASE WHEN p.budget_amount > 0 THEN 100.0 * p.actual_cost / \
       p.budget_amount END) AS avg_budget_utilization_pct",
    );
    q.column("SUM(p.budget_amount) AS total_planned_value");
    q.column("SUM(p.actual_cost) AS total_actual_cost");
    q.column(
      "CASE WHEN SUM(p.budget_amount) > 0 THEN 100.0 * (SUM(p.budget_amount) - \
       SUM(p.actual_cost)) / SUM(p.budget_amount) ELSE 0.0 END AS cost_savings_pct",
    );
    q.filters.extend(self.window("p.start_date"));
    q.group_by.extend(["p.project_type".to_owned(), "p.status".to_owned()]);
    q.order_by = Some(match period {
      Some(_) => "period DESC, project_count DESC, p.project_type, p.status".into(),
      None => "project_count DESC, p.project_type, p.status".into(),
    });
    Ok(q.render())
  }

  // ── Customer ──────────────────────────────────────────────────────────

  fn customer_health(&self) -> Result<String> {
    let customers = self.table(0, CUSTOMER_COLUMNS)?;
    let projects = self.table(1, CUSTOMER_PROJECT_COLUMNS)?;

    let count = "COUNT(p.project_id)";
    let days_since = self.days_since("MAX(p.start_date)");
    let score = score_sql(self.dialect, &self.params.health, &HealthInputs {
      risk_score:              "c.risk_score",
      average_payment_days:    "c.average_payment_days",
      days_since_last_project: &days_since,
      project_count:           count,
    });

    let mut keys = vec!["c.customer_id", "c.customer_name"];
    if self.has_column(customers, "industry") {
      keys.push("c.industry");
    }
    keys.extend(["c.risk_score", "c.average_payment_days"]);

    let mut q = Query::select_from(format!("{customers} c"));
    q.columns.extend(keys.iter().map(|k| k.to_string()));
    q.column(format!("{count} AS total_projects"));
    q.column("COALESCE(SUM(p.budget_amount), 0) AS total_project_value");
    q.column("MAX(p.start_date) AS last_project_date");
    q.column(format!(
      "COALESCE({days_since}, {NO_PROJECT_DAYS}) AS days_since_last_project"
    ));
    q.column(format!("{} AS health_category", category_sql(count, &days_since)));
    q.column(format!("{score} AS health_score"));
    q.join(format!(
      "LEFT JOIN {projects} p ON c.customer_id = p.customer_id AND p.start_date <= {}",
      self.today
    ));
    if self.has_column(customers, "status") {
      q.filter("(c.status = 'ACTIVE' OR c.status IS NULL)");
    }
    q.group_by.extend(keys.iter().map(|k| k.to_string()));
    q.order_by = Some("health_score DESC, c.customer_id".into());
    Ok(q.render())
  }

  // ── Trend ─────────────────────────────────────────────────────────────

  fn trend(&self) -> Result<String> {
    let facts = self.table(0, &["transaction_date", "transaction_type", "amount"])?;
    let dimension = self.metric.time_dimension;
    let (Some(period), Some(index), Some(per_year)) = (
      self.period("ft.transaction_date"),
      period_index(self.dialect, dimension, "ft.transaction_date"),
      dimension.periods_per_year(),
    ) else {
      return Err(Error::InvalidCatalog(format!(
        "trend metric {} needs a monthly or quarterly time dimension, not {dimension}",
        self.metric.name
      )));
    };

    let total = match self.metric.aggregation_kind {
      AggregationKind::Avg => "AVG(ft.amount)",
      _ => "SUM(ft.amount)",
    };
    let mut totals = Query::select_from(format!("{facts} ft"));
    totals.periodic(period);
    totals.column(format!("{index} AS period_index"));
    totals.group_by.push(index);
    totals.column(format!("{total} AS revenue"));
    totals.column("COUNT(*) AS transaction_count");
    totals.filters.extend(self.window("ft.transaction_date"));
    totals.filter("ft.transaction_type = 'INVOICE'");
    if self.has_column(facts, "status") {
      totals.filter("ft.status = 'COMPLETED'");
    }
    totals.order_by = None;

    // Frames are over calendar position, so a period with no rows leaves a
    // NULL baseline instead of shifting the comparison.
    let prior = |n: u32| {
      format!(
        "MAX(revenue) OVER (ORDER BY period_index RANGE BETWEEN {n} PRECEDING AND {n} \
         PRECEDING)"
      )
    };
    let growth = |n: u32| {
      let prior = prior(n);
      format!(
        "CASE WHEN {prior} > 0 THEN 100.0 * (revenue - {prior}) / {prior} END"
      )
    };

    let mut q = Query::select_from("period_totals");
    q.columns.extend(["period", "revenue", "transaction_count"].map(String::from));
    q.column(format!("{} AS prior_period_revenue", prior(1)));
    q.column(format!("{} AS period_growth_pct", growth(1)));
    q.column(format!("{} AS prior_year_revenue", prior(per_year)));
    q.column(format!("{} AS yoy_growth_pct", growth(per_year)));
    q.order_by = Some("period DESC".into());

    Ok(format!("WITH period_totals AS (\n{}\n)\n{}", totals.render(), q.render()))
  }
}

// ─── Query builder ───────────────────────────────────────────────────────────

/// Just enough structure to render one `SELECT` consistently.
#[derive(Debug, Default)]
struct Query {
  columns:  Vec<String>,
  from:     String,
  joins:    Vec<String>,
  filters:  Vec<String>,
  group_by: Vec<String>,
  order_by: Option<String>,
}

impl Query {
  fn select_from(from: impl Into<String>) -> Self {
    Self { from: from.into(), ..Default::default() }
  }

  /// Lead with a `period` column, group by it and list newest first.
  fn periodic(&mut self, period: String) {
    self.columns.insert(0, format!("{period} AS period"));
    self.group_by.insert(0, period);
    self.order_by = Some("period DESC".into());
  }

  fn column(&mut self, column: impl Into<String>) { self.columns.push(column.into()); }

  fn join(&mut self, join: impl Into<String>) { self.joins.push(join.into()); }

  fn filter(&mut self, filter: impl Into<String>) { self.filters.push(filter.into()); }

  fn render(&self) -> String {
    let mut sql = format!("SELECT\n  {}\nFROM {}", self.columns.join(",\n  "), self.from);
    for join in &self.joins {
      sql.push('\n');
      sql.push_str(join);
    }
    if !self.filters.is_empty() {
      sql.push_str("\nWHERE ");
      sql.push_str(&self.filters.join("\n  AND "));
    }
    if !self.group_by.is_empty() {
      sql.push_str("\nGROUP BY ");
      sql.push_str(&self.group_by.join(", "));
    }
    if let Some(order) = &self.order_by {
      sql.push_str("\nORDER BY ");
      sql.push_str(order);
    }
    sql
  }
}

#[cfg(test)]
mod tests {
  use vantage_core::metric::MetricCatalog;

  use super::*;

  fn reference() -> NaiveDate { NaiveDate::from_ymd_opt(2025, 6, 30).unwrap() }

  fn generator(dialect: Dialect) -> SqlGenerator {
    SqlGenerator::new(dialect, GenerationParams::new(reference()))
  }

  fn snapshot() -> SchemaSnapshot {
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
        ("industry", "TEXT"),
        ("risk_score", "REAL"),
        ("average_payment_days", "REAL"),
        ("status", "TEXT"),
      ])
      .relationship("financial_transactions_oltp", "projects_oltp", "project_id")
      .relationship("projects_oltp", "customers_oltp", "customer_id")
      .build()
  }

  fn metric(name: &str) -> MetricDefinition {
    MetricCatalog::embedded().unwrap().get(name).unwrap().clone()
  }

  #[test]
  fn generation_is_deterministic() {
    let schema = snapshot();
    for dialect in [Dialect::MySql, Dialect::Sqlite] {
      for m in MetricCatalog::embedded().unwrap().all() {
        let a = generator(dialect).generate(m, &schema).unwrap();
        let b = generator(dialect).generate(m, &schema).unwrap();
        assert_eq!(a, b, "{} differs between runs", m.name);
      }
    }
  }

  #[test]
  fn reference_date_is_the_only_clock() {
    let schema = snapshot();
    let m = metric("cash_flow_analysis");
    let sql = generator(Dialect::MySql).generate(&m, &schema).unwrap();
    assert!(sql.contains("DATE '2025-06-30'"));
    // 18-month lookback from the catalog
    assert!(sql.contains("DATE '2023-12-30'"));
    assert!(!sql.contains("CURDATE"));

    let later = SqlGenerator::new(
      Dialect::MySql,
      GenerationParams::new(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()),
    );
    assert_ne!(later.generate(&m, &schema).unwrap(), sql);
  }

  #[test]
  fn cash_flow_shape() {
    let sql = generator(Dialect::Sqlite)
      .generate(&metric("cash_flow_analysis"), &snapshot())
      .unwrap();
    for col in ["invoiced", "collected", "outstanding_ar", "collection_rate", "avg_days_outstanding"] {
      assert!(sql.contains(&format!("AS {col}")), "missing {col}");
    }
    assert!(sql.contains("strftime('%Y-%m', ft.transaction_date) AS period"));
    assert!(sql.contains("ft.transaction_type IN ('INVOICE', 'PAYMENT')"));
  }

  #[test]
  fn revenue_joins_projects_when_given() {
    let sql = generator(Dialect::MySql)
      .generate(&metric("revenue_trend"), &snapshot())
      .unwrap();
    assert!(sql.contains("LEFT JOIN projects_oltp p ON ft.project_id = p.project_id"));
    assert!(sql.contains("AS active_customers"));
    assert!(sql.contains("ft.status = 'COMPLETED'"));
  }

  #[test]
  fn trend_compares_against_prior_year() {
    let sql = generator(Dialect::Sqlite)
      .generate(&metric("business_trends"), &snapshot())
      .unwrap();
    assert!(sql.starts_with("WITH period_totals AS ("));
    assert!(sql.contains("AS period_index"));
    assert!(sql.contains(
      "OVER (ORDER BY period_index RANGE BETWEEN 1 PRECEDING AND 1 PRECEDING)"
    ));
    assert!(sql.contains(
      "OVER (ORDER BY period_index RANGE BETWEEN 12 PRECEDING AND 12 PRECEDING)"
    ));
    assert!(!sql.contains("LAG("));
  }

  #[test]
  fn customer_health_is_clamped() {
    let sql = generator(Dialect::MySql)
      .generate(&metric("customer_health_score"), &snapshot())
      .unwrap();
    assert!(sql.contains("GREATEST(0.0, LEAST(100.0,"));
    assert!(sql.contains("AND p.start_date <= DATE '2025-06-30'"));
    assert!(sql.contains("c.industry"));
  }

  #[test]
  fn missing_table_is_a_schema_mismatch() {
    let schema = SchemaSnapshot::builder()
      .table("projects_oltp", &[("project_id", "INTEGER")])
      .build();
    let err = generator(Dialect::Sqlite)
      .generate(&metric("cash_flow_analysis"), &schema)
      .unwrap_err();
    assert!(matches!(err, Error::SchemaMismatch { ref detail, .. } if detail.contains("not found")));
  }

  #[test]
  fn missing_columns_are_listed() {
    let schema = SchemaSnapshot::builder()
      .table("projects_oltp", &[("project_id", "INTEGER"), ("status", "TEXT")])
      .build();
    let err = generator(Dialect::Sqlite)
      .generate(&metric("project_efficiency"), &schema)
      .unwrap_err();
    let Error::SchemaMismatch { detail, .. } = err else { panic!("wrong error") };
    assert!(detail.contains("project_type"));
    assert!(detail.contains("actual_cost"));
  }

  #[test]
  fn generated_sqlite_runs() {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    conn
      .execute_batch(
        "CREATE TABLE financial_transactions_oltp (transaction_id INTEGER PRIMARY KEY, \
           project_id INTEGER, transaction_date DATE, transaction_type TEXT, amount REAL, status TEXT);
         CREATE TABLE projects_oltp (project_id INTEGER PRIMARY KEY, customer_id INTEGER, \
           project_type TEXT, status TEXT, start_date DATE, end_date DATE, budget_amount REAL, actual_cost REAL);
         CREATE TABLE customers_oltp (customer_id INTEGER PRIMARY KEY, customer_name TEXT, \
           industry TEXT, risk_score REAL, average_payment_days REAL, status TEXT);",
      )
      .unwrap();
    let schema = snapshot();
    for m in MetricCatalog::embedded().unwrap().all() {
      let sql = generator(Dialect::Sqlite).generate(m, &schema).unwrap();
      conn
        .execute_batch(&format!("CREATE VIEW analytics_{} AS {sql};", m.name))
        .unwrap();
      conn
        .query_row(&format!("SELECT COUNT(*) FROM analytics_{}", m.name), [], |r| r.get::<_, i64>(0))
        .unwrap();
    }
  }
}
