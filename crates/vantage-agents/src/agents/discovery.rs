use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;
use vantage_core::{
  Result,
  answer::{AgentResponse, AgentStatus},
  metric::{MetricCatalog, MetricDefinition},
  schema::SchemaSnapshot,
};

use super::{Agent, AgentProfile, AgentTask};

/// Reports what the current schema can and cannot answer: table and
/// relationship inventory, catalog coverage of the required metrics, and
/// nullable columns those metrics read.
pub struct DiscoveryAgent {
  profile: AgentProfile,
  catalog: Arc<MetricCatalog>,
}

impl DiscoveryAgent {
  pub fn new(profile: AgentProfile, catalog: Arc<MetricCatalog>) -> Self {
    Self { profile, catalog }
  }

  /// Metrics to check: the intent's, or the whole catalog when it names none.
  fn metrics_for<'a>(&'a self, task: &AgentTask) -> Vec<&'a MetricDefinition> {
    if task.intent.required_metrics.is_empty() {
      return self.catalog.all().iter().collect();
    }
    self
      .catalog
      .all()
      .iter()
      .filter(|m| task.intent.required_metrics.contains(&m.name))
      .collect()
  }
}

fn missing_tables<'a>(
  metric: &'a MetricDefinition,
  schema: &SchemaSnapshot,
) -> Vec<&'a str> {
  metric
    .source_tables
    .iter()
    .filter(|t| !schema.has_table(t))
    .map(String::as_str)
    .collect()
}

#[async_trait]
impl Agent for DiscoveryAgent {
  fn profile(&self) -> &AgentProfile { &self.profile }

  async fn run(&self, task: &AgentTask) -> Result<AgentResponse> {
    let started = Instant::now();
    let schema = task.snapshot.as_ref();
    let metrics = self.metrics_for(task);

    let mut insights = vec![format!(
      "Schema has {} tables, {} columns and {} relationships",
      schema.tables().len(),
      schema.column_count(),
      schema.relationships().count(),
    )];

    let mut coverage = Vec::with_capacity(metrics.len());
    let mut covered = 0usize;
    for metric in &metrics {
      let missing = missing_tables(metric, schema);
      if missing.is_empty() {
        covered += 1;
      } else {
        insights.push(format!(
          "{} cannot be computed: missing {}",
          metric.name,
          missing.join(", ")
        ));
      }
      coverage.push(json!({
        "metric":         metric.name,
        "available":      missing.is_empty(),
        "missing_tables": missing,
      }));
    }

    let mut nullable = Vec::new();
    for metric in &metrics {
      for table_name in &metric.source_tables {
        let Some(table) = schema.table(table_name) else { continue };
        for column in table.columns.iter().filter(|c| c.nullable) {
          let qualified = format!("{table_name}.{}", column.name);
          if !nullable.contains(&qualified) {
            nullable.push(qualified);
          }
        }
      }
    }
    if !nullable.is_empty() {
      insights.push(format!(
        "{} nullable columns feed these metrics; aggregates skip missing values",
        nullable.len()
      ));
    }

    for rel in schema.relationships().take(3) {
      insights.push(format!(
        "{}.{} links to {}",
        rel.from_table, rel.via_column, rel.to_table
      ));
    }

    let reviewed: Vec<&str> = task
      .prior_findings
      .iter()
      .map(|r| r.agent_name.as_str())
      .collect();

    let total = metrics.len();
    let (status, confidence) = if schema.tables().is_empty() {
      (AgentStatus::Partial, 0.1)
    } else if covered == total {
      (AgentStatus::Success, 0.9)
    } else {
      let ratio = covered as f64 / total as f64;
      (AgentStatus::Partial, 0.4 + 0.4 * ratio)
    };

    let data = json!({
      "tables": schema.tables(),
      "coverage": coverage,
      "nullable_columns": nullable,
      "fingerprint": schema.fingerprint(),
      "reviewed_findings_from": reviewed,
    });
    let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    Ok(
      AgentResponse::new(self.id().clone(), status, data, insights, confidence)
        .with_elapsed_ms(elapsed),
    )
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeSet;

  use vantage_core::{
    intent::{Coordination, IntentType, QueryContext, QueryIntent, Urgency},
    schema::SchemaSnapshot,
  };

  use super::*;
  use crate::agents::{AgentKind, AgentProfile};

  fn agent() -> DiscoveryAgent {
    DiscoveryAgent::new(
      AgentProfile::new("discovery", AgentKind::Discovery, "", &[]),
      Arc::new(MetricCatalog::embedded().unwrap()),
    )
  }

  fn task(metrics: &[&str], schema: SchemaSnapshot) -> AgentTask {
    let intent = QueryIntent {
      raw_question:      "what data do we have?".into(),
      intent_type:       IntentType::Explanatory,
      urgency:           Urgency::Low,
      required_metrics:  metrics.iter().map(|m| (*m).to_owned()).collect::<BTreeSet<_>>(),
      primary_agent:     "discovery".into(),
      supporting_agents: Vec::new(),
      coordination:      Coordination::Sequential,
      degraded:          false,
    };
    AgentTask::new(intent, QueryContext::default(), Arc::new(schema))
  }

  #[tokio::test]
  async fn full_coverage_succeeds() {
    let schema = SchemaSnapshot::builder()
      .table("financial_transactions_oltp", &[("amount", "REAL")])
      .build();
    let response = agent().run(&task(&["cash_flow_analysis"], schema)).await.unwrap();

    assert_eq!(response.status, AgentStatus::Success);
    assert!((response.confidence - 0.9).abs() < f64::EPSILON);
    assert_eq!(response.data["coverage"][0]["available"], true);
    assert!(response.insights[0].starts_with("Schema has 1 tables"));
  }

  #[tokio::test]
  async fn missing_tables_are_reported() {
    let schema = SchemaSnapshot::builder()
      .table("financial_transactions_oltp", &[("amount", "REAL")])
      .build();
    let response = agent()
      .run(&task(&["cash_flow_analysis", "customer_health_score"], schema))
      .await
      .unwrap();

    assert_eq!(response.status, AgentStatus::Partial);
    assert!(response.insights.iter().any(|i| {
      i.contains("customer_health_score cannot be computed")
        && i.contains("customers_oltp")
        && i.contains("projects_oltp")
    }));
    assert!(response.confidence < 0.9);
  }

  #[tokio::test]
  async fn empty_schema_is_partial() {
    let response = agent()
      .run(&task(&[], SchemaSnapshot::builder().build()))
      .await
      .unwrap();
    assert_eq!(response.status, AgentStatus::Partial);
    assert_eq!(
      response.data["coverage"].as_array().unwrap().len(),
      MetricCatalog::embedded().unwrap().len()
    );
  }
}
