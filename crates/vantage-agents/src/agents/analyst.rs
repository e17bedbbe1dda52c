use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};
use vantage_core::{
  Result,
  answer::{AgentResponse, AgentStatus},
  engine::{AnalyticsEngine, Row},
  reasoner::{Prompt, PromptKind, Reasoner, ReasonerError},
  schema::SchemaSnapshot,
  view::Performance,
};
use vantage_views::ViewManager;

use super::{Agent, AgentProfile, AgentTask};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalystSettings {
  /// Rows read from each metric view.
  pub row_limit:           usize,
  /// Deadline for the interpretation call. Keep it under the router's
  /// per-agent timeout so a slow reasoner still yields a partial answer.
  pub reasoner_timeout_ms: u64,
}

impl Default for AnalystSettings {
  fn default() -> Self { Self { row_limit: 50, reasoner_timeout_ms: 20_000 } }
}

/// Rows read from one metric view.
#[derive(Debug, Serialize)]
struct MetricData {
  metric:      String,
  view:        String,
  performance: Option<Performance>,
  rows:        Vec<Row>,
}

#[derive(Deserialize)]
struct Analysis {
  insights:        Vec<String>,
  #[serde(default)]
  recommendations: Vec<String>,
  confidence:      f64,
}

/// A metric analyst: ensures the views the intent needs, reads them, and
/// asks the reasoner to interpret the rows from its profile's angle.
///
/// One implementation serves every analytical role (intelligence, strategy,
/// forecasting, ...). The profile's description and specialties steer the
/// prompt.
pub struct AnalystAgent<E> {
  profile:  AgentProfile,
  views:    Arc<ViewManager<E>>,
  reasoner: Arc<dyn Reasoner>,
  settings: AnalystSettings,
}

impl<E: AnalyticsEngine> AnalystAgent<E> {
  pub fn new(
    profile: AgentProfile,
    views: Arc<ViewManager<E>>,
    reasoner: Arc<dyn Reasoner>,
    settings: AnalystSettings,
  ) -> Self {
    Self { profile, views, reasoner, settings }
  }

  async fn read_metric(&self, metric: &str, schema: &SchemaSnapshot) -> Result<MetricData> {
    let view = self.views.ensure(metric, schema).await?;
    let rows = self.views.rows(metric, self.settings.row_limit).await?;
    Ok(MetricData {
      metric: metric.to_owned(),
      view: view.view_name,
      performance: view.last_performance,
      rows,
    })
  }

  fn instructions(&self) -> String {
    format!(
      "You are the {name} agent of a business intelligence team: {description}. \
       Focus on: {specialties}. Interpret the metric rows in the payload to \
       answer the question, building on any prior findings. Cite concrete \
       numbers from the rows. Reply with JSON: {{\"insights\": [string, most \
       important first], \"recommendations\": [string], \"confidence\": number \
       between 0 and 1}}.",
      name = self.profile.name,
      description = self.profile.description,
      specialties = self.profile.specialties.join(", "),
    )
  }

  async fn interpret(&self, prompt: &Prompt) -> Result<Analysis, ReasonerError> {
    let after = Duration::from_millis(self.settings.reasoner_timeout_ms);
    let reply = timeout(after, self.reasoner.reason(prompt))
      .await
      .map_err(|_| ReasonerError::Timeout(self.settings.reasoner_timeout_ms))??;
    let analysis: Analysis = serde_json::from_value(reply)
      .map_err(|e| ReasonerError::Malformed(e.to_string()))?;
    if analysis.insights.is_empty() {
      return Err(ReasonerError::Malformed("no insights".into()));
    }
    Ok(analysis)
  }
}

/// `key=value` pairs of the scalar fields of a row.
fn describe_row(row: &Row) -> String {
  row
    .iter()
    .filter_map(|(k, v)| match v {
      serde_json::Value::String(s) => Some(format!("{k}={s}")),
      serde_json::Value::Number(n) => Some(format!("{k}={n}")),
      _ => None,
    })
    .take(8)
    .collect::<Vec<_>>()
    .join(", ")
}

/// Insights that need no interpretation: what was read, and the first row.
fn data_insights(gathered: &[MetricData]) -> Vec<String> {
  let mut insights = Vec::new();
  for data in gathered {
    insights.push(format!(
      "{}: {} rows read from {}",
      data.metric,
      data.rows.len(),
      data.view
    ));
    if let Some(first) = data.rows.first() {
      insights.push(format!("{} first row: {}", data.metric, describe_row(first)));
    }
  }
  insights
}

#[async_trait]
impl<E: AnalyticsEngine + 'static> Agent for AnalystAgent<E> {
  fn profile(&self) -> &AgentProfile { &self.profile }

  async fn run(&self, task: &AgentTask) -> Result<AgentResponse> {
    let started = Instant::now();
    let id = self.id().clone();
    let metrics = self
      .views
      .catalog()
      .ordered(task.intent.required_metrics.iter().map(String::as_str))?;

    if metrics.is_empty() {
      return Ok(AgentResponse::new(
        id,
        AgentStatus::Partial,
        json!({ "metrics": [] }),
        vec!["No catalog metric matches this question".into()],
        0.2,
      ));
    }

    let total = metrics.len();
    let mut gathered = Vec::with_capacity(total);
    let mut failures = Vec::new();
    for metric in metrics {
      match self.read_metric(&metric.name, &task.snapshot).await {
        Ok(data) => gathered.push(data),
        Err(e) => {
          warn!(agent = %id, metric = %metric.name, error = %e, "metric unavailable");
          failures.push((metric.name.clone(), e));
        }
      }
    }
    if gathered.is_empty() && !failures.is_empty() {
      return Err(failures.swap_remove(0).1);
    }

    let unavailable: Vec<String> = failures
      .iter()
      .map(|(metric, e)| format!("{metric} unavailable: {e}"))
      .collect();
    let prompt = Prompt::new(
      PromptKind::Analysis,
      self.instructions(),
      json!({
        "question":            task.intent.raw_question,
        "intent":              task.intent,
        "dashboard_state":     task.context.dashboard_state,
        "metrics":             gathered,
        "unavailable_metrics": unavailable,
        "prior_findings":      task.prior_summary(),
      }),
    );

    let coverage = gathered.len() as f64 / total as f64;
    let data = json!({ "metrics": gathered, "unavailable": unavailable });

    let response = match self.interpret(&prompt).await {
      Ok(analysis) => {
        debug!(agent = %id, insights = analysis.insights.len(), "analysis complete");
        let status = if unavailable.is_empty() {
          AgentStatus::Success
        } else {
          AgentStatus::Partial
        };
        let mut insights = analysis.insights;
        insights.extend(unavailable);
        AgentResponse::new(id, status, data, insights, analysis.confidence * coverage)
          .with_recommendations(analysis.recommendations)
      }
      Err(e) => {
        warn!(agent = %id, error = %e, "reasoner failed; returning data-derived insights");
        let mut insights = data_insights(&gathered);
        insights.extend(unavailable);
        insights.push(format!("Interpretation unavailable: {e}"));
        AgentResponse::new(id, AgentStatus::Partial, data, insights, 0.3 * coverage)
      }
    };

    let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    Ok(response.with_elapsed_ms(elapsed))
  }
}
