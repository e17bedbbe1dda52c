//! Specialist agents and the registry the router validates plans against.
//!
//! An agent turns one [`AgentTask`] into one [`AgentResponse`]. Returning
//! `Err` is fine: the router records it as an `error` response so siblings
//! keep running.

mod analyst;
mod discovery;

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vantage_core::{
  Error, Result,
  answer::AgentResponse,
  engine::AnalyticsEngine,
  intent::{AgentId, QueryContext, QueryIntent},
  reasoner::Reasoner,
  schema::SchemaSnapshot,
};
use vantage_views::ViewManager;

pub use analyst::{AnalystAgent, AnalystSettings};
pub use discovery::DiscoveryAgent;

// ─── Profiles ────────────────────────────────────────────────────────────────

/// Which implementation backs a configured agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
  /// Reads the schema snapshot; never calls the reasoner.
  Discovery,
  /// Ensures and reads metric views, then interprets them with the reasoner.
  Analyst,
}

/// One `[[agents]]` entry of the routing table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
  pub name:        AgentId,
  pub kind:        AgentKind,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub specialties: Vec<String>,
}

impl AgentProfile {
  pub fn new(
    name: &str,
    kind: AgentKind,
    description: &str,
    specialties: &[&str],
  ) -> Self {
    Self {
      name: AgentId::new(name),
      kind,
      description: description.to_owned(),
      specialties: specialties.iter().map(|s| (*s).to_owned()).collect(),
    }
  }
}

/// The specialists available when no `[[agents]]` table is configured.
pub fn default_profiles() -> Vec<AgentProfile> {
  use AgentKind::{Analyst, Discovery};
  vec![
    AgentProfile::new(
      "intelligence",
      Analyst,
      "Financial and operational intelligence analysis",
      &["revenue", "profitability", "cash flow", "efficiency"],
    ),
    AgentProfile::new(
      "discovery",
      Discovery,
      "Data discovery: schema coverage, relationships and data quality",
      &["data quality", "relationships", "coverage"],
    ),
    AgentProfile::new(
      "strategy",
      Analyst,
      "Strategic analysis: positioning, opportunities and threats",
      &["opportunities", "threats", "scenarios"],
    ),
    AgentProfile::new(
      "forecasting",
      Analyst,
      "Predictive analytics over periodic metrics",
      &["revenue forecasting", "demand planning", "risk modeling"],
    ),
    AgentProfile::new(
      "decision",
      Analyst,
      "Decision support: prioritisation and trade-offs",
      &["resource allocation", "prioritization", "trade-offs"],
    ),
    AgentProfile::new(
      "visualization",
      Analyst,
      "Suggests charts and dashboards for the metrics involved",
      &["executive dashboards", "drill down"],
    ),
  ]
}

// ─── Agent ───────────────────────────────────────────────────────────────────

/// Everything an agent gets for one invocation.
#[derive(Debug, Clone)]
pub struct AgentTask {
  pub intent:         QueryIntent,
  pub context:        QueryContext,
  pub snapshot:       Arc<SchemaSnapshot>,
  /// Usable responses of agents that ran earlier in a sequential plan.
  pub prior_findings: Vec<AgentResponse>,
}

impl AgentTask {
  pub fn new(
    intent: QueryIntent,
    context: QueryContext,
    snapshot: Arc<SchemaSnapshot>,
  ) -> Self {
    Self { intent, context, snapshot, prior_findings: Vec::new() }
  }

  /// Top insight of each earlier agent, for prompts.
  pub fn prior_summary(&self) -> Vec<serde_json::Value> {
    self
      .prior_findings
      .iter()
      .map(|r| {
        serde_json::json!({
          "agent":      r.agent_name,
          "status":     r.status,
          "insights":   r.insights,
          "confidence": r.confidence,
        })
      })
      .collect()
  }
}

#[async_trait]
pub trait Agent: Send + Sync {
  fn profile(&self) -> &AgentProfile;

  fn id(&self) -> &AgentId { &self.profile().name }

  async fn run(&self, task: &AgentTask) -> Result<AgentResponse>;
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Owned map of agent name to agent. Built once at startup and shared
/// read-only.
#[derive(Default, Clone)]
pub struct AgentRegistry {
  agents: BTreeMap<AgentId, Arc<dyn Agent>>,
}

impl AgentRegistry {
  pub fn new() -> Self { Self::default() }

  /// Instantiate every profile against one view manager and reasoner.
  pub fn from_profiles<E: AnalyticsEngine + 'static>(
    profiles: &[AgentProfile],
    views: Arc<ViewManager<E>>,
    reasoner: Arc<dyn Reasoner>,
    analyst: AnalystSettings,
  ) -> Self {
    let mut registry = Self::new();
    for profile in profiles {
      let agent: Arc<dyn Agent> = match profile.kind {
        AgentKind::Discovery => Arc::new(DiscoveryAgent::new(
          profile.clone(),
          Arc::clone(views.catalog()),
        )),
        AgentKind::Analyst => Arc::new(AnalystAgent::new(
          profile.clone(),
          Arc::clone(&views),
          Arc::clone(&reasoner),
          analyst.clone(),
        )),
      };
      registry.register(agent);
    }
    registry
  }

  /// Add an agent, replacing any previous agent of the same name.
  pub fn register(&mut self, agent: Arc<dyn Agent>) -> Option<Arc<dyn Agent>> {
    self.agents.insert(agent.id().clone(), agent)
  }

  pub fn get(&self, id: &AgentId) -> Option<&Arc<dyn Agent>> {
    self.agents.get(id)
  }

  pub fn ids(&self) -> impl Iterator<Item = &AgentId> { self.agents.keys() }

  pub fn profiles(&self) -> Vec<AgentProfile> {
    self.agents.values().map(|a| a.profile().clone()).collect()
  }

  pub fn len(&self) -> usize { self.agents.len() }

  pub fn is_empty(&self) -> bool { self.agents.is_empty() }

  /// Resolve every agent of `intent` in plan order, failing on the first
  /// unknown name before anything runs.
  pub fn plan(&self, intent: &QueryIntent) -> Result<Vec<Arc<dyn Agent>>> {
    intent
      .agents_in_order()
      .into_iter()
      .map(|id| {
        self
          .get(id)
          .cloned()
          .ok_or_else(|| Error::UnknownAgent(id.to_string()))
      })
      .collect()
  }
}
