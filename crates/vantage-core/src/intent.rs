//! [`QueryIntent`]: the structured reading of one free-text question.

use std::{collections::BTreeSet, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

// ─── Agent identity ──────────────────────────────────────────────────────────

/// Name of a specialist agent, e.g. `intelligence` or `discovery`.
///
/// An open string: which agents exist is decided by the agent
/// registry, and the router validates every plan against it.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
  pub fn new(name: impl Into<String>) -> Self {
    Self(name.into().trim().to_lowercase())
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for AgentId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for AgentId {
  fn from(s: &str) -> Self { Self::new(s) }
}

// ─── Classification enums ────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntentType {
  Analytical,
  Operational,
  Strategic,
  Forecasting,
  Explanatory,
  Comparative,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
  Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Urgency {
  Low,
  #[default]
  Medium,
  High,
  Critical,
}

/// How the router runs the agents of a plan.
///
/// A closed set: anything else coming back from the reasoner is a
/// classification error, never a silent default.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Coordination {
  /// Primary first; each supporting agent sees every earlier finding.
  Sequential,
  /// All agents at once; failures are contained per agent.
  Parallel,
}

// ─── Intent ──────────────────────────────────────────────────────────────────

/// Created once per question, never mutated, discarded with the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIntent {
  pub raw_question:      String,
  #[serde(rename = "type")]
  pub intent_type:       IntentType,
  pub urgency:           Urgency,
  pub required_metrics:  BTreeSet<String>,
  pub primary_agent:     AgentId,
  pub supporting_agents: Vec<AgentId>,
  pub coordination:      Coordination,
  /// Set when the keyword fallback produced this intent instead of the
  /// reasoner. Callers should expect lower confidence downstream.
  #[serde(default)]
  pub degraded:          bool,
}

impl QueryIntent {
  /// Supporting agents in plan order, minus repeats and minus the primary.
  pub fn supporting_in_order(&self) -> Vec<&AgentId> {
    let mut seen: BTreeSet<&AgentId> = BTreeSet::from([&self.primary_agent]);
    self
      .supporting_agents
      .iter()
      .filter(|a| seen.insert(*a))
      .collect()
  }

  /// Primary first, then [`QueryIntent::supporting_in_order`].
  pub fn agents_in_order(&self) -> Vec<&AgentId> {
    let mut all = vec![&self.primary_agent];
    all.extend(self.supporting_in_order());
    all
  }
}

// ─── Request context ─────────────────────────────────────────────────────────

/// One earlier question/answer pair from the same conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryTurn {
  pub asked_at: DateTime<Utc>,
  pub question: String,
  pub answer:   String,
  pub agents:   Vec<AgentId>,
}

/// What the classifier knows besides the question itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryContext {
  /// Whatever the dashboard reports about its current view; opaque here.
  #[serde(default)]
  pub dashboard_state: serde_json::Value,
  #[serde(default)]
  pub recent_history:  Vec<HistoryTurn>,
}
