//! Agent outputs and the synthesized answer built from them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::intent::AgentId;

// ─── Agent response ──────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AgentStatus {
  Success,
  /// Data was gathered but interpretation was incomplete.
  Partial,
  Error,
}

/// Output of one agent invocation. Produced once, never edited afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
  pub agent_name:      AgentId,
  pub status:          AgentStatus,
  /// Agent-specific structured payload.
  pub data:            serde_json::Value,
  /// Most important first.
  pub insights:        Vec<String>,
  #[serde(default)]
  pub recommendations: Vec<String>,
  /// Always within `[0, 1]`.
  pub confidence:      f64,
  /// Cause of an `Error` status.
  #[serde(default)]
  pub error:           Option<String>,
  #[serde(default)]
  pub elapsed_ms:      u64,
}

impl AgentResponse {
  pub fn new(
    agent_name: AgentId,
    status: AgentStatus,
    data: serde_json::Value,
    insights: Vec<String>,
    confidence: f64,
  ) -> Self {
    Self {
      agent_name,
      status,
      data,
      insights,
      recommendations: Vec::new(),
      confidence: clamp_unit(confidence),
      error: None,
      elapsed_ms: 0,
    }
  }

  /// An `Error` response carrying `cause`; confidence is zero.
  pub fn failure(agent_name: AgentId, cause: impl Into<String>) -> Self {
    let cause = cause.into();
    Self {
      agent_name,
      status: AgentStatus::Error,
      data: serde_json::Value::Null,
      insights: Vec::new(),
      recommendations: Vec::new(),
      confidence: 0.0,
      error: Some(cause),
      elapsed_ms: 0,
    }
  }

  pub fn with_recommendations(mut self, recommendations: Vec<String>) -> Self {
    self.recommendations = recommendations;
    self
  }

  pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
    self.elapsed_ms = elapsed_ms;
    self
  }

  /// `Success` or `Partial`: carries findings worth synthesizing.
  pub fn is_usable(&self) -> bool { self.status != AgentStatus::Error }
}

/// Clamp into `[0, 1]`; NaN becomes 0.
pub fn clamp_unit(value: f64) -> f64 {
  if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

// ─── Synthesized answer ──────────────────────────────────────────────────────

/// Whether an answer is whole, built from a fallback path, or empty because
/// there was genuinely nothing to report.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnswerQuality {
  Complete,
  Degraded,
  NoData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedAnswer {
  pub direct_answer:       String,
  pub implications:        String,
  pub recommended_actions: Vec<String>,
  pub evidence:            serde_json::Value,
  pub follow_up_questions: Vec<String>,
  pub confidence:          f64,
  pub contributing_agents: BTreeSet<AgentId>,
  pub quality:             AnswerQuality,
  /// Human-readable notes about anything that reduced answer quality.
  pub caveats:             Vec<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn confidence_is_clamped() {
    let r = AgentResponse::new(
      "intelligence".into(),
      AgentStatus::Success,
      serde_json::Value::Null,
      vec![],
      1.7,
    );
    assert_eq!(r.confidence, 1.0);
    assert_eq!(clamp_unit(-0.2), 0.0);
    assert_eq!(clamp_unit(f64::NAN), 0.0);
  }

  #[test]
  fn failure_is_not_usable() {
    let r = AgentResponse::failure("strategy".into(), "timed out");
    assert!(!r.is_usable());
    assert_eq!(r.error.as_deref(), Some("timed out"));
    assert_eq!(r.confidence, 0.0);
  }
}
