//! The external reasoning collaborator (a hosted language model).
//!
//! Every call site treats the reasoner as unreliable: replies are validated
//! before use, and unreachable/timeout/rate-limit failures are recoverable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

/// Which reply schema the caller expects back.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PromptKind {
  Classification,
  Analysis,
  Synthesis,
}

/// A structured prompt: instructions plus a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
  pub kind:         PromptKind,
  pub instructions: String,
  pub payload:      serde_json::Value,
}

impl Prompt {
  pub fn new(
    kind: PromptKind,
    instructions: impl Into<String>,
    payload: serde_json::Value,
  ) -> Self {
    Self { kind, instructions: instructions.into(), payload }
  }
}

#[derive(Debug, Clone, Error)]
pub enum ReasonerError {
  #[error("reasoner unavailable: {0}")]
  Unavailable(String),

  #[error("reasoner timed out after {0} ms")]
  Timeout(u64),

  #[error("reasoner rate limited")]
  RateLimited,

  /// The reply arrived but is not the JSON we asked for.
  #[error("malformed reasoner reply: {0}")]
  Malformed(String),

  /// The service understood the request and refused it.
  #[error("reasoner rejected request: {0}")]
  Rejected(String),
}

impl ReasonerError {
  /// The reasoner could not be reached in time. Fallback heuristics apply
  /// to these and only these.
  pub fn is_unreachable(&self) -> bool {
    matches!(self, Self::Unavailable(_) | Self::Timeout(_) | Self::RateLimited)
  }
}

/// `reason(prompt) -> structured result`.
#[async_trait]
pub trait Reasoner: Send + Sync {
  /// Returns the reply parsed as JSON. Schema validation is the caller's job.
  async fn reason(
    &self,
    prompt: &Prompt,
  ) -> Result<serde_json::Value, ReasonerError>;
}

/// Pull the first JSON object out of model text, tolerating code fences and
/// surrounding prose.
pub fn extract_json(text: &str) -> Result<serde_json::Value, ReasonerError> {
  let trimmed = text.trim();
  if let Ok(v) = serde_json::from_str::<serde_json::Value>(trimmed) {
    return Ok(v);
  }

  let unfenced = strip_fence(trimmed).unwrap_or(trimmed);
  if let Ok(v) = serde_json::from_str::<serde_json::Value>(unfenced) {
    return Ok(v);
  }

  match (unfenced.find('{'), unfenced.rfind('}')) {
    (Some(start), Some(end)) if start < end => {
      serde_json::from_str(&unfenced[start..=end])
        .map_err(|e| ReasonerError::Malformed(e.to_string()))
    }
    _ => Err(ReasonerError::Malformed("no JSON object in reply".into())),
  }
}

fn strip_fence(text: &str) -> Option<&str> {
  let start = text.find("```")?;
  let after = &text[start + 3..];
  // Skip a language tag such as ```json
  let body_start = after.find('\n')? + 1;
  let body = &after[body_start..];
  let end = body.find("```")?;
  Some(body[..end].trim())
}
