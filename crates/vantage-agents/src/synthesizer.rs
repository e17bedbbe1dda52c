//! Merges agent responses into one [`SynthesizedAnswer`].

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::time::timeout;
use tracing::{info, instrument, warn};
use vantage_core::{
  Error, Result,
  answer::{AgentResponse, AgentStatus, AnswerQuality, SynthesizedAnswer, clamp_unit},
  intent::{AgentId, QueryIntent},
  reasoner::{Prompt, PromptKind, Reasoner, ReasonerError},
};

use crate::router::AgentResponses;

/// Ceiling on the confidence of a fallback answer.
const FALLBACK_CONFIDENCE_CAP: f64 = 0.5;
const FALLBACK_ACTIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesizerSettings {
  pub timeout_ms: u64,
}

impl Default for SynthesizerSettings {
  fn default() -> Self { Self { timeout_ms: 30_000 } }
}

#[derive(Deserialize)]
struct Reply {
  direct_answer:       String,
  #[serde(default)]
  implications:        String,
  #[serde(default)]
  recommended_actions: Vec<String>,
  #[serde(default)]
  evidence:            Value,
  #[serde(default)]
  follow_up_questions: Vec<String>,
  confidence:          Option<f64>,
}

fn mean_confidence(responses: &[&AgentResponse]) -> f64 {
  if responses.is_empty() {
    return 0.0;
  }
  let n = responses.len() as f64;
  responses.iter().map(|r| r.confidence).sum::<f64>() / n
}

fn has_findings(response: &AgentResponse) -> bool {
  let data_present = match &response.data {
    Value::Null => false,
    Value::Array(items) => !items.is_empty(),
    Value::Object(fields) => !fields.is_empty(),
    _ => true,
  };
  data_present || !response.insights.is_empty()
}

/// Notes on everything that lowered the quality of the answer.
fn caveats(intent: &QueryIntent, responses: &AgentResponses) -> Vec<String> {
  let mut notes = Vec::new();
  if intent.degraded {
    notes.push("question was classified by keyword matching; the reasoner was unavailable".into());
  }
  for response in responses.values() {
    match response.status {
      AgentStatus::Error => notes.push(format!(
        "{} agent unavailable: {}",
        response.agent_name,
        response.error.as_deref().unwrap_or("unknown error")
      )),
      AgentStatus::Partial => {
        notes.push(format!("{} agent returned partial results", response.agent_name));
      }
      AgentStatus::Success => {}
    }
  }
  notes
}

pub struct Synthesizer {
  reasoner: Arc<dyn Reasoner>,
  settings: SynthesizerSettings,
}

impl Synthesizer {
  pub fn new(reasoner: Arc<dyn Reasoner>, settings: SynthesizerSettings) -> Self {
    Self { reasoner, settings }
  }

  /// Build the answer for `question` from `responses`.
  ///
  /// Every response with status `error` becomes a caveat. When the reasoner
  /// fails or replies with something unusable, the answer is assembled from
  /// each usable agent's top insight instead, with confidence capped at 0.5.
  /// Fails with [`Error::NoAnswer`] only when no agent produced anything.
  #[instrument(skip_all, fields(agents = responses.len()))]
  pub async fn synthesize(
    &self,
    question: &str,
    intent: &QueryIntent,
    responses: &AgentResponses,
  ) -> Result<SynthesizedAnswer> {
    let usable: Vec<&AgentResponse> = responses.values().filter(|r| r.is_usable()).collect();
    if usable.is_empty() {
      let causes: Vec<String> = responses
        .values()
        .map(|r| format!("{}: {}", r.agent_name, r.error.as_deref().unwrap_or("no response")))
        .collect();
      return Err(Error::NoAnswer(causes.join("; ")));
    }

    let caveats = caveats(intent, responses);
    match self.reasoned(question, intent, &usable, &caveats).await {
      Ok(answer) => {
        info!(quality = %answer.quality, confidence = answer.confidence, "answer synthesized");
        Ok(answer)
      }
      Err(e) => {
        warn!(error = %e, "synthesis failed; assembling fallback answer");
        Ok(Self::fallback(&usable, caveats, &e))
      }
    }
  }

  /// Ask the reasoner. Any failure, unreachable or unparseable, is an
  /// [`Error::Synthesis`].
  async fn reasoned(
    &self,
    question: &str,
    intent: &QueryIntent,
    usable: &[&AgentResponse],
    caveats: &[String],
  ) -> Result<SynthesizedAnswer> {
    let prompt = Prompt::new(
      PromptKind::Synthesis,
      "You are an executive assistant merging findings from specialist \
       business intelligence agents into one answer. Answer the question \
       directly with the key numbers, then give business implications, \
       prioritised recommended actions, supporting evidence, and follow-up \
       questions worth asking. Be honest about the caveats listed. Reply with \
       JSON: {\"direct_answer\": string, \"implications\": string, \
       \"recommended_actions\": [string], \"evidence\": object, \
       \"follow_up_questions\": [string], \"confidence\": number between 0 and 1}.",
      json!({
        "question": question,
        "intent":   intent,
        "findings": usable,
        "caveats":  caveats,
      }),
    );

    let after = Duration::from_millis(self.settings.timeout_ms);
    let value = timeout(after, self.reasoner.reason(&prompt))
      .await
      .unwrap_or(Err(ReasonerError::Timeout(self.settings.timeout_ms)))
      .map_err(|e| Error::Synthesis(e.to_string()))?;
    let reply: Reply =
      serde_json::from_value(value).map_err(|e| Error::Synthesis(e.to_string()))?;
    if reply.direct_answer.trim().is_empty() {
      return Err(Error::Synthesis("empty direct_answer".into()));
    }

    let quality = if !usable.iter().any(|r| has_findings(r)) {
      AnswerQuality::NoData
    } else if caveats.is_empty() {
      AnswerQuality::Complete
    } else {
      AnswerQuality::Degraded
    };
    let confidence = clamp_unit(reply.confidence.unwrap_or_else(|| mean_confidence(usable)));

    Ok(SynthesizedAnswer {
      direct_answer: reply.direct_answer.trim().to_owned(),
      implications: reply.implications,
      recommended_actions: reply.recommended_actions,
      evidence: reply.evidence,
      follow_up_questions: reply.follow_up_questions,
      confidence,
      contributing_agents: usable.iter().map(|r| r.agent_name.clone()).collect(),
      quality,
      caveats: caveats.to_vec(),
    })
  }

  /// The deterministic answer: each usable agent's top insight, in agent
  /// name order.
  pub fn fallback(
    usable: &[&AgentResponse],
    mut caveats: Vec<String>,
    cause: &Error,
  ) -> SynthesizedAnswer {
    let direct_answer = usable
      .iter()
      .map(|r| match r.insights.first() {
        Some(top) => format!("{}: {top}", r.agent_name),
        None => format!("{}: no insights reported", r.agent_name),
      })
      .collect::<Vec<_>>()
      .join("\n");

    let mut recommended_actions: Vec<String> = Vec::new();
    for action in usable.iter().flat_map(|r| r.recommendations.iter()) {
      if recommended_actions.len() == FALLBACK_ACTIONS {
        break;
      }
      if !recommended_actions.contains(action) {
        recommended_actions.push(action.clone());
      }
    }

    let evidence: Map<String, Value> = usable
      .iter()
      .map(|r| (r.agent_name.to_string(), r.data.clone()))
      .collect();
    let contributing_agents: BTreeSet<AgentId> =
      usable.iter().map(|r| r.agent_name.clone()).collect();
    let quality = if usable.iter().any(|r| has_findings(r)) {
      AnswerQuality::Degraded
    } else {
      AnswerQuality::NoData
    };
    caveats.push(format!("answer assembled without synthesis: {cause}"));

    SynthesizedAnswer {
      direct_answer,
      implications: String::new(),
      recommended_actions,
      evidence: Value::Object(evidence),
      follow_up_questions: Vec::new(),
      confidence: mean_confidence(usable).min(FALLBACK_CONFIDENCE_CAP),
      contributing_agents,
      quality,
      caveats,
    }
  }
}
