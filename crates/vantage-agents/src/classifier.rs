//! Question → [`QueryIntent`].
//!
//! The reasoner does the language understanding; this module builds the
//! prompt, validates the reply field by field, and owns the keyword
//! fallback used when the reasoner cannot be reached.

use std::{collections::BTreeMap, str::FromStr, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::time::timeout;
use tracing::{info, instrument, warn};
use vantage_core::{
  Error, Result,
  intent::{AgentId, Coordination, IntentType, QueryContext, QueryIntent, Urgency},
  metric::MetricCatalog,
  reasoner::{Prompt, PromptKind, Reasoner, ReasonerError},
};

use crate::agents::AgentProfile;

/// Earlier turns included in the classification prompt.
const PROMPT_HISTORY_TURNS: usize = 3;

// ─── Settings ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
  pub timeout_ms:       u64,
  /// Use the keyword fallback when the reasoner is unreachable.
  pub fallback_enabled: bool,
}

impl Default for ClassifierSettings {
  fn default() -> Self { Self { timeout_ms: 15_000, fallback_enabled: true } }
}

// ─── Routing table ───────────────────────────────────────────────────────────

fn sequential() -> Coordination { Coordination::Sequential }

/// Which agents answer one kind of question when the reasoner cannot decide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRule {
  pub primary:      AgentId,
  #[serde(default)]
  pub supporting:   Vec<AgentId>,
  #[serde(default = "sequential")]
  pub coordination: Coordination,
}

impl RouteRule {
  fn new(primary: &str, supporting: &[&str], coordination: Coordination) -> Self {
    Self {
      primary: AgentId::new(primary),
      supporting: supporting.iter().map(|s| AgentId::new(*s)).collect(),
      coordination,
    }
  }
}

/// `[routing]`: rules keyed by intent type, plus a `default` rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingTable {
  rules: BTreeMap<String, RouteRule>,
}

impl Default for RoutingTable {
  fn default() -> Self {
    use Coordination::{Parallel, Sequential};
    let rules = [
      ("default", RouteRule::new("intelligence", &["strategy"], Sequential)),
      ("explanatory", RouteRule::new("intelligence", &["discovery"], Sequential)),
      ("forecasting", RouteRule::new("forecasting", &["intelligence"], Sequential)),
      ("comparative", RouteRule::new("intelligence", &["strategy"], Parallel)),
      ("strategic", RouteRule::new("strategy", &["intelligence", "decision"], Sequential)),
    ];
    Self {
      rules: rules.into_iter().map(|(k, v)| (k.to_owned(), v)).collect(),
    }
  }
}

impl RoutingTable {
  const DEFAULT_KEY: &'static str = "default";

  pub fn rule_for(&self, intent_type: IntentType) -> RouteRule {
    self
      .rules
      .get(intent_type.to_string().as_str())
      .or_else(|| self.rules.get(Self::DEFAULT_KEY))
      .cloned()
      .unwrap_or_else(|| {
        RouteRule::new("intelligence", &["strategy"], Coordination::Sequential)
      })
  }

  /// Every agent any rule mentions, for validation against the registry.
  pub fn agents(&self) -> impl Iterator<Item = &AgentId> {
    self
      .rules
      .values()
      .flat_map(|r| std::iter::once(&r.primary).chain(r.supporting.iter()))
  }

  pub fn validate(&self) -> Result<(), String> {
    for key in self.rules.keys() {
      if key != Self::DEFAULT_KEY && IntentType::from_str(key).is_err() {
        return Err(format!("routing key {key:?} is not an intent type"));
      }
    }
    Ok(())
  }
}

// ─── Keyword fallback ────────────────────────────────────────────────────────

const EXPLANATORY: &[&str] = &["why", "cause", "causes", "reason", "because", "explain"];
const FORECASTING: &[&str] =
  &["forecast", "predict", "projection", "future", "what if", "next quarter", "next year"];
const COMPARATIVE: &[&str] = &["compare", "comparison", "versus", "vs", "against"];
const STRATEGIC: &[&str] = &["how", "improve", "optimize", "optimise", "better", "strategy"];
const OPERATIONAL: &[&str] = &["status", "overdue", "delayed", "backlog", "today"];
const URGENT: &[&str] = &["urgent", "urgently", "immediately", "asap", "critical"];

/// Lower-case, punctuation to spaces, single-spaced, padded with one space
/// at each end so phrase matches respect word boundaries.
fn normalise(text: &str) -> String {
  let cleaned: String = text
    .chars()
    .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
    .collect();
  let words: Vec<&str> = cleaned.split_whitespace().collect();
  format!(" {} ", words.join(" "))
}

fn mentions(normalised: &str, phrase: &str) -> bool {
  let phrase = normalise(phrase);
  phrase.trim() != "" && normalised.contains(&phrase)
}

fn mentions_any(normalised: &str, phrases: &[&str]) -> bool {
  phrases.iter().any(|p| mentions(normalised, p))
}

fn keyword_intent_type(normalised: &str) -> IntentType {
  if mentions_any(normalised, EXPLANATORY) {
    IntentType::Explanatory
  } else if mentions_any(normalised, FORECASTING) {
    IntentType::Forecasting
  } else if mentions_any(normalised, COMPARATIVE) {
    IntentType::Comparative
  } else if mentions_any(normalised, STRATEGIC) {
    IntentType::Strategic
  } else if mentions_any(normalised, OPERATIONAL) {
    IntentType::Operational
  } else {
    IntentType::Analytical
  }
}

// ─── Reply validation ────────────────────────────────────────────────────────

fn invalid(detail: impl Into<String>) -> Error { Error::Classification(detail.into()) }

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
  match obj.get(key) {
    Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim()),
    Some(Value::String(_)) => Err(invalid(format!("field `{key}` is empty"))),
    Some(other) => Err(invalid(format!("field `{key}` must be a string, got {other}"))),
    None => Err(invalid(format!("missing field `{key}`"))),
  }
}

fn enum_field<T: FromStr>(obj: &Map<String, Value>, key: &str) -> Result<T> {
  let raw = str_field(obj, key)?;
  T::from_str(&raw.to_lowercase())
    .map_err(|_| invalid(format!("field `{key}` has unsupported value {raw:?}")))
}

fn string_list<'a>(
  obj: &'a Map<String, Value>,
  key: &str,
  required: bool,
) -> Result<Vec<&'a str>> {
  match obj.get(key) {
    Some(Value::Array(items)) => items
      .iter()
      .map(|item| match item {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim()),
        other => Err(invalid(format!("field `{key}` has a non-string entry {other}"))),
      })
      .collect(),
    None | Some(Value::Null) if !required => Ok(Vec::new()),
    None => Err(invalid(format!("missing field `{key}`"))),
    Some(other) => Err(invalid(format!("field `{key}` must be a list, got {other}"))),
  }
}

// ─── Classifier ──────────────────────────────────────────────────────────────

pub struct Classifier {
  reasoner: Arc<dyn Reasoner>,
  catalog:  Arc<MetricCatalog>,
  agents:   Vec<AgentProfile>,
  routing:  RoutingTable,
  settings: ClassifierSettings,
}

impl Classifier {
  pub fn new(
    reasoner: Arc<dyn Reasoner>,
    catalog: Arc<MetricCatalog>,
    agents: Vec<AgentProfile>,
    routing: RoutingTable,
    settings: ClassifierSettings,
  ) -> Self {
    Self { reasoner, catalog, agents, routing, settings }
  }

  /// Classify `question`.
  ///
  /// A reply that fails validation is a [`Error::Classification`]. Only an
  /// unreachable reasoner (down, timed out, rate limited) falls back to
  /// keyword matching, and only when enabled; that intent has `degraded`
  /// set.
  #[instrument(skip(self, context))]
  pub async fn classify(
    &self,
    question: &str,
    context: &QueryContext,
  ) -> Result<QueryIntent> {
    let question = question.trim();
    if question.is_empty() {
      return Err(invalid("question is empty"));
    }

    let prompt = self.prompt(question, context);
    let after = Duration::from_millis(self.settings.timeout_ms);
    let reply = match timeout(after, self.reasoner.reason(&prompt)).await {
      Ok(reply) => reply,
      Err(_) => Err(ReasonerError::Timeout(self.settings.timeout_ms)),
    };

    match reply {
      Ok(value) => {
        let intent = self.parse(question, &value)?;
        info!(
          intent_type = %intent.intent_type,
          primary = %intent.primary_agent,
          metrics = intent.required_metrics.len(),
          "question classified"
        );
        Ok(intent)
      }
      Err(e) if e.is_unreachable() && self.settings.fallback_enabled => {
        warn!(error = %e, "reasoner unreachable; classifying by keywords");
        Ok(self.fallback(question))
      }
      Err(e) => Err(invalid(e.to_string())),
    }
  }

  /// Keyword classification: metric phrases for `required_metrics`, fixed
  /// word lists for the intent type, the routing table for agents.
  pub fn fallback(&self, question: &str) -> QueryIntent {
    let text = normalise(question);
    let required_metrics = self
      .catalog
      .all()
      .iter()
      .filter(|m| m.match_phrases().iter().any(|p| mentions(&text, p)))
      .map(|m| m.name.clone())
      .collect();
    let intent_type = keyword_intent_type(&text);
    let urgency = if mentions_any(&text, URGENT) { Urgency::High } else { Urgency::Medium };
    let rule = self.routing.rule_for(intent_type);

    QueryIntent {
      raw_question: question.trim().to_owned(),
      intent_type,
      urgency,
      required_metrics,
      primary_agent: rule.primary,
      supporting_agents: rule.supporting,
      coordination: rule.coordination,
      degraded: true,
    }
  }

  fn prompt(&self, question: &str, context: &QueryContext) -> Prompt {
    let history_start = context.recent_history.len().saturating_sub(PROMPT_HISTORY_TURNS);
    let metrics: Vec<Value> = self
      .catalog
      .all()
      .iter()
      .map(|m| json!({ "name": m.name, "category": m.category, "description": m.description }))
      .collect();

    Prompt::new(
      PromptKind::Classification,
      "You route business questions to specialist analysis agents. Classify \
       the question. Reply with JSON containing: \"type\" (one of analytical, \
       operational, strategic, forecasting, explanatory, comparative), \
       \"urgency\" (low, medium, high or critical), \"required_metrics\" \
       (names from the metric list only; may be empty), \"primary_agent\" and \
       \"supporting_agents\" (names from the agent list), and \"coordination\" \
       (sequential when supporting agents build on the primary's findings, \
       parallel when they work independently).",
      json!({
        "question":        question,
        "dashboard_state": context.dashboard_state,
        "recent_history":  &context.recent_history[history_start..],
        "metrics":         metrics,
        "agents":          self.agents,
      }),
    )
  }

  fn parse(&self, question: &str, reply: &Value) -> Result<QueryIntent> {
    let obj = reply
      .as_object()
      .ok_or_else(|| invalid("reply is not a JSON object"))?;

    let intent_type: IntentType = enum_field(obj, "type")?;
    let urgency: Urgency = enum_field(obj, "urgency")?;
    let coordination: Coordination = enum_field(obj, "coordination")?;
    let primary_agent = AgentId::new(str_field(obj, "primary_agent")?);
    let supporting_agents = string_list(obj, "supporting_agents", false)?
      .into_iter()
      .map(AgentId::new)
      .collect();

    let required_metrics = string_list(obj, "required_metrics", true)?
      .into_iter()
      .map(|m| {
        if self.catalog.contains(m) {
          Ok(m.to_owned())
        } else {
          Err(invalid(format!("unknown metric {m:?}")))
        }
      })
      .collect::<Result<_>>()?;

    Ok(QueryIntent {
      raw_question: question.to_owned(),
      intent_type,
      urgency,
      required_metrics,
      primary_agent,
      supporting_agents,
      coordination,
      degraded: false,
    })
  }
}
