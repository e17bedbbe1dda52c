//! Scripted collaborators for router, classifier and pipeline tests.

use std::{
  collections::HashMap,
  sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use vantage_core::{
  Error, Result,
  answer::{AgentResponse, AgentStatus},
  reasoner::{Prompt, PromptKind, Reasoner, ReasonerError},
};

use crate::agents::{Agent, AgentKind, AgentProfile, AgentTask};

// ─── Reasoner ────────────────────────────────────────────────────────────────

/// Answers each prompt kind with a fixed reply and records every prompt.
/// Unscripted kinds fail as unavailable.
#[derive(Default)]
pub struct ScriptedReasoner {
  replies: HashMap<PromptKind, Result<serde_json::Value, ReasonerError>>,
  delay:   Duration,
  prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedReasoner {
  pub fn new() -> Self { Self::default() }

  pub fn reply(mut self, kind: PromptKind, value: serde_json::Value) -> Self {
    self.replies.insert(kind, Ok(value));
    self
  }

  pub fn fail(mut self, kind: PromptKind, err: ReasonerError) -> Self {
    self.replies.insert(kind, Err(err));
    self
  }

  /// Sleep before every reply.
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  pub fn calls(&self, kind: PromptKind) -> usize {
    self.prompts.lock().unwrap().iter().filter(|p| p.kind == kind).count()
  }

  pub fn last_prompt(&self, kind: PromptKind) -> Option<Prompt> {
    self
      .prompts
      .lock()
      .unwrap()
      .iter()
      .rev()
      .find(|p| p.kind == kind)
      .cloned()
  }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
  async fn reason(
    &self,
    prompt: &Prompt,
  ) -> Result<serde_json::Value, ReasonerError> {
    self.prompts.lock().unwrap().push(prompt.clone());
    if !self.delay.is_zero() {
      tokio::time::sleep(self.delay).await;
    }
    self.replies.get(&prompt.kind).cloned().unwrap_or_else(|| {
      Err(ReasonerError::Unavailable(format!("no scripted {} reply", prompt.kind)))
    })
  }
}

// ─── Agent ───────────────────────────────────────────────────────────────────

enum Outcome {
  Respond { status: AgentStatus, confidence: f64 },
  Fail(String),
}

/// An agent with a fixed outcome that counts its invocations and remembers
/// how many prior findings each one saw.
pub struct ScriptedAgent {
  profile:   AgentProfile,
  outcome:   Outcome,
  delay:     Duration,
  calls:     AtomicUsize,
  prior_len: Mutex<Vec<usize>>,
}

impl ScriptedAgent {
  fn build(name: &str, outcome: Outcome) -> Self {
    Self {
      profile: AgentProfile::new(name, AgentKind::Analyst, "scripted", &[]),
      outcome,
      delay: Duration::ZERO,
      calls: AtomicUsize::new(0),
      prior_len: Mutex::new(Vec::new()),
    }
  }

  pub fn ok(name: &str, confidence: f64) -> Self {
    Self::build(name, Outcome::Respond { status: AgentStatus::Success, confidence })
  }

  pub fn partial(name: &str, confidence: f64) -> Self {
    Self::build(name, Outcome::Respond { status: AgentStatus::Partial, confidence })
  }

  pub fn failing(name: &str, cause: &str) -> Self {
    Self::build(name, Outcome::Fail(cause.to_owned()))
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }

  /// Number of prior findings handed to each invocation, in call order.
  pub fn prior_lengths(&self) -> Vec<usize> { self.prior_len.lock().unwrap().clone() }
}

#[async_trait]
impl Agent for ScriptedAgent {
  fn profile(&self) -> &AgentProfile { &self.profile }

  async fn run(&self, task: &AgentTask) -> Result<AgentResponse> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.prior_len.lock().unwrap().push(task.prior_findings.len());
    if !self.delay.is_zero() {
      tokio::time::sleep(self.delay).await;
    }
    match &self.outcome {
      Outcome::Respond { status, confidence } => Ok(AgentResponse::new(
        self.id().clone(),
        *status,
        serde_json::json!({ "source": self.id() }),
        vec![format!("{} finding", self.id())],
        *confidence,
      )),
      Outcome::Fail(cause) => Err(Error::Introspection(cause.clone())),
    }
  }
}
