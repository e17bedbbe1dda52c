//! [`AgentRouter`] runs the agents of a [`QueryIntent`].
//!
//! The whole plan is validated against the registry before any agent runs.
//! Per-agent failures, including timeouts, come back as `error` responses
//! rather than as `Err`.

use std::{
  collections::{BTreeMap, HashMap},
  sync::Arc,
  time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::{
  task::JoinSet,
  time::{Instant, timeout},
};
use tracing::{info, instrument, warn};
use vantage_core::{
  Result,
  answer::AgentResponse,
  intent::{AgentId, Coordination, QueryContext, QueryIntent},
  schema::SchemaSnapshot,
};

use crate::agents::{Agent, AgentRegistry, AgentTask};

pub type AgentResponses = BTreeMap<AgentId, AgentResponse>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
  /// Deadline for each agent invocation.
  pub agent_timeout_ms:     u64,
  /// Deadline for a whole sequential chain.
  pub workflow_deadline_ms: u64,
}

impl Default for RouterSettings {
  fn default() -> Self {
    Self { agent_timeout_ms: 45_000, workflow_deadline_ms: 120_000 }
  }
}

impl RouterSettings {
  pub fn agent_timeout(&self) -> Duration { Duration::from_millis(self.agent_timeout_ms) }

  pub fn workflow_deadline(&self) -> Duration {
    Duration::from_millis(self.workflow_deadline_ms)
  }
}

fn elapsed_ms(started: Instant) -> u64 {
  u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Run one agent under `limit`, folding every failure into the response.
async fn invoke(agent: &dyn Agent, task: &AgentTask, limit: Duration) -> AgentResponse {
  let started = Instant::now();
  let id = agent.id().clone();
  match timeout(limit, agent.run(task)).await {
    Ok(Ok(response)) => response,
    Ok(Err(e)) => {
      warn!(agent = %id, error = %e, "agent failed");
      AgentResponse::failure(id, e.to_string()).with_elapsed_ms(elapsed_ms(started))
    }
    Err(_) => {
      warn!(agent = %id, after = ?limit, "agent timed out");
      AgentResponse::failure(id, format!("timed out after {} ms", limit.as_millis()))
        .with_elapsed_ms(elapsed_ms(started))
    }
  }
}

pub struct AgentRouter {
  registry: Arc<AgentRegistry>,
  settings: RouterSettings,
}

impl AgentRouter {
  pub fn new(registry: Arc<AgentRegistry>, settings: RouterSettings) -> Self {
    Self { registry, settings }
  }

  pub fn registry(&self) -> &Arc<AgentRegistry> { &self.registry }

  /// Run every agent of `intent` and collect one response per agent.
  ///
  /// Fails only with [`vantage_core::Error::UnknownAgent`], before any
  /// agent has run. In sequential mode a failed primary short-circuits the
  /// chain: the result holds just the primary's `error` response.
  #[instrument(skip_all, fields(coordination = %intent.coordination, primary = %intent.primary_agent))]
  pub async fn route(
    &self,
    intent: &QueryIntent,
    context: &QueryContext,
    snapshot: Arc<SchemaSnapshot>,
  ) -> Result<AgentResponses> {
    let plan = self.registry.plan(intent)?;
    let task = AgentTask::new(intent.clone(), context.clone(), snapshot);

    let responses = match intent.coordination {
      Coordination::Parallel => self.parallel(plan, task).await,
      Coordination::Sequential => self.sequential(plan, task).await,
    };
    info!(
      agents = responses.len(),
      failed = responses.values().filter(|r| !r.is_usable()).count(),
      "routing complete"
    );
    Ok(responses)
  }

  async fn parallel(&self, plan: Vec<Arc<dyn Agent>>, task: AgentTask) -> AgentResponses {
    let task = Arc::new(task);
    let limit = self.settings.agent_timeout();
    let mut set = JoinSet::new();
    let mut ids = HashMap::with_capacity(plan.len());

    for agent in plan {
      let id = agent.id().clone();
      let task = Arc::clone(&task);
      let handle = set.spawn(async move { invoke(agent.as_ref(), &task, limit).await });
      ids.insert(handle.id(), id);
    }

    let mut responses = AgentResponses::new();
    while let Some(joined) = set.join_next_with_id().await {
      match joined {
        Ok((_, response)) => {
          responses.insert(response.agent_name.clone(), response);
        }
        Err(e) => {
          // A panicking agent still gets its error entry.
          if let Some(id) = ids.get(&e.id()) {
            warn!(agent = %id, error = %e, "agent task aborted");
            responses.insert(id.clone(), AgentResponse::failure(id.clone(), e.to_string()));
          }
        }
      }
    }
    responses
  }

  async fn sequential(&self, plan: Vec<Arc<dyn Agent>>, mut task: AgentTask) -> AgentResponses {
    let deadline = Instant::now() + self.settings.workflow_deadline();
    let mut responses = AgentResponses::new();

    for (position, agent) in plan.iter().enumerate() {
      let remaining = deadline.saturating_duration_since(Instant::now());
      let response = if remaining.is_zero() {
        warn!(agent = %agent.id(), "workflow deadline passed; agent skipped");
        AgentResponse::failure(agent.id().clone(), "workflow deadline exceeded")
      } else {
        let limit = remaining.min(self.settings.agent_timeout());
        invoke(agent.as_ref(), &task, limit).await
      };

      let usable = response.is_usable();
      if usable {
        task.prior_findings.push(response.clone());
      }
      responses.insert(response.agent_name.clone(), response);

      if position == 0 && !usable {
        warn!(primary = %agent.id(), "primary agent failed; supporting agents skipped");
        break;
      }
    }
    responses
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeSet;

  use vantage_core::{
    Error,
    answer::AgentStatus,
    intent::{IntentType, Urgency},
  };

  use super::*;
  use crate::testing::ScriptedAgent;

  fn intent(coordination: Coordination, primary: &str, supporting: &[&str]) -> QueryIntent {
    QueryIntent {
      raw_question: "Why is our cash flow declining?".into(),
      intent_type: IntentType::Analytical,
      urgency: Urgency::Medium,
      required_metrics: BTreeSet::new(),
      primary_agent: primary.into(),
      supporting_agents: supporting.iter().map(|s| AgentId::new(*s)).collect(),
      coordination,
      degraded: false,
    }
  }

  fn router(agents: &[Arc<ScriptedAgent>], settings: RouterSettings) -> AgentRouter {
    let mut registry = AgentRegistry::new();
    for agent in agents {
      registry.register(Arc::clone(agent) as Arc<dyn Agent>);
    }
    AgentRouter::new(Arc::new(registry), settings)
  }

  fn snapshot() -> Arc<SchemaSnapshot> { Arc::new(SchemaSnapshot::builder().build()) }

  // ── Parallel ──────────────────────────────────────────────────────────

  #[tokio::test(start_paused = true)]
  async fn parallel_contains_a_timed_out_agent() {
    let intelligence = Arc::new(ScriptedAgent::ok("intelligence", 0.9));
    let discovery = Arc::new(ScriptedAgent::ok("discovery", 0.8));
    let strategy = Arc::new(
      ScriptedAgent::ok("strategy", 0.7).with_delay(Duration::from_secs(600)),
    );
    let router = router(
      &[intelligence.clone(), discovery.clone(), strategy.clone()],
      RouterSettings { agent_timeout_ms: 1_000, ..Default::default() },
    );

    let started = Instant::now();
    let responses = router
      .route(
        &intent(Coordination::Parallel, "intelligence", &["discovery", "strategy"]),
        &QueryContext::default(),
        snapshot(),
      )
      .await
      .unwrap();

    assert_eq!(responses.len(), 3);
    let failed: Vec<_> = responses.values().filter(|r| r.status == AgentStatus::Error).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].agent_name, AgentId::new("strategy"));
    assert!(failed[0].error.as_deref().unwrap().contains("timed out"));
    // The slow agent did not hold up the others beyond its own timeout.
    assert!(started.elapsed() < Duration::from_secs(2));
  }

  #[tokio::test]
  async fn parallel_agents_see_no_prior_findings() {
    let a = Arc::new(ScriptedAgent::ok("intelligence", 0.9));
    let b = Arc::new(ScriptedAgent::failing("discovery", "boom"));
    let router = router(&[a.clone(), b.clone()], RouterSettings::default());

    let responses = router
      .route(
        &intent(Coordination::Parallel, "intelligence", &["discovery"]),
        &QueryContext::default(),
        snapshot(),
      )
      .await
      .unwrap();

    assert_eq!(a.prior_lengths(), vec![0]);
    assert_eq!(b.prior_lengths(), vec![0]);
    let failed = &responses[&AgentId::new("discovery")];
    assert_eq!(failed.status, AgentStatus::Error);
    assert!(failed.error.as_deref().unwrap().contains("boom"));
  }

  // ── Sequential ────────────────────────────────────────────────────────

  #[tokio::test]
  async fn sequential_passes_findings_forward() {
    let intelligence = Arc::new(ScriptedAgent::ok("intelligence", 0.9));
    let discovery = Arc::new(ScriptedAgent::failing("discovery", "no data"));
    let strategy = Arc::new(ScriptedAgent::partial("strategy", 0.4));
    let router = router(
      &[intelligence.clone(), discovery.clone(), strategy.clone()],
      RouterSettings::default(),
    );

    let responses = router
      .route(
        &intent(Coordination::Sequential, "intelligence", &["discovery", "strategy"]),
        &QueryContext::default(),
        snapshot(),
      )
      .await
      .unwrap();

    assert_eq!(responses.len(), 3);
    assert_eq!(intelligence.prior_lengths(), vec![0]);
    assert_eq!(discovery.prior_lengths(), vec![1]);
    // A failed supporting agent adds nothing for the next one.
    assert_eq!(strategy.prior_lengths(), vec![1]);
  }

  #[tokio::test]
  async fn sequential_primary_failure_short_circuits() {
    let intelligence = Arc::new(ScriptedAgent::failing("intelligence", "engine down"));
    let discovery = Arc::new(ScriptedAgent::ok("discovery", 0.8));
    let strategy = Arc::new(ScriptedAgent::ok("strategy", 0.8));
    let router = router(
      &[intelligence.clone(), discovery.clone(), strategy.clone()],
      RouterSettings::default(),
    );

    let responses = router
      .route(
        &intent(Coordination::Sequential, "intelligence", &["discovery", "strategy"]),
        &QueryContext::default(),
        snapshot(),
      )
      .await
      .unwrap();

    assert_eq!(intelligence.calls(), 1);
    assert_eq!(discovery.calls(), 0);
    assert_eq!(strategy.calls(), 0);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[&AgentId::new("intelligence")].status, AgentStatus::Error);
  }

  #[tokio::test(start_paused = true)]
  async fn sequential_respects_workflow_deadline() {
    let intelligence = Arc::new(
      ScriptedAgent::ok("intelligence", 0.9).with_delay(Duration::from_secs(8)),
    );
    let discovery = Arc::new(
      ScriptedAgent::ok("discovery", 0.8).with_delay(Duration::from_secs(8)),
    );
    let strategy = Arc::new(ScriptedAgent::ok("strategy", 0.8));
    let router = router(
      &[intelligence.clone(), discovery.clone(), strategy.clone()],
      RouterSettings { agent_timeout_ms: 30_000, workflow_deadline_ms: 10_000 },
    );

    let started = Instant::now();
    let responses = router
      .route(
        &intent(Coordination::Sequential, "intelligence", &["discovery", "strategy"]),
        &QueryContext::default(),
        snapshot(),
      )
      .await
      .unwrap();

    assert!(started.elapsed() <= Duration::from_secs(10));
    assert!(responses[&AgentId::new("intelligence")].is_usable());
    // Discovery got only the 2s left and timed out; strategy never ran.
    assert_eq!(responses[&AgentId::new("discovery")].status, AgentStatus::Error);
    assert_eq!(responses[&AgentId::new("strategy")].status, AgentStatus::Error);
    assert_eq!(strategy.calls(), 0);
  }

  // ── Validation ────────────────────────────────────────────────────────

  #[tokio::test]
  async fn unknown_agent_fails_before_anything_runs() {
    let intelligence = Arc::new(ScriptedAgent::ok("intelligence", 0.9));
    let router = router(&[intelligence.clone()], RouterSettings::default());

    for coordination in [Coordination::Parallel, Coordination::Sequential] {
      let err = router
        .route(
          &intent(coordination, "intelligence", &["oracle"]),
          &QueryContext::default(),
          snapshot(),
        )
        .await
        .unwrap_err();
      assert!(matches!(err, Error::UnknownAgent(ref n) if n == "oracle"));
    }
    assert_eq!(intelligence.calls(), 0);
  }
}
