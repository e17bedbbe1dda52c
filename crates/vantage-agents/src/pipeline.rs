//! [`Pipeline`]: one question in, one answer out.
//!
//! snapshot → classify → route → synthesize, plus the conversation history
//! fed back to the classifier as `recent_history`.

use std::{
  collections::VecDeque,
  sync::{Arc, Mutex, PoisonError},
  time::Duration,
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, timeout};
use tracing::{info, instrument};
use vantage_core::{
  Error, Result,
  answer::SynthesizedAnswer,
  engine::AnalyticsEngine,
  intent::{HistoryTurn, QueryContext, QueryIntent},
  schema::SchemaSnapshot,
};
use vantage_views::{ViewManager, introspect};

use crate::{
  classifier::Classifier,
  router::{AgentResponses, AgentRouter},
  synthesizer::Synthesizer,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
  /// How long a captured schema snapshot is reused.
  pub snapshot_max_age_secs: u64,
  pub history_turns:         usize,
}

impl Default for PipelineSettings {
  fn default() -> Self { Self { snapshot_max_age_secs: 300, history_turns: 10 } }
}

/// Everything produced while answering one question.
#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
  pub intent:     QueryIntent,
  pub responses:  AgentResponses,
  pub answer:     SynthesizedAnswer,
  pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaRefresh {
  pub fingerprint: String,
  pub tables:      usize,
  /// Metrics whose views were generated from an older schema.
  pub invalidated: Vec<String>,
}

struct CachedSnapshot {
  taken:    Instant,
  snapshot: Arc<SchemaSnapshot>,
}

pub struct Pipeline<E> {
  views:       Arc<ViewManager<E>>,
  classifier:  Classifier,
  router:      AgentRouter,
  synthesizer: Synthesizer,
  settings:    PipelineSettings,
  snapshot:    tokio::sync::Mutex<Option<CachedSnapshot>>,
  history:     Mutex<VecDeque<HistoryTurn>>,
}

impl<E: AnalyticsEngine + 'static> Pipeline<E> {
  pub fn new(
    views: Arc<ViewManager<E>>,
    classifier: Classifier,
    router: AgentRouter,
    synthesizer: Synthesizer,
    settings: PipelineSettings,
  ) -> Self {
    Self {
      views,
      classifier,
      router,
      synthesizer,
      settings,
      snapshot: tokio::sync::Mutex::new(None),
      history: Mutex::new(VecDeque::new()),
    }
  }

  pub fn views(&self) -> &Arc<ViewManager<E>> { &self.views }

  pub fn router(&self) -> &AgentRouter { &self.router }

  /// Answer `question`. When `context` carries no history, the pipeline's
  /// own recent turns are used.
  #[instrument(skip(self, context))]
  pub async fn ask(&self, question: &str, mut context: QueryContext) -> Result<AskResponse> {
    let started = Instant::now();
    if context.recent_history.is_empty() {
      context.recent_history = self.history();
    }

    let snapshot = self.snapshot().await?;
    let intent = self.classifier.classify(question, &context).await?;
    let responses = self.router.route(&intent, &context, snapshot).await?;
    let answer = self
      .synthesizer
      .synthesize(&intent.raw_question, &intent, &responses)
      .await?;
    self.record(&intent, &answer);

    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    info!(
      quality = %answer.quality,
      confidence = answer.confidence,
      degraded = intent.degraded,
      elapsed_ms,
      "question answered"
    );
    Ok(AskResponse { intent, responses, answer, elapsed_ms })
  }

  /// The cached schema snapshot, recaptured once older than
  /// `snapshot_max_age_secs`.
  pub async fn snapshot(&self) -> Result<Arc<SchemaSnapshot>> {
    let mut cache = self.snapshot.lock().await;
    let max_age = Duration::from_secs(self.settings.snapshot_max_age_secs);
    if let Some(cached) = cache.as_ref()
      && cached.taken.elapsed() < max_age
    {
      return Ok(Arc::clone(&cached.snapshot));
    }
    let (snapshot, _) = self.capture().await?;
    *cache = Some(CachedSnapshot { taken: Instant::now(), snapshot: Arc::clone(&snapshot) });
    Ok(snapshot)
  }

  /// Recapture the schema now and invalidate views built from an older one.
  pub async fn refresh_schema(&self) -> Result<SchemaRefresh> {
    let mut cache = self.snapshot.lock().await;
    let (snapshot, invalidated) = self.capture().await?;
    *cache = Some(CachedSnapshot { taken: Instant::now(), snapshot: Arc::clone(&snapshot) });
    Ok(SchemaRefresh {
      fingerprint: snapshot.fingerprint().to_owned(),
      tables: snapshot.tables().len(),
      invalidated,
    })
  }

  /// Recent turns, oldest first.
  pub fn history(&self) -> Vec<HistoryTurn> {
    self.lock_history().iter().cloned().collect()
  }

  async fn capture(&self) -> Result<(Arc<SchemaSnapshot>, Vec<String>)> {
    let after = self.views.settings().timeout();
    let snapshot = timeout(after, introspect::capture(self.views.engine().as_ref()))
      .await
      .map_err(|_| Error::Timeout { operation: "schema introspection".into(), after })??;
    let invalidated = self.views.invalidate_if_changed(&snapshot);
    Ok((Arc::new(snapshot), invalidated))
  }

  fn record(&self, intent: &QueryIntent, answer: &SynthesizedAnswer) {
    let mut history = self.lock_history();
    history.push_back(HistoryTurn {
      asked_at: Utc::now(),
      question: intent.raw_question.clone(),
      answer:   answer.direct_answer.clone(),
      agents:   answer.contributing_agents.iter().cloned().collect(),
    });
    while history.len() > self.settings.history_turns {
      history.pop_front();
    }
  }

  fn lock_history(&self) -> std::sync::MutexGuard<'_, VecDeque<HistoryTurn>> {
    self.history.lock().unwrap_or_else(PoisonError::into_inner)
  }
}
