//! Analytical views and their lifecycle state machine.
//!
//! ```text
//!   PENDING ──► CREATED ──► LOADED ──► STALE
//!                             ▲  │       │
//!                             │  ▼       ▼
//!                             OPTIMIZING ◄┘
//!                                 │
//!   (any) ─────────────────────► ERROR
//! ```
//!
//! `ERROR` ends an attempt. Retrying creation starts a new descriptor at
//! `PENDING`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{Error, Result};

/// Prefix shared by every generated view.
pub const VIEW_PREFIX: &str = "analytics_";

/// Derive the view name for a metric.
pub fn view_name_for(metric_name: &str) -> String {
  format!("{VIEW_PREFIX}{metric_name}")
}

// ─── State ───────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ViewState {
  Pending,
  Created,
  Loaded,
  Optimizing,
  Stale,
  Error,
}

impl ViewState {
  pub fn can_transition_to(self, next: ViewState) -> bool {
    use ViewState::*;
    match (self, next) {
      (Error, _) => false,
      (_, Error) => true,
      (Pending, Created)
      | (Created, Loaded)
      | (Loaded, Optimizing)
      | (Loaded, Stale)
      | (Stale, Optimizing)
      | (Optimizing, Loaded) => true,
      _ => false,
    }
  }
}

/// The step of view creation or optimization that was running when
/// something failed.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ViewStage {
  Generate,
  Create,
  Load,
  Probe,
  Unload,
  Reload,
}

// ─── Performance ─────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PerformanceRating {
  Fast,
  Acceptable,
  NeedsOptimization,
}

/// Latency tiers for [`PerformanceRating`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceThresholds {
  /// Probes faster than this are [`PerformanceRating::Fast`].
  pub fast_ms:         u64,
  /// Probes at or above this are [`PerformanceRating::NeedsOptimization`].
  pub optimization_ms: u64,
}

impl Default for PerformanceThresholds {
  fn default() -> Self { Self { fast_ms: 100, optimization_ms: 1000 } }
}

impl PerformanceThresholds {
  pub fn rate(&self, execution_time_ms: u64) -> PerformanceRating {
    if execution_time_ms < self.fast_ms {
      PerformanceRating::Fast
    } else if execution_time_ms < self.optimization_ms {
      PerformanceRating::Acceptable
    } else {
      PerformanceRating::NeedsOptimization
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Performance {
  pub execution_time_ms: u64,
  pub rating:            PerformanceRating,
  pub row_count:         u64,
  pub measured_at:       DateTime<Utc>,
}

// ─── Descriptor ──────────────────────────────────────────────────────────────

/// One view owned by the lifecycle manager.
///
/// Only the manager mutates descriptors; everyone else receives clones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewDescriptor {
  pub metric_name:        String,
  pub view_name:          String,
  pub sql_body:           String,
  pub state:              ViewState,
  pub last_performance:   Option<Performance>,
  pub created_at:         DateTime<Utc>,
  /// Fingerprint of the schema snapshot the SQL was generated from.
  pub schema_fingerprint: String,
  /// Every state this descriptor has been in, oldest first.
  pub history:            Vec<ViewState>,
  pub last_error:         Option<String>,
}

impl ViewDescriptor {
  pub fn new(
    metric_name: &str,
    sql_body: String,
    schema_fingerprint: &str,
    created_at: DateTime<Utc>,
  ) -> Self {
    Self {
      metric_name: metric_name.to_owned(),
      view_name: view_name_for(metric_name),
      sql_body,
      state: ViewState::Pending,
      last_performance: None,
      created_at,
      schema_fingerprint: schema_fingerprint.to_owned(),
      history: vec![ViewState::Pending],
      last_error: None,
    }
  }

  /// Move to `next`, refusing transitions outside the state machine.
  pub fn transition(&mut self, next: ViewState) -> Result<()> {
    if !self.state.can_transition_to(next) {
      return Err(Error::InvalidTransition { from: self.state, to: next });
    }
    self.state = next;
    self.history.push(next);
    Ok(())
  }

  /// Record a failure. Always legal unless already in `ERROR`.
  pub fn fail(&mut self, message: impl Into<String>) {
    self.last_error = Some(message.into());
    if self.state != ViewState::Error {
      self.state = ViewState::Error;
      self.history.push(ViewState::Error);
    }
  }

  /// `LOADED` and not marked stale: safe to query and to reuse.
  pub fn is_ready(&self) -> bool { self.state == ViewState::Loaded }
}

/// Result of one optimization pass over a view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationOutcome {
  pub metric_name: String,
  pub view_name:   String,
  /// Whether an unload/reload cycle was attempted.
  pub attempted:   bool,
  pub before:      Option<Performance>,
  pub after:       Option<Performance>,
  /// `after` is strictly faster than `before`.
  pub improved:    bool,
  pub state:       ViewState,
  pub note:        Option<String>,
}
