//! Error types for `vantage-core`.
//!
//! One enum covers the whole taxonomy so that every layer above the core can
//! decide between "contain as data" and "surface to the caller" by matching
//! on a single type.

use std::time::Duration;

use thiserror::Error;

use crate::view::{ViewStage, ViewState};

/// A boxed error from a storage backend or transport.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("metric not found: {0}")]
  MetricNotFound(String),

  #[error("no view registered for metric {0}")]
  ViewNotFound(String),

  #[error("view for {metric} is {state}, not queryable")]
  ViewNotReady { metric: String, state: ViewState },

  #[error("schema mismatch for metric {metric}: {detail}")]
  SchemaMismatch { metric: String, detail: String },

  #[error("connection error: {0}")]
  Connection(#[source] BoxError),

  #[error("{operation} timed out after {after:?}")]
  Timeout { operation: String, after: Duration },

  #[error("introspection error: {0}")]
  Introspection(String),

  #[error("view {metric} failed at {stage}: {source}")]
  ViewCreation {
    metric: String,
    stage:  ViewStage,
    #[source]
    source: Box<Error>,
  },

  #[error("illegal view transition {from} -> {to}")]
  InvalidTransition { from: ViewState, to: ViewState },

  #[error("classification error: {0}")]
  Classification(String),

  #[error("synthesis error: {0}")]
  Synthesis(String),

  #[error("unknown agent: {0}")]
  UnknownAgent(String),

  #[error("invalid metric catalog: {0}")]
  InvalidCatalog(String),

  #[error("no agent produced an answer: {0}")]
  NoAnswer(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Wrap a backend error as a connection failure.
  pub fn connection(err: impl Into<BoxError>) -> Self {
    Self::Connection(err.into())
  }

  /// Transient infrastructure failures; eligible for a bounded retry at the
  /// caller's discretion.
  pub fn is_transient(&self) -> bool {
    match self {
      Self::Connection(_) | Self::Timeout { .. } | Self::Introspection(_) => {
        true
      }
      Self::ViewCreation { source, .. } => source.is_transient(),
      _ => false,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
