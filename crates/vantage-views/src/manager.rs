//! [`ViewManager`] owns the view registry and drives every view through
//! its lifecycle.
//!
//! The manager is the only writer of [`ViewDescriptor`]s. Reads are a plain
//! `RwLock` read; creation, optimization and removal of one metric's view are
//! serialised by a per-metric async mutex so two concurrent `ensure` calls
//! never issue the same `CREATE` twice.
//!
//! Nothing here runs on a timer. Maintenance happens when a caller invokes
//! [`ViewManager::sweep`] or [`ViewManager::optimize_if_needed`].

use std::{
  collections::HashMap,
  future::Future,
  sync::{Arc, Mutex, PoisonError, RwLock},
  time::Duration,
};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, timeout};
use tracing::{debug, info, instrument, warn};
use vantage_core::{
  Error, Result,
  engine::{AnalyticsEngine, Row},
  metric::{MetricCatalog, MetricDefinition},
  schema::SchemaSnapshot,
  view::{
    OptimizationOutcome, Performance, PerformanceRating, PerformanceThresholds,
    VIEW_PREFIX, ViewDescriptor, ViewStage, ViewState, view_name_for,
  },
};

use crate::{
  generator::{GenerationParams, SqlGenerator},
  health::HealthWeights,
};

// ─── Settings ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSettings {
  /// Deadline for each individual engine call.
  pub timeout_ms:                u64,
  pub fast_threshold_ms:         u64,
  /// Probes at or above this mark a view for optimization.
  pub optimization_threshold_ms: u64,
  pub default_lookback_months:   u32,
  /// Pin "today" for SQL generation. Defaults to the current UTC date.
  pub reference_date:            Option<NaiveDate>,
  pub health:                    HealthWeights,
}

impl Default for ViewSettings {
  fn default() -> Self {
    Self {
      timeout_ms:                30_000,
      fast_threshold_ms:         100,
      optimization_threshold_ms: 1_000,
      default_lookback_months:   24,
      reference_date:            None,
      health:                    HealthWeights::default(),
    }
  }
}

impl ViewSettings {
  pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }

  pub fn thresholds(&self) -> PerformanceThresholds {
    PerformanceThresholds {
      fast_ms:         self.fast_threshold_ms,
      optimization_ms: self.optimization_threshold_ms,
    }
  }

  pub fn validate(&self) -> Result<(), String> {
    if self.fast_threshold_ms > self.optimization_threshold_ms {
      return Err(
        "fast_threshold_ms must not exceed optimization_threshold_ms".into(),
      );
    }
    if self.timeout_ms == 0 {
      return Err("timeout_ms must be positive".into());
    }
    self.health.validate()
  }
}

// ─── Reports ─────────────────────────────────────────────────────────────────

/// Per-metric result of [`ViewManager::ensure_all`].
#[derive(Debug, Clone, Serialize)]
pub struct EnsureOutcome {
  pub metric_name: String,
  pub view:        Option<ViewDescriptor>,
  pub error:       Option<String>,
}

/// Per-view result of [`ViewManager::sweep`].
#[derive(Debug, Clone, Serialize)]
pub struct SweepEntry {
  pub metric_name:  String,
  pub performance:  Option<Performance>,
  pub optimization: Option<OptimizationOutcome>,
  pub error:        Option<String>,
}

// ─── Manager ─────────────────────────────────────────────────────────────────

pub struct ViewManager<E> {
  engine:   Arc<E>,
  catalog:  Arc<MetricCatalog>,
  settings: ViewSettings,
  registry: RwLock<HashMap<String, ViewDescriptor>>,
  locks:    Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<E: AnalyticsEngine> ViewManager<E> {
  pub fn new(engine: Arc<E>, catalog: Arc<MetricCatalog>, settings: ViewSettings) -> Self {
    Self {
      engine,
      catalog,
      settings,
      registry: RwLock::new(HashMap::new()),
      locks: Mutex::new(HashMap::new()),
    }
  }

  pub fn engine(&self) -> &Arc<E> { &self.engine }

  pub fn catalog(&self) -> &Arc<MetricCatalog> { &self.catalog }

  pub fn settings(&self) -> &ViewSettings { &self.settings }

  // ── Creation ──────────────────────────────────────────────────────────

  /// Make sure the view for `metric_name` exists and is loaded.
  ///
  /// A `LOADED` descriptor is returned unchanged without touching the
  /// engine. Otherwise the SQL is generated from `schema`, the view created
  /// and loaded into the secondary engine. A failure at any step leaves an
  /// `ERROR` descriptor in the registry and returns
  /// [`Error::ViewCreation`] naming the stage.
  #[instrument(skip(self, schema), fields(fingerprint = %schema.fingerprint()))]
  pub async fn ensure(
    &self,
    metric_name: &str,
    schema: &SchemaSnapshot,
  ) -> Result<ViewDescriptor> {
    let metric = self.catalog.get(metric_name)?;
    if let Some(ready) = self.ready(metric_name) {
      return Ok(ready);
    }

    let lock = self.lock_for(metric_name);
    let _guard = lock.lock().await;
    // Someone else may have finished while we waited.
    if let Some(ready) = self.ready(metric_name) {
      return Ok(ready);
    }
    self.create(metric, schema).await
  }

  /// [`ensure`](Self::ensure) each metric in catalog priority order, carrying
  /// on past failures.
  pub async fn ensure_all<'a>(
    &self,
    metric_names: impl IntoIterator<Item = &'a str>,
    schema: &SchemaSnapshot,
  ) -> Vec<EnsureOutcome> {
    let (mut known, unknown): (Vec<&str>, Vec<&str>) =
      metric_names.into_iter().partition(|m| self.catalog.contains(m));
    known.sort_by_key(|m| self.catalog_position(m));
    known.dedup();

    let mut outcomes = Vec::with_capacity(known.len() + unknown.len());
    for name in known {
      let outcome = match self.ensure(name, schema).await {
        Ok(view) => EnsureOutcome { metric_name: name.to_owned(), view: Some(view), error: None },
        Err(e) => EnsureOutcome {
          metric_name: name.to_owned(),
          view:        None,
          error:       Some(e.to_string()),
        },
      };
      outcomes.push(outcome);
    }
    for name in unknown {
      outcomes.push(EnsureOutcome {
        metric_name: name.to_owned(),
        view:        None,
        error:       Some(Error::MetricNotFound(name.to_owned()).to_string()),
      });
    }
    outcomes
  }

  async fn create(
    &self,
    metric: &MetricDefinition,
    schema: &SchemaSnapshot,
  ) -> Result<ViewDescriptor> {
    let params = GenerationParams {
      reference_date:          self.today(),
      default_lookback_months: self.settings.default_lookback_months,
      health:                  self.settings.health,
    };
    let generator = SqlGenerator::new(self.engine.dialect(), params);

    let mut view =
      ViewDescriptor::new(&metric.name, String::new(), schema.fingerprint(), Utc::now());
    match generator.generate(metric, schema) {
      Ok(sql) => view.sql_body = sql,
      Err(e) => return Err(self.fail(&mut view, ViewStage::Generate, e)),
    }
    debug!(view = %view.view_name, sql = %view.sql_body, "generated view sql");
    self.store(&view);

    let created = self
      .call("create view", self.engine.create_or_replace_view(&view.view_name, &view.sql_body))
      .await;
    if let Err(e) = created {
      return Err(self.fail(&mut view, ViewStage::Create, e));
    }
    view.transition(ViewState::Created)?;
    self.store(&view);

    let loaded = self
      .call("secondary load", self.engine.secondary_load(&view.view_name))
      .await;
    if let Err(e) = loaded {
      return Err(self.fail(&mut view, ViewStage::Load, e));
    }
    view.transition(ViewState::Loaded)?;
    self.store(&view);

    info!(metric = %metric.name, view = %view.view_name, "view loaded");
    Ok(view)
  }

  // ── Performance ───────────────────────────────────────────────────────

  /// Time a probe query against the view and record the rating.
  ///
  /// A `needs_optimization` rating moves a `LOADED` view to `STALE`. Accepts
  /// either the metric name or the view name.
  #[instrument(skip(self))]
  pub async fn measure(&self, name: &str) -> Result<Performance> {
    let metric = self.resolve(name)?;
    let lock = self.lock_for(&metric);
    let _guard = lock.lock().await;

    let mut view = self.queryable(&metric)?;
    let performance = self.probe(&view.view_name).await?;
    view.last_performance = Some(performance.clone());
    if performance.rating == PerformanceRating::NeedsOptimization
      && view.state == ViewState::Loaded
    {
      view.transition(ViewState::Stale)?;
      warn!(
        metric = %metric,
        ms = performance.execution_time_ms,
        "view needs optimization"
      );
    }
    self.store(&view);
    Ok(performance)
  }

  /// Run an unload/reload cycle if the last measurement asked for one.
  ///
  /// Views without a `needs_optimization` rating are left alone and reported
  /// with `attempted: false`.
  #[instrument(skip(self))]
  pub async fn optimize_if_needed(&self, name: &str) -> Result<OptimizationOutcome> {
    let metric = self.resolve(name)?;
    let lock = self.lock_for(&metric);
    let _guard = lock.lock().await;

    let mut view = self.descriptor(&metric)?;
    let before = view.last_performance.clone();
    let needed = before
      .as_ref()
      .is_some_and(|p| p.rating == PerformanceRating::NeedsOptimization)
      && matches!(view.state, ViewState::Loaded | ViewState::Stale);
    if !needed {
      let note = match &before {
        None => "not measured yet",
        Some(_) if !matches!(view.state, ViewState::Loaded | ViewState::Stale) => {
          "view is not loaded"
        }
        Some(_) => "performance is within thresholds",
      };
      return Ok(OptimizationOutcome {
        metric_name: view.metric_name,
        view_name:   view.view_name,
        attempted:   false,
        before,
        after:       None,
        improved:    false,
        state:       view.state,
        note:        Some(note.into()),
      });
    }

    view.transition(ViewState::Optimizing)?;
    self.store(&view);
    info!(metric = %metric, "optimizing view");

    let unloaded = self
      .call("secondary unload", self.engine.secondary_unload(&view.view_name))
      .await;
    if let Err(e) = unloaded {
      return Err(self.fail(&mut view, ViewStage::Unload, e));
    }
    let reloaded = self
      .call("secondary load", self.engine.secondary_load(&view.view_name))
      .await;
    if let Err(e) = reloaded {
      return Err(self.fail(&mut view, ViewStage::Reload, e));
    }
    let after = match self.probe(&view.view_name).await {
      Ok(p) => p,
      Err(e) => return Err(self.fail(&mut view, ViewStage::Probe, e)),
    };

    let improved = before
      .as_ref()
      .is_some_and(|b| after.execution_time_ms < b.execution_time_ms);
    view.last_performance = Some(after.clone());
    view.transition(ViewState::Loaded)?;
    self.store(&view);
    info!(metric = %metric, ms = after.execution_time_ms, improved, "view optimized");

    Ok(OptimizationOutcome {
      metric_name: view.metric_name,
      view_name: view.view_name,
      attempted: true,
      before,
      after: Some(after),
      improved,
      state: ViewState::Loaded,
      note: None,
    })
  }

  /// Measure every queryable view and optimize the ones that need it.
  pub async fn sweep(&self) -> Vec<SweepEntry> {
    let targets: Vec<String> = self
      .list()
      .into_iter()
      .filter(|v| matches!(v.state, ViewState::Loaded | ViewState::Stale))
      .map(|v| v.metric_name)
      .collect();

    let mut report = Vec::with_capacity(targets.len());
    for metric in targets {
      let mut entry = SweepEntry {
        metric_name:  metric.clone(),
        performance:  None,
        optimization: None,
        error:        None,
      };
      match self.measure(&metric).await {
        Ok(p) => entry.performance = Some(p),
        Err(e) => {
          warn!(metric = %metric, error = %e, "sweep measurement failed");
          entry.error = Some(e.to_string());
          report.push(entry);
          continue;
        }
      }
      match self.optimize_if_needed(&metric).await {
        Ok(o) => entry.optimization = Some(o),
        Err(e) => {
          warn!(metric = %metric, error = %e, "sweep optimization failed");
          entry.error = Some(e.to_string());
        }
      }
      report.push(entry);
    }
    report
  }

  // ── Data access ───────────────────────────────────────────────────────

  /// Read up to `limit` rows from a loaded (or stale) view.
  pub async fn rows(&self, name: &str, limit: usize) -> Result<Vec<Row>> {
    let metric = self.resolve(name)?;
    let view = self.queryable(&metric)?;
    self
      .call("fetch rows", self.engine.fetch_rows(&view.view_name, limit))
      .await
  }

  pub fn get(&self, name: &str) -> Option<ViewDescriptor> {
    let metric = self.resolve(name).ok()?;
    self.read().get(&metric).cloned()
  }

  /// Every registered view, in catalog priority order.
  pub fn list(&self) -> Vec<ViewDescriptor> {
    let mut views: Vec<ViewDescriptor> = self.read().values().cloned().collect();
    views.sort_by_key(|v| self.catalog_position(&v.metric_name));
    views
  }

  // ── Invalidation ──────────────────────────────────────────────────────

  /// Forget the registry entry so the next `ensure` regenerates the view.
  /// The view itself stays in the engine until replaced.
  pub fn invalidate(&self, name: &str) -> Option<ViewDescriptor> {
    let metric = self.resolve(name).ok()?;
    self.write().remove(&metric)
  }

  /// Drop every entry generated from a schema other than `schema`. Returns
  /// the affected metric names.
  pub fn invalidate_if_changed(&self, schema: &SchemaSnapshot) -> Vec<String> {
    let mut registry = self.write();
    let mut stale: Vec<String> = registry
      .values()
      .filter(|v| v.schema_fingerprint != schema.fingerprint())
      .map(|v| v.metric_name.clone())
      .collect();
    stale.sort();
    for metric in &stale {
      registry.remove(metric);
    }
    if !stale.is_empty() {
      info!(count = stale.len(), "schema changed; invalidated views");
    }
    stale
  }

  /// Unload and drop the view from the engine, then forget it.
  pub async fn remove(&self, name: &str) -> Result<Option<ViewDescriptor>> {
    let metric = self.resolve(name)?;
    let lock = self.lock_for(&metric);
    let _guard = lock.lock().await;

    let view_name = view_name_for(&metric);
    let loaded = self
      .read()
      .get(&metric)
      .is_some_and(|v| matches!(v.state, ViewState::Loaded | ViewState::Stale));
    if loaded {
      let unloaded = self
        .call("secondary unload", self.engine.secondary_unload(&view_name))
        .await;
      if let Err(e) = unloaded {
        warn!(metric = %metric, error = %e, "unload before drop failed");
      }
    }
    self
      .call("drop view", self.engine.drop_view(&view_name))
      .await?;
    Ok(self.write().remove(&metric))
  }

  // ── Internals ─────────────────────────────────────────────────────────

  fn today(&self) -> NaiveDate {
    self
      .settings
      .reference_date
      .unwrap_or_else(|| Utc::now().date_naive())
  }

  /// Map a metric or view name to the catalog's metric name.
  fn resolve(&self, name: &str) -> Result<String> {
    if self.catalog.contains(name) {
      return Ok(name.to_owned());
    }
    match name.strip_prefix(VIEW_PREFIX) {
      Some(metric) if self.catalog.contains(metric) => Ok(metric.to_owned()),
      _ => Err(Error::MetricNotFound(name.to_owned())),
    }
  }

  fn catalog_position(&self, metric: &str) -> usize {
    self
      .catalog
      .all()
      .iter()
      .position(|m| m.name == metric)
      .unwrap_or(usize::MAX)
  }

  fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, ViewDescriptor>> {
    self.registry.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, ViewDescriptor>> {
    self.registry.write().unwrap_or_else(PoisonError::into_inner)
  }

  fn store(&self, view: &ViewDescriptor) {
    self.write().insert(view.metric_name.clone(), view.clone());
  }

  fn ready(&self, metric: &str) -> Option<ViewDescriptor> {
    self.read().get(metric).filter(|v| v.is_ready()).cloned()
  }

  fn descriptor(&self, metric: &str) -> Result<ViewDescriptor> {
    self
      .read()
      .get(metric)
      .cloned()
      .ok_or_else(|| Error::ViewNotFound(metric.to_owned()))
  }

  /// A descriptor whose view can be read: `LOADED` or `STALE`.
  fn queryable(&self, metric: &str) -> Result<ViewDescriptor> {
    let view = self.descriptor(metric)?;
    match view.state {
      ViewState::Loaded | ViewState::Stale => Ok(view),
      state => Err(Error::ViewNotReady { metric: metric.to_owned(), state }),
    }
  }

  fn lock_for(&self, metric: &str) -> Arc<tokio::sync::Mutex<()>> {
    let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
    locks.entry(metric.to_owned()).or_default().clone()
  }

  /// Run one engine call under the configured deadline.
  async fn call<T>(
    &self,
    operation: &str,
    fut: impl Future<Output = Result<T, E::Error>>,
  ) -> Result<T> {
    let after = self.settings.timeout();
    match timeout(after, fut).await {
      Ok(result) => result.map_err(Error::connection),
      Err(_) => Err(Error::Timeout { operation: operation.to_owned(), after }),
    }
  }

  async fn probe(&self, view_name: &str) -> Result<Performance> {
    let started = Instant::now();
    let row_count = self.call("probe", self.engine.probe(view_name)).await?;
    let execution_time_ms =
      u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    Ok(Performance {
      execution_time_ms,
      rating: self.settings.thresholds().rate(execution_time_ms),
      row_count,
      measured_at: Utc::now(),
    })
  }

  /// Mark the descriptor failed, keep it for inspection, and wrap the cause.
  fn fail(&self, view: &mut ViewDescriptor, stage: ViewStage, cause: Error) -> Error {
    warn!(metric = %view.metric_name, %stage, error = %cause, "view operation failed");
    view.fail(cause.to_string());
    self.store(view);
    Error::ViewCreation {
      metric: view.metric_name.clone(),
      stage,
      source: Box::new(cause),
    }
  }
}
