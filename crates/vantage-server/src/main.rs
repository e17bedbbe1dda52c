//! vantage server binary.
//!
//! Reads `vantage.toml` (or the path given with `--config` or
//! `VANTAGE_CONFIG`) plus `VANTAGE__*` environment overrides, opens the
//! embedded SQLite engine, and serves the question-answering API over HTTP.
//!
//! ```sh
//! VANTAGE__REASONER__API_KEY=... cargo run -p vantage-server -- --sample-data
//! ```

mod settings;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;
use vantage_agents::{
  AgentRegistry, AgentRouter, Classifier, Pipeline, Synthesizer,
  anthropic::AnthropicReasoner,
};
use vantage_core::{metric::MetricCatalog, reasoner::Reasoner};
use vantage_store_sqlite::{SAMPLE_DATA, SqliteEngine};
use vantage_views::ViewManager;

use crate::settings::Settings;

#[derive(Parser)]
#[command(author, version, about = "Vantage analytics question-answering server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, env = "VANTAGE_CONFIG", default_value = "vantage.toml")]
  config: PathBuf,

  /// Load the bundled sample customers, projects and transactions before
  /// serving.
  #[arg(long)]
  sample_data: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = Settings::load(&cli.config)
    .with_context(|| format!("failed to read configuration from {:?}", cli.config))?;
  settings
    .validate()
    .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

  // Engine.
  let store_path = expand_tilde(&settings.store_path);
  let engine = SqliteEngine::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  if cli.sample_data {
    engine
      .execute_batch(SAMPLE_DATA)
      .await
      .context("failed to load sample data")?;
    info!("sample data loaded");
  }

  // Catalog and views.
  let catalog = match &settings.catalog_path {
    Some(path) => {
      let source = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read metric catalog {path:?}"))?;
      MetricCatalog::from_toml(&source)
        .with_context(|| format!("invalid metric catalog {path:?}"))?
    }
    None => MetricCatalog::embedded().context("invalid built-in metric catalog")?,
  };
  let catalog = Arc::new(catalog);
  info!(metrics = catalog.len(), "metric catalog loaded");
  let views = Arc::new(ViewManager::new(
    Arc::new(engine),
    Arc::clone(&catalog),
    settings.views.clone(),
  ));

  // Reasoner and agents.
  if settings.reasoner.api_key.is_empty() {
    warn!("no reasoner api_key configured; answers will use the fallback paths");
  }
  let reasoner: Arc<dyn Reasoner> = Arc::new(
    AnthropicReasoner::new(settings.reasoner.clone())
      .context("failed to build reasoner client")?,
  );
  let registry = Arc::new(AgentRegistry::from_profiles(
    &settings.agents,
    Arc::clone(&views),
    Arc::clone(&reasoner),
    settings.analyst.clone(),
  ));
  let classifier = Classifier::new(
    Arc::clone(&reasoner),
    catalog,
    registry.profiles(),
    settings.routing.clone(),
    settings.classifier.clone(),
  );
  let pipeline = Arc::new(Pipeline::new(
    Arc::clone(&views),
    classifier,
    AgentRouter::new(registry, settings.router.clone()),
    Synthesizer::new(reasoner, settings.synthesizer.clone()),
    settings.pipeline(),
  ));

  match pipeline.snapshot().await {
    Ok(snapshot) => info!(
      tables = snapshot.tables().len(),
      fingerprint = %snapshot.fingerprint(),
      "schema captured"
    ),
    Err(e) => warn!(error = %e, "initial schema capture failed; retrying on first request"),
  }

  if let Some(secs) = settings.sweep_interval_secs {
    tokio::spawn(sweep_loop(views, Duration::from_secs(secs)));
  }

  let app = vantage_api::api_router(pipeline).layer(TraceLayer::new_for_http());
  let address = format!("{}:{}", settings.host, settings.port);

  info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Measure and optimize every loaded view once per `every`.
async fn sweep_loop(views: Arc<ViewManager<SqliteEngine>>, every: Duration) {
  let mut ticker = tokio::time::interval(every);
  // The first tick completes immediately; nothing is loaded yet.
  ticker.tick().await;
  loop {
    ticker.tick().await;
    let report = views.sweep().await;
    let failed = report.iter().filter(|entry| entry.error.is_some()).count();
    let reloaded = report
      .iter()
      .filter(|entry| entry.optimization.as_ref().is_some_and(|o| o.attempted))
      .count();
    info!(views = report.len(), reloaded, failed, "maintenance sweep finished");
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
