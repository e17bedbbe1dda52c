//! Server configuration.
//!
//! Read from an optional TOML file, then overridden by `VANTAGE__`-prefixed
//! environment variables where `__` separates nesting levels, e.g.
//! `VANTAGE__REASONER__API_KEY` or `VANTAGE__ROUTER__AGENT_TIMEOUT_MS`.

use std::{
  collections::BTreeSet,
  path::{Path, PathBuf},
};

use config::{
  Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState,
};
use serde::Deserialize;
use vantage_agents::{
  AgentProfile, ClassifierSettings, PipelineSettings, RouterSettings, RoutingTable,
  SynthesizerSettings,
  agents::{AnalystSettings, default_profiles},
  anthropic::ReasonerSettings,
};
use vantage_views::ViewSettings;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub host:                  String,
  pub port:                  u16,
  /// SQLite database file for the embedded engine.
  pub store_path:            PathBuf,
  /// Metric catalog TOML; the built-in catalog is used when unset.
  pub catalog_path:          Option<PathBuf>,
  pub snapshot_max_age_secs: u64,
  pub history_turns:         usize,
  /// Run the view maintenance sweep this often. Off when unset.
  pub sweep_interval_secs:   Option<u64>,
  pub views:                 ViewSettings,
  pub classifier:            ClassifierSettings,
  pub router:                RouterSettings,
  pub analyst:               AnalystSettings,
  pub synthesizer:           SynthesizerSettings,
  pub reasoner:              ReasonerSettings,
  pub agents:                Vec<AgentProfile>,
  pub routing:               RoutingTable,
}

impl Default for Settings {
  fn default() -> Self {
    let pipeline = PipelineSettings::default();
    Self {
      host:                  "127.0.0.1".into(),
      port:                  8080,
      store_path:            PathBuf::from("vantage.db"),
      catalog_path:          None,
      snapshot_max_age_secs: pipeline.snapshot_max_age_secs,
      history_turns:         pipeline.history_turns,
      sweep_interval_secs:   None,
      views:                 ViewSettings::default(),
      classifier:            ClassifierSettings::default(),
      router:                RouterSettings::default(),
      analyst:               AnalystSettings::default(),
      synthesizer:           SynthesizerSettings::default(),
      reasoner:              ReasonerSettings::default(),
      agents:                default_profiles(),
      routing:               RoutingTable::default(),
    }
  }
}

impl Settings {
  /// Load `path` (if it exists) and the environment.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    Self::build(
      Config::builder()
        .add_source(File::from(path).required(false))
        .add_source(
          Environment::with_prefix("VANTAGE")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
        ),
    )
  }

  fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
    builder.build()?.try_deserialize()
  }

  pub fn pipeline(&self) -> PipelineSettings {
    PipelineSettings {
      snapshot_max_age_secs: self.snapshot_max_age_secs,
      history_turns:         self.history_turns,
    }
  }

  /// Cross-field checks the deserializer cannot express.
  pub fn validate(&self) -> Result<(), String> {
    self.views.validate().map_err(|e| format!("[views]: {e}"))?;
    self.routing.validate().map_err(|e| format!("[routing]: {e}"))?;

    let mut names = BTreeSet::new();
    for profile in &self.agents {
      if !names.insert(profile.name.as_str()) {
        return Err(format!("agent {} is configured twice", profile.name));
      }
    }
    if let Some(missing) =
      self.routing.agents().find(|a| !names.contains(a.as_str()))
    {
      return Err(format!(
        "[routing] names agent {missing}, which is not in [[agents]]"
      ));
    }
    if self.history_turns == 0 {
      return Err("history_turns must be positive".into());
    }
    if self.sweep_interval_secs == Some(0) {
      return Err("sweep_interval_secs must be positive when set".into());
    }
    Ok(())
  }
}
