use pitchforge_agent::{AgentProfiles, ModelConfig};
use pitchforge_core::RunConfig;
use pitchforge_orchestrator::OrchestratorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Contents of `pitchforge.toml`.
#[derive(Debug, Deserialize)]
pub struct PitchforgeConfig {
    /// Model used by every agent.
    pub model: ModelConfig,
    /// Root of the customers file, pitch store and trails.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Timeouts, retries and retention.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Run settings used when a command line flag is not given.
    #[serde(default)]
    pub defaults: RunConfig,
    /// Per-agent prompt and parameter overrides.
    #[serde(default)]
    pub profiles: AgentProfiles,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl PitchforgeConfig {
    /// Parse and validate config text.
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        if !config.orchestrator.score_weights.is_valid() {
            anyhow::bail!("orchestrator.score_weights must be non-negative with a positive sum");
        }
        config.defaults.validate()?;
        Ok(config)
    }

    /// Read and parse the file at `path`, filling empty API keys from the
    /// provider's environment variable.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {e}", path.display())
        })?;
        let mut config = Self::from_toml(&text)?;
        config.resolve_api_keys(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn resolve_api_keys(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn fill(model: &mut ModelConfig, lookup: &dyn Fn(&str) -> Option<String>) {
            if model.api_key.is_empty() {
                if let Some(key) = lookup(model.api_key_env()) {
                    model.api_key = key;
                }
            }
            for fallback in &mut model.fallback_models {
                fill(fallback, lookup);
            }
        }
        fill(&mut self.model, &lookup);
    }

    /// JSON array of customer seeds.
    pub fn customers_path(&self) -> PathBuf {
        self.data_dir.join("customers.json")
    }

    /// One JSON file per pitch version.
    pub fn pitches_dir(&self) -> PathBuf {
        self.data_dir.join("pitches")
    }

    /// One JSONL file per run.
    pub fn trails_dir(&self) -> PathBuf {
        self.data_dir.join("trails")
    }
}
