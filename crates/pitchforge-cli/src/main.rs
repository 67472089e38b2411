//! Command line front end for the pitchforge pipeline.

mod config;

use clap::{Args, Parser, Subcommand};
use config::PitchforgeConfig;
use pitchforge_agent::{AgentRoster, LlmClient};
use pitchforge_core::{PitchType, RunConfig, Tone};
use pitchforge_orchestrator::{progress_stream, Orchestrator, ProgressNotifier};
use pitchforge_store::{
    replay_stages, CustomerRepository, FileCustomerRepository, FilePitchStore, FileTrailStore,
    PersistRetry, PitchRepository, TrailRecorder, TrailStore,
};
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "pitchforge", about = "Pitchforge — multi-agent sales pitch generation")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "pitchforge.toml")]
    config: PathBuf,

    /// Human-readable logs instead of JSON lines
    #[arg(long)]
    pretty_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline for a customer and print the outcome
    Run(RunArgs),
    /// Start a run and stream its progress until it finishes (Ctrl-C cancels)
    Start(RunArgs),
    /// Print the A2A trail of a run and the stages it replays to
    Trail {
        correlation_id: Uuid,
    },
    /// Print every version of a pitch, root first
    Lineage {
        pitch_id: Uuid,
    },
    /// List known customers
    Customers,
}

#[derive(Args)]
struct RunArgs {
    /// Customer id
    #[arg(long)]
    customer: Uuid,
    /// Minimum overall score in (0, 1]
    #[arg(long)]
    threshold: Option<f64>,
    #[arg(long)]
    max_iterations: Option<u32>,
    /// professional, casual, friendly, urgent or consultative
    #[arg(long, value_parser = parse_enum::<Tone>)]
    tone: Option<Tone>,
    /// initial, follow_up, product_demo, renewal or ab_variant
    #[arg(long, value_parser = parse_enum::<PitchType>)]
    pitch_type: Option<PitchType>,
    #[arg(long)]
    template: Option<String>,
    #[arg(long)]
    campaign: Option<Uuid>,
    /// Extra instructions for the generator
    #[arg(long)]
    context: Option<String>,
    /// Ask the strategy agent for recommendations first
    #[arg(long)]
    strategy: bool,
    #[arg(long)]
    language: Option<String>,
}

impl RunArgs {
    fn apply(self, mut config: RunConfig) -> RunConfig {
        if let Some(t) = self.threshold {
            config.score_threshold = t;
        }
        if let Some(n) = self.max_iterations {
            config.max_iterations = n;
        }
        if let Some(tone) = self.tone {
            config.tone = tone;
        }
        if let Some(pitch_type) = self.pitch_type {
            config.pitch_type = pitch_type;
        }
        if self.template.is_some() {
            config.template = self.template;
        }
        if self.campaign.is_some() {
            config.campaign_id = self.campaign;
        }
        if self.context.is_some() {
            config.additional_context = self.context;
        }
        if let Some(language) = self.language {
            config.language = language;
        }
        config.include_strategy |= self.strategy;
        config
    }
}

/// Parse a flag value with the type's serde names.
fn parse_enum<T: DeserializeOwned>(s: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| format!("unknown value '{s}'"))
}

fn init_tracing(pretty: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if pretty {
        builder.pretty().init();
    } else {
        builder.json().init();
    }
}

async fn build_orchestrator(config: &PitchforgeConfig) -> anyhow::Result<Arc<Orchestrator>> {
    tokio::fs::create_dir_all(&config.data_dir).await?;

    let client = Arc::new(LlmClient::new(config.model.clone()));
    let roster = AgentRoster::from_llm(
        client,
        &config.profiles,
        config.orchestrator.score_weights,
    );
    info!(
        provider = ?config.model.provider,
        model = %config.model.model_id,
        fallbacks = config.model.fallback_models.len(),
        "Agent roster ready"
    );

    let customers: Arc<dyn CustomerRepository> =
        Arc::new(FileCustomerRepository::new(config.customers_path()));
    let pitches: Arc<dyn PitchRepository> =
        Arc::new(FilePitchStore::new(config.pitches_dir()).await?);
    let trail_store = Arc::new(FileTrailStore::new(config.trails_dir()).await?);
    let trail = Arc::new(TrailRecorder::with_store(trail_store, PersistRetry::default()));
    let progress = Arc::new(ProgressNotifier::new(config.orchestrator.progress_buffer));

    Ok(Arc::new(Orchestrator::new(
        Arc::new(roster),
        customers,
        pitches,
        trail,
        progress,
        config.orchestrator.clone(),
    )))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.pretty_logs);

    let config = PitchforgeConfig::load(&cli.config).await?;

    match cli.command {
        Commands::Run(args) => {
            let (customer, run_config) = args_to_config(args, &config)?;
            let orch = build_orchestrator(&config).await?;

            let outcome = orch.run(customer, run_config).await;
            print_json(&outcome)?;
            if !outcome.is_completed() {
                anyhow::bail!(
                    "run {} ended {:?}",
                    outcome.correlation_id,
                    outcome.terminal
                );
            }
        }
        Commands::Start(args) => {
            let (customer, run_config) = args_to_config(args, &config)?;
            let orch = build_orchestrator(&config).await?;

            let (run_id, rx) = orch.start_and_subscribe(customer, run_config);
            info!(correlation_id = %run_id, "Run started in background");

            let events = progress_stream(run_id, rx);
            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(events, ctrl_c);
            let mut cancelled = false;
            loop {
                tokio::select! {
                    event = events.next() => match event {
                        Some(event) => println!("{}", serde_json::to_string(&event)?),
                        None => break,
                    },
                    _ = &mut ctrl_c, if !cancelled => {
                        cancelled = true;
                        orch.cancel(run_id)?;
                    }
                }
            }

            // Progress closes before the trail is flushed; the outcome is
            // only published once it is on disk.
            let outcome = orch.wait(run_id).await?;
            print_json(&orch.status(run_id)?)?;
            if !outcome.is_completed() {
                anyhow::bail!("run {run_id} ended {:?}", outcome.terminal);
            }
        }
        Commands::Trail { correlation_id } => {
            let store = FileTrailStore::new(config.trails_dir()).await?;
            let trail = store.read(correlation_id).await?;
            if trail.is_empty() {
                anyhow::bail!("no trail recorded for {correlation_id}");
            }
            let stages = replay_stages(&trail)?;
            print_json(&serde_json::json!({ "stages": stages, "messages": trail }))?;
        }
        Commands::Lineage { pitch_id } => {
            let store = FilePitchStore::new(config.pitches_dir()).await?;
            print_json(&store.lineage(pitch_id).await?)?;
        }
        Commands::Customers => {
            let repo = FileCustomerRepository::new(config.customers_path());
            print_json(&repo.list().await?)?;
        }
    }

    Ok(())
}

/// Merge command line flags over the `[defaults]` section and validate.
fn args_to_config(args: RunArgs, config: &PitchforgeConfig) -> anyhow::Result<(Uuid, RunConfig)> {
    let customer = args.customer;
    let run_config = args.apply(config.defaults.clone());
    run_config.validate()?;
    Ok((customer, run_config))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "pitchforge",
            "--pretty-logs",
            "run",
            "--customer",
            "6a1f3b4e-9c1d-4c57-9d55-0b7f0c2a9e11",
            "--threshold",
            "0.8",
            "--tone",
            "urgent",
            "--pitch-type",
            "follow_up",
        ])
        .unwrap();
        assert!(cli.pretty_logs);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let config = args.apply(RunConfig::default());
        assert!((config.score_threshold - 0.8).abs() < 1e-12);
        assert_eq!(config.tone, Tone::Urgent);
        assert_eq!(config.pitch_type, PitchType::FollowUp);
        assert_eq!(config.max_iterations, 3);
    }

    #[test]
    fn test_cli_rejects_unknown_tone() {
        let result = Cli::try_parse_from([
            "pitchforge",
            "start",
            "--customer",
            "6a1f3b4e-9c1d-4c57-9d55-0b7f0c2a9e11",
            "--tone",
            "sarcastic",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_flags_override_defaults_only_when_given() {
        let defaults = RunConfig {
            tone: Tone::Friendly,
            template: Some("AIDA".into()),
            ..RunConfig::default()
        };
        let cli = Cli::try_parse_from([
            "pitchforge",
            "run",
            "--customer",
            "6a1f3b4e-9c1d-4c57-9d55-0b7f0c2a9e11",
            "--max-iterations",
            "5",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let config = args.apply(defaults);
        assert_eq!(config.tone, Tone::Friendly);
        assert_eq!(config.template.as_deref(), Some("AIDA"));
        assert_eq!(config.max_iterations, 5);
    }

    #[test]
    fn test_parse_enum_uses_serde_names() {
        assert_eq!(parse_enum::<PitchType>("ab_variant").unwrap(), PitchType::AbVariant);
        assert!(parse_enum::<PitchType>("A/B variant").is_err());
    }
}
