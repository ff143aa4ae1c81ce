//! chunkmill CLI
//!
//! Rewrites a text file unit by unit through a language model.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chunkmill::{
    analyze, build_runtime, run_pipeline, CancelSignal, Config, PipelinePhase, PipelineReport,
    ProviderKind,
};

const DEFAULT_CONFIG_PATH: &str = "chunkmill.yaml";

#[derive(Parser)]
#[command(name = "chunkmill")]
#[command(about = "Rewrite large texts through an LLM, unit by unit, in order", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: PathBuf,

    /// Override the maximum number of calls in flight
    #[arg(long, global = true)]
    max_concurrent: Option<usize>,

    /// Override the number of sentences per unit
    #[arg(long, global = true)]
    unit_size: Option<usize>,

    /// Override the input text path
    #[arg(short, long, global = true)]
    input: Option<PathBuf>,

    /// Override the output text path
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Override the model selector
    #[arg(long, global = true)]
    model: Option<String>,

    /// Use the offline echo backend instead of the configured provider
    #[arg(long, global = true)]
    echo: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Process the input (default if no command specified)
    Run,

    /// Segment the input and report unit statistics without any calls
    Analyze,

    /// Validate configuration
    Validate,

    /// Generate a sample configuration file
    GenerateConfig {
        /// Where to write the configuration file
        #[arg(default_value = DEFAULT_CONFIG_PATH)]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        None | Some(Commands::Run) => run_command(&cli),
        Some(Commands::Analyze) => analyze_command(&cli),
        Some(Commands::Validate) => validate_command(&cli),
        Some(Commands::GenerateConfig { path }) => generate_config_command(path),
    }
}

/// Load the config file (defaults if the default path is absent) and apply
/// command-line overrides.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if cli.config.exists() || cli.config != PathBuf::from(DEFAULT_CONFIG_PATH) {
        Config::from_file(&cli.config)?
    } else {
        tracing::info!("No {} found, using defaults", DEFAULT_CONFIG_PATH);
        Config::default()
    };

    apply_overrides(&mut config, cli);
    Ok(config)
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(n) = cli.max_concurrent {
        config.processing.max_concurrent = n;
    }
    if let Some(n) = cli.unit_size {
        config.processing.unit_size = n;
    }
    if let Some(path) = &cli.input {
        config.input.path = path.clone();
    }
    if let Some(path) = &cli.output {
        config.output.path = path.clone();
    }
    if let Some(model) = &cli.model {
        config.provider.model = model.clone();
    }
    if cli.echo {
        config.provider.kind = ProviderKind::Echo;
    }
}

fn run_command(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    config.validate()?;

    let runtime = build_runtime(config.processing.worker_threads)?;
    let report = runtime.block_on(async {
        let cancel = CancelSignal::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling remaining units");
                on_interrupt.cancel();
            }
        });

        run_pipeline(config, cancel).await
    })?;

    print_report(&report);

    if report.status == PipelinePhase::Cancelled {
        anyhow::bail!(
            "Run cancelled: {} of {} units processed",
            report.succeeded,
            report.total_units
        );
    }
    Ok(())
}

fn print_report(report: &PipelineReport) {
    println!("\n=== Run Summary ===");
    println!("Status: {}", report.status);
    println!("Total units: {}", report.total_units);
    println!("Succeeded: {}", report.succeeded);
    println!("Failed: {}", report.failed.len());
    for failed in &report.failed {
        println!("  unit {}: {}", failed.index, failed.message);
    }
    println!("Elapsed: {:.1}s", report.elapsed.as_secs_f64());
    println!("===================\n");
}

fn analyze_command(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let runtime = build_runtime(Some(1))?;
    let stats = runtime.block_on(analyze(&config))?;

    println!("\n=== Input Analysis ===");
    println!("Input: {}", config.input.path.display());
    println!("Sentences: {}", stats.sentences);
    println!(
        "Units: {} ({} sentences per unit)",
        stats.units, config.processing.unit_size
    );
    println!(
        "Unit size (chars): min {}, avg {:.0}, max {}",
        stats.min_unit_chars, stats.avg_unit_chars, stats.max_unit_chars
    );
    println!("Prompt characters to send: {}", stats.total_prompt_chars);
    println!(
        "Call waves at {} concurrent: {}",
        config.processing.max_concurrent,
        stats.units.div_ceil(config.processing.max_concurrent.max(1))
    );
    println!("======================\n");
    Ok(())
}

fn validate_command(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    config.validate()?;
    println!("Configuration is valid");
    Ok(())
}

fn generate_config_command(path: &Path) -> Result<()> {
    let yaml = r#"# chunkmill configuration

# === INPUT ===
input:
  # Text to process
  path: "content.txt"

  # Directive placed in front of every unit. Missing or empty file falls
  # back to a built-in "keep the original style and context" directive.
  system_prompt_path: "system_prompt.txt"

# === OUTPUT ===
output:
  # Reassembled document, one blank line between units
  path: "output.txt"

  # Optional JSON report with status and failed units
  # report_path: "report.json"

# === PROCESSING ===
processing:
  # Maximum inference calls in flight
  max_concurrent: 5

  # Sentences per unit
  unit_size: 5

  # Slot hold time after each call returns (ms)
  pacing_delay_ms: 100

  # Upper bound on a single call (seconds)
  call_timeout_secs: 300

  # Time in-flight calls may still finish after Ctrl-C (seconds)
  cancel_grace_secs: 5

  # Tokio worker threads (null = num CPUs)
  # worker_threads: 4

  # Periodic progress logging
  enable_metrics: true
  metrics_interval_secs: 10

  # Save final metrics as JSON
  # metrics_output_path: "metrics.json"

# === PROVIDER ===
provider:
  # chat_completions (any OpenAI-compatible API) or echo (offline)
  kind: chat_completions
  base_url: "https://api.openai.com/v1"
  model: "gpt-4o-mini"

  # Environment variable holding the API key
  api_key_env: "OPENAI_API_KEY"
  request_timeout_secs: 180

# === CALL CONFIG ===
# Passed through to the provider unchanged, on top of
# temperature 0.7, top_p 0.95, max_tokens 4096.
call_config:
  temperature: 0.7
"#;

    std::fs::write(path, yaml)?;
    println!("Generated sample configuration at: {}", path.display());

    Ok(())
}
