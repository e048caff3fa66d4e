//! Model Router - Command-line front end
//!
//! Routes prompts through scenario-driven model selection using the local
//! Ollama adapter and in-memory accounting.
//!
//! # Usage
//!
//! ```bash
//! # List selectable models
//! model-router models
//!
//! # Every registered model of one provider
//! model-router models --provider ollama
//!
//! # One-shot completion for a scenario
//! model-router ask --scenario quick_reply "What is a monad?"
//!
//! # Pin a model explicitly
//! model-router ask --model ollama:llama3.2 "Hello"
//!
//! # Stream the answer (Ctrl-C cancels)
//! model-router stream --scenario cover_letter "Write a cover letter for..."
//!
//! # Which model each scenario would use right now
//! model-router stats
//!
//! # Verbose logging
//! RUST_LOG=debug model-router ask "Hello"
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use router_core::collaborators::{CostGroupBy, PerformanceSink, UsageSink};
use router_core::config::{load_config_from_path, ConfigOverrides};
use router_core::{AiRequest, BackendRegistry, RequestRouter, RouteContext, StreamState};

/// Model Router - scenario-driven model selection for AI backends
#[derive(Parser, Debug)]
#[command(name = "model-router")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "ROUTER_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "ROUTER_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Ollama host
    #[arg(long, value_name = "HOST")]
    ollama_host: Option<String>,

    /// Ollama port
    #[arg(long, value_name = "PORT")]
    ollama_port: Option<u16>,

    /// Ollama default model
    #[arg(long, value_name = "MODEL")]
    ollama_model: Option<String>,

    /// Retries after the first attempt
    #[arg(long, value_name = "N")]
    max_retries: Option<u32>,

    /// Stream deadline in seconds
    #[arg(long, value_name = "SECS")]
    stream_deadline: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List models in the registry
    Models {
        /// Show every model of this provider, available or not
        #[arg(short = 'p', long)]
        provider: Option<String>,
    },

    /// Send one prompt and print the answer
    Ask(PromptArgs),

    /// Send one prompt and stream the answer
    Stream(PromptArgs),

    /// Show the registry, per-scenario choices and selection statistics
    Stats,
}

#[derive(ClapArgs, Debug)]
struct PromptArgs {
    /// Scenario driving model selection
    #[arg(short = 's', long, default_value = "chat")]
    scenario: String,

    /// Explicit `provider:model`, bypassing selection
    #[arg(short = 'm', long)]
    model: Option<String>,

    /// Caller identity recorded with usage
    #[arg(short = 'u', long, default_value = "cli")]
    user: String,

    /// Sampling temperature (0-2)
    #[arg(short = 't', long)]
    temperature: Option<f32>,

    /// Maximum tokens to generate
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Prompt text
    #[arg(required = true, num_args = 1..)]
    prompt: Vec<String>,
}

impl PromptArgs {
    fn request(&self) -> AiRequest {
        let mut request = AiRequest::new(self.prompt.join(" "));
        if let Some(ref model) = self.model {
            request = request.with_model(model.clone());
        }
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }

    fn context(&self) -> RouteContext {
        RouteContext::new(self.user.clone(), self.scenario.clone())
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("model_router={level},router_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn overrides(args: &Args) -> ConfigOverrides {
    let mut overrides = ConfigOverrides::new();
    if let Some(ref host) = args.ollama_host {
        overrides = overrides.with_ollama_host(host.clone());
    }
    if let Some(port) = args.ollama_port {
        overrides = overrides.with_ollama_port(port);
    }
    if let Some(ref model) = args.ollama_model {
        overrides = overrides.with_ollama_model(model.clone());
    }
    if let Some(n) = args.max_retries {
        overrides = overrides.with_max_retries(n);
    }
    if let Some(secs) = args.stream_deadline {
        overrides = overrides.with_stream_deadline_secs(secs);
    }
    overrides
}

async fn build_router(args: &Args) -> Result<RequestRouter> {
    let path = args
        .config
        .clone()
        .or_else(router_core::config::default_config_path);
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;
    overrides(args).apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(source = %config.source(), "Configuration loaded");

    let router = config.router_builder(BackendRegistry::new()).build();
    let summary = router.reload_models().await;
    info!(
        generation = summary.generation,
        models = summary.models,
        available = summary.available,
        "Registry ready"
    );
    Ok(router)
}

fn list_models(router: &RequestRouter, provider: Option<&str>) {
    let models = match provider {
        Some(p) => router.get_models_by_provider(p),
        None => router.get_available_models(),
    };
    if models.is_empty() {
        println!("No models.");
        return;
    }
    println!(
        "{:<36} {:>7} {:>10} {:>12} {:>12}  {}",
        "MODEL", "QUALITY", "LATENCY", "IN $/TOK", "OUT $/TOK", "STATUS"
    );
    for m in models {
        let status = if m.is_selectable() { "available" } else { "unavailable" };
        println!(
            "{:<36} {:>7} {:>8}ms {:>12.2e} {:>12.2e}  {}",
            m.id(),
            m.quality,
            m.avg_latency_ms,
            m.cost_per_input_token,
            m.cost_per_output_token,
            status
        );
    }
}

async fn ask(router: &RequestRouter, prompt: &PromptArgs) -> Result<()> {
    let response = router.call(prompt.request(), &prompt.context()).await?;
    println!("{}", response.content);
    info!(
        model = %response.model,
        provider = %response.provider,
        input_tokens = response.usage.input_tokens,
        output_tokens = response.usage.output_tokens,
        "Done"
    );
    Ok(())
}

async fn stream(router: &RequestRouter, prompt: &PromptArgs) -> Result<()> {
    let mut stream = router.stream(prompt.request(), &prompt.context()).await?;
    info!(model = %stream.model().key, "Streaming");

    let token = stream.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let mut stdout = tokio::io::stdout();
    while let Some(chunk) = stream.next_chunk().await {
        let text = chunk?;
        stdout.write_all(text.as_bytes()).await?;
        stdout.flush().await?;
    }
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;

    if stream.state() == StreamState::Cancelled {
        warn!("Stream cancelled");
    }
    Ok(())
}

async fn stats(router: &RequestRouter) -> Result<()> {
    let snapshot = router.snapshot();
    println!(
        "Registry generation {} loaded {}: {} models, {} available",
        snapshot.generation(),
        snapshot.loaded_at().format("%Y-%m-%d %H:%M:%S UTC"),
        snapshot.len(),
        snapshot.available_models().len()
    );
    println!();

    println!("{:<20} {:<10} {}", "SCENARIO", "STRATEGY", "MODEL");
    for id in router.scenarios().ids() {
        let strategy = router
            .scenarios()
            .get(id)
            .map(|p| p.strategy.to_string())
            .unwrap_or_default();
        let choice = match router.preview_model(id).await {
            Ok(model) => model.id(),
            Err(e) => format!("<{}>", e.code()),
        };
        println!("{id:<20} {strategy:<10} {choice}");
    }
    println!();

    let statistics = router.get_selection_statistics();
    println!("{}", serde_json::to_string_pretty(&statistics)?);

    let metrics = router.accountant().performance_sink().get_all_metrics().await;
    if !metrics.is_empty() {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let router = build_router(&args).await?;

    match &args.command {
        Command::Models { provider } => list_models(&router, provider.as_deref()),
        Command::Ask(prompt) => ask(&router, prompt).await?,
        Command::Stream(prompt) => stream(&router, prompt).await?,
        Command::Stats => stats(&router).await?,
    }

    // Cost of this invocation, if anything was executed
    let report = router
        .accountant()
        .usage_sink()
        .generate_cost_report(
            DateTime::<Utc>::MIN_UTC,
            Utc::now() + TimeDelta::seconds(1),
            CostGroupBy::Model,
        )
        .await;
    if report.total.requests > 0 {
        info!(
            requests = report.total.requests,
            cost = report.total.cost,
            "Session usage"
        );
    }
    Ok(())
}
