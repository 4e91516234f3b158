//! Agentroute CLI - drive the self-learning routers from a shell

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use agentroute_core::config::Config;
use agentroute_core::gating::{GatingNetwork, LoadBalanceReport, RoutingResult};
use agentroute_core::routing::{QLearningRouter, RoutingDecision};

#[derive(Parser)]
#[command(name = "agentroute")]
#[command(author, version, about = "Self-learning task router", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Directory holding engine snapshots (overrides AGENTROUTE_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, Default, PartialEq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Pick a route for a task description
    Route {
        /// Task description
        context: String,
        /// Allow epsilon-greedy exploration
        #[arg(short, long)]
        explore: bool,
    },

    /// Report the outcome of a routed task
    Feedback {
        /// Task description that was routed
        context: String,
        /// Route that handled it
        route: String,
        /// Reward, clamped to [-1, 1]
        #[arg(allow_hyphen_values = true)]
        reward: f64,
        /// Description of the follow-up task, if any
        #[arg(long)]
        next: Option<String>,
    },

    /// Route an embedding through the gating network
    Gate {
        /// JSON file holding an array of numbers
        #[arg(short, long, conflicts_with = "random")]
        input: Option<PathBuf>,
        /// Use a random embedding instead of a file
        #[arg(long)]
        random: bool,
        /// Seed for --random
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Reinforce the top expert with this reward
        #[arg(long, allow_hyphen_values = true)]
        reward: Option<f64>,
    },

    /// Show learning statistics of both engines
    Stats,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
    /// Reset to defaults
    Reset,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

/// Print an error chain, plus the code and hint of an engine error
fn report(err: &anyhow::Error) {
    eprintln!("Error: {:#}", err);
    if let Some(core) = err.downcast_ref::<agentroute_core::Error>() {
        eprintln!("  Code: {}", core.code());
        if let Some(suggestion) = core.suggestion() {
            eprintln!("  Suggestion: {}", suggestion);
        }
    }
}

async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let loaded = Config::load();
    let filter = loaded
        .as_ref()
        .map(|c| c.logging.filter.clone())
        .unwrap_or_else(|_| Config::default().logging.filter);

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Config { action } = cli.command {
        return cmd_config(action, cli.quiet);
    }

    let config = loaded?;
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => Config::data_dir()?,
    };
    debug!(data_dir = %data_dir.display(), "Resolved data directory");

    let out = Output {
        format: cli.format,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Route { context, explore } => {
            cmd_route(&config, &data_dir, &context, explore, out).await
        }
        Commands::Feedback {
            context,
            route,
            reward,
            next,
        } => cmd_feedback(&config, &data_dir, &context, &route, reward, next.as_deref(), out).await,
        Commands::Gate {
            input,
            random,
            seed,
            reward,
        } => cmd_gate(&config, &data_dir, input.as_deref(), random, seed, reward, out).await,
        Commands::Stats => cmd_stats(&config, &data_dir, out).await,
        Commands::Config { .. } => unreachable!("handled above"),
    }
}

#[derive(Clone, Copy)]
struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}

async fn cmd_route(
    config: &Config,
    data_dir: &Path,
    context: &str,
    explore: bool,
    out: Output,
) -> anyhow::Result<()> {
    let mut router = QLearningRouter::open(config.qlearning_with_storage(data_dir)).await?;
    let decision = router.route(context, explore);

    if out.json() {
        println!("{}", serde_json::to_string_pretty(&decision)?);
    } else if out.quiet {
        println!("{}", decision.route);
    } else {
        print_decision(&decision);
    }
    Ok(())
}

fn print_decision(decision: &RoutingDecision) {
    println!("Route: {}", decision.route);
    println!("Confidence: {:.4}", decision.confidence);
    println!(
        "Exploration: {}",
        if decision.is_exploration { "yes" } else { "no" }
    );
    println!("State: {}", decision.state);
    if !decision.alternatives.is_empty() {
        println!("Alternatives:");
        for alt in &decision.alternatives {
            println!("  {} ({:.4})", alt.route, alt.score);
        }
    }
}

async fn cmd_feedback(
    config: &Config,
    data_dir: &Path,
    context: &str,
    route: &str,
    reward: f64,
    next: Option<&str>,
    out: Output,
) -> anyhow::Result<()> {
    let mut router = QLearningRouter::open(config.qlearning_with_storage(data_dir)).await?;
    if router.config().routes.iter().all(|r| r != route) {
        return Err(anyhow!(
            "Unknown route: {}. Known routes: {}",
            route,
            router.config().routes.join(", ")
        ));
    }

    let td_error = router.update(context, route, reward, next);
    let saved = router.save().await;

    if out.json() {
        let value = serde_json::json!({
            "route": route,
            "td_error": td_error,
            "q_values": router.q_values(context),
            "saved": saved,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else if !out.quiet {
        println!("Updated {} (TD error {:.4})", route, td_error);
        if !saved {
            println!("  Warning: snapshot not saved; see logs");
        }
    }
    Ok(())
}

async fn cmd_gate(
    config: &Config,
    data_dir: &Path,
    input: Option<&Path>,
    random: bool,
    seed: u64,
    reward: Option<f64>,
    out: Output,
) -> anyhow::Result<()> {
    let gating = config.gating_with_storage(data_dir);
    let embedding = match (input, random) {
        (Some(path), _) => read_embedding(path)?,
        (None, true) => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            (0..gating.input_dim)
                .map(|_| rng.gen_range(-1.0f32..1.0))
                .collect()
        }
        (None, false) => return Err(anyhow!("Provide an embedding with --input FILE or --random")),
    };

    let mut network = GatingNetwork::open(gating).await?;
    let result = network.route(&embedding)?;

    let grad_norm = match (reward, result.top_expert()) {
        (Some(reward), Some(expert)) => {
            Some(network.update_expert_weights(&result, expert, reward))
        }
        _ => None,
    };
    // Routing alone moves the expert counts and balance bias
    if !network.save().await && !out.quiet {
        eprintln!("Warning: gating snapshot not saved; see logs");
    }

    if out.json() {
        let value = serde_json::json!({
            "result": result,
            "grad_norm": grad_norm,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else if out.quiet {
        let names: Vec<&str> = result.experts.iter().map(|e| e.name.as_str()).collect();
        println!("{}", names.join(","));
    } else {
        print_gating(&result);
        if let Some(norm) = grad_norm {
            println!("Gradient norm: {:.4}", norm);
        }
    }
    Ok(())
}

fn read_embedding(path: &Path) -> anyhow::Result<Vec<f32>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read embedding file: {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Embedding file is not a JSON array of numbers: {}", path.display()))
}

fn print_gating(result: &RoutingResult) {
    println!("Experts:");
    for expert in &result.experts {
        println!(
            "  {} (weight {:.4}, score {:.4})",
            expert.name, expert.weight, expert.score
        );
    }
    println!("Entropy: {:.4}", result.entropy);
    println!("Load-balance loss: {:.4}", result.load_balance_loss);
}

async fn cmd_stats(config: &Config, data_dir: &Path, out: Output) -> anyhow::Result<()> {
    let router = QLearningRouter::open(config.qlearning_with_storage(data_dir)).await?;
    let network = GatingNetwork::open(config.gating_with_storage(data_dir)).await?;
    let q = router.stats();
    let g = network.stats();
    let balance = network.load_balance();

    if out.json() {
        let value = serde_json::json!({
            "qlearning": q,
            "gating": g,
            "load_balance": balance,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }
    if out.quiet {
        return Ok(());
    }

    println!("Q-learning router:");
    println!("  States: {}", q.table_size);
    println!("  Updates: {} ({} replayed)", q.total_updates, q.replay_updates);
    println!("  Epsilon: {:.4}", q.epsilon);
    println!("  Mean |TD error|: {:.4}", q.mean_abs_td_error());
    println!("  Evictions: {}", q.evictions);
    println!();
    println!("Gating network ({} kernel):", g.kernel);
    println!("  Routings: {}", g.total_routes);
    println!("  Updates: {} ({} skipped)", g.total_updates, g.skipped_updates);
    print_balance(&balance);
    Ok(())
}

fn print_balance(report: &LoadBalanceReport) {
    println!("  Load balance (gini {:.4}, cv {:.4}):", report.gini, report.coefficient_of_variation);
    for expert in &report.experts {
        println!(
            "    {:<12} {:>6} ({:.1}%)",
            expert.name,
            expert.count,
            expert.fraction * 100.0
        );
    }
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
