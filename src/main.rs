use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commit_review_orchestrator::{
    config::Config,
    github::{GitHubClient, GitHubWorkSource},
    orchestrator::{
        Dispatcher, DispatcherConfig, EventBus, HealthMonitor, HealthMonitorConfig, ReportWorkflow,
    },
    registry::AgentRegistry,
    reports::ReportGenerator,
    transport::{HttpTransport, Transport},
    types::{RunSummary, SessionContext, WorkKind, WorkUnit},
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "review-orchestrator")]
#[command(about = "Multi-agent commit review orchestrator")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a status report over recent commits
    Report {
        /// GitHub repository (owner/repo); falls back to the config value
        #[arg(short, long)]
        repo: Option<String>,

        /// Number of recent commits to analyze
        #[arg(short = 'n', long)]
        limit: Option<u8>,

        /// GitHub token for API access
        #[arg(short, long, env = "GITHUB_TOKEN")]
        token: String,

        /// Output format (json, markdown, text)
        #[arg(short, long, default_value = "markdown")]
        output: String,

        /// Output file path (defaults to stdout)
        #[arg(short = 'f', long)]
        output_file: Option<PathBuf>,
    },

    /// Dispatch a single ad-hoc work unit to capable agents
    Dispatch {
        /// Work kind (fetch, analyze, review)
        #[arg(short, long)]
        kind: String,

        /// Opaque payload forwarded to the agents
        #[arg(short, long, default_value = "{}")]
        payload: String,

        /// Required capability (repeatable)
        #[arg(short = 'r', long = "require", required = true)]
        require: Vec<String>,

        /// Output format (json, markdown, text)
        #[arg(short, long, default_value = "text")]
        output: String,
    },

    /// Probe all configured agents once
    Health,

    /// List registered agents with capabilities and status
    Agents,

    /// Initialize configuration file
    Init {
        /// Configuration file path
        #[arg(short = 'F', long, default_value = "review-orchestrator.yml")]
        config_file: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level)?;
    info!("Starting commit review orchestrator");

    let config = load_config(cli.config.as_ref()).await?;

    match cli.command {
        Commands::Report {
            repo,
            limit,
            token,
            output,
            output_file,
        } => run_report(config, repo, limit, token, output, output_file).await?,

        Commands::Dispatch {
            kind,
            payload,
            require,
            output,
        } => run_dispatch(config, kind, payload, require, output).await?,

        Commands::Health => run_health_check(config).await?,

        Commands::Agents => list_agents(config).await?,

        Commands::Init { config_file, force } => init_config(config_file, force).await?,
    }

    Ok(())
}

/// Initialize tracing with the specified log level
fn init_tracing(log_level: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
        .context("Failed to create env filter")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}

/// Load configuration from file or use defaults, then apply environment
/// overrides and validate.
async fn load_config(config_path: Option<&PathBuf>) -> Result<Config> {
    let mut config = match config_path {
        Some(path) if path.exists() => {
            info!("Loading configuration from: {:?}", path);
            Config::load_from_file(path)
                .await
                .with_context(|| format!("Failed to read config file: {:?}", path))?
        }
        Some(path) => {
            warn!("Configuration file not found: {:?}. Using defaults.", path);
            Config::default()
        }
        None => Config::default(),
    };

    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

/// The assembled orchestration components for one CLI invocation.
struct Orchestra {
    registry: Arc<AgentRegistry>,
    events: Arc<EventBus>,
    dispatcher: Arc<Dispatcher>,
    monitor: Arc<HealthMonitor>,
}

async fn build_orchestra(config: &Config) -> Result<Orchestra> {
    let registry = Arc::new(AgentRegistry::new());
    for entry in &config.agents {
        registry.register(entry.to_descriptor()?).await?;
    }

    let transport: Arc<dyn Transport> =
        Arc::new(HttpTransport::new(config.health.probe_path.clone())?);
    let events = Arc::new(EventBus::new());

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&registry),
        Arc::clone(&transport),
        Arc::clone(&events),
        DispatcherConfig::from(&config.orchestrator),
    ));

    let monitor = Arc::new(HealthMonitor::new(
        Arc::clone(&registry),
        transport,
        Arc::clone(&events),
        HealthMonitorConfig::from(&config.health),
    ));

    Ok(Orchestra {
        registry,
        events,
        dispatcher,
        monitor,
    })
}

/// Generate a consolidated status report over the last N commits
async fn run_report(
    config: Config,
    repo: Option<String>,
    limit: Option<u8>,
    token: String,
    output: String,
    output_file: Option<PathBuf>,
) -> Result<()> {
    let repository = repo
        .or_else(|| {
            if config.github.repository.is_empty() {
                None
            } else {
                Some(config.github.repository.clone())
            }
        })
        .context("No repository given. Pass --repo or set github.repository in the config.")?;
    let limit = limit.unwrap_or(config.github.commit_limit);

    info!("Generating report for {} over {} commits", repository, limit);

    let orchestra = build_orchestra(&config).await?;

    // Resolve agent health before the dispatcher picks its targets, then
    // keep probing in the background for the duration of the run.
    orchestra.monitor.probe_once().await;
    let monitor_handle = Arc::clone(&orchestra.monitor).spawn();

    let github = GitHubClient::new(token)?;
    let login = github
        .check_authentication()
        .await
        .context("Failed to authenticate with GitHub")?;
    info!("Authenticated with GitHub as {}", login);

    let source = Arc::new(GitHubWorkSource::new(
        github,
        limit,
        config.github.required_capabilities.clone(),
    ));
    let workflow = ReportWorkflow::new(
        Arc::clone(&orchestra.dispatcher),
        source,
        Arc::clone(&orchestra.events),
    );

    let mut session = SessionContext::new(repository);
    session.requested_by = Some(login);

    let summary = workflow
        .run(&session)
        .await
        .context("Report run failed")?;

    monitor_handle.shutdown().await;

    output_summary(&summary, &output, output_file.as_ref()).await?;
    info!(
        "Report run completed: {} work units, {} partial",
        summary.reports.len(),
        summary.partial_count()
    );
    Ok(())
}

/// Dispatch a single ad-hoc work unit and print its consolidated report
async fn run_dispatch(
    config: Config,
    kind: String,
    payload: String,
    require: Vec<String>,
    output: String,
) -> Result<()> {
    let kind: WorkKind = kind.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    let orchestra = build_orchestra(&config).await?;
    orchestra.monitor.probe_once().await;

    let work_unit = WorkUnit::new(kind, payload, require);
    info!("Dispatching ad-hoc work unit {}", work_unit.id);

    let report = orchestra
        .dispatcher
        .dispatch_and_aggregate(work_unit)
        .await
        .context("Dispatch failed")?;

    let summary = RunSummary::new(SessionContext::new("(ad-hoc)"), vec![report]);
    output_summary(&summary, &output, None).await?;
    Ok(())
}

/// Probe every configured agent once, reporting reachability
async fn run_health_check(config: Config) -> Result<()> {
    let orchestra = build_orchestra(&config).await?;

    println!("Starting health check...");
    let outcomes = orchestra.monitor.probe_once().await;

    let mut all_up = true;
    for outcome in &outcomes {
        if outcome.reachable {
            println!("✅ {} is ALIVE at {}", outcome.agent_id, outcome.address);
        } else {
            all_up = false;
            let detail = outcome.detail.as_deref().unwrap_or("unreachable");
            println!(
                "❌ {} is UNREACHABLE at {}. Error: {}",
                outcome.agent_id, outcome.address, detail
            );
        }
    }

    if all_up {
        println!("\nAll agents are running correctly!");
    } else {
        println!("\nSome agents failed to respond. Make sure they are started.");
        std::process::exit(1);
    }

    Ok(())
}

/// List registered agents with capabilities and current status
async fn list_agents(config: Config) -> Result<()> {
    let orchestra = build_orchestra(&config).await?;
    orchestra.monitor.probe_once().await;

    for agent in orchestra.registry.snapshot().await {
        let capabilities: Vec<&str> = agent.capabilities.iter().map(String::as_str).collect();
        println!(
            "{:<20} {:<28} {:<10} [{}]",
            agent.id,
            agent.address.as_str(),
            format!("{:?}", agent.status).to_lowercase(),
            capabilities.join(", ")
        );
    }

    Ok(())
}

/// Initialize configuration file
async fn init_config(config_file: PathBuf, force: bool) -> Result<()> {
    if config_file.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists: {:?}. Pass --force to overwrite.",
            config_file
        );
    }

    Config::default()
        .save_to_file(&config_file)
        .await
        .with_context(|| format!("Failed to write configuration file: {:?}", config_file))?;

    info!("Configuration file created: {:?}", config_file);
    println!("Configuration file created: {:?}", config_file);
    println!("Edit this file to customize the agent fleet and timeouts.");
    Ok(())
}

/// Render a run summary in the specified format to stdout or a file
async fn output_summary(
    summary: &RunSummary,
    format: &str,
    output_file: Option<&PathBuf>,
) -> Result<()> {
    let content = ReportGenerator::new().generate(summary, format)?;

    if let Some(file_path) = output_file {
        tokio::fs::write(file_path, &content)
            .await
            .with_context(|| format!("Failed to write output to: {:?}", file_path))?;
        info!("Report written to: {:?}", file_path);
    } else {
        println!("{}", content);
    }

    Ok(())
}
