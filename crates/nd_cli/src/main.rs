use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use nd_core::{EncodingRepair, Extractor, RunMode, Trigger};
use nd_inference::DEFAULT_MODEL;
use nd_pipeline::{
    GenerationGuard, GuardConfig, Orchestrator, PipelineConfig, QueryRateLimiter, QueryService,
    QuotaConfig,
};
use nd_storage::{ConversationConfig, ConversationStore, GitHubConfig, GitHubPublisher, UsageLog};
use nd_web::{create_app, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod schedule;

use schedule::{run_schedule, CronSchedule};

#[derive(Parser, Debug)]
#[command(name = "nd", author, version, about = "Impartial daily news digest generator", long_about = None)]
pub struct Cli {
    /// Anthropic API key
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[arg(long, env = "ND_MODEL", default_value = DEFAULT_MODEL)]
    model: String,
    /// Token allowed to write the published repository
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,
    #[arg(long, env = "ND_GITHUB_OWNER")]
    github_owner: Option<String>,
    #[arg(long, env = "ND_GITHUB_REPO")]
    github_repo: Option<String>,
    #[arg(long, env = "ND_PUBLISH_PATH", default_value = "index.html")]
    publish_path: String,
    #[arg(long, env = "ND_PUBLISH_BRANCH", default_value = "main")]
    publish_branch: String,
    /// Directory with research-prompt.md and template.html
    #[arg(long, env = "ND_RESOURCES_DIR", default_value = "./resources")]
    resources_dir: PathBuf,
    /// Directory for the rendered page, research dump and usage logs
    #[arg(long, env = "ND_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,
    /// JSON file of [garbled, replacement] pairs replacing the built-in repair table
    #[arg(long, env = "ND_REPAIR_TABLE")]
    repair_table: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP API and run the daily schedule
    Serve {
        #[arg(long, env = "PORT", default_value_t = 3000)]
        port: u16,
        /// Cron expression for scheduled full runs (UTC, seconds first)
        #[arg(long, env = "ND_SCHEDULE", default_value = "0 0 6 * * *")]
        schedule: String,
        /// Key query quotas on X-Forwarded-For (only behind a trusted proxy)
        #[arg(long, env = "ND_TRUST_FORWARDED_FOR")]
        trust_forwarded_for: bool,
    },
    /// Run one generation in the foreground
    Generate {
        /// quick or full
        #[arg(long, default_value = "quick")]
        mode: RunMode,
    },
    /// Print estimated spend from the usage log
    Usage {
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
}

struct Services {
    orchestrator: Arc<Orchestrator>,
    queries: Arc<QueryService>,
    usage: UsageLog,
}

fn build_services(cli: &Cli) -> anyhow::Result<Services> {
    let repair = match &cli.repair_table {
        Some(path) => EncodingRepair::from_file(path)
            .with_context(|| format!("Failed to load repair table {}", path.display()))?,
        None => EncodingRepair::default(),
    };
    let extractor = Extractor::new(repair);

    let generator = nd_inference::create_model(nd_inference::Config {
        api_key: cli.api_key.clone(),
        model_name: Some(cli.model.clone()),
        base_url: None,
    })?;

    let token = cli
        .github_token
        .clone()
        .ok_or_else(|| anyhow!("GITHUB_TOKEN is required"))?;
    let owner = cli
        .github_owner
        .clone()
        .ok_or_else(|| anyhow!("ND_GITHUB_OWNER is required"))?;
    let repo = cli
        .github_repo
        .clone()
        .ok_or_else(|| anyhow!("ND_GITHUB_REPO is required"))?;
    let publisher = GitHubPublisher::new(
        GitHubConfig::new(token, owner, repo).with_branch(cli.publish_branch.clone()),
    )?;
    info!("📤 Publishing to {}", cli.publish_path);

    std::fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("Failed to create {}", cli.output_dir.display()))?;
    let usage = UsageLog::new(&cli.output_dir);

    let config = PipelineConfig {
        resources_dir: cli.resources_dir.clone(),
        output_dir: cli.output_dir.clone(),
        publish_path: cli.publish_path.clone(),
        ..PipelineConfig::default()
    };
    let guard = Arc::new(GenerationGuard::new(GuardConfig::default()));
    let orchestrator = Arc::new(Orchestrator::new(
        generator.clone(),
        Arc::new(publisher),
        Arc::new(usage.clone()),
        guard,
        extractor.clone(),
        config.clone(),
    ));
    let queries = Arc::new(QueryService::new(
        generator,
        Arc::new(ConversationStore::new(ConversationConfig::default())),
        Arc::new(QueryRateLimiter::new(QuotaConfig::default())),
        extractor,
        &config,
    ));

    Ok(Services {
        orchestrator,
        queries,
        usage,
    })
}

async fn serve(
    services: Services,
    port: u16,
    schedule: &str,
    trust_forwarded_for: bool,
) -> anyhow::Result<()> {
    let schedule = CronSchedule::parse(schedule)?;
    info!("⏰ Scheduled full runs: {}", schedule.expression());
    let scheduler = tokio::spawn(run_schedule(schedule, services.orchestrator.clone()));

    let conversation_sweep = services.queries.store().spawn_sweeper();
    let rate_sweep = services.queries.limiter().spawn_sweeper();

    let app = create_app(
        AppState::new(services.orchestrator, services.queries, services.usage)
            .with_trust_forwarded_for(trust_forwarded_for),
    );
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("🌐 Server running on port {}", port);
    info!("🖐️ Manual generation available at /generate");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("👋 Shutting down");
    })
    .await?;

    scheduler.abort();
    conversation_sweep.shutdown();
    rate_sweep.shutdown();
    Ok(())
}

async fn generate_once(services: Services, mode: RunMode) -> anyhow::Result<()> {
    let permit = services.orchestrator.admit(Trigger::Manual)?;
    let report = services.orchestrator.run_as(permit, mode).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Usage { days } => {
            let summary = UsageLog::new(&cli.output_dir).summary(*days).await?;
            println!("Usage over the last {} days", days);
            println!("  Estimated cost: ${:.2}", summary.total_cost);
            println!(
                "  Runs: {} succeeded, {} failed ({} quick, {} full)",
                summary.success_count, summary.fail_count, summary.quick_count, summary.full_count
            );
        }
        Commands::Generate { mode } => {
            let services = build_services(&cli)?;
            generate_once(services, *mode).await?;
        }
        Commands::Serve {
            port,
            schedule,
            trust_forwarded_for,
        } => {
            let services = build_services(&cli)?;
            serve(services, *port, schedule, *trust_forwarded_for).await?;
        }
    }

    Ok(())
}
