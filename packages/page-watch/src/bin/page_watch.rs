//! Page Watch command line
//!
//! `run` keeps checking on the configured cadence until Ctrl-C; everything
//! else performs one action against the state file and exits.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use page_watch::scheduler::start_scheduler;
use page_watch::{
    Catalog, Config, Direction, JobEdit, JsonFileStore, LogNotifier, Monitor, SandboxGateway,
    StateStore,
};

#[derive(Parser)]
#[command(name = "page-watch")]
#[command(about = "Watch page fragments and announce when they change")]
struct Cli {
    /// State file (overrides PAGE_WATCH_STATE)
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check on the configured cadence until interrupted
    Run,

    /// Run one batch now
    Check,

    /// Preview what a selector extracts, without touching saved jobs
    Probe { url: String, selector: String },

    /// Manage watched pages
    #[command(subcommand)]
    Jobs(JobsCommand),

    /// Manage announcements
    #[command(subcommand)]
    Feed(FeedCommand),
}

#[derive(Subcommand)]
enum JobsCommand {
    List,

    Add {
        name: String,
        url: String,
        selector: String,
    },

    Edit {
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        selector: Option<String>,
    },

    Remove { id: Uuid },

    Move {
        id: Uuid,
        #[arg(value_enum)]
        direction: MoveDirection,
    },

    /// Print jobs as JSON
    Export,

    /// Append jobs from a JSON export
    Import { file: PathBuf },
}

#[derive(Subcommand)]
enum FeedCommand {
    List {
        /// Group by job instead of newest first
        #[arg(long)]
        by_job: bool,
    },

    Read { id: Uuid },

    ReadAll,

    Clear,
}

#[derive(Clone, Copy, ValueEnum)]
enum MoveDirection {
    Up,
    Down,
}

impl From<MoveDirection> for Direction {
    fn from(direction: MoveDirection) -> Self {
        match direction {
            MoveDirection::Up => Direction::Up,
            MoveDirection::Down => Direction::Down,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,page_watch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(state) = cli.state {
        config.state_path = state;
    }

    let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::new(&config.state_path));

    match cli.command {
        Commands::Run => cmd_run(config, store).await,
        Commands::Check => cmd_check(config, store).await,
        Commands::Probe { url, selector } => cmd_probe(&config, &url, &selector).await,
        Commands::Jobs(command) => cmd_jobs(Catalog::new(store), command).await,
        Commands::Feed(command) => cmd_feed(Catalog::new(store), command).await,
    }
}

fn build_monitor(config: Config, store: Arc<dyn StateStore>) -> Result<Monitor> {
    let gateway = SandboxGateway::from_settings(&config.settings)
        .context("Failed to build page fetcher")?;
    Ok(Monitor::new(
        Arc::new(gateway),
        store,
        Arc::new(LogNotifier),
        config.settings,
    ))
}

async fn cmd_run(config: Config, store: Arc<dyn StateStore>) -> Result<()> {
    let Some(every) = config.interval else {
        bail!("PAGE_WATCH_INTERVAL_MINUTES is 0; use `page-watch check` for manual checks");
    };

    tracing::info!(state = %config.state_path.display(), "Starting Page Watch");
    let monitor = Arc::new(build_monitor(config, store)?);

    // First batch right away, then on the cadence
    page_watch::scheduler::run_scheduled_batch(&monitor).await;
    let mut scheduler = start_scheduler(monitor, every).await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");
    scheduler.shutdown().await?;
    Ok(())
}

async fn cmd_check(config: Config, store: Arc<dyn StateStore>) -> Result<()> {
    let monitor = build_monitor(config, store)?;
    let Some(result) = monitor.trigger().await.context("Batch failed")? else {
        println!("A batch is already running, skipped");
        return Ok(());
    };

    for job in &result.updated_jobs {
        match &job.last_error_message {
            Some(message) => println!("✗ {}: {}", job.name, message),
            None => println!("✓ {}", job.name),
        }
    }
    println!(
        "{} jobs checked, {} new announcements",
        result.updated_jobs.len(),
        result.new_announcements.len()
    );
    Ok(())
}

async fn cmd_probe(config: &Config, url: &str, selector: &str) -> Result<()> {
    let gateway = SandboxGateway::from_settings(&config.settings)
        .context("Failed to build page fetcher")?;
    let report = gateway.probe(url, selector).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn cmd_jobs(catalog: Catalog, command: JobsCommand) -> Result<()> {
    match command {
        JobsCommand::List => {
            for job in catalog.jobs().await? {
                let checked = job
                    .last_checked_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{}  [{}]  {}  {}  {}  (checked {})",
                    job.id, job.status, job.name, job.target_url, job.locator, checked
                );
                if let Some(message) = &job.last_error_message {
                    println!("    {message}");
                }
            }
        }
        JobsCommand::Add {
            name,
            url,
            selector,
        } => {
            let job = catalog.add_job(&name, &url, &selector).await?;
            println!("Added {} ({})", job.name, job.id);
        }
        JobsCommand::Edit {
            id,
            name,
            url,
            selector,
        } => {
            let job = catalog
                .edit_job(
                    id,
                    JobEdit {
                        name,
                        url,
                        locator: selector,
                    },
                )
                .await?;
            println!("Updated {} ({})", job.name, job.id);
        }
        JobsCommand::Remove { id } => {
            let job = catalog.remove_job(id).await?;
            println!("Removed {}", job.name);
        }
        JobsCommand::Move { id, direction } => {
            if !catalog.move_job(id, direction.into()).await? {
                println!("Already at the end of the list");
            }
        }
        JobsCommand::Export => println!("{}", catalog.export_jobs().await?),
        JobsCommand::Import { file } => {
            let json = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let count = catalog.import_jobs(&json).await?;
            println!("Imported {count} jobs");
        }
    }
    Ok(())
}

async fn cmd_feed(catalog: Catalog, command: FeedCommand) -> Result<()> {
    match command {
        FeedCommand::List { by_job } => {
            let announcements = if by_job {
                catalog.ordered_feed().await?
            } else {
                catalog.feed().await?.into_entries()
            };
            for announcement in announcements {
                let marker = if announcement.is_read { " " } else { "•" };
                println!(
                    "{marker} {}  {}  [{}]  {}\n    {}",
                    announcement.id,
                    announcement.found_at.to_rfc3339(),
                    announcement.job_name,
                    announcement.title,
                    announcement.link
                );
            }
            println!("{} unread", catalog.unread_count().await?);
        }
        FeedCommand::Read { id } => {
            if !catalog.mark_read(id).await? {
                bail!("no announcement with id {id}");
            }
        }
        FeedCommand::ReadAll => {
            let changed = catalog.mark_all_read().await?;
            println!("Marked {changed} announcements read");
        }
        FeedCommand::Clear => {
            let removed = catalog.clear_feed().await?;
            println!("Removed {removed} announcements");
        }
    }
    Ok(())
}
