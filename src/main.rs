use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rivalprice_monitor::alerts::{AlertEngine, AlertPoller};
use rivalprice_monitor::config::AppConfig;
use rivalprice_monitor::models::{DetectedChange, MonitoredPage};
use rivalprice_monitor::plugins::notifiers::{EmailNotifier, WebhookNotifier};
use rivalprice_monitor::plugins::summarizers::{OpenAiSummarizer, RuleBasedSummarizer};
use rivalprice_monitor::plugins::{NotificationDispatcher, Summarizer};
use rivalprice_monitor::queue::{JobQueue, MemoryJobQueue, RedisJobQueue};
use rivalprice_monitor::scheduler::PageScheduler;
use rivalprice_monitor::scraper::ScrapeWorker;
use rivalprice_monitor::{db, telemetry};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "rivalprice-monitor")]
#[command(about = "Competitor page monitoring: scheduling, scraping and alerting")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue due pages on a fixed tick
    Scheduler,

    /// Consume scrape jobs and store snapshots
    Worker {
        /// Number of concurrent consumers (defaults to scraper.concurrency)
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Poll detected changes and send alerts
    Alerts,

    /// Run scheduler, workers and alert poller in one process
    All,

    /// Apply database migrations and exit
    Migrate,

    /// Print store and queue counters
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::from_env().context("failed to load configuration")?;
    let _log_guard = telemetry::init_tracing(&config.logging);
    telemetry::init_metrics(&config.metrics)?;

    info!("Starting RivalPrice monitor...");

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    match cli.command {
        Commands::Migrate => Ok(()),
        Commands::Status => status(&config, &pool).await,
        Commands::Scheduler => {
            let queue = connect_queue(&config, false).await?;
            run_scheduler(&config, pool, queue).await
        }
        Commands::Worker { concurrency } => {
            let queue = connect_queue(&config, false).await?;
            let count = concurrency.unwrap_or(config.scraper.concurrency).max(1);
            run_workers(&config, pool, queue, count).await
        }
        Commands::Alerts => run_alerts(&config, pool).await,
        Commands::All => run_all(&config, pool).await,
    }
}

async fn connect_queue(config: &AppConfig, allow_memory: bool) -> Result<Arc<dyn JobQueue>> {
    match RedisJobQueue::connect(&config.queue).await {
        Ok(queue) => {
            info!("Connected to job queue '{}'", queue.key());
            Ok(Arc::new(queue))
        }
        Err(e) if allow_memory => {
            warn!("Redis unavailable ({}), using in-process queue", e);
            Ok(Arc::new(MemoryJobQueue::new()))
        }
        Err(e) => Err(e).context("failed to connect to job queue"),
    }
}

async fn build_engine(config: &AppConfig, pool: SqlitePool) -> Result<Arc<AlertEngine>> {
    let dispatcher = NotificationDispatcher::new();
    dispatcher
        .register_notifier(Arc::new(EmailNotifier::new(&config.notifications)?))
        .await;
    dispatcher
        .register_notifier(Arc::new(WebhookNotifier::new(&config.notifications.webhook)?))
        .await;

    let openai = OpenAiSummarizer::new(&config.summarizer)?;
    let summarizer: Arc<dyn Summarizer> = if openai.has_credential() {
        Arc::new(openai)
    } else {
        info!("No summarizer API key configured, using rule-based insights");
        Arc::new(RuleBasedSummarizer::new())
    };
    let notifiers = dispatcher.list_notifier_types().await;
    info!(
        summarizer = summarizer.name(),
        notifiers = ?notifiers,
        "Alert engine ready"
    );

    Ok(Arc::new(AlertEngine::new(pool, summarizer, dispatcher)))
}

fn spawn_workers(
    config: &AppConfig,
    pool: SqlitePool,
    queue: Arc<dyn JobQueue>,
    count: usize,
) -> Result<Vec<JoinHandle<()>>> {
    let worker = Arc::new(ScrapeWorker::new(
        pool,
        queue,
        &config.scraper,
        &config.queue,
    )?);

    info!("Starting {} scrape worker(s)", count);
    Ok((0..count)
        .map(|_| {
            let worker = Arc::clone(&worker);
            tokio::spawn(async move { worker.run().await })
        })
        .collect())
}

async fn stop_workers(handles: Vec<JoinHandle<()>>) {
    for handle in &handles {
        handle.abort();
    }
    // Aborted tasks resolve with a JoinError.
    let _ = futures::future::join_all(handles).await;
}

async fn run_scheduler(config: &AppConfig, pool: SqlitePool, queue: Arc<dyn JobQueue>) -> Result<()> {
    let scheduler = Arc::new(PageScheduler::new(pool, queue, config.scheduler.clone()));
    let mut jobs = scheduler.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down scheduler...");
    jobs.shutdown().await?;
    Ok(())
}

async fn run_workers(
    config: &AppConfig,
    pool: SqlitePool,
    queue: Arc<dyn JobQueue>,
    count: usize,
) -> Result<()> {
    let handles = spawn_workers(config, pool, queue, count)?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down workers...");
    stop_workers(handles).await;
    Ok(())
}

async fn run_alerts(config: &AppConfig, pool: SqlitePool) -> Result<()> {
    let engine = build_engine(config, pool.clone()).await?;
    let poller = Arc::new(AlertPoller::new(pool, engine, config.alerts.clone()));
    let mut jobs = poller.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down alert poller...");
    jobs.shutdown().await?;
    Ok(())
}

async fn run_all(config: &AppConfig, pool: SqlitePool) -> Result<()> {
    let queue = connect_queue(config, true).await?;

    let scheduler = Arc::new(PageScheduler::new(
        pool.clone(),
        Arc::clone(&queue),
        config.scheduler.clone(),
    ));
    let mut scheduler_jobs = scheduler.start().await?;

    let workers = spawn_workers(config, pool.clone(), queue, config.scraper.concurrency)?;

    let engine = build_engine(config, pool.clone()).await?;
    let poller = Arc::new(AlertPoller::new(pool, engine, config.alerts.clone()));
    let mut poller_jobs = poller.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    scheduler_jobs.shutdown().await?;
    poller_jobs.shutdown().await?;
    stop_workers(workers).await;
    Ok(())
}

async fn status(config: &AppConfig, pool: &SqlitePool) -> Result<()> {
    db::ping(pool).await?;
    let due = MonitoredPage::find_due(Utc::now(), pool).await?.len();
    let pending = DetectedChange::count_unprocessed(pool).await?;

    println!("database:        ok");
    println!("pages due:       {}", due);
    println!("pending changes: {}", pending);

    match RedisJobQueue::connect(&config.queue).await {
        Ok(queue) => println!("queue '{}':  {} job(s)", queue.key(), queue.len().await?),
        Err(e) => println!("queue:           unavailable ({})", e),
    }
    Ok(())
}
