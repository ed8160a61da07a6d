use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use autobot_auth::GithubOAuth;
use autobot_core::AutobotConfig;
use autobot_delivery::{CommentPoster, DeliveryNotifier};
use autobot_scheduler::{JobStore, SchedulerEngine};
use autobot_sessions::SessionStore;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

/// How often expired browser sessions are deleted.
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(10 * 60);
/// Extra time a job may stay `running` beyond its two network calls.
const STALE_SLACK_SECS: i64 = 60;

mod app;
mod error;
mod http;
mod pages;
mod session;

#[derive(Parser)]
#[command(name = "autobot-gateway")]
#[command(about = "Schedule GitHub commit comments for a later wall-clock time", version)]
struct Cli {
    /// Path to the TOML config file (default: ./autobot.toml).
    #[arg(short, long, env = "AUTOBOT_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Web front door and delivery worker in one process (default).
    Serve,
    /// Web front door only; jobs are delivered by a separate `worker`.
    Web,
    /// Delivery worker only.
    Worker,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "autobot_gateway=info,autobot_scheduler=info,autobot_delivery=info,tower_http=debug"
                    .into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve);

    let config = AutobotConfig::load(cli.config.as_deref()).context("invalid configuration")?;
    let timezone = config.timezone()?;

    let db_path = config.database.path.clone();
    ensure_parent_dir(&db_path)?;
    info!(path = %db_path, zone = timezone.name(), git_sha = env!("AUTOBOT_GIT_SHA"), "starting autobot");

    // The worker and the web handlers each open their own connection to the
    // shared file.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = if command != Command::Web {
        let engine = build_engine(&config, JobStore::open(&db_path)?)?;
        Some(tokio::spawn(engine.run(shutdown_rx)))
    } else {
        None
    };

    if command == Command::Worker {
        tokio::signal::ctrl_c().await?;
        info!("interrupt received");
    } else {
        serve(config, timezone, &db_path).await?;
    }

    let _ = shutdown_tx.send(true);
    if let Some(worker) = worker {
        worker.await?;
    }
    Ok(())
}

fn build_engine(config: &AutobotConfig, jobs: JobStore) -> anyhow::Result<SchedulerEngine> {
    let mut poster = CommentPoster::new(Duration::from_secs(config.delivery.timeout_secs))?;
    if let Some(url) = &config.delivery.notify_url {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.delivery.timeout_secs))
            .build()?;
        poster = poster.with_notifier(DeliveryNotifier::new(
            http,
            url.clone(),
            config.delivery.notify_secret.clone(),
        ));
        info!(%url, "delivery notifications enabled");
    }

    for (status, count) in jobs.status_counts()? {
        info!(%status, count, "job queue");
    }

    Ok(SchedulerEngine::new(jobs, Arc::new(poster))
        .with_poll_interval(Duration::from_millis(config.worker.poll_interval_ms))
        .with_max_concurrency(config.worker.max_concurrency)
        .with_stale_after(stale_after(config.delivery.timeout_secs)))
}

/// A delivery makes at most two calls (comment POST, then the notifier), each
/// bounded by `timeout_secs`. A job running longer than that belongs to a dead
/// worker. Never below five minutes.
fn stale_after(timeout_secs: u64) -> chrono::Duration {
    let timeout = i64::try_from(timeout_secs).unwrap_or(i64::MAX / 4);
    let bound = chrono::Duration::seconds(timeout.saturating_mul(2).saturating_add(STALE_SLACK_SECS));
    bound.max(chrono::Duration::minutes(5))
}

async fn serve(config: AutobotConfig, timezone: chrono_tz::Tz, db_path: &str) -> anyhow::Result<()> {
    let oauth = GithubOAuth::new(&config.github, &config.redirect_url())?;
    let sessions = SessionStore::new(
        rusqlite::Connection::open(db_path)?,
        chrono::Duration::hours(i64::from(config.session.ttl_hours)),
    )?;
    let jobs = JobStore::open(db_path)?;

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let public_url = config.gateway.public_url.clone();
    let state = Arc::new(app::AppState::new(config, timezone, oauth, sessions, Arc::new(jobs)));
    let purger = tokio::spawn(session::purge_expired_periodically(
        Arc::clone(&state),
        SESSION_PURGE_INTERVAL,
    ));
    let router = app::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, %public_url, "autobot gateway listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("interrupt received");
        })
        .await?;
    purger.abort();
    Ok(())
}

fn ensure_parent_dir(path: &str) -> anyhow::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
    }
    Ok(())
}
