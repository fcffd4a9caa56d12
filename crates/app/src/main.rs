use std::sync::Arc;
use std::time::Duration;

use services::{AppServices, Clock, SessionManager};
use storage::seed::seed_demo_catalog;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{info, warn};

mod commands;
mod config;
mod logging;

use commands::{Command, execute, invalid_command_reply};
use config::{ArgsError, Config, Mode, print_usage};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" || db_url.contains("mode=memory") {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

/// Periodically discard sessions idle past their TTL.
fn spawn_sweeper(sessions: Arc<SessionManager>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        // first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let expired = sessions.expire_stale().await;
            if expired > 0 {
                info!(expired, active = sessions.registry().active_count(), "swept idle sessions");
            }
        }
    })
}

async fn serve(services: &AppServices) -> Result<(), Box<dyn std::error::Error>> {
    let sessions = services.sessions();
    let sweeper = spawn_sweeper(Arc::clone(&sessions));
    info!("ready for commands on stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match Command::parse(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => execute(&sessions, command).await,
            Err(err) => {
                warn!(error = %err, "rejected command");
                invalid_command_reply(&err)
            }
        };
        println!("{reply}");
    }

    sweeper.abort();
    let expired = sessions.expire_stale().await;
    info!(expired, "shutting down");
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // a missing .env is fine
    let _ = dotenvy::dotenv();

    let config = Config::parse(std::env::args().skip(1), |key| std::env::var(key).ok())
        .map_err(|e| {
            eprintln!("{e}");
            print_usage();
            e
        })?;
    if config.mode == Mode::Help {
        print_usage();
        return Ok(());
    }

    logging::init_tracing(&config.log_filter);

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&config.db_url)?;
    let services =
        AppServices::new_sqlite(&config.db_url, Clock::default(), config.service_settings())
            .await?;

    match config.mode {
        Mode::Serve => serve(&services).await,
        Mode::Seed => {
            let written = seed_demo_catalog(services.storage().catalog.as_ref()).await?;
            println!("Seeded {written} cards into {}", config.db_url);
            Ok(())
        }
        Mode::Help => Ok(()),
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
