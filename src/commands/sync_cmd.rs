//! Sync CLI commands for synchronizing with the story server.

use clap::{Args, ValueEnum};
use herotales_core::sync::{
    check_server, DecisionSurface, HttpApi, SyncEngine, SyncError, SyncEvent, SyncOutcome,
    SyncReport,
};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::db::SqliteCache;

pub type Engine = SyncEngine<HttpApi, SqliteCache>;

#[derive(Clone, Copy, Debug, ValueEnum, Default)]
pub enum SyncTarget {
    #[default]
    All,
    Heroes,
    Stories,
    Events,
}

/// Sync with remote server
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// What to sync
    #[arg(value_enum, default_value = "all")]
    target: SyncTarget,
}

impl SyncCommand {
    pub async fn run(&self, config: &Config, cache: SqliteCache) -> Result<(), SyncCommandError> {
        let server_url = config
            .sync
            .server_url
            .as_deref()
            .ok_or(SyncCommandError::NotConfigured)?;

        if !check_server(server_url).await {
            println!("Server unreachable ({}); local changes stay queued.", server_url);
            return Ok(());
        }

        let engine = build_engine(config, cache, None)?;
        let mut events = engine.subscribe();

        println!("Syncing with {}...", server_url);
        println!();

        let report = match self.target {
            SyncTarget::All => match engine.sync_all().await? {
                SyncOutcome::Completed(report) => report,
                SyncOutcome::Skipped => {
                    println!("A sync is already running.");
                    return Ok(());
                }
            },
            SyncTarget::Heroes => engine.sync_heroes().await?,
            SyncTarget::Stories => engine.sync_stories().await?,
            SyncTarget::Events => engine.sync_custom_events().await?,
        };

        print_problems(&mut events);
        print_report(&report);
        Ok(())
    }
}

/// Builds an engine over the HTTP API using the sync section of the config.
pub fn build_engine(
    config: &Config,
    cache: SqliteCache,
    surface: Option<Arc<dyn DecisionSurface>>,
) -> Result<Engine, SyncCommandError> {
    let (server_url, api_key) = match (&config.sync.server_url, &config.sync.api_key) {
        (Some(url), Some(key)) => (url.clone(), key.clone()),
        _ => return Err(SyncCommandError::NotConfigured),
    };

    let api = Arc::new(HttpApi::new(server_url, api_key));
    let strategies = config.sync.strategy_table();
    let fallback = config.sync.prompt_fallback;

    Ok(
        SyncEngine::new(api, Arc::new(cache), config.sync.options()).with_resolver(|resolver| {
            let resolver = resolver.with_strategies(strategies).with_fallback(fallback);
            match surface {
                Some(surface) => resolver.with_decision_surface(surface),
                None => resolver,
            }
        }),
    )
}

/// Prints per-record failures and conflicts collected during the run.
pub fn print_problems(events: &mut broadcast::Receiver<SyncEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            SyncEvent::RecordFailed {
                kind,
                local_id,
                error,
            } => {
                println!("  ✗ {} {} - {}", kind, local_id, error);
            }
            SyncEvent::ConflictDetected { kind, local_id } => {
                println!("  ! {} {} changed on both sides", kind, local_id);
            }
            _ => {}
        }
    }
}

pub fn print_report(report: &SyncReport) {
    println!("  Pushed:    {}", report.pushed);
    println!("  Deleted:   {}", report.deleted);
    println!("  Pulled:    {}", report.pulled);
    println!("  Conflicts: {}", report.conflicts);
    println!("  Resolved:  {}", report.resolved);
    if report.skipped > 0 {
        println!("  Waiting:   {} (parent not synced yet)", report.skipped);
    }
    println!();

    if report.is_clean() {
        println!("Sync complete.");
    } else {
        println!(
            "Sync finished with {} failure(s); failed records are retried next time.",
            report.failures()
        );
    }
}

/// Errors from sync commands
#[derive(Debug)]
pub enum SyncCommandError {
    NotConfigured,
    SyncError(SyncError),
}

impl std::fmt::Display for SyncCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommandError::NotConfigured => write!(
                f,
                "Sync not configured. Add sync.server_url and sync.api_key to config."
            ),
            SyncCommandError::SyncError(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SyncCommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncCommandError::SyncError(e) => Some(e),
            SyncCommandError::NotConfigured => None,
        }
    }
}

impl From<SyncError> for SyncCommandError {
    fn from(e: SyncError) -> Self {
        SyncCommandError::SyncError(e)
    }
}
