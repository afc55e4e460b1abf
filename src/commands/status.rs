use clap::Args;
use herotales_core::sync::{check_server, EntityKind, LocalCache, SyncStatus};
use std::collections::{BTreeMap, HashMap};

use crate::config::Config;
use crate::db::SqliteCache;

/// Show pending changes, conflicts and server status
#[derive(Debug, Args)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn run(
        &self,
        config: &Config,
        cache: &SqliteCache,
    ) -> Result<(), Box<dyn std::error::Error>> {
        println!("Sync Status");
        println!("===========");
        println!();

        let mut counts: BTreeMap<EntityKind, HashMap<SyncStatus, i64>> = BTreeMap::new();
        for (kind, status, count) in cache.status_counts().await? {
            counts.entry(kind).or_default().insert(status, count);
        }

        println!(
            "{:<12}  {:>7}  {:>8}  {:>7}  {:>7}  {:>7}  {:>9}",
            "KIND", "SYNCED", "CREATES", "UPDATES", "DELETES", "FAILED", "CONFLICTS"
        );
        println!("{}", "-".repeat(72));
        for kind in EntityKind::ALL {
            let by_status = counts.remove(&kind).unwrap_or_default();
            let get = |status| by_status.get(&status).copied().unwrap_or(0);
            println!(
                "{:<12}  {:>7}  {:>8}  {:>7}  {:>7}  {:>7}  {:>9}",
                kind.collection(),
                get(SyncStatus::Synced),
                get(SyncStatus::PendingCreate),
                get(SyncStatus::PendingUpdate),
                get(SyncStatus::PendingDelete),
                get(SyncStatus::Failed),
                get(SyncStatus::Conflict)
            );
        }
        println!();

        match cache.last_sync_at().await? {
            Some(at) => println!("Last sync: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
            None => println!("Last sync: never"),
        }

        match &config.sync.server_url {
            Some(url) if config.sync.is_configured() => {
                println!("Server:    {}", url);
                if check_server(url).await {
                    println!("Status:    ✓ reachable");
                } else {
                    println!("Status:    ✗ unreachable");
                }
            }
            _ => {
                println!("Server:    not configured");
                println!();
                println!("To enable sync, add to your config file:");
                println!();
                println!("  sync:");
                println!("    server_url: \"http://localhost:8080\"");
                println!("    api_key: \"your-api-key\"");
                println!();
                println!("Or set environment variables:");
                println!("  TALES_SERVER_URL, TALES_API_KEY");
            }
        }

        Ok(())
    }
}
