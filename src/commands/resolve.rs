//! Conflict resolution from the command line.

use async_trait::async_trait;
use clap::Args;
use herotales_core::sync::{check_server, ConflictSummary, DecisionSurface, ResolutionStrategy};
use serde_json::Value;
use std::collections::BTreeSet;
use std::io::{self, Write};
use std::sync::Arc;

use super::sync_cmd::{build_engine, print_problems, SyncCommandError};
use crate::config::Config;
use crate::db::SqliteCache;

/// Resolve records that changed both locally and on the server
#[derive(Debug, Args)]
pub struct ResolveCommand {
    /// Strategy for every conflict (serverWins, localWins, userPrompt, merge)
    #[arg(long)]
    strategy: Option<ResolutionStrategy>,

    /// Ask which side wins for kinds configured as userPrompt
    #[arg(long, short)]
    interactive: bool,
}

impl ResolveCommand {
    pub async fn run(&self, config: &Config, cache: SqliteCache) -> Result<(), SyncCommandError> {
        let server_url = config
            .sync
            .server_url
            .as_deref()
            .ok_or(SyncCommandError::NotConfigured)?;

        if !check_server(server_url).await {
            println!("Server unreachable ({}); conflicts stay pending.", server_url);
            return Ok(());
        }

        let surface: Option<Arc<dyn DecisionSurface>> = if self.interactive {
            Some(Arc::new(TerminalPrompt))
        } else {
            None
        };
        let engine = build_engine(config, cache, surface)?;
        let mut events = engine.subscribe();

        let report = match self.strategy {
            Some(strategy) => engine.resolve_conflicts_with(strategy).await?,
            None => engine.resolve_conflicts().await?,
        };

        if report.resolved + report.unresolved == 0 {
            println!("No conflicts to resolve.");
            return Ok(());
        }

        print_problems(&mut events);
        println!("Resolved {} conflict(s).", report.resolved);
        if report.unresolved > 0 {
            println!(
                "{} conflict(s) remain; run 'tales resolve' again with --strategy or --interactive.",
                report.unresolved
            );
        }
        Ok(())
    }
}

/// Asks on the terminal which side of a conflict wins.
struct TerminalPrompt;

#[async_trait]
impl DecisionSurface for TerminalPrompt {
    async fn decide(&self, conflict: &ConflictSummary) -> Option<ResolutionStrategy> {
        let question = render_conflict(conflict);
        // Reading stdin blocks, keep it off the async workers.
        tokio::task::spawn_blocking(move || ask(&question))
            .await
            .ok()
            .flatten()
    }
}

fn ask(question: &str) -> Option<ResolutionStrategy> {
    print!("{}", question);
    io::stdout().flush().ok()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input).ok()?;
    parse_choice(&input)
}

fn parse_choice(input: &str) -> Option<ResolutionStrategy> {
    match input.trim().to_lowercase().as_str() {
        "l" | "local" => Some(ResolutionStrategy::LocalWins),
        "s" | "server" => Some(ResolutionStrategy::ServerWins),
        _ => None,
    }
}

fn render_conflict(conflict: &ConflictSummary) -> String {
    let mut out = format!(
        "\nConflict: {} {} (server id {})\n",
        conflict.kind, conflict.local_id, conflict.server_id
    );

    let keys: BTreeSet<&String> = conflict
        .local_fields
        .keys()
        .chain(conflict.server_fields.keys())
        .collect();
    for key in keys {
        let local = conflict.local_fields.get(key).unwrap_or(&Value::Null);
        let server = conflict.server_fields.get(key).unwrap_or(&Value::Null);
        if local != server {
            out.push_str(&format!("  {}\n    local:  {}\n    server: {}\n", key, local, server));
        }
    }

    out.push_str("Keep [l]ocal or [s]erver version? (anything else skips) ");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use herotales_core::sync::{EntityKind, Fields};
    use serde_json::json;
    use uuid::Uuid;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => Fields::new(),
        }
    }

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("l\n"), Some(ResolutionStrategy::LocalWins));
        assert_eq!(parse_choice(" Server "), Some(ResolutionStrategy::ServerWins));
        assert_eq!(parse_choice("\n"), None);
        assert_eq!(parse_choice("maybe"), None);
    }

    #[test]
    fn test_render_conflict_shows_only_differences() {
        let conflict = ConflictSummary {
            kind: EntityKind::Hero,
            local_id: Uuid::new_v4(),
            server_id: "srv-1".to_string(),
            local_fields: fields(json!({ "name": "Luna", "age": 7 })),
            server_fields: fields(json!({ "name": "Luna Prime", "age": 7 })),
            base_updated_at: None,
            server_updated_at: Utc::now(),
        };

        let rendered = render_conflict(&conflict);
        assert!(rendered.contains("srv-1"));
        assert!(rendered.contains("\"Luna Prime\""));
        assert!(!rendered.contains("age"));
    }
}
