use clap::{Args, Subcommand};
use herotales_core::sync::{EntityKind, ResolutionStrategy};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use super::OutputFormat;
use crate::config::Config;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

const DEFAULT_CONFIG: &str = r#"# tales configuration

# Path to SQLite database (default: platform data dir, e.g. ~/.local/share/tales/tales.db)
# database_path: ~/.local/share/tales/tales.db

sync:
  # Story server URL and API key (or TALES_SERVER_URL / TALES_API_KEY)
  # server_url: "http://localhost:8080"
  # api_key: "your-api-key"

  # Records per pull page, per-request timeout and pushes in flight
  page_size: 100
  request_timeout_secs: 30
  max_concurrent_requests: 4

  # When a conflict needs a decision and nobody answers: serverWins or fail
  prompt_fallback: serverWins

  # Conflict strategy per kind: serverWins, localWins, userPrompt, merge
  # strategies:
  #   hero: userPrompt
  #   story: serverWins
  #   customEvent: localWins
"#;

impl ConfigCommand {
    pub fn run(
        &self,
        config: &Config,
        cli_config_path: Option<PathBuf>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                cli_config_path
                                    .unwrap_or_else(Config::default_config_path)
                                    .display()
                            );
                        }
                        println!();

                        println!("database_path: {}", config.database_path.value.display());
                        println!("  source: {}", config.database_path.source);
                        println!();

                        let sync = &config.sync;
                        println!(
                            "sync.server_url: {}",
                            sync.server_url.as_deref().unwrap_or("(not set)")
                        );
                        println!(
                            "sync.api_key: {}",
                            if sync.api_key.is_some() {
                                "(set)"
                            } else {
                                "(not set)"
                            }
                        );
                        println!("sync.page_size: {}", sync.page_size);
                        println!("sync.request_timeout_secs: {}", sync.request_timeout_secs);
                        println!(
                            "sync.max_concurrent_requests: {}",
                            sync.max_concurrent_requests
                        );
                        println!("sync.prompt_fallback: {:?}", sync.prompt_fallback);

                        let strategies = sync.strategy_table();
                        for kind in EntityKind::ALL {
                            let strategy = strategies.strategy_for(kind);
                            let note = if strategy == ResolutionStrategy::default_for(kind) {
                                " (default)"
                            } else {
                                ""
                            };
                            println!("sync.strategies.{}: {}{}", kind, strategy, note);
                        }
                    }
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = cli_config_path.unwrap_or_else(Config::default_config_path);

                // Check if config already exists
                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'tales config show' to view current configuration.");
                    return Ok(());
                }

                // Create parent directory
                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let mut file = fs::File::create(&config_path)?;
                file.write_all(DEFAULT_CONFIG.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}
