use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod db;

use commands::{
    ConfigCommand, EventCommand, HeroCommand, ResolveCommand, StatusCommand, StoryCommand,
    SyncCommand,
};
use config::Config;
use db::{init_db, SqliteCache};

#[derive(Parser)]
#[command(name = "tales")]
#[command(version)]
#[command(about = "Offline-first hero and story manager", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage heroes
    Hero(HeroCommand),

    /// Manage stories
    Story(StoryCommand),

    /// Manage custom story events
    Event(EventCommand),

    /// Sync with the story server
    Sync(SyncCommand),

    /// Resolve sync conflicts
    Resolve(ResolveCommand),

    /// Show pending changes and server status
    Status(StatusCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tales=info,herotales_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Save config path for config commands
    let cli_config_path = cli.config.clone();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Hero(cmd)) => {
            let cache = open_cache(&config).await?;
            cmd.run(&cache).await?;
        }
        Some(Commands::Story(cmd)) => {
            let cache = open_cache(&config).await?;
            cmd.run(&cache).await?;
        }
        Some(Commands::Event(cmd)) => {
            let cache = open_cache(&config).await?;
            cmd.run(&cache).await?;
        }
        Some(Commands::Sync(cmd)) => {
            let cache = open_cache(&config).await?;
            cmd.run(&config, cache).await?;
        }
        Some(Commands::Resolve(cmd)) => {
            let cache = open_cache(&config).await?;
            cmd.run(&config, cache).await?;
        }
        Some(Commands::Status(cmd)) => {
            let cache = open_cache(&config).await?;
            cmd.run(&config, &cache).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config, cli_config_path)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}

async fn open_cache(config: &Config) -> Result<SqliteCache, sqlx::Error> {
    let pool = init_db(&config.database_path.value).await?;
    Ok(SqliteCache::new(pool))
}
