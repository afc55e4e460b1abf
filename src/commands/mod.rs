mod config_cmd;
mod event;
mod hero;
mod resolve;
mod status;
mod story;
mod sync_cmd;

pub use config_cmd::ConfigCommand;
pub use event::EventCommand;
pub use hero::HeroCommand;
pub use resolve::ResolveCommand;
pub use status::StatusCommand;
pub use story::StoryCommand;
pub use sync_cmd::SyncCommand;

use clap::ValueEnum;
use herotales_core::sync::{LocalCache, Syncable};
use std::io::{self, Write};
use uuid::Uuid;

use crate::db::SqliteCache;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Finds a live (not deleted) entity by UUID, or by a case-insensitive label.
async fn find_entity<T: Syncable>(
    cache: &SqliteCache,
    identifier: &str,
    label: impl Fn(&T) -> &str,
) -> Result<Option<T>, Box<dyn std::error::Error>> {
    let found = if let Ok(uuid) = Uuid::parse_str(identifier) {
        cache.fetch_local::<T>(uuid).await?
    } else {
        let wanted = identifier.to_lowercase();
        cache
            .list::<T>()
            .await?
            .into_iter()
            .find(|entity| label(entity).to_lowercase() == wanted)
    };

    Ok(found.filter(|entity| !entity.meta().is_deleted()))
}

/// Entities of one kind that have not been deleted locally.
async fn live_entities<T: Syncable>(
    cache: &SqliteCache,
) -> Result<Vec<T>, Box<dyn std::error::Error>> {
    Ok(cache
        .list::<T>()
        .await?
        .into_iter()
        .filter(|entity| !entity.meta().is_deleted())
        .collect())
}

/// Asks a yes/no question on stdin; anything but "y" is a no.
fn confirm(question: &str) -> io::Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Shortens `text` to `width` characters for table output.
fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let kept: String = text.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        text.to_string()
    }
}
