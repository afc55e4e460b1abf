use clap::{Args, Subcommand};
use herotales_core::sync::{LocalCache, Syncable};
use herotales_core::CustomEvent;

use super::{confirm, find_entity, live_entities, truncate, OutputFormat};
use crate::db::SqliteCache;

#[derive(Args)]
pub struct EventCommand {
    #[command(subcommand)]
    pub command: EventSubcommand,
}

#[derive(Subcommand)]
pub enum EventSubcommand {
    /// Create a custom story event
    Add {
        /// Event title
        title: String,

        /// Seed text used when generating stories for this event
        #[arg(long)]
        prompt: String,

        /// Category (e.g. holiday, adventure)
        #[arg(long)]
        category: Option<String>,
    },

    /// List custom events
    List {
        /// Filter by category
        #[arg(long)]
        category: Option<String>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Update a custom event
    Edit {
        /// Event ID (UUID) or title
        identifier: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New prompt seed
        #[arg(long)]
        prompt: Option<String>,

        /// New category
        #[arg(long)]
        category: Option<String>,
    },

    /// Delete a custom event
    Delete {
        /// Event ID (UUID) or title
        identifier: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

async fn find_event(
    cache: &SqliteCache,
    identifier: &str,
) -> Result<CustomEvent, Box<dyn std::error::Error>> {
    find_entity(cache, identifier, |event: &CustomEvent| event.title.as_str())
        .await?
        .ok_or_else(|| format!("Event not found: {}", identifier).into())
}

impl EventCommand {
    pub async fn run(&self, cache: &SqliteCache) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            EventSubcommand::Add {
                title,
                prompt,
                category,
            } => {
                if title.trim().is_empty() {
                    return Err("Event title cannot be empty".into());
                }

                let mut event = CustomEvent::new(title.trim(), prompt);
                if let Some(category) = category {
                    event = event.with_category(category);
                }

                cache.save(&event).await?;
                println!("Created event: {}", event);
                Ok(())
            }

            EventSubcommand::List { category, format } => {
                let events: Vec<CustomEvent> = live_entities::<CustomEvent>(cache)
                    .await?
                    .into_iter()
                    .filter(|event| match category {
                        Some(wanted) => event
                            .category
                            .as_deref()
                            .is_some_and(|c| c.eq_ignore_ascii_case(wanted)),
                        None => true,
                    })
                    .collect();

                if events.is_empty() {
                    println!("No events found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&events)?);
                    }
                    OutputFormat::Text => {
                        println!(
                            "{:<36}  {:<30}  {:<14}  {:<14}  USED",
                            "ID", "TITLE", "CATEGORY", "SYNC"
                        );
                        println!("{}", "-".repeat(106));
                        for event in &events {
                            println!(
                                "{:<36}  {:<30}  {:<14}  {:<14}  {}",
                                event.id,
                                truncate(&event.title, 30),
                                truncate(event.category.as_deref().unwrap_or("-"), 14),
                                event.sync.status,
                                event.usage_count
                            );
                        }
                        println!("\nTotal: {} event(s)", events.len());
                    }
                }
                Ok(())
            }

            EventSubcommand::Edit {
                identifier,
                title,
                prompt,
                category,
            } => {
                if title.is_none() && prompt.is_none() && category.is_none() {
                    return Err("Nothing to update. Provide at least one option.".into());
                }

                let mut event = find_event(cache, identifier).await?;
                event.edit(|event| {
                    if let Some(new_title) = title {
                        event.title = new_title.clone();
                    }
                    if let Some(new_prompt) = prompt {
                        event.prompt_seed = new_prompt.clone();
                    }
                    if let Some(new_category) = category {
                        event.category = Some(new_category.clone());
                    }
                });

                cache.save(&event).await?;
                println!("Updated event: {}", event);
                Ok(())
            }

            EventSubcommand::Delete { identifier, force } => {
                let mut event = find_event(cache, identifier).await?;

                if !force && !confirm(&format!("Delete event '{}'?", event.title))? {
                    println!("Deletion cancelled.");
                    return Ok(());
                }

                event.mark_deleted();
                cache.save(&event).await?;
                println!("Deleted event: {}", event.title);
                Ok(())
            }
        }
    }
}
