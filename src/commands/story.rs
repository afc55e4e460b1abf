use clap::{Args, Subcommand};
use herotales_core::sync::{LocalCache, Syncable};
use herotales_core::{Hero, Story};
use std::collections::HashMap;
use uuid::Uuid;

use super::{confirm, find_entity, live_entities, truncate, OutputFormat};
use crate::db::SqliteCache;

#[derive(Args)]
pub struct StoryCommand {
    #[command(subcommand)]
    pub command: StorySubcommand,
}

#[derive(Subcommand)]
pub enum StorySubcommand {
    /// Write a new story for a hero
    Add {
        /// Hero ID (UUID) or name
        hero: String,

        /// Story title
        title: String,

        /// Story text
        #[arg(long)]
        content: Option<String>,

        /// Custom event the story is about
        #[arg(long)]
        event: Option<String>,

        /// Mark as favorite
        #[arg(long)]
        favorite: bool,
    },

    /// List stories
    List {
        /// Only stories of this hero (ID or name)
        #[arg(long)]
        hero: Option<String>,

        /// Only favorites
        #[arg(long)]
        favorites: bool,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a story
    Show {
        /// Story ID (UUID) or title
        identifier: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Update an existing story
    Edit {
        /// Story ID (UUID) or title
        identifier: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New story text
        #[arg(long)]
        content: Option<String>,

        /// New event
        #[arg(long)]
        event: Option<String>,

        /// Set or clear the favorite flag
        #[arg(long)]
        favorite: Option<bool>,
    },

    /// Delete a story
    Delete {
        /// Story ID (UUID) or title
        identifier: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

async fn find_hero(
    cache: &SqliteCache,
    identifier: &str,
) -> Result<Hero, Box<dyn std::error::Error>> {
    find_entity(cache, identifier, |hero: &Hero| hero.name.as_str())
        .await?
        .ok_or_else(|| format!("Hero not found: {}", identifier).into())
}

async fn find_story(
    cache: &SqliteCache,
    identifier: &str,
) -> Result<Story, Box<dyn std::error::Error>> {
    find_entity(cache, identifier, |story: &Story| story.title.as_str())
        .await?
        .ok_or_else(|| format!("Story not found: {}", identifier).into())
}

impl StoryCommand {
    pub async fn run(&self, cache: &SqliteCache) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            StorySubcommand::Add {
                hero,
                title,
                content,
                event,
                favorite,
            } => {
                if title.trim().is_empty() {
                    return Err("Story title cannot be empty".into());
                }

                let hero = find_hero(cache, hero).await?;
                let mut story = Story::new(hero.id, title.trim()).with_favorite(*favorite);
                if let Some(content) = content {
                    story = story.with_content(content);
                }
                if let Some(event) = event {
                    story = story.with_event(event);
                }

                cache.save(&story).await?;
                println!("Created story for {}:", hero.name);
                println!("{}", story);
                Ok(())
            }

            StorySubcommand::List {
                hero,
                favorites,
                format,
            } => {
                let hero_filter = match hero {
                    Some(identifier) => Some(find_hero(cache, identifier).await?.id),
                    None => None,
                };

                let stories: Vec<Story> = live_entities::<Story>(cache)
                    .await?
                    .into_iter()
                    .filter(|story| hero_filter.map_or(true, |id| story.hero_id == id))
                    .filter(|story| !favorites || story.is_favorite)
                    .collect();

                if stories.is_empty() {
                    println!("No stories found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&stories)?);
                    }
                    OutputFormat::Text => {
                        let heroes: HashMap<Uuid, String> = cache
                            .list::<Hero>()
                            .await?
                            .into_iter()
                            .map(|hero| (hero.id, hero.name))
                            .collect();

                        println!(
                            "{:<36}  {:<30}  {:<16}  {:<14}  MIN",
                            "ID", "TITLE", "HERO", "SYNC"
                        );
                        println!("{}", "-".repeat(108));
                        for story in &stories {
                            let hero_name = heroes
                                .get(&story.hero_id)
                                .map(String::as_str)
                                .unwrap_or("?");
                            let title = if story.is_favorite {
                                format!("★ {}", story.title)
                            } else {
                                story.title.clone()
                            };
                            println!(
                                "{:<36}  {:<30}  {:<16}  {:<14}  {}",
                                story.id,
                                truncate(&title, 30),
                                truncate(hero_name, 16),
                                story.sync.status,
                                story.reading_minutes()
                            );
                        }
                        println!("\nTotal: {} story(ies)", stories.len());
                    }
                }
                Ok(())
            }

            StorySubcommand::Show { identifier, format } => {
                let story = find_story(cache, identifier).await?;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&story)?);
                    }
                    OutputFormat::Text => {
                        println!("{}", story);
                    }
                }
                Ok(())
            }

            StorySubcommand::Edit {
                identifier,
                title,
                content,
                event,
                favorite,
            } => {
                let has_updates =
                    title.is_some() || content.is_some() || event.is_some() || favorite.is_some();

                if !has_updates {
                    return Err("Nothing to update. Provide at least one option.".into());
                }

                let mut story = find_story(cache, identifier).await?;
                story.edit(|story| {
                    if let Some(new_title) = title {
                        story.title = new_title.clone();
                    }
                    if let Some(new_content) = content {
                        story.content = new_content.clone();
                    }
                    if let Some(new_event) = event {
                        story.event = Some(new_event.clone());
                    }
                    if let Some(new_favorite) = favorite {
                        story.is_favorite = *new_favorite;
                    }
                });

                cache.save(&story).await?;
                println!("Updated story:");
                println!("{}", story);
                Ok(())
            }

            StorySubcommand::Delete { identifier, force } => {
                let mut story = find_story(cache, identifier).await?;

                if !force && !confirm(&format!("Delete story '{}'?", story.title))? {
                    println!("Deletion cancelled.");
                    return Ok(());
                }

                story.mark_deleted();
                cache.save(&story).await?;
                println!("Deleted story: {}", story.title);
                Ok(())
            }
        }
    }
}
