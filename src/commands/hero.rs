use clap::{Args, Subcommand};
use herotales_core::sync::{LocalCache, Syncable};
use herotales_core::{Hero, Story};

use super::{confirm, find_entity, live_entities, truncate, OutputFormat};
use crate::db::SqliteCache;

#[derive(Args)]
pub struct HeroCommand {
    #[command(subcommand)]
    pub command: HeroSubcommand,
}

#[derive(Subcommand)]
pub enum HeroSubcommand {
    /// Create a new hero
    Add {
        /// Name of the hero
        name: String,

        /// Age in years
        #[arg(long)]
        age: Option<u32>,

        /// Character trait (can be repeated)
        #[arg(long = "trait", value_name = "TRAIT")]
        traits: Vec<String>,

        /// Special ability
        #[arg(long)]
        ability: Option<String>,

        /// Appearance description
        #[arg(long)]
        appearance: Option<String>,
    },

    /// List all heroes
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a hero's details
    Show {
        /// Hero ID (UUID) or name
        identifier: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Update an existing hero
    Edit {
        /// Hero ID (UUID) or name
        identifier: String,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// New age
        #[arg(long)]
        age: Option<u32>,

        /// Add a trait (can be repeated)
        #[arg(long = "add-trait", value_name = "TRAIT")]
        add_traits: Vec<String>,

        /// Remove a trait (can be repeated)
        #[arg(long = "remove-trait", value_name = "TRAIT")]
        remove_traits: Vec<String>,

        /// New special ability
        #[arg(long)]
        ability: Option<String>,

        /// New appearance description
        #[arg(long)]
        appearance: Option<String>,
    },

    /// Delete a hero and its stories
    Delete {
        /// Hero ID (UUID) or name
        identifier: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

impl HeroCommand {
    pub async fn run(&self, cache: &SqliteCache) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            HeroSubcommand::Add {
                name,
                age,
                traits,
                ability,
                appearance,
            } => {
                if name.trim().is_empty() {
                    return Err("Hero name cannot be empty".into());
                }

                let mut hero = Hero::new(name.trim());
                if let Some(age) = age {
                    hero = hero.with_age(*age);
                }
                if !traits.is_empty() {
                    hero = hero.with_traits(traits.clone());
                }
                if let Some(ability) = ability {
                    hero = hero.with_special_ability(ability);
                }
                if let Some(appearance) = appearance {
                    hero = hero.with_appearance(appearance);
                }

                cache.save(&hero).await?;
                println!("Created hero:");
                println!("{}", hero);
                Ok(())
            }

            HeroSubcommand::List { format } => {
                let heroes: Vec<Hero> = live_entities(cache).await?;

                if heroes.is_empty() {
                    println!("No heroes found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&heroes)?);
                    }
                    OutputFormat::Text => {
                        println!("{:<36}  {:<24}  {:<14}  TRAITS", "ID", "NAME", "SYNC");
                        println!("{}", "-".repeat(90));
                        for hero in &heroes {
                            println!(
                                "{:<36}  {:<24}  {:<14}  {}",
                                hero.id,
                                truncate(&hero.name, 24),
                                hero.sync.status,
                                hero.traits.join(", ")
                            );
                        }
                        println!("\nTotal: {} hero(es)", heroes.len());
                    }
                }
                Ok(())
            }

            HeroSubcommand::Show { identifier, format } => {
                let hero = find_entity(cache, identifier, |hero: &Hero| hero.name.as_str())
                    .await?
                    .ok_or_else(|| format!("Hero not found: {}", identifier))?;

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&hero)?);
                    }
                    OutputFormat::Text => {
                        println!("{}", hero);
                    }
                }
                Ok(())
            }

            HeroSubcommand::Edit {
                identifier,
                name,
                age,
                add_traits,
                remove_traits,
                ability,
                appearance,
            } => {
                let has_updates = name.is_some()
                    || age.is_some()
                    || !add_traits.is_empty()
                    || !remove_traits.is_empty()
                    || ability.is_some()
                    || appearance.is_some();

                if !has_updates {
                    return Err("Nothing to update. Provide at least one option.".into());
                }

                let mut hero = find_entity(cache, identifier, |hero: &Hero| hero.name.as_str())
                    .await?
                    .ok_or_else(|| format!("Hero not found: {}", identifier))?;

                hero.edit(|hero| {
                    if let Some(new_name) = name {
                        hero.name = new_name.clone();
                    }
                    if let Some(new_age) = age {
                        hero.age = Some(*new_age);
                    }
                    for new_trait in add_traits {
                        if !hero
                            .traits
                            .iter()
                            .any(|t| t.eq_ignore_ascii_case(new_trait))
                        {
                            hero.traits.push(new_trait.clone());
                        }
                    }
                    for old_trait in remove_traits {
                        hero.traits.retain(|t| !t.eq_ignore_ascii_case(old_trait));
                    }
                    if let Some(new_ability) = ability {
                        hero.special_ability = Some(new_ability.clone());
                    }
                    if let Some(new_appearance) = appearance {
                        hero.appearance = Some(new_appearance.clone());
                    }
                });

                cache.save(&hero).await?;
                println!("Updated hero:");
                println!("{}", hero);
                Ok(())
            }

            HeroSubcommand::Delete { identifier, force } => {
                let mut hero = find_entity(cache, identifier, |hero: &Hero| hero.name.as_str())
                    .await?
                    .ok_or_else(|| format!("Hero not found: {}", identifier))?;

                let stories: Vec<Story> = live_entities::<Story>(cache)
                    .await?
                    .into_iter()
                    .filter(|story| story.hero_id == hero.id)
                    .collect();

                if !force {
                    let question = if stories.is_empty() {
                        format!("Delete hero '{}'?", hero.name)
                    } else {
                        format!(
                            "Delete hero '{}' and {} story(ies)?",
                            hero.name,
                            stories.len()
                        )
                    };
                    if !confirm(&question)? {
                        println!("Deletion cancelled.");
                        return Ok(());
                    }
                }

                for mut story in stories {
                    story.mark_deleted();
                    cache.save(&story).await?;
                }
                hero.mark_deleted();
                cache.save(&hero).await?;

                println!("Deleted hero: {}", hero.name);
                Ok(())
            }
        }
    }
}
