use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::sync::{
    decode_fields, encode_fields, EntityKind, Fields, RemoteRecord, SyncError, SyncMetadata,
    Syncable,
};

/// A character profile that stories are written about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hero {
    pub id: Uuid,
    pub name: String,
    pub age: Option<u32>,
    pub traits: Vec<String>,
    pub special_ability: Option<String>,
    pub appearance: Option<String>,
    /// Regenerated server-side whenever the appearance changes.
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sync: SyncMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeroFields {
    name: String,
    #[serde(default)]
    age: Option<u32>,
    #[serde(default)]
    traits: Vec<String>,
    #[serde(default)]
    special_ability: Option<String>,
    #[serde(default)]
    appearance: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

impl Hero {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            age: None,
            traits: Vec::new(),
            special_ability: None,
            appearance: None,
            avatar_url: None,
            created_at: now,
            updated_at: now,
            sync: SyncMetadata::new_local(),
        }
    }

    pub fn with_age(mut self, age: u32) -> Self {
        self.age = Some(age);
        self
    }

    pub fn with_traits(mut self, traits: Vec<String>) -> Self {
        self.traits = traits;
        self
    }

    pub fn with_special_ability(mut self, ability: impl Into<String>) -> Self {
        self.special_ability = Some(ability.into());
        self
    }

    pub fn with_appearance(mut self, appearance: impl Into<String>) -> Self {
        self.appearance = Some(appearance.into());
        self
    }

    /// Records a local edit made through `f`.
    pub fn edit(&mut self, f: impl FnOnce(&mut Self)) {
        f(self);
        self.updated_at = Utc::now();
        self.sync.mark_local_edit();
    }

    fn fields(&self) -> HeroFields {
        HeroFields {
            name: self.name.clone(),
            age: self.age,
            traits: self.traits.clone(),
            special_ability: self.special_ability.clone(),
            appearance: self.appearance.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }

    fn assign(&mut self, fields: HeroFields) {
        self.name = fields.name;
        self.age = fields.age;
        self.traits = fields.traits;
        self.special_ability = fields.special_ability;
        self.appearance = fields.appearance;
        self.avatar_url = fields.avatar_url;
    }
}

impl Syncable for Hero {
    const KIND: EntityKind = EntityKind::Hero;

    fn local_id(&self) -> Uuid {
        self.id
    }

    fn meta(&self) -> &SyncMetadata {
        &self.sync
    }

    fn meta_mut(&mut self) -> &mut SyncMetadata {
        &mut self.sync
    }

    fn remote_fields(&self) -> Result<Fields, SyncError> {
        encode_fields(Self::KIND, &self.fields())
    }

    fn from_remote(record: &RemoteRecord, _parent: Option<Uuid>) -> Result<Self, SyncError> {
        let mut hero = Hero::new(String::new());
        hero.apply_remote(record, None)?;
        hero.created_at = record.updated_at;
        hero.sync = SyncMetadata::from_server(&record.id, record.updated_at, Utc::now());
        Ok(hero)
    }

    fn apply_remote(&mut self, record: &RemoteRecord, _parent: Option<Uuid>) -> Result<(), SyncError> {
        let fields: HeroFields = decode_fields(Self::KIND, record)?;
        self.assign(fields);
        self.updated_at = record.updated_at;
        Ok(())
    }
}

impl fmt::Display for Hero {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "{}", "=".repeat(self.name.len()))?;

        if let Some(age) = self.age {
            writeln!(f, "Age: {}", age)?;
        }
        if !self.traits.is_empty() {
            writeln!(f, "Traits: {}", self.traits.join(", "))?;
        }
        if let Some(ability) = &self.special_ability {
            writeln!(f, "Special ability: {}", ability)?;
        }
        if let Some(appearance) = &self.appearance {
            writeln!(f, "Appearance: {}", appearance)?;
        }

        write!(f, "Sync: {}", self.sync.status)?;
        if let Some(error) = &self.sync.sync_error {
            write!(f, " ({})", error)?;
        }
        writeln!(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncStatus;
    use serde_json::json;

    fn record(value: serde_json::Value) -> RemoteRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_hero_new_is_pending_create() {
        let hero = Hero::new("Luna").with_age(8);
        assert_eq!(hero.name, "Luna");
        assert_eq!(hero.age, Some(8));
        assert_eq!(hero.sync.status, SyncStatus::PendingCreate);
        assert!(hero.server_id().is_none());
    }

    #[test]
    fn test_remote_fields_use_wire_names() {
        let hero = Hero::new("Luna")
            .with_traits(vec!["brave".into(), "curious".into()])
            .with_special_ability("talks to owls");

        let fields = hero.remote_fields().unwrap();
        assert_eq!(fields["name"], "Luna");
        assert_eq!(fields["specialAbility"], "talks to owls");
        assert_eq!(fields["traits"], json!(["brave", "curious"]));
    }

    #[test]
    fn test_from_remote_is_synced() {
        let hero = Hero::from_remote(
            &record(json!({
                "id": "srv-1",
                "updatedAt": "2025-05-01T08:00:00Z",
                "name": "Max",
                "traits": ["kind"],
                "avatarUrl": "https://cdn.example.com/max.png"
            })),
            None,
        )
        .unwrap();

        assert_eq!(hero.name, "Max");
        assert_eq!(hero.avatar_url.as_deref(), Some("https://cdn.example.com/max.png"));
        assert_eq!(hero.sync.status, SyncStatus::Synced);
        assert_eq!(hero.server_id(), Some("srv-1"));
        assert!(hero.sync.last_synced_at.is_some());
    }

    #[test]
    fn test_from_remote_missing_name_is_payload_error() {
        let result = Hero::from_remote(
            &record(json!({ "id": "srv-1", "updatedAt": "2025-05-01T08:00:00Z" })),
            None,
        );
        assert!(matches!(result, Err(SyncError::Payload { .. })));
    }

    #[test]
    fn test_edit_marks_pending_update_after_sync() {
        let now = Utc::now();
        let mut hero = Hero::new("Luna");
        hero.sync.mark_synced("srv-1", now, now);

        hero.edit(|h| h.name = "Luna the Bold".to_string());

        assert_eq!(hero.name, "Luna the Bold");
        assert_eq!(hero.sync.status, SyncStatus::PendingUpdate);
    }

    #[test]
    fn test_hero_display() {
        let hero = Hero::new("Luna").with_age(8).with_traits(vec!["brave".into()]);
        let output = format!("{}", hero);
        assert!(output.contains("Luna"));
        assert!(output.contains("Age: 8"));
        assert!(output.contains("Sync: pendingCreate"));
    }
}
