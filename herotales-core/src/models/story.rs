use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::sync::{
    decode_fields, encode_fields, EntityKind, Fields, RemoteRecord, SyncError, SyncMetadata,
    Syncable,
};

/// A generated story about one hero.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Story {
    pub id: Uuid,
    /// Local id of the hero this story belongs to.
    pub hero_id: Uuid,
    pub title: String,
    pub content: String,
    /// Name of the story event the story was generated for.
    pub event: Option<String>,
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sync: SyncMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoryFields {
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    is_favorite: bool,
}

impl Story {
    pub fn new(hero_id: Uuid, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            hero_id,
            title: title.into(),
            content: String::new(),
            event: None,
            is_favorite: false,
            created_at: now,
            updated_at: now,
            sync: SyncMetadata::new_local(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn with_favorite(mut self, is_favorite: bool) -> Self {
        self.is_favorite = is_favorite;
        self
    }

    /// Records a local edit made through `f`.
    pub fn edit(&mut self, f: impl FnOnce(&mut Self)) {
        f(self);
        self.updated_at = Utc::now();
        self.sync.mark_local_edit();
    }

    /// Reading time at roughly 200 words per minute, never below one minute.
    pub fn reading_minutes(&self) -> usize {
        let words = self.content.split_whitespace().count();
        words.div_ceil(200).max(1)
    }

    fn fields(&self) -> StoryFields {
        StoryFields {
            title: self.title.clone(),
            content: self.content.clone(),
            event: self.event.clone(),
            is_favorite: self.is_favorite,
        }
    }
}

impl Syncable for Story {
    const KIND: EntityKind = EntityKind::Story;
    const PARENT: Option<EntityKind> = Some(EntityKind::Hero);

    fn local_id(&self) -> Uuid {
        self.id
    }

    fn meta(&self) -> &SyncMetadata {
        &self.sync
    }

    fn meta_mut(&mut self) -> &mut SyncMetadata {
        &mut self.sync
    }

    fn parent_local_id(&self) -> Option<Uuid> {
        Some(self.hero_id)
    }

    fn remote_fields(&self) -> Result<Fields, SyncError> {
        encode_fields(Self::KIND, &self.fields())
    }

    fn from_remote(record: &RemoteRecord, parent: Option<Uuid>) -> Result<Self, SyncError> {
        let hero_id = parent.ok_or_else(|| SyncError::Payload {
            kind: Self::KIND,
            message: format!("record {} has no known hero", record.id),
        })?;
        let mut story = Story::new(hero_id, String::new());
        story.apply_remote(record, Some(hero_id))?;
        story.created_at = record.updated_at;
        story.sync = SyncMetadata::from_server(&record.id, record.updated_at, Utc::now());
        Ok(story)
    }

    fn apply_remote(&mut self, record: &RemoteRecord, parent: Option<Uuid>) -> Result<(), SyncError> {
        let fields: StoryFields = decode_fields(Self::KIND, record)?;
        self.title = fields.title;
        self.content = fields.content;
        self.event = fields.event;
        self.is_favorite = fields.is_favorite;
        if let Some(hero_id) = parent {
            self.hero_id = hero_id;
        }
        self.updated_at = record.updated_at;
        Ok(())
    }
}

impl fmt::Display for Story {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        writeln!(f, "{}", "=".repeat(self.title.len()))?;

        if let Some(event) = &self.event {
            writeln!(f, "Event: {}", event)?;
        }
        writeln!(f, "Reading time: {} min", self.reading_minutes())?;
        if self.is_favorite {
            writeln!(f, "★ Favorite")?;
        }
        if !self.content.is_empty() {
            writeln!(f, "\n{}\n", self.content)?;
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

    fn record() -> RemoteRecord {
        serde_json::from_value(json!({
            "id": "srv-9",
            "updatedAt": "2025-06-01T12:00:00Z",
            "parentId": "srv-1",
            "title": "Server Title",
            "content": "Server content",
            "isFavorite": true
        }))
        .unwrap()
    }

    #[test]
    fn test_story_parent_is_hero() {
        let hero_id = Uuid::new_v4();
        let story = Story::new(hero_id, "The Lost Kite");
        assert_eq!(Story::PARENT, Some(EntityKind::Hero));
        assert_eq!(story.parent_local_id(), Some(hero_id));
    }

    #[test]
    fn test_record_body_carries_parent_server_id() {
        let story = Story::new(Uuid::new_v4(), "The Lost Kite").with_content("Once...");
        let body = story.record_body(Some("srv-1".to_string())).unwrap();

        assert_eq!(body.parent_id.as_deref(), Some("srv-1"));
        assert_eq!(body.fields["title"], "The Lost Kite");
        assert_eq!(body.fields["isFavorite"], false);
    }

    #[test]
    fn test_from_remote_requires_known_hero() {
        assert!(matches!(
            Story::from_remote(&record(), None),
            Err(SyncError::Payload { .. })
        ));

        let hero_id = Uuid::new_v4();
        let story = Story::from_remote(&record(), Some(hero_id)).unwrap();
        assert_eq!(story.hero_id, hero_id);
        assert_eq!(story.title, "Server Title");
        assert!(story.is_favorite);
        assert_eq!(story.sync.status, SyncStatus::Synced);
    }

    #[test]
    fn test_apply_remote_overwrites_fields_only() {
        let hero_id = Uuid::new_v4();
        let mut story = Story::new(hero_id, "Local Title").with_content("Local content");
        story.sync.mark_conflict();

        story.apply_remote(&record(), None).unwrap();

        assert_eq!(story.title, "Server Title");
        assert_eq!(story.content, "Server content");
        assert_eq!(story.hero_id, hero_id);
        assert_eq!(story.sync.status, SyncStatus::Conflict);
    }

    #[test]
    fn test_reading_minutes() {
        let story = Story::new(Uuid::new_v4(), "Short");
        assert_eq!(story.reading_minutes(), 1);

        let long = Story::new(Uuid::new_v4(), "Long").with_content("word ".repeat(450));
        assert_eq!(long.reading_minutes(), 3);
    }
}
