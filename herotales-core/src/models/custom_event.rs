use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::sync::{
    decode_fields, encode_fields, EntityKind, Fields, RemoteRecord, SyncError, SyncMetadata,
    Syncable,
};

/// A user-defined story event ("first day at school", "a trip to the sea").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomEvent {
    pub id: Uuid,
    pub title: String,
    pub prompt_seed: String,
    pub category: Option<String>,
    pub usage_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sync: SyncMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomEventFields {
    title: String,
    #[serde(default)]
    prompt_seed: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    usage_count: u32,
}

impl CustomEvent {
    pub fn new(title: impl Into<String>, prompt_seed: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            prompt_seed: prompt_seed.into(),
            category: None,
            usage_count: 0,
            created_at: now,
            updated_at: now,
            sync: SyncMetadata::new_local(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Records a local edit made through `f`.
    pub fn edit(&mut self, f: impl FnOnce(&mut Self)) {
        f(self);
        self.updated_at = Utc::now();
        self.sync.mark_local_edit();
    }
}

impl Syncable for CustomEvent {
    const KIND: EntityKind = EntityKind::CustomEvent;

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
        encode_fields(
            Self::KIND,
            &CustomEventFields {
                title: self.title.clone(),
                prompt_seed: self.prompt_seed.clone(),
                category: self.category.clone(),
                usage_count: self.usage_count,
            },
        )
    }

    fn from_remote(record: &RemoteRecord, _parent: Option<Uuid>) -> Result<Self, SyncError> {
        let mut event = CustomEvent::new(String::new(), String::new());
        event.apply_remote(record, None)?;
        event.created_at = record.updated_at;
        event.sync = SyncMetadata::from_server(&record.id, record.updated_at, Utc::now());
        Ok(event)
    }

    fn apply_remote(&mut self, record: &RemoteRecord, _parent: Option<Uuid>) -> Result<(), SyncError> {
        let fields: CustomEventFields = decode_fields(Self::KIND, record)?;
        self.title = fields.title;
        self.prompt_seed = fields.prompt_seed;
        self.category = fields.category;
        self.usage_count = fields.usage_count;
        self.updated_at = record.updated_at;
        Ok(())
    }
}

impl fmt::Display for CustomEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)?;
        if let Some(category) = &self.category {
            write!(f, " [{}]", category)?;
        }
        write!(f, " - used {} time", self.usage_count)?;
        if self.usage_count != 1 {
            write!(f, "s")?;
        }
        write!(f, " ({})", self.sync.status)
    }
}
