//! The capability contract every synchronizable entity implements.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use super::api::{Fields, RecordBody, RemoteRecord};
use super::cache::LocalCache;
use super::error::{CacheError, SyncError};
use super::kind::EntityKind;
use super::status::SyncMetadata;

/// An entity that can be pushed to and pulled from the remote API.
///
/// Entities are persisted by caches as JSON, hence the serde bounds.
pub trait Syncable: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;

    /// Kind of the record this entity belongs to, if any. A child is only
    /// pushed once its parent has a server id.
    const PARENT: Option<EntityKind> = None;

    fn local_id(&self) -> Uuid;

    fn meta(&self) -> &SyncMetadata;

    fn meta_mut(&mut self) -> &mut SyncMetadata;

    fn parent_local_id(&self) -> Option<Uuid> {
        None
    }

    /// Mutable domain fields in their wire form.
    fn remote_fields(&self) -> Result<Fields, SyncError>;

    /// Builds a new local entity from a server record.
    fn from_remote(record: &RemoteRecord, parent_local_id: Option<Uuid>) -> Result<Self, SyncError>;

    /// Overwrites local mutable fields from a server record. Sync metadata is
    /// left to the caller.
    fn apply_remote(
        &mut self,
        record: &RemoteRecord,
        parent_local_id: Option<Uuid>,
    ) -> Result<(), SyncError>;

    fn needs_sync(&self) -> bool {
        self.meta().needs_sync()
    }

    fn server_id(&self) -> Option<&str> {
        self.meta().server_id.as_deref()
    }

    /// Request body for a create or update push.
    fn record_body(&self, parent_server_id: Option<String>) -> Result<RecordBody, SyncError> {
        Ok(RecordBody {
            parent_id: parent_server_id,
            fields: self.remote_fields()?,
        })
    }

    /// Marks the entity as deleted locally.
    fn mark_deleted(&mut self) {
        self.meta_mut().mark_deleted(Utc::now());
    }
}

/// Serializes a typed field set into the wire map.
pub(crate) fn encode_fields<F: Serialize>(kind: EntityKind, fields: &F) -> Result<Fields, SyncError> {
    match serde_json::to_value(fields) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(SyncError::Payload {
            kind,
            message: format!("expected an object, got {}", other),
        }),
        Err(e) => Err(SyncError::Payload {
            kind,
            message: e.to_string(),
        }),
    }
}

/// Parses the wire map of a server record into a typed field set.
pub(crate) fn decode_fields<F: DeserializeOwned>(
    kind: EntityKind,
    record: &RemoteRecord,
) -> Result<F, SyncError> {
    serde_json::from_value(serde_json::Value::Object(record.fields.clone())).map_err(|e| {
        SyncError::Payload {
            kind,
            message: format!("record {}: {}", record.id, e),
        }
    })
}

/// Local id of the parent a server record points at, if it is cached.
pub(crate) async fn parent_local_id<T: Syncable, C: LocalCache>(
    cache: &C,
    record: &RemoteRecord,
) -> Result<Option<Uuid>, CacheError> {
    match (T::PARENT, record.parent_id.as_deref()) {
        (Some(kind), Some(server_id)) => cache.local_id_for(kind, server_id).await,
        _ => Ok(None),
    }
}

/// What a push needs to know about an entity's parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ParentRef {
    /// The entity kind has no parent.
    Orphan,
    /// The parent exists remotely under this server id.
    Synced(String),
    /// The parent has no server id yet (or is gone from the cache).
    Unsynced,
}

impl ParentRef {
    pub(crate) fn server_id(self) -> Option<String> {
        match self {
            ParentRef::Synced(id) => Some(id),
            ParentRef::Orphan | ParentRef::Unsynced => None,
        }
    }
}

pub(crate) async fn parent_ref<T: Syncable, C: LocalCache>(
    cache: &C,
    entity: &T,
) -> Result<ParentRef, CacheError> {
    match (T::PARENT, entity.parent_local_id()) {
        (Some(kind), Some(local_id)) => Ok(match cache.server_id_for(kind, local_id).await? {
            Some(server_id) => ParentRef::Synced(server_id),
            None => ParentRef::Unsynced,
        }),
        _ => Ok(ParentRef::Orphan),
    }
}
