//! Per-entity sync status and the metadata every syncable entity carries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where an entity stands relative to the last confirmed server state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStatus {
    /// Local state matches the last known server state.
    Synced,
    /// Created locally, never pushed.
    PendingCreate,
    /// Modified locally after a prior sync.
    PendingUpdate,
    /// Deleted locally, remote deletion not yet confirmed.
    PendingDelete,
    /// Last push or pull errored; retried on the next cycle.
    Failed,
    /// Local and remote both changed; needs resolution before further pushes.
    Conflict,
}

impl SyncStatus {
    pub const ALL: [SyncStatus; 6] = [
        SyncStatus::Synced,
        SyncStatus::PendingCreate,
        SyncStatus::PendingUpdate,
        SyncStatus::PendingDelete,
        SyncStatus::Failed,
        SyncStatus::Conflict,
    ];

    pub fn needs_sync(self) -> bool {
        self != SyncStatus::Synced
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::PendingCreate => "pendingCreate",
            SyncStatus::PendingUpdate => "pendingUpdate",
            SyncStatus::PendingDelete => "pendingDelete",
            SyncStatus::Failed => "failed",
            SyncStatus::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SyncStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Unknown sync status: {}", s))
    }
}

/// Sync bookkeeping embedded in every syncable entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    /// Remote identifier, absent until the first successful create push.
    pub server_id: Option<String>,
    #[serde(rename = "serverSyncStatus")]
    pub status: SyncStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Last known remote modification time.
    pub server_updated_at: Option<DateTime<Utc>>,
    /// Reserved for field-level diffing; only ever cleared today.
    pub pending_changes: Option<Vec<u8>>,
    pub sync_error: Option<String>,
    /// Set when the entity was deleted locally, so a failed delete is retried as a delete.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SyncMetadata {
    /// Metadata for an entity that was just created on this device.
    pub fn new_local() -> Self {
        Self {
            server_id: None,
            status: SyncStatus::PendingCreate,
            last_synced_at: None,
            server_updated_at: None,
            pending_changes: None,
            sync_error: None,
            deleted_at: None,
        }
    }

    /// Metadata for an entity materialized from a server record.
    pub fn from_server(
        server_id: impl Into<String>,
        server_updated_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut meta = Self::new_local();
        meta.mark_synced(server_id, server_updated_at, now);
        meta
    }

    pub fn needs_sync(&self) -> bool {
        self.status.needs_sync()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Records a local edit.
    ///
    /// Only entities that already exist remotely move to `pendingUpdate`; a
    /// pending create stays a create and a conflict stays a conflict until
    /// it is resolved.
    pub fn mark_local_edit(&mut self) {
        match self.status {
            SyncStatus::Synced => self.status = SyncStatus::PendingUpdate,
            SyncStatus::Failed if self.server_id.is_some() && !self.is_deleted() => {
                self.status = SyncStatus::PendingUpdate
            }
            SyncStatus::PendingCreate
            | SyncStatus::PendingUpdate
            | SyncStatus::PendingDelete
            | SyncStatus::Failed
            | SyncStatus::Conflict => {}
        }
    }

    pub fn mark_deleted(&mut self, now: DateTime<Utc>) {
        self.deleted_at = Some(now);
        self.status = SyncStatus::PendingDelete;
    }

    pub fn mark_synced(
        &mut self,
        server_id: impl Into<String>,
        server_updated_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        self.server_id = Some(server_id.into());
        self.status = SyncStatus::Synced;
        self.last_synced_at = Some(now);
        self.server_updated_at = Some(server_updated_at);
        self.pending_changes = None;
        self.sync_error = None;
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = SyncStatus::Failed;
        self.sync_error = Some(message.into());
    }

    /// `server_updated_at` is left alone so the resolver can still tell
    /// which server version the local edits were based on.
    pub fn mark_conflict(&mut self) {
        self.status = SyncStatus::Conflict;
    }
}

impl Default for SyncMetadata {
    fn default() -> Self {
        Self::new_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_sync() {
        assert!(!SyncStatus::Synced.needs_sync());
        for status in SyncStatus::ALL.into_iter().skip(1) {
            assert!(status.needs_sync(), "{} should need sync", status);
        }
    }

    #[test]
    fn test_status_parse() {
        for status in SyncStatus::ALL {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
        assert!("pending".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let json = serde_json::to_string(&SyncStatus::PendingCreate).unwrap();
        assert_eq!(json, "\"pendingCreate\"");
    }

    #[test]
    fn test_new_local_is_pending_create() {
        let meta = SyncMetadata::new_local();
        assert_eq!(meta.status, SyncStatus::PendingCreate);
        assert!(meta.server_id.is_none());
        assert!(meta.needs_sync());
    }

    #[test]
    fn test_mark_synced_clears_error_and_changes() {
        let now = Utc::now();
        let mut meta = SyncMetadata::new_local();
        meta.pending_changes = Some(vec![1, 2, 3]);
        meta.mark_failed("boom");

        meta.mark_synced("srv-1", now, now);

        assert_eq!(meta.status, SyncStatus::Synced);
        assert_eq!(meta.server_id.as_deref(), Some("srv-1"));
        assert_eq!(meta.last_synced_at, Some(now));
        assert!(meta.pending_changes.is_none());
        assert!(meta.sync_error.is_none());
    }

    #[test]
    fn test_local_edit_transitions() {
        let now = Utc::now();

        let mut synced = SyncMetadata::from_server("srv-1", now, now);
        synced.mark_local_edit();
        assert_eq!(synced.status, SyncStatus::PendingUpdate);

        let mut created = SyncMetadata::new_local();
        created.mark_local_edit();
        assert_eq!(created.status, SyncStatus::PendingCreate);

        let mut conflicted = SyncMetadata::from_server("srv-1", now, now);
        conflicted.mark_conflict();
        conflicted.mark_local_edit();
        assert_eq!(conflicted.status, SyncStatus::Conflict);

        let mut failed_update = SyncMetadata::from_server("srv-1", now, now);
        failed_update.mark_failed("offline");
        failed_update.mark_local_edit();
        assert_eq!(failed_update.status, SyncStatus::PendingUpdate);

        let mut failed_create = SyncMetadata::new_local();
        failed_create.mark_failed("offline");
        failed_create.mark_local_edit();
        assert_eq!(failed_create.status, SyncStatus::Failed);
    }

    #[test]
    fn test_mark_deleted_sets_tombstone() {
        let now = Utc::now();
        let mut meta = SyncMetadata::from_server("srv-1", now, now);
        meta.mark_deleted(now);
        assert_eq!(meta.status, SyncStatus::PendingDelete);
        assert!(meta.is_deleted());
    }
}
