//! Remote API contract and the record envelope exchanged with it.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::ApiError;
use super::kind::EntityKind;

/// Domain fields of a record, keyed by their wire names.
pub type Fields = Map<String, Value>;

/// Server-side representation of one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    pub id: String,
    pub updated_at: DateTime<Utc>,
    /// Server id of the owning record (a story's hero).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(flatten)]
    pub fields: Fields,
}

/// Body of a create or update request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(flatten)]
    pub fields: Fields,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: u32,
    pub cursor: Option<String>,
}

impl PageRequest {
    pub fn first(limit: u32) -> Self {
        Self {
            limit,
            cursor: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub records: Vec<RemoteRecord>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Request/response transport to the remote source of truth.
///
/// Implementations must be idempotent per record identity: the engine may
/// push the same record twice when per-type syncs race with a full cycle.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn create(&self, kind: EntityKind, body: RecordBody) -> Result<RemoteRecord, ApiError>;

    async fn update(
        &self,
        kind: EntityKind,
        server_id: &str,
        body: RecordBody,
    ) -> Result<RemoteRecord, ApiError>;

    async fn delete(&self, kind: EntityKind, server_id: &str) -> Result<(), ApiError>;

    async fn get(&self, kind: EntityKind, server_id: &str) -> Result<RemoteRecord, ApiError>;

    async fn list(&self, kind: EntityKind, page: PageRequest) -> Result<Page, ApiError>;
}

/// Runs one API call, turning an elapsed `limit` into [`ApiError::Timeout`].
pub(crate) async fn bounded<R>(
    limit: Duration,
    request: impl Future<Output = Result<R, ApiError>>,
) -> Result<R, ApiError> {
    tokio::time::timeout(limit, request)
        .await
        .unwrap_or_else(|_| Err(ApiError::Timeout(limit)))
}
