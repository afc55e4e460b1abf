//! In-process doubles for the remote API, shared by the sync tests.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use super::api::{Fields, Page, PageRequest, RecordBody, RemoteApi, RemoteRecord};
use super::error::ApiError;
use super::kind::EntityKind;

/// Builds a server record from a JSON object of domain fields.
pub(crate) fn remote(
    id: &str,
    updated_at: DateTime<Utc>,
    parent_id: Option<&str>,
    fields: Value,
) -> RemoteRecord {
    let fields: Fields = match fields {
        Value::Object(map) => map,
        _ => Fields::new(),
    };
    RemoteRecord {
        id: id.to_string(),
        updated_at,
        parent_id: parent_id.map(str::to_string),
        fields,
    }
}

#[derive(Default)]
struct StubState {
    records: BTreeMap<(EntityKind, String), RemoteRecord>,
    next_id: u32,
    failing: HashSet<String>,
    unavailable: bool,
    delay: Option<Duration>,
    calls: Vec<String>,
}

/// Remote API backed by a map, assigning ids `srv-1`, `srv-2`, ...
#[derive(Default)]
pub(crate) struct StubApi {
    state: Mutex<StubState>,
}

impl StubApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn insert(&self, kind: EntityKind, record: RemoteRecord) {
        let mut state = self.state.lock().await;
        state.records.insert((kind, record.id.clone()), record);
    }

    pub(crate) async fn record(&self, kind: EntityKind, id: &str) -> Option<RemoteRecord> {
        let state = self.state.lock().await;
        state.records.get(&(kind, id.to_string())).cloned()
    }

    pub(crate) async fn count(&self, kind: EntityKind) -> usize {
        let state = self.state.lock().await;
        state.records.keys().filter(|(k, _)| *k == kind).count()
    }

    /// Writes whose `name` or `title` field equals `label` fail with a 500.
    pub(crate) async fn fail_for(&self, label: &str) {
        self.state.lock().await.failing.insert(label.to_string());
    }

    /// Every call fails with a transport error.
    pub(crate) async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    /// Every call sleeps for `delay` before answering.
    pub(crate) async fn set_delay(&self, delay: Duration) {
        self.state.lock().await.delay = Some(delay);
    }

    /// Calls made so far, as `"<op> <kind>"`.
    pub(crate) async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    async fn begin(&self, op: &str, kind: EntityKind) -> Result<(), ApiError> {
        let delay = {
            let mut state = self.state.lock().await;
            state.calls.push(format!("{} {}", op, kind));
            if state.unavailable {
                return Err(ApiError::Transport("connection refused".to_string()));
            }
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    fn check_failing(state: &StubState, body: &RecordBody) -> Result<(), ApiError> {
        let label = body
            .fields
            .get("name")
            .or_else(|| body.fields.get("title"))
            .and_then(Value::as_str);
        match label {
            Some(label) if state.failing.contains(label) => Err(ApiError::Status {
                status: 500,
                message: format!("rejected {}", label),
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteApi for StubApi {
    async fn create(&self, kind: EntityKind, body: RecordBody) -> Result<RemoteRecord, ApiError> {
        self.begin("create", kind).await?;
        let mut state = self.state.lock().await;
        Self::check_failing(&state, &body)?;
        state.next_id += 1;
        let record = RemoteRecord {
            id: format!("srv-{}", state.next_id),
            updated_at: Utc::now(),
            parent_id: body.parent_id,
            fields: body.fields,
        };
        state
            .records
            .insert((kind, record.id.clone()), record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        kind: EntityKind,
        server_id: &str,
        body: RecordBody,
    ) -> Result<RemoteRecord, ApiError> {
        self.begin("update", kind).await?;
        let mut state = self.state.lock().await;
        Self::check_failing(&state, &body)?;
        let key = (kind, server_id.to_string());
        if !state.records.contains_key(&key) {
            return Err(ApiError::NotFound(server_id.to_string()));
        }
        let record = RemoteRecord {
            id: server_id.to_string(),
            updated_at: Utc::now(),
            parent_id: body.parent_id,
            fields: body.fields,
        };
        state.records.insert(key, record.clone());
        Ok(record)
    }

    async fn delete(&self, kind: EntityKind, server_id: &str) -> Result<(), ApiError> {
        self.begin("delete", kind).await?;
        let mut state = self.state.lock().await;
        match state.records.remove(&(kind, server_id.to_string())) {
            Some(_) => Ok(()),
            None => Err(ApiError::NotFound(server_id.to_string())),
        }
    }

    async fn get(&self, kind: EntityKind, server_id: &str) -> Result<RemoteRecord, ApiError> {
        self.begin("get", kind).await?;
        let state = self.state.lock().await;
        state
            .records
            .get(&(kind, server_id.to_string()))
            .cloned()
            .ok_or_else(|| ApiError::NotFound(server_id.to_string()))
    }

    async fn list(&self, kind: EntityKind, page: PageRequest) -> Result<Page, ApiError> {
        self.begin("list", kind).await?;
        let state = self.state.lock().await;
        let offset: usize = page
            .cursor
            .as_deref()
            .map(|c| c.parse().unwrap_or(0))
            .unwrap_or(0);
        let all: Vec<&RemoteRecord> = state
            .records
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, record)| record)
            .collect();
        let end = (offset + page.limit as usize).min(all.len());
        let records = all[offset.min(end)..end].iter().map(|r| (*r).clone()).collect();
        let next_cursor = (end < all.len()).then(|| end.to_string());
        Ok(Page {
            records,
            next_cursor,
        })
    }
}
