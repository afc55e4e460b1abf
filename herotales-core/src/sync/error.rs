//! Sync error types.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use super::kind::EntityKind;

/// Errors returned by a [`RemoteApi`](super::RemoteApi) implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// The request never produced a response (DNS, connect, TLS, reset).
    #[error("Transport error: {0}")]
    Transport(String),
    /// The server answered with a non-success status.
    #[error("Server returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Record not found on server: {0}")]
    NotFound(String),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// The response body was missing or did not match the record envelope.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Errors returned by a [`LocalCache`](super::LocalCache) implementation.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache storage error: {0}")]
    Storage(String),
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors that can occur during sync and conflict resolution.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// `localWins` needs a server id to push to.
    #[error("{kind} {local_id} is not yet synced; it has no server id")]
    NotSynced { kind: EntityKind, local_id: Uuid },
    /// `userPrompt` had nobody to ask and the fallback is set to fail.
    #[error("No conflict decision available for {kind} {local_id}")]
    NoDecision { kind: EntityKind, local_id: Uuid },
    /// A server payload could not be mapped onto the local entity.
    #[error("Invalid {kind} payload: {message}")]
    Payload { kind: EntityKind, message: String },
}

impl SyncError {
    /// Per-record errors are recorded on the entity; everything else aborts the cycle.
    pub fn is_record_level(&self) -> bool {
        !matches!(self, SyncError::Cache(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_synced_message() {
        let id = Uuid::nil();
        let err = SyncError::NotSynced {
            kind: EntityKind::Story,
            local_id: id,
        };
        assert_eq!(
            err.to_string(),
            format!("story {} is not yet synced; it has no server id", id)
        );
    }

    #[test]
    fn test_api_error_is_transparent() {
        let err = SyncError::from(ApiError::Status {
            status: 503,
            message: "maintenance".to_string(),
        });
        assert_eq!(err.to_string(), "Server returned status 503: maintenance");
        assert!(err.is_record_level());
    }

    #[test]
    fn test_cache_error_is_fatal() {
        let err = SyncError::from(CacheError::Storage("disk full".to_string()));
        assert!(!err.is_record_level());
    }
}
