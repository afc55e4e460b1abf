//! Offline-first synchronization between the local cache and the story server.
//!
//! Every local entity carries [`SyncMetadata`]. Local edits move it into one
//! of the pending states; the [`SyncEngine`] pushes those, pulls the server's
//! records, and hands records that changed on both sides to the
//! [`ConflictResolver`].
//!
//! ## Status machine
//!
//! ```text
//! pendingCreate --push ok--> synced <--pull/resolve-- conflict
//!       |                      |  ^                      ^
//!   push err              edit |  | push ok              | server moved on
//!       v                      v  |                      |
//!    failed <---push err--- pendingUpdate ---------------+
//! ```
//!
//! Deletes go through `pendingDelete`; a failed delete keeps its
//! `deleted_at` tombstone so the retry is a delete again.

mod api;
mod cache;
mod engine;
mod error;
mod http;
mod kind;
mod report;
mod resolver;
mod status;
mod syncable;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{Fields, Page, PageRequest, RecordBody, RemoteApi, RemoteRecord};
pub use cache::{LocalCache, MemoryCache};
pub use engine::{SyncEngine, SyncOptions};
pub use error::{ApiError, CacheError, SyncError};
pub use http::{check_server, HttpApi};
pub use kind::{ContentOrigin, EntityKind};
pub use report::{SyncEvent, SyncOutcome, SyncPhase, SyncReport};
pub use resolver::{
    ConflictResolver, ConflictSummary, DecisionSurface, PromptFallback, ResolutionStrategy,
    StrategyTable,
};
pub use status::{SyncMetadata, SyncStatus};
pub use syncable::Syncable;

pub(crate) use syncable::{decode_fields, encode_fields};
