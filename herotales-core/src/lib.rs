//! Herotales Core Library
//!
//! Entity models and the offline-first sync engine shared by Herotales
//! applications.

pub mod models;
pub mod sync;

pub use models::{CustomEvent, Hero, Story};
pub use sync::{
    check_server, ApiError, CacheError, ConflictResolver, DecisionSurface, EntityKind, HttpApi,
    LocalCache, MemoryCache, PromptFallback, RemoteApi, ResolutionStrategy, SyncEngine, SyncError,
    SyncEvent, SyncMetadata, SyncOptions, SyncOutcome, SyncReport, SyncStatus, Syncable,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
