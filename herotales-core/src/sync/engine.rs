//! Sync engine: pushes local changes, pulls remote ones and resolves conflicts.
//!
//! ## Cycle
//!
//! A full cycle runs, for heroes, then stories, then custom events:
//! 1. push creates, then updates, then deletes
//! 2. pull every server page
//! 3. resolve records left in `conflict`
//!
//! Only one full cycle runs at a time per engine. Per-kind syncs bypass that
//! guard; every write is keyed by record identity, so racing them costs
//! redundant requests but does not corrupt state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::{broadcast, RwLock};

use super::api::{bounded, PageRequest, RemoteApi, RemoteRecord};
use super::cache::LocalCache;
use super::error::{ApiError, SyncError};
use super::report::{SyncEvent, SyncOutcome, SyncPhase, SyncReport};
use super::resolver::{ConflictResolver, ResolutionStrategy};
use super::status::SyncStatus;
use super::syncable::{parent_local_id, parent_ref, ParentRef, Syncable};
use crate::models::{CustomEvent, Hero, Story};

/// Capacity of the progress event channel; slow subscribers miss old events.
const EVENT_CAPACITY: usize = 256;

/// Tuning knobs for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Records requested per pull page.
    pub page_size: u32,
    /// Upper bound for every single API call.
    pub request_timeout: Duration,
    /// Pushes in flight at once within one bucket.
    pub max_concurrent_requests: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            request_timeout: Duration::from_secs(30),
            max_concurrent_requests: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushOutcome {
    Pushed,
    Deleted,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PullOutcome {
    Inserted,
    Updated,
    Unchanged,
    Conflict,
    Skipped,
}

/// Holds the single-flight flag for the duration of a cycle.
///
/// Dropping the guard releases the flag, so an error, a panic or a cancelled
/// future never locks out later cycles.
struct CycleGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> CycleGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Drives synchronization between a [`LocalCache`] and a [`RemoteApi`].
pub struct SyncEngine<A, C> {
    api: Arc<A>,
    cache: Arc<C>,
    resolver: ConflictResolver<A, C>,
    options: SyncOptions,
    in_progress: AtomicBool,
    last_sync_at: RwLock<Option<DateTime<Utc>>>,
    events: broadcast::Sender<SyncEvent>,
}

impl<A: RemoteApi, C: LocalCache> SyncEngine<A, C> {
    pub fn new(api: Arc<A>, cache: Arc<C>, options: SyncOptions) -> Self {
        let resolver = ConflictResolver::new(api.clone(), cache.clone())
            .with_request_timeout(options.request_timeout);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            api,
            cache,
            resolver,
            options,
            in_progress: AtomicBool::new(false),
            last_sync_at: RwLock::new(None),
            events,
        }
    }

    /// Adjusts the conflict resolver (strategies, decision surface, fallback).
    pub fn with_resolver(
        mut self,
        configure: impl FnOnce(ConflictResolver<A, C>) -> ConflictResolver<A, C>,
    ) -> Self {
        self.resolver = configure(self.resolver);
        self
    }

    /// Whether a full cycle is running right now.
    pub fn is_syncing(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Receives progress events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Completion time of the last fully successful cycle.
    pub async fn last_sync_at(&self) -> Result<Option<DateTime<Utc>>, SyncError> {
        if let Some(at) = *self.last_sync_at.read().await {
            return Ok(Some(at));
        }
        Ok(self.cache.last_sync_at().await?)
    }

    /// Runs one full cycle.
    ///
    /// Returns [`SyncOutcome::Skipped`] without touching anything when a cycle
    /// is already running. On error, work completed before the failure stays
    /// committed and `last_sync_at` is not updated.
    pub async fn sync_all(&self) -> Result<SyncOutcome, SyncError> {
        let Some(_guard) = CycleGuard::acquire(&self.in_progress) else {
            tracing::debug!("Sync already in progress, skipping");
            return Ok(SyncOutcome::Skipped);
        };

        tracing::info!("Starting sync cycle");
        self.emit(SyncEvent::CycleStarted);

        match self.run_cycle().await {
            Ok(report) => {
                let now = Utc::now();
                self.cache.set_last_sync_at(now).await?;
                *self.last_sync_at.write().await = Some(now);
                tracing::info!("Sync cycle complete: {}", report);
                self.emit(SyncEvent::CycleFinished(report.clone()));
                Ok(SyncOutcome::Completed(report))
            }
            Err(e) => {
                tracing::error!("Sync cycle failed: {}", e);
                self.emit(SyncEvent::CycleFailed(e.to_string()));
                Err(e)
            }
        }
    }

    pub async fn sync_heroes(&self) -> Result<SyncReport, SyncError> {
        self.sync_kind::<Hero>().await
    }

    pub async fn sync_stories(&self) -> Result<SyncReport, SyncError> {
        self.sync_kind::<Story>().await
    }

    pub async fn sync_custom_events(&self) -> Result<SyncReport, SyncError> {
        self.sync_kind::<CustomEvent>().await
    }

    /// Push-then-pull for a single kind.
    pub async fn sync_kind<T: Syncable>(&self) -> Result<SyncReport, SyncError> {
        let mut report = self.push::<T>().await?;
        report.merge(self.pull::<T>().await?);
        Ok(report)
    }

    /// Resolves every record in `conflict` with its kind's configured strategy.
    pub async fn resolve_conflicts(&self) -> Result<SyncReport, SyncError> {
        self.resolve_all(None).await
    }

    /// Resolves every record in `conflict` with `strategy`.
    pub async fn resolve_conflicts_with(
        &self,
        strategy: ResolutionStrategy,
    ) -> Result<SyncReport, SyncError> {
        self.resolve_all(Some(strategy)).await
    }

    async fn run_cycle(&self) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();

        report.merge(self.push::<Hero>().await?);
        report.merge(self.push::<Story>().await?);
        report.merge(self.push::<CustomEvent>().await?);

        report.merge(self.pull::<Hero>().await?);
        report.merge(self.pull::<Story>().await?);
        report.merge(self.pull::<CustomEvent>().await?);

        report.merge(self.resolve_conflicts().await?);
        Ok(report)
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // ------------------------------------------------------------------
    // Push
    // ------------------------------------------------------------------

    async fn push<T: Syncable>(&self) -> Result<SyncReport, SyncError> {
        // Failed records go back into the bucket of the operation that failed.
        let mut retry_creates = Vec::new();
        let mut retry_updates = Vec::new();
        let mut retry_deletes = Vec::new();
        for entity in self
            .cache
            .fetch_pending_sync::<T>(SyncStatus::Failed)
            .await?
        {
            if entity.meta().is_deleted() {
                retry_deletes.push(entity);
            } else if entity.server_id().is_some() {
                retry_updates.push(entity);
            } else {
                retry_creates.push(entity);
            }
        }

        let mut report = SyncReport::default();
        for (phase, status, retries) in [
            (SyncPhase::PushCreates, SyncStatus::PendingCreate, retry_creates),
            (SyncPhase::PushUpdates, SyncStatus::PendingUpdate, retry_updates),
            (SyncPhase::PushDeletes, SyncStatus::PendingDelete, retry_deletes),
        ] {
            let mut bucket = self.cache.fetch_pending_sync::<T>(status).await?;
            bucket.extend(retries);
            report.merge(self.push_bucket(phase, bucket).await?);
        }
        Ok(report)
    }

    async fn push_bucket<T: Syncable>(
        &self,
        phase: SyncPhase,
        entities: Vec<T>,
    ) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();
        if entities.is_empty() {
            return Ok(report);
        }

        tracing::info!(kind = %T::KIND, count = entities.len(), "Running {}", phase);
        self.emit(SyncEvent::PhaseStarted {
            phase,
            kind: T::KIND,
            count: entities.len(),
        });

        let outcomes: Vec<Result<PushOutcome, SyncError>> = stream::iter(entities)
            .map(|entity| self.push_one(phase, entity))
            .buffer_unordered(self.options.max_concurrent_requests.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome? {
                PushOutcome::Pushed => report.pushed += 1,
                PushOutcome::Deleted => report.deleted += 1,
                PushOutcome::Failed => report.push_failed += 1,
                PushOutcome::Skipped => report.skipped += 1,
            }
        }
        Ok(report)
    }

    async fn push_one<T: Syncable>(
        &self,
        phase: SyncPhase,
        mut entity: T,
    ) -> Result<PushOutcome, SyncError> {
        if phase == SyncPhase::PushDeletes {
            return self.push_delete(entity).await;
        }

        let parent_server_id = match parent_ref::<T, C>(&self.cache, &entity).await? {
            ParentRef::Unsynced => {
                tracing::debug!(
                    kind = %T::KIND,
                    local_id = %entity.local_id(),
                    "Parent not synced yet, postponing push"
                );
                return Ok(PushOutcome::Skipped);
            }
            parent => parent.server_id(),
        };

        let pushed = match entity.record_body(parent_server_id) {
            Ok(body) => match entity.server_id().map(str::to_string) {
                Some(server_id) if phase == SyncPhase::PushUpdates => {
                    self.call(self.api.update(T::KIND, &server_id, body)).await
                }
                _ => self.call(self.api.create(T::KIND, body)).await,
            },
            Err(e) => Err(e),
        };

        match pushed {
            Ok(record) => {
                entity
                    .meta_mut()
                    .mark_synced(record.id.clone(), record.updated_at, Utc::now());
                self.cache.save(&entity).await?;
                tracing::debug!(
                    kind = %T::KIND,
                    local_id = %entity.local_id(),
                    server_id = %record.id,
                    "Pushed"
                );
                Ok(PushOutcome::Pushed)
            }
            Err(e) => self.record_failure(entity, e).await,
        }
    }

    async fn push_delete<T: Syncable>(&self, entity: T) -> Result<PushOutcome, SyncError> {
        let deleted = match entity.server_id() {
            // Never reached the server; dropping it locally is enough.
            None => Ok(()),
            Some(server_id) => match self.call(self.api.delete(T::KIND, server_id)).await {
                Err(SyncError::Api(ApiError::NotFound(_))) => Ok(()),
                other => other,
            },
        };

        match deleted {
            Ok(()) => {
                self.cache.delete(&entity).await?;
                tracing::debug!(kind = %T::KIND, local_id = %entity.local_id(), "Deleted");
                Ok(PushOutcome::Deleted)
            }
            Err(e) => self.record_failure(entity, e).await,
        }
    }

    /// Records a per-record failure on the entity; fatal errors pass through.
    async fn record_failure<T: Syncable>(
        &self,
        mut entity: T,
        error: SyncError,
    ) -> Result<PushOutcome, SyncError> {
        if !error.is_record_level() {
            return Err(error);
        }

        tracing::warn!(
            kind = %T::KIND,
            local_id = %entity.local_id(),
            "Push failed: {}",
            error
        );
        entity.meta_mut().mark_failed(error.to_string());
        self.cache.save(&entity).await?;
        self.emit(SyncEvent::RecordFailed {
            kind: T::KIND,
            local_id: entity.local_id(),
            error: error.to_string(),
        });
        Ok(PushOutcome::Failed)
    }

    async fn call<R>(
        &self,
        request: impl std::future::Future<Output = Result<R, ApiError>>,
    ) -> Result<R, SyncError> {
        Ok(bounded(self.options.request_timeout, request).await?)
    }

    // ------------------------------------------------------------------
    // Pull
    // ------------------------------------------------------------------

    async fn pull<T: Syncable>(&self) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();
        let mut request = PageRequest::first(self.options.page_size);
        let mut seen = 0;

        loop {
            let page = self.call(self.api.list(T::KIND, request.clone())).await?;
            if seen == 0 {
                self.emit(SyncEvent::PhaseStarted {
                    phase: SyncPhase::Pull,
                    kind: T::KIND,
                    count: page.records.len(),
                });
            }
            seen += page.records.len();

            for record in &page.records {
                match self.pull_record::<T>(record).await {
                    Ok(PullOutcome::Inserted | PullOutcome::Updated) => report.pulled += 1,
                    Ok(PullOutcome::Conflict) => report.conflicts += 1,
                    Ok(PullOutcome::Unchanged | PullOutcome::Skipped) => {}
                    Err(e) if e.is_record_level() => {
                        tracing::warn!(
                            kind = %T::KIND,
                            server_id = %record.id,
                            "Pull failed: {}",
                            e
                        );
                        report.pull_failed += 1;
                    }
                    Err(e) => return Err(e),
                }
            }

            match page.next_cursor {
                Some(cursor) if !page.records.is_empty() => request.cursor = Some(cursor),
                _ => break,
            }
        }

        tracing::info!(
            kind = %T::KIND,
            records = seen,
            pulled = report.pulled,
            conflicts = report.conflicts,
            "Pull complete"
        );
        Ok(report)
    }

    async fn pull_record<T: Syncable>(&self, record: &RemoteRecord) -> Result<PullOutcome, SyncError> {
        let parent = parent_local_id::<T, C>(&self.cache, record).await?;

        let Some(local) = self.cache.fetch::<T>(&record.id).await? else {
            if T::PARENT.is_some() && parent.is_none() {
                tracing::debug!(
                    kind = %T::KIND,
                    server_id = %record.id,
                    "Parent unknown locally, skipping record"
                );
                return Ok(PullOutcome::Skipped);
            }
            let entity = T::from_remote(record, parent)?;
            if !self.cache.insert_new(&entity).await? {
                // A concurrent pull stored this record first.
                tracing::debug!(kind = %T::KIND, server_id = %record.id, "Already pulled");
                return Ok(PullOutcome::Unchanged);
            }
            return Ok(PullOutcome::Inserted);
        };

        if local.needs_sync() {
            return self.flag_conflict(local, record).await;
        }
        if local.meta().server_updated_at == Some(record.updated_at) {
            return Ok(PullOutcome::Unchanged);
        }

        // A local edit may have landed since the read above.
        let mut current = match self.cache.fetch_local::<T>(local.local_id()).await? {
            Some(current) if current.needs_sync() => {
                return self.flag_conflict(current, record).await;
            }
            Some(current) => current,
            None => local,
        };

        current.apply_remote(record, parent)?;
        current
            .meta_mut()
            .mark_synced(record.id.clone(), record.updated_at, Utc::now());
        self.cache.save(&current).await?;
        Ok(PullOutcome::Updated)
    }

    /// Marks a locally changed entity as conflicting if the server moved on.
    async fn flag_conflict<T: Syncable>(
        &self,
        mut local: T,
        record: &RemoteRecord,
    ) -> Result<PullOutcome, SyncError> {
        if local.meta().server_updated_at == Some(record.updated_at) {
            return Ok(PullOutcome::Unchanged);
        }
        if local.meta().status == SyncStatus::Conflict {
            return Ok(PullOutcome::Unchanged);
        }

        local.meta_mut().mark_conflict();
        self.cache.save(&local).await?;
        tracing::info!(
            kind = %T::KIND,
            local_id = %local.local_id(),
            server_id = %record.id,
            "Conflict detected"
        );
        self.emit(SyncEvent::ConflictDetected {
            kind: T::KIND,
            local_id: local.local_id(),
        });
        Ok(PullOutcome::Conflict)
    }

    // ------------------------------------------------------------------
    // Resolve
    // ------------------------------------------------------------------

    async fn resolve_all(
        &self,
        strategy: Option<ResolutionStrategy>,
    ) -> Result<SyncReport, SyncError> {
        let mut report = self.resolve_kind::<Hero>(strategy).await?;
        report.merge(self.resolve_kind::<Story>(strategy).await?);
        report.merge(self.resolve_kind::<CustomEvent>(strategy).await?);
        Ok(report)
    }

    async fn resolve_kind<T: Syncable>(
        &self,
        strategy: Option<ResolutionStrategy>,
    ) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();
        let conflicts = self
            .cache
            .fetch_pending_sync::<T>(SyncStatus::Conflict)
            .await?;
        if conflicts.is_empty() {
            return Ok(report);
        }

        self.emit(SyncEvent::PhaseStarted {
            phase: SyncPhase::ResolveConflicts,
            kind: T::KIND,
            count: conflicts.len(),
        });

        for mut local in conflicts {
            let resolved = match local.server_id() {
                Some(server_id) => match self.call(self.api.get(T::KIND, server_id)).await {
                    Ok(record) => self.resolver.resolve(&local, &record, strategy).await.map(|_| ()),
                    Err(e) => Err(e),
                },
                None => Err(SyncError::NotSynced {
                    kind: T::KIND,
                    local_id: local.local_id(),
                }),
            };

            match resolved {
                Ok(()) => report.resolved += 1,
                Err(e) if e.is_record_level() => {
                    tracing::warn!(
                        kind = %T::KIND,
                        local_id = %local.local_id(),
                        "Conflict left unresolved: {}",
                        e
                    );
                    local.meta_mut().sync_error = Some(e.to_string());
                    self.cache.save(&local).await?;
                    self.emit(SyncEvent::RecordFailed {
                        kind: T::KIND,
                        local_id: local.local_id(),
                        error: e.to_string(),
                    });
                    report.unresolved += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }
}
