//! Conflict resolution between a local entity and its server representation.
//!
//! A resolution either persists the reconciled entity exactly once and
//! returns it in `synced` status, or returns an error and leaves the cached
//! entity untouched.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::api::{bounded, Fields, RemoteApi, RemoteRecord};
use super::cache::LocalCache;
use super::error::{ApiError, SyncError};
use super::kind::{ContentOrigin, EntityKind};
use super::syncable::{parent_local_id, parent_ref, Syncable};

/// How a conflict between local and server data is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionStrategy {
    /// Overwrite local fields from the server payload.
    ServerWins,
    /// Push local fields to the server as an update.
    LocalWins,
    /// Ask a [`DecisionSurface`] which of the other strategies to apply.
    UserPrompt,
    /// Field-level merge. Not implemented for any kind yet; degrades to `ServerWins`.
    Merge,
}

impl ResolutionStrategy {
    /// Default strategy for a kind, derived from who produces its content.
    pub fn default_for(kind: EntityKind) -> Self {
        match kind.content_origin() {
            ContentOrigin::Regenerated => ResolutionStrategy::ServerWins,
            ContentOrigin::UserAuthored => ResolutionStrategy::LocalWins,
            ContentOrigin::Mixed => ResolutionStrategy::UserPrompt,
        }
    }

    /// Like [`default_for`](Self::default_for) for a kind given by name.
    /// Unrecognized kinds get `ServerWins`.
    pub fn default_for_name(kind: &str) -> Self {
        kind.parse::<EntityKind>()
            .map(Self::default_for)
            .unwrap_or(ResolutionStrategy::ServerWins)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::ServerWins => "serverWins",
            ResolutionStrategy::LocalWins => "localWins",
            ResolutionStrategy::UserPrompt => "userPrompt",
            ResolutionStrategy::Merge => "merge",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "serverwins" | "server" => Ok(ResolutionStrategy::ServerWins),
            "localwins" | "local" => Ok(ResolutionStrategy::LocalWins),
            "userprompt" | "prompt" => Ok(ResolutionStrategy::UserPrompt),
            "merge" => Ok(ResolutionStrategy::Merge),
            _ => Err(format!(
                "Invalid strategy '{}'. Valid options: serverWins, localWins, userPrompt, merge",
                s
            )),
        }
    }
}

/// What `UserPrompt` does when nobody answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PromptFallback {
    /// Apply `ServerWins`. Local edits to the record are discarded.
    #[default]
    ServerWins,
    /// Raise [`SyncError::NoDecision`] and keep the record in conflict.
    Fail,
}

impl FromStr for PromptFallback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "serverwins" => Ok(PromptFallback::ServerWins),
            "fail" => Ok(PromptFallback::Fail),
            _ => Err(format!(
                "Invalid prompt fallback '{}'. Valid options: serverWins, fail",
                s
            )),
        }
    }
}

/// Both sides of a conflict, as shown to whoever decides it.
#[derive(Debug, Clone)]
pub struct ConflictSummary {
    pub kind: EntityKind,
    pub local_id: Uuid,
    pub server_id: String,
    pub local_fields: Fields,
    pub server_fields: Fields,
    /// Server version the local edits were based on.
    pub base_updated_at: Option<DateTime<Utc>>,
    pub server_updated_at: DateTime<Utc>,
}

/// External decision maker for `UserPrompt` (a UI dialog, a terminal prompt).
#[async_trait]
pub trait DecisionSurface: Send + Sync {
    /// Returns the strategy to apply, or `None` to decline.
    async fn decide(&self, conflict: &ConflictSummary) -> Option<ResolutionStrategy>;
}

/// Per-kind strategy overrides on top of [`ResolutionStrategy::default_for`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyTable {
    overrides: HashMap<EntityKind, ResolutionStrategy>,
}

impl StrategyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from kind names; unknown names are skipped with a warning.
    pub fn from_names(names: &HashMap<String, ResolutionStrategy>) -> Self {
        let mut table = Self::new();
        for (name, strategy) in names {
            match name.parse::<EntityKind>() {
                Ok(kind) => {
                    table.overrides.insert(kind, *strategy);
                }
                Err(_) => {
                    tracing::warn!("Ignoring strategy override for unknown kind '{}'", name)
                }
            }
        }
        table
    }

    pub fn with(mut self, kind: EntityKind, strategy: ResolutionStrategy) -> Self {
        self.overrides.insert(kind, strategy);
        self
    }

    pub fn strategy_for(&self, kind: EntityKind) -> ResolutionStrategy {
        self.overrides
            .get(&kind)
            .copied()
            .unwrap_or_else(|| ResolutionStrategy::default_for(kind))
    }
}

/// The strategy that actually gets applied once prompts and placeholders are settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Winner {
    Server,
    Local,
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Winner::Server => write!(f, "serverWins"),
            Winner::Local => write!(f, "localWins"),
        }
    }
}

/// Settles conflicts for every syncable kind and persists the outcome.
pub struct ConflictResolver<A, C> {
    api: Arc<A>,
    cache: Arc<C>,
    surface: Option<Arc<dyn DecisionSurface>>,
    fallback: PromptFallback,
    strategies: StrategyTable,
    request_timeout: Duration,
}

impl<A: RemoteApi, C: LocalCache> ConflictResolver<A, C> {
    pub fn new(api: Arc<A>, cache: Arc<C>) -> Self {
        Self {
            api,
            cache,
            surface: None,
            fallback: PromptFallback::default(),
            strategies: StrategyTable::default(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_decision_surface(mut self, surface: Arc<dyn DecisionSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn with_fallback(mut self, fallback: PromptFallback) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_strategies(mut self, strategies: StrategyTable) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Strategy used for `kind` when the caller does not pass one.
    pub fn strategy_for(&self, kind: EntityKind) -> ResolutionStrategy {
        self.strategies.strategy_for(kind)
    }

    /// Reconciles `local` with `server` and persists the result.
    ///
    /// `strategy` overrides the kind's configured default. On error nothing
    /// is written and the cached entity keeps its current status.
    pub async fn resolve<T: Syncable>(
        &self,
        local: &T,
        server: &RemoteRecord,
        strategy: Option<ResolutionStrategy>,
    ) -> Result<T, SyncError> {
        let requested = strategy.unwrap_or_else(|| self.strategy_for(T::KIND));
        let winner = self.settle(local, server, requested).await?;

        let resolved = match winner {
            Winner::Server => self.server_wins(local, server).await?,
            Winner::Local => self.local_wins(local).await?,
        };

        tracing::info!(
            kind = %T::KIND,
            local_id = %local.local_id(),
            server_id = %server.id,
            requested = %requested,
            applied = %winner,
            "Resolved conflict"
        );
        Ok(resolved)
    }

    async fn settle<T: Syncable>(
        &self,
        local: &T,
        server: &RemoteRecord,
        requested: ResolutionStrategy,
    ) -> Result<Winner, SyncError> {
        match requested {
            ResolutionStrategy::ServerWins => Ok(Winner::Server),
            ResolutionStrategy::LocalWins => Ok(Winner::Local),
            ResolutionStrategy::Merge => Ok(merge_placeholder(local)),
            ResolutionStrategy::UserPrompt => {
                let decision = match &self.surface {
                    Some(surface) => surface.decide(&summarize(local, server)?).await,
                    None => None,
                };
                match decision {
                    Some(ResolutionStrategy::ServerWins) => Ok(Winner::Server),
                    Some(ResolutionStrategy::LocalWins) => Ok(Winner::Local),
                    Some(ResolutionStrategy::Merge) => Ok(merge_placeholder(local)),
                    Some(ResolutionStrategy::UserPrompt) | None => self.fall_back(local),
                }
            }
        }
    }

    fn fall_back<T: Syncable>(&self, local: &T) -> Result<Winner, SyncError> {
        match self.fallback {
            PromptFallback::ServerWins => {
                tracing::warn!(
                    kind = %T::KIND,
                    local_id = %local.local_id(),
                    "No conflict decision available; falling back to serverWins"
                );
                Ok(Winner::Server)
            }
            PromptFallback::Fail => Err(SyncError::NoDecision {
                kind: T::KIND,
                local_id: local.local_id(),
            }),
        }
    }

    async fn server_wins<T: Syncable>(&self, local: &T, server: &RemoteRecord) -> Result<T, SyncError> {
        let parent = parent_local_id::<T, C>(&self.cache, server).await?;
        let mut entity = local.clone();
        entity.apply_remote(server, parent)?;

        let meta = entity.meta_mut();
        // The server still has the record, so a local delete is undone.
        meta.deleted_at = None;
        meta.mark_synced(server.id.clone(), server.updated_at, Utc::now());

        self.cache.save(&entity).await?;
        Ok(entity)
    }

    async fn local_wins<T: Syncable>(&self, local: &T) -> Result<T, SyncError> {
        let server_id = local
            .server_id()
            .ok_or(SyncError::NotSynced {
                kind: T::KIND,
                local_id: local.local_id(),
            })?
            .to_string();
        let mut entity = local.clone();

        if entity.meta().is_deleted() {
            match bounded(self.request_timeout, self.api.delete(T::KIND, &server_id)).await {
                Ok(()) | Err(ApiError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
            entity
                .meta_mut()
                .mark_synced(server_id, Utc::now(), Utc::now());
            self.cache.delete(&entity).await?;
            return Ok(entity);
        }

        let parent = parent_ref::<T, C>(&self.cache, &entity).await?;
        let body = entity.record_body(parent.server_id())?;
        let record = bounded(
            self.request_timeout,
            self.api.update(T::KIND, &server_id, body),
        )
        .await?;

        entity
            .meta_mut()
            .mark_synced(record.id, record.updated_at, Utc::now());
        self.cache.save(&entity).await?;
        Ok(entity)
    }
}

/// Field-level merge is unsafe for free-text content; keep the server version.
fn merge_placeholder<T: Syncable>(local: &T) -> Winner {
    tracing::warn!(
        kind = %T::KIND,
        local_id = %local.local_id(),
        "Merge is not supported for this kind; keeping the server version"
    );
    Winner::Server
}

fn summarize<T: Syncable>(local: &T, server: &RemoteRecord) -> Result<ConflictSummary, SyncError> {
    Ok(ConflictSummary {
        kind: T::KIND,
        local_id: local.local_id(),
        server_id: server.id.clone(),
        local_fields: local.remote_fields()?,
        server_fields: server.fields.clone(),
        base_updated_at: local.meta().server_updated_at,
        server_updated_at: server.updated_at,
    })
}
