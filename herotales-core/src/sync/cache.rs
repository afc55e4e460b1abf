//! Local cache contract and an in-memory implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::error::CacheError;
use super::kind::EntityKind;
use super::status::SyncStatus;
use super::syncable::Syncable;

/// Local persistence used by the sync core.
///
/// `save` must be visible to the next read issued after it returns; the
/// engine relies on that between phases.
#[async_trait]
pub trait LocalCache: Send + Sync {
    /// Inserts or replaces an entity, keyed by kind and local id.
    async fn save<T: Syncable>(&self, entity: &T) -> Result<(), CacheError>;

    /// Stores an entity unless one of the same kind already carries its
    /// server id. Returns whether it was stored; the check and the write are
    /// a single step.
    async fn insert_new<T: Syncable>(&self, entity: &T) -> Result<bool, CacheError>;

    async fn delete<T: Syncable>(&self, entity: &T) -> Result<(), CacheError>;

    /// Looks an entity up by its server id.
    async fn fetch<T: Syncable>(&self, server_id: &str) -> Result<Option<T>, CacheError>;

    async fn fetch_local<T: Syncable>(&self, local_id: Uuid) -> Result<Option<T>, CacheError>;

    /// Every entity of kind `T` in `status`, unpaginated.
    async fn fetch_pending_sync<T: Syncable>(
        &self,
        status: SyncStatus,
    ) -> Result<Vec<T>, CacheError>;

    async fn list<T: Syncable>(&self) -> Result<Vec<T>, CacheError>;

    async fn server_id_for(
        &self,
        kind: EntityKind,
        local_id: Uuid,
    ) -> Result<Option<String>, CacheError>;

    async fn local_id_for(
        &self,
        kind: EntityKind,
        server_id: &str,
    ) -> Result<Option<Uuid>, CacheError>;

    async fn set_last_sync_at(&self, at: DateTime<Utc>) -> Result<(), CacheError>;

    async fn last_sync_at(&self) -> Result<Option<DateTime<Utc>>, CacheError>;
}

#[derive(Debug, Clone)]
struct StoredEntity {
    server_id: Option<String>,
    status: SyncStatus,
    body: Value,
}

/// Process-local cache holding entities as JSON.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entities: RwLock<BTreeMap<(EntityKind, Uuid), StoredEntity>>,
    last_sync_at: RwLock<Option<DateTime<Utc>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entities of every kind.
    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }

    async fn collect<T: Syncable>(
        &self,
        filter: impl Fn(&StoredEntity) -> bool + Send,
    ) -> Result<Vec<T>, CacheError> {
        let entities = self.entities.read().await;
        entities
            .iter()
            .filter(|((kind, _), stored)| *kind == T::KIND && filter(stored))
            .map(|(_, stored)| Ok(serde_json::from_value(stored.body.clone())?))
            .collect()
    }
}

#[async_trait]
impl LocalCache for MemoryCache {
    async fn save<T: Syncable>(&self, entity: &T) -> Result<(), CacheError> {
        let stored = StoredEntity {
            server_id: entity.server_id().map(str::to_string),
            status: entity.meta().status,
            body: serde_json::to_value(entity)?,
        };
        self.entities
            .write()
            .await
            .insert((T::KIND, entity.local_id()), stored);
        Ok(())
    }

    async fn insert_new<T: Syncable>(&self, entity: &T) -> Result<bool, CacheError> {
        let stored = StoredEntity {
            server_id: entity.server_id().map(str::to_string),
            status: entity.meta().status,
            body: serde_json::to_value(entity)?,
        };

        let mut entities = self.entities.write().await;
        let key = (T::KIND, entity.local_id());
        let taken = entities.contains_key(&key)
            || (stored.server_id.is_some()
                && entities
                    .iter()
                    .any(|((kind, _), other)| *kind == T::KIND && other.server_id == stored.server_id));
        if taken {
            return Ok(false);
        }
        entities.insert(key, stored);
        Ok(true)
    }

    async fn delete<T: Syncable>(&self, entity: &T) -> Result<(), CacheError> {
        self.entities
            .write()
            .await
            .remove(&(T::KIND, entity.local_id()));
        Ok(())
    }

    async fn fetch<T: Syncable>(&self, server_id: &str) -> Result<Option<T>, CacheError> {
        let found = self
            .collect::<T>(|stored| stored.server_id.as_deref() == Some(server_id))
            .await?;
        Ok(found.into_iter().next())
    }

    async fn fetch_local<T: Syncable>(&self, local_id: Uuid) -> Result<Option<T>, CacheError> {
        let entities = self.entities.read().await;
        match entities.get(&(T::KIND, local_id)) {
            Some(stored) => Ok(Some(serde_json::from_value(stored.body.clone())?)),
            None => Ok(None),
        }
    }

    async fn fetch_pending_sync<T: Syncable>(
        &self,
        status: SyncStatus,
    ) -> Result<Vec<T>, CacheError> {
        self.collect::<T>(|stored| stored.status == status).await
    }

    async fn list<T: Syncable>(&self) -> Result<Vec<T>, CacheError> {
        self.collect::<T>(|_| true).await
    }

    async fn server_id_for(
        &self,
        kind: EntityKind,
        local_id: Uuid,
    ) -> Result<Option<String>, CacheError> {
        let entities = self.entities.read().await;
        Ok(entities
            .get(&(kind, local_id))
            .and_then(|stored| stored.server_id.clone()))
    }

    async fn local_id_for(
        &self,
        kind: EntityKind,
        server_id: &str,
    ) -> Result<Option<Uuid>, CacheError> {
        let entities = self.entities.read().await;
        Ok(entities
            .iter()
            .find(|((k, _), stored)| *k == kind && stored.server_id.as_deref() == Some(server_id))
            .map(|((_, local_id), _)| *local_id))
    }

    async fn set_last_sync_at(&self, at: DateTime<Utc>) -> Result<(), CacheError> {
        *self.last_sync_at.write().await = Some(at);
        Ok(())
    }

    async fn last_sync_at(&self) -> Result<Option<DateTime<Utc>>, CacheError> {
        Ok(*self.last_sync_at.read().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Hero, Story};

    #[tokio::test]
    async fn test_save_and_fetch_local() {
        let cache = MemoryCache::new();
        let hero = Hero::new("Luna");
        cache.save(&hero).await.unwrap();

        let fetched: Hero = cache.fetch_local(hero.id).await.unwrap().unwrap();
        assert_eq!(fetched, hero);
        assert!(cache.fetch_local::<Story>(hero.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_by_server_id() {
        let cache = MemoryCache::new();
        let now = Utc::now();
        let mut hero = Hero::new("Luna");
        hero.sync.mark_synced("srv-1", now, now);
        cache.save(&hero).await.unwrap();

        let fetched: Hero = cache.fetch("srv-1").await.unwrap().unwrap();
        assert_eq!(fetched.id, hero.id);
        assert!(cache.fetch::<Hero>("srv-2").await.unwrap().is_none());
        assert_eq!(
            cache.local_id_for(EntityKind::Hero, "srv-1").await.unwrap(),
            Some(hero.id)
        );
        assert_eq!(
            cache.server_id_for(EntityKind::Hero, hero.id).await.unwrap(),
            Some("srv-1".to_string())
        );
    }

    #[tokio::test]
    async fn test_fetch_pending_sync_filters_kind_and_status() {
        let cache = MemoryCache::new();
        let now = Utc::now();

        let pending = Hero::new("Pending");
        let mut synced = Hero::new("Synced");
        synced.sync.mark_synced("srv-1", now, now);
        let story = Story::new(pending.id, "A story");

        cache.save(&pending).await.unwrap();
        cache.save(&synced).await.unwrap();
        cache.save(&story).await.unwrap();

        let heroes: Vec<Hero> = cache
            .fetch_pending_sync(SyncStatus::PendingCreate)
            .await
            .unwrap();
        assert_eq!(heroes.len(), 1);
        assert_eq!(heroes[0].name, "Pending");

        let all: Vec<Hero> = cache.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(cache.len().await, 3);
    }

    #[tokio::test]
    async fn test_save_replaces_and_delete_removes() {
        let cache = MemoryCache::new();
        let mut hero = Hero::new("Luna");
        cache.save(&hero).await.unwrap();

        hero.name = "Luna II".to_string();
        cache.save(&hero).await.unwrap();
        assert_eq!(cache.len().await, 1);

        cache.delete(&hero).await.unwrap();
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_insert_new_keeps_one_entity_per_server_id() {
        let cache = MemoryCache::new();
        let now = Utc::now();
        let mut first = Hero::new("Luna");
        first.sync.mark_synced("srv-1", now, now);
        let mut second = Hero::new("Luna again");
        second.sync.mark_synced("srv-1", now, now);

        assert!(cache.insert_new(&first).await.unwrap());
        assert!(!cache.insert_new(&second).await.unwrap());
        assert!(!cache.insert_new(&first).await.unwrap());

        let heroes: Vec<Hero> = cache.list().await.unwrap();
        assert_eq!(heroes.len(), 1);
        assert_eq!(heroes[0].id, first.id);

        // Same server id under another kind is a different record.
        let mut story = Story::new(first.id, "Tale");
        story.sync.mark_synced("srv-1", now, now);
        assert!(cache.insert_new(&story).await.unwrap());
    }

    #[tokio::test]
    async fn test_last_sync_at() {
        let cache = MemoryCache::new();
        assert!(cache.last_sync_at().await.unwrap().is_none());

        let now = Utc::now();
        cache.set_last_sync_at(now).await.unwrap();
        assert_eq!(cache.last_sync_at().await.unwrap(), Some(now));
    }
}
