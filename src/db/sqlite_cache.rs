use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use herotales_core::sync::{CacheError, EntityKind, LocalCache, SyncStatus, Syncable};
use sqlx::SqlitePool;
use uuid::Uuid;

const LAST_SYNC_AT: &str = "last_sync_at";

/// Local cache stored in the `entities` table, one JSON body per entity.
#[derive(Clone)]
pub struct SqliteCache {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct BodyRow {
    body: String,
}

#[derive(sqlx::FromRow)]
struct StatusCountRow {
    kind: String,
    sync_status: String,
    count: i64,
}

fn storage(e: sqlx::Error) -> CacheError {
    CacheError::Storage(e.to_string())
}

fn decode<T: Syncable>(rows: Vec<BodyRow>) -> Result<Vec<T>, CacheError> {
    rows.into_iter()
        .map(|row| serde_json::from_str(&row.body).map_err(CacheError::from))
        .collect()
}

impl SqliteCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of cached entities per kind and sync status.
    pub async fn status_counts(&self) -> Result<Vec<(EntityKind, SyncStatus, i64)>, CacheError> {
        let rows: Vec<StatusCountRow> = sqlx::query_as(
            r#"
            SELECT kind, sync_status, COUNT(*) AS count
            FROM entities
            GROUP BY kind, sync_status
            ORDER BY kind, sync_status
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.into_iter()
            .map(|row| {
                let kind = row.kind.parse().map_err(CacheError::Storage)?;
                let status = row.sync_status.parse().map_err(CacheError::Storage)?;
                Ok((kind, status, row.count))
            })
            .collect()
    }
}

#[async_trait]
impl LocalCache for SqliteCache {
    async fn save<T: Syncable>(&self, entity: &T) -> Result<(), CacheError> {
        let body = serde_json::to_string(entity)?;

        sqlx::query(
            r#"
            INSERT INTO entities (kind, local_id, server_id, sync_status, body, stored_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (kind, local_id) DO UPDATE SET
                server_id = excluded.server_id,
                sync_status = excluded.sync_status,
                body = excluded.body,
                stored_at = excluded.stored_at
            "#,
        )
        .bind(T::KIND.as_str())
        .bind(entity.local_id().to_string())
        .bind(entity.server_id())
        .bind(entity.meta().status.as_str())
        .bind(&body)
        .bind(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(())
    }

    async fn insert_new<T: Syncable>(&self, entity: &T) -> Result<bool, CacheError> {
        let body = serde_json::to_string(entity)?;

        // Conflicts on the primary key or the (kind, server_id) index both skip.
        let result = sqlx::query(
            r#"
            INSERT INTO entities (kind, local_id, server_id, sync_status, body, stored_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(T::KIND.as_str())
        .bind(entity.local_id().to_string())
        .bind(entity.server_id())
        .bind(entity.meta().status.as_str())
        .bind(&body)
        .bind(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete<T: Syncable>(&self, entity: &T) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM entities WHERE kind = ? AND local_id = ?")
            .bind(T::KIND.as_str())
            .bind(entity.local_id().to_string())
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn fetch<T: Syncable>(&self, server_id: &str) -> Result<Option<T>, CacheError> {
        let row: Option<BodyRow> =
            sqlx::query_as("SELECT body FROM entities WHERE kind = ? AND server_id = ?")
                .bind(T::KIND.as_str())
                .bind(server_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;

        match row {
            Some(row) => Ok(Some(serde_json::from_str(&row.body)?)),
            None => Ok(None),
        }
    }

    async fn fetch_local<T: Syncable>(&self, local_id: Uuid) -> Result<Option<T>, CacheError> {
        let row: Option<BodyRow> =
            sqlx::query_as("SELECT body FROM entities WHERE kind = ? AND local_id = ?")
                .bind(T::KIND.as_str())
                .bind(local_id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;

        match row {
            Some(row) => Ok(Some(serde_json::from_str(&row.body)?)),
            None => Ok(None),
        }
    }

    async fn fetch_pending_sync<T: Syncable>(
        &self,
        status: SyncStatus,
    ) -> Result<Vec<T>, CacheError> {
        let rows: Vec<BodyRow> = sqlx::query_as(
            "SELECT body FROM entities WHERE kind = ? AND sync_status = ? ORDER BY stored_at",
        )
        .bind(T::KIND.as_str())
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        decode(rows)
    }

    async fn list<T: Syncable>(&self) -> Result<Vec<T>, CacheError> {
        let rows: Vec<BodyRow> =
            sqlx::query_as("SELECT body FROM entities WHERE kind = ? ORDER BY stored_at")
                .bind(T::KIND.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(storage)?;

        decode(rows)
    }

    async fn server_id_for(
        &self,
        kind: EntityKind,
        local_id: Uuid,
    ) -> Result<Option<String>, CacheError> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT server_id FROM entities WHERE kind = ? AND local_id = ?")
                .bind(kind.as_str())
                .bind(local_id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;

        Ok(row.and_then(|(server_id,)| server_id))
    }

    async fn local_id_for(
        &self,
        kind: EntityKind,
        server_id: &str,
    ) -> Result<Option<Uuid>, CacheError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT local_id FROM entities WHERE kind = ? AND server_id = ?")
                .bind(kind.as_str())
                .bind(server_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;

        match row {
            Some((local_id,)) => Uuid::parse_str(&local_id)
                .map(Some)
                .map_err(|e| CacheError::Storage(format!("Invalid local id '{}': {}", local_id, e))),
            None => Ok(None),
        }
    }

    async fn set_last_sync_at(&self, at: DateTime<Utc>) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (key, value) VALUES (?, ?)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(LAST_SYNC_AT)
        .bind(at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn last_sync_at(&self) -> Result<Option<DateTime<Utc>>, CacheError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM sync_state WHERE key = ?")
            .bind(LAST_SYNC_AT)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;

        match row {
            Some((value,)) => DateTime::parse_from_rfc3339(&value)
                .map(|at| Some(at.with_timezone(&Utc)))
                .map_err(|e| CacheError::Storage(format!("Invalid {}: {}", LAST_SYNC_AT, e))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use herotales_core::sync::{
        ApiError, Page, PageRequest, RecordBody, RemoteApi, RemoteRecord, SyncEngine, SyncOptions,
        SyncOutcome,
    };
    use herotales_core::{Hero, Story};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct TestContext {
        cache: SqliteCache,
        _temp_dir: TempDir,
    }

    async fn setup() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        TestContext {
            cache: SqliteCache::new(pool),
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_save_and_fetch_local() {
        let ctx = setup().await;
        let hero = Hero::new("Luna").with_age(7);

        ctx.cache.save(&hero).await.unwrap();

        let fetched: Hero = ctx.cache.fetch_local(hero.id).await.unwrap().unwrap();
        assert_eq!(fetched, hero);
        assert!(ctx.cache.fetch_local::<Story>(hero.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_upserts() {
        let ctx = setup().await;
        let mut hero = Hero::new("Luna");
        ctx.cache.save(&hero).await.unwrap();

        let now = Utc::now();
        hero.sync.mark_synced("srv-1", now, now);
        hero.name = "Luna Prime".to_string();
        ctx.cache.save(&hero).await.unwrap();

        let heroes: Vec<Hero> = ctx.cache.list().await.unwrap();
        assert_eq!(heroes.len(), 1);
        assert_eq!(heroes[0].name, "Luna Prime");
        let by_server: Hero = ctx.cache.fetch("srv-1").await.unwrap().unwrap();
        assert_eq!(by_server.id, hero.id);
    }

    #[tokio::test]
    async fn test_fetch_pending_sync_by_status() {
        let ctx = setup().await;
        let now = Utc::now();
        let pending = Hero::new("Pending");
        let mut synced = Hero::new("Synced");
        synced.sync.mark_synced("srv-2", now, now);
        let story = Story::new(pending.id, "Not a hero");
        ctx.cache.save(&pending).await.unwrap();
        ctx.cache.save(&synced).await.unwrap();
        ctx.cache.save(&story).await.unwrap();

        let found: Vec<Hero> = ctx
            .cache
            .fetch_pending_sync(SyncStatus::PendingCreate)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, pending.id);

        let counts = ctx.cache.status_counts().await.unwrap();
        assert!(counts.contains(&(EntityKind::Hero, SyncStatus::Synced, 1)));
        assert!(counts.contains(&(EntityKind::Story, SyncStatus::PendingCreate, 1)));
    }

    #[tokio::test]
    async fn test_id_mapping() {
        let ctx = setup().await;
        let now = Utc::now();
        let mut hero = Hero::new("Luna");
        ctx.cache.save(&hero).await.unwrap();
        assert_eq!(
            ctx.cache.server_id_for(EntityKind::Hero, hero.id).await.unwrap(),
            None
        );

        hero.sync.mark_synced("srv-9", now, now);
        ctx.cache.save(&hero).await.unwrap();

        assert_eq!(
            ctx.cache
                .server_id_for(EntityKind::Hero, hero.id)
                .await
                .unwrap()
                .as_deref(),
            Some("srv-9")
        );
        assert_eq!(
            ctx.cache.local_id_for(EntityKind::Hero, "srv-9").await.unwrap(),
            Some(hero.id)
        );
        assert_eq!(
            ctx.cache.local_id_for(EntityKind::Story, "srv-9").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_insert_new_skips_taken_server_id() {
        let ctx = setup().await;
        let now = Utc::now();
        let mut first = Hero::new("Luna");
        first.sync.mark_synced("srv-1", now, now);
        let mut second = Hero::new("Luna again");
        second.sync.mark_synced("srv-1", now, now);

        assert!(ctx.cache.insert_new(&first).await.unwrap());
        assert!(!ctx.cache.insert_new(&second).await.unwrap());

        let heroes: Vec<Hero> = ctx.cache.list().await.unwrap();
        assert_eq!(heroes.len(), 1);
        assert_eq!(heroes[0].name, "Luna");
    }

    #[tokio::test]
    async fn test_delete() {
        let ctx = setup().await;
        let hero = Hero::new("Luna");
        ctx.cache.save(&hero).await.unwrap();

        ctx.cache.delete(&hero).await.unwrap();

        assert!(ctx.cache.fetch_local::<Hero>(hero.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_last_sync_at_round_trips() {
        let ctx = setup().await;
        assert!(ctx.cache.last_sync_at().await.unwrap().is_none());

        let at = DateTime::parse_from_rfc3339("2025-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        ctx.cache.set_last_sync_at(at).await.unwrap();
        ctx.cache.set_last_sync_at(at).await.unwrap();

        assert_eq!(ctx.cache.last_sync_at().await.unwrap(), Some(at));
    }

    /// Accepts every write and serves nothing back.
    #[derive(Default)]
    struct AcceptingApi {
        created: tokio::sync::Mutex<Vec<(EntityKind, RecordBody)>>,
    }

    #[async_trait]
    impl RemoteApi for AcceptingApi {
        async fn create(
            &self,
            kind: EntityKind,
            body: RecordBody,
        ) -> Result<RemoteRecord, ApiError> {
            let mut created = self.created.lock().await;
            created.push((kind, body.clone()));
            Ok(RemoteRecord {
                id: format!("srv-{}", created.len()),
                updated_at: Utc::now(),
                parent_id: body.parent_id,
                fields: body.fields,
            })
        }

        async fn update(
            &self,
            _kind: EntityKind,
            server_id: &str,
            _body: RecordBody,
        ) -> Result<RemoteRecord, ApiError> {
            Err(ApiError::NotFound(server_id.to_string()))
        }

        async fn delete(&self, _kind: EntityKind, _server_id: &str) -> Result<(), ApiError> {
            Ok(())
        }

        async fn get(&self, _kind: EntityKind, server_id: &str) -> Result<RemoteRecord, ApiError> {
            Err(ApiError::NotFound(server_id.to_string()))
        }

        async fn list(&self, _kind: EntityKind, _page: PageRequest) -> Result<Page, ApiError> {
            Ok(Page {
                records: Vec::new(),
                next_cursor: None,
            })
        }
    }

    #[tokio::test]
    async fn test_engine_cycle_over_sqlite() {
        let ctx = setup().await;
        let cache = Arc::new(ctx.cache.clone());
        let api = Arc::new(AcceptingApi::default());
        let hero = Hero::new("Luna");
        let story = Story::new(hero.id, "The Dragon");
        cache.save(&story).await.unwrap();
        cache.save(&hero).await.unwrap();

        let engine = SyncEngine::new(api.clone(), cache.clone(), SyncOptions::default());
        let outcome = engine.sync_all().await.unwrap();

        let SyncOutcome::Completed(report) = outcome else {
            panic!("cycle was skipped");
        };
        assert_eq!(report.pushed, 2);
        let created = api.created.lock().await;
        assert_eq!(created[0].0, EntityKind::Hero);
        assert_eq!(created[1].1.parent_id.as_deref(), Some("srv-1"));

        let stored: Story = cache.fetch_local(story.id).await.unwrap().unwrap();
        assert_eq!(stored.sync.status, SyncStatus::Synced);
        assert!(cache.last_sync_at().await.unwrap().is_some());
    }
}
