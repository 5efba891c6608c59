use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

use super::StoreError;
use crate::models::{NewPlant, Plant};

/// Pool size for file-backed stores. Reads run in parallel under WAL,
/// writes are serialized by the store's own lock anyway.
const MAX_CONNECTIONS: u32 = 4;

/// How long a connection waits on a locked database file before failing.
const BUSY_TIMEOUT_MS: u64 = 1500;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS plants (
        id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
        refId TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT NOT NULL,
        image TEXT NOT NULL
    )
"#;

const CREATE_REF_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS plants_ref_id ON plants (refId)";

const INSERT_PLANT: &str =
    "INSERT INTO plants (refId, name, description, image) VALUES (?, ?, ?, ?)";

const SELECT_PLANTS: &str =
    "SELECT id, refId, name, description, image FROM plants ORDER BY id";

/// Result of inserting a single plant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    pub local_id: i64,
    pub rows_affected: u64,
}

/// Result of swapping the whole table in one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub cleared: u64,
    pub inserted: u64,
}

/// Durable, transactional store of plant rows.
///
/// Clone is cheap and every clone shares the same pool and write lock, so
/// one store opened at startup can be handed to the synchronizer and any
/// number of concurrent callers.
#[derive(Debug, Clone)]
pub struct PlantStore {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl PlantStore {
    /// Open (creating if missing) the store at `path` and ensure the schema exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let options = Self::base_options()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(StoreError::Init)?;
        Self::from_pool(pool).await
    }

    /// Open a store that lives only as long as this process.
    ///
    /// An in-memory database belongs to a single connection, so the pool is
    /// pinned to one connection that is never recycled.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = Self::base_options().filename(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(StoreError::Init)?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        };
        store.initialize().await?;
        Ok(store)
    }

    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))
    }

    /// Create the plants table if it does not exist yet.
    ///
    /// Safe to call on every start; a second call changes nothing.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::Init)?;
        sqlx::query(CREATE_TABLE)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Init)?;
        sqlx::query(CREATE_REF_INDEX)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Init)?;
        tx.commit().await.map_err(StoreError::Init)?;
        debug!("Plant schema ready");
        Ok(())
    }

    /// Acquire the write lock for a sequence of mutations that must not be
    /// interleaved with other writers.
    pub async fn lock(&self) -> StoreWriter<'_> {
        StoreWriter {
            pool: &self.pool,
            _guard: self.write_lock.lock().await,
        }
    }

    // ===== Mutations =====

    pub async fn insert(&self, plant: &NewPlant) -> Result<InsertOutcome, StoreError> {
        self.lock().await.insert(plant).await
    }

    /// Delete the row for `remote_id`, if any. Deleting a missing id is not an error.
    pub async fn delete_by_remote_id(&self, remote_id: &str) -> Result<u64, StoreError> {
        self.lock().await.delete_by_remote_id(remote_id).await
    }

    /// Delete every row. Returns how many were removed.
    pub async fn clear(&self) -> Result<u64, StoreError> {
        self.lock().await.clear().await
    }

    /// Check a full replacement set without touching the table: every field
    /// filled, and no remote id listed twice.
    pub fn validate_batch(plants: &[NewPlant]) -> Result<(), StoreError> {
        let mut seen = HashSet::with_capacity(plants.len());
        for plant in plants {
            validate(plant)?;
            if !seen.insert(plant.remote_id.as_str()) {
                return Err(StoreError::Constraint(format!(
                    "remoteId '{}' appears more than once",
                    plant.remote_id
                )));
            }
        }
        Ok(())
    }

    /// Swap the whole table for `plants` inside one transaction.
    ///
    /// Either every plant ends up stored and the old rows are gone, or the
    /// table is left exactly as it was.
    pub async fn replace_all(&self, plants: &[NewPlant]) -> Result<ReplaceOutcome, StoreError> {
        Self::validate_batch(plants)?;

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(StoreError::Write)?;
        let cleared = sqlx::query("DELETE FROM plants")
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Write)?
            .rows_affected();

        let mut inserted: u64 = 0;
        for plant in plants {
            sqlx::query(INSERT_PLANT)
                .bind(&plant.remote_id)
                .bind(&plant.name)
                .bind(&plant.description)
                .bind(&plant.image)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::from_write)?;
            inserted += 1;
        }

        tx.commit().await.map_err(StoreError::Write)?;
        info!(cleared, inserted, "Replaced plant table");
        Ok(ReplaceOutcome { cleared, inserted })
    }

    // ===== Reads =====

    /// All rows in insertion order (ascending local id).
    pub async fn fetch_all(&self) -> Result<Vec<Plant>, StoreError> {
        sqlx::query_as::<_, Plant>(SELECT_PLANTS)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Read)
    }

    pub async fn get_by_remote_id(&self, remote_id: &str) -> Result<Option<Plant>, StoreError> {
        sqlx::query_as::<_, Plant>(
            "SELECT id, refId, name, description, image FROM plants WHERE refId = ?",
        )
        .bind(remote_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Read)
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM plants")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::Read)?;
        Ok(count as u64)
    }

    /// Close the underlying pool. The store must not be used afterwards.
    pub async fn close(&self) {
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Exclusive write access to a [`PlantStore`].
///
/// Holds the store's write lock until dropped. Each call is still its own
/// transaction; the lock only keeps other writers out between calls.
pub struct StoreWriter<'a> {
    pool: &'a SqlitePool,
    _guard: MutexGuard<'a, ()>,
}

impl StoreWriter<'_> {
    pub async fn insert(&mut self, plant: &NewPlant) -> Result<InsertOutcome, StoreError> {
        validate(plant)?;

        let mut tx = self.pool.begin().await.map_err(StoreError::Write)?;
        let result = sqlx::query(INSERT_PLANT)
            .bind(&plant.remote_id)
            .bind(&plant.name)
            .bind(&plant.description)
            .bind(&plant.image)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from_write)?;
        tx.commit().await.map_err(StoreError::Write)?;

        let outcome = InsertOutcome {
            local_id: result.last_insert_rowid(),
            rows_affected: result.rows_affected(),
        };
        debug!(remote_id = %plant.remote_id, local_id = outcome.local_id, "Inserted plant");
        Ok(outcome)
    }

    pub async fn delete_by_remote_id(&mut self, remote_id: &str) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::Write)?;
        let deleted = sqlx::query("DELETE FROM plants WHERE refId = ?")
            .bind(remote_id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Write)?
            .rows_affected();
        tx.commit().await.map_err(StoreError::Write)?;
        debug!(remote_id, deleted, "Deleted plant");
        Ok(deleted)
    }

    pub async fn clear(&mut self) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::Write)?;
        let cleared = sqlx::query("DELETE FROM plants")
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Write)?
            .rows_affected();
        tx.commit().await.map_err(StoreError::Write)?;
        debug!(cleared, "Cleared plant table");
        Ok(cleared)
    }
}

fn validate(plant: &NewPlant) -> Result<(), StoreError> {
    plant
        .validate()
        .map_err(|field| StoreError::Constraint(format!("{} must not be empty", field)))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn fern() -> NewPlant {
        NewPlant::new("p1", "Fern", "d", "img")
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let store = PlantStore::open_in_memory().await.unwrap();
        store.initialize().await.unwrap();
        store.initialize().await.unwrap();

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'plants'",
        )
        .fetch_one(&store.pool)
        .await
        .unwrap();
        assert_eq!(tables, 1);
    }

    #[tokio::test]
    async fn test_insert_then_fetch_all() {
        let store = PlantStore::open_in_memory().await.unwrap();
        let outcome = store.insert(&fern()).await.unwrap();
        assert_eq!(outcome.rows_affected, 1);
        assert!(outcome.local_id > 0);

        let plants = store.fetch_all().await.unwrap();
        assert_eq!(plants.len(), 1);
        let plant = &plants[0];
        assert_eq!(plant.local_id, outcome.local_id);
        assert_eq!(plant.remote_id, "p1");
        assert_eq!(plant.name, "Fern");
        assert_eq!(plant.description, "d");
        assert_eq!(plant.image, "img");
    }

    #[tokio::test]
    async fn test_fetch_all_empty_store() {
        let store = PlantStore::open_in_memory().await.unwrap();
        assert!(store.fetch_all().await.unwrap().is_empty());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fetch_all_in_insertion_order() {
        let store = PlantStore::open_in_memory().await.unwrap();
        for id in ["c", "a", "b"] {
            store.insert(&NewPlant::new(id, "n", "d", "i")).await.unwrap();
        }
        let ids: Vec<String> = store
            .fetch_all()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.remote_id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = PlantStore::open_in_memory().await.unwrap();
        assert_eq!(store.delete_by_remote_id("missing").await.unwrap(), 0);

        store.insert(&fern()).await.unwrap();
        assert_eq!(store.delete_by_remote_id("p1").await.unwrap(), 1);
        assert_eq!(store.delete_by_remote_id("p1").await.unwrap(), 0);
        assert!(store.fetch_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_rejects_empty_field() {
        let store = PlantStore::open_in_memory().await.unwrap();
        store.insert(&fern()).await.unwrap();
        let before = store.fetch_all().await.unwrap();

        let err = store
            .insert(&NewPlant::new("x", "", "d", "i"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
        assert!(!err.is_retryable());
        assert_eq!(store.fetch_all().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_remote_id() {
        let store = PlantStore::open_in_memory().await.unwrap();
        store.insert(&fern()).await.unwrap();
        let err = store
            .insert(&NewPlant::new("p1", "Other", "d", "i"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_local_ids_are_not_reused() {
        let store = PlantStore::open_in_memory().await.unwrap();
        store.insert(&NewPlant::new("a", "n", "d", "i")).await.unwrap();
        let second = store.insert(&NewPlant::new("b", "n", "d", "i")).await.unwrap();
        store.delete_by_remote_id("b").await.unwrap();

        let third = store.insert(&NewPlant::new("c", "n", "d", "i")).await.unwrap();
        assert!(third.local_id > second.local_id);

        store.clear().await.unwrap();
        let fourth = store.insert(&NewPlant::new("d", "n", "d", "i")).await.unwrap();
        assert!(fourth.local_id > third.local_id);
    }

    #[tokio::test]
    async fn test_clear_reports_removed_rows() {
        let store = PlantStore::open_in_memory().await.unwrap();
        store.insert(&NewPlant::new("a", "n", "d", "i")).await.unwrap();
        store.insert(&NewPlant::new("b", "n", "d", "i")).await.unwrap();
        assert_eq!(store.clear().await.unwrap(), 2);
        assert_eq!(store.clear().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_by_remote_id() {
        let store = PlantStore::open_in_memory().await.unwrap();
        store.insert(&fern()).await.unwrap();
        let found = store.get_by_remote_id("p1").await.unwrap().unwrap();
        assert_eq!(found.name, "Fern");
        assert!(store.get_by_remote_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_all_swaps_contents() {
        let store = PlantStore::open_in_memory().await.unwrap();
        store.insert(&fern()).await.unwrap();

        let next = vec![
            NewPlant::new("a", "n", "d", "i"),
            NewPlant::new("b", "n", "d", "i"),
        ];
        let outcome = store.replace_all(&next).await.unwrap();
        assert_eq!(outcome, ReplaceOutcome { cleared: 1, inserted: 2 });

        let ids: Vec<String> = store
            .fetch_all()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.remote_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_replace_all_rolls_back_on_failure() {
        let store = PlantStore::open_in_memory().await.unwrap();
        store.insert(&fern()).await.unwrap();
        let before = store.fetch_all().await.unwrap();

        // Second row collides with the first on the unique remote id index.
        let next = vec![
            NewPlant::new("a", "n", "d", "i"),
            NewPlant::new("a", "n2", "d", "i"),
        ];
        let err = store.replace_all(&next).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
        assert_eq!(store.fetch_all().await.unwrap(), before);

        let invalid = vec![NewPlant::new("b", "n", "", "i")];
        assert!(store.replace_all(&invalid).await.is_err());
        assert_eq!(store.fetch_all().await.unwrap(), before);

        // A write that fails after the delete ran must undo the delete too.
        sqlx::query(
            "CREATE TRIGGER reject_c BEFORE INSERT ON plants WHEN NEW.refId = 'c' \
             BEGIN SELECT RAISE(ABORT, 'disk full'); END",
        )
        .execute(store.pool())
        .await
        .unwrap();
        let next = vec![NewPlant::new("b", "n", "d", "i"), NewPlant::new("c", "n", "d", "i")];
        let err = store.replace_all(&next).await.unwrap_err();
        assert!(matches!(err, StoreError::Write(_)));
        assert_eq!(store.fetch_all().await.unwrap(), before);
    }

    #[test]
    fn test_validate_batch() {
        assert!(PlantStore::validate_batch(&[]).is_ok());
        assert!(PlantStore::validate_batch(&[fern(), NewPlant::new("p2", "Moss", "d", "i")]).is_ok());

        let err = PlantStore::validate_batch(&[fern(), NewPlant::new("p2", "Moss", "d", " ")]).unwrap_err();
        assert!(matches!(err, StoreError::Constraint(ref msg) if msg.contains("description")));

        let err = PlantStore::validate_batch(&[fern(), fern()]).unwrap_err();
        assert!(matches!(err, StoreError::Constraint(ref msg) if msg.contains("'p1'")));
    }

    #[tokio::test]
    async fn test_writer_lock_blocks_other_writers() {
        let store = PlantStore::open_in_memory().await.unwrap();
        let writer = store.lock().await;

        let other = store.clone();
        let handle = tokio::spawn(async move { other.insert(&fern()).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        drop(writer);
        handle.await.unwrap().unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_get_distinct_ids() {
        let store = PlantStore::open_in_memory().await.unwrap();
        let inserts = (0..10).map(|i| {
            let store = store.clone();
            async move {
                store
                    .insert(&NewPlant::new(format!("p{}", i), "n", "d", "i"))
                    .await
            }
        });
        let outcomes = futures::future::join_all(inserts).await;

        let mut ids: Vec<i64> = outcomes.into_iter().map(|o| o.unwrap().local_id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 10);
    }

    #[tokio::test]
    async fn test_rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plants.db");

        let store = PlantStore::open(&path).await.unwrap();
        store.insert(&fern()).await.unwrap();
        store.close().await;

        let reopened = PlantStore::open(&path).await.unwrap();
        let plants = reopened.fetch_all().await.unwrap();
        assert_eq!(plants.len(), 1);
        assert_eq!(plants[0].remote_id, "p1");
        reopened.close().await;
    }

    #[tokio::test]
    async fn test_open_fails_for_unusable_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("plants.db");
        let err = PlantStore::open(&path).await.unwrap_err();
        assert!(matches!(err, StoreError::Init(_)));
    }
}
