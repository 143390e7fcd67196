//! Integration tests for the SQLite storage using the storage test harness.
//!
//! # Requirements
//!
//! - Feature flag `sqlite` must be enabled
//!
//! # Running
//!
//! ```sh
//! cargo test --features sqlite --test sqlite_tests
//! ```
//!
//! # Test isolation
//!
//! Every test opens its own database file in a temporary directory, which
//! is removed when the backend handle is dropped.

#![cfg(feature = "sqlite")]

#[macro_use]
mod storage_harness;

use async_trait::async_trait;
use gateway::config::{GatewayConfig, ModelConfig};
use gateway::conventions::{EntityModel, ModelRegistry, Provider};
use gateway::core::entity::Entity;
use gateway::core::query::Projection;
use gateway::core::repository::Repository;
use gateway::entities::{Budget, Client};
use gateway::storage::{SqliteSession, ensure_schema};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::marker::PhantomData;
use std::sync::Arc;
use storage_harness::*;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

pub struct SqliteBackend<T> {
    pool: SqlitePool,
    model: Arc<EntityModel>,
    /// Keeps the database file alive
    _dir: TempDir,
    _entity: PhantomData<fn() -> T>,
}

async fn open_pool(dir: &TempDir) -> SqlitePool {
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("gateway.db").display());
    SqlitePoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .expect("open sqlite database")
}

#[async_trait]
impl<T: Entity> TestBackend<T> for SqliteBackend<T> {
    type Session = SqliteSession<T>;

    async fn open(model: Arc<EntityModel>) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let pool = open_pool(&dir).await;
        ensure_schema(&pool, &model).await.expect("schema");
        Self {
            pool,
            model,
            _dir: dir,
            _entity: PhantomData,
        }
    }

    fn session(&self) -> SqliteSession<T> {
        SqliteSession::new(self.pool.clone(), Arc::clone(&self.model)).expect("sqlite model")
    }
}

repository_contract_tests!(SqliteBackend);

// ---------------------------------------------------------------------------
// SQLite specifics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_schema_follows_conventions() {
    let (backend, _repo) =
        repository::<Client, SqliteBackend<Client>>(&GatewayConfig::default()).await;

    let indexes: Vec<String> = sqlx::query(
        "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'clients' ORDER BY name",
    )
    .fetch_all(&backend.pool)
    .await
    .unwrap()
    .iter()
    .map(|row| row.get::<String, _>(0))
    .collect();
    assert_eq!(
        indexes,
        vec!["ix_clients_created_at".to_string(), "ix_clients_modified_at".to_string()]
    );

    // ensure_schema is idempotent
    ensure_schema(&backend.pool, &backend.model).await.unwrap();
}

#[tokio::test]
async fn test_created_at_filled_by_database() {
    let (backend, repo) =
        repository::<Client, SqliteBackend<Client>>(&GatewayConfig::default()).await;
    let created = repo.create(client("A")).await.unwrap();

    let raw: String = sqlx::query("SELECT created_at FROM clients WHERE id = ?")
        .bind(created.id)
        .fetch_one(&backend.pool)
        .await
        .unwrap()
        .get(0);
    // same text shape as bound timestamps: six fractional digits, UTC
    assert_eq!(raw.len(), "2024-01-01T00:00:00.000000Z".len());
    assert!(raw.ends_with("000Z"));
    assert!(created.created_at.to_rfc3339().starts_with(&raw[..10]));

    let exact: i64 = sqlx::query("SELECT COUNT(*) FROM clients WHERE created_at = ?")
        .bind(created.created_at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
        .fetch_one(&backend.pool)
        .await
        .unwrap()
        .get(0);
    assert_eq!(exact, 1);
}

#[tokio::test]
async fn test_bulk_writes_are_set_based() {
    use gateway::core::store::StorageSession;
    use gateway::entities::Setting;

    let (backend, _repo) =
        repository::<Setting, SqliteBackend<Setting>>(&GatewayConfig::default()).await;

    let staged = backend.session();
    let mut rows = sample_settings(25);
    staged.add(&mut rows).await.unwrap();
    assert_eq!(staged.save_changes().await.unwrap(), 25);
    assert_eq!(staged.statements_executed(), 25);

    let bulk = backend.session();
    let mut rows: Vec<Setting> = (0..25).map(|i| setting(&format!("b{}", i), "x")).collect();
    assert_eq!(bulk.bulk_insert(&mut rows).await.unwrap(), 25);
    assert_eq!(bulk.statements_executed(), 1);
    assert!(rows.windows(2).all(|w| w[0].id < w[1].id));
    assert_eq!(rows[0].key, "b0");

    for row in &mut rows {
        row.value = "y".into();
    }
    assert_eq!(bulk.bulk_update(&mut rows).await.unwrap(), 25);
    assert_eq!(bulk.statements_executed(), 2);

    let keys: Vec<i64> = rows.iter().map(|s| s.id).collect();
    assert_eq!(bulk.bulk_delete(&keys).await.unwrap(), 25);
    assert_eq!(bulk.statements_executed(), 3);
    assert_eq!(
        bulk.count(None, gateway::core::query::FilterBypass::All)
            .await
            .unwrap(),
        25
    );
}

#[tokio::test]
async fn test_bulk_insert_splits_at_bind_limit() {
    use gateway::core::store::StorageSession;
    use gateway::entities::Setting;

    let (backend, _repo) =
        repository::<Setting, SqliteBackend<Setting>>(&GatewayConfig::default()).await;
    let session = backend.session();

    // two binds per row: 499 rows per statement
    let mut rows = sample_settings(1200);
    assert_eq!(session.bulk_insert(&mut rows).await.unwrap(), 1200);
    assert_eq!(session.statements_executed(), 3);
    assert_eq!(rows[1199].key, "k1199");
    assert!(rows.windows(2).all(|w| w[0].id < w[1].id));
}

#[tokio::test]
async fn test_bulk_insert_names_duplicate_key() {
    let config = GatewayConfig {
        batch: gateway::core::batch::BatchThresholds::new(1, 0),
        ..Default::default()
    };
    let (_backend, repo) = repository::<Client, SqliteBackend<Client>>(&config).await;
    let first = repo.create(client("A")).await.unwrap();

    let duplicate = Client {
        id: first.id,
        ..client("B")
    };
    let other = Client {
        id: first.id + 100,
        ..client("C")
    };
    let err = repo.create_many(vec![other, duplicate]).await.unwrap_err();
    assert_eq!(err.error_code(), "DUPLICATE_KEY");
    assert!(err.to_string().contains(&first.id.to_string()));
    assert_eq!(repo.count(None).await.unwrap(), 1);
}

#[tokio::test]
async fn test_duplicate_key_rolls_back_the_batch() {
    let (_backend, repo) =
        repository::<Client, SqliteBackend<Client>>(&GatewayConfig::default()).await;
    let first = repo.create(client("A")).await.unwrap();

    let duplicate = Client {
        id: first.id,
        ..client("B")
    };
    let err = repo
        .create_many(vec![client("C"), duplicate])
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "DUPLICATE_KEY");

    // "C" was staged in the same transaction and rolled back with it
    let codes: Vec<String> = repo
        .read(Projection::<Client, String>::new(&["code"], |c| c.code.clone()).unwrap())
        .to_list()
        .await
        .unwrap();
    assert_eq!(codes, vec!["A".to_string()]);
}

#[tokio::test]
async fn test_session_rejects_foreign_provider() {
    let dir = tempfile::tempdir().unwrap();
    let pool = open_pool(&dir).await;
    let registry = ModelRegistry::new(ModelConfig {
        provider: Provider::Postgres,
        ..Default::default()
    });
    let model = registry.model_for::<Budget>().unwrap();

    let err = SqliteSession::<Budget>::new(pool, model).err().expect("rejected");
    assert_eq!(err.error_code(), "MODEL_MISMATCH");
}

#[tokio::test]
async fn test_reads_inside_open_transaction_see_staged_rows() {
    use gateway::core::query::StorageQuery;
    use gateway::core::store::StorageSession;

    let (backend, _repo) =
        repository::<Client, SqliteBackend<Client>>(&GatewayConfig::default()).await;
    let session = backend.session();

    let mut rows = vec![client("A")];
    session.add(&mut rows).await.unwrap();
    assert_eq!(session.fetch(&StorageQuery::default()).await.unwrap().len(), 1);
    assert_eq!(session.save_changes().await.unwrap(), 1);

    let other = Repository::new(Arc::new(backend.session()), &GatewayConfig::default());
    assert_eq!(other.count(None).await.unwrap(), 1);
}
