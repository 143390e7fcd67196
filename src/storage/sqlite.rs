//! SQLite storage session using sqlx.
//!
//! # Feature flag
//!
//! This module is gated behind the `sqlite` feature flag:
//! ```toml
//! [dependencies]
//! entity-gateway = { version = "0.1", features = ["sqlite"] }
//! ```
//!
//! # Schema
//!
//! One table per entity, named and typed by the model conventions
//! (see [`ensure_schema`]). SQLite has no timezone-aware type: timestamps are
//! stored as RFC 3339 UTC text, UUIDs as their hyphenated text form and
//! booleans as `0`/`1`.
//!
//! # Transactions
//!
//! The first staged write opens a transaction on a pooled connection; reads
//! issued while it is open run on the same connection and see the staged
//! rows. `save_changes` commits it. A failed write rolls the whole
//! transaction back and discards everything staged so far.
//!
//! # Bulk writes
//!
//! Staged writes issue one statement per row. The `bulk_*` operations are
//! set-based instead: multi-row `INSERT ... RETURNING`, `UPDATE ... FROM` a
//! `VALUES` list and `DELETE ... IN`, each split to stay under the bind
//! parameter limit. They commit on return, together with anything staged.

use crate::conventions::{ColumnSpec, EntityModel, Provider};
use crate::core::entity::{Entity, EntityKey, field_names};
use crate::core::error::{ConflictError, GatewayError, Result, StorageError, ValidationError};
use crate::core::field::{FieldKind, FieldType, FieldValue, parse_timestamp};
use crate::core::query::{FilterBypass, Predicate, StorageQuery};
use crate::core::store::StorageSession;
use crate::storage::sql::{SqlRenderer, SqlStatement};
use crate::storage::{prepare_insert, prepare_replace};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::{TryStreamExt, future};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqlitePool, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tracing::{debug, trace, warn};
use uuid::Uuid;

type SqliteTx = Transaction<'static, Sqlite>;

/// Most bind parameters one statement carries. SQLite builds before 3.32
/// stop at 999.
const MAX_BINDS: usize = 999;

/// Rows per set-based statement when each row binds `width` values
fn rows_per_statement(width: usize) -> usize {
    (MAX_BINDS / width.max(1)).max(1)
}

/// Create the model's table and indexes (idempotent).
///
/// Safe to call on every startup.
pub async fn ensure_schema(pool: &SqlitePool, model: &EntityModel) -> Result<()> {
    sqlx::query(&model.create_table_sql())
        .execute(pool)
        .await
        .map_err(|e| {
            GatewayError::backend(format!("Failed to create {} table: {}", model.table, e))
        })?;

    for statement in model.create_index_sql() {
        sqlx::query(&statement).execute(pool).await.map_err(|e| {
            GatewayError::backend(format!("Failed to create {} index: {}", model.table, e))
        })?;
    }
    Ok(())
}

/// Unit of work over one SQLite table
///
/// # Example
///
/// ```rust,ignore
/// let pool = SqlitePool::connect("sqlite::memory:").await?;
/// let model = registry.model_for::<Client>()?;
/// ensure_schema(&pool, &model).await?;
///
/// let session = SqliteSession::<Client>::new(pool.clone(), model)?;
/// let repo = Repository::new(Arc::new(session), &config);
/// ```
pub struct SqliteSession<T: Entity> {
    pool: SqlitePool,
    model: Arc<EntityModel>,
    tx: AsyncMutex<Option<SqliteTx>>,
    /// Rows affected by writes staged in the open transaction
    staged: AtomicUsize,
    /// Statements sent to the database by this session
    statements: AtomicUsize,
    tracked: Mutex<HashMap<T::Key, T>>,
}

impl<T: Entity> SqliteSession<T> {
    /// Open a session for a model built for the SQLite provider
    pub fn new(pool: SqlitePool, model: Arc<EntityModel>) -> Result<Self> {
        if model.provider != Provider::Sqlite {
            return Err(ValidationError::Model {
                message: format!(
                    "{} model was built for {}, not sqlite",
                    model.resource, model.provider
                ),
            }
            .into());
        }
        Ok(Self {
            pool,
            model,
            tx: AsyncMutex::new(None),
            staged: AtomicUsize::new(0),
            statements: AtomicUsize::new(0),
            tracked: Mutex::new(HashMap::new()),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of statements this session has sent to the database
    pub fn statements_executed(&self) -> usize {
        self.statements.load(Ordering::SeqCst)
    }

    fn executing(&self, statement: &SqlStatement) {
        self.statements.fetch_add(1, Ordering::SeqCst);
        trace!(entity = T::resource_name(), sql = %statement.sql, binds = statement.binds.len(), "execute");
    }

    /// Lock the session transaction, opening it if needed
    async fn transaction(&self) -> Result<MutexGuard<'_, Option<SqliteTx>>> {
        let mut guard = self.tx.lock().await;
        if guard.is_none() {
            let tx = self.pool.begin().await.map_err(storage_error)?;
            trace!(entity = T::resource_name(), "transaction opened");
            *guard = Some(tx);
        }
        Ok(guard)
    }

    /// Record the outcome of a staged write; a failure rolls back everything
    async fn settle(
        &self,
        guard: &mut MutexGuard<'_, Option<SqliteTx>>,
        outcome: Result<usize>,
    ) -> Result<()> {
        match outcome {
            Ok(rows) => {
                self.staged.fetch_add(rows, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                if let Some(tx) = guard.take() {
                    if let Err(rollback) = tx.rollback().await {
                        warn!(entity = T::resource_name(), error = %rollback, "rollback failed");
                    }
                }
                self.staged.store(0, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Commit the open transaction, returning every row it affected
    async fn commit(&self, guard: &mut MutexGuard<'_, Option<SqliteTx>>) -> Result<usize> {
        let Some(tx) = guard.take() else {
            return Ok(0);
        };
        tx.commit().await.map_err(storage_error)?;

        let rows = self.staged.swap(0, Ordering::SeqCst);
        debug!(entity = T::resource_name(), rows, "transaction committed");
        Ok(rows)
    }

    async fn rows(&self, statement: &SqlStatement) -> Result<Vec<SqliteRow>> {
        self.executing(statement);
        let query = bind_values(sqlx::query(&statement.sql), &statement.binds);
        let mut guard = self.tx.lock().await;
        let rows = match guard.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await,
            None => query.fetch_all(&self.pool).await,
        };
        rows.map_err(storage_error)
    }

    /// Decode rows as they stream in
    async fn entities(&self, statement: &SqlStatement) -> Result<Vec<T>> {
        self.executing(statement);
        let query = bind_values(sqlx::query(&statement.sql), &statement.binds);
        let mut guard = self.tx.lock().await;
        let stream = match guard.as_mut() {
            Some(tx) => query.fetch(&mut **tx),
            None => query.fetch(&self.pool),
        };
        stream
            .map_err(storage_error)
            .and_then(|row| future::ready(decode_row(&self.model, &row)))
            .try_collect()
            .await
    }

    async fn insert_all(&self, tx: &mut SqliteTx, entities: &mut [T]) -> Result<usize> {
        let renderer = SqlRenderer::new(&self.model);
        for entity in entities.iter_mut() {
            if !self.model.key_generated() && entity.id().is_unset() {
                entity.set_id(T::Key::next_after(None));
            }
            prepare_insert(&self.model, entity);

            let statement = renderer.insert(&*entity);
            self.executing(&statement);
            let row = bind_values(sqlx::query(&statement.sql), &statement.binds)
                .fetch_one(&mut **tx)
                .await
                .map_err(|e| insert_error::<T>(e, &entity.id()))?;
            *entity = decode_row(&self.model, &row)?;
        }
        Ok(entities.len())
    }

    async fn update_all(&self, tx: &mut SqliteTx, entities: &mut [T]) -> Result<usize> {
        let renderer = SqlRenderer::new(&self.model);
        let versioned = self.model.capabilities.versioned;
        let mut affected = 0;

        for entity in entities.iter_mut() {
            let expected = prepare_replace(versioned, entity);
            let statement = renderer.update(&*entity, expected);
            self.executing(&statement);
            let done = bind_values(sqlx::query(&statement.sql), &statement.binds)
                .execute(&mut **tx)
                .await
                .map_err(storage_error)?;

            if done.rows_affected() > 0 {
                affected += done.rows_affected() as usize;
                continue;
            }

            // nothing matched: either the key is gone or the version moved on
            if let Some(expected) = expected {
                let statement = renderer.current_version(&entity.id());
                self.executing(&statement);
                let current = bind_values(sqlx::query(&statement.sql), &statement.binds)
                    .fetch_optional(&mut **tx)
                    .await
                    .map_err(storage_error)?;
                if let Some(row) = current {
                    let actual: i64 = row.try_get(0).map_err(storage_error)?;
                    return Err(ConflictError {
                        entity: T::resource_name().to_string(),
                        key: entity.id().to_string(),
                        expected,
                        actual,
                    }
                    .into());
                }
            }
            trace!(entity = T::resource_name(), key = %entity.id(), "update of missing key ignored");
        }
        Ok(affected)
    }

    async fn delete_all(&self, tx: &mut SqliteTx, keys: &[T::Key]) -> Result<usize> {
        let renderer = SqlRenderer::new(&self.model);
        let mut affected = 0;
        for batch in keys.chunks(rows_per_statement(1)) {
            let statement = renderer.delete(batch);
            self.executing(&statement);
            let done = bind_values(sqlx::query(&statement.sql), &statement.binds)
                .execute(&mut **tx)
                .await
                .map_err(storage_error)?;
            affected += done.rows_affected() as usize;
        }
        Ok(affected)
    }

    /// Multi-row inserts. Rows are grouped while they write the same
    /// columns and fit under the bind limit.
    async fn insert_batches(&self, tx: &mut SqliteTx, entities: &mut [T]) -> Result<usize> {
        let renderer = SqlRenderer::new(&self.model);
        for entity in entities.iter_mut() {
            if !self.model.key_generated() && entity.id().is_unset() {
                entity.set_id(T::Key::next_after(None));
            }
            prepare_insert(&self.model, entity);
        }

        let mut start = 0;
        while start < entities.len() {
            let columns = column_names(&renderer.insert_columns(&entities[start]));
            let limit = rows_per_statement(columns.len());
            let mut end = start + 1;
            while end < entities.len()
                && end - start < limit
                && column_names(&renderer.insert_columns(&entities[end])) == columns
            {
                end += 1;
            }

            let batch = &mut entities[start..end];
            let keys_given = columns.contains(&field_names::ID);
            let statement = renderer.insert_many(batch);
            self.executing(&statement);
            let rows = match bind_values(sqlx::query(&statement.sql), &statement.binds)
                .fetch_all(&mut **tx)
                .await
            {
                Ok(rows) => rows,
                Err(e) => return Err(self.batch_insert_error(tx, e, batch, keys_given).await),
            };

            let mut inserted = rows
                .iter()
                .map(|row| decode_row::<T>(&self.model, row))
                .collect::<Result<Vec<T>>>()?;
            if inserted.len() != batch.len() {
                return Err(GatewayError::backend(format!(
                    "insert of {} rows returned {}",
                    batch.len(),
                    inserted.len()
                )));
            }

            if keys_given {
                let mut by_key: HashMap<T::Key, T> =
                    inserted.into_iter().map(|e| (e.id(), e)).collect();
                for entity in batch.iter_mut() {
                    *entity = by_key.remove(&entity.id()).ok_or_else(|| {
                        GatewayError::backend(format!("inserted row {} not returned", entity.id()))
                    })?;
                }
            } else {
                // generated keys increase in insertion order
                inserted.sort_by(|a, b| a.id().cmp(&b.id()));
                for (entity, row) in batch.iter_mut().zip(inserted) {
                    *entity = row;
                }
            }
            trace!(entity = T::resource_name(), rows = end - start, "multi-row insert");
            start = end;
        }
        Ok(entities.len())
    }

    /// Name the duplicate key when a multi-row insert hit one
    async fn batch_insert_error(
        &self,
        tx: &mut SqliteTx,
        e: sqlx::Error,
        batch: &[T],
        keys_given: bool,
    ) -> GatewayError {
        let unique = e
            .as_database_error()
            .is_some_and(|db| db.is_unique_violation());
        if !unique || !keys_given {
            return storage_error(e);
        }

        let keys: Vec<T::Key> = batch.iter().map(T::id).collect();
        let mut seen = HashSet::new();
        if let Some(repeated) = keys.iter().find(|k| !seen.insert(*k)) {
            return duplicate_key::<T>(repeated);
        }

        // a failed statement leaves the transaction usable
        let statement = SqlRenderer::new(&self.model).existing_keys(&keys);
        self.executing(&statement);
        let existing = bind_values(sqlx::query(&statement.sql), &statement.binds)
            .fetch_optional(&mut **tx)
            .await;
        match existing {
            Ok(Some(row)) => match decode_key::<T>(&self.model, &row) {
                Ok(key) => duplicate_key::<T>(&key),
                Err(_) => storage_error(e),
            },
            _ => storage_error(e),
        }
    }

    /// Set-based updates. Keys the statement did not return are either gone
    /// or carry another version.
    async fn update_batches(&self, tx: &mut SqliteTx, entities: &mut [T]) -> Result<usize> {
        let renderer = SqlRenderer::new(&self.model);
        let versioned = self.model.capabilities.versioned;
        let limit = rows_per_statement(renderer.update_width());
        let mut affected = 0;

        for batch in entities.chunks_mut(limit) {
            let expected: Vec<Option<i64>> = batch
                .iter_mut()
                .map(|entity| prepare_replace(versioned, entity))
                .collect();
            let statement = renderer.update_many(batch, &expected);
            self.executing(&statement);
            let rows = bind_values(sqlx::query(&statement.sql), &statement.binds)
                .fetch_all(&mut **tx)
                .await
                .map_err(storage_error)?;
            let matched = rows
                .iter()
                .map(|row| decode_key::<T>(&self.model, row))
                .collect::<Result<HashSet<T::Key>>>()?;
            affected += matched.len();

            let unmatched: Vec<(&T, i64)> = batch
                .iter()
                .zip(&expected)
                .filter(|(entity, _)| !matched.contains(&entity.id()))
                .filter_map(|(entity, expected)| expected.map(|v| (entity, v)))
                .collect();
            if unmatched.is_empty() {
                continue;
            }

            let keys: Vec<T::Key> = unmatched.iter().map(|(entity, _)| entity.id()).collect();
            let statement = renderer.versions(&keys);
            self.executing(&statement);
            let stored = bind_values(sqlx::query(&statement.sql), &statement.binds)
                .fetch_all(&mut **tx)
                .await
                .map_err(storage_error)?;
            if let Some(row) = stored.first() {
                let key = decode_key::<T>(&self.model, row)?;
                let actual: i64 = row.try_get(1).map_err(storage_error)?;
                let expected = unmatched
                    .iter()
                    .find(|(entity, _)| entity.id() == key)
                    .map_or(0, |(_, v)| *v);
                return Err(ConflictError {
                    entity: T::resource_name().to_string(),
                    key: key.to_string(),
                    expected,
                    actual,
                }
                .into());
            }
            trace!(
                entity = T::resource_name(),
                rows = unmatched.len(),
                "update of missing keys ignored"
            );
        }
        Ok(affected)
    }

    fn untrack(&self, keys: &[T::Key]) -> Result<()> {
        let mut tracked = self
            .tracked
            .lock()
            .map_err(|e| GatewayError::backend(format!("Failed to lock tracked entities: {}", e)))?;
        for key in keys {
            tracked.remove(key);
        }
        Ok(())
    }

    fn track<'a>(&self, entities: impl IntoIterator<Item = &'a T>) -> Result<()> {
        let mut tracked = self
            .tracked
            .lock()
            .map_err(|e| GatewayError::backend(format!("Failed to lock tracked entities: {}", e)))?;
        for entity in entities {
            tracked.insert(entity.id(), entity.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Entity> StorageSession<T> for SqliteSession<T> {
    fn model(&self) -> &Arc<EntityModel> {
        &self.model
    }

    async fn fetch(&self, query: &StorageQuery) -> Result<Vec<T>> {
        if !query.includes.is_empty() {
            trace!(
                entity = T::resource_name(),
                includes = ?query.includes,
                "includes are not joined, related rows load through their own repository"
            );
        }

        let statement = SqlRenderer::new(&self.model).select(query);
        trace!(entity = T::resource_name(), sql = %statement.sql, "select");
        let entities = self.entities(&statement).await?;

        if query.tracking {
            self.track(&entities)?;
        }
        Ok(entities)
    }

    async fn count(&self, filter: Option<&Predicate>, bypass: FilterBypass) -> Result<u64> {
        let statement = SqlRenderer::new(&self.model).count(filter, bypass);
        let rows = self.rows(&statement).await?;
        let count: i64 = match rows.first() {
            Some(row) => row.try_get(0).map_err(storage_error)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn add(&self, entities: &mut [T]) -> Result<()> {
        let mut guard = self.transaction().await?;
        let outcome = match guard.as_mut() {
            Some(tx) => self.insert_all(tx, entities).await,
            None => Err(no_transaction()),
        };
        self.settle(&mut guard, outcome).await?;
        self.track(entities.iter())
    }

    async fn replace(&self, entities: &mut [T]) -> Result<()> {
        let mut guard = self.transaction().await?;
        let outcome = match guard.as_mut() {
            Some(tx) => self.update_all(tx, entities).await,
            None => Err(no_transaction()),
        };
        self.settle(&mut guard, outcome).await?;
        self.track(entities.iter())
    }

    async fn remove(&self, keys: &[T::Key]) -> Result<()> {
        let mut guard = self.transaction().await?;
        let outcome = match guard.as_mut() {
            Some(tx) => self.delete_all(tx, keys).await,
            None => Err(no_transaction()),
        };
        self.settle(&mut guard, outcome).await?;
        self.untrack(keys)
    }

    async fn save_changes(&self) -> Result<usize> {
        let mut guard = self.tx.lock().await;
        self.commit(&mut guard).await
    }

    async fn bulk_insert(&self, entities: &mut [T]) -> Result<usize> {
        let mut guard = self.transaction().await?;
        let outcome = match guard.as_mut() {
            Some(tx) => self.insert_batches(tx, entities).await,
            None => Err(no_transaction()),
        };
        self.settle(&mut guard, outcome).await?;
        self.track(entities.iter())?;
        self.commit(&mut guard).await
    }

    async fn bulk_update(&self, entities: &mut [T]) -> Result<usize> {
        let mut guard = self.transaction().await?;
        let outcome = match guard.as_mut() {
            Some(tx) => self.update_batches(tx, entities).await,
            None => Err(no_transaction()),
        };
        self.settle(&mut guard, outcome).await?;
        self.track(entities.iter())?;
        self.commit(&mut guard).await
    }

    async fn bulk_delete(&self, keys: &[T::Key]) -> Result<usize> {
        let mut guard = self.transaction().await?;
        let outcome = match guard.as_mut() {
            Some(tx) => self.delete_all(tx, keys).await,
            None => Err(no_transaction()),
        };
        self.settle(&mut guard, outcome).await?;
        self.untrack(keys)?;
        self.commit(&mut guard).await
    }

    fn tracked_len(&self) -> usize {
        self.tracked.lock().map(|t| t.len()).unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Binding and decoding
// ---------------------------------------------------------------------------

fn bind_values<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    binds: &[FieldValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in binds {
        query = match value {
            FieldValue::String(s) => query.bind(s.clone()),
            FieldValue::Integer(i) => query.bind(*i),
            FieldValue::Float(f) => query.bind(*f),
            FieldValue::Boolean(b) => query.bind(*b),
            FieldValue::Uuid(u) => query.bind(u.to_string()),
            FieldValue::DateTime(dt) => query.bind(format_timestamp(dt)),
            FieldValue::Null => query.bind(None::<String>),
        };
    }
    query
}

fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_row<T: Entity>(model: &EntityModel, row: &SqliteRow) -> Result<T> {
    let mut entity = T::default();
    for column in &model.columns {
        let value = decode_column(model, column, row)?;
        if !entity.set_field_value(column.name, value) {
            return Err(decode_error(model, column, "value does not fit the field"));
        }
    }
    Ok(entity)
}

fn decode_column(model: &EntityModel, column: &ColumnSpec, row: &SqliteRow) -> Result<FieldValue> {
    let name = column.name;
    let failed = |e: sqlx::Error| decode_error(model, column, e);

    let value = match column.kind {
        FieldKind::Text => row
            .try_get::<Option<String>, _>(name)
            .map_err(failed)?
            .map(FieldValue::String),
        FieldKind::Integer => row
            .try_get::<Option<i64>, _>(name)
            .map_err(failed)?
            .map(FieldValue::Integer),
        FieldKind::Float => row
            .try_get::<Option<f64>, _>(name)
            .map_err(failed)?
            .map(FieldValue::Float),
        FieldKind::Boolean => row
            .try_get::<Option<bool>, _>(name)
            .map_err(failed)?
            .map(FieldValue::Boolean),
        FieldKind::Uuid => match row.try_get::<Option<String>, _>(name).map_err(failed)? {
            Some(text) => Some(FieldValue::Uuid(
                Uuid::parse_str(&text).map_err(|e| decode_error(model, column, e))?,
            )),
            None => None,
        },
        FieldKind::Timestamp => match row.try_get::<Option<String>, _>(name).map_err(failed)? {
            Some(text) => Some(FieldValue::DateTime(parse_timestamp(&text).ok_or_else(
                || decode_error(model, column, format!("'{}' is not a timestamp", text)),
            )?)),
            None => None,
        },
    };
    Ok(value.unwrap_or(FieldValue::Null))
}

/// Key held in the `id` column of `row`
fn decode_key<T: Entity>(model: &EntityModel, row: &SqliteRow) -> Result<T::Key> {
    let column = model
        .column(field_names::ID)
        .ok_or_else(|| GatewayError::backend(format!("{} model has no key column", model.resource)))?;
    let value = decode_column(model, column, row)?;
    <T::Key as FieldType>::from_field_value(value)
        .ok_or_else(|| decode_error(model, column, "value does not fit the key"))
}

fn column_names(columns: &[&ColumnSpec]) -> Vec<&'static str> {
    columns.iter().map(|c| c.name).collect()
}

fn decode_error(model: &EntityModel, column: &ColumnSpec, e: impl std::fmt::Display) -> GatewayError {
    StorageError::Decode {
        entity: model.resource.to_string(),
        field: column.name.to_string(),
        message: e.to_string(),
    }
    .into()
}

fn no_transaction() -> GatewayError {
    GatewayError::backend("no open transaction")
}

fn insert_error<T: Entity>(e: sqlx::Error, key: &T::Key) -> GatewayError {
    let unique = e
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation());
    if unique && !key.is_unset() {
        return duplicate_key::<T>(key);
    }
    storage_error(e)
}

fn duplicate_key<T: Entity>(key: &T::Key) -> GatewayError {
    StorageError::DuplicateKey {
        entity: T::resource_name().to_string(),
        key: key.to_string(),
    }
    .into()
}

fn storage_error(e: sqlx::Error) -> GatewayError {
    if let Some(db) = e.as_database_error() {
        if db.is_unique_violation() || db.is_foreign_key_violation() || db.is_check_violation() {
            return StorageError::Constraint {
                message: db.message().to_string(),
            }
            .into();
        }
    }
    StorageError::Backend(anyhow::Error::new(e)).into()
}
