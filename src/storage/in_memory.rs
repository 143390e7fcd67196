//! In-memory storage session for testing and development

use crate::conventions::EntityModel;
use crate::core::entity::{Entity, EntityKey, field_names};
use crate::core::error::{ConflictError, GatewayError, Result, StorageError};
use crate::core::query::{FilterBypass, Predicate, StorageQuery};
use crate::core::store::StorageSession;
use crate::storage::{apply_column_defaults, prepare_insert, prepare_replace};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, trace};

struct StoreState<T: Entity> {
    rows: BTreeMap<T::Key, T>,
    /// Highest key handed out; keys are never reused
    last_key: Option<T::Key>,
}

/// Shared in-memory table for one entity type
///
/// Cloning is cheap and every clone sees the same rows. Open one
/// [`InMemorySession`] per unit of work.
pub struct InMemoryStore<T: Entity> {
    model: Arc<EntityModel>,
    state: Arc<RwLock<StoreState<T>>>,
}

impl<T: Entity> Clone for InMemoryStore<T> {
    fn clone(&self) -> Self {
        Self {
            model: Arc::clone(&self.model),
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Entity> InMemoryStore<T> {
    pub fn new(model: Arc<EntityModel>) -> Self {
        Self {
            model,
            state: Arc::new(RwLock::new(StoreState {
                rows: BTreeMap::new(),
                last_key: None,
            })),
        }
    }

    /// Open a new unit of work over this store
    pub fn session(&self) -> InMemorySession<T> {
        InMemorySession {
            store: self.clone(),
            pending: Mutex::new(Vec::new()),
            tracked: Mutex::new(HashMap::new()),
        }
    }

    /// Every committed row, ignoring standing filters
    pub fn rows(&self) -> Result<Vec<T>> {
        let state = self.read()?;
        Ok(state.rows.values().cloned().collect())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, StoreState<T>>> {
        self.state
            .read()
            .map_err(|e| GatewayError::backend(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, StoreState<T>>> {
        self.state
            .write()
            .map_err(|e| GatewayError::backend(format!("Failed to acquire write lock: {}", e)))
    }

    fn allocate_key(&self, requested: &T::Key) -> Result<T::Key> {
        let mut state = self.write()?;
        let key = if requested.is_unset() {
            T::Key::next_after(state.last_key.as_ref())
        } else {
            requested.clone()
        };
        if state.last_key.as_ref().is_none_or(|last| key > *last) {
            state.last_key = Some(key.clone());
        }
        Ok(key)
    }
}

enum Change<T: Entity> {
    Insert(T),
    Update {
        entity: T,
        expected_version: Option<i64>,
    },
    Delete(T::Key),
}

/// Unit of work over an [`InMemoryStore`]
///
/// Staged changes are applied atomically by `save_changes`: either every
/// change lands or none does.
pub struct InMemorySession<T: Entity> {
    store: InMemoryStore<T>,
    pending: Mutex<Vec<Change<T>>>,
    tracked: Mutex<HashMap<T::Key, T>>,
}

impl<T: Entity> InMemorySession<T> {
    fn stage(&self, changes: impl IntoIterator<Item = Change<T>>) -> Result<()> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|e| GatewayError::backend(format!("Failed to lock pending changes: {}", e)))?;
        pending.extend(changes);
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

    fn effective_filter(&self, filter: Option<&Predicate>, bypass: FilterBypass) -> Predicate {
        self.store
            .model
            .effective_filter(filter, bypass)
            .unwrap_or(Predicate::True)
    }

    fn fetch_now(&self, query: &StorageQuery) -> Result<Vec<T>> {
        if !query.includes.is_empty() {
            trace!(
                entity = T::resource_name(),
                includes = ?query.includes,
                "includes have no effect on in-memory rows"
            );
        }

        let filter = self.effective_filter(query.filter.as_ref(), query.bypass);
        let mut rows: Vec<T> = {
            let state = self.store.read()?;
            state
                .rows
                .values()
                .filter(|row| filter.evaluate(*row))
                .cloned()
                .collect()
        };

        if !query.order.is_empty() {
            // stable sort keeps key order among equal rows
            rows.sort_by(|a, b| query.order.compare(a, b));
        }

        let rows: Vec<T> = rows
            .into_iter()
            .skip(query.skip.unwrap_or(0))
            .take(query.take.unwrap_or(usize::MAX))
            .collect();

        if query.tracking {
            self.track(&rows)?;
        }
        Ok(rows)
    }

    fn count_now(&self, filter: Option<&Predicate>, bypass: FilterBypass) -> Result<u64> {
        let filter = self.effective_filter(filter, bypass);
        let state = self.store.read()?;
        Ok(state.rows.values().filter(|row| filter.evaluate(*row)).count() as u64)
    }

    fn inserts(&self, entities: &mut [T]) -> Result<Vec<Change<T>>> {
        let now = Utc::now();
        for entity in entities.iter_mut() {
            let key = self.store.allocate_key(&entity.id())?;
            entity.set_id(key);
            apply_column_defaults(&self.store.model, entity, now);
            prepare_insert(&self.store.model, entity);
        }
        self.track(entities.iter())?;
        Ok(entities.iter().cloned().map(Change::Insert).collect())
    }

    fn updates(&self, entities: &mut [T]) -> Result<Vec<Change<T>>> {
        let versioned = self.store.model.capabilities.versioned;
        let mut changes = Vec::with_capacity(entities.len());
        for entity in entities.iter_mut() {
            let expected_version = prepare_replace(versioned, entity);
            changes.push(Change::Update {
                entity: entity.clone(),
                expected_version,
            });
        }
        self.track(entities.iter())?;
        Ok(changes)
    }

    fn deletes(&self, keys: &[T::Key]) -> Result<Vec<Change<T>>> {
        self.untrack(keys)?;
        Ok(keys.iter().cloned().map(Change::Delete).collect())
    }

    fn take_pending(&self) -> Result<Vec<Change<T>>> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|e| GatewayError::backend(format!("Failed to lock pending changes: {}", e)))?;
        Ok(std::mem::take(&mut *pending))
    }

    fn save_now(&self) -> Result<usize> {
        let changes = self.take_pending()?;
        self.apply(changes)
    }

    /// Apply staged work and `changes` in one pass under a single write lock
    fn bulk_now(&self, changes: Vec<Change<T>>) -> Result<usize> {
        let mut all = self.take_pending()?;
        all.extend(changes);
        self.apply(all)
    }

    /// Apply `changes` atomically: every change lands or none does
    fn apply(&self, changes: Vec<Change<T>>) -> Result<usize> {
        if changes.is_empty() {
            return Ok(0);
        }

        let model = &self.store.model;
        let mut state = self.store.write()?;
        let mut rows = state.rows.clone();
        let mut affected = 0;

        for change in changes {
            match change {
                Change::Insert(entity) => {
                    let key = entity.id();
                    if rows.contains_key(&key) {
                        return Err(StorageError::DuplicateKey {
                            entity: T::resource_name().to_string(),
                            key: key.to_string(),
                        }
                        .into());
                    }
                    rows.insert(key, entity);
                    affected += 1;
                }
                Change::Update {
                    mut entity,
                    expected_version,
                } => {
                    let key = entity.id();
                    let Some(stored) = rows.get(&key) else {
                        trace!(entity = T::resource_name(), key = %key, "update of missing key ignored");
                        continue;
                    };
                    if let Some(expected) = expected_version {
                        let actual = stored.row_version().unwrap_or_default();
                        if actual != expected {
                            return Err(ConflictError {
                                entity: T::resource_name().to_string(),
                                key: key.to_string(),
                                expected,
                                actual,
                            }
                            .into());
                        }
                    }
                    if model.capabilities.auditable {
                        if let Some(created_at) = stored.created_at() {
                            entity.set_field_value(
                                field_names::CREATED_AT,
                                created_at.into(),
                            );
                        }
                    }
                    rows.insert(key, entity);
                    affected += 1;
                }
                Change::Delete(key) => {
                    if rows.remove(&key).is_some() {
                        affected += 1;
                    }
                }
            }
        }

        state.rows = rows;
        debug!(entity = T::resource_name(), rows = affected, "in-memory changes saved");
        Ok(affected)
    }
}

#[async_trait]
impl<T: Entity> StorageSession<T> for InMemorySession<T> {
    fn model(&self) -> &Arc<EntityModel> {
        &self.store.model
    }

    async fn fetch(&self, query: &StorageQuery) -> Result<Vec<T>> {
        self.fetch_now(query)
    }

    async fn count(&self, filter: Option<&Predicate>, bypass: FilterBypass) -> Result<u64> {
        self.count_now(filter, bypass)
    }

    async fn add(&self, entities: &mut [T]) -> Result<()> {
        let changes = self.inserts(entities)?;
        self.stage(changes)
    }

    async fn replace(&self, entities: &mut [T]) -> Result<()> {
        let changes = self.updates(entities)?;
        self.stage(changes)
    }

    async fn remove(&self, keys: &[T::Key]) -> Result<()> {
        let changes = self.deletes(keys)?;
        self.stage(changes)
    }

    async fn save_changes(&self) -> Result<usize> {
        self.save_now()
    }

    async fn bulk_insert(&self, entities: &mut [T]) -> Result<usize> {
        let changes = self.inserts(entities)?;
        self.bulk_now(changes)
    }

    async fn bulk_update(&self, entities: &mut [T]) -> Result<usize> {
        let changes = self.updates(entities)?;
        self.bulk_now(changes)
    }

    async fn bulk_delete(&self, keys: &[T::Key]) -> Result<usize> {
        let changes = self.deletes(keys)?;
        self.bulk_now(changes)
    }

    fn tracked_len(&self) -> usize {
        self.tracked.lock().map(|t| t.len()).unwrap_or(0)
    }
}
