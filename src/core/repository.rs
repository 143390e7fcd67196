//! Generic repository: the composer in front of a storage session
//!
//! Reads are described with a lazy [`ReadQuery`] and executed by its
//! terminal operations. Writes pick a [`BatchStrategy`] per call from the
//! configured thresholds and commit chunks strictly in input order.

use crate::config::GatewayConfig;
use crate::core::batch::{BatchStrategy, BatchThresholds};
use crate::core::composer::Composer;
use crate::core::entity::{Capabilities, Entity, EntityKey, field_names};
use crate::core::error::{GatewayError, Result};
use crate::core::field::FieldType;
use crate::core::page::Page;
use crate::core::query::{FilterBypass, OrderSpec, Predicate, Projection, StorageQuery};
use crate::core::store::StorageSession;
use chrono::Utc;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteKind {
    Create,
    Update,
}

impl WriteKind {
    fn operation(self) -> &'static str {
        match self {
            WriteKind::Create => "create",
            WriteKind::Update => "update",
        }
    }
}

/// Repository over the session of one unit of work.
///
/// The repository borrows the session (through the `Arc`) and never caches
/// entities itself; change tracking is the session's business.
///
/// # Example
///
/// ```rust,ignore
/// let repo = Repository::new(Arc::new(store.session()), &config);
///
/// let created = repo.create(Client { code: "ABC-100".into(), ..Default::default() }).await?;
///
/// let page = repo
///     .search(Projection::identity(), "ABC")
///     .order_by(OrderSpec::dynamic::<Client>(&[("code", "asc")]))
///     .skip(0)
///     .take(20)
///     .to_page()
///     .await?;
/// ```
pub struct Repository<T: Entity, S: StorageSession<T>> {
    session: Arc<S>,
    thresholds: BatchThresholds,
    composer: Composer,
    cancellation: Option<CancellationToken>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity, S: StorageSession<T>> Clone for Repository<T, S> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            thresholds: self.thresholds,
            composer: self.composer,
            cancellation: self.cancellation.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity, S: StorageSession<T>> Repository<T, S> {
    /// Wrap `session`, copying the batch and search settings out of `config`
    pub fn new(session: Arc<S>, config: &GatewayConfig) -> Self {
        Self {
            session,
            thresholds: config.batch,
            composer: Composer::new(config.search.list_separator),
            cancellation: None,
            _entity: PhantomData,
        }
    }

    /// Observe `token` between the chunks of every batch write
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn session(&self) -> &Arc<S> {
        &self.session
    }

    pub fn thresholds(&self) -> BatchThresholds {
        self.thresholds
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    /// Conventions detected when the session's model was built
    fn capabilities(&self) -> Capabilities {
        self.session.model().capabilities
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Describe a read shaped by `projection`. Nothing runs until a terminal
    /// operation is awaited.
    pub fn read<R>(&self, projection: Projection<T, R>) -> ReadQuery<'_, T, S, R> {
        ReadQuery {
            repo: self,
            projection,
            filter: None,
            criteria: None,
            order: None,
            includes: Vec::new(),
            skip: 0,
            take: 0,
            tracking: true,
            ignore_query_filters: false,
            include_deleted: false,
        }
    }

    /// `read(projection)` narrowed by free-text `criteria`
    pub fn search<R>(&self, projection: Projection<T, R>, criteria: &str) -> ReadQuery<'_, T, S, R> {
        self.read(projection).search(criteria)
    }

    /// Rows matching `predicate`, soft-deleted rows excluded
    pub async fn count(&self, predicate: Option<Predicate>) -> Result<usize> {
        let count = self.long_count(predicate).await?;
        Ok(usize::try_from(count).unwrap_or(usize::MAX))
    }

    pub async fn long_count(&self, predicate: Option<Predicate>) -> Result<u64> {
        if let Some(p) = &predicate {
            p.validate::<T>()?;
        }
        let filter = self.composer.soft_delete_filter::<T>(predicate, false);
        self.session.count(filter.as_ref(), FilterBypass::None).await
    }

    /// Whether any row matches `predicate`
    pub async fn any(&self, predicate: Option<Predicate>) -> Result<bool> {
        let mut query = self.read(Projection::identity()).take(1).disable_tracking();
        if let Some(p) = predicate {
            query = query.filter(p);
        }
        let found = query.compose().map(|q| StorageQuery {
            order: OrderSpec::none(),
            ..q
        })?;
        Ok(!self.session.fetch(&found).await?.is_empty())
    }

    /// Key lookup; `None` when the key is unknown or soft-deleted
    pub async fn find(&self, key: &T::Key) -> Result<Option<T>> {
        self.read(Projection::identity())
            .filter(Predicate::eq(field_names::ID, key.to_field_value()))
            .first_or_default()
            .await
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert one entity, returning it with its key and storage defaults
    pub async fn create(&self, entity: T) -> Result<T> {
        let mut created = self.create_many(vec![entity]).await?;
        created
            .pop()
            .ok_or_else(|| GatewayError::backend("create returned no entity"))
    }

    /// Insert a batch, returning every entity with its key populated, in
    /// input order
    pub async fn create_many(&self, mut entities: Vec<T>) -> Result<Vec<T>> {
        self.write(WriteKind::Create, &mut entities).await?;
        Ok(entities)
    }

    /// Replace one entity. A missing key is a no-op.
    pub async fn update(&self, entity: T) -> Result<T> {
        let mut updated = self.update_many(vec![entity]).await?;
        updated
            .pop()
            .ok_or_else(|| GatewayError::backend("update returned no entity"))
    }

    /// Replace a batch, stamping `modified_at` on auditable entities
    pub async fn update_many(&self, mut entities: Vec<T>) -> Result<Vec<T>> {
        if self.capabilities().auditable {
            let now = Utc::now();
            for entity in &mut entities {
                entity.touch(now);
            }
        }
        self.write(WriteKind::Update, &mut entities).await?;
        Ok(entities)
    }

    /// Delete by key, returning the number of affected rows.
    ///
    /// Soft-deletable entities are flagged instead of removed, and an
    /// already deleted entity keeps its first `deleted_at`.
    pub async fn delete(&self, key: T::Key) -> Result<usize> {
        self.delete_many(vec![key]).await
    }

    pub async fn delete_many(&self, keys: Vec<T::Key>) -> Result<usize> {
        if !self.capabilities().soft_delete {
            return self.remove(&keys).await;
        }

        let now = Utc::now();
        let auditable = self.capabilities().auditable;
        let mut flagged: Vec<T> = self
            .load(&keys)
            .await?
            .into_iter()
            .filter_map(|mut entity| {
                if !entity.mark_deleted(now) {
                    return None;
                }
                if auditable {
                    entity.touch(now);
                }
                Some(entity)
            })
            .collect();

        debug!(
            entity = T::resource_name(),
            requested = keys.len(),
            rows = flagged.len(),
            "soft delete"
        );
        self.write(WriteKind::Update, &mut flagged).await
    }

    /// Clear the soft-delete markers of `key`. Entities that are not deleted,
    /// or not soft-deletable at all, are left alone.
    pub async fn restore(&self, key: T::Key) -> Result<usize> {
        self.restore_many(vec![key]).await
    }

    pub async fn restore_many(&self, keys: Vec<T::Key>) -> Result<usize> {
        if !self.capabilities().soft_delete {
            return Ok(0);
        }

        let now = Utc::now();
        let auditable = self.capabilities().auditable;
        let mut restored: Vec<T> = self
            .load(&keys)
            .await?
            .into_iter()
            .filter_map(|mut entity| {
                if !entity.restore() {
                    return None;
                }
                if auditable {
                    entity.touch(now);
                }
                Some(entity)
            })
            .collect();

        debug!(entity = T::resource_name(), rows = restored.len(), "restore");
        self.write(WriteKind::Update, &mut restored).await
    }

    /// Create when the key is still the default, update otherwise
    pub async fn create_or_update(&self, entity: T) -> Result<T> {
        let mut saved = self.create_or_update_many(vec![entity]).await?;
        saved
            .pop()
            .ok_or_else(|| GatewayError::backend("create_or_update returned no entity"))
    }

    /// Dispatch each entity to create or update, returning them in input
    /// order. Creates are committed before updates.
    pub async fn create_or_update_many(&self, entities: Vec<T>) -> Result<Vec<T>> {
        let mut slots: Vec<bool> = Vec::with_capacity(entities.len());
        let (mut creates, mut updates) = (Vec::new(), Vec::new());
        for entity in entities {
            let is_new = entity.id().is_unset();
            slots.push(is_new);
            if is_new {
                creates.push(entity);
            } else {
                updates.push(entity);
            }
        }

        let created = self.create_many(creates).await?;
        let updated = self.update_many(updates).await?;

        let (mut created, mut updated) = (created.into_iter(), updated.into_iter());
        slots
            .into_iter()
            .map(|is_new| {
                let next = if is_new {
                    created.next()
                } else {
                    updated.next()
                };
                next.ok_or_else(|| GatewayError::backend("create_or_update lost an entity"))
            })
            .collect()
    }

    // =========================================================================
    // Batching
    // =========================================================================

    fn check_cancelled(&self, operation: &'static str, committed: usize) -> Result<()> {
        match &self.cancellation {
            Some(token) if token.is_cancelled() => {
                debug!(entity = T::resource_name(), operation, committed, "batch cancelled");
                Err(GatewayError::Cancelled {
                    operation,
                    committed,
                })
            }
            _ => Ok(()),
        }
    }

    async fn stage(&self, kind: WriteKind, entities: &mut [T]) -> Result<()> {
        match kind {
            WriteKind::Create => self.session.add(entities).await,
            WriteKind::Update => self.session.replace(entities).await,
        }
    }

    async fn write(&self, kind: WriteKind, entities: &mut [T]) -> Result<usize> {
        if entities.is_empty() {
            return Ok(0);
        }
        let operation = kind.operation();
        let strategy = self.thresholds.strategy_for(entities.len());
        debug!(
            entity = T::resource_name(),
            operation,
            rows = entities.len(),
            %strategy,
            "batch strategy selected"
        );

        match strategy {
            BatchStrategy::Direct => {
                self.check_cancelled(operation, 0)?;
                self.stage(kind, entities).await?;
                self.session.save_changes().await
            }
            BatchStrategy::Bulk => {
                self.check_cancelled(operation, 0)?;
                match kind {
                    WriteKind::Create => self.session.bulk_insert(entities).await,
                    WriteKind::Update => self.session.bulk_update(entities).await,
                }
            }
            BatchStrategy::Chunked { chunk_size } => {
                let mut committed = 0;
                let mut affected = 0;
                for (index, chunk) in entities.chunks_mut(chunk_size).enumerate() {
                    self.check_cancelled(operation, committed)?;
                    self.stage(kind, chunk).await?;
                    affected += self.session.save_changes().await?;
                    committed += chunk.len();
                    trace!(
                        entity = T::resource_name(),
                        operation,
                        chunk = index,
                        rows = chunk.len(),
                        "chunk committed"
                    );
                }
                Ok(affected)
            }
        }
    }

    /// Physical delete through the batch tiers
    async fn remove(&self, keys: &[T::Key]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let operation = "delete";
        let strategy = self.thresholds.strategy_for(keys.len());
        debug!(
            entity = T::resource_name(),
            operation,
            rows = keys.len(),
            %strategy,
            "batch strategy selected"
        );

        match strategy {
            BatchStrategy::Direct => {
                self.check_cancelled(operation, 0)?;
                self.session.remove(keys).await?;
                self.session.save_changes().await
            }
            BatchStrategy::Bulk => {
                self.check_cancelled(operation, 0)?;
                self.session.bulk_delete(keys).await
            }
            BatchStrategy::Chunked { chunk_size } => {
                let mut committed = 0;
                let mut affected = 0;
                for (index, chunk) in keys.chunks(chunk_size).enumerate() {
                    self.check_cancelled(operation, committed)?;
                    self.session.remove(chunk).await?;
                    affected += self.session.save_changes().await?;
                    committed += chunk.len();
                    trace!(
                        entity = T::resource_name(),
                        operation,
                        chunk = index,
                        rows = chunk.len(),
                        "chunk committed"
                    );
                }
                Ok(affected)
            }
        }
    }

    /// Load entities by key including soft-deleted ones, in key order of
    /// `keys`; unknown keys are skipped
    async fn load(&self, keys: &[T::Key]) -> Result<Vec<T>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let query = StorageQuery {
            filter: Some(Predicate::is_in(
                field_names::ID,
                keys.iter().map(FieldType::to_field_value),
            )),
            tracking: true,
            bypass: FilterBypass::SoftDelete,
            ..Default::default()
        };
        let mut by_key: HashMap<T::Key, T> = self
            .session
            .fetch(&query)
            .await?
            .into_iter()
            .map(|e| (e.id(), e))
            .collect();

        Ok(keys.iter().filter_map(|k| by_key.remove(k)).collect())
    }
}

// =============================================================================
// Lazy reads
// =============================================================================

/// A composed but not yet executed read.
///
/// Terminal operations (`to_list`, `to_page`, `first_or_default`,
/// `last_or_default`, `count`) take `&self`; each call runs a fresh query.
pub struct ReadQuery<'r, T: Entity, S: StorageSession<T>, R> {
    repo: &'r Repository<T, S>,
    projection: Projection<T, R>,
    filter: Option<Predicate>,
    criteria: Option<String>,
    order: Option<OrderSpec>,
    includes: Vec<String>,
    skip: i64,
    take: i64,
    tracking: bool,
    ignore_query_filters: bool,
    include_deleted: bool,
}

impl<'r, T: Entity, S: StorageSession<T>, R> ReadQuery<'r, T, S, R> {
    /// AND `predicate` into the filter
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter = Predicate::conjoin(self.filter.take(), Some(predicate));
        self
    }

    pub fn search(mut self, criteria: &str) -> Self {
        self.criteria = Some(criteria.to_string());
        self
    }

    /// Explicit ordering, used verbatim
    pub fn order_by(mut self, order: OrderSpec) -> Self {
        self.order = Some(order);
        self
    }

    /// Load-related hint passed through to the session
    pub fn include(mut self, relation: impl Into<String>) -> Self {
        self.includes.push(relation.into());
        self
    }

    /// Non-positive values mean no skip
    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = skip;
        self
    }

    /// Non-positive values mean no limit
    pub fn take(mut self, take: i64) -> Self {
        self.take = take;
        self
    }

    pub fn disable_tracking(mut self) -> Self {
        self.tracking = false;
        self
    }

    /// Bypass every standing filter, soft delete included
    pub fn ignore_query_filters(mut self) -> Self {
        self.ignore_query_filters = true;
        self
    }

    /// Bypass only the soft-delete filter
    pub fn include_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    /// Assemble the storage query: validate, inject the soft-delete filter,
    /// AND the search chain, resolve ordering and normalize paging
    pub fn compose(&self) -> Result<StorageQuery> {
        let composer = &self.repo.composer;

        if let Some(filter) = &self.filter {
            filter.validate::<T>()?;
        }
        if let Some(order) = &self.order {
            order.validate::<T>()?;
        }

        let include_deleted = self.include_deleted || self.ignore_query_filters;
        let mut filter = composer.soft_delete_filter::<T>(self.filter.clone(), include_deleted);

        if let Some(criteria) = &self.criteria {
            let search = composer.search(&self.projection, criteria);
            if search.is_none() {
                trace!(entity = T::resource_name(), criteria = %criteria, "search composed nothing");
            }
            filter = Predicate::conjoin(filter, search);
        }

        let order = composer.resolve_order(self.order.clone(), &self.projection);
        let (skip, take) = Composer::normalize_paging(self.skip, self.take);
        let bypass = if self.ignore_query_filters {
            FilterBypass::All
        } else if self.include_deleted {
            FilterBypass::SoftDelete
        } else {
            FilterBypass::None
        };

        Ok(StorageQuery {
            filter,
            order,
            skip,
            take,
            includes: self.includes.clone(),
            tracking: self.tracking,
            bypass,
        })
    }

    async fn run(&self, query: StorageQuery) -> Result<Vec<R>> {
        let rows = self.repo.session.fetch(&query).await?;
        trace!(entity = T::resource_name(), rows = rows.len(), "read");
        Ok(rows.iter().map(|row| self.projection.apply(row)).collect())
    }

    pub async fn to_list(&self) -> Result<Vec<R>> {
        self.run(self.compose()?).await
    }

    /// The requested page plus the total count of matching rows
    pub async fn to_page(&self) -> Result<Page<R>> {
        let query = self.compose()?;
        let total = self
            .repo
            .session
            .count(query.filter.as_ref(), query.bypass)
            .await?;
        let (skip, take) = (query.skip, query.take);
        let items = self.run(query).await?;
        Ok(Page::new(items, total, skip, take))
    }

    pub async fn first_or_default(&self) -> Result<Option<R>> {
        let query = StorageQuery {
            take: Some(1),
            ..self.compose()?
        };
        Ok(self.run(query).await?.into_iter().next())
    }

    /// The row with the highest key after filters.
    ///
    /// This is key order, not insertion order: for random (UUID) keys the
    /// result is arbitrary among the matches.
    pub async fn last_or_default(&self) -> Result<Option<R>> {
        let query = StorageQuery {
            order: OrderSpec::desc(field_names::ID),
            skip: None,
            take: Some(1),
            ..self.compose()?
        };
        Ok(self.run(query).await?.into_iter().next())
    }

    /// Rows matching the composed filter, ignoring paging
    pub async fn count(&self) -> Result<u64> {
        let query = self.compose()?;
        self.repo
            .session
            .count(query.filter.as_ref(), query.bypass)
            .await
    }
}
