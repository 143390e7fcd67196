//! Synchronous surface over [`Repository`]
//!
//! Every call drives the async implementation to completion on a private
//! current-thread runtime, so results are identical to the async surface.
//! Must not be used from inside an async context.

use crate::core::entity::Entity;
use crate::core::error::{GatewayError, Result};
use crate::core::page::Page;
use crate::core::query::{OrderSpec, Predicate, Projection, StorageQuery};
use crate::core::repository::{ReadQuery, Repository};
use crate::core::store::StorageSession;
use tokio::runtime::{Builder, Runtime};

pub struct BlockingRepository<T: Entity, S: StorageSession<T>> {
    inner: Repository<T, S>,
    runtime: Runtime,
}

impl<T: Entity, S: StorageSession<T>> Repository<T, S> {
    /// Switch to the blocking surface
    pub fn into_blocking(self) -> Result<BlockingRepository<T, S>> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| GatewayError::backend(format!("Failed to start runtime: {}", e)))?;
        Ok(BlockingRepository {
            inner: self,
            runtime,
        })
    }
}

impl<T: Entity, S: StorageSession<T>> BlockingRepository<T, S> {
    pub fn inner(&self) -> &Repository<T, S> {
        &self.inner
    }

    pub fn into_inner(self) -> Repository<T, S> {
        self.inner
    }

    pub fn read<R>(&self, projection: Projection<T, R>) -> BlockingReadQuery<'_, T, S, R> {
        BlockingReadQuery {
            query: self.inner.read(projection),
            runtime: &self.runtime,
        }
    }

    pub fn search<R>(
        &self,
        projection: Projection<T, R>,
        criteria: &str,
    ) -> BlockingReadQuery<'_, T, S, R> {
        self.read(projection).search(criteria)
    }

    pub fn count(&self, predicate: Option<Predicate>) -> Result<usize> {
        self.runtime.block_on(self.inner.count(predicate))
    }

    pub fn long_count(&self, predicate: Option<Predicate>) -> Result<u64> {
        self.runtime.block_on(self.inner.long_count(predicate))
    }

    pub fn any(&self, predicate: Option<Predicate>) -> Result<bool> {
        self.runtime.block_on(self.inner.any(predicate))
    }

    pub fn find(&self, key: &T::Key) -> Result<Option<T>> {
        self.runtime.block_on(self.inner.find(key))
    }

    pub fn create(&self, entity: T) -> Result<T> {
        self.runtime.block_on(self.inner.create(entity))
    }

    pub fn create_many(&self, entities: Vec<T>) -> Result<Vec<T>> {
        self.runtime.block_on(self.inner.create_many(entities))
    }

    pub fn update(&self, entity: T) -> Result<T> {
        self.runtime.block_on(self.inner.update(entity))
    }

    pub fn update_many(&self, entities: Vec<T>) -> Result<Vec<T>> {
        self.runtime.block_on(self.inner.update_many(entities))
    }

    pub fn delete(&self, key: T::Key) -> Result<usize> {
        self.runtime.block_on(self.inner.delete(key))
    }

    pub fn delete_many(&self, keys: Vec<T::Key>) -> Result<usize> {
        self.runtime.block_on(self.inner.delete_many(keys))
    }

    pub fn restore(&self, key: T::Key) -> Result<usize> {
        self.runtime.block_on(self.inner.restore(key))
    }

    pub fn restore_many(&self, keys: Vec<T::Key>) -> Result<usize> {
        self.runtime.block_on(self.inner.restore_many(keys))
    }

    pub fn create_or_update(&self, entity: T) -> Result<T> {
        self.runtime.block_on(self.inner.create_or_update(entity))
    }

    pub fn create_or_update_many(&self, entities: Vec<T>) -> Result<Vec<T>> {
        self.runtime.block_on(self.inner.create_or_update_many(entities))
    }
}

/// Blocking counterpart of [`ReadQuery`]
pub struct BlockingReadQuery<'r, T: Entity, S: StorageSession<T>, R> {
    query: ReadQuery<'r, T, S, R>,
    runtime: &'r Runtime,
}

impl<'r, T: Entity, S: StorageSession<T>, R> BlockingReadQuery<'r, T, S, R> {
    fn map(self, f: impl FnOnce(ReadQuery<'r, T, S, R>) -> ReadQuery<'r, T, S, R>) -> Self {
        Self {
            query: f(self.query),
            runtime: self.runtime,
        }
    }

    pub fn filter(self, predicate: Predicate) -> Self {
        self.map(|q| q.filter(predicate))
    }

    pub fn search(self, criteria: &str) -> Self {
        self.map(|q| q.search(criteria))
    }

    pub fn order_by(self, order: OrderSpec) -> Self {
        self.map(|q| q.order_by(order))
    }

    pub fn include(self, relation: impl Into<String>) -> Self {
        self.map(|q| q.include(relation))
    }

    pub fn skip(self, skip: i64) -> Self {
        self.map(|q| q.skip(skip))
    }

    pub fn take(self, take: i64) -> Self {
        self.map(|q| q.take(take))
    }

    pub fn disable_tracking(self) -> Self {
        self.map(ReadQuery::disable_tracking)
    }

    pub fn ignore_query_filters(self) -> Self {
        self.map(ReadQuery::ignore_query_filters)
    }

    pub fn include_deleted(self) -> Self {
        self.map(ReadQuery::include_deleted)
    }

    pub fn compose(&self) -> Result<StorageQuery> {
        self.query.compose()
    }

    pub fn to_list(&self) -> Result<Vec<R>> {
        self.runtime.block_on(self.query.to_list())
    }

    pub fn to_page(&self) -> Result<Page<R>> {
        self.runtime.block_on(self.query.to_page())
    }

    pub fn first_or_default(&self) -> Result<Option<R>> {
        self.runtime.block_on(self.query.first_or_default())
    }

    pub fn last_or_default(&self) -> Result<Option<R>> {
        self.runtime.block_on(self.query.last_or_default())
    }

    pub fn count(&self) -> Result<u64> {
        self.runtime.block_on(self.query.count())
    }
}
