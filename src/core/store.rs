//! The storage session contract the repository is written against

use crate::conventions::EntityModel;
use crate::core::entity::{Entity, field_names};
use crate::core::error::Result;
use crate::core::field::FieldType;
use crate::core::query::{FilterBypass, OrderSpec, Predicate, StorageQuery};
use async_trait::async_trait;
use std::sync::Arc;

/// A unit of work over one entity type.
///
/// Reads execute immediately. Writes are staged by `add`, `replace` and
/// `remove` and become durable on `save_changes`. The `bulk_*` operations
/// bypass staging: they write the whole batch set-based and are durable on
/// return, together with anything staged before them. Their default bodies
/// fall back to staging and saving, for sessions with no set-based path.
///
/// Sessions apply the model's standing filters to every read unless the
/// query bypasses them, and translate [`Predicate`]s natively.
#[async_trait]
pub trait StorageSession<T: Entity>: Send + Sync {
    /// The model this session was opened for
    fn model(&self) -> &Arc<EntityModel>;

    /// Execute a composed read
    async fn fetch(&self, query: &StorageQuery) -> Result<Vec<T>>;

    /// Count rows matching `filter` and the standing filters not bypassed
    async fn count(&self, filter: Option<&Predicate>, bypass: FilterBypass) -> Result<u64>;

    /// Stage inserts. Keys are populated on return.
    async fn add(&self, entities: &mut [T]) -> Result<()>;

    /// Stage full replacements. Versioned entities get their new
    /// `row_version` on return; a stale version fails with a conflict no
    /// later than the next `save_changes`.
    async fn replace(&self, entities: &mut [T]) -> Result<()>;

    /// Stage physical deletes. Unknown keys are ignored.
    async fn remove(&self, keys: &[T::Key]) -> Result<()>;

    /// Commit staged work, returning the number of affected rows
    async fn save_changes(&self) -> Result<usize>;

    /// Number of entities currently tracked by the session
    fn tracked_len(&self) -> usize;

    /// Resolve an entity by key
    async fn find(&self, key: &T::Key, bypass: FilterBypass) -> Result<Option<T>> {
        let query = StorageQuery {
            filter: Some(Predicate::eq(field_names::ID, key.to_field_value())),
            order: OrderSpec::none(),
            take: Some(1),
            tracking: true,
            bypass,
            ..Default::default()
        };
        Ok(self.fetch(&query).await?.into_iter().next())
    }

    /// Insert and commit a batch, returning the rows affected
    async fn bulk_insert(&self, entities: &mut [T]) -> Result<usize> {
        self.add(entities).await?;
        self.save_changes().await
    }

    async fn bulk_update(&self, entities: &mut [T]) -> Result<usize> {
        self.replace(entities).await?;
        self.save_changes().await
    }

    async fn bulk_delete(&self, keys: &[T::Key]) -> Result<usize> {
        self.remove(keys).await?;
        self.save_changes().await
    }
}
