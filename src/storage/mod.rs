//! Storage sessions for different backends

pub mod in_memory;
pub mod sql;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::{InMemorySession, InMemoryStore};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteSession, ensure_schema};

use crate::conventions::{ColumnDefault, EntityModel};
use crate::core::entity::Entity;
use crate::core::field::FieldValue;
use chrono::{DateTime, Utc};

/// Fill unset columns that carry an engine-side default, for backends that
/// have no engine to do it
pub(crate) fn apply_column_defaults<T: Entity>(
    model: &EntityModel,
    entity: &mut T,
    now: DateTime<Utc>,
) {
    for column in &model.columns {
        if column.default != Some(ColumnDefault::CurrentTimestamp) {
            continue;
        }
        if is_unset(entity, column.name) {
            entity.set_field_value(column.name, FieldValue::DateTime(now));
        }
    }
}

/// Whether a column holds its type's zero value and should be left to the
/// engine default
pub(crate) fn is_unset<T: Entity>(entity: &T, column: &str) -> bool {
    entity.field_value(column).is_none_or(|v| v.is_default())
}

/// Initial concurrency token of a row about to be inserted
pub(crate) fn prepare_insert<T: Entity>(model: &EntityModel, entity: &mut T) {
    if model.capabilities.versioned {
        entity.set_row_version(1);
    }
}

/// Bump the concurrency token of a row about to be replaced, returning the
/// version the stored row must still carry
pub(crate) fn prepare_replace<T: Entity>(versioned: bool, entity: &mut T) -> Option<i64> {
    if !versioned {
        return None;
    }
    let expected = entity.row_version().unwrap_or_default();
    entity.set_row_version(expected + 1);
    Some(expected)
}
