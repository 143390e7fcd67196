//! Entity traits defining the core abstraction for all persisted records

use crate::core::field::{FieldDef, FieldKind, FieldType, FieldValue};
use chrono::{DateTime, Utc};
use std::fmt::{Debug, Display};
use std::hash::Hash;
use uuid::Uuid;

/// Field names the capability detection looks for
pub mod field_names {
    pub const ID: &str = "id";
    pub const IS_DELETED: &str = "is_deleted";
    pub const DELETED_AT: &str = "deleted_at";
    pub const DELETED_BY_ID: &str = "deleted_by_id";
    pub const CREATED_AT: &str = "created_at";
    pub const MODIFIED_AT: &str = "modified_at";
    pub const ROW_VERSION: &str = "row_version";
}

/// Primary key types.
///
/// `Default::default()` is the "not yet persisted" sentinel: an entity whose
/// key still equals it is routed to create, anything else to update.
pub trait EntityKey:
    FieldType + Clone + Default + Eq + Ord + Hash + Debug + Display + Send + Sync + 'static
{
    /// Whether SQL backends let the database assign the key on insert
    const DATABASE_GENERATED: bool;

    /// Generate the key following `last` (the highest key handed out so far)
    fn next_after(last: Option<&Self>) -> Self;

    fn is_unset(&self) -> bool {
        *self == Self::default()
    }
}

impl EntityKey for i64 {
    const DATABASE_GENERATED: bool = true;

    fn next_after(last: Option<&Self>) -> Self {
        last.map_or(1, |k| k.saturating_add(1).max(1))
    }
}

impl EntityKey for i32 {
    const DATABASE_GENERATED: bool = true;

    fn next_after(last: Option<&Self>) -> Self {
        last.map_or(1, |k| k.saturating_add(1).max(1))
    }
}

impl EntityKey for Uuid {
    const DATABASE_GENERATED: bool = false;

    fn next_after(_last: Option<&Self>) -> Self {
        Uuid::new_v4()
    }
}

/// Optional behaviours an entity opts into by declaring the matching fields
///
/// - soft delete: `is_deleted: bool` and `deleted_at: Option<DateTime<Utc>>`
/// - auditable: `created_at: DateTime<Utc>` and `modified_at: Option<DateTime<Utc>>`
/// - versioned: `row_version: i64`, the optimistic-concurrency token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub soft_delete: bool,
    pub auditable: bool,
    pub versioned: bool,
}

impl Capabilities {
    /// Inspect declared fields. Done once per type when its model is built.
    pub fn detect(fields: &[FieldDef]) -> Self {
        let has = |name: &str, kind: FieldKind, nullable: bool| {
            fields
                .iter()
                .any(|f| f.name == name && f.kind == kind && f.nullable == nullable)
        };

        Self {
            soft_delete: has(field_names::IS_DELETED, FieldKind::Boolean, false)
                && has(field_names::DELETED_AT, FieldKind::Timestamp, true),
            auditable: has(field_names::CREATED_AT, FieldKind::Timestamp, false)
                && has(field_names::MODIFIED_AT, FieldKind::Timestamp, true),
            versioned: has(field_names::ROW_VERSION, FieldKind::Integer, false),
        }
    }
}

/// Base trait for all persisted records.
///
/// Implementations are normally generated by [`impl_entity!`](crate::impl_entity).
/// Field access is dynamic (by name) so the composer and the storage sessions
/// can work with any entity without knowing its concrete type.
pub trait Entity: Clone + Default + Debug + Send + Sync + 'static {
    type Key: EntityKey;

    /// Singular resource name (e.g., "client")
    fn resource_name() -> &'static str;

    /// Declared properties, in declaration order, key first
    fn fields() -> &'static [FieldDef];

    fn id(&self) -> Self::Key;

    fn set_id(&mut self, id: Self::Key);

    /// Read a field by its exact name
    fn field_value(&self, field: &str) -> Option<FieldValue>;

    /// Write a field by its exact name. Returns `false` for unknown fields or
    /// values of the wrong kind.
    fn set_field_value(&mut self, field: &str, value: FieldValue) -> bool;

    // === Utility Methods ===

    /// Case-insensitive lookup of a declared field
    fn field(name: &str) -> Option<&'static FieldDef> {
        Self::fields()
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Conventions this type opts into. Detects on every call; implementations
    /// generated by [`impl_entity!`](crate::impl_entity) cache the result.
    fn capabilities() -> Capabilities {
        Capabilities::detect(Self::fields())
    }

    /// Check if the entity has been soft-deleted
    fn is_deleted(&self) -> bool {
        matches!(
            self.field_value(field_names::IS_DELETED),
            Some(FieldValue::Boolean(true))
        )
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self.field_value(field_names::DELETED_AT) {
            Some(FieldValue::DateTime(dt)) => Some(dt),
            _ => None,
        }
    }

    /// Flag the entity as soft-deleted. Leaves an already deleted entity untouched
    /// and returns whether anything changed.
    fn mark_deleted(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_deleted() {
            return false;
        }
        self.set_field_value(field_names::IS_DELETED, FieldValue::Boolean(true))
            && self.set_field_value(field_names::DELETED_AT, FieldValue::DateTime(at))
    }

    /// Clear the soft-delete markers. Returns whether anything changed.
    fn restore(&mut self) -> bool {
        if !self.is_deleted() {
            return false;
        }
        self.set_field_value(field_names::DELETED_BY_ID, FieldValue::Null);
        self.set_field_value(field_names::IS_DELETED, FieldValue::Boolean(false))
            && self.set_field_value(field_names::DELETED_AT, FieldValue::Null)
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        match self.field_value(field_names::CREATED_AT) {
            Some(FieldValue::DateTime(dt)) => Some(dt),
            _ => None,
        }
    }

    fn modified_at(&self) -> Option<DateTime<Utc>> {
        match self.field_value(field_names::MODIFIED_AT) {
            Some(FieldValue::DateTime(dt)) => Some(dt),
            _ => None,
        }
    }

    /// Stamp the modification time of an auditable entity
    fn touch(&mut self, at: DateTime<Utc>) {
        self.set_field_value(field_names::MODIFIED_AT, FieldValue::DateTime(at));
    }

    fn row_version(&self) -> Option<i64> {
        self.field_value(field_names::ROW_VERSION)
            .and_then(|v| v.as_integer())
    }

    fn set_row_version(&mut self, version: i64) {
        self.set_field_value(field_names::ROW_VERSION, FieldValue::Integer(version));
    }
}
