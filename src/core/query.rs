//! Query building blocks: predicates, ordering, projections and the
//! descriptor handed to storage sessions
//!
//! Predicates form a small AST instead of closures so every backend can
//! translate them to its native query form (SQL `WHERE`, in-memory scan).

use crate::core::entity::Entity;
use crate::core::error::{Result, ValidationError};
use crate::core::field::{FieldDef, FieldKind, FieldValue};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Boolean filter over an entity's fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    True,
    Compare {
        field: String,
        op: CompareOp,
        value: FieldValue,
    },
    /// Case-insensitive substring match on a text field
    Contains {
        field: String,
        needle: String,
    },
    In {
        field: String,
        values: Vec<FieldValue>,
    },
    IsNull(String),
    IsNotNull(String),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<FieldValue>) -> Self {
        Predicate::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    pub fn le(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Le, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    pub fn ge(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Ge, value)
    }

    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Predicate::Contains {
            field: field.into(),
            needle: needle.into(),
        }
    }

    pub fn is_in<V: Into<FieldValue>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Predicate::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Predicate::IsNull(field.into())
    }

    pub fn is_not_null(field: impl Into<String>) -> Self {
        Predicate::IsNotNull(field.into())
    }

    /// Structural conjunction; nested `And`s are flattened and `True` is absorbed
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::True, p) | (p, Predicate::True) => p,
            (Predicate::And(mut left), Predicate::And(right)) => {
                left.extend(right);
                Predicate::And(left)
            }
            (Predicate::And(mut left), p) => {
                left.push(p);
                Predicate::And(left)
            }
            (p, Predicate::And(mut right)) => {
                right.insert(0, p);
                Predicate::And(right)
            }
            (left, right) => Predicate::And(vec![left, right]),
        }
    }

    /// Structural disjunction; nested `Or`s are flattened
    pub fn or(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::Or(mut left), Predicate::Or(right)) => {
                left.extend(right);
                Predicate::Or(left)
            }
            (Predicate::Or(mut left), p) => {
                left.push(p);
                Predicate::Or(left)
            }
            (left, right) => Predicate::Or(vec![left, right]),
        }
    }

    pub fn negate(self) -> Predicate {
        match self {
            Predicate::Not(inner) => *inner,
            p => Predicate::Not(Box::new(p)),
        }
    }

    /// AND of every predicate, `None` when the iterator is empty
    pub fn and_all(predicates: impl IntoIterator<Item = Predicate>) -> Option<Predicate> {
        predicates.into_iter().reduce(Predicate::and)
    }

    /// OR of every predicate, `None` when the iterator is empty
    pub fn any_of(predicates: impl IntoIterator<Item = Predicate>) -> Option<Predicate> {
        predicates.into_iter().reduce(Predicate::or)
    }

    /// AND two optional predicates
    pub fn conjoin(left: Option<Predicate>, right: Option<Predicate>) -> Option<Predicate> {
        match (left, right) {
            (Some(l), Some(r)) => Some(l.and(r)),
            (l, r) => l.or(r),
        }
    }

    /// Every field name referenced by the predicate
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::True => {}
            Predicate::Compare { field, .. }
            | Predicate::Contains { field, .. }
            | Predicate::In { field, .. }
            | Predicate::IsNull(field)
            | Predicate::IsNotNull(field) => out.push(field),
            Predicate::And(items) | Predicate::Or(items) => {
                for item in items {
                    item.collect_fields(out);
                }
            }
            Predicate::Not(inner) => inner.collect_fields(out),
        }
    }

    /// Check fields exist on `T` and values fit their kinds
    pub fn validate<T: Entity>(&self) -> Result<()> {
        match self {
            Predicate::True => Ok(()),
            Predicate::Compare { field, value, .. } => {
                let def = declared::<T>(field)?;
                check_fits::<T>(def, value)
            }
            Predicate::In { field, values } => {
                let def = declared::<T>(field)?;
                values.iter().try_for_each(|v| check_fits::<T>(def, v))
            }
            Predicate::Contains { field, .. } => {
                let def = declared::<T>(field)?;
                if def.kind != FieldKind::Text {
                    return Err(ValidationError::NotText {
                        entity: T::resource_name().to_string(),
                        field: field.clone(),
                        kind: def.kind.to_string(),
                    }
                    .into());
                }
                Ok(())
            }
            Predicate::IsNull(field) | Predicate::IsNotNull(field) => {
                declared::<T>(field).map(|_| ())
            }
            Predicate::And(items) | Predicate::Or(items) => {
                items.iter().try_for_each(|p| p.validate::<T>())
            }
            Predicate::Not(inner) => inner.validate::<T>(),
        }
    }

    /// Evaluate against a materialized entity (used by the in-memory backend).
    ///
    /// Comparisons involving null are false, as in SQL.
    pub fn evaluate<T: Entity>(&self, entity: &T) -> bool {
        match self {
            Predicate::True => true,
            Predicate::Compare { field, op, value } => entity
                .field_value(field)
                .and_then(|actual| actual.compare(value))
                .is_some_and(|ordering| op.holds(ordering)),
            Predicate::Contains { field, needle } => match entity.field_value(field) {
                Some(FieldValue::String(s)) => s.to_lowercase().contains(&needle.to_lowercase()),
                _ => false,
            },
            Predicate::In { field, values } => entity.field_value(field).is_some_and(|actual| {
                values
                    .iter()
                    .any(|v| actual.compare(v) == Some(Ordering::Equal))
            }),
            Predicate::IsNull(field) => entity.field_value(field).is_some_and(|v| v.is_null()),
            Predicate::IsNotNull(field) => {
                entity.field_value(field).is_some_and(|v| !v.is_null())
            }
            Predicate::And(items) => items.iter().all(|p| p.evaluate(entity)),
            Predicate::Or(items) => items.iter().any(|p| p.evaluate(entity)),
            Predicate::Not(inner) => !inner.evaluate(entity),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::True => write!(f, "true"),
            Predicate::Compare { field, op, value } => {
                write!(f, "{} {} {}", field, op.symbol(), value)
            }
            Predicate::Contains { field, needle } => write!(f, "{} contains '{}'", field, needle),
            Predicate::In { field, values } => {
                let values: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "{} in ({})", field, values.join(", "))
            }
            Predicate::IsNull(field) => write!(f, "{} is null", field),
            Predicate::IsNotNull(field) => write!(f, "{} is not null", field),
            Predicate::And(items) => join(f, items, " and "),
            Predicate::Or(items) => join(f, items, " or "),
            Predicate::Not(inner) => write!(f, "not ({})", inner),
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, items: &[Predicate], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, ")")
}

fn declared<T: Entity>(field: &str) -> Result<&'static FieldDef> {
    T::fields().iter().find(|f| f.name == field).ok_or_else(|| {
        ValidationError::UnknownField {
            entity: T::resource_name().to_string(),
            field: field.to_string(),
        }
        .into()
    })
}

fn check_fits<T: Entity>(def: &FieldDef, value: &FieldValue) -> Result<()> {
    if value.fits(def.kind) {
        Ok(())
    } else {
        Err(ValidationError::KindMismatch {
            entity: T::resource_name().to_string(),
            field: def.name.to_string(),
            expected: def.kind.to_string(),
            value: value.to_string(),
        }
        .into())
    }
}

// =============================================================================
// Ordering
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    /// Exactly "asc" sorts ascending; anything else sorts descending
    pub fn parse(direction: &str) -> Self {
        if direction == "asc" {
            Direction::Asc
        } else {
            Direction::Desc
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderKey {
    pub field: String,
    pub direction: Direction,
}

/// Multi-key ordering; later keys break ties left by earlier ones
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    keys: Vec<OrderKey>,
}

impl OrderSpec {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::none().then(field, Direction::Asc)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::none().then(field, Direction::Desc)
    }

    pub fn then(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.keys.push(OrderKey {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn then_asc(self, field: impl Into<String>) -> Self {
        self.then(field, Direction::Asc)
    }

    pub fn then_desc(self, field: impl Into<String>) -> Self {
        self.then(field, Direction::Desc)
    }

    /// Build an ordering from loosely-typed `(field, direction)` pairs.
    ///
    /// Field names resolve case-insensitively against the declared
    /// properties of `T`; unknown names fall back to the first declared
    /// property instead of failing.
    pub fn dynamic<T: Entity>(args: &[(impl AsRef<str>, impl AsRef<str>)]) -> Self {
        let fallback = T::fields().first().map(|f| f.name);
        let mut spec = Self::none();
        for (name, direction) in args {
            let resolved = T::field(name.as_ref()).map(|f| f.name).or(fallback);
            if let Some(field) = resolved {
                spec = spec.then(field, Direction::parse(direction.as_ref()));
            }
        }
        spec
    }

    pub fn keys(&self) -> &[OrderKey] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn validate<T: Entity>(&self) -> Result<()> {
        self.keys
            .iter()
            .try_for_each(|key| declared::<T>(&key.field).map(|_| ()))
    }

    /// Compare two entities; nulls sort first in ascending order
    pub fn compare<T: Entity>(&self, a: &T, b: &T) -> Ordering {
        for key in &self.keys {
            let left = a.field_value(&key.field).unwrap_or(FieldValue::Null);
            let right = b.field_value(&key.field).unwrap_or(FieldValue::Null);
            let ordering = match (left.is_null(), right.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => left.compare(&right).unwrap_or(Ordering::Equal),
            };
            let ordering = match key.direction {
                Direction::Asc => ordering,
                Direction::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

// =============================================================================
// Projection
// =============================================================================

/// The caller-specified result shape: which entity fields it reads and how
/// an entity maps to `R`.
///
/// The declared fields are the "source expressions" free-text search and
/// default ordering work from.
pub struct Projection<T, R> {
    fields: Vec<&'static FieldDef>,
    map: Arc<dyn Fn(&T) -> R + Send + Sync>,
}

impl<T: Entity, R> Projection<T, R> {
    /// Project `fields` through `map`. Field names resolve case-insensitively.
    pub fn new<F>(fields: &[&str], map: F) -> Result<Self>
    where
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        let fields = fields
            .iter()
            .map(|name| {
                T::field(name).ok_or_else(|| {
                    ValidationError::UnknownField {
                        entity: T::resource_name().to_string(),
                        field: name.to_string(),
                    }
                    .into()
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            fields,
            map: Arc::new(map),
        })
    }

    pub fn fields(&self) -> &[&'static FieldDef] {
        &self.fields
    }

    pub fn apply(&self, entity: &T) -> R {
        (self.map)(entity)
    }
}

impl<T: Entity> Projection<T, T> {
    /// Select every declared field, returning the entity itself
    pub fn identity() -> Self {
        Self {
            fields: T::fields().iter().collect(),
            map: Arc::new(T::clone),
        }
    }
}

impl<T, R> Clone for Projection<T, R> {
    fn clone(&self) -> Self {
        Self {
            fields: self.fields.clone(),
            map: Arc::clone(&self.map),
        }
    }
}

impl<T, R> fmt::Debug for Projection<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.fields.iter().map(|d| d.name).collect();
        f.debug_struct("Projection").field("fields", &names).finish()
    }
}

// =============================================================================
// Storage query descriptor
// =============================================================================

/// Which standing (model-level) filters a query bypasses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterBypass {
    #[default]
    None,
    /// Bypass only the soft-delete filter (`include_deleted`)
    SoftDelete,
    /// Bypass every standing filter (`ignore_query_filters`)
    All,
}

/// A fully composed read, ready for a storage session to execute
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageQuery {
    pub filter: Option<Predicate>,
    pub order: OrderSpec,
    pub skip: Option<usize>,
    pub take: Option<usize>,
    pub includes: Vec<String>,
    pub tracking: bool,
    pub bypass: FilterBypass,
}
