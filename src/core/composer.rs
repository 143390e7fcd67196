//! Composition of loosely-typed read intent into a predicate and ordering
//!
//! The composer never touches rows: everything it produces is a
//! [`Predicate`] or [`OrderSpec`] a storage session translates natively.

use crate::core::entity::{Entity, field_names};
use crate::core::field::{FieldValue, SearchMethod};
use crate::core::query::{OrderSpec, Predicate, Projection};
use tracing::trace;

/// Builds filters and orderings for the repository
#[derive(Debug, Clone, Copy)]
pub struct Composer {
    list_separator: char,
}

impl Default for Composer {
    fn default() -> Self {
        Self::new(',')
    }
}

impl Composer {
    pub fn new(list_separator: char) -> Self {
        Self { list_separator }
    }

    pub fn list_separator(&self) -> char {
        self.list_separator
    }

    /// `P AND is_deleted = false` for soft-deletable entities, unless deleted
    /// rows were explicitly asked for
    pub fn soft_delete_filter<T: Entity>(
        &self,
        predicate: Option<Predicate>,
        include_deleted: bool,
    ) -> Option<Predicate> {
        if include_deleted || !T::capabilities().soft_delete {
            return predicate;
        }
        let not_deleted = Predicate::eq(field_names::IS_DELETED, false);
        Some(match predicate {
            Some(p) => p.and(not_deleted),
            None => not_deleted,
        })
    }

    /// OR-chain of per-field comparisons for every token × projected field.
    ///
    /// A token that does not convert to a field's kind, or converts to the
    /// kind's default value, is skipped for that field only. Returns `None`
    /// when nothing could be composed.
    pub fn search<T: Entity, R>(
        &self,
        projection: &Projection<T, R>,
        criteria: &str,
    ) -> Option<Predicate> {
        let tokens: Vec<&str> = criteria
            .split(self.list_separator)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();

        let mut terms = Vec::new();
        for token in &tokens {
            for def in projection.fields() {
                let value = match def.kind.parse(token) {
                    Some(v) if !v.is_default() => v,
                    _ => {
                        trace!(
                            entity = T::resource_name(),
                            field = def.name,
                            token = *token,
                            kind = %def.kind,
                            "search token skipped for field"
                        );
                        continue;
                    }
                };
                terms.push(search_term(def.name, def.kind.search_method(), value));
            }
        }

        Predicate::any_of(terms)
    }

    /// The explicit ordering when given, else the first directly comparable
    /// projected field ascending, else no ordering
    pub fn resolve_order<T: Entity, R>(
        &self,
        explicit: Option<OrderSpec>,
        projection: &Projection<T, R>,
    ) -> OrderSpec {
        if let Some(order) = explicit.filter(|o| !o.is_empty()) {
            return order;
        }
        projection
            .fields()
            .iter()
            .find(|def| def.is_directly_comparable())
            .map(|def| OrderSpec::asc(def.name))
            .unwrap_or_default()
    }

    /// Non-positive skip means no skip, non-positive take means no limit
    pub fn normalize_paging(skip: i64, take: i64) -> (Option<usize>, Option<usize>) {
        let normalize = |n: i64| usize::try_from(n).ok().filter(|n| *n > 0);
        (normalize(skip), normalize(take))
    }
}

fn search_term(field: &str, method: SearchMethod, value: FieldValue) -> Predicate {
    match method {
        SearchMethod::Contains => match value {
            FieldValue::String(s) => Predicate::contains(field, s.to_lowercase()),
            other => Predicate::eq(field, other),
        },
        SearchMethod::Equals => Predicate::eq(field, value),
        // compare(value) == 0, expressed with the two bounds
        SearchMethod::CompareTo => {
            Predicate::ge(field, value.clone()).and(Predicate::le(field, value))
        }
    }
}
