//! SQL rendering of composed queries and staged writes
//!
//! Every statement is rendered with placeholders and a list of bind values;
//! literal values never reach the SQL text.

use crate::conventions::{ColumnDefault, ColumnSpec, EntityModel, Provider};
use crate::core::entity::{Entity, EntityKey, field_names};
use crate::core::field::{FieldType, FieldValue};
use crate::core::query::{Direction, FilterBypass, OrderSpec, Predicate, StorageQuery};
use crate::storage::is_unset;

/// Escape character used by rendered `LIKE` patterns
const LIKE_ESCAPE: char = '!';

/// A rendered statement and its bind values, in placeholder order
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub binds: Vec<FieldValue>,
}

/// Collects bind values while numbering placeholders
struct Binder {
    provider: Provider,
    binds: Vec<FieldValue>,
}

impl Binder {
    fn new(provider: Provider) -> Self {
        Self {
            provider,
            binds: Vec::new(),
        }
    }

    fn push(&mut self, value: FieldValue) -> String {
        self.binds.push(value);
        self.provider.placeholder(self.binds.len())
    }

    fn finish(self, sql: String) -> SqlStatement {
        SqlStatement {
            sql,
            binds: self.binds,
        }
    }
}

/// Renders statements for one entity model
pub struct SqlRenderer<'a> {
    model: &'a EntityModel,
}

impl<'a> SqlRenderer<'a> {
    pub fn new(model: &'a EntityModel) -> Self {
        Self { model }
    }

    fn provider(&self) -> Provider {
        self.model.provider
    }

    fn quote(&self, identifier: &str) -> String {
        self.provider().quote(identifier)
    }

    fn table(&self) -> String {
        self.quote(&self.model.table)
    }

    fn column_list<'c>(&self, columns: impl IntoIterator<Item = &'c ColumnSpec>) -> String {
        columns
            .into_iter()
            .map(|c| self.quote(c.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn where_clause(
        &self,
        binder: &mut Binder,
        filter: Option<&Predicate>,
        bypass: FilterBypass,
    ) -> String {
        match self.model.effective_filter(filter, bypass) {
            Some(predicate) => format!(" WHERE {}", self.predicate(binder, &predicate)),
            None => String::new(),
        }
    }

    /// `SELECT` of every column with filters, ordering and paging
    pub fn select(&self, query: &StorageQuery) -> SqlStatement {
        let mut binder = Binder::new(self.provider());
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.column_list(&self.model.columns),
            self.table()
        );
        sql.push_str(&self.where_clause(&mut binder, query.filter.as_ref(), query.bypass));
        sql.push_str(&self.order_by(&query.order));
        sql.push_str(
            &self
                .provider()
                .paging(query.skip, query.take, !query.order.is_empty()),
        );
        binder.finish(sql)
    }

    pub fn count(&self, filter: Option<&Predicate>, bypass: FilterBypass) -> SqlStatement {
        let mut binder = Binder::new(self.provider());
        let mut sql = format!("SELECT COUNT(*) FROM {}", self.table());
        sql.push_str(&self.where_clause(&mut binder, filter, bypass));
        binder.finish(sql)
    }

    /// Columns an `INSERT` of `entity` writes.
    ///
    /// An unset generated key and unset columns with an engine default are
    /// left out so the engine fills them.
    pub fn insert_columns<T: Entity>(&self, entity: &T) -> Vec<&'a ColumnSpec> {
        self.model
            .columns
            .iter()
            .filter(|c| !(c.primary_key && c.generated && entity.id().is_unset()))
            .filter(|c| {
                !(c.default == Some(ColumnDefault::CurrentTimestamp) && is_unset(entity, c.name))
            })
            .collect()
    }

    /// `INSERT` of one row. Every column is read back when the provider can
    /// return rows from an insert.
    pub fn insert<T: Entity>(&self, entity: &T) -> SqlStatement {
        self.insert_many(std::slice::from_ref(entity))
    }

    /// Multi-row `INSERT`, one `VALUES` tuple per entity.
    ///
    /// The column list comes from the first entity; callers group rows whose
    /// [`insert_columns`](Self::insert_columns) agree.
    pub fn insert_many<T: Entity>(&self, entities: &[T]) -> SqlStatement {
        let mut binder = Binder::new(self.provider());
        let columns = entities
            .first()
            .map(|first| self.insert_columns(first))
            .unwrap_or_default();

        let tuples: Vec<String> = entities
            .iter()
            .map(|entity| {
                let values: Vec<String> = columns
                    .iter()
                    .map(|c| binder.push(entity.field_value(c.name).unwrap_or(FieldValue::Null)))
                    .collect();
                format!("({})", values.join(", "))
            })
            .collect();

        let column_list = self.column_list(columns.iter().copied());
        let sql = match self.provider() {
            Provider::SqlServer => {
                let inserted: Vec<String> = self
                    .model
                    .columns
                    .iter()
                    .map(|c| format!("INSERTED.{}", self.quote(c.name)))
                    .collect();
                format!(
                    "INSERT INTO {} ({}) OUTPUT {} VALUES {}",
                    self.table(),
                    column_list,
                    inserted.join(", "),
                    tuples.join(", ")
                )
            }
            p if p.supports_returning() => format!(
                "INSERT INTO {} ({}) VALUES {} RETURNING {}",
                self.table(),
                column_list,
                tuples.join(", "),
                self.column_list(&self.model.columns)
            ),
            _ => format!(
                "INSERT INTO {} ({}) VALUES {}",
                self.table(),
                column_list,
                tuples.join(", ")
            ),
        };
        binder.finish(sql)
    }

    /// Columns an `UPDATE` rewrites: everything but the key and columns with
    /// an engine default
    fn update_columns(&self) -> impl Iterator<Item = &'a ColumnSpec> {
        self.model
            .columns
            .iter()
            .filter(|c| !c.primary_key && c.default.is_none())
    }

    /// Bind values one row of [`update_many`](Self::update_many) carries
    pub fn update_width(&self) -> usize {
        let version = usize::from(self.model.capabilities.versioned);
        1 + self.update_columns().count() + version
    }

    /// `UPDATE` of one row by key. Columns with an engine default are set
    /// once at insert and never rewritten. With `expected_version`, only a
    /// row still carrying that version matches.
    pub fn update<T: Entity>(&self, entity: &T, expected_version: Option<i64>) -> SqlStatement {
        let mut binder = Binder::new(self.provider());
        let assignments: Vec<String> = self
            .update_columns()
            .map(|c| {
                let value = entity.field_value(c.name).unwrap_or(FieldValue::Null);
                format!("{} = {}", self.quote(c.name), binder.push(value))
            })
            .collect();

        let mut sql = format!(
            "UPDATE {} SET {} WHERE {} = {}",
            self.table(),
            assignments.join(", "),
            self.quote(field_names::ID),
            binder.push(entity.id().to_field_value())
        );
        if let Some(expected) = expected_version {
            sql.push_str(&format!(
                " AND {} = {}",
                self.quote(field_names::ROW_VERSION),
                binder.push(FieldValue::Integer(expected))
            ));
        }
        binder.finish(sql)
    }

    /// Set-based `UPDATE` of many rows from a `VALUES` list joined on the
    /// key (`UPDATE ... FROM`, SQLite and PostgreSQL).
    ///
    /// `expected_versions` runs parallel to `entities`; when the model is
    /// versioned, a row only matches while it still carries its expected
    /// version. Missing keys match nothing.
    pub fn update_many<T: Entity>(
        &self,
        entities: &[T],
        expected_versions: &[Option<i64>],
    ) -> SqlStatement {
        let mut binder = Binder::new(self.provider());
        let versioned = self.model.capabilities.versioned;
        let batch = self.quote("batch");
        let expected = self.quote("expected_version");
        let columns: Vec<&ColumnSpec> = self.update_columns().collect();

        let mut names = vec![self.quote(field_names::ID)];
        names.extend(columns.iter().map(|c| self.quote(c.name)));
        if versioned {
            names.push(expected.clone());
        }

        let tuples: Vec<String> = entities
            .iter()
            .zip(expected_versions)
            .map(|(entity, version)| {
                let mut values = vec![binder.push(entity.id().to_field_value())];
                values.extend(columns.iter().map(|c| {
                    binder.push(entity.field_value(c.name).unwrap_or(FieldValue::Null))
                }));
                if versioned {
                    values.push(binder.push(version.map_or(FieldValue::Null, FieldValue::Integer)));
                }
                format!("({})", values.join(", "))
            })
            .collect();

        let assignments: Vec<String> = columns
            .iter()
            .map(|c| format!("{} = {}.{}", self.quote(c.name), batch, self.quote(c.name)))
            .collect();
        let id = self.quote(field_names::ID);

        let mut sql = format!(
            "WITH {} ({}) AS (VALUES {}) UPDATE {} SET {} FROM {} WHERE {}.{} = {}.{}",
            batch,
            names.join(", "),
            tuples.join(", "),
            self.table(),
            assignments.join(", "),
            batch,
            self.table(),
            id,
            batch,
            id
        );
        if versioned {
            sql.push_str(&format!(
                " AND {}.{} = {}.{}",
                self.table(),
                self.quote(field_names::ROW_VERSION),
                batch,
                expected
            ));
        }
        if self.provider().supports_returning() {
            sql.push_str(&format!(" RETURNING {}", id));
        }
        binder.finish(sql)
    }

    /// Keys among `keys` that are already stored, ignoring standing filters
    pub fn existing_keys<K: EntityKey>(&self, keys: &[K]) -> SqlStatement {
        let mut binder = Binder::new(self.provider());
        let in_list = self.in_list(&mut binder, keys.iter().map(FieldType::to_field_value));
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            self.quote(field_names::ID),
            self.table(),
            in_list_or_false(self.quote(field_names::ID), in_list)
        );
        binder.finish(sql)
    }

    /// Key and concurrency token of every row whose key is in `keys`,
    /// ignoring standing filters
    pub fn versions<K: EntityKey>(&self, keys: &[K]) -> SqlStatement {
        let mut binder = Binder::new(self.provider());
        let in_list = self.in_list(&mut binder, keys.iter().map(FieldType::to_field_value));
        let sql = format!(
            "SELECT {}, {} FROM {} WHERE {}",
            self.quote(field_names::ID),
            self.quote(field_names::ROW_VERSION),
            self.table(),
            in_list_or_false(self.quote(field_names::ID), in_list)
        );
        binder.finish(sql)
    }

    /// `DELETE` of every row whose key is in `keys`
    pub fn delete<K: EntityKey>(&self, keys: &[K]) -> SqlStatement {
        let mut binder = Binder::new(self.provider());
        let in_list = self.in_list(&mut binder, keys.iter().map(FieldType::to_field_value));
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            self.table(),
            in_list_or_false(self.quote(field_names::ID), in_list)
        );
        binder.finish(sql)
    }

    /// Stored concurrency token of one row, ignoring standing filters
    pub fn current_version<K: EntityKey>(&self, key: &K) -> SqlStatement {
        let mut binder = Binder::new(self.provider());
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            self.quote(field_names::ROW_VERSION),
            self.table(),
            self.quote(field_names::ID),
            binder.push(key.to_field_value())
        );
        binder.finish(sql)
    }

    fn order_by(&self, order: &OrderSpec) -> String {
        if order.is_empty() {
            return String::new();
        }
        let keys: Vec<String> = order
            .keys()
            .iter()
            .map(|key| {
                let direction = match (self.provider(), key.direction) {
                    // match the nulls-first ordering of the other engines
                    (Provider::Postgres, Direction::Asc) => "ASC NULLS FIRST",
                    (Provider::Postgres, Direction::Desc) => "DESC NULLS LAST",
                    (_, Direction::Asc) => "ASC",
                    (_, Direction::Desc) => "DESC",
                };
                format!("{} {}", self.quote(&key.field), direction)
            })
            .collect();
        format!(" ORDER BY {}", keys.join(", "))
    }

    fn in_list(
        &self,
        binder: &mut Binder,
        values: impl IntoIterator<Item = FieldValue>,
    ) -> Vec<String> {
        values.into_iter().map(|v| binder.push(v)).collect()
    }

    fn predicate(&self, binder: &mut Binder, predicate: &Predicate) -> String {
        match predicate {
            Predicate::True => "1 = 1".into(),
            Predicate::Compare { field, op, value } => format!(
                "{} {} {}",
                self.quote(field),
                op.symbol(),
                binder.push(value.clone())
            ),
            Predicate::Contains { field, needle } => {
                let pattern = format!("%{}%", escape_like(&needle.to_lowercase()));
                format!(
                    "LOWER({}) LIKE {} ESCAPE '{}'",
                    self.quote(field),
                    binder.push(FieldValue::String(pattern)),
                    LIKE_ESCAPE
                )
            }
            Predicate::In { field, values } => {
                let list = self.in_list(binder, values.iter().cloned());
                in_list_or_false(self.quote(field), list)
            }
            Predicate::IsNull(field) => format!("{} IS NULL", self.quote(field)),
            Predicate::IsNotNull(field) => format!("{} IS NOT NULL", self.quote(field)),
            Predicate::And(items) => self.junction(binder, items, " AND ", "1 = 1"),
            Predicate::Or(items) => self.junction(binder, items, " OR ", "1 = 0"),
            Predicate::Not(inner) => format!("NOT ({})", self.predicate(binder, inner)),
        }
    }

    fn junction(
        &self,
        binder: &mut Binder,
        items: &[Predicate],
        separator: &str,
        empty: &str,
    ) -> String {
        if items.is_empty() {
            return empty.to_string();
        }
        let parts: Vec<String> = items.iter().map(|p| self.predicate(binder, p)).collect();
        format!("({})", parts.join(separator))
    }
}

fn in_list_or_false(column: String, list: Vec<String>) -> String {
    if list.is_empty() {
        "1 = 0".into()
    } else {
        format!("{} IN ({})", column, list.join(", "))
    }
}

fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_') || c == LIKE_ESCAPE {
            out.push(LIKE_ESCAPE);
        }
        out.push(c);
    }
    out
}
