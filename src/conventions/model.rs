//! Per-entity storage model, built once by applying the conventions

use crate::config::ModelConfig;
use crate::conventions::naming;
use crate::conventions::provider::Provider;
use crate::core::entity::{Capabilities, Entity, EntityKey, field_names};
use crate::core::error::{ConfigError, Result};
use crate::core::field::{FieldDef, FieldKind};
use crate::core::query::{FilterBypass, Predicate};
use tracing::debug;

/// Default value generated by the storage engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnDefault {
    CurrentTimestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub sql_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    /// Key assigned by the database on insert
    pub generated: bool,
    pub default: Option<ColumnDefault>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub columns: Vec<&'static str>,
}

/// Everything a session needs to know about how an entity is stored
#[derive(Debug, Clone, PartialEq)]
pub struct EntityModel {
    pub resource: &'static str,
    pub table: String,
    pub provider: Provider,
    pub capabilities: Capabilities,
    /// Standing `is_deleted = false` filter installed on the model
    pub soft_delete_filter: bool,
    pub columns: Vec<ColumnSpec>,
    pub indexes: Vec<IndexSpec>,
}

impl EntityModel {
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn key_column(&self) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Whether the database assigns keys on insert
    pub fn key_generated(&self) -> bool {
        self.key_column().is_some_and(|c| c.generated)
    }

    /// The standing filters still active under `bypass`
    pub fn standing_filter(&self, bypass: FilterBypass) -> Option<Predicate> {
        match bypass {
            FilterBypass::None if self.soft_delete_filter => {
                Some(Predicate::eq(field_names::IS_DELETED, false))
            }
            _ => None,
        }
    }

    /// `filter` combined with the standing filters, `None` when nothing applies
    pub fn effective_filter(
        &self,
        filter: Option<&Predicate>,
        bypass: FilterBypass,
    ) -> Option<Predicate> {
        Predicate::conjoin(self.standing_filter(bypass), filter.cloned())
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for the model
    pub fn create_table_sql(&self) -> String {
        let p = self.provider;
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let name = p.quote(c.name);
                if c.primary_key && c.generated {
                    return format!("{} {}", name, p.auto_increment_key());
                }
                let mut def = format!("{} {}", name, c.sql_type);
                if c.primary_key {
                    def.push_str(" NOT NULL PRIMARY KEY");
                } else if !c.nullable {
                    def.push_str(" NOT NULL");
                }
                if let Some(ColumnDefault::CurrentTimestamp) = c.default {
                    def.push_str(" DEFAULT ");
                    def.push_str(p.current_timestamp());
                }
                def
            })
            .collect();

        let if_not_exists = match p {
            Provider::SqlServer => "",
            _ => " IF NOT EXISTS",
        };
        format!(
            "CREATE TABLE{} {} ({})",
            if_not_exists,
            p.quote(&self.table),
            columns.join(", ")
        )
    }

    /// One `CREATE INDEX` statement per index
    pub fn create_index_sql(&self) -> Vec<String> {
        let p = self.provider;
        let if_not_exists = match p {
            Provider::Sqlite | Provider::Postgres => " IF NOT EXISTS",
            Provider::MySql | Provider::SqlServer => "",
        };
        self.indexes
            .iter()
            .map(|index| {
                let columns: Vec<String> = index.columns.iter().map(|c| p.quote(c)).collect();
                format!(
                    "CREATE INDEX{} {} ON {} ({})",
                    if_not_exists,
                    p.quote(&index.name),
                    p.quote(&self.table),
                    columns.join(", ")
                )
            })
            .collect()
    }
}

/// Applies the naming, soft-delete, audit and provider-type conventions
#[derive(Debug, Clone, Default)]
pub struct ModelBuilder {
    config: ModelConfig,
}

impl ModelBuilder {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    pub fn build<T: Entity>(&self) -> Result<EntityModel> {
        let resource = T::resource_name();
        let capabilities = T::capabilities();
        self.check_overrides::<T>()?;

        let mut model = EntityModel {
            resource,
            table: naming::table_name(resource),
            provider: self.config.provider,
            capabilities,
            soft_delete_filter: false,
            columns: T::fields().iter().map(|f| self.column_for::<T>(f)).collect(),
            indexes: Vec::new(),
        };

        self.apply_soft_delete(&mut model);
        self.apply_audit(&mut model);

        debug!(
            entity = resource,
            table = %model.table,
            provider = %model.provider,
            soft_delete = model.soft_delete_filter,
            auditable = capabilities.auditable,
            versioned = capabilities.versioned,
            "entity model built"
        );
        Ok(model)
    }

    fn column_for<T: Entity>(&self, field: &FieldDef) -> ColumnSpec {
        let primary_key = field.name == field_names::ID;
        let decimal = self
            .config
            .decimal_overrides
            .get(&format!("{}.{}", T::resource_name(), field.name))
            .copied();

        ColumnSpec {
            name: field.name,
            kind: field.kind,
            sql_type: self.config.provider.column_type(
                field,
                decimal,
                self.config.default_string_length,
            ),
            nullable: field.nullable,
            primary_key,
            generated: primary_key && <T::Key as EntityKey>::DATABASE_GENERATED,
            default: None,
        }
    }

    fn apply_soft_delete(&self, model: &mut EntityModel) {
        let excluded = self
            .config
            .soft_delete_exclude
            .iter()
            .any(|r| r.eq_ignore_ascii_case(model.resource));
        model.soft_delete_filter = model.capabilities.soft_delete && !excluded;
    }

    fn apply_audit(&self, model: &mut EntityModel) {
        if !model.capabilities.auditable {
            return;
        }
        for column in &mut model.columns {
            if column.name == field_names::CREATED_AT {
                column.default = Some(ColumnDefault::CurrentTimestamp);
            }
        }
        for field in [field_names::CREATED_AT, field_names::MODIFIED_AT] {
            model.indexes.push(IndexSpec {
                name: format!("ix_{}_{}", model.table, field),
                columns: vec![field],
            });
        }
    }

    /// Overrides aimed at this resource must name one of its float fields
    fn check_overrides<T: Entity>(&self) -> Result<()> {
        let prefix = format!("{}.", T::resource_name());
        for key in self.config.decimal_overrides.keys() {
            let Some(field) = key.strip_prefix(&prefix) else {
                continue;
            };
            let ok = T::fields()
                .iter()
                .any(|f| f.name == field && f.kind == FieldKind::Float);
            if !ok {
                return Err(ConfigError::InvalidValue {
                    field: format!("model.decimal_overrides.{}", key),
                    message: format!("{} has no float field '{}'", T::resource_name(), field),
                }
                .into());
            }
        }
        Ok(())
    }
}
