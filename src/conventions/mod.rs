//! Model-building conventions, applied once per entity type
//!
//! - naming: table names are the snake-cased, pluralized resource name
//! - soft delete: standing `is_deleted = false` filter (with an exclude list)
//! - audit: `created_at` defaults to the engine's current timestamp, and
//!   `created_at`/`modified_at` are indexed
//! - provider types: per-engine column types

pub mod model;
pub mod naming;
pub mod provider;
pub mod registry;

pub use model::{ColumnDefault, ColumnSpec, EntityModel, IndexSpec, ModelBuilder};
pub use provider::{DecimalSpec, Provider};
pub use registry::ModelRegistry;
