//! # Entity Gateway
//!
//! A generic persistence gateway: one repository type serves every entity,
//! and reads are composed from predicates instead of hand-written queries.
//!
//! ## Features
//!
//! - **Query Composition**: filters, free-text search over projected fields,
//!   explicit or dynamic ordering and paging, assembled into one storage query
//! - **Soft Delete**: entities declaring `is_deleted`/`deleted_at` are flagged
//!   instead of removed and hidden from reads unless explicitly requested
//! - **Auditing**: `created_at` filled by the storage engine, `modified_at`
//!   stamped on every update
//! - **Optimistic Concurrency**: `row_version` checked and bumped on update
//! - **Batch Tiers**: small writes go direct, medium ones in `ceil(sqrt(n))`
//!   chunks with cancellation in between, large ones through the bulk path
//! - **Provider Conventions**: table names and column types per SQL provider
//! - **Async and Blocking**: the same repository on both surfaces
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gateway::prelude::*;
//! use std::sync::Arc;
//!
//! let config = GatewayConfig::from_yaml_file("config/gateway.yaml")?;
//! let registry = ModelRegistry::new(config.model.clone());
//! let store = InMemoryStore::<Client>::new(registry.model_for::<Client>()?);
//! let repo = Repository::new(Arc::new(store.session()), &config);
//!
//! repo.create(Client { code: "ABC-100".into(), ..Default::default() }).await?;
//!
//! let codes = repo
//!     .search(Projection::new(&["id", "code"], |c: &Client| c.code.clone())?, "abc")
//!     .to_list()
//!     .await?;
//! ```

pub mod config;
pub mod conventions;
pub mod core;
pub mod entities;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        batch::{BatchStrategy, BatchThresholds},
        blocking::{BlockingReadQuery, BlockingRepository},
        composer::Composer,
        entity::{Capabilities, Entity, EntityKey},
        error::{ConfigError, ConflictError, GatewayError, StorageError, ValidationError},
        field::{FieldDef, FieldKind, FieldType, FieldValue},
        page::Page,
        query::{Direction, FilterBypass, OrderSpec, Predicate, Projection, StorageQuery},
        repository::{ReadQuery, Repository},
        store::StorageSession,
    };

    // === Macros ===
    pub use crate::impl_entity;

    // === Conventions ===
    pub use crate::conventions::{EntityModel, ModelBuilder, ModelRegistry, Provider};

    // === Storage ===
    pub use crate::storage::{InMemorySession, InMemoryStore};
    #[cfg(feature = "sqlite")]
    pub use crate::storage::{SqliteSession, ensure_schema};

    // === Config ===
    pub use crate::config::{GatewayConfig, ModelConfig, SearchConfig};

    // === Entities ===
    pub use crate::entities::{Budget, Client, Setting, User};

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, Utc};
    pub use serde::{Deserialize, Serialize};
    pub use tokio_util::sync::CancellationToken;
    pub use uuid::Uuid;
}
