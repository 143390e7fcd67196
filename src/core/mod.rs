//! Core module: entity contract, query composition and the generic repository

pub mod batch;
pub mod blocking;
pub mod composer;
pub mod entity;
pub mod error;
pub mod field;
pub mod page;
pub mod query;
pub mod repository;
pub mod store;

pub use batch::{BatchStrategy, BatchThresholds};
pub use blocking::{BlockingReadQuery, BlockingRepository};
pub use composer::Composer;
pub use entity::{Capabilities, Entity, EntityKey};
pub use error::{GatewayError, Result};
pub use field::{FieldDef, FieldKind, FieldType, FieldValue};
pub use page::Page;
pub use query::{
    CompareOp, Direction, FilterBypass, OrderKey, OrderSpec, Predicate, Projection, StorageQuery,
};
pub use repository::{ReadQuery, Repository};
pub use store::StorageSession;
