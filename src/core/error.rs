//! Typed error handling for the gateway
//!
//! Every fallible operation returns [`GatewayError`], a category enum wrapping
//! a more specific error type so callers can match on what went wrong instead
//! of string-matching a generic error.
//!
//! # Error Categories
//!
//! - [`ValidationError`]: a predicate, order or projection could not be composed
//! - [`ConflictError`]: an optimistic-concurrency token did not match
//! - [`StorageError`]: the backend failed (constraint, decoding, connectivity)
//! - [`ConfigError`]: configuration could not be loaded or is inconsistent
//! - `Cancelled`: a batch was interrupted between two chunks
//!
//! # Example
//!
//! ```rust,ignore
//! match repo.update(budget).await {
//!     Ok(saved) => println!("saved version {:?}", saved.row_version()),
//!     Err(GatewayError::Conflict(conflict)) => {
//!         // reload and retry, or surface a 409
//!         eprintln!("stale write: {conflict}");
//!     }
//!     Err(e) => return Err(e),
//! }
//! ```

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// The main error type of the gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Caller input could not be composed into a query
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Stale write detected through the concurrency token
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// Backend failure, propagated unchanged
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A batch operation observed its cancellation token between chunks
    #[error("{operation} cancelled after {committed} committed rows")]
    Cancelled {
        operation: &'static str,
        committed: usize,
    },
}

impl GatewayError {
    /// Stable identifier for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::Validation(e) => e.error_code(),
            GatewayError::Conflict(_) => "CONCURRENCY_CONFLICT",
            GatewayError::Storage(e) => e.error_code(),
            GatewayError::Config(_) => "CONFIG_ERROR",
            GatewayError::Cancelled { .. } => "OPERATION_CANCELLED",
        }
    }

    /// Whether retrying the same call after reloading could succeed
    pub fn is_conflict(&self) -> bool {
        matches!(self, GatewayError::Conflict(_))
    }

    pub(crate) fn backend(message: impl std::fmt::Display) -> Self {
        GatewayError::Storage(StorageError::Backend(anyhow::anyhow!("{}", message)))
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Errors raised while composing caller input into a query
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A predicate, order or projection referenced an undeclared field
    #[error("unknown field '{field}' on {entity}")]
    UnknownField { entity: String, field: String },

    /// A comparison value cannot be compared with the field
    #[error("field '{field}' on {entity} is {expected}, cannot compare it with {value}")]
    KindMismatch {
        entity: String,
        field: String,
        expected: String,
        value: String,
    },

    /// `contains` was used on a field that is not text
    #[error("'contains' needs a text field, '{field}' on {entity} is {kind}")]
    NotText {
        entity: String,
        field: String,
        kind: String,
    },

    /// The session was built for another entity model or provider
    #[error("{message}")]
    Model { message: String },
}

impl ValidationError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ValidationError::UnknownField { .. } => "UNKNOWN_FIELD",
            ValidationError::KindMismatch { .. } => "FIELD_KIND_MISMATCH",
            ValidationError::NotText { .. } => "FIELD_NOT_TEXT",
            ValidationError::Model { .. } => "MODEL_MISMATCH",
        }
    }
}

// =============================================================================
// Conflict Errors
// =============================================================================

/// Raised when the stored `row_version` differs from the one being written
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{entity} '{key}' was modified concurrently (expected version {expected}, found {actual})")]
pub struct ConflictError {
    pub entity: String,
    pub key: String,
    pub expected: i64,
    pub actual: i64,
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors coming from a storage session
#[derive(Debug, Error)]
pub enum StorageError {
    /// Insert of a key that already exists
    #[error("{entity} with key '{key}' already exists")]
    DuplicateKey { entity: String, key: String },

    /// Any other constraint the engine rejected
    #[error("constraint violation: {message}")]
    Constraint { message: String },

    /// A stored column could not be turned back into a field value
    #[error("failed to decode {entity}.{field}: {message}")]
    Decode {
        entity: String,
        field: String,
        message: String,
    },

    /// Opaque backend error (driver, connection, poisoned lock)
    #[error("{0:#}")]
    Backend(anyhow::Error),
}

impl StorageError {
    pub fn error_code(&self) -> &'static str {
        match self {
            StorageError::DuplicateKey { .. } => "DUPLICATE_KEY",
            StorageError::Constraint { .. } => "CONSTRAINT_VIOLATION",
            StorageError::Decode { .. } => "DECODE_ERROR",
            StorageError::Backend(_) => "STORAGE_ERROR",
        }
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Failed to parse configuration
    #[error("failed to parse configuration: {message}")]
    Parse { message: String },

    /// A value is present but unusable
    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// IO error while reading configuration
    #[error("IO error: {message}")]
    Io { message: String },
}
