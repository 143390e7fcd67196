//! Entities shipped with the crate, one per convention combination
//!
//! They double as fixtures for the storage contract tests.

use crate::impl_entity;
use chrono::{DateTime, Utc};
use uuid::Uuid;

impl_entity!(Client, "client", i64, {
    #[max_length(32)]
    code: String,
    #[max_length(200)]
    name: String,
    email: Option<String>,
    is_deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
    deleted_by_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    modified_at: Option<DateTime<Utc>>,
});

impl_entity!(Budget, "budget", i64, {
    #[max_length(100)]
    name: String,
    amount: f64,
    created_at: DateTime<Utc>,
    modified_at: Option<DateTime<Utc>>,
    row_version: i64,
});

// No conventions at all: hard deletes, no audit columns.
impl_entity!(Setting, "setting", i64, {
    #[max_length(100)]
    key: String,
    value: String,
});

impl_entity!(User, "user", Uuid, {
    #[max_length(100)]
    user_name: String,
    email: String,
    is_deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    modified_at: Option<DateTime<Utc>>,
});
