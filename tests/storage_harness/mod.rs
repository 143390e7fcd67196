//! Shared test harness for storage backend testing
//!
//! Provides the [`TestBackend`] seam each backend test file implements,
//! session wrappers that cancel a token after a number of commits or record
//! write calls, and helpers for building repositories and sample rows.
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! #[macro_use]
//! mod storage_harness;
//! use storage_harness::*;
//!
//! repository_contract_tests!(InMemoryStore);
//! ```

#![allow(dead_code)]

#[macro_use]
pub mod repository_tests;

use async_trait::async_trait;
use gateway::config::GatewayConfig;
use gateway::conventions::{EntityModel, ModelRegistry};
use gateway::core::entity::Entity;
use gateway::core::error::Result;
use gateway::core::query::{FilterBypass, Predicate, StorageQuery};
use gateway::core::repository::Repository;
use gateway::core::store::StorageSession;
use gateway::entities::{Budget, Client, Setting};
use gateway::storage::{InMemorySession, InMemoryStore};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Backend seam
// ---------------------------------------------------------------------------

/// A storage backend able to hand out several sessions over the same data
#[async_trait]
pub trait TestBackend<T: Entity>: Send + Sync + Sized {
    type Session: StorageSession<T> + 'static;

    /// Fresh, empty storage for `model`
    async fn open(model: Arc<EntityModel>) -> Self;

    fn session(&self) -> Self::Session;
}

#[async_trait]
impl<T: Entity> TestBackend<T> for InMemoryStore<T> {
    type Session = InMemorySession<T>;

    async fn open(model: Arc<EntityModel>) -> Self {
        InMemoryStore::new(model)
    }

    fn session(&self) -> InMemorySession<T> {
        InMemoryStore::session(self)
    }
}

/// Open a backend for `T` and a repository over one of its sessions.
///
/// The backend is returned too so tests can open further sessions and so
/// that storage living in a temporary directory outlives the test body.
pub async fn repository<T, B>(config: &GatewayConfig) -> (B, Repository<T, B::Session>)
where
    T: Entity,
    B: TestBackend<T>,
{
    let registry = ModelRegistry::new(config.model.clone());
    let model = registry.model_for::<T>().expect("model builds");
    let backend = B::open(model).await;
    let repo = Repository::new(Arc::new(backend.session()), config);
    (backend, repo)
}

/// Install a `tracing` subscriber honouring `RUST_LOG`, once per binary
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Delegates to `inner` and cancels `token` once `saves` commits succeeded
pub struct CancelAfterSaves<S> {
    inner: S,
    token: CancellationToken,
    remaining: AtomicUsize,
}

impl<S> CancelAfterSaves<S> {
    pub fn new(inner: S, token: CancellationToken, saves: usize) -> Self {
        Self {
            inner,
            token,
            remaining: AtomicUsize::new(saves),
        }
    }
}

#[async_trait]
impl<T: Entity, S: StorageSession<T>> StorageSession<T> for CancelAfterSaves<S> {
    fn model(&self) -> &Arc<EntityModel> {
        self.inner.model()
    }

    async fn fetch(&self, query: &StorageQuery) -> Result<Vec<T>> {
        self.inner.fetch(query).await
    }

    async fn count(&self, filter: Option<&Predicate>, bypass: FilterBypass) -> Result<u64> {
        self.inner.count(filter, bypass).await
    }

    async fn add(&self, entities: &mut [T]) -> Result<()> {
        self.inner.add(entities).await
    }

    async fn replace(&self, entities: &mut [T]) -> Result<()> {
        self.inner.replace(entities).await
    }

    async fn remove(&self, keys: &[T::Key]) -> Result<()> {
        self.inner.remove(keys).await
    }

    async fn save_changes(&self) -> Result<usize> {
        let saved = self.inner.save_changes().await?;
        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.token.cancel();
        }
        Ok(saved)
    }

    async fn bulk_insert(&self, entities: &mut [T]) -> Result<usize> {
        self.inner.bulk_insert(entities).await
    }

    async fn bulk_update(&self, entities: &mut [T]) -> Result<usize> {
        self.inner.bulk_update(entities).await
    }

    async fn bulk_delete(&self, keys: &[T::Key]) -> Result<usize> {
        self.inner.bulk_delete(keys).await
    }

    fn tracked_len(&self) -> usize {
        self.inner.tracked_len()
    }
}

// ---------------------------------------------------------------------------
// Call recorder
// ---------------------------------------------------------------------------

/// Delegates to `inner` and records the name of every write call
pub struct RecordingSession<S> {
    inner: S,
    calls: Mutex<Vec<&'static str>>,
}

impl<S> RecordingSession<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Write calls recorded since the last call to `take_calls`
    pub fn take_calls(&self) -> Vec<&'static str> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl<T: Entity, S: StorageSession<T>> StorageSession<T> for RecordingSession<S> {
    fn model(&self) -> &Arc<EntityModel> {
        self.inner.model()
    }

    async fn fetch(&self, query: &StorageQuery) -> Result<Vec<T>> {
        self.inner.fetch(query).await
    }

    async fn count(&self, filter: Option<&Predicate>, bypass: FilterBypass) -> Result<u64> {
        self.inner.count(filter, bypass).await
    }

    async fn add(&self, entities: &mut [T]) -> Result<()> {
        self.record("add");
        self.inner.add(entities).await
    }

    async fn replace(&self, entities: &mut [T]) -> Result<()> {
        self.record("replace");
        self.inner.replace(entities).await
    }

    async fn remove(&self, keys: &[T::Key]) -> Result<()> {
        self.record("remove");
        self.inner.remove(keys).await
    }

    async fn save_changes(&self) -> Result<usize> {
        self.record("save_changes");
        self.inner.save_changes().await
    }

    async fn bulk_insert(&self, entities: &mut [T]) -> Result<usize> {
        self.record("bulk_insert");
        self.inner.bulk_insert(entities).await
    }

    async fn bulk_update(&self, entities: &mut [T]) -> Result<usize> {
        self.record("bulk_update");
        self.inner.bulk_update(entities).await
    }

    async fn bulk_delete(&self, keys: &[T::Key]) -> Result<usize> {
        self.record("bulk_delete");
        self.inner.bulk_delete(keys).await
    }

    fn tracked_len(&self) -> usize {
        self.inner.tracked_len()
    }
}

// ---------------------------------------------------------------------------
// Sample data
// ---------------------------------------------------------------------------

pub fn client(code: &str) -> Client {
    Client {
        code: code.to_string(),
        name: format!("Client {}", code),
        ..Default::default()
    }
}

/// `n` clients coded `C-000`, `C-001`, ...
pub fn sample_clients(n: usize) -> Vec<Client> {
    (0..n).map(|i| client(&format!("C-{:03}", i))).collect()
}

pub fn setting(key: &str, value: &str) -> Setting {
    Setting {
        key: key.to_string(),
        value: value.to_string(),
        ..Default::default()
    }
}

/// `n` settings keyed `k0`, `k1`, ...
pub fn sample_settings(n: usize) -> Vec<Setting> {
    (0..n).map(|i| setting(&format!("k{}", i), &i.to_string())).collect()
}

pub fn budget(name: &str, amount: f64) -> Budget {
    Budget {
        name: name.to_string(),
        amount,
        ..Default::default()
    }
}

/// Assert that a list contains exactly `n` entities.
pub fn assert_count<T>(list: &[T], expected: usize) {
    assert_eq!(
        list.len(),
        expected,
        "Expected {} items, got {}",
        expected,
        list.len()
    );
}
