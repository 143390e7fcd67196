//! Macro-generated test suite validating `Repository` over any storage
//! backend.
//!
//! # Usage
//!
//! ```rust,ignore
//! #[macro_use]
//! mod storage_harness;
//!
//! use storage_harness::*;
//! use gateway::storage::InMemoryStore;
//!
//! repository_contract_tests!(InMemoryStore);
//! ```
//!
//! # Generated Tests
//!
//! ## Reads
//! - soft-deleted rows hidden unless `include_deleted`/`ignore_query_filters`
//! - free-text search over projected fields, text, numeric and timestamps
//! - paging metadata, explicit and dynamic ordering
//! - first/last, count/any, tracking, concurrent reads
//!
//! ## Writes
//! - keys and audit columns on create, `modified_at` on update
//! - create-or-update dispatch, missing keys on update
//! - soft delete idempotence, restore, hard delete without key reuse
//! - chunked and bulk tiers, cancellation between chunks
//! - optimistic concurrency conflicts, staged and bulk

/// Generate the repository conformance suite.
///
/// `$backend` names a generic type implementing `TestBackend<T>` for every
/// entity `T` (e.g. `InMemoryStore`). Each test opens fresh storage.
#[macro_export]
macro_rules! repository_contract_tests {
    ($backend:ident) => {
        mod repository_contract_tests {
            use super::*;
            use gateway::config::GatewayConfig;
            use gateway::core::batch::BatchThresholds;
            use gateway::core::entity::Entity;
            use gateway::core::error::GatewayError;
            use gateway::core::query::{OrderSpec, Predicate, Projection};
            use gateway::core::repository::Repository;
            use gateway::core::store::StorageSession;
            use gateway::entities::{Budget, Client, Setting, User};
            use std::sync::Arc;
            use tokio_util::sync::CancellationToken;
            use uuid::Uuid;

            fn codes(clients: &[Client]) -> Vec<&str> {
                clients.iter().map(|c| c.code.as_str()).collect()
            }

            fn chunked(split: usize) -> GatewayConfig {
                GatewayConfig {
                    batch: BatchThresholds::new(0, split),
                    ..Default::default()
                }
            }

            // ==================================================================
            // Create & find
            // ==================================================================

            #[tokio::test]
            async fn test_create_assigns_key_and_created_at() {
                init_tracing();
                let (_backend, repo) =
                    repository::<Client, $backend<Client>>(&GatewayConfig::default()).await;

                let created = repo.create(client("ABC-100")).await.unwrap();
                assert!(created.id > 0);
                assert!(created.created_at > chrono::DateTime::<chrono::Utc>::default());
                assert_eq!(created.modified_at, None);

                let found = repo.find(&created.id).await.unwrap().expect("created row");
                assert_eq!(found.code, "ABC-100");
                assert_eq!(found.name, "Client ABC-100");
                assert!(!found.is_deleted);
            }

            #[tokio::test]
            async fn test_find_missing_returns_none() {
                let (_backend, repo) =
                    repository::<Client, $backend<Client>>(&GatewayConfig::default()).await;
                assert!(repo.find(&4242).await.unwrap().is_none());
            }

            #[tokio::test]
            async fn test_uuid_keys_are_assigned() {
                let (_backend, repo) =
                    repository::<User, $backend<User>>(&GatewayConfig::default()).await;

                let created = repo
                    .create(User {
                        user_name: "ada".into(),
                        email: "ada@example.com".into(),
                        ..Default::default()
                    })
                    .await
                    .unwrap();
                assert_ne!(created.id, Uuid::nil());

                let found = repo.find(&created.id).await.unwrap().expect("created user");
                assert_eq!(found.user_name, "ada");

                assert_eq!(repo.delete(created.id).await.unwrap(), 1);
                assert!(repo.find(&created.id).await.unwrap().is_none());
            }

            // ==================================================================
            // Soft delete
            // ==================================================================

            #[tokio::test]
            async fn test_soft_deleted_rows_are_hidden() {
                let (_backend, repo) =
                    repository::<Client, $backend<Client>>(&GatewayConfig::default()).await;
                let created = repo
                    .create_many(vec![client("A"), client("B")])
                    .await
                    .unwrap();

                assert_eq!(repo.delete(created[0].id).await.unwrap(), 1);

                let visible = repo.read(Projection::identity()).to_list().await.unwrap();
                assert_eq!(codes(&visible), vec!["B"]);
                assert!(repo.find(&created[0].id).await.unwrap().is_none());
                assert_eq!(repo.count(None).await.unwrap(), 1);

                let all = repo
                    .read(Projection::identity())
                    .include_deleted()
                    .to_list()
                    .await
                    .unwrap();
                assert_eq!(codes(&all), vec!["A", "B"]);
                assert!(all[0].is_deleted);
                assert!(all[0].deleted_at.is_some());
                assert!(all[0].modified_at.is_some());

                let unfiltered = repo
                    .read(Projection::identity())
                    .ignore_query_filters()
                    .count()
                    .await
                    .unwrap();
                assert_eq!(unfiltered, 2);
            }

            #[tokio::test]
            async fn test_second_delete_keeps_first_timestamp() {
                let (_backend, repo) =
                    repository::<Client, $backend<Client>>(&GatewayConfig::default()).await;
                let created = repo.create(client("A")).await.unwrap();

                assert_eq!(repo.delete(created.id).await.unwrap(), 1);
                let first = repo
                    .read(Projection::identity())
                    .include_deleted()
                    .first_or_default()
                    .await
                    .unwrap()
                    .and_then(|c| c.deleted_at)
                    .expect("deleted_at set");

                assert_eq!(repo.delete(created.id).await.unwrap(), 0);
                let second = repo
                    .read(Projection::identity())
                    .include_deleted()
                    .first_or_default()
                    .await
                    .unwrap()
                    .and_then(|c| c.deleted_at);
                assert_eq!(second, Some(first));
            }

            #[tokio::test]
            async fn test_restore_brings_rows_back() {
                let (_backend, repo) =
                    repository::<Client, $backend<Client>>(&GatewayConfig::default()).await;
                let created = repo.create(client("A")).await.unwrap();
                repo.delete(created.id).await.unwrap();

                assert_eq!(repo.restore(created.id).await.unwrap(), 1);
                let restored = repo.find(&created.id).await.unwrap().expect("restored");
                assert!(!restored.is_deleted);
                assert_eq!(restored.deleted_at, None);

                // not deleted any more: nothing to do
                assert_eq!(repo.restore(created.id).await.unwrap(), 0);
            }

            #[tokio::test]
            async fn test_plain_entities_are_hard_deleted() {
                let (_backend, repo) =
                    repository::<Setting, $backend<Setting>>(&GatewayConfig::default()).await;
                let created = repo
                    .create_many(vec![
                        Setting {
                            key: "theme".into(),
                            value: "dark".into(),
                            ..Default::default()
                        },
                        Setting {
                            key: "lang".into(),
                            value: "fr".into(),
                            ..Default::default()
                        },
                    ])
                    .await
                    .unwrap();

                assert_eq!(repo.delete(created[0].id).await.unwrap(), 1);
                assert_eq!(
                    repo.read(Projection::identity())
                        .ignore_query_filters()
                        .count()
                        .await
                        .unwrap(),
                    1
                );
                assert_eq!(repo.restore(created[0].id).await.unwrap(), 0);
                assert_eq!(repo.delete(9999).await.unwrap(), 0);
            }

            // ==================================================================
            // Search, ordering & paging
            // ==================================================================

            #[tokio::test]
            async fn test_search_over_projected_fields() {
                let (_backend, repo) =
                    repository::<Client, $backend<Client>>(&GatewayConfig::default()).await;
                repo.create_many(vec![client("ABC-100"), client("XYZ-200")])
                    .await
                    .unwrap();

                let projection =
                    Projection::<Client, String>::new(&["id", "code"], |c| c.code.clone())
                        .unwrap();

                let found = repo.search(projection.clone(), "ABC").to_list().await.unwrap();
                assert_eq!(found, vec!["ABC-100".to_string()]);

                // case-insensitive, several tokens OR-ed
                let found = repo
                    .search(projection.clone(), "xyz, abc")
                    .to_list()
                    .await
                    .unwrap();
                assert_eq!(found.len(), 2);

                let found = repo.search(projection, "999").to_list().await.unwrap();
                assert!(found.is_empty());
            }

            #[tokio::test]
            async fn test_search_numeric_compare() {
                let (_backend, repo) =
                    repository::<Budget, $backend<Budget>>(&GatewayConfig::default()).await;
                repo.create_many(vec![budget("Q1", 12.5), budget("Q2", 40.0)])
                    .await
                    .unwrap();

                let projection =
                    Projection::<Budget, String>::new(&["name", "amount"], |b| b.name.clone())
                        .unwrap();
                let found = repo.search(projection, "12.5").to_list().await.unwrap();
                assert_eq!(found, vec!["Q1".to_string()]);
            }

            #[tokio::test]
            async fn test_search_combines_with_filter_and_soft_delete() {
                let (_backend, repo) =
                    repository::<Client, $backend<Client>>(&GatewayConfig::default()).await;
                let created = repo
                    .create_many(vec![client("ABC-1"), client("ABC-2"), client("ABC-3")])
                    .await
                    .unwrap();
                repo.delete(created[0].id).await.unwrap();

                let found = repo
                    .search(Projection::identity(), "abc")
                    .filter(Predicate::ne("code", "ABC-3"))
                    .to_list()
                    .await
                    .unwrap();
                assert_eq!(codes(&found), vec!["ABC-2"]);
            }

            #[tokio::test]
            async fn test_filter_by_stored_timestamp() {
                let (_backend, repo) =
                    repository::<Client, $backend<Client>>(&GatewayConfig::default()).await;
                let created = repo.create(client("A")).await.unwrap();
                let stamp = created.created_at;

                let ids = Projection::<Client, i64>::new(&["created_at"], |c| c.id).unwrap();
                let equal = repo
                    .read(ids.clone())
                    .filter(Predicate::eq("created_at", stamp))
                    .to_list()
                    .await
                    .unwrap();
                assert_eq!(equal, vec![created.id]);

                let up_to = repo
                    .read(ids.clone())
                    .filter(Predicate::le("created_at", stamp))
                    .count()
                    .await
                    .unwrap();
                assert_eq!(up_to, 1);
                let before = repo
                    .read(ids.clone())
                    .filter(Predicate::lt("created_at", stamp))
                    .count()
                    .await
                    .unwrap();
                assert_eq!(before, 0);

                let searched = repo
                    .search(ids, &stamp.to_rfc3339())
                    .to_list()
                    .await
                    .unwrap();
                assert_eq!(searched, vec![created.id]);
            }

            #[tokio::test]
            async fn test_paging_metadata() {
                let (_backend, repo) =
                    repository::<Client, $backend<Client>>(&GatewayConfig::default()).await;
                repo.create_many(sample_clients(25)).await.unwrap();

                let page = repo
                    .read(Projection::identity())
                    .order_by(OrderSpec::asc("code"))
                    .skip(10)
                    .take(10)
                    .to_page()
                    .await
                    .unwrap();

                assert_count(&page.items, 10);
                assert_eq!(page.items[0].code, "C-010");
                assert_eq!(page.items[9].code, "C-019");
                assert_eq!(page.total_count, 25);
                assert_eq!(page.page_number, 2);
                assert!(page.has_previous);
                assert!(page.has_next);
                assert_eq!(page.total_pages(), 3);

                let last = repo
                    .read(Projection::identity())
                    .skip(20)
                    .take(10)
                    .to_page()
                    .await
                    .unwrap();
                assert_count(&last.items, 5);
                assert!(!last.has_next);
            }

            #[tokio::test]
            async fn test_non_positive_paging_returns_everything() {
                let (_backend, repo) =
                    repository::<Client, $backend<Client>>(&GatewayConfig::default()).await;
                repo.create_many(sample_clients(5)).await.unwrap();

                let all = repo
                    .read(Projection::identity())
                    .skip(-1)
                    .take(0)
                    .to_list()
                    .await
                    .unwrap();
                assert_count(&all, 5);
            }

            #[tokio::test]
            async fn test_dynamic_ordering() {
                let (_backend, repo) =
                    repository::<Client, $backend<Client>>(&GatewayConfig::default()).await;
                repo.create_many(vec![client("B"), client("C"), client("A")])
                    .await
                    .unwrap();

                let desc = repo
                    .read(Projection::identity())
                    .order_by(OrderSpec::dynamic::<Client>(&[("CODE", "desc")]))
                    .to_list()
                    .await
                    .unwrap();
                assert_eq!(codes(&desc), vec!["C", "B", "A"]);

                // unknown field falls back to the key
                let fallback = repo
                    .read(Projection::identity())
                    .order_by(OrderSpec::dynamic::<Client>(&[("Nope", "asc")]))
                    .to_list()
                    .await
                    .unwrap();
                assert_eq!(codes(&fallback), vec!["B", "C", "A"]);
            }

            #[tokio::test]
            async fn test_first_and_last() {
                let (_backend, repo) =
                    repository::<Client, $backend<Client>>(&GatewayConfig::default()).await;
                repo.create_many(vec![client("B"), client("C"), client("A")])
                    .await
                    .unwrap();

                let first = repo
                    .read(Projection::identity())
                    .order_by(OrderSpec::asc("code"))
                    .first_or_default()
                    .await
                    .unwrap();
                assert_eq!(first.map(|c| c.code), Some("A".to_string()));

                // highest key, whatever the requested order
                let last = repo
                    .read(Projection::identity())
                    .order_by(OrderSpec::asc("code"))
                    .last_or_default()
                    .await
                    .unwrap();
                assert_eq!(last.map(|c| c.code), Some("A".to_string()));

                let none = repo
                    .read(Projection::identity())
                    .filter(Predicate::eq("code", "Z"))
                    .last_or_default()
                    .await
                    .unwrap();
                assert!(none.is_none());
            }

            #[tokio::test]
            async fn test_count_and_any() {
                let (_backend, repo) =
                    repository::<Client, $backend<Client>>(&GatewayConfig::default()).await;
                repo.create_many(vec![client("A"), client("B"), client("C")])
                    .await
                    .unwrap();

                let in_ab = Predicate::is_in("code", ["A", "B"]);
                assert_eq!(repo.count(Some(in_ab.clone())).await.unwrap(), 2);
                assert_eq!(repo.long_count(None).await.unwrap(), 3);
                assert!(repo.any(Some(in_ab)).await.unwrap());
                assert!(!repo.any(Some(Predicate::eq("code", "Z"))).await.unwrap());
            }

            #[tokio::test]
            async fn test_unknown_field_is_rejected() {
                let (_backend, repo) =
                    repository::<Client, $backend<Client>>(&GatewayConfig::default()).await;

                let err = repo
                    .read(Projection::identity())
                    .filter(Predicate::eq("nope", 1i64))
                    .to_list()
                    .await
                    .unwrap_err();
                assert!(matches!(err, GatewayError::Validation(_)));

                let err = repo
                    .read(Projection::identity())
                    .order_by(OrderSpec::asc("nope"))
                    .count()
                    .await
                    .unwrap_err();
                assert_eq!(err.error_code(), "UNKNOWN_FIELD");
            }

            #[tokio::test]
            async fn test_tracking_can_be_disabled() {
                let (backend, repo) =
                    repository::<Client, $backend<Client>>(&GatewayConfig::default()).await;
                repo.create_many(sample_clients(3)).await.unwrap();

                let reader = Repository::new(Arc::new(backend.session()), &GatewayConfig::default());
                reader
                    .read(Projection::identity())
                    .disable_tracking()
                    .to_list()
                    .await
                    .unwrap();
                assert_eq!(reader.session().tracked_len(), 0);

                reader.read(Projection::identity()).to_list().await.unwrap();
                assert_eq!(reader.session().tracked_len(), 3);
            }

            #[tokio::test]
            async fn test_concurrent_reads() {
                let (_backend, repo) =
                    repository::<Client, $backend<Client>>(&GatewayConfig::default()).await;
                repo.create_many(sample_clients(10)).await.unwrap();

                let ids = Projection::<Client, i64>::new(&["id"], |c| c.id).unwrap();
                let queries: Vec<_> = (0..5)
                    .map(|i| repo.read(ids.clone()).skip(i * 2).take(2))
                    .collect();
                let pages = futures::future::try_join_all(queries.iter().map(|q| q.to_list()))
                    .await
                    .unwrap();

                let seen: Vec<i64> = pages.into_iter().flatten().collect();
                assert_count(&seen, 10);
                assert!(seen.windows(2).all(|w| w[0] < w[1]));
            }

            // ==================================================================
            // Update & create-or-update
            // ==================================================================

            #[tokio::test]
            async fn test_update_stamps_modified_at() {
                let (_backend, repo) =
                    repository::<Client, $backend<Client>>(&GatewayConfig::default()).await;
                let mut created = repo.create(client("A")).await.unwrap();

                created.name = "Renamed".into();
                let updated = repo.update(created.clone()).await.unwrap();
                assert!(updated.modified_at.is_some());

                let found = repo.find(&created.id).await.unwrap().expect("row");
                assert_eq!(found.name, "Renamed");
                assert!(found.modified_at.is_some());
                assert!(found.created_at > chrono::DateTime::<chrono::Utc>::default());
            }

            #[tokio::test]
            async fn test_update_of_missing_key_is_a_no_op() {
                let (_backend, repo) =
                    repository::<Client, $backend<Client>>(&GatewayConfig::default()).await;
                repo.create(client("A")).await.unwrap();

                let ghost = Client {
                    id: 9999,
                    ..client("ghost")
                };
                repo.update(ghost).await.unwrap();
                assert!(repo.find(&9999).await.unwrap().is_none());
                assert_eq!(repo.count(None).await.unwrap(), 1);
            }

            #[tokio::test]
            async fn test_create_or_update_dispatch() {
                let (_backend, repo) =
                    repository::<Client, $backend<Client>>(&GatewayConfig::default()).await;

                let created = repo.create_or_update(client("A")).await.unwrap();
                assert!(created.id > 0);

                let mut changed = created.clone();
                changed.name = "Changed".into();
                let updated = repo.create_or_update(changed).await.unwrap();
                assert_eq!(updated.id, created.id);

                assert_eq!(repo.count(None).await.unwrap(), 1);
                let found = repo.find(&created.id).await.unwrap().expect("row");
                assert_eq!(found.name, "Changed");
            }

            #[tokio::test]
            async fn test_stale_version_conflicts() {
                let (backend, repo) =
                    repository::<Budget, $backend<Budget>>(&GatewayConfig::default()).await;
                let created = repo.create(budget("Q1", 10.0)).await.unwrap();
                assert_eq!(created.row_version, 1);

                let mut fresh = created.clone();
                fresh.amount = 20.0;
                let fresh = repo.update(fresh).await.unwrap();
                assert_eq!(fresh.row_version, 2);

                let other = Repository::new(Arc::new(backend.session()), &GatewayConfig::default());
                let mut stale = created.clone();
                stale.amount = 30.0;
                let err = other.update(stale).await.unwrap_err();
                assert!(err.is_conflict());
                assert_eq!(err.error_code(), "CONCURRENCY_CONFLICT");

                let stored = repo.find(&created.id).await.unwrap().expect("row");
                assert_eq!(stored.amount, 20.0);
                assert_eq!(stored.row_version, 2);

                // the session is usable again after the failed save
                let mut retry = stored;
                retry.amount = 30.0;
                let retried = other.update(retry).await.unwrap();
                assert_eq!(retried.row_version, 3);
            }

            // ==================================================================
            // Batch tiers
            // ==================================================================

            #[tokio::test]
            async fn test_chunked_writes_keep_input_order() {
                init_tracing();
                let config = chunked(10);
                let (_backend, repo) = repository::<Client, $backend<Client>>(&config).await;

                let created = repo.create_many(sample_clients(30)).await.unwrap();
                assert_count(&created, 30);
                assert!(created.windows(2).all(|w| w[0].id < w[1].id));

                let stored = repo.read(Projection::identity()).to_list().await.unwrap();
                assert_eq!(codes(&stored), codes(&created));

                let keys: Vec<i64> = created.iter().map(|c| c.id).collect();
                assert_eq!(repo.delete_many(keys.clone()).await.unwrap(), 30);
                assert_eq!(repo.count(None).await.unwrap(), 0);
                assert_eq!(repo.restore_many(keys).await.unwrap(), 30);
                assert_eq!(repo.count(None).await.unwrap(), 30);
            }

            #[tokio::test]
            async fn test_bulk_path_skips_staging() {
                let config = GatewayConfig {
                    batch: BatchThresholds::new(20, 10),
                    ..Default::default()
                };
                let (backend, _repo) = repository::<Setting, $backend<Setting>>(&config).await;
                let repo = Repository::new(
                    Arc::new(RecordingSession::new(backend.session())),
                    &config,
                );

                let created = repo.create_many(sample_settings(25)).await.unwrap();
                assert_eq!(repo.session().take_calls(), vec!["bulk_insert"]);
                assert!(created.iter().all(|s| s.id > 0));
                assert!(created.windows(2).all(|w| w[0].id < w[1].id));
                assert_eq!(created[24].key, "k24");
                assert_eq!(repo.count(None).await.unwrap(), 25);

                let renamed: Vec<Setting> = created
                    .iter()
                    .map(|s| Setting {
                        value: format!("v{}", s.key),
                        ..s.clone()
                    })
                    .collect();
                repo.update_many(renamed).await.unwrap();
                assert_eq!(repo.session().take_calls(), vec!["bulk_update"]);
                let stored = repo.find(&created[3].id).await.unwrap().expect("row");
                assert_eq!(stored.value, "vk3");

                // below the bulk threshold: staged and saved
                repo.create_many(sample_settings(5)).await.unwrap();
                assert_eq!(repo.session().take_calls(), vec!["add", "save_changes"]);

                let keys = created.iter().map(|s| s.id).collect();
                assert_eq!(repo.delete_many(keys).await.unwrap(), 25);
                assert_eq!(repo.session().take_calls(), vec!["bulk_delete"]);
                assert_eq!(repo.count(None).await.unwrap(), 5);
            }

            #[tokio::test]
            async fn test_bulk_update_checks_versions() {
                let config = GatewayConfig {
                    batch: BatchThresholds::new(1, 0),
                    ..Default::default()
                };
                let (backend, repo) = repository::<Budget, $backend<Budget>>(&config).await;
                let created = repo
                    .create_many(vec![budget("Q1", 1.0), budget("Q2", 2.0), budget("Q3", 3.0)])
                    .await
                    .unwrap();
                assert!(created.iter().all(|b| b.row_version == 1));

                let bumped: Vec<Budget> = created
                    .iter()
                    .map(|b| Budget {
                        amount: b.amount * 10.0,
                        ..b.clone()
                    })
                    .collect();
                let bumped = repo.update_many(bumped).await.unwrap();
                assert!(bumped.iter().all(|b| b.row_version == 2));

                // a missing key among the batch is ignored
                let ghost = Budget {
                    id: 9999,
                    row_version: 1,
                    ..budget("ghost", 0.0)
                };
                repo.update_many(vec![bumped[0].clone(), ghost]).await.unwrap();
                assert!(repo.find(&9999).await.unwrap().is_none());

                let other = Repository::new(Arc::new(backend.session()), &config);
                let err = other
                    .update_many(vec![bumped[1].clone(), created[2].clone()])
                    .await
                    .unwrap_err();
                assert!(err.is_conflict());

                // the whole batch rolled back with the conflict
                let stored = repo.find(&created[1].id).await.unwrap().expect("row");
                assert_eq!(stored.row_version, 2);
                assert_eq!(stored.amount, 20.0);
            }

            #[tokio::test]
            async fn test_hard_deleted_keys_are_not_reused() {
                let (_backend, repo) =
                    repository::<Setting, $backend<Setting>>(&GatewayConfig::default()).await;
                let created = repo.create_many(sample_settings(3)).await.unwrap();
                let highest = created[2].id;

                assert_eq!(repo.delete(highest).await.unwrap(), 1);
                let next = repo.create(setting("theme", "dark")).await.unwrap();
                assert!(next.id > highest);
            }

            #[tokio::test]
            async fn test_cancellation_between_chunks() {
                let config = chunked(4);
                let (backend, _repo) = repository::<Client, $backend<Client>>(&config).await;
                let token = CancellationToken::new();
                let session = CancelAfterSaves::new(backend.session(), token.clone(), 1);
                let repo = Repository::new(Arc::new(session), &config).with_cancellation(token);

                // 9 rows: chunks of 3, cancelled after the first commit
                let err = repo.create_many(sample_clients(9)).await.unwrap_err();
                match err {
                    GatewayError::Cancelled {
                        operation,
                        committed,
                    } => {
                        assert_eq!(operation, "create");
                        assert_eq!(committed, 3);
                    }
                    other => panic!("expected cancellation, got {other:?}"),
                }

                let stored = repo.read(Projection::identity()).to_list().await.unwrap();
                assert_eq!(codes(&stored), vec!["C-000", "C-001", "C-002"]);
            }

            #[tokio::test]
            async fn test_empty_batches_are_no_ops() {
                let (_backend, repo) =
                    repository::<Client, $backend<Client>>(&GatewayConfig::default()).await;
                assert!(repo.create_many(Vec::new()).await.unwrap().is_empty());
                assert_eq!(repo.delete_many(Vec::new()).await.unwrap(), 0);
                assert_eq!(repo.restore_many(Vec::new()).await.unwrap(), 0);
                assert!(repo.update_many(Vec::new()).await.unwrap().is_empty());
            }

            #[test]
            fn test_entity_capabilities() {
                assert!(Client::capabilities().soft_delete);
                assert!(Budget::capabilities().versioned);
            }
        }
    };
}
