//! Integration tests for the completion stores
//!
//! Every behavioural test runs against both the in-memory store and an
//! in-memory SQLite database; persistence and concurrency use a temporary
//! database file.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tempfile::TempDir;

use study_scheduler::config::DatabaseConfig;
use study_scheduler::storage::{
    Completion, CompletionKey, CompletionQuery, CompletionStore, InsertOutcome, MemoryStore, Skip,
    SqliteStore,
};

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 11, d).unwrap()
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn completion(form: &str, phase: &str, d: u32, at: NaiveTime) -> Completion {
    Completion::new(CompletionKey::new(form, "daily", phase, date(d)), at)
}

/// Create an in-memory SQLite store for testing
async fn create_test_storage() -> SqliteStore {
    SqliteStore::new_in_memory()
        .await
        .expect("Failed to create in-memory storage")
}

async fn stores() -> Vec<(&'static str, Arc<dyn CompletionStore>)> {
    vec![
        ("memory", Arc::new(MemoryStore::new())),
        ("sqlite", Arc::new(create_test_storage().await)),
    ]
}

fn file_config(dir: &TempDir) -> DatabaseConfig {
    DatabaseConfig {
        path: dir.path().join("nested").join("study.db"),
        max_connections: 4,
    }
}

// ============================================================================
// Completions
// ============================================================================

#[tokio::test]
async fn test_insert_then_duplicate() {
    for (name, store) in stores().await {
        let first = completion("diary", "screening", 6, time(9, 15)).with_user("p-1");
        let second = completion("diary", "screening", 6, time(14, 0));

        assert_eq!(
            store.insert_completion(&first).await.unwrap(),
            InsertOutcome::Inserted,
            "{name}"
        );

        match store.insert_completion(&second).await.unwrap() {
            InsertOutcome::Duplicate(existing) => {
                assert_eq!(existing.id, first.id, "{name}");
                assert_eq!(existing.completion_time, time(9, 15), "{name}");
                assert_eq!(existing.user_id.as_deref(), Some("p-1"), "{name}");
            }
            other => panic!("{name}: expected duplicate, got {other:?}"),
        }

        let all = store.find_completions(&CompletionQuery::all()).await.unwrap();
        assert_eq!(all.len(), 1, "{name}");
    }
}

#[tokio::test]
async fn test_get_completion_roundtrip() {
    for (name, store) in stores().await {
        let original = completion("qol", "intervention", 8, NaiveTime::from_hms_micro_opt(7, 5, 9, 123_456).unwrap())
            .with_session("sess-9");
        store.insert_completion(&original).await.unwrap();

        let loaded = store.get_completion(&original.key).await.unwrap().unwrap();
        assert_eq!(loaded.key, original.key, "{name}");
        assert_eq!(loaded.completion_time, original.completion_time, "{name}");
        assert_eq!(loaded.session_id.as_deref(), Some("sess-9"), "{name}");
        assert!(loaded.user_id.is_none(), "{name}");

        let missing = CompletionKey::new("qol", "daily", "screening", date(8));
        assert!(store.get_completion(&missing).await.unwrap().is_none(), "{name}");
    }
}

#[tokio::test]
async fn test_phase_isolation() {
    for (name, store) in stores().await {
        store
            .insert_completion(&completion("f", "screening", 6, time(9, 0)))
            .await
            .unwrap();

        let screening = CompletionKey::new("f", "daily", "screening", date(6));
        let intervention = CompletionKey::new("f", "daily", "intervention", date(6));
        assert!(store.get_completion(&screening).await.unwrap().is_some(), "{name}");
        assert!(store.get_completion(&intervention).await.unwrap().is_none(), "{name}");

        // Same form, day type and date in another phase is a separate record
        assert_eq!(
            store
                .insert_completion(&completion("f", "intervention", 6, time(10, 0)))
                .await
                .unwrap(),
            InsertOutcome::Inserted,
            "{name}"
        );
    }
}

#[tokio::test]
async fn test_find_completions_filters_and_orders() {
    for (name, store) in stores().await {
        for c in [
            completion("b", "screening", 6, time(14, 0)),
            completion("a", "screening", 6, time(9, 15)),
            completion("c", "intervention", 6, time(8, 0)),
            completion("d", "screening", 5, time(20, 0)),
        ] {
            store.insert_completion(&c).await.unwrap();
        }

        let on_day: Vec<String> = store
            .find_completions(&CompletionQuery::on(date(6)))
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.key.form_id)
            .collect();
        assert_eq!(on_day, vec!["c", "a", "b"], "{name}");

        let screening_on_day = store
            .find_completions(&CompletionQuery::on(date(6)).in_phase("screening"))
            .await
            .unwrap();
        assert_eq!(screening_on_day.len(), 2, "{name}");

        let phase: Vec<String> = store
            .find_completions(&CompletionQuery::for_phase("screening"))
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.key.form_id)
            .collect();
        assert_eq!(phase, vec!["d", "a", "b"], "{name}");

        let none = store
            .find_completions(&CompletionQuery::all().with_day_type("weekly"))
            .await
            .unwrap();
        assert!(none.is_empty(), "{name}");
    }
}

// ============================================================================
// Skips
// ============================================================================

#[tokio::test]
async fn test_skip_lifecycle() {
    for (name, store) in stores().await {
        let key = CompletionKey::new("mood", "daily", "intervention", date(6));
        let skip = Skip::new(key.clone(), "Not feeling well");

        assert!(store.insert_skip(&skip).await.unwrap(), "{name}");
        assert!(!store.insert_skip(&Skip::new(key.clone(), "again")).await.unwrap(), "{name}");

        let loaded = store.get_skip(&key).await.unwrap().unwrap();
        assert_eq!(loaded.reason, "Not feeling well", "{name}");

        let found = store
            .find_skips(&CompletionQuery::on(date(6)).in_phase("intervention").with_day_type("daily"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1, "{name}");

        assert!(store.delete_skip(&key).await.unwrap(), "{name}");
        assert!(!store.delete_skip(&key).await.unwrap(), "{name}");
        assert!(store.get_skip(&key).await.unwrap().is_none(), "{name}");
    }
}

// ============================================================================
// SQLite file store
// ============================================================================

#[tokio::test]
async fn test_sqlite_file_persists_across_connections() {
    let dir = TempDir::new().unwrap();
    let config = file_config(&dir);

    {
        let store = SqliteStore::new(&config).await.unwrap();
        store
            .insert_completion(&completion("diary", "screening", 6, time(9, 15)))
            .await
            .unwrap();
        store.pool().close().await;
    }

    assert!(config.path.exists());

    let reopened = SqliteStore::new(&config).await.unwrap();
    let key = CompletionKey::new("diary", "daily", "screening", date(6));
    let loaded = reopened.get_completion(&key).await.unwrap().unwrap();
    assert_eq!(loaded.completion_time, time(9, 15));
}

#[tokio::test]
async fn test_concurrent_inserts_store_exactly_one() {
    let dir = TempDir::new().unwrap();
    let sqlite: Arc<dyn CompletionStore> = Arc::new(SqliteStore::new(&file_config(&dir)).await.unwrap());
    let memory: Arc<dyn CompletionStore> = Arc::new(MemoryStore::new());

    for (name, store) in [("sqlite", sqlite), ("memory", memory)] {
        let mut handles = Vec::new();
        for minute in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .insert_completion(&completion("diary", "screening", 6, time(9, minute)))
                    .await
            }));
        }

        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() == InsertOutcome::Inserted {
                inserted += 1;
            }
        }

        assert_eq!(inserted, 1, "{name}");
        let all = store.find_completions(&CompletionQuery::all()).await.unwrap();
        assert_eq!(all.len(), 1, "{name}");
    }
}

#[tokio::test]
async fn test_memory_store_clear() {
    let store = MemoryStore::new();
    assert!(store.is_empty().await);

    store
        .insert_completion(&completion("diary", "screening", 6, time(9, 0)))
        .await
        .unwrap();
    assert_eq!(store.len().await, 1);

    store.clear().await;
    assert!(store.is_empty().await);
}
