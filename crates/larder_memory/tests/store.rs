// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Behavioral tests for `InMemoryStore`.

use std::{sync::Arc, time::Duration};

use larder_memory::InMemoryStore;
use larder_tier::{CacheEntry, CacheStore, Dependencies, Error, SetOptions};
use serde_json::json;

fn ttl(duration: Duration) -> SetOptions {
    SetOptions::new().ttl(duration)
}

#[tokio::test(start_paused = true)]
async fn entry_is_visible_until_ttl_elapses() {
    let store = InMemoryStore::<String>::new();
    store
        .set("/p", "R".to_owned(), ttl(Duration::from_secs(60)))
        .await
        .expect("set should succeed");

    tokio::time::advance(Duration::from_secs(30)).await;
    let hit = store.get("/p", None).await.expect("entry is still fresh");
    assert_eq!(hit.value(), "R");

    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(store.get("/p", None).await.is_none());
    assert!(!store.has("/p").await);
}

#[tokio::test(start_paused = true)]
async fn expired_entry_is_evicted_without_being_read() {
    let store = InMemoryStore::<u32>::new();
    store.set("k", 1, ttl(Duration::from_secs(5))).await.expect("set should succeed");
    assert_eq!(store.len(), Some(1));

    tokio::time::sleep(Duration::from_secs(6)).await;

    assert_eq!(store.len(), Some(0));
}

#[tokio::test(start_paused = true)]
async fn timer_eviction_releases_dependency_snapshots() {
    let store = InMemoryStore::<u32>::new();
    let snapshot = Dependencies::new();

    for i in 0..100 {
        let key = format!("/item?id={i}");
        assert!(store.get(&key, Some(&snapshot)).await.is_none());
        store
            .set(&key, i, ttl(Duration::from_secs(1)).dependencies(snapshot.clone()))
            .await
            .expect("set should succeed");
    }
    assert_eq!(store.fingerprints().len(), 100);

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(store.len(), Some(0));
    assert!(store.fingerprints().is_empty());
}

#[tokio::test]
async fn misses_and_removals_release_dependency_snapshots() {
    let store = InMemoryStore::<u32>::new();
    let v1 = Dependencies::from_iter([1]);

    assert!(store.get("k", Some(&v1)).await.is_none());
    assert!(store.fingerprints().is_empty());

    store
        .set("k", 1, SetOptions::new().dependencies(v1.clone()))
        .await
        .expect("set should succeed");
    assert!(store.get("k", Some(&Dependencies::from_iter([2]))).await.is_none());
    assert!(store.fingerprints().is_empty());

    store
        .set("k", 2, SetOptions::new().dependencies(v1))
        .await
        .expect("set should succeed");
    assert_eq!(store.fingerprints().len(), 1);
    assert!(store.remove("k").await.expect("remove should succeed"));
    assert!(store.fingerprints().is_empty());
}

#[tokio::test(start_paused = true)]
async fn lazy_eviction_still_applies_without_timers() {
    let store = InMemoryStore::<u32>::builder().eviction_timers(false).build();
    store.set("k", 1, ttl(Duration::from_secs(5))).await.expect("set should succeed");

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(store.len(), Some(1));

    assert!(store.get("k", None).await.is_none());
    assert_eq!(store.len(), Some(0));
}

#[tokio::test(start_paused = true)]
async fn entry_without_ttl_never_expires() {
    let store = InMemoryStore::<u32>::new();
    store.set("k", 7, SetOptions::new()).await.expect("set should succeed");

    tokio::time::advance(Duration::from_secs(60 * 60 * 24 * 365)).await;

    assert_eq!(store.get("k", None).await.map(CacheEntry::into_value), Some(7));
}

#[tokio::test]
async fn changed_dependencies_invalidate_the_entry() {
    let store = InMemoryStore::<String>::new();
    let deps = Dependencies::from_iter([1, 2]);
    store
        .set("/p", "R".to_owned(), SetOptions::new().dependencies(deps.clone()))
        .await
        .expect("set should succeed");

    assert!(store.get("/p", Some(&deps)).await.is_some());

    let changed = Dependencies::from_iter([1, 3]);
    assert!(store.get("/p", Some(&changed)).await.is_none());
    assert!(!store.has("/p").await);
}

#[tokio::test]
async fn reading_without_snapshot_ignores_dependencies() {
    let store = InMemoryStore::<String>::new();
    store
        .set("/p", "R".to_owned(), SetOptions::new().dependencies(Dependencies::from_iter([1])))
        .await
        .expect("set should succeed");

    assert!(store.get("/p", None).await.is_some());
}

#[tokio::test]
async fn dependency_objects_compare_structurally() {
    let store = InMemoryStore::<u32>::new();
    let written = Dependencies::new().with(json!({"user": 1, "locale": "en"}));
    store
        .set("k", 1, SetOptions::new().dependencies(written))
        .await
        .expect("set should succeed");

    let read = Dependencies::new().with(json!({"locale": "en", "user": 1}));
    assert!(store.get("k", Some(&read)).await.is_some());
}

#[tokio::test]
async fn custom_comparator_is_used() {
    let store = InMemoryStore::<u32>::builder()
        .dependency_comparator(|previous, current| previous.len() == current.len())
        .build();
    store
        .set("k", 1, SetOptions::new().dependencies(Dependencies::from_iter([1, 2])))
        .await
        .expect("set should succeed");

    assert!(store.get("k", Some(&Dependencies::from_iter([8, 9]))).await.is_some());
    assert!(store.get("k", Some(&Dependencies::from_iter([8]))).await.is_none());
}

#[tokio::test]
async fn remove_is_idempotent() {
    let store = InMemoryStore::<u32>::new();
    store.set("k", 1, SetOptions::new()).await.expect("set should succeed");

    assert!(store.remove("k").await.expect("remove should succeed"));
    assert!(!store.remove("k").await.expect("remove should succeed"));
    assert!(!store.has("k").await);
}

#[tokio::test]
async fn overlong_ttl_is_rejected() {
    let store = InMemoryStore::<u32>::new();

    let error = store
        .set("k", 1, ttl(larder_tier::MAX_TTL + Duration::from_millis(1)))
        .await
        .expect_err("ttl exceeds the timer range");

    assert!(matches!(error, Error::InvalidTtl(_)));
    assert!(!store.has("k").await);
}

#[tokio::test]
async fn zero_ttl_stores_without_expiry() {
    let store = InMemoryStore::<u32>::new();

    let entry = store.set("k", 1, ttl(Duration::ZERO)).await.expect("set should succeed");

    assert!(entry.expiry().is_none());
    assert!(store.has("k").await);
}

#[tokio::test]
async fn set_records_metadata_and_expiry() {
    let store = InMemoryStore::<u32>::new();

    let entry = store
        .set("k", 1, ttl(Duration::from_secs(90)).metadata("status", 200))
        .await
        .expect("set should succeed");

    assert_eq!(entry.metadata()["status"], 200);
    assert_eq!(entry.expiry().map(larder_tier::Expiry::ttl), Some(Duration::from_secs(90)));
}

#[tokio::test]
async fn clear_drops_everything() {
    let store = InMemoryStore::<u32>::builder().name("clearable").build();
    store.set("a", 1, SetOptions::new()).await.expect("set should succeed");
    store.set("b", 2, SetOptions::new()).await.expect("set should succeed");

    store.clear();

    assert_eq!(store.len(), Some(0));
    assert_eq!(store.name(), "clearable");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn clones_share_entries_across_tasks() {
    let store = Arc::new(InMemoryStore::<usize>::new());

    let writers: Vec<_> = (0..16)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .set(&format!("key-{i}"), i, SetOptions::new())
                    .await
                    .expect("set should succeed");
            })
        })
        .collect();
    for writer in writers {
        writer.await.expect("writer task panicked");
    }

    let reader = (*store).clone();
    for i in 0..16 {
        assert_eq!(reader.get(&format!("key-{i}"), None).await.map(CacheEntry::into_value), Some(i));
    }
}
