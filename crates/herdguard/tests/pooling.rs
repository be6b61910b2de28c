// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for leader election, broadcast and follower timeouts.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures_util::{StreamExt, stream::FuturesUnordered};
use herdguard::{Coordinator, Election, LeaderToken, Role, WaitError};
use tokio::time::Instant;

/// Runs the usual leader-or-follower flow for `key`, computing with `compute` when leading.
async fn pooled<F, Fut>(pools: &Coordinator<String, String>, key: &str, timeout: Duration, compute: F) -> Result<String, WaitError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = String>,
{
    match pools.enter(key.to_owned()) {
        Role::Leader(token) => {
            let value = compute().await;
            token.resolve(value.clone());
            Ok(value)
        }
        Role::Follower(waiter) => waiter.wait(timeout).await,
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_misses_share_one_computation() {
    let pools = Coordinator::<String, String>::new();
    let computations = AtomicUsize::new(0);

    let callers = FuturesUnordered::new();
    for _ in 0..10 {
        callers.push(pooled(&pools, "key", Duration::from_secs(1), || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            computations.fetch_add(1, Ordering::AcqRel);
            "Result".to_owned()
        }));
    }

    let results: Vec<_> = callers.collect().await;

    assert_eq!(computations.load(Ordering::Acquire), 1);
    assert_eq!(results.len(), 10);
    assert!(results.iter().all(|result| result.as_deref() == Ok("Result")));
    assert_eq!(pools.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn follower_receives_result_when_leader_resolves() {
    let pools = Coordinator::<String, String>::new();
    let Role::Leader(token) = pools.enter("C".to_owned()) else {
        panic!("first caller must lead");
    };

    let leader = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.resolve("R".to_owned())
    });

    let started = Instant::now();
    let received = pools.join("C".to_owned(), Duration::from_millis(1000)).await;

    assert_eq!(received, Ok("R".to_owned()));
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(50));
    assert!(waited < Duration::from_millis(1000));
    assert_eq!(leader.await.expect("leader task panicked"), 1);
}

#[tokio::test(start_paused = true)]
async fn timed_out_follower_is_unregistered() {
    let pools = Coordinator::<String, String>::new();
    let Election::Leader(token) = pools.try_become_leader("slow".to_owned()) else {
        panic!("first caller must lead");
    };

    let result = pools.join("slow".to_owned(), Duration::from_millis(200)).await;

    assert_eq!(result, Err(WaitError::TimedOut));
    assert_eq!(pools.waiting(&"slow".to_owned()), Some(0));
    assert_eq!(token.waiters(), 0);

    // The leader is unaffected and can still resolve, with nobody left to serve.
    assert_eq!(token.resolve("late".to_owned()), 0);
    assert_eq!(pools.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn followers_have_independent_clocks() {
    let pools = Coordinator::<String, String>::new();
    let Role::Leader(token) = pools.enter("k".to_owned()) else {
        panic!("first caller must lead");
    };
    let Role::Follower(impatient) = pools.enter("k".to_owned()) else {
        panic!("second caller must follow");
    };
    let Role::Follower(patient) = pools.enter("k".to_owned()) else {
        panic!("third caller must follow");
    };

    let impatient = tokio::spawn(impatient.wait(Duration::from_millis(10)));
    let patient = tokio::spawn(patient.wait(Duration::from_secs(10)));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(token.waiters(), 1);
    assert_eq!(token.resolve("v".to_owned()), 1);

    assert_eq!(impatient.await.expect("task panicked"), Err(WaitError::TimedOut));
    assert_eq!(patient.await.expect("task panicked"), Ok("v".to_owned()));
}

#[tokio::test]
async fn dropping_the_leader_releases_followers_immediately() {
    let pools = Coordinator::<String, String>::new();
    let Role::Leader(token) = pools.enter("k".to_owned()) else {
        panic!("first caller must lead");
    };
    let Role::Follower(waiter) = pools.enter("k".to_owned()) else {
        panic!("second caller must follow");
    };

    drop(token);

    assert_eq!(waiter.wait(Duration::from_secs(3600)).await, Err(WaitError::Abandoned));
    assert_eq!(pools.in_flight(), 0);
    assert!(matches!(pools.enter("k".to_owned()), Role::Leader(_)));
}

async fn failing_computation(token: LeaderToken<String, String>) -> String {
    let _token = token;
    panic!("computation failed");
}

#[tokio::test]
async fn panicking_leader_abandons_the_pool() {
    let pools = Coordinator::<String, String>::new();
    let leader_pools = pools.clone();
    let Role::Leader(token) = pools.enter("k".to_owned()) else {
        panic!("first caller must lead");
    };
    let Role::Follower(waiter) = pools.enter("k".to_owned()) else {
        panic!("second caller must follow");
    };

    let leader = tokio::spawn(failing_computation(token));

    assert!(leader.await.is_err());
    assert_eq!(waiter.wait(Duration::from_secs(60)).await, Err(WaitError::Abandoned));
    assert_eq!(leader_pools.in_flight(), 0);
}

#[tokio::test]
async fn joining_without_a_leader_is_vacant() {
    let pools = Coordinator::<&'static str, u32>::new();

    assert_eq!(pools.join("nobody", Duration::from_secs(1)).await, Err(WaitError::Vacant));
    assert_eq!(pools.waiting(&"nobody"), None);
}

#[tokio::test]
async fn resolve_with_no_waiters_discards_the_pool() {
    let pools = Coordinator::<&'static str, u32>::new();
    let Election::Leader(token) = pools.try_become_leader("k") else {
        panic!("first caller must lead");
    };
    assert!(matches!(pools.try_become_leader("k"), Election::Busy { waiters: 0 }));

    assert_eq!(pools.resolve(token, 7), 0);

    assert_eq!(pools.in_flight(), 0);
    assert!(matches!(pools.try_become_leader("k"), Election::Leader(_)));
}

#[tokio::test]
async fn cancelled_follower_does_not_leak() {
    let pools = Coordinator::<&'static str, u32>::new();
    let Role::Leader(token) = pools.enter("k") else {
        panic!("first caller must lead");
    };

    let follower = {
        let pools = pools.clone();
        tokio::spawn(async move { pools.join("k", Duration::from_secs(3600)).await })
    };
    while pools.waiting(&"k") != Some(1) {
        tokio::task::yield_now().await;
    }

    follower.abort();
    assert!(follower.await.is_err());

    assert_eq!(pools.waiting(&"k"), Some(0));
    assert_eq!(token.resolve(1), 0);
}

#[tokio::test]
async fn keys_are_pooled_independently() {
    let pools = Coordinator::<&'static str, u32>::new();
    let Role::Leader(a) = pools.enter("a") else {
        panic!("first caller for a must lead");
    };
    let Role::Leader(b) = pools.enter("b") else {
        panic!("first caller for b must lead");
    };

    assert_eq!(pools.in_flight(), 2);
    assert_eq!(a.key(), &"a");
    assert_eq!(b.key(), &"b");

    a.resolve(1);
    assert_eq!(pools.in_flight(), 1);
    b.resolve(2);
    assert_eq!(pools.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_arrivals_all_receive_the_leaders_value() {
    let pools = Coordinator::<&'static str, usize>::new();
    let leaders = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let pools = pools.clone();
            let leaders = Arc::clone(&leaders);
            tokio::spawn(async move {
                match pools.enter("hot") {
                    Role::Leader(token) => {
                        leaders.fetch_add(1, Ordering::AcqRel);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        token.resolve(42);
                        42
                    }
                    Role::Follower(waiter) => waiter.wait(Duration::from_secs(5)).await.expect("leader resolves in time"),
                }
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.expect("task panicked"), 42);
    }
    assert!(leaders.load(Ordering::Acquire) >= 1);
    assert_eq!(pools.in_flight(), 0);
}
