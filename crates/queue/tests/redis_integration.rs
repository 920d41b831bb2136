//! Redis integration tests.
//!
//! These tests require a running Redis instance.
//! Run with: `cargo test --test redis_integration -- --ignored`
//!
//! Set `REDIS_URL` environment variable to point to your Redis instance.
//! Default: <redis://localhost:6379>

use std::time::Duration;

use serde_json::json;

use guildest_queue::{Job, JobKind, JobResult, QueueStore, RedisQueueStore};

fn get_redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

fn make_job(id: &str) -> Job {
    Job {
        job_id: id.to_string(),
        job_type: JobKind::SafetyScan.tag().to_string(),
        payload: json!({"content": "integration"}),
        requested_by: Some("user-1".to_string()),
        result_ttl: 30,
        enqueued_at: chrono::Utc::now(),
    }
}

/// Test that we can connect to Redis.
#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_redis_connection() {
    let url = get_redis_url();
    let store = RedisQueueStore::connect(&url).await;
    assert!(store.is_ok(), "Failed to connect to Redis: {:?}", store.err());

    store.expect("connected").ping().await.expect("ping");
}

/// Test push/pop round trip preserves order.
#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_push_pop_fifo() {
    let url = get_redis_url();
    let store = RedisQueueStore::connect(&url).await.expect("connect");
    let ns = "guildest-test-fifo";

    for id in ["a", "b", "c"] {
        store.push(ns, &make_job(id)).await.expect("push");
    }

    for expected in ["a", "b", "c"] {
        let job = store
            .pop(ns, Duration::from_secs(1))
            .await
            .expect("pop")
            .expect("job present");
        assert_eq!(job.job_id, expected);
    }
}

/// Test that popping an empty queue returns after the timeout.
#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_empty_pop_times_out() {
    let url = get_redis_url();
    let store = RedisQueueStore::connect(&url).await.expect("connect");

    let started = std::time::Instant::now();
    let popped = store
        .pop("guildest-test-empty", Duration::from_secs(1))
        .await
        .expect("pop");

    assert!(popped.is_none());
    assert!(started.elapsed() >= Duration::from_millis(900));
    assert!(started.elapsed() < Duration::from_secs(3));
}

/// Test result slot write, consuming read, and absence after the read.
#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_result_slot_roundtrip() {
    let url = get_redis_url();
    let store = RedisQueueStore::connect(&url).await.expect("connect");
    let ns = "guildest-test-results";

    let result = JobResult::ok("j-redis-1", json!({"verdict": "safe"}));
    store
        .put_result(ns, "j-redis-1", &result, Duration::from_secs(30))
        .await
        .expect("put_result");

    let read = store
        .get_result(ns, "j-redis-1")
        .await
        .expect("get_result")
        .expect("result present");
    assert!(read.is_ok());

    // Consumed: a second read finds the slot empty.
    assert!(store
        .get_result(ns, "j-redis-1")
        .await
        .expect("get_result")
        .is_none());
}

/// Test that a short TTL removes an unread result.
#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_result_slot_expires() {
    let url = get_redis_url();
    let store = RedisQueueStore::connect(&url).await.expect("connect");
    let ns = "guildest-test-expiry";

    let result = JobResult::ok("j-redis-2", json!({"verdict": "safe"}));
    store
        .put_result(ns, "j-redis-2", &result, Duration::from_secs(1))
        .await
        .expect("put_result");

    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(store
        .get_result(ns, "j-redis-2")
        .await
        .expect("get_result")
        .is_none());
}

/// Test overwrite semantics: a second publish replaces the first.
#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_put_result_overwrites() {
    let url = get_redis_url();
    let store = RedisQueueStore::connect(&url).await.expect("connect");
    let ns = "guildest-test-overwrite";

    store
        .put_result(
            ns,
            "j-redis-3",
            &JobResult::ok("j-redis-3", json!({"attempt": 1})),
            Duration::from_secs(30),
        )
        .await
        .expect("put_result");
    store
        .put_result(
            ns,
            "j-redis-3",
            &JobResult::ok("j-redis-3", json!({"attempt": 2})),
            Duration::from_secs(30),
        )
        .await
        .expect("put_result");

    let read = store
        .get_result(ns, "j-redis-3")
        .await
        .expect("get_result")
        .expect("result present");
    assert_eq!(read.value.expect("value")["attempt"], 2);

    // Single slot: nothing queued behind the overwrite.
    assert!(store
        .get_result(ns, "j-redis-3")
        .await
        .expect("get_result")
        .is_none());
}
