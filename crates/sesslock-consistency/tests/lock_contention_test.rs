// Integration tests for LockService
// Contention timing, mutual exclusion between owners, and stale lock reclaim

use std::sync::Arc;
use std::time::Duration;

use sesslock_backend::{KvBackend, MemoryBackend};
use sesslock_consistency::{LockOptions, LockService, LockValue};

const TIMEOUT: Duration = Duration::from_secs(20);

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[tokio::test(start_paused = true)]
async fn test_contention_exhausts_attempts_after_backoff() {
    let backend = Arc::new(MemoryBackend::new());
    let holder = LockService::with_owner(backend.clone(), "holder");
    let contender = LockService::with_owner(backend.clone(), "contender")
        .with_backoff(Duration::from_millis(500));

    assert!(holder.acquire("lock:x", TIMEOUT, 1).await.unwrap());

    let started = tokio::time::Instant::now();
    let acquired = contender.acquire("lock:x", TIMEOUT, 3).await.unwrap();
    let waited = started.elapsed();

    assert!(!acquired);
    assert!(waited >= Duration::from_millis(1500));
    assert!(waited < Duration::from_millis(2000));
}

#[tokio::test(start_paused = true)]
async fn test_acquire_succeeds_once_holder_releases() {
    let backend = Arc::new(MemoryBackend::new());
    let holder = Arc::new(LockService::with_owner(backend.clone(), "holder"));
    let waiter = LockService::with_owner(backend.clone(), "waiter")
        .with_backoff(Duration::from_millis(100));

    assert!(holder.acquire("lock:x", TIMEOUT, 1).await.unwrap());

    let releaser = holder.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        releaser.release("lock:x").await.unwrap();
    });

    assert!(waiter.acquire("lock:x", TIMEOUT, 10).await.unwrap());
    assert!(waiter.locked("lock:x", true).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mutual_exclusion_between_many_owners() {
    let backend = Arc::new(MemoryBackend::new());
    let options = LockOptions {
        timeout: TIMEOUT,
        max_attempts: 1,
        backoff: Duration::from_millis(1),
    };

    let mut handles = Vec::new();
    for i in 0..16 {
        let svc = LockService::with_owner(backend.clone(), format!("owner{}", i));
        handles.push(tokio::spawn(async move {
            let acquired = svc.acquire_with("lock:shared", &options).await.unwrap();
            // Keep the service (and its lock) alive past the spawn
            (acquired, svc)
        }));
    }

    let mut winners = 0;
    let mut services = Vec::new();
    for handle in handles {
        let (acquired, svc) = handle.await.unwrap();
        if acquired {
            winners += 1;
        }
        services.push(svc);
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_stale_lock_reclaimed_even_though_key_exists() {
    let backend = Arc::new(MemoryBackend::new());
    let stale = LockValue::new(now() - 60, "gone");
    backend
        .set_if_absent("lock:x", stale.encode().as_bytes())
        .await
        .unwrap();
    assert!(backend.exists("lock:x").await.unwrap());

    let svc = LockService::with_owner(backend.clone(), "fresh");
    assert!(svc.acquire("lock:x", TIMEOUT, 1).await.unwrap());

    let raw = backend.get("lock:x").await.unwrap().unwrap();
    let value = LockValue::parse(&raw).unwrap();
    assert_eq!(value.owner, "fresh");
    assert!(!value.is_expired_at(now()));
}

#[tokio::test]
async fn test_release_by_other_owner_leaves_key_untouched() {
    let backend = Arc::new(MemoryBackend::new());
    let a = LockService::with_owner(backend.clone(), "a");
    let b = LockService::with_owner(backend.clone(), "b");

    assert!(a.acquire("lock:x", TIMEOUT, 1).await.unwrap());
    let before = backend.get("lock:x").await.unwrap();

    assert!(!b.release("lock:x").await.unwrap());
    assert_eq!(backend.get("lock:x").await.unwrap(), before);
    assert!(a.release("lock:x").await.unwrap());
}
