use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use d_coord::InMemoryStore;
use d_coord::ReservationHandle;
use tokio::time::Instant;

use crate::commons::connect;
use crate::commons::connect_all;
use crate::commons::POOL_X;
use crate::commons::WAKE_BOUND;

#[tokio::test(start_paused = true)]
async fn test_third_owner_waits_for_a_released_permit() {
    let store = InMemoryStore::new();
    let processes = connect_all(&store, &["P1", "P2", "P3"]).await;
    let sems: Vec<_> = processes
        .iter()
        .map(|p| p.client.semaphore(POOL_X, 2).unwrap())
        .collect();

    assert!(sems[0].try_acquire().await.unwrap());
    assert!(sems[1].try_acquire().await.unwrap());

    let third = {
        let sem = sems[2].clone();
        tokio::spawn(async move {
            sem.acquire().await.unwrap();
            Instant::now()
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!third.is_finished());
    assert_eq!(store.children(sems[0].entity_path()).len(), 3);

    let released_at = Instant::now();
    assert_eq!(sems[0].release(1).await, 1);

    let acquired_at = third.await.unwrap();
    assert!(acquired_at - released_at < WAKE_BOUND);
    assert_eq!(sems[2].acquired_permits(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_holders_never_exceed_pool() {
    let store = InMemoryStore::new();
    let owners = ["P1", "P2", "P3", "P4", "P5"];
    let processes = connect_all(&store, &owners).await;
    let holders = Arc::new(AtomicUsize::new(0));
    let max_holders = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for process in &processes {
        let sem = process.client.semaphore(POOL_X, 2).unwrap();
        let holders = holders.clone();
        let max_holders = max_holders.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..3 {
                sem.acquire().await.unwrap();
                let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
                max_holders.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(7)).await;
                holders.fetch_sub(1, Ordering::SeqCst);
                assert_eq!(sem.release(1).await, 1);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let max = max_holders.load(Ordering::SeqCst);
    assert!((1..=2).contains(&max), "max concurrent holders was {}", max);
    assert!(store.children("/d-coord/coord/semaphore/pool/x").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_configured_pool_is_shared_between_processes() {
    let store = InMemoryStore::new();
    let admin = connect(&store, "admin").await;
    admin.client.configure_semaphore(POOL_X, 1).await.unwrap();

    let worker_a = connect(&store, "A").await;
    let worker_b = connect(&store, "B").await;
    let sem_a = worker_a.client.configured_semaphore(POOL_X).await.unwrap();
    let sem_b = worker_b.client.configured_semaphore(POOL_X).await.unwrap();

    let guard = sem_a.acquire_scoped(1).await.unwrap();
    assert!(!sem_b.try_acquire().await.unwrap());
    guard.release().await;
    assert!(sem_b.try_acquire().await.unwrap());
}
