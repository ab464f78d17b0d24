use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use d_coord::InMemoryStore;
use d_coord::ReservationHandle;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::commons::connect;
use crate::commons::connect_all;
use crate::commons::JOBS_EXPORT;
use crate::commons::WAKE_BOUND;

#[tokio::test(start_paused = true)]
async fn test_back_to_back_exclusive_owners() {
    let store = InMemoryStore::new();
    let a = connect(&store, "A").await;
    let b = connect(&store, "B").await;
    let lock_a = a.client.exclusive_lock(JOBS_EXPORT).unwrap();
    let lock_b = b.client.exclusive_lock(JOBS_EXPORT).unwrap();

    assert!(lock_a.try_lock().await.unwrap());
    assert!(!lock_b.try_lock().await.unwrap());
    assert_eq!(store.children(lock_a.entity_path()).len(), 1);

    let waiter = {
        let lock_b = lock_b.clone();
        tokio::spawn(async move {
            let start = Instant::now();
            let acquired = lock_b
                .try_lock_for(Duration::from_millis(5000), &CancellationToken::new())
                .await
                .unwrap();
            (acquired, start.elapsed())
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    lock_a.unlock().await.unwrap();

    let (acquired, elapsed) = waiter.await.unwrap();
    assert!(acquired);
    assert!(elapsed < WAKE_BOUND);

    // Sequence 1 went to B's abandoned zero-wait attempt
    let b_path = lock_b.lock_id().unwrap();
    assert!(b_path.ends_with("/EX_0000000002"));
}

#[tokio::test(start_paused = true)]
async fn test_exclusive_holders_are_serialized_in_queue_order() {
    let store = InMemoryStore::new();
    let owners = ["A", "B", "C", "D"];
    let processes = connect_all(&store, &owners).await;
    let first = processes[0].client.exclusive_lock(JOBS_EXPORT).unwrap();
    first.lock().await.unwrap();

    let holders = Arc::new(AtomicUsize::new(1));
    let max_holders = Arc::new(AtomicUsize::new(1));
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut tasks = Vec::new();
    for (process, owner) in processes.iter().zip(owners).skip(1) {
        let lock = process.client.exclusive_lock(JOBS_EXPORT).unwrap();
        let holders = holders.clone();
        let max_holders = max_holders.clone();
        let order = order.clone();
        tasks.push(tokio::spawn(async move {
            lock.lock().await.unwrap();
            let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
            max_holders.fetch_max(now, Ordering::SeqCst);
            order.lock().push(owner);
            tokio::time::sleep(Duration::from_millis(10)).await;
            holders.fetch_sub(1, Ordering::SeqCst);
            lock.unlock().await.unwrap();
        }));
        // Let the task queue its reservation before the next one
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    holders.fetch_sub(1, Ordering::SeqCst);
    first.unlock().await.unwrap();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(*order.lock(), vec!["B", "C", "D"]);
    assert_eq!(max_holders.load(Ordering::SeqCst), 1);
    assert!(store.children(first.entity_path()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_readers_coexist_and_writer_waits_for_all() {
    let store = InMemoryStore::new();
    let processes = connect_all(&store, &["R1", "R2", "W"]).await;
    let r1 = processes[0].client.read_write_lock(JOBS_EXPORT).unwrap();
    let r2 = processes[1].client.read_write_lock(JOBS_EXPORT).unwrap();
    let w = processes[2].client.read_write_lock(JOBS_EXPORT).unwrap();

    r1.read_lock().lock().await.unwrap();
    r2.read_lock().lock().await.unwrap();
    assert!(r1.read_lock().is_held() && r2.read_lock().is_held());

    let writer = w.write_lock().clone();
    let pending = tokio::spawn(async move { writer.lock().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!pending.is_finished());

    r1.read_lock().unlock().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!pending.is_finished());

    r2.read_lock().unlock().await.unwrap();
    pending.await.unwrap().unwrap();
    assert!(w.write_lock().is_held());
}

#[tokio::test(start_paused = true)]
async fn test_reentrant_lock_creates_and_deletes_one_node() {
    let store = InMemoryStore::new();
    let a = connect(&store, "A").await;
    let lock = a.client.exclusive_lock(JOBS_EXPORT).unwrap();

    for _ in 0..5 {
        lock.lock().await.unwrap();
    }
    let path = lock.lock_id().unwrap();
    assert_eq!(store.children(lock.entity_path()).len(), 1);
    for _ in 0..4 {
        lock.unlock().await.unwrap();
        assert!(store.contains(&path));
    }
    lock.unlock().await.unwrap();

    assert!(!store.contains(&path));
}

#[tokio::test(start_paused = true)]
async fn test_relinquish_of_deleted_reservation_succeeds() {
    let store = InMemoryStore::new();
    let a = connect(&store, "A").await;
    let lock = a.client.exclusive_lock(JOBS_EXPORT).unwrap();
    lock.lock().await.unwrap();
    let path = lock.lock_id().unwrap();

    assert!(a.client.manager().relinquish(&path).await);
    assert!(a.client.manager().relinquish(&path).await);
}

#[tokio::test(start_paused = true)]
async fn test_crashed_holder_hands_over_through_session_loss() {
    let store = InMemoryStore::new();
    let a = connect(&store, "A").await;
    let b = connect(&store, "B").await;
    let lock_a = a.client.exclusive_lock(JOBS_EXPORT).unwrap();
    let lock_b = b.client.exclusive_lock(JOBS_EXPORT).unwrap();
    lock_a.lock().await.unwrap();

    let pending = {
        let lock_b = lock_b.clone();
        tokio::spawn(async move { lock_b.lock().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    a.session.expire();

    pending.await.unwrap().unwrap();
    assert!(lock_b.is_held());
}
