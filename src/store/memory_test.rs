use std::sync::Arc;

use parking_lot::Mutex;

use crate::constants::ANY_VERSION;
use crate::Acl;
use crate::CoordinationStore;
use crate::CreateMode;
use crate::InMemoryStore;
use crate::SessionState;
use crate::StoreError;
use crate::Watch;
use crate::WatchEventType;
use crate::WatchListener;
use crate::WatchedEvent;

#[derive(Default)]
struct RecordingListener {
    events: Mutex<Vec<WatchedEvent>>,
}

impl RecordingListener {
    fn events(&self) -> Vec<WatchedEvent> {
        self.events.lock().clone()
    }
}

impl WatchListener for RecordingListener {
    fn process(
        &self,
        event: WatchedEvent,
    ) {
        self.events.lock().push(event);
    }
}

async fn mkdir(
    session: &impl CoordinationStore,
    path: &str,
) {
    session
        .create_node(path, Vec::new(), CreateMode::Persistent, &Acl::open_unsafe())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_sequential_suffix_is_zero_padded_and_increasing() {
    let store = InMemoryStore::new();
    let session = store.connect();
    mkdir(&session, "/lock").await;

    let first = session
        .create_node("/lock/EX_", Vec::new(), CreateMode::EphemeralSequential, &Acl::open_unsafe())
        .await
        .unwrap();
    let second = session
        .create_node("/lock/SH_", Vec::new(), CreateMode::EphemeralSequential, &Acl::open_unsafe())
        .await
        .unwrap();

    assert_eq!(first, "/lock/EX_0000000000");
    // Sequence counter is per parent, not per prefix
    assert_eq!(second, "/lock/SH_0000000001");
    assert_eq!(store.children("/lock"), vec!["EX_0000000000", "SH_0000000001"]);
}

#[tokio::test]
async fn test_create_requires_parent() {
    let store = InMemoryStore::new();
    let session = store.connect();

    let result = session
        .create_node("/missing/child", Vec::new(), CreateMode::Persistent, &Acl::open_unsafe())
        .await;
    assert!(matches!(result, Err(StoreError::NoNode(_))));
}

#[tokio::test]
async fn test_create_duplicate_fails_with_node_exists() {
    let store = InMemoryStore::new();
    let session = store.connect();
    mkdir(&session, "/a").await;

    let result = session
        .create_node("/a", Vec::new(), CreateMode::Persistent, &Acl::open_unsafe())
        .await;
    assert_eq!(result, Err(StoreError::NodeExists("/a".to_string())));
}

#[tokio::test]
async fn test_ephemeral_cannot_have_children() {
    let store = InMemoryStore::new();
    let session = store.connect();
    session
        .create_node("/e", Vec::new(), CreateMode::Ephemeral, &Acl::open_unsafe())
        .await
        .unwrap();

    let result = session
        .create_node("/e/child", Vec::new(), CreateMode::Persistent, &Acl::open_unsafe())
        .await;
    assert!(matches!(result, Err(StoreError::NoChildrenForEphemerals(_))));
}

#[tokio::test]
async fn test_delete_checks_version_and_children() {
    let store = InMemoryStore::new();
    let session = store.connect();
    mkdir(&session, "/a").await;
    mkdir(&session, "/a/b").await;

    assert!(matches!(
        session.delete("/a", ANY_VERSION).await,
        Err(StoreError::NotEmpty(_))
    ));
    assert!(matches!(
        session.delete("/a/b", 3).await,
        Err(StoreError::BadVersion { expected: 3, actual: 0, .. })
    ));
    session.delete("/a/b", 0).await.unwrap();
    assert!(matches!(
        session.delete("/a/b", ANY_VERSION).await,
        Err(StoreError::NoNode(_))
    ));
}

#[tokio::test]
async fn test_set_data_bumps_version() {
    let store = InMemoryStore::new();
    let session = store.connect();
    session
        .create_node("/d", b"one".to_vec(), CreateMode::Persistent, &Acl::open_unsafe())
        .await
        .unwrap();

    let stat = session.set_data("/d", b"two".to_vec(), 0).await.unwrap();
    assert_eq!(stat.version, 1);

    let (data, stat) = session.get_data("/d", Watch::None).await.unwrap();
    assert_eq!(data, b"two".to_vec());
    assert_eq!(stat.data_length, 3);

    assert!(matches!(
        session.set_data("/d", Vec::new(), 0).await,
        Err(StoreError::BadVersion { .. })
    ));
}

#[tokio::test]
async fn test_exists_reports_num_children() {
    let store = InMemoryStore::new();
    let session = store.connect();
    mkdir(&session, "/p").await;
    mkdir(&session, "/p/x").await;
    mkdir(&session, "/p/y").await;

    let stat = session.exists("/p", Watch::None).await.unwrap().unwrap();
    assert_eq!(stat.num_children, 2);
    assert_eq!(session.exists("/nope", Watch::None).await.unwrap(), None);
}

#[tokio::test]
async fn test_exists_watch_fires_once_on_delete() {
    let store = InMemoryStore::new();
    let session = store.connect();
    let listener = Arc::new(RecordingListener::default());
    mkdir(&session, "/w").await;

    session
        .exists("/w", Watch::listener(listener.clone()))
        .await
        .unwrap();
    // Same listener twice on the same path is deduplicated
    session
        .exists("/w", Watch::listener(listener.clone()))
        .await
        .unwrap();

    session.delete("/w", ANY_VERSION).await.unwrap();
    mkdir(&session, "/w").await;

    let events = listener.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0], WatchedEvent::node(WatchEventType::NodeDeleted, "/w"));
}

#[tokio::test]
async fn test_exists_watch_on_absent_node_fires_on_create() {
    let store = InMemoryStore::new();
    let session = store.connect();
    let listener = Arc::new(RecordingListener::default());

    session
        .exists("/later", Watch::listener(listener.clone()))
        .await
        .unwrap();
    mkdir(&session, "/later").await;

    assert_eq!(
        listener.events(),
        vec![WatchedEvent::node(WatchEventType::NodeCreated, "/later")]
    );
}

#[tokio::test]
async fn test_child_watch_fires_on_child_create() {
    let store = InMemoryStore::new();
    let session = store.connect();
    let listener = Arc::new(RecordingListener::default());
    mkdir(&session, "/parent").await;

    session
        .list_children("/parent", Watch::listener(listener.clone()))
        .await
        .unwrap();
    mkdir(&session, "/parent/c1").await;
    mkdir(&session, "/parent/c2").await;

    assert_eq!(
        listener.events(),
        vec![WatchedEvent::node(WatchEventType::NodeChildrenChanged, "/parent")]
    );
}

#[tokio::test]
async fn test_default_watch_routes_to_registered_listener() {
    let store = InMemoryStore::new();
    let session = store.connect();
    let listener = Arc::new(RecordingListener::default());
    session.register(listener.clone());
    mkdir(&session, "/dw").await;

    session.exists("/dw", Watch::Default).await.unwrap();
    session.set_data("/dw", b"x".to_vec(), ANY_VERSION).await.unwrap();

    assert_eq!(
        listener.events(),
        vec![WatchedEvent::node(WatchEventType::NodeDataChanged, "/dw")]
    );
}

#[tokio::test]
async fn test_expire_removes_ephemerals_and_notifies_others() {
    let store = InMemoryStore::new();
    let owner = store.connect();
    let observer = store.connect();
    let owner_listener = Arc::new(RecordingListener::default());
    let observer_listener = Arc::new(RecordingListener::default());
    owner.register(owner_listener.clone());

    mkdir(&owner, "/q").await;
    let node = owner
        .create_node("/q/EX_", Vec::new(), CreateMode::EphemeralSequential, &Acl::open_unsafe())
        .await
        .unwrap();
    observer
        .exists(&node, Watch::listener(observer_listener.clone()))
        .await
        .unwrap();

    owner.expire();

    assert!(!store.contains(&node));
    assert!(store.contains("/q"));
    assert_eq!(
        observer_listener.events(),
        vec![WatchedEvent::node(WatchEventType::NodeDeleted, node.clone())]
    );
    assert_eq!(
        owner_listener.events(),
        vec![WatchedEvent::session(SessionState::Expired)]
    );
    assert_eq!(
        owner.exists("/q", Watch::None).await,
        Err(StoreError::SessionExpired)
    );
}

#[tokio::test]
async fn test_disconnect_keeps_ephemerals_until_reconnect() {
    let store = InMemoryStore::new();
    let session = store.connect();
    let listener = Arc::new(RecordingListener::default());
    session.register(listener.clone());
    let node = session
        .create_node("/eph", Vec::new(), CreateMode::Ephemeral, &Acl::open_unsafe())
        .await
        .unwrap();

    session.disconnect();
    assert_eq!(
        session.exists(&node, Watch::None).await,
        Err(StoreError::ConnectionLoss)
    );
    assert!(store.contains(&node));

    session.reconnect();
    assert!(session.exists(&node, Watch::None).await.unwrap().is_some());
    assert_eq!(
        listener.events(),
        vec![
            WatchedEvent::session(SessionState::Disconnected),
            WatchedEvent::session(SessionState::SyncConnected),
        ]
    );
}

#[tokio::test]
async fn test_dropping_session_releases_ephemerals() {
    let store = InMemoryStore::new();
    let node = {
        let session = store.connect();
        session
            .create_node("/gone", Vec::new(), CreateMode::Ephemeral, &Acl::open_unsafe())
            .await
            .unwrap()
    };
    assert!(!store.contains(&node));
}

#[tokio::test]
async fn test_force_delete_fires_watches() {
    let store = InMemoryStore::new();
    let session = store.connect();
    let listener = Arc::new(RecordingListener::default());
    mkdir(&session, "/f").await;
    session
        .list_children("/", Watch::listener(listener.clone()))
        .await
        .unwrap();

    assert!(store.force_delete("/f"));
    assert!(!store.force_delete("/f"));
    assert_eq!(
        listener.events(),
        vec![WatchedEvent::node(WatchEventType::NodeChildrenChanged, "/")]
    );
}

#[tokio::test]
async fn test_remove_watches_drops_listener_registrations() {
    let store = InMemoryStore::new();
    let session = store.connect();
    mkdir(&session, "/lock").await;
    let listener = Arc::new(RecordingListener::default());

    for i in 0..100 {
        let path = format!("/lock/EX_{:010}", i);
        session
            .exists(&path, Watch::listener(listener.clone()))
            .await
            .unwrap();
    }
    session
        .list_children("/lock", Watch::listener(listener.clone()))
        .await
        .unwrap();
    assert_eq!(store.pending_watch_count(), 101);

    assert!(session
        .remove_watches("/lock", listener.clone())
        .await
        .unwrap());
    for i in 0..100 {
        let path = format!("/lock/EX_{:010}", i);
        assert!(session.remove_watches(&path, listener.clone()).await.unwrap());
    }
    assert!(!session
        .remove_watches("/lock/EX_0000000000", listener.clone())
        .await
        .unwrap());

    assert_eq!(store.pending_watch_count(), 0);
    assert_eq!(Arc::strong_count(&listener), 1);
    mkdir(&session, "/lock/EX_0000000000").await;
    assert!(listener.events().is_empty());
}

#[tokio::test]
async fn test_remove_watches_keeps_other_listeners() {
    let store = InMemoryStore::new();
    let session = store.connect();
    mkdir(&session, "/lock").await;
    let kept = Arc::new(RecordingListener::default());
    let removed = Arc::new(RecordingListener::default());
    session.exists("/lock/a", Watch::listener(kept.clone())).await.unwrap();
    session.exists("/lock/a", Watch::listener(removed.clone())).await.unwrap();

    assert!(session.remove_watches("/lock/a", removed.clone()).await.unwrap());
    mkdir(&session, "/lock/a").await;

    assert_eq!(kept.events().len(), 1);
    assert!(removed.events().is_empty());
}

#[tokio::test]
async fn test_nodes_keep_their_acl() {
    let store = InMemoryStore::new();
    let session = store.connect();
    session
        .create_node("/guarded", Vec::new(), CreateMode::Persistent, &Acl::read_unsafe())
        .await
        .unwrap();

    assert_eq!(store.acl("/guarded"), Some(Acl::read_unsafe()));
    assert_eq!(store.acl("/"), Some(Acl::open_unsafe()));
    assert_eq!(store.acl("/missing"), None);
}
