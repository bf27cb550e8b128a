//! End-to-end tests of the StateManager facade over the memory backends.

use std::time::Duration;

use futures::StreamExt;
use serde_json::{json, Map};

use widget_relay::application::Callback;
use widget_relay::config::{AppConfig, StateConfig};
use widget_relay::domain::{SessionId, UserId, WidgetId};
use widget_relay::{EventMessage, StateManager, SyncBridge};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}

fn wid(s: &str) -> WidgetId {
    WidgetId::new(s).unwrap()
}

fn sid(s: &str) -> SessionId {
    SessionId::new(s).unwrap()
}

fn uid(s: &str) -> UserId {
    UserId::new(s).unwrap()
}

fn local_manager() -> StateManager {
    init_tracing();
    StateManager::new(AppConfig::local())
}

#[tokio::test]
async fn widget_round_trip_through_facade() {
    let manager = local_manager();

    manager
        .register_widget(wid("abc"), "<p>hi</p>", Some("tok".into()), None)
        .await
        .unwrap();

    assert_eq!(
        manager.get_widget_html(&wid("abc")).await.unwrap().as_deref(),
        Some("<p>hi</p>")
    );
    assert_eq!(
        manager.get_widget_token(&wid("abc")).await.unwrap().as_deref(),
        Some("tok")
    );
}

#[tokio::test]
async fn reregistration_is_idempotent_for_count() {
    let manager = local_manager();

    manager
        .register_widget(wid("w"), "<p>A</p>", None, None)
        .await
        .unwrap();
    let after_one = manager.widget_count().await.unwrap();

    manager
        .register_widget(wid("w"), "<p>B</p>", None, None)
        .await
        .unwrap();

    assert_eq!(
        manager.get_widget_html(&wid("w")).await.unwrap().as_deref(),
        Some("<p>B</p>")
    );
    assert_eq!(manager.widget_count().await.unwrap(), after_one);
}

#[tokio::test]
async fn session_ttl_expiry_is_observed_without_delete() {
    let manager = local_manager();

    manager
        .create_session(
            sid("s1"),
            uid("u1"),
            vec![],
            Some(Duration::from_millis(50)),
            None,
        )
        .await
        .unwrap();

    assert!(manager.validate_session(&sid("s1")).await.unwrap());

    tokio::time::sleep(Duration::from_millis(120)).await;

    assert!(!manager.validate_session(&sid("s1")).await.unwrap());
}

#[tokio::test]
async fn connection_ownership_supersession() {
    use widget_relay::domain::ConnectionInfo;
    use widget_relay::adapters::memory::MemoryConnectionRouter;
    use widget_relay::ports::ConnectionRouter;

    init_tracing();
    let router = MemoryConnectionRouter::with_default_ttl();

    router
        .register_connection(ConnectionInfo::new(wid("w"), "worker-a".into()))
        .await
        .unwrap();
    router
        .register_connection(ConnectionInfo::new(wid("w"), "worker-b".into()))
        .await
        .unwrap();

    assert_eq!(
        router.get_owner(&wid("w")).await.unwrap(),
        Some("worker-b".into())
    );
    assert!(router
        .list_worker_connections(&"worker-a".into())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn callback_isolation_across_widgets() {
    let manager = local_manager();

    manager.register_callback(wid("w1"), "click", Callback::sync(|_| Ok(json!("w1"))));

    let (handled, _) = manager
        .dispatch_client_event(&wid("w2"), "click", json!({}))
        .await
        .unwrap();
    assert!(!handled);

    let (handled, result) = manager
        .dispatch_client_event(&wid("w1"), "click", json!({}))
        .await
        .unwrap();
    assert!(handled);
    assert_eq!(result.unwrap(), json!("w1"));
}

#[tokio::test]
async fn raising_callback_is_swallowed_at_the_facade() {
    let manager = local_manager();
    manager.register_callback(
        wid("w1"),
        "click",
        Callback::sync(|_| panic!("handler bug")),
    );

    let (handled, result) = manager
        .dispatch_client_event(&wid("w1"), "click", json!({}))
        .await
        .unwrap();

    assert!(!handled);
    assert!(result.is_none());
    assert_eq!(manager.callback_stats().failures, 1);
}

#[tokio::test]
async fn permission_resolution_layers() {
    let manager = local_manager();

    // Viewer role, no resource grants.
    manager
        .create_session(sid("s1"), uid("u1"), vec!["viewer".into()], None, None)
        .await
        .unwrap();
    assert!(!manager
        .check_permission(&sid("s1"), "document", "d1", "write")
        .await
        .unwrap());

    // Same role plus a resource-scoped write grant for exactly (document, d1).
    let mut meta = Map::new();
    meta.insert(
        "permissions".to_string(),
        json!({"document:d1": ["write"]}),
    );
    manager
        .create_session(
            sid("s2"),
            uid("u1"),
            vec!["viewer".into()],
            None,
            Some(meta),
        )
        .await
        .unwrap();

    assert!(manager
        .check_permission(&sid("s2"), "document", "d1", "write")
        .await
        .unwrap());
    assert!(!manager
        .check_permission(&sid("s2"), "document", "d2", "write")
        .await
        .unwrap());
}

#[tokio::test]
async fn widget_state_machine_full_cycle() {
    let manager = local_manager();

    // UNREGISTERED -> REGISTERED
    manager
        .register_widget(wid("w"), "<p/>", None, None)
        .await
        .unwrap();
    assert!(manager.widget_exists(&wid("w")).await.unwrap());
    assert!(manager.connection_owner(&wid("w")).await.unwrap().is_none());

    // REGISTERED -> CONNECTED
    manager
        .register_connection(wid("w"), Some(uid("u1")), Some(sid("s1")))
        .await
        .unwrap();
    let info = manager.connection_info(&wid("w")).await.unwrap().unwrap();
    assert_eq!(&info.worker_id, manager.worker_id());

    // CONNECTED -> RECONNECTED (browser refresh re-registers)
    manager
        .register_connection(wid("w"), Some(uid("u1")), Some(sid("s1")))
        .await
        .unwrap();
    assert!(manager.refresh_heartbeat(&wid("w")).await.unwrap());

    // RECONNECTED -> DISCONNECTED (record survives)
    assert!(manager.unregister_connection(&wid("w")).await.unwrap());
    assert!(manager.widget_exists(&wid("w")).await.unwrap());

    // DISCONNECTED -> DELETED (terminal)
    assert!(manager.delete_widget(&wid("w")).await.unwrap());
    assert!(!manager.widget_exists(&wid("w")).await.unwrap());
}

#[tokio::test]
async fn event_flow_from_bus_to_local_queue() {
    let manager = local_manager();
    let mut rx = manager.attach_local(&wid("w")).await;

    // A peer-style event arrives from the bus pump.
    let event = EventMessage::new("update", wid("w"), json!({"html": "<p/>"}), "peer".into());
    let (delivered, _) = manager.handle_bus_event(event).await;

    assert!(delivered);
    let received = rx.recv().await.unwrap();
    assert_eq!(received.event_type, "update");
}

#[tokio::test]
async fn broadcast_event_reaches_local_consumer() {
    let manager = local_manager();
    let mut rx = manager.attach_local(&wid("w")).await;

    manager
        .broadcast_event(&wid("w"), "value_change", json!({"value": 3}))
        .await
        .unwrap();

    let received = rx.recv().await.unwrap();
    assert_eq!(received.event_type, "value_change");
    assert_eq!(received.data["value"], 3);
}

#[tokio::test]
async fn subscription_stream_sees_republished_events() {
    let manager = local_manager();
    let mut stream = manager.subscribe_widget(&wid("w")).await.unwrap();

    // No local consumer, so send_to_widget publishes to the bus.
    let event = EventMessage::new("nudge", wid("w"), json!({}), "peer".into());
    let local = manager.send_to_widget(&wid("w"), event).await.unwrap();
    assert!(!local);

    let received = stream.next().await.unwrap();
    assert_eq!(received.event_type, "nudge");
}

#[test]
fn sync_bridge_drives_manager_from_blocking_code() {
    init_tracing();
    let manager = std::sync::Arc::new(StateManager::new(AppConfig::local()));
    let bridge = SyncBridge::new(Duration::from_secs(5)).unwrap();

    let m = manager.clone();
    bridge
        .run(async move {
            m.register_widget(wid("w"), "<p>from sync</p>", None, None)
                .await
        })
        .unwrap()
        .unwrap();

    let m = manager.clone();
    let html = bridge
        .run(async move { m.get_widget_html(&wid("w")).await })
        .unwrap()
        .unwrap();

    assert_eq!(html.as_deref(), Some("<p>from sync</p>"));
}

#[tokio::test]
async fn sync_bridge_rejects_use_inside_runtime() {
    init_tracing();
    let bridge = SyncBridge::new(Duration::from_secs(5)).unwrap();
    let result = bridge.run(async { 1 });
    assert!(result.is_err());
}

#[tokio::test]
async fn custom_state_config_is_honored() {
    init_tracing();
    let config = AppConfig {
        state: StateConfig {
            connection_ttl_secs: 1,
            session_ttl_secs: 0,
            ..Default::default()
        },
        ..Default::default()
    };
    let manager = StateManager::new(config);

    // session_ttl_secs = 0 means sessions default to non-expiring.
    manager
        .create_session(sid("s"), uid("u"), vec![], None, None)
        .await
        .unwrap();
    let session = manager.get_session(&sid("s")).await.unwrap().unwrap();
    assert!(session.expires_at.is_none());
}
