//! Integration tests against a live Redis instance.
//!
//! These require a running Redis at `redis://127.0.0.1:6379` and are
//! ignored by default. Run with:
//!
//! ```text
//! cargo test --test redis_backend -- --ignored
//! ```
//!
//! Each test uses its own key prefix so runs never interfere.

use std::time::Duration;

use futures::StreamExt;
use serde_json::json;

use widget_relay::config::{AppConfig, RedisConfig, StateConfig};
use widget_relay::domain::{SessionId, UserId, WidgetId};
use widget_relay::StateManager;

const REDIS_URL: &str = "redis://127.0.0.1:6379";

fn deployed_manager(prefix: &str, worker: &str) -> StateManager {
    let config = AppConfig {
        state: StateConfig {
            deploy_mode: true,
            key_prefix: prefix.to_string(),
            ..Default::default()
        },
        redis: RedisConfig {
            url: REDIS_URL.to_string(),
            ..Default::default()
        },
    };
    StateManager::new(config).with_worker_id(worker.into())
}

fn wid(s: &str) -> WidgetId {
    WidgetId::new(s).unwrap()
}

#[tokio::test]
#[ignore]
async fn two_workers_share_widget_state() {
    let worker_a = deployed_manager("wrtest:e2e", "worker-a");
    let worker_b = deployed_manager("wrtest:e2e", "worker-b");

    // Worker A registers; worker B reads through the shared store.
    worker_a
        .register_widget(wid("abc"), "<p>hi</p>", None, None)
        .await
        .unwrap();

    assert_eq!(
        worker_b.get_widget_html(&wid("abc")).await.unwrap().as_deref(),
        Some("<p>hi</p>")
    );

    // Worker A deletes; worker B observes the absence.
    assert!(worker_a.delete_widget(&wid("abc")).await.unwrap());
    assert!(!worker_b.widget_exists(&wid("abc")).await.unwrap());
}

#[tokio::test]
#[ignore]
async fn connection_supersession_across_workers() {
    let worker_a = deployed_manager("wrtest:conn", "worker-a");
    let worker_b = deployed_manager("wrtest:conn", "worker-b");

    worker_a
        .register_connection(wid("w"), None, None)
        .await
        .unwrap();
    // Browser reconnects through worker B.
    worker_b
        .register_connection(wid("w"), None, None)
        .await
        .unwrap();

    assert_eq!(
        worker_a.connection_owner(&wid("w")).await.unwrap(),
        Some("worker-b".into())
    );
    assert!(worker_a.list_own_connections().await.unwrap().is_empty());
    assert_eq!(
        worker_b.list_own_connections().await.unwrap(),
        vec![wid("w")]
    );

    worker_b.unregister_connection(&wid("w")).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn events_cross_the_worker_boundary() {
    let worker_a = deployed_manager("wrtest:bus", "worker-a");
    let worker_b = deployed_manager("wrtest:bus", "worker-b");

    let mut stream = worker_b.subscribe_widget(&wid("w")).await.unwrap();
    // Redis pub/sub subscriptions take a moment to establish.
    tokio::time::sleep(Duration::from_millis(100)).await;

    worker_a
        .broadcast_event(&wid("w"), "value_change", json!({"value": 7}))
        .await
        .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("event should arrive")
        .expect("stream should stay open");

    assert_eq!(received.event_type, "value_change");
    assert_eq!(received.data["value"], 7);
    assert_eq!(received.source_worker_id, "worker-a".into());
}

#[tokio::test]
#[ignore]
async fn dispatch_routes_to_owning_worker() {
    let worker_a = deployed_manager("wrtest:route", "worker-a");
    let worker_b = deployed_manager("wrtest:route", "worker-b");

    // Worker B owns the connection and pumps its widget channel.
    worker_b
        .register_connection(wid("w"), None, None)
        .await
        .unwrap();
    let mut stream = worker_b.subscribe_widget(&wid("w")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // A client event lands on worker A, which has no handler for it.
    let (handled, _) = worker_a
        .dispatch_client_event(&wid("w"), "click", json!({"x": 1}))
        .await
        .unwrap();
    assert!(!handled);

    let event = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("event should arrive")
        .expect("stream should stay open");

    assert_eq!(event.event_type, "click");
    assert_eq!(event.target_worker_id, Some("worker-b".into()));
    assert!(event.is_for_worker(worker_b.worker_id()));

    worker_b.unregister_connection(&wid("w")).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn session_ttl_expires_in_redis() {
    let manager = deployed_manager("wrtest:sess", "worker-a");
    let sid = SessionId::new("s-ttl").unwrap();

    manager
        .create_session(
            sid.clone(),
            UserId::new("u1").unwrap(),
            vec!["viewer".into()],
            Some(Duration::from_secs(1)),
            None,
        )
        .await
        .unwrap();

    assert!(manager.validate_session(&sid).await.unwrap());

    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(!manager.validate_session(&sid).await.unwrap());
}
