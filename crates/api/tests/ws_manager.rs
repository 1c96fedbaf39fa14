//! Tests for `WsManager` without HTTP upgrades.

use axum::extract::ws::Message;
use annotator_api::ws::WsManager;

#[tokio::test]
async fn new_manager_has_zero_connections() {
    let manager = WsManager::new();
    assert_eq!(manager.connection_count().await, 0);
}

#[tokio::test]
async fn add_and_remove_track_connections() {
    let manager = WsManager::new();

    let _rx = manager.add("conn-1".to_string()).await;
    assert_eq!(manager.connection_count().await, 1);

    manager.remove("nonexistent").await;
    assert_eq!(manager.connection_count().await, 1);

    manager.remove("conn-1").await;
    assert_eq!(manager.connection_count().await, 0);
}

#[tokio::test]
async fn broadcast_skips_closed_receivers() {
    let manager = WsManager::new();
    let mut live = manager.add("live".to_string()).await;
    let gone = manager.add("gone".to_string()).await;
    drop(gone);

    let delivered = manager
        .broadcast_json(&serde_json::json!({"event": "upload_progress"}))
        .await;

    assert_eq!(delivered, 1);
    assert!(matches!(live.recv().await, Some(Message::Text(_))));
}

#[tokio::test]
async fn shutdown_all_sends_close_and_clears() {
    let manager = WsManager::new();
    let mut rx1 = manager.add("conn-1".to_string()).await;
    let mut rx2 = manager.add("conn-2".to_string()).await;

    manager.shutdown_all().await;

    assert_eq!(manager.connection_count().await, 0);
    assert!(matches!(rx1.recv().await, Some(Message::Close(None))));
    assert!(matches!(rx2.recv().await, Some(Message::Close(None))));
}

#[tokio::test]
async fn ping_all_sends_ping_frames() {
    let manager = WsManager::new();
    let mut rx = manager.add("conn-1".to_string()).await;

    manager.ping_all().await;

    assert!(matches!(rx.recv().await, Some(Message::Ping(_))));
}
