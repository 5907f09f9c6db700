// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

use tokio::io::AsyncWriteExt;

use crate::config::AgentConfig;

#[tokio::test]
async fn publish_updates_value_and_notifies_subscribers() {
    let cell = RotationCell::new();
    let mut rx = cell.subscribe();
    cell.publish(270);
    assert_eq!(cell.current(), 270);
    assert_eq!(rx.recv().await.unwrap(), 270);
}

#[tokio::test]
async fn watcher_translates_directions_to_degrees() {
    let dir = tempfile::tempdir().unwrap();
    let sock = dir.path().join("rot.sock").to_string_lossy().into_owned();
    let listener = crate::net::listen(&sock).unwrap();

    let cfg = AgentConfig { rotation_socket: sock, ..AgentConfig::default() };
    let settings = Arc::new(ScreenSettings::from_config(&cfg));
    let services = Arc::new(ServiceRegistry::new());
    let cell = Arc::new(RotationCell::new());
    let mut rx = cell.subscribe();

    let cancel = CancellationToken::new();
    let watcher = spawn_rotation_watcher(
        Arc::clone(&services),
        settings,
        Arc::clone(&cell),
        cancel.clone(),
    );

    let (mut conn, _) = listener.accept().await.unwrap();
    conn.write_all(b"1\n3\nbogus\n7\n").await.unwrap();
    drop(conn);

    assert_eq!(rx.recv().await.unwrap(), 90);
    assert_eq!(rx.recv().await.unwrap(), 270);
    assert_eq!(cell.current(), 270);

    // Out-of-range and non-numeric lines are ignored.
    let extra = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
    assert!(extra.is_err());

    cancel.cancel();
    watcher.await.unwrap();
}

#[tokio::test]
async fn hardware_backend_refreshes_capture_args() {
    use crate::config::BackendChoice;
    use crate::service::CommandSpec;

    let cfg = AgentConfig { backend: BackendChoice::Hardware, ..AgentConfig::default() };
    let settings = ScreenSettings::from_config(&cfg);
    let services = ServiceRegistry::new();
    services.add(SCREEN_SERVICE, CommandSpec::new(["sleep", "1"])).await.unwrap();
    let cell = RotationCell::new();

    apply_rotation(&services, &settings, &cell, 180).await;
    assert_eq!(cell.current(), 180);
    // Idle service: args updated without starting it.
    assert!(!services.running(SCREEN_SERVICE).await);
}
