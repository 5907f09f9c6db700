// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

use crate::service::CommandSpec;

async fn registry_with_uitest(on_stop: Option<crate::service::StopHook>) -> Arc<ServiceRegistry> {
    let services = Arc::new(ServiceRegistry::new());
    let spec = CommandSpec { on_stop, ..CommandSpec::new(["sleep", "30"]) };
    services.add("uitest", spec).await.unwrap();
    services
}

#[tokio::test]
async fn firing_stops_the_guarded_services() {
    let services = registry_with_uitest(None).await;
    services.start("uitest").await.unwrap();
    assert!(services.running("uitest").await);

    let timer = Arc::new(SafeTimer::new(Duration::from_millis(100)));
    let _guard = IdleGuard::spawn(
        timer,
        Duration::from_millis(100),
        Arc::clone(&services),
        vec!["uitest".to_owned()],
        CancellationToken::new(),
    );

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!services.running("uitest").await);
}

#[tokio::test]
#[serial_test::serial(timing)]
async fn resets_defer_the_stop() {
    let services = registry_with_uitest(None).await;
    services.start("uitest").await.unwrap();

    let timer = Arc::new(SafeTimer::new(Duration::from_millis(200)));
    let guard = IdleGuard::spawn(
        timer,
        Duration::from_millis(200),
        Arc::clone(&services),
        vec!["uitest".to_owned()],
        CancellationToken::new(),
    );

    // Simulated RPC activity keeps the runner alive past several windows.
    for _ in 0..6 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        guard.reset();
    }
    assert!(services.running("uitest").await);

    // Activity stops; the guard fires.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!services.running("uitest").await);

    services.stop_all().await;
}

#[tokio::test]
async fn stopping_the_service_disarms_the_timer() {
    // The uitest spec wires its stop hook to the idle timer, so a manual
    // stop cancels the countdown.
    let timer = Arc::new(SafeTimer::new(Duration::from_millis(300)));
    let hook_timer = Arc::clone(&timer);
    let on_stop: crate::service::StopHook = Arc::new(move || hook_timer.stop());

    let services = registry_with_uitest(Some(on_stop)).await;
    services.start("uitest").await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    services.stop("uitest", true).await.unwrap();

    // Disarmed: no fire arrives after the original window.
    let fired = tokio::time::timeout(Duration::from_millis(600), timer.fired()).await;
    assert!(fired.is_err());
}
