// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn fires_after_initial_window() {
    let timer = SafeTimer::new(Duration::from_millis(50));
    let got = tokio::time::timeout(Duration::from_secs(1), timer.fired()).await;
    assert_eq!(got.ok().flatten(), Some(()));
}

#[tokio::test]
async fn reset_without_duration_reuses_last() {
    let timer = SafeTimer::new(Duration::from_millis(50));
    assert!(timer.fired().await.is_some());

    timer.reset(None);
    let got = tokio::time::timeout(Duration::from_secs(1), timer.fired()).await;
    assert_eq!(got.ok().flatten(), Some(()));
}

#[tokio::test]
async fn double_reset_delivers_a_single_fire() {
    let timer = SafeTimer::new(Duration::from_millis(30));
    timer.reset(None);
    timer.reset(None);

    let first = tokio::time::timeout(Duration::from_secs(1), timer.fired()).await;
    assert_eq!(first.ok().flatten(), Some(()));

    // The overwritten deadline must not produce a second delivery.
    let second = tokio::time::timeout(Duration::from_millis(200), timer.fired()).await;
    assert!(second.is_err());
}

#[tokio::test]
async fn stop_disarms_the_timer() {
    let timer = SafeTimer::new(Duration::from_millis(30));
    timer.stop();
    let got = tokio::time::timeout(Duration::from_millis(200), timer.fired()).await;
    assert!(got.is_err());
}

#[tokio::test]
async fn concurrent_resets_do_not_race() {
    let timer = std::sync::Arc::new(SafeTimer::new(Duration::from_secs(3600)));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let timer = std::sync::Arc::clone(&timer);
        handles.push(tokio::spawn(async move {
            for _ in 0..100 {
                timer.reset(Some(Duration::from_secs(3600)));
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
}
