// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

use tokio::io::AsyncWriteExt;

const HANDSHAKE: &[u8] = b"v 1\n^ 10 1080 1920 255\n$ 25654\n";

fn req(operation: TouchOp) -> TouchRequest {
    TouchRequest {
        operation,
        index: 0,
        x_percent: 0.0,
        y_percent: 0.0,
        pressure: 0.0,
        milliseconds: 0,
    }
}

/// Run the drainer against an in-memory peer; returns everything the
/// drainer wrote.
async fn drain_script(reqs: Vec<TouchRequest>) -> Vec<u8> {
    let (mut peer, agent) = tokio::io::duplex(4096);
    peer.write_all(HANDSHAKE).await.unwrap();

    let (tx, mut rx) = mpsc::channel(reqs.len().max(1));
    for r in reqs {
        tx.send(r).await.unwrap();
    }
    drop(tx);

    drain_touch_requests(agent, &mut rx).await.unwrap();

    let mut written = Vec::new();
    // The drainer half is dropped, so this read terminates.
    tokio::io::AsyncReadExt::read_to_end(&mut peer, &mut written).await.unwrap();
    written
}

#[tokio::test]
async fn scales_coordinates_and_serializes_ops() {
    let script = vec![
        TouchRequest { x_percent: 1.0, y_percent: 1.0, pressure: 1.0, index: 1, ..req(TouchOp::Down) },
        req(TouchOp::Commit),
        TouchRequest { x_percent: 0.5, y_percent: 0.5, pressure: 1.0, index: 3, ..req(TouchOp::Move) },
        TouchRequest { index: 4, ..req(TouchOp::Up) },
    ];
    let written = drain_script(script).await;
    assert_eq!(written, b"d 1 1080 1920 255\nc\nm 3 540 960 255\nu 4\n");
}

#[tokio::test]
async fn reset_and_wait_lines() {
    let script = vec![req(TouchOp::Reset), TouchRequest { milliseconds: 50, ..req(TouchOp::Wait) }];
    let written = drain_script(script).await;
    assert_eq!(written, b"r\nw 50\n");
}

#[tokio::test]
async fn zero_pressure_defaults_below_max() {
    let script = vec![TouchRequest {
        x_percent: 0.5,
        y_percent: 0.5,
        index: 0,
        ..req(TouchOp::Down)
    }];
    let written = drain_script(script).await;
    assert_eq!(written, b"d 0 540 960 254\n");
}

#[tokio::test]
async fn missing_handshake_is_an_error() {
    let (peer, agent) = tokio::io::duplex(64);
    drop(peer);
    let (_tx, mut rx) = mpsc::channel(1);
    let err = drain_touch_requests(agent, &mut rx).await;
    assert!(err.is_err());
}

#[tokio::test]
async fn malformed_handshake_is_an_error() {
    let (mut peer, agent) = tokio::io::duplex(256);
    peer.write_all(b"x 1\n^ 10 1080 1920 255\n$ 1\n").await.unwrap();
    let (_tx, mut rx) = mpsc::channel(1);
    let err = drain_touch_requests(agent, &mut rx).await;
    assert!(matches!(err, Err(TouchError::Handshake(_))));
}

#[tokio::test]
async fn peer_chatter_after_handshake_is_discarded() {
    let (mut peer, agent) = tokio::io::duplex(4096);
    peer.write_all(HANDSHAKE).await.unwrap();
    peer.write_all(b"unsolicited diagnostics\n").await.unwrap();

    let (tx, mut rx) = mpsc::channel(1);
    let drainer = tokio::spawn(async move { drain_touch_requests(agent, &mut rx).await });

    tx.send(req(TouchOp::Commit)).await.unwrap();
    drop(tx);
    drainer.await.unwrap().unwrap();

    let mut written = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut peer, &mut written).await.unwrap();
    assert_eq!(written, b"c\n");
}

#[tokio::test]
async fn write_error_terminates_with_the_error() {
    let (mut peer, agent) = tokio::io::duplex(4096);
    peer.write_all(HANDSHAKE).await.unwrap();

    let (tx, mut rx) = mpsc::channel(4);
    let drainer = tokio::spawn(async move { drain_touch_requests(agent, &mut rx).await });

    // Tear the peer down, then keep sending until the write side notices.
    drop(peer);
    let err = loop {
        if tx.send(req(TouchOp::Commit)).await.is_err() {
            break drainer.await.unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        if drainer.is_finished() {
            break drainer.await.unwrap();
        }
    };
    assert!(matches!(err, Err(TouchError::Io(_))));
}

// ── serde shape ───────────────────────────────────────────────────────

#[test]
fn touch_request_json_field_names() {
    let parsed: TouchRequest = serde_json::from_str(
        r#"{"operation":"d","index":2,"xP":0.25,"yP":0.75,"pressure":0.5,"milliseconds":0}"#,
    )
    .unwrap();
    assert_eq!(parsed.operation, TouchOp::Down);
    assert_eq!(parsed.index, 2);
    assert!((parsed.x_percent - 0.25).abs() < f64::EPSILON);
    assert!((parsed.y_percent - 0.75).abs() < f64::EPSILON);
}

#[test]
fn touch_request_defaults_optional_fields() {
    let parsed: TouchRequest = serde_json::from_str(r#"{"operation":"c"}"#).unwrap();
    assert_eq!(parsed.operation, TouchOp::Commit);
    assert_eq!(parsed.index, 0);
}

#[yare::parameterized(
    half = { 0.5, 255, 128 },
    full = { 1.0, 255, 255 },
    over = { 2.0, 255, 255 },
    rounds_to_zero = { 0.001, 255, 254 },
    negative_clamps_low = { -0.5, 255, 1 },
    unspecified = { 0.0, 255, 254 },
)]
fn pressure_scaling(fraction: f64, max: u32, expected: u32) {
    assert_eq!(scale_pressure(fraction, max), expected);
}
