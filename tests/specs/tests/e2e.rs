// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios: the assembled agent over real TCP, with fake
//! device sockets and platform tools.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_tungstenite::tungstenite::Message;

use devagent_specs::{agent_config, boot, spawn_fake_capture, write_script};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn next_msg(ws: &mut WsStream) -> Option<Message> {
    match tokio::time::timeout(Duration::from_secs(10), ws.next()).await {
        Ok(Some(Ok(msg))) => Some(msg),
        _ => None,
    }
}

/// Read messages until a binary frame arrives, returning it.
async fn next_binary(ws: &mut WsStream) -> Option<bytes::Bytes> {
    for _ in 0..50 {
        match next_msg(ws).await? {
            Message::Binary(data) => return Some(data),
            _ => continue,
        }
    }
    None
}

#[tokio::test]
async fn screen_stream_delivers_frames_and_newest_connection_wins() {
    let dir = tempfile::tempdir().unwrap();
    let sock = dir.path().join("cap.sock").to_string_lossy().into_owned();
    spawn_fake_capture(&sock).unwrap();

    let agent = boot(agent_config(&["--screen-agent-socket", &sock])).await.unwrap();

    let (mut first, _) =
        tokio_tungstenite::connect_async(agent.ws("/ws/screen")).await.unwrap();

    // The greeting is the current rotation, as text.
    match next_msg(&mut first).await.unwrap() {
        Message::Text(text) => assert_eq!(text.as_str(), "rotation 0"),
        other => panic!("expected rotation greeting, got {other:?}"),
    }

    // Frames arrive in production order, all JPEG-marked.
    let a = next_binary(&mut first).await.unwrap();
    let b = next_binary(&mut first).await.unwrap();
    assert_eq!(&a[..2], &[0xff, 0xd8]);
    assert_eq!(&b[..2], &[0xff, 0xd8]);
    assert_eq!(b[2], a[2].wrapping_add(1), "frames out of order");

    // A newer connection pre-empts the older one.
    let (mut second, _) =
        tokio_tungstenite::connect_async(agent.ws("/ws/screen")).await.unwrap();
    assert!(next_binary(&mut second).await.is_some());

    let first_died = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match first.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(first_died.is_ok(), "pre-empted stream never closed");
}

#[tokio::test]
async fn rotation_posts_reach_stream_subscribers() {
    let dir = tempfile::tempdir().unwrap();
    let sock = dir.path().join("cap.sock").to_string_lossy().into_owned();
    spawn_fake_capture(&sock).unwrap();

    let agent = boot(agent_config(&["--screen-agent-socket", &sock])).await.unwrap();
    let (mut ws, _) = tokio_tungstenite::connect_async(agent.ws("/ws/screen")).await.unwrap();
    assert!(next_binary(&mut ws).await.is_some());

    let resp = reqwest::Client::new()
        .post(agent.http("/api/v1/rotation"))
        .json(&2)
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let saw_rotation = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) if text.as_str() == "rotation 180" => break true,
                Some(Ok(_)) => continue,
                _ => break false,
            }
        }
    })
    .await
    .unwrap();
    assert!(saw_rotation, "rotation broadcast never arrived");
}

#[tokio::test]
async fn touch_commands_are_scaled_onto_the_device_protocol() {
    let dir = tempfile::tempdir().unwrap();
    let sock = dir.path().join("touch.sock").to_string_lossy().into_owned();

    // Fake touch service: handshake, then record everything written.
    let received = Arc::new(tokio::sync::Mutex::new(Vec::<u8>::new()));
    let listener = devagent::net::listen(&sock).unwrap();
    {
        let received = Arc::clone(&received);
        tokio::spawn(async move {
            let Ok((mut conn, _)) = listener.accept().await else { return };
            conn.write_all(b"v 1\n^ 10 1080 1920 255\n$ 25654\n").await.unwrap();
            let mut buf = [0u8; 256];
            loop {
                match conn.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => received.lock().await.extend_from_slice(&buf[..n]),
                }
            }
        });
    }

    let agent = boot(agent_config(&["--touch-agent-socket", &sock])).await.unwrap();
    let (mut ws, _) = tokio_tungstenite::connect_async(agent.ws("/ws/touch")).await.unwrap();

    let script = [
        serde_json::json!({"operation": "d", "index": 1, "xP": 1.0, "yP": 1.0, "pressure": 1.0}),
        serde_json::json!({"operation": "c"}),
        serde_json::json!({"operation": "m", "index": 3, "xP": 0.5, "yP": 0.5, "pressure": 1.0}),
        serde_json::json!({"operation": "u", "index": 4}),
    ];
    for msg in &script {
        ws.send(Message::Text(msg.to_string().into())).await.unwrap();
    }

    let expected = b"d 1 1080 1920 255\nc\nm 3 540 960 255\nu 4\n";
    let ok = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if received.lock().await.as_slice() == expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await;
    assert!(
        ok.is_ok(),
        "touch service saw {:?}",
        String::from_utf8_lossy(&received.lock().await)
    );
}

#[tokio::test]
async fn package_install_retries_through_uninstall() {
    // Fake installer that needs the uninstall-and-retry path.
    let tools = tempfile::tempdir().unwrap();
    let log = tools.path().join("calls.log");
    let marker = tools.path().join("uninstalled");
    let pm = write_script(
        tools.path(),
        "pm",
        &format!(
            r#"#!/bin/sh
echo "pm $@" >> {log}
case "$1" in
  install)
    if [ -f {marker} ]; then echo Success; exit 0; fi
    echo "Failure [INSTALL_FAILED_UPDATE_INCOMPATIBLE]"; exit 1;;
  uninstall) touch {marker}; exit 0;;
esac
"#,
            log = log.display(),
            marker = marker.display(),
        ),
    );
    let aapt = write_script(
        tools.path(),
        "aapt",
        "#!/bin/sh\necho \"package: name='com.example' versionCode='3'\"\n",
    );

    // Local server holding the "apk".
    let apk_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let apk_addr = apk_listener.local_addr().unwrap();
    let app = axum::Router::new()
        .route("/app.apk", axum::routing::get(|| async { b"apk bytes".to_vec() }));
    tokio::spawn(async move {
        let _ = axum::serve(apk_listener, app).await;
    });

    let downloads = tempfile::tempdir().unwrap();
    let agent = boot(agent_config(&[
        "--pm-bin",
        &pm,
        "--aapt-bin",
        &aapt,
        "--download-dir",
        &downloads.path().to_string_lossy(),
    ]))
    .await
    .unwrap();

    let client = reqwest::Client::new();
    let resp = client
        .post(agent.http("/api/v1/packages"))
        .json(&serde_json::json!({"url": format!("http://{apk_addr}/app.apk")}))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    let key = body["data"]["id"].as_str().unwrap().to_owned();

    // Poll to terminal state.
    let view = tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let resp =
                client.get(agent.http(&format!("/api/v1/packages/{key}"))).send().await.unwrap();
            let body: serde_json::Value = resp.json().await.unwrap();
            match body["status"].as_str() {
                Some("success") | Some("failure") => break body,
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(view["status"], "success", "job failed: {view}");
    assert_eq!(view["packageName"], "com.example");

    let calls = std::fs::read_to_string(&log).unwrap();
    let installs = calls.lines().filter(|l| l.contains("install -")).count();
    let uninstalls = calls.lines().filter(|l| l.contains("uninstall com.example")).count();
    assert_eq!((installs, uninstalls), (2, 1), "calls:\n{calls}");

    // The downloaded APK was unlinked.
    assert_eq!(std::fs::read_dir(downloads.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn uitest_lifecycle_over_http_is_idempotent() {
    let agent = boot(agent_config(&[])).await.unwrap();
    let client = reqwest::Client::new();

    let post = |path: &str| client.post(agent.http(path)).send();
    let body = post("/api/v1/uitest").await.unwrap().json::<serde_json::Value>().await.unwrap();
    assert_eq!(body["description"], "successfully started");

    let body = post("/api/v1/uitest").await.unwrap().json::<serde_json::Value>().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["description"], "already started");

    let del = client.delete(agent.http("/api/v1/uitest")).send().await.unwrap();
    let body = del.json::<serde_json::Value>().await.unwrap();
    assert_eq!(body["description"], "successfully stopped");

    let del = client.delete(agent.http("/api/v1/uitest")).send().await.unwrap();
    let body = del.json::<serde_json::Value>().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["description"], "already stopped");
}

#[tokio::test]
async fn stop_endpoint_shuts_the_daemon_down() {
    let agent = boot(agent_config(&[])).await.unwrap();
    let resp =
        reqwest::Client::new().post(agent.http("/stop")).send().await.unwrap();
    assert!(resp.status().is_success());

    tokio::time::timeout(Duration::from_secs(5), agent.serve_handle)
        .await
        .expect("server did not shut down")
        .unwrap();
}
