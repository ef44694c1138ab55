//! Gateway client against a local WebSocket server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

use steward_core::config::StewardConfig;
use steward_core::error::StewardError;
use steward_gateway::{ActionRequest, Gateway, GatewayClient, GatewayEvent};

fn config_for(addr: std::net::SocketAddr) -> StewardConfig {
    let mut config = StewardConfig::default();
    config.bot.websocket = format!("ws://{addr}");
    config.bot.access_token = "secret".into();
    config.bot.reconnect_secs = 1;
    config
}

async fn wait_connected(client: &GatewayClient, expected: bool) {
    for _ in 0..100 {
        if client.is_connected() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("client connected state never became {expected}");
}

#[tokio::test]
async fn test_call_send_and_events() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let auth = Arc::new(Mutex::new(None::<String>));
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<Value>();

    let server_auth = Arc::clone(&auth);
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = |req: &Request, resp: Response| {
            *server_auth.lock().unwrap() = req
                .headers()
                .get("Authorization")
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            Ok(resp)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap();

        ws.send(Message::Text(
            json!({
                "post_type": "request", "request_type": "group", "sub_type": "add",
                "group_id": 100, "user_id": 42, "flag": "flag-1", "comment": "answer: 2"
            })
            .to_string(),
        ))
        .await
        .unwrap();

        while let Some(Ok(Message::Text(text))) = ws.next().await {
            let frame: Value = serde_json::from_str(&text).unwrap();
            if frame["action"] == "get_stranger_info" {
                let reply = json!({
                    "status": "ok", "retcode": 0,
                    "data": { "user_id": frame["params"]["user_id"], "level": 33 },
                    "echo": frame["echo"],
                });
                ws.send(Message::Text(reply.to_string())).await.unwrap();
            }
            seen_tx.send(frame).unwrap();
        }
    });

    let client = Arc::new(GatewayClient::new(&config_for(addr)));
    let mut events = client.subscribe();
    let _handle = client.spawn();
    wait_connected(&client, true).await;

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        GatewayEvent::JoinRequest(req) => {
            assert_eq!(req.group_id, 100);
            assert_eq!(req.flag, "flag-1");
        }
        other => panic!("unexpected event {other:?}"),
    }

    let response = client
        .call(ActionRequest::get_stranger_info(42), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(response.level(), Some(33));
    assert_eq!(client.pending_calls(), 0);

    let outcome = client
        .send(ActionRequest::send_group_msg(100, "hello [@42]"))
        .await
        .unwrap();
    assert!(outcome.is_sent());

    let first = seen_rx.recv().await.unwrap();
    assert_eq!(first["action"], "get_stranger_info");
    assert_eq!(first["params"]["no_cache"], true);
    let second = seen_rx.recv().await.unwrap();
    assert_eq!(second["action"], "send_group_msg");
    assert_eq!(second["params"]["message"], "hello [CQ:at,qq=42]");

    assert_eq!(auth.lock().unwrap().as_deref(), Some("Bearer secret"));
}

#[tokio::test]
async fn test_call_times_out_and_cleans_up() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        // Read and never answer.
        while let Some(Ok(_)) = ws.next().await {}
    });

    let client = Arc::new(GatewayClient::new(&config_for(addr)));
    let _handle = client.spawn();
    wait_connected(&client, true).await;

    let err = client
        .call(ActionRequest::get_stranger_info(1), Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(matches!(err, StewardError::Timeout { .. }));
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn test_disconnect_fails_pending_and_reconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        // First connection: drop as soon as a command arrives.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let _ = ws.next().await;
        drop(ws);

        // Second connection: stay open.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let client = Arc::new(GatewayClient::new(&config_for(addr)));
    let _handle = client.spawn();
    wait_connected(&client, true).await;

    let err = client
        .call(ActionRequest::get_stranger_info(1), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, StewardError::ConnectionClosed(_)));
    assert_eq!(client.pending_calls(), 0);

    wait_connected(&client, false).await;
    let err = client
        .send(ActionRequest::send_private_msg(1, "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, StewardError::NotConnected));

    wait_connected(&client, true).await;
}
