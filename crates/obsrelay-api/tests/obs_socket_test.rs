#![allow(clippy::unwrap_used)]
// Integration tests for `ObsSocket` against an in-process obs-websocket fake.

use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use obsrelay_api::protocol::auth_response;
use obsrelay_api::{Error, ObsSocket, TransportConfig};

const SALT: &str = "c2FsdA==";
const CHALLENGE: &str = "Y2hhbGxlbmdl";

// ── Fake instance ───────────────────────────────────────────────────

/// Start a single-connection obs-websocket fake and return its `ws://` URL.
///
/// Requests it understands:
/// - `GetVersion` → success with `obsVersion`
/// - `Emit` → pushes a `CurrentProgramSceneChanged` event, then succeeds
/// - `Hang` → never answers
/// - `Drop` → closes the connection without answering
/// - anything else → `requestStatus.result = false`, code 204
async fn fake_instance(password: Option<&'static str>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let mut hello = json!({ "obsWebSocketVersion": "5.4.2", "rpcVersion": 1 });
        if password.is_some() {
            hello["authentication"] = json!({ "challenge": CHALLENGE, "salt": SALT });
        }
        send(&mut ws, 0, hello).await;

        let identify = recv(&mut ws).await.unwrap();
        assert_eq!(identify["op"], 1);
        if let Some(password) = password {
            let expected = auth_response(password, SALT, CHALLENGE);
            if identify["d"]["authentication"] != Value::String(expected) {
                let _ = ws
                    .send(Message::Close(Some(CloseFrame {
                        code: CloseCode::from(4009),
                        reason: "Authentication failed.".into(),
                    })))
                    .await;
                return;
            }
        }
        send(&mut ws, 2, json!({ "negotiatedRpcVersion": 1 })).await;

        while let Some(frame) = recv(&mut ws).await {
            if frame["op"] != 6 {
                continue;
            }
            let d = &frame["d"];
            let request_type = d["requestType"].as_str().unwrap_or_default().to_owned();
            let request_id = d["requestId"].clone();

            let (status, data) = match request_type.as_str() {
                "GetVersion" => (json!({ "result": true, "code": 100 }), json!({ "obsVersion": "30.2.0" })),
                "Emit" => {
                    send(
                        &mut ws,
                        5,
                        json!({
                            "eventType": "CurrentProgramSceneChanged",
                            "eventIntent": 4,
                            "eventData": { "sceneName": "BRB" }
                        }),
                    )
                    .await;
                    (json!({ "result": true, "code": 100 }), Value::Null)
                }
                "Hang" => continue,
                "Drop" => return,
                _ => (
                    json!({ "result": false, "code": 204, "comment": "Unknown request type" }),
                    Value::Null,
                ),
            };

            send(
                &mut ws,
                7,
                json!({
                    "requestType": request_type,
                    "requestId": request_id,
                    "requestStatus": status,
                    "responseData": data
                }),
            )
            .await;
        }
    });

    format!("ws://{addr}")
}

async fn send<S>(ws: &mut S, op: u8, d: Value)
where
    S: Sink<Message> + Unpin,
{
    let text = json!({ "op": op, "d": d }).to_string();
    let _ = ws.send(Message::text(text)).await;
}

async fn recv<S>(ws: &mut S) -> Option<Value>
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        match ws.next().await? {
            Ok(Message::Text(text)) => return serde_json::from_str(text.as_str()).ok(),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

fn transport(timeout: Duration) -> TransportConfig {
    TransportConfig {
        timeout,
        ..TransportConfig::default()
    }
}

// ── Handshake ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_without_auth() {
    let url = fake_instance(None).await;

    let socket = ObsSocket::connect(&url, None, &transport(Duration::from_secs(5)))
        .await
        .unwrap();

    assert!(socket.is_open());
    assert_eq!(socket.rpc_version(), 1);
}

#[tokio::test]
async fn test_connect_with_correct_password() {
    let url = fake_instance(Some("hunter2")).await;
    let password: secrecy::SecretString = "hunter2".to_string().into();

    let socket = ObsSocket::connect(&url, Some(&password), &transport(Duration::from_secs(5)))
        .await
        .unwrap();

    let version = socket.call("GetVersion", Value::Null).await.unwrap();
    assert_eq!(version["obsVersion"], "30.2.0");
}

#[tokio::test]
async fn test_wrong_password_surfaces_close_4009() {
    let url = fake_instance(Some("hunter2")).await;
    let password: secrecy::SecretString = "letmein".to_string().into();

    let result =
        ObsSocket::connect(&url, Some(&password), &transport(Duration::from_secs(5))).await;

    match result {
        Err(err) => assert!(err.is_bad_password(), "expected 4009 close, got: {err:?}"),
        Ok(_) => panic!("expected authentication failure"),
    }
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = ObsSocket::connect(
        &format!("ws://{addr}"),
        None,
        &transport(Duration::from_secs(5)),
    )
    .await;

    assert!(
        matches!(result, Err(Error::WebSocketConnect(_))),
        "expected WebSocketConnect"
    );
}

// ── Requests & events ───────────────────────────────────────────────

#[tokio::test]
async fn test_rejected_request() {
    let url = fake_instance(None).await;
    let socket = ObsSocket::connect(&url, None, &transport(Duration::from_secs(5)))
        .await
        .unwrap();

    let result = socket.call("RestartMedia", json!({ "inputName": "cam1" })).await;

    match result {
        Err(Error::RequestFailed { code, request_type, .. }) => {
            assert_eq!(code, 204);
            assert_eq!(request_type, "RestartMedia");
        }
        other => panic!("expected RequestFailed, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_event_is_broadcast() {
    let url = fake_instance(None).await;
    let socket = ObsSocket::connect(&url, None, &transport(Duration::from_secs(5)))
        .await
        .unwrap();
    let mut events = socket.subscribe();

    socket.call("Emit", Value::Null).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.event_type, "CurrentProgramSceneChanged");
    assert_eq!(event.event_data["sceneName"], "BRB");
}

#[tokio::test]
async fn test_request_timeout() {
    let url = fake_instance(None).await;
    let socket = ObsSocket::connect(&url, None, &transport(Duration::from_millis(200)))
        .await
        .unwrap();

    let result = socket.call("Hang", Value::Null).await;
    assert!(matches!(result, Err(Error::Timeout { .. })), "got: {result:?}");
}

#[tokio::test]
async fn test_remote_drop_fails_pending_and_fires_closed() {
    let url = fake_instance(None).await;
    let socket = ObsSocket::connect(&url, None, &transport(Duration::from_secs(5)))
        .await
        .unwrap();
    let closed = socket.closed();

    let result = socket.call("Drop", Value::Null).await;
    assert!(matches!(result, Err(Error::NotConnected)), "got: {result:?}");

    tokio::time::timeout(Duration::from_secs(5), closed.cancelled())
        .await
        .unwrap();
    assert!(!socket.is_open());

    let after = socket.call("GetVersion", Value::Null).await;
    assert!(matches!(after, Err(Error::NotConnected)));
}
