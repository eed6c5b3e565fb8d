//! Integration tests against a local WebSocket server playing the hub.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};

use homedash_adapter_ws_tungstenite::{WebSocketTransport, WsConfig};
use homedash_app::ports::{CloseReason, Transport, TransportError, TransportEvent};
use homedash_app::{Connector, ReconnectPolicy, SyncBus};
use homedash_domain::connection::HubConfig;
use homedash_domain::event::SyncEvent;
use homedash_domain::filter::EntityFilter;
use homedash_domain::id::EntityId;

type Socket = WebSocketStream<TcpStream>;

/// Accepts WebSocket upgrades and hands each socket, with its request path, to the test.
struct FakeHub {
    config: HubConfig,
    sockets: mpsc::UnboundedReceiver<(String, Socket)>,
}

impl FakeHub {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut path = String::new();
                    let callback = |req: &Request, response: Response| {
                        path = req.uri().path().to_string();
                        Ok(response)
                    };
                    if let Ok(socket) = accept_hdr_async(stream, callback).await {
                        let _ = tx.send((path, socket));
                    }
                });
            }
        });
        Self {
            config: HubConfig::new(&format!("http://{addr}"), "T").unwrap(),
            sockets: rx,
        }
    }

    async fn accept(&mut self) -> (String, Socket) {
        self.sockets.recv().await.unwrap()
    }
}

fn transport() -> WebSocketTransport {
    WebSocketTransport::new(WsConfig::default())
}

async fn send_json(socket: &mut Socket, value: Value) {
    socket.send(Message::Text(value.to_string())).await.unwrap();
}

async fn next_json(socket: &mut Socket) -> Value {
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
            Some(Ok(_)) => {}
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn should_connect_to_realtime_endpoint() {
    let mut hub = FakeHub::start().await;
    let mut transport = transport();

    transport.open(&hub.config).await.unwrap();

    let (path, _socket) = hub.accept().await;
    assert_eq!(path, "/api/websocket");
    assert!(transport.is_open());
}

#[tokio::test]
async fn should_exchange_text_frames() {
    let mut hub = FakeHub::start().await;
    let mut transport = transport();
    transport.open(&hub.config).await.unwrap();
    let (_, mut socket) = hub.accept().await;

    send_json(&mut socket, json!({"type": "auth_required"})).await;
    let event = transport.recv().await;
    transport
        .send(json!({"type": "auth", "access_token": "T"}).to_string())
        .await
        .unwrap();

    assert_eq!(
        event,
        TransportEvent::Message(json!({"type": "auth_required"}).to_string())
    );
    assert_eq!(
        next_json(&mut socket).await,
        json!({"type": "auth", "access_token": "T"})
    );
}

#[tokio::test]
async fn should_surface_peer_close_code() {
    let mut hub = FakeHub::start().await;
    let mut transport = transport();
    transport.open(&hub.config).await.unwrap();
    let (_, mut socket) = hub.accept().await;

    socket
        .close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "restarting".into(),
        }))
        .await
        .unwrap();

    let event = transport.recv().await;
    assert_eq!(
        event,
        TransportEvent::Closed(CloseReason {
            code: 1001,
            reason: "restarting".to_string()
        })
    );
    assert!(!transport.is_open());
}

#[tokio::test]
async fn should_report_clean_close_as_normal() {
    let mut hub = FakeHub::start().await;
    let mut transport = transport();
    transport.open(&hub.config).await.unwrap();
    let (_, mut socket) = hub.accept().await;

    socket
        .close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        }))
        .await
        .unwrap();

    let TransportEvent::Closed(reason) = transport.recv().await else {
        panic!("expected close");
    };
    assert!(reason.is_normal());
}

#[tokio::test]
async fn should_send_normal_close_frame() {
    let mut hub = FakeHub::start().await;
    let mut transport = transport();
    transport.open(&hub.config).await.unwrap();
    let (_, mut socket) = hub.accept().await;

    transport.close().await.unwrap();

    let Some(Ok(Message::Close(Some(frame)))) = socket.next().await else {
        panic!("expected a close frame");
    };
    assert_eq!(frame.code, CloseCode::Normal);
    assert!(!transport.is_open());
    // Closing twice is harmless.
    transport.close().await.unwrap();
}

#[tokio::test]
async fn should_fail_to_open_when_nothing_listens() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let config = HubConfig::new(&format!("http://{addr}"), "T").unwrap();

    let err = transport().open(&config).await.unwrap_err();

    assert!(matches!(err, TransportError::Open(_)));
}

#[tokio::test]
async fn should_reject_send_before_open() {
    let err = transport().send("{}".to_string()).await.unwrap_err();
    assert!(matches!(err, TransportError::NotOpen));
}

#[tokio::test]
async fn should_sync_entities_through_connector() {
    let mut hub = FakeHub::start().await;
    let bus = Arc::new(SyncBus::default());
    let (handle, _task) = Connector::spawn(
        hub.config.clone(),
        transport(),
        ReconnectPolicy::default(),
        EntityFilter::Disabled,
        bus,
    );
    let mut events = handle.subscribe();
    let (_, mut socket) = hub.accept().await;

    send_json(&mut socket, json!({"type": "auth_required", "ha_version": "2024.1.0"})).await;
    assert_eq!(
        next_json(&mut socket).await,
        json!({"type": "auth", "access_token": "T"})
    );
    send_json(&mut socket, json!({"type": "auth_ok", "ha_version": "2024.1.0"})).await;
    assert_eq!(
        next_json(&mut socket).await,
        json!({"type": "get_states", "id": 1})
    );
    assert_eq!(
        next_json(&mut socket).await,
        json!({"type": "subscribe_events", "id": 2, "event_type": "state_changed"})
    );
    send_json(
        &mut socket,
        json!({"type": "result", "id": 2, "success": true, "result": null}),
    )
    .await;
    send_json(
        &mut socket,
        json!({
            "type": "result",
            "id": 1,
            "success": true,
            "result": [
                {
                    "entity_id": "light.kitchen",
                    "state": "on",
                    "attributes": {"friendly_name": "Kitchen"}
                },
                {"entity_id": "lock.front_door", "state": "locked", "attributes": {}}
            ]
        }),
    )
    .await;

    let mut status = handle.watch_status();
    status
        .wait_for(|s| s.is_connected() && !s.loading)
        .await
        .unwrap();
    let kitchen = EntityId::new("light.kitchen").unwrap();
    assert_eq!(handle.entities()[&kitchen].friendly_name(), "Kitchen");

    send_json(
        &mut socket,
        json!({
            "type": "event",
            "id": 2,
            "event": {
                "event_type": "state_changed",
                "data": {
                    "entity_id": "light.kitchen",
                    "new_state": {"entity_id": "light.kitchen", "state": "off", "attributes": {}}
                }
            }
        }),
    )
    .await;
    loop {
        if let SyncEvent::EntityUpdated(id) = events.recv().await.unwrap() {
            assert_eq!(id, kitchen);
            break;
        }
    }
    assert_eq!(handle.entities()[&kitchen].state.as_str(), "off");

    handle.teardown().await;
    let Some(Ok(Message::Close(Some(frame)))) = socket.next().await else {
        panic!("expected a close frame");
    };
    assert_eq!(frame.code, CloseCode::Normal);
}
