//! In-memory transport for exercising the connector without sockets.
//!
//! Each successful `open` hands the test a [`FakeConnection`] through which it
//! plays the hub: push inbound frames, read what the client wrote.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Value, json};
use tokio::sync::mpsc;

use homedash_domain::connection::HubConfig;

use crate::ports::{CloseReason, Transport, TransportError, TransportEvent};

pub(crate) fn hub_config() -> HubConfig {
    HubConfig::new("http://hub.local:8123", "T").unwrap()
}

/// The test's side of one open channel.
pub(crate) struct FakeConnection {
    inbound: mpsc::UnboundedSender<TransportEvent>,
    outbound: mpsc::UnboundedReceiver<String>,
}

impl FakeConnection {
    pub(crate) fn push(&self, value: &Value) {
        let _ = self
            .inbound
            .send(TransportEvent::Message(value.to_string()));
    }

    pub(crate) fn close(&self, reason: CloseReason) {
        let _ = self.inbound.send(TransportEvent::Closed(reason));
    }

    /// Next frame written by the client, parsed; `None` once the client closed.
    pub(crate) async fn next_sent(&mut self) -> Option<Value> {
        let frame = self.outbound.recv().await?;
        Some(serde_json::from_str(&frame).unwrap())
    }

    /// Walk through auth and answer the snapshot with `entities`.
    pub(crate) async fn handshake(&mut self, entities: &[Value]) {
        self.push(&json!({"type": "auth_required"}));
        assert_eq!(self.next_sent().await.unwrap()["type"], "auth");
        self.push(&json!({"type": "auth_ok"}));
        let get_states = self.next_sent().await.unwrap();
        assert_eq!(get_states["type"], "get_states");
        let subscribe = self.next_sent().await.unwrap();
        assert_eq!(subscribe["type"], "subscribe_events");
        self.push(&json!({
            "type": "result",
            "id": subscribe["id"],
            "success": true,
            "result": null
        }));
        self.push(&json!({
            "type": "result",
            "id": get_states["id"],
            "success": true,
            "result": entities,
        }));
    }
}

/// Controls shared by every transport the factory hands out.
pub(crate) struct FakeHub {
    connections: mpsc::UnboundedReceiver<FakeConnection>,
    failures: Arc<AtomicUsize>,
    opens: Arc<AtomicUsize>,
}

impl FakeHub {
    /// A hub plus a factory producing transports wired to it.
    pub(crate) fn new() -> (Self, impl Fn() -> FakeTransport + Send + Sync + 'static) {
        let (tx, rx) = mpsc::unbounded_channel();
        let failures = Arc::new(AtomicUsize::new(0));
        let opens = Arc::new(AtomicUsize::new(0));
        let hub = Self {
            connections: rx,
            failures: Arc::clone(&failures),
            opens: Arc::clone(&opens),
        };
        let factory = move || FakeTransport {
            connections: tx.clone(),
            failures: Arc::clone(&failures),
            opens: Arc::clone(&opens),
            current: None,
        };
        (hub, factory)
    }

    /// Make the next `n` opens fail.
    pub(crate) fn fail_next_opens(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Opens attempted so far, failed ones included.
    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) async fn accept(&mut self) -> FakeConnection {
        self.connections.recv().await.unwrap()
    }

    pub(crate) fn try_accept(&mut self) -> Option<FakeConnection> {
        self.connections.try_recv().ok()
    }
}

pub(crate) struct FakeTransport {
    connections: mpsc::UnboundedSender<FakeConnection>,
    failures: Arc<AtomicUsize>,
    opens: Arc<AtomicUsize>,
    current: Option<(
        mpsc::UnboundedReceiver<TransportEvent>,
        mpsc::UnboundedSender<String>,
    )>,
}

impl Transport for FakeTransport {
    async fn open(&mut self, _config: &HubConfig) -> Result<(), TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
            return Err(TransportError::Open(Box::new(refused)));
        }
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.current = Some((inbound_rx, outbound_tx));
        let _ = self.connections.send(FakeConnection {
            inbound: inbound_tx,
            outbound: outbound_rx,
        });
        Ok(())
    }

    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        let Some((_, outbound)) = &self.current else {
            return Err(TransportError::NotOpen);
        };
        outbound
            .send(frame)
            .map_err(|err| TransportError::Send(Box::new(err)))
    }

    async fn recv(&mut self) -> TransportEvent {
        match &mut self.current {
            Some((inbound, _)) => inbound
                .recv()
                .await
                .unwrap_or_else(|| TransportEvent::Closed(CloseReason::abnormal("hub went away"))),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.current = None;
        Ok(())
    }
}
