use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};

use homedash_app::ports::{CloseReason, Transport, TransportError, TransportEvent};
use homedash_domain::connection::HubConfig;

use crate::config::WsConfig;
use crate::error::WsError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code reported when the peer closed without a status.
const NO_STATUS: u16 = 1005;

/// [`Transport`] over a tungstenite WebSocket.
#[derive(Default)]
pub struct WebSocketTransport {
    config: WsConfig,
    stream: Option<WsStream>,
}

impl WebSocketTransport {
    #[must_use]
    pub fn new(config: WsConfig) -> Self {
        Self {
            config,
            stream: None,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("config", &self.config)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Transport for WebSocketTransport {
    async fn open(&mut self, config: &HubConfig) -> Result<(), TransportError> {
        self.stream = None;
        let url = config.websocket_url();
        tracing::debug!(%url, "opening websocket");

        let (stream, response) =
            tokio::time::timeout(self.config.connect_timeout(), connect_async(url.as_str()))
                .await
                .map_err(|_| WsError::ConnectTimeout)?
                .map_err(WsError::Connect)?;

        tracing::debug!(status = %response.status(), "websocket upgraded");
        self.stream = Some(stream);
        Ok(())
    }

    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(WsError::NotOpen)?;
        stream
            .send(Message::Text(frame))
            .await
            .map_err(WsError::Send)?;
        Ok(())
    }

    async fn recv(&mut self) -> TransportEvent {
        let Some(stream) = self.stream.as_mut() else {
            return std::future::pending().await;
        };
        let event = loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return TransportEvent::Message(text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return TransportEvent::Message(text),
                    Err(_) => tracing::warn!("dropping non utf-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    break TransportEvent::Closed(frame.map_or(
                        CloseReason {
                            code: NO_STATUS,
                            reason: String::new(),
                        },
                        |frame| CloseReason {
                            code: u16::from(frame.code),
                            reason: frame.reason.into_owned(),
                        },
                    ));
                }
                // tungstenite answers pings on its own
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(err)) => {
                    tracing::debug!(error = %err, "websocket read failed");
                    break TransportEvent::Closed(CloseReason::abnormal(err.to_string()));
                }
                None => break TransportEvent::Closed(CloseReason::abnormal("stream ended")),
            }
        };
        self.stream = None;
        event
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };
        match stream.close(Some(frame)).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(err) => Err(WsError::Send(err).into()),
        }
    }
}
