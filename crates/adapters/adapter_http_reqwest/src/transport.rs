use std::collections::{HashMap, VecDeque};
use std::error::Error as _;

use serde_json::{Map, Value, json};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use homedash_app::ports::{CloseReason, Transport, TransportError, TransportEvent};
use homedash_app::protocol::message::{ErrorPayload, EventPayload, STATE_CHANGED};
use homedash_app::protocol::{InboundMessage, OutboundMessage};
use homedash_domain::connection::HubConfig;

use crate::api::{Reply, RestClient};
use crate::config::PollingConfig;
use crate::error::HttpError;

/// [`Transport`] that emulates the real-time channel over the REST API.
///
/// Outbound frames are executed as HTTP requests and their outcome is queued
/// as the inbound frame the real-time endpoint would have sent. After
/// `subscribe_events`, `/api/states` is polled and every entity whose JSON
/// differs from the previous poll is reported as a `state_changed` event.
#[derive(Debug)]
pub struct PollingTransport {
    rest: RestClient,
    config: PollingConfig,
    session: Option<Session>,
}

#[derive(Debug)]
struct Session {
    hub: HubConfig,
    /// Set once `auth` succeeded.
    token: Option<String>,
    inbound: VecDeque<TransportEvent>,
    /// Last known JSON of each entity, keyed by entity id.
    known: HashMap<String, Value>,
    subscription: Option<Subscription>,
}

#[derive(Debug)]
struct Subscription {
    id: u64,
    ticker: Interval,
}

impl PollingTransport {
    /// Build a transport with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Client`] when the HTTP client cannot be built.
    pub fn new(config: PollingConfig) -> Result<Self, HttpError> {
        let rest = RestClient::new(config.request_timeout())?;
        Ok(Self::with_client(rest, config))
    }

    /// Build a transport sharing an existing client's connection pool.
    #[must_use]
    pub fn with_client(rest: RestClient, config: PollingConfig) -> Self {
        Self {
            rest,
            config,
            session: None,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }
}

impl Session {
    fn new(hub: HubConfig) -> Self {
        Self {
            hub,
            token: None,
            inbound: VecDeque::new(),
            known: HashMap::new(),
            subscription: None,
        }
    }

    fn push(&mut self, message: &InboundMessage) {
        match serde_json::to_string(message) {
            Ok(frame) => self.inbound.push_back(TransportEvent::Message(frame)),
            Err(err) => {
                tracing::warn!(kind = message.kind(), error = %err, "dropping unencodable frame");
            }
        }
    }

    fn push_result(&mut self, id: u64, outcome: Result<Option<Value>, ErrorPayload>) {
        let message = match outcome {
            Ok(result) => InboundMessage::Result {
                id,
                success: true,
                result,
                error: None,
            },
            Err(error) => InboundMessage::Result {
                id,
                success: false,
                result: None,
                error: Some(error),
            },
        };
        self.push(&message);
    }

    fn push_closed(&mut self, reason: impl Into<String>) {
        self.inbound
            .push_back(TransportEvent::Closed(CloseReason::abnormal(reason)));
    }

    async fn authenticate(&mut self, rest: &RestClient, token: String) {
        match rest.get(&self.hub, &token, "/api/").await {
            Ok(reply) if reply.is_success() => {
                self.token = Some(token);
                self.push(&InboundMessage::AuthOk { ha_version: None });
            }
            Ok(reply) if reply.is_unauthorized() => {
                self.push(&InboundMessage::AuthInvalid {
                    message: Some("Invalid access token".to_string()),
                });
            }
            Ok(reply) => self.push_closed(format!("unexpected status {}", reply.status)),
            Err(err) => self.push_closed(error_chain(&err)),
        }
    }

    async fn fetch_states(&mut self, rest: &RestClient, token: &str, id: u64) {
        match rest.get(&self.hub, token, "/api/states").await {
            Ok(Reply {
                status,
                body: Value::Array(items),
            }) if status.is_success() => {
                self.known = index(&items);
                self.push_result(id, Ok(Some(Value::Array(items))));
            }
            Ok(reply) if reply.is_success() => {
                self.push_result(
                    id,
                    Err(ErrorPayload {
                        code: "invalid_format".to_string(),
                        message: "states response is not a list".to_string(),
                    }),
                );
            }
            Ok(reply) if reply.is_unauthorized() => self.push_closed("access token rejected"),
            Ok(reply) => self.push_result(id, Err(status_error(&reply))),
            Err(err) => self.push_closed(error_chain(&err)),
        }
    }

    async fn call_service(
        &mut self,
        rest: &RestClient,
        token: &str,
        id: u64,
        (domain, service): (&str, &str),
        service_data: Map<String, Value>,
    ) {
        let path = format!("/api/services/{domain}/{service}");
        match rest
            .post(&self.hub, token, &path, &Value::Object(service_data))
            .await
        {
            Ok(reply) if reply.is_success() => self.push_result(id, Ok(Some(reply.body))),
            Ok(reply) if reply.is_unauthorized() => self.push_closed("access token rejected"),
            Ok(reply) => self.push_result(id, Err(status_error(&reply))),
            Err(err) => self.push_closed(error_chain(&err)),
        }
    }

    async fn poll(&mut self, rest: &RestClient) {
        let (Some(token), Some(subscription)) = (self.token.clone(), self.subscription.as_ref())
        else {
            return;
        };
        let subscription_id = subscription.id;

        let items = match rest.get(&self.hub, &token, "/api/states").await {
            Ok(Reply {
                status,
                body: Value::Array(items),
            }) if status.is_success() => items,
            Ok(reply) if reply.is_unauthorized() => {
                self.push_closed("access token rejected while polling");
                return;
            }
            Ok(reply) => {
                tracing::warn!(status = %reply.status, "state poll failed, keeping last snapshot");
                return;
            }
            Err(err) => {
                self.push_closed(error_chain(&err));
                return;
            }
        };

        let current = index(&items);
        let mut changes = Vec::new();
        for (entity_id, new_state) in &current {
            let old_state = self.known.get(entity_id);
            if old_state != Some(new_state) {
                changes.push((entity_id.clone(), Some(new_state.clone()), old_state.cloned()));
            }
        }
        for (entity_id, old_state) in &self.known {
            if !current.contains_key(entity_id) {
                changes.push((entity_id.clone(), None, Some(old_state.clone())));
            }
        }
        tracing::debug!(changed = changes.len(), "state poll complete");

        self.known = current;
        for (entity_id, new_state, old_state) in changes {
            self.push(&InboundMessage::Event {
                id: Some(subscription_id),
                event: EventPayload {
                    event_type: STATE_CHANGED.to_string(),
                    data: json!({
                        "entity_id": entity_id,
                        "new_state": new_state,
                        "old_state": old_state,
                    }),
                },
            });
        }
    }
}

impl Transport for PollingTransport {
    async fn open(&mut self, config: &HubConfig) -> Result<(), TransportError> {
        tracing::debug!(url = %config.api_url("/api/"), "opening polling session");
        let mut session = Session::new(config.clone());
        session.push(&InboundMessage::AuthRequired { ha_version: None });
        self.session = Some(session);
        Ok(())
    }

    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        let Self {
            rest,
            config,
            session,
        } = self;
        let session = session.as_mut().ok_or(HttpError::NotOpen)?;
        let message: OutboundMessage = serde_json::from_str(&frame).map_err(HttpError::Decode)?;

        if let OutboundMessage::Auth { access_token } = &message {
            session
                .authenticate(rest, access_token.expose().to_string())
                .await;
            return Ok(());
        }

        let Some(token) = session.token.clone() else {
            if let Some(id) = message.id() {
                session.push_result(
                    id,
                    Err(ErrorPayload {
                        code: "unauthorized".to_string(),
                        message: "not authenticated".to_string(),
                    }),
                );
            }
            return Ok(());
        };

        match message {
            OutboundMessage::Auth { .. } => {}
            OutboundMessage::GetStates { id } => session.fetch_states(rest, &token, id).await,
            OutboundMessage::SubscribeEvents { id, event_type } => {
                if event_type != STATE_CHANGED {
                    tracing::warn!(%event_type, "only state changes are polled");
                }
                let period = config.poll_interval();
                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                session.subscription = Some(Subscription { id, ticker });
                session.push_result(id, Ok(None));
            }
            OutboundMessage::CallService {
                id,
                domain,
                service,
                service_data,
            } => {
                session
                    .call_service(rest, &token, id, (&domain, &service), service_data)
                    .await;
            }
        }
        Ok(())
    }

    async fn recv(&mut self) -> TransportEvent {
        let Self { rest, session, .. } = self;
        loop {
            let Some(current) = session.as_mut() else {
                return std::future::pending().await;
            };
            if let Some(event) = current.inbound.pop_front() {
                if matches!(event, TransportEvent::Closed(_)) {
                    *session = None;
                }
                return event;
            }
            let Some(subscription) = current.subscription.as_mut() else {
                return std::future::pending().await;
            };
            // A poll interrupted by cancellation is skipped until the next tick.
            subscription.ticker.tick().await;
            current.poll(rest).await;
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.session.take().is_some() {
            tracing::debug!("polling session closed");
        }
        Ok(())
    }
}

fn index(items: &[Value]) -> HashMap<String, Value> {
    items
        .iter()
        .filter_map(|item| {
            let entity_id = item.get("entity_id")?.as_str()?;
            Some((entity_id.to_string(), item.clone()))
        })
        .collect()
}

fn status_error(reply: &Reply) -> ErrorPayload {
    let message = reply
        .body
        .get("message")
        .and_then(Value::as_str)
        .map_or_else(|| reply.status.to_string(), str::to_string);
    ErrorPayload {
        code: format!("http_{}", reply.status.as_u16()),
        message,
    }
}

fn error_chain(err: &HttpError) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
