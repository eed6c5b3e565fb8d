//! Protocol state machine.
//!
//! ```text
//! Idle -> Connecting -> AwaitingAuth -> Authenticated -> Subscribing -> Ready
//!                            |                                          |
//!                            +--> AuthFailed          Closed <----------+
//! ```
//!
//! [`ProtocolMachine::handle`] consumes one [`Input`] and returns the
//! [`Effect`]s the connector must carry out. Nothing in here performs IO, so
//! every transition is testable without a socket or a runtime.

use std::collections::HashMap;

use serde_json::Value;

use homedash_domain::connection::ConnectionStatus;
use homedash_domain::entity::Entity;
use homedash_domain::error::{CommandFailure, SyncError};
use homedash_domain::service::ServiceCall;

use super::message::{
    AccessToken, ErrorPayload, EventPayload, InboundMessage, OutboundMessage, STATE_CHANGED,
    StateChangedData,
};
use crate::ports::CloseReason;

/// Where one connection stands in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    AwaitingAuth,
    Authenticated,
    Subscribing,
    Ready,
    Closed,
    AuthFailed,
}

impl Phase {
    /// Status shown to the UI for this phase.
    #[must_use]
    pub fn status(self) -> ConnectionStatus {
        match self {
            Self::Idle | Self::Closed => ConnectionStatus::Disconnected,
            Self::Connecting => ConnectionStatus::Connecting,
            Self::AwaitingAuth => ConnectionStatus::Authenticating,
            Self::Authenticated | Self::Subscribing | Self::Ready => ConnectionStatus::Connected,
            Self::AuthFailed => ConnectionStatus::Failed,
        }
    }

    fn is_open(self) -> bool {
        matches!(
            self,
            Self::AwaitingAuth | Self::Authenticated | Self::Subscribing | Self::Ready
        )
    }

    fn is_authenticated(self) -> bool {
        matches!(self, Self::Subscribing | Self::Ready)
    }

    fn is_finished(self) -> bool {
        matches!(self, Self::Closed | Self::AuthFailed)
    }
}

/// Something that happened to the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// The connector is about to open the channel.
    Open,
    /// The channel is established.
    ChannelOpened,
    /// One inbound text frame.
    Frame(String),
    /// The channel closed.
    ChannelClosed(CloseReason),
    /// A request went unanswered: a snapshot armed through
    /// [`Effect::AwaitResponse`], or a command from
    /// [`ProtocolMachine::call_service`].
    RequestTimedOut(u64),
    /// Re-request the full snapshot.
    Refresh,
    /// Intentional shutdown by the owner.
    Teardown,
}

/// Work the connector must carry out, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Write this message to the channel.
    Send(OutboundMessage),
    /// Arm the response timer for request `id`.
    AwaitResponse(u64),
    /// The hub accepted the token.
    Authenticated,
    /// Replace the cache with this snapshot.
    ApplySnapshot(Vec<Entity>),
    /// Upsert one entity.
    ApplyEvent(Entity),
    /// First snapshot of the connection was received.
    Ready,
    /// Surface an error on the status.
    Error(SyncError),
    /// A sent command failed: the hub rejected it or never answered.
    CommandRejected {
        call: ServiceCall,
        failure: CommandFailure,
    },
    /// The connection is over. `unexpected` asks the supervisor to retry.
    Close { unexpected: bool },
}

/// Handshake and request bookkeeping for a single connection.
///
/// Request ids are allocated from 1 and increase monotonically for the life
/// of the machine. The connector builds a fresh machine per connection.
#[derive(Debug)]
pub struct ProtocolMachine {
    phase: Phase,
    token: AccessToken,
    next_id: u64,
    snapshot_request: Option<u64>,
    subscription: Option<u64>,
    pending_commands: HashMap<u64, ServiceCall>,
}

impl ProtocolMachine {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            phase: Phase::Idle,
            token: AccessToken::new(token),
            next_id: 1,
            snapshot_request: None,
            subscription: None,
            pending_commands: HashMap::new(),
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.phase.status()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    /// `true` while a snapshot request is outstanding.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.snapshot_request.is_some()
    }

    /// Number of commands sent and not yet answered.
    #[must_use]
    pub fn pending_commands(&self) -> usize {
        self.pending_commands.len()
    }

    /// `true` while request `id` still expects a result.
    #[must_use]
    pub fn is_awaiting(&self, id: u64) -> bool {
        self.snapshot_request == Some(id) || self.pending_commands.contains_key(&id)
    }

    /// Advance the machine by one input.
    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        match input {
            Input::Open => self.on_open(),
            Input::ChannelOpened => self.on_channel_opened(),
            Input::Frame(frame) => self.on_frame(&frame),
            Input::ChannelClosed(reason) => self.on_closed(&reason),
            Input::RequestTimedOut(id) => self.on_timeout(id),
            Input::Refresh => self.on_refresh(),
            Input::Teardown => self.on_teardown(),
        }
    }

    /// Turn a command into a `call_service` message.
    ///
    /// Commands are never queued: outside [`Phase::Ready`] this fails at once.
    /// The caller arms a response timer for the returned message's id; an
    /// unanswered command fails with [`CommandFailure::TimedOut`] when it fires.
    ///
    /// # Errors
    ///
    /// Returns [`CommandFailure::NotConnected`] when the channel is not ready.
    pub fn call_service(&mut self, call: ServiceCall) -> Result<OutboundMessage, CommandFailure> {
        if self.phase != Phase::Ready {
            return Err(CommandFailure::NotConnected);
        }
        let id = self.allocate_id();
        let message = OutboundMessage::CallService {
            id,
            domain: call.domain.to_string(),
            service: call.service.clone(),
            service_data: call.service_data(),
        };
        self.pending_commands.insert(id, call);
        Ok(message)
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn request_snapshot(&mut self) -> Vec<Effect> {
        let id = self.allocate_id();
        if let Some(stale) = self.snapshot_request.replace(id) {
            tracing::debug!(stale, id, "superseding outstanding snapshot request");
        }
        vec![
            Effect::Send(OutboundMessage::GetStates { id }),
            Effect::AwaitResponse(id),
        ]
    }

    fn finish(&mut self, phase: Phase) {
        if !self.pending_commands.is_empty() {
            tracing::debug!(
                count = self.pending_commands.len(),
                "dropping unanswered commands"
            );
        }
        self.phase = phase;
        self.snapshot_request = None;
        self.subscription = None;
        self.pending_commands.clear();
    }

    fn out_of_order(&self, kind: &str) -> Vec<Effect> {
        tracing::warn!(kind, phase = ?self.phase, "ignoring out-of-order message");
        Vec::new()
    }

    fn on_open(&mut self) -> Vec<Effect> {
        if self.phase == Phase::Idle {
            self.phase = Phase::Connecting;
        } else {
            tracing::warn!(phase = ?self.phase, "open requested on a used connection");
        }
        Vec::new()
    }

    fn on_channel_opened(&mut self) -> Vec<Effect> {
        if self.phase == Phase::Connecting {
            self.phase = Phase::AwaitingAuth;
        } else {
            tracing::warn!(phase = ?self.phase, "unexpected channel open");
        }
        Vec::new()
    }

    fn on_frame(&mut self, frame: &str) -> Vec<Effect> {
        if !self.phase.is_open() {
            tracing::debug!(phase = ?self.phase, "dropping frame outside an open channel");
            return Vec::new();
        }
        let message = match InboundMessage::from_frame(frame) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed frame");
                return Vec::new();
            }
        };
        tracing::trace!(kind = message.kind(), "inbound message");

        match message {
            InboundMessage::AuthRequired { .. } => {
                if self.phase != Phase::AwaitingAuth {
                    return self.out_of_order("auth_required");
                }
                vec![Effect::Send(OutboundMessage::Auth {
                    access_token: self.token.clone(),
                })]
            }
            InboundMessage::AuthOk { ha_version } => {
                if self.phase != Phase::AwaitingAuth {
                    return self.out_of_order("auth_ok");
                }
                tracing::info!(hub_version = ?ha_version, "authenticated");
                self.phase = Phase::Authenticated;
                let mut effects = vec![Effect::Authenticated];
                effects.extend(self.request_snapshot());
                let id = self.allocate_id();
                self.subscription = Some(id);
                effects.push(Effect::Send(OutboundMessage::SubscribeEvents {
                    id,
                    event_type: STATE_CHANGED.to_string(),
                }));
                self.phase = Phase::Subscribing;
                effects
            }
            InboundMessage::AuthInvalid { message } => {
                if self.phase != Phase::AwaitingAuth {
                    return self.out_of_order("auth_invalid");
                }
                self.finish(Phase::AuthFailed);
                vec![
                    Effect::Error(SyncError::AuthenticationRejected { message }),
                    Effect::Close { unexpected: false },
                ]
            }
            InboundMessage::Event { event, .. } => self.on_event(event),
            InboundMessage::Result {
                id,
                success,
                result,
                error,
            } => self.on_result(id, success, result, error),
            InboundMessage::Pong { .. } | InboundMessage::Unknown => Vec::new(),
        }
    }

    fn on_event(&mut self, event: EventPayload) -> Vec<Effect> {
        if !self.phase.is_authenticated() {
            return self.out_of_order("event");
        }
        if event.event_type != STATE_CHANGED {
            tracing::debug!(event_type = %event.event_type, "ignoring event");
            return Vec::new();
        }
        let data: StateChangedData = match serde_json::from_value(event.data) {
            Ok(data) => data,
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed state_changed event");
                return Vec::new();
            }
        };
        match data.new_state {
            Some(entity) => vec![Effect::ApplyEvent(entity)],
            None => {
                tracing::debug!(
                    entity_id = %data.entity_id,
                    "entity removed upstream, keeping cached copy"
                );
                Vec::new()
            }
        }
    }

    fn on_result(
        &mut self,
        id: u64,
        success: bool,
        result: Option<Value>,
        error: Option<ErrorPayload>,
    ) -> Vec<Effect> {
        if !self.phase.is_authenticated() {
            return self.out_of_order("result");
        }

        if self.snapshot_request == Some(id) {
            self.snapshot_request = None;
            let mut effects = if success {
                match parse_snapshot(result) {
                    Ok(entities) => vec![Effect::ApplySnapshot(entities)],
                    Err(err) => vec![Effect::Error(err)],
                }
            } else {
                vec![Effect::Error(SyncError::SnapshotRejected {
                    message: error_message(error.as_ref()),
                })]
            };
            if self.phase == Phase::Subscribing {
                self.phase = Phase::Ready;
                effects.push(Effect::Ready);
            }
            return effects;
        }

        if self.subscription == Some(id) {
            if success {
                tracing::debug!(id, "subscribed to state changes");
                return Vec::new();
            }
            let reason = format!("subscription rejected: {}", error_message(error.as_ref()));
            self.finish(Phase::Closed);
            return vec![
                Effect::Error(SyncError::TransientNetworkFailure { reason }),
                Effect::Close { unexpected: true },
            ];
        }

        if let Some(call) = self.pending_commands.remove(&id) {
            if success {
                tracing::debug!(id, %call, "command acknowledged");
                return Vec::new();
            }
            let (code, message) = error.map_or_else(
                || ("unknown_error".to_string(), "no error detail".to_string()),
                |e| (e.code, e.message),
            );
            return vec![Effect::CommandRejected {
                call,
                failure: CommandFailure::Rejected { code, message },
            }];
        }

        tracing::debug!(id, "ignoring result for an unknown or superseded request");
        Vec::new()
    }

    fn on_closed(&mut self, reason: &CloseReason) -> Vec<Effect> {
        if self.phase.is_finished() || self.phase == Phase::Idle {
            tracing::debug!(phase = ?self.phase, %reason, "close after end of connection");
            return Vec::new();
        }
        self.finish(Phase::Closed);
        if reason.is_normal() {
            vec![Effect::Close { unexpected: false }]
        } else {
            vec![
                Effect::Error(SyncError::TransientNetworkFailure {
                    reason: format!("channel closed ({reason})"),
                }),
                Effect::Close { unexpected: true },
            ]
        }
    }

    fn on_timeout(&mut self, id: u64) -> Vec<Effect> {
        if let Some(call) = self.pending_commands.remove(&id) {
            tracing::warn!(id, %call, "command went unanswered");
            return vec![Effect::CommandRejected {
                call,
                failure: CommandFailure::TimedOut,
            }];
        }
        if self.snapshot_request != Some(id) {
            tracing::debug!(id, "timer fired for an answered request");
            return Vec::new();
        }
        tracing::warn!(id, "snapshot request timed out");
        self.finish(Phase::Closed);
        vec![
            Effect::Error(SyncError::RequestTimeout { id }),
            Effect::Close { unexpected: true },
        ]
    }

    fn on_refresh(&mut self) -> Vec<Effect> {
        if !self.phase.is_authenticated() {
            tracing::debug!(phase = ?self.phase, "refresh ignored while not connected");
            return Vec::new();
        }
        self.request_snapshot()
    }

    fn on_teardown(&mut self) -> Vec<Effect> {
        if self.phase.is_finished() {
            return Vec::new();
        }
        self.finish(Phase::Closed);
        vec![Effect::Close { unexpected: false }]
    }
}

fn error_message(error: Option<&ErrorPayload>) -> String {
    error.map_or_else(|| "no error detail".to_string(), |e| e.message.clone())
}

/// Decode a `get_states` result, skipping entries that are not valid entities.
fn parse_snapshot(result: Option<Value>) -> Result<Vec<Entity>, SyncError> {
    let Some(Value::Array(items)) = result else {
        return Err(SyncError::MalformedMessage(
            "snapshot result is not an array".to_string(),
        ));
    };
    let mut entities = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<Entity>(item) {
            Ok(entity) => entities.push(entity),
            Err(err) => tracing::warn!(error = %err, "skipping malformed entity in snapshot"),
        }
    }
    Ok(entities)
}
