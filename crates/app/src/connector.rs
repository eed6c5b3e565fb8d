//! Connector — one task per active hub configuration.
//!
//! The task owns the transport, the entity cache and the backoff counter, and
//! runs one [`ProtocolMachine`] per connection attempt. Everything it learns
//! is published on the shared [`SyncBus`]. Only one connection attempt exists
//! at any time: attempts run sequentially inside the task.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

use homedash_domain::connection::{ConnectionStatus, HubConfig, SyncStatus};
use homedash_domain::error::{CommandFailure, SyncError};
use homedash_domain::event::SyncEvent;
use homedash_domain::filter::EntityFilter;

use crate::cache::EntityCache;
use crate::dispatcher::{COMMAND_BUFFER, Command, HubHandle};
use crate::event_bus::SyncBus;
use crate::ports::{CloseReason, Transport, TransportError, TransportEvent};
use crate::protocol::{Effect, Input, OutboundMessage, ProtocolMachine};
use crate::reconnect::{Backoff, ReconnectPolicy};

/// How a single connection attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Owner asked to stop.
    Shutdown,
    /// Unexpected loss; the supervisor may retry.
    Lost,
    /// Closed without a retry (clean close by the hub, rejected token).
    Stopped,
}

/// What an idle connector should do after a command.
enum Wake {
    Continue,
    Reconnect,
    Shutdown,
}

/// Response timers of outstanding requests, keyed by request id.
#[derive(Debug, Default)]
struct Deadlines(HashMap<u64, Instant>);

impl Deadlines {
    fn arm(&mut self, id: u64, at: Instant) {
        self.0.insert(id, at);
    }

    /// The timer that fires first.
    fn earliest(&self) -> Option<(u64, Instant)> {
        self.0
            .iter()
            .min_by_key(|(_, at)| **at)
            .map(|(id, at)| (*id, *at))
    }

    /// Drop timers of requests the machine no longer waits on.
    fn prune(&mut self, machine: &ProtocolMachine) {
        self.0.retain(|id, _| machine.is_awaiting(*id));
    }
}

/// Runs the connection lifecycle for one [`HubConfig`].
pub struct Connector<T> {
    config: HubConfig,
    transport: T,
    policy: ReconnectPolicy,
    cache: EntityCache,
    bus: Arc<SyncBus>,
    commands: mpsc::Receiver<Command>,
    error: Option<SyncError>,
}

impl<T> Connector<T>
where
    T: Transport + 'static,
{
    /// Spawn the connector task and return a handle to it.
    pub fn spawn(
        config: HubConfig,
        transport: T,
        policy: ReconnectPolicy,
        filter: EntityFilter,
        bus: Arc<SyncBus>,
    ) -> (HubHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let span = tracing::info_span!("connector", hub = %config.base_url());
        let connector = Self {
            config,
            transport,
            policy,
            cache: EntityCache::new(filter),
            bus: Arc::clone(&bus),
            commands: rx,
            error: None,
        };
        let task = tokio::spawn(connector.run().instrument(span));
        (HubHandle::new(tx, bus), task)
    }

    async fn run(mut self) {
        let mut backoff = Backoff::new(self.policy);
        loop {
            match self.run_session(&mut backoff).await {
                SessionEnd::Shutdown => break,
                SessionEnd::Lost => {
                    if let Some(delay) = backoff.next_delay() {
                        tracing::info!(
                            attempt = backoff.attempts(),
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            "scheduling reconnect"
                        );
                        if !self.idle(Some(delay)).await {
                            break;
                        }
                    } else {
                        let attempts = backoff.attempts();
                        tracing::error!(attempts, "giving up on reconnecting");
                        self.error = Some(SyncError::ReconnectExhausted { attempts });
                        self.publish_offline(ConnectionStatus::Failed);
                        if !self.idle(None).await {
                            break;
                        }
                        backoff.reset();
                    }
                }
                SessionEnd::Stopped => {
                    if !self.idle(None).await {
                        break;
                    }
                    backoff.reset();
                }
            }
        }
        tracing::debug!("connector stopped");
    }

    /// Wait between sessions, serving commands as "not connected".
    ///
    /// With a delay, returns `true` once it elapsed. Without one, waits for an
    /// explicit reconnect. Returns `false` on shutdown.
    async fn idle(&mut self, delay: Option<Duration>) -> bool {
        let sleep = tokio::time::sleep(delay.unwrap_or(Duration::ZERO));
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep, if delay.is_some() => return true,
                command = self.commands.recv() => {
                    match serve_offline(command, &mut self.cache, &self.bus) {
                        Wake::Shutdown => {
                            tracing::debug!("shutdown while idle, pending retry cancelled");
                            return false;
                        }
                        Wake::Reconnect if delay.is_none() => {
                            tracing::info!("manual reconnect requested");
                            return true;
                        }
                        Wake::Reconnect => tracing::debug!("reconnect already scheduled"),
                        Wake::Continue => {}
                    }
                }
            }
        }
    }

    async fn run_session(&mut self, backoff: &mut Backoff) -> SessionEnd {
        let mut machine = ProtocolMachine::new(self.config.token());
        machine.handle(Input::Open);
        self.publish(&machine);
        tracing::info!("connecting");

        let opened = {
            let open = self.transport.open(&self.config);
            tokio::pin!(open);
            loop {
                tokio::select! {
                    result = &mut open => break result,
                    command = self.commands.recv() => {
                        match serve_offline(command, &mut self.cache, &self.bus) {
                            Wake::Shutdown => return SessionEnd::Shutdown,
                            Wake::Reconnect => {
                                tracing::debug!("connection attempt already in flight");
                            }
                            Wake::Continue => {}
                        }
                    }
                }
            }
        };
        if let Err(err) = opened {
            tracing::warn!(error = %err.chain(), "failed to open channel");
            self.error = Some(SyncError::from(&err));
            machine.handle(Input::Teardown);
            self.publish(&machine);
            return SessionEnd::Lost;
        }
        machine.handle(Input::ChannelOpened);
        self.publish(&machine);

        let mut deadlines = Deadlines::default();
        let mut queue = VecDeque::new();
        loop {
            let armed = deadlines.earliest();
            let fire_at = armed.map_or_else(Instant::now, |(_, at)| at);
            tokio::select! {
                event = self.transport.recv() => {
                    let input = match event {
                        TransportEvent::Message(frame) => Input::Frame(frame),
                        TransportEvent::Closed(reason) => {
                            tracing::info!(%reason, "channel closed by peer");
                            Input::ChannelClosed(reason)
                        }
                    };
                    queue.extend(machine.handle(input));
                }
                command = self.commands.recv() => {
                    if let Some(end) = self
                        .serve_online(command, &mut machine, &mut queue, &mut deadlines)
                        .await
                    {
                        return end;
                    }
                }
                () = tokio::time::sleep_until(fire_at), if armed.is_some() => {
                    if let Some((id, _)) = armed {
                        queue.extend(machine.handle(Input::RequestTimedOut(id)));
                    }
                }
            }
            if let Some(end) = self
                .apply(&mut machine, &mut queue, &mut deadlines, backoff)
                .await
            {
                return end;
            }
            deadlines.prune(&machine);
            self.publish(&machine);
        }
    }

    /// Serve a command while a channel is open. Returns `Some` on shutdown.
    async fn serve_online(
        &mut self,
        command: Option<Command>,
        machine: &mut ProtocolMachine,
        queue: &mut VecDeque<Effect>,
        deadlines: &mut Deadlines,
    ) -> Option<SessionEnd> {
        let Some(command) = command.filter(|c| !matches!(c, Command::Shutdown)) else {
            tracing::info!("closing channel");
            machine.handle(Input::Teardown);
            if let Err(err) = self.transport.close().await {
                tracing::debug!(error = %err, "close failed");
            }
            self.error = None;
            self.publish(machine);
            return Some(SessionEnd::Shutdown);
        };
        match command {
            Command::Invoke { call, reply } => {
                let message = match machine.call_service(call) {
                    Ok(message) => message,
                    Err(failure) => {
                        tracing::debug!(error = %failure, "command refused");
                        let _ = reply.send(Err(failure));
                        return None;
                    }
                };
                match self.write(&message).await {
                    Ok(()) => {
                        if let Some(id) = message.id() {
                            deadlines.arm(id, Instant::now() + self.policy.request_timeout);
                        }
                        let _ = reply.send(Ok(()));
                    }
                    Err(err) => {
                        tracing::warn!(error = %err.chain(), "failed to write command");
                        let _ = reply.send(Err(CommandFailure::ChannelClosed));
                        let reason = CloseReason::abnormal(err.to_string());
                        queue.extend(machine.handle(Input::ChannelClosed(reason)));
                    }
                }
            }
            Command::Refresh => queue.extend(machine.handle(Input::Refresh)),
            Command::SetFilter(filter) => {
                tracing::info!(enabled = filter.is_enabled(), "identifier filter changed");
                self.cache.set_filter(filter);
                self.bus.set_entities(self.cache.read().clone());
                queue.extend(machine.handle(Input::Refresh));
            }
            Command::Reconnect | Command::Shutdown => tracing::debug!("already connected"),
        }
        None
    }

    /// Carry out effects in order. Returns how the session ended, if it did.
    async fn apply(
        &mut self,
        machine: &mut ProtocolMachine,
        queue: &mut VecDeque<Effect>,
        deadlines: &mut Deadlines,
        backoff: &mut Backoff,
    ) -> Option<SessionEnd> {
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Send(message) => {
                    if let Err(err) = self.write(&message).await {
                        tracing::warn!(error = %err.chain(), "failed to write frame");
                        let reason = CloseReason::abnormal(err.to_string());
                        queue.extend(machine.handle(Input::ChannelClosed(reason)));
                    }
                }
                Effect::AwaitResponse(id) => {
                    deadlines.arm(id, Instant::now() + self.policy.request_timeout);
                }
                Effect::Authenticated => self.error = None,
                Effect::ApplySnapshot(entities) => {
                    let count = self.cache.apply_snapshot(entities);
                    tracing::info!(count, "snapshot applied");
                    self.bus.set_entities(self.cache.read().clone());
                    self.bus.publish(SyncEvent::SnapshotApplied { count });
                }
                Effect::ApplyEvent(entity) => {
                    if let Some(id) = self.cache.apply_event(entity) {
                        tracing::trace!(entity_id = %id, "entity updated");
                        self.bus.set_entities(self.cache.read().clone());
                        self.bus.publish(SyncEvent::EntityUpdated(id));
                    }
                }
                Effect::Ready => {
                    backoff.reset();
                    tracing::info!(entities = self.cache.len(), "connection ready");
                }
                Effect::Error(err) => {
                    tracing::warn!(error = %err, "sync error");
                    self.error = Some(err);
                }
                Effect::CommandRejected { call, failure } => {
                    tracing::warn!(%call, error = %failure, "command failed");
                    self.error = Some(SyncError::Command(failure.clone()));
                    self.bus.publish(SyncEvent::CommandFailed { call, failure });
                }
                Effect::Close { unexpected } => {
                    queue.clear();
                    if let Err(err) = self.transport.close().await {
                        tracing::debug!(error = %err, "close failed");
                    }
                    self.publish(machine);
                    return Some(if unexpected {
                        SessionEnd::Lost
                    } else {
                        SessionEnd::Stopped
                    });
                }
            }
        }
        None
    }

    async fn write(&mut self, message: &OutboundMessage) -> Result<(), TransportError> {
        let frame = message
            .to_frame()
            .map_err(|err| TransportError::Send(Box::new(err)))?;
        tracing::trace!(id = ?message.id(), "outbound message");
        self.transport.send(frame).await
    }

    fn publish(&self, machine: &ProtocolMachine) {
        self.bus.set_status(SyncStatus {
            connection: machine.status(),
            configured: true,
            loading: machine.is_loading(),
            error: self.error.clone(),
        });
    }

    fn publish_offline(&self, connection: ConnectionStatus) {
        self.bus.set_status(SyncStatus {
            connection,
            configured: true,
            loading: false,
            error: self.error.clone(),
        });
    }
}

/// Serve a command while no channel is ready.
fn serve_offline(command: Option<Command>, cache: &mut EntityCache, bus: &SyncBus) -> Wake {
    match command {
        None | Some(Command::Shutdown) => Wake::Shutdown,
        Some(Command::Reconnect) => Wake::Reconnect,
        Some(Command::Invoke { call, reply }) => {
            tracing::debug!(%call, "command refused, not connected");
            let _ = reply.send(Err(CommandFailure::NotConnected));
            Wake::Continue
        }
        Some(Command::Refresh) => {
            tracing::debug!("refresh ignored while not connected");
            Wake::Continue
        }
        Some(Command::SetFilter(filter)) => {
            cache.set_filter(filter);
            bus.set_entities(cache.read().clone());
            Wake::Continue
        }
    }
}
