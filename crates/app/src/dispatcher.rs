//! Command dispatcher — the cloneable handle UI code talks to.
//!
//! Commands are fire-and-forget: [`HubHandle::invoke`] returns once the
//! `call_service` message is written (or refused). The hub's eventual answer
//! only surfaces when it is a failure, via [`SyncEvent::CommandFailed`].
//!
//! [`SyncEvent::CommandFailed`]: homedash_domain::event::SyncEvent::CommandFailed

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use homedash_domain::connection::SyncStatus;
use homedash_domain::entity::Domain;
use homedash_domain::error::CommandFailure;
use homedash_domain::event::SyncEvent;
use homedash_domain::filter::EntityFilter;
use homedash_domain::id::EntityId;
use homedash_domain::service::ServiceCall;

use crate::cache::EntityMap;
use crate::event_bus::SyncBus;

/// Depth of the command queue between handles and the owning task.
pub(crate) const COMMAND_BUFFER: usize = 64;

/// Requests accepted by a connector or client task.
#[derive(Debug)]
pub(crate) enum Command {
    Invoke {
        call: ServiceCall,
        reply: oneshot::Sender<Result<(), CommandFailure>>,
    },
    Refresh,
    SetFilter(EntityFilter),
    Reconnect,
    Shutdown,
}

/// Cloneable handle to a running sync task.
#[derive(Debug, Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<Command>,
    bus: Arc<SyncBus>,
}

impl HubHandle {
    pub(crate) fn new(commands: mpsc::Sender<Command>, bus: Arc<SyncBus>) -> Self {
        Self { commands, bus }
    }

    /// Pass a command through; hands it back when the task is gone.
    pub(crate) async fn forward(&self, command: Command) -> Result<(), Command> {
        self.commands.send(command).await.map_err(|err| err.0)
    }

    /// Ask the hub to run `domain.action` on `target`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandFailure::Invalid`] for a blank action,
    /// [`CommandFailure::NotConnected`] when the channel is not ready (the
    /// command is dropped, never queued) and [`CommandFailure::ChannelClosed`]
    /// when the write itself failed.
    pub async fn invoke(
        &self,
        domain: Domain,
        action: &str,
        target: EntityId,
        extra: Option<Map<String, Value>>,
    ) -> Result<(), CommandFailure> {
        let call = ServiceCall::new(domain, action, target)?;
        let call = match extra {
            Some(data) => call.with_data(data),
            None => call,
        };
        self.dispatch(call).await
    }

    /// Send a prepared [`ServiceCall`].
    ///
    /// # Errors
    ///
    /// Same as [`invoke`](Self::invoke).
    pub async fn dispatch(&self, call: ServiceCall) -> Result<(), CommandFailure> {
        tracing::debug!(%call, "dispatching command");
        let (reply, response) = oneshot::channel();
        if self.forward(Command::Invoke { call, reply }).await.is_err() {
            return Err(CommandFailure::NotConnected);
        }
        response.await.unwrap_or(Err(CommandFailure::NotConnected))
    }

    /// Re-request the full snapshot. Ignored while not connected.
    pub async fn refresh(&self) {
        let _ = self.forward(Command::Refresh).await;
    }

    /// Replace the identifier filter and refetch the snapshot.
    pub async fn set_filter(&self, filter: EntityFilter) {
        let _ = self.forward(Command::SetFilter(filter)).await;
    }

    /// Start over after a terminal failure. A no-op while an attempt is
    /// already running or scheduled.
    pub async fn reconnect(&self) {
        let _ = self.forward(Command::Reconnect).await;
    }

    /// Close the channel intentionally and cancel any pending retry.
    pub async fn teardown(&self) {
        let _ = self.forward(Command::Shutdown).await;
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.bus.status()
    }

    /// Current cache contents.
    #[must_use]
    pub fn entities(&self) -> Arc<EntityMap> {
        self.bus.entities()
    }

    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.bus.watch_status()
    }

    #[must_use]
    pub fn watch_entities(&self) -> watch::Receiver<Arc<EntityMap>> {
        self.bus.watch_entities()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.bus.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homedash_domain::error::ValidationError;

    fn handle() -> (HubHandle, mpsc::Receiver<Command>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        (HubHandle::new(tx, Arc::new(SyncBus::default())), rx)
    }

    fn front_door() -> EntityId {
        EntityId::new("lock.front_door").unwrap()
    }

    #[tokio::test]
    async fn should_reject_blank_action_without_sending() {
        let (handle, mut rx) = handle();

        let result = handle.invoke(Domain::Lock, "", front_door(), None).await;

        assert_eq!(
            result,
            Err(CommandFailure::Invalid(ValidationError::EmptyService))
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn should_fail_with_not_connected_when_task_is_gone() {
        let (handle, rx) = handle();
        drop(rx);

        let result = handle.invoke(Domain::Lock, "unlock", front_door(), None).await;

        assert_eq!(result, Err(CommandFailure::NotConnected));
    }

    #[tokio::test]
    async fn should_relay_task_reply() {
        let (handle, mut rx) = handle();
        let task = tokio::spawn(async move {
            let Some(Command::Invoke { call, reply }) = rx.recv().await else {
                panic!("expected invoke");
            };
            let _ = reply.send(Ok(()));
            call
        });

        let mut extra = Map::new();
        extra.insert("code".to_string(), Value::from("1234"));
        let result = handle
            .invoke(Domain::Lock, "unlock", front_door(), Some(extra))
            .await;

        assert_eq!(result, Ok(()));
        let call = task.await.unwrap();
        assert_eq!(call.service, "unlock");
        assert_eq!(call.service_data()["code"], Value::from("1234"));
    }
}
