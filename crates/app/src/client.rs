//! Sync client — follows a configuration source and keeps exactly one
//! connector alive for the current [`HubConfig`].
//!
//! Every configuration change tears the running connector down (cancelling
//! any pending retry) before a fresh one starts. The [`HubHandle`] returned
//! by [`SyncClient::spawn`] stays valid across those swaps.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

use homedash_domain::connection::{HubConfig, SyncStatus};
use homedash_domain::error::CommandFailure;
use homedash_domain::filter::EntityFilter;

use crate::cache::EntityMap;
use crate::connector::Connector;
use crate::dispatcher::{COMMAND_BUFFER, Command, HubHandle};
use crate::event_bus::SyncBus;
use crate::ports::Transport;
use crate::reconnect::ReconnectPolicy;

type Active = Option<(HubHandle, JoinHandle<()>)>;

/// Builds a connector per configuration from a transport factory.
pub struct SyncClient<F> {
    factory: F,
    policy: ReconnectPolicy,
    filter: EntityFilter,
    bus: Arc<SyncBus>,
}

impl<F, T> SyncClient<F>
where
    F: Fn() -> T + Send + Sync + 'static,
    T: Transport + 'static,
{
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            policy: ReconnectPolicy::default(),
            filter: EntityFilter::default(),
            bus: Arc::new(SyncBus::default()),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: EntityFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Start following `config`. `None` means "not configured".
    pub fn spawn(self, config: watch::Receiver<Option<HubConfig>>) -> (HubHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = HubHandle::new(tx, Arc::clone(&self.bus));
        let task = tokio::spawn(
            self.run(config, rx)
                .instrument(tracing::info_span!("sync_client")),
        );
        (handle, task)
    }

    async fn run(
        mut self,
        mut config: watch::Receiver<Option<HubConfig>>,
        mut commands: mpsc::Receiver<Command>,
    ) {
        let mut active: Active = None;
        let mut current = config.borrow_and_update().clone();
        self.switch(&mut active, current.clone()).await;

        let mut watching = true;
        loop {
            tokio::select! {
                changed = config.changed(), if watching => {
                    if changed.is_err() {
                        tracing::debug!(
                            "configuration source dropped, keeping current configuration"
                        );
                        watching = false;
                        continue;
                    }
                    let next = config.borrow_and_update().clone();
                    if next == current {
                        tracing::debug!("configuration unchanged");
                        continue;
                    }
                    current = next;
                    self.switch(&mut active, current.clone()).await;
                }
                command = commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.forward(&active, command).await,
                },
            }
        }

        self.stop(&mut active).await;
        tracing::debug!("sync client stopped");
    }

    async fn forward(&mut self, active: &Active, command: Command) {
        if let Command::SetFilter(filter) = &command {
            self.filter = filter.clone();
        }
        let Some((handle, _)) = active else {
            reject(command);
            return;
        };
        if let Err(command) = handle.forward(command).await {
            reject(command);
        }
    }

    async fn switch(&self, active: &mut Active, next: Option<HubConfig>) {
        self.stop(active).await;
        self.bus.set_entities(EntityMap::new());
        match next {
            None => {
                tracing::info!("hub connection not configured");
                self.bus.set_status(SyncStatus::not_configured());
            }
            Some(config) => {
                tracing::info!(hub = %config.base_url(), "starting connector");
                *active = Some(Connector::spawn(
                    config,
                    (self.factory)(),
                    self.policy,
                    self.filter.clone(),
                    Arc::clone(&self.bus),
                ));
            }
        }
    }

    async fn stop(&self, active: &mut Active) {
        let Some((handle, task)) = active.take() else {
            return;
        };
        tracing::info!("tearing down connector");
        handle.teardown().await;
        if let Err(err) = task.await {
            tracing::warn!(error = %err, "connector task failed");
        }
    }
}

fn reject(command: Command) {
    match command {
        Command::Invoke { call, reply } => {
            tracing::debug!(%call, "command refused, no active connection");
            let _ = reply.send(Err(CommandFailure::NotConnected));
        }
        other => tracing::debug!(command = ?other, "no active connection"),
    }
}
