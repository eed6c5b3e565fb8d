//! # homedash — dashboard sync daemon
//!
//! Composition root that wires the sync client to a transport and follows
//! the hub until interrupted.
//!
//! ## Responsibilities
//! - Parse configuration (env vars, config file)
//! - Install the tracing subscriber
//! - Pick the WebSocket or polling transport
//! - Feed the hub configuration to the sync client, reloading it on `SIGHUP`
//! - Log sync events; run connection diagnostics on request
//! - Tear the connection down cleanly on Ctrl-C
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no sync logic belongs here.

mod config;

use anyhow::Context;
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing_subscriber::EnvFilter;

use homedash_adapter_http_reqwest::{PollingTransport, RestClient, diagnose};
use homedash_adapter_ws_tungstenite::WebSocketTransport;
use homedash_app::ports::Transport;
use homedash_app::{HubHandle, SyncClient};
use homedash_domain::connection::HubConfig;
use homedash_domain::event::SyncEvent;

use crate::config::{Config, TransportKind};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    let hub = config.hub_config()?;

    if std::env::var_os("HOMEDASH_DIAGNOSE").is_some() {
        return run_diagnostics(&config, hub.as_ref()).await;
    }

    let (config_tx, config_rx) = watch::channel(hub);
    match config.hub.transport {
        TransportKind::WebSocket => {
            let ws = config.websocket.clone();
            let client = SyncClient::new(move || WebSocketTransport::new(ws.clone()));
            follow(client, &config, config_tx, config_rx).await
        }
        TransportKind::Polling => {
            let rest = RestClient::new(config.polling.request_timeout())?;
            let polling = config.polling.clone();
            let client = SyncClient::new(move || {
                PollingTransport::with_client(rest.clone(), polling.clone())
            });
            follow(client, &config, config_tx, config_rx).await
        }
    }
}

async fn follow<F, T>(
    client: SyncClient<F>,
    config: &Config,
    config_tx: watch::Sender<Option<HubConfig>>,
    config_rx: watch::Receiver<Option<HubConfig>>,
) -> anyhow::Result<()>
where
    F: Fn() -> T + Send + Sync + 'static,
    T: Transport + 'static,
{
    let (handle, task) = client
        .with_policy(config.reconnect_policy())
        .with_filter(config.entity_filter()?)
        .spawn(config_rx);
    tracing::info!(transport = ?config.hub.transport, "homedash started");

    let mut events = BroadcastStream::new(handle.subscribe());
    let mut reload = Reload::new()?;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("listening for ctrl-c")?;
                tracing::info!("shutting down");
                break;
            }
            () = reload.wait() => match Config::load().and_then(|fresh| {
                Ok((fresh.hub_config()?, fresh.entity_filter()?))
            }) {
                Ok((hub, filter)) => {
                    tracing::info!(configured = hub.is_some(), "configuration reloaded");
                    handle.set_filter(filter).await;
                    config_tx.send_replace(hub);
                }
                Err(err) => tracing::warn!(error = %err, "failed to reload configuration"),
            },
            event = events.next() => match event {
                Some(Ok(event)) => log_event(&handle, &event),
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "event log fell behind");
                }
                None => break,
            },
        }
    }

    handle.teardown().await;
    task.await.context("sync client task")?;
    Ok(())
}

fn log_event(handle: &HubHandle, event: &SyncEvent) {
    match event {
        SyncEvent::StatusChanged(status) => tracing::info!(
            connection = ?status.connection,
            configured = status.configured,
            loading = status.loading,
            error = status.error.as_ref().map(tracing::field::display),
            "status changed"
        ),
        SyncEvent::SnapshotApplied { count } => {
            tracing::info!(count, "entities loaded");
        }
        SyncEvent::EntityUpdated(id) => {
            if let Some(entity) = handle.entities().get(id) {
                tracing::debug!(entity_id = %id, state = %entity.state, "entity updated");
            }
        }
        SyncEvent::CommandFailed { call, failure } => {
            tracing::warn!(%call, %failure, "command failed");
        }
    }
}

async fn run_diagnostics(config: &Config, hub: Option<&HubConfig>) -> anyhow::Result<()> {
    let Some(hub) = hub else {
        anyhow::bail!("diagnostics need hub.base_url and hub.token");
    };
    let rest = RestClient::new(config.polling.request_timeout())?;
    let reports = diagnose(&rest, hub).await;
    let failures = reports.iter().filter(|report| !report.is_success()).count();
    for report in &reports {
        tracing::info!(
            probe = %report.probe,
            outcome = ?report.outcome,
            message = %report.message,
            details = report.details.as_deref(),
            "diagnostic"
        );
    }
    if failures > 0 {
        anyhow::bail!("{failures} of {} diagnostic probes failed", reports.len());
    }
    Ok(())
}

/// Configuration reload trigger: `SIGHUP` on unix, never elsewhere.
struct Reload {
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
}

impl Reload {
    #[cfg(unix)]
    fn new() -> anyhow::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        let hangup =
            signal(SignalKind::hangup()).context("installing SIGHUP handler")?;
        Ok(Self { hangup })
    }

    #[cfg(not(unix))]
    #[allow(clippy::unnecessary_wraps)]
    fn new() -> anyhow::Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn wait(&mut self) {
        if self.hangup.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }

    #[cfg(not(unix))]
    async fn wait(&mut self) {
        std::future::pending::<()>().await;
    }
}
