//! In-process publication of sync state.
//!
//! Status and entity map are *values* (late subscribers see the current one),
//! so they live in tokio [`watch`] channels. Discrete happenings go through a
//! [`broadcast`] channel of [`SyncEvent`]s.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use homedash_domain::connection::SyncStatus;
use homedash_domain::event::SyncEvent;

use crate::cache::EntityMap;

/// Shared publication point for everything observers can see.
///
/// Publishing succeeds even when there are no active subscribers.
#[derive(Debug)]
pub struct SyncBus {
    status: watch::Sender<SyncStatus>,
    entities: watch::Sender<Arc<EntityMap>>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncBus {
    /// Create a bus whose event channel buffers `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        let (entities, _) = watch::channel(Arc::new(EntityMap::new()));
        let (events, _) = broadcast::channel(capacity);
        Self {
            status,
            entities,
            events,
        }
    }

    /// Publish a discrete event.
    pub fn publish(&self, event: SyncEvent) {
        // Zero receivers is fine; the event is simply dropped.
        let _ = self.events.send(event);
    }

    /// Replace the status. Emits [`SyncEvent::StatusChanged`] only when it differs.
    pub fn set_status(&self, status: SyncStatus) {
        let changed = self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status.clone();
            true
        });
        if changed {
            tracing::debug!(
                connection = %status.connection,
                loading = status.loading,
                error = ?status.error,
                "status changed"
            );
            self.publish(SyncEvent::StatusChanged(status));
        }
    }

    /// Modify the status in place.
    pub fn update_status(&self, f: impl FnOnce(&mut SyncStatus)) {
        let mut next = self.status();
        f(&mut next);
        self.set_status(next);
    }

    /// Replace the published entity map.
    pub fn set_entities(&self, entities: EntityMap) {
        self.entities.send_replace(Arc::new(entities));
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Current entity map.
    #[must_use]
    pub fn entities(&self) -> Arc<EntityMap> {
        Arc::clone(&self.entities.borrow())
    }

    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    #[must_use]
    pub fn watch_entities(&self) -> watch::Receiver<Arc<EntityMap>> {
        self.entities.subscribe()
    }

    /// Subscribe to events published *after* this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }
}

impl Default for SyncBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homedash_domain::connection::ConnectionStatus;
    use homedash_domain::id::EntityId;

    fn connected() -> SyncStatus {
        SyncStatus {
            connection: ConnectionStatus::Connected,
            configured: true,
            loading: false,
            error: None,
        }
    }

    #[tokio::test]
    async fn should_deliver_event_to_multiple_subscribers() {
        let bus = SyncBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        let id = EntityId::new("light.kitchen").unwrap();

        bus.publish(SyncEvent::EntityUpdated(id.clone()));

        assert_eq!(rx1.recv().await.unwrap(), SyncEvent::EntityUpdated(id.clone()));
        assert_eq!(rx2.recv().await.unwrap(), SyncEvent::EntityUpdated(id));
    }

    #[test]
    fn should_succeed_when_no_subscribers() {
        let bus = SyncBus::new(16);
        bus.publish(SyncEvent::SnapshotApplied { count: 0 });
        bus.set_status(connected());
        assert_eq!(bus.status(), connected());
    }

    #[tokio::test]
    async fn should_announce_status_change_once() {
        let bus = SyncBus::new(16);
        let mut rx = bus.subscribe();

        bus.set_status(connected());
        bus.set_status(connected());
        bus.publish(SyncEvent::SnapshotApplied { count: 1 });

        assert_eq!(rx.recv().await.unwrap(), SyncEvent::StatusChanged(connected()));
        assert_eq!(rx.recv().await.unwrap(), SyncEvent::SnapshotApplied { count: 1 });
    }

    #[test]
    fn should_show_current_status_to_late_watchers() {
        let bus = SyncBus::new(16);
        bus.update_status(|status| status.loading = true);

        let rx = bus.watch_status();

        assert!(rx.borrow().loading);
    }
}
