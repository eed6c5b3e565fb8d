//! Sync events — notifications published while the client follows the hub.
//!
//! These are what observers subscribe to; the entity map itself is published
//! separately as a whole value.

use crate::connection::SyncStatus;
use crate::error::CommandFailure;
use crate::id::EntityId;
use crate::service::ServiceCall;

/// Something observable happened in the sync client.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The connection status (or its error) changed.
    StatusChanged(SyncStatus),
    /// A snapshot replaced the cache; `count` entities passed the filter.
    SnapshotApplied { count: usize },
    /// A change event updated one cached entity.
    EntityUpdated(EntityId),
    /// The hub answered a dispatched command with a failure.
    CommandFailed {
        call: ServiceCall,
        failure: CommandFailure,
    },
}

impl SyncEvent {
    /// Short label for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StatusChanged(_) => "status_changed",
            Self::SnapshotApplied { .. } => "snapshot_applied",
            Self::EntityUpdated(_) => "entity_updated",
            Self::CommandFailed { .. } => "command_failed",
        }
    }
}
