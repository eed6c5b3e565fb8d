//! Identifier filter — the allow-list restricting which entities are cached.
//!
//! An enabled filter with no identifiers admits nothing: the dashboard shows
//! an empty list rather than every entity the hub knows about.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::id::EntityId;

/// Allow-list of entity identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "entities", rename_all = "snake_case")]
pub enum EntityFilter {
    /// No filtering: every entity is admitted.
    #[default]
    Disabled,
    /// Only the listed identifiers are admitted; an empty set admits none.
    Enabled(HashSet<EntityId>),
}

impl EntityFilter {
    /// Build an enabled filter from identifiers.
    pub fn allow<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = EntityId>,
    {
        Self::Enabled(ids.into_iter().collect())
    }

    /// Whether an entity with this identifier may enter the cache.
    #[must_use]
    pub fn admits(&self, id: &EntityId) -> bool {
        match self {
            Self::Disabled => true,
            Self::Enabled(ids) => ids.contains(id),
        }
    }

    /// Whether filtering is switched on.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }
}
