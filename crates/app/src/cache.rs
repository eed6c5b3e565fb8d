//! Entity cache — the latest known state of every admitted entity.
//!
//! Snapshots replace the cache wholesale (reconciling away entities the hub
//! no longer reports); change events upsert one entry. Both pass through the
//! identifier filter, so the cache never holds an id the filter rejects.
//!
//! Entries are reference-counted: cloning the map for publication shares
//! every entity, and an event only allocates the entry it replaces.

use std::collections::HashMap;
use std::sync::Arc;

use homedash_domain::entity::{Domain, Entity};
use homedash_domain::filter::EntityFilter;
use homedash_domain::id::EntityId;

/// Map of cached entities keyed by identifier.
pub type EntityMap = HashMap<EntityId, Arc<Entity>>;

/// Filtered, keyed store of entity states.
#[derive(Debug, Default)]
pub struct EntityCache {
    entities: EntityMap,
    filter: EntityFilter,
}

impl EntityCache {
    #[must_use]
    pub fn new(filter: EntityFilter) -> Self {
        Self {
            entities: HashMap::new(),
            filter,
        }
    }

    /// Replace the contents with `entities`, keeping only admitted ids.
    ///
    /// A cached copy whose `last_updated` is strictly newer than the snapshot's
    /// survives; this covers a change event that raced ahead of the snapshot.
    /// Returns the number of entities now cached.
    pub fn apply_snapshot(&mut self, entities: Vec<Entity>) -> usize {
        let mut next = HashMap::with_capacity(entities.len());
        for entity in entities {
            if !self.filter.admits(&entity.entity_id) {
                continue;
            }
            let entity = match self.entities.remove(&entity.entity_id) {
                Some(cached) if cached.is_newer_than(&entity) => cached,
                Some(cached) if *cached == entity => cached,
                _ => Arc::new(entity),
            };
            next.insert(entity.entity_id.clone(), entity);
        }
        self.entities = next;
        self.entities.len()
    }

    /// Insert or overwrite one entity. Returns its id when the filter admitted it.
    pub fn apply_event(&mut self, entity: Entity) -> Option<EntityId> {
        if !self.filter.admits(&entity.entity_id) {
            tracing::trace!(entity_id = %entity.entity_id, "event filtered out");
            return None;
        }
        let id = entity.entity_id.clone();
        self.entities.insert(id.clone(), Arc::new(entity));
        Some(id)
    }

    /// Swap the filter. Entities the new filter rejects are evicted at once;
    /// entities it newly admits arrive with the next snapshot.
    pub fn set_filter(&mut self, filter: EntityFilter) {
        self.entities.retain(|id, _| filter.admits(id));
        self.filter = filter;
    }

    #[must_use]
    pub fn filter(&self) -> &EntityFilter {
        &self.filter
    }

    /// Read-only view of the whole cache.
    #[must_use]
    pub fn read(&self) -> &EntityMap {
        &self.entities
    }

    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id).map(Arc::as_ref)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Cached entities of one domain, sorted by id.
    #[must_use]
    pub fn in_domain(&self, domain: &Domain) -> Vec<&Entity> {
        let mut out: Vec<_> = self
            .entities
            .values()
            .map(Arc::as_ref)
            .filter(|entity| &entity.domain == domain)
            .collect();
        out.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        out
    }
}
