//! Entity — a hub-managed object of interest (light, lock, sensor, camera, …).
//!
//! Entities arrive as JSON state objects, either in a full snapshot or one at
//! a time in change events. The [`Domain`] is derived from the identifier at
//! ingestion and carried on the record so renderers never re-parse the id.

mod attribute_value;
mod domain;
mod state;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use attribute_value::AttributeValue;
pub use domain::Domain;
pub use state::EntityState;

use crate::error::ValidationError;
use crate::id::EntityId;

/// UTC timestamp as supplied by the hub.
pub type Timestamp = DateTime<Utc>;

/// Origin metadata the hub attaches to every state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Context {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Latest observed state of one hub entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EntityRecord")]
pub struct Entity {
    pub entity_id: EntityId,
    #[serde(skip_serializing)]
    pub domain: Domain,
    pub state: EntityState,
    pub attributes: HashMap<String, AttributeValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_changed: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
}

/// Wire shape of a hub state object, before the id is validated.
#[derive(Deserialize)]
struct EntityRecord {
    entity_id: String,
    state: EntityState,
    #[serde(default)]
    attributes: HashMap<String, AttributeValue>,
    #[serde(default)]
    last_changed: Option<Timestamp>,
    #[serde(default)]
    last_updated: Option<Timestamp>,
    #[serde(default)]
    context: Option<Context>,
}

impl TryFrom<EntityRecord> for Entity {
    type Error = ValidationError;

    fn try_from(record: EntityRecord) -> Result<Self, Self::Error> {
        let entity_id = EntityId::new(record.entity_id)?;
        Ok(Self {
            domain: entity_id.domain(),
            entity_id,
            state: record.state,
            attributes: record.attributes,
            last_changed: record.last_changed,
            last_updated: record.last_updated,
            context: record.context,
        })
    }
}

impl Entity {
    /// Start building an entity.
    #[must_use]
    pub fn builder() -> EntityBuilder {
        EntityBuilder::default()
    }

    /// Human readable name, falling back to the identifier.
    #[must_use]
    pub fn friendly_name(&self) -> &str {
        self.get_attribute("friendly_name")
            .and_then(AttributeValue::as_str)
            .unwrap_or_else(|| self.entity_id.as_str())
    }

    /// Look up an attribute by key.
    #[must_use]
    pub fn get_attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// Whether this copy was updated strictly after `other`.
    ///
    /// Returns `false` when either side lacks a timestamp.
    #[must_use]
    pub fn is_newer_than(&self, other: &Self) -> bool {
        match (self.last_updated, other.last_updated) {
            (Some(mine), Some(theirs)) => mine > theirs,
            _ => false,
        }
    }
}

/// Builder for [`Entity`], validating the identifier on [`build`](Self::build).
#[derive(Debug, Default)]
pub struct EntityBuilder {
    entity_id: Option<String>,
    state: EntityState,
    attributes: HashMap<String, AttributeValue>,
    last_changed: Option<Timestamp>,
    last_updated: Option<Timestamp>,
}

impl EntityBuilder {
    #[must_use]
    pub fn entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn state(mut self, state: impl Into<EntityState>) -> Self {
        self.state = state.into();
        self
    }

    #[must_use]
    pub fn friendly_name(self, name: impl Into<String>) -> Self {
        self.attribute("friendly_name", AttributeValue::String(name.into()))
    }

    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Set both `last_changed` and `last_updated`.
    #[must_use]
    pub fn updated_at(mut self, ts: Timestamp) -> Self {
        self.last_changed = Some(ts);
        self.last_updated = Some(ts);
        self
    }

    /// Build the entity.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when the identifier is missing or malformed.
    pub fn build(self) -> Result<Entity, ValidationError> {
        let entity_id = EntityId::new(self.entity_id.unwrap_or_default())?;
        Ok(Entity {
            domain: entity_id.domain(),
            entity_id,
            state: self.state,
            attributes: self.attributes,
            last_changed: self.last_changed,
            last_updated: self.last_updated,
            context: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_deserialize_hub_state_object() {
        let json = r#"{
            "entity_id": "lock.front_door",
            "state": "locked",
            "attributes": {"friendly_name": "Front Door", "supported_features": 0},
            "last_changed": "2024-05-01T10:00:00.123456+00:00",
            "last_updated": "2024-05-01T10:00:00.123456+00:00",
            "context": {"id": "01HX", "parent_id": null, "user_id": null}
        }"#;
        let entity: Entity = serde_json::from_str(json).unwrap();
        assert_eq!(entity.entity_id.as_str(), "lock.front_door");
        assert_eq!(entity.domain, Domain::Lock);
        assert_eq!(entity.state.as_str(), "locked");
        assert_eq!(entity.friendly_name(), "Front Door");
        assert!(entity.last_updated.is_some());
        assert_eq!(entity.context.unwrap().id, "01HX");
    }

    #[test]
    fn should_accept_minimal_state_object() {
        let json = r#"{"entity_id": "light.kitchen", "state": "on"}"#;
        let entity: Entity = serde_json::from_str(json).unwrap();
        assert_eq!(entity.domain, Domain::Light);
        assert!(entity.attributes.is_empty());
        assert!(entity.last_updated.is_none());
    }

    #[test]
    fn should_reject_state_object_with_malformed_id() {
        let json = r#"{"entity_id": "kitchen", "state": "on"}"#;
        assert!(serde_json::from_str::<Entity>(json).is_err());
    }

    #[test]
    fn should_fall_back_to_id_when_friendly_name_missing() {
        let entity = Entity::builder()
            .entity_id("sensor.temp")
            .state("21.5")
            .build()
            .unwrap();
        assert_eq!(entity.friendly_name(), "sensor.temp");
    }

    #[test]
    fn should_reject_builder_without_id() {
        assert_eq!(
            Entity::builder().build().unwrap_err(),
            ValidationError::EmptyEntityId
        );
    }

    #[test]
    fn should_compare_freshness_by_last_updated() {
        let older = Entity::builder()
            .entity_id("light.kitchen")
            .updated_at("2024-05-01T10:00:00Z".parse().unwrap())
            .build()
            .unwrap();
        let newer = Entity::builder()
            .entity_id("light.kitchen")
            .updated_at("2024-05-01T10:00:05Z".parse().unwrap())
            .build()
            .unwrap();
        assert!(newer.is_newer_than(&older));
        assert!(!older.is_newer_than(&newer));
        assert!(!older.is_newer_than(&older));
    }

    #[test]
    fn should_not_serialize_derived_domain() {
        let entity = Entity::builder()
            .entity_id("fan.bedroom")
            .state("off")
            .build()
            .unwrap();
        let value = serde_json::to_value(&entity).unwrap();
        assert!(value.get("domain").is_none());
        let back: Entity = serde_json::from_value(value).unwrap();
        assert_eq!(back, entity);
    }
}
