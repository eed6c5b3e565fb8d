//! Service call — a command the dashboard asks the hub to perform.
//!
//! Examples: `lock.unlock`, `light.toggle`, `climate.set_temperature`.

use serde_json::{Map, Value};

use crate::entity::Domain;
use crate::error::ValidationError;
use crate::id::EntityId;

/// A single action targeted at one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCall {
    pub domain: Domain,
    pub service: String,
    pub target: EntityId,
    /// Extra `service_data` fields merged next to `entity_id`.
    pub data: Map<String, Value>,
}

impl ServiceCall {
    /// Build a call for `domain.service` on `target`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyService`] for a blank service name.
    pub fn new(
        domain: Domain,
        service: impl Into<String>,
        target: EntityId,
    ) -> Result<Self, ValidationError> {
        let service = service.into();
        if service.trim().is_empty() {
            return Err(ValidationError::EmptyService);
        }
        Ok(Self {
            domain,
            service,
            target,
            data: Map::new(),
        })
    }

    /// Build a call whose domain is the target's own domain (`lock.unlock` on `lock.front_door`).
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyService`] for a blank service name.
    pub fn for_entity(
        target: EntityId,
        service: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Self::new(target.domain(), service, target)
    }

    /// Attach extra service data. A key named `entity_id` is ignored.
    #[must_use]
    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self.data.remove("entity_id");
        self
    }

    /// The `service_data` object sent to the hub: `{entity_id, ...extra}`.
    #[must_use]
    pub fn service_data(&self) -> Map<String, Value> {
        let mut out = self.data.clone();
        out.insert(
            "entity_id".to_string(),
            Value::String(self.target.to_string()),
        );
        out
    }
}

impl std::fmt::Display for ServiceCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{} -> {}", self.domain, self.service, self.target)
    }
}
