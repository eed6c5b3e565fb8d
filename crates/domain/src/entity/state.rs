//! Entity state — the hub-defined status string.

use serde::{Deserialize, Serialize};

/// Opaque status string reported by the hub (`"on"`, `"locked"`, `"21.5"`, …).
///
/// The client never interprets it beyond the reachability check below;
/// meaning belongs to the components that render it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityState(String);

impl EntityState {
    /// Status the hub reports for an unreachable entity.
    pub const UNAVAILABLE: &'static str = "unavailable";
    /// Status the hub reports before an entity has a value.
    pub const UNKNOWN: &'static str = "unknown";

    /// Wrap a status string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the entity is reachable (anything but `unavailable`).
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.0 != Self::UNAVAILABLE
    }
}

impl Default for EntityState {
    fn default() -> Self {
        Self::new(Self::UNKNOWN)
    }
}

impl From<&str> for EntityState {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl std::fmt::Display for EntityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_report_available_for_domain_specific_states() {
        assert!(EntityState::from("locked").is_available());
        assert!(EntityState::from("on").is_available());
        assert!(EntityState::from("unknown").is_available());
    }

    #[test]
    fn should_report_unavailable_when_state_is_unavailable() {
        assert!(!EntityState::from("unavailable").is_available());
    }

    #[test]
    fn should_default_to_unknown() {
        assert_eq!(EntityState::default().as_str(), "unknown");
    }

    #[test]
    fn should_serialize_as_plain_string() {
        let json = serde_json::to_string(&EntityState::from("off")).unwrap();
        assert_eq!(json, "\"off\"");
    }
}
