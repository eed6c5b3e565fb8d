//! Entity domain — the behaviour category named by the identifier prefix.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of an entity, computed once from its identifier prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Domain {
    Light,
    Switch,
    Lock,
    Sensor,
    BinarySensor,
    Camera,
    Climate,
    Fan,
    Cover,
    MediaPlayer,
    Person,
    DeviceTracker,
    Weather,
    Automation,
    Script,
    Scene,
    /// Any `input_*` helper domain (`input_boolean`, `input_number`, …).
    Input(String),
    Timer,
    Button,
    /// A domain this client has no dedicated handling for.
    Other(String),
}

impl Domain {
    /// The exact prefix text this domain was parsed from.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Light => "light",
            Self::Switch => "switch",
            Self::Lock => "lock",
            Self::Sensor => "sensor",
            Self::BinarySensor => "binary_sensor",
            Self::Camera => "camera",
            Self::Climate => "climate",
            Self::Fan => "fan",
            Self::Cover => "cover",
            Self::MediaPlayer => "media_player",
            Self::Person => "person",
            Self::DeviceTracker => "device_tracker",
            Self::Weather => "weather",
            Self::Automation => "automation",
            Self::Script => "script",
            Self::Scene => "scene",
            Self::Timer => "timer",
            Self::Button => "button",
            Self::Input(raw) | Self::Other(raw) => raw,
        }
    }

    /// Whether entities of this domain accept commands from the dashboard.
    #[must_use]
    pub fn is_controllable(&self) -> bool {
        matches!(
            self,
            Self::Light
                | Self::Switch
                | Self::Lock
                | Self::Climate
                | Self::Fan
                | Self::Cover
                | Self::MediaPlayer
                | Self::Automation
                | Self::Script
                | Self::Scene
                | Self::Input(_)
                | Self::Timer
                | Self::Button
        )
    }
}

impl From<&str> for Domain {
    fn from(value: &str) -> Self {
        match value {
            "light" => Self::Light,
            "switch" => Self::Switch,
            "lock" => Self::Lock,
            "sensor" => Self::Sensor,
            "binary_sensor" => Self::BinarySensor,
            "camera" => Self::Camera,
            "climate" => Self::Climate,
            "fan" => Self::Fan,
            "cover" => Self::Cover,
            "media_player" => Self::MediaPlayer,
            "person" => Self::Person,
            "device_tracker" => Self::DeviceTracker,
            "weather" => Self::Weather,
            "automation" => Self::Automation,
            "script" => Self::Script,
            "scene" => Self::Scene,
            "timer" => Self::Timer,
            "button" => Self::Button,
            other if other.starts_with("input_") => Self::Input(other.to_string()),
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for Domain {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<Domain> for String {
    fn from(domain: Domain) -> Self {
        domain.as_str().to_string()
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
