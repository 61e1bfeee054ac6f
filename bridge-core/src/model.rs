use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

macro_rules! resource_id {
    ($name:ident) => {
        #[repr(transparent)]
        #[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

resource_id!(GroupId);
resource_id!(SensorId);
resource_id!(SceneId);
resource_id!(RuleId);

/// Sensor state keys as the bridge names them.
pub mod state_key {
    pub const STATUS: &str = "status";
    pub const PRESENCE: &str = "presence";
    pub const DARK: &str = "dark";
    pub const DAYLIGHT: &str = "daylight";
    pub const BUTTON_EVENT: &str = "buttonevent";
    pub const LAST_UPDATED: &str = "lastupdated";
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Room,
    Zone,
    LightGroup,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub kind: GroupKind,
    #[serde(default)]
    pub lights: Vec<String>,
    #[serde(default)]
    pub any_on: bool,
    #[serde(default)]
    pub all_on: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Presence,
    LightLevel,
    Daylight,
    Switch,
    GenericStatus,
    Other,
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SensorKind::Presence => "presence",
            SensorKind::LightLevel => "light level",
            SensorKind::Daylight => "daylight",
            SensorKind::Switch => "switch",
            SensorKind::GenericStatus => "generic status",
            SensorKind::Other => "other",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sensor {
    pub id: SensorId,
    pub name: String,
    pub kind: SensorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub state: BTreeMap<String, serde_json::Value>,
}

impl Sensor {
    pub fn status(&self) -> Option<i64> {
        self.state.get(state_key::STATUS).and_then(serde_json::Value::as_i64)
    }

    pub fn presence(&self) -> Option<bool> {
        self.state.get(state_key::PRESENCE).and_then(serde_json::Value::as_bool)
    }

    pub fn last_updated(&self) -> Option<&str> {
        self.state.get(state_key::LAST_UPDATED).and_then(serde_json::Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LightState {
    pub on: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,
}

impl LightState {
    pub const FULL: LightState = LightState { on: true, bri: Some(254) };
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scene {
    pub id: SceneId,
    pub name: String,
    pub group: GroupId,
    #[serde(default)]
    pub light_states: BTreeMap<String, LightState>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewScene {
    pub name: String,
    pub group: GroupId,
    pub light_states: BTreeMap<String, LightState>,
}

/// A software sensor holding one integer status, written only by rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewStatusSensor {
    pub name: String,
    pub unique_id: String,
    pub manufacturer: String,
    pub model_id: String,
    pub sw_version: String,
    pub status: i64,
}
