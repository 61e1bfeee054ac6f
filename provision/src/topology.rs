//! The home as the operator describes it: rooms, resource ids, scene tables
//! and timings. Durations are whole seconds.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use automations::{
    ButtonMap, SceneTable,
    bindings::{DEFAULT_IDLE_RESET, DEFAULT_OFF_DELAY, default_late_night_window},
};
use bridge_core::{
    model::{GroupId, SceneId, SensorId},
    rule::TimeWindow,
};
use serde::{Deserialize, Serialize};

fn default_off_delay_secs() -> u64 {
    DEFAULT_OFF_DELAY.as_secs()
}

fn default_idle_reset_secs() -> u64 {
    DEFAULT_IDLE_RESET.as_secs()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomTopology {
    pub name: String,
    /// Short tag in front of every rule of the room.
    pub prefix: String,
    pub group: GroupId,
    pub presence: SensorId,
    pub light_level: SensorId,
    pub dim_delay_secs: u64,
    #[serde(default = "default_off_delay_secs")]
    pub off_delay_secs: u64,
    /// Defaults to the dim delay.
    #[serde(default)]
    pub scene_reset_secs: Option<u64>,
    pub scenes: SceneTable,
    /// Light ids, only used to seed an in-memory bridge.
    #[serde(default)]
    pub lights: Vec<String>,
}

impl RoomTopology {
    pub fn dim_delay(&self) -> Duration {
        Duration::from_secs(self.dim_delay_secs)
    }

    pub fn off_delay(&self) -> Duration {
        Duration::from_secs(self.off_delay_secs)
    }

    pub fn scene_reset_delay(&self) -> Duration {
        Duration::from_secs(self.scene_reset_secs.unwrap_or(self.dim_delay_secs))
    }
}

/// One hour band of an auto scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoStep {
    /// Last hour of the day (0 to 23) the step covers.
    pub until_hour: u32,
    pub bri: u8,
    /// When set, that many lights picked at random are on and the rest off.
    /// Otherwise every light keeps its on flag.
    #[serde(default)]
    pub lights_on: Option<usize>,
}

/// A scene whose content is rewritten by hour of day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoScene {
    /// Room name or prefix.
    pub room: String,
    pub scene: SceneId,
    /// Ascending by `until_hour`; hours past the last step use the last one.
    pub steps: Vec<AutoStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    /// Group holding every light of the home.
    pub zone: GroupId,
    pub daylight: SensorId,
    pub switch: SensorId,
    #[serde(default)]
    pub buttons: ButtonMap,
    #[serde(default = "default_late_night_window")]
    pub late_night: TimeWindow,
    #[serde(default = "default_idle_reset_secs")]
    pub idle_reset_secs: u64,
    pub rooms: Vec<RoomTopology>,
    #[serde(default)]
    pub auto_scenes: Vec<AutoScene>,
}

impl Topology {
    pub fn from_json(json: &str) -> Result<Self> {
        let topology: Topology = serde_json::from_str(json).context("parse topology")?;
        topology.check()?;
        Ok(topology)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("read topology {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("load topology {}", path.display()))
    }

    pub fn idle_reset(&self) -> Duration {
        Duration::from_secs(self.idle_reset_secs)
    }

    pub fn room(&self, name: &str) -> Option<&RoomTopology> {
        self.rooms.iter().find(|r| r.name == name || r.prefix == name)
    }

    fn check(&self) -> Result<()> {
        if self.rooms.is_empty() {
            bail!("topology has no rooms");
        }
        for (i, room) in self.rooms.iter().enumerate() {
            if room.prefix.trim().is_empty() {
                bail!("room {:?} has an empty prefix", room.name);
            }
            if room.dim_delay_secs == 0 || room.off_delay_secs == 0 {
                bail!("room {:?} needs non-zero delays", room.name);
            }
            if self.rooms[..i].iter().any(|r| r.prefix == room.prefix) {
                bail!("room prefix {:?} is used twice", room.prefix);
            }
        }
        for auto in &self.auto_scenes {
            if self.room(&auto.room).is_none() {
                bail!("auto scene {} names unknown room {:?}", auto.scene, auto.room);
            }
            if auto.steps.is_empty() {
                bail!("auto scene {} has no steps", auto.scene);
            }
            if auto.steps.iter().any(|s| s.until_hour > 23)
                || auto.steps.windows(2).any(|w| w[0].until_hour >= w[1].until_hour)
            {
                bail!("auto scene {} needs ascending hours from 0 to 23", auto.scene);
            }
        }
        Ok(())
    }
}
