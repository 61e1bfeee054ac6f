use std::time::Duration;

use bridge_core::{
    model::{GroupId, SceneId, SensorId},
    rule::TimeWindow,
};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::scenes::SceneTable;

pub const DEFAULT_OFF_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_IDLE_RESET: Duration = Duration::from_secs(330);

/// Button event codes of the physical dimmer switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonMap {
    pub activity_next: i64,
    pub brightness_up: i64,
    pub brightness_down: i64,
    pub late_night_toggle: i64,
    pub all_off: i64,
}

impl Default for ButtonMap {
    fn default() -> Self {
        Self {
            activity_next: 1002,
            brightness_up: 2002,
            brightness_down: 3002,
            late_night_toggle: 4002,
            all_off: 4003,
        }
    }
}

pub fn default_late_night_window() -> TimeWindow {
    TimeWindow::new(
        NaiveTime::from_hms_opt(22, 20, 0).unwrap_or_default(),
        NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
    )
}

/// Global status sensors shared by every room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisSensors {
    pub late_night: SensorId,
    pub activity: SensorId,
    pub brightness: SensorId,
}

/// Everything the rule compiler needs to know about one room.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomBinding {
    pub name: String,
    /// Prepended to every rule name; keep it short, names are capped.
    pub prefix: String,
    pub group: GroupId,
    pub presence: SensorId,
    pub light_level: SensorId,
    pub status: SensorId,
    pub scene_set: SensorId,
    pub stored_scene: SceneId,
    pub dim_delay: Duration,
    pub off_delay: Duration,
    pub scene_reset_delay: Duration,
    pub scenes: SceneTable,
}

impl RoomBinding {
    pub fn rule_name(&self, suffix: &str) -> String {
        format!("{} {}", self.prefix, suffix)
    }

    pub fn exclusive_group(&self, transition_group: &str) -> String {
        format!("{}/{}", self.name, transition_group)
    }
}

/// Fully resolved input of [`crate::compile`].
#[derive(Debug, Clone, PartialEq)]
pub struct Bindings {
    pub zone: GroupId,
    pub daylight: SensorId,
    pub switch: SensorId,
    pub buttons: ButtonMap,
    pub late_night_window: TimeWindow,
    pub idle_reset: Duration,
    pub axes: AxisSensors,
    pub rooms: Vec<RoomBinding>,
}

impl Bindings {
    pub fn scene_set_flags(&self) -> impl Iterator<Item = &SensorId> {
        self.rooms.iter().map(|r| &r.scene_set)
    }
}
