//! Engine-neutral rule representation.
//!
//! A rule is a conjunction of [`Condition`]s and an ordered list of
//! [`Action`]s. Adapters render this into their own wire format; the
//! in-process engine evaluates it directly.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::time::Duration;

use crate::model::{GroupId, RuleId, SceneId, SensorId, state_key};
use crate::status::StatusCode;

pub const MAX_RULE_NAME_LEN: usize = 32;
pub const MAX_CONDITIONS: usize = 8;
pub const MAX_ACTIONS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorAttr {
    Status,
    Presence,
    Dark,
    Daylight,
    ButtonEvent,
    LastUpdated,
}

impl SensorAttr {
    pub fn state_key(self) -> &'static str {
        match self {
            SensorAttr::Status => state_key::STATUS,
            SensorAttr::Presence => state_key::PRESENCE,
            SensorAttr::Dark => state_key::DARK,
            SensorAttr::Daylight => state_key::DAYLIGHT,
            SensorAttr::ButtonEvent => state_key::BUTTON_EVENT,
            SensorAttr::LastUpdated => state_key::LAST_UPDATED,
        }
    }

    pub fn from_state_key(key: &str) -> Option<Self> {
        match key {
            state_key::STATUS => Some(SensorAttr::Status),
            state_key::PRESENCE => Some(SensorAttr::Presence),
            state_key::DARK => Some(SensorAttr::Dark),
            state_key::DAYLIGHT => Some(SensorAttr::Daylight),
            state_key::BUTTON_EVENT => Some(SensorAttr::ButtonEvent),
            state_key::LAST_UPDATED => Some(SensorAttr::LastUpdated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupAttr {
    AnyOn,
    AllOn,
}

/// An observable attribute of a bridge resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Address {
    Sensor { sensor: SensorId, attr: SensorAttr },
    Group { group: GroupId, attr: GroupAttr },
}

impl Address {
    pub fn sensor(sensor: &SensorId, attr: SensorAttr) -> Self {
        Address::Sensor { sensor: sensor.clone(), attr }
    }

    pub fn status(sensor: &SensorId) -> Self {
        Self::sensor(sensor, SensorAttr::Status)
    }

    pub fn last_updated(sensor: &SensorId) -> Self {
        Self::sensor(sensor, SensorAttr::LastUpdated)
    }

    pub fn any_on(group: &GroupId) -> Self {
        Address::Group { group: group.clone(), attr: GroupAttr::AnyOn }
    }

    pub fn sensor_id(&self) -> Option<&SensorId> {
        match self {
            Address::Sensor { sensor, .. } => Some(sensor),
            Address::Group { .. } => None,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Sensor { sensor, attr } => write!(f, "sensors/{sensor}/{attr:?}"),
            Address::Group { group, attr } => write!(f, "groups/{group}/{attr:?}"),
        }
    }
}

/// A local wall-clock window; `end` before `start` means it spans midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= t && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M:%S"), self.end.format("%H:%M:%S"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    Equals { address: Address, value: Value },
    NotEquals { address: Address, value: Value },
    LessThan { address: Address, value: i64 },
    GreaterThan { address: Address, value: i64 },
    /// True only while evaluating the change of `address` itself.
    Changed { address: Address },
    /// True once `address` has stayed unchanged for `delay` after a change.
    ChangedDelayed { address: Address, delay: Duration },
    InWindow { window: TimeWindow },
    NotInWindow { window: TimeWindow },
}

impl Condition {
    pub fn status_is<S: StatusCode>(sensor: &SensorId, status: S) -> Self {
        Condition::Equals { address: Address::status(sensor), value: json!(status.code()) }
    }

    pub fn flag(sensor: &SensorId, attr: SensorAttr, value: bool) -> Self {
        Condition::Equals { address: Address::sensor(sensor, attr), value: json!(value) }
    }

    pub fn button_is(switch: &SensorId, code: i64) -> Self {
        Condition::Equals {
            address: Address::sensor(switch, SensorAttr::ButtonEvent),
            value: json!(code),
        }
    }

    pub fn any_on(group: &GroupId, on: bool) -> Self {
        Condition::Equals { address: Address::any_on(group), value: json!(on) }
    }

    pub fn changed(address: Address) -> Self {
        Condition::Changed { address }
    }

    pub fn stable_for(address: Address, delay: Duration) -> Self {
        Condition::ChangedDelayed { address, delay }
    }

    pub fn address(&self) -> Option<&Address> {
        match self {
            Condition::Equals { address, .. }
            | Condition::NotEquals { address, .. }
            | Condition::LessThan { address, .. }
            | Condition::GreaterThan { address, .. }
            | Condition::Changed { address }
            | Condition::ChangedDelayed { address, .. } => Some(address),
            Condition::InWindow { .. } | Condition::NotInWindow { .. } => None,
        }
    }

    pub fn window(&self) -> Option<&TimeWindow> {
        match self {
            Condition::InWindow { window } | Condition::NotInWindow { window } => Some(window),
            _ => None,
        }
    }

    pub fn delay(&self) -> Option<Duration> {
        match self {
            Condition::ChangedDelayed { delay, .. } => Some(*delay),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    SetStatus { sensor: SensorId, status: i64 },
    ApplyScene { group: GroupId, scene: SceneId, transition: Duration },
    SetPower { group: GroupId, on: bool },
    IncrementBrightness { group: GroupId, delta: i16, transition: Duration },
    /// Capture the current light states of the scene's group into the scene.
    StoreLightState { scene: SceneId },
}

impl Action {
    pub fn set_status<S: StatusCode>(sensor: &SensorId, status: S) -> Self {
        Action::SetStatus { sensor: sensor.clone(), status: status.code() }
    }

    pub fn apply_scene(group: &GroupId, scene: &SceneId) -> Self {
        Action::ApplyScene { group: group.clone(), scene: scene.clone(), transition: Duration::ZERO }
    }

    pub fn power(group: &GroupId, on: bool) -> Self {
        Action::SetPower { group: group.clone(), on }
    }
}

/// A rule as listed by a bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default)]
    pub recycle: bool,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
}

/// A rule about to be created.
///
/// `exclusive_group` never leaves the process: rules sharing a group must
/// never fire conflicting actions on the same event, which
/// `automations::ruleset` checks before anything is uploaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRule {
    pub name: String,
    #[serde(default)]
    pub recycle: bool,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    #[serde(skip)]
    pub exclusive_group: Option<String>,
}

impl NewRule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            recycle: false,
            conditions: Vec::new(),
            actions: Vec::new(),
            exclusive_group: None,
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn then(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn exclusive_in(mut self, group: impl Into<String>) -> Self {
        self.exclusive_group = Some(group.into());
        self
    }

    pub fn into_rule(self, id: RuleId, owner: Option<String>) -> Rule {
        Rule {
            id,
            name: self.name,
            owner,
            recycle: self.recycle,
            conditions: self.conditions,
            actions: self.actions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::MotionStatus;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn window_spanning_midnight() {
        let w = TimeWindow::new(t(22, 20), t(8, 0));
        assert!(w.contains(t(23, 0)));
        assert!(w.contains(t(0, 0)));
        assert!(w.contains(t(7, 59)));
        assert!(!w.contains(t(8, 0)));
        assert!(!w.contains(t(12, 0)));
        assert!(w.contains(t(22, 20)));
    }

    #[test]
    fn window_within_a_day() {
        let w = TimeWindow::new(t(9, 0), t(17, 0));
        assert!(w.contains(t(9, 0)));
        assert!(!w.contains(t(17, 0)));
        assert!(!w.contains(t(3, 0)));
    }

    #[test]
    fn status_condition_uses_wire_code() {
        let s = SensorId::from("12");
        let c = Condition::status_is(&s, MotionStatus::Dimmed);
        assert_eq!(c, Condition::Equals { address: Address::status(&s), value: json!(3) });
    }

    #[test]
    fn exclusive_group_is_not_serialized() {
        let rule = NewRule::new("a").exclusive_in("room/motion");
        let v = serde_json::to_value(&rule).unwrap();
        assert!(v.get("exclusive_group").is_none());
    }
}
