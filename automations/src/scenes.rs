//! Scene selection: which scene a room gets when it should light up.
//!
//! A room in `SHOULD_TRIGGER_SCENE` whose scene-set flag is clear gets the
//! scene keyed by the current activity and day cycle. The candidate rules
//! carry pairwise contradictory guards, so at most one of them matches any
//! state. Once a scene is applied the flag is set, and the brightness
//! preference is applied on top of it.

use std::collections::BTreeMap;
use std::time::Duration;

use bridge_core::{
    model::SceneId,
    rule::{Action, Address, Condition, NewRule, SensorAttr},
    status::{Activity, BrightnessLevel, DayCycle, LateNightStatus, MotionStatus, SceneSetStatus},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::bindings::{Bindings, RoomBinding};
use crate::fsm::TransitionGroup;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCycleScenes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<SceneId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub early_night: Option<SceneId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub late_night: Option<SceneId>,
}

impl DayCycleScenes {
    pub fn get(&self, cycle: DayCycle) -> Option<&SceneId> {
        match cycle {
            DayCycle::Day => self.day.as_ref(),
            DayCycle::EarlyNight => self.early_night.as_ref(),
            DayCycle::LateNight => self.late_night.as_ref(),
        }
    }
}

/// Scenes of one room, keyed by day cycle and optionally by activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneTable {
    ByDayCycle(DayCycleScenes),
    ByActivity(BTreeMap<Activity, DayCycleScenes>),
}

impl SceneTable {
    /// The scene for a state; `activity` is ignored by day-cycle-only tables.
    pub fn select(&self, activity: Activity, cycle: DayCycle) -> Option<&SceneId> {
        match self {
            SceneTable::ByDayCycle(scenes) => scenes.get(cycle),
            SceneTable::ByActivity(by_activity) => {
                by_activity.get(&activity).and_then(|s| s.get(cycle))
            }
        }
    }

    /// Every key the table could be asked for, with its scene if present.
    pub fn keys(&self) -> Vec<(Option<Activity>, DayCycle)> {
        match self {
            SceneTable::ByDayCycle(_) => DayCycle::ALL.iter().map(|c| (None, *c)).collect(),
            SceneTable::ByActivity(_) => Activity::CYCLE
                .iter()
                .flat_map(|a| DayCycle::ALL.iter().map(move |c| (Some(*a), *c)))
                .collect(),
        }
    }
}

fn day_cycle_guards(bindings: &Bindings, cycle: DayCycle) -> Vec<Condition> {
    let daylight = |on| Condition::flag(&bindings.daylight, SensorAttr::Daylight, on);
    let late = |s| Condition::status_is(&bindings.axes.late_night, s);
    match cycle {
        DayCycle::Day => vec![daylight(true)],
        DayCycle::EarlyNight => vec![daylight(false), late(LateNightStatus::NotLateNight)],
        DayCycle::LateNight => vec![daylight(false), late(LateNightStatus::IsLateNight)],
    }
}

fn selection_rule(
    bindings: &Bindings,
    room: &RoomBinding,
    activity: Option<Activity>,
    cycle: DayCycle,
    scene: &SceneId,
) -> NewRule {
    let label = match activity {
        Some(a) => format!("{} {}", a.short_name(), cycle.short_name()),
        None => cycle.short_name().to_string(),
    };
    let mut rule = NewRule::new(room.rule_name(&label))
        .exclusive_in(room.exclusive_group(TransitionGroup::Selection.as_str()))
        .when(Condition::status_is(&room.status, MotionStatus::ShouldTriggerScene))
        .when(Condition::changed(Address::last_updated(&room.status)))
        .when(Condition::status_is(&room.scene_set, SceneSetStatus::NotSet));
    if let Some(a) = activity {
        rule = rule.when(Condition::status_is(&bindings.axes.activity, a));
    }
    for guard in day_cycle_guards(bindings, cycle) {
        rule = rule.when(guard);
    }
    rule.then(Action::apply_scene(&room.group, scene))
        .then(Action::set_status(&room.scene_set, SceneSetStatus::Set))
        .then(Action::set_status(&room.status, MotionStatus::SceneTriggered))
}

/// One candidate rule per present table entry.
///
/// Missing entries produce no rule: the room stays dark in that state.
pub fn selection_rules(bindings: &Bindings, room: &RoomBinding) -> Vec<NewRule> {
    let mut rules = Vec::new();
    let mut missing = Vec::new();
    for (activity, cycle) in room.scenes.keys() {
        let scene = match activity {
            Some(a) => room.scenes.select(a, cycle),
            None => room.scenes.select(Activity::Normal, cycle),
        };
        match scene {
            Some(scene) => rules.push(selection_rule(bindings, room, activity, cycle, scene)),
            None => missing.push(match activity {
                Some(a) => format!("{a}/{cycle}"),
                None => cycle.to_string(),
            }),
        }
    }
    if !missing.is_empty() {
        warn!(room = %room.name, missing = %missing.join(", "), "no scene for some states");
    }
    rules
}

/// Applies the brightness preference right after a full scene was set.
pub fn brightness_rules(bindings: &Bindings, room: &RoomBinding) -> Vec<NewRule> {
    BrightnessLevel::LADDER
        .iter()
        .filter(|l| l.increment() != 0)
        .map(|level| {
            NewRule::new(room.rule_name(&format!("bri {level}")))
                .exclusive_in(room.exclusive_group("brightness"))
                .when(Condition::changed(Address::status(&room.scene_set)))
                .when(Condition::status_is(&room.scene_set, SceneSetStatus::Set))
                .when(Condition::status_is(&bindings.axes.brightness, *level))
                .then(Action::IncrementBrightness {
                    group: room.group.clone(),
                    delta: level.increment(),
                    transition: Duration::ZERO,
                })
        })
        .collect()
}

/// Clears the scene-set flag once the room has been dark for a while.
pub fn reset_rule(room: &RoomBinding) -> NewRule {
    NewRule::new(room.rule_name("scene reset"))
        .when(Condition::any_on(&room.group, false))
        .when(Condition::stable_for(Address::any_on(&room.group), room.scene_reset_delay))
        .then(Action::set_status(&room.scene_set, SceneSetStatus::NotSet))
}

pub fn room_rules(bindings: &Bindings, room: &RoomBinding) -> Vec<NewRule> {
    let mut rules = selection_rules(bindings, room);
    rules.extend(brightness_rules(bindings, room));
    rules.push(reset_rule(room));
    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bindings, living_room};
    use serde_json::json;

    #[test]
    fn day_cycle_table_yields_three_candidates() {
        let b = bindings();
        let kitchen = &b.rooms[0];
        assert_eq!(selection_rules(&b, kitchen).len(), 3);
    }

    #[test]
    fn activity_table_skips_missing_entries() {
        let b = bindings();
        let room = living_room();
        // normal and relax have all three cycles, the rest are absent
        assert_eq!(selection_rules(&b, &room).len(), 6);
    }

    #[test]
    fn table_parses_from_json() {
        let table: SceneTable = serde_json::from_value(json!({
            "by_activity": {
                "normal": { "day": "a", "early_night": "b", "late_night": "c" },
                "relax": { "early_night": "d" }
            }
        }))
        .unwrap();
        assert_eq!(table.select(Activity::Relax, DayCycle::EarlyNight), Some(&SceneId::from("d")));
        assert_eq!(table.select(Activity::Relax, DayCycle::Day), None);
        assert_eq!(table.select(Activity::Tv, DayCycle::Day), None);
    }

    #[test]
    fn selection_marks_the_period_and_triggers() {
        let b = bindings();
        let room = &b.rooms[0];
        let rules = selection_rules(&b, room);
        let night = rules.iter().find(|r| r.name == "Kök night").unwrap();
        assert_eq!(
            night.actions[1..],
            [
                Action::set_status(&room.scene_set, SceneSetStatus::Set),
                Action::set_status(&room.status, MotionStatus::SceneTriggered),
            ]
        );
    }

    #[test]
    fn neutral_brightness_needs_no_rule() {
        let b = bindings();
        assert_eq!(brightness_rules(&b, &b.rooms[0]).len(), 4);
    }
}
