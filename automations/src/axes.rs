//! Global axes: late night, activity and brightness.
//!
//! Each axis is a status sensor moved by the dimmer switch (and, for late
//! night, by a schedule). When an axis moves while a room is lit, the room
//! is sent back to `SHOULD_TRIGGER_SCENE` so selection runs again.

use bridge_core::{
    model::SensorId,
    rule::{Action, Address, Condition, NewRule, SensorAttr},
    status::{Activity, BrightnessLevel, LateNightStatus, MotionStatus, SceneSetStatus},
};

use crate::bindings::Bindings;
use crate::ruleset::split_actions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    LateNight,
    Activity,
    Brightness,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::LateNight, Axis::Activity, Axis::Brightness];

    pub fn sensor(self, bindings: &Bindings) -> &SensorId {
        match self {
            Axis::LateNight => &bindings.axes.late_night,
            Axis::Activity => &bindings.axes.activity,
            Axis::Brightness => &bindings.axes.brightness,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Axis::LateNight => "late night",
            Axis::Activity => "activity",
            Axis::Brightness => "brightness",
        }
    }
}

fn pressed(bindings: &Bindings, code: i64) -> [Condition; 2] {
    [
        Condition::button_is(&bindings.switch, code),
        Condition::changed(Address::last_updated(&bindings.switch)),
    ]
}

pub fn late_night_rules(bindings: &Bindings) -> Vec<NewRule> {
    let sensor = &bindings.axes.late_night;
    let window = bindings.late_night_window;
    let group = Axis::LateNight.label();
    let mut rules = vec![
        NewRule::new("late night start")
            .exclusive_in(group)
            .when(Condition::InWindow { window })
            .then(Action::set_status(sensor, LateNightStatus::IsLateNight)),
        NewRule::new("late night end")
            .exclusive_in(group)
            .when(Condition::NotInWindow { window })
            .then(Action::set_status(sensor, LateNightStatus::NotLateNight)),
    ];
    for current in LateNightStatus::ALL {
        let [button, press] = pressed(bindings, bindings.buttons.late_night_toggle);
        rules.push(
            NewRule::new(format!("late night from {current}"))
                .exclusive_in(group)
                .when(button)
                .when(press)
                .when(Condition::status_is(sensor, *current))
                .then(Action::set_status(sensor, current.toggled())),
        );
    }
    rules
}

/// Round robin: the last activity wraps to the first.
pub fn activity_rules(bindings: &Bindings) -> Vec<NewRule> {
    let sensor = &bindings.axes.activity;
    Activity::CYCLE
        .iter()
        .map(|current| {
            let [button, press] = pressed(bindings, bindings.buttons.activity_next);
            NewRule::new(format!("activity from {current}"))
                .exclusive_in(Axis::Activity.label())
                .when(button)
                .when(press)
                .when(Condition::status_is(sensor, *current))
                .then(Action::set_status(sensor, current.next()))
        })
        .collect()
}

/// A ladder that saturates: no rule leaves either end outwards.
pub fn brightness_rules(bindings: &Bindings) -> Vec<NewRule> {
    let sensor = &bindings.axes.brightness;
    let mut rules = Vec::new();
    for current in BrightnessLevel::LADDER {
        let steps = [
            ("up", bindings.buttons.brightness_up, current.step_up()),
            ("down", bindings.buttons.brightness_down, current.step_down()),
        ];
        for (dir, code, next) in steps {
            let Some(next) = next else { continue };
            let [button, press] = pressed(bindings, code);
            rules.push(
                NewRule::new(format!("bri {dir} from {current}"))
                    .exclusive_in(Axis::Brightness.label())
                    .when(button)
                    .when(press)
                    .when(Condition::status_is(sensor, current))
                    .then(Action::set_status(sensor, next)),
            );
        }
    }
    rules
}

/// Sends lit rooms back to scene selection when an axis moves.
pub fn retrigger_rules(bindings: &Bindings) -> Vec<NewRule> {
    let mut rules = Vec::new();
    for axis in Axis::ALL {
        for room in &bindings.rooms {
            rules.push(
                NewRule::new(room.rule_name(&format!("re {}", axis.label())))
                    .exclusive_in(room.exclusive_group("retrigger"))
                    .when(Condition::changed(Address::status(axis.sensor(bindings))))
                    .when(Condition::status_is(&room.status, MotionStatus::SceneTriggered))
                    .when(Condition::any_on(&room.group, true))
                    .then(Action::set_status(&room.status, MotionStatus::ShouldTriggerScene)),
            );
        }
    }
    rules
}

/// A new period starts whenever anything that picks the scene changes.
pub fn period_reset_rules(bindings: &Bindings) -> Vec<NewRule> {
    let mut triggers: Vec<(String, Address)> = Axis::ALL
        .iter()
        .map(|axis| (axis.label().to_string(), Address::status(axis.sensor(bindings))))
        .collect();
    triggers.push(("daylight".into(), Address::sensor(&bindings.daylight, SensorAttr::Daylight)));

    triggers
        .into_iter()
        .flat_map(|(label, address)| {
            let rule = bindings.scene_set_flags().fold(
                NewRule::new(format!("new period {label}")).when(Condition::changed(address)),
                |rule, flag| rule.then(Action::set_status(flag, SceneSetStatus::NotSet)),
            );
            split_actions(rule)
        })
        .collect()
}

pub fn rules(bindings: &Bindings) -> Vec<NewRule> {
    let mut rules = late_night_rules(bindings);
    rules.extend(activity_rules(bindings));
    rules.extend(brightness_rules(bindings));
    rules.extend(retrigger_rules(bindings));
    rules.extend(period_reset_rules(bindings));
    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::bindings;

    #[test]
    fn brightness_ladder_has_no_rule_past_the_ends() {
        let b = bindings();
        let rules = brightness_rules(&b);
        // four steps up, four steps down
        assert_eq!(rules.len(), 8);
        assert!(rules.iter().all(|r| r.name != "bri up from very bright"));
        assert!(rules.iter().all(|r| r.name != "bri down from very dimmed"));
    }

    #[test]
    fn activity_wraps_from_last_to_first() {
        let b = bindings();
        let rules = activity_rules(&b);
        assert_eq!(rules.len(), Activity::CYCLE.len());
        let from_tv = rules.iter().find(|r| r.name == "activity from tv").unwrap();
        assert_eq!(from_tv.actions, vec![Action::set_status(&b.axes.activity, Activity::Normal)]);
    }

    #[test]
    fn retrigger_covers_every_axis_and_room() {
        let b = bindings();
        assert_eq!(retrigger_rules(&b).len(), Axis::ALL.len() * b.rooms.len());
    }

    #[test]
    fn period_reset_clears_every_room_flag() {
        let b = bindings();
        let rules = period_reset_rules(&b);
        assert_eq!(rules.len(), 4);
        for rule in rules {
            assert_eq!(rule.actions.len(), b.rooms.len());
        }
    }
}
