use std::time::Duration;

use bridge_core::rule::{Action, Address, Condition, NewRule, SensorAttr};

use crate::bindings::RoomBinding;
use crate::fsm::{Delay, Effect, Guard, MOTION_TABLE, Transition};

/// Brightness step taken when a room goes to standby.
pub const DIM_STANDBY_DELTA: i16 = -128;
pub const DIM_TRANSITION: Duration = Duration::from_secs(3);

fn delay(room: &RoomBinding, d: Delay) -> Duration {
    match d {
        Delay::Dim => room.dim_delay,
        Delay::Off => room.off_delay,
    }
}

fn bind_guard(room: &RoomBinding, guard: Guard) -> Condition {
    let presence = Address::sensor(&room.presence, SensorAttr::Presence);
    match guard {
        Guard::Status(s) => Condition::status_is(&room.status, s),
        Guard::StatusWritten => Condition::changed(Address::last_updated(&room.status)),
        Guard::StatusStableFor(d) => {
            Condition::stable_for(Address::last_updated(&room.status), delay(room, d))
        }
        Guard::Presence(on) => Condition::flag(&room.presence, SensorAttr::Presence, on),
        Guard::PresenceChanged => Condition::changed(presence),
        Guard::PresenceReported => Condition::changed(Address::last_updated(&room.presence)),
        Guard::PresenceStableFor(d) => Condition::stable_for(presence, delay(room, d)),
        Guard::Dark(dark) => Condition::flag(&room.light_level, SensorAttr::Dark, dark),
        Guard::DarkChanged => {
            Condition::changed(Address::sensor(&room.light_level, SensorAttr::Dark))
        }
        Guard::GroupAnyOn(on) => Condition::any_on(&room.group, on),
        Guard::SceneSet(s) => Condition::status_is(&room.scene_set, s),
    }
}

fn bind_effect(room: &RoomBinding, effect: Effect) -> Action {
    match effect {
        Effect::StoreLightState => Action::StoreLightState { scene: room.stored_scene.clone() },
        Effect::DimToStandby => Action::IncrementBrightness {
            group: room.group.clone(),
            delta: DIM_STANDBY_DELTA,
            transition: DIM_TRANSITION,
        },
        Effect::PowerOff => Action::power(&room.group, false),
        Effect::RestoreStoredScene => Action::apply_scene(&room.group, &room.stored_scene),
    }
}

/// Binds one transition of the table to a room.
pub fn transition_rule(room: &RoomBinding, t: &Transition) -> NewRule {
    let mut rule =
        NewRule::new(room.rule_name(t.name)).exclusive_in(room.exclusive_group(t.group.as_str()));
    if let Some(from) = t.from {
        rule = rule.when(Condition::status_is(&room.status, from));
    }
    for guard in t.guards {
        rule = rule.when(bind_guard(room, *guard));
    }
    for effect in t.effects {
        rule = rule.then(bind_effect(room, *effect));
    }
    rule.then(Action::set_status(&room.status, t.to))
}

/// The motion lifecycle of one room.
pub fn room_rules(room: &RoomBinding) -> Vec<NewRule> {
    MOTION_TABLE.iter().map(|t| transition_rule(room, t)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::kitchen;
    use bridge_core::rule::MAX_CONDITIONS;
    use bridge_core::status::MotionStatus;

    #[test]
    fn one_rule_per_transition() {
        let rules = room_rules(&kitchen());
        assert_eq!(rules.len(), MOTION_TABLE.len());
        assert!(rules.iter().all(|r| r.conditions.len() <= MAX_CONDITIONS));
        assert!(rules.iter().all(|r| r.name.starts_with("Kök ")));
    }

    #[test]
    fn dim_rule_waits_on_the_room_delay() {
        let room = kitchen();
        let rules = room_rules(&room);
        let dim = rules.iter().find(|r| r.name == "Kök dim presence").unwrap();
        assert!(dim.conditions.contains(&Condition::ChangedDelayed {
            address: Address::sensor(&room.presence, SensorAttr::Presence),
            delay: room.dim_delay,
        }));
        assert_eq!(dim.actions[0], Action::StoreLightState { scene: room.stored_scene.clone() });
        assert_eq!(dim.actions.last(), Some(&Action::set_status(&room.status, MotionStatus::Dimmed)));
    }

    #[test]
    fn arm_rule_has_no_status_guard() {
        let room = kitchen();
        let rules = room_rules(&room);
        let arm = rules.iter().find(|r| r.name == "Kök arm").unwrap();
        assert_eq!(
            arm.conditions,
            vec![
                Condition::flag(&room.presence, SensorAttr::Presence, false),
                Condition::any_on(&room.group, false),
            ]
        );
    }
}
