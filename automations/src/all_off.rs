use bridge_core::{
    rule::{Action, Address, Condition, NewRule},
    status::{Activity, BrightnessLevel, SceneSetStatus},
};

use crate::bindings::Bindings;
use crate::ruleset::split_actions;

/// Long press on the off button switches the whole zone off.
pub fn all_off_rule(bindings: &Bindings) -> NewRule {
    NewRule::new("all off")
        .when(Condition::button_is(&bindings.switch, bindings.buttons.all_off))
        .when(Condition::changed(Address::last_updated(&bindings.switch)))
        .then(Action::power(&bindings.zone, false))
}

/// Once the zone has been dark for the idle delay, preferences go back to
/// their defaults and every room starts a fresh period.
pub fn idle_reset_rules(bindings: &Bindings) -> Vec<NewRule> {
    let rule = NewRule::new("all off idle reset")
        .when(Condition::any_on(&bindings.zone, false))
        .when(Condition::stable_for(Address::any_on(&bindings.zone), bindings.idle_reset))
        .then(Action::set_status(&bindings.axes.activity, Activity::Normal))
        .then(Action::set_status(&bindings.axes.brightness, BrightnessLevel::Neutral));
    let rule = bindings
        .scene_set_flags()
        .fold(rule, |rule, flag| rule.then(Action::set_status(flag, SceneSetStatus::NotSet)));
    split_actions(rule)
}

pub fn rules(bindings: &Bindings) -> Vec<NewRule> {
    let mut rules = vec![all_off_rule(bindings)];
    rules.extend(idle_reset_rules(bindings));
    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::bindings;
    use std::time::Duration;

    #[test]
    fn idle_reset_waits_five_and_a_half_minutes() {
        let b = bindings();
        let rules = idle_reset_rules(&b);
        assert_eq!(rules.len(), 1);
        assert!(rules[0].conditions.contains(&Condition::ChangedDelayed {
            address: Address::any_on(&b.zone),
            delay: Duration::from_secs(330),
        }));
        assert_eq!(rules[0].actions.len(), 2 + b.rooms.len());
    }
}
