//! Static check that rules which may fire on the same event cannot race.
//!
//! The bridge gives no ordering between rules matching the same event, so
//! two rules that could fire together must not issue conflicting actions.
//! Pairs are checked when they share a transition group or write the same
//! status sensor. Two rules can never fire together when one of their guards
//! contradicts the other on a shared address, when they are woken by
//! different kinds of events (a state change, a particular delayed timer or
//! a schedule boundary), or when no single resource write wakes both.

use std::time::Duration;

use bridge_core::{
    model::{GroupId, SensorId},
    rule::{Action, Address, Condition, NewRule},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerClass {
    Change,
    Timer(Address, Duration),
    Schedule,
}

pub fn trigger_class(rule: &NewRule) -> TriggerClass {
    if let Some(Condition::ChangedDelayed { address, delay }) =
        rule.conditions.iter().find(|c| matches!(c, Condition::ChangedDelayed { .. }))
    {
        return TriggerClass::Timer(address.clone(), *delay);
    }
    if !rule.conditions.is_empty() && rule.conditions.iter().all(|c| c.window().is_some()) {
        return TriggerClass::Schedule;
    }
    TriggerClass::Change
}

fn contradicts_one_way(a: &Condition, b: &Condition) -> bool {
    use Condition::*;
    match (a, b) {
        (Equals { value: x, .. }, Equals { value: y, .. }) => x != y,
        (Equals { value: x, .. }, NotEquals { value: y, .. }) => x == y,
        (Equals { value: x, .. }, LessThan { value: n, .. }) => x.as_i64().is_some_and(|x| x >= *n),
        (Equals { value: x, .. }, GreaterThan { value: n, .. }) => {
            x.as_i64().is_some_and(|x| x <= *n)
        }
        (LessThan { value: n, .. }, GreaterThan { value: m, .. }) => *n <= m.saturating_add(1),
        (InWindow { window: w1 }, NotInWindow { window: w2 }) => w1 == w2,
        _ => false,
    }
}

/// True when no state can satisfy both conditions.
pub fn contradicts(a: &Condition, b: &Condition) -> bool {
    if a.address() != b.address() {
        return false;
    }
    contradicts_one_way(a, b) || contradicts_one_way(b, a)
}

fn guards_contradict(a: &NewRule, b: &NewRule) -> bool {
    a.conditions.iter().any(|x| b.conditions.iter().any(|y| contradicts(x, y)))
}

#[derive(Debug, PartialEq, Eq)]
enum Resource<'a> {
    Sensor(&'a SensorId),
    Group(&'a GroupId),
}

fn resource(address: &Address) -> Resource<'_> {
    match address {
        Address::Sensor { sensor, .. } => Resource::Sensor(sensor),
        Address::Group { group, .. } => Resource::Group(group),
    }
}

/// Resources whose writes wake a change-triggered rule: the ones it watches
/// for a change, or every one it reads when it watches none.
fn wake_resources(rule: &NewRule) -> Vec<Resource<'_>> {
    let edges: Vec<_> = rule
        .conditions
        .iter()
        .filter_map(|c| match c {
            Condition::Changed { address } => Some(resource(address)),
            _ => None,
        })
        .collect();
    if !edges.is_empty() {
        return edges;
    }
    rule.conditions.iter().filter_map(Condition::address).map(resource).collect()
}

fn woken_together(a: &NewRule, b: &NewRule) -> bool {
    let theirs = wake_resources(b);
    wake_resources(a).iter().any(|r| theirs.contains(r))
}

pub fn mutually_exclusive(a: &NewRule, b: &NewRule) -> bool {
    let classes_differ = match (trigger_class(a), trigger_class(b)) {
        (TriggerClass::Timer(x, d), TriggerClass::Timer(y, e)) => x != y || d != e,
        (TriggerClass::Change, TriggerClass::Change) => !woken_together(a, b),
        (ca, cb) => ca != cb,
    };
    classes_differ || guards_contradict(a, b)
}

fn action_conflict(x: &Action, y: &Action) -> bool {
    use Action::*;
    match (x, y) {
        (SetStatus { sensor: s1, status: v1 }, SetStatus { sensor: s2, status: v2 }) => {
            s1 == s2 && v1 != v2
        }
        (ApplyScene { group: g1, scene: c1, .. }, ApplyScene { group: g2, scene: c2, .. }) => {
            g1 == g2 && c1 != c2
        }
        (SetPower { group: g1, on: o1 }, SetPower { group: g2, on: o2 }) => g1 == g2 && o1 != o2,
        (IncrementBrightness { group: g1, .. }, IncrementBrightness { group: g2, .. })
        | (ApplyScene { group: g1, .. }, SetPower { group: g2, .. })
        | (SetPower { group: g1, .. }, ApplyScene { group: g2, .. })
        | (ApplyScene { group: g1, .. }, IncrementBrightness { group: g2, .. })
        | (IncrementBrightness { group: g1, .. }, ApplyScene { group: g2, .. }) => g1 == g2,
        (StoreLightState { scene: c1 }, ApplyScene { scene: c2, .. })
        | (ApplyScene { scene: c2, .. }, StoreLightState { scene: c1 }) => c1 == c2,
        _ => false,
    }
}

/// True when firing both rules in either order could give different results.
pub fn actions_conflict(a: &NewRule, b: &NewRule) -> bool {
    a.actions.iter().any(|x| b.actions.iter().any(|y| action_conflict(x, y)))
}

fn status_writes(rule: &NewRule) -> impl Iterator<Item = &SensorId> {
    rule.actions.iter().filter_map(|a| match a {
        Action::SetStatus { sensor, .. } => Some(sensor),
        _ => None,
    })
}

/// Two rules that could fire on one event with conflicting actions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Race<'a> {
    pub first: &'a NewRule,
    pub second: &'a NewRule,
}

impl Race<'_> {
    /// The shared transition group, or the status sensor both rules write.
    pub fn scope(&self) -> String {
        if let Some(group) = self.first.exclusive_group.as_deref()
            && self.second.exclusive_group.as_deref() == Some(group)
        {
            return group.to_string();
        }
        status_writes(self.first)
            .find(|s| status_writes(self.second).any(|t| t == *s))
            .map(|s| format!("writers of status {s}"))
            .unwrap_or_default()
    }
}

fn checked_together(a: &NewRule, b: &NewRule) -> bool {
    let same_group = a.exclusive_group.is_some() && a.exclusive_group == b.exclusive_group;
    same_group || status_writes(a).any(|s| status_writes(b).any(|t| t == s))
}

/// First pair that could race, if any.
pub fn find_race(rules: &[NewRule]) -> Option<Race<'_>> {
    for (i, a) in rules.iter().enumerate() {
        for b in &rules[i + 1..] {
            if checked_together(a, b) && actions_conflict(a, b) && !mutually_exclusive(a, b) {
                return Some(Race { first: a, second: b });
            }
        }
    }
    None
}
