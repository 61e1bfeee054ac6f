use std::collections::HashSet;

use bridge_core::rule::{MAX_ACTIONS, MAX_CONDITIONS, MAX_RULE_NAME_LEN, NewRule};
use thiserror::Error;

use crate::exclusive::find_race;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleSetError {
    #[error("rule name {0:?} is used more than once")]
    DuplicateName(String),
    #[error("rule name {0:?} is empty or longer than {MAX_RULE_NAME_LEN} characters")]
    BadName(String),
    #[error("rule {name:?} has {count} conditions, expected 1 to {MAX_CONDITIONS}")]
    ConditionCount { name: String, count: usize },
    #[error("rule {name:?} has {count} actions, expected 1 to {MAX_ACTIONS}")]
    ActionCount { name: String, count: usize },
    #[error("rules {first:?} and {second:?} in {group} may fire together with conflicting actions")]
    NotExclusive { group: String, first: String, second: String },
}

/// Rules in upload order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    rules: Vec<NewRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, rules: impl IntoIterator<Item = NewRule>) {
        self.rules.extend(rules);
    }

    pub fn rules(&self) -> &[NewRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn named(&self, name: &str) -> Option<&NewRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub fn validate(&self) -> Result<(), RuleSetError> {
        let mut seen = HashSet::new();
        for rule in &self.rules {
            let name = rule.name.clone();
            if name.is_empty() || name.chars().count() > MAX_RULE_NAME_LEN {
                return Err(RuleSetError::BadName(name));
            }
            if !(1..=MAX_CONDITIONS).contains(&rule.conditions.len()) {
                return Err(RuleSetError::ConditionCount { name, count: rule.conditions.len() });
            }
            if !(1..=MAX_ACTIONS).contains(&rule.actions.len()) {
                return Err(RuleSetError::ActionCount { name, count: rule.actions.len() });
            }
            if !seen.insert(rule.name.as_str()) {
                return Err(RuleSetError::DuplicateName(name));
            }
        }
        if let Some(race) = find_race(&self.rules) {
            return Err(RuleSetError::NotExclusive {
                group: race.scope(),
                first: race.first.name.clone(),
                second: race.second.name.clone(),
            });
        }
        Ok(())
    }
}

impl IntoIterator for RuleSet {
    type Item = NewRule;
    type IntoIter = std::vec::IntoIter<NewRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.into_iter()
    }
}

/// Splits a rule whose action list is over the bridge limit into several
/// rules with the same conditions.
pub fn split_actions(rule: NewRule) -> Vec<NewRule> {
    if rule.actions.len() <= MAX_ACTIONS {
        return vec![rule];
    }
    rule.actions
        .chunks(MAX_ACTIONS)
        .enumerate()
        .map(|(i, actions)| NewRule {
            name: format!("{} {}", rule.name, i + 1),
            recycle: rule.recycle,
            conditions: rule.conditions.clone(),
            actions: actions.to_vec(),
            exclusive_group: rule.exclusive_group.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::model::{GroupId, SensorId};
    use bridge_core::rule::{Action, Condition};
    use bridge_core::status::SceneSetStatus;

    fn rule(name: &str) -> NewRule {
        let g = GroupId::from("1");
        NewRule::new(name).when(Condition::any_on(&g, false)).then(Action::power(&g, false))
    }

    #[test]
    fn duplicate_names_are_refused() {
        let mut set = RuleSet::new();
        set.extend([rule("a"), rule("b"), rule("a")]);
        assert_eq!(set.validate(), Err(RuleSetError::DuplicateName("a".into())));
    }

    #[test]
    fn long_names_are_refused() {
        let mut set = RuleSet::new();
        set.extend([rule(&"n".repeat(MAX_RULE_NAME_LEN + 1))]);
        assert!(matches!(set.validate(), Err(RuleSetError::BadName(_))));
    }

    #[test]
    fn wide_rules_are_split() {
        let base = (0..11).fold(rule("reset"), |r, i| {
            r.then(Action::set_status(&SensorId::from(format!("{i}")), SceneSetStatus::NotSet))
        });
        let parts = split_actions(base);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].name, "reset 1");
        assert_eq!(parts[0].actions.len(), MAX_ACTIONS);
        assert_eq!(parts[1].actions.len(), 12 - MAX_ACTIONS);
        assert_eq!(parts[0].conditions, parts[1].conditions);
    }
}
