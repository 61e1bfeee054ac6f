//! The per-room motion lifecycle as an explicit transition table.
//!
//! ```text
//!   ARMED --presence+dark--> SHOULD_TRIGGER_SCENE --selection--> SCENE_TRIGGERED
//!     ^                            ^      |                          |   ^
//!     |                            |      +--restore (flag set)------+   | refresh
//!     +------off------ DIMMED -----+ recover          dim <----------+---+
//! ```
//!
//! Guards are symbolic; [`crate::motion`] binds them to a room's sensors and
//! group. Scene selection lives in [`crate::scenes`] because it depends on
//! the scene table rather than on the lifecycle.

use bridge_core::status::{MotionStatus, SceneSetStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delay {
    Dim,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Status(MotionStatus),
    /// The status sensor was written, even with the same value.
    StatusWritten,
    StatusStableFor(Delay),
    Presence(bool),
    PresenceChanged,
    /// The presence sensor reported, even without a change.
    PresenceReported,
    PresenceStableFor(Delay),
    Dark(bool),
    DarkChanged,
    GroupAnyOn(bool),
    SceneSet(SceneSetStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    StoreLightState,
    DimToStandby,
    PowerOff,
    RestoreStoredScene,
}

/// Rules of one group never fire conflicting actions on the same event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionGroup {
    Motion,
    Selection,
}

impl TransitionGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            TransitionGroup::Motion => "motion",
            TransitionGroup::Selection => "selection",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub name: &'static str,
    /// `None` matches any status.
    pub from: Option<MotionStatus>,
    pub to: MotionStatus,
    pub guards: &'static [Guard],
    /// Applied in order, before the status write.
    pub effects: &'static [Effect],
    pub group: TransitionGroup,
}

use Guard::*;
use MotionStatus::*;

pub const MOTION_TABLE: &[Transition] = &[
    Transition {
        name: "on presence",
        from: Some(Armed),
        to: ShouldTriggerScene,
        guards: &[PresenceChanged, Presence(true), Dark(true)],
        effects: &[],
        group: TransitionGroup::Motion,
    },
    Transition {
        name: "on dark",
        from: Some(Armed),
        to: ShouldTriggerScene,
        guards: &[DarkChanged, Dark(true), Presence(true)],
        effects: &[],
        group: TransitionGroup::Motion,
    },
    Transition {
        name: "restore",
        from: Some(ShouldTriggerScene),
        to: SceneTriggered,
        guards: &[StatusWritten, SceneSet(SceneSetStatus::Set)],
        effects: &[Effect::RestoreStoredScene],
        group: TransitionGroup::Selection,
    },
    Transition {
        name: "dim status",
        from: Some(SceneTriggered),
        to: Dimmed,
        guards: &[StatusStableFor(Delay::Dim), Presence(false)],
        effects: &[Effect::StoreLightState, Effect::DimToStandby],
        group: TransitionGroup::Motion,
    },
    Transition {
        name: "dim presence",
        from: Some(SceneTriggered),
        to: Dimmed,
        guards: &[PresenceStableFor(Delay::Dim), Presence(false)],
        effects: &[Effect::StoreLightState, Effect::DimToStandby],
        group: TransitionGroup::Motion,
    },
    Transition {
        name: "refresh",
        from: Some(SceneTriggered),
        to: SceneTriggered,
        guards: &[PresenceReported, Presence(true)],
        effects: &[],
        group: TransitionGroup::Motion,
    },
    Transition {
        name: "off",
        from: Some(Dimmed),
        to: Armed,
        guards: &[StatusStableFor(Delay::Off), Presence(false)],
        effects: &[Effect::PowerOff],
        group: TransitionGroup::Motion,
    },
    Transition {
        name: "recover",
        from: Some(Dimmed),
        to: ShouldTriggerScene,
        guards: &[PresenceChanged, Presence(true)],
        effects: &[],
        group: TransitionGroup::Motion,
    },
    Transition {
        name: "arm",
        from: None,
        to: Armed,
        guards: &[Presence(false), GroupAnyOn(false)],
        effects: &[],
        group: TransitionGroup::Motion,
    },
];

/// Transitions leaving `status`, including wildcard ones.
pub fn transitions_from(status: MotionStatus) -> impl Iterator<Item = &'static Transition> {
    MOTION_TABLE.iter().filter(move |t| t.from.is_none_or(|f| f == status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_status_has_a_way_out() {
        for status in MotionStatus::ALL {
            assert!(
                transitions_from(*status).any(|t| t.to != *status),
                "{status} has no outgoing transition"
            );
        }
    }

    #[test]
    fn every_status_is_reachable() {
        let targets: HashSet<_> = MOTION_TABLE.iter().map(|t| t.to).collect();
        for status in MotionStatus::ALL {
            assert!(targets.contains(status), "{status} is never entered");
        }
    }

    #[test]
    fn names_are_unique() {
        let names: HashSet<_> = MOTION_TABLE.iter().map(|t| t.name).collect();
        assert_eq!(names.len(), MOTION_TABLE.len());
    }

    #[test]
    fn dimming_stores_before_it_dims() {
        for t in MOTION_TABLE.iter().filter(|t| t.to == Dimmed) {
            assert_eq!(t.effects.first(), Some(&Effect::StoreLightState), "{}", t.name);
        }
    }
}
