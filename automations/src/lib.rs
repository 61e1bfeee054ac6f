//! Rule compiler for motion-driven room lighting.
//!
//! [`compile`] turns resolved [`Bindings`] into the full [`RuleSet`] a
//! bridge needs: the per-room motion lifecycle and scene selection, the
//! global axes driven by the dimmer switch, and the all-off controller.
//! [`engine::RuleEngine`] runs such a set in-process.

pub mod all_off;
pub mod axes;
pub mod bindings;
pub mod engine;
pub mod exclusive;
pub mod fsm;
pub mod motion;
pub mod ruleset;
pub mod scenes;

pub use bindings::{AxisSensors, Bindings, ButtonMap, RoomBinding};
pub use engine::RuleEngine;
pub use ruleset::{RuleSet, RuleSetError};
pub use scenes::{DayCycleScenes, SceneTable};

/// Every rule for a home, in upload order.
///
/// Per room, the motion lifecycle comes first and its scene rules second;
/// the global axes and the all-off controller follow.
pub fn compile(bindings: &Bindings) -> RuleSet {
    let mut set = RuleSet::new();
    for room in &bindings.rooms {
        set.extend(motion::room_rules(room));
        set.extend(scenes::room_rules(bindings, room));
    }
    set.extend(axes::rules(bindings));
    set.extend(all_off::rules(bindings));
    tracing::debug!(rules = set.len(), rooms = bindings.rooms.len(), "compiled rule set");
    set
}
