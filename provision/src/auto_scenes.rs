//! Rewrites the content of clock-driven scenes for the current hour.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use bridge_core::{Bridge, model::LightState};
use rand::{Rng, seq::SliceRandom};
use tracing::info;

use crate::topology::{AutoStep, Topology};

/// Step covering `hour`. Hours past the last step fall back to it.
pub fn step_at(steps: &[AutoStep], hour: u32) -> Option<&AutoStep> {
    steps.iter().find(|s| hour <= s.until_hour).or_else(|| steps.last())
}

/// New state for every light of the scene under `step`.
pub fn light_states<R: Rng + ?Sized>(
    current: &BTreeMap<String, LightState>,
    step: &AutoStep,
    rng: &mut R,
) -> BTreeMap<String, LightState> {
    let mut next: BTreeMap<String, LightState> = current
        .iter()
        .map(|(light, state)| {
            let on = step.lights_on.is_none() && state.on;
            (light.clone(), LightState { on, bri: Some(step.bri) })
        })
        .collect();
    if let Some(count) = step.lights_on {
        let mut lights: Vec<&String> = current.keys().collect();
        lights.shuffle(rng);
        for light in lights.into_iter().take(count) {
            if let Some(state) = next.get_mut(light) {
                state.on = true;
            }
        }
    }
    next
}

/// Refreshes every auto scene of the topology, stopping at the first
/// failure. Returns how many scenes were written.
pub async fn refresh<R: Rng + ?Sized>(
    bridge: &dyn Bridge,
    topology: &Topology,
    hour: u32,
    rng: &mut R,
) -> Result<usize> {
    let mut written = 0;
    for auto in &topology.auto_scenes {
        let Some(step) = step_at(&auto.steps, hour) else {
            continue;
        };
        let scene = bridge
            .get_scene(&auto.scene)
            .await
            .with_context(|| format!("read {} auto scene {}", auto.room, auto.scene))?;
        let states = light_states(&scene.light_states, step, rng);
        let lights_on = states.values().filter(|s| s.on).count();
        bridge
            .update_scene(&auto.scene, &states)
            .await
            .with_context(|| format!("set {} auto scene {}", auto.room, auto.scene))?;
        info!(
            room = %auto.room,
            scene_id = %auto.scene,
            hour,
            bri = step.bri,
            lights_on,
            "auto scene set"
        );
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    fn step(until_hour: u32, bri: u8, lights_on: Option<usize>) -> AutoStep {
        AutoStep { until_hour, bri, lights_on }
    }

    fn hallway() -> BTreeMap<String, LightState> {
        ["9", "10", "11", "12", "13"]
            .into_iter()
            .map(|l| (l.to_string(), LightState::FULL))
            .collect()
    }

    #[test]
    fn hours_pick_the_first_covering_step() {
        let steps = [step(7, 10, None), step(8, 30, None), step(19, 254, None)];
        assert_eq!(step_at(&steps, 0).map(|s| s.bri), Some(10));
        assert_eq!(step_at(&steps, 7).map(|s| s.bri), Some(10));
        assert_eq!(step_at(&steps, 8).map(|s| s.bri), Some(30));
        assert_eq!(step_at(&steps, 22).map(|s| s.bri), Some(254));
        assert!(step_at(&[], 3).is_none());
    }

    #[test]
    fn brightness_only_steps_keep_the_on_flags() {
        let mut current = hallway();
        current.insert("9".into(), LightState { on: false, bri: Some(1) });
        let next = light_states(&current, &step(23, 120, None), &mut StdRng::seed_from_u64(1));
        assert_eq!(next["9"], LightState { on: false, bri: Some(120) });
        assert_eq!(next["10"], LightState { on: true, bri: Some(120) });
    }

    #[test]
    fn counted_steps_switch_on_a_random_subset() {
        let mut rng = StdRng::seed_from_u64(42);
        for count in [0, 1, 3, 5, 9] {
            let next = light_states(&hallway(), &step(23, 50, Some(count)), &mut rng);
            assert_eq!(next.len(), 5);
            assert_eq!(next.values().filter(|s| s.on).count(), count.min(5));
            assert!(next.values().all(|s| s.bri == Some(50)));
        }
    }
}
