use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use adapter_hue::HueBridge;
use anyhow::{Result, bail};
use bridge_core::{
    Bridge, BridgeSnapshot, InMemoryBridge,
    model::{
        Group, GroupId, GroupKind, LightState, Scene, SceneId, Sensor, SensorId, SensorKind,
        state_key,
    },
};
use serde_json::{Value, json};
use tracing::info;

use crate::{
    config::{BridgeKind, Config},
    topology::Topology,
};

/// Owner stamped on rules created against the in-memory bridge.
pub const DRY_RUN_OWNER: &str = "dry-run";

pub fn build_bridge(cfg: &Config, topology: &Topology) -> Result<Arc<dyn Bridge>> {
    let bridge: Arc<dyn Bridge> = match cfg.bridge {
        BridgeKind::Http => {
            if cfg.hue.username.is_empty() {
                bail!("HUE_URL or HUE_USERNAME is required for the http bridge");
            }
            let url = cfg.hue.base_url()?;
            info!(%url, "using bridge");
            Arc::new(HueBridge::new(&url, &cfg.hue.username)?)
        }
        BridgeKind::InMem => {
            info!(rooms = topology.rooms.len(), "using in-memory bridge");
            Arc::new(InMemoryBridge::from_snapshot(DRY_RUN_OWNER, seed_snapshot(topology)))
        }
    };
    Ok(bridge)
}

fn sensor(id: &SensorId, name: String, kind: SensorKind, key: &str, value: Value) -> Sensor {
    Sensor {
        id: id.clone(),
        name,
        kind,
        manufacturer: None,
        unique_id: None,
        model_id: None,
        sw_version: None,
        state: BTreeMap::from([(key.to_string(), value)]),
    }
}

fn group(id: &GroupId, name: &str, kind: GroupKind, lights: Vec<String>) -> Group {
    Group { id: id.clone(), name: name.to_string(), kind, lights, any_on: false, all_on: false }
}

/// A dark, empty home holding every resource the topology names.
///
/// Rooms without listed lights get a single light named after their group.
pub fn seed_snapshot(topology: &Topology) -> BridgeSnapshot {
    let mut snap = BridgeSnapshot::default();
    let mut all_lights = BTreeSet::new();

    for room in &topology.rooms {
        let lights = if room.lights.is_empty() {
            vec![format!("{}-1", room.group)]
        } else {
            room.lights.clone()
        };
        all_lights.extend(lights.iter().cloned());

        let mut scene_ids: Vec<&SceneId> = room
            .scenes
            .keys()
            .into_iter()
            .filter_map(|(activity, cycle)| room.scenes.select(activity.unwrap_or_default(), cycle))
            .collect();
        scene_ids.sort();
        scene_ids.dedup();
        for id in scene_ids {
            snap.scenes.push(Scene {
                id: id.clone(),
                name: id.to_string(),
                group: room.group.clone(),
                light_states: lights.iter().map(|l| (l.clone(), LightState::FULL)).collect(),
            });
        }

        snap.groups.push(group(&room.group, &room.name, GroupKind::Room, lights));
        snap.sensors.push(sensor(
            &room.presence,
            format!("{} presence", room.name),
            SensorKind::Presence,
            state_key::PRESENCE,
            json!(false),
        ));
        snap.sensors.push(sensor(
            &room.light_level,
            format!("{} light level", room.name),
            SensorKind::LightLevel,
            state_key::DARK,
            json!(true),
        ));
    }

    for auto in &topology.auto_scenes {
        let Some(room) = topology.room(&auto.room) else {
            continue;
        };
        if snap.scene(&auto.scene).is_some() {
            continue;
        }
        let lights = snap.group(&room.group).map(|g| g.lights.clone()).unwrap_or_default();
        snap.scenes.push(Scene {
            id: auto.scene.clone(),
            name: auto.scene.to_string(),
            group: room.group.clone(),
            light_states: lights.into_iter().map(|l| (l, LightState::FULL)).collect(),
        });
    }

    let zone_lights = all_lights.into_iter().collect();
    snap.groups.push(group(&topology.zone, "Home", GroupKind::Zone, zone_lights));
    snap.sensors.push(sensor(
        &topology.daylight,
        "Daylight".to_string(),
        SensorKind::Daylight,
        state_key::DAYLIGHT,
        json!(false),
    ));
    snap.sensors.push(sensor(
        &topology.switch,
        "Dimmer switch".to_string(),
        SensorKind::Switch,
        state_key::BUTTON_EVENT,
        json!(0),
    ));
    snap
}
