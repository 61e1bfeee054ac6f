//! Deletes whatever a previous run generated, then rebuilds the home's
//! sensors, scenes and rules from the topology.

use anyhow::{Context, Result};
use automations::{AxisSensors, Bindings, RoomBinding, RuleSet};
use bridge_core::{Bridge, Ownership, model::RuleId};
use tracing::{debug, info};

use crate::directory::{self, Directory};
use crate::registry::{Registry, RoomState};
use crate::topology::Topology;

/// Vendor tag stamped on every status sensor we create.
pub const MANUFACTURER: &str = "hue-rules-manager";

pub fn ownership(bridge: &dyn Bridge, prefix: &str) -> Ownership {
    Ownership {
        owner: bridge.owner().to_string(),
        manufacturer: MANUFACTURER.to_string(),
        prefix: prefix.to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Teardown {
    pub rules: usize,
    pub sensors: usize,
    pub scenes: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    pub deleted: Teardown,
    pub created_sensors: usize,
    pub created_scenes: usize,
    /// Uploaded rules in upload order.
    pub rules: Vec<(RuleId, String)>,
}

/// Removes owned rules first, so nothing on the bridge still references the
/// sensors and scenes removed after them.
pub async fn teardown(bridge: &dyn Bridge, ownership: &Ownership) -> Result<Teardown> {
    let mut done = Teardown::default();

    let rules = bridge.list_rules().await.context("list rules")?;
    for rule in rules.iter().filter(|r| ownership.owns_rule(r)) {
        bridge
            .delete_rule(&rule.id)
            .await
            .with_context(|| format!("delete rule {} ({:?})", rule.id, rule.name))?;
        info!(rule_id = %rule.id, rule = %rule.name, "deleted rule");
        done.rules += 1;
    }

    let sensors = bridge.list_sensors().await.context("list sensors")?;
    for sensor in sensors.iter().filter(|s| ownership.owns_sensor(s)) {
        bridge
            .delete_sensor(&sensor.id)
            .await
            .with_context(|| format!("delete sensor {} ({:?})", sensor.id, sensor.name))?;
        info!(sensor_id = %sensor.id, name = %sensor.name, "deleted sensor");
        done.sensors += 1;
    }

    let scenes = bridge.list_scenes().await.context("list scenes")?;
    for scene in scenes.iter().filter(|s| ownership.owns_scene(s)) {
        bridge
            .delete_scene(&scene.id)
            .await
            .with_context(|| format!("delete scene {} ({:?})", scene.id, scene.name))?;
        info!(scene_id = %scene.id, name = %scene.name, "deleted scene");
        done.scenes += 1;
    }

    Ok(done)
}

pub fn bindings(
    topology: &Topology,
    directory: &Directory,
    rooms: &[RoomState],
    axes: AxisSensors,
) -> Bindings {
    let rooms = topology
        .rooms
        .iter()
        .zip(&directory.rooms)
        .zip(rooms)
        .map(|((room, resources), state)| RoomBinding {
            name: room.name.clone(),
            prefix: room.prefix.clone(),
            group: resources.group.id.clone(),
            presence: resources.presence.id.clone(),
            light_level: resources.light_level.id.clone(),
            status: state.status.clone(),
            scene_set: state.scene_set.clone(),
            stored_scene: state.stored_scene.clone(),
            dim_delay: room.dim_delay(),
            off_delay: room.off_delay(),
            scene_reset_delay: room.scene_reset_delay(),
            scenes: room.scenes.clone(),
        })
        .collect();
    Bindings {
        zone: directory.zone.id.clone(),
        daylight: directory.daylight.id.clone(),
        switch: directory.switch.id.clone(),
        buttons: topology.buttons,
        late_night_window: topology.late_night,
        idle_reset: topology.idle_reset(),
        axes,
        rooms,
    }
}

/// Uploads one rule at a time; the first rejection aborts the run.
pub async fn upload(bridge: &dyn Bridge, set: &RuleSet) -> Result<Vec<(RuleId, String)>> {
    let mut created = Vec::with_capacity(set.len());
    for rule in set.rules() {
        let id = bridge
            .create_rule(rule)
            .await
            .with_context(|| format!("upload rule {:?}", rule.name))?;
        debug!(rule_id = %id, rule = %rule.name, "uploaded rule");
        created.push((id, rule.name.clone()));
    }
    Ok(created)
}

pub async fn provision(
    bridge: &dyn Bridge,
    topology: &Topology,
    prefix: &str,
) -> Result<ProvisionReport> {
    let ownership = ownership(bridge, prefix);
    let deleted = teardown(bridge, &ownership).await.context("remove generated state")?;

    let directory = directory::resolve(bridge, topology).await?;

    let mut registry = Registry::new(bridge, &ownership);
    let mut rooms = Vec::with_capacity(topology.rooms.len());
    for (room, resources) in topology.rooms.iter().zip(&directory.rooms) {
        let state = registry
            .room(room, resources)
            .await
            .with_context(|| format!("create state for {}", room.name))?;
        rooms.push(state);
    }
    let axes = registry.axes().await.context("create axis sensors")?;

    let set = automations::compile(&bindings(topology, &directory, &rooms, axes));
    set.validate().context("generated rules")?;

    let started = tokio::time::Instant::now();
    let rules = upload(bridge, &set).await?;
    info!(
        rules = rules.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "rules uploaded"
    );

    Ok(ProvisionReport {
        deleted,
        created_sensors: registry.created_sensors(),
        created_scenes: registry.created_scenes(),
        rules,
    })
}

