//! Resolves every resource the topology names to what the bridge holds.

use anyhow::{Context, Result};
use bridge_core::{
    Bridge,
    model::{Group, Sensor, SensorId, SensorKind},
};
use tracing::warn;

use crate::topology::Topology;

#[derive(Debug, Clone)]
pub struct RoomResources {
    pub group: Group,
    pub presence: Sensor,
    pub light_level: Sensor,
}

#[derive(Debug, Clone)]
pub struct Directory {
    pub zone: Group,
    pub daylight: Sensor,
    pub switch: Sensor,
    /// Same order as the topology's rooms.
    pub rooms: Vec<RoomResources>,
}

async fn sensor(
    bridge: &dyn Bridge,
    what: &str,
    id: &SensorId,
    expected: SensorKind,
) -> Result<Sensor> {
    let sensor =
        bridge.get_sensor(id).await.with_context(|| format!("resolve {what} (sensor {id})"))?;
    if sensor.kind != expected {
        warn!(sensor_id = %id, kind = %sensor.kind, %expected, "{what} has an unexpected type");
    }
    Ok(sensor)
}

/// Any resource that cannot be resolved aborts the run.
pub async fn resolve(bridge: &dyn Bridge, topology: &Topology) -> Result<Directory> {
    let zone = bridge
        .get_group(&topology.zone)
        .await
        .with_context(|| format!("resolve zone (group {})", topology.zone))?;
    let daylight =
        sensor(bridge, "daylight sensor", &topology.daylight, SensorKind::Daylight).await?;
    let switch = sensor(bridge, "dimmer switch", &topology.switch, SensorKind::Switch).await?;

    let mut rooms = Vec::with_capacity(topology.rooms.len());
    for room in &topology.rooms {
        let group = bridge
            .get_group(&room.group)
            .await
            .with_context(|| format!("resolve {} group (group {})", room.name, room.group))?;
        let presence = sensor(
            bridge,
            &format!("{} presence sensor", room.name),
            &room.presence,
            SensorKind::Presence,
        )
        .await?;
        let light_level = sensor(
            bridge,
            &format!("{} light sensor", room.name),
            &room.light_level,
            SensorKind::LightLevel,
        )
        .await?;
        rooms.push(RoomResources { group, presence, light_level });
    }
    Ok(Directory { zone, daylight, switch, rooms })
}
