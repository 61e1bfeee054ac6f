//! Virtual status sensors and stored-state scenes created for one
//! provisioning run.

use std::collections::BTreeMap;
use std::fmt::Display;

use anyhow::{Context, Result};
use automations::AxisSensors;
use bridge_core::{
    Bridge, Ownership,
    model::{LightState, NewScene, NewStatusSensor, SceneId, SensorId},
    status::{
        Activity, BrightnessLevel, LateNightStatus, MotionStatus, SceneSetStatus, StatusCode,
    },
};
use tracing::info;

use crate::directory::RoomResources;
use crate::topology::RoomTopology;

const MODEL_ID: &str = "status";

/// Sensors and scene backing one room's state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomState {
    pub status: SensorId,
    pub scene_set: SensorId,
    pub stored_scene: SceneId,
}

pub struct Registry<'a> {
    bridge: &'a dyn Bridge,
    ownership: &'a Ownership,
    next: u32,
    created_sensors: usize,
    created_scenes: usize,
}

impl<'a> Registry<'a> {
    pub fn new(bridge: &'a dyn Bridge, ownership: &'a Ownership) -> Self {
        Self { bridge, ownership, next: 0, created_sensors: 0, created_scenes: 0 }
    }

    pub fn created_sensors(&self) -> usize {
        self.created_sensors
    }

    pub fn created_scenes(&self) -> usize {
        self.created_scenes
    }

    fn next_unique_id(&mut self) -> String {
        self.next += 1;
        format!("{}-{}", self.ownership.prefix, self.next)
    }

    fn name(&self, label: impl Display) -> String {
        format!("{} {}", self.ownership.prefix, label)
    }

    pub async fn status_sensor<S: StatusCode + Display>(
        &mut self,
        label: &str,
        initial: S,
    ) -> Result<SensorId> {
        let name = self.name(label);
        let sensor = NewStatusSensor {
            name: name.clone(),
            unique_id: self.next_unique_id(),
            manufacturer: self.ownership.manufacturer.clone(),
            model_id: MODEL_ID.to_string(),
            sw_version: env!("CARGO_PKG_VERSION").to_string(),
            status: initial.code(),
        };
        let id = self
            .bridge
            .create_status_sensor(sensor)
            .await
            .with_context(|| format!("create status sensor {name:?}"))?;
        self.created_sensors += 1;
        info!(sensor_id = %id, name = %name, initial = %initial, "status sensor ready");
        Ok(id)
    }

    /// Scene over every light of the room, starting at full brightness.
    pub async fn stored_scene(
        &mut self,
        room: &RoomTopology,
        resources: &RoomResources,
    ) -> Result<SceneId> {
        let name = self.name(format_args!("{} stored", room.prefix));
        let light_states: BTreeMap<String, LightState> =
            resources.group.lights.iter().map(|l| (l.clone(), LightState::FULL)).collect();
        let group = resources.group.id.clone();
        let id = self
            .bridge
            .create_scene(NewScene { name: name.clone(), group, light_states })
            .await
            .with_context(|| format!("create stored scene {name:?}"))?;
        self.created_scenes += 1;
        info!(scene_id = %id, name = %name, "stored scene ready");
        Ok(id)
    }

    pub async fn room(
        &mut self,
        room: &RoomTopology,
        resources: &RoomResources,
    ) -> Result<RoomState> {
        let status = self
            .status_sensor(&format!("{} motion", room.prefix), MotionStatus::Armed)
            .await?;
        let scene_set = self
            .status_sensor(&format!("{} scene set", room.prefix), SceneSetStatus::NotSet)
            .await?;
        let stored_scene = self.stored_scene(room, resources).await?;
        Ok(RoomState { status, scene_set, stored_scene })
    }

    pub async fn axes(&mut self) -> Result<AxisSensors> {
        Ok(AxisSensors {
            late_night: self.status_sensor("late night", LateNightStatus::NotLateNight).await?,
            activity: self.status_sensor("activity", Activity::Normal).await?,
            brightness: self.status_sensor("brightness", BrightnessLevel::Neutral).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::InMemoryBridge;
    use bridge_core::model::{Group, GroupId, GroupKind, Sensor, SensorKind};
    use crate::topology::Topology;

    fn ownership() -> Ownership {
        Ownership {
            owner: "tester".into(),
            manufacturer: "hue-rules-manager".into(),
            prefix: "hrm".into(),
        }
    }

    fn sensor(id: &str, kind: SensorKind) -> Sensor {
        Sensor {
            id: SensorId::from(id),
            name: id.into(),
            kind,
            manufacturer: None,
            unique_id: None,
            model_id: None,
            sw_version: None,
            state: BTreeMap::new(),
        }
    }

    fn kitchen() -> (RoomTopology, RoomResources) {
        let topology = Topology::from_json(
            r#"{"zone":"0","daylight":"1","switch":"2","rooms":[{"name":"Kitchen","prefix":"Kök",
               "group":"6","presence":"28","light_level":"29","dim_delay_secs":900,
               "scenes":{"by_day_cycle":{"day":"a"}}}]}"#,
        )
        .unwrap();
        let resources = RoomResources {
            group: Group {
                id: GroupId::from("6"),
                name: "Kitchen".into(),
                kind: GroupKind::Room,
                lights: vec!["4".into(), "5".into()],
                any_on: false,
                all_on: false,
            },
            presence: sensor("28", SensorKind::Presence),
            light_level: sensor("29", SensorKind::LightLevel),
        };
        (topology.rooms[0].clone(), resources)
    }

    #[tokio::test]
    async fn room_state_starts_armed_with_a_full_stored_scene() {
        let bridge = InMemoryBridge::new("tester");
        let (room, resources) = kitchen();
        bridge.insert_group(resources.group.clone()).await;
        let own = ownership();
        let mut registry = Registry::new(&bridge, &own);

        let state = registry.room(&room, &resources).await.unwrap();
        let snap = bridge.snapshot().await;

        let status = snap.sensor(&state.status).unwrap();
        assert_eq!(status.name, "hrm Kök motion");
        assert_eq!(status.unique_id.as_deref(), Some("hrm-1"));
        assert_eq!(status.status(), Some(MotionStatus::Armed.code()));
        assert!(own.owns_sensor(status));

        let flag = snap.sensor(&state.scene_set).unwrap();
        assert_eq!(flag.unique_id.as_deref(), Some("hrm-2"));
        assert_eq!(flag.status(), Some(SceneSetStatus::NotSet.code()));

        let scene = snap.scene(&state.stored_scene).unwrap();
        assert!(own.owns_scene(scene));
        assert_eq!(scene.group, GroupId::from("6"));
        assert_eq!(scene.light_states.len(), 2);
        assert!(scene.light_states.values().all(|s| *s == LightState::FULL));
        assert_eq!((registry.created_sensors(), registry.created_scenes()), (2, 1));
    }

    #[tokio::test]
    async fn unique_ids_keep_counting_across_rooms_and_axes() {
        let bridge = InMemoryBridge::new("tester");
        let (room, resources) = kitchen();
        bridge.insert_group(resources.group.clone()).await;
        let own = ownership();
        let mut registry = Registry::new(&bridge, &own);

        registry.room(&room, &resources).await.unwrap();
        let axes = registry.axes().await.unwrap();
        let snap = bridge.snapshot().await;

        let unique = |id: &SensorId| snap.sensor(id).and_then(|s| s.unique_id.clone());
        assert_eq!(unique(&axes.late_night).as_deref(), Some("hrm-3"));
        assert_eq!(unique(&axes.activity).as_deref(), Some("hrm-4"));
        assert_eq!(unique(&axes.brightness).as_deref(), Some("hrm-5"));
        assert_eq!(snap.sensor(&axes.brightness).unwrap().status(), Some(0));
    }
}
