use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result, anyhow};
use bridge_core::{
    Bridge, Ownership,
    model::{GroupId, SensorId},
    status::{MotionStatus, StatusCode},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};

use crate::topology::Topology;

/// What gets polled for one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watched {
    pub room: String,
    pub status: SensorId,
    pub presence: SensorId,
    pub group: GroupId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub status: Option<MotionStatus>,
    pub presence: Option<bool>,
    pub any_on: bool,
}

/// Finds the room's motion status sensor among the ones we own.
pub async fn locate(
    bridge: &dyn Bridge,
    topology: &Topology,
    ownership: &Ownership,
    room: &str,
) -> Result<Watched> {
    let room = topology.room(room).ok_or_else(|| anyhow!("no room named {room:?} in topology"))?;
    let name = format!("{} {} motion", ownership.prefix, room.prefix);
    let sensors = bridge.list_sensors().await.context("list sensors")?;
    let status = sensors
        .into_iter()
        .find(|s| ownership.owns_sensor(s) && s.name == name)
        .ok_or_else(|| anyhow!("no status sensor {name:?}; provision first"))?;
    Ok(Watched {
        room: room.name.clone(),
        status: status.id,
        presence: room.presence.clone(),
        group: room.group.clone(),
    })
}

async fn observe(bridge: &dyn Bridge, watched: &Watched) -> Result<Observation> {
    let status = bridge.get_sensor(&watched.status).await?;
    let presence = bridge.get_sensor(&watched.presence).await?;
    let group = bridge.get_group(&watched.group).await?;
    Ok(Observation {
        status: status.status().and_then(MotionStatus::from_code),
        presence: presence.presence(),
        any_on: group.any_on,
    })
}

/// Polls every `interval` and sends an observation whenever it differs from
/// the previous one. Stops once the receiver is gone.
pub fn spawn_with_interval(
    bridge: Arc<dyn Bridge>,
    watched: Watched,
    interval: Duration,
    tx: mpsc::Sender<Observation>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        let mut last: Option<Observation> = None;
        loop {
            ticker.tick().await;
            let seen = match observe(bridge.as_ref(), &watched).await {
                Ok(o) => o,
                Err(e) => {
                    warn!("failed to poll {}: {e:#}", watched.room);
                    continue;
                }
            };
            if last.as_ref() == Some(&seen) {
                continue;
            }
            let status = seen.status.map(|s| s.to_string()).unwrap_or_else(|| "unknown".into());
            info!(
                room = %watched.room,
                %status,
                presence = ?seen.presence,
                any_on = seen.any_on,
                "room changed"
            );
            if tx.send(seen.clone()).await.is_err() {
                break;
            }
            last = Some(seen);
        }
    })
}

/// Logs changes until ctrl-c.
pub async fn run(bridge: Arc<dyn Bridge>, watched: Watched, interval: Duration) -> Result<()> {
    info!(room = %watched.room, interval_secs = interval.as_secs(), "monitoring");
    let (tx, mut rx) = mpsc::channel(16);
    let handle = spawn_with_interval(bridge, watched, interval, tx);
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("listen for ctrl-c")?;
                break;
            }
            seen = rx.recv() => {
                if seen.is_none() {
                    break;
                }
            }
        }
    }
    handle.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use bridge_core::{
        InMemoryBridge,
        model::{Group, GroupKind, NewStatusSensor, Sensor, SensorKind, state_key},
    };
    use serde_json::json;

    async fn home() -> (InMemoryBridge, Watched) {
        let bridge = InMemoryBridge::new("tester");
        bridge
            .insert_group(Group {
                id: GroupId::from("6"),
                name: "Kitchen".into(),
                kind: GroupKind::Room,
                lights: vec!["4".into()],
                any_on: false,
                all_on: false,
            })
            .await;
        bridge
            .insert_sensor(Sensor {
                id: SensorId::from("28"),
                name: "Kitchen presence".into(),
                kind: SensorKind::Presence,
                manufacturer: None,
                unique_id: None,
                model_id: None,
                sw_version: None,
                state: BTreeMap::from([(state_key::PRESENCE.to_string(), json!(false))]),
            })
            .await;
        let status = bridge
            .create_status_sensor(NewStatusSensor {
                name: "hrm Kök motion".into(),
                unique_id: "hrm-1".into(),
                manufacturer: "hue-rules-manager".into(),
                model_id: "status".into(),
                sw_version: "0".into(),
                status: 0,
            })
            .await
            .expect("create status sensor");
        let watched = Watched {
            room: "Kitchen".into(),
            status,
            presence: SensorId::from("28"),
            group: GroupId::from("6"),
        };
        (bridge, watched)
    }

    #[tokio::test(start_paused = true)]
    async fn reports_only_changes() {
        let (bridge, watched) = home().await;
        let (tx, mut rx) = mpsc::channel(4);
        spawn_with_interval(Arc::new(bridge.clone()), watched.clone(), Duration::from_secs(1), tx);

        let first = rx.recv().await.expect("first observation");
        assert_eq!(
            first,
            Observation { status: Some(MotionStatus::Armed), presence: Some(false), any_on: false }
        );

        bridge.set_sensor_state(&watched.presence, state_key::PRESENCE, json!(true)).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        let second = rx.recv().await.expect("second observation");
        assert_eq!(second.presence, Some(true));
        assert_eq!(second.status, Some(MotionStatus::Armed));

        let triggered = json!(MotionStatus::SceneTriggered.code());
        bridge.set_sensor_state(&watched.status, state_key::STATUS, triggered).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        let third = rx.recv().await.expect("third observation");
        assert_eq!(third.status, Some(MotionStatus::SceneTriggered));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn locate_needs_a_provisioned_status_sensor() {
        let (bridge, _) = home().await;
        let topology = Topology::from_json(
            r#"{"zone":"0","daylight":"1","switch":"2","rooms":[{"name":"Kitchen","prefix":"Kök",
               "group":"6","presence":"28","light_level":"29","dim_delay_secs":900,
               "scenes":{"by_day_cycle":{"day":"a"}}}]}"#,
        )
        .unwrap();
        let own = Ownership {
            owner: "tester".into(),
            manufacturer: "hue-rules-manager".into(),
            prefix: "hrm".into(),
        };

        let found = locate(&bridge, &topology, &own, "Kök").await.unwrap();
        assert_eq!(found.room, "Kitchen");
        assert_eq!(found.presence, SensorId::from("28"));

        assert!(locate(&bridge, &topology, &own, "Attic").await.is_err());
        let other = Ownership { prefix: "zzz".into(), ..own };
        assert!(locate(&bridge, &topology, &other, "Kitchen").await.is_err());
    }
}
