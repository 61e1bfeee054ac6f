pub mod auto_scenes;
pub mod config;
pub mod directory;
pub mod monitor;
pub mod provisioning;
pub mod registry;
pub mod telemetry;
pub mod topology;
pub mod wiring;

use anyhow::{Context, anyhow};
use chrono::{Local, Timelike};
use rand::{SeedableRng, rngs::StdRng};
use tracing::info;

use crate::{
    config::{Config, Mode},
    provisioning::provision,
    telemetry::init_tracing,
    topology::Topology,
    wiring::build_bridge,
};

pub async fn run(cfg: Config) -> anyhow::Result<()> {
    init_tracing(&cfg)?;
    let topology = Topology::load(&cfg.topology)?;
    let bridge = build_bridge(&cfg, &topology)?;
    info!(mode = %cfg.mode, bridge = %cfg.bridge, prefix = %cfg.prefix, "starting");

    match cfg.mode {
        Mode::Provision => {
            let report = provision(bridge.as_ref(), &topology, &cfg.prefix)
                .await
                .context("provisioning failed")?;
            info!(
                deleted_rules = report.deleted.rules,
                deleted_sensors = report.deleted.sensors,
                deleted_scenes = report.deleted.scenes,
                sensors = report.created_sensors,
                scenes = report.created_scenes,
                rules = report.rules.len(),
                "provisioned"
            );
            Ok(())
        }
        Mode::Monitor => {
            let room = cfg
                .monitor_room
                .as_deref()
                .ok_or_else(|| anyhow!("HUE_MONITOR_ROOM is required in monitor mode"))?;
            let ownership = provisioning::ownership(bridge.as_ref(), &cfg.prefix);
            let watched = monitor::locate(bridge.as_ref(), &topology, &ownership, room).await?;
            monitor::run(bridge, watched, cfg.monitor_interval).await
        }
        Mode::AutoScenes => {
            let hour = Local::now().hour();
            let mut rng = StdRng::from_entropy();
            let written = auto_scenes::refresh(bridge.as_ref(), &topology, hour, &mut rng)
                .await
                .context("auto scene refresh failed")?;
            info!(scenes = written, hour, "auto scenes refreshed");
            Ok(())
        }
    }
}
