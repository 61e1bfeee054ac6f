use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::bridge::Bridge;
use crate::error::{BridgeError, ResourceKind};
use crate::model::{
    Group, GroupId, LightState, NewScene, NewStatusSensor, RuleId, Scene, SceneId, Sensor, SensorId,
    SensorKind, state_key,
};
use crate::rule::{Action, Address, MAX_ACTIONS, MAX_CONDITIONS, MAX_RULE_NAME_LEN, NewRule, Rule};

/// Every resource held by a bridge, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeSnapshot {
    pub groups: Vec<Group>,
    pub sensors: Vec<Sensor>,
    pub scenes: Vec<Scene>,
    pub rules: Vec<Rule>,
}

impl BridgeSnapshot {
    pub fn group(&self, id: &GroupId) -> Option<&Group> {
        self.groups.iter().find(|g| &g.id == id)
    }

    pub fn sensor(&self, id: &SensorId) -> Option<&Sensor> {
        self.sensors.iter().find(|s| &s.id == id)
    }

    pub fn scene(&self, id: &SceneId) -> Option<&Scene> {
        self.scenes.iter().find(|s| &s.id == id)
    }

    pub fn rule_named(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    fn address_exists(&self, address: &Address) -> bool {
        match address {
            Address::Sensor { sensor, .. } => self.sensor(sensor).is_some(),
            Address::Group { group, .. } => self.group(group).is_some(),
        }
    }
}

/// A bridge kept in memory, used for dry runs and tests.
///
/// It enforces the same limits a real bridge does, so a rule set accepted
/// here is shaped correctly for upload.
#[derive(Clone)]
pub struct InMemoryBridge {
    owner: String,
    inner: Arc<RwLock<BridgeSnapshot>>,
}

impl InMemoryBridge {
    pub fn new(owner: impl Into<String>) -> Self {
        Self::from_snapshot(owner, BridgeSnapshot::default())
    }

    pub fn from_snapshot(owner: impl Into<String>, snapshot: BridgeSnapshot) -> Self {
        Self { owner: owner.into(), inner: Arc::new(RwLock::new(snapshot)) }
    }

    pub async fn snapshot(&self) -> BridgeSnapshot {
        self.inner.read().await.clone()
    }

    pub async fn insert_group(&self, group: Group) {
        self.inner.write().await.groups.push(group);
    }

    pub async fn insert_sensor(&self, sensor: Sensor) {
        self.inner.write().await.sensors.push(sensor);
    }

    pub async fn insert_scene(&self, scene: Scene) {
        self.inner.write().await.scenes.push(scene);
    }

    /// Adds a rule created by someone else.
    pub async fn insert_rule(&self, rule: Rule) {
        self.inner.write().await.rules.push(rule);
    }

    pub async fn set_sensor_state(&self, id: &SensorId, key: &str, value: Value) -> Result<()> {
        let mut g = self.inner.write().await;
        let sensor = g
            .sensors
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| BridgeError::not_found(ResourceKind::Sensor, id))?;
        sensor.state.insert(key.to_string(), value);
        Ok(())
    }
}

fn next_numeric_id<'a>(ids: impl Iterator<Item = &'a str>) -> String {
    let max = ids.filter_map(|id| id.parse::<u64>().ok()).max().unwrap_or(0);
    (max + 1).to_string()
}

fn check_rule(snapshot: &BridgeSnapshot, rule: &NewRule) -> std::result::Result<(), String> {
    if rule.name.is_empty() || rule.name.chars().count() > MAX_RULE_NAME_LEN {
        return Err(format!("name must be 1 to {MAX_RULE_NAME_LEN} characters"));
    }
    if rule.conditions.is_empty() || rule.conditions.len() > MAX_CONDITIONS {
        return Err(format!("needs 1 to {MAX_CONDITIONS} conditions"));
    }
    if rule.actions.is_empty() || rule.actions.len() > MAX_ACTIONS {
        return Err(format!("needs 1 to {MAX_ACTIONS} actions"));
    }
    if snapshot.rule_named(&rule.name).is_some() {
        return Err("a rule with this name already exists".into());
    }
    for condition in &rule.conditions {
        if let Some(address) = condition.address()
            && !snapshot.address_exists(address)
        {
            return Err(format!("condition refers to unknown resource {address}"));
        }
    }
    for action in &rule.actions {
        let known = match action {
            Action::SetStatus { sensor, .. } => snapshot.sensor(sensor).is_some(),
            Action::ApplyScene { group, scene, .. } => {
                snapshot.group(group).is_some() && snapshot.scene(scene).is_some()
            }
            Action::SetPower { group, .. } | Action::IncrementBrightness { group, .. } => {
                snapshot.group(group).is_some()
            }
            Action::StoreLightState { scene } => snapshot.scene(scene).is_some(),
        };
        if !known {
            return Err(format!("action refers to unknown resource: {action:?}"));
        }
    }
    Ok(())
}

#[async_trait]
impl Bridge for InMemoryBridge {
    fn owner(&self) -> &str {
        &self.owner
    }

    async fn get_group(&self, id: &GroupId) -> Result<Group> {
        let g = self.inner.read().await;
        Ok(g.group(id).cloned().ok_or_else(|| BridgeError::not_found(ResourceKind::Group, id))?)
    }

    async fn get_sensor(&self, id: &SensorId) -> Result<Sensor> {
        let g = self.inner.read().await;
        Ok(g.sensor(id).cloned().ok_or_else(|| BridgeError::not_found(ResourceKind::Sensor, id))?)
    }

    async fn list_sensors(&self) -> Result<Vec<Sensor>> {
        Ok(self.inner.read().await.sensors.clone())
    }

    async fn create_status_sensor(&self, new: NewStatusSensor) -> Result<SensorId> {
        let mut g = self.inner.write().await;
        if new.name.is_empty() || new.name.chars().count() > MAX_RULE_NAME_LEN {
            return Err(BridgeError::rejected(ResourceKind::Sensor, &new.name, "invalid name").into());
        }
        if g.sensors.iter().any(|s| s.unique_id.as_deref() == Some(new.unique_id.as_str())) {
            return Err(BridgeError::rejected(
                ResourceKind::Sensor,
                &new.name,
                format!("unique id {} already in use", new.unique_id),
            )
            .into());
        }
        let id = SensorId(next_numeric_id(g.sensors.iter().map(|s| s.id.0.as_str())));
        let state = BTreeMap::from([
            (state_key::STATUS.to_string(), json!(new.status)),
            (state_key::LAST_UPDATED.to_string(), json!("none")),
        ]);
        g.sensors.push(Sensor {
            id: id.clone(),
            name: new.name,
            kind: SensorKind::GenericStatus,
            manufacturer: Some(new.manufacturer),
            unique_id: Some(new.unique_id),
            model_id: Some(new.model_id),
            sw_version: Some(new.sw_version),
            state,
        });
        Ok(id)
    }

    async fn delete_sensor(&self, id: &SensorId) -> Result<()> {
        let mut g = self.inner.write().await;
        let before = g.sensors.len();
        g.sensors.retain(|s| &s.id != id);
        if g.sensors.len() == before {
            return Err(BridgeError::DeleteFailed {
                kind: ResourceKind::Sensor,
                id: id.to_string(),
                reason: "not found".into(),
            }
            .into());
        }
        Ok(())
    }

    async fn get_scene(&self, id: &SceneId) -> Result<Scene> {
        let g = self.inner.read().await;
        Ok(g.scene(id).cloned().ok_or_else(|| BridgeError::not_found(ResourceKind::Scene, id))?)
    }

    async fn list_scenes(&self) -> Result<Vec<Scene>> {
        Ok(self.inner.read().await.scenes.clone())
    }

    async fn create_scene(&self, new: NewScene) -> Result<SceneId> {
        let mut g = self.inner.write().await;
        if g.group(&new.group).is_none() {
            return Err(BridgeError::rejected(
                ResourceKind::Scene,
                &new.name,
                format!("unknown group {}", new.group),
            )
            .into());
        }
        let id = SceneId(Uuid::new_v4().simple().to_string()[..15].to_string());
        g.scenes.push(Scene {
            id: id.clone(),
            name: new.name,
            group: new.group,
            light_states: new.light_states,
        });
        Ok(id)
    }

    async fn update_scene(
        &self,
        id: &SceneId,
        light_states: &BTreeMap<String, LightState>,
    ) -> Result<()> {
        let mut g = self.inner.write().await;
        let scene = g
            .scenes
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| BridgeError::not_found(ResourceKind::Scene, id))?;
        if let Some(light) = light_states.keys().find(|l| !scene.light_states.contains_key(*l)) {
            return Err(BridgeError::rejected(
                ResourceKind::Scene,
                &scene.name,
                format!("light {light} is not part of the scene"),
            )
            .into());
        }
        for (light, state) in light_states {
            scene.light_states.insert(light.clone(), *state);
        }
        debug!(scene_id = %id, lights = light_states.len(), "updated scene");
        Ok(())
    }

    async fn delete_scene(&self, id: &SceneId) -> Result<()> {
        let mut g = self.inner.write().await;
        let before = g.scenes.len();
        g.scenes.retain(|s| &s.id != id);
        if g.scenes.len() == before {
            return Err(BridgeError::DeleteFailed {
                kind: ResourceKind::Scene,
                id: id.to_string(),
                reason: "not found".into(),
            }
            .into());
        }
        Ok(())
    }

    async fn list_rules(&self) -> Result<Vec<Rule>> {
        Ok(self.inner.read().await.rules.clone())
    }

    async fn create_rule(&self, rule: &NewRule) -> Result<RuleId> {
        let mut g = self.inner.write().await;
        check_rule(&g, rule)
            .map_err(|reason| BridgeError::rejected(ResourceKind::Rule, &rule.name, reason))?;
        let id = RuleId(next_numeric_id(g.rules.iter().map(|r| r.id.0.as_str())));
        g.rules.push(rule.clone().into_rule(id.clone(), Some(self.owner.clone())));
        debug!(rule_id = %id, rule = %rule.name, "stored rule");
        Ok(id)
    }

    async fn delete_rule(&self, id: &RuleId) -> Result<()> {
        let mut g = self.inner.write().await;
        let before = g.rules.len();
        g.rules.retain(|r| &r.id != id);
        if g.rules.len() == before {
            return Err(BridgeError::DeleteFailed {
                kind: ResourceKind::Rule,
                id: id.to_string(),
                reason: "not found".into(),
            }
            .into());
        }
        Ok(())
    }
}
