//! [`Bridge`] over the bridge's v1 REST API.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bridge_core::{
    Bridge, BridgeError, ResourceKind,
    model::{
        Group, GroupId, LightState, NewScene, NewStatusSensor, RuleId, Scene, SceneId, Sensor,
        SensorId,
    },
    rule::{NewRule, Rule},
};
use reqwest::Method;
use serde_json::{Value, json};
use tracing::{debug, info};
use url::Url;

pub mod wire;

use wire::{RESOURCE_NOT_AVAILABLE, Reply};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const STATUS_SENSOR_TYPE: &str = "CLIPGenericStatus";

fn transport(e: impl Display) -> anyhow::Error {
    BridgeError::Transport(e.to_string()).into()
}

#[derive(Clone)]
pub struct HueBridge {
    client: reqwest::Client,
    api: Url,
    username: String,
}

impl HueBridge {
    /// `base` is the bridge root, e.g. `http://192.168.1.2/`.
    pub fn new(base: &Url, username: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build http client")?;
        let api = base.join(&format!("api/{username}/")).context("bridge api url")?;
        Ok(Self { client, api, username: username.to_string() })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.api.join(path).with_context(|| format!("bridge path {path}"))
    }

    async fn get(&self, path: &str, kind: ResourceKind) -> Result<Value> {
        let resp = self.client.get(self.url(path)?).send().await.map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(transport(format!("GET {path}: {status} {body}")));
        }
        let value: Value = resp.json().await.map_err(transport)?;
        // lookups that fail come back as an error envelope with 200 OK
        if value.is_array() {
            let replies: Vec<Reply> = serde_json::from_value(value).map_err(transport)?;
            return match wire::first_error(&replies) {
                Some(e) if e.kind == RESOURCE_NOT_AVAILABLE => {
                    let id = path.rsplit('/').next().unwrap_or(path);
                    Err(BridgeError::not_found(kind, id).into())
                }
                Some(e) => Err(transport(format!("GET {path}: {}", e.description))),
                None => Err(transport(format!("GET {path}: unexpected reply"))),
            };
        }
        Ok(value)
    }

    async fn write(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Vec<Reply>> {
        debug!(%method, path, "bridge request");
        let mut req = self.client.request(method.clone(), self.url(path)?);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(transport(format!("{method} {path}: {status} {text}")));
        }
        resp.json().await.map_err(transport)
    }

    async fn create(&self, kind: ResourceKind, path: &str, name: &str, body: &Value) -> Result<String> {
        let replies = self.write(Method::POST, path, Some(body)).await?;
        if let Some(e) = wire::first_error(&replies) {
            return Err(BridgeError::rejected(kind, name, e.description.clone()).into());
        }
        let id = wire::created_id(&replies)
            .ok_or_else(|| BridgeError::rejected(kind, name, "no id in reply"))?;
        info!(%kind, id = %id, name, "created");
        Ok(id)
    }

    async fn update(&self, kind: ResourceKind, path: &str, name: &str, body: &Value) -> Result<()> {
        let replies = self.write(Method::PUT, path, Some(body)).await?;
        if let Some(e) = wire::first_error(&replies) {
            return Err(BridgeError::rejected(kind, name, e.description.clone()).into());
        }
        Ok(())
    }

    async fn delete(&self, kind: ResourceKind, path: &str, id: &str) -> Result<()> {
        let replies = self.write(Method::DELETE, path, None).await?;
        if let Some(e) = wire::first_error(&replies) {
            return Err(BridgeError::DeleteFailed {
                kind,
                id: id.to_string(),
                reason: e.description.clone(),
            }
            .into());
        }
        info!(%kind, id, "deleted");
        Ok(())
    }
}

#[async_trait]
impl Bridge for HueBridge {
    /// The bridge stamps rules with the whitelist user that created them.
    fn owner(&self) -> &str {
        &self.username
    }

    async fn get_group(&self, id: &GroupId) -> Result<Group> {
        let v = self.get(&format!("groups/{id}"), ResourceKind::Group).await?;
        wire::parse_group(&id.0, v).with_context(|| format!("parse group {id}"))
    }

    async fn get_sensor(&self, id: &SensorId) -> Result<Sensor> {
        let v = self.get(&format!("sensors/{id}"), ResourceKind::Sensor).await?;
        wire::parse_sensor(&id.0, v).with_context(|| format!("parse sensor {id}"))
    }

    async fn list_sensors(&self) -> Result<Vec<Sensor>> {
        let v = self.get("sensors", ResourceKind::Sensor).await?;
        wire::parse_listing(v, wire::parse_sensor).context("parse sensor listing")
    }

    async fn create_status_sensor(&self, sensor: NewStatusSensor) -> Result<SensorId> {
        let body = json!({
            "name": sensor.name,
            "type": STATUS_SENSOR_TYPE,
            "modelid": sensor.model_id,
            "manufacturername": sensor.manufacturer,
            "swversion": sensor.sw_version,
            "uniqueid": sensor.unique_id,
            "state": { "status": sensor.status },
        });
        self.create(ResourceKind::Sensor, "sensors", &sensor.name, &body).await.map(SensorId)
    }

    async fn delete_sensor(&self, id: &SensorId) -> Result<()> {
        self.delete(ResourceKind::Sensor, &format!("sensors/{id}"), &id.0).await
    }

    async fn get_scene(&self, id: &SceneId) -> Result<Scene> {
        let v = self.get(&format!("scenes/{id}"), ResourceKind::Scene).await?;
        wire::parse_scene(&id.0, v).with_context(|| format!("parse scene {id}"))
    }

    async fn list_scenes(&self) -> Result<Vec<Scene>> {
        let v = self.get("scenes", ResourceKind::Scene).await?;
        wire::parse_listing(v, wire::parse_scene).context("parse scene listing")
    }

    async fn create_scene(&self, scene: NewScene) -> Result<SceneId> {
        let lights: Vec<&String> = scene.light_states.keys().collect();
        let body = json!({
            "name": scene.name,
            "type": "GroupScene",
            "group": scene.group,
            "recycle": false,
            "lights": lights,
            "lightstates": scene.light_states,
        });
        self.create(ResourceKind::Scene, "scenes", &scene.name, &body).await.map(SceneId)
    }

    /// One PUT per light; the first rejected light stops the update.
    async fn update_scene(
        &self,
        id: &SceneId,
        light_states: &BTreeMap<String, LightState>,
    ) -> Result<()> {
        for (light, state) in light_states {
            let body = serde_json::to_value(state).map_err(transport)?;
            let path = format!("scenes/{id}/lightstates/{light}");
            self.update(ResourceKind::Scene, &path, &id.0, &body).await?;
        }
        info!(scene_id = %id, lights = light_states.len(), "updated scene");
        Ok(())
    }

    async fn delete_scene(&self, id: &SceneId) -> Result<()> {
        self.delete(ResourceKind::Scene, &format!("scenes/{id}"), &id.0).await
    }

    async fn list_rules(&self) -> Result<Vec<Rule>> {
        let v = self.get("rules", ResourceKind::Rule).await?;
        wire::parse_listing(v, wire::parse_rule).context("parse rule listing")
    }

    async fn create_rule(&self, rule: &NewRule) -> Result<RuleId> {
        let body = wire::render_rule(rule)
            .map_err(|e| BridgeError::rejected(ResourceKind::Rule, &rule.name, e.to_string()))?;
        self.create(ResourceKind::Rule, "rules", &rule.name, &body).await.map(RuleId)
    }

    async fn delete_rule(&self, id: &RuleId) -> Result<()> {
        self.delete(ResourceKind::Rule, &format!("rules/{id}"), &id.0).await
    }
}
