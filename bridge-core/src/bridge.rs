use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{
    Group, GroupId, LightState, NewScene, NewStatusSensor, RuleId, Scene, SceneId, Sensor,
    SensorId,
};
use crate::rule::{NewRule, Rule};

/// CRUD surface of a lighting bridge.
///
/// Errors are [`crate::BridgeError`] wrapped in `anyhow::Error`, so callers
/// can add context and still `downcast_ref` to classify a failure.
#[async_trait]
pub trait Bridge: Send + Sync {
    /// Name rules created through this handle are owned by.
    fn owner(&self) -> &str;

    async fn get_group(&self, id: &GroupId) -> Result<Group>;
    async fn get_sensor(&self, id: &SensorId) -> Result<Sensor>;
    async fn list_sensors(&self) -> Result<Vec<Sensor>>;
    async fn create_status_sensor(&self, sensor: NewStatusSensor) -> Result<SensorId>;
    async fn delete_sensor(&self, id: &SensorId) -> Result<()>;

    async fn get_scene(&self, id: &SceneId) -> Result<Scene>;
    async fn list_scenes(&self) -> Result<Vec<Scene>>;
    async fn create_scene(&self, scene: NewScene) -> Result<SceneId>;
    /// Rewrites the stored state of lights already in the scene. Lights not
    /// named keep their state.
    async fn update_scene(
        &self,
        id: &SceneId,
        light_states: &BTreeMap<String, LightState>,
    ) -> Result<()>;
    async fn delete_scene(&self, id: &SceneId) -> Result<()>;

    async fn list_rules(&self) -> Result<Vec<Rule>>;
    async fn create_rule(&self, rule: &NewRule) -> Result<RuleId>;
    async fn delete_rule(&self, id: &RuleId) -> Result<()>;
}

/// Tags that mark artifacts as previously generated by us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    pub owner: String,
    pub manufacturer: String,
    pub prefix: String,
}

impl Ownership {
    pub fn owns_rule(&self, rule: &Rule) -> bool {
        rule.owner.as_deref() == Some(self.owner.as_str())
    }

    pub fn owns_sensor(&self, sensor: &Sensor) -> bool {
        sensor.manufacturer.as_deref() == Some(self.manufacturer.as_str())
            && sensor.unique_id.as_deref().is_some_and(|u| u.starts_with(&self.prefix))
    }

    pub fn owns_scene(&self, scene: &Scene) -> bool {
        scene.name.starts_with(&self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SensorKind;

    fn ownership() -> Ownership {
        Ownership {
            owner: "user-1".into(),
            manufacturer: "hue-rules-manager".into(),
            prefix: "hrm".into(),
        }
    }

    fn sensor(manufacturer: Option<&str>, unique_id: Option<&str>) -> Sensor {
        Sensor {
            id: SensorId::from("1"),
            name: "s".into(),
            kind: SensorKind::GenericStatus,
            manufacturer: manufacturer.map(str::to_string),
            unique_id: unique_id.map(str::to_string),
            model_id: None,
            sw_version: None,
            state: BTreeMap::new(),
        }
    }

    #[test]
    fn sensor_needs_both_manufacturer_and_prefix() {
        let o = ownership();
        assert!(o.owns_sensor(&sensor(Some("hue-rules-manager"), Some("hrm-3"))));
        assert!(!o.owns_sensor(&sensor(Some("hue-rules-manager"), Some("other-3"))));
        assert!(!o.owns_sensor(&sensor(Some("Signify"), Some("hrm-3"))));
        assert!(!o.owns_sensor(&sensor(None, None)));
    }

    #[test]
    fn rule_ownership_follows_owner() {
        let o = ownership();
        let mine = NewRule::new("a").into_rule(RuleId::from("1"), Some("user-1".into()));
        let theirs = NewRule::new("b").into_rule(RuleId::from("2"), Some("app".into()));
        assert!(o.owns_rule(&mine));
        assert!(!o.owns_rule(&theirs));
    }
}
