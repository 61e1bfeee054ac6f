use std::collections::BTreeMap;

use bridge_core::{
    Bridge, BridgeError, BridgeSnapshot, InMemoryBridge, ResourceKind,
    model::{
        Group, GroupId, GroupKind, LightState, NewScene, NewStatusSensor, SceneId, Sensor, SensorId,
        SensorKind,
    },
    rule::{Action, Condition, NewRule},
    status::{MotionStatus, StatusCode},
};
use serde_json::json;

fn seeded() -> InMemoryBridge {
    let snapshot = BridgeSnapshot {
        groups: vec![Group {
            id: GroupId::from("6"),
            name: "Kök".into(),
            kind: GroupKind::Room,
            lights: vec!["11".into(), "12".into()],
            any_on: false,
            all_on: false,
        }],
        sensors: vec![Sensor {
            id: SensorId::from("28"),
            name: "Kitchen sensor".into(),
            kind: SensorKind::Presence,
            manufacturer: Some("Signify".into()),
            unique_id: Some("00:17:88:01:02:03".into()),
            model_id: Some("SML001".into()),
            sw_version: None,
            state: BTreeMap::from([("presence".to_string(), json!(false))]),
        }],
        ..Default::default()
    };
    InMemoryBridge::from_snapshot("user-1", snapshot)
}

fn status_sensor(unique_id: &str) -> NewStatusSensor {
    NewStatusSensor {
        name: "kitchen sensor status".into(),
        unique_id: unique_id.into(),
        manufacturer: "hue-rules-manager".into(),
        model_id: "software".into(),
        sw_version: "1.0".into(),
        status: MotionStatus::Armed.code(),
    }
}

#[tokio::test]
async fn missing_group_is_not_found() {
    let bridge = seeded();
    let err = bridge.get_group(&GroupId::from("99")).await.unwrap_err();
    match err.downcast_ref::<BridgeError>() {
        Some(BridgeError::NotFound { kind, id }) => {
            assert_eq!(*kind, ResourceKind::Group);
            assert_eq!(id, "99");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn status_sensor_gets_next_free_id_and_initial_status() {
    let bridge = seeded();
    let id = bridge.create_status_sensor(status_sensor("hrm-0")).await.unwrap();
    assert_eq!(id, SensorId::from("29"));

    let sensor = bridge.get_sensor(&id).await.unwrap();
    assert_eq!(sensor.kind, SensorKind::GenericStatus);
    assert_eq!(sensor.status(), Some(0));
    assert_eq!(sensor.manufacturer.as_deref(), Some("hue-rules-manager"));
}

#[tokio::test]
async fn duplicate_unique_id_is_rejected() {
    let bridge = seeded();
    bridge.create_status_sensor(status_sensor("hrm-0")).await.unwrap();
    let err = bridge.create_status_sensor(status_sensor("hrm-0")).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<BridgeError>(), Some(BridgeError::Rejected { .. })));
}

#[tokio::test]
async fn rules_are_owned_by_the_creating_user() {
    let bridge = seeded();
    let status = bridge.create_status_sensor(status_sensor("hrm-0")).await.unwrap();
    let rule = NewRule::new("Kök arm")
        .when(Condition::any_on(&GroupId::from("6"), false))
        .then(Action::set_status(&status, MotionStatus::Armed));

    let id = bridge.create_rule(&rule).await.unwrap();
    let rules = bridge.list_rules().await.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].id, id);
    assert_eq!(rules[0].owner.as_deref(), Some("user-1"));
}

#[tokio::test]
async fn malformed_rules_are_rejected() {
    let bridge = seeded();
    let group = GroupId::from("6");

    let too_long = NewRule::new("x".repeat(33))
        .when(Condition::any_on(&group, false))
        .then(Action::power(&group, false));
    assert!(bridge.create_rule(&too_long).await.is_err());

    let no_actions = NewRule::new("empty").when(Condition::any_on(&group, false));
    assert!(bridge.create_rule(&no_actions).await.is_err());

    let unknown_sensor = NewRule::new("ghost")
        .when(Condition::status_is(&SensorId::from("404"), MotionStatus::Armed))
        .then(Action::power(&group, false));
    assert!(bridge.create_rule(&unknown_sensor).await.is_err());

    let ok = NewRule::new("dup").when(Condition::any_on(&group, false)).then(Action::power(&group, false));
    bridge.create_rule(&ok).await.unwrap();
    let err = bridge.create_rule(&ok).await.unwrap_err();
    assert!(err.to_string().contains("already exists"));
}

#[tokio::test]
async fn deleting_unknown_resources_fails() {
    let bridge = seeded();
    let err = bridge.delete_sensor(&SensorId::from("404")).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BridgeError>(),
        Some(BridgeError::DeleteFailed { kind: ResourceKind::Sensor, .. })
    ));
}

#[tokio::test]
async fn scenes_require_an_existing_group() {
    let bridge = seeded();
    let bad = NewScene { name: "hrm tmp".into(), group: GroupId::from("99"), light_states: BTreeMap::new() };
    assert!(bridge.create_scene(bad).await.is_err());

    let good = NewScene { name: "hrm tmp".into(), group: GroupId::from("6"), light_states: BTreeMap::new() };
    let id = bridge.create_scene(good).await.unwrap();
    assert_eq!(id.0.len(), 15);
    bridge.delete_scene(&id).await.unwrap();
    assert!(bridge.list_scenes().await.unwrap().is_empty());
}

#[tokio::test]
async fn scene_updates_touch_only_named_lights() {
    let bridge = seeded();
    let full = BTreeMap::from([
        ("11".to_string(), LightState::FULL),
        ("12".to_string(), LightState::FULL),
    ]);
    let new = NewScene { name: "Kök auto".into(), group: GroupId::from("6"), light_states: full };
    let id = bridge.create_scene(new).await.unwrap();

    let dim = LightState { on: true, bri: Some(10) };
    bridge.update_scene(&id, &BTreeMap::from([("11".to_string(), dim)])).await.unwrap();
    let scene = bridge.get_scene(&id).await.unwrap();
    assert_eq!(scene.light_states["11"], dim);
    assert_eq!(scene.light_states["12"], LightState::FULL);

    let stranger = BTreeMap::from([("40".to_string(), dim)]);
    let err = bridge.update_scene(&id, &stranger).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BridgeError>(),
        Some(BridgeError::Rejected { kind: ResourceKind::Scene, .. })
    ));

    let err = bridge.update_scene(&SceneId::from("gone"), &BTreeMap::new()).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<BridgeError>(), Some(BridgeError::NotFound { .. })));
}
