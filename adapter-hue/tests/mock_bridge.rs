use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use adapter_hue::HueBridge;
use anyhow::Result;
use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post, put},
};
use bridge_core::{
    Bridge, BridgeError, ResourceKind,
    model::{
        GroupId, GroupKind, LightState, NewStatusSensor, RuleId, SceneId, SensorId, SensorKind,
    },
    rule::{Action, Address, Condition, NewRule},
    status::MotionStatus,
};
use serde_json::{Value, json};
use url::Url;

const USER: &str = "abc123";

#[derive(Clone, Default)]
struct Recorded {
    posts: Arc<Mutex<Vec<Value>>>,
    puts: Arc<Mutex<Vec<(String, Value)>>>,
}

fn error_envelope(kind: u32, address: &str, description: &str) -> Value {
    json!([{ "error": { "type": kind, "address": address, "description": description } }])
}

async fn get_group(Path((_user, id)): Path<(String, String)>) -> Json<Value> {
    if id != "6" {
        return Json(error_envelope(3, &format!("/groups/{id}"), "resource not available"));
    }
    Json(json!({
        "name": "Kitchen",
        "type": "Room",
        "lights": ["4", "5"],
        "state": { "any_on": true, "all_on": false }
    }))
}

async fn list_sensors() -> Json<Value> {
    Json(json!({
        "28": {
            "name": "Kitchen motion",
            "type": "ZLLPresence",
            "state": { "presence": true, "lastupdated": "2024-01-10T19:00:00" }
        },
        "41": {
            "name": "hrm kitchen status",
            "type": "CLIPGenericStatus",
            "manufacturername": "hue-rules-manager",
            "uniqueid": "hrm-3",
            "state": { "status": 2, "lastupdated": "none" }
        }
    }))
}

async fn create_sensor(State(rec): State<Recorded>, Json(body): Json<Value>) -> Json<Value> {
    rec.posts.lock().unwrap().push(body);
    Json(json!([{ "success": { "id": "77" } }]))
}

async fn create_rule(State(rec): State<Recorded>, Json(body): Json<Value>) -> Json<Value> {
    let too_long = body["name"].as_str().is_some_and(|n| n.chars().count() > 32);
    rec.posts.lock().unwrap().push(body);
    if too_long {
        return Json(error_envelope(7, "/rules/name", "invalid value for parameter, name"));
    }
    Json(json!([{ "success": { "id": "12" } }]))
}

async fn delete_rule(Path((_user, id)): Path<(String, String)>) -> Json<Value> {
    if id == "99" {
        return Json(error_envelope(3, "/rules/99", "resource, /rules/99, not available"));
    }
    Json(json!([{ "success": format!("/rules/{id} deleted") }]))
}

async fn get_scene(Path((_user, id)): Path<(String, String)>) -> Json<Value> {
    if id != "auto-kitchen" {
        return Json(error_envelope(3, &format!("/scenes/{id}"), "resource not available"));
    }
    Json(json!({
        "name": "Kitchen auto",
        "type": "GroupScene",
        "group": "6",
        "lights": ["4", "5"],
        "lightstates": {
            "4": { "on": true, "bri": 254 },
            "5": { "on": false, "bri": 254 }
        }
    }))
}

async fn put_light_state(
    State(rec): State<Recorded>,
    Path((_user, id, light)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Json<Value> {
    rec.puts.lock().unwrap().push((light.clone(), body));
    if light != "4" && light != "5" {
        return Json(error_envelope(
            3,
            &format!("/scenes/{id}/lightstates/{light}"),
            "resource, light, not available",
        ));
    }
    let address = format!("/scenes/{id}/lightstates/{light}");
    Json(json!([{ "success": { "address": address, "value": "updated" } }]))
}

async fn serve() -> Result<(HueBridge, Recorded)> {
    let rec = Recorded::default();
    let app = Router::new()
        .route("/api/{user}/groups/{id}", get(get_group))
        .route("/api/{user}/sensors", get(list_sensors).post(create_sensor))
        .route("/api/{user}/scenes/{id}", get(get_scene))
        .route("/api/{user}/scenes/{id}/lightstates/{light}", put(put_light_state))
        .route("/api/{user}/rules", post(create_rule))
        .route("/api/{user}/rules/{id}", delete(delete_rule))
        .with_state(rec.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let base = Url::parse(&format!("http://{addr}/"))?;
    Ok((HueBridge::new(&base, USER)?, rec))
}

#[tokio::test]
async fn reads_a_group() -> Result<()> {
    let (bridge, _) = serve().await?;
    let group = bridge.get_group(&GroupId::from("6")).await?;
    assert_eq!(group.kind, GroupKind::Room);
    assert_eq!(group.lights, vec!["4".to_string(), "5".to_string()]);
    assert!(group.any_on);
    Ok(())
}

#[tokio::test]
async fn missing_group_is_not_found() -> Result<()> {
    let (bridge, _) = serve().await?;
    let err = bridge.get_group(&GroupId::from("404")).await.unwrap_err();
    match err.downcast_ref::<BridgeError>() {
        Some(BridgeError::NotFound { kind, id }) => {
            assert_eq!(*kind, ResourceKind::Group);
            assert_eq!(id, "404");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn lists_sensors_with_vendor_fields() -> Result<()> {
    let (bridge, _) = serve().await?;
    let sensors = bridge.list_sensors().await?;
    assert_eq!(sensors.len(), 2);
    let status = sensors.iter().find(|s| s.id == SensorId::from("41")).unwrap();
    assert_eq!(status.kind, SensorKind::GenericStatus);
    assert_eq!(status.unique_id.as_deref(), Some("hrm-3"));
    assert_eq!(status.status(), Some(2));
    Ok(())
}

#[tokio::test]
async fn creates_status_sensor() -> Result<()> {
    let (bridge, rec) = serve().await?;
    let id = bridge
        .create_status_sensor(NewStatusSensor {
            name: "hrm kitchen".into(),
            unique_id: "hrm-1".into(),
            manufacturer: "hue-rules-manager".into(),
            model_id: "motion status".into(),
            sw_version: "1".into(),
            status: 0,
        })
        .await?;
    assert_eq!(id, SensorId::from("77"));
    let posted = rec.posts.lock().unwrap()[0].clone();
    assert_eq!(posted["type"], "CLIPGenericStatus");
    assert_eq!(posted["state"], json!({ "status": 0 }));
    Ok(())
}

#[tokio::test]
async fn uploads_rendered_rule() -> Result<()> {
    let (bridge, rec) = serve().await?;
    let status = SensorId::from("40");
    let rule = NewRule::new("Kök off")
        .when(Condition::status_is(&status, MotionStatus::Dimmed))
        .when(Condition::stable_for(Address::last_updated(&status), Duration::from_secs(30)))
        .then(Action::power(&GroupId::from("6"), false))
        .then(Action::set_status(&status, MotionStatus::Armed));

    assert_eq!(bridge.create_rule(&rule).await?, RuleId::from("12"));
    assert_eq!(bridge.owner(), USER);

    let posted = rec.posts.lock().unwrap()[0].clone();
    assert_eq!(posted["name"], "Kök off");
    assert_eq!(
        posted["conditions"][1],
        json!({ "address": "/sensors/40/state/lastupdated", "operator": "ddx", "value": "PT00:00:30" })
    );
    assert_eq!(posted["actions"][0]["body"], json!({ "on": false }));
    Ok(())
}

#[tokio::test]
async fn rejected_rule_carries_the_bridge_reason() -> Result<()> {
    let (bridge, _) = serve().await?;
    let rule = NewRule::new("n".repeat(40))
        .when(Condition::any_on(&GroupId::from("6"), false))
        .then(Action::power(&GroupId::from("6"), false));
    let err = bridge.create_rule(&rule).await.unwrap_err();
    match err.downcast_ref::<BridgeError>() {
        Some(BridgeError::Rejected { kind, reason, .. }) => {
            assert_eq!(*kind, ResourceKind::Rule);
            assert!(reason.contains("invalid value"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn failed_delete_is_reported() -> Result<()> {
    let (bridge, _) = serve().await?;
    bridge.delete_rule(&RuleId::from("12")).await?;
    let err = bridge.delete_rule(&RuleId::from("99")).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BridgeError>(),
        Some(BridgeError::DeleteFailed { kind: ResourceKind::Rule, .. })
    ));
    Ok(())
}

#[tokio::test]
async fn reads_a_scene_with_its_light_states() -> Result<()> {
    let (bridge, _) = serve().await?;
    let scene = bridge.get_scene(&SceneId::from("auto-kitchen")).await?;
    assert_eq!(scene.group, GroupId::from("6"));
    assert_eq!(scene.light_states["5"], LightState { on: false, bri: Some(254) });

    let err = bridge.get_scene(&SceneId::from("gone")).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BridgeError>(),
        Some(BridgeError::NotFound { kind: ResourceKind::Scene, .. })
    ));
    Ok(())
}

#[tokio::test]
async fn scene_update_puts_each_light_state() -> Result<()> {
    let (bridge, rec) = serve().await?;
    let states = BTreeMap::from([
        ("4".to_string(), LightState { on: true, bri: Some(50) }),
        ("5".to_string(), LightState { on: false, bri: Some(50) }),
    ]);
    bridge.update_scene(&SceneId::from("auto-kitchen"), &states).await?;

    let puts = rec.puts.lock().unwrap().clone();
    assert_eq!(
        puts,
        vec![
            ("4".to_string(), json!({ "on": true, "bri": 50 })),
            ("5".to_string(), json!({ "on": false, "bri": 50 })),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn scene_update_with_an_unknown_light_is_rejected() -> Result<()> {
    let (bridge, _) = serve().await?;
    let states = BTreeMap::from([("9".to_string(), LightState { on: true, bri: None })]);
    let err = bridge.update_scene(&SceneId::from("auto-kitchen"), &states).await.unwrap_err();
    match err.downcast_ref::<BridgeError>() {
        Some(BridgeError::Rejected { kind, reason, .. }) => {
            assert_eq!(*kind, ResourceKind::Scene);
            assert!(reason.contains("not available"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}
