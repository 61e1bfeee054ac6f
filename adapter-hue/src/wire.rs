//! Translation between the rule representation and the bridge's JSON.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use bridge_core::{
    model::{
        Group, GroupId, GroupKind, LightState, RuleId, Scene, SceneId, Sensor, SensorId,
        SensorKind,
    },
    rule::{Action, Address, Condition, GroupAttr, NewRule, Rule, SensorAttr, TimeWindow},
};
use chrono::NaiveTime;
use serde::Deserialize;
use serde_json::{Value, json};

const LOCALTIME: &str = "/config/localtime";

/// One entry of the `[{"success": ..}, {"error": ..}]` envelope every
/// write returns.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reply {
    Success(Value),
    Error(ReplyError),
}

#[derive(Debug, Deserialize)]
pub struct ReplyError {
    #[serde(rename = "type")]
    pub kind: u32,
    #[serde(default)]
    pub address: String,
    pub description: String,
}

/// Error type the bridge uses for a resource that does not exist.
pub const RESOURCE_NOT_AVAILABLE: u32 = 3;

/// First error of an envelope, if any.
pub fn first_error(replies: &[Reply]) -> Option<&ReplyError> {
    replies.iter().find_map(|r| match r {
        Reply::Error(e) => Some(e),
        Reply::Success(_) => None,
    })
}

/// The id handed back by a create call.
pub fn created_id(replies: &[Reply]) -> Option<String> {
    replies.iter().find_map(|r| match r {
        Reply::Success(v) => v.get("id").and_then(Value::as_str).map(str::to_string),
        Reply::Error(_) => None,
    })
}

fn address_path(address: &Address) -> String {
    match address {
        Address::Sensor { sensor, attr } => format!("/sensors/{sensor}/state/{}", attr.state_key()),
        Address::Group { group, attr } => {
            let key = match attr {
                GroupAttr::AnyOn => "any_on",
                GroupAttr::AllOn => "all_on",
            };
            format!("/groups/{group}/state/{key}")
        }
    }
}

fn parse_address(path: &str) -> Option<Address> {
    let parts: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    match parts.as_slice() {
        ["sensors", id, "state", key] => Some(Address::Sensor {
            sensor: SensorId::from(*id),
            attr: SensorAttr::from_state_key(key)?,
        }),
        ["groups", id, "state", "any_on"] => {
            Some(Address::Group { group: GroupId::from(*id), attr: GroupAttr::AnyOn })
        }
        ["groups", id, "state", "all_on"] => {
            Some(Address::Group { group: GroupId::from(*id), attr: GroupAttr::AllOn })
        }
        _ => None,
    }
}

/// `PThh:mm:ss`, the only duration form rule conditions accept.
pub fn iso_duration(d: Duration) -> String {
    let secs = d.as_secs();
    format!("PT{:02}:{:02}:{:02}", secs / 3600, secs % 3600 / 60, secs % 60)
}

fn parse_iso_duration(s: &str) -> Option<Duration> {
    let rest = s.strip_prefix("PT")?;
    let mut parts = rest.split(':').map(|p| p.parse::<u64>().ok());
    let (h, m, sec) = (parts.next()??, parts.next()??, parts.next()??);
    Some(Duration::from_secs(h * 3600 + m * 60 + sec))
}

fn window_value(w: &TimeWindow) -> String {
    format!("T{}/T{}", w.start.format("%H:%M:%S"), w.end.format("%H:%M:%S"))
}

fn parse_window(s: &str) -> Option<TimeWindow> {
    let (start, end) = s.split_once('/')?;
    let time = |t: &str| NaiveTime::parse_from_str(t.strip_prefix('T')?, "%H:%M:%S").ok();
    Some(TimeWindow::new(time(start)?, time(end)?))
}

/// Condition values travel as strings.
fn scalar(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_scalar(s: &str) -> Value {
    match s {
        "true" => json!(true),
        "false" => json!(false),
        _ => s.parse::<i64>().map(Value::from).unwrap_or_else(|_| json!(s)),
    }
}

/// 100 ms steps.
pub fn transition_time(d: Duration) -> u64 {
    (d.as_millis() / 100) as u64
}

pub fn render_condition(c: &Condition) -> Result<Value> {
    let rendered = match c {
        Condition::Equals { address, value } => {
            json!({ "address": address_path(address), "operator": "eq", "value": scalar(value) })
        }
        Condition::LessThan { address, value } => {
            json!({ "address": address_path(address), "operator": "lt", "value": value.to_string() })
        }
        Condition::GreaterThan { address, value } => {
            json!({ "address": address_path(address), "operator": "gt", "value": value.to_string() })
        }
        Condition::Changed { address } => {
            json!({ "address": address_path(address), "operator": "dx" })
        }
        Condition::ChangedDelayed { address, delay } => json!({
            "address": address_path(address),
            "operator": "ddx",
            "value": iso_duration(*delay),
        }),
        Condition::InWindow { window } => {
            json!({ "address": LOCALTIME, "operator": "in", "value": window_value(window) })
        }
        Condition::NotInWindow { window } => {
            json!({ "address": LOCALTIME, "operator": "not in", "value": window_value(window) })
        }
        Condition::NotEquals { address, .. } => {
            bail!("the bridge has no inequality operator ({address})")
        }
    };
    Ok(rendered)
}

pub fn render_action(a: &Action) -> Value {
    let (address, body) = match a {
        Action::SetStatus { sensor, status } => {
            (format!("/sensors/{sensor}/state"), json!({ "status": status }))
        }
        Action::ApplyScene { group, scene, transition } => {
            let mut body = json!({ "scene": scene });
            if !transition.is_zero() {
                body["transitiontime"] = json!(transition_time(*transition));
            }
            (format!("/groups/{group}/action"), body)
        }
        Action::SetPower { group, on } => (format!("/groups/{group}/action"), json!({ "on": on })),
        Action::IncrementBrightness { group, delta, transition } => (
            format!("/groups/{group}/action"),
            json!({ "bri_inc": delta, "transitiontime": transition_time(*transition) }),
        ),
        Action::StoreLightState { scene } => {
            (format!("/scenes/{scene}"), json!({ "storelightstate": true }))
        }
    };
    json!({ "address": address, "method": "PUT", "body": body })
}

pub fn render_rule(rule: &NewRule) -> Result<Value> {
    let conditions = rule
        .conditions
        .iter()
        .map(render_condition)
        .collect::<Result<Vec<_>>>()
        .map_err(|e| anyhow!("rule {:?}: {e}", rule.name))?;
    let actions: Vec<Value> = rule.actions.iter().map(render_action).collect();
    Ok(json!({
        "name": rule.name,
        "recycle": rule.recycle,
        "status": "enabled",
        "conditions": conditions,
        "actions": actions,
    }))
}

fn parse_condition(v: &Value) -> Option<Condition> {
    let path = v.get("address")?.as_str()?;
    let op = v.get("operator")?.as_str()?;
    let value = v.get("value").and_then(Value::as_str);
    if path == LOCALTIME {
        let window = parse_window(value?)?;
        return match op {
            "in" => Some(Condition::InWindow { window }),
            "not in" => Some(Condition::NotInWindow { window }),
            _ => None,
        };
    }
    let address = parse_address(path)?;
    match op {
        "eq" => Some(Condition::Equals { address, value: parse_scalar(value?) }),
        "lt" => Some(Condition::LessThan { address, value: value?.parse().ok()? }),
        "gt" => Some(Condition::GreaterThan { address, value: value?.parse().ok()? }),
        "dx" => Some(Condition::Changed { address }),
        "ddx" => Some(Condition::ChangedDelayed { address, delay: parse_iso_duration(value?)? }),
        _ => None,
    }
}

fn parse_transition(body: &Value) -> Duration {
    let steps = body.get("transitiontime").and_then(Value::as_u64).unwrap_or(0);
    Duration::from_millis(steps * 100)
}

fn parse_action(v: &Value) -> Option<Action> {
    let path = v.get("address")?.as_str()?;
    let body = v.get("body")?;
    let parts: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    match parts.as_slice() {
        ["sensors", id, "state"] => Some(Action::SetStatus {
            sensor: SensorId::from(*id),
            status: body.get("status")?.as_i64()?,
        }),
        ["scenes", id] if body.get("storelightstate").is_some() => {
            Some(Action::StoreLightState { scene: SceneId::from(*id) })
        }
        ["groups", id, "action"] => {
            let group = GroupId::from(*id);
            if let Some(scene) = body.get("scene").and_then(Value::as_str) {
                Some(Action::ApplyScene {
                    group,
                    scene: SceneId::from(scene),
                    transition: parse_transition(body),
                })
            } else if let Some(delta) = body.get("bri_inc").and_then(Value::as_i64) {
                Some(Action::IncrementBrightness {
                    group,
                    delta: i16::try_from(delta).ok()?,
                    transition: parse_transition(body),
                })
            } else {
                Some(Action::SetPower { group, on: body.get("on")?.as_bool()? })
            }
        }
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct WireRule {
    name: String,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    recycle: bool,
    #[serde(default)]
    conditions: Vec<Value>,
    #[serde(default)]
    actions: Vec<Value>,
}

/// Conditions and actions this crate never generates are dropped; the rule
/// still lists so ownership checks see it.
pub fn parse_rule(id: &str, v: Value) -> Result<Rule> {
    let wire: WireRule = serde_json::from_value(v)?;
    let conditions: Vec<Condition> = wire.conditions.iter().filter_map(parse_condition).collect();
    let actions: Vec<Action> = wire.actions.iter().filter_map(parse_action).collect();
    if conditions.len() != wire.conditions.len() || actions.len() != wire.actions.len() {
        tracing::debug!(rule = %wire.name, "rule uses constructs outside the rule model");
    }
    Ok(Rule {
        id: RuleId::from(id),
        name: wire.name,
        owner: wire.owner,
        recycle: wire.recycle,
        conditions,
        actions,
    })
}

#[derive(Debug, Deserialize)]
struct WireGroupState {
    #[serde(default)]
    any_on: bool,
    #[serde(default)]
    all_on: bool,
}

#[derive(Debug, Deserialize)]
struct WireGroup {
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    lights: Vec<String>,
    #[serde(default)]
    state: Option<WireGroupState>,
}

pub fn parse_group(id: &str, v: Value) -> Result<Group> {
    let wire: WireGroup = serde_json::from_value(v)?;
    let kind = match wire.kind.as_str() {
        "Room" => GroupKind::Room,
        "Zone" => GroupKind::Zone,
        "LightGroup" => GroupKind::LightGroup,
        _ => GroupKind::Other,
    };
    let (any_on, all_on) = wire.state.map(|s| (s.any_on, s.all_on)).unwrap_or_default();
    Ok(Group { id: GroupId::from(id), name: wire.name, kind, lights: wire.lights, any_on, all_on })
}

#[derive(Debug, Deserialize)]
struct WireSensor {
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    manufacturername: Option<String>,
    #[serde(default)]
    uniqueid: Option<String>,
    #[serde(default)]
    modelid: Option<String>,
    #[serde(default)]
    swversion: Option<String>,
    #[serde(default)]
    state: BTreeMap<String, Value>,
}

pub fn sensor_kind(kind: &str) -> SensorKind {
    match kind {
        "ZLLPresence" | "CLIPPresence" => SensorKind::Presence,
        "ZLLLightLevel" | "CLIPLightLevel" => SensorKind::LightLevel,
        "Daylight" => SensorKind::Daylight,
        "ZLLSwitch" | "ZGPSwitch" | "CLIPSwitch" => SensorKind::Switch,
        "CLIPGenericStatus" => SensorKind::GenericStatus,
        _ => SensorKind::Other,
    }
}

pub fn parse_sensor(id: &str, v: Value) -> Result<Sensor> {
    let wire: WireSensor = serde_json::from_value(v)?;
    Ok(Sensor {
        id: SensorId::from(id),
        name: wire.name,
        kind: sensor_kind(&wire.kind),
        manufacturer: wire.manufacturername,
        unique_id: wire.uniqueid,
        model_id: wire.modelid,
        sw_version: wire.swversion,
        state: wire.state,
    })
}

#[derive(Debug, Deserialize)]
struct WireScene {
    name: String,
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    lightstates: BTreeMap<String, LightState>,
}

/// Scenes without a group are light scenes; they are filed under group 0.
pub fn parse_scene(id: &str, v: Value) -> Result<Scene> {
    let wire: WireScene = serde_json::from_value(v)?;
    Ok(Scene {
        id: SceneId::from(id),
        name: wire.name,
        group: GroupId::from(wire.group.as_deref().unwrap_or("0")),
        light_states: wire.lightstates,
    })
}

/// Parses an id-keyed listing such as `GET /rules`.
pub fn parse_listing<T>(v: Value, parse: impl Fn(&str, Value) -> Result<T>) -> Result<Vec<T>> {
    let Value::Object(map) = v else {
        bail!("expected an object keyed by id");
    };
    map.into_iter().map(|(id, item)| parse(&id, item)).collect()
}
