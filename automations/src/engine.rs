//! In-process rule engine.
//!
//! Executes rule sets the way a bridge does, against a simulated clock, so
//! the generated state machine can be exercised without hardware:
//!
//! * every external report, timer expiry and schedule boundary is its own
//!   event;
//! * a rule is woken by an event touching one of its conditions and fires
//!   when all its conditions hold against the state before the event's
//!   actions run;
//! * the actions of all firing rules are applied in rule order and their
//!   changes form the next event, until nothing changes.
//!
//! `Changed` holds only during the event that changed the address.
//! `ChangedDelayed` holds only during the timer event at `last change + delay`;
//! an address never changed since start-up has no timer running.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use bridge_core::{
    BridgeSnapshot,
    model::{GroupId, LightState, Scene, SceneId, SensorId},
    rule::{Action, Address, Condition, GroupAttr, Rule, SensorAttr, TimeWindow},
};
use chrono::{NaiveDateTime, TimeDelta};
use serde_json::{Value, json};
use tracing::debug;

/// Rounds one event may cascade through before the engine gives up.
pub const MAX_CASCADE: usize = 16;

const MIN_BRI: i32 = 1;
const MAX_BRI: i32 = 254;

#[derive(Debug, Clone)]
struct Tracked {
    value: Value,
    changed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Firing {
    pub at: NaiveDateTime,
    pub rule: String,
}

#[derive(Debug, Default)]
struct Event {
    changed: HashSet<Address>,
    timer: Option<(Address, Duration)>,
    boundary: Option<TimeWindow>,
}

fn after(t: NaiveDateTime, d: Duration) -> Option<NaiveDateTime> {
    TimeDelta::from_std(d).ok().and_then(|d| t.checked_add_signed(d))
}

pub struct RuleEngine {
    now: NaiveDateTime,
    lights: BTreeMap<String, LightState>,
    groups: BTreeMap<GroupId, Vec<String>>,
    scenes: BTreeMap<SceneId, Scene>,
    values: HashMap<Address, Tracked>,
    rules: Vec<Rule>,
    delays: BTreeMap<Address, BTreeSet<Duration>>,
    windows: BTreeSet<TimeWindow>,
    update_seq: u64,
    firings: Vec<Firing>,
}

impl RuleEngine {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: start,
            lights: BTreeMap::new(),
            groups: BTreeMap::new(),
            scenes: BTreeMap::new(),
            values: HashMap::new(),
            rules: Vec::new(),
            delays: BTreeMap::new(),
            windows: BTreeSet::new(),
            update_seq: 0,
            firings: Vec::new(),
        }
    }

    /// Loads groups, sensors, scenes and rules of a bridge.
    ///
    /// Lights of a group reported on start at full brightness.
    pub fn from_snapshot(snapshot: &BridgeSnapshot, start: NaiveDateTime) -> Self {
        let mut engine = Self::new(start);
        for group in &snapshot.groups {
            for light in &group.lights {
                let state = if group.any_on { LightState::FULL } else { LightState { on: false, bri: None } };
                engine.lights.entry(light.clone()).or_insert(state);
            }
            engine.groups.insert(group.id.clone(), group.lights.clone());
        }
        for scene in &snapshot.scenes {
            engine.scenes.insert(scene.id.clone(), scene.clone());
        }
        for sensor in &snapshot.sensors {
            for (key, value) in &sensor.state {
                if let Some(attr) = SensorAttr::from_state_key(key) {
                    engine.values.insert(
                        Address::sensor(&sensor.id, attr),
                        Tracked { value: value.clone(), changed_at: None },
                    );
                }
            }
        }
        let mut ignored = HashSet::new();
        engine.refresh_groups(&mut ignored);
        for tracked in engine.values.values_mut() {
            tracked.changed_at = None;
        }
        engine.add_rules(snapshot.rules.iter().cloned());
        engine
    }

    pub fn add_rules(&mut self, rules: impl IntoIterator<Item = Rule>) {
        for rule in rules {
            for condition in &rule.conditions {
                match condition {
                    Condition::ChangedDelayed { address, delay } => {
                        self.delays.entry(address.clone()).or_default().insert(*delay);
                    }
                    Condition::InWindow { window } | Condition::NotInWindow { window } => {
                        self.windows.insert(*window);
                    }
                    _ => {}
                }
            }
            self.rules.push(rule);
        }
    }

    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    pub fn value(&self, address: &Address) -> Option<&Value> {
        self.values.get(address).map(|t| &t.value)
    }

    pub fn status(&self, sensor: &SensorId) -> Option<i64> {
        self.value(&Address::status(sensor)).and_then(Value::as_i64)
    }

    pub fn any_on(&self, group: &GroupId) -> bool {
        self.value(&Address::any_on(group)).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn light(&self, id: &str) -> Option<LightState> {
        self.lights.get(id).copied()
    }

    pub fn scene(&self, id: &SceneId) -> Option<&Scene> {
        self.scenes.get(id)
    }

    pub fn firings(&self) -> &[Firing] {
        &self.firings
    }

    pub fn fired(&self, rule: &str) -> bool {
        self.firings.iter().any(|f| f.rule == rule)
    }

    pub fn take_firings(&mut self) -> Vec<Firing> {
        std::mem::take(&mut self.firings)
    }

    /// A sensor reports a value. Its last-updated stamp moves even if the
    /// value is the same as before.
    pub fn report(&mut self, sensor: &SensorId, attr: SensorAttr, value: Value) -> Result<()> {
        let mut changed = HashSet::new();
        self.write_sensor(sensor, attr, value, &mut changed);
        self.run(Event { changed, ..Default::default() })
    }

    pub fn press(&mut self, switch: &SensorId, code: i64) -> Result<()> {
        self.report(switch, SensorAttr::ButtonEvent, json!(code))
    }

    /// Someone switches a group from outside the rule engine.
    pub fn set_power(&mut self, group: &GroupId, on: bool) -> Result<()> {
        let mut changed = HashSet::new();
        self.apply(&Action::power(group, on), &mut changed)?;
        self.run(Event { changed, ..Default::default() })
    }

    pub fn advance(&mut self, by: Duration) -> Result<()> {
        let target = after(self.now, by).ok_or_else(|| anyhow!("clock overflow"))?;
        self.advance_to(target)
    }

    /// Moves the clock, handling every timer and schedule boundary on the way.
    pub fn advance_to(&mut self, target: NaiveDateTime) -> Result<()> {
        while let Some(at) = self.next_wakeup().filter(|at| *at <= target) {
            self.now = at;
            self.wake_at(at)?;
        }
        self.now = target;
        Ok(())
    }

    fn due_timers(&self, at: NaiveDateTime) -> Vec<(Address, Duration)> {
        let mut due = Vec::new();
        for (address, delays) in &self.delays {
            let Some(since) = self.values.get(address).and_then(|t| t.changed_at) else {
                continue;
            };
            for delay in delays {
                if after(since, *delay) == Some(at) {
                    due.push((address.clone(), *delay));
                }
            }
        }
        due
    }

    fn next_boundary(&self, window: &TimeWindow) -> Option<NaiveDateTime> {
        [window.start, window.end]
            .into_iter()
            .filter_map(|t| {
                let today = self.now.date().and_time(t);
                if today > self.now { Some(today) } else { after(today, Duration::from_secs(86_400)) }
            })
            .min()
    }

    fn next_wakeup(&self) -> Option<NaiveDateTime> {
        let timers = self.delays.iter().flat_map(|(address, delays)| {
            let since = self.values.get(address).and_then(|t| t.changed_at);
            delays.iter().filter_map(move |d| since.and_then(|s| after(s, *d)))
        });
        let boundaries = self.windows.iter().filter_map(|w| self.next_boundary(w));
        timers.chain(boundaries).filter(|at| *at > self.now).min()
    }

    fn wake_at(&mut self, at: NaiveDateTime) -> Result<()> {
        for (address, delay) in self.due_timers(at) {
            // an earlier timer at this instant may have moved the address
            let still_due = self
                .values
                .get(&address)
                .and_then(|t| t.changed_at)
                .and_then(|since| after(since, delay))
                == Some(at);
            if still_due {
                self.run(Event { timer: Some((address, delay)), ..Default::default() })?;
            }
        }
        let flipped: Vec<TimeWindow> = self
            .windows
            .iter()
            .filter(|w| w.start == at.time() || w.end == at.time())
            .copied()
            .collect();
        for window in flipped {
            self.run(Event { boundary: Some(window), ..Default::default() })?;
        }
        Ok(())
    }

    fn run(&mut self, mut event: Event) -> Result<()> {
        for _ in 0..MAX_CASCADE {
            let firing: Vec<Rule> = self
                .rules
                .iter()
                .filter(|r| self.woken(r, &event) && self.holds(r, &event))
                .cloned()
                .collect();
            if firing.is_empty() {
                return Ok(());
            }
            let mut changed = HashSet::new();
            for rule in firing {
                debug!(rule = %rule.name, at = %self.now, "rule fired");
                for action in &rule.actions {
                    self.apply(action, &mut changed)
                        .with_context(|| format!("rule {:?}", rule.name))?;
                }
                self.firings.push(Firing { at: self.now, rule: rule.name });
            }
            if changed.is_empty() {
                return Ok(());
            }
            event = Event { changed, ..Default::default() };
        }
        bail!("rules still firing after {MAX_CASCADE} rounds at {}", self.now)
    }

    fn woken(&self, rule: &Rule, event: &Event) -> bool {
        rule.conditions.iter().any(|c| match c {
            Condition::ChangedDelayed { address, delay } => {
                matches!(&event.timer, Some((a, d)) if a == address && d == delay)
            }
            Condition::InWindow { window } | Condition::NotInWindow { window } => {
                event.boundary.as_ref() == Some(window)
            }
            other => other.address().is_some_and(|a| event.changed.contains(a)),
        })
    }

    fn holds(&self, rule: &Rule, event: &Event) -> bool {
        rule.conditions.iter().all(|c| match c {
            Condition::Equals { address, value } => self.value(address) == Some(value),
            Condition::NotEquals { address, value } => {
                self.value(address).is_some_and(|v| v != value)
            }
            Condition::LessThan { address, value } => {
                self.value(address).and_then(Value::as_i64).is_some_and(|v| v < *value)
            }
            Condition::GreaterThan { address, value } => {
                self.value(address).and_then(Value::as_i64).is_some_and(|v| v > *value)
            }
            Condition::Changed { address } => event.changed.contains(address),
            Condition::ChangedDelayed { address, delay } => {
                matches!(&event.timer, Some((a, d)) if a == address && d == delay)
            }
            Condition::InWindow { window } => window.contains(self.now.time()),
            Condition::NotInWindow { window } => !window.contains(self.now.time()),
        })
    }

    fn set_value(&mut self, address: Address, value: Value, changed: &mut HashSet<Address>) {
        let now = self.now;
        match self.values.get_mut(&address) {
            Some(tracked) if tracked.value == value => {}
            Some(tracked) => {
                tracked.value = value;
                tracked.changed_at = Some(now);
                changed.insert(address);
            }
            None => {
                self.values.insert(address.clone(), Tracked { value, changed_at: Some(now) });
                changed.insert(address);
            }
        }
    }

    fn write_sensor(
        &mut self,
        sensor: &SensorId,
        attr: SensorAttr,
        value: Value,
        changed: &mut HashSet<Address>,
    ) {
        self.set_value(Address::sensor(sensor, attr), value, changed);
        self.update_seq += 1;
        self.set_value(Address::last_updated(sensor), json!(self.update_seq), changed);
    }

    fn refresh_groups(&mut self, changed: &mut HashSet<Address>) {
        let aggregates: Vec<(GroupId, bool, bool)> = self
            .groups
            .iter()
            .map(|(id, lights)| {
                let on = |l: &String| self.lights.get(l).is_some_and(|s| s.on);
                let any = lights.iter().any(on);
                let all = !lights.is_empty() && lights.iter().all(on);
                (id.clone(), any, all)
            })
            .collect();
        for (id, any, all) in aggregates {
            self.set_value(Address::Group { group: id.clone(), attr: GroupAttr::AnyOn }, json!(any), changed);
            self.set_value(Address::Group { group: id, attr: GroupAttr::AllOn }, json!(all), changed);
        }
    }

    fn group_lights(&self, group: &GroupId) -> Result<Vec<String>> {
        self.groups.get(group).cloned().ok_or_else(|| anyhow!("unknown group {group}"))
    }

    fn apply(&mut self, action: &Action, changed: &mut HashSet<Address>) -> Result<()> {
        match action {
            Action::SetStatus { sensor, status } => {
                self.write_sensor(sensor, SensorAttr::Status, json!(status), changed);
            }
            Action::ApplyScene { scene, .. } => {
                let scene = self.scenes.get(scene).ok_or_else(|| anyhow!("unknown scene {scene}"))?;
                for (light, state) in scene.light_states.clone() {
                    self.lights.insert(light, state);
                }
                self.refresh_groups(changed);
            }
            Action::SetPower { group, on } => {
                for light in self.group_lights(group)? {
                    let state = self.lights.entry(light).or_insert(LightState { on: false, bri: None });
                    state.on = *on;
                    if *on && state.bri.is_none() {
                        state.bri = Some(MAX_BRI as u8);
                    }
                }
                self.refresh_groups(changed);
            }
            Action::IncrementBrightness { group, delta, .. } => {
                for light in self.group_lights(group)? {
                    if let Some(state) = self.lights.get_mut(&light)
                        && state.on
                    {
                        let bri = i32::from(state.bri.unwrap_or(MAX_BRI as u8)) + i32::from(*delta);
                        state.bri = Some(bri.clamp(MIN_BRI, MAX_BRI) as u8);
                    }
                }
            }
            Action::StoreLightState { scene } => {
                let group = self
                    .scenes
                    .get(scene)
                    .map(|s| s.group.clone())
                    .ok_or_else(|| anyhow!("unknown scene {scene}"))?;
                let captured: BTreeMap<String, LightState> = self
                    .group_lights(&group)?
                    .into_iter()
                    .filter_map(|l| self.lights.get(&l).map(|s| (l, *s)))
                    .collect();
                if let Some(scene) = self.scenes.get_mut(scene) {
                    scene.light_states = captured;
                }
            }
        }
        Ok(())
    }
}
