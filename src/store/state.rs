//! Synchronous half of the form store: the snapshot, its derived values,
//! the visible alert list and the monitoring timer. No I/O, no tasks.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::time::Instant;

use crate::clinical::{activated_protocols, calculate_all, generate_alerts, CalculatedValues};
use crate::config::STALE_ALERT_WINDOW;
use crate::models::enums::{AlertCategory, AlertLevel, MonitoringInterval, Phase};
use crate::models::{ClinicalAlert, DraftId, FormSnapshot, PhaseNavigator, ProtocolActivation};

use super::StoreError;

/// Lifecycle of the store as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StoreStatus {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    Saving,
}

/// Post-intubation monitoring timer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerState {
    pub active: bool,
    pub started_at: Option<Instant>,
    /// Whole seconds since start, as of the last tick.
    pub elapsed_secs: u64,
    pub next_due: Option<MonitoringInterval>,
    pub completed: BTreeSet<MonitoringInterval>,
}

impl TimerState {
    pub(crate) fn start(&mut self, now: Instant) {
        self.active = true;
        self.started_at = Some(now);
        self.elapsed_secs = 0;
        self.next_due = Some(MonitoringInterval::Post5Min);
    }

    pub(crate) fn stop(&mut self) {
        self.active = false;
        self.started_at = None;
        self.next_due = None;
    }

    /// Recompute elapsed from the start instant. No-op while stopped.
    pub(crate) fn tick(&mut self, now: Instant) -> Option<u64> {
        let started = self.started_at.filter(|_| self.active)?;
        self.elapsed_secs = now.saturating_duration_since(started).as_secs();
        Some(self.elapsed_secs)
    }

    pub fn is_completed(&self, interval: MonitoringInterval) -> bool {
        self.completed.contains(&interval)
    }
}

#[derive(Debug, Default)]
pub(crate) struct FormState {
    pub data: FormSnapshot,
    pub calculated: CalculatedValues,
    pub alerts: Vec<ClinicalAlert>,
    /// Ids produced by the rule engine on the last recompute, with the
    /// level each was raised at.
    pub computed_ids: HashMap<String, AlertLevel>,
    pub protocols: Vec<ProtocolActivation>,
    pub navigator: PhaseNavigator,
    pub timer: TimerState,
    pub draft_id: Option<DraftId>,
    pub hospital_no: Option<String>,
    pub dirty: bool,
    /// Bumped on every mutation so a finished save knows if it is stale.
    pub revision: u64,
    /// Bumped when the form is replaced wholesale (load, clear, submit).
    pub session: u64,
    pub status: StoreStatus,
}

impl FormState {
    // ── Mutation ────────────────────────────────────────────

    /// Deep-merge `patch` into the snapshot, then recompute.
    pub fn merge(&mut self, patch: Value, at: DateTime<Utc>) -> Result<Vec<ClinicalAlert>, StoreError> {
        let mut merged = serde_json::to_value(&self.data)?;
        deep_merge(&mut merged, patch);
        let data = serde_json::from_value(merged).map_err(|e| StoreError::InvalidField {
            path: "form".into(),
            reason: e.to_string(),
        })?;
        Ok(self.replace_data(data, at))
    }

    /// Assign `value` at a dotted path, creating intermediate objects.
    pub fn assign(&mut self, path: &str, value: Value, at: DateTime<Utc>) -> Result<Vec<ClinicalAlert>, StoreError> {
        let keys: Vec<&str> = path.split('.').collect();
        if keys.iter().any(|k| k.trim().is_empty()) {
            return Err(StoreError::InvalidField {
                path: path.into(),
                reason: "empty path segment".into(),
            });
        }

        let mut root = serde_json::to_value(&self.data)?;
        set_nested(&mut root, &keys, value);
        let data = serde_json::from_value(root).map_err(|e| StoreError::InvalidField {
            path: path.into(),
            reason: e.to_string(),
        })?;
        Ok(self.replace_data(data, at))
    }

    fn replace_data(&mut self, data: FormSnapshot, at: DateTime<Utc>) -> Vec<ClinicalAlert> {
        self.data = data;
        if let Some(no) = self.data.hospital_no() {
            self.hospital_no = Some(no.to_string());
        }
        self.dirty = true;
        self.revision += 1;
        if self.status == StoreStatus::Uninitialized {
            self.status = StoreStatus::Ready;
        }
        self.recompute(at)
    }

    /// Recompute derived values and diff alerts against the previous run.
    /// Returns the alerts surfaced for the first time or at a higher level.
    pub fn recompute(&mut self, at: DateTime<Utc>) -> Vec<ClinicalAlert> {
        self.calculated = calculate_all(&self.data);
        self.protocols = activated_protocols(&self.data);

        let computed = generate_alerts(&self.data, at);
        let ids: HashMap<String, AlertLevel> =
            computed.iter().map(|a| (a.id.clone(), a.level)).collect();

        // Withdraw rule alerts whose condition no longer holds.
        let previous = std::mem::take(&mut self.computed_ids);
        self.alerts
            .retain(|a| !previous.contains_key(&a.id) || ids.contains_key(&a.id));

        let mut surfaced = Vec::new();
        for alert in computed {
            match self.alerts.iter().position(|a| a.id == alert.id) {
                Some(i) if alert.level > self.alerts[i].level => {
                    surfaced.push(alert.clone());
                    self.alerts[i] = alert;
                }
                Some(i) => {
                    if !self.alerts[i].same_content(&alert) {
                        let raised = self.alerts[i].timestamp;
                        self.alerts[i] = ClinicalAlert { timestamp: raised, ..alert };
                    }
                }
                None => {
                    // Hidden alerts come back when new or escalated.
                    let escalated = previous.get(&alert.id).map_or(true, |was| alert.level > *was);
                    if escalated {
                        surfaced.push(alert.clone());
                        self.alerts.push(alert);
                    }
                }
            }
        }

        self.computed_ids = ids;
        surfaced
    }

    // ── Phases ──────────────────────────────────────────────

    /// Move to `phase` and purge phase-scoped alerts. Staying put purges nothing.
    pub fn change_phase(&mut self, phase: Phase) -> usize {
        if !self.navigator.goto(phase) {
            return 0;
        }
        let before = self.alerts.len();
        self.alerts.retain(ClinicalAlert::survives_phase_change);
        before - self.alerts.len()
    }

    // ── Alerts ──────────────────────────────────────────────

    /// Insert or replace by id, stamped with `at`.
    pub fn upsert_alert(&mut self, alert: ClinicalAlert, at: DateTime<Utc>) {
        let alert = ClinicalAlert { timestamp: at, ..alert };
        match self.alerts.iter().position(|a| a.id == alert.id) {
            Some(i) => self.alerts[i] = alert,
            None => self.alerts.push(alert),
        }
    }

    pub fn dismiss_alert(&mut self, id: &str) -> bool {
        let before = self.alerts.len();
        self.alerts.retain(|a| a.id != id);
        before != self.alerts.len()
    }

    /// Drop non-critical alerts raised more than the stale window before `now`.
    pub fn clear_stale_alerts(&mut self, now: DateTime<Utc>) -> usize {
        let window = chrono::Duration::from_std(STALE_ALERT_WINDOW)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let before = self.alerts.len();
        self.alerts
            .retain(|a| a.is_critical() || now.signed_duration_since(a.timestamp) <= window);
        before - self.alerts.len()
    }

    // ── Monitoring timer ────────────────────────────────────

    /// Reminder alert for `interval`, if the timer is still running and
    /// the interval has not been completed.
    pub fn reminder_due(&mut self, interval: MonitoringInterval, at: DateTime<Utc>) -> Option<ClinicalAlert> {
        if !self.timer.active || self.timer.is_completed(interval) {
            return None;
        }
        if interval != MonitoringInterval::Post5Min {
            self.timer.next_due = Some(interval);
        }
        Some(reminder_alert(interval, at))
    }

    /// Mark `interval` done and withdraw its reminder.
    pub fn complete_interval(&mut self, interval: MonitoringInterval) -> bool {
        let newly = self.timer.completed.insert(interval);
        self.timer.next_due = interval.next();
        self.dismiss_alert(&interval.alert_id());
        newly
    }

    // ── Loading ─────────────────────────────────────────────

    /// Replace the snapshot with a loaded draft. Alerts resurface on the
    /// next mutation; only timer reminders are kept.
    pub fn load(
        &mut self,
        data: FormSnapshot,
        phase: Phase,
        draft_id: Option<DraftId>,
        hospital_no: Option<String>,
    ) {
        self.hospital_no = hospital_no.or_else(|| data.hospital_no().map(str::to_string));
        self.data = data;
        self.navigator = PhaseNavigator::starting_at(phase);
        self.draft_id = draft_id;
        self.calculated = calculate_all(&self.data);
        self.protocols = activated_protocols(&self.data);
        self.alerts.retain(ClinicalAlert::is_monitoring);
        self.computed_ids.clear();
        self.dirty = false;
        self.revision += 1;
        self.session += 1;
    }

    /// Back to initial defaults. Counters keep increasing so in-flight
    /// saves can tell they are stale.
    pub fn reset(&mut self) {
        *self = Self {
            revision: self.revision + 1,
            session: self.session + 1,
            ..Self::default()
        };
    }
}

fn reminder_alert(interval: MonitoringInterval, at: DateTime<Utc>) -> ClinicalAlert {
    let minutes = interval.minutes();
    let (level, message) = match interval {
        MonitoringInterval::Post30Min => (
            AlertLevel::Info,
            "Final post-intubation monitoring interval".to_string(),
        ),
        _ => (
            AlertLevel::Warning,
            format!("Post-intubation {minutes}-minute monitoring required"),
        ),
    };
    ClinicalAlert::new(
        interval.alert_id(),
        level,
        Some(AlertCategory::Procedural),
        format!("{minutes}-Minute Assessment Due"),
        message,
        at,
    )
    .with_triggers([format!("timer_{minutes}min")])
}

/// Objects merge key by key; anything else replaces.
pub(crate) fn deep_merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                deep_merge(target.entry(key).or_insert(Value::Null), value);
            }
        }
        (target, patch) => *target = patch,
    }
}

/// Walk `keys`, replacing missing or non-object intermediates with `{}`.
pub(crate) fn set_nested(root: &mut Value, keys: &[&str], value: Value) {
    let Some((last, parents)) = keys.split_last() else {
        return;
    };

    let mut current = root;
    for key in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => map.entry(key.to_string()).or_insert(Value::Null),
            _ => return,
        };
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        map.insert(last.to_string(), value);
    }
}
