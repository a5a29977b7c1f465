use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{AlertCategory, AlertLevel};

/// Prefix shared by every alert raised from the monitoring timer.
pub const MONITORING_ALERT_PREFIX: &str = "monitoring-";

/// A rule-engine or timer alert. The id is derived from the trigger
/// condition, so the same condition always yields the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalAlert {
    pub id: String,
    pub level: AlertLevel,
    /// `None` means uncategorized.
    pub category: Option<AlertCategory>,
    pub title: String,
    pub message: String,
    pub triggers: Vec<String>,
    pub actions: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ClinicalAlert {
    pub fn new(
        id: impl Into<String>,
        level: AlertLevel,
        category: Option<AlertCategory>,
        title: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            level,
            category,
            title: title.into(),
            message: message.into(),
            triggers: Vec::new(),
            actions: Vec::new(),
            timestamp,
        }
    }

    pub fn with_triggers<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.triggers = triggers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions = actions.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_critical(&self) -> bool {
        self.level == AlertLevel::Critical
    }

    /// Raised by the monitoring timer rather than the rule engine.
    pub fn is_monitoring(&self) -> bool {
        self.id.starts_with(MONITORING_ALERT_PREFIX)
    }

    /// Survives a phase change: critical, hemodynamic or uncategorized.
    pub fn survives_phase_change(&self) -> bool {
        self.is_monitoring()
            || self.is_critical()
            || matches!(self.category, None | Some(AlertCategory::Hemodynamic))
    }

    /// Same id and clinical content, ignoring when it was raised.
    pub fn same_content(&self, other: &ClinicalAlert) -> bool {
        self.id == other.id
            && self.level == other.level
            && self.category == other.category
            && self.title == other.title
            && self.message == other.message
            && self.triggers == other.triggers
            && self.actions == other.actions
    }
}

/// A named care bundle activated by the current form state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolActivation {
    pub id: String,
    pub name: String,
    pub indication: String,
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub medications: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub monitoring: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consultations: Vec<String>,
}

/// Aggregate view over a set of alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeveritySummary {
    pub total_score: u32,
    pub highest_level: Option<AlertLevel>,
    pub critical_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(id: &str, level: AlertLevel, category: Option<AlertCategory>) -> ClinicalAlert {
        ClinicalAlert::new(id, level, category, "t", "m", Utc::now())
    }

    #[test]
    fn phase_change_survival_rules() {
        assert!(alert("a", AlertLevel::Critical, Some(AlertCategory::Airway)).survives_phase_change());
        assert!(alert("b", AlertLevel::Info, Some(AlertCategory::Hemodynamic)).survives_phase_change());
        assert!(alert("c", AlertLevel::Warning, None).survives_phase_change());
        assert!(alert("monitoring-5min-due", AlertLevel::Info, Some(AlertCategory::Procedural))
            .survives_phase_change());
        assert!(!alert("d", AlertLevel::Warning, Some(AlertCategory::Neurological)).survives_phase_change());
        assert!(!alert("e", AlertLevel::Info, Some(AlertCategory::Medication)).survives_phase_change());
    }

    #[test]
    fn same_content_ignores_timestamp() {
        let a = alert("x", AlertLevel::Info, None).with_actions(["one"]);
        let mut b = a.clone();
        b.timestamp = a.timestamp + chrono::Duration::minutes(3);
        assert!(a.same_content(&b));
        b.message = "changed".into();
        assert!(!a.same_content(&b));
    }

    #[test]
    fn serializes_camel_case_and_lowercase_enums() {
        let a = alert("gcs-severe", AlertLevel::Critical, Some(AlertCategory::Neurological))
            .with_triggers(["gcs_8"]);
        let value = serde_json::to_value(&a).unwrap();
        assert_eq!(value["level"], "critical");
        assert_eq!(value["category"], "neurological");
        assert_eq!(value["triggers"][0], "gcs_8");
    }

    #[test]
    fn protocol_omits_empty_optional_lists() {
        let p = ProtocolActivation {
            id: "p".into(),
            name: "P".into(),
            indication: "i".into(),
            steps: vec!["s".into()],
            medications: vec![],
            monitoring: vec![],
            consultations: vec!["c".into()],
        };
        let value = serde_json::to_value(&p).unwrap();
        assert!(value.get("medications").is_none());
        assert_eq!(value["consultations"][0], "c");
    }
}
