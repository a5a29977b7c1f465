use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {field} value: {value}")]
pub struct ParseEnumError {
    pub field: String,
    pub value: String,
}

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// Variants serialize as their string form.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ParseEnumError {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// Declaration order is severity order.
str_enum!(AlertLevel {
    Info => "info",
    Warning => "warning",
    Critical => "critical",
});

impl AlertLevel {
    /// Weight used when summarising a set of alerts.
    pub fn score(&self) -> u32 {
        match self {
            Self::Info => 1,
            Self::Warning => 2,
            Self::Critical => 3,
        }
    }
}

str_enum!(AlertCategory {
    Hemodynamic => "hemodynamic",
    Neurological => "neurological",
    Airway => "airway",
    Medication => "medication",
    Procedural => "procedural",
});

str_enum!(IndicationCategory {
    Trauma => "trauma",
    Medical => "medical",
});

str_enum!(Sex {
    Male => "M",
    Female => "F",
    Other => "Other",
});

str_enum!(RiskTier {
    Low => "Low",
    Moderate => "Moderate",
    High => "High",
});

str_enum!(GcsSeverity {
    Mild => "mild",
    Moderate => "moderate",
    Severe => "severe",
});

// Declaration order is the order the intervals fall due.
str_enum!(MonitoringInterval {
    Post5Min => "post_5min",
    Post10Min => "post_10min",
    Post15Min => "post_15min",
    Post30Min => "post_30min",
});

impl MonitoringInterval {
    pub const ALL: [MonitoringInterval; 4] = [
        Self::Post5Min,
        Self::Post10Min,
        Self::Post15Min,
        Self::Post30Min,
    ];

    /// Offset from timer start at which this interval falls due.
    pub fn offset(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.minutes() * 60)
    }

    pub fn minutes(&self) -> u64 {
        match self {
            Self::Post5Min => 5,
            Self::Post10Min => 10,
            Self::Post15Min => 15,
            Self::Post30Min => 30,
        }
    }

    /// The interval that falls due after this one, if any.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Post5Min => Some(Self::Post10Min),
            Self::Post10Min => Some(Self::Post15Min),
            Self::Post15Min => Some(Self::Post30Min),
            Self::Post30Min => None,
        }
    }

    /// Id of the reminder alert raised when this interval falls due.
    pub fn alert_id(&self) -> String {
        format!("monitoring-{}min-due", self.minutes())
    }
}

str_enum!(Phase {
    Demographics => "demographics",
    Vitals => "vitals",
    Indication => "indication",
    Leon => "leon",
    PreIntubation => "preIntubation",
    Comorbidities => "comorbidities",
    PostIntubation => "postIntubation",
    Attempts => "attempts",
    Monitoring => "monitoring",
});

impl Default for Phase {
    fn default() -> Self {
        Self::Demographics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn alert_level_round_trip() {
        for (variant, s) in [
            (AlertLevel::Info, "info"),
            (AlertLevel::Warning, "warning"),
            (AlertLevel::Critical, "critical"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(AlertLevel::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn alert_level_orders_by_severity() {
        assert!(AlertLevel::Critical > AlertLevel::Warning);
        assert!(AlertLevel::Warning > AlertLevel::Info);
        assert_eq!(AlertLevel::Critical.score(), 3);
    }

    #[test]
    fn sex_serializes_as_form_codes() {
        assert_eq!(serde_json::to_string(&Sex::Male).unwrap(), "\"M\"");
        let parsed: Sex = serde_json::from_str("\"Other\"").unwrap();
        assert_eq!(parsed, Sex::Other);
    }

    #[test]
    fn phase_uses_camel_case_ids() {
        assert_eq!(Phase::PreIntubation.as_str(), "preIntubation");
        assert_eq!(Phase::from_str("postIntubation").unwrap(), Phase::PostIntubation);
        assert_eq!(Phase::default(), Phase::Demographics);
    }

    #[test]
    fn unknown_value_reports_field() {
        let err = AlertCategory::from_str("renal").unwrap_err();
        assert_eq!(err.field, "AlertCategory");
        assert_eq!(err.value, "renal");
    }

    #[test]
    fn monitoring_intervals_advance_in_order() {
        assert_eq!(MonitoringInterval::Post5Min.next(), Some(MonitoringInterval::Post10Min));
        assert_eq!(MonitoringInterval::Post15Min.next(), Some(MonitoringInterval::Post30Min));
        assert_eq!(MonitoringInterval::Post30Min.next(), None);
        assert_eq!(MonitoringInterval::Post10Min.offset().as_secs(), 600);
        assert_eq!(MonitoringInterval::Post5Min.alert_id(), "monitoring-5min-due");
    }
}
