use serde::{Deserialize, Serialize};

use crate::models::enums::{GcsSeverity, RiskTier};
use crate::models::lenient;
use crate::models::{Comorbidities, FormSnapshot, Gcs, LeonScore, VitalSigns};

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

pub const SEVERE_GCS_MAX: u32 = 8;
pub const MODERATE_GCS_MAX: u32 = 12;
pub const ELEVATED_SHOCK_INDEX: f64 = 0.9;
pub const HYPOTENSIVE_MAP: f64 = 65.0;
pub const HYPOXEMIC_SPO2: f64 = 90.0;
pub const HYPOTENSIVE_SBP: f64 = 90.0;
pub const TACHYCARDIC_HR: f64 = 100.0;
pub const BRADYCARDIC_HR: f64 = 60.0;

/// Derived values for a snapshot. Every field is a finite number or absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bmi: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shock_index: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_shock_index: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_arterial_pressure: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pulse_pressure: Option<f64>,
    #[serde(rename = "totalGCS", skip_serializing_if = "Option::is_none")]
    pub total_gcs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leon_total_score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comorbidity_burden: Option<u32>,
}

fn round_to(value: f64, decimals: i32) -> Option<f64> {
    let factor = 10f64.powi(decimals);
    let rounded = (value * factor).round() / factor;
    rounded.is_finite().then_some(rounded)
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v > 0.0 && v.is_finite())
}

// ---------------------------------------------------------------------------
// Formulas
// ---------------------------------------------------------------------------

/// kg / m², one decimal.
pub fn bmi(weight_kg: Option<f64>, height_cm: Option<f64>) -> Option<f64> {
    let w = positive(weight_kg)?;
    let h = positive(height_cm)? / 100.0;
    round_to(w / (h * h), 1)
}

/// Heart rate over systolic pressure, two decimals.
pub fn shock_index(heart_rate: Option<f64>, systolic: Option<f64>) -> Option<f64> {
    let hr = positive(heart_rate)?;
    let sbp = positive(systolic)?;
    round_to(hr / sbp, 2)
}

/// `dbp + (sbp - dbp) / 3`, one decimal.
pub fn mean_arterial_pressure(systolic: Option<f64>, diastolic: Option<f64>) -> Option<f64> {
    let sbp = positive(systolic)?;
    let dbp = positive(diastolic)?;
    round_to(dbp + (sbp - dbp) / 3.0, 1)
}

pub fn pulse_pressure(systolic: Option<f64>, diastolic: Option<f64>) -> Option<f64> {
    let sbp = positive(systolic)?;
    let dbp = positive(diastolic)?;
    Some(sbp - dbp)
}

/// Heart rate over MAP, two decimals.
pub fn modified_shock_index(heart_rate: Option<f64>, map: Option<f64>) -> Option<f64> {
    let hr = positive(heart_rate)?;
    let map = positive(map)?;
    round_to(hr / map, 2)
}

/// Eye + verbal + motor. An intubated patient scores verbal 1 whatever was
/// recorded; otherwise a blank verbal response also counts as 1. A
/// component outside its scale (eye 1-4, verbal 1-5, motor 1-6) makes the
/// total absent.
pub fn total_gcs(gcs: &Gcs) -> Option<u32> {
    let eye = component(gcs.eye_response.as_deref(), GCS_EYE_MAX)??;
    let motor = component(gcs.motor_response.as_deref(), GCS_MOTOR_MAX)??;
    let verbal = if gcs.is_already_intubated == Some(true) {
        1
    } else {
        component(gcs.verbal_response.as_deref(), GCS_VERBAL_MAX).unwrap_or(Some(1))?
    };
    Some(eye + verbal + motor)
}

const GCS_EYE_MAX: u32 = 4;
const GCS_VERBAL_MAX: u32 = 5;
const GCS_MOTOR_MAX: u32 = 6;

/// Outer `None`: field blank. Inner `None`: filled but not a score on `1..=max`.
fn component(raw: Option<&str>, max: u32) -> Option<Option<u32>> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    Some(
        lenient::parse_integer(raw)
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| (1..=max).contains(v)),
    )
}

/// Sum of the four LEON components. Absent unless every component is 0 or 1.
pub fn leon_score(leon: &LeonScore) -> Option<u32> {
    [
        leon.large_tongue,
        leon.thyro_mental_distance,
        leon.obstruction,
        leon.neck_mobility,
    ]
    .into_iter()
    .try_fold(0u32, |acc, part| match part {
        Some(v @ (0 | 1)) => Some(acc + v as u32),
        _ => None,
    })
}

/// Renal and liver disease weigh 2, every other present condition 1.
pub fn comorbidity_burden(c: &Comorbidities) -> u32 {
    let weighted = [
        (c.diabetes, 1),
        (c.hypertension, 1),
        (c.chronic_renal_disease, 2),
        (c.chronic_liver_disease, 2),
        (c.reactive_airway_disease, 1),
        (c.others, 1),
    ];
    weighted
        .into_iter()
        .filter(|(present, _)| *present == Some(true))
        .map(|(_, weight)| weight)
        .sum()
}

/// Recompute every derived value from scratch.
pub fn calculate_all(snapshot: &FormSnapshot) -> CalculatedValues {
    let mut values = CalculatedValues::default();

    if let Some(demo) = &snapshot.demographics {
        values.bmi = bmi(
            lenient::number(demo.weight.as_ref()),
            lenient::number(demo.height.as_ref()),
        );
    }

    if let Some(vitals) = &snapshot.pre_induction_vitals {
        let (hr, sbp, dbp) = (vitals.heart_rate(), vitals.systolic(), vitals.diastolic());
        values.shock_index = shock_index(hr, sbp);
        values.mean_arterial_pressure = mean_arterial_pressure(sbp, dbp);
        values.pulse_pressure = pulse_pressure(sbp, dbp);
        values.modified_shock_index = modified_shock_index(hr, values.mean_arterial_pressure);
    }

    values.total_gcs = snapshot.gcs.as_ref().and_then(total_gcs);
    values.leon_total_score = snapshot.leon_score.as_ref().and_then(leon_score);
    values.comorbidity_burden = snapshot.comorbidities.as_ref().map(comorbidity_burden);

    values
}

// ---------------------------------------------------------------------------
// Interpretation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GcsInterpretation {
    pub severity: GcsSeverity,
    pub interpretation: &'static str,
    pub notes: Vec<&'static str>,
}

pub fn interpret_gcs(total: u32) -> GcsInterpretation {
    if total <= SEVERE_GCS_MAX {
        GcsInterpretation {
            severity: GcsSeverity::Severe,
            interpretation: "Severe brain injury - Critical care needed",
            notes: vec![
                "ICU consultation required",
                "Neuroprotection protocol",
                "ICP monitoring consideration",
            ],
        }
    } else if total <= MODERATE_GCS_MAX {
        GcsInterpretation {
            severity: GcsSeverity::Moderate,
            interpretation: "Moderate brain injury",
            notes: vec!["Close neurological monitoring"],
        }
    } else {
        GcsInterpretation {
            severity: GcsSeverity::Mild,
            interpretation: "Mild brain injury",
            notes: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeonInterpretation {
    pub risk: RiskTier,
    pub recommendations: Vec<&'static str>,
    pub warning: Option<&'static str>,
}

pub fn interpret_leon(score: u32) -> LeonInterpretation {
    match score {
        0 | 1 => LeonInterpretation {
            risk: RiskTier::Low,
            recommendations: vec!["Standard intubation approach"],
            warning: None,
        },
        2 | 3 => LeonInterpretation {
            risk: RiskTier::Moderate,
            recommendations: vec![
                "Video laryngoscopy recommended",
                "Experienced intubator preferred",
                "Backup airway devices ready",
            ],
            warning: Some("Moderate difficulty predicted"),
        },
        _ => LeonInterpretation {
            risk: RiskTier::High,
            recommendations: vec![
                "Awake intubation consideration",
                "ENT consultation",
                "Emergency cricothyrotomy setup",
            ],
            warning: Some("High difficulty predicted - prepare for surgical airway"),
        },
    }
}

/// Shock index bands from the airway decision rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ShockBand {
    Normal,
    Mild,
    Moderate,
    Severe,
}

impl ShockBand {
    pub fn classify(shock_index: f64) -> Self {
        if shock_index > 1.2 {
            Self::Severe
        } else if shock_index > ELEVATED_SHOCK_INDEX {
            Self::Moderate
        } else if shock_index >= 0.7 {
            Self::Mild
        } else {
            Self::Normal
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Mild => "Mild shock",
            Self::Moderate => "Moderate shock",
            Self::Severe => "Severe shock",
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::Normal => "Continue monitoring",
            Self::Mild => "Investigate cause, fluid resuscitation",
            Self::Moderate => "Urgent resuscitation, blood products",
            Self::Severe => "Massive transfusion protocol, urgent intervention",
        }
    }
}

/// Composite hemodynamic assessment over one set of vitals.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HemodynamicRisk {
    pub tier: RiskTier,
    pub findings: Vec<String>,
    pub recommendations: Vec<String>,
}

/// More than two abnormal findings is high risk, any finding moderate.
pub fn assess_hemodynamic_risk(vitals: &VitalSigns) -> HemodynamicRisk {
    let mut findings = Vec::new();
    let mut recommendations = Vec::new();

    let hr = positive(vitals.heart_rate());
    let sbp = positive(vitals.systolic());
    let si = shock_index(hr, sbp);
    let map = mean_arterial_pressure(sbp, vitals.diastolic());
    let spo2 = positive(vitals.spo2());

    if si.is_some_and(|v| v > ELEVATED_SHOCK_INDEX) {
        findings.push("High shock index - hemodynamic instability".to_string());
        recommendations.push("Prepare push-dose pressors".to_string());
        recommendations.push("Consider fluid resuscitation".to_string());
    }
    if sbp.is_some_and(|v| v < HYPOTENSIVE_SBP) {
        findings.push("Hypotension - critical".to_string());
        recommendations.push("Immediate vasopressor support".to_string());
    }
    if map.is_some_and(|v| v < HYPOTENSIVE_MAP) {
        findings.push("MAP below target - organ perfusion at risk".to_string());
        recommendations.push("Vasopressor infusion consideration".to_string());
    }
    if hr.is_some_and(|v| v > TACHYCARDIC_HR) {
        findings.push("Tachycardia - investigate cause".to_string());
    }
    if hr.is_some_and(|v| v < BRADYCARDIC_HR) {
        findings.push("Bradycardia - monitor closely".to_string());
    }
    if spo2.is_some_and(|v| v < HYPOXEMIC_SPO2) {
        findings.push("Severe hypoxemia - urgent intervention".to_string());
        recommendations.push("Preoxygenation protocol".to_string());
        recommendations.push("PEEP optimization".to_string());
    }

    let tier = match findings.len() {
        0 => RiskTier::Low,
        1 | 2 => RiskTier::Moderate,
        _ => RiskTier::High,
    };

    HemodynamicRisk {
        tier,
        findings,
        recommendations,
    }
}

/// Educational notes attached to one comorbidity flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComorbidityNote {
    pub key: &'static str,
    pub condition: &'static str,
    pub notes: [&'static str; 2],
}

/// One note per present comorbidity, in checklist order.
pub fn comorbidity_notes(c: &Comorbidities) -> Vec<ComorbidityNote> {
    let table = [
        (
            c.diabetes,
            "diabetes",
            "Diabetes",
            ["Monitor glucose levels closely", "Consider perioperative insulin protocol"],
        ),
        (
            c.hypertension,
            "hypertension",
            "Hypertension",
            ["Monitor BP targets post-intubation", "Consider antihypertensive adjustment"],
        ),
        (
            c.chronic_renal_disease,
            "renal",
            "Chronic renal disease",
            ["Fluid management caution", "Monitor electrolytes closely"],
        ),
        (
            c.chronic_liver_disease,
            "liver",
            "Chronic liver disease",
            ["Drug metabolism warnings", "Coagulation monitoring needed"],
        ),
        (
            c.reactive_airway_disease,
            "reactive-airway",
            "Reactive airway disease",
            ["Ventilator settings optimization", "PEEP limitations"],
        ),
        (
            c.others,
            "other",
            "Other comorbidity",
            ["Review documented comorbidity before induction", "Adjust drug choice and doses accordingly"],
        ),
    ];

    table
        .into_iter()
        .filter(|(present, ..)| *present == Some(true))
        .map(|(_, key, condition, notes)| ComorbidityNote {
            key,
            condition,
            notes,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gcs(eye: &str, verbal: Option<&str>, motor: &str, intubated: bool) -> Gcs {
        Gcs {
            eye_response: Some(eye.into()),
            verbal_response: verbal.map(Into::into),
            motor_response: Some(motor.into()),
            is_already_intubated: Some(intubated),
        }
    }

    fn leon(a: i64, b: i64, c: i64, d: i64) -> LeonScore {
        LeonScore {
            large_tongue: Some(a),
            thyro_mental_distance: Some(b),
            obstruction: Some(c),
            neck_mobility: Some(d),
        }
    }

    fn vitals(hr: &str, sbp: &str, dbp: &str, spo2: &str) -> VitalSigns {
        let opt = |s: &str| (!s.is_empty()).then(|| s.to_string());
        VitalSigns {
            heart_rate: opt(hr),
            systolic_bp: opt(sbp),
            diastolic_bp: opt(dbp),
            spo2: opt(spo2),
            ..Default::default()
        }
    }

    #[test]
    fn bmi_rounds_to_one_decimal() {
        assert_eq!(bmi(Some(70.0), Some(175.0)), Some(22.9));
        assert_eq!(bmi(Some(100.0), Some(200.0)), Some(25.0));
    }

    #[test]
    fn bmi_absent_for_missing_or_non_positive_input() {
        assert_eq!(bmi(None, Some(170.0)), None);
        assert_eq!(bmi(Some(70.0), None), None);
        assert_eq!(bmi(Some(70.0), Some(0.0)), None);
        assert_eq!(bmi(Some(-5.0), Some(170.0)), None);
    }

    #[test]
    fn shock_index_absent_without_systolic() {
        assert_eq!(shock_index(Some(120.0), Some(0.0)), None);
        assert_eq!(shock_index(Some(120.0), None), None);
        assert_eq!(shock_index(Some(120.0), Some(80.0)), Some(1.5));
        assert_eq!(shock_index(Some(100.0), Some(120.0)), Some(0.83));
    }

    #[test]
    fn map_pulse_pressure_and_modified_shock_index() {
        let map = mean_arterial_pressure(Some(120.0), Some(80.0));
        assert_eq!(map, Some(93.3));
        assert_eq!(pulse_pressure(Some(120.0), Some(80.0)), Some(40.0));
        assert_eq!(modified_shock_index(Some(90.0), map), Some(0.96));
        assert_eq!(modified_shock_index(Some(90.0), None), None);
    }

    #[test]
    fn intubated_patient_scores_verbal_one() {
        assert_eq!(total_gcs(&gcs("3", Some("5"), "4", true)), Some(8));
        assert_eq!(total_gcs(&gcs("3", Some("garbage"), "4", true)), Some(8));
    }

    #[test]
    fn blank_verbal_defaults_to_one() {
        assert_eq!(total_gcs(&gcs("4", None, "6", false)), Some(11));
        assert_eq!(total_gcs(&gcs("4", Some(""), "6", false)), Some(11));
        assert_eq!(total_gcs(&gcs("4", Some("5"), "6", false)), Some(15));
    }

    #[test]
    fn gcs_absent_without_eye_or_motor() {
        let mut g = gcs("4", Some("5"), "6", false);
        g.motor_response = None;
        assert_eq!(total_gcs(&g), None);

        let g = gcs("open", Some("5"), "6", false);
        assert_eq!(total_gcs(&g), None);
    }

    #[test]
    fn gcs_absent_when_component_off_scale() {
        assert_eq!(total_gcs(&gcs("4294967295", None, "4294967295", true)), None);
        assert_eq!(total_gcs(&gcs("5", Some("5"), "6", false)), None);
        assert_eq!(total_gcs(&gcs("4", Some("6"), "6", false)), None);
        assert_eq!(total_gcs(&gcs("4", Some("5"), "7", false)), None);
        assert_eq!(total_gcs(&gcs("0", Some("5"), "6", false)), None);
        assert_eq!(total_gcs(&gcs("-1", Some("5"), "6", false)), None);
        assert_eq!(total_gcs(&gcs("1", Some("1"), "1", false)), Some(3));
        // Off-scale verbal is ignored once intubated.
        assert_eq!(total_gcs(&gcs("4", Some("9"), "6", true)), Some(11));
    }

    #[test]
    fn leon_requires_all_components_in_range() {
        assert_eq!(leon_score(&leon(1, 1, 0, 0)), Some(2));
        assert_eq!(leon_score(&leon(1, 1, 1, 1)), Some(4));
        assert_eq!(leon_score(&leon(2, 0, 0, 0)), None);

        let mut partial = leon(1, 1, 1, 1);
        partial.neck_mobility = None;
        assert_eq!(leon_score(&partial), None);
    }

    #[test]
    fn comorbidity_burden_weights() {
        let renal = Comorbidities {
            chronic_renal_disease: Some(true),
            ..Default::default()
        };
        assert_eq!(comorbidity_burden(&renal), 2);

        let renal_liver = Comorbidities {
            chronic_renal_disease: Some(true),
            chronic_liver_disease: Some(true),
            ..Default::default()
        };
        assert_eq!(comorbidity_burden(&renal_liver), 4);

        let dm_htn = Comorbidities {
            diabetes: Some(true),
            hypertension: Some(true),
            others: Some(false),
            ..Default::default()
        };
        assert_eq!(comorbidity_burden(&dm_htn), 2);
    }

    #[test]
    fn calculate_all_parses_raw_strings() {
        let snapshot = FormSnapshot {
            pre_induction_vitals: Some(vitals("120", "80", "", "")),
            gcs: Some(gcs("3", None, "4", true)),
            leon_score: Some(leon(1, 1, 0, 0)),
            ..Default::default()
        };
        let values = calculate_all(&snapshot);
        assert_eq!(values.shock_index, Some(1.5));
        assert_eq!(values.mean_arterial_pressure, None);
        assert_eq!(values.modified_shock_index, None);
        assert_eq!(values.total_gcs, Some(8));
        assert_eq!(values.leon_total_score, Some(2));
        assert_eq!(values.comorbidity_burden, None);
        assert_eq!(values.bmi, None);
    }

    #[test]
    fn calculate_all_is_idempotent() {
        let snapshot = FormSnapshot {
            pre_induction_vitals: Some(vitals("95 bpm", "130", "85", "97")),
            ..Default::default()
        };
        assert_eq!(calculate_all(&snapshot), calculate_all(&snapshot));
    }

    #[test]
    fn gcs_bands() {
        assert_eq!(interpret_gcs(8).severity, GcsSeverity::Severe);
        assert_eq!(interpret_gcs(9).severity, GcsSeverity::Moderate);
        assert_eq!(interpret_gcs(12).severity, GcsSeverity::Moderate);
        assert_eq!(interpret_gcs(13).severity, GcsSeverity::Mild);
    }

    #[test]
    fn leon_bands() {
        assert_eq!(interpret_leon(1).risk, RiskTier::Low);
        assert_eq!(interpret_leon(2).risk, RiskTier::Moderate);
        assert_eq!(interpret_leon(3).risk, RiskTier::Moderate);
        assert_eq!(interpret_leon(4).risk, RiskTier::High);
        assert_eq!(interpret_leon(4).recommendations[1], "ENT consultation");
    }

    #[test]
    fn shock_bands() {
        assert_eq!(ShockBand::classify(0.6), ShockBand::Normal);
        assert_eq!(ShockBand::classify(0.8), ShockBand::Mild);
        assert_eq!(ShockBand::classify(1.0), ShockBand::Moderate);
        assert_eq!(ShockBand::classify(1.5), ShockBand::Severe);
    }

    #[test]
    fn hemodynamic_risk_tiers() {
        let stable = assess_hemodynamic_risk(&vitals("80", "120", "80", "98"));
        assert_eq!(stable.tier, RiskTier::Low);
        assert!(stable.findings.is_empty());

        let tachy = assess_hemodynamic_risk(&vitals("110", "140", "90", "98"));
        assert_eq!(tachy.tier, RiskTier::Moderate);

        let shocked = assess_hemodynamic_risk(&vitals("120", "80", "", ""));
        assert_eq!(shocked.tier, RiskTier::High);
        assert_eq!(shocked.findings.len(), 3);
        assert!(shocked
            .recommendations
            .contains(&"Immediate vasopressor support".to_string()));
    }

    #[test]
    fn comorbidity_notes_follow_checklist_order() {
        let c = Comorbidities {
            chronic_liver_disease: Some(true),
            diabetes: Some(true),
            ..Default::default()
        };
        let notes = comorbidity_notes(&c);
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].key, "diabetes");
        assert_eq!(notes[1].key, "liver");
        assert_eq!(notes[1].notes[0], "Drug metabolism warnings");
    }
}
