//! Weight-based dosing and drug selection support.
//!
//! Advisory output only. Nothing here feeds the alert engine.

use serde::Serialize;

use crate::models::enums::Sex;
use crate::models::lenient;
use crate::models::{Comorbidities, FormSnapshot, Indication, VitalSigns};

use super::calculations::{shock_index, ELEVATED_SHOCK_INDEX};

/// Per-kg dose and rounding for the agents the form records.
fn dose_per_kg(agent: &str) -> Option<(f64, i32, &'static str)> {
    Some(match agent {
        "fentanyl" => (2.0, 0, "mcg"),
        "dexmedetomidine" => (0.5, 0, "mcg"),
        "propofol" => (1.5, 0, "mg"),
        "etomidate" => (0.3, 1, "mg"),
        "ketamine" => (1.5, 0, "mg"),
        "rocuronium" => (1.2, 0, "mg"),
        "succinylcholine" => (1.5, 0, "mg"),
        _ => return None,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoseSuggestion {
    pub agent: String,
    pub dose: f64,
    pub unit: &'static str,
}

/// Suggested bolus for `agent` at `weight_kg`. Unknown agents and missing or
/// non-positive weights yield `None`.
pub fn medication_dose(weight_kg: Option<f64>, agent: &str) -> Option<DoseSuggestion> {
    let weight = weight_kg.filter(|w| *w > 0.0 && w.is_finite())?;
    let key = agent.trim().to_ascii_lowercase();
    let (per_kg, decimals, unit) = dose_per_kg(&key)?;
    let factor = 10f64.powi(decimals);
    Some(DoseSuggestion {
        agent: key,
        dose: (weight * per_kg * factor).round() / factor,
        unit,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InductionRecommendation {
    pub agent: &'static str,
    pub dose: &'static str,
    pub rationale: &'static str,
}

/// First matching rule wins: shock or sepsis, head injury, respiratory
/// failure, cardiac failure, then the stable default.
pub fn recommended_induction_agent(
    indication: Option<&Indication>,
    vitals: Option<&VitalSigns>,
) -> InductionRecommendation {
    let medical = indication.and_then(|i| i.medical.as_ref());
    let trauma = indication.and_then(|i| i.trauma.as_ref());
    let si = vitals.and_then(|v| shock_index(v.heart_rate(), v.systolic()));

    let sepsis = medical.and_then(|m| m.sepsis) == Some(true);
    if sepsis || si.is_some_and(|v| v > ELEVATED_SHOCK_INDEX) {
        return InductionRecommendation {
            agent: "etomidate",
            dose: "0.3 mg/kg",
            rationale: "Hemodynamic stability in shock/sepsis",
        };
    }
    if trauma.and_then(|t| t.head_injury_reduced_sensorium) == Some(true) {
        return InductionRecommendation {
            agent: "propofol",
            dose: "1-2 mg/kg",
            rationale: "Neuroprotection and ICP reduction",
        };
    }
    if medical.and_then(|m| m.respiratory_failure) == Some(true) {
        return InductionRecommendation {
            agent: "ketamine",
            dose: "1-2 mg/kg",
            rationale: "Bronchodilator properties",
        };
    }
    if medical.and_then(|m| m.cardiac_failure) == Some(true) {
        return InductionRecommendation {
            agent: "etomidate",
            dose: "0.3 mg/kg",
            rationale: "Minimal cardiac depression",
        };
    }
    InductionRecommendation {
        agent: "propofol",
        dose: "1-2 mg/kg",
        rationale: "Standard induction for stable patients",
    }
}

/// Patient-specific cautions for a paralytic agent.
pub fn paralytic_contraindications(agent: &str, comorbidities: Option<&Comorbidities>) -> Vec<String> {
    let mut cautions = Vec::new();
    if agent.trim().eq_ignore_ascii_case("succinylcholine") {
        if comorbidities.and_then(|c| c.chronic_renal_disease) == Some(true) {
            cautions.push("Chronic renal disease - hyperkalemia risk".to_string());
        }
        cautions.push("Verify no burns >24h, neuromuscular disease, or MH history".to_string());
    }
    cautions
}

/// General contraindications for an induction or paralytic agent.
pub fn agent_contraindications(agent: &str) -> &'static [&'static str] {
    match agent.trim().to_ascii_lowercase().as_str() {
        "succinylcholine" => &[
            "Hyperkalemia",
            "Neuromuscular disorders",
            "Recent burns >24-48 hours",
            "Crush injuries",
            "Prolonged immobilization",
            "Malignant hyperthermia history",
            "Pseudocholinesterase deficiency",
        ],
        "etomidate" => &[
            "Adrenal insufficiency",
            "Septic shock",
            "Prolonged critical illness",
        ],
        "ketamine" => &[
            "Increased intracranial pressure",
            "Severe coronary artery disease",
            "Uncontrolled hypertension",
            "Psychosis",
        ],
        "propofol" => &[
            "Hemodynamic instability",
            "Egg or soy allergy",
            "Propofol infusion syndrome risk",
        ],
        _ => &[],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalRanges {
    pub heart_rate: Range,
    pub systolic_bp: Range,
}

/// Adult heart-rate and systolic targets, widened for patients over 65.
pub fn age_adjusted_ranges(age_years: f64) -> NormalRanges {
    let elderly = age_years > 65.0;
    NormalRanges {
        heart_rate: if elderly {
            Range { min: 50.0, max: 100.0 }
        } else {
            Range { min: 60.0, max: 120.0 }
        },
        systolic_bp: if elderly {
            Range { min: 110.0, max: 160.0 }
        } else {
            Range { min: 90.0, max: 140.0 }
        },
    }
}

/// Screening grade from mid-arm circumference (cm).
pub fn nutritional_status(mid_arm_cm: f64, sex: Option<Sex>) -> &'static str {
    let (severe, moderate) = match sex {
        Some(Sex::Male) => (23.0, 26.0),
        _ => (22.0, 25.0),
    };
    if mid_arm_cm < severe {
        "Severe malnutrition"
    } else if mid_arm_cm < moderate {
        "Moderate malnutrition"
    } else {
        "Normal nutrition"
    }
}

// ---------------------------------------------------------------------------
// Snapshot-level guidance
// ---------------------------------------------------------------------------

/// Agents for which a weight-based bolus is offered.
pub const DOSED_AGENTS: [&str; 7] = [
    "fentanyl",
    "dexmedetomidine",
    "propofol",
    "etomidate",
    "ketamine",
    "rocuronium",
    "succinylcholine",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalGuidance {
    pub induction: InductionRecommendation,
    pub doses: Vec<DoseSuggestion>,
    pub succinylcholine_cautions: Vec<String>,
    pub normal_ranges: Option<NormalRanges>,
    pub nutritional_status: Option<&'static str>,
}

pub fn build_guidance(snapshot: &FormSnapshot) -> ClinicalGuidance {
    let demo = snapshot.demographics.as_ref();
    let weight = demo.and_then(|d| lenient::number(d.weight.as_ref()));

    ClinicalGuidance {
        induction: recommended_induction_agent(
            snapshot.indication.as_ref(),
            snapshot.pre_induction_vitals.as_ref(),
        ),
        doses: DOSED_AGENTS
            .iter()
            .filter_map(|agent| medication_dose(weight, agent))
            .collect(),
        succinylcholine_cautions: paralytic_contraindications(
            "succinylcholine",
            snapshot.comorbidities.as_ref(),
        ),
        normal_ranges: demo
            .and_then(|d| lenient::number(d.age.as_ref()))
            .map(age_adjusted_ranges),
        nutritional_status: demo.and_then(|d| {
            lenient::number(d.mid_arm_circumference.as_ref())
                .map(|mac| nutritional_status(mac, d.sex))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Demographics, MedicalIndication, TraumaIndication};

    #[test]
    fn weight_based_doses() {
        let dose = |agent| medication_dose(Some(70.0), agent).map(|d| d.dose);
        assert_eq!(dose("fentanyl"), Some(140.0));
        assert_eq!(dose("etomidate"), Some(21.0));
        assert_eq!(dose("Rocuronium"), Some(84.0));
        assert_eq!(dose("vecuronium"), None);
        assert_eq!(medication_dose(Some(0.0), "propofol"), None);
        assert_eq!(medication_dose(None, "propofol"), None);
    }

    #[test]
    fn etomidate_keeps_one_decimal() {
        assert_eq!(medication_dose(Some(55.0), "etomidate").unwrap().dose, 16.5);
    }

    #[test]
    fn shock_prefers_etomidate_over_head_injury() {
        let indication = Indication {
            category: None,
            trauma: Some(TraumaIndication {
                head_injury_reduced_sensorium: Some(true),
                ..Default::default()
            }),
            medical: None,
        };
        let shocked = VitalSigns {
            heart_rate: Some("130".into()),
            systolic_bp: Some("85".into()),
            ..Default::default()
        };
        assert_eq!(
            recommended_induction_agent(Some(&indication), Some(&shocked)).agent,
            "etomidate"
        );
        assert_eq!(recommended_induction_agent(Some(&indication), None).agent, "propofol");
    }

    #[test]
    fn respiratory_failure_prefers_ketamine() {
        let indication = Indication {
            category: None,
            trauma: None,
            medical: Some(MedicalIndication {
                respiratory_failure: Some(true),
                ..Default::default()
            }),
        };
        let rec = recommended_induction_agent(Some(&indication), None);
        assert_eq!(rec.agent, "ketamine");
        assert_eq!(rec.rationale, "Bronchodilator properties");
    }

    #[test]
    fn default_induction_is_propofol() {
        let rec = recommended_induction_agent(None, None);
        assert_eq!(rec.rationale, "Standard induction for stable patients");
    }

    #[test]
    fn succinylcholine_flags_renal_disease() {
        let renal = Comorbidities {
            chronic_renal_disease: Some(true),
            ..Default::default()
        };
        let cautions = paralytic_contraindications("succinylcholine", Some(&renal));
        assert_eq!(cautions.len(), 2);
        assert!(cautions[0].contains("hyperkalemia"));
        assert!(paralytic_contraindications("rocuronium", Some(&renal)).is_empty());
    }

    #[test]
    fn reference_contraindications() {
        assert!(agent_contraindications("Ketamine").contains(&"Psychosis"));
        assert!(agent_contraindications("vecuronium").is_empty());
    }

    #[test]
    fn elderly_ranges_shift() {
        let r = age_adjusted_ranges(70.0);
        assert_eq!(r.heart_rate.min, 50.0);
        assert_eq!(r.systolic_bp.min, 110.0);
        assert_eq!(age_adjusted_ranges(40.0).heart_rate.max, 120.0);
    }

    #[test]
    fn nutrition_thresholds_by_sex() {
        assert_eq!(nutritional_status(22.5, Some(Sex::Male)), "Severe malnutrition");
        assert_eq!(nutritional_status(22.5, Some(Sex::Female)), "Moderate malnutrition");
        assert_eq!(nutritional_status(27.0, None), "Normal nutrition");
    }

    #[test]
    fn guidance_from_snapshot() {
        let snapshot = FormSnapshot {
            demographics: Some(Demographics {
                weight: Some("80 kg".into()),
                age: Some("72".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let guidance = build_guidance(&snapshot);
        assert_eq!(guidance.doses.len(), DOSED_AGENTS.len());
        assert_eq!(guidance.doses[0].dose, 160.0);
        assert_eq!(guidance.normal_ranges.unwrap().systolic_bp.max, 160.0);
        assert_eq!(guidance.nutritional_status, None);
        assert_eq!(guidance.succinylcholine_cautions.len(), 1);
    }
}
