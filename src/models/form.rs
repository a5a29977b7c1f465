use serde::{Deserialize, Serialize};

use super::enums::{IndicationCategory, Sex};
use super::lenient;

/// The in-progress case record, one optional section per form phase.
/// Raw measurements stay as the operator typed them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FormSnapshot {
    pub demographics: Option<Demographics>,
    pub comorbidities: Option<Comorbidities>,
    pub gcs: Option<Gcs>,
    pub indication: Option<Indication>,
    pub leon_score: Option<LeonScore>,
    pub pre_induction_vitals: Option<VitalSigns>,
    pub pre_induction_labs: Option<LabValues>,
    pub airway_status: Option<AirwayStatus>,
    pub pre_intubation_management: Option<PreIntubationManagement>,
    pub post_intubation_gcs: Option<PostIntubationGcs>,
    pub ventilator_settings: Option<VentilatorSettings>,
    pub post_intubation_events: Option<PostIntubationEvents>,
    pub intubation_attempts: Option<Vec<IntubationAttempt>>,
    #[serde(deserialize_with = "lenient::whole")]
    pub total_attempts: Option<i64>,
    pub monitoring_table: Option<MonitoringTable>,
    pub timestamps: Option<FormTimestamps>,
}

impl FormSnapshot {
    /// Hospital number entered on the demographics phase, if any.
    pub fn hospital_no(&self) -> Option<&str> {
        self.demographics
            .as_ref()
            .and_then(|d| d.hospital_no.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Patient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Demographics {
    #[serde(deserialize_with = "lenient::text")]
    pub age: Option<String>,
    pub sex: Option<Sex>,
    #[serde(deserialize_with = "lenient::text")]
    pub hospital_no: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub mid_arm_circumference: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub weight: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub height: Option<String>,
    pub occupation: Option<String>,
    pub occupation_other: Option<String>,
    pub financial_status: Option<String>,
    pub financial_status_other: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Comorbidities {
    #[serde(deserialize_with = "lenient::flag")]
    pub diabetes: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub hypertension: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub chronic_renal_disease: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub chronic_liver_disease: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub reactive_airway_disease: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub others: Option<bool>,
    pub others_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Gcs {
    #[serde(deserialize_with = "lenient::text")]
    pub eye_response: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub verbal_response: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub motor_response: Option<String>,
    #[serde(deserialize_with = "lenient::flag")]
    pub is_already_intubated: Option<bool>,
}

// ---------------------------------------------------------------------------
// Indication
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Indication {
    pub category: Option<IndicationCategory>,
    pub trauma: Option<TraumaIndication>,
    pub medical: Option<MedicalIndication>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TraumaIndication {
    #[serde(deserialize_with = "lenient::flag")]
    pub head_injury_reduced_sensorium: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub head_injury_airway_threatened: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub neck_facial_trauma: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub burn_inhalation: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub drowning: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub chest_trauma: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub spinal_cord_injury: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub major_trauma: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub shock: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub other: Option<bool>,
    pub other_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MedicalIndication {
    #[serde(deserialize_with = "lenient::flag")]
    pub respiratory_failure: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub anaphylaxis: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub cardiac_failure: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub sepsis: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub ich_stroke: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub seizure: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub altered_mental_status: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub overdose_poison: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub gi_bleed: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub airway_obstruction: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub sepsis_with_hypotension: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub other: Option<bool>,
    pub other_text: Option<String>,
}

/// LEON difficult-airway components, each expected to be 0 or 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LeonScore {
    #[serde(deserialize_with = "lenient::whole")]
    pub large_tongue: Option<i64>,
    #[serde(deserialize_with = "lenient::whole")]
    pub thyro_mental_distance: Option<i64>,
    #[serde(deserialize_with = "lenient::whole")]
    pub obstruction: Option<i64>,
    #[serde(deserialize_with = "lenient::whole")]
    pub neck_mobility: Option<i64>,
}

// ---------------------------------------------------------------------------
// Pre-induction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VitalSigns {
    #[serde(deserialize_with = "lenient::text")]
    pub heart_rate: Option<String>,
    #[serde(rename = "systolicBP", deserialize_with = "lenient::text")]
    pub systolic_bp: Option<String>,
    #[serde(rename = "diastolicBP", deserialize_with = "lenient::text")]
    pub diastolic_bp: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub respiratory_rate: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub spo2: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub temperature: Option<String>,
    pub timestamp: Option<String>,
}

impl VitalSigns {
    pub fn heart_rate(&self) -> Option<f64> {
        lenient::number(self.heart_rate.as_ref())
    }

    pub fn systolic(&self) -> Option<f64> {
        lenient::number(self.systolic_bp.as_ref())
    }

    pub fn diastolic(&self) -> Option<f64> {
        lenient::number(self.diastolic_bp.as_ref())
    }

    pub fn spo2(&self) -> Option<f64> {
        lenient::number(self.spo2.as_ref())
    }

    /// True when no measurement has been entered.
    pub fn is_blank(&self) -> bool {
        [
            &self.heart_rate,
            &self.systolic_bp,
            &self.diastolic_bp,
            &self.respiratory_rate,
            &self.spo2,
            &self.temperature,
        ]
        .iter()
        .all(|v| v.as_deref().map_or(true, |s| s.trim().is_empty()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LabValues {
    #[serde(deserialize_with = "lenient::text")]
    pub ph: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub pao2: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub paco2: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub lactate: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub hemoglobin: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub platelets: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub glucose: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub hco3: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub creatinine: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub urea: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub na: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub k: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AirwayStatus {
    #[serde(deserialize_with = "lenient::flag")]
    pub failure_to_maintain_protect_airway: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub failure_of_ventilation_oxygenation: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub deterioration_anticipated: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub predictor_for_difficult_airway: Option<bool>,
    #[serde(deserialize_with = "lenient::text")]
    pub safe_apnea_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MedicationDose {
    #[serde(deserialize_with = "lenient::flag")]
    pub given: Option<bool>,
    #[serde(deserialize_with = "lenient::decimal")]
    pub dose: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OtherMedication {
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient::flag")]
    pub given: Option<bool>,
    #[serde(deserialize_with = "lenient::decimal")]
    pub dose: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PreInductionFluids {
    #[serde(deserialize_with = "lenient::flag")]
    pub normal_saline: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub ringer_lactate: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub colloids: Option<bool>,
    #[serde(deserialize_with = "lenient::decimal")]
    pub volume_ml: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PushDosePressor {
    #[serde(deserialize_with = "lenient::flag")]
    pub adrenaline: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub noradrenaline: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub phenylephrine: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub metaraminol: Option<bool>,
    #[serde(deserialize_with = "lenient::decimal")]
    pub dose: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InfusionSetting {
    pub agent: Option<String>,
    #[serde(deserialize_with = "lenient::decimal")]
    pub dose_mcg_per_kg_min: Option<f64>,
    #[serde(deserialize_with = "lenient::decimal")]
    pub dose: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PreIntubationManagement {
    pub etomidate: Option<MedicationDose>,
    pub propofol: Option<MedicationDose>,
    pub ketamine: Option<MedicationDose>,
    pub midazolam: Option<MedicationDose>,
    pub fentanyl: Option<MedicationDose>,
    pub succinylcholine: Option<MedicationDose>,
    pub rocuronium: Option<MedicationDose>,
    pub vecuronium: Option<MedicationDose>,
    pub atracurium: Option<MedicationDose>,
    pub cisatracurium: Option<MedicationDose>,
    pub other_medications: Option<Vec<OtherMedication>>,
    pub pre_induction_fluids: Option<PreInductionFluids>,
    pub push_dose_pressor: Option<PushDosePressor>,
    pub vasopressor_infusion: Option<InfusionSetting>,
    pub sedation_infusion: Option<InfusionSetting>,
    pub sedation_done: Option<String>,
}

impl PreIntubationManagement {
    /// Named agents marked as given, in form order.
    pub fn given_agents(&self) -> Vec<(&'static str, Option<f64>)> {
        [
            ("etomidate", &self.etomidate),
            ("propofol", &self.propofol),
            ("ketamine", &self.ketamine),
            ("midazolam", &self.midazolam),
            ("fentanyl", &self.fentanyl),
            ("succinylcholine", &self.succinylcholine),
            ("rocuronium", &self.rocuronium),
            ("vecuronium", &self.vecuronium),
            ("atracurium", &self.atracurium),
            ("cisatracurium", &self.cisatracurium),
        ]
        .into_iter()
        .filter_map(|(name, entry)| {
            entry
                .as_ref()
                .filter(|e| e.given == Some(true))
                .map(|e| (name, e.dose))
        })
        .collect()
    }
}

// ---------------------------------------------------------------------------
// Post-intubation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostIntubationGcs {
    #[serde(deserialize_with = "lenient::text")]
    pub eye: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub motor: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub verbal: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VentilatorSettings {
    #[serde(deserialize_with = "lenient::text")]
    pub ett_cd_value: Option<String>,
    pub mode: Option<String>,
    #[serde(deserialize_with = "lenient::decimal")]
    pub peep: Option<f64>,
    #[serde(deserialize_with = "lenient::decimal")]
    pub p_peak: Option<f64>,
    #[serde(deserialize_with = "lenient::decimal")]
    pub minute_ventilation: Option<f64>,
    pub settings_description: Option<String>,
    pub change_in_settings: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PostIntubationEvents {
    #[serde(deserialize_with = "lenient::flag")]
    pub post_intubation_cardiac_arrest: Option<bool>,
    pub cardiac_arrest_details: Option<String>,
    pub other_serious_adverse_events: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IntubationAttempt {
    #[serde(deserialize_with = "lenient::whole")]
    pub attempt_number: Option<i64>,
    pub years_experience: Option<String>,
    pub laryngoscope_type: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub blade_size: Option<String>,
    #[serde(deserialize_with = "lenient::flag")]
    pub bougie_or_stylet_used: Option<bool>,
    #[serde(deserialize_with = "lenient::flag")]
    pub ett_changed: Option<bool>,
    pub remarks: Option<String>,
}

/// Hemodynamics recorded at fixed points after intubation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonitoringTable {
    pub post5: Option<VitalSigns>,
    pub post10: Option<VitalSigns>,
    pub post15: Option<VitalSigns>,
    pub post30: Option<VitalSigns>,
    pub modified_shock_index: Option<MonitoringShockIndex>,
}

impl MonitoringTable {
    /// Filled rows labelled by their table key.
    pub fn rows(&self) -> Vec<(&'static str, &VitalSigns)> {
        [
            ("post5", &self.post5),
            ("post10", &self.post10),
            ("post15", &self.post15),
            ("post30", &self.post30),
        ]
        .into_iter()
        .filter_map(|(key, row)| row.as_ref().map(|r| (key, r)))
        .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringShockIndex {
    #[serde(deserialize_with = "lenient::text")]
    pub post5: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub post10: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub post15: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub post30: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FormTimestamps {
    pub form_started: Option<String>,
    pub paralysis_given: Option<String>,
    pub intubation_completed: Option<String>,
    pub form_completed: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_partial_wire_form() {
        let snapshot: FormSnapshot = serde_json::from_value(json!({
            "demographics": {"hospitalNo": "HN-001", "weight": 70, "sex": "F"},
            "gcs": {"eyeResponse": "3", "motorResponse": "4", "isAlreadyIntubated": "on"},
            "preInductionVitals": {"heartRate": "120", "systolicBP": "80"},
            "leonScore": {"largeTongue": 1, "thyroMentalDistance": "1"}
        }))
        .unwrap();

        let demo = snapshot.demographics.as_ref().unwrap();
        assert_eq!(demo.weight.as_deref(), Some("70"));
        assert_eq!(demo.sex, Some(Sex::Female));
        assert_eq!(snapshot.hospital_no(), Some("HN-001"));
        assert_eq!(snapshot.gcs.as_ref().unwrap().is_already_intubated, Some(true));

        let vitals = snapshot.pre_induction_vitals.as_ref().unwrap();
        assert_eq!(vitals.heart_rate(), Some(120.0));
        assert_eq!(vitals.systolic(), Some(80.0));
        assert_eq!(vitals.diastolic(), None);

        let leon = snapshot.leon_score.as_ref().unwrap();
        assert_eq!(leon.thyro_mental_distance, Some(1));
        assert_eq!(leon.obstruction, None);
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let snapshot = FormSnapshot {
            pre_induction_vitals: Some(VitalSigns {
                systolic_bp: Some("90".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["preInductionVitals"]["systolicBP"], "90");
        assert!(value.get("pre_induction_vitals").is_none());
    }

    #[test]
    fn blank_hospital_number_is_absent() {
        let snapshot = FormSnapshot {
            demographics: Some(Demographics {
                hospital_no: Some("   ".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(snapshot.hospital_no(), None);
    }

    #[test]
    fn given_agents_lists_only_checked_entries() {
        let mgmt = PreIntubationManagement {
            ketamine: Some(MedicationDose { given: Some(true), dose: Some(100.0) }),
            propofol: Some(MedicationDose { given: Some(false), dose: Some(50.0) }),
            rocuronium: Some(MedicationDose { given: Some(true), dose: None }),
            ..Default::default()
        };
        assert_eq!(
            mgmt.given_agents(),
            vec![("ketamine", Some(100.0)), ("rocuronium", None)]
        );
    }

    #[test]
    fn monitoring_rows_skip_unfilled_timepoints() {
        let table = MonitoringTable {
            post10: Some(VitalSigns::default()),
            ..Default::default()
        };
        let rows = table.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, "post10");
        assert!(rows[0].1.is_blank());
    }
}
