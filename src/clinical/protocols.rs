use crate::models::{FormSnapshot, ProtocolActivation};

use super::calculations::{leon_score, total_gcs, SEVERE_GCS_MAX};

/// LEON score at which the difficult-airway bundle is activated.
const DIFFICULT_AIRWAY_PROTOCOL_LEON: u32 = 3;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Care bundles activated by the current snapshot, each at most once.
pub fn activated_protocols(snapshot: &FormSnapshot) -> Vec<ProtocolActivation> {
    let mut protocols = Vec::new();

    let sepsis = snapshot
        .indication
        .as_ref()
        .and_then(|i| i.medical.as_ref())
        .and_then(|m| m.sepsis)
        .unwrap_or(false);
    if sepsis {
        protocols.push(sepsis_bundle());
    }

    if snapshot
        .gcs
        .as_ref()
        .and_then(total_gcs)
        .is_some_and(|total| total <= SEVERE_GCS_MAX)
    {
        protocols.push(neuroprotection());
    }

    if snapshot
        .leon_score
        .as_ref()
        .and_then(leon_score)
        .is_some_and(|score| score >= DIFFICULT_AIRWAY_PROTOCOL_LEON)
    {
        protocols.push(difficult_airway());
    }

    protocols
}

fn sepsis_bundle() -> ProtocolActivation {
    ProtocolActivation {
        id: "sepsis-bundle".into(),
        name: "Sepsis Bundle Protocol".into(),
        indication: "Sepsis".into(),
        steps: strings(&[
            "Obtain blood cultures before antibiotics",
            "Administer broad-spectrum antibiotics within 1 hour",
            "Measure lactate level",
            "Begin rapid administration of 30ml/kg crystalloid for hypotension or lactate ≥4 mmol/L",
            "Apply vasopressors if hypotension during or after fluid resuscitation to maintain MAP ≥65 mmHg",
        ]),
        medications: strings(&["Broad-spectrum antibiotics", "Crystalloid fluids", "Vasopressors"]),
        monitoring: strings(&["Blood pressure", "Urine output", "Lactate levels"]),
        consultations: strings(&["Infectious disease", "ICU"]),
    }
}

fn neuroprotection() -> ProtocolActivation {
    ProtocolActivation {
        id: "neuroprotection".into(),
        name: "Neuroprotection Protocol".into(),
        indication: "Severe brain injury (GCS ≤8)".into(),
        steps: strings(&[
            "Maintain MAP >80 mmHg",
            "Target PCO2 35-40 mmHg",
            "Maintain normothermia",
            "Elevate head of bed 30 degrees",
            "Avoid hypotonic fluids",
        ]),
        medications: strings(&["Propofol", "Mannitol if indicated", "Hypertonic saline if indicated"]),
        monitoring: strings(&[
            "ICP monitoring",
            "Frequent neurological checks",
            "ABG monitoring",
        ]),
        consultations: strings(&["Neurosurgery", "ICU"]),
    }
}

fn difficult_airway() -> ProtocolActivation {
    ProtocolActivation {
        id: "difficult-airway".into(),
        name: "Difficult Airway Protocol".into(),
        indication: "High LEON score (≥3)".into(),
        steps: strings(&[
            "Prepare multiple airway devices",
            "Experienced intubator",
            "Video laryngoscopy first line",
            "Surgical airway backup ready",
            "Consider awake intubation if LEON ≥4",
        ]),
        medications: strings(&["Topical anesthetics for awake intubation"]),
        monitoring: strings(&["Continuous capnography", "Pulse oximetry"]),
        consultations: strings(&["ENT", "Anesthesia"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::IndicationCategory;
    use crate::models::{Gcs, Indication, LeonScore, MedicalIndication};

    fn protocol_ids(snapshot: &FormSnapshot) -> Vec<String> {
        activated_protocols(snapshot).into_iter().map(|p| p.id).collect()
    }

    #[test]
    fn nothing_activated_for_empty_form() {
        assert!(activated_protocols(&FormSnapshot::default()).is_empty());
    }

    #[test]
    fn all_three_bundles_in_fixed_order() {
        let snapshot = FormSnapshot {
            indication: Some(Indication {
                category: Some(IndicationCategory::Medical),
                medical: Some(MedicalIndication {
                    sepsis: Some(true),
                    ..Default::default()
                }),
                trauma: None,
            }),
            gcs: Some(Gcs {
                eye_response: Some("1".into()),
                verbal_response: Some("1".into()),
                motor_response: Some("3".into()),
                is_already_intubated: Some(false),
            }),
            leon_score: Some(LeonScore {
                large_tongue: Some(1),
                thyro_mental_distance: Some(1),
                obstruction: Some(1),
                neck_mobility: Some(0),
            }),
            ..Default::default()
        };
        assert_eq!(
            protocol_ids(&snapshot),
            vec!["sepsis-bundle", "neuroprotection", "difficult-airway"]
        );
    }

    #[test]
    fn leon_two_does_not_activate_airway_bundle() {
        let snapshot = FormSnapshot {
            leon_score: Some(LeonScore {
                large_tongue: Some(1),
                thyro_mental_distance: Some(1),
                obstruction: Some(0),
                neck_mobility: Some(0),
            }),
            ..Default::default()
        };
        assert!(protocol_ids(&snapshot).is_empty());
    }

    #[test]
    fn incomplete_gcs_does_not_activate_neuroprotection() {
        let snapshot = FormSnapshot {
            gcs: Some(Gcs {
                eye_response: Some("1".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(protocol_ids(&snapshot).is_empty());
    }

    #[test]
    fn sepsis_bundle_lists_consultations() {
        let bundle = sepsis_bundle();
        assert_eq!(bundle.consultations, vec!["Infectious disease", "ICU"]);
        assert_eq!(bundle.steps.len(), 5);
    }
}
