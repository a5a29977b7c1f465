use chrono::{DateTime, Utc};

use crate::models::enums::{AlertCategory, AlertLevel, IndicationCategory, RiskTier};
use crate::models::{
    ClinicalAlert, Comorbidities, FormSnapshot, Indication, MonitoringTable, SeveritySummary,
    VitalSigns,
};

use super::calculations::{
    assess_hemodynamic_risk, comorbidity_notes, interpret_leon, leon_score, total_gcs,
    HYPOTENSIVE_SBP, HYPOXEMIC_SPO2, SEVERE_GCS_MAX,
};

/// SpO2 below this on a post-intubation row raises a desaturation alert.
const POST_INTUBATION_DESATURATION_SPO2: f64 = 92.0;

/// Run every rule group over the snapshot. Groups are independent and
/// their output is concatenated in a fixed order.
pub fn generate_alerts(snapshot: &FormSnapshot, at: DateTime<Utc>) -> Vec<ClinicalAlert> {
    let mut alerts = Vec::new();

    alerts.extend(neurological_alerts(snapshot, at));
    alerts.extend(airway_alerts(snapshot, at));
    if let Some(vitals) = &snapshot.pre_induction_vitals {
        alerts.extend(vital_sign_alerts(vitals, at));
    }
    if let Some(comorbidities) = &snapshot.comorbidities {
        alerts.extend(comorbidity_alerts(comorbidities, at));
    }
    if let Some(indication) = &snapshot.indication {
        alerts.extend(indication_alerts(indication, at));
    }
    if let Some(table) = &snapshot.monitoring_table {
        alerts.extend(monitoring_table_alerts(table, at));
    }

    alerts
}

// ---------------------------------------------------------------------------
// Rule groups
// ---------------------------------------------------------------------------

fn neurological_alerts(snapshot: &FormSnapshot, at: DateTime<Utc>) -> Option<ClinicalAlert> {
    let total = snapshot.gcs.as_ref().and_then(total_gcs)?;
    (total <= SEVERE_GCS_MAX).then(|| {
        ClinicalAlert::new(
            "gcs-severe",
            AlertLevel::Critical,
            Some(AlertCategory::Neurological),
            "Severe Brain Injury Detected",
            format!("GCS {total} - Critical neurological status"),
            at,
        )
        .with_triggers(["gcs_8_or_less"])
        .with_actions([
            "ICU consultation",
            "Neuroprotection protocol",
            "ICP monitoring setup",
            "CT scan priority",
        ])
    })
}

fn airway_alerts(snapshot: &FormSnapshot, at: DateTime<Utc>) -> Option<ClinicalAlert> {
    let score = snapshot.leon_score.as_ref().and_then(leon_score)?;
    if score < 2 {
        return None;
    }
    let interpretation = interpret_leon(score);
    let level = if score >= 4 {
        AlertLevel::Critical
    } else {
        AlertLevel::Warning
    };
    Some(
        ClinicalAlert::new(
            "difficult-airway",
            level,
            Some(AlertCategory::Airway),
            "Difficult Airway Predicted",
            format!(
                "LEON Score {score} - {} difficulty",
                interpretation.risk.as_str()
            ),
            at,
        )
        .with_triggers(["leon_score_2_plus"])
        .with_actions(interpretation.recommendations),
    )
}

fn vital_sign_alerts(vitals: &VitalSigns, at: DateTime<Utc>) -> Vec<ClinicalAlert> {
    let mut alerts = Vec::new();

    let risk = assess_hemodynamic_risk(vitals);
    if risk.tier != RiskTier::Low {
        let level = if risk.tier == RiskTier::High {
            AlertLevel::Critical
        } else {
            AlertLevel::Warning
        };
        alerts.push(
            ClinicalAlert::new(
                "hemodynamic-instability",
                level,
                Some(AlertCategory::Hemodynamic),
                "Hemodynamic Instability",
                format!("{} risk patient", risk.tier.as_str()),
                at,
            )
            .with_triggers(risk.findings)
            .with_actions(risk.recommendations),
        );
    }

    if let Some(spo2) = vitals.spo2().filter(|v| *v < HYPOXEMIC_SPO2) {
        alerts.push(
            ClinicalAlert::new(
                "severe-hypoxemia",
                AlertLevel::Critical,
                Some(AlertCategory::Hemodynamic),
                "Severe Hypoxemia",
                format!("SpO2 {spo2}% - Urgent intervention required"),
                at,
            )
            .with_triggers(["spo2_below_90"])
            .with_actions([
                "Immediate preoxygenation",
                "PEEP optimization",
                "Consider BiPAP",
                "Prepare for difficult oxygenation",
            ]),
        );
    }

    if let Some(sbp) = vitals.systolic().filter(|v| *v < HYPOTENSIVE_SBP) {
        alerts.push(
            ClinicalAlert::new(
                "severe-hypotension",
                AlertLevel::Critical,
                Some(AlertCategory::Hemodynamic),
                "Severe Hypotension",
                format!("SBP {sbp} mmHg - Shock protocol"),
                at,
            )
            .with_triggers(["sbp_below_90"])
            .with_actions([
                "Prepare push-dose pressors",
                "Fluid resuscitation",
                "Vasopressor infusion ready",
                "Consider etomidate for induction",
            ]),
        );
    }

    alerts
}

fn comorbidity_alerts(comorbidities: &Comorbidities, at: DateTime<Utc>) -> Vec<ClinicalAlert> {
    comorbidity_notes(comorbidities)
        .into_iter()
        .map(|note| {
            ClinicalAlert::new(
                format!("comorbidity-{}", note.key),
                AlertLevel::Info,
                Some(AlertCategory::Medication),
                format!("Comorbidity Alert - {}", note.condition),
                note.notes[0],
                at,
            )
            .with_triggers(["comorbidity_present"])
            .with_actions(note.notes)
        })
        .collect()
}

struct IndicationRule {
    id: &'static str,
    level: AlertLevel,
    category: AlertCategory,
    title: &'static str,
    message: &'static str,
    trigger: &'static str,
    actions: &'static [&'static str],
}

impl IndicationRule {
    fn fire(&self, at: DateTime<Utc>) -> ClinicalAlert {
        ClinicalAlert::new(
            self.id,
            self.level,
            Some(self.category),
            self.title,
            self.message,
            at,
        )
        .with_triggers([self.trigger])
        .with_actions(self.actions.iter().copied())
    }
}

static HEAD_INJURY: IndicationRule = IndicationRule {
    id: "head-injury-protocol",
    level: AlertLevel::Warning,
    category: AlertCategory::Neurological,
    title: "Head Injury Protocol",
    message: "Neuroprotection measures required",
    trigger: "head_injury_reduced_sensorium",
    actions: &[
        "ICP monitoring setup",
        "CT scan priority",
        "Propofol for induction",
        "Avoid succinylcholine",
        "Target PCO2 35-40 mmHg",
    ],
};

static C_SPINE: IndicationRule = IndicationRule {
    id: "c-spine-precautions",
    level: AlertLevel::Critical,
    category: AlertCategory::Procedural,
    title: "C-Spine Precautions Required",
    message: "Cervical spine injury possible",
    trigger: "head_injury_airway_threatened",
    actions: &[
        "Manual in-line stabilization",
        "Video laryngoscopy preferred",
        "Minimize neck movement",
        "Surgical airway backup",
    ],
};

static AIRWAY_TRAUMA: IndicationRule = IndicationRule {
    id: "difficult-airway-trauma",
    level: AlertLevel::Critical,
    category: AlertCategory::Airway,
    title: "Airway Trauma - High Risk",
    message: "Consider awake intubation",
    trigger: "neck_facial_trauma",
    actions: &[
        "ENT consultation",
        "Awake intubation consideration",
        "Flexible bronchoscopy",
        "Emergency cricothyrotomy setup",
    ],
};

static BURN_INHALATION: IndicationRule = IndicationRule {
    id: "burn-inhalation",
    level: AlertLevel::Critical,
    category: AlertCategory::Airway,
    title: "Burn/Inhalation Injury",
    message: "Early intubation recommended",
    trigger: "burn_inhalation",
    actions: &[
        "Early intubation before edema",
        "Large ETT size",
        "Airway edema monitoring",
        "Special ventilator settings",
    ],
};

static SEPSIS: IndicationRule = IndicationRule {
    id: "sepsis-bundle",
    level: AlertLevel::Critical,
    category: AlertCategory::Hemodynamic,
    title: "Sepsis Bundle Activation",
    message: "Sepsis protocol initiated",
    trigger: "sepsis_indication",
    actions: &[
        "Fluid resuscitation",
        "Early antibiotic administration",
        "Vasopressor preparation",
        "Lactate monitoring",
        "Etomidate for induction",
    ],
};

static ANAPHYLAXIS: IndicationRule = IndicationRule {
    id: "anaphylaxis-protocol",
    level: AlertLevel::Critical,
    category: AlertCategory::Medication,
    title: "Anaphylaxis Protocol",
    message: "Immediate epinephrine required",
    trigger: "anaphylaxis",
    actions: &[
        "Epinephrine 1:1000 IM",
        "IV steroids",
        "H1/H2 blockers",
        "Fluid resuscitation",
        "Avoid succinylcholine",
    ],
};

static CARDIAC_FAILURE: IndicationRule = IndicationRule {
    id: "cardiac-failure",
    level: AlertLevel::Warning,
    category: AlertCategory::Hemodynamic,
    title: "Cardiac Failure Management",
    message: "Preload reduction strategies",
    trigger: "cardiac_failure",
    actions: &[
        "Preload reduction",
        "Inotrope preparation",
        "Etomidate preferred",
        "LVAD/mechanical support consideration",
    ],
};

static RESPIRATORY_FAILURE: IndicationRule = IndicationRule {
    id: "ards-protocol",
    level: AlertLevel::Warning,
    category: AlertCategory::Hemodynamic,
    title: "ARDS Protocol Consideration",
    message: "Lung protective ventilation",
    trigger: "respiratory_failure",
    actions: &[
        "Lung protective ventilation",
        "PEEP optimization",
        "Prone positioning evaluation",
        "ECMO criteria assessment",
    ],
};

/// The selected category decides which flag set is read; the other branch
/// is ignored even if it carries checked flags.
fn indication_alerts(indication: &Indication, at: DateTime<Utc>) -> Vec<ClinicalAlert> {
    let checked: Vec<(Option<bool>, &IndicationRule)> = match indication.category {
        Some(IndicationCategory::Trauma) => match &indication.trauma {
            Some(t) => vec![
                (t.head_injury_reduced_sensorium, &HEAD_INJURY),
                (t.head_injury_airway_threatened, &C_SPINE),
                (t.neck_facial_trauma, &AIRWAY_TRAUMA),
                (t.burn_inhalation, &BURN_INHALATION),
            ],
            None => vec![],
        },
        Some(IndicationCategory::Medical) => match &indication.medical {
            Some(m) => vec![
                (m.sepsis, &SEPSIS),
                (m.anaphylaxis, &ANAPHYLAXIS),
                (m.cardiac_failure, &CARDIAC_FAILURE),
                (m.respiratory_failure, &RESPIRATORY_FAILURE),
            ],
            None => vec![],
        },
        None => vec![],
    };

    checked
        .into_iter()
        .filter(|(flag, _)| *flag == Some(true))
        .map(|(_, rule)| rule.fire(at))
        .collect()
}

/// Per-row alerts for the post-intubation monitoring table. Ids carry the
/// row key so each timepoint de-duplicates on its own.
fn monitoring_table_alerts(table: &MonitoringTable, at: DateTime<Utc>) -> Vec<ClinicalAlert> {
    let mut alerts = Vec::new();

    for (key, row) in table.rows() {
        if row.systolic().is_some_and(|v| v < HYPOTENSIVE_SBP) {
            alerts.push(
                ClinicalAlert::new(
                    format!("post-intubation-hypotension-{key}"),
                    AlertLevel::Critical,
                    Some(AlertCategory::Hemodynamic),
                    "Post-Intubation Hypotension",
                    "Immediate intervention required",
                    at,
                )
                .with_triggers(["post_intubation_hypotension"])
                .with_actions([
                    "Push-dose epinephrine 10-20 mcg",
                    "Fluid bolus 250-500 mL",
                    "Start vasopressor infusion",
                    "Check sedation depth",
                ]),
            );
        }

        if let Some(spo2) = row.spo2().filter(|v| *v < POST_INTUBATION_DESATURATION_SPO2) {
            alerts.push(
                ClinicalAlert::new(
                    format!("desaturation-{key}"),
                    AlertLevel::Warning,
                    Some(AlertCategory::Hemodynamic),
                    "Desaturation Alert",
                    format!("SpO2 {spo2}% - Check ventilator settings"),
                    at,
                )
                .with_triggers(["desaturation"])
                .with_actions([
                    "Increase FiO2",
                    "Check tube position",
                    "Assess for pneumothorax",
                    "Optimize PEEP",
                ]),
            );
        }
    }

    alerts
}

// ---------------------------------------------------------------------------
// Severity summary
// ---------------------------------------------------------------------------

pub fn summarize_severity(alerts: &[ClinicalAlert]) -> SeveritySummary {
    SeveritySummary {
        total_score: alerts.iter().map(|a| a.level.score()).sum(),
        highest_level: alerts.iter().map(|a| a.level).max(),
        critical_count: alerts.iter().filter(|a| a.is_critical()).count(),
    }
}
