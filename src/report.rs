//! Case report: the payload handed to the PDF renderer and the renderer
//! itself (printpdf, builtin Helvetica, A4 portrait).

use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerIndex, PdfPageIndex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clinical::CalculatedValues;
use crate::models::{
    AirwayStatus, ClinicalAlert, Comorbidities, Demographics, FormSnapshot, Gcs, Indication,
    IntubationAttempt, LabValues, LeonScore, PostIntubationEvents, PostIntubationGcs,
    PreIntubationManagement, VentilatorSettings, VitalSigns,
};

const REPORT_TITLE: &str = "MEAR - Manipal Emergency Airway Registry";

const PAGE_WIDTH: Mm = Mm(210.0);
const PAGE_HEIGHT: Mm = Mm(297.0);
const TOP: Mm = Mm(280.0);
const BOTTOM: Mm = Mm(20.0);
const MARGIN: Mm = Mm(20.0);
const WRAP_CHARS: usize = 90;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("PDF font error: {0}")]
    Font(String),

    #[error("PDF render error: {0}")]
    Render(String),

    #[error("Report I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything the report shows, taken from one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPayload {
    pub demographics: Option<Demographics>,
    pub vitals: Option<VitalSigns>,
    pub gcs: Option<Gcs>,
    pub indication: Option<Indication>,
    pub comorbidities: Option<Comorbidities>,
    pub leon_score: Option<LeonScore>,
    pub pre_induction_labs: Option<LabValues>,
    pub airway_status: Option<AirwayStatus>,
    pub pre_intubation_management: Option<PreIntubationManagement>,
    pub post_intubation_gcs: Option<PostIntubationGcs>,
    pub ventilator_settings: Option<VentilatorSettings>,
    pub post_intubation_events: Option<PostIntubationEvents>,
    #[serde(default)]
    pub intubation_attempts: Vec<IntubationAttempt>,
    pub calculated_values: CalculatedValues,
    #[serde(default)]
    pub alerts: Vec<ClinicalAlert>,
    pub timestamp: DateTime<Utc>,
}

impl ReportPayload {
    pub fn new(
        form: &FormSnapshot,
        calculated_values: CalculatedValues,
        alerts: Vec<ClinicalAlert>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            demographics: form.demographics.clone(),
            vitals: form.pre_induction_vitals.clone(),
            gcs: form.gcs.clone(),
            indication: form.indication.clone(),
            comorbidities: form.comorbidities.clone(),
            leon_score: form.leon_score.clone(),
            pre_induction_labs: form.pre_induction_labs.clone(),
            airway_status: form.airway_status.clone(),
            pre_intubation_management: form.pre_intubation_management.clone(),
            post_intubation_gcs: form.post_intubation_gcs.clone(),
            ventilator_settings: form.ventilator_settings.clone(),
            post_intubation_events: form.post_intubation_events.clone(),
            intubation_attempts: form.intubation_attempts.clone().unwrap_or_default(),
            calculated_values,
            alerts,
            timestamp,
        }
    }

    /// `mear-report-<hospitalNo>-<yyyymmdd-hhmm>.pdf`
    pub fn file_name(&self) -> String {
        let hn = self
            .demographics
            .as_ref()
            .and_then(|d| d.hospital_no.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.chars()
                    .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
                    .collect::<String>()
            })
            .unwrap_or_else(|| "unidentified".into());
        format!("mear-report-{hn}-{}.pdf", self.timestamp.format("%Y%m%d-%H%M"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    pub include_alerts: bool,
    pub include_calculations: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            include_alerts: true,
            include_calculations: true,
        }
    }
}

/// A titled block of bullet lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSection {
    pub title: &'static str,
    pub lines: Vec<String>,
}

impl ReportSection {
    fn new(title: &'static str, lines: Vec<String>) -> Self {
        Self { title, lines }
    }
}

// ─── Section assembly ────────────────────────────────────────────────────────

fn or_na(value: Option<&String>) -> &str {
    value.map(String::as_str).filter(|s| !s.trim().is_empty()).unwrap_or("N/A")
}

fn fixed(value: Option<f64>, decimals: usize) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{v:.decimals$}"))
}

fn count(value: Option<u32>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

/// "headInjuryReducedSensorium" -> "Head Injury Reduced Sensorium"
fn humanize(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 8);
    for (i, c) in key.chars().enumerate() {
        if i == 0 {
            out.extend(c.to_uppercase());
        } else if c.is_ascii_uppercase() {
            out.push(' ');
            out.push(c);
        } else {
            out.push(c);
        }
    }
    out
}

/// Labels of the boolean fields set to true.
fn checked<T: Serialize>(section: &T) -> Vec<String> {
    match serde_json::to_value(section) {
        Ok(serde_json::Value::Object(map)) => map
            .iter()
            .filter(|(_, v)| v.as_bool() == Some(true))
            .map(|(k, _)| humanize(k))
            .collect(),
        _ => Vec::new(),
    }
}

/// "Label: value" for every filled text field.
fn filled<T: Serialize>(section: &T) -> Vec<String> {
    match serde_json::to_value(section) {
        Ok(serde_json::Value::Object(map)) => map
            .iter()
            .filter_map(|(k, v)| match v {
                serde_json::Value::String(s) if !s.trim().is_empty() => {
                    Some(format!("{}: {s}", humanize(k)))
                }
                serde_json::Value::Number(n) => Some(format!("{}: {n}", humanize(k))),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Sections in print order. Empty optional sections are left out.
pub fn report_sections(payload: &ReportPayload, options: &ReportOptions) -> Vec<ReportSection> {
    let mut sections = Vec::new();

    let demo = payload.demographics.as_ref();
    sections.push(ReportSection::new(
        "Patient Demographics",
        vec![
            format!("Hospital No: {}", or_na(demo.and_then(|d| d.hospital_no.as_ref()))),
            format!("Age: {} years", or_na(demo.and_then(|d| d.age.as_ref()))),
            format!("Sex: {}", demo.and_then(|d| d.sex).map_or("N/A", |s| s.as_str())),
            format!("Weight: {} kg", or_na(demo.and_then(|d| d.weight.as_ref()))),
            format!("Height: {} cm", or_na(demo.and_then(|d| d.height.as_ref()))),
            format!(
                "Mid-arm Circumference: {} cm",
                or_na(demo.and_then(|d| d.mid_arm_circumference.as_ref()))
            ),
        ],
    ));

    let vitals = payload.vitals.as_ref();
    sections.push(ReportSection::new(
        "Pre-induction Vital Signs",
        vec![
            format!("Heart Rate: {} bpm", or_na(vitals.and_then(|v| v.heart_rate.as_ref()))),
            format!(
                "Blood Pressure: {}/{} mmHg",
                or_na(vitals.and_then(|v| v.systolic_bp.as_ref())),
                or_na(vitals.and_then(|v| v.diastolic_bp.as_ref()))
            ),
            format!(
                "Respiratory Rate: {} /min",
                or_na(vitals.and_then(|v| v.respiratory_rate.as_ref()))
            ),
            format!("Temperature: {} C", or_na(vitals.and_then(|v| v.temperature.as_ref()))),
            format!("SpO2: {}%", or_na(vitals.and_then(|v| v.spo2.as_ref()))),
        ],
    ));

    if let Some(gcs) = &payload.gcs {
        let verbal = if gcs.is_already_intubated == Some(true) {
            "T (intubated)".to_string()
        } else {
            or_na(gcs.verbal_response.as_ref()).to_string()
        };
        sections.push(ReportSection::new(
            "Glasgow Coma Scale",
            vec![
                format!("Eye Opening: {}", or_na(gcs.eye_response.as_ref())),
                format!("Verbal Response: {verbal}"),
                format!("Motor Response: {}", or_na(gcs.motor_response.as_ref())),
                format!("Total GCS: {}/15", count(payload.calculated_values.total_gcs)),
            ],
        ));
    }

    if let Some(leon) = &payload.leon_score {
        let part = |v: Option<i64>| v.map_or_else(|| "N/A".to_string(), |v| v.to_string());
        sections.push(ReportSection::new(
            "LEON Score (Difficult Airway Assessment)",
            vec![
                format!("Large Tongue: {}", part(leon.large_tongue)),
                format!("Thyromental Distance: {}", part(leon.thyro_mental_distance)),
                format!("Obstruction: {}", part(leon.obstruction)),
                format!("Neck Mobility: {}", part(leon.neck_mobility)),
                format!("Total LEON Score: {}/4", count(payload.calculated_values.leon_total_score)),
            ],
        ));
    }

    if let Some(indication) = &payload.indication {
        let mut lines = vec![format!(
            "Category: {}",
            indication.category.map_or("N/A", |c| c.as_str())
        )];
        if let Some(trauma) = &indication.trauma {
            lines.extend(checked(trauma));
        }
        if let Some(medical) = &indication.medical {
            lines.extend(checked(medical));
        }
        sections.push(ReportSection::new("Indication for Intubation", lines));
    }

    if let Some(comorbidities) = &payload.comorbidities {
        let mut lines = checked(comorbidities);
        if lines.is_empty() {
            lines.push("None reported".into());
        }
        sections.push(ReportSection::new("Comorbidities", lines));
    }

    if let Some(labs) = &payload.pre_induction_labs {
        let lines = filled(labs);
        if !lines.is_empty() {
            sections.push(ReportSection::new("Pre-induction Labs", lines));
        }
    }

    if let Some(airway) = &payload.airway_status {
        let mut lines = checked(airway);
        if let Some(apnea) = airway.safe_apnea_time.as_deref().filter(|s| !s.trim().is_empty()) {
            lines.push(format!("Safe Apnea Time: {apnea}"));
        }
        if !lines.is_empty() {
            sections.push(ReportSection::new("Airway Status", lines));
        }
    }

    if let Some(management) = &payload.pre_intubation_management {
        let lines: Vec<String> = management
            .given_agents()
            .into_iter()
            .map(|(agent, dose)| match dose {
                Some(dose) => format!("{}: {dose}", humanize(agent)),
                None => format!("{}: given", humanize(agent)),
            })
            .collect();
        if !lines.is_empty() {
            sections.push(ReportSection::new("Pre-intubation Medication", lines));
        }
    }

    if let Some(post_gcs) = &payload.post_intubation_gcs {
        let lines = filled(post_gcs);
        if !lines.is_empty() {
            sections.push(ReportSection::new("Post-intubation GCS", lines));
        }
    }

    if let Some(vent) = &payload.ventilator_settings {
        let lines = filled(vent);
        if !lines.is_empty() {
            sections.push(ReportSection::new("Ventilator Settings", lines));
        }
    }

    if let Some(events) = &payload.post_intubation_events {
        let arrest = if events.post_intubation_cardiac_arrest == Some(true) { "Yes" } else { "No" };
        let mut lines = vec![format!("Post-intubation Cardiac Arrest: {arrest}")];
        lines.extend(filled(events));
        sections.push(ReportSection::new("Post-intubation Events", lines));
    }

    if !payload.intubation_attempts.is_empty() {
        let lines = payload
            .intubation_attempts
            .iter()
            .enumerate()
            .map(|(i, a)| {
                format!(
                    "Attempt {}: {} laryngoscope, blade {}, operator experience {}",
                    a.attempt_number.unwrap_or(i as i64 + 1),
                    or_na(a.laryngoscope_type.as_ref()),
                    or_na(a.blade_size.as_ref()),
                    or_na(a.years_experience.as_ref()),
                )
            })
            .collect();
        sections.push(ReportSection::new("Intubation Attempts", lines));
    }

    if options.include_calculations {
        let calc = &payload.calculated_values;
        sections.push(ReportSection::new(
            "Calculated Clinical Values",
            vec![
                format!("BMI: {} kg/m2", fixed(calc.bmi, 1)),
                format!("Shock Index: {}", fixed(calc.shock_index, 2)),
                format!("Modified Shock Index: {}", fixed(calc.modified_shock_index, 2)),
                format!("MAP: {} mmHg", fixed(calc.mean_arterial_pressure, 0)),
                format!("Pulse Pressure: {} mmHg", fixed(calc.pulse_pressure, 0)),
                format!("Comorbidity Burden: {}", count(calc.comorbidity_burden)),
            ],
        ));
    }

    if options.include_alerts && !payload.alerts.is_empty() {
        sections.push(ReportSection::new(
            "Clinical Alerts",
            payload
                .alerts
                .iter()
                .map(|a| format!("[{}] {}: {}", a.level.as_str().to_uppercase(), a.title, a.message))
                .collect(),
        ));
    }

    sections
}

// ─── PDF rendering ───────────────────────────────────────────────────────────

struct PageCursor {
    doc: PdfDocumentReference,
    pages: Vec<(PdfPageIndex, PdfLayerIndex)>,
    font: IndirectFontRef,
    bold: IndirectFontRef,
    y: Mm,
}

impl PageCursor {
    fn new(title: &str) -> Result<Self, ReportError> {
        let (doc, page, layer) = PdfDocument::new(title, PAGE_WIDTH, PAGE_HEIGHT, "Layer 1");
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ReportError::Font(e.to_string()))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ReportError::Font(e.to_string()))?;
        Ok(Self {
            doc,
            pages: vec![(page, layer)],
            font,
            bold,
            y: TOP,
        })
    }

    fn ensure_space(&mut self, needed: Mm) {
        if self.y - needed < BOTTOM {
            let (page, layer) = self.doc.add_page(PAGE_WIDTH, PAGE_HEIGHT, "Layer 1");
            self.pages.push((page, layer));
            self.y = TOP;
        }
    }

    fn text(&mut self, text: &str, size: f32, x: Mm, bold: bool, advance: Mm) {
        self.ensure_space(advance);
        let (page, layer) = self.pages[self.pages.len() - 1];
        let font = if bold { &self.bold } else { &self.font };
        self.doc
            .get_page(page)
            .get_layer(layer)
            .use_text(text, size, x, self.y, font);
        self.y -= advance;
    }

    fn footers(&self, generated: &str) {
        let total = self.pages.len();
        for (i, (page, layer)) in self.pages.iter().enumerate() {
            let text = format!("MEAR Report - Page {} of {total} - Generated: {generated}", i + 1);
            self.doc
                .get_page(*page)
                .get_layer(*layer)
                .use_text(text, 8.0, MARGIN, Mm(10.0), &self.font);
        }
    }

    fn finish(self) -> Result<Vec<u8>, ReportError> {
        let mut buf = BufWriter::new(Vec::new());
        self.doc
            .save(&mut buf)
            .map_err(|e| ReportError::Render(e.to_string()))?;
        buf.into_inner()
            .map_err(|e| ReportError::Render(format!("buffer: {e}")))
    }
}

/// Render the case report. Returns PDF bytes.
pub fn render_report_pdf(payload: &ReportPayload, options: &ReportOptions) -> Result<Vec<u8>, ReportError> {
    let mut cursor = PageCursor::new(REPORT_TITLE)?;

    cursor.text(REPORT_TITLE, 16.0, MARGIN, true, Mm(8.0));
    let generated = payload.timestamp.format("%Y-%m-%d %H:%M UTC").to_string();
    cursor.text(&format!("Generated: {generated}"), 10.0, MARGIN, false, Mm(12.0));

    let sections = report_sections(payload, options);
    for section in &sections {
        cursor.ensure_space(Mm(14.0));
        cursor.text(section.title, 12.0, MARGIN, true, Mm(7.0));
        for item in &section.lines {
            for (i, line) in wrap_text(item, WRAP_CHARS).into_iter().enumerate() {
                let text = if i == 0 { format!("- {line}") } else { format!("  {line}") };
                cursor.text(&text, 9.0, Mm(25.0), false, Mm(4.5));
            }
        }
        cursor.y -= Mm(4.0);
    }

    cursor.footers(&generated);
    tracing::debug!(
        sections = sections.len(),
        pages = cursor.pages.len(),
        "Case report rendered"
    );
    cursor.finish()
}

/// Write report bytes under `dir`, creating it if needed.
pub fn export_report(pdf_bytes: &[u8], dir: &Path, file_name: &str) -> Result<PathBuf, ReportError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    std::fs::write(&path, pdf_bytes)?;
    tracing::info!(path = %path.display(), "Case report exported");
    Ok(path)
}

/// Simple word-wrap helper for PDF text rendering.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.len() + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clinical::{calculate_all, generate_alerts};
    use crate::models::enums::IndicationCategory;
    use crate::models::{MedicalIndication, MedicationDose};
    use chrono::TimeZone;

    fn sample_form() -> FormSnapshot {
        serde_json::from_value(serde_json::json!({
            "demographics": {"hospitalNo": "HN 42", "age": "54", "weight": "70", "height": "175", "sex": "M"},
            "gcs": {"eyeResponse": "3", "motorResponse": "4", "isAlreadyIntubated": true},
            "leonScore": {"largeTongue": 1, "thyroMentalDistance": 1, "obstruction": 0, "neckMobility": 0},
            "preInductionVitals": {"heartRate": "120", "systolicBP": "80", "diastolicBP": "50"},
            "comorbidities": {"chronicRenalDisease": true},
            "indication": {"category": "medical", "medical": {"sepsis": true}}
        }))
        .unwrap()
    }

    fn sample_payload() -> ReportPayload {
        let form = sample_form();
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 0).unwrap();
        ReportPayload::new(&form, calculate_all(&form), generate_alerts(&form, at), at)
    }

    #[test]
    fn payload_uses_wire_names() {
        let value = serde_json::to_value(sample_payload()).unwrap();
        assert_eq!(value["vitals"]["heartRate"], "120");
        assert_eq!(value["calculatedValues"]["totalGCS"], 8);
        assert!(value["alerts"].as_array().unwrap().len() >= 3);
        assert_eq!(value["intubationAttempts"], serde_json::json!([]));
    }

    #[test]
    fn file_name_from_hospital_number_and_time() {
        assert_eq!(sample_payload().file_name(), "mear-report-HN_42-20260304-0506.pdf");
    }

    #[test]
    fn sections_reflect_form() {
        let sections = report_sections(&sample_payload(), &ReportOptions::default());
        let titles: Vec<&str> = sections.iter().map(|s| s.title).collect();
        assert_eq!(titles[0], "Patient Demographics");
        assert!(titles.contains(&"Clinical Alerts"));

        let gcs = sections.iter().find(|s| s.title == "Glasgow Coma Scale").unwrap();
        assert!(gcs.lines.contains(&"Verbal Response: T (intubated)".to_string()));
        assert!(gcs.lines.contains(&"Total GCS: 8/15".to_string()));

        let comorbid = sections.iter().find(|s| s.title == "Comorbidities").unwrap();
        assert_eq!(comorbid.lines, vec!["Chronic Renal Disease"]);

        let indication = sections
            .iter()
            .find(|s| s.title == "Indication for Intubation")
            .unwrap();
        assert_eq!(indication.lines, vec!["Category: medical", "Sepsis"]);
    }

    #[test]
    fn options_drop_alerts_and_calculations() {
        let options = ReportOptions {
            include_alerts: false,
            include_calculations: false,
        };
        let sections = report_sections(&sample_payload(), &options);
        assert!(sections.iter().all(|s| s.title != "Clinical Alerts"));
        assert!(sections.iter().all(|s| s.title != "Calculated Clinical Values"));
    }

    #[test]
    fn medication_section_lists_given_agents() {
        let mut form = FormSnapshot::default();
        form.pre_intubation_management = Some(PreIntubationManagement {
            ketamine: Some(MedicationDose {
                given: Some(true),
                dose: Some(100.0),
            }),
            rocuronium: Some(MedicationDose {
                given: Some(true),
                dose: None,
            }),
            ..Default::default()
        });
        form.indication = Some(Indication {
            category: Some(IndicationCategory::Medical),
            medical: Some(MedicalIndication::default()),
            trauma: None,
        });
        let payload = ReportPayload::new(&form, CalculatedValues::default(), Vec::new(), Utc::now());
        let sections = report_sections(&payload, &ReportOptions::default());
        let meds = sections
            .iter()
            .find(|s| s.title == "Pre-intubation Medication")
            .unwrap();
        assert_eq!(meds.lines, vec!["Ketamine: 100", "Rocuronium: given"]);
    }

    #[test]
    fn renders_pdf_bytes() {
        let bytes = render_report_pdf(&sample_payload(), &ReportOptions::default()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn long_reports_break_pages() {
        let mut payload = sample_payload();
        let alert = payload.alerts[0].clone();
        payload.alerts = (0..120).map(|_| alert.clone()).collect();
        let bytes = render_report_pdf(&payload, &ReportOptions::default()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn export_writes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = export_report(b"%PDF-1.3", &tmp.path().join("exports"), "r.pdf").unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"%PDF-1.3");
    }

    #[test]
    fn humanize_camel_case() {
        assert_eq!(humanize("headInjuryReducedSensorium"), "Head Injury Reduced Sensorium");
        assert_eq!(humanize("sepsis"), "Sepsis");
    }

    #[test]
    fn wrap_text_respects_width() {
        let lines = wrap_text("one two three four five six", 10);
        assert!(lines.iter().all(|l| l.len() <= 10));
        assert_eq!(lines.join(" "), "one two three four five six");
    }
}
