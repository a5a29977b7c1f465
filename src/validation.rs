//! Submit-time checks over a completed form. Edits are never blocked by
//! these; they only gate the final case submission.

use serde::Serialize;
use thiserror::Error;

use crate::models::{Demographics, FormSnapshot, IntubationAttempt};

const OCCUPATIONS: &[&str] = &[
    "Student",
    "Healthcare",
    "Manual",
    "Office",
    "Business",
    "Agriculture",
    "Unemployed",
    "Retired",
    "Other",
];

const FINANCIAL_STATUSES: &[&str] = &[
    "BPL",
    "APL",
    "GovtInsurance",
    "PrivateInsurance",
    "SelfPay",
    "Other",
];

const EXPERIENCE_BANDS: &[&str] = &["<1", "1-3", ">3", "consultant"];

const LARYNGOSCOPE_TYPES: &[&str] = &["direct", "video", "flexible", "fiberoptic", "other"];

const MAX_ATTEMPTS: i64 = 10;

/// One failed check, keyed by the dotted path of the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{} field(s) failed validation: {}", .0.len(), summarize(.0, 3))]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Errors at or beneath `path`.
    pub fn for_path<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a FieldError> + 'a {
        self.0
            .iter()
            .filter(move |e| e.path == path || e.path.starts_with(&format!("{path}.")))
    }
}

fn summarize(errors: &[FieldError], limit: usize) -> String {
    errors
        .iter()
        .take(limit)
        .map(FieldError::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Check a form before it is submitted as a completed case.
pub fn validate_submission(form: &FormSnapshot) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    match &form.demographics {
        Some(demographics) => check_demographics(demographics, &mut errors),
        None => errors.push(FieldError::new("demographics", "Required")),
    }
    if form.comorbidities.is_none() {
        errors.push(FieldError::new("comorbidities", "Required"));
    }
    if form.gcs.is_none() {
        errors.push(FieldError::new("gcs", "Required"));
    }
    if form.indication.is_none() {
        errors.push(FieldError::new("indication", "Required"));
    }

    if let Some(attempts) = &form.intubation_attempts {
        for (i, attempt) in attempts.iter().enumerate() {
            check_attempt(i, attempt, &mut errors);
        }
    }

    if let Some(total) = form.total_attempts {
        if !(0..=MAX_ATTEMPTS).contains(&total) {
            errors.push(FieldError::new(
                "totalAttempts",
                format!("Must be between 0 and {MAX_ATTEMPTS}"),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        tracing::debug!(count = errors.len(), "Submission failed validation");
        Err(ValidationErrors(errors))
    }
}

fn check_demographics(demographics: &Demographics, errors: &mut Vec<FieldError>) {
    check_choice(
        "demographics.occupation",
        demographics.occupation.as_deref(),
        OCCUPATIONS,
        errors,
    );
    check_choice(
        "demographics.financialStatus",
        demographics.financial_status.as_deref(),
        FINANCIAL_STATUSES,
        errors,
    );
}

fn check_attempt(index: usize, attempt: &IntubationAttempt, errors: &mut Vec<FieldError>) {
    let base = format!("intubationAttempts.{index}");

    match attempt.attempt_number {
        Some(n) if (1..=MAX_ATTEMPTS).contains(&n) => {}
        Some(_) => errors.push(FieldError::new(
            format!("{base}.attemptNumber"),
            format!("Must be between 1 and {MAX_ATTEMPTS}"),
        )),
        None => errors.push(FieldError::new(format!("{base}.attemptNumber"), "Required")),
    }

    require_choice(
        &format!("{base}.yearsExperience"),
        attempt.years_experience.as_deref(),
        EXPERIENCE_BANDS,
        errors,
    );
    require_choice(
        &format!("{base}.laryngoscopeType"),
        attempt.laryngoscope_type.as_deref(),
        LARYNGOSCOPE_TYPES,
        errors,
    );

    if attempt.blade_size.as_deref().map_or(true, |s| s.trim().is_empty()) {
        errors.push(FieldError::new(format!("{base}.bladeSize"), "Required"));
    }
}

fn check_choice(path: &str, value: Option<&str>, allowed: &[&str], errors: &mut Vec<FieldError>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        if !allowed.contains(&value) {
            errors.push(FieldError::new(
                path,
                format!("Expected one of {}", allowed.join(", ")),
            ));
        }
    }
}

fn require_choice(path: &str, value: Option<&str>, allowed: &[&str], errors: &mut Vec<FieldError>) {
    match value.filter(|v| !v.is_empty()) {
        Some(_) => check_choice(path, value, allowed, errors),
        None => errors.push(FieldError::new(path, "Required")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Comorbidities, Gcs, Indication};

    fn complete_form() -> FormSnapshot {
        FormSnapshot {
            demographics: Some(Demographics {
                hospital_no: Some("HN-1".into()),
                occupation: Some("Office".into()),
                ..Default::default()
            }),
            comorbidities: Some(Comorbidities::default()),
            gcs: Some(Gcs::default()),
            indication: Some(Indication::default()),
            intubation_attempts: Some(vec![IntubationAttempt {
                attempt_number: Some(1),
                years_experience: Some("1-3".into()),
                laryngoscope_type: Some("video".into()),
                blade_size: Some("3".into()),
                ..Default::default()
            }]),
            total_attempts: Some(1),
            ..Default::default()
        }
    }

    #[test]
    fn complete_form_passes() {
        assert!(validate_submission(&complete_form()).is_ok());
    }

    #[test]
    fn empty_form_lists_required_sections() {
        let err = validate_submission(&FormSnapshot::default()).unwrap_err();
        let paths: Vec<&str> = err.errors().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["demographics", "comorbidities", "gcs", "indication"]);
        assert!(err.to_string().starts_with("4 field(s) failed validation"));
    }

    #[test]
    fn attempt_errors_keyed_by_index() {
        let mut form = complete_form();
        form.intubation_attempts = Some(vec![
            IntubationAttempt {
                attempt_number: Some(1),
                years_experience: Some("1-3".into()),
                laryngoscope_type: Some("video".into()),
                blade_size: Some("3".into()),
                ..Default::default()
            },
            IntubationAttempt {
                attempt_number: Some(11),
                years_experience: Some("decades".into()),
                laryngoscope_type: None,
                blade_size: Some(" ".into()),
                ..Default::default()
            },
        ]);

        let err = validate_submission(&form).unwrap_err();
        assert_eq!(err.len(), 4);
        assert_eq!(err.for_path("intubationAttempts.1").count(), 4);
        assert_eq!(err.for_path("intubationAttempts.0").count(), 0);
        assert!(err
            .errors()
            .iter()
            .any(|e| e.path == "intubationAttempts.1.laryngoscopeType" && e.message == "Required"));
    }

    #[test]
    fn unknown_occupation_rejected() {
        let mut form = complete_form();
        if let Some(d) = form.demographics.as_mut() {
            d.occupation = Some("Astronaut".into());
        }
        let err = validate_submission(&form).unwrap_err();
        assert_eq!(err.errors()[0].path, "demographics.occupation");
    }

    #[test]
    fn total_attempts_bounded() {
        let mut form = complete_form();
        form.total_attempts = Some(12);
        let err = validate_submission(&form).unwrap_err();
        assert_eq!(err.errors()[0].path, "totalAttempts");
    }
}
