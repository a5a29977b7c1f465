//! Forgiving parsers for raw form input.
//!
//! Vitals and measurements are kept as the operator typed them and parsed on
//! demand. Checkbox groups arrive as booleans, `"on"`/`"true"` strings or
//! arrays of checked values depending on the widget that produced them.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?").unwrap());

static LEADING_INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[+-]?\d+").unwrap());

/// Parse the leading decimal number of a raw field (`"120 bpm"` → 120).
/// Returns `None` for empty, non-numeric or non-finite input.
pub fn parse_number(raw: &str) -> Option<f64> {
    let m = LEADING_NUMBER.find(raw.trim_start())?;
    m.as_str().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse the leading integer of a raw field (`"4 - localises"` → 4).
pub fn parse_integer(raw: &str) -> Option<i64> {
    let m = LEADING_INTEGER.find(raw.trim_start())?;
    m.as_str().parse::<i64>().ok()
}

/// Convenience over an optional raw field.
pub fn number(raw: Option<&String>) -> Option<f64> {
    raw.and_then(|s| parse_number(s))
}

/// Convenience over an optional raw field.
pub fn integer(raw: Option<&String>) -> Option<i64> {
    raw.and_then(|s| parse_integer(s))
}

/// Checkbox coercion: arrays count as checked when non-empty, strings only
/// when `"true"` or `"on"`.
pub fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(*b),
        Value::Array(items) => Some(!items.is_empty()),
        Value::String(s) => Some(s == "true" || s == "on"),
        Value::Number(n) => Some(n.as_f64().is_some_and(|v| v != 0.0)),
        Value::Object(_) => Some(true),
    }
}

// ---------------------------------------------------------------------------
// serde adapters
// ---------------------------------------------------------------------------

/// `deserialize_with` adapter for checkbox fields.
pub fn flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_bool(&value))
}

/// `deserialize_with` adapter for raw text fields that may arrive as numbers.
pub fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => {
            return Err(serde::de::Error::custom(format!(
                "expected text or number, got {other}"
            )))
        }
    })
}

/// `deserialize_with` adapter for numeric fields that may arrive as strings.
/// Blank or non-numeric strings become `None`.
pub fn decimal<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_number(&s),
        _ => None,
    })
}

/// `deserialize_with` adapter for integer scores. Non-integral values become
/// `None` so that scoring treats them as not filled.
pub fn whole<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|v| v.is_finite() && v.fract() == 0.0)
                .map(|v| v as i64)
        }),
        Value::String(s) => parse_number(&s)
            .filter(|v| v.fract() == 0.0)
            .map(|v| v as i64),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_leading_number_with_units() {
        assert_eq!(parse_number("120 bpm"), Some(120.0));
        assert_eq!(parse_number("  36.6C"), Some(36.6));
        assert_eq!(parse_number(".5"), Some(0.5));
        assert_eq!(parse_number("-3"), Some(-3.0));
    }

    #[test]
    fn rejects_non_numeric_input() {
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("   "), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("bp 120"), None);
    }

    #[test]
    fn integer_parse_truncates_at_first_non_digit() {
        assert_eq!(parse_integer("4"), Some(4));
        assert_eq!(parse_integer("3.9"), Some(3));
        assert_eq!(parse_integer("E2"), None);
    }

    #[test]
    fn checkbox_coercion_matches_widget_shapes() {
        assert_eq!(coerce_bool(&json!(true)), Some(true));
        assert_eq!(coerce_bool(&json!("on")), Some(true));
        assert_eq!(coerce_bool(&json!("true")), Some(true));
        assert_eq!(coerce_bool(&json!("yes")), Some(false));
        assert_eq!(coerce_bool(&json!(["on"])), Some(true));
        assert_eq!(coerce_bool(&json!([])), Some(false));
        assert_eq!(coerce_bool(&json!(null)), None);
    }

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "text")]
        raw: Option<String>,
        #[serde(default, deserialize_with = "whole")]
        score: Option<i64>,
        #[serde(default, deserialize_with = "decimal")]
        dose: Option<f64>,
    }

    #[test]
    fn adapters_accept_numbers_and_strings() {
        let p: Sample = serde_json::from_value(json!({"raw": 88, "score": "1", "dose": "2.5"})).unwrap();
        assert_eq!(p.raw.as_deref(), Some("88"));
        assert_eq!(p.score, Some(1));
        assert_eq!(p.dose, Some(2.5));

        let p: Sample = serde_json::from_value(json!({"score": 0.5, "dose": ""})).unwrap();
        assert_eq!(p.raw, None);
        assert_eq!(p.score, None);
        assert_eq!(p.dose, None);
    }

    #[test]
    fn text_adapter_rejects_objects() {
        let result: Result<Sample, _> = serde_json::from_value(json!({"raw": {"a": 1}}));
        assert!(result.is_err());
    }
}
