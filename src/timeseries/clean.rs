//! Conversion of the text-valued chart events to numbers.

use anyhow::{Context, Result};

pub const EYE_OPENING: &str = "Glascow coma scale eye opening";
pub const MOTOR_RESPONSE: &str = "Glascow coma scale motor response";
pub const VERBAL_RESPONSE: &str = "Glascow coma scale verbal response";

const EYE_MAPPING: &[(&str, f64)] = &[
    ("1 No Response", 1.0),
    ("2 To pain", 2.0),
    ("3 To speech", 3.0),
    ("4 Spontaneously", 4.0),
    ("None", 1.0),
    ("Spontaneously", 4.0),
    ("To Pain", 2.0),
    ("To Speech", 3.0),
];

const MOTOR_MAPPING: &[(&str, f64)] = &[
    ("1 No Response", 1.0),
    ("2 Abnorm extensn", 2.0),
    ("3 Abnorm flexion", 3.0),
    ("4 Flex-withdraws", 4.0),
    ("5 Localizes Pain", 5.0),
    ("6 Obeys Commands", 6.0),
    ("Abnormal Flexion", 3.0),
    ("Abnormal extension", 2.0),
    ("Flex-withdraws", 4.0),
    ("Localizes Pain", 5.0),
    ("No response", 1.0),
    ("Obeys Commands", 6.0),
];

const VERBAL_MAPPING: &[(&str, f64)] = &[
    ("1 No Response", 1.0),
    ("1.0 ET/Trach", 1.0),
    ("2 Incomp sounds", 2.0),
    ("3 Inapprop words", 3.0),
    ("4 Confused", 4.0),
    ("5 Oriented", 5.0),
    ("Confused", 4.0),
    ("Inappropriate Words", 3.0),
    ("Incomprehensible sounds", 2.0),
    ("No Response", 1.0),
    ("No Response-ETT", 1.0),
    ("Oriented", 5.0),
];

fn text_mapping(kind: &str) -> Option<&'static [(&'static str, f64)]> {
    match kind {
        EYE_OPENING => Some(EYE_MAPPING),
        MOTOR_RESPONSE => Some(MOTOR_MAPPING),
        VERBAL_RESPONSE => Some(VERBAL_MAPPING),
        _ => None,
    }
}

/// Numeric value of one observation.
///
/// Glasgow coma scale components are looked up in their score tables; an
/// unknown label is missing (`None`). Every other kind must be numeric.
pub fn numeric_value(kind: &str, raw: &str) -> Result<Option<f64>> {
    if let Some(mapping) = text_mapping(kind) {
        return Ok(mapping
            .iter()
            .find(|(label, _)| *label == raw)
            .map(|(_, score)| *score));
    }
    let value = raw
        .trim()
        .parse::<f64>()
        .with_context(|| format!("'{kind}' value '{raw}' is not a number"))?;
    Ok(Some(value).filter(|v| v.is_finite()))
}
