//! Pattern-based recovery when the model output is not a JSON object.
//!
//! Each field is searched independently, so a truncated or prose-wrapped
//! reply still yields whatever fields it does contain. Quoted `"field": value`
//! pairs are read from the raw reply; natural-language patterns (crop,
//! variety, quantity with unit, location) are read from the conversation and
//! then the reply. Nothing here fails: the worst case is an empty map.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Number, Value};

use super::types::CandidateFields;

static CROP_MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:crop|फसल)[^\n]{0,24}?(rice|wheat|maize|turmeric|black gram|green chili|coconut|onion|potato|tomato|चावल|गेहूं|मक्का|हल्दी)",
    )
    .unwrap()
});

static VARIETY_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(basmati|pusa|lakadong|बासमती)").unwrap());

static QUANTITY_MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(quintals?|क्विंटल|kilograms?|kgs?|kilos?|किलो)").unwrap()
});

static LOCATION_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:location|स्थान)[\s:]+([A-Za-z ,]+)").unwrap());

static QUOTED_STRING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""((?:[^"\\]|\\.)*)""#).unwrap());

const QUINTAL_TO_KG: f64 = 100.0;

const CROP_TEXT_FIELDS: &[&str] = &[
    "sowingDate",
    "harvestDate",
    "certification",
    "grading",
    "labTest",
    "farmerName",
];

const CROP_NUMBER_FIELDS: &[&str] = &["pricePerKg", "freshnessDuration", "confidence"];

/// Recover crop fields from an unparseable reply and the conversation it
/// was generated from.
pub fn manual_extract_crop(raw: &str, conversation: &str) -> CandidateFields {
    let mut fields = CandidateFields::new();

    let crop_type = quoted_text(raw, "cropType")
        .or_else(|| first_capture(&CROP_MENTION, conversation))
        .or_else(|| first_capture(&CROP_MENTION, raw));
    insert_text(&mut fields, "cropType", crop_type);

    let variety = quoted_text(raw, "variety")
        .or_else(|| first_capture(&VARIETY_MENTION, conversation))
        .or_else(|| first_capture(&VARIETY_MENTION, raw));
    insert_text(&mut fields, "variety", variety);

    // A quoted quantity is already in kilograms; a spoken one carries its unit.
    let quantity = quoted_number(raw, "harvestQuantity")
        .or_else(|| spoken_quantity_kg(conversation))
        .or_else(|| spoken_quantity_kg(raw));
    insert_number(&mut fields, "harvestQuantity", quantity);

    let location = quoted_text(raw, "farmLocation")
        .or_else(|| spoken_location(conversation))
        .or_else(|| spoken_location(raw));
    insert_text(&mut fields, "farmLocation", location);

    for name in CROP_TEXT_FIELDS {
        insert_text(&mut fields, name, quoted_text(raw, name));
    }
    for name in CROP_NUMBER_FIELDS {
        insert_number(&mut fields, name, quoted_number(raw, name));
    }

    fields
}

/// Recover quality-analysis fields from an unparseable reply.
pub fn manual_extract_quality(raw: &str) -> CandidateFields {
    let mut fields = CandidateFields::new();

    for name in ["qualityAssessment", "overallAssessment", "expectedYield", "cropQuality"] {
        insert_text(&mut fields, name, quoted_text(raw, name));
    }
    insert_number(&mut fields, "qualityScore", quoted_number(raw, "qualityScore"));

    for name in ["recommendations", "soilRecommendations"] {
        if let Some(items) = quoted_list(raw, name) {
            fields.insert(
                name.to_string(),
                Value::Array(items.into_iter().map(Value::String).collect()),
            );
        }
    }

    fields
}

/// `"name": "value"`, with JSON escapes resolved. Blank values count as absent.
fn quoted_text(raw: &str, name: &str) -> Option<String> {
    let pattern = format!(
        r#"(?i)"{}"\s*:\s*"((?:[^"\\]|\\.)*)""#,
        regex::escape(name)
    );
    let re = Regex::new(&pattern).ok()?;
    let captured = re.captures(raw)?.get(1)?.as_str();
    Some(unescape(captured)).filter(|s| !s.trim().is_empty())
}

/// `"name": 123.5` or `"name": "123.5"`.
fn quoted_number(raw: &str, name: &str) -> Option<f64> {
    let pattern = format!(
        r#"(?i)"{}"\s*:\s*"?(-?\d+(?:\.\d+)?)"#,
        regex::escape(name)
    );
    let re = Regex::new(&pattern).ok()?;
    re.captures(raw)?.get(1)?.as_str().parse().ok()
}

/// Every quoted string inside `"name": [ ... ]`.
fn quoted_list(raw: &str, name: &str) -> Option<Vec<String>> {
    let pattern = format!(r#"(?is)"{}"\s*:\s*\[([^\]]*)\]"#, regex::escape(name));
    let re = Regex::new(&pattern).ok()?;
    let body = re.captures(raw)?.get(1)?.as_str();
    Some(
        QUOTED_STRING
            .captures_iter(body)
            .filter_map(|c| c.get(1))
            .map(|m| unescape(m.as_str()))
            .filter(|s| !s.trim().is_empty())
            .collect(),
    )
}

fn unescape(captured: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{captured}\""))
        .unwrap_or_else(|_| captured.to_string())
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// `<number> <unit>` converted to kilograms.
fn spoken_quantity_kg(text: &str) -> Option<f64> {
    let caps = QUANTITY_MENTION.captures(text)?;
    let amount: f64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2)?.as_str().to_lowercase();
    if unit.starts_with("quintal") || unit == "क्विंटल" {
        Some(amount * QUINTAL_TO_KG)
    } else {
        Some(amount)
    }
}

fn spoken_location(text: &str) -> Option<String> {
    first_capture(&LOCATION_MENTION, text)
        .map(|loc| loc.trim_matches(|c: char| c == ',' || c.is_whitespace()).to_string())
        .filter(|loc| !loc.is_empty())
}

fn insert_text(fields: &mut CandidateFields, name: &str, value: Option<String>) {
    if let Some(value) = value {
        fields.insert(name.to_string(), Value::String(value));
    }
}

fn insert_number(fields: &mut CandidateFields, name: &str, value: Option<f64>) {
    if let Some(number) = value.and_then(Number::from_f64) {
        fields.insert(name.to_string(), Value::Number(number));
    }
}
