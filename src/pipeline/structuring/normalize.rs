use serde_json::Value;

use super::classify::{classify_crop_type, classify_variety, normalize_date};
use super::confidence::{clamp_confidence, derive_confidence};
use super::types::{CandidateFields, CropQualityAnalysis, CropRecord, QualityGrade};

/// Lines kept from the model's quality narrative.
pub const MAX_ASSESSMENT_LINES: usize = 5;

/// Turn parsed (or manually recovered) fields into a typed crop record.
pub fn normalize_crop_record(fields: &CandidateFields) -> CropRecord {
    let mut record = CropRecord {
        crop_type: text_field(fields, "cropType").map(|c| classify_crop_type(&c)),
        harvest_quantity: number_field(fields, "harvestQuantity").map(f64::round),
        sowing_date: text_field(fields, "sowingDate").map(|d| normalize_date(&d)),
        harvest_date: text_field(fields, "harvestDate").map(|d| normalize_date(&d)),
        price_per_kg: number_field(fields, "pricePerKg"),
        certification: text_field(fields, "certification"),
        grading: text_field(fields, "grading"),
        lab_test: text_field(fields, "labTest"),
        freshness_duration: number_field(fields, "freshnessDuration"),
        farm_location: text_field(fields, "farmLocation"),
        farmer_name: text_field(fields, "farmerName"),
        ..Default::default()
    };

    if let Some(raw_variety) = text_field(fields, "variety") {
        let (variety, implied_crop) = classify_variety(&raw_variety);
        record.variety = Some(variety);
        if record.crop_type.is_none() {
            record.crop_type = implied_crop.map(str::to_string);
        }
    }

    // A zero confidence means the model left it unset.
    record.confidence = number_field(fields, "confidence")
        .filter(|c| *c != 0.0)
        .and_then(clamp_confidence)
        .or_else(|| Some(derive_confidence(record.critical_field_count())));

    record
}

/// Turn parsed fields into a quality analysis with a bounded score,
/// a category and at most five narrative lines.
pub fn normalize_quality_analysis(fields: &CandidateFields) -> CropQualityAnalysis {
    let quality_score = number_field(fields, "qualityScore").map(clamp_quality_score);

    let crop_quality = text_field(fields, "cropQuality")
        .and_then(|label| QualityGrade::parse(&label))
        .or_else(|| quality_score.map(QualityGrade::from_score));

    let narrative = match fields.get("qualityAssessment") {
        Some(Value::Array(lines)) => lines
            .iter()
            .filter_map(value_as_text)
            .collect::<Vec<_>>()
            .join("\n"),
        _ => text_field(fields, "qualityAssessment").unwrap_or_default(),
    };

    CropQualityAnalysis {
        quality_assessment: limit_narrative_lines(&narrative, MAX_ASSESSMENT_LINES),
        quality_score,
        recommendations: string_list(fields, "recommendations"),
        soil_recommendations: string_list(fields, "soilRecommendations"),
        overall_assessment: text_field(fields, "overallAssessment"),
        expected_yield: text_field(fields, "expectedYield"),
        crop_quality,
    }
}

pub fn clamp_quality_score(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}

/// Non-empty lines, trimmed, at most `max_lines` of them. Never pads.
pub fn limit_narrative_lines(text: &str, max_lines: usize) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(max_lines)
        .collect::<Vec<_>>()
        .join("\n")
}

/// A string (or number) field, trimmed. Empty and literal "null" are absent.
pub fn text_field(fields: &CandidateFields, name: &str) -> Option<String> {
    fields.get(name).and_then(value_as_text)
}

/// A numeric field. Accepts numbers and numeric strings such as `"₹1,250.50"`.
pub fn number_field(fields: &CandidateFields, name: &str) -> Option<f64> {
    let number = match fields.get(name)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, ',' | '₹') && !c.is_whitespace())
                .collect();
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty() && !trimmed.eq_ignore_ascii_case("null"))
                .then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_list(fields: &CandidateFields, name: &str) -> Vec<String> {
    match fields.get(name) {
        Some(Value::Array(items)) => items.iter().filter_map(value_as_text).collect(),
        Some(other) => value_as_text(other).into_iter().collect(),
        None => Vec::new(),
    }
}
