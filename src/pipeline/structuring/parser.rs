use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::gemini_types::GenerateContentResponse;
use super::types::CandidateFields;
use super::ExtractionError;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```(?:json)?[ \t]*").unwrap());

/// Pull the generated text out of a `generateContent` success envelope.
pub fn extract_generated_text(envelope: &str) -> Result<String, ExtractionError> {
    let response: GenerateContentResponse =
        serde_json::from_str(envelope).map_err(|_| ExtractionError::EmptyResponse)?;

    response
        .first_text()
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
        .ok_or(ExtractionError::EmptyResponse)
}

/// Remove markdown code fences (```` ```json ```` and bare ```` ``` ````).
pub fn strip_code_fences(text: &str) -> String {
    CODE_FENCE.replace_all(text, "").trim().to_string()
}

/// Greedy object candidate: first `{` through last `}`, else the whole text.
pub fn json_candidate(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

/// Strict stage of the two-stage parse: the cleaned text must be a JSON object.
pub fn strict_parse(raw: &str) -> Result<CandidateFields, ExtractionError> {
    let cleaned = strip_code_fences(raw);
    let candidate = json_candidate(&cleaned);

    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(ExtractionError::UnparseableResponse(format!(
            "expected an object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(ExtractionError::UnparseableResponse(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Make each named field a list: scalars are wrapped, null becomes empty,
/// arrays are left alone. Absent fields stay absent.
pub fn coerce_list_fields(fields: &mut CandidateFields, names: &[&str]) {
    for name in names {
        let Some(value) = fields.get_mut(*name) else {
            continue;
        };
        *value = match value.take() {
            Value::Null => Value::Array(Vec::new()),
            Value::Array(items) => Value::Array(items),
            scalar => Value::Array(vec![scalar]),
        };
    }
}
