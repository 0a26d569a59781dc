//! Gemini `generateContent` wire types: request body, response envelope,
//! and the error envelope returned with non-2xx statuses.

use serde::{Deserialize, Serialize};

/// Detail `@type` carrying a server-suggested retry delay.
pub const RETRY_INFO_TYPE: &str = "type.googleapis.com/google.rpc.RetryInfo";

// ──────────────────────────────────────────────
// Request
// ──────────────────────────────────────────────

/// `{ "contents": [ { "parts": [ { "text": prompt } ] } ] }`
#[derive(Debug, Serialize)]
pub struct GenerateContentRequest<'a> {
    pub contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
pub struct RequestContent<'a> {
    pub parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
pub struct RequestPart<'a> {
    pub text: &'a str,
}

impl<'a> GenerateContentRequest<'a> {
    /// Single-turn request with one text part.
    pub fn from_prompt(prompt: &'a str) -> Self {
        Self {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        }
    }
}

// ──────────────────────────────────────────────
// Response envelope
// ──────────────────────────────────────────────

/// Success envelope. Every level may be missing; the generated text lives
/// at `candidates[0].content.parts[0].text`.
#[derive(Debug, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponsePart {
    #[serde(default)]
    pub text: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first part of the first candidate, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()?
            .text
            .as_deref()
    }
}

// ──────────────────────────────────────────────
// Error envelope
// ──────────────────────────────────────────────

/// `{ "error": { "code", "message", "status", "details": [...] } }`
#[derive(Debug, Default, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub error: ApiError,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
    /// Heterogeneous `google.rpc` detail objects, kept untyped.
    #[serde(default)]
    pub details: Vec<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_to_contents_parts_text() {
        let body = serde_json::to_value(GenerateContentRequest::from_prompt("hello")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "contents": [ { "parts": [ { "text": "hello" } ] } ] })
        );
    }

    #[test]
    fn first_text_reads_nested_path() {
        let envelope: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":1}"}],"role":"model"},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(envelope.first_text(), Some(r#"{"a":1}"#));
    }

    #[test]
    fn first_text_none_when_path_missing() {
        let no_candidates: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(no_candidates.first_text(), None);

        let no_content: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        assert_eq!(no_content.first_text(), None);

        let no_parts: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates":[{"content":{"parts":[]}}]}"#).unwrap();
        assert_eq!(no_parts.first_text(), None);
    }

    #[test]
    fn error_envelope_tolerates_missing_details() {
        let envelope: ErrorEnvelope = serde_json::from_str(
            r#"{"error":{"code":429,"message":"Resource exhausted","status":"RESOURCE_EXHAUSTED"}}"#,
        )
        .unwrap();
        assert_eq!(envelope.error.code, Some(429));
        assert_eq!(envelope.error.message, "Resource exhausted");
        assert!(envelope.error.details.is_empty());
    }
}
