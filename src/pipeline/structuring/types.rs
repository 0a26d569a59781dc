use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ExtractionError;

/// Loosely typed fields produced by the parser, before normalization.
pub type CandidateFields = serde_json::Map<String, serde_json::Value>;

/// Who spoke a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", from = "String")]
pub enum Sender {
    /// The voice bot conducting the call.
    Bot,
    /// The farmer on the other end of the call.
    Farmer,
}

impl Sender {
    /// Role label used when rendering the transcript into a prompt.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Bot => "Bot",
            Self::Farmer => "Farmer",
        }
    }
}

impl From<String> for Sender {
    fn from(raw: String) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "BOT" | "SYSTEM" => Self::Bot,
            _ => Self::Farmer,
        }
    }
}

/// One line of a call transcript. Order within a transcript is conversation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub sender: Sender,
    pub message: String,
    #[serde(default)]
    pub timestamp: String,
}

impl TranscriptEntry {
    pub fn new(sender: Sender, message: &str) -> Self {
        Self {
            sender,
            message: message.to_string(),
            timestamp: String::new(),
        }
    }
}

/// IoT soil sensor snapshot. Every reading is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SoilReadings {
    /// Degrees Celsius.
    pub temperature: Option<f64>,
    /// Percent.
    pub humidity: Option<f64>,
    /// Percent.
    pub soil_moisture: Option<f64>,
    /// Older devices report soil moisture under this name.
    pub moisture: Option<f64>,
    pub ldr: Option<f64>,
    pub gas: Option<f64>,
    pub rain: Option<f64>,
    pub received_at: Option<String>,
    pub ph: Option<f64>,
    /// ppm.
    pub nitrogen: Option<f64>,
    /// ppm.
    pub phosphorus: Option<f64>,
    /// ppm.
    pub potassium: Option<f64>,
    /// Percent.
    pub organic_matter: Option<f64>,
}

/// Crop batch data extracted from a call transcript.
///
/// Every field is independently optional; `None` means the call never
/// mentioned it. Dates are `YYYY-MM-DD` when they could be parsed,
/// otherwise the model's original text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variety: Option<String>,
    /// Kilograms, whole units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub harvest_quantity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sowing_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub harvest_date: Option<String>,
    /// Indian rupees per kilogram.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_per_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certification: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grading: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lab_test: Option<String>,
    /// Days.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freshness_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub farm_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub farmer_name: Option<String>,
    /// In [0, 1].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl CropRecord {
    /// Number of populated critical fields (crop type, variety, quantity,
    /// sowing date, harvest date, price).
    pub fn critical_field_count(&self) -> usize {
        [
            self.crop_type.is_some(),
            self.variety.is_some(),
            self.harvest_quantity.is_some_and(|q| q != 0.0),
            self.sowing_date.is_some(),
            self.harvest_date.is_some(),
            self.price_per_kg.is_some_and(|p| p != 0.0),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }

    /// True when nothing beyond the confidence score was extracted.
    pub fn has_no_extracted_fields(&self) -> bool {
        let without_confidence = CropRecord {
            confidence: None,
            ..self.clone()
        };
        without_confidence == CropRecord::default()
    }
}

/// Crop quality category derived from a 0-100 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityGrade {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityGrade {
    /// >= 80 Excellent, >= 60 Good, >= 40 Fair, else Poor.
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Self::Excellent
        } else if score >= 60.0 {
            Self::Good
        } else if score >= 40.0 {
            Self::Fair
        } else {
            Self::Poor
        }
    }

    /// Case-insensitive match of a model-supplied label.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "excellent" => Some(Self::Excellent),
            "good" => Some(Self::Good),
            "fair" => Some(Self::Fair),
            "poor" => Some(Self::Poor),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Poor => "Poor",
        }
    }
}

/// Crop quality assessment derived from soil sensor readings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropQualityAnalysis {
    /// At most five lines.
    pub quality_assessment: String,
    /// In [0, 100].
    pub quality_score: Option<f64>,
    pub recommendations: Vec<String>,
    pub soil_recommendations: Vec<String>,
    pub overall_assessment: Option<String>,
    pub expected_yield: Option<String>,
    pub crop_quality: Option<QualityGrade>,
}

/// Status and body of one HTTP exchange with the model endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Text-generation transport (allows mocking).
///
/// Implementations issue exactly one request per call. A response with any
/// status is `Ok`; only a failure to get a response at all is an error.
#[async_trait]
pub trait LlmTransport: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<HttpReply, ExtractionError>;
}

#[async_trait]
impl<T: LlmTransport + ?Sized> LlmTransport for std::sync::Arc<T> {
    async fn generate(&self, prompt: &str) -> Result<HttpReply, ExtractionError> {
        (**self).generate(prompt).await
    }
}
