use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use super::gemini::GeminiClient;
use super::manual::{manual_extract_crop, manual_extract_quality};
use super::normalize::{normalize_crop_record, normalize_quality_analysis};
use super::parser::{coerce_list_fields, extract_generated_text, strict_parse};
use super::prompt::{build_soil_quality_request, build_transcript_request};
use super::retry::{RetryController, RetryPolicy};
use super::throttle::Throttler;
use super::types::{
    CandidateFields, CropQualityAnalysis, CropRecord, LlmTransport, SoilReadings, TranscriptEntry,
};
use super::ExtractionError;
use crate::config::ExtractorConfig;

/// Fields the quality schema declares as lists.
const QUALITY_LIST_FIELDS: &[&str] = &["recommendations", "soilRecommendations"];

/// Runs the extraction pipeline:
/// prompt → throttle → Gemini (with retry) → parse / manual fallback → normalize
pub struct CropExtractor {
    transport: Box<dyn LlmTransport>,
    retry: RetryController,
}

impl CropExtractor {
    pub fn new(
        transport: Box<dyn LlmTransport>,
        throttler: Arc<Throttler>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            retry: RetryController::new(throttler, policy),
        }
    }

    /// Gemini-backed extractor with its own throttler.
    pub fn from_config(config: &ExtractorConfig) -> Result<Self, ExtractionError> {
        let throttler = Arc::new(Throttler::new(config.min_interval));
        Self::with_throttler(config, throttler)
    }

    /// Gemini-backed extractor sharing `throttler` with other extractors
    /// that use the same API key.
    pub fn with_throttler(
        config: &ExtractorConfig,
        throttler: Arc<Throttler>,
    ) -> Result<Self, ExtractionError> {
        config.validate()?;
        let client = GeminiClient::from_config(config)?;
        Ok(Self::new(
            Box::new(client),
            throttler,
            RetryPolicy::from_config(config),
        ))
    }

    pub fn throttler(&self) -> &Arc<Throttler> {
        self.retry.throttler()
    }

    /// Extract a crop record from a call transcript.
    ///
    /// Malformed model output never fails the call: manual extraction runs
    /// instead, and if that finds nothing the record comes back with every
    /// field absent.
    pub async fn extract_from_transcript(
        &self,
        entries: &[TranscriptEntry],
        call_summary: Option<&str>,
    ) -> Result<CropRecord, ExtractionError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "extract_crop_record",
            %request_id,
            entries = entries.len()
        );

        async move {
            let request = build_transcript_request(entries, call_summary);
            let delivery = self
                .retry
                .send(self.transport.as_ref(), request.prompt())
                .await?;
            let raw = generated_text_or_empty(&delivery.body);

            let fields = match strict_parse(&raw) {
                Ok(fields) => fields,
                Err(e) => {
                    tracing::warn!(error = %e, "Falling back to manual extraction");
                    manual_extract_crop(&raw, request.source_text())
                }
            };

            let record = normalize_crop_record(&fields);
            if record.has_no_extracted_fields() {
                tracing::warn!(attempts = delivery.attempts, "No crop fields could be extracted");
                return Ok(CropRecord::default());
            }

            tracing::info!(
                attempts = delivery.attempts,
                critical_fields = record.critical_field_count(),
                confidence = ?record.confidence,
                "Crop record extracted"
            );
            Ok(record)
        }
        .instrument(span)
        .await
    }

    /// Assess expected crop quality from soil sensor readings.
    pub async fn analyze_soil(
        &self,
        readings: &SoilReadings,
        crop_type: Option<&str>,
        variety: Option<&str>,
    ) -> Result<CropQualityAnalysis, ExtractionError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "analyze_soil_quality",
            %request_id,
            crop_type = crop_type.unwrap_or("unspecified")
        );

        async move {
            let request = build_soil_quality_request(readings, crop_type, variety);
            let delivery = self
                .retry
                .send(self.transport.as_ref(), request.prompt())
                .await?;
            let raw = generated_text_or_empty(&delivery.body);

            let mut fields: CandidateFields = match strict_parse(&raw) {
                Ok(fields) => fields,
                Err(e) => {
                    tracing::warn!(error = %e, "Falling back to manual extraction");
                    manual_extract_quality(&raw)
                }
            };
            coerce_list_fields(&mut fields, QUALITY_LIST_FIELDS);

            let analysis = normalize_quality_analysis(&fields);
            tracing::info!(
                attempts = delivery.attempts,
                quality_score = ?analysis.quality_score,
                crop_quality = analysis.crop_quality.map_or("unknown", |g| g.as_str()),
                "Soil quality analysed"
            );
            Ok(analysis)
        }
        .instrument(span)
        .await
    }
}

/// Generated text from a success envelope. An envelope without text is
/// handled like unparseable output: manual extraction still runs.
fn generated_text_or_empty(envelope: &str) -> String {
    extract_generated_text(envelope).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Gemini reply carried no generated text");
        String::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::structuring::gemini::MockTransport;
    use crate::pipeline::structuring::types::{QualityGrade, Sender};
    use std::time::Duration;

    const INTERVAL: Duration = Duration::from_secs(15);

    const MINUTE_429: &str =
        r#"{"error":{"code":429,"message":"Resource has been exhausted.","status":"RESOURCE_EXHAUSTED"}}"#;

    const DAILY_429: &str = r#"{"error":{"code":429,"message":"You exceeded your current quota.","details":[{"@type":"type.googleapis.com/google.rpc.QuotaFailure","violations":[{"quotaId":"GenerateRequestsPerDayPerProjectPerModel-FreeTier","quotaValue":"20"}]}]}}"#;

    fn extractor(transport: MockTransport) -> (CropExtractor, Arc<MockTransport>) {
        let transport = Arc::new(transport);
        let extractor = CropExtractor::new(
            Box::new(transport.clone()),
            Arc::new(Throttler::new(INTERVAL)),
            RetryPolicy::default(),
        );
        (extractor, transport)
    }

    fn transcript() -> Vec<TranscriptEntry> {
        vec![
            TranscriptEntry::new(Sender::Bot, "Namaste! Which crop did you harvest?"),
            TranscriptEntry::new(Sender::Farmer, "My crop is rice, Basmati variety"),
            TranscriptEntry::new(Sender::Bot, "How much?"),
            TranscriptEntry::new(Sender::Farmer, "100 quintal"),
            TranscriptEntry::new(Sender::Bot, "When did you sow it?"),
            TranscriptEntry::new(Sender::Farmer, "7 जनवरी 2024"),
        ]
    }

    #[tokio::test]
    async fn well_formed_reply_normalized() {
        let reply = "```json\n{\"cropType\":\"चावल\",\"variety\":\"Pusa Basmati 1121\",\
                     \"harvestQuantity\":10000,\"sowingDate\":\"7 January 2024\",\
                     \"harvestDate\":null,\"pricePerKg\":null}\n```";
        let (extractor, mock) = extractor(MockTransport::new().with_generated_text(reply));

        let record = extractor
            .extract_from_transcript(&transcript(), Some("Basmati harvest call"))
            .await
            .unwrap();

        assert_eq!(record.crop_type.as_deref(), Some("Rice"));
        assert_eq!(record.variety.as_deref(), Some("Basmati"));
        assert_eq!(record.harvest_quantity, Some(10000.0));
        assert_eq!(record.sowing_date.as_deref(), Some("2024-01-07"));
        assert!(record.harvest_date.is_none());
        assert_eq!(record.confidence, Some(0.9));

        let prompts = mock.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Farmer: 100 quintal"));
        assert!(prompts[0].contains("Call Summary: Basmati harvest call"));
    }

    #[tokio::test]
    async fn prose_reply_falls_back_to_manual_extraction() {
        let (extractor, _) = extractor(
            MockTransport::new().with_generated_text("The farmer grew basmati rice this year."),
        );

        let record = extractor
            .extract_from_transcript(&transcript(), None)
            .await
            .unwrap();

        assert_eq!(record.harvest_quantity, Some(10000.0));
        assert_eq!(record.crop_type.as_deref(), Some("Rice"));
        assert_eq!(record.variety.as_deref(), Some("Basmati"));
    }

    #[tokio::test]
    async fn envelope_without_text_uses_transcript() {
        let (extractor, _) = extractor(
            MockTransport::new().with_reply(200, r#"{"candidates":[{"finishReason":"SAFETY"}]}"#),
        );

        let record = extractor
            .extract_from_transcript(&transcript(), None)
            .await
            .unwrap();
        assert_eq!(record.harvest_quantity, Some(10000.0));
    }

    #[tokio::test]
    async fn nothing_recoverable_gives_empty_record() {
        let (extractor, _) = extractor(MockTransport::new().with_generated_text("Sorry."));
        let entries = vec![TranscriptEntry::new(Sender::Farmer, "Hello?")];

        let record = extractor.extract_from_transcript(&entries, None).await.unwrap();
        assert_eq!(record, CropRecord::default());
    }

    #[tokio::test]
    async fn all_null_reply_gives_empty_record() {
        let reply = r#"{"cropType": null, "variety": "null", "harvestQuantity": null, "farmLocation": ""}"#;
        let (extractor, _) = extractor(MockTransport::new().with_generated_text(reply));
        let entries = vec![TranscriptEntry::new(Sender::Farmer, "Hello?")];

        let record = extractor.extract_from_transcript(&entries, None).await.unwrap();
        assert_eq!(record, CropRecord::default());
        assert!(record.confidence.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_absorbed() {
        let (extractor, mock) = extractor(
            MockTransport::new()
                .with_reply(429, MINUTE_429)
                .with_generated_text(r#"{"variety":"Basmati","harvestQuantity":10000}"#),
        );

        let record = extractor
            .extract_from_transcript(&transcript(), None)
            .await
            .unwrap();
        assert_eq!(record.variety.as_deref(), Some("Basmati"));
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn daily_quota_propagates() {
        let (extractor, mock) = extractor(
            MockTransport::new()
                .with_reply(429, DAILY_429)
                .with_generated_text("{}"),
        );

        let err = extractor
            .extract_from_transcript(&transcript(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::DailyQuotaExceeded { .. }));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn transport_failure_propagates_with_status() {
        let (extractor, _) = extractor(MockTransport::new().with_reply(403, "API key invalid"));

        let err = extractor
            .extract_from_transcript(&transcript(), None)
            .await
            .unwrap_err();
        match err {
            ExtractionError::TransportFailure { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "API key invalid");
            }
            other => panic!("expected transport failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn soil_analysis_normalized() {
        let reply = r#"{
            "qualityAssessment": "Good\nMoist soil\nHigh yield\nLong grains\nPositive\nExtra line\nAnother",
            "qualityScore": 105,
            "recommendations": "Irrigate weekly",
            "soilRecommendations": null,
            "overallAssessment": "Healthy crop expected",
            "expectedYield": "High"
        }"#;
        let (extractor, mock) = extractor(MockTransport::new().with_generated_text(reply));
        let readings = SoilReadings {
            temperature: Some(28.0),
            soil_moisture: Some(42.0),
            ph: Some(6.8),
            ..Default::default()
        };

        let analysis = extractor
            .analyze_soil(&readings, Some("Rice"), Some("Basmati"))
            .await
            .unwrap();

        assert_eq!(analysis.quality_score, Some(100.0));
        assert_eq!(analysis.crop_quality, Some(QualityGrade::Excellent));
        assert_eq!(analysis.quality_assessment.lines().count(), 5);
        assert_eq!(analysis.recommendations, vec!["Irrigate weekly"]);
        assert!(analysis.soil_recommendations.is_empty());
        assert_eq!(analysis.expected_yield.as_deref(), Some("High"));

        let prompts = mock.prompts();
        assert!(prompts[0].contains("- Soil Moisture: 42%"));
        assert!(prompts[0].contains("- Crop Type: Rice"));
    }

    #[tokio::test]
    async fn soil_analysis_manual_fallback() {
        let reply = r#"Analysis: "qualityScore": 55, "recommendations": ["Add lime"], "qualityAssessment": "Fair"#;
        let (extractor, _) = extractor(MockTransport::new().with_generated_text(reply));

        let analysis = extractor
            .analyze_soil(&SoilReadings::default(), None, None)
            .await
            .unwrap();

        assert_eq!(analysis.quality_score, Some(55.0));
        assert_eq!(analysis.crop_quality, Some(QualityGrade::Fair));
        assert_eq!(analysis.recommendations, vec!["Add lime"]);
        assert!(analysis.quality_assessment.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pipelines_share_one_throttler() {
        let (extractor, mock) = extractor(
            MockTransport::new()
                .with_generated_text(r#"{"variety":"Basmati"}"#)
                .with_generated_text(r#"{"qualityScore":70}"#),
        );

        extractor
            .extract_from_transcript(&transcript(), None)
            .await
            .unwrap();
        extractor
            .analyze_soil(&SoilReadings::default(), None, None)
            .await
            .unwrap();

        let calls = mock.call_instants();
        assert!(calls[1] - calls[0] >= INTERVAL);
    }

    #[test]
    fn from_config_rejects_invalid_config() {
        let mut config = ExtractorConfig::new(Some("k".into())).unwrap();
        config.max_attempts = 0;
        assert!(matches!(
            CropExtractor::from_config(&config),
            Err(ExtractionError::Configuration(_))
        ));
    }
}
