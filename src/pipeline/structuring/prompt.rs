use super::types::{SoilReadings, TranscriptEntry};

/// Instruction block for crop batch extraction. Appended after the transcript.
pub const CROP_EXTRACTION_INSTRUCTIONS: &str = r#"CRITICAL FIELDS TO EXTRACT (required for batch registration):
1. variety: the specific crop variety (e.g., "Basmati", "Pusa Basmati 1121", "Lakadong", "HD-3086")
2. harvestQuantity: quantity harvested in KILOGRAMS
   - 1 quintal = 100 kg: "100 quintal" or "100 क्विंटल" = 10000
   - "300 kilo", "300 kg" or "300 किलो" = 300
3. sowingDate: date the crop was sown, format YYYY-MM-DD
   - "7 January 2024" or "7 जनवरी 2024" = "2024-01-07"
   - if only month and year are mentioned, use the first day of that month
4. harvestDate: date the crop was harvested, format YYYY-MM-DD
5. pricePerKg: price per kilogram in Indian Rupees (₹), never per quintal

ADDITIONAL FIELDS (optional):
- cropType: Rice, Wheat, Maize, Turmeric, Black Gram, Green Chili, Coconut, Onion, Potato or Tomato
- certification, grading, labTest, farmLocation, farmerName
- freshnessDuration: shelf life in days

RULES:
1. Extract ONLY information explicitly mentioned in the conversation.
2. Use null for every field that is NOT mentioned.
3. Always convert quantities to kilograms and dates to YYYY-MM-DD.
4. Set confidence between 0.0 and 1.0 based on how many critical fields were found.
5. Return ONLY a JSON object, with no markdown and no text before or after it.

Return exactly this JSON structure:
{
  "variety": "string or null",
  "harvestQuantity": number or null,
  "sowingDate": "YYYY-MM-DD or null",
  "harvestDate": "YYYY-MM-DD or null",
  "pricePerKg": number or null,
  "cropType": "string or null",
  "certification": "string or null",
  "grading": "string or null",
  "labTest": "string or null",
  "freshnessDuration": number or null,
  "farmLocation": "string or null",
  "farmerName": "string or null",
  "confidence": number between 0 and 1
}"#;

/// Instruction block for soil-based crop quality analysis.
pub const SOIL_QUALITY_INSTRUCTIONS: &str = r#"Based on this soil data, analyze the expected crop quality and give recommendations.

Respond with this JSON structure:
{
  "qualityAssessment": "EXACTLY 5 lines separated by newlines. Line 1: overall crop health (Good/Fair/Poor). Line 2: main soil condition affecting quality. Line 3: expected performance (yield and quality). Line 4: key quality indicators (grain size/color/aroma). Line 5: overall outlook. Keep each line under 20 simple words.",
  "qualityScore": 85,
  "recommendations": ["Recommendation 1", "Recommendation 2", "Recommendation 3"],
  "soilRecommendations": ["Soil improvement 1", "Soil improvement 2"],
  "overallAssessment": "One paragraph on expected quality and yield potential",
  "expectedYield": "High/Medium/Low",
  "cropQuality": "Excellent"
}

RULES:
1. qualityAssessment MUST be exactly 5 lines in simple language.
2. qualityScore is a number from 0 to 100.
3. cropQuality is "Excellent" (80-100), "Good" (60-79), "Fair" (40-59) or "Poor" (0-39).
4. Recommendations must be specific and actionable.
5. Return ONLY a JSON object, with no markdown and no text before or after it."#;

/// A rendered prompt plus the source text manual extraction searches on fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRequest {
    prompt: String,
    source_text: String,
}

impl ExtractionRequest {
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// The rendered conversation (or reading list) the prompt was built from.
    pub fn source_text(&self) -> &str {
        &self.source_text
    }
}

/// Render transcript entries as `"<Role>: <message>"` lines in conversation order.
/// Entries with blank messages are skipped.
pub fn render_transcript(entries: &[TranscriptEntry]) -> String {
    entries
        .iter()
        .filter(|entry| !entry.message.trim().is_empty())
        .map(|entry| format!("{}: {}", entry.sender.label(), entry.message.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the crop extraction request for a call transcript.
pub fn build_transcript_request(
    entries: &[TranscriptEntry],
    call_summary: Option<&str>,
) -> ExtractionRequest {
    let conversation = render_transcript(entries);
    let prompt = build_transcript_prompt(&conversation, call_summary);
    ExtractionRequest {
        prompt,
        source_text: conversation,
    }
}

/// Build the crop extraction prompt from an already rendered conversation.
pub fn build_transcript_prompt(conversation: &str, call_summary: Option<&str>) -> String {
    let summary = call_summary
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("\nCall Summary: {s}\n"))
        .unwrap_or_default();

    format!(
        "You are an agricultural data extraction assistant. Analyze the following phone \
conversation transcript between a bot and a farmer about crop registration, and extract \
ONLY the structured information required for batch registration.

Conversation Transcript:
{conversation}
{summary}
{CROP_EXTRACTION_INSTRUCTIONS}"
    )
}

/// Render the readings that are present, one `- Label: value` line each.
pub fn render_soil_readings(readings: &SoilReadings) -> String {
    let moisture = readings.soil_moisture.or(readings.moisture);
    let lines = [
        readings.temperature.map(|v| format!("- Temperature: {v}°C")),
        readings.humidity.map(|v| format!("- Humidity: {v}%")),
        moisture.map(|v| format!("- Soil Moisture: {v}%")),
        readings.ldr.map(|v| format!("- Light Level (LDR): {v}")),
        readings.gas.map(|v| format!("- Gas Reading: {v}")),
        readings.rain.map(|v| format!("- Rain Sensor: {v}")),
        readings
            .received_at
            .as_deref()
            .filter(|ts| !ts.trim().is_empty())
            .map(|ts| format!("- Data Timestamp: {ts}")),
        readings.ph.map(|v| format!("- pH Level: {v}")),
        readings.nitrogen.map(|v| format!("- Nitrogen (N): {v} ppm")),
        readings.phosphorus.map(|v| format!("- Phosphorus (P): {v} ppm")),
        readings.potassium.map(|v| format!("- Potassium (K): {v} ppm")),
        readings.organic_matter.map(|v| format!("- Organic Matter: {v}%")),
    ];

    lines.into_iter().flatten().collect::<Vec<_>>().join("\n")
}

/// Build the soil quality analysis request.
pub fn build_soil_quality_request(
    readings: &SoilReadings,
    crop_type: Option<&str>,
    variety: Option<&str>,
) -> ExtractionRequest {
    let rendered = render_soil_readings(readings);
    let prompt = soil_prompt_from_rendered(&rendered, crop_type, variety);
    ExtractionRequest {
        prompt,
        source_text: rendered,
    }
}

/// Build the soil quality analysis prompt text.
pub fn build_soil_quality_prompt(
    readings: &SoilReadings,
    crop_type: Option<&str>,
    variety: Option<&str>,
) -> String {
    soil_prompt_from_rendered(&render_soil_readings(readings), crop_type, variety)
}

fn soil_prompt_from_rendered(
    rendered: &str,
    crop_type: Option<&str>,
    variety: Option<&str>,
) -> String {
    let crop_type = crop_type.map(str::trim).filter(|s| !s.is_empty());
    let variety = variety.map(str::trim).filter(|s| !s.is_empty());

    format!(
        "You are an agricultural expert analyzing crop quality based on soil conditions. \
Provide an analysis based on the following IoT soil sensor data.

CROP INFORMATION:
- Crop Type: {}
- Variety: {}

SOIL DATA FROM IoT DEVICE:
{rendered}

{SOIL_QUALITY_INSTRUCTIONS}
Analyze how the soil parameters affect quality for {}.",
        crop_type.unwrap_or("Not specified"),
        variety.unwrap_or("Not specified"),
        crop_type.unwrap_or("the crop"),
    )
}
