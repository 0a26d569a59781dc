use chrono::{DateTime, NaiveDate};

/// Supported crop types with the English and Hindi words that identify them.
/// Checked in order; the first match wins.
const CROP_VOCABULARY: &[(&str, &[&str])] = &[
    ("Rice", &["rice", "paddy", "chawal", "चावल", "धान"]),
    ("Wheat", &["wheat", "gehun", "गेहूं", "गेहूँ"]),
    ("Maize", &["maize", "corn", "makka", "मक्का"]),
    ("Turmeric", &["turmeric", "haldi", "हल्दी"]),
    ("Black Gram", &["black gram", "urad", "उड़द", "उड़द"]),
    ("Green Chili", &["green chili", "green chilli", "chili", "chilli", "mirch", "मिर्च"]),
    ("Coconut", &["coconut", "nariyal", "नारियल"]),
    ("Onion", &["onion", "pyaz", "प्याज"]),
    ("Potato", &["potato", "aloo", "आलू"]),
    ("Tomato", &["tomato", "tamatar", "टमाटर"]),
];

/// Varieties normalized to a canonical name, with the crop each implies.
const VARIETY_VOCABULARY: &[(&str, &[&str], &str)] = &[
    ("Basmati", &["basmati", "बासमती"], "Rice"),
    ("Lakadong", &["lakadong", "लाकडोंग"], "Turmeric"),
];

/// Canonical crop type for a model- or farmer-supplied name.
/// Unrecognised names are returned trimmed but otherwise verbatim.
pub fn classify_crop_type(raw: &str) -> String {
    let trimmed = raw.trim();
    let lower = trimmed.to_lowercase();
    CROP_VOCABULARY
        .iter()
        .find(|(_, synonyms)| synonyms.iter().any(|s| lower.contains(s)))
        .map(|(canonical, _)| canonical.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Canonical variety name plus the crop type it implies, if known.
/// "Pusa Basmati 1121" becomes `("Basmati", Some("Rice"))`.
pub fn classify_variety(raw: &str) -> (String, Option<&'static str>) {
    let trimmed = raw.trim();
    let lower = trimmed.to_lowercase();
    match VARIETY_VOCABULARY
        .iter()
        .find(|(_, synonyms, _)| synonyms.iter().any(|s| lower.contains(s)))
    {
        Some((canonical, _, crop)) => (canonical.to_string(), Some(crop)),
        None => (trimmed.to_string(), None),
    }
}

/// Canonical `YYYY-MM-DD` when the text parses as a date, else the text itself.
pub fn normalize_date(raw: &str) -> String {
    match parse_crop_date(raw) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => raw.trim().to_string(),
    }
}

/// Parse a date as farmers and the model tend to write it.
///
/// Numeric forms prefer day-first (`DD/MM/YYYY`) and fall back to
/// month-first. Textual forms accept English and Hindi month names, ordinal
/// days, and month-and-year only (taken as the first of the month).
pub fn parse_crop_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        return None;
    }

    for format in ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%m/%d/%Y", "%Y/%m/%d", "%d.%m.%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(d);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.date_naive());
    }
    // Timestamp without an offset
    if let Some((date_part, _)) = trimmed.split_once('T') {
        if let Ok(d) = NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
            return Some(d);
        }
    }

    parse_textual_date(trimmed)
}

/// "7 January 2024", "January 7, 2024", "7th of Jan 2024", "7 जनवरी 2024",
/// "जनवरी 2024".
fn parse_textual_date(text: &str) -> Option<NaiveDate> {
    let lower = text.to_lowercase();
    let mut day: Option<u32> = None;
    let mut month: Option<u32> = None;
    let mut year: Option<i32> = None;

    for token in lower
        .split(|c: char| c.is_whitespace() || c == ',' || c == '.')
        .filter(|t| !t.is_empty())
    {
        if let Some(m) = month_from_name(token) {
            if month.replace(m).is_some() {
                return None;
            }
            continue;
        }
        if token == "of" {
            continue;
        }

        let digits = strip_ordinal(token);
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if digits.len() == 4 {
            if year.replace(digits.parse().ok()?).is_some() {
                return None;
            }
        } else if digits.len() <= 2 {
            if day.replace(digits.parse().ok()?).is_some() {
                return None;
            }
        } else {
            return None;
        }
    }

    NaiveDate::from_ymd_opt(year?, month?, day.unwrap_or(1))
}

fn strip_ordinal(token: &str) -> &str {
    ["st", "nd", "rd", "th"]
        .iter()
        .find_map(|suffix| token.strip_suffix(suffix))
        .filter(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(token)
}

fn month_from_name(token: &str) -> Option<u32> {
    let month = match token {
        "january" | "jan" | "जनवरी" => 1,
        "february" | "feb" | "फरवरी" | "फ़रवरी" => 2,
        "march" | "mar" | "मार्च" => 3,
        "april" | "apr" | "अप्रैल" => 4,
        "may" | "मई" => 5,
        "june" | "jun" | "जून" => 6,
        "july" | "jul" | "जुलाई" => 7,
        "august" | "aug" | "अगस्त" => 8,
        "september" | "sep" | "sept" | "सितंबर" | "सितम्बर" => 9,
        "october" | "oct" | "अक्टूबर" | "अक्तूबर" => 10,
        "november" | "nov" | "नवंबर" | "नवम्बर" => 11,
        "december" | "dec" | "दिसंबर" | "दिसम्बर" => 12,
        _ => return None,
    };
    Some(month)
}
