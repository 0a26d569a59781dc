//! Bounded retry around the Gemini transport.
//!
//! Each attempt goes through the shared [`Throttler`]. Per-minute rate limits
//! (429) are retried with the server's suggested delay or exponential
//! backoff; an exhausted daily quota fails immediately since waiting a few
//! seconds cannot fix it.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde_json::Value;

use super::gemini_types::{ApiError, ErrorEnvelope, RETRY_INFO_TYPE};
use super::throttle::Throttler;
use super::types::LlmTransport;
use super::ExtractionError;
use crate::config::ExtractorConfig;

static RETRY_IN_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)retry in\s+(\d+(?:\.\d+)?)\s*(ms|s)\b").unwrap()
});

static LIMIT_IN_MESSAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)limit:\s*(\d+)").unwrap());

static DURATION_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*(ms|s)?\s*$").unwrap());

/// Longest server-suggested wait honoured before retrying.
pub const MAX_RETRY_HINT: Duration = Duration::from_secs(300);

/// How a failed (non-2xx) reply should be handled.
#[derive(Debug)]
pub enum FailureClass {
    /// Stop and surface this error.
    Fatal(ExtractionError),
    /// Per-minute rate limit; retry after `wait_hint` if the server sent one.
    Retryable { wait_hint: Option<Duration> },
}

/// Classify a non-2xx reply. Pure.
///
/// 429 is a daily-quota failure when a quota entry names a per-day quota or
/// carries `quotaValue == daily_ceiling`, with the error message checked as
/// a fallback. Any other 429 is retryable. Every other status is fatal.
pub fn classify_failure(status: u16, body: &str, daily_ceiling: u32) -> FailureClass {
    if status != 429 {
        return FailureClass::Fatal(ExtractionError::TransportFailure {
            status,
            body: body.to_string(),
        });
    }

    let error = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error)
        .unwrap_or_else(|_| ApiError {
            message: body.to_string(),
            ..Default::default()
        });

    if is_daily_quota(&error, daily_ceiling) {
        return FailureClass::Fatal(ExtractionError::DailyQuotaExceeded {
            message: error.message,
        });
    }

    FailureClass::Retryable {
        wait_hint: parse_retry_delay(&error),
    }
}

fn is_daily_quota(error: &ApiError, daily_ceiling: u32) -> bool {
    let structured: Vec<&Value> = error
        .details
        .iter()
        .flat_map(quota_entries)
        .filter(|entry| entry.get("quotaId").is_some() || entry.get("quotaValue").is_some())
        .collect();

    // Message wording is not a stable contract: it only decides when no
    // structured quota entry is present.
    if structured.is_empty() {
        return message_is_daily(&error.message, daily_ceiling);
    }
    structured
        .iter()
        .any(|entry| quota_entry_is_daily(entry, daily_ceiling))
}

/// The detail itself plus any `violations[]` of a `QuotaFailure` detail.
fn quota_entries(detail: &Value) -> Vec<&Value> {
    let mut entries = vec![detail];
    if let Some(violations) = detail.get("violations").and_then(Value::as_array) {
        entries.extend(violations);
    }
    entries
}

fn quota_entry_is_daily(entry: &Value, daily_ceiling: u32) -> bool {
    let per_day_id = entry
        .get("quotaId")
        .and_then(Value::as_str)
        .is_some_and(|id| id.to_lowercase().contains("perday"));

    let value = match entry.get("quotaValue") {
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        Some(Value::Number(n)) => n.as_u64(),
        _ => None,
    };

    per_day_id || value == Some(u64::from(daily_ceiling))
}

fn message_is_daily(message: &str, daily_ceiling: u32) -> bool {
    let lower = message.to_lowercase();
    if lower.contains("daily") || lower.contains("per day") || lower.contains("perday") {
        return true;
    }
    LIMIT_IN_MESSAGE
        .captures(message)
        .and_then(|c| c[1].parse::<u64>().ok())
        .is_some_and(|limit| limit == u64::from(daily_ceiling))
}

/// Server-suggested wait: a `RetryInfo.retryDelay` detail, else
/// "retry in N s" in the message.
pub fn parse_retry_delay(error: &ApiError) -> Option<Duration> {
    let from_details = error
        .details
        .iter()
        .filter(|d| {
            d.get("@type").and_then(Value::as_str) == Some(RETRY_INFO_TYPE)
                || d.get("retryDelay").is_some()
        })
        .find_map(|d| d.get("retryDelay").and_then(Value::as_str))
        .and_then(parse_duration_text);

    from_details.or_else(|| {
        let caps = RETRY_IN_MESSAGE.captures(&error.message)?;
        let amount: f64 = caps[1].parse().ok()?;
        to_duration(amount, caps.get(2).map(|m| m.as_str()))
    })
}

/// Parse `"17s"`, `"2.5s"`, `"500ms"` or a bare number of seconds.
fn parse_duration_text(text: &str) -> Option<Duration> {
    let caps = DURATION_TEXT.captures(text)?;
    let amount: f64 = caps[1].parse().ok()?;
    to_duration(amount, caps.get(2).map(|m| m.as_str()))
}

/// Values that do not fit a `Duration` give no hint; the rest are capped at
/// [`MAX_RETRY_HINT`].
fn to_duration(amount: f64, unit: Option<&str>) -> Option<Duration> {
    let secs = match unit {
        Some(u) if u.eq_ignore_ascii_case("ms") => amount / 1000.0,
        _ => amount,
    };
    Duration::try_from_secs_f64(secs)
        .ok()
        .map(|d| d.min(MAX_RETRY_HINT))
}

/// Exponential fallback wait: 2^attempt seconds, attempt counted from 1.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per logical request, including the first.
    pub max_attempts: u32,
    pub daily_quota_ceiling: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            daily_quota_ceiling: config.daily_quota_ceiling,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::config::DEFAULT_MAX_ATTEMPTS,
            daily_quota_ceiling: crate::config::DEFAULT_DAILY_QUOTA_CEILING,
        }
    }
}

/// A successful reply body and how many attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub body: String,
    pub attempts: u32,
}

pub struct RetryController {
    throttler: Arc<Throttler>,
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(throttler: Arc<Throttler>, policy: RetryPolicy) -> Self {
        Self { throttler, policy }
    }

    pub fn throttler(&self) -> &Arc<Throttler> {
        &self.throttler
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Send `prompt`, retrying per-minute rate limits up to `max_attempts`.
    pub async fn send(
        &self,
        transport: &dyn LlmTransport,
        prompt: &str,
    ) -> Result<Delivery, ExtractionError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            self.throttler.acquire().await;
            attempt += 1;

            let reply = transport.generate(prompt).await.inspect_err(|e| {
                tracing::error!(attempt, error = %e, "Gemini request failed");
            })?;

            if reply.is_success() {
                self.throttler.record_completion();
                tracing::debug!(attempt, status = reply.status, "Gemini request succeeded");
                return Ok(Delivery {
                    body: reply.body,
                    attempts: attempt,
                });
            }

            match classify_failure(reply.status, &reply.body, self.policy.daily_quota_ceiling) {
                FailureClass::Fatal(err) => {
                    tracing::error!(attempt, status = reply.status, error = %err, "Gemini request rejected");
                    return Err(err);
                }
                FailureClass::Retryable { wait_hint } => {
                    if attempt >= max_attempts {
                        tracing::error!(attempt, "Rate limit still exceeded, giving up");
                        return Err(ExtractionError::RateLimitExceededAfterRetries {
                            attempts: attempt,
                        });
                    }
                    let wait = wait_hint.unwrap_or_else(|| backoff_delay(attempt));
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        server_hint = wait_hint.is_some(),
                        "Rate limited by Gemini, backing off"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}
