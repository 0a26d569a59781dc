pub mod types;
pub mod prompt;
pub mod throttle;
pub mod gemini;
pub mod gemini_types;
pub mod retry;
pub mod parser;
pub mod manual;
pub mod classify;
pub mod confidence;
pub mod normalize;
pub mod orchestrator;

pub use types::*;
pub use prompt::*;
pub use throttle::*;
pub use gemini::*;
pub use retry::*;
pub use parser::*;
pub use manual::*;
pub use classify::*;
pub use confidence::*;
pub use normalize::*;
pub use orchestrator::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Gemini daily quota exceeded; retry after the quota resets ({message})")]
    DailyQuotaExceeded { message: String },

    #[error("Gemini rate limit still exceeded after {attempts} attempts; wait a minute and try again")]
    RateLimitExceededAfterRetries { attempts: u32 },

    #[error("Gemini returned error (status {status}): {body}")]
    TransportFailure { status: u16, body: String },

    #[error("Network failure reaching Gemini: {0}")]
    NetworkFailure(String),

    #[error("Gemini response contained no generated text")]
    EmptyResponse,

    #[error("Response is not a JSON object: {0}")]
    UnparseableResponse(String),
}

impl ExtractionError {
    /// Conditions that waiting a few seconds will not fix.
    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, ExtractionError::DailyQuotaExceeded { .. })
    }
}
