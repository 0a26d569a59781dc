pub mod config;
pub mod pipeline;

pub use config::ExtractorConfig;
pub use pipeline::structuring::{
    CropExtractor, CropQualityAnalysis, CropRecord, ExtractionError, QualityGrade, Sender,
    SoilReadings, Throttler, TranscriptEntry,
};

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}
