//! harvest-extract: command-line entry point.
//!
//! Reads a call transcript or a soil sensor snapshot from a JSON file, runs
//! it through the Gemini extraction pipeline and prints the result as JSON.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;

use harvest_extract::config::{
    self, DEFAULT_API_URL, DEFAULT_DAILY_QUOTA_CEILING, DEFAULT_HTTP_TIMEOUT_SECS,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MIN_INTERVAL_SECS,
};
use harvest_extract::{CropExtractor, ExtractionError, ExtractorConfig, SoilReadings, TranscriptEntry};

#[derive(Parser, Debug)]
#[command(name = config::APP_NAME)]
#[command(about = "Extract structured crop records from farmer calls and soil readings")]
#[command(version)]
struct Args {
    /// Gemini API key
    #[arg(long, env = config::ENV_API_KEY, hide_env_values = true)]
    api_key: Option<String>,

    /// generateContent endpoint
    #[arg(long, env = config::ENV_API_URL, default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Minimum seconds between requests
    #[arg(long, env = config::ENV_MIN_INTERVAL_SECS, default_value_t = DEFAULT_MIN_INTERVAL_SECS)]
    min_interval_secs: u64,

    /// Attempts per request, including the first
    #[arg(long, env = config::ENV_MAX_ATTEMPTS, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,

    /// HTTP timeout in seconds
    #[arg(long, env = config::ENV_HTTP_TIMEOUT_SECS, default_value_t = DEFAULT_HTTP_TIMEOUT_SECS)]
    http_timeout_secs: u64,

    /// Daily request ceiling reported by the per-day quota
    #[arg(long, env = config::ENV_DAILY_QUOTA_CEILING, default_value_t = DEFAULT_DAILY_QUOTA_CEILING)]
    daily_quota_ceiling: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract a crop record from a JSON array of transcript entries
    Transcript {
        file: PathBuf,

        /// Call summary appended to the prompt
        #[arg(long)]
        summary: Option<String>,
    },
    /// Analyse expected crop quality from a JSON soil reading
    Soil {
        file: PathBuf,

        #[arg(long)]
        crop_type: Option<String>,

        #[arg(long)]
        variety: Option<String>,
    },
}

impl Args {
    fn extractor_config(&self) -> Result<ExtractorConfig, ExtractionError> {
        let mut config = ExtractorConfig::new(self.api_key.clone())?;
        config.api_url = self.api_url.clone();
        config.min_interval = Duration::from_secs(self.min_interval_secs);
        config.max_attempts = self.max_attempts;
        config.http_timeout = Duration::from_secs(self.http_timeout_secs);
        config.daily_quota_ceiling = self.daily_quota_ceiling;
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    harvest_extract::init_tracing();
    let args = Args::parse();

    tracing::info!("{} v{}", config::APP_NAME, config::APP_VERSION);

    let config = args.extractor_config()?;
    tracing::debug!(?config, "Configuration loaded");
    let extractor = CropExtractor::from_config(&config)?;

    let output = match &args.command {
        Command::Transcript { file, summary } => {
            let entries: Vec<TranscriptEntry> = read_json(file).await?;
            let record = extractor
                .extract_from_transcript(&entries, summary.as_deref())
                .await
                .map_err(with_hint)?;
            serde_json::to_string_pretty(&record)?
        }
        Command::Soil {
            file,
            crop_type,
            variety,
        } => {
            let readings: SoilReadings = read_json(file).await?;
            let analysis = extractor
                .analyze_soil(&readings, crop_type.as_deref(), variety.as_deref())
                .await
                .map_err(with_hint)?;
            serde_json::to_string_pretty(&analysis)?
        }
    };

    println!("{output}");
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn with_hint(err: ExtractionError) -> anyhow::Error {
    if err.is_quota_exhausted() {
        anyhow::Error::new(err).context("Daily Gemini quota used up; try again tomorrow")
    } else {
        anyhow::Error::new(err)
    }
}
