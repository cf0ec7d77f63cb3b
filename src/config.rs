// src/config.rs
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::SkinReportError;

pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisionProvider {
    OpenAi,
    Anthropic,
}

impl FromStr for VisionProvider {
    type Err = SkinReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(VisionProvider::OpenAi),
            "anthropic" => Ok(VisionProvider::Anthropic),
            other => Err(SkinReportError::Config(format!(
                "Unknown VISION_PROVIDER '{}'",
                other
            ))),
        }
    }
}

/// Knobs for the extraction fan-out and the overall deadline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_document_bytes: usize,
    pub concurrency: usize,
    pub call_timeout: Duration,
    pub deadline: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub cache_ttl: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            concurrency: 4,
            call_timeout: Duration::from_secs(20),
            deadline: Duration::from_secs(60),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
            cache_ttl: Duration::from_secs(86400),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub provider: VisionProvider,
    pub model: Option<String>,
    pub openai_key: Option<String>,
    pub anthropic_key: Option<String>,
    pub redis_url: Option<String>,
    pub local_intake_root: Option<PathBuf>,
    pub pipeline: PipelineConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, SkinReportError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, SkinReportError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = PipelineConfig::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let pipeline = PipelineConfig {
            max_document_bytes: parse_or(&lookup, "MAX_DOCUMENT_BYTES", defaults.max_document_bytes)?,
            concurrency: parse_or(&lookup, "EXTRACTION_CONCURRENCY", defaults.concurrency)?,
            call_timeout: Duration::from_secs(parse_or(
                &lookup,
                "EXTRACTION_TIMEOUT_SECS",
                defaults.call_timeout.as_secs(),
            )?),
            deadline: Duration::from_secs(parse_or(
                &lookup,
                "PIPELINE_DEADLINE_SECS",
                defaults.deadline.as_secs(),
            )?),
            max_retries: parse_or(&lookup, "EXTRACTION_MAX_RETRIES", defaults.max_retries)?,
            retry_backoff: Duration::from_millis(parse_or(
                &lookup,
                "RETRY_BACKOFF_MS",
                defaults.retry_backoff.as_millis() as u64,
            )?),
            cache_ttl: Duration::from_secs(parse_or(
                &lookup,
                "CACHE_TTL_SECS",
                defaults.cache_ttl.as_secs(),
            )?),
        };

        let provider = match non_empty("VISION_PROVIDER") {
            Some(value) => value.parse()?,
            None => VisionProvider::OpenAi,
        };

        let config = Config {
            bind_addr: non_empty("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            provider,
            model: non_empty("VISION_MODEL"),
            openai_key: non_empty("OPENAI_API_KEY"),
            anthropic_key: non_empty("ANTHROPIC_API_KEY"),
            redis_url: non_empty("REDIS_URL"),
            local_intake_root: non_empty("LOCAL_INTAKE_ROOT").map(PathBuf::from),
            pipeline,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), SkinReportError> {
        let p = &self.pipeline;
        if p.max_document_bytes == 0 {
            return Err(SkinReportError::Config(
                "MAX_DOCUMENT_BYTES must be positive".to_string(),
            ));
        }
        if !(1..=16).contains(&p.concurrency) {
            return Err(SkinReportError::Config(format!(
                "EXTRACTION_CONCURRENCY must be between 1 and 16, got {}",
                p.concurrency
            )));
        }
        if p.max_retries > 5 {
            return Err(SkinReportError::Config(format!(
                "EXTRACTION_MAX_RETRIES must be at most 5, got {}",
                p.max_retries
            )));
        }
        if p.call_timeout.is_zero() || p.call_timeout >= p.deadline {
            return Err(SkinReportError::Config(
                "EXTRACTION_TIMEOUT_SECS must be positive and shorter than PIPELINE_DEADLINE_SECS"
                    .to_string(),
            ));
        }

        let key_present = match self.provider {
            VisionProvider::OpenAi => self.openai_key.is_some(),
            VisionProvider::Anthropic => self.anthropic_key.is_some(),
        };
        if !key_present {
            return Err(SkinReportError::Config(format!(
                "API key for provider {:?} is not set",
                self.provider
            )));
        }

        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, SkinReportError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| SkinReportError::Config(format!("Invalid value for {}: '{}'", key, raw))),
        None => Ok(default),
    }
}
