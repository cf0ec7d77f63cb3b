// src/services/extractor.rs
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::config::PipelineConfig;
use crate::errors::ExtractionError;
use crate::models::PageAnalysis;
use crate::services::cache::{AnalysisCache, page_key};
use crate::services::classifier::Classification;
use crate::services::intake::PageImage;
use crate::services::llm_service::{ExtractionRequest, InferenceClient};
use crate::services::schema::{SCHEMA_VERSION, extraction_prompt, parse_page_response};

/// Final error for a page plus how many calls were spent on it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionFailure {
    pub error: ExtractionError,
    pub attempts: u32,
}

pub struct PageExtractor {
    client: Arc<dyn InferenceClient>,
    cache: Arc<dyn AnalysisCache>,
    call_timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
    cache_ttl: Duration,
}

impl PageExtractor {
    pub fn new(
        client: Arc<dyn InferenceClient>,
        cache: Arc<dyn AnalysisCache>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            client,
            cache,
            call_timeout: config.call_timeout,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
            cache_ttl: config.cache_ttl,
        }
    }

    /// Analyse one page. Cached results for identical content skip the call.
    pub async fn extract(
        &self,
        page: &PageImage,
        classification: &Classification,
    ) -> Result<PageAnalysis, ExtractionFailure> {
        let key = page_key(SCHEMA_VERSION, &page.fingerprint());

        if let Some(mut cached) = self.cached(&key).await {
            debug!("Page {} served from cache", page.page_number);
            cached.page_number = page.page_number;
            return Ok(cached);
        }

        let request = ExtractionRequest {
            page_number: page.page_number,
            media_type: page.media_type.clone(),
            data: page.data.clone(),
            prompt: extraction_prompt(classification),
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.call_once(&request, classification).await {
                Ok(analysis) => {
                    self.store(&key, &analysis).await;
                    if attempt > 1 {
                        debug!(
                            "Page {} extracted after {} attempts via {}",
                            page.page_number,
                            attempt,
                            self.client.name()
                        );
                    }
                    return Ok(analysis);
                }
                Err(error) if error.is_retryable() && attempt <= self.max_retries => {
                    let delay = self.retry_backoff * attempt;
                    warn!(
                        "Page {} attempt {} failed ({}); retrying in {}ms",
                        page.page_number,
                        attempt,
                        error,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    return Err(ExtractionFailure {
                        error,
                        attempts: attempt,
                    });
                }
            }
        }
    }

    async fn call_once(
        &self,
        request: &ExtractionRequest,
        classification: &Classification,
    ) -> Result<PageAnalysis, ExtractionError> {
        let raw = match tokio::time::timeout(self.call_timeout, self.client.complete(request)).await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(ExtractionError::Timeout {
                    after_ms: self.call_timeout.as_millis() as u64,
                });
            }
        };
        parse_page_response(&raw, classification)
    }

    async fn cached(&self, key: &str) -> Option<PageAnalysis> {
        match self.cache.get(key).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(analysis) => Some(analysis),
                Err(e) => {
                    warn!("Discarding unreadable cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Cache lookup failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn store(&self, key: &str, analysis: &PageAnalysis) {
        let json = match serde_json::to_string(analysis) {
            Ok(json) => json,
            Err(e) => {
                warn!("Page {} not cached: {}", analysis.page_number, e);
                return;
            }
        };
        if let Err(e) = self.cache.put(key, json, self.cache_ttl).await {
            warn!("Cache write failed for {}: {}", key, e);
        }
    }
}
