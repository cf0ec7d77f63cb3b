// src/services/pipeline.rs
//! Document in, report out.
//!
//! Pages are classified up front, then extracted concurrently by a bounded
//! pool under one overall deadline. Everything after the fan-in is a pure
//! transformation over the collected page analyses, sorted by page number.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use log::{info, warn};
use uuid::Uuid;

use crate::analysis::{aggregate, analyze_age, insights, plan, summarize};
use crate::config::PipelineConfig;
use crate::errors::{ErrorKind, SkinReportError};
use crate::models::{MetricCategory, PageWarning, Report, SkippedPage};
use crate::services::cache::{AnalysisCache, report_key};
use crate::services::classifier::{Classification, classify};
use crate::services::extractor::PageExtractor;
use crate::services::image_processor::ImageProcessor;
use crate::services::intake::Document;
use crate::services::llm_service::InferenceClient;
use crate::services::schema::SCHEMA_VERSION;

/// Fewer successfully analysed pages than this fails the whole run.
pub const MIN_ANALYZED_PAGES: usize = 1;

pub struct ReportPipeline {
    extractor: PageExtractor,
    cache: Arc<dyn AnalysisCache>,
    processor: ImageProcessor,
    config: PipelineConfig,
}

impl ReportPipeline {
    pub fn new(
        client: Arc<dyn InferenceClient>,
        cache: Arc<dyn AnalysisCache>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            extractor: PageExtractor::new(client, cache.clone(), &config),
            cache,
            processor: ImageProcessor::new(),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run(
        &self,
        document: &Document,
        actual_age: Option<u32>,
    ) -> Result<Report, SkinReportError> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.config.deadline;

        let pages = document.pages(&self.processor)?;
        let classifications: Vec<Classification> = pages
            .iter()
            .map(|page| classify(page, &self.processor))
            .collect();
        let mut warnings: Vec<PageWarning> =
            classifications.iter().filter_map(|c| c.warning()).collect();

        info!(
            "Report {}: extracting {} page(s) from '{}' with concurrency {}",
            document.id,
            pages.len(),
            document.filename,
            self.config.concurrency
        );

        let mut pending: BTreeSet<u32> = pages.iter().map(|p| p.page_number).collect();
        let mut analyses = Vec::with_capacity(pages.len());
        let mut skipped_pages = Vec::new();
        let mut deadline_exceeded = false;

        {
            let mut outcomes = stream::iter(pages.iter().zip(&classifications))
                .map(|(page, classification)| async move {
                    (
                        page.page_number,
                        self.extractor.extract(page, classification).await,
                    )
                })
                .buffer_unordered(self.config.concurrency.max(1));

            loop {
                match tokio::time::timeout_at(deadline, outcomes.next()).await {
                    Ok(Some((page_number, outcome))) => {
                        pending.remove(&page_number);
                        match outcome {
                            Ok(analysis) => analyses.push(analysis),
                            Err(failure) => {
                                warn!(
                                    "Report {}: skipping page {} after {} attempt(s): {}",
                                    document.id, page_number, failure.attempts, failure.error
                                );
                                skipped_pages.push(SkippedPage {
                                    page_number,
                                    kind: failure.error.kind(),
                                    message: failure.error.to_string(),
                                    attempts: failure.attempts,
                                });
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(_) => {
                        deadline_exceeded = true;
                        break;
                    }
                }
            }
        }

        // Dropping the stream above abandoned whatever was still in flight.
        for page_number in pending {
            warn!(
                "Report {}: page {} abandoned at the pipeline deadline",
                document.id, page_number
            );
            skipped_pages.push(SkippedPage {
                page_number,
                kind: ErrorKind::ExtractionTimeout,
                message: format!(
                    "Pipeline deadline of {}s reached before the page finished",
                    self.config.deadline.as_secs()
                ),
                attempts: 0,
            });
        }

        analyses.sort_by_key(|a| a.page_number);
        skipped_pages.sort_by_key(|s| s.page_number);
        warnings.sort_by_key(|w| w.page_number);

        if analyses.len() < MIN_ANALYZED_PAGES {
            return Err(SkinReportError::InsufficientData {
                analyzed: analyses.len(),
                required: MIN_ANALYZED_PAGES,
            });
        }

        let metrics = aggregate(&analyses);
        let summary = summarize(&analyses, &metrics);
        let age_analysis = analyze_age(&analyses, actual_age);
        let treatment_plan = plan(&summary.concerns);
        let ai_insights = insights::build(&analyses, &metrics);

        let report = Report {
            id: document.id,
            created_at: Utc::now(),
            document_name: document.filename.clone(),
            fingerprint: document.fingerprint.clone(),
            schema_version: SCHEMA_VERSION.to_string(),
            page_count: document.page_count,
            complete: skipped_pages.is_empty() && !deadline_exceeded,
            deadline_exceeded,
            processing_time_ms: started.elapsed().as_millis() as u64,
            pages: analyses,
            skipped_pages,
            warnings,
            metrics,
            age_analysis,
            summary,
            treatment_plan,
            ai_insights,
        };

        check_invariants(&report)?;

        info!(
            "Report {}: {} analysed, {} skipped, score {} ({:?}), {}ms, complete={}",
            report.id,
            report.pages.len(),
            report.skipped_pages.len(),
            report.summary.overall_skin_health,
            report.summary.grade,
            report.processing_time_ms,
            report.complete
        );

        self.store(&report).await;
        Ok(report)
    }

    pub async fn fetch(&self, id: &Uuid) -> Result<Report, SkinReportError> {
        let json = self
            .cache
            .get(&report_key(id))
            .await?
            .ok_or_else(|| SkinReportError::NotFound(format!("Report {} not found", id)))?;
        serde_json::from_str(&json)
            .map_err(|e| SkinReportError::Cache(format!("Stored report {} is unreadable: {}", id, e)))
    }

    async fn store(&self, report: &Report) {
        let json = match serde_json::to_string(report) {
            Ok(json) => json,
            Err(e) => {
                warn!("Report {} not stored: {}", report.id, e);
                return;
            }
        };
        if let Err(e) = self
            .cache
            .put(&report_key(&report.id), json, self.config.cache_ttl)
            .await
        {
            warn!("Report {} not stored: {}", report.id, e);
        }
    }
}

/// Reject reports carrying values the aggregation stages must never produce.
pub fn check_invariants(report: &Report) -> Result<(), SkinReportError> {
    let violation = |message: String| Err(SkinReportError::AggregationInvariant(message));

    let hidden = &report.ai_insights.hidden_damage;
    let mut floats = vec![
        ("hidden damage ratio", hidden.ratio),
        ("hidden damage display ratio", hidden.display_ratio),
        ("analysis confidence", report.ai_insights.analysis_confidence),
    ];
    if let Some(moisture) = report.metrics.hydration.moisture_level {
        floats.push(("moisture level", moisture));
    }
    floats.extend(
        report
            .summary
            .concerns
            .iter()
            .map(|c| ("concern confidence", c.confidence)),
    );
    floats.extend(
        report
            .treatment_plan
            .recommendations()
            .map(|r| ("treatment confidence", r.confidence)),
    );
    if let Some((name, value)) = floats.iter().find(|(_, v)| !v.is_finite()) {
        return violation(format!("{} is {}", name, value));
    }

    if report.summary.overall_skin_health > 100 {
        return violation("overall skin health above 100".to_string());
    }
    if let Some(category) = MetricCategory::ALL
        .into_iter()
        .find(|c| report.metrics.score(*c) > 100)
    {
        return violation(format!("{} score above 100", category.label()));
    }

    let mut ids = HashSet::new();
    for recommendation in report.treatment_plan.recommendations() {
        if !ids.insert(recommendation.treatment_id.as_str()) {
            return violation(format!(
                "treatment {} appears twice in the plan",
                recommendation.treatment_id
            ));
        }
        if recommendation.estimated_cost.min > recommendation.estimated_cost.max {
            return violation(format!(
                "treatment {} has an inverted cost range",
                recommendation.treatment_id
            ));
        }
    }
    let total = &report.treatment_plan.total_estimated_investment;
    if total.min > total.max {
        return violation("total investment range is inverted".to_string());
    }

    Ok(())
}
