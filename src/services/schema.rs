// src/services/schema.rs
//! Versioned response contract for per-page extraction.
//!
//! The aggregator hard-codes the field names below; bump `SCHEMA_VERSION`
//! whenever the shape changes so cached analyses are not reused.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::analysis::categories::metric_keys;
use crate::errors::ExtractionError;
use crate::models::{
    AgingFactor, ConditionDetection, Contribution, ImageType, MetricValue, PageAnalysis,
    RegionAnalysis, Severity,
};
use crate::services::classifier::Classification;

pub const SCHEMA_VERSION: &str = "skin-page/v1";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPage {
    #[serde(default)]
    image_type: Option<String>,
    findings: Vec<String>,
    conditions: Vec<RawCondition>,
    regions: Vec<RawRegion>,
    #[serde(default)]
    raw_metrics: BTreeMap<String, Value>,
    #[serde(default)]
    aging_factors: Vec<RawAgingFactor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCondition {
    condition: String,
    confidence: f64,
    #[serde(default)]
    severity: Option<Severity>,
    #[serde(default)]
    locations: Vec<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    suggested_treatments: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRegion {
    region: String,
    severity: Severity,
    score: i64,
    #[serde(default)]
    recommendations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawAgingFactor {
    factor: String,
    contribution: Contribution,
    #[serde(default)]
    description: String,
}

/// Instruction sent with every page image.
pub fn extraction_prompt(classification: &Classification) -> String {
    let hint = if classification.ambiguous {
        "The capture modality of this page is unknown; report it in imageType.".to_string()
    } else {
        format!(
            "This page was captured under {} imaging.",
            classification.image_type.as_str()
        )
    };

    format!(
        r#"You are analysing one page (page {page}) of a clinical skin-imaging report. {hint}

Identify visible skin findings, detected conditions and per-region assessments.
Respond with a single JSON object and nothing else, matching schema {version}:
{{
  "imageType": "standard|uv|polarized|cross-polarized|parallel-polarized|enhanced|other",
  "findings": ["short free-text observation", ...],
  "conditions": [{{
      "condition": "name, e.g. hyperpigmentation, enlarged pores, fine lines",
      "confidence": 0.0-1.0,
      "severity": "normal|mild|moderate|severe",
      "locations": ["forehead", "left cheek", ...],
      "description": "one sentence",
      "suggestedTreatments": ["..."]
  }}],
  "regions": [{{
      "region": "anatomical region and concern, e.g. forehead wrinkles",
      "severity": "normal|mild|moderate|severe",
      "score": integer 0-100 (100 = healthy),
      "recommendations": ["..."]
  }}],
  "rawMetrics": {{
      "pore_count_small": n, "pore_count_medium": n, "pore_count_large": n,
      "wrinkle_count_fine": n, "wrinkle_count_moderate": n, "wrinkle_count_deep": n,
      "spot_count": n, "redness_areas": n, "broken_capillaries": n,
      "dry_areas": n, "sagging_areas": n, "rough_areas": n, "scar_count": n,
      "moisture_level": percent, "estimated_age": years, "skin_type": "text"
  }},
  "agingFactors": [{{"factor": "...", "contribution": "low|medium|high", "description": "..."}}]
}}
Region severity MUST follow the score: 80-100 normal, 60-79 mild, 40-59 moderate, 0-39 severe.
Omit metrics you cannot measure. Counts are non-negative integers."#,
        page = classification.page_number,
        hint = hint,
        version = SCHEMA_VERSION,
    )
}

/// Strip an optional markdown code fence around the JSON body.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}

fn violation(message: impl Into<String>) -> ExtractionError {
    ExtractionError::SchemaViolation(message.into())
}

/// Validate a raw service response into a `PageAnalysis`.
///
/// Nothing is coerced: a wrong type, an out-of-range value or an unknown
/// enum literal rejects the whole page.
pub fn parse_page_response(
    raw: &str,
    classification: &Classification,
) -> Result<PageAnalysis, ExtractionError> {
    let page: RawPage = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| violation(format!("malformed page JSON: {}", e)))?;

    let reported = match page.image_type.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(literal) => Some(
            serde_json::from_value::<ImageType>(Value::String(literal.to_ascii_lowercase()))
                .map_err(|_| violation(format!("unknown imageType '{}'", literal)))?,
        ),
    };

    let regions = page
        .regions
        .into_iter()
        .map(validate_region)
        .collect::<Result<Vec<_>, _>>()?;

    let conditions = page
        .conditions
        .into_iter()
        .map(|c| validate_condition(c, &regions))
        .collect::<Result<Vec<_>, _>>()?;

    let raw_metrics = page
        .raw_metrics
        .into_iter()
        .map(|(key, value)| validate_metric(&key, value).map(|v| (key, v)))
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    let aging_factors = page
        .aging_factors
        .into_iter()
        .map(|f| {
            let factor = f.factor.trim().to_string();
            if factor.is_empty() {
                return Err(violation("aging factor with empty name"));
            }
            Ok(AgingFactor {
                factor,
                contribution: f.contribution,
                description: f.description.trim().to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PageAnalysis {
        page_number: classification.page_number,
        image_type: classification.resolve(reported),
        findings: page.findings.iter().map(|f| f.trim().to_string()).collect(),
        conditions,
        regions,
        raw_metrics,
        aging_factors,
    })
}

fn validate_region(raw: RawRegion) -> Result<RegionAnalysis, ExtractionError> {
    let region = raw.region.trim().to_string();
    if region.is_empty() {
        return Err(violation("region with empty name"));
    }
    if !(0..=100).contains(&raw.score) {
        return Err(violation(format!(
            "region '{}' score {} outside 0-100",
            region, raw.score
        )));
    }

    let score = raw.score as u8;
    let band = Severity::for_score(score);
    if raw.severity != band {
        return Err(violation(format!(
            "region '{}' severity {} disagrees with score {} ({} band)",
            region,
            raw.severity.as_str(),
            score,
            band.as_str()
        )));
    }

    Ok(RegionAnalysis {
        region,
        severity: raw.severity,
        score,
        recommendations: raw
            .recommendations
            .iter()
            .map(|r| r.trim().to_string())
            .collect(),
    })
}

fn validate_condition(
    raw: RawCondition,
    regions: &[RegionAnalysis],
) -> Result<ConditionDetection, ExtractionError> {
    let condition = raw.condition.trim().to_string();
    if condition.is_empty() {
        return Err(violation("condition with empty name"));
    }
    if !raw.confidence.is_finite() || !(0.0..=1.0).contains(&raw.confidence) {
        return Err(violation(format!(
            "condition '{}' confidence {} outside 0-1",
            condition, raw.confidence
        )));
    }

    let locations: Vec<String> = raw.locations.iter().map(|l| l.trim().to_string()).collect();
    let severity = raw
        .severity
        .unwrap_or_else(|| severity_from_regions(&locations, regions));

    Ok(ConditionDetection {
        condition,
        confidence: raw.confidence,
        severity,
        locations,
        description: raw.description.trim().to_string(),
        suggested_treatments: raw
            .suggested_treatments
            .iter()
            .map(|t| t.trim().to_string())
            .collect(),
    })
}

/// Worst severity among same-page regions named by the condition's locations.
fn severity_from_regions(locations: &[String], regions: &[RegionAnalysis]) -> Severity {
    regions
        .iter()
        .filter(|region| {
            let name = region.region.to_lowercase();
            locations.iter().any(|loc| {
                let loc = loc.to_lowercase();
                !loc.is_empty() && (name.contains(&loc) || loc.contains(&name))
            })
        })
        .map(|region| region.severity)
        .max()
        .unwrap_or(Severity::Mild)
}

fn validate_metric(key: &str, value: Value) -> Result<MetricValue, ExtractionError> {
    match value {
        Value::Number(n) => {
            let number = n
                .as_f64()
                .filter(|v| v.is_finite())
                .ok_or_else(|| violation(format!("metric '{}' is not a finite number", key)))?;

            if metric_keys::COUNTS.contains(&key) && (number < 0.0 || number.fract() != 0.0) {
                return Err(violation(format!(
                    "count metric '{}' is {}, expected a non-negative integer",
                    key, number
                )));
            }
            if key == metric_keys::MOISTURE_LEVEL && !(0.0..=100.0).contains(&number) {
                return Err(violation(format!("moisture_level {} outside 0-100", number)));
            }
            if key == metric_keys::ESTIMATED_AGE && !(1.0..=120.0).contains(&number) {
                return Err(violation(format!("estimated_age {} outside 1-120", number)));
            }
            Ok(MetricValue::Number(number))
        }
        Value::String(s) => {
            if metric_keys::COUNTS.contains(&key)
                || key == metric_keys::MOISTURE_LEVEL
                || key == metric_keys::ESTIMATED_AGE
            {
                return Err(violation(format!("metric '{}' must be numeric", key)));
            }
            Ok(MetricValue::Text(s))
        }
        other => Err(violation(format!(
            "metric '{}' has unsupported value {}",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::classifier::ClassificationBasis;

    fn classification(image_type: ImageType, ambiguous: bool) -> Classification {
        Classification {
            page_number: 3,
            image_type,
            basis: if ambiguous {
                ClassificationBasis::Undetermined
            } else {
                ClassificationBasis::Text
            },
            ambiguous,
            cues: vec![],
        }
    }

    const VALID: &str = r#"{
        "imageType": "uv",
        "findings": ["scattered sub-surface spots "],
        "conditions": [
            {"condition": "Hyperpigmentation", "confidence": 0.82, "severity": "moderate",
             "locations": ["left cheek"], "description": "Sun spots", "suggestedTreatments": ["IPL"]},
            {"condition": "Fine lines", "confidence": 0.6, "locations": ["forehead"]}
        ],
        "regions": [
            {"region": "forehead wrinkles", "severity": "moderate", "score": 45, "recommendations": ["retinoid"]},
            {"region": "left cheek", "severity": "mild", "score": 72}
        ],
        "rawMetrics": {"spot_count": 6, "skin_type": "combination"},
        "agingFactors": [{"factor": "Sun exposure", "contribution": "high", "description": "UV damage"}]
    }"#;

    #[test]
    fn valid_response_becomes_page_analysis() {
        let page = parse_page_response(VALID, &classification(ImageType::Uv, false)).unwrap();
        assert_eq!(page.page_number, 3);
        assert_eq!(page.image_type, ImageType::Uv);
        assert_eq!(page.findings, vec!["scattered sub-surface spots"]);
        assert_eq!(page.conditions.len(), 2);
        assert_eq!(page.regions[0].score, 45);
        assert_eq!(page.raw_metrics["spot_count"], MetricValue::Number(6.0));
        assert_eq!(page.aging_factors[0].contribution, Contribution::High);
    }

    #[test]
    fn missing_condition_severity_follows_matching_region() {
        let page = parse_page_response(VALID, &classification(ImageType::Uv, false)).unwrap();
        // "forehead" matches the moderate "forehead wrinkles" region.
        assert_eq!(page.conditions[1].severity, Severity::Moderate);
    }

    #[test]
    fn code_fenced_json_is_accepted() {
        let fenced = format!("```json\n{}\n```", VALID);
        assert!(parse_page_response(&fenced, &classification(ImageType::Uv, false)).is_ok());
    }

    #[test]
    fn classifier_wins_unless_ambiguous() {
        let confident = parse_page_response(VALID, &classification(ImageType::Standard, false)).unwrap();
        assert_eq!(confident.image_type, ImageType::Standard);

        let ambiguous = parse_page_response(VALID, &classification(ImageType::Other, true)).unwrap();
        assert_eq!(ambiguous.image_type, ImageType::Uv);
    }

    fn assert_violation(body: &str) {
        let result = parse_page_response(body, &classification(ImageType::Standard, false));
        assert!(
            matches!(result, Err(ExtractionError::SchemaViolation(_))),
            "expected violation for {body}, got {result:?}"
        );
    }

    #[test]
    fn out_of_range_values_are_violations() {
        assert_violation(
            r#"{"findings": [], "regions": [],
                "conditions": [{"condition": "acne", "confidence": 1.2}]}"#,
        );
        assert_violation(
            r#"{"findings": [], "conditions": [],
                "regions": [{"region": "chin", "severity": "severe", "score": 140}]}"#,
        );
        assert_violation(
            r#"{"findings": [], "conditions": [], "regions": [],
                "rawMetrics": {"spot_count": -2}}"#,
        );
        assert_violation(
            r#"{"findings": [], "conditions": [], "regions": [],
                "rawMetrics": {"moisture_level": 140}}"#,
        );
    }

    #[test]
    fn type_errors_are_violations_not_coercions() {
        // Fractional score.
        assert_violation(
            r#"{"findings": [], "conditions": [],
                "regions": [{"region": "chin", "severity": "mild", "score": 65.5}]}"#,
        );
        // Fractional count.
        assert_violation(
            r#"{"findings": [], "conditions": [], "regions": [],
                "rawMetrics": {"spot_count": 2.6}}"#,
        );
        // Numeric count sent as text.
        assert_violation(
            r#"{"findings": [], "conditions": [], "regions": [],
                "rawMetrics": {"spot_count": "six"}}"#,
        );
        // Unknown severity literal.
        assert_violation(
            r#"{"findings": [], "conditions": [],
                "regions": [{"region": "chin", "severity": "critical", "score": 10}]}"#,
        );
        // Missing required array.
        assert_violation(r#"{"findings": [], "conditions": []}"#);
        assert_violation("I could not analyse this image.");
    }

    #[test]
    fn severity_must_match_score_band() {
        assert_violation(
            r#"{"findings": [], "conditions": [],
                "regions": [{"region": "chin", "severity": "normal", "score": 30}]}"#,
        );
    }

    #[test]
    fn unknown_image_type_is_a_violation() {
        assert_violation(
            r#"{"imageType": "infrared", "findings": [], "conditions": [], "regions": []}"#,
        );
    }

    #[test]
    fn prompt_names_schema_version_and_modality() {
        let prompt = extraction_prompt(&classification(ImageType::CrossPolarized, false));
        assert!(prompt.contains(SCHEMA_VERSION));
        assert!(prompt.contains("cross-polarized imaging"));
    }
}
