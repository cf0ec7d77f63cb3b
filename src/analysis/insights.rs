// src/analysis/insights.rs
//! Narrative-free digest of the analysed pages.

use crate::analysis::aggregator::{included_conditions, ordered_pages};
use crate::analysis::categories::metric_keys;
use crate::analysis::ratio::{display_ratio, hidden_to_visible_ratio};
use crate::models::{AIInsights, DetailedSkinMetrics, HiddenDamageInsight, ImageType, PageAnalysis};

pub const MAX_KEY_FINDINGS: usize = 10;
pub const MAX_RECOMMENDATIONS: usize = 10;

fn push_distinct(target: &mut Vec<String>, value: &str, limit: usize) {
    let value = value.trim();
    if value.is_empty() || target.len() >= limit {
        return;
    }
    if !target.iter().any(|v| v.eq_ignore_ascii_case(value)) {
        target.push(value.to_string());
    }
}

pub fn hidden_damage(metrics: &DetailedSkinMetrics) -> HiddenDamageInsight {
    let damage = &metrics.pigmentation.uv_damage;
    let ratio = hidden_to_visible_ratio(damage.hidden, damage.visible);
    let note = if damage.hidden == 0 {
        "No pigmentation visible only under UV".to_string()
    } else if ratio >= 2.0 {
        format!(
            "UV imaging reveals {:.1}x the pigmentation visible in standard light",
            display_ratio(ratio)
        )
    } else {
        "Some pigmentation is visible only under UV".to_string()
    };

    HiddenDamageInsight {
        visible: damage.visible,
        hidden: damage.hidden,
        ratio,
        display_ratio: display_ratio(ratio),
        note,
    }
}

pub fn build(pages: &[PageAnalysis], metrics: &DetailedSkinMetrics) -> AIInsights {
    let pages = ordered_pages(pages);

    let skin_type = pages
        .iter()
        .find_map(|p| p.raw_metrics.get(metric_keys::SKIN_TYPE)?.as_text())
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    let mut modalities_analyzed: Vec<ImageType> = Vec::new();
    for page in &pages {
        if !modalities_analyzed.contains(&page.image_type) {
            modalities_analyzed.push(page.image_type);
        }
    }

    let mut key_findings = Vec::new();
    for finding in pages.iter().flat_map(|p| &p.findings) {
        push_distinct(&mut key_findings, finding, MAX_KEY_FINDINGS);
    }

    let confidences: Vec<f64> = pages
        .iter()
        .flat_map(|p| included_conditions(p))
        .map(|c| c.confidence)
        .collect();
    let analysis_confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };

    let mut recommendations = Vec::new();
    for page in &pages {
        for region in &page.regions {
            for rec in &region.recommendations {
                push_distinct(&mut recommendations, rec, MAX_RECOMMENDATIONS);
            }
        }
        for condition in included_conditions(page) {
            for rec in &condition.suggested_treatments {
                push_distinct(&mut recommendations, rec, MAX_RECOMMENDATIONS);
            }
        }
    }

    AIInsights {
        skin_type,
        modalities_analyzed,
        key_findings,
        hidden_damage: hidden_damage(metrics),
        analysis_confidence,
        recommendations,
    }
}
