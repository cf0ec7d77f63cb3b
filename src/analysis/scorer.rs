// src/analysis/scorer.rs
//! Overall health score, grade, ranked concerns and skin-age estimate.

use std::collections::HashMap;

use crate::analysis::aggregator::{included_conditions, ordered_pages};
use crate::analysis::categories::{categorize, metric_keys};
use crate::analysis::ratio::hidden_to_visible_ratio;
use crate::models::{
    AgeAnalysis, AgingFactor, Concern, ConcernUrgency, DetailedSkinMetrics, Grade,
    MetricCategory, PageAnalysis, Severity, Summary,
};

/// Weight of each category in the overall score. Equal weighting.
pub const CATEGORY_WEIGHTS: [(MetricCategory, f64); 7] = [
    (MetricCategory::Texture, 1.0 / 7.0),
    (MetricCategory::Pores, 1.0 / 7.0),
    (MetricCategory::Wrinkles, 1.0 / 7.0),
    (MetricCategory::Pigmentation, 1.0 / 7.0),
    (MetricCategory::Vascular, 1.0 / 7.0),
    (MetricCategory::Hydration, 1.0 / 7.0),
    (MetricCategory::Elasticity, 1.0 / 7.0),
];

pub const PRIMARY_CONCERN_LIMIT: usize = 3;
pub const STRENGTH_THRESHOLD: u8 = 80;
pub const WEAKNESS_THRESHOLD: u8 = 60;

/// Base age when neither the patient's age nor a visual estimate is known.
pub const DEFAULT_BASE_AGE: u32 = 35;

pub const HIDDEN_DAMAGE_CONCERN: &str = "Hidden UV damage";

pub fn overall_skin_health(metrics: &DetailedSkinMetrics) -> u8 {
    let (weighted, total_weight) = CATEGORY_WEIGHTS.iter().fold(
        (0.0, 0.0),
        |(sum, weights), (category, weight)| {
            (sum + f64::from(metrics.score(*category)) * weight, weights + weight)
        },
    );
    if total_weight <= 0.0 {
        return 0;
    }
    (weighted / total_weight).round().clamp(0.0, 100.0) as u8
}

/// A >= 90, B >= 80, C >= 60, D >= 40, F below.
pub fn grade_for(score: u8) -> Grade {
    match score {
        90..=u8::MAX => Grade::A,
        80..=89 => Grade::B,
        60..=79 => Grade::C,
        40..=59 => Grade::D,
        _ => Grade::F,
    }
}

fn urgency_for(severity: Severity) -> ConcernUrgency {
    match severity {
        Severity::Severe => ConcernUrgency::Urgent,
        Severity::Moderate => ConcernUrgency::Soon,
        Severity::Mild | Severity::Normal => ConcernUrgency::Routine,
    }
}

fn push_unique(target: &mut Vec<String>, values: &[String]) {
    for value in values {
        if !value.is_empty() && !target.contains(value) {
            target.push(value.clone());
        }
    }
}

/// All concerns, ranked by severity then urgency (both descending).
/// Ties keep first-seen order: page number, then position on the page.
pub fn rank_concerns(pages: &[PageAnalysis], metrics: &DetailedSkinMetrics) -> Vec<Concern> {
    let pages = ordered_pages(pages);
    let mut concerns: Vec<Concern> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for page in &pages {
        for condition in included_conditions(page) {
            let key = condition.condition.trim().to_lowercase();
            match index.get(&key) {
                Some(&i) => {
                    let concern = &mut concerns[i];
                    concern.severity = concern.severity.max(condition.severity);
                    concern.urgency = urgency_for(concern.severity);
                    concern.confidence = concern.confidence.max(condition.confidence);
                    if !concern.pages.contains(&page.page_number) {
                        concern.pages.push(page.page_number);
                    }
                    push_unique(&mut concern.locations, &condition.locations);
                }
                None => {
                    index.insert(key, concerns.len());
                    let mut locations = Vec::new();
                    push_unique(&mut locations, &condition.locations);
                    concerns.push(Concern {
                        name: condition.condition.clone(),
                        category: categorize(&condition.condition),
                        severity: condition.severity,
                        urgency: urgency_for(condition.severity),
                        confidence: condition.confidence,
                        pages: vec![page.page_number],
                        locations,
                        description: condition.description.clone(),
                        hidden_damage: false,
                    });
                }
            }
        }
    }

    if let Some(hidden) = hidden_damage_concern(&pages, metrics) {
        concerns.push(hidden);
    }

    concerns.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| b.urgency.cmp(&a.urgency))
    });
    concerns
}

/// Raised when UV pages show pigmentation that standard light does not,
/// backed by at least one included pigmentation condition on a UV page.
fn hidden_damage_concern(
    pages: &[&PageAnalysis],
    metrics: &DetailedSkinMetrics,
) -> Option<Concern> {
    let damage = &metrics.pigmentation.uv_damage;
    if damage.hidden == 0 {
        return None;
    }

    let mut confidence: Option<f64> = None;
    let mut source_pages = Vec::new();
    let mut locations = Vec::new();
    for page in pages.iter().filter(|p| p.image_type.is_uv()) {
        for condition in included_conditions(page)
            .filter(|c| categorize(&c.condition) == Some(MetricCategory::Pigmentation))
        {
            confidence = Some(confidence.map_or(condition.confidence, |c| c.max(condition.confidence)));
            if !source_pages.contains(&page.page_number) {
                source_pages.push(page.page_number);
            }
            push_unique(&mut locations, &condition.locations);
        }
    }

    let ratio = hidden_to_visible_ratio(damage.hidden, damage.visible);
    let severity = if ratio >= 2.0 {
        Severity::Moderate
    } else {
        Severity::Mild
    };

    Some(Concern {
        name: HIDDEN_DAMAGE_CONCERN.to_string(),
        category: Some(MetricCategory::Pigmentation),
        severity,
        urgency: ConcernUrgency::Preventive,
        confidence: confidence?,
        pages: source_pages,
        locations,
        description: format!(
            "{} pigmentation findings visible only under UV against {} in standard light",
            damage.hidden, damage.visible
        ),
        hidden_damage: true,
    })
}

pub fn summarize(pages: &[PageAnalysis], metrics: &DetailedSkinMetrics) -> Summary {
    let overall_skin_health = overall_skin_health(metrics);
    let concerns = rank_concerns(pages, metrics);
    let primary_concerns = concerns
        .iter()
        .take(PRIMARY_CONCERN_LIMIT)
        .cloned()
        .collect();

    let strengths = MetricCategory::ALL
        .into_iter()
        .filter(|c| metrics.score(*c) >= STRENGTH_THRESHOLD)
        .collect();

    let mut weaknesses: Vec<MetricCategory> = MetricCategory::ALL
        .into_iter()
        .filter(|c| metrics.score(*c) < WEAKNESS_THRESHOLD)
        .collect();
    weaknesses.sort_by_key(|c| metrics.score(*c));

    Summary {
        overall_skin_health,
        grade: grade_for(overall_skin_health),
        primary_concerns,
        concerns,
        strengths,
        weaknesses,
    }
}

/// Skin age = base age plus the years attributed to each distinct aging factor.
/// Base is the actual age when known, else the mean visual estimate, else 35.
pub fn analyze_age(pages: &[PageAnalysis], actual_age: Option<u32>) -> AgeAnalysis {
    let pages = ordered_pages(pages);

    let mut factors: Vec<AgingFactor> = Vec::new();
    for factor in pages.iter().flat_map(|p| &p.aging_factors) {
        let key = factor.factor.to_lowercase();
        match factors.iter_mut().find(|f| f.factor.to_lowercase() == key) {
            Some(existing) if factor.contribution > existing.contribution => {
                *existing = factor.clone();
            }
            Some(_) => {}
            None => factors.push(factor.clone()),
        }
    }

    let estimates: Vec<f64> = pages
        .iter()
        .filter_map(|p| p.raw_metrics.get(metric_keys::ESTIMATED_AGE)?.as_number())
        .filter(|v| v.is_finite())
        .collect();

    let base = match actual_age {
        Some(age) => age,
        None if !estimates.is_empty() => {
            (estimates.iter().sum::<f64>() / estimates.len() as f64).round() as u32
        }
        None => DEFAULT_BASE_AGE,
    };

    let added: u32 = factors.iter().map(|f| f.contribution.years()).sum();
    let estimated_skin_age = base.saturating_add(added).max(1);

    let age_difference = match actual_age {
        Some(age) => estimated_skin_age as i32 - age as i32,
        None => 0,
    };

    AgeAnalysis {
        estimated_skin_age,
        actual_age,
        age_difference,
        aging_factors: factors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregator::aggregate;
    use crate::analysis::aggregator::tests::{condition, page, region};
    use crate::models::{Contribution, ImageType};

    #[test]
    fn grade_mapping_is_monotonic() {
        let mut previous = grade_for(0);
        for score in 1..=100u8 {
            let grade = grade_for(score);
            assert!(grade <= previous, "score {score} received a worse grade");
            previous = grade;
        }
        assert_eq!(grade_for(90), Grade::A);
        assert_eq!(grade_for(89), Grade::B);
        assert_eq!(grade_for(60), Grade::C);
        assert_eq!(grade_for(40), Grade::D);
        assert_eq!(grade_for(39), Grade::F);
    }

    #[test]
    fn weights_are_equal_and_sum_to_one() {
        let total: f64 = CATEGORY_WEIGHTS.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(CATEGORY_WEIGHTS.iter().all(|(_, w)| (*w - 1.0 / 7.0).abs() < 1e-12));
    }

    #[test]
    fn neutral_metrics_score_fifty() {
        let metrics = aggregate(&[]);
        assert_eq!(overall_skin_health(&metrics), 50);
        assert_eq!(grade_for(overall_skin_health(&metrics)), Grade::D);
    }

    #[test]
    fn concerns_rank_by_severity_then_urgency_with_stable_ties() {
        let pages = vec![
            page(
                2,
                ImageType::Standard,
                vec![
                    condition("Fine lines", 0.8, Severity::Mild),
                    condition("Rosacea", 0.9, Severity::Severe),
                ],
                vec![],
                &[],
            ),
            page(
                1,
                ImageType::Standard,
                vec![
                    condition("Enlarged pores", 0.7, Severity::Moderate),
                    condition("Dryness", 0.7, Severity::Mild),
                ],
                vec![],
                &[],
            ),
        ];
        let metrics = aggregate(&pages);
        let concerns = rank_concerns(&pages, &metrics);
        let names: Vec<&str> = concerns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Rosacea", "Enlarged pores", "Dryness", "Fine lines"]);
        assert_eq!(concerns[0].urgency, ConcernUrgency::Urgent);

        let summary = summarize(&pages, &metrics);
        assert_eq!(summary.primary_concerns.len(), PRIMARY_CONCERN_LIMIT);
        assert_eq!(summary.primary_concerns[0].name, "Rosacea");
    }

    #[test]
    fn repeated_conditions_merge_into_one_concern() {
        let pages = vec![
            page(1, ImageType::Standard, vec![condition("Melasma", 0.6, Severity::Mild)], vec![], &[]),
            page(3, ImageType::Polarized, vec![condition("melasma ", 0.9, Severity::Moderate)], vec![], &[]),
        ];
        let metrics = aggregate(&pages);
        let concerns = rank_concerns(&pages, &metrics);
        assert_eq!(concerns.len(), 1);
        assert_eq!(concerns[0].name, "Melasma");
        assert_eq!(concerns[0].severity, Severity::Moderate);
        assert_eq!(concerns[0].urgency, ConcernUrgency::Soon);
        assert_eq!(concerns[0].confidence, 0.9);
        assert_eq!(concerns[0].pages, vec![1, 3]);
    }

    #[test]
    fn hidden_uv_damage_is_a_preventive_concern() {
        let pages = vec![
            page(1, ImageType::Standard, vec![condition("Sun spots", 0.8, Severity::Mild)], vec![], &[]),
            page(
                2,
                ImageType::Uv,
                vec![condition("Hyperpigmentation", 0.75, Severity::Mild)],
                vec![],
                &[("spot_count", 4.0)],
            ),
        ];
        let metrics = aggregate(&pages);
        let concerns = rank_concerns(&pages, &metrics);
        let hidden = concerns.iter().find(|c| c.hidden_damage).unwrap();
        assert_eq!(hidden.name, HIDDEN_DAMAGE_CONCERN);
        assert_eq!(hidden.urgency, ConcernUrgency::Preventive);
        assert_eq!(hidden.severity, Severity::Moderate);
        assert_eq!(hidden.confidence, 0.75);
        assert_eq!(hidden.pages, vec![2]);
    }

    #[test]
    fn strengths_and_weaknesses_follow_thresholds() {
        let pages = vec![page(
            1,
            ImageType::Standard,
            vec![],
            vec![region("forehead wrinkles", 95), region("cheek redness", 20)],
            &[],
        )];
        let metrics = aggregate(&pages);
        let summary = summarize(&pages, &metrics);
        assert_eq!(summary.strengths, vec![MetricCategory::Wrinkles]);
        assert_eq!(summary.weaknesses[0], MetricCategory::Vascular);
        assert!(summary.weaknesses.len() > 1);
    }

    #[test]
    fn age_difference_defaults_to_zero_without_actual_age() {
        let mut p = page(1, ImageType::Standard, vec![], vec![], &[("estimated_age", 41.0)]);
        p.aging_factors = vec![
            AgingFactor {
                factor: "Sun exposure".into(),
                contribution: Contribution::Medium,
                description: String::new(),
            },
            AgingFactor {
                factor: "sun exposure".into(),
                contribution: Contribution::High,
                description: String::new(),
            },
            AgingFactor {
                factor: "Smoking".into(),
                contribution: Contribution::Low,
                description: String::new(),
            },
        ];

        let unknown = analyze_age(std::slice::from_ref(&p), None);
        assert_eq!(unknown.estimated_skin_age, 41 + 4 + 1);
        assert_eq!(unknown.age_difference, 0);
        assert_eq!(unknown.aging_factors.len(), 2);
        assert_eq!(unknown.aging_factors[0].contribution, Contribution::High);

        let known = analyze_age(&[p], Some(38));
        assert_eq!(known.estimated_skin_age, 38 + 5);
        assert_eq!(known.age_difference, 5);
    }

    #[test]
    fn age_without_any_signal_uses_default_base() {
        let analysis = analyze_age(&[], None);
        assert_eq!(analysis.estimated_skin_age, DEFAULT_BASE_AGE);
        assert_eq!(analysis.actual_age, None);
    }
}
