// src/analysis/aggregator.rs
//! Fold per-page analyses into one `DetailedSkinMetrics`.
//!
//! Category score: every contribution (a region score, or a condition's
//! representative score) is multiplied by its severity weight
//! (normal 1.0, mild 0.85, moderate 0.6, severe 0.35) and the results are
//! averaged, rounded and clamped to 0-100. A category with no contributions
//! scores `NEUTRAL_SCORE`.
//!
//! Counts are summed across pages because pages usually cover disjoint
//! facial zones. Pages are always visited in page-number order.

use std::collections::BTreeSet;

use crate::analysis::categories::{categorize, metric_keys};
use crate::models::{
    ConditionDetection, DetailedSkinMetrics, ElasticityMetrics, FirmnessGrade, HydrationLevel,
    HydrationMetrics, MetricCategory, PageAnalysis, PigmentationMetrics, PoreMetrics, PoreSize,
    PoreSizeDistribution, Severity, SurfaceGrade, TextureMetrics, UvDamage, VascularMetrics,
    WrinkleDepth, WrinkleDepthClassification, WrinkleMetrics,
};

/// Conditions below this confidence are ignored downstream. Inclusive: 0.5 is kept.
pub const MIN_CONDITION_CONFIDENCE: f64 = 0.5;

/// Score for a category nothing contributed to.
pub const NEUTRAL_SCORE: u8 = 50;

pub fn is_included(condition: &ConditionDetection) -> bool {
    condition.confidence >= MIN_CONDITION_CONFIDENCE
}

/// Included conditions of a page, in the order the page reported them.
pub fn included_conditions(page: &PageAnalysis) -> impl Iterator<Item = &ConditionDetection> {
    page.conditions.iter().filter(|c| is_included(c))
}

/// Pages sorted by page number without cloning them.
pub fn ordered_pages(pages: &[PageAnalysis]) -> Vec<&PageAnalysis> {
    let mut ordered: Vec<&PageAnalysis> = pages.iter().collect();
    ordered.sort_by_key(|p| p.page_number);
    ordered
}

/// Severity-weighted mean of `(score, severity)` contributions.
pub fn weighted_score(contributions: &[(u8, Severity)]) -> u8 {
    if contributions.is_empty() {
        return NEUTRAL_SCORE;
    }
    let total: f64 = contributions
        .iter()
        .map(|(score, severity)| f64::from(*score) * severity.weight())
        .sum();
    let mean = total / contributions.len() as f64;
    mean.round().clamp(0.0, 100.0) as u8
}

#[derive(Default)]
struct CategoryAccumulator {
    contributions: Vec<(u8, Severity)>,
    affected: BTreeSet<String>,
}

impl CategoryAccumulator {
    fn score(&self) -> u8 {
        weighted_score(&self.contributions)
    }

    fn affected_regions(&self) -> Vec<String> {
        self.affected.iter().cloned().collect()
    }
}

struct Accumulators([CategoryAccumulator; 7]);

impl Accumulators {
    fn new() -> Self {
        Self(std::array::from_fn(|_| CategoryAccumulator::default()))
    }

    fn get(&self, category: MetricCategory) -> &CategoryAccumulator {
        &self.0[category as usize]
    }

    fn get_mut(&mut self, category: MetricCategory) -> &mut CategoryAccumulator {
        &mut self.0[category as usize]
    }
}

fn metric_count(page: &PageAnalysis, key: &str) -> Option<u32> {
    page.raw_metrics
        .get(key)?
        .as_number()
        .map(|n| n.round().clamp(0.0, f64::from(u32::MAX)) as u32)
}

fn has_any_metric(page: &PageAnalysis, keys: &[&str]) -> bool {
    keys.iter().any(|k| metric_count(page, k).is_some())
}

fn sum_metric(pages: &[&PageAnalysis], key: &str) -> u32 {
    pages
        .iter()
        .filter_map(|p| metric_count(p, key))
        .fold(0u32, |acc, n| acc.saturating_add(n))
}

/// Included conditions of a page that map to `category`.
fn category_conditions<'a>(
    page: &'a PageAnalysis,
    category: MetricCategory,
) -> impl Iterator<Item = &'a ConditionDetection> + 'a {
    included_conditions(page).filter(move |c| categorize(&c.condition) == Some(category))
}

/// Metric sum across pages, falling back to one count per matching condition
/// on pages that did not report the metric.
fn count_with_fallback(pages: &[&PageAnalysis], key: &str, category: MetricCategory) -> u32 {
    pages
        .iter()
        .map(|page| {
            metric_count(page, key)
                .unwrap_or_else(|| category_conditions(page, category).count() as u32)
        })
        .fold(0u32, |acc, n| acc.saturating_add(n))
}

fn band_grade<T: Copy>(score: u8, grades: [T; 4]) -> T {
    match Severity::for_score(score) {
        Severity::Normal => grades[0],
        Severity::Mild => grades[1],
        Severity::Moderate => grades[2],
        Severity::Severe => grades[3],
    }
}

pub fn aggregate(pages: &[PageAnalysis]) -> DetailedSkinMetrics {
    let pages = ordered_pages(pages);
    let mut acc = Accumulators::new();

    for page in &pages {
        for region in &page.regions {
            let text = format!("{} {}", region.region, region.recommendations.join(" "));
            if let Some(category) = categorize(&region.region).or_else(|| categorize(&text)) {
                let slot = acc.get_mut(category);
                slot.contributions.push((region.score, region.severity));
                if region.severity > Severity::Normal {
                    slot.affected.insert(region.region.clone());
                }
            }
        }

        for condition in included_conditions(page) {
            if let Some(category) = categorize(&condition.condition) {
                let slot = acc.get_mut(category);
                slot.contributions
                    .push((condition.severity.representative_score(), condition.severity));
                slot.affected.extend(
                    condition
                        .locations
                        .iter()
                        .filter(|l| !l.is_empty())
                        .cloned(),
                );
            }
        }
    }

    DetailedSkinMetrics {
        texture: texture_metrics(&pages, acc.get(MetricCategory::Texture)),
        pores: pore_metrics(&pages, acc.get(MetricCategory::Pores)),
        wrinkles: wrinkle_metrics(&pages, acc.get(MetricCategory::Wrinkles)),
        pigmentation: pigmentation_metrics(&pages, acc.get(MetricCategory::Pigmentation)),
        vascular: vascular_metrics(&pages, acc.get(MetricCategory::Vascular)),
        hydration: hydration_metrics(&pages, acc.get(MetricCategory::Hydration)),
        elasticity: elasticity_metrics(&pages, acc.get(MetricCategory::Elasticity)),
    }
}

fn texture_metrics(pages: &[&PageAnalysis], acc: &CategoryAccumulator) -> TextureMetrics {
    let overall_score = acc.score();
    TextureMetrics {
        overall_score,
        rough_areas: count_with_fallback(pages, metric_keys::ROUGH_AREAS, MetricCategory::Texture),
        scar_count: sum_metric(pages, metric_keys::SCAR_COUNT),
        grade: band_grade(
            overall_score,
            [
                SurfaceGrade::Smooth,
                SurfaceGrade::SlightlyUneven,
                SurfaceGrade::Uneven,
                SurfaceGrade::Rough,
            ],
        ),
        affected_regions: acc.affected_regions(),
    }
}

fn pore_metrics(pages: &[&PageAnalysis], acc: &CategoryAccumulator) -> PoreMetrics {
    let keys = [
        metric_keys::PORE_SMALL,
        metric_keys::PORE_MEDIUM,
        metric_keys::PORE_LARGE,
    ];
    let mut dist = PoreSizeDistribution::default();

    for page in pages {
        if has_any_metric(page, &keys) {
            dist.small = dist.small.saturating_add(metric_count(page, keys[0]).unwrap_or(0));
            dist.medium = dist.medium.saturating_add(metric_count(page, keys[1]).unwrap_or(0));
            dist.large = dist.large.saturating_add(metric_count(page, keys[2]).unwrap_or(0));
            continue;
        }
        for condition in category_conditions(page, MetricCategory::Pores) {
            let slot = match condition.severity {
                Severity::Normal | Severity::Mild => &mut dist.small,
                Severity::Moderate => &mut dist.medium,
                Severity::Severe => &mut dist.large,
            };
            *slot = slot.saturating_add(1);
        }
    }

    let total_count = dist.small.saturating_add(dist.medium).saturating_add(dist.large);
    let dominant_size = if total_count == 0 {
        None
    } else if dist.large >= dist.medium && dist.large >= dist.small {
        Some(PoreSize::Large)
    } else if dist.medium >= dist.small {
        Some(PoreSize::Medium)
    } else {
        Some(PoreSize::Small)
    };

    PoreMetrics {
        overall_score: acc.score(),
        total_count,
        size_distribution: dist,
        dominant_size,
        enlarged_regions: acc.affected_regions(),
    }
}

fn wrinkle_metrics(pages: &[&PageAnalysis], acc: &CategoryAccumulator) -> WrinkleMetrics {
    let keys = [
        metric_keys::WRINKLE_FINE,
        metric_keys::WRINKLE_MODERATE,
        metric_keys::WRINKLE_DEEP,
    ];
    let mut depth = WrinkleDepthClassification::default();

    for page in pages {
        if has_any_metric(page, &keys) {
            depth.fine = depth.fine.saturating_add(metric_count(page, keys[0]).unwrap_or(0));
            depth.moderate = depth
                .moderate
                .saturating_add(metric_count(page, keys[1]).unwrap_or(0));
            depth.deep = depth.deep.saturating_add(metric_count(page, keys[2]).unwrap_or(0));
            continue;
        }
        for condition in category_conditions(page, MetricCategory::Wrinkles) {
            let slot = match condition.severity {
                Severity::Normal | Severity::Mild => &mut depth.fine,
                Severity::Moderate => &mut depth.moderate,
                Severity::Severe => &mut depth.deep,
            };
            *slot = slot.saturating_add(1);
        }
    }

    let total_count = depth.fine.saturating_add(depth.moderate).saturating_add(depth.deep);
    let predominant_depth = if total_count == 0 {
        None
    } else if depth.deep >= depth.moderate && depth.deep >= depth.fine {
        Some(WrinkleDepth::Deep)
    } else if depth.moderate >= depth.fine {
        Some(WrinkleDepth::Moderate)
    } else {
        Some(WrinkleDepth::Fine)
    };

    WrinkleMetrics {
        overall_score: acc.score(),
        total_count,
        depth_classification: depth,
        predominant_depth,
        affected_regions: acc.affected_regions(),
    }
}

/// Visible findings come from every non-UV page; hidden ones only from UV pages.
fn pigmentation_metrics(pages: &[&PageAnalysis], acc: &CategoryAccumulator) -> PigmentationMetrics {
    let mut uv_damage = UvDamage::default();

    for page in pages {
        let spots = metric_count(page, metric_keys::SPOT_COUNT).unwrap_or_else(|| {
            category_conditions(page, MetricCategory::Pigmentation).count() as u32
        });
        if page.image_type.is_uv() {
            uv_damage.hidden = uv_damage.hidden.saturating_add(spots);
        } else {
            uv_damage.visible = uv_damage.visible.saturating_add(spots);
        }
    }

    let melasma_detected = pages.iter().any(|page| {
        included_conditions(page).any(|c| c.condition.to_lowercase().contains("melasma"))
    });

    PigmentationMetrics {
        overall_score: acc.score(),
        spot_count: uv_damage.visible.saturating_add(uv_damage.hidden),
        uv_damage,
        melasma_detected,
        affected_regions: acc.affected_regions(),
    }
}

fn vascular_metrics(pages: &[&PageAnalysis], acc: &CategoryAccumulator) -> VascularMetrics {
    let rosacea_indicators = pages.iter().any(|page| {
        included_conditions(page).any(|c| c.condition.to_lowercase().contains("rosacea"))
    });

    VascularMetrics {
        overall_score: acc.score(),
        redness_areas: count_with_fallback(
            pages,
            metric_keys::REDNESS_AREAS,
            MetricCategory::Vascular,
        ),
        broken_capillaries: sum_metric(pages, metric_keys::BROKEN_CAPILLARIES),
        rosacea_indicators,
        affected_regions: acc.affected_regions(),
    }
}

fn hydration_metrics(pages: &[&PageAnalysis], acc: &CategoryAccumulator) -> HydrationMetrics {
    let overall_score = acc.score();
    let readings: Vec<f64> = pages
        .iter()
        .filter_map(|p| p.raw_metrics.get(metric_keys::MOISTURE_LEVEL)?.as_number())
        .filter(|v| v.is_finite())
        .collect();

    let moisture_level = if readings.is_empty() {
        None
    } else {
        Some(readings.iter().sum::<f64>() / readings.len() as f64)
    };

    let level = match moisture_level {
        Some(m) if m >= 70.0 => HydrationLevel::Optimal,
        Some(m) if m >= 50.0 => HydrationLevel::Normal,
        Some(m) if m >= 30.0 => HydrationLevel::Low,
        Some(_) => HydrationLevel::Dehydrated,
        None => band_grade(
            overall_score,
            [
                HydrationLevel::Optimal,
                HydrationLevel::Normal,
                HydrationLevel::Low,
                HydrationLevel::Dehydrated,
            ],
        ),
    };

    HydrationMetrics {
        overall_score,
        dry_areas: count_with_fallback(pages, metric_keys::DRY_AREAS, MetricCategory::Hydration),
        moisture_level,
        level,
    }
}

fn elasticity_metrics(pages: &[&PageAnalysis], acc: &CategoryAccumulator) -> ElasticityMetrics {
    let overall_score = acc.score();
    ElasticityMetrics {
        overall_score,
        sagging_areas: count_with_fallback(
            pages,
            metric_keys::SAGGING_AREAS,
            MetricCategory::Elasticity,
        ),
        firmness: band_grade(
            overall_score,
            [
                FirmnessGrade::Firm,
                FirmnessGrade::Good,
                FirmnessGrade::Reduced,
                FirmnessGrade::Lax,
            ],
        ),
        affected_regions: acc.affected_regions(),
    }
}
