// src/models.rs
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ErrorKind;

/// Physical capture mode of a document page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageType {
    Standard,
    Uv,
    Polarized,
    CrossPolarized,
    ParallelPolarized,
    Enhanced,
    Other,
}

impl ImageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageType::Standard => "standard",
            ImageType::Uv => "uv",
            ImageType::Polarized => "polarized",
            ImageType::CrossPolarized => "cross-polarized",
            ImageType::ParallelPolarized => "parallel-polarized",
            ImageType::Enhanced => "enhanced",
            ImageType::Other => "other",
        }
    }

    pub fn is_uv(&self) -> bool {
        matches!(self, ImageType::Uv)
    }
}

/// Severity band. Declaration order is the ranking: `Severe` is the worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Mild,
    Moderate,
    Severe,
}

impl Severity {
    /// Canonical band for a 0-100 region score.
    pub fn for_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => Severity::Normal,
            60..=79 => Severity::Mild,
            40..=59 => Severity::Moderate,
            _ => Severity::Severe,
        }
    }

    pub fn rank(&self) -> u8 {
        *self as u8
    }

    /// Multiplier applied to a contribution's score during category aggregation.
    pub fn weight(&self) -> f64 {
        match self {
            Severity::Normal => 1.0,
            Severity::Mild => 0.85,
            Severity::Moderate => 0.6,
            Severity::Severe => 0.35,
        }
    }

    /// Score used for contributions that carry a severity but no measured score.
    pub fn representative_score(&self) -> u8 {
        match self {
            Severity::Normal => 90,
            Severity::Mild => 70,
            Severity::Moderate => 50,
            Severity::Severe => 25,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
        }
    }
}

/// The seven sub-metrics of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricCategory {
    Texture,
    Pores,
    Wrinkles,
    Pigmentation,
    Vascular,
    Hydration,
    Elasticity,
}

impl MetricCategory {
    pub const ALL: [MetricCategory; 7] = [
        MetricCategory::Texture,
        MetricCategory::Pores,
        MetricCategory::Wrinkles,
        MetricCategory::Pigmentation,
        MetricCategory::Vascular,
        MetricCategory::Hydration,
        MetricCategory::Elasticity,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MetricCategory::Texture => "texture",
            MetricCategory::Pores => "pores",
            MetricCategory::Wrinkles => "wrinkles",
            MetricCategory::Pigmentation => "pigmentation",
            MetricCategory::Vascular => "vascular",
            MetricCategory::Hydration => "hydration",
            MetricCategory::Elasticity => "elasticity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionDetection {
    pub condition: String,
    pub confidence: f64,
    /// Resolved during schema validation; never absent in the domain model.
    pub severity: Severity,
    pub locations: Vec<String>,
    pub description: String,
    pub suggested_treatments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionAnalysis {
    pub region: String,
    pub severity: Severity,
    pub score: u8,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            MetricValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetricValue::Text(s) => Some(s),
            MetricValue::Number(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Contribution {
    Low,
    Medium,
    High,
}

impl Contribution {
    /// Years added to the skin-age estimate.
    pub fn years(&self) -> u32 {
        match self {
            Contribution::Low => 1,
            Contribution::Medium => 2,
            Contribution::High => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgingFactor {
    pub factor: String,
    pub contribution: Contribution,
    pub description: String,
}

/// Validated extraction result for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageAnalysis {
    pub page_number: u32,
    pub image_type: ImageType,
    pub findings: Vec<String>,
    pub conditions: Vec<ConditionDetection>,
    pub regions: Vec<RegionAnalysis>,
    pub raw_metrics: BTreeMap<String, MetricValue>,
    pub aging_factors: Vec<AgingFactor>,
}

// ---------------------------------------------------------------------------
// Aggregated metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SurfaceGrade {
    Smooth,
    SlightlyUneven,
    Uneven,
    Rough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FirmnessGrade {
    Firm,
    Good,
    Reduced,
    Lax,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HydrationLevel {
    Optimal,
    Normal,
    Low,
    Dehydrated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PoreSize {
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WrinkleDepth {
    Fine,
    Moderate,
    Deep,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureMetrics {
    pub overall_score: u8,
    pub rough_areas: u32,
    pub scar_count: u32,
    pub grade: SurfaceGrade,
    pub affected_regions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoreSizeDistribution {
    pub small: u32,
    pub medium: u32,
    pub large: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoreMetrics {
    pub overall_score: u8,
    pub total_count: u32,
    pub size_distribution: PoreSizeDistribution,
    pub dominant_size: Option<PoreSize>,
    pub enlarged_regions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrinkleDepthClassification {
    pub fine: u32,
    pub moderate: u32,
    pub deep: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrinkleMetrics {
    pub overall_score: u8,
    pub total_count: u32,
    pub depth_classification: WrinkleDepthClassification,
    pub predominant_depth: Option<WrinkleDepth>,
    pub affected_regions: Vec<String>,
}

/// Spot counts split by modality. `hidden` only comes from UV pages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UvDamage {
    pub visible: u32,
    pub hidden: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PigmentationMetrics {
    pub overall_score: u8,
    pub spot_count: u32,
    pub uv_damage: UvDamage,
    pub melasma_detected: bool,
    pub affected_regions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VascularMetrics {
    pub overall_score: u8,
    pub redness_areas: u32,
    pub broken_capillaries: u32,
    pub rosacea_indicators: bool,
    pub affected_regions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydrationMetrics {
    pub overall_score: u8,
    pub dry_areas: u32,
    pub moisture_level: Option<f64>,
    pub level: HydrationLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElasticityMetrics {
    pub overall_score: u8,
    pub sagging_areas: u32,
    pub firmness: FirmnessGrade,
    pub affected_regions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedSkinMetrics {
    pub texture: TextureMetrics,
    pub pores: PoreMetrics,
    pub wrinkles: WrinkleMetrics,
    pub pigmentation: PigmentationMetrics,
    pub vascular: VascularMetrics,
    pub hydration: HydrationMetrics,
    pub elasticity: ElasticityMetrics,
}

impl DetailedSkinMetrics {
    pub fn score(&self, category: MetricCategory) -> u8 {
        match category {
            MetricCategory::Texture => self.texture.overall_score,
            MetricCategory::Pores => self.pores.overall_score,
            MetricCategory::Wrinkles => self.wrinkles.overall_score,
            MetricCategory::Pigmentation => self.pigmentation.overall_score,
            MetricCategory::Vascular => self.vascular.overall_score,
            MetricCategory::Hydration => self.hydration.overall_score,
            MetricCategory::Elasticity => self.elasticity.overall_score,
        }
    }
}

// ---------------------------------------------------------------------------
// Summary and age
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgeAnalysis {
    pub estimated_skin_age: u32,
    pub actual_age: Option<u32>,
    pub age_difference: i32,
    pub aging_factors: Vec<AgingFactor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

/// When a concern should be addressed. Declaration order is the ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConcernUrgency {
    Routine,
    Preventive,
    Soon,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Concern {
    pub name: String,
    pub category: Option<MetricCategory>,
    pub severity: Severity,
    pub urgency: ConcernUrgency,
    pub confidence: f64,
    pub pages: Vec<u32>,
    pub locations: Vec<String>,
    pub description: String,
    pub hidden_damage: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub overall_skin_health: u8,
    pub grade: Grade,
    pub primary_concerns: Vec<Concern>,
    pub concerns: Vec<Concern>,
    pub strengths: Vec<MetricCategory>,
    pub weaknesses: Vec<MetricCategory>,
}

// ---------------------------------------------------------------------------
// Treatment plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreatmentCategory {
    Laser,
    Injectable,
    Device,
    Topical,
    Combination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Optional,
    Recommended,
    Essential,
}

impl Priority {
    pub fn for_severity(severity: Severity) -> Self {
        match severity {
            Severity::Severe => Priority::Essential,
            Severity::Moderate => Priority::Recommended,
            Severity::Mild | Severity::Normal => Priority::Optional,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UrgencyBucket {
    Immediate,
    ShortTerm,
    LongTerm,
    Maintenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostRange {
    pub min: u32,
    pub max: u32,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreatmentRecommendation {
    pub treatment_id: String,
    pub name: String,
    pub category: TreatmentCategory,
    pub priority: Priority,
    pub confidence: f64,
    pub targeted_conditions: Vec<String>,
    pub sessions: u32,
    pub interval: String,
    pub estimated_cost: CostRange,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreatmentPlan {
    pub immediate: Vec<TreatmentRecommendation>,
    pub short_term: Vec<TreatmentRecommendation>,
    pub long_term: Vec<TreatmentRecommendation>,
    pub maintenance: Vec<TreatmentRecommendation>,
    pub total_estimated_investment: CostRange,
}

impl TreatmentPlan {
    pub fn recommendations(&self) -> impl Iterator<Item = &TreatmentRecommendation> {
        self.immediate
            .iter()
            .chain(&self.short_term)
            .chain(&self.long_term)
            .chain(&self.maintenance)
    }
}

// ---------------------------------------------------------------------------
// Insights and the root report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HiddenDamageInsight {
    pub visible: u32,
    pub hidden: u32,
    pub ratio: f64,
    pub display_ratio: f64,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AIInsights {
    pub skin_type: Option<String>,
    pub modalities_analyzed: Vec<ImageType>,
    pub key_findings: Vec<String>,
    pub hidden_damage: HiddenDamageInsight,
    pub analysis_confidence: f64,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedPage {
    pub page_number: u32,
    pub kind: ErrorKind,
    pub message: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageWarning {
    pub page_number: u32,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub document_name: String,
    pub fingerprint: String,
    pub schema_version: String,
    pub page_count: u32,
    pub complete: bool,
    pub deadline_exceeded: bool,
    pub processing_time_ms: u64,
    pub pages: Vec<PageAnalysis>,
    pub skipped_pages: Vec<SkippedPage>,
    pub warnings: Vec<PageWarning>,
    pub metrics: DetailedSkinMetrics,
    pub age_analysis: AgeAnalysis,
    pub summary: Summary,
    pub treatment_plan: TreatmentPlan,
    pub ai_insights: AIInsights,
}
