// src/analysis/catalog.rs
//! Static treatment reference data. Costs are full-course USD ranges.

use crate::models::{MetricCategory, Severity, TreatmentCategory};

pub const CURRENCY: &str = "USD";

#[derive(Debug, Clone, Copy)]
pub struct CatalogTreatment {
    pub id: &'static str,
    pub name: &'static str,
    pub category: TreatmentCategory,
    pub targets: &'static [MetricCategory],
    /// Least severe concern the treatment is offered for.
    pub min_severity: Severity,
    pub sessions: u32,
    pub interval: &'static str,
    pub cost_min: u32,
    pub cost_max: u32,
    /// Addresses volume or firmness; optional picks go to the long-term bucket.
    pub structural: bool,
    /// Offered only for damage that is not visible yet.
    pub preventive: bool,
}

use MetricCategory::*;

pub const CATALOG: &[CatalogTreatment] = &[
    CatalogTreatment {
        id: "picosecond-laser",
        name: "Picosecond laser toning",
        category: TreatmentCategory::Laser,
        targets: &[Pigmentation],
        min_severity: Severity::Moderate,
        sessions: 3,
        interval: "4-6 weeks",
        cost_min: 1500,
        cost_max: 3600,
        structural: false,
        preventive: false,
    },
    CatalogTreatment {
        id: "ipl-photofacial",
        name: "IPL photofacial",
        category: TreatmentCategory::Device,
        targets: &[Pigmentation, Vascular],
        min_severity: Severity::Mild,
        sessions: 3,
        interval: "4 weeks",
        cost_min: 900,
        cost_max: 1800,
        structural: false,
        preventive: false,
    },
    CatalogTreatment {
        id: "brightening-serum",
        name: "Tranexamic acid and vitamin C serum",
        category: TreatmentCategory::Topical,
        targets: &[Pigmentation],
        min_severity: Severity::Mild,
        sessions: 1,
        interval: "daily",
        cost_min: 60,
        cost_max: 150,
        structural: false,
        preventive: false,
    },
    CatalogTreatment {
        id: "broad-spectrum-spf",
        name: "Daily broad-spectrum SPF 50",
        category: TreatmentCategory::Topical,
        targets: &[Pigmentation],
        min_severity: Severity::Mild,
        sessions: 1,
        interval: "daily",
        cost_min: 20,
        cost_max: 60,
        structural: false,
        preventive: true,
    },
    CatalogTreatment {
        id: "antioxidant-serum",
        name: "Antioxidant serum",
        category: TreatmentCategory::Topical,
        targets: &[Pigmentation],
        min_severity: Severity::Mild,
        sessions: 1,
        interval: "daily",
        cost_min: 40,
        cost_max: 120,
        structural: false,
        preventive: true,
    },
    CatalogTreatment {
        id: "pulsed-dye-laser",
        name: "Pulsed dye vascular laser",
        category: TreatmentCategory::Laser,
        targets: &[Vascular],
        min_severity: Severity::Moderate,
        sessions: 3,
        interval: "4 weeks",
        cost_min: 1200,
        cost_max: 2400,
        structural: false,
        preventive: false,
    },
    CatalogTreatment {
        id: "azelaic-acid",
        name: "Azelaic acid cream",
        category: TreatmentCategory::Topical,
        targets: &[Vascular, Pigmentation],
        min_severity: Severity::Mild,
        sessions: 1,
        interval: "twice daily",
        cost_min: 30,
        cost_max: 80,
        structural: false,
        preventive: false,
    },
    CatalogTreatment {
        id: "chemical-peel",
        name: "Salicylic and glycolic chemical peel",
        category: TreatmentCategory::Topical,
        targets: &[Pores, Texture],
        min_severity: Severity::Mild,
        sessions: 4,
        interval: "2-4 weeks",
        cost_min: 400,
        cost_max: 1000,
        structural: false,
        preventive: false,
    },
    CatalogTreatment {
        id: "microneedling",
        name: "Microneedling",
        category: TreatmentCategory::Device,
        targets: &[Pores, Texture, Wrinkles],
        min_severity: Severity::Moderate,
        sessions: 3,
        interval: "4-6 weeks",
        cost_min: 900,
        cost_max: 2100,
        structural: false,
        preventive: false,
    },
    CatalogTreatment {
        id: "topical-retinoid",
        name: "Topical retinoid",
        category: TreatmentCategory::Topical,
        targets: &[Wrinkles, Pores, Texture],
        min_severity: Severity::Mild,
        sessions: 1,
        interval: "nightly",
        cost_min: 30,
        cost_max: 100,
        structural: false,
        preventive: false,
    },
    CatalogTreatment {
        id: "botulinum-toxin",
        name: "Botulinum toxin",
        category: TreatmentCategory::Injectable,
        targets: &[Wrinkles],
        min_severity: Severity::Moderate,
        sessions: 1,
        interval: "every 3-4 months",
        cost_min: 300,
        cost_max: 800,
        structural: false,
        preventive: false,
    },
    CatalogTreatment {
        id: "fractional-co2-laser",
        name: "Fractional CO2 resurfacing",
        category: TreatmentCategory::Laser,
        targets: &[Wrinkles, Texture],
        min_severity: Severity::Severe,
        sessions: 2,
        interval: "8-12 weeks",
        cost_min: 2400,
        cost_max: 4500,
        structural: false,
        preventive: false,
    },
    CatalogTreatment {
        id: "barrier-moisturizer",
        name: "Ceramide barrier moisturizer",
        category: TreatmentCategory::Topical,
        targets: &[Hydration],
        min_severity: Severity::Mild,
        sessions: 1,
        interval: "twice daily",
        cost_min: 25,
        cost_max: 70,
        structural: false,
        preventive: false,
    },
    CatalogTreatment {
        id: "hyaluronic-skin-booster",
        name: "Hyaluronic acid skin booster",
        category: TreatmentCategory::Injectable,
        targets: &[Hydration],
        min_severity: Severity::Moderate,
        sessions: 3,
        interval: "4 weeks",
        cost_min: 900,
        cost_max: 1800,
        structural: false,
        preventive: false,
    },
    CatalogTreatment {
        id: "rf-microneedling",
        name: "Radiofrequency microneedling",
        category: TreatmentCategory::Combination,
        targets: &[Elasticity, Texture],
        min_severity: Severity::Mild,
        sessions: 3,
        interval: "4-6 weeks",
        cost_min: 2000,
        cost_max: 4000,
        structural: true,
        preventive: false,
    },
    CatalogTreatment {
        id: "hifu-lifting",
        name: "HIFU lifting",
        category: TreatmentCategory::Device,
        targets: &[Elasticity],
        min_severity: Severity::Moderate,
        sessions: 1,
        interval: "every 12 months",
        cost_min: 1500,
        cost_max: 3500,
        structural: true,
        preventive: false,
    },
    CatalogTreatment {
        id: "dermal-filler",
        name: "Hyaluronic dermal filler",
        category: TreatmentCategory::Injectable,
        targets: &[Elasticity],
        min_severity: Severity::Severe,
        sessions: 1,
        interval: "every 9-12 months",
        cost_min: 700,
        cost_max: 1500,
        structural: true,
        preventive: false,
    },
];

/// Treatments offered for a concern, in catalog order.
/// Hidden damage only draws preventive entries; visible concerns never do.
pub fn treatments_for(
    category: MetricCategory,
    severity: Severity,
    hidden_damage: bool,
) -> impl Iterator<Item = &'static CatalogTreatment> {
    CATALOG.iter().filter(move |t| {
        t.targets.contains(&category)
            && t.preventive == hidden_damage
            && severity >= t.min_severity
            && severity > Severity::Normal
    })
}

pub fn find(id: &str) -> Option<&'static CatalogTreatment> {
    CATALOG.iter().find(|t| t.id == id)
}
