// src/analysis/categories.rs
//! Fixed lookup from finding text to the seven metric categories.

use crate::models::MetricCategory;

/// Raw metric keys understood by the aggregator.
pub mod metric_keys {
    pub const PORE_SMALL: &str = "pore_count_small";
    pub const PORE_MEDIUM: &str = "pore_count_medium";
    pub const PORE_LARGE: &str = "pore_count_large";
    pub const WRINKLE_FINE: &str = "wrinkle_count_fine";
    pub const WRINKLE_MODERATE: &str = "wrinkle_count_moderate";
    pub const WRINKLE_DEEP: &str = "wrinkle_count_deep";
    pub const SPOT_COUNT: &str = "spot_count";
    pub const REDNESS_AREAS: &str = "redness_areas";
    pub const BROKEN_CAPILLARIES: &str = "broken_capillaries";
    pub const DRY_AREAS: &str = "dry_areas";
    pub const SAGGING_AREAS: &str = "sagging_areas";
    pub const ROUGH_AREAS: &str = "rough_areas";
    pub const SCAR_COUNT: &str = "scar_count";

    pub const MOISTURE_LEVEL: &str = "moisture_level";
    pub const ESTIMATED_AGE: &str = "estimated_age";
    pub const SKIN_TYPE: &str = "skin_type";

    /// Keys summed across pages. Values must be non-negative.
    pub const COUNTS: &[&str] = &[
        PORE_SMALL,
        PORE_MEDIUM,
        PORE_LARGE,
        WRINKLE_FINE,
        WRINKLE_MODERATE,
        WRINKLE_DEEP,
        SPOT_COUNT,
        REDNESS_AREAS,
        BROKEN_CAPILLARIES,
        DRY_AREAS,
        SAGGING_AREAS,
        ROUGH_AREAS,
        SCAR_COUNT,
    ];
}

/// Ordered keyword table; the first category with a matching keyword wins.
/// Keywords match at the start of a word; a trailing space demands the whole word.
/// Elasticity sits before wrinkles so "sagging folds" is not read as a line.
const CATEGORY_KEYWORDS: &[(MetricCategory, &[&str])] = &[
    (
        MetricCategory::Pigmentation,
        &[
            "pigment", "hyperpigment", "hypopigment", "melasma", "spot", "sunspot", "freckle",
            "lentig", "discolo", "sun damage", "uv damage", "photodamage", "dark circle",
            "uneven tone",
        ],
    ),
    (
        MetricCategory::Vascular,
        &[
            "red ", "redness", "redden", "vascular", "rosacea", "capillar", "telangiect",
            "erythema", "vessel", "flush",
        ],
    ),
    (
        MetricCategory::Pores,
        &["pore", "blackhead", "comedo", "sebum", "sebaceous", "congest"],
    ),
    (
        MetricCategory::Elasticity,
        &["elastic", "firm", "sag", "laxity", "lax ", "jowl", "droop", "volume loss"],
    ),
    (
        MetricCategory::Wrinkles,
        &["wrinkle", "fine line", "crow", "furrow", "fold", "line", "crease"],
    ),
    (
        MetricCategory::Hydration,
        &["hydrat", "dehydrat", "dry", "moisture", "flak", "barrier"],
    ),
    (
        MetricCategory::Texture,
        &["texture", "rough", "uneven", "scar", "bump", "acne", "smooth"],
    ),
];

/// Lowercase words joined by single spaces, padded on both ends.
fn normalize(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    format!(" {} ", words.join(" "))
}

pub fn categorize(text: &str) -> Option<MetricCategory> {
    let normalized = normalize(text);
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| {
            keywords
                .iter()
                .any(|k| normalized.contains(&format!(" {}", k)))
        })
        .map(|(category, _)| *category)
}
