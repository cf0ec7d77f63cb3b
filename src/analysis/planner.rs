// src/analysis/planner.rs
//! Map ranked concerns onto catalog treatments and bucket them by urgency.

use std::collections::HashMap;

use crate::analysis::catalog::{self, CatalogTreatment, CURRENCY};
use crate::models::{
    Concern, CostRange, Priority, TreatmentPlan, TreatmentRecommendation, UrgencyBucket,
};

pub fn bucket_for(treatment: &CatalogTreatment, priority: Priority) -> UrgencyBucket {
    if treatment.preventive {
        return UrgencyBucket::Maintenance;
    }
    match priority {
        Priority::Essential => UrgencyBucket::Immediate,
        Priority::Recommended => UrgencyBucket::ShortTerm,
        Priority::Optional if treatment.structural => UrgencyBucket::LongTerm,
        Priority::Optional => UrgencyBucket::Maintenance,
    }
}

fn reasoning(concern: &Concern, treatment: &CatalogTreatment) -> String {
    let pages = concern
        .pages
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    if concern.hidden_damage {
        format!(
            "{} limits progression of UV damage not yet visible in standard light (pages {})",
            treatment.name, pages
        )
    } else {
        format!(
            "{} addresses {} {} (pages {})",
            treatment.name,
            concern.severity.as_str(),
            concern.name.to_lowercase(),
            pages
        )
    }
}

struct Candidate {
    recommendation: TreatmentRecommendation,
    bucket: UrgencyBucket,
}

/// Build the plan. Output depends only on `concerns` and their order.
pub fn plan(concerns: &[Concern]) -> TreatmentPlan {
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut by_id: HashMap<&'static str, usize> = HashMap::new();

    for concern in concerns {
        let Some(category) = concern.category else {
            continue;
        };
        let priority = Priority::for_severity(concern.severity);

        for treatment in catalog::treatments_for(category, concern.severity, concern.hidden_damage) {
            let recommendation = TreatmentRecommendation {
                treatment_id: treatment.id.to_string(),
                name: treatment.name.to_string(),
                category: treatment.category,
                priority,
                confidence: concern.confidence,
                targeted_conditions: vec![concern.name.clone()],
                sessions: treatment.sessions,
                interval: treatment.interval.to_string(),
                estimated_cost: CostRange {
                    min: treatment.cost_min,
                    max: treatment.cost_max,
                    currency: CURRENCY.to_string(),
                },
                reasoning: reasoning(concern, treatment),
            };
            let bucket = bucket_for(treatment, priority);

            match by_id.get(treatment.id) {
                Some(&i) => {
                    // Higher confidence wins; the earlier occurrence wins ties.
                    let existing = &mut candidates[i];
                    let mut targeted = existing.recommendation.targeted_conditions.clone();
                    if !targeted.contains(&concern.name) {
                        targeted.push(concern.name.clone());
                    }
                    if recommendation.confidence > existing.recommendation.confidence {
                        existing.recommendation = recommendation;
                        existing.bucket = bucket;
                    }
                    existing.recommendation.targeted_conditions = targeted;
                }
                None => {
                    by_id.insert(treatment.id, candidates.len());
                    candidates.push(Candidate {
                        recommendation,
                        bucket,
                    });
                }
            }
        }
    }

    let mut plan = TreatmentPlan {
        immediate: Vec::new(),
        short_term: Vec::new(),
        long_term: Vec::new(),
        maintenance: Vec::new(),
        total_estimated_investment: CostRange {
            min: 0,
            max: 0,
            currency: CURRENCY.to_string(),
        },
    };

    for candidate in candidates {
        let cost = &candidate.recommendation.estimated_cost;
        plan.total_estimated_investment.min =
            plan.total_estimated_investment.min.saturating_add(cost.min);
        plan.total_estimated_investment.max =
            plan.total_estimated_investment.max.saturating_add(cost.max);

        match candidate.bucket {
            UrgencyBucket::Immediate => plan.immediate.push(candidate.recommendation),
            UrgencyBucket::ShortTerm => plan.short_term.push(candidate.recommendation),
            UrgencyBucket::LongTerm => plan.long_term.push(candidate.recommendation),
            UrgencyBucket::Maintenance => plan.maintenance.push(candidate.recommendation),
        }
    }

    plan
}
