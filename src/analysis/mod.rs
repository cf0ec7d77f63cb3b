// src/analysis/mod.rs
pub mod aggregator;
pub mod catalog;
pub mod categories;
pub mod insights;
pub mod planner;
pub mod ratio;
pub mod scorer;

pub use aggregator::aggregate;
pub use planner::plan;
pub use scorer::{analyze_age, summarize};
