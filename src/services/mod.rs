// src/services/mod.rs
pub mod cache;
pub mod classifier;
pub mod extractor;
pub mod image_processor;
pub mod intake;
pub mod llm_service;
pub mod pipeline;
pub mod schema;

pub use cache::{AnalysisCache, MemoryCache, RedisCache};
pub use pipeline::ReportPipeline;
