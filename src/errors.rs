// src/errors.rs
use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error classification shared by fatal errors, skipped pages and warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidFormat,
    TooLarge,
    ClassificationAmbiguous,
    ExtractionTimeout,
    ExtractionTransient,
    ExtractionRejected,
    SchemaViolation,
    InsufficientData,
    AggregationInvariantViolation,
    Validation,
    NotFound,
    Cache,
    Config,
}

#[derive(Error, Debug)]
pub enum SkinReportError {
    #[error("Invalid document format: {0}")]
    InvalidFormat(String),

    #[error("Document is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    #[error("Only {analyzed} page(s) analyzed, at least {required} required")]
    InsufficientData { analyzed: usize, required: usize },

    #[error("Aggregation invariant violated: {0}")]
    AggregationInvariant(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SkinReportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SkinReportError::InvalidFormat(_) => ErrorKind::InvalidFormat,
            SkinReportError::TooLarge { .. } => ErrorKind::TooLarge,
            SkinReportError::InsufficientData { .. } => ErrorKind::InsufficientData,
            SkinReportError::AggregationInvariant(_) => ErrorKind::AggregationInvariantViolation,
            SkinReportError::Validation(_) => ErrorKind::Validation,
            SkinReportError::NotFound(_) => ErrorKind::NotFound,
            SkinReportError::Cache(_) => ErrorKind::Cache,
            SkinReportError::Config(_) => ErrorKind::Config,
        }
    }
}

impl ResponseError for SkinReportError {
    fn status_code(&self) -> StatusCode {
        match self {
            SkinReportError::InvalidFormat(_) | SkinReportError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            SkinReportError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            SkinReportError::InsufficientData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            SkinReportError::NotFound(_) => StatusCode::NOT_FOUND,
            SkinReportError::AggregationInvariant(_)
            | SkinReportError::Cache(_)
            | SkinReportError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error = match self {
            SkinReportError::InvalidFormat(_) => "Unsupported document",
            SkinReportError::TooLarge { .. } => "Document too large",
            SkinReportError::InsufficientData { .. } => "Insufficient data",
            SkinReportError::AggregationInvariant(_) => "Report assembly failed",
            SkinReportError::Validation(_) => "Validation error",
            SkinReportError::NotFound(_) => "Not found",
            SkinReportError::Cache(_) => "Storage error",
            SkinReportError::Config(_) => "Configuration error",
        };

        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": error,
            "kind": self.kind(),
            "message": self.to_string()
        }))
    }
}

/// Failure of a single page extraction. Never propagated past the extractor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("Inference call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Transient inference failure: {0}")]
    Transient(String),

    #[error("Inference service rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Response does not match the page schema: {0}")]
    SchemaViolation(String),
}

impl ExtractionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractionError::Timeout { .. } => ErrorKind::ExtractionTimeout,
            ExtractionError::Transient(_) => ErrorKind::ExtractionTransient,
            ExtractionError::Rejected { .. } => ErrorKind::ExtractionRejected,
            ExtractionError::SchemaViolation(_) => ErrorKind::SchemaViolation,
        }
    }

    /// Timeouts and transient network/rate-limit failures may succeed on a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExtractionError::Timeout { .. } | ExtractionError::Transient(_)
        )
    }
}
