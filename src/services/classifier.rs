// src/services/classifier.rs
//! Page modality classification from text-layer cues and channel statistics.
//!
//! Runs before extraction and never depends on it; the extractor's own
//! `imageType` answer is only consulted when this classifier is ambiguous.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use serde::Serialize;

use crate::errors::ErrorKind;
use crate::models::{ImageType, PageWarning};
use crate::services::image_processor::ImageProcessor;
use crate::services::intake::PageImage;

static TEXT_CUES: LazyLock<Vec<(ImageType, Regex)>> = LazyLock::new(|| {
    [
        (ImageType::CrossPolarized, r"(?i)\bcross[\s-]?polari[sz]ed\b|\bxpl\b"),
        (ImageType::ParallelPolarized, r"(?i)\bparallel[\s-]?polari[sz]ed\b|\bppl\b"),
        (ImageType::Polarized, r"(?i)\bpolari[sz]ed\b"),
        (ImageType::Uv, r"(?i)\b(uv|ultra[\s-]?violet|wood'?s\s+lamp)\b"),
        (ImageType::Enhanced, r"(?i)\b(enhanced|rbx|red\s+areas?|brown\s+areas?)\b"),
        (
            ImageType::Standard,
            r"(?i)\b(standard|daylight|white\s+light|normal\s+light|visible\s+light)\b",
        ),
    ]
    .into_iter()
    .filter_map(|(image_type, pattern)| Regex::new(pattern).ok().map(|re| (image_type, re)))
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClassificationBasis {
    Text,
    Visual,
    Undetermined,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub page_number: u32,
    pub image_type: ImageType,
    pub basis: ClassificationBasis,
    pub ambiguous: bool,
    pub cues: Vec<ImageType>,
}

impl Classification {
    /// Final modality given what the extractor reported for the same page.
    pub fn resolve(&self, reported: Option<ImageType>) -> ImageType {
        if self.ambiguous {
            reported.unwrap_or(ImageType::Other)
        } else {
            self.image_type
        }
    }

    pub fn warning(&self) -> Option<PageWarning> {
        if !self.ambiguous {
            return None;
        }
        let message = if self.cues.is_empty() {
            "No modality cues found; defaulting to other".to_string()
        } else {
            let names: Vec<&str> = self.cues.iter().map(|c| c.as_str()).collect();
            format!("Conflicting modality cues ({}); defaulting to other", names.join(", "))
        };
        Some(PageWarning {
            page_number: self.page_number,
            kind: ErrorKind::ClassificationAmbiguous,
            message,
        })
    }
}

/// Distinct modalities named in a page's text, in table order.
pub fn text_cues(text: &str) -> Vec<ImageType> {
    let mut hits: Vec<ImageType> = TEXT_CUES
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(image_type, _)| *image_type)
        .collect();

    // "cross-polarized" also matches the generic polarized cue.
    if hits
        .iter()
        .any(|t| matches!(t, ImageType::CrossPolarized | ImageType::ParallelPolarized))
    {
        hits.retain(|t| *t != ImageType::Polarized);
    }
    hits
}

pub fn classify(page: &PageImage, processor: &ImageProcessor) -> Classification {
    let cues = page.text.as_deref().map(text_cues).unwrap_or_default();

    if let [only] = cues.as_slice() {
        return Classification {
            page_number: page.page_number,
            image_type: *only,
            basis: ClassificationBasis::Text,
            ambiguous: false,
            cues,
        };
    }

    if page.media_type.starts_with("image/") {
        match processor.channel_stats(&page.data) {
            Ok(stats) if stats.looks_ultraviolet() => {
                debug!(
                    "Page {} classified as UV from channel statistics (blue share {:.2})",
                    page.page_number,
                    stats.blue_share()
                );
                return Classification {
                    page_number: page.page_number,
                    image_type: ImageType::Uv,
                    basis: ClassificationBasis::Visual,
                    ambiguous: false,
                    cues,
                };
            }
            Ok(_) => {}
            Err(e) => debug!("Page {} channel statistics unavailable: {}", page.page_number, e),
        }
    }

    Classification {
        page_number: page.page_number,
        image_type: ImageType::Other,
        basis: ClassificationBasis::Undetermined,
        ambiguous: true,
        cues,
    }
}
