//! Text extraction from (already redacted) frames.

use std::sync::Arc;

use anyhow::Result;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::privacy::TextDetector;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    pub text: String,
    pub confidence: f64,
    pub word_count: u64,
}

impl OcrResult {
    pub fn from_text(text: String, confidence: f64) -> Self {
        let word_count = text.split_whitespace().count() as u64;
        Self {
            text,
            confidence,
            word_count,
        }
    }
}

/// Full-frame text recognition engine.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, image: &DynamicImage) -> Result<OcrResult>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Extracted(OcrResult),
    /// The change detector did not ask for extraction on this frame.
    NotScheduled,
    /// Extraction ran and found no text.
    Empty,
    /// Extraction failed; the snapshot is stored without text. Not retried.
    Failed { reason: String },
}

impl ExtractionOutcome {
    pub fn text(&self) -> &str {
        match self {
            ExtractionOutcome::Extracted(result) => &result.text,
            _ => "",
        }
    }

    pub fn ran(&self) -> bool {
        !matches!(self, ExtractionOutcome::NotScheduled)
    }
}

/// Run `extractor` on `image` when `scheduled`, folding failures into the outcome.
pub fn extract_if_scheduled(
    extractor: &dyn TextExtractor,
    image: &DynamicImage,
    scheduled: bool,
) -> ExtractionOutcome {
    if !scheduled {
        return ExtractionOutcome::NotScheduled;
    }

    match extractor.extract(image) {
        Ok(result) if result.text.trim().is_empty() => ExtractionOutcome::Empty,
        Ok(result) => ExtractionOutcome::Extracted(result),
        Err(err) => ExtractionOutcome::Failed {
            reason: format!("{err:#}"),
        },
    }
}

/// Extractor built on a text detector: observation text in reading order
/// (top to bottom, then left to right), one line per observation.
pub struct DetectorTextExtractor {
    detector: Arc<dyn TextDetector>,
}

impl DetectorTextExtractor {
    pub fn new(detector: Arc<dyn TextDetector>) -> Self {
        Self { detector }
    }
}

impl TextExtractor for DetectorTextExtractor {
    fn extract(&self, image: &DynamicImage) -> Result<OcrResult> {
        let mut observations = self.detector.detect(image)?;
        observations.sort_by(|a, b| {
            a.bounds
                .y
                .total_cmp(&b.bounds.y)
                .then(a.bounds.x.total_cmp(&b.bounds.x))
        });

        let text = observations
            .iter()
            .map(|o| o.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(OcrResult::from_text(text, 1.0))
    }
}
