use std::sync::Arc;

use anyhow::Result;
use image::{DynamicImage, GenericImageView, Rgba};
use serde::{Deserialize, Serialize};

use super::patterns::{classify, SensitiveKind};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Bounding box in unit coordinates with the origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Pixel rectangle covering this box, grown by `margin` on every side and
    /// clamped to the image. `None` when nothing of it lies on the image.
    pub fn to_pixels(&self, image_width: u32, image_height: u32, margin: u32) -> Option<PixelRect> {
        if image_width == 0 || image_height == 0 {
            return None;
        }

        let w = f64::from(image_width);
        let h = f64::from(image_height);
        let left = (self.x * w).floor() - f64::from(margin);
        let top = (self.y * h).floor() - f64::from(margin);
        let right = ((self.x + self.width) * w).ceil() + f64::from(margin);
        let bottom = ((self.y + self.height) * h).ceil() + f64::from(margin);

        let left = left.clamp(0.0, w) as u32;
        let top = top.clamp(0.0, h) as u32;
        let right = right.clamp(0.0, w) as u32;
        let bottom = bottom.clamp(0.0, h) as u32;

        if right <= left || bottom <= top {
            return None;
        }

        Some(PixelRect {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

/// A piece of text found on screen and where it was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextObservation {
    pub text: String,
    pub bounds: NormalizedRect,
}

/// Text-region detection engine (platform OCR, an ONNX model, ...).
pub trait TextDetector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<TextObservation>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RedactedRegion {
    pub rect: PixelRect,
    pub kind: SensitiveKind,
}

/// Result of one redaction pass. Never an error: a failed detection is
/// `Degraded` and the frame goes on unredacted.
#[derive(Debug, Clone)]
pub enum RedactionOutcome {
    /// Nothing matched; the caller's image is already safe to use.
    Clean,
    Redacted {
        image: DynamicImage,
        regions: Vec<RedactedRegion>,
    },
    /// Detection failed or redaction is disabled; the image was not inspected.
    Degraded { reason: String },
}

impl RedactionOutcome {
    pub fn region_count(&self) -> usize {
        match self {
            RedactionOutcome::Redacted { regions, .. } => regions.len(),
            _ => 0,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, RedactionOutcome::Degraded { .. })
    }

    /// The image to persist: the painted copy if anything was redacted,
    /// otherwise `original` untouched.
    pub fn into_image(self, original: DynamicImage) -> DynamicImage {
        match self {
            RedactionOutcome::Redacted { image, .. } => image,
            RedactionOutcome::Clean | RedactionOutcome::Degraded { .. } => original,
        }
    }
}

pub struct PrivacyRedactor {
    detector: Arc<dyn TextDetector>,
    margin_px: u32,
    enabled: bool,
}

impl PrivacyRedactor {
    pub fn new(detector: Arc<dyn TextDetector>, margin_px: u32) -> Self {
        Self {
            detector,
            margin_px,
            enabled: true,
        }
    }

    pub fn disabled(detector: Arc<dyn TextDetector>) -> Self {
        Self {
            detector,
            margin_px: 0,
            enabled: false,
        }
    }

    /// CPU-bound; run under `spawn_blocking` from async code.
    pub fn redact(&self, image: &DynamicImage) -> RedactionOutcome {
        if !self.enabled {
            return RedactionOutcome::Degraded {
                reason: "redaction disabled".into(),
            };
        }

        let observations = match self.detector.detect(image) {
            Ok(observations) => observations,
            Err(err) => {
                log_warn!("text detection failed, keeping frame unredacted: {err:#}");
                return RedactionOutcome::Degraded {
                    reason: format!("text detection failed: {err}"),
                };
            }
        };

        let (width, height) = image.dimensions();
        let regions: Vec<RedactedRegion> = observations
            .iter()
            .filter_map(|observation| {
                let kind = classify(&observation.text)?;
                let rect = observation.bounds.to_pixels(width, height, self.margin_px)?;
                Some(RedactedRegion { rect, kind })
            })
            .collect();

        if regions.is_empty() {
            return RedactionOutcome::Clean;
        }

        log_debug!("redacting {} region(s) of {}x{} frame", regions.len(), width, height);

        let mut canvas = image.to_rgba8();
        for region in &regions {
            paint_black(&mut canvas, region.rect);
        }

        RedactionOutcome::Redacted {
            image: DynamicImage::ImageRgba8(canvas),
            regions,
        }
    }
}

fn paint_black(canvas: &mut image::RgbaImage, rect: PixelRect) {
    let black = Rgba([0, 0, 0, 255]);
    for y in rect.y..rect.y + rect.height {
        for x in rect.x..rect.x + rect.width {
            canvas.put_pixel(x, y, black);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use image::RgbaImage;

    struct FixedDetector(Vec<TextObservation>);

    impl TextDetector for FixedDetector {
        fn detect(&self, _image: &DynamicImage) -> Result<Vec<TextObservation>> {
            Ok(self.0.clone())
        }
    }

    struct FailingDetector;

    impl TextDetector for FailingDetector {
        fn detect(&self, _image: &DynamicImage) -> Result<Vec<TextObservation>> {
            Err(anyhow!("vision request failed"))
        }
    }

    fn white(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255])))
    }

    fn observation(text: &str, bounds: NormalizedRect) -> TextObservation {
        TextObservation {
            text: text.into(),
            bounds,
        }
    }

    #[test]
    fn pixel_conversion_applies_margin_and_clamps() {
        let rect = NormalizedRect::new(0.1, 0.2, 0.5, 0.2).to_pixels(200, 100, 4).unwrap();
        assert_eq!(rect, PixelRect { x: 16, y: 16, width: 108, height: 28 });

        let edge = NormalizedRect::new(0.0, 0.9, 1.0, 0.2).to_pixels(200, 100, 4).unwrap();
        assert_eq!(edge, PixelRect { x: 0, y: 86, width: 200, height: 14 });

        assert!(NormalizedRect::new(1.5, 0.0, 0.1, 0.1).to_pixels(200, 100, 0).is_none());
    }

    #[test]
    fn matching_region_is_painted_black() {
        let bounds = NormalizedRect::new(0.1, 0.2, 0.5, 0.2);
        let redactor = PrivacyRedactor::new(
            Arc::new(FixedDetector(vec![
                observation("password: hunter2", bounds),
                observation("Inbox (3)", NormalizedRect::new(0.1, 0.7, 0.3, 0.1)),
            ])),
            4,
        );

        let original = white(200, 100);
        let outcome = redactor.redact(&original);
        assert_eq!(outcome.region_count(), 1);

        let redacted = outcome.into_image(original.clone()).to_rgba8();
        let rect = bounds.to_pixels(200, 100, 4).unwrap();
        for y in rect.y..rect.y + rect.height {
            for x in rect.x..rect.x + rect.width {
                assert_eq!(redacted.get_pixel(x, y), &Rgba([0, 0, 0, 255]));
            }
        }
        assert_eq!(redacted.get_pixel(150, 80), &Rgba([255, 255, 255, 255]));
        assert_eq!(redacted.get_pixel(30, 75), &Rgba([255, 255, 255, 255]));
        // The caller's copy is untouched.
        assert_eq!(original.to_rgba8().get_pixel(30, 30), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn no_match_returns_clean() {
        let redactor = PrivacyRedactor::new(
            Arc::new(FixedDetector(vec![observation(
                "Quarterly planning",
                NormalizedRect::new(0.0, 0.0, 0.5, 0.1),
            )])),
            4,
        );
        assert!(matches!(redactor.redact(&white(50, 50)), RedactionOutcome::Clean));
    }

    #[test]
    fn detector_failure_fails_open() {
        let redactor = PrivacyRedactor::new(Arc::new(FailingDetector), 4);
        let original = white(20, 20);
        let outcome = redactor.redact(&original);
        assert!(outcome.is_degraded());
        assert_eq!(outcome.into_image(original.clone()), original);
    }

    #[test]
    fn disabled_redactor_never_inspects() {
        let redactor = PrivacyRedactor::disabled(Arc::new(FailingDetector));
        assert!(redactor.redact(&white(10, 10)).is_degraded());
    }
}
