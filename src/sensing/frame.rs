use chrono::{DateTime, Utc};
use image::DynamicImage;

pub type DisplayId = u32;

/// One captured screen image. Lives for a single capture tick and is never
/// persisted as-is; only its redacted form reaches disk.
#[derive(Debug, Clone)]
pub struct Frame {
    pub display_id: DisplayId,
    pub captured_at: DateTime<Utc>,
    pub image: DynamicImage,
}

impl Frame {
    pub fn new(display_id: DisplayId, captured_at: DateTime<Utc>, image: DynamicImage) -> Self {
        Self {
            display_id,
            captured_at,
            image,
        }
    }
}
