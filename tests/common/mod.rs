#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use glimpse_lib::embedding::{Embedder, EmbeddingError, HashingEmbedder};
use glimpse_lib::privacy::{NormalizedRect, TextDetector, TextObservation};
use glimpse_lib::rag::TextGenerator;
use glimpse_lib::sensing::{DisplayId, FrameSource, WindowMetadata, WindowMetadataProvider};
use glimpse_lib::{Glimpse, Platform};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use tempfile::TempDir;

pub const SECRET_BOUNDS: NormalizedRect = NormalizedRect {
    x: 0.1,
    y: 0.2,
    width: 0.5,
    height: 0.2,
};

pub const AGENDA_BOUNDS: NormalizedRect = NormalizedRect {
    x: 0.1,
    y: 0.7,
    width: 0.6,
    height: 0.1,
};

/// OCR stand-in that "reads" a line only while its box is still visible:
/// a line whose centre pixel has been blacked out is not detected.
pub struct ScreenText {
    pub lines: Vec<(String, NormalizedRect)>,
}

impl ScreenText {
    pub fn login_form() -> Self {
        Self {
            lines: vec![
                ("password: hunter2".into(), SECRET_BOUNDS),
                ("Quarterly roadmap review".into(), AGENDA_BOUNDS),
            ],
        }
    }
}

impl TextDetector for ScreenText {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<TextObservation>> {
        let (width, height) = image.dimensions();
        Ok(self
            .lines
            .iter()
            .filter(|(_, bounds)| {
                let cx = ((bounds.x + bounds.width / 2.0) * f64::from(width)) as u32;
                let cy = ((bounds.y + bounds.height / 2.0) * f64::from(height)) as u32;
                image.get_pixel(cx, cy) != Rgba([0, 0, 0, 255])
            })
            .map(|(text, bounds)| TextObservation {
                text: text.clone(),
                bounds: *bounds,
            })
            .collect())
    }
}

pub struct FixedWindow;

impl WindowMetadataProvider for FixedWindow {
    fn active_window(&self, _display_id: DisplayId) -> Result<WindowMetadata> {
        Ok(WindowMetadata {
            app_name: "Xcode".into(),
            window_title: "roadmap.md".into(),
            category: None,
        })
    }
}

/// Frontmost app that the test can switch at any time.
pub struct SwitchableWindow {
    pub app_name: Mutex<String>,
}

impl SwitchableWindow {
    pub fn new(app_name: &str) -> Arc<Self> {
        Arc::new(Self {
            app_name: Mutex::new(app_name.into()),
        })
    }

    pub fn switch_to(&self, app_name: &str) {
        *self.app_name.lock().unwrap() = app_name.into();
    }
}

impl WindowMetadataProvider for SwitchableWindow {
    fn active_window(&self, _display_id: DisplayId) -> Result<WindowMetadata> {
        Ok(WindowMetadata {
            app_name: self.app_name.lock().unwrap().clone(),
            window_title: "main".into(),
            category: None,
        })
    }
}

/// Window introspection that is never available.
pub struct NoAccessibility;

impl WindowMetadataProvider for NoAccessibility {
    fn active_window(&self, _display_id: DisplayId) -> Result<WindowMetadata> {
        anyhow::bail!("accessibility permission denied")
    }
}

/// Window lookup that takes longer than the capture timeout.
pub struct SlowWindow(pub std::time::Duration);

impl WindowMetadataProvider for SlowWindow {
    fn active_window(&self, display_id: DisplayId) -> Result<WindowMetadata> {
        std::thread::sleep(self.0);
        FixedWindow.active_window(display_id)
    }
}

pub struct StaticScreen {
    pub display: DisplayId,
    pub image: DynamicImage,
}

impl FrameSource for StaticScreen {
    fn display_id(&self) -> DisplayId {
        self.display
    }

    fn capture(&self) -> Result<DynamicImage> {
        Ok(self.image.clone())
    }
}

/// Records every prompt and replies with a canned answer.
pub struct RecordingGenerator {
    pub prompts: Mutex<Vec<String>>,
    pub reply: String,
}

impl RecordingGenerator {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            prompts: Mutex::new(Vec::new()),
            reply: reply.into(),
        })
    }

    pub fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for RecordingGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

/// Embedder that never answers in time.
pub struct StalledEmbedder;

#[async_trait]
impl Embedder for StalledEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Err(EmbeddingError::MissingEmbedding)
    }

    fn dimensions(&self) -> usize {
        0
    }

    fn model_id(&self) -> &str {
        "stalled"
    }
}

pub fn white_screen() -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(200, 100, Rgba([255, 255, 255, 255])))
}

pub async fn open_glimpse(
    dir: &TempDir,
    embedder: Option<Arc<dyn Embedder>>,
    generator: Arc<dyn TextGenerator>,
) -> Glimpse {
    open_glimpse_with_window(dir, embedder, generator, Arc::new(FixedWindow)).await
}

pub async fn open_glimpse_with_window(
    dir: &TempDir,
    embedder: Option<Arc<dyn Embedder>>,
    generator: Arc<dyn TextGenerator>,
    window_metadata: Arc<dyn WindowMetadataProvider>,
) -> Glimpse {
    Glimpse::open(
        dir.path(),
        Platform {
            text_detector: Arc::new(ScreenText::login_form()),
            window_metadata,
            generator: Some(generator),
            embedder: Some(embedder.unwrap_or_else(|| {
                Arc::new(HashingEmbedder::new(256)) as Arc<dyn Embedder>
            })),
        },
    )
    .await
    .unwrap()
}
