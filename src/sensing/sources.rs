use anyhow::Result;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::db::UNKNOWN_APP;

use super::frame::DisplayId;

/// Screen capture for one display. Blocking; called from `spawn_blocking`.
pub trait FrameSource: Send + Sync {
    fn display_id(&self) -> DisplayId;

    fn capture(&self) -> Result<DynamicImage>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowMetadata {
    pub app_name: String,
    pub window_title: String,
    /// Category reported by the platform (e.g. an app store genre), if any.
    pub category: Option<String>,
}

impl WindowMetadata {
    pub fn unknown() -> Self {
        Self {
            app_name: UNKNOWN_APP.to_string(),
            window_title: String::new(),
            category: None,
        }
    }
}

/// Frontmost window on a display. Blocking; called from `spawn_blocking`.
pub trait WindowMetadataProvider: Send + Sync {
    fn active_window(&self, display_id: DisplayId) -> Result<WindowMetadata>;
}

/// Provider for platforms without window introspection.
pub struct NoWindowMetadata;

impl WindowMetadataProvider for NoWindowMetadata {
    fn active_window(&self, _display_id: DisplayId) -> Result<WindowMetadata> {
        Ok(WindowMetadata::unknown())
    }
}
