//! Snapshot data model.
//!
//! One row per kept frame. The image reference is the only field that changes
//! after insert (cleared by retention); everything else is written once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UNKNOWN_APP: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: String,
    pub captured_at: DateTime<Utc>,
    pub display_id: u32,
    /// Redacted PNG on disk; `None` once retention has removed the file.
    pub image_path: Option<String>,
    /// Empty when extraction was not scheduled for this frame or failed.
    pub extracted_text: String,
    pub app_name: String,
    pub window_title: String,
    pub category: Option<String>,
    pub ai_note: Option<String>,
    pub redacted_regions: u32,
}

impl Snapshot {
    pub fn has_text(&self) -> bool {
        !self.extracted_text.trim().is_empty()
    }

    /// Text handed to the embedder: window context first, then the screen text.
    pub fn embedding_text(&self) -> String {
        let mut text = format!("[{}] {}", self.app_name, self.window_title);
        if self.has_text() {
            text.push('\n');
            text.push_str(self.extracted_text.trim());
        }
        text
    }
}
