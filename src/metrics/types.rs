use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sensing::DecisionReason;

/// Timings for one kept frame, from redaction to snapshot insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureMetrics {
    pub timestamp: DateTime<Utc>,
    pub display_id: u32,
    pub metadata_ms: u64,
    pub redact_ms: u64,
    pub redacted_regions: u32,
    pub image_save_ms: u64,
    pub image_bytes: Option<u64>,
    pub extract_ms: Option<u64>,
    pub extract_skipped_reason: Option<String>,
    pub db_write_ms: u64,
    pub total_ms: u64,
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameCounters {
    pub observed: u64,
    pub kept: u64,
    pub throttled: u64,
    pub unchanged: u64,
    pub extracted: u64,
    pub extraction_failed: u64,
    pub redacted_frames: u64,
    pub redaction_degraded: u64,
    pub indexed: u64,
    pub index_failed: u64,
}

impl FrameCounters {
    pub fn record_decision(&mut self, reason: DecisionReason, keep: bool) {
        self.observed += 1;
        if keep {
            self.kept += 1;
        }
        match reason {
            DecisionReason::Throttled => self.throttled += 1,
            DecisionReason::Unchanged => self.unchanged += 1,
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub system: SystemMetrics,
    pub counters: FrameCounters,
    pub recent_captures: Vec<CaptureMetrics>,
}
