use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::settings::CaptureSettings;

use super::frame::{DisplayId, Frame};
use super::phash::Fingerprint;

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub similarity_threshold: f64,
    pub major_change_threshold: f64,
    pub extraction_interval: Duration,
    pub frame_interval: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::from(&CaptureSettings::default())
    }
}

impl From<&CaptureSettings> for DetectorConfig {
    fn from(settings: &CaptureSettings) -> Self {
        Self {
            similarity_threshold: settings.similarity_threshold,
            major_change_threshold: settings.major_change_threshold,
            extraction_interval: settings.extraction_interval(),
            frame_interval: settings.frame_interval(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DecisionReason {
    FirstObservation,
    /// Arrived inside the per-display frame interval, or out of capture order.
    Throttled,
    Unchanged,
    /// Distance above the major-change threshold; likely a context switch.
    MajorChange,
    ExtractionDue,
    Changed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub keep: bool,
    pub force_extract: bool,
    pub distance: Option<f64>,
    pub reason: DecisionReason,
}

impl Decision {
    fn discard(reason: DecisionReason, distance: Option<f64>) -> Self {
        Self {
            keep: false,
            force_extract: false,
            distance,
            reason,
        }
    }
}

#[derive(Debug, Default)]
struct DisplayState {
    last_evaluated: Option<DateTime<Utc>>,
    last_decided: Option<DateTime<Utc>>,
    fingerprint: Option<Fingerprint>,
    last_extraction: Option<DateTime<Utc>>,
}

/// Decides which frames are worth keeping and which need text extraction.
///
/// State is kept per display and never shared between displays. The lock is
/// held only for bookkeeping; fingerprinting happens outside it so one busy
/// display does not stall the others.
pub struct ChangeDetector {
    config: RwLock<DetectorConfig>,
    displays: Mutex<HashMap<DisplayId, DisplayState>>,
}

impl ChangeDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config: RwLock::new(config),
            displays: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> DetectorConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Swap thresholds and intervals. Per-display state is kept.
    pub fn reconfigure(&self, config: DetectorConfig) {
        *self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
    }

    /// CPU-bound (fingerprinting); async callers should use `spawn_blocking`.
    pub fn observe(&self, frame: &Frame) -> Decision {
        let config = self.config();
        if !self.admit(&config, frame.display_id, frame.captured_at) {
            return Decision::discard(DecisionReason::Throttled, None);
        }

        let fingerprint = Fingerprint::of(&frame.image);
        self.decide(&config, frame.display_id, frame.captured_at, fingerprint)
    }

    /// Rate limit: at most one evaluated frame per display per frame interval,
    /// less a quarter interval of capture jitter. Frames older than the last
    /// evaluated one are dropped too.
    fn admit(&self, config: &DetectorConfig, display_id: DisplayId, at: DateTime<Utc>) -> bool {
        let min_gap = config.frame_interval - config.frame_interval / 4;
        let mut displays = self.lock();
        let state = displays.entry(display_id).or_default();

        if let Some(previous) = state.last_evaluated {
            if at < previous || at - previous < min_gap {
                return false;
            }
        }

        state.last_evaluated = Some(at);
        true
    }

    /// Fingerprinting runs between `admit` and here without the lock, so two
    /// admitted frames can arrive out of order. The older one is dropped.
    fn decide(
        &self,
        config: &DetectorConfig,
        display_id: DisplayId,
        at: DateTime<Utc>,
        fingerprint: Fingerprint,
    ) -> Decision {
        let mut displays = self.lock();
        let state = displays.entry(display_id).or_default();

        if state.last_decided.is_some_and(|decided| at < decided) {
            return Decision::discard(DecisionReason::Throttled, None);
        }
        state.last_decided = Some(at);

        let Some(previous) = state.fingerprint.as_ref() else {
            state.fingerprint = Some(fingerprint);
            state.last_extraction = Some(at);
            return Decision {
                keep: true,
                force_extract: true,
                distance: None,
                reason: DecisionReason::FirstObservation,
            };
        };

        let distance = previous.distance(&fingerprint);
        if distance <= config.similarity_threshold {
            return Decision::discard(DecisionReason::Unchanged, Some(distance));
        }

        let (force_extract, reason) = if distance > config.major_change_threshold {
            (true, DecisionReason::MajorChange)
        } else if extraction_due(state.last_extraction, at, config.extraction_interval) {
            (true, DecisionReason::ExtractionDue)
        } else {
            (false, DecisionReason::Changed)
        };

        state.fingerprint = Some(fingerprint);
        if force_extract {
            state.last_extraction = Some(at);
        }

        Decision {
            keep: true,
            force_extract,
            distance: Some(distance),
            reason,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<DisplayId, DisplayState>> {
        self.displays
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn extraction_due(last: Option<DateTime<Utc>>, now: DateTime<Utc>, interval: Duration) -> bool {
    last.map(|instant| now - instant >= interval).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensing::phash::test_images::split;
    use chrono::TimeZone;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn frame(display: DisplayId, secs: i64, image: DynamicImage) -> Frame {
        Frame::new(display, t(secs), image)
    }

    /// Quarter-width white band at `band`, black elsewhere. Neighbouring
    /// bands differ in half of the hash bits.
    fn banded(band: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(128, 128, |x, _| {
            if x / 32 == band {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        }))
    }

    #[test]
    fn first_frame_is_kept_and_extracted() {
        let detector = ChangeDetector::new(DetectorConfig::default());
        let decision = detector.observe(&frame(1, 0, split(128, 96, true)));
        assert!(decision.keep);
        assert!(decision.force_extract);
        assert_eq!(decision.reason, DecisionReason::FirstObservation);
    }

    #[test]
    fn identical_frame_is_discarded_with_zero_distance() {
        let detector = ChangeDetector::new(DetectorConfig::default());
        detector.observe(&frame(1, 0, split(128, 96, true)));
        let decision = detector.observe(&frame(1, 1, split(128, 96, true)));
        assert!(!decision.keep);
        assert_eq!(decision.distance, Some(0.0));
        assert_eq!(decision.reason, DecisionReason::Unchanged);
    }

    #[test]
    fn frames_inside_interval_are_throttled() {
        let detector = ChangeDetector::new(DetectorConfig::default());
        detector.observe(&frame(1, 0, split(128, 96, true)));
        let early = Frame::new(1, t(0) + Duration::milliseconds(400), split(128, 96, false));
        let decision = detector.observe(&early);
        assert_eq!(decision.reason, DecisionReason::Throttled);
        assert!(decision.distance.is_none());
    }

    #[test]
    fn out_of_order_frame_is_dropped() {
        let detector = ChangeDetector::new(DetectorConfig::default());
        detector.observe(&frame(1, 5, split(128, 96, true)));
        let decision = detector.observe(&frame(1, 2, split(128, 96, false)));
        assert_eq!(decision.reason, DecisionReason::Throttled);
    }

    #[test]
    fn major_change_forces_extraction() {
        let detector = ChangeDetector::new(DetectorConfig::default());
        detector.observe(&frame(1, 0, split(128, 96, true)));
        let decision = detector.observe(&frame(1, 1, split(128, 96, false)));
        assert!(decision.keep);
        assert!(decision.force_extract);
        assert_eq!(decision.reason, DecisionReason::MajorChange);
    }

    #[test]
    fn moderate_change_extracts_only_after_interval() {
        let detector = ChangeDetector::new(DetectorConfig {
            major_change_threshold: 0.9,
            ..DetectorConfig::default()
        });
        detector.observe(&frame(1, 0, banded(0)));

        let soon = detector.observe(&frame(1, 2, banded(1)));
        assert!(soon.keep);
        assert!(!soon.force_extract);
        assert_eq!(soon.reason, DecisionReason::Changed);

        let later = detector.observe(&frame(1, 12, banded(2)));
        assert!(later.keep);
        assert!(later.force_extract);
        assert_eq!(later.reason, DecisionReason::ExtractionDue);
    }

    /// White from the left edge across `columns` sixteenths of the width.
    fn white_columns(columns: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(128, 128, |x, _| {
            if x < columns * 8 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        }))
    }

    #[test]
    fn discarded_frame_does_not_replace_fingerprint() {
        let detector = ChangeDetector::new(DetectorConfig {
            similarity_threshold: 0.3,
            major_change_threshold: 0.95,
            ..DetectorConfig::default()
        });
        assert!(detector.observe(&frame(1, 0, white_columns(4))).keep);

        let nudged = detector.observe(&frame(1, 1, white_columns(6)));
        assert!(!nudged.keep);

        // Close to the discarded frame but compared against the kept one.
        let drifted = detector.observe(&frame(1, 2, white_columns(9)));
        assert!(drifted.keep);
        assert!(drifted.distance.unwrap() > 0.3);
    }

    #[test]
    fn displays_are_tracked_independently() {
        let detector = ChangeDetector::new(DetectorConfig::default());
        assert!(detector.observe(&frame(1, 0, split(128, 96, true))).keep);
        let other = detector.observe(&frame(2, 0, split(128, 96, true)));
        assert_eq!(other.reason, DecisionReason::FirstObservation);
    }

    #[test]
    fn capture_jitter_below_one_interval_is_not_throttled() {
        let detector = ChangeDetector::new(DetectorConfig::default());
        detector.observe(&frame(1, 0, split(128, 96, true)));
        let jittered = Frame::new(1, t(1) - Duration::milliseconds(19), split(128, 96, false));
        let decision = detector.observe(&jittered);
        assert_eq!(decision.reason, DecisionReason::MajorChange);
        assert!(decision.keep);
    }

    #[test]
    fn reconfigure_applies_new_frame_interval() {
        let detector = ChangeDetector::new(DetectorConfig::default());
        detector.observe(&frame(1, 0, split(128, 96, true)));
        detector.reconfigure(DetectorConfig {
            frame_interval: Duration::milliseconds(20),
            ..DetectorConfig::default()
        });
        let early = Frame::new(1, t(0) + Duration::milliseconds(40), split(128, 96, false));
        assert!(detector.observe(&early).keep);
        assert_eq!(detector.config().frame_interval, Duration::milliseconds(20));
    }

    #[test]
    fn older_admitted_frame_cannot_overwrite_newer_fingerprint() {
        let detector = ChangeDetector::new(DetectorConfig::default());
        let config = detector.config();
        assert!(detector.admit(&config, 1, t(0)));
        assert!(detector.admit(&config, 1, t(1)));

        let newer = Fingerprint::of(&split(128, 96, true));
        let older = Fingerprint::of(&split(128, 96, false));
        assert!(detector.decide(&config, 1, t(1), newer).keep);

        let late = detector.decide(&config, 1, t(0), older);
        assert!(!late.keep);
        assert_eq!(late.reason, DecisionReason::Throttled);

        let next = detector.observe(&frame(1, 2, split(128, 96, true)));
        assert_eq!(next.reason, DecisionReason::Unchanged);
    }
}
