//! Screen sensing: frames, fingerprints, change detection and the
//! per-display capture loops.

pub mod change_detector;
mod controller;
mod frame;
mod loop_worker;
pub mod phash;
mod sources;

pub use change_detector::{ChangeDetector, Decision, DecisionReason, DetectorConfig};
pub use controller::CaptureController;
pub use frame::{DisplayId, Frame};
pub use phash::Fingerprint;
pub use sources::{FrameSource, NoWindowMetadata, WindowMetadata, WindowMetadataProvider};
