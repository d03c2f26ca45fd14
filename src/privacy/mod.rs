//! Blacks out sensitive on-screen text before a frame is stored or read.

pub mod patterns;
pub mod redactor;

pub use patterns::{classify, is_sensitive, SensitiveKind};
pub use redactor::{
    NormalizedRect, PixelRect, PrivacyRedactor, RedactedRegion, RedactionOutcome, TextDetector,
    TextObservation,
};
