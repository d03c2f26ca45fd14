//! Sensitive-text patterns. Best effort: a miss here means the text stays
//! legible in the stored image.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SensitiveKind {
    CardNumber,
    Iban,
    Keyword,
}

fn re_card_number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // 4-4-4-4 groups (Visa/Mastercard style) or 4-6-5 (Amex style).
    RE.get_or_init(|| {
        Regex::new(r"\b(?:\d{4}[ -]?){3}\d{4}\b|\b\d{4}[ -]?\d{6}[ -]?\d{5}\b")
            .expect("card number pattern compiles")
    })
}

fn re_iban() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // German IBAN: DE + 2 check digits + 18 digit BBAN, optionally grouped by 4.
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bDE\d{2}(?:\s?\d{4}){4}\s?\d{2}\b").expect("IBAN pattern compiles")
    })
}

fn re_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:password|passwort|kennwort|mot de passe|contraseña|secret|geheim|segreto|api[\s_-]?key|api[\s_-]?schlüssel|bearer|private[\s_-]?key|privater schlüssel|clé privée|clave privada)",
        )
        .expect("keyword pattern compiles")
    })
}

/// First sensitive pattern found in `text`, if any.
pub fn classify(text: &str) -> Option<SensitiveKind> {
    if re_card_number().is_match(text) {
        Some(SensitiveKind::CardNumber)
    } else if re_iban().is_match(text) {
        Some(SensitiveKind::Iban)
    } else if re_keyword().is_match(text) {
        Some(SensitiveKind::Keyword)
    } else {
        None
    }
}

pub fn is_sensitive(text: &str) -> bool {
    classify(text).is_some()
}
