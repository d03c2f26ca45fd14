//! Prompt assembly for question answering.

use std::fmt::Write;

use chrono::{DateTime, Duration, Utc};

use crate::db::AggregateReport;

pub const OVERVIEW_HEADER: &str = "STATISTICAL OVERVIEW";
pub const MATCHES_HEADER: &str = "SEMANTIC MATCHES";
pub const NO_DATA: &str = "(no data)";

const INSTRUCTIONS: &str = "Use the statistical overview to answer questions about how much time \
was spent or overall patterns. Use the semantic matches to answer what specifically was on \
screen. If neither section contains the answer, say so instead of guessing.";

/// One labelled period of the overview. `report` is `None` when the period
/// could not be computed.
#[derive(Debug, Clone)]
pub struct PeriodOverview {
    pub label: String,
    pub report: Option<AggregateReport>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchEntry {
    pub score: f32,
    pub captured_at: Option<DateTime<Utc>>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SemanticMatches {
    Found(Vec<MatchEntry>),
    /// The query was embedded but nothing similar is stored.
    Empty,
    /// Semantic search was skipped; the answer relies on statistics alone.
    Unavailable { reason: String },
}

pub fn build_prompt(
    overview: &[PeriodOverview],
    matches: &SemanticMatches,
    question: &str,
    max_match_chars: usize,
) -> String {
    let mut out = String::new();

    out.push_str(OVERVIEW_HEADER);
    out.push('\n');
    for period in overview {
        let _ = writeln!(out, "{}: {}", period.label, describe_period(period.report.as_ref()));
    }

    out.push('\n');
    out.push_str(MATCHES_HEADER);
    out.push('\n');
    match matches {
        SemanticMatches::Found(entries) => {
            for (index, entry) in entries.iter().enumerate() {
                let when = entry
                    .captured_at
                    .map(|at| format!(" {}", at.format("%Y-%m-%d %H:%M")))
                    .unwrap_or_default();
                let _ = writeln!(
                    out,
                    "{}. [similarity {:.2}{}] {}",
                    index + 1,
                    entry.score,
                    when,
                    clip(&entry.text, max_match_chars)
                );
            }
        }
        SemanticMatches::Empty => out.push_str("(none)\n"),
        SemanticMatches::Unavailable { reason } => {
            let _ = writeln!(out, "(unavailable: {reason})");
        }
    }

    out.push_str("\nINSTRUCTIONS\n");
    out.push_str(INSTRUCTIONS);
    out.push_str("\n\nQUESTION\n");
    out.push_str(question.trim());
    out.push('\n');
    out
}

fn describe_period(report: Option<&AggregateReport>) -> String {
    let Some(report) = report.filter(|r| r.has_data()) else {
        return NO_DATA.to_string();
    };

    let last_day = report.period_end - Duration::days(1);
    let mut line = format!(
        "{} to {}, {:.1} min tracked across {} snapshots, focus score {:.0}/100.",
        report.period_start.format("%Y-%m-%d"),
        last_day.format("%Y-%m-%d"),
        report.total_minutes(),
        report.snapshot_count,
        report.focus_score
    );

    if !report.top_apps.is_empty() {
        let apps = report
            .top_apps
            .iter()
            .map(|app| format!("{} {:.1} min ({:.0}%)", app.app_name, app.minutes(), app.percentage))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = write!(line, " Top apps: {apps}.");
    }

    if !report.category_minutes.is_empty() {
        let categories = report
            .category_minutes
            .iter()
            .map(|(category, minutes)| format!("{category} {minutes:.1} min"))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = write!(line, " Categories: {categories}.");
    }

    if !report.highlights.is_empty() {
        let _ = write!(line, " Highlights: {}.", report.highlights.join("; "));
    }

    line
}

/// At most `max_chars` characters, on a char boundary, whitespace collapsed.
fn clip(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut clipped: String = collapsed.chars().take(max_chars).collect();
    clipped.push('…');
    clipped
}
