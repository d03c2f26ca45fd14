use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::db::{AggregateReport, AppUsage, Database, Snapshot};
use crate::settings::StatsSettings;

use super::classifier::{ActivityCategory, AppClassifier};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

const MAX_HIGHLIGHTS: usize = 5;

#[derive(Default)]
struct AppTotals {
    seconds: f64,
    category: Option<ActivityCategory>,
    first_seen: usize,
}

/// Summarise `snapshots` (any order) over `[period_start, period_end)`.
///
/// Each snapshot is credited with the time until the next one, capped at
/// `max_gap_secs`; the last one gets `tail_secs`.
pub fn summarize(
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    snapshots: &[Snapshot],
    settings: &StatsSettings,
    classifier: &AppClassifier,
) -> AggregateReport {
    if snapshots.is_empty() {
        return AggregateReport::empty(period_start, period_end);
    }

    let mut ordered: Vec<&Snapshot> = snapshots.iter().collect();
    ordered.sort_by_key(|snapshot| snapshot.captured_at);

    let max_gap = settings.max_gap_secs.max(0) as f64;
    let tail = settings.tail_secs.max(0) as f64;

    let mut apps: HashMap<&str, AppTotals> = HashMap::new();
    let mut category_seconds: BTreeMap<ActivityCategory, f64> = BTreeMap::new();
    let mut total_seconds = 0.0;
    let mut weighted_seconds = 0.0;

    for (index, snapshot) in ordered.iter().enumerate() {
        let seconds = match ordered.get(index + 1) {
            Some(next) => {
                let gap = next.captured_at - snapshot.captured_at;
                (gap.num_milliseconds() as f64 / 1000.0).clamp(0.0, max_gap)
            }
            None => tail,
        };
        let category = classifier.classify(snapshot);

        let totals = apps.entry(snapshot.app_name.as_str()).or_insert_with(|| AppTotals {
            first_seen: index,
            ..AppTotals::default()
        });
        totals.seconds += seconds;
        totals.category.get_or_insert(category);

        *category_seconds.entry(category).or_insert(0.0) += seconds;
        total_seconds += seconds;
        weighted_seconds += seconds * category.weight();
    }

    let focus_score = if total_seconds > 0.0 {
        weighted_seconds / total_seconds * 100.0
    } else {
        0.0
    };

    let mut ranked: Vec<(&str, AppTotals)> = apps.into_iter().collect();
    ranked.sort_by(|(_, a), (_, b)| {
        b.seconds
            .partial_cmp(&a.seconds)
            .unwrap_or(Ordering::Equal)
            .then(a.first_seen.cmp(&b.first_seen))
    });

    let top_apps = ranked
        .into_iter()
        .take(settings.top_apps)
        .map(|(app_name, totals)| AppUsage {
            app_name: app_name.to_string(),
            category: totals
                .category
                .unwrap_or(ActivityCategory::Other)
                .label()
                .to_string(),
            seconds: totals.seconds,
            percentage: if total_seconds > 0.0 {
                totals.seconds / total_seconds * 100.0
            } else {
                0.0
            },
        })
        .collect();

    let category_minutes = category_seconds
        .into_iter()
        .map(|(category, seconds)| (category.label().to_string(), seconds / 60.0))
        .collect();

    AggregateReport {
        period_start,
        period_end,
        snapshot_count: ordered.len(),
        total_seconds,
        focus_score,
        top_apps,
        category_minutes,
        highlights: highlights(&ordered),
    }
}

/// AI notes first (in capture order), then the most frequent window titles.
fn highlights(ordered: &[&Snapshot]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();

    for note in ordered.iter().filter_map(|s| s.ai_note.as_deref()) {
        let note = note.trim();
        if !note.is_empty() && !out.iter().any(|existing| existing == note) {
            out.push(note.to_string());
            if out.len() == MAX_HIGHLIGHTS {
                return out;
            }
        }
    }

    let mut titles: Vec<(String, usize, usize)> = Vec::new();
    for (index, snapshot) in ordered.iter().enumerate() {
        let title = snapshot.window_title.trim();
        if title.is_empty() {
            continue;
        }
        let label = format!("{}: {}", snapshot.app_name, title);
        match titles.iter_mut().find(|(existing, _, _)| *existing == label) {
            Some(entry) => entry.1 += 1,
            None => titles.push((label, 1, index)),
        }
    }
    titles.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    for (label, _, _) in titles {
        if out.len() == MAX_HIGHLIGHTS {
            break;
        }
        if !out.contains(&label) {
            out.push(label);
        }
    }
    out
}

/// Computes reports from the snapshot store.
#[derive(Clone)]
pub struct StatsAggregator {
    db: Database,
    settings: StatsSettings,
    classifier: Arc<AppClassifier>,
}

impl StatsAggregator {
    pub fn new(db: Database, settings: StatsSettings, classifier: Arc<AppClassifier>) -> Self {
        Self {
            db,
            settings,
            classifier,
        }
    }

    pub fn classifier(&self) -> &AppClassifier {
        &self.classifier
    }

    pub async fn report(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<AggregateReport> {
        if period_end <= period_start {
            return Ok(AggregateReport::empty(period_start, period_end));
        }

        let snapshots = self.db.get_snapshots_in_range(period_start, period_end).await?;
        log_debug!(
            "summarizing {} snapshot(s) for {} .. {}",
            snapshots.len(),
            period_start,
            period_end
        );

        Ok(summarize(
            period_start,
            period_end,
            &snapshots,
            &self.settings,
            &self.classifier,
        ))
    }

    /// Compute and store the report. A failed cache write is logged and the
    /// fresh report is still returned.
    pub async fn report_and_cache(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<AggregateReport> {
        let report = self.report(period_start, period_end).await?;
        if let Err(err) = self.db.upsert_report(&report).await {
            log_warn!("failed to cache report: {err:#}");
        }
        Ok(report)
    }

    pub async fn cached_report(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Option<AggregateReport>> {
        self.db.get_report(period_start, period_end).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn snapshot(secs: i64, app: &str) -> Snapshot {
        Snapshot {
            id: format!("{app}-{secs}"),
            captured_at: t(secs),
            display_id: 1,
            image_path: None,
            extracted_text: String::new(),
            app_name: app.into(),
            window_title: String::new(),
            category: None,
            ai_note: None,
            redacted_regions: 0,
        }
    }

    fn run(snapshots: &[Snapshot]) -> AggregateReport {
        summarize(
            t(0),
            t(86_400),
            snapshots,
            &StatsSettings::default(),
            &AppClassifier::new(),
        )
    }

    #[test]
    fn empty_range_is_a_defined_no_data_report() {
        let report = run(&[]);
        assert!(!report.has_data());
        assert_eq!(report.total_seconds, 0.0);
        assert_eq!(report.focus_score, 0.0);
        assert!(report.top_apps.is_empty());
    }

    #[test]
    fn equal_gaps_sum_to_gaps_plus_tail() {
        let snapshots: Vec<_> = (0..6).map(|i| snapshot(i * 20, "Xcode")).collect();
        let report = run(&snapshots);
        assert_eq!(report.total_seconds, 5.0 * 20.0 + 5.0);
        assert_eq!(report.focus_score, 100.0);
    }

    #[test]
    fn long_gaps_are_capped() {
        let report = run(&[snapshot(0, "Xcode"), snapshot(3_600, "Xcode")]);
        assert_eq!(report.total_seconds, 60.0 + 5.0);
    }

    #[test]
    fn focus_score_weights_categories() {
        // 30s productive, 30s communication, 30s other + 5s tail other.
        let report = run(&[
            snapshot(0, "Xcode"),
            snapshot(30, "Slack"),
            snapshot(60, "Steam"),
            snapshot(90, "Steam"),
        ]);
        assert_eq!(report.total_seconds, 95.0);
        let expected = (30.0 + 15.0) / 95.0 * 100.0;
        assert!((report.focus_score - expected).abs() < 1e-9);
        assert!((report.category_minutes["other"] - 35.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn unsorted_input_is_ordered_by_time() {
        let report = run(&[snapshot(40, "Slack"), snapshot(0, "Xcode"), snapshot(20, "Xcode")]);
        assert_eq!(report.top_apps[0].app_name, "Xcode");
        assert_eq!(report.top_apps[0].seconds, 40.0);
        assert_eq!(report.top_apps[1].seconds, 5.0);
    }

    #[test]
    fn explicit_category_overrides_app_table() {
        let mut chat = snapshot(0, "Slack");
        chat.category = Some("core".into());
        let report = run(&[chat]);
        assert_eq!(report.focus_score, 100.0);
        assert_eq!(report.top_apps[0].category, "productive");
    }

    #[test]
    fn top_apps_are_limited() {
        let apps = ["A", "B", "C", "D", "E", "F", "G"];
        let snapshots: Vec<_> = apps
            .iter()
            .enumerate()
            .map(|(i, app)| snapshot(i as i64 * 10, app))
            .collect();
        let report = run(&snapshots);
        assert_eq!(report.top_apps.len(), 5);
        let sum: f64 = report.top_apps.iter().map(|a| a.percentage).sum();
        assert!(sum <= 100.0 + 1e-9);
    }

    #[test]
    fn highlights_prefer_notes_then_frequent_titles() {
        let mut a = snapshot(0, "Xcode");
        a.window_title = "main.rs".into();
        let mut b = snapshot(10, "Xcode");
        b.window_title = "main.rs".into();
        b.ai_note = Some("Fixed the parser".into());
        let mut c = snapshot(20, "Safari");
        c.window_title = "Docs".into();

        let report = run(&[a, b, c]);
        assert_eq!(
            report.highlights,
            vec!["Fixed the parser", "Xcode: main.rs", "Safari: Docs"]
        );
    }

    #[tokio::test]
    async fn report_reads_range_and_caches() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("glimpse.db")).unwrap();
        for snapshot in [snapshot(0, "Xcode"), snapshot(30, "Xcode"), snapshot(90_000, "Xcode")] {
            db.insert_snapshot(&snapshot).await.unwrap();
        }

        let aggregator =
            StatsAggregator::new(db, StatsSettings::default(), Arc::new(AppClassifier::new()));
        let report = aggregator.report_and_cache(t(0), t(86_400)).await.unwrap();
        assert_eq!(report.snapshot_count, 2);
        assert_eq!(report.total_seconds, 35.0);

        let cached = aggregator.cached_report(t(0), t(86_400)).await.unwrap().unwrap();
        assert_eq!(cached, report);
    }

    #[tokio::test]
    async fn same_day_ranges_are_cached_separately() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("glimpse.db")).unwrap();
        db.insert_snapshot(&snapshot(0, "Xcode")).await.unwrap();
        db.insert_snapshot(&snapshot(14_400, "Slack")).await.unwrap();

        let aggregator =
            StatsAggregator::new(db, StatsSettings::default(), Arc::new(AppClassifier::new()));
        aggregator.report_and_cache(t(0), t(3_600)).await.unwrap();
        aggregator.report_and_cache(t(14_400), t(18_000)).await.unwrap();

        let morning = aggregator.cached_report(t(0), t(3_600)).await.unwrap().unwrap();
        assert_eq!(morning.period_start, t(0));
        assert_eq!(morning.period_end, t(3_600));
        assert_eq!(morning.top_apps[0].app_name, "Xcode");

        let afternoon = aggregator.cached_report(t(14_400), t(18_000)).await.unwrap().unwrap();
        assert_eq!(afternoon.top_apps[0].app_name, "Slack");

        assert!(aggregator.cached_report(t(0), t(7_200)).await.unwrap().is_none());
    }
}
