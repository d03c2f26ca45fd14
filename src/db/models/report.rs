//! Aggregate report data model.
//!
//! Reports are derived data: the cache row is replaced wholesale whenever the
//! same period is recomputed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppUsage {
    pub app_name: String,
    pub category: String,
    pub seconds: f64,
    pub percentage: f64,
}

impl AppUsage {
    pub fn minutes(&self) -> f64 {
        self.seconds / 60.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateReport {
    pub period_start: DateTime<Utc>,
    /// Exclusive.
    pub period_end: DateTime<Utc>,
    pub snapshot_count: usize,
    pub total_seconds: f64,
    /// Weighted share of tracked time in productive apps, 0..=100.
    pub focus_score: f64,
    pub top_apps: Vec<AppUsage>,
    pub category_minutes: BTreeMap<String, f64>,
    pub highlights: Vec<String>,
}

impl AggregateReport {
    pub fn empty(period_start: DateTime<Utc>, period_end: DateTime<Utc>) -> Self {
        Self {
            period_start,
            period_end,
            snapshot_count: 0,
            total_seconds: 0.0,
            focus_score: 0.0,
            top_apps: Vec::new(),
            category_minutes: BTreeMap::new(),
            highlights: Vec::new(),
        }
    }

    pub fn has_data(&self) -> bool {
        self.snapshot_count > 0
    }

    pub fn total_minutes(&self) -> f64 {
        self.total_seconds / 60.0
    }
}
