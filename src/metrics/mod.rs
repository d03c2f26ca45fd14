mod types;

pub use types::{CaptureMetrics, FrameCounters, MetricsSnapshot, SystemMetrics};

use std::sync::Arc;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::Mutex;

use crate::sensing::DecisionReason;

const MAX_RECENT_CAPTURES: usize = 20;

/// Pipeline counters plus process CPU/RAM. Clones share state.
#[derive(Clone)]
pub struct PipelineMetrics {
    inner: Arc<Mutex<MetricsState>>,
}

struct MetricsState {
    recent_captures: Vec<CaptureMetrics>,
    counters: FrameCounters,
    system: System,
    pid: Pid,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());

        // Baseline for the CPU delta
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        Self {
            inner: Arc::new(Mutex::new(MetricsState {
                recent_captures: Vec::with_capacity(MAX_RECENT_CAPTURES),
                counters: FrameCounters::default(),
                system,
                pid,
            })),
        }
    }

    /// Current process CPU percentage and resident memory in MB.
    pub async fn sample_system_metrics(&self) -> (f32, f64) {
        let mut state = self.inner.lock().await;
        let sample = state.sample();
        (sample.cpu_percent, sample.memory_mb)
    }

    pub async fn record_decision(&self, reason: DecisionReason, keep: bool) {
        self.inner.lock().await.counters.record_decision(reason, keep);
    }

    pub async fn record_capture(&self, metrics: CaptureMetrics) {
        let mut state = self.inner.lock().await;

        if metrics.redacted_regions > 0 {
            state.counters.redacted_frames += 1;
        }
        if metrics.extract_ms.is_some() {
            state.counters.extracted += 1;
        }

        state.recent_captures.push(metrics);
        if state.recent_captures.len() > MAX_RECENT_CAPTURES {
            state.recent_captures.remove(0);
        }
    }

    pub async fn record_redaction_degraded(&self) {
        self.inner.lock().await.counters.redaction_degraded += 1;
    }

    pub async fn record_extraction_failed(&self) {
        self.inner.lock().await.counters.extraction_failed += 1;
    }

    pub async fn record_indexing(&self, ok: bool) {
        let mut state = self.inner.lock().await;
        if ok {
            state.counters.indexed += 1;
        } else {
            state.counters.index_failed += 1;
        }
    }

    pub async fn counters(&self) -> FrameCounters {
        self.inner.lock().await.counters.clone()
    }

    pub async fn get_snapshot(&self) -> MetricsSnapshot {
        let mut state = self.inner.lock().await;
        let system = state.sample();

        MetricsSnapshot {
            system,
            counters: state.counters.clone(),
            recent_captures: state.recent_captures.clone(),
        }
    }

    pub async fn reset(&self) {
        let mut state = self.inner.lock().await;
        let pid = state.pid;
        state.recent_captures.clear();
        state.counters = FrameCounters::default();
        state.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
    }
}

impl MetricsState {
    fn sample(&mut self) -> SystemMetrics {
        let pid = self.pid;
        self.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        match self.system.process(pid) {
            Some(process) => SystemMetrics {
                cpu_percent: process.cpu_usage(),
                memory_mb: process.memory() as f64 / 1024.0 / 1024.0,
            },
            None => SystemMetrics::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decisions_are_counted_by_reason() {
        let metrics = PipelineMetrics::new();
        metrics.record_decision(DecisionReason::FirstObservation, true).await;
        metrics.record_decision(DecisionReason::Unchanged, false).await;
        metrics.record_decision(DecisionReason::Throttled, false).await;

        let counters = metrics.counters().await;
        assert_eq!(counters.observed, 3);
        assert_eq!(counters.kept, 1);
        assert_eq!(counters.unchanged, 1);
        assert_eq!(counters.throttled, 1);

        metrics.reset().await;
        assert_eq!(metrics.counters().await, FrameCounters::default());
    }
}
