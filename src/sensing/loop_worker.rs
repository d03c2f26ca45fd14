use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::pipeline::Pipeline;

use super::frame::Frame;
use super::sources::FrameSource;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Capture loop for one display. Frames are observed in capture order on
/// this task; enrichment of kept frames runs on the pipeline's own tasks.
pub async fn capture_loop(
    source: Arc<dyn FrameSource>,
    pipeline: Arc<Pipeline>,
    frame_interval: Duration,
    capture_timeout: Duration,
    cancel_token: CancellationToken,
    mut drain_rx: watch::Receiver<bool>,
) {
    let display_id = source.display_id();
    let mut ticker = tokio::time::interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log_info!("capture loop started for display {display_id}");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if *drain_rx.borrow() {
                    log_info!("capture loop for display {display_id} drained");
                    break;
                }

                if let Err(err) = capture_once(&source, &pipeline, capture_timeout).await {
                    log_error!("capture failed for display {display_id}: {err:?}");
                }
            }
            changed = drain_rx.changed() => {
                if changed.is_err() || *drain_rx.borrow() {
                    log_info!("capture loop for display {display_id} drained");
                    break;
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("capture loop for display {display_id} shutting down");
                break;
            }
        }
    }
}

/// Only the screenshot is bounded by `capture_timeout`; a captured frame is
/// always carried through detection and storage.
async fn capture_once(
    source: &Arc<dyn FrameSource>,
    pipeline: &Arc<Pipeline>,
    capture_timeout: Duration,
) -> Result<()> {
    let capture_start = Instant::now();
    let captured_at = Utc::now();

    let capture = tokio::task::spawn_blocking({
        let source = Arc::clone(source);
        move || source.capture()
    });
    let image = match tokio::time::timeout(capture_timeout, capture).await {
        Ok(joined) => joined
            .context("screen capture worker join failed")?
            .context("screen capture failed")?,
        Err(_) => {
            log_warn!(
                "capture timeout (> {}s) for display {}",
                capture_timeout.as_secs(),
                source.display_id()
            );
            return Ok(());
        }
    };
    let screenshot_ms = capture_start.elapsed().as_millis();

    let frame = Frame::new(source.display_id(), captured_at, image);
    let decision = pipeline.submit(frame).await?;

    log_debug!(
        "display {} frame {:?} (distance {:?}) in {}ms, screenshot {}ms",
        source.display_id(),
        decision.reason,
        decision.distance,
        capture_start.elapsed().as_millis(),
        screenshot_ms
    );
    Ok(())
}
