use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::pipeline::Pipeline;
use crate::settings::CaptureSettings;

use super::frame::DisplayId;
use super::loop_worker::capture_loop;
use super::sources::FrameSource;

/// Owns the per-display capture loops. All loops share one cancellation
/// token and one drain signal.
pub struct CaptureController {
    handles: HashMap<DisplayId, JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    drain_tx: Option<watch::Sender<bool>>,
    pipeline: Option<Arc<Pipeline>>,
}

impl Default for CaptureController {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureController {
    pub fn new() -> Self {
        Self {
            handles: HashMap::new(),
            cancel_token: None,
            drain_tx: None,
            pipeline: None,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    pub fn active_displays(&self) -> Vec<DisplayId> {
        let mut displays: Vec<_> = self.handles.keys().copied().collect();
        displays.sort_unstable();
        displays
    }

    pub fn start(
        &mut self,
        sources: Vec<Arc<dyn FrameSource>>,
        pipeline: Arc<Pipeline>,
        settings: &CaptureSettings,
    ) -> Result<()> {
        if self.is_running() {
            bail!("capture already active");
        }
        if sources.is_empty() {
            bail!("no displays to capture");
        }

        let cancel_token = CancellationToken::new();
        // false = normal operation, true = finish the current capture then exit
        let (drain_tx, drain_rx) = watch::channel(false);

        let frame_interval = std::time::Duration::from_millis(settings.frame_interval_ms.max(1));
        let capture_timeout = std::time::Duration::from_secs(settings.capture_timeout_secs.max(1));

        for source in sources {
            let display_id = source.display_id();
            if self.handles.contains_key(&display_id) {
                info!("display {display_id} listed twice; starting one loop");
                continue;
            }

            let handle = tokio::spawn(capture_loop(
                source,
                Arc::clone(&pipeline),
                frame_interval,
                capture_timeout,
                cancel_token.clone(),
                drain_rx.clone(),
            ));
            self.handles.insert(display_id, handle);
        }

        info!("capture started on {} display(s)", self.handles.len());
        self.cancel_token = Some(cancel_token);
        self.drain_tx = Some(drain_tx);
        self.pipeline = Some(pipeline);
        Ok(())
    }

    /// Signal every loop to finish its current capture and exit.
    pub fn drain(&self) {
        if let Some(tx) = &self.drain_tx {
            let _ = tx.send(true);
            info!("drain signal sent to capture loops");
        }
    }

    /// Cancel all loops, wait for them, then wait for in-flight enrichment.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.drain_tx = None;

        let mut first_error = None;
        for (display_id, handle) in self.handles.drain() {
            if let Err(err) = handle
                .await
                .with_context(|| format!("capture loop for display {display_id} failed to join"))
            {
                first_error.get_or_insert(err);
            }
        }

        if let Some(pipeline) = self.pipeline.take() {
            pipeline.flush().await;
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
