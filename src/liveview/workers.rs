//! Worker loops
//!
//! Five long-lived loops cooperate through the frame store, the client
//! registries and the MTP lock:
//!
//! - lifecycle: polls live-view status at 1 Hz and re-enters live view
//! - autofocus: fires AF on the mutable ticker or the focus-now trigger
//! - captor: the single producer, pulls frames at device pace
//! - frame broadcaster: fans the newest frame out to stream and MJPEG clients
//! - info broadcaster: 1 Hz metadata snapshot to control clients
//!
//! No error crosses a worker boundary; workers only return on cancellation.

use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::extract::ws::Message;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::frame_store::StoredFrame;
use crate::liveview::frame::LiveViewFrame;
use crate::liveview::LvServer;

/// Delay before the captor starts, letting the lifecycle worker prime
/// live view first.
const CAPTOR_PRIME_DELAY: Duration = Duration::from_millis(500);

/// Backoff after a failed or rejected capture.
const CAPTURE_BACKOFF: Duration = Duration::from_secs(1);

impl LvServer {
    /// Sleep that returns `true` when cancellation fired during the wait.
    async fn idle(&self, cancel: &CancellationToken, duration: Duration) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }

    /// Live-view lifecycle: keep the camera in live view.
    pub(super) async fn worker_live_view(&self, cancel: CancellationToken) -> Result<()> {
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tick.tick() => {}
            }

            match self.live_view_status().await {
                Err(e) => {
                    tracing::warn!(error = %e, "lifecycle: failed to get live view status");
                    continue;
                }
                Ok(true) => continue,
                Ok(false) => {}
            }

            if let Err(e) = self.start_live_view().await {
                tracing::warn!(error = %e, "lifecycle: failed to start live view");
            }
        }
    }

    /// Autofocus: fire AF on ticker or on demand.
    pub(super) async fn worker_af(
        &self,
        mut ticks: mpsc::Receiver<()>,
        mut now: mpsc::Receiver<()>,
        cancel: CancellationToken,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                t = ticks.recv() => {
                    if t.is_none() {
                        return Ok(());
                    }
                }
                n = now.recv() => {
                    if n.is_none() {
                        return Ok(());
                    }
                }
            }

            if let Err(e) = self.auto_focus().await {
                tracing::warn!(error = %e, "af: failed to drive autofocus");
            }
        }
    }

    /// Frame captor: the sole producer of frames.
    pub(super) async fn frame_captor(&self, cancel: CancellationToken) -> Result<()> {
        if self.idle(&cancel, CAPTOR_PRIME_DELAY).await {
            return Ok(());
        }

        let mut last = Instant::now();

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            if self.dummy {
                if self.idle(&cancel, Duration::from_secs(1)).await {
                    return Ok(());
                }
                continue;
            }

            // Rate limit, re-read every iteration so control takes effect
            // immediately. The sleep happens outside every lock.
            let lr = self.lr_fps.load(Ordering::SeqCst);
            if lr > 0 {
                let next = last + Duration::from_secs(1) / lr as u32;
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep_until(next) => {}
                }
            }
            last = Instant::now();

            let frame = match self.capture_live_view_img().await {
                Ok(frame) => frame,
                Err(Error::NotLiveView) => {
                    // The lifecycle worker will re-enter live view.
                    if self.idle(&cancel, CAPTURE_BACKOFF).await {
                        return Ok(());
                    }
                    continue;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "captor: failed to obtain a frame");
                    if self.idle(&cancel, CAPTURE_BACKOFF).await {
                        return Ok(());
                    }
                    continue;
                }
            };

            // Metadata failures never drop the frame.
            let iso = match self.iso_choices().await {
                Ok((_, current)) => current,
                Err(e) => {
                    tracing::warn!(error = %e, "captor: failed to get current ISO");
                    0
                }
            };
            let f_number = match self.fn_choices().await {
                Ok((_, current)) => current,
                Err(e) => {
                    tracing::warn!(error = %e, "captor: failed to get current f-number");
                    "0".to_string()
                }
            };

            self.store_frame(frame, iso, f_number).await;
            self.fps_rate.incr();
        }
    }

    /// Write the frame plus sidecar into the store and mirror the
    /// broadcast-visible fields into the info cell.
    async fn store_frame(&self, lv: LiveViewFrame, iso: i32, f_number: String) {
        let stored = StoredFrame {
            jpeg: lv.jpeg,
            lv_width: lv.lv_width,
            lv_height: lv.lv_height,
            width: lv.width,
            height: lv.height,
            focus_frame_width: lv.focus_frame_width,
            focus_frame_height: lv.focus_frame_height,
            focus_x: lv.focus_x,
            focus_y: lv.focus_y,
            rotation: lv.rotation,
            auto_focus: lv.auto_focus,
            recording: lv.recording,
            iso,
            f_number: f_number.clone(),
        };
        self.frames.publish(stored).await;

        let mut info = self.info.lock().await;
        info.width = lv.lv_width as i32;
        info.height = lv.lv_height as i32;
        info.iso = iso;
        info.f_number = f_number;
    }

    /// Frame broadcaster: wake on the coalescing signal, fan the newest
    /// frame out to every stream and MJPEG client.
    pub(super) async fn worker_broadcast_frames(
        &self,
        mut new_frame: mpsc::Receiver<()>,
        cancel: CancellationToken,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                n = new_frame.recv() => {
                    if n.is_none() {
                        return Ok(());
                    }
                }
            }

            let Some(jpeg) = self.frames.latest_jpeg().await else {
                continue;
            };
            if jpeg.is_empty() {
                continue;
            }

            let b64 = BASE64.encode(&jpeg);

            // Stream set before motion set, held for the whole iteration.
            let stream = self.stream_clients.read().await;
            let motion = self.motion_clients.read().await;

            for (id, tx) in stream.iter() {
                if tx.send(Message::Text(b64.clone())).is_err() {
                    tracing::warn!(client_id = %id, "broadcast: failed to send a frame");
                }
            }

            for (id, tx) in motion.iter() {
                match tx.try_send(jpeg.clone()) {
                    Ok(()) => {}
                    // A slow client misses this frame; it catches up on the next.
                    Err(mpsc::error::TrySendError::Full(_)) => {}
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        tracing::warn!(client_id = %id, "broadcast: failed to send a frame");
                    }
                }
            }
        }
    }

    /// Info broadcaster: once per second, push the metadata snapshot with
    /// the latest frame embedded to every control client.
    pub(super) async fn worker_broadcast_info(&self, cancel: CancellationToken) -> Result<()> {
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tick.tick() => {}
            }

            let jpeg = self.frames.latest_jpeg().await.unwrap_or_default();
            let payload = {
                let mut info = self.info.lock().await.clone();
                info.fps = self.fps_rate.rate() as i64;
                info.frame = BASE64.encode(&jpeg);
                info
            };

            let json = match serde_json::to_string(&payload) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "info: failed to marshal payload");
                    continue;
                }
            };

            let clients = self.control_clients.read().await;
            for (id, tx) in clients.iter() {
                if tx.send(Message::Text(json.clone())).is_err() {
                    tracing::warn!(client_id = %id, "info: failed to send a snapshot");
                }
            }
        }
    }
}
