//! Live-view server core
//!
//! ## Responsibilities
//!
//! - Own the serialized MTP gateway and all camera-side state
//! - Run the worker set: live-view lifecycle, autofocus, frame captor,
//!   frame broadcaster, info broadcaster
//! - Manage stream / control / motion client registries
//! - Apply inbound control messages
//!
//! The server is constructed once, `run()` once, and terminates when the
//! cancellation token fires. Live view is ended best-effort on the way out.

pub mod camera;
pub mod frame;
pub mod types;
mod workers;

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::camera_models::{self, Model};
use crate::device::MtpDevice;
use crate::error::{Error, Result};
use crate::frame_store::FrameStore;
use crate::rate::RateCounter;
use crate::ticker::MutableTicker;
use types::{ControlPayload, InfoPayload};

/// Default autofocus cadence in seconds
const DEFAULT_AF_INTERVAL_SECS: i64 = 5;

/// Capacity of each motion (MJPEG) client queue; a full queue drops the
/// frame for that client only.
const MOTION_CLIENT_QUEUE: usize = 4;

/// Live-view server state shared by workers and HTTP handlers
pub struct LvServer {
    device: Option<Arc<dyn MtpDevice>>,
    model: Model,
    dummy: bool,
    max_resolution: bool,

    /// Serializes every MTP round-trip, including composite sequences.
    mtp_lock: Mutex<()>,

    frames: FrameStore,
    new_frame_rx: std::sync::Mutex<Option<mpsc::Receiver<()>>>,
    fps_rate: RateCounter,

    info: Mutex<InfoPayload>,

    stream_clients: RwLock<HashMap<Uuid, mpsc::UnboundedSender<Message>>>,
    control_clients: RwLock<HashMap<Uuid, mpsc::UnboundedSender<Message>>>,
    motion_clients: RwLock<HashMap<Uuid, mpsc::Sender<Bytes>>>,

    af_interval: AtomicI64,
    af_ticker: MutableTicker,
    af_tick_rx: std::sync::Mutex<Option<mpsc::Receiver<()>>>,
    af_now_tx: mpsc::Sender<()>,
    af_now_rx: std::sync::Mutex<Option<mpsc::Receiver<()>>>,

    lr_fps: AtomicI64,
}

impl LvServer {
    /// Build the server against an attached device, or in dummy mode when
    /// `device` is `None`.
    ///
    /// Resolving the device identity is fatal; failing to enumerate ISO or
    /// f-number choices is not, those fall back to placeholder lists.
    pub async fn new(device: Option<Arc<dyn MtpDevice>>, max_resolution: bool) -> Result<Self> {
        let dummy = device.is_none();

        let model = match &device {
            Some(dev) => {
                let id = dev.id().await?;
                tracing::debug!(
                    manufacturer = %id.manufacturer,
                    product = %id.product,
                    serial_number = %id.serial_number,
                    "device identity"
                );
                match camera_models::match_product(&id.product) {
                    Some(m) => {
                        tracing::debug!(model = m.name, "model matched");
                        m
                    }
                    None => {
                        let m = camera_models::generic();
                        tracing::debug!(
                            model = m.name,
                            "model didn't match, falling back to the generic model"
                        );
                        m
                    }
                }
            }
            None => {
                tracing::info!("no device attached, running in dummy mode");
                camera_models::generic()
            }
        };

        let (frames, new_frame_rx) = FrameStore::new();
        let (af_ticker, af_tick_rx) =
            MutableTicker::new(Duration::from_secs(DEFAULT_AF_INTERVAL_SECS as u64));
        let (af_now_tx, af_now_rx) = mpsc::channel(1);

        let server = Self {
            device,
            model,
            dummy,
            max_resolution,
            mtp_lock: Mutex::new(()),
            frames,
            new_frame_rx: std::sync::Mutex::new(Some(new_frame_rx)),
            fps_rate: RateCounter::new(Duration::from_secs(1)),
            info: Mutex::new(InfoPayload {
                af: DEFAULT_AF_INTERVAL_SECS,
                ..Default::default()
            }),
            stream_clients: RwLock::new(HashMap::new()),
            control_clients: RwLock::new(HashMap::new()),
            motion_clients: RwLock::new(HashMap::new()),
            af_interval: AtomicI64::new(DEFAULT_AF_INTERVAL_SECS),
            af_ticker,
            af_tick_rx: std::sync::Mutex::new(Some(af_tick_rx)),
            af_now_tx,
            af_now_rx: std::sync::Mutex::new(Some(af_now_rx)),
            lr_fps: AtomicI64::new(0),
        };

        // The choice lists are fixed for the life of the session.
        let (isos, current_iso) = match server.iso_choices().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "failed to obtain ISO list");
                (vec![0], 0)
            }
        };
        let (fns, current_fn) = match server.fn_choices().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "failed to obtain f-number list");
                (vec!["0".to_string()], "0".to_string())
            }
        };
        {
            let mut info = server.info.lock().await;
            info.isos = isos;
            info.iso = current_iso;
            info.fns = fns;
            info.f_number = current_fn;
        }

        Ok(server)
    }

    /// Run all workers until cancellation or the first worker error.
    ///
    /// Live view is ended best-effort on the way out regardless of why the
    /// workers stopped.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let result = self.run_workers(cancel).await;
        if let Err(e) = self.end_live_view().await {
            tracing::warn!(error = %e, "failed to end live view during shutdown");
        }
        result
    }

    async fn run_workers(&self, cancel: CancellationToken) -> Result<()> {
        let taken = (
            self.new_frame_rx.lock().unwrap().take(),
            self.af_tick_rx.lock().unwrap().take(),
            self.af_now_rx.lock().unwrap().take(),
        );
        let (Some(new_frame_rx), Some(af_tick_rx), Some(af_now_rx)) = taken else {
            return Err(Error::Internal("run() may only be called once".to_string()));
        };

        tokio::try_join!(
            self.worker_live_view(cancel.clone()),
            self.worker_af(af_tick_rx, af_now_rx, cancel.clone()),
            self.frame_captor(cancel.clone()),
            self.worker_broadcast_frames(new_frame_rx, cancel.clone()),
            self.worker_broadcast_info(cancel),
        )?;
        Ok(())
    }

    /// Latest captured JPEG, for the snapshot endpoint.
    pub async fn snapshot(&self) -> Option<Bytes> {
        self.frames.latest_jpeg().await
    }

    /// Apply one control message. Fields are evaluated in canonical order;
    /// a failing field does not abort the ones after it.
    pub async fn apply_control(&self, p: ControlPayload) {
        if let Some(af) = p.af_interval {
            {
                let mut info = self.info.lock().await;
                info.af = af;
            }
            if af > 0 {
                tracing::debug!("control: enable AF");
                self.af_ticker.start();
            } else {
                tracing::debug!("control: disable AF");
                self.af_ticker.stop();
                return;
            }
            self.af_interval.store(af, Ordering::SeqCst);
            match self.af_ticker.set_interval(Duration::from_secs(af as u64)) {
                Ok(()) => tracing::debug!(interval = af, "control: set AF interval"),
                Err(e) => {
                    tracing::debug!(interval = af, error = %e, "control: failed to set AF interval")
                }
            }
        }

        if p.af_focus_now == Some(true) {
            tracing::debug!("control: focus now");
            // Coalesce: a pending trigger absorbs this one.
            let _ = self.af_now_tx.try_send(());
        }

        if let Some(lr) = p.lr_fps {
            {
                let mut info = self.info.lock().await;
                info.lr = lr;
            }
            if lr > 0 {
                tracing::debug!(fps = lr, "control: set rate limit");
            } else {
                tracing::debug!("control: disable rate limit");
            }
            self.lr_fps.store(lr, Ordering::SeqCst);
        }

        if let Some(iso) = p.iso {
            tracing::debug!(iso, "control: set ISO");
            if let Err(e) = self.set_iso(iso).await {
                tracing::error!(error = %e, "control: failed to set ISO");
            }
        }

        if let Some(fn_str) = p.f_number.as_deref() {
            tracing::debug!(f_number = %fn_str, "control: set f-number");
            if let Err(e) = self.set_fn(fn_str).await {
                tracing::error!(error = %e, "control: failed to set f-number");
            }
        }
    }

    // Client registries. Membership is add-on-connect / remove-on-disconnect;
    // the broadcasters never prune mid-broadcast.

    pub async fn register_stream_client(&self) -> (Uuid, mpsc::UnboundedReceiver<Message>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.stream_clients.write().await.insert(id, tx);
        tracing::info!(client_id = %id, "stream client connected");
        (id, rx)
    }

    pub async fn unregister_stream_client(&self, id: &Uuid) {
        if self.stream_clients.write().await.remove(id).is_some() {
            tracing::info!(client_id = %id, "stream client disconnected");
        }
    }

    pub async fn register_control_client(&self) -> (Uuid, mpsc::UnboundedReceiver<Message>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.control_clients.write().await.insert(id, tx);
        tracing::info!(client_id = %id, "control client connected");
        (id, rx)
    }

    pub async fn unregister_control_client(&self, id: &Uuid) {
        if self.control_clients.write().await.remove(id).is_some() {
            tracing::info!(client_id = %id, "control client disconnected");
        }
    }

    /// Register an MJPEG writer. The extra sender handle lets the caller
    /// watch for disconnect (`Sender::closed`) and unregister.
    pub async fn register_motion_client(&self) -> (Uuid, mpsc::Sender<Bytes>, mpsc::Receiver<Bytes>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(MOTION_CLIENT_QUEUE);
        self.motion_clients.write().await.insert(id, tx.clone());
        tracing::info!(client_id = %id, "mjpeg client connected");
        (id, tx, rx)
    }

    pub async fn unregister_motion_client(&self, id: &Uuid) {
        if self.motion_clients.write().await.remove(id).is_some() {
            tracing::info!(client_id = %id, "mjpeg client disconnected");
        }
    }
}
