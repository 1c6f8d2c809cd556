//! MTP Camserver Library
//!
//! Live-view streaming server for tethered Nikon still cameras speaking
//! MTP/PTP.
//!
//! ## Architecture
//!
//! 1. Device gateway - serialized, typed boundary to the MTP transport
//! 2. MutableTicker - runtime-adjustable tick source (AF cadence)
//! 3. FrameStore - latest-frame cell with a coalescing wakeup
//! 4. LvServer - lifecycle, autofocus, captor and broadcast workers
//! 5. WebAPI - `/stream`, `/control`, `/mjpeg`, `/snapshot` endpoints
//!
//! ## Design Principles
//!
//! - One mutex serializes every MTP round-trip; the device cannot be
//!   parallelized and all calls are short
//! - Latest-wins fan-out: the captor never blocks on a slow client
//! - Dummy mode short-circuits every gateway wrapper so all control paths
//!   run end-to-end without hardware
//!
//! The MTP/USB transport itself lives outside this crate; implement
//! [`device::MtpDevice`] and hand it to [`liveview::LvServer::new`].

pub mod camera_models;
pub mod device;
pub mod error;
pub mod frame_store;
pub mod liveview;
pub mod mjpeg;
pub mod models;
pub mod rate;
pub mod state;
pub mod ticker;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
