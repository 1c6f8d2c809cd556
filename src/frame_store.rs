//! Latest-frame store
//!
//! ## Responsibilities
//!
//! - Hold the most recent JPEG together with the sidecar metadata it was
//!   captured with, as one coherent snapshot
//! - Wake the frame broadcaster through a capacity-1 coalescing signal
//!
//! The captor never blocks on consumers: if a wakeup is already pending,
//! the signal for the newer frame is dropped and the consumer observes the
//! newest frame when it gets around to reading.

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};

use crate::liveview::types::{AfStatus, Rotation};

/// One captured frame and the metadata read alongside it
#[derive(Debug, Clone, Default)]
pub struct StoredFrame {
    pub jpeg: Bytes,
    /// Device-reported render dimensions of the live-view JPEG
    pub lv_width: i16,
    pub lv_height: i16,
    /// Full sensor frame dimensions
    pub width: i16,
    pub height: i16,
    pub focus_frame_width: i16,
    pub focus_frame_height: i16,
    pub focus_x: i16,
    pub focus_y: i16,
    pub rotation: Rotation,
    pub auto_focus: AfStatus,
    pub recording: bool,
    pub iso: i32,
    pub f_number: String,
}

/// Single-slot store for the latest frame
pub struct FrameStore {
    cell: Mutex<Option<StoredFrame>>,
    notify_tx: mpsc::Sender<()>,
}

impl FrameStore {
    /// Create the store and the new-frame wakeup channel.
    pub fn new() -> (Self, mpsc::Receiver<()>) {
        let (notify_tx, notify_rx) = mpsc::channel(1);
        (
            Self {
                cell: Mutex::new(None),
                notify_tx,
            },
            notify_rx,
        )
    }

    /// Replace the latest frame and signal consumers.
    pub async fn publish(&self, frame: StoredFrame) {
        {
            let mut cell = self.cell.lock().await;
            *cell = Some(frame);
        }
        // Write first, signal after: consumers that wake observe the write.
        let _ = self.notify_tx.try_send(());
    }

    /// Copy of the latest JPEG bytes, if any frame has been captured.
    pub async fn latest_jpeg(&self) -> Option<Bytes> {
        let cell = self.cell.lock().await;
        cell.as_ref().map(|f| f.jpeg.clone())
    }

    /// Snapshot of the latest frame with its sidecar metadata.
    pub async fn latest(&self) -> Option<StoredFrame> {
        let cell = self.cell.lock().await;
        cell.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: u8) -> StoredFrame {
        StoredFrame {
            jpeg: Bytes::from(vec![tag; 4]),
            lv_width: 640,
            lv_height: 480,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn single_read_observes_the_newest_frame() {
        let (store, _rx) = FrameStore::new();
        for tag in 0..10u8 {
            store.publish(frame(tag)).await;
        }
        let latest = store.latest().await.unwrap();
        assert_eq!(latest.jpeg[0], 9);
    }

    #[tokio::test]
    async fn notifications_coalesce_without_blocking_the_writer() {
        let (store, mut rx) = FrameStore::new();
        // No consumer draining; publishes must not block.
        for tag in 0..5u8 {
            store.publish(frame(tag)).await;
        }
        // Exactly one pending wakeup survives.
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        // And it corresponds to the newest frame.
        assert_eq!(store.latest_jpeg().await.unwrap()[0], 4);
    }
}
