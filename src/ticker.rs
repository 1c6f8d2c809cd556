//! Mutable ticker
//!
//! A periodic tick source whose interval and running state can change at
//! runtime. Ticks are delivered over a capacity-1 channel: if the consumer
//! has not drained the previous tick, new ticks coalesce into it.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::{Error, Result};

enum TickerCmd {
    Start,
    Stop,
    SetInterval(Duration),
}

/// Handle to a ticker driver task.
///
/// Dropping the handle stops the driver.
pub struct MutableTicker {
    cmd_tx: mpsc::UnboundedSender<TickerCmd>,
}

impl MutableTicker {
    /// Create a running ticker and its tick channel.
    pub fn new(interval: Duration) -> (Self, mpsc::Receiver<()>) {
        let (tick_tx, tick_rx) = mpsc::channel(1);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(drive(interval, cmd_rx, tick_tx));
        (Self { cmd_tx }, tick_rx)
    }

    /// Begin producing ticks at the current interval. Idempotent.
    pub fn start(&self) {
        let _ = self.cmd_tx.send(TickerCmd::Start);
    }

    /// Stop producing ticks. A tick already sitting in the channel is not
    /// rescinded. Idempotent.
    pub fn stop(&self) {
        let _ = self.cmd_tx.send(TickerCmd::Stop);
    }

    /// Adopt a new interval for subsequent ticks.
    pub fn set_interval(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(Error::Validation(
                "ticker interval must be positive".to_string(),
            ));
        }
        let _ = self.cmd_tx.send(TickerCmd::SetInterval(interval));
        Ok(())
    }
}

async fn drive(
    mut interval: Duration,
    mut cmd_rx: mpsc::UnboundedReceiver<TickerCmd>,
    tick_tx: mpsc::Sender<()>,
) {
    let mut running = true;
    let mut deadline = Instant::now() + interval;

    loop {
        if running {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    None => return,
                    Some(TickerCmd::Start) => {}
                    Some(TickerCmd::Stop) => running = false,
                    Some(TickerCmd::SetInterval(d)) => {
                        interval = d;
                        deadline = Instant::now() + interval;
                    }
                },
                _ = tokio::time::sleep_until(deadline) => {
                    // Coalesce: a pending undelivered tick absorbs this one.
                    let _ = tick_tx.try_send(());
                    deadline = Instant::now() + interval;
                }
            }
        } else {
            match cmd_rx.recv().await {
                None => return,
                Some(TickerCmd::Start) => {
                    running = true;
                    deadline = Instant::now() + interval;
                }
                Some(TickerCmd::Stop) => {}
                Some(TickerCmd::SetInterval(d)) => interval = d,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test]
    async fn delivers_ticks_at_interval() {
        let (_ticker, mut rx) = MutableTicker::new(Duration::from_millis(20));
        timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("first tick within one interval")
            .unwrap();
    }

    #[tokio::test]
    async fn stop_suppresses_ticks_until_restart() {
        let (ticker, mut rx) = MutableTicker::new(Duration::from_millis(20));
        ticker.stop();
        // Drain anything delivered before the stop landed.
        tokio::time::sleep(Duration::from_millis(10)).await;
        while rx.try_recv().is_ok() {}

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(rx.try_recv().is_err(), "no tick while stopped");

        ticker.start();
        timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("tick resumes after start")
            .unwrap();
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let (ticker, _rx) = MutableTicker::new(Duration::from_millis(20));
        assert!(ticker.set_interval(Duration::ZERO).is_err());
    }

    #[tokio::test]
    async fn reapplying_the_same_interval_does_not_double_the_rate() {
        let (ticker, mut rx) = MutableTicker::new(Duration::from_millis(40));
        ticker.start();
        ticker.set_interval(Duration::from_millis(40)).unwrap();
        ticker.start();
        ticker.set_interval(Duration::from_millis(40)).unwrap();

        let mut ticks = 0;
        let window = tokio::time::sleep(Duration::from_millis(210));
        tokio::pin!(window);
        loop {
            tokio::select! {
                _ = &mut window => break,
                t = rx.recv() => {
                    if t.is_some() { ticks += 1; } else { break; }
                }
            }
        }
        // ~5 ticks expected in 210ms at 40ms cadence; doubling would give ~10.
        assert!((3..=7).contains(&ticks), "saw {ticks} ticks");
    }
}
