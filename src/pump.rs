use crate::aggregator::FrameAggregator;
use crate::types::RawFrame;
use crate::{BridgeError, Result};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Runs [`FrameAggregator::on_frame`] on a dedicated thread.
///
/// Frames arrive through a small bounded channel. When the aggregation
/// thread falls behind, new frames are dropped instead of queued: the
/// consumer only ever wants the latest snapshot.
pub struct FramePump {
    sender: Option<Sender<RawFrame>>,
    stop_flag: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl FramePump {
    /// Spawn the aggregation thread, bounded by the aggregator's `pump_capacity`.
    pub fn start(aggregator: Arc<FrameAggregator>) -> Result<FramePump> {
        let capacity = aggregator.config().pump_capacity.max(1);
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();

        let thread = std::thread::Builder::new()
            .name("xrbridge-frames".into())
            .spawn(move || {
                aggregation_loop(aggregator, receiver, stop_clone);
            })
            .map_err(BridgeError::ThreadSpawn)?;

        Ok(FramePump {
            sender: Some(sender),
            stop_flag,
            dropped: Arc::new(AtomicU64::new(0)),
            thread: Some(thread),
        })
    }

    /// Hand a frame to the aggregation thread without blocking.
    ///
    /// Returns `Ok(false)` when the frame was dropped because the channel is full.
    pub fn submit(&self, frame: RawFrame) -> Result<bool> {
        let sender = self.sender.as_ref().ok_or(BridgeError::PumpStopped)?;
        match sender.try_send(frame) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::trace!("Frame channel full, dropping frame");
                Ok(false)
            }
            Err(TrySendError::Disconnected(_)) => Err(BridgeError::PumpStopped),
        }
    }

    /// Frames dropped because the aggregation thread was busy.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_active(&self) -> bool {
        !self.stop_flag.load(Ordering::Relaxed)
    }

    /// Stop the pump after the frames already queued, and join the thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        // Disconnecting lets the loop drain what is queued and exit.
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for FramePump {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn aggregation_loop(aggregator: Arc<FrameAggregator>, receiver: Receiver<RawFrame>, stop_flag: Arc<AtomicBool>) {
    log::info!("Frame pump started");

    loop {
        // Timeout so a stop request is noticed even while senders are alive.
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(frame) => aggregator.on_frame(&frame),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if stop_flag.load(Ordering::Relaxed) {
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    log::info!("Frame pump stopped");
}
