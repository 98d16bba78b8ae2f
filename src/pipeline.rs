//! Frame pipeline: a capacity-1 drop-oldest slot feeding one worker thread.
//!
//! Capture sources push into the slot and never wait. When the worker is still
//! busy with the previous frame, the waiting frame is replaced by the newer one,
//! so the worker always processes the freshest frame available.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use anyhow::{anyhow, Context, Result};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use crate::context::AuxSignals;
use crate::frame::RawFrame;
use crate::session::{PerceptionSession, SessionStats};

/// Single-frame mailbox. Holding both ends lets a producer evict the stale frame.
pub struct FrameSlot {
    tx: Sender<RawFrame>,
    rx: Receiver<RawFrame>,
    dropped: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl FrameSlot {
    pub fn new() -> Self {
        let (tx, rx) = channel::bounded(1);
        Self {
            tx,
            rx,
            dropped: Arc::new(AtomicU64::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn sender(&self) -> FrameSender {
        FrameSender {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            dropped: Arc::clone(&self.dropped),
            closed: Arc::clone(&self.closed),
        }
    }

    /// Take the waiting frame, if any.
    pub fn try_take(&self) -> Option<RawFrame> {
        self.rx.try_recv().ok()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Refuse further pushes and discard the waiting frame.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        while self.rx.try_recv().is_ok() {}
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn receiver(&self) -> Receiver<RawFrame> {
        self.rx.clone()
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer handle given to capture sources.
#[derive(Clone)]
pub struct FrameSender {
    tx: Sender<RawFrame>,
    rx: Receiver<RawFrame>,
    dropped: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl FrameSender {
    /// Offer a frame. Never blocks; returns false once the slot is closed.
    pub fn push(&self, frame: RawFrame) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let mut frame = frame;
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return true,
                Err(TrySendError::Full(back)) => {
                    if self.rx.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    frame = back;
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_dropped: u64,
    pub session: SessionStats,
}

pub struct Pipeline;

impl Pipeline {
    /// Move `session` onto a dedicated worker thread fed by a fresh frame slot.
    pub fn spawn(session: PerceptionSession) -> Result<PipelineHandle> {
        let slot = FrameSlot::new();
        let frames = slot.receiver();
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
        let aux = Arc::new(Mutex::new(AuxSignals::default()));
        let processed = Arc::new(AtomicU64::new(0));

        let worker = {
            let aux = Arc::clone(&aux);
            let processed = Arc::clone(&processed);
            let closed = CloseOnExit(Arc::clone(&slot.closed));
            std::thread::Builder::new()
                .name("see-worker".to_string())
                .spawn(move || {
                    let _closed = closed;
                    run_worker(session, frames, shutdown_rx, aux, processed)
                })
                .context("failed to spawn pipeline worker")?
        };
        log::info!("pipeline worker started");

        Ok(PipelineHandle {
            slot,
            aux,
            processed,
            shutdown: Some(shutdown_tx),
            worker: Some(worker),
        })
    }
}

/// Marks the slot closed when the worker returns or unwinds, so producers stop
/// pushing into a loop that no longer consumes.
struct CloseOnExit(Arc<AtomicBool>);

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn run_worker(
    mut session: PerceptionSession,
    frames: Receiver<RawFrame>,
    shutdown: Receiver<()>,
    aux: Arc<Mutex<AuxSignals>>,
    processed: Arc<AtomicU64>,
) -> SessionStats {
    loop {
        channel::select! {
            recv(frames) -> msg => match msg {
                Ok(frame) => {
                    let signals = aux
                        .lock()
                        .map(|a| a.clone())
                        .unwrap_or_else(|poisoned| poisoned.into_inner().clone());
                    let report = session.process_frame(&frame, &signals);
                    drop(frame);
                    if let Some(line) = report.describe_primary() {
                        log::trace!("primary: {}", line);
                    }
                    if let Some(summary) = &report.summary {
                        log::debug!("summary [{}]: {}", summary.priority.as_str(), summary.summary);
                    }
                    processed.fetch_add(1, Ordering::SeqCst);
                }
                Err(_) => break,
            },
            recv(shutdown) -> _ => break,
        }
    }
    let stats = session.stats();
    session.stop();
    stats
}

pub struct PipelineHandle {
    slot: FrameSlot,
    aux: Arc<Mutex<AuxSignals>>,
    processed: Arc<AtomicU64>,
    shutdown: Option<Sender<()>>,
    worker: Option<JoinHandle<SessionStats>>,
}

impl PipelineHandle {
    pub fn sender(&self) -> FrameSender {
        self.slot.sender()
    }

    /// Replace the auxiliary signals used for subsequent frames.
    pub fn set_aux(&self, signals: AuxSignals) {
        match self.aux.lock() {
            Ok(mut aux) => *aux = signals,
            Err(poisoned) => *poisoned.into_inner() = signals,
        }
    }

    pub fn frames_processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.slot.dropped()
    }

    /// Close the slot, join the worker and return the final counters.
    pub fn stop(mut self) -> Result<PipelineStats> {
        self.slot.close();
        self.shutdown.take();
        let worker = self
            .worker
            .take()
            .ok_or_else(|| anyhow!("pipeline already stopped"))?;
        let session = worker
            .join()
            .map_err(|_| anyhow!("pipeline worker panicked"))?;
        log::info!("pipeline stopped");
        Ok(PipelineStats {
            frames_dropped: self.slot.dropped(),
            session,
        })
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.slot.close();
        self.shutdown.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
