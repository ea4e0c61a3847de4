//! Throttled, asynchronous screenshot enrichment.
//!
//! Monitors call [`ScreenshotTrigger::request`] from their callback path;
//! the call never blocks. Capture itself runs on a worker thread behind a
//! bounded channel, and the resulting file reference is attached to the
//! originating event through the buffer. Requests arriving inside the
//! throttle window are dropped, not queued: the event simply keeps an
//! absent reference.

use crate::error::{Error, Result};
use crate::event::{CaptureClock, EventKind};
use crate::timeline::TimelineBuffer;
use crossbeam_channel::{bounded, Sender, TrySendError};
use serde::Serialize;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// One capture job handed to the collaborator.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    /// Sequence id of the event the reference will be attached to.
    pub sequence_id: u64,
    /// Kind of the originating event.
    pub reason: EventKind,
    /// Screen position associated with the event, if any.
    pub position: Option<(f64, f64)>,
}

/// External screenshot collaborator. Performs the actual pixel capture
/// and storage, and owns the naming of the resulting file.
pub trait ScreenshotCapture: Send + Sync + 'static {
    fn capture(&self, request: &CaptureRequest) -> Result<String>;
}

#[derive(Debug, Default)]
struct TriggerCounters {
    requested: AtomicU64,
    throttled: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time view of the trigger counters.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerMetricsSnapshot {
    /// Requests dispatched to the capture worker.
    pub requested: u64,
    /// Requests dropped inside the throttle window.
    pub throttled: u64,
    /// Captures that completed and attached a reference.
    pub completed: u64,
    /// Captures that failed or could not attach.
    pub failed: u64,
}

/// Decides whether an event gets a screenshot, throttles capture
/// frequency, and attaches the resulting reference asynchronously.
pub struct ScreenshotTrigger {
    sender: Mutex<Option<Sender<CaptureRequest>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    clock: CaptureClock,
    min_interval_us: u64,
    last_capture_us: AtomicU64,
    counters: Arc<TriggerCounters>,
}

impl ScreenshotTrigger {
    /// Starts the capture worker and returns the shared trigger handle.
    pub fn start(
        bus: Arc<TimelineBuffer>,
        backend: Arc<dyn ScreenshotCapture>,
        min_interval: Duration,
        clock: CaptureClock,
    ) -> Arc<Self> {
        // Capacity 1: at most one job waiting while one is in flight.
        // Anything beyond that is inside the throttle window anyway.
        let (tx, rx) = bounded::<CaptureRequest>(1);
        let counters = Arc::new(TriggerCounters::default());

        let worker_counters = Arc::clone(&counters);
        let worker = thread::spawn(move || {
            while let Ok(request) = rx.recv() {
                match backend.capture(&request) {
                    Ok(reference) => match bus.attach_screenshot(request.sequence_id, &reference) {
                        Ok(()) => {
                            worker_counters.completed.fetch_add(1, Ordering::Relaxed);
                            tracing::debug!(
                                event = request.sequence_id,
                                path = %reference,
                                "Screenshot attached"
                            );
                        }
                        Err(e) => {
                            worker_counters.failed.fetch_add(1, Ordering::Relaxed);
                            tracing::debug!(
                                event = request.sequence_id,
                                ?e,
                                "Screenshot captured but could not be attached"
                            );
                        }
                    },
                    Err(e) => {
                        worker_counters.failed.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(event = request.sequence_id, ?e, "Screenshot capture failed");
                    }
                }
            }
            tracing::debug!("Screenshot worker exiting");
        });

        Arc::new(Self {
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            clock,
            min_interval_us: min_interval.as_micros() as u64,
            last_capture_us: AtomicU64::new(0),
            counters,
        })
    }

    /// Requests a screenshot for the given event. Returns immediately.
    ///
    /// At most one request per throttle window wins the capture slot;
    /// the rest are dropped and their events keep `screenshot = None`.
    pub fn request(&self, sequence_id: u64, reason: EventKind, position: Option<(f64, f64)>) {
        // Clock starts at 0; 0 also means "never captured", so floor at 1.
        let now = self.clock.now_us().max(1);
        let last = self.last_capture_us.load(Ordering::Relaxed);

        if last != 0 && now.saturating_sub(last) < self.min_interval_us {
            self.counters.throttled.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(event = sequence_id, "Screenshot request throttled");
            return;
        }

        // Claim the capture slot; a concurrent caller winning the race
        // counts the same as a throttled request.
        if self
            .last_capture_us
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            self.counters.throttled.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let request = CaptureRequest {
            sequence_id,
            reason,
            position,
        };
        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = sender.as_ref() else {
            return; // trigger already stopped
        };
        match tx.try_send(request) {
            Ok(()) => {
                self.counters.requested.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.counters.throttled.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(event = sequence_id, "Capture worker busy, request dropped");
            }
        }
    }

    /// Stops accepting requests and waits up to `grace` for the worker to
    /// finish in-flight captures. A worker still capturing after the
    /// grace period is abandoned; its events keep an absent reference.
    pub fn stop(&self, grace: Duration) {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let Some(handle) = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        else {
            return;
        };

        let deadline = std::time::Instant::now() + grace;
        while !handle.is_finished() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        if handle.is_finished() {
            let _ = handle.join();
        } else {
            tracing::warn!("Screenshot worker still busy after grace period, abandoning");
        }
    }

    pub fn metrics(&self) -> TriggerMetricsSnapshot {
        TriggerMetricsSnapshot {
            requested: self.counters.requested.load(Ordering::Relaxed),
            throttled: self.counters.throttled.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

/// Capture backend that shells out to an external command.
///
/// The command receives the destination path as its single argument and
/// must write a PNG there. File naming stays on this side of the trait:
/// counter, mouse position, and wall-clock timestamp, mirroring what the
/// summarizer downstream expects.
pub struct CommandCapture {
    command: String,
    directory: PathBuf,
    counter: AtomicU64,
}

impl CommandCapture {
    pub fn new(command: String, directory: PathBuf) -> Self {
        Self {
            command,
            directory,
            counter: AtomicU64::new(0),
        }
    }

    fn next_path(&self, request: &CaptureRequest) -> PathBuf {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let name = match request.position {
            Some((x, y)) => format!(
                "screenshot_{:06}_mouse_{}_{}_{}.png",
                counter, x as i64, y as i64, timestamp
            ),
            None => format!("screenshot_{:06}_{}.png", counter, timestamp),
        };
        self.directory.join(name)
    }
}

impl ScreenshotCapture for CommandCapture {
    fn capture(&self, request: &CaptureRequest) -> Result<String> {
        std::fs::create_dir_all(&self.directory)?;
        let path = self.next_path(request);

        let status = Command::new(&self.command)
            .arg(&path)
            .status()
            .map_err(|e| Error::Capture(format!("failed to run {:?}: {e}", self.command)))?;

        if !status.success() {
            return Err(Error::Capture(format!(
                "{:?} exited with {status}",
                self.command
            )));
        }
        if !path.exists() {
            return Err(Error::Capture(format!(
                "{:?} reported success but wrote nothing",
                self.command
            )));
        }
        Ok(path.to_string_lossy().into_owned())
    }
}
