//! Pipeline orchestration.
//!
//! [`SessionRecorder`] wires the monitors, buffer, screenshot trigger,
//! and writer together and owns the shutdown choreography: producers
//! stop accepting events, the buffer is flushed once, and in-flight
//! screenshot captures get a bounded grace period.

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::event::CaptureClock;
use crate::monitor::{
    spawn_polling_thread, spawn_selection_thread, KeyboardMonitor, MouseMonitor, SelectionQuery,
    TextSelectionMonitor, WindowQuery, WindowTracker,
};
use crate::screenshot::{ScreenshotCapture, ScreenshotTrigger, TriggerMetricsSnapshot};
use crate::timeline::{
    spawn_flush_thread, BufferMetricsSnapshot, TimelineBuffer, TimelineWriter,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// External collaborators handed in by the caller.
pub struct Collaborators {
    pub window: Arc<dyn WindowQuery>,
    pub selection: Option<Arc<dyn SelectionQuery>>,
    pub capture: Option<Arc<dyn ScreenshotCapture>>,
}

/// Aggregated pipeline counters for status display and shutdown summary.
#[derive(Debug, Clone, Serialize)]
pub struct RecorderMetrics {
    pub buffer: BufferMetricsSnapshot,
    pub screenshots: Option<TriggerMetricsSnapshot>,
    pub window_query_failures: u64,
}

pub struct SessionRecorder {
    config: MonitorConfig,
    bus: Arc<TimelineBuffer>,
    clock: CaptureClock,
    keyboard: Arc<KeyboardMonitor>,
    mouse: Arc<MouseMonitor>,
    tracker: Arc<Mutex<WindowTracker>>,
    selection: Option<Arc<Mutex<TextSelectionMonitor>>>,
    trigger: Option<Arc<ScreenshotTrigger>>,
    writer: Arc<Mutex<TimelineWriter>>,
    shutdown: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
    running: bool,
}

impl SessionRecorder {
    /// Builds the pipeline and creates the timeline file. Nothing runs
    /// until [`start`](Self::start).
    pub fn new(config: MonitorConfig, collaborators: Collaborators) -> Result<Self> {
        let bus = Arc::new(TimelineBuffer::new());
        let clock = CaptureClock::new();

        let trigger = match (&collaborators.capture, config.capture_screenshots) {
            (Some(backend), true) => Some(ScreenshotTrigger::start(
                Arc::clone(&bus),
                Arc::clone(backend),
                config.screenshot_min_interval,
                clock,
            )),
            _ => None,
        };

        let keyboard = Arc::new(KeyboardMonitor::new(Arc::clone(&bus), clock));
        let mouse = Arc::new(MouseMonitor::new(
            Arc::clone(&bus),
            clock,
            trigger.clone(),
        ));
        let tracker = Arc::new(Mutex::new(WindowTracker::new(
            Arc::clone(&collaborators.window),
            Arc::clone(&bus),
            clock,
        )));

        let selection = match (&collaborators.selection, config.monitor_text_selection) {
            (Some(query), true) => Some(Arc::new(Mutex::new(TextSelectionMonitor::new(
                Arc::clone(query),
                Arc::clone(&bus),
                clock,
                config.selection_change_threshold,
                config.max_selection_len,
            )))),
            _ => None,
        };

        let writer = Arc::new(Mutex::new(TimelineWriter::create(
            Arc::clone(&bus),
            config.timeline_path.clone(),
            config.timeline_format,
            config.retention,
        )?));

        Ok(Self {
            config,
            bus,
            clock,
            keyboard,
            mouse,
            tracker,
            selection,
            trigger,
            writer,
            shutdown: Arc::new(AtomicBool::new(false)),
            threads: Vec::new(),
            running: false,
        })
    }

    /// Spawns the polling and flush threads.
    pub fn start(&mut self) {
        if self.running {
            tracing::warn!("Session recorder is already running");
            return;
        }
        self.running = true;

        self.threads.push(spawn_polling_thread(
            Arc::clone(&self.tracker),
            Arc::clone(&self.shutdown),
            self.config.poll_interval,
        ));

        if let Some(selection) = &self.selection {
            self.threads.push(spawn_selection_thread(
                Arc::clone(selection),
                Arc::clone(&self.shutdown),
                self.config.selection_interval,
            ));
        }

        self.threads.push(spawn_flush_thread(
            Arc::clone(&self.writer),
            Arc::clone(&self.shutdown),
            self.config.flush_interval,
            self.config.flush_retry_attempts,
            self.config.flush_retry_backoff,
        ));

        tracing::info!("Session recorder started");
    }

    /// Stops the pipeline: producers first, then screenshot grace, then
    /// the final flush and epilogue. Idempotent.
    pub fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }
        self.running = false;

        self.shutdown.store(true, Ordering::SeqCst);
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }

        // Let in-flight captures attach before the final flush; anything
        // still pending after the grace period keeps an absent ref.
        if let Some(trigger) = &self.trigger {
            trigger.stop(self.config.screenshot_grace);
        }

        if let Ok(mut writer) = self.writer.lock() {
            writer.finalize()?;
        }

        tracing::info!("Session recorder stopped");
        Ok(())
    }

    /// Handle for the input hook collaborator's key callbacks.
    pub fn keyboard(&self) -> Arc<KeyboardMonitor> {
        Arc::clone(&self.keyboard)
    }

    /// Handle for the input hook collaborator's mouse callbacks.
    pub fn mouse(&self) -> Arc<MouseMonitor> {
        Arc::clone(&self.mouse)
    }

    pub fn bus(&self) -> Arc<TimelineBuffer> {
        Arc::clone(&self.bus)
    }

    pub fn clock(&self) -> CaptureClock {
        self.clock
    }

    /// Shared flag the hook collaborator should observe to stop
    /// delivering events.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn metrics(&self) -> RecorderMetrics {
        RecorderMetrics {
            buffer: self.bus.metrics(),
            screenshots: self.trigger.as_ref().map(|t| t.metrics()),
            window_query_failures: self
                .tracker
                .lock()
                .map(|t| t.failure_count())
                .unwrap_or(0),
        }
    }
}
