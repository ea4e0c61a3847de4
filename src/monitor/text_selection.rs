//! Text selection monitoring.
//!
//! Polls the selection query collaborator and emits a TextSelection
//! event when the selected text actually changes. Repeats of the same
//! text are suppressed, and a minimum time between emitted events keeps
//! drag-selection noise out of the timeline.

use crate::event::{CaptureClock, EventPayload, PendingEvent, SelectionSource};
use crate::timeline::TimelineBuffer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A selection as reported by the external query collaborator.
#[derive(Debug, Clone)]
pub struct SelectedText {
    pub text: String,
    pub app_name: Option<String>,
    pub source: SelectionSource,
}

/// External selection query collaborator. Returns `None` when nothing is
/// selected or the selection cannot be read.
pub trait SelectionQuery: Send + Sync {
    fn selected_text(&self) -> Option<SelectedText>;
}

pub struct TextSelectionMonitor {
    query: Arc<dyn SelectionQuery>,
    bus: Arc<TimelineBuffer>,
    clock: CaptureClock,
    change_threshold_us: u64,
    max_len: usize,
    last_text: Option<String>,
    last_emit_us: Option<u64>,
}

impl TextSelectionMonitor {
    pub fn new(
        query: Arc<dyn SelectionQuery>,
        bus: Arc<TimelineBuffer>,
        clock: CaptureClock,
        change_threshold: Duration,
        max_len: usize,
    ) -> Self {
        Self {
            query,
            bus,
            clock,
            change_threshold_us: change_threshold.as_micros() as u64,
            max_len,
            last_text: None,
            last_emit_us: None,
        }
    }

    /// Performs one poll cycle.
    pub fn poll(&mut self) {
        let now = self.clock.now_us();
        if let Some(last) = self.last_emit_us {
            if now.saturating_sub(last) < self.change_threshold_us {
                return;
            }
        }

        let Some(selection) = self.query.selected_text() else {
            return;
        };
        if selection.text.is_empty() {
            return;
        }
        if self.last_text.as_deref() == Some(selection.text.as_str()) {
            return;
        }

        let text: String = selection.text.chars().take(self.max_len).collect();
        let payload = EventPayload::TextSelection {
            text,
            app_name: selection.app_name,
            source: selection.source,
        };
        self.bus.ingest(PendingEvent::capture(&self.clock, payload));

        tracing::debug!(
            chars = selection.text.chars().count(),
            source = selection.source.as_str(),
            "Text selection captured"
        );
        self.last_text = Some(selection.text);
        self.last_emit_us = Some(now);
    }
}

/// Spawns the selection polling thread.
pub fn spawn_selection_thread(
    monitor: Arc<Mutex<TextSelectionMonitor>>,
    shutdown: Arc<AtomicBool>,
    interval: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        tracing::info!(
            interval_ms = interval.as_millis(),
            "Selection polling thread started"
        );

        while !shutdown.load(Ordering::SeqCst) {
            if let Ok(mut monitor) = monitor.lock() {
                monitor.poll();
            }
            thread::sleep(interval);
        }

        tracing::info!("Selection polling thread shutting down");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedSelection {
        script: Mutex<Vec<Option<SelectedText>>>,
    }

    impl ScriptedSelection {
        fn new(mut script: Vec<Option<SelectedText>>) -> Arc<Self> {
            script.reverse();
            Arc::new(Self {
                script: Mutex::new(script),
            })
        }
    }

    impl SelectionQuery for ScriptedSelection {
        fn selected_text(&self) -> Option<SelectedText> {
            self.script.lock().unwrap().pop().flatten()
        }
    }

    fn selection(text: &str) -> Option<SelectedText> {
        Some(SelectedText {
            text: text.to_string(),
            app_name: Some("Safari".to_string()),
            source: SelectionSource::Accessibility,
        })
    }

    fn monitor_with(
        script: Vec<Option<SelectedText>>,
        threshold: Duration,
    ) -> (TextSelectionMonitor, Arc<TimelineBuffer>) {
        let bus = Arc::new(TimelineBuffer::new());
        let monitor = TextSelectionMonitor::new(
            ScriptedSelection::new(script),
            Arc::clone(&bus),
            CaptureClock::new(),
            threshold,
            2000,
        );
        (monitor, bus)
    }

    #[test]
    fn test_repeated_selection_emits_once() {
        let (mut monitor, bus) = monitor_with(
            vec![selection("hello"), selection("hello"), selection("world")],
            Duration::ZERO,
        );

        monitor.poll();
        monitor.poll();
        monitor.poll();

        let snapshot = bus.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(matches!(
            &snapshot[0].payload,
            EventPayload::TextSelection { text, .. } if text == "hello"
        ));
        assert!(matches!(
            &snapshot[1].payload,
            EventPayload::TextSelection { text, .. } if text == "world"
        ));
    }

    #[test]
    fn test_change_threshold_suppresses_bursts() {
        let (mut monitor, bus) = monitor_with(
            vec![selection("one"), selection("two")],
            Duration::from_secs(3600),
        );

        monitor.poll(); // emits "one"
        monitor.poll(); // inside the threshold window, suppressed

        assert_eq!(bus.snapshot().len(), 1);
    }

    #[test]
    fn test_empty_and_missing_selections_skipped() {
        let (mut monitor, bus) = monitor_with(vec![None, selection(""), selection("x")], Duration::ZERO);

        monitor.poll();
        monitor.poll();
        monitor.poll();

        assert_eq!(bus.snapshot().len(), 1);
    }

    #[test]
    fn test_long_selection_truncated() {
        let long = "a".repeat(5000);
        let (mut monitor, bus) = monitor_with(vec![selection(&long)], Duration::ZERO);

        monitor.poll();

        match &bus.snapshot()[0].payload {
            EventPayload::TextSelection { text, .. } => assert_eq!(text.len(), 2000),
            other => panic!("expected TextSelection, got {other:?}"),
        }
    }
}
