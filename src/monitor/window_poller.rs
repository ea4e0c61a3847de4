//! Foreground window tracking.
//!
//! The tracker polls the window/app query collaborator on a fixed
//! interval and emits a WindowChange event only when the (app, title)
//! pair actually changes. Query failures are counted and tolerated: the
//! tracker simply holds its last-known state.

use crate::error::Result;
use crate::event::{CaptureClock, EventPayload, PendingEvent};
use crate::timeline::TimelineBuffer;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Current foreground application and window, as reported by the
/// external query collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundWindow {
    pub app_name: String,
    pub window_title: String,
}

/// External window/app query collaborator.
pub trait WindowQuery: Send + Sync {
    fn foreground(&self) -> Result<ForegroundWindow>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TrackerState {
    /// Nothing observed yet; the first successful poll always emits.
    Unknown,
    Tracking(ForegroundWindow),
}

pub struct WindowTracker {
    query: Arc<dyn WindowQuery>,
    bus: Arc<TimelineBuffer>,
    clock: CaptureClock,
    state: TrackerState,
    failures: AtomicU64,
}

impl WindowTracker {
    pub fn new(query: Arc<dyn WindowQuery>, bus: Arc<TimelineBuffer>, clock: CaptureClock) -> Self {
        Self {
            query,
            bus,
            clock,
            state: TrackerState::Unknown,
            failures: AtomicU64::new(0),
        }
    }

    /// Performs one poll cycle. Emits a WindowChange event only on an
    /// actual transition; identical polls are no-ops.
    pub fn poll(&mut self) {
        let current = match self.query.foreground() {
            Ok(window) => window,
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(?e, "Window query failed, keeping last-known state");
                return;
            }
        };

        let previous = match &self.state {
            TrackerState::Unknown => None,
            TrackerState::Tracking(window) if *window == current => return,
            TrackerState::Tracking(window) => Some(window.clone()),
        };

        let payload = EventPayload::WindowChange {
            app_name: current.app_name.clone(),
            window_title: current.window_title.clone(),
            previous_app: previous.as_ref().map(|w| w.app_name.clone()),
            previous_title: previous.as_ref().map(|w| w.window_title.clone()),
        };
        self.bus.ingest(PendingEvent::capture(&self.clock, payload));

        tracing::debug!(
            app = %current.app_name,
            title = %current.window_title,
            "Window focus changed"
        );
        self.state = TrackerState::Tracking(current);
    }

    /// Number of failed polls since startup. Failures are never fatal.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Spawns the window polling thread.
///
/// The thread polls the tracker on `interval` until the shutdown flag is
/// set, then exits.
pub fn spawn_polling_thread(
    tracker: Arc<Mutex<WindowTracker>>,
    shutdown: Arc<AtomicBool>,
    interval: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        tracing::info!(
            interval_ms = interval.as_millis(),
            "Window polling thread started"
        );

        while !shutdown.load(Ordering::SeqCst) {
            if let Ok(mut tracker) = tracker.lock() {
                tracker.poll();
            }
            thread::sleep(interval);
        }

        tracing::info!("Window polling thread shutting down");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::event::EventKind;

    /// Scripted query collaborator: returns each result once, then fails.
    struct ScriptedQuery {
        script: Mutex<Vec<Result<ForegroundWindow>>>,
    }

    impl ScriptedQuery {
        fn new(mut script: Vec<Result<ForegroundWindow>>) -> Arc<Self> {
            script.reverse();
            Arc::new(Self {
                script: Mutex::new(script),
            })
        }
    }

    impl WindowQuery for ScriptedQuery {
        fn foreground(&self) -> Result<ForegroundWindow> {
            let mut script = self.script.lock().unwrap();
            match script.pop() {
                Some(result) => result,
                None => Err(Error::WindowQuery("script exhausted".to_string())),
            }
        }
    }

    fn window(app: &str, title: &str) -> ForegroundWindow {
        ForegroundWindow {
            app_name: app.to_string(),
            window_title: title.to_string(),
        }
    }

    #[test]
    fn test_duplicate_polls_emit_once() {
        // (Mail, Inbox), (Mail, Inbox), (Safari, Docs): exactly two
        // events. Unknown -> Mail, then Mail -> Safari.
        let query = ScriptedQuery::new(vec![
            Ok(window("Mail", "Inbox")),
            Ok(window("Mail", "Inbox")),
            Ok(window("Safari", "Docs")),
        ]);
        let bus = Arc::new(TimelineBuffer::new());
        let mut tracker = WindowTracker::new(query, Arc::clone(&bus), CaptureClock::new());

        tracker.poll();
        tracker.poll();
        tracker.poll();

        let snapshot = bus.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].kind(), EventKind::WindowChange);

        match &snapshot[0].payload {
            EventPayload::WindowChange {
                app_name,
                previous_app,
                ..
            } => {
                assert_eq!(app_name, "Mail");
                assert!(previous_app.is_none()); // first transition from Unknown
            }
            other => panic!("expected WindowChange, got {other:?}"),
        }
        match &snapshot[1].payload {
            EventPayload::WindowChange {
                app_name,
                window_title,
                previous_app,
                previous_title,
            } => {
                assert_eq!(app_name, "Safari");
                assert_eq!(window_title, "Docs");
                assert_eq!(previous_app.as_deref(), Some("Mail"));
                assert_eq!(previous_title.as_deref(), Some("Inbox"));
            }
            other => panic!("expected WindowChange, got {other:?}"),
        }
    }

    #[test]
    fn test_title_change_within_same_app_emits() {
        let query = ScriptedQuery::new(vec![
            Ok(window("Safari", "Tab 1")),
            Ok(window("Safari", "Tab 2")),
        ]);
        let bus = Arc::new(TimelineBuffer::new());
        let mut tracker = WindowTracker::new(query, Arc::clone(&bus), CaptureClock::new());

        tracker.poll();
        tracker.poll();
        assert_eq!(bus.snapshot().len(), 2);
    }

    #[test]
    fn test_failure_holds_state_and_counts() {
        let query = ScriptedQuery::new(vec![
            Ok(window("Mail", "Inbox")),
            Err(Error::WindowQuery("no frontmost app".to_string())),
            Ok(window("Mail", "Inbox")),
        ]);
        let bus = Arc::new(TimelineBuffer::new());
        let mut tracker = WindowTracker::new(query, Arc::clone(&bus), CaptureClock::new());

        tracker.poll(); // emits
        tracker.poll(); // fails: no event, state held
        tracker.poll(); // same window again: no event

        assert_eq!(bus.snapshot().len(), 1);
        assert_eq!(tracker.failure_count(), 1);
    }

    #[test]
    fn test_failure_before_first_success_stays_unknown() {
        let query = ScriptedQuery::new(vec![
            Err(Error::WindowQuery("not ready".to_string())),
            Ok(window("Mail", "Inbox")),
        ]);
        let bus = Arc::new(TimelineBuffer::new());
        let mut tracker = WindowTracker::new(query, Arc::clone(&bus), CaptureClock::new());

        tracker.poll();
        assert!(bus.is_empty());

        tracker.poll(); // first success always emits
        assert_eq!(bus.snapshot().len(), 1);
    }
}
