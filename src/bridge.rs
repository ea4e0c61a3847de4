//! Stdin bridge to the input hook collaborator.
//!
//! The OS-specific hook process delivers raw callbacks as newline-
//! delimited JSON records on our stdin. The bridge forwards key and
//! mouse records straight to the monitors and keeps latest-state slots
//! that back the window and selection query traits, so the pollers see
//! the collaborator's most recent report.
//!
//! Record shapes:
//!
//! ```text
//! {"type":"key_down","code":0,"flags":131072}
//! {"type":"key_up","code":0}
//! {"type":"click","button":"left","x":512.0,"y":384.0}
//! {"type":"scroll","delta_y":-3,"x":512.0,"y":384.0}
//! {"type":"window","app":"Safari","title":"Docs"}
//! {"type":"selection","text":"hello","app":"Safari","source":"accessibility"}
//! ```

use crate::error::{Error, Result};
use crate::event::{MouseButton, SelectionSource};
use crate::monitor::{
    ForegroundWindow, KeyboardMonitor, MouseMonitor, SelectedText, SelectionQuery, WindowQuery,
};
use serde::Deserialize;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawRecord {
    KeyDown {
        code: u32,
        #[serde(default)]
        flags: u64,
    },
    KeyUp {
        code: u32,
        #[serde(default)]
        flags: u64,
    },
    Click {
        button: MouseButton,
        x: f64,
        y: f64,
    },
    Scroll {
        #[serde(default)]
        delta_x: i32,
        #[serde(default)]
        delta_y: i32,
        x: f64,
        y: f64,
    },
    Window {
        app: String,
        title: String,
    },
    Selection {
        text: String,
        #[serde(default)]
        app: Option<String>,
        #[serde(default)]
        source: Option<SelectionSource>,
    },
}

struct SlotWindowQuery(Arc<Mutex<Option<ForegroundWindow>>>);

impl WindowQuery for SlotWindowQuery {
    fn foreground(&self) -> Result<ForegroundWindow> {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| Error::WindowQuery("no foreground window reported yet".to_string()))
    }
}

struct SlotSelectionQuery(Arc<Mutex<Option<SelectedText>>>);

impl SelectionQuery for SlotSelectionQuery {
    fn selected_text(&self) -> Option<SelectedText> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

pub struct StdinBridge {
    window_slot: Arc<Mutex<Option<ForegroundWindow>>>,
    selection_slot: Arc<Mutex<Option<SelectedText>>>,
    malformed: Arc<AtomicU64>,
}

impl StdinBridge {
    pub fn new() -> Self {
        Self {
            window_slot: Arc::new(Mutex::new(None)),
            selection_slot: Arc::new(Mutex::new(None)),
            malformed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Window query collaborator backed by the latest `window` record.
    pub fn window_query(&self) -> Arc<dyn WindowQuery> {
        Arc::new(SlotWindowQuery(Arc::clone(&self.window_slot)))
    }

    /// Selection query collaborator backed by the latest `selection`
    /// record.
    pub fn selection_query(&self) -> Arc<dyn SelectionQuery> {
        Arc::new(SlotSelectionQuery(Arc::clone(&self.selection_slot)))
    }

    /// Lines that failed to parse since startup.
    pub fn malformed_count(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Dispatches one raw record line. Returns false for malformed input,
    /// which is counted and skipped, never fatal.
    pub fn handle_line(
        &self,
        line: &str,
        keyboard: &KeyboardMonitor,
        mouse: &MouseMonitor,
    ) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return true;
        }

        let record: RawRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                self.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(?e, "Skipping malformed input record");
                return false;
            }
        };

        match record {
            RawRecord::KeyDown { code, flags } => {
                keyboard.on_key_down(code, flags);
            }
            RawRecord::KeyUp { code, flags } => {
                keyboard.on_key_up(code, flags);
            }
            RawRecord::Click { button, x, y } => {
                mouse.on_click(button, x, y);
            }
            RawRecord::Scroll {
                delta_x,
                delta_y,
                x,
                y,
            } => {
                mouse.on_scroll(delta_x, delta_y, x, y);
            }
            RawRecord::Window { app, title } => {
                *self.window_slot.lock().unwrap_or_else(|e| e.into_inner()) =
                    Some(ForegroundWindow {
                        app_name: app,
                        window_title: title,
                    });
            }
            RawRecord::Selection { text, app, source } => {
                *self
                    .selection_slot
                    .lock()
                    .unwrap_or_else(|e| e.into_inner()) = Some(SelectedText {
                    text,
                    app_name: app,
                    source: source.unwrap_or(SelectionSource::Accessibility),
                });
            }
        }
        true
    }

    /// Spawns the reader thread over this process's stdin. Fatal if the
    /// thread cannot be started: without the hook feed there is nothing
    /// to record. On EOF the collaborator is gone, so the shutdown flag
    /// is raised.
    pub fn spawn(
        self: Arc<Self>,
        keyboard: Arc<KeyboardMonitor>,
        mouse: Arc<MouseMonitor>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("deskmon-bridge".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    if shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    match line {
                        Ok(line) => {
                            self.handle_line(&line, &keyboard, &mouse);
                        }
                        Err(e) => {
                            tracing::warn!(?e, "Input feed read error");
                            break;
                        }
                    }
                }
                tracing::info!("Input feed ended, requesting shutdown");
                shutdown.store(true, Ordering::SeqCst);
            })
            .map_err(|e| Error::HookInstall(format!("could not start bridge thread: {e}")))
    }
}

impl Default for StdinBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CaptureClock, EventKind, EventPayload};
    use crate::timeline::TimelineBuffer;

    fn setup() -> (Arc<TimelineBuffer>, KeyboardMonitor, MouseMonitor, StdinBridge) {
        let bus = Arc::new(TimelineBuffer::new());
        let clock = CaptureClock::new();
        let keyboard = KeyboardMonitor::new(Arc::clone(&bus), clock);
        let mouse = MouseMonitor::new(Arc::clone(&bus), clock, None);
        (bus, keyboard, mouse, StdinBridge::new())
    }

    #[test]
    fn test_key_and_mouse_records_reach_the_bus() {
        let (bus, keyboard, mouse, bridge) = setup();

        assert!(bridge.handle_line(r#"{"type":"key_down","code":0,"flags":131072}"#, &keyboard, &mouse));
        assert!(bridge.handle_line(r#"{"type":"key_up","code":0}"#, &keyboard, &mouse));
        assert!(bridge.handle_line(
            r#"{"type":"click","button":"left","x":512.0,"y":384.0}"#,
            &keyboard,
            &mouse
        ));
        assert!(bridge.handle_line(r#"{"type":"scroll","delta_y":-3,"x":1.0,"y":2.0}"#, &keyboard, &mouse));

        let snapshot = bus.snapshot();
        assert_eq!(snapshot.len(), 4);
        assert_eq!(snapshot[0].kind(), EventKind::KeyPress);
        assert!(matches!(
            &snapshot[0].payload,
            EventPayload::KeyPress { key, modifiers, .. } if key == "a" && modifiers.shift
        ));
        assert_eq!(snapshot[3].kind(), EventKind::MouseScroll);
    }

    #[test]
    fn test_window_and_selection_records_fill_slots() {
        let (_bus, keyboard, mouse, bridge) = setup();
        let window_query = bridge.window_query();
        let selection_query = bridge.selection_query();

        assert!(window_query.foreground().is_err()); // nothing reported yet

        bridge.handle_line(r#"{"type":"window","app":"Safari","title":"Docs"}"#, &keyboard, &mouse);
        let window = window_query.foreground().unwrap();
        assert_eq!(window.app_name, "Safari");
        assert_eq!(window.window_title, "Docs");

        bridge.handle_line(r#"{"type":"selection","text":"hello"}"#, &keyboard, &mouse);
        let selection = selection_query.selected_text().unwrap();
        assert_eq!(selection.text, "hello");
        assert_eq!(selection.source, SelectionSource::Accessibility);
    }

    #[test]
    fn test_malformed_lines_counted_not_fatal() {
        let (bus, keyboard, mouse, bridge) = setup();

        assert!(!bridge.handle_line("not json", &keyboard, &mouse));
        assert!(!bridge.handle_line(r#"{"type":"warp"}"#, &keyboard, &mouse));
        assert!(bridge.handle_line("", &keyboard, &mouse)); // blank lines fine

        assert_eq!(bridge.malformed_count(), 2);
        assert!(bus.is_empty());
    }
}
