//! Canonical event model.
//!
//! Every observable user action is represented as an [`Event`]: a common
//! envelope (monotonic capture timestamp, wall-clock time, sequence id)
//! around a kind-specific [`EventPayload`]. Monitors build a
//! [`PendingEvent`]; the timeline buffer assigns the sequence id at
//! insertion, after which the core fields never change. Only the
//! screenshot reference may transition from unset to set, exactly once,
//! through the buffer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Monotonic capture clock, anchored when the pipeline starts.
///
/// All producers share one anchor so their microsecond timestamps are
/// comparable. Wall-clock time is carried separately for display.
#[derive(Debug, Clone, Copy)]
pub struct CaptureClock {
    origin: Instant,
}

impl CaptureClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Microseconds elapsed since the clock was created.
    pub fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

impl Default for CaptureClock {
    fn default() -> Self {
        Self::new()
    }
}

/// The fixed set of event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    KeyPress,
    KeyRelease,
    MouseClick,
    MouseScroll,
    WindowChange,
    TextSelection,
}

impl EventKind {
    /// Stable snake_case name, matching the serialized `event_type` tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::KeyPress => "key_press",
            EventKind::KeyRelease => "key_release",
            EventKind::MouseClick => "mouse_click",
            EventKind::MouseScroll => "mouse_scroll",
            EventKind::WindowChange => "window_change",
            EventKind::TextSelection => "text_selection",
        }
    }
}

/// Mouse button involved in a click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

/// Where a text selection was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionSource {
    Accessibility,
    Clipboard,
}

impl SelectionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionSource::Accessibility => "accessibility",
            SelectionSource::Clipboard => "clipboard",
        }
    }
}

/// Modifier key state at the time of a keyboard event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub control: bool,
    pub option: bool,
    pub command: bool,
    pub function: bool,
    pub capslock: bool,
}

impl Modifiers {
    /// Active modifier names joined with `+`, empty string when none.
    pub fn describe(&self) -> String {
        let mut names = Vec::new();
        if self.shift {
            names.push("shift");
        }
        if self.control {
            names.push("control");
        }
        if self.option {
            names.push("option");
        }
        if self.command {
            names.push("command");
        }
        if self.function {
            names.push("function");
        }
        if self.capslock {
            names.push("capslock");
        }
        names.join("+")
    }

    pub fn any(&self) -> bool {
        self.shift || self.control || self.option || self.command || self.function || self.capslock
    }
}

/// Kind-specific payload. Each variant carries only its relevant fields;
/// the serialized form is tagged with `event_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventPayload {
    KeyPress {
        key: String,
        key_code: u32,
        modifiers: Modifiers,
    },
    KeyRelease {
        key: String,
        key_code: u32,
        modifiers: Modifiers,
    },
    MouseClick {
        button: MouseButton,
        x: f64,
        y: f64,
    },
    MouseScroll {
        delta_x: i32,
        delta_y: i32,
        x: f64,
        y: f64,
    },
    WindowChange {
        app_name: String,
        window_title: String,
        previous_app: Option<String>,
        previous_title: Option<String>,
    },
    TextSelection {
        text: String,
        app_name: Option<String>,
        source: SelectionSource,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::KeyPress { .. } => EventKind::KeyPress,
            EventPayload::KeyRelease { .. } => EventKind::KeyRelease,
            EventPayload::MouseClick { .. } => EventKind::MouseClick,
            EventPayload::MouseScroll { .. } => EventKind::MouseScroll,
            EventPayload::WindowChange { .. } => EventKind::WindowChange,
            EventPayload::TextSelection { .. } => EventKind::TextSelection,
        }
    }
}

/// An event captured by a monitor but not yet inserted into the buffer.
/// Carries both clocks; the sequence id does not exist yet.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub timestamp_us: u64,
    pub wall_time: DateTime<Utc>,
    pub payload: EventPayload,
}

impl PendingEvent {
    /// Stamps the payload with the current capture and wall-clock time.
    pub fn capture(clock: &CaptureClock, payload: EventPayload) -> Self {
        Self {
            timestamp_us: clock.now_us(),
            wall_time: Utc::now(),
            payload,
        }
    }

    /// Builds a pending event with explicit timestamps.
    pub fn at(timestamp_us: u64, wall_time: DateTime<Utc>, payload: EventPayload) -> Self {
        Self {
            timestamp_us,
            wall_time,
            payload,
        }
    }
}

/// One immutable observation in the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Insertion-order id assigned by the buffer; breaks timestamp ties
    /// and defines the authoritative total order.
    pub sequence_id: u64,

    /// Monotonic capture time in microseconds since pipeline start.
    pub timestamp_us: u64,

    /// Wall-clock capture time, for display and analysis.
    pub wall_time: DateTime<Utc>,

    #[serde(flatten)]
    pub payload: EventPayload,

    /// File reference filled in asynchronously by the screenshot trigger.
    /// Stays `None` when no capture was requested, throttled, or failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}
