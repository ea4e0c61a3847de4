//! Keyboard monitor.
//!
//! Receives raw key-down/key-up callbacks from the input hook
//! collaborator, on whatever thread the hook mechanism uses. The callback
//! path does nothing but map the key code, build the event, and hand it
//! to the buffer: no I/O, no capture work, no waiting.
//!
//! OS autorepeat is passed through as distinct events; condensing
//! repeated keys into typed text is a downstream concern.

use crate::event::{CaptureClock, EventPayload, PendingEvent};
use crate::keymap;
use crate::timeline::TimelineBuffer;
use std::sync::Arc;

pub struct KeyboardMonitor {
    bus: Arc<TimelineBuffer>,
    clock: CaptureClock,
}

impl KeyboardMonitor {
    pub fn new(bus: Arc<TimelineBuffer>, clock: CaptureClock) -> Self {
        Self { bus, clock }
    }

    /// Raw key-down callback. Returns the assigned sequence id.
    pub fn on_key_down(&self, key_code: u32, raw_flags: u64) -> u64 {
        self.emit(true, key_code, raw_flags)
    }

    /// Raw key-up callback. Returns the assigned sequence id.
    pub fn on_key_up(&self, key_code: u32, raw_flags: u64) -> u64 {
        self.emit(false, key_code, raw_flags)
    }

    fn emit(&self, down: bool, key_code: u32, raw_flags: u64) -> u64 {
        let key = keymap::key_name(key_code).to_string();
        let modifiers = keymap::parse_modifier_flags(raw_flags);

        let payload = if down {
            EventPayload::KeyPress {
                key,
                key_code,
                modifiers,
            }
        } else {
            EventPayload::KeyRelease {
                key,
                key_code,
                modifiers,
            }
        };

        let sequence_id = self.bus.ingest(PendingEvent::capture(&self.clock, payload));
        tracing::trace!(
            sequence_id,
            key_code,
            down,
            "Keyboard event captured"
        );
        sequence_id
    }
}
