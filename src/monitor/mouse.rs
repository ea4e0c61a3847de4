//! Mouse monitor.
//!
//! Clicks and scrolls arrive with absolute screen coordinates; no
//! coordinate transformation happens here (display scaling belongs to
//! the screenshot collaborator). Clicks additionally signal the
//! screenshot trigger, fire-and-forget, after the event already has its
//! sequence id.

use crate::event::{CaptureClock, EventPayload, MouseButton, PendingEvent};
use crate::screenshot::ScreenshotTrigger;
use crate::timeline::TimelineBuffer;
use std::sync::Arc;

pub struct MouseMonitor {
    bus: Arc<TimelineBuffer>,
    clock: CaptureClock,
    trigger: Option<Arc<ScreenshotTrigger>>,
}

impl MouseMonitor {
    pub fn new(
        bus: Arc<TimelineBuffer>,
        clock: CaptureClock,
        trigger: Option<Arc<ScreenshotTrigger>>,
    ) -> Self {
        Self {
            bus,
            clock,
            trigger,
        }
    }

    /// Raw click callback. Ingests the event, then requests a screenshot
    /// for it. Returns the assigned sequence id.
    pub fn on_click(&self, button: MouseButton, x: f64, y: f64) -> u64 {
        let payload = EventPayload::MouseClick { button, x, y };
        let sequence_id = self.bus.ingest(PendingEvent::capture(&self.clock, payload));
        tracing::trace!(sequence_id, button = button.as_str(), x, y, "Click captured");

        if let Some(trigger) = &self.trigger {
            trigger.request(sequence_id, crate::event::EventKind::MouseClick, Some((x, y)));
        }
        sequence_id
    }

    /// Raw scroll callback. Returns the assigned sequence id.
    pub fn on_scroll(&self, delta_x: i32, delta_y: i32, x: f64, y: f64) -> u64 {
        let payload = EventPayload::MouseScroll {
            delta_x,
            delta_y,
            x,
            y,
        };
        let sequence_id = self.bus.ingest(PendingEvent::capture(&self.clock, payload));
        tracing::trace!(sequence_id, delta_x, delta_y, "Scroll captured");
        sequence_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::screenshot::{CaptureRequest, ScreenshotCapture};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingCapture(AtomicUsize);

    impl ScreenshotCapture for CountingCapture {
        fn capture(&self, request: &CaptureRequest) -> Result<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            assert_eq!(request.position, Some((50.0, 60.0)));
            Ok("shots/click.png".to_string())
        }
    }

    #[test]
    fn test_click_ingests_and_requests_screenshot() {
        let bus = Arc::new(TimelineBuffer::new());
        let clock = CaptureClock::new();
        let backend = Arc::new(CountingCapture(AtomicUsize::new(0)));
        let trigger = ScreenshotTrigger::start(
            Arc::clone(&bus),
            Arc::clone(&backend) as Arc<dyn ScreenshotCapture>,
            Duration::from_millis(0),
            clock,
        );
        let monitor = MouseMonitor::new(Arc::clone(&bus), clock, Some(Arc::clone(&trigger)));

        let seq = monitor.on_click(MouseButton::Left, 50.0, 60.0);
        trigger.stop(Duration::from_secs(2));

        assert_eq!(backend.0.load(Ordering::SeqCst), 1);
        let snapshot = bus.snapshot();
        assert_eq!(snapshot[0].sequence_id, seq);
        assert_eq!(snapshot[0].screenshot.as_deref(), Some("shots/click.png"));
    }

    #[test]
    fn test_scroll_does_not_request_screenshot() {
        let bus = Arc::new(TimelineBuffer::new());
        let clock = CaptureClock::new();
        let backend = Arc::new(CountingCapture(AtomicUsize::new(0)));
        let trigger = ScreenshotTrigger::start(
            Arc::clone(&bus),
            Arc::clone(&backend) as Arc<dyn ScreenshotCapture>,
            Duration::from_millis(0),
            clock,
        );
        let monitor = MouseMonitor::new(Arc::clone(&bus), clock, Some(Arc::clone(&trigger)));

        monitor.on_scroll(0, -3, 100.0, 200.0);
        trigger.stop(Duration::from_secs(2));

        assert_eq!(backend.0.load(Ordering::SeqCst), 0);
        let snapshot = bus.snapshot();
        assert!(matches!(
            snapshot[0].payload,
            EventPayload::MouseScroll { delta_y: -3, .. }
        ));
        assert!(snapshot[0].screenshot.is_none());
    }

    #[test]
    fn test_click_without_trigger() {
        let bus = Arc::new(TimelineBuffer::new());
        let monitor = MouseMonitor::new(Arc::clone(&bus), CaptureClock::new(), None);

        monitor.on_click(MouseButton::Right, 1.0, 2.0);
        assert_eq!(bus.snapshot().len(), 1);
    }
}
