//! Thread-safe, append-only timeline buffer.
//!
//! The buffer is the single synchronization point between producers
//! (keyboard, mouse, window poller, selection poller) and the writer.
//! Insertion assigns a monotonically increasing sequence id under one
//! lock, so the total order of events is exactly their arrival order at
//! the buffer, even when producer timestamps are skewed by scheduling
//! jitter. The buffer is unbounded; growth is surfaced through metrics,
//! never by dropping events.

use crate::error::{Error, Result};
use crate::event::{Event, PendingEvent};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
struct Inner {
    /// Events in insertion order. Sequence ids are contiguous, so
    /// `events[0].sequence_id == evicted_through + 1` always holds.
    events: VecDeque<Event>,

    /// Next sequence id to assign. Starts at 1.
    next_seq: u64,

    /// Highest sequence id evicted from the front of the buffer.
    evicted_through: u64,
}

/// Counters surfaced as a [`BufferMetricsSnapshot`].
#[derive(Debug, Default)]
struct Counters {
    ingested: AtomicU64,
    evicted: AtomicU64,
    attach_misses: AtomicU64,
}

/// Point-in-time view of the buffer counters.
#[derive(Debug, Clone, Serialize)]
pub struct BufferMetricsSnapshot {
    /// Total events ever ingested.
    pub ingested: u64,
    /// Events currently held in memory.
    pub depth: usize,
    /// Events evicted after a successful flush.
    pub evicted: u64,
    /// Screenshot attaches that arrived for an evicted or unknown event.
    pub attach_misses: u64,
}

/// The event bus: concurrent `ingest`, consistent ordered reads.
#[derive(Debug)]
pub struct TimelineBuffer {
    inner: Mutex<Inner>,
    counters: Counters,
}

impl TimelineBuffer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                events: VecDeque::new(),
                next_seq: 1,
                evicted_through: 0,
            }),
            counters: Counters::default(),
        }
    }

    /// Inserts an event and returns its assigned sequence id.
    ///
    /// Safe to call from any number of producer threads. Assignment is
    /// serialized, so sequence ids are gapless and reflect arrival order.
    pub fn ingest(&self, pending: PendingEvent) -> u64 {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let sequence_id = inner.next_seq;
        inner.next_seq += 1;
        inner.events.push_back(Event {
            sequence_id,
            timestamp_us: pending.timestamp_us,
            wall_time: pending.wall_time,
            payload: pending.payload,
            screenshot: None,
        });
        drop(inner);

        self.counters.ingested.fetch_add(1, Ordering::Relaxed);
        sequence_id
    }

    /// Ordered copy of everything currently buffered.
    pub fn snapshot(&self) -> Vec<Event> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.events.iter().cloned().collect()
    }

    /// Ordered copy of events with `sequence_id > since`.
    ///
    /// `drain_since(0)` returns everything still buffered. The buffer is
    /// not modified; eviction is a separate, explicit step so that a
    /// failed flush loses nothing.
    pub fn drain_since(&self, since: u64) -> Vec<Event> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .events
            .iter()
            .filter(|e| e.sequence_id > since)
            .cloned()
            .collect()
    }

    /// Attaches a screenshot reference to the event with the given
    /// sequence id. Succeeds at most once per event.
    pub fn attach_screenshot(&self, sequence_id: u64, reference: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if sequence_id <= inner.evicted_through || sequence_id >= inner.next_seq {
            drop(inner);
            self.counters.attach_misses.fetch_add(1, Ordering::Relaxed);
            return Err(Error::UnknownEvent(sequence_id));
        }

        // Sequence ids are contiguous, so the target's offset is direct.
        let index = (sequence_id - inner.evicted_through - 1) as usize;
        let event = &mut inner.events[index];
        if event.screenshot.is_some() {
            return Err(Error::ScreenshotAlreadySet(sequence_id));
        }
        event.screenshot = Some(reference.to_string());
        Ok(())
    }

    /// Evicts flushed events older than the retention window.
    ///
    /// Only events with `sequence_id <= flushed_through` are candidates;
    /// recently flushed events are kept so late screenshot attaches can
    /// still land.
    pub fn evict_flushed(&self, flushed_through: u64, retention: Duration) {
        let cutoff = chrono::Utc::now()
            - chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::zero());

        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let inner = &mut *guard;
        let mut removed = 0u64;
        loop {
            let Some(front) = inner.events.front() else {
                break;
            };
            if front.sequence_id > flushed_through || front.wall_time >= cutoff {
                break;
            }
            inner.evicted_through = front.sequence_id;
            inner.events.pop_front();
            removed += 1;
        }
        drop(guard);

        if removed > 0 {
            self.counters.evicted.fetch_add(removed, Ordering::Relaxed);
            tracing::trace!(removed, "Evicted flushed events from buffer");
        }
    }

    /// Number of events currently buffered.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .events
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest sequence id assigned so far, 0 before the first ingest.
    pub fn last_sequence_id(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .next_seq
            - 1
    }

    pub fn metrics(&self) -> BufferMetricsSnapshot {
        BufferMetricsSnapshot {
            ingested: self.counters.ingested.load(Ordering::Relaxed),
            depth: self.len(),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
            attach_misses: self.counters.attach_misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for TimelineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventPayload, Modifiers, MouseButton};
    use chrono::Utc;
    use std::sync::Arc;
    use std::thread;

    fn key_press(timestamp_us: u64, key: &str) -> PendingEvent {
        PendingEvent::at(
            timestamp_us,
            Utc::now(),
            EventPayload::KeyPress {
                key: key.to_string(),
                key_code: 0,
                modifiers: Modifiers::default(),
            },
        )
    }

    fn click(timestamp_us: u64, x: f64, y: f64) -> PendingEvent {
        PendingEvent::at(
            timestamp_us,
            Utc::now(),
            EventPayload::MouseClick {
                button: MouseButton::Left,
                x,
                y,
            },
        )
    }

    #[test]
    fn test_ingest_assigns_gapless_sequence() {
        let buffer = TimelineBuffer::new();
        assert_eq!(buffer.ingest(key_press(10, "a")), 1);
        assert_eq!(buffer.ingest(key_press(20, "b")), 2);
        assert_eq!(buffer.ingest(key_press(30, "c")), 3);
        assert_eq!(buffer.last_sequence_id(), 3);
    }

    #[test]
    fn test_concurrent_ingest_no_gaps_no_duplicates() {
        let buffer = Arc::new(TimelineBuffer::new());
        let per_thread = 200;

        let handles: Vec<_> = (0..3)
            .map(|t| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    for i in 0..per_thread {
                        buffer.ingest(key_press((t * per_thread + i) as u64, "x"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.len(), 3 * per_thread);

        // Gapless, strictly increasing sequence ids starting at 1.
        for (i, event) in snapshot.iter().enumerate() {
            assert_eq!(event.sequence_id, i as u64 + 1);
        }
        assert_eq!(buffer.metrics().ingested, 3 * per_thread as u64);
    }

    #[test]
    fn test_arrival_order_beats_timestamp_order() {
        // Key event captured at t=100 arrives first; click captured at
        // t=99 arrives later due to scheduling jitter. Sequence order is
        // the truth: the snapshot keeps arrival order.
        let buffer = TimelineBuffer::new();
        buffer.ingest(key_press(100, "a"));
        buffer.ingest(click(99, 50.0, 60.0));

        let snapshot = buffer.snapshot();
        assert!(matches!(
            snapshot[0].payload,
            EventPayload::KeyPress { ref key, .. } if key == "a"
        ));
        assert!(matches!(
            snapshot[1].payload,
            EventPayload::MouseClick { x, y, .. } if x == 50.0 && y == 60.0
        ));
        assert!(snapshot[0].sequence_id < snapshot[1].sequence_id);
    }

    #[test]
    fn test_drain_since_is_exclusive() {
        let buffer = TimelineBuffer::new();
        for i in 0..5 {
            buffer.ingest(key_press(i, "k"));
        }

        assert_eq!(buffer.drain_since(0).len(), 5);
        let tail = buffer.drain_since(3);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].sequence_id, 4);

        assert!(buffer.drain_since(5).is_empty());
    }

    #[test]
    fn test_attach_screenshot_set_once() {
        let buffer = TimelineBuffer::new();
        let seq = buffer.ingest(click(1, 0.0, 0.0));

        buffer.attach_screenshot(seq, "shots/000001.png").unwrap();
        let err = buffer.attach_screenshot(seq, "shots/other.png").unwrap_err();
        assert!(matches!(err, Error::ScreenshotAlreadySet(s) if s == seq));

        let snapshot = buffer.snapshot();
        assert_eq!(snapshot[0].screenshot.as_deref(), Some("shots/000001.png"));
    }

    #[test]
    fn test_attach_unknown_event_counted() {
        let buffer = TimelineBuffer::new();
        let err = buffer.attach_screenshot(42, "shots/a.png").unwrap_err();
        assert!(matches!(err, Error::UnknownEvent(42)));
        assert_eq!(buffer.metrics().attach_misses, 1);
    }

    #[test]
    fn test_evict_flushed_respects_cursor_and_retention() {
        let buffer = TimelineBuffer::new();
        for i in 0..4 {
            buffer.ingest(key_press(i, "k"));
        }

        // Zero retention: everything up to the flush cursor goes.
        buffer.evict_flushed(2, Duration::ZERO);
        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].sequence_id, 3);
        assert_eq!(buffer.metrics().evicted, 2);

        // A long retention window keeps flushed events in memory.
        buffer.evict_flushed(4, Duration::from_secs(3600));
        assert_eq!(buffer.len(), 2);

        // Attach after eviction is a miss, not a panic.
        assert!(buffer.attach_screenshot(1, "late.png").is_err());

        // New ids continue from where they left off.
        assert_eq!(buffer.ingest(key_press(9, "z")), 5);
    }
}
