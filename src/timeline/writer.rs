//! Durable timeline serialization.
//!
//! The writer drains the buffer through a sequence cursor and appends to
//! a JSON-array or CSV file. The cursor only advances after a successful
//! write, so a failed flush loses nothing: the buffer stays the source
//! of truth and the next flush re-drains the same delta (at-least-once
//! delivery across crash boundaries, exactly-once within a run).
//!
//! The JSON file is an array maintained incrementally: `[` at creation,
//! comma-joined objects per flush, `]` at finalize. The CSV file carries
//! a fixed header with one normalized column set; kind-specific fields a
//! row does not use stay empty.

use crate::error::{Error, Result};
use crate::event::{Event, EventPayload};
use crate::timeline::TimelineBuffer;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Output format of the timeline file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineFormat {
    Json,
    Csv,
}

impl TimelineFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimelineFormat::Json => "json",
            TimelineFormat::Csv => "csv",
        }
    }
}

impl FromStr for TimelineFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(TimelineFormat::Json),
            "csv" => Ok(TimelineFormat::Csv),
            other => Err(Error::UnknownFormat(other.to_string())),
        }
    }
}

/// Fixed CSV column set. Kind-specific fields are empty when absent.
pub const CSV_HEADER: &str = "sequence_id,timestamp_us,wall_time,event_type,key,key_code,\
modifiers,button,x,y,delta_x,delta_y,app_name,window_title,previous_app,previous_title,\
selected_text,selection_source,screenshot";

pub struct TimelineWriter {
    bus: Arc<TimelineBuffer>,
    path: PathBuf,
    format: TimelineFormat,
    retention: Duration,
    /// Highest sequence id already written to disk.
    cursor: u64,
    entries_written: u64,
    finalized: bool,
}

impl TimelineWriter {
    /// Creates the timeline file (truncating any previous one) and
    /// writes the document prologue.
    pub fn create(
        bus: Arc<TimelineBuffer>,
        path: impl Into<PathBuf>,
        format: TimelineFormat,
        retention: Duration,
    ) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        match format {
            TimelineFormat::Json => fs::write(&path, "[\n")?,
            TimelineFormat::Csv => fs::write(&path, format!("{CSV_HEADER}\n"))?,
        }
        tracing::info!(path = %path.display(), format = format.as_str(), "Timeline file created");

        Ok(Self {
            bus,
            path,
            format,
            retention,
            cursor: 0,
            entries_written: 0,
            finalized: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends all events past the cursor to the file. Returns how many
    /// were written; a second flush with no new events writes nothing.
    pub fn flush(&mut self) -> Result<usize> {
        let delta = self.bus.drain_since(self.cursor);
        if delta.is_empty() {
            self.bus.evict_flushed(self.cursor, self.retention);
            return Ok(0);
        }

        let mut chunk = String::new();
        for (i, event) in delta.iter().enumerate() {
            match self.format {
                TimelineFormat::Json => {
                    // Every entry after the first in the file is
                    // comma-prefixed, across flush boundaries.
                    if self.entries_written > 0 || i > 0 {
                        chunk.push_str(",\n");
                    }
                    chunk.push_str(&serde_json::to_string(event)?);
                }
                TimelineFormat::Csv => {
                    chunk.push_str(&csv_row(event));
                    chunk.push('\n');
                }
            }
        }

        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(chunk.as_bytes())?;
        file.flush()?;

        self.cursor = delta.last().map(|e| e.sequence_id).unwrap_or(self.cursor);
        self.entries_written += delta.len() as u64;
        self.bus.evict_flushed(self.cursor, self.retention);

        tracing::debug!(
            events = delta.len(),
            cursor = self.cursor,
            "Timeline flushed"
        );
        Ok(delta.len())
    }

    /// Flushes, retrying transient I/O failures with exponential backoff.
    pub fn flush_with_retry(&mut self, attempts: u32, initial_backoff: Duration) -> Result<usize> {
        let mut backoff = initial_backoff;
        let mut last_err = None;
        for attempt in 0..attempts.max(1) {
            match self.flush() {
                Ok(written) => return Ok(written),
                Err(e) => {
                    tracing::warn!(attempt, ?e, "Timeline flush failed, will retry");
                    last_err = Some(e);
                    thread::sleep(backoff);
                    backoff *= 2;
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Io(std::io::Error::other("flush failed"))))
    }

    /// Final flush plus the JSON epilogue. Idempotent; called once at
    /// shutdown.
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.flush()?;
        if self.format == TimelineFormat::Json {
            let mut file = OpenOptions::new().append(true).open(&self.path)?;
            file.write_all(b"\n]\n")?;
        }
        self.finalized = true;
        tracing::info!(path = %self.path.display(), entries = self.entries_written, "Timeline finalized");
        Ok(())
    }

    /// Total entries written so far.
    pub fn entries_written(&self) -> u64 {
        self.entries_written
    }
}

/// Renders a complete in-memory document for an event snapshot.
pub fn render(events: &[Event], format: TimelineFormat) -> Result<String> {
    match format {
        TimelineFormat::Json => Ok(serde_json::to_string_pretty(events)?),
        TimelineFormat::Csv => {
            let mut out = String::from(CSV_HEADER);
            out.push('\n');
            for event in events {
                out.push_str(&csv_row(event));
                out.push('\n');
            }
            Ok(out)
        }
    }
}

fn csv_row(event: &Event) -> String {
    // Normalized column set; empty strings for fields the kind lacks.
    let mut key = String::new();
    let mut key_code = String::new();
    let mut modifiers = String::new();
    let mut button = String::new();
    let mut x = String::new();
    let mut y = String::new();
    let mut delta_x = String::new();
    let mut delta_y = String::new();
    let mut app_name = String::new();
    let mut window_title = String::new();
    let mut previous_app = String::new();
    let mut previous_title = String::new();
    let mut selected_text = String::new();
    let mut selection_source = String::new();

    match &event.payload {
        EventPayload::KeyPress {
            key: k,
            key_code: c,
            modifiers: m,
        }
        | EventPayload::KeyRelease {
            key: k,
            key_code: c,
            modifiers: m,
        } => {
            key = k.clone();
            key_code = c.to_string();
            modifiers = m.describe();
        }
        EventPayload::MouseClick {
            button: b,
            x: px,
            y: py,
        } => {
            button = b.as_str().to_string();
            x = px.to_string();
            y = py.to_string();
        }
        EventPayload::MouseScroll {
            delta_x: dx,
            delta_y: dy,
            x: px,
            y: py,
        } => {
            delta_x = dx.to_string();
            delta_y = dy.to_string();
            x = px.to_string();
            y = py.to_string();
        }
        EventPayload::WindowChange {
            app_name: app,
            window_title: title,
            previous_app: prev_app,
            previous_title: prev_title,
        } => {
            app_name = app.clone();
            window_title = title.clone();
            previous_app = prev_app.clone().unwrap_or_default();
            previous_title = prev_title.clone().unwrap_or_default();
        }
        EventPayload::TextSelection {
            text,
            app_name: app,
            source,
        } => {
            selected_text = text.clone();
            app_name = app.clone().unwrap_or_default();
            selection_source = source.as_str().to_string();
        }
    }

    let fields = [
        event.sequence_id.to_string(),
        event.timestamp_us.to_string(),
        event.wall_time.to_rfc3339(),
        event.kind().as_str().to_string(),
        key,
        key_code,
        modifiers,
        button,
        x,
        y,
        delta_x,
        delta_y,
        app_name,
        window_title,
        previous_app,
        previous_title,
        selected_text,
        selection_source,
        event.screenshot.clone().unwrap_or_default(),
    ];
    fields
        .iter()
        .map(|f| csv_escape(f))
        .collect::<Vec<_>>()
        .join(",")
}

fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Spawns the periodic flush thread. Flushes every `interval` with
/// retry, until the shutdown flag is set; the final flush and epilogue
/// happen through [`TimelineWriter::finalize`] at shutdown.
pub fn spawn_flush_thread(
    writer: Arc<Mutex<TimelineWriter>>,
    shutdown: Arc<AtomicBool>,
    interval: Duration,
    retry_attempts: u32,
    retry_backoff: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        tracing::info!(interval_ms = interval.as_millis(), "Flush thread started");

        let tick = Duration::from_millis(100).min(interval);
        let mut elapsed = Duration::ZERO;
        while !shutdown.load(Ordering::SeqCst) {
            thread::sleep(tick);
            elapsed += tick;
            if elapsed < interval {
                continue;
            }
            elapsed = Duration::ZERO;

            if let Ok(mut writer) = writer.lock() {
                if let Err(e) = writer.flush_with_retry(retry_attempts, retry_backoff) {
                    tracing::error!(?e, "Timeline flush still failing after retries");
                }
            }
        }

        tracing::info!("Flush thread shutting down");
    })
}
