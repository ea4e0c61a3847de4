//! Crate-wide error type.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Another instance holds the lock file and its PID is still alive.
    #[error("another deskmon instance is already running (pid {0})")]
    AlreadyRunning(u32),

    /// The input hook collaborator could not be started. Fatal at startup:
    /// without hooks there is nothing to record.
    #[error("input hook installation failed: {0}")]
    HookInstall(String),

    /// The foreground window collaborator could not answer a poll.
    /// Transient; the tracker keeps its last-known state.
    #[error("window query failed: {0}")]
    WindowQuery(String),

    /// The screenshot collaborator failed to produce a capture.
    /// Non-fatal; the event keeps an absent reference.
    #[error("screenshot capture failed: {0}")]
    Capture(String),

    /// A screenshot reference targeted a sequence id the buffer no longer
    /// (or never) held.
    #[error("event {0} not found in timeline buffer")]
    UnknownEvent(u64),

    /// A screenshot reference was already attached to this event.
    #[error("screenshot already attached to event {0}")]
    ScreenshotAlreadySet(u64),

    #[error("timeline I/O error")]
    Io(#[from] std::io::Error),

    #[error("timeline serialization error")]
    Serialize(#[from] serde_json::Error),

    #[error("unknown timeline format: {0:?} (expected \"json\" or \"csv\")")]
    UnknownFormat(String),
}
