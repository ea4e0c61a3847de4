//! deskmon - desktop session timeline capture.
//!
//! Merges independent, asynchronously firing input sources (keyboard,
//! mouse, foreground window, text selection) into one strictly ordered,
//! de-duplicated, crash-tolerant timeline, with throttled screenshot
//! enrichment that never blocks the input-hook path. The flushed
//! JSON/CSV timeline plus the referenced screenshot files are consumed
//! by a downstream summarizer.
//!
//! OS specifics stay outside: hook installation, foreground-window
//! queries, selection reads, and pixel capture are collaborator traits
//! implemented by the embedding process.

pub mod bridge;
pub mod config;
pub mod error;
pub mod event;
pub mod keymap;
pub mod monitor;
pub mod pipeline;
pub mod screenshot;
pub mod timeline;

pub use config::MonitorConfig;
pub use error::{Error, Result};
pub use event::{Event, EventKind, EventPayload};
pub use pipeline::{Collaborators, SessionRecorder};
pub use timeline::{TimelineBuffer, TimelineFormat};
