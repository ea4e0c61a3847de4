//! Runtime configuration.

use crate::timeline::TimelineFormat;
use std::path::PathBuf;
use std::time::Duration;

/// All pipeline tunables, with defaults suitable for an interactive
/// desktop session.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How often the foreground window is polled.
    pub poll_interval: Duration,

    /// How often the text selection is polled.
    pub selection_interval: Duration,

    /// Minimum time between emitted selection events.
    pub selection_change_threshold: Duration,

    /// Selections longer than this are truncated (in characters).
    pub max_selection_len: usize,

    /// Whether to monitor text selections at all.
    pub monitor_text_selection: bool,

    /// Whether click events request screenshots.
    pub capture_screenshots: bool,

    /// Minimum time between screenshot captures; requests inside the
    /// window are dropped.
    pub screenshot_min_interval: Duration,

    /// How long shutdown waits for an in-flight capture before
    /// abandoning it.
    pub screenshot_grace: Duration,

    /// How often the timeline is flushed to disk.
    pub flush_interval: Duration,

    /// Flush retry budget on I/O failure.
    pub flush_retry_attempts: u32,
    pub flush_retry_backoff: Duration,

    /// How long flushed events stay in memory for late screenshot
    /// attaches before eviction.
    pub retention: Duration,

    /// Timeline file destination and format.
    pub timeline_path: PathBuf,
    pub timeline_format: TimelineFormat,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            selection_interval: Duration::from_secs(1),
            selection_change_threshold: Duration::from_secs(3),
            max_selection_len: 2000,
            monitor_text_selection: false,
            capture_screenshots: true,
            screenshot_min_interval: Duration::from_millis(500),
            screenshot_grace: Duration::from_secs(2),
            flush_interval: Duration::from_secs(5),
            flush_retry_attempts: 3,
            flush_retry_backoff: Duration::from_millis(250),
            retention: Duration::from_secs(60),
            timeline_path: default_data_dir().join("timeline.json"),
            timeline_format: TimelineFormat::Json,
        }
    }
}

impl MonitorConfig {
    /// Builds a config from defaults plus `DESKMON_*` environment
    /// overrides. Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(path) = std::env::var_os("DESKMON_TIMELINE") {
            config.timeline_path = PathBuf::from(path);
        }
        if let Ok(format) = std::env::var("DESKMON_FORMAT") {
            if let Ok(parsed) = format.parse() {
                config.timeline_format = parsed;
            }
        }
        if let Some(ms) = env_u64("DESKMON_POLL_MS") {
            config.poll_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = env_u64("DESKMON_FLUSH_MS") {
            config.flush_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = env_u64("DESKMON_THROTTLE_MS") {
            config.screenshot_min_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = env_u64("DESKMON_RETENTION_SECS") {
            config.retention = Duration::from_secs(secs);
        }
        if let Some(on) = env_bool("DESKMON_SCREENSHOTS") {
            config.capture_screenshots = on;
        }
        if let Some(on) = env_bool("DESKMON_SELECTION") {
            config.monitor_text_selection = on;
        }

        config
    }
}

/// Per-user data directory for timeline output and the lock file.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("deskmon"))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.trim().parse().ok()
}

fn env_bool(name: &str) -> Option<bool> {
    match std::env::var(name).ok()?.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.screenshot_min_interval, Duration::from_millis(500));
        assert_eq!(config.timeline_format, TimelineFormat::Json);
        assert!(config.capture_screenshots);
        assert!(!config.monitor_text_selection);
    }

    #[test]
    fn test_default_path_under_data_dir() {
        let config = MonitorConfig::default();
        assert!(config.timeline_path.ends_with("timeline.json"));
    }
}
