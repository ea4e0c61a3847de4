//! deskmon - desktop session timeline recorder.
//!
//! Reads raw input callbacks from a hook collaborator on stdin,
//! assembles the ordered timeline, and flushes it to the configured
//! JSON/CSV file until Ctrl+C or the input feed ends.

use deskmon::bridge::StdinBridge;
use deskmon::config::{default_data_dir, MonitorConfig};
use deskmon::error::Error;
use deskmon::pipeline::{Collaborators, SessionRecorder};
use deskmon::screenshot::{CommandCapture, ScreenshotCapture};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let lock_path = default_data_dir().join("deskmon.lock");
    let _lock = acquire_lock(&lock_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("deskmon=info")),
        )
        .init();

    let config = MonitorConfig::from_env();
    tracing::info!(
        timeline = %config.timeline_path.display(),
        format = config.timeline_format.as_str(),
        "Starting session recorder"
    );

    let bridge = Arc::new(StdinBridge::new());

    let capture: Option<Arc<dyn ScreenshotCapture>> = match std::env::var("DESKMON_CAPTURE_CMD") {
        Ok(command) => {
            let directory = std::env::var_os("DESKMON_SCREENSHOT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| default_data_dir().join("screenshots"));
            Some(Arc::new(CommandCapture::new(command, directory)))
        }
        Err(_) => {
            tracing::info!("DESKMON_CAPTURE_CMD not set, screenshots disabled");
            None
        }
    };

    let collaborators = Collaborators {
        window: bridge.window_query(),
        selection: Some(bridge.selection_query()),
        capture,
    };

    let mut recorder = SessionRecorder::new(config, collaborators)?;
    let shutdown = recorder.shutdown_flag();

    // The hook feed must be up before monitoring begins; failure here is
    // fatal, not retried.
    Arc::clone(&bridge).spawn(recorder.keyboard(), recorder.mouse(), Arc::clone(&shutdown))?;
    recorder.start();

    let shutdown_ctrlc = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        println!("\nShutdown signal received...");
        shutdown_ctrlc.store(true, Ordering::SeqCst);
    })?;

    println!("deskmon is recording. Press Ctrl+C to stop.");

    while !shutdown.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }

    recorder.stop()?;
    print_summary(&recorder, &bridge);

    Ok(())
}

/// RAII guard that deletes the lock file on exit.
struct LockFileGuard(PathBuf);

impl Drop for LockFileGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

/// Single-instance check: refuse to start while a lock file from a
/// previous recorder is present.
fn acquire_lock(lock_path: &PathBuf) -> Result<LockFileGuard, Error> {
    if lock_path.exists() {
        let pid = fs::read_to_string(lock_path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);
        return Err(Error::AlreadyRunning(pid));
    }

    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(lock_path, std::process::id().to_string())?;
    Ok(LockFileGuard(lock_path.clone()))
}

fn print_summary(recorder: &SessionRecorder, bridge: &StdinBridge) {
    let metrics = recorder.metrics();

    println!();
    println!("════════════════════════════════════════════");
    println!("  Session summary");
    println!("════════════════════════════════════════════");
    println!("  Events captured:   {}", metrics.buffer.ingested);
    println!("  Still buffered:    {}", metrics.buffer.depth);
    if let Some(shots) = &metrics.screenshots {
        println!(
            "  Screenshots:       {} taken, {} throttled, {} failed",
            shots.completed, shots.throttled, shots.failed
        );
    }
    println!("  Window poll fails: {}", metrics.window_query_failures);
    if bridge.malformed_count() > 0 {
        println!("  Malformed input:   {}", bridge.malformed_count());
    }
    println!("════════════════════════════════════════════");
}
