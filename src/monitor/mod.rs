//! Monitors: one producer per raw input source.
//!
//! Each monitor translates callbacks or polls from an external
//! collaborator into canonical events and forwards them to the timeline
//! buffer. Monitors never block on the callback path and never read each
//! other's state.

pub mod keyboard;
pub mod mouse;
pub mod text_selection;
pub mod window_poller;

pub use keyboard::KeyboardMonitor;
pub use mouse::MouseMonitor;
pub use text_selection::{
    spawn_selection_thread, SelectedText, SelectionQuery, TextSelectionMonitor,
};
pub use window_poller::{spawn_polling_thread, ForegroundWindow, WindowQuery, WindowTracker};
