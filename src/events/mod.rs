//! Application events
//!
//! Published on a broadcast bus by hotkey callbacks and the capture
//! worker; any number of observers may subscribe.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default capacity of the event bus
pub const EVENT_BUS_SIZE: usize = 64;

/// Events emitted around the capture lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    /// The capture hotkey was pressed
    CaptureRequested {
        /// Canonical identity of the hotkey that fired
        hotkey: String,
    },

    /// A new frame replaced the cached one
    Captured {
        /// Encoded frame size
        bytes: usize,
        /// Time spent capturing and encoding
        duration_ms: u64,
    },

    /// A capture failed; the previous frame is still served
    CaptureFailed {
        message: String,
    },
}

impl std::fmt::Display for AppEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppEvent::CaptureRequested { hotkey } => write!(f, "CAPTURE_REQUESTED ({})", hotkey),
            AppEvent::Captured { bytes, duration_ms } => {
                write!(f, "CAPTURED ({} bytes, {}ms)", bytes, duration_ms)
            }
            AppEvent::CaptureFailed { message } => write!(f, "CAPTURE_FAILED ({})", message),
        }
    }
}

/// Create the application event bus
pub fn bus() -> (broadcast::Sender<AppEvent>, broadcast::Receiver<AppEvent>) {
    broadcast::channel(EVENT_BUS_SIZE)
}
