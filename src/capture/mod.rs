//! Screen capture module
//!
//! [`CaptureBuffer`] caches one encoded image of the full virtual screen.
//! Pixels come from a [`CaptureSource`] and are encoded by a
//! [`FrameEncoder`], both injected so tests can run without a display.

mod buffer;
mod provider;
mod worker;

#[cfg(feature = "native")]
mod xcap_screen;

pub use buffer::{CaptureBuffer, FrameReader, DEFAULT_BUFFER_SIZE};
pub use provider::{CaptureSource, DisplaySource, FrameEncoder, PngEncoder, Rect};
pub use worker::CaptureWorker;

#[cfg(feature = "native")]
pub use xcap_screen::XcapScreen;

/// Errors that can occur enumerating displays, capturing or encoding
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to enumerate displays: {0}")]
    DisplayEnumeration(String),

    #[error("screen capture failed: {0}")]
    Source(String),

    #[error("frame encoding failed: {0}")]
    Encode(String),
}
