//! screen-cropper: capture the screen on a global hotkey and serve the frame
//!
//! Provides:
//! - An edge-triggered global hotkey engine fed by a pluggable key hook
//! - A thread-safe, buffer-reusing cache of the latest encoded capture
//! - An event bus and capture worker connecting the two
//! - A fixed-path HTTP server for the cached frame
//!
//! OS backends (CGEventTap or rdev for keys, xcap for the screen) are
//! compiled with the `native` feature.

pub mod capture;
pub mod config;
pub mod events;
pub mod hotkey;
pub mod lifecycle;
pub mod server;
