//! Hotkey module for global keyboard event listening
//!
//! A [`KeyHook`] provider feeds raw key transitions into a
//! [`HotkeyEngine`], which tracks held keys and edge-triggers callbacks
//! for registered combinations.

mod combo;
mod engine;
mod hook;
mod keys;

#[cfg(all(feature = "native", target_os = "macos"))]
mod macos;
#[cfg(all(feature = "native", not(target_os = "macos")))]
mod rdev_hook;

pub use combo::Hotkey;
pub use engine::HotkeyEngine;
pub use hook::{HookError, KeyHook, KeySink, DEFAULT_QUEUE_SIZE};
pub use keys::{
    KeyDirection, KeyEvent, KeyParseError, KeyStateTable, VirtualKeyCode, KEY_CODE_COUNT,
};

#[cfg(all(feature = "native", target_os = "macos"))]
pub use macos::EventTapHook as NativeHook;
#[cfg(all(feature = "native", not(target_os = "macos")))]
pub use rdev_hook::RdevHook as NativeHook;
