//! Configuration loading and management

use std::net::SocketAddr;

use anyhow::{Context, Result};

use crate::hotkey::{Hotkey, DEFAULT_QUEUE_SIZE};

/// Default frame server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8765";

/// Default capture hotkey
pub const DEFAULT_HOTKEY: &str = "LControl+LMenu+A";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the frame server listens on
    pub addr: SocketAddr,

    /// Combination that triggers a capture
    pub hotkey: Hotkey,

    /// Capacity of the key-event queue
    pub queue_size: usize,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let addr = lookup("SCREEN_CROPPER_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let addr = addr
            .parse()
            .with_context(|| format!("invalid SCREEN_CROPPER_ADDR: {addr}"))?;

        let hotkey = lookup("SCREEN_CROPPER_HOTKEY").unwrap_or_else(|| DEFAULT_HOTKEY.to_string());
        let hotkey = hotkey
            .parse()
            .with_context(|| format!("invalid SCREEN_CROPPER_HOTKEY: {hotkey}"))?;

        let queue_size = match lookup("SCREEN_CROPPER_QUEUE") {
            Some(value) => value
                .parse::<usize>()
                .ok()
                .filter(|&size| size > 0)
                .with_context(|| format!("invalid SCREEN_CROPPER_QUEUE: {value}"))?,
            None => DEFAULT_QUEUE_SIZE,
        };

        Ok(Self {
            addr,
            hotkey,
            queue_size,
        })
    }
}
