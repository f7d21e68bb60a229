//! Key-hook provider interface
//!
//! A hook provider installs an OS-level keyboard hook and pushes raw key
//! transitions into the [`KeySink`] it was given. The sink fronts the
//! engine's bounded input queue.

use tokio::sync::mpsc;

use super::keys::KeyEvent;

/// Default capacity of the key-event queue
pub const DEFAULT_QUEUE_SIZE: usize = 256;

/// Errors that can occur installing, removing or feeding a key hook
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("hotkey engine is already running")]
    AlreadyRunning,

    #[error("failed to install key hook: {0}")]
    Install(String),

    #[error("failed to uninstall key hook: {0}")]
    Uninstall(String),

    #[error("key event queue is closed")]
    QueueClosed,
}

/// Sending half of the engine's key-event queue
#[derive(Debug, Clone)]
pub struct KeySink {
    tx: mpsc::Sender<KeyEvent>,
}

impl KeySink {
    pub(crate) fn new(tx: mpsc::Sender<KeyEvent>) -> Self {
        Self { tx }
    }

    /// Queue an event, blocking the calling thread while the queue is full
    ///
    /// Intended for hook threads. Must not be called from inside an async
    /// context.
    pub fn send(&self, event: KeyEvent) -> Result<(), HookError> {
        self.tx
            .blocking_send(event)
            .map_err(|_| HookError::QueueClosed)
    }

    /// Queue an event without blocking; returns false if it was dropped
    pub fn try_send(&self, event: KeyEvent) -> bool {
        self.tx.try_send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// An OS keyboard hook
pub trait KeyHook: Send {
    /// Start delivering key transitions into `sink`
    fn install(&mut self, sink: KeySink) -> Result<(), HookError>;

    /// Stop delivering events and release the sink
    fn uninstall(&mut self) -> Result<(), HookError>;
}

impl<H: KeyHook + ?Sized> KeyHook for Box<H> {
    fn install(&mut self, sink: KeySink) -> Result<(), HookError> {
        (**self).install(sink)
    }

    fn uninstall(&mut self) -> Result<(), HookError> {
        (**self).uninstall()
    }
}
