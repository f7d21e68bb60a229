//! Edge-triggered hotkey engine
//!
//! Maintains the held-key table and a registry of listeners, one per
//! canonical [`Hotkey`]. A single consumer task drains the hook's event
//! queue into [`HotkeyEngine::feed`], so all key-state writes happen in
//! arrival order on one task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::combo::Hotkey;
use super::hook::{HookError, KeyHook, KeySink, DEFAULT_QUEUE_SIZE};
use super::keys::{KeyDirection, KeyEvent, KeyStateTable, VirtualKeyCode};

type Callback = Box<dyn Fn() + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One registered combination and its edge-trigger state
///
/// `armed` is idle (false) until the combination becomes fully held, at
/// which point the callback fires once and the listener stays armed until
/// a component key is released.
struct HotkeyListener {
    hotkey: Hotkey,
    armed: Mutex<bool>,
    callback: Callback,
}

impl HotkeyListener {
    fn new(hotkey: Hotkey, callback: Callback) -> Self {
        Self {
            hotkey,
            armed: Mutex::new(false),
            callback,
        }
    }

    fn notify(&self, keys: &KeyStateTable) {
        let fire = {
            let mut armed = lock(&self.armed);
            if !self.hotkey.is_held(keys) {
                *armed = false;
                false
            } else if *armed {
                false
            } else {
                *armed = true;
                true
            }
        };

        if fire {
            debug!(hotkey = %self.hotkey, "hotkey fired");
            (self.callback)();
        }
    }

    fn disarm(&self) {
        *lock(&self.armed) = false;
    }
}

/// Key state and listener registry shared with the consumer task
#[derive(Default)]
struct EngineState {
    keys: KeyStateTable,
    registry: RwLock<HashMap<Hotkey, Arc<HotkeyListener>>>,
}

impl EngineState {
    fn feed(&self, event: KeyEvent) {
        match event.direction {
            KeyDirection::Press => {
                self.keys.set(event.code, true);
                for listener in self.snapshot() {
                    listener.notify(&self.keys);
                }
            }
            KeyDirection::Release => {
                self.keys.set(event.code, false);
                // Releasing a component key returns the listener to idle
                // without evaluating it; firing only ever happens on press.
                for listener in self.snapshot() {
                    if listener.hotkey.contains(event.code) {
                        listener.disarm();
                    }
                }
            }
        }
    }

    /// Copy of the current listeners so callbacks may touch the registry
    fn snapshot(&self) -> Vec<Arc<HotkeyListener>> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn reset(&self) {
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.keys.clear();
    }
}

/// Handles for a started engine
struct Running {
    close_tx: oneshot::Sender<()>,
    consumer: JoinHandle<()>,
}

/// Global hotkey engine
///
/// Construct one per hook provider. Engines share no state with each other.
pub struct HotkeyEngine {
    state: Arc<EngineState>,
    hook: Mutex<Box<dyn KeyHook>>,
    running: Mutex<Option<Running>>,
    queue_size: usize,
}

impl HotkeyEngine {
    /// Create an engine that will install `hook` on start
    pub fn new(hook: impl KeyHook + 'static) -> Self {
        Self::with_queue_size(hook, DEFAULT_QUEUE_SIZE)
    }

    /// Create an engine with a custom key-event queue capacity
    pub fn with_queue_size(hook: impl KeyHook + 'static, queue_size: usize) -> Self {
        Self {
            state: Arc::new(EngineState::default()),
            hook: Mutex::new(Box::new(hook)),
            running: Mutex::new(None),
            queue_size: queue_size.max(1),
        }
    }

    /// Register `callback` for the combination of `keys`
    ///
    /// Returns the canonical hotkey for later unregistration. Registering
    /// an identical combination replaces the previous listener and its
    /// armed state. The callback runs on the consumer task and must not
    /// block.
    pub fn register<I, F>(&self, keys: I, callback: F) -> Hotkey
    where
        I: IntoIterator<Item = VirtualKeyCode>,
        F: Fn() + Send + Sync + 'static,
    {
        let hotkey = Hotkey::new(keys);
        let listener = Arc::new(HotkeyListener::new(hotkey.clone(), Box::new(callback)));
        let replaced = self
            .state
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hotkey.clone(), listener)
            .is_some();

        info!(%hotkey, replaced, "hotkey registered");
        hotkey
    }

    /// Remove the listener for `hotkey`; returns false if none was registered
    pub fn unregister(&self, hotkey: &Hotkey) -> bool {
        let removed = self
            .state
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(hotkey)
            .is_some();

        if removed {
            info!(%hotkey, "hotkey unregistered");
        }
        removed
    }

    /// Apply one key transition and evaluate listeners on press
    pub fn feed(&self, event: KeyEvent) {
        self.state.feed(event);
    }

    /// Install the key hook and start the consumer task
    ///
    /// Must be called from within a tokio runtime. On install failure no
    /// task is spawned and the engine stays stopped.
    pub fn start(&self) -> Result<(), HookError> {
        let mut running = lock(&self.running);
        if running.is_some() {
            return Err(HookError::AlreadyRunning);
        }

        let (tx, rx) = mpsc::channel(self.queue_size);
        if let Err(e) = lock(&self.hook).install(KeySink::new(tx)) {
            error!(?e, "failed to install key hook");
            return Err(e);
        }

        let (close_tx, close_rx) = oneshot::channel();
        let consumer = tokio::spawn(consume(Arc::clone(&self.state), rx, close_rx));
        *running = Some(Running { close_tx, consumer });

        info!(queue_size = self.queue_size, "hotkey engine started");
        Ok(())
    }

    /// Uninstall the hook, drain the queue and reset all state
    ///
    /// The registry is cleared and every key marked released, so hotkeys
    /// must be registered again before the next start. If uninstalling the
    /// hook fails the engine keeps running and nothing is reset.
    pub async fn stop(&self) -> Result<(), HookError> {
        // Uninstall may block joining the hook thread; callbacks on the
        // consumer must still be able to take the `running` lock meanwhile.
        let running = lock(&self.running).take();
        if running.is_some() {
            let uninstalled = lock(&self.hook).uninstall();
            if let Err(e) = uninstalled {
                error!(?e, "failed to uninstall key hook");
                let mut slot = lock(&self.running);
                if slot.is_none() {
                    *slot = running;
                }
                return Err(e);
            }
        }

        if let Some(Running { close_tx, consumer }) = running {
            let _ = close_tx.send(());
            if let Err(e) = consumer.await {
                warn!(?e, "key event consumer ended abnormally");
            }
        }

        self.state.reset();
        info!("hotkey engine stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        lock(&self.running).is_some()
    }

    pub fn is_registered(&self, hotkey: &Hotkey) -> bool {
        self.state
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(hotkey)
    }

    pub fn registered_count(&self) -> usize {
        self.state
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_held(&self, code: VirtualKeyCode) -> bool {
        self.state.keys.is_held(code)
    }

    pub fn held_count(&self) -> usize {
        self.state.keys.held_count()
    }
}

impl Drop for HotkeyEngine {
    fn drop(&mut self) {
        if lock(&self.running).take().is_some() {
            if let Err(e) = lock(&self.hook).uninstall() {
                warn!(?e, "failed to uninstall key hook on drop");
            }
        }
    }
}

/// Drain key events in arrival order until the queue closes
async fn consume(
    state: Arc<EngineState>,
    mut rx: mpsc::Receiver<KeyEvent>,
    mut close_rx: oneshot::Receiver<()>,
) {
    debug!("key event consumer started");

    loop {
        tokio::select! {
            biased;

            event = rx.recv() => match event {
                Some(event) => state.feed(event),
                None => break,
            },

            _ = &mut close_rx => {
                rx.close();
                while let Some(event) = rx.recv().await {
                    state.feed(event);
                }
                break;
            }
        }
    }

    debug!("key event consumer stopped");
}
