// Rdev-based key hook for Windows/Linux
//
// rdev::listen blocks for the life of the process and offers no way to
// stop it, so the listener thread is started once and uninstall only
// detaches the sink. A later install attaches a new sink to the same
// listener, or starts a new one if the previous listener has died.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use rdev::{listen, Event, EventType, Key};
use tracing::{debug, error, info, warn};

use super::hook::{HookError, KeyHook, KeySink};
use super::keys::{KeyEvent, VirtualKeyCode};

/// How long install waits for rdev to report a startup failure
const STARTUP_GRACE: Duration = Duration::from_millis(250);

type SharedSink = Arc<Mutex<Option<KeySink>>>;

/// Key hook backed by `rdev::listen`
pub struct RdevHook {
    sink: SharedSink,
    /// Set while a listener thread is alive; cleared by the thread on exit
    listening: Arc<AtomicBool>,
}

impl RdevHook {
    pub fn new() -> Self {
        Self {
            sink: Arc::new(Mutex::new(None)),
            listening: Arc::new(AtomicBool::new(false)),
        }
    }

    fn start_listener(&mut self) -> Result<(), HookError> {
        let sink = Arc::clone(&self.sink);
        let listening = Arc::clone(&self.listening);
        let (error_tx, error_rx) = std_mpsc::channel();

        self.listening.store(true, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name("key-hook".to_string())
            .spawn(move || {
                info!("key hook thread started");
                let callback = move |event: Event| handle_event(&event, &sink);
                if let Some(message) = supervise(&listening, || listen(callback)) {
                    let _ = error_tx.send(message);
                }
            });
        if let Err(e) = spawned {
            self.listening.store(false, Ordering::SeqCst);
            return Err(HookError::Install(format!("failed to spawn hook thread: {e}")));
        }

        match error_rx.recv_timeout(STARTUP_GRACE) {
            Ok(message) => Err(HookError::Install(message)),
            Err(_) => Ok(()),
        }
    }
}

/// Run the blocking listener, clearing `listening` once it returns
///
/// Returns the failure message, if any.
fn supervise<E: fmt::Debug>(
    listening: &AtomicBool,
    run: impl FnOnce() -> Result<(), E>,
) -> Option<String> {
    let result = run();
    listening.store(false, Ordering::SeqCst);
    match result {
        Ok(()) => {
            warn!("rdev listener returned");
            None
        }
        Err(e) => {
            error!(?e, "rdev listener error");
            Some(format!("{e:?}"))
        }
    }
}

impl Default for RdevHook {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyHook for RdevHook {
    fn install(&mut self, sink: KeySink) -> Result<(), HookError> {
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);

        if !self.listening.load(Ordering::SeqCst) {
            if let Err(e) = self.start_listener() {
                *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = None;
                return Err(e);
            }
        }
        Ok(())
    }

    fn uninstall(&mut self) -> Result<(), HookError> {
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = None;
        debug!("key hook detached");
        Ok(())
    }
}

fn handle_event(event: &Event, sink: &SharedSink) {
    let (key, press) = match event.event_type {
        EventType::KeyPress(k) => (k, true),
        EventType::KeyRelease(k) => (k, false),
        _ => return,
    };
    let Some(code) = rdev_to_virtual(key) else {
        return;
    };
    let event = if press {
        KeyEvent::press(code)
    } else {
        KeyEvent::release(code)
    };

    let guard = sink.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(sink) = guard.as_ref() {
        let _ = sink.send(event);
    }
}

/// Map an rdev key to a virtual key code
fn rdev_to_virtual(key: Key) -> Option<VirtualKeyCode> {
    let letter = VirtualKeyCode::letter;
    let digit = VirtualKeyCode::digit;
    let function = VirtualKeyCode::function;
    let numpad = VirtualKeyCode::numpad;

    match key {
        Key::KeyA => letter('A'),
        Key::KeyB => letter('B'),
        Key::KeyC => letter('C'),
        Key::KeyD => letter('D'),
        Key::KeyE => letter('E'),
        Key::KeyF => letter('F'),
        Key::KeyG => letter('G'),
        Key::KeyH => letter('H'),
        Key::KeyI => letter('I'),
        Key::KeyJ => letter('J'),
        Key::KeyK => letter('K'),
        Key::KeyL => letter('L'),
        Key::KeyM => letter('M'),
        Key::KeyN => letter('N'),
        Key::KeyO => letter('O'),
        Key::KeyP => letter('P'),
        Key::KeyQ => letter('Q'),
        Key::KeyR => letter('R'),
        Key::KeyS => letter('S'),
        Key::KeyT => letter('T'),
        Key::KeyU => letter('U'),
        Key::KeyV => letter('V'),
        Key::KeyW => letter('W'),
        Key::KeyX => letter('X'),
        Key::KeyY => letter('Y'),
        Key::KeyZ => letter('Z'),
        Key::Num0 => digit(0),
        Key::Num1 => digit(1),
        Key::Num2 => digit(2),
        Key::Num3 => digit(3),
        Key::Num4 => digit(4),
        Key::Num5 => digit(5),
        Key::Num6 => digit(6),
        Key::Num7 => digit(7),
        Key::Num8 => digit(8),
        Key::Num9 => digit(9),
        Key::Kp0 => numpad(0),
        Key::Kp1 => numpad(1),
        Key::Kp2 => numpad(2),
        Key::Kp3 => numpad(3),
        Key::Kp4 => numpad(4),
        Key::Kp5 => numpad(5),
        Key::Kp6 => numpad(6),
        Key::Kp7 => numpad(7),
        Key::Kp8 => numpad(8),
        Key::Kp9 => numpad(9),
        Key::F1 => function(1),
        Key::F2 => function(2),
        Key::F3 => function(3),
        Key::F4 => function(4),
        Key::F5 => function(5),
        Key::F6 => function(6),
        Key::F7 => function(7),
        Key::F8 => function(8),
        Key::F9 => function(9),
        Key::F10 => function(10),
        Key::F11 => function(11),
        Key::F12 => function(12),
        Key::ControlLeft => Some(VirtualKeyCode::LCONTROL),
        Key::ControlRight => Some(VirtualKeyCode::RCONTROL),
        Key::Alt => Some(VirtualKeyCode::LMENU),
        Key::AltGr => Some(VirtualKeyCode::RMENU),
        Key::ShiftLeft => Some(VirtualKeyCode::LSHIFT),
        Key::ShiftRight => Some(VirtualKeyCode::RSHIFT),
        Key::MetaLeft => Some(VirtualKeyCode::LWIN),
        Key::MetaRight => Some(VirtualKeyCode::RWIN),
        Key::Backspace => Some(VirtualKeyCode::BACK),
        Key::Tab => Some(VirtualKeyCode::TAB),
        Key::Return | Key::KpReturn => Some(VirtualKeyCode::RETURN),
        Key::Escape => Some(VirtualKeyCode::ESCAPE),
        Key::Space => Some(VirtualKeyCode::SPACE),
        Key::CapsLock => Some(VirtualKeyCode::CAPITAL),
        Key::PageUp => Some(VirtualKeyCode::PRIOR),
        Key::PageDown => Some(VirtualKeyCode::NEXT),
        Key::End => Some(VirtualKeyCode::END),
        Key::Home => Some(VirtualKeyCode::HOME),
        Key::LeftArrow => Some(VirtualKeyCode::LEFT),
        Key::UpArrow => Some(VirtualKeyCode::UP),
        Key::RightArrow => Some(VirtualKeyCode::RIGHT),
        Key::DownArrow => Some(VirtualKeyCode::DOWN),
        Key::PrintScreen => Some(VirtualKeyCode::SNAPSHOT),
        Key::Insert => Some(VirtualKeyCode::INSERT),
        Key::Delete => Some(VirtualKeyCode::DELETE),
        Key::Pause => Some(VirtualKeyCode::PAUSE),
        Key::NumLock => Some(VirtualKeyCode::NUMLOCK),
        Key::ScrollLock => Some(VirtualKeyCode::SCROLL),
        Key::SemiColon => Some(VirtualKeyCode::OEM_1),
        Key::Equal => Some(VirtualKeyCode::OEM_PLUS),
        Key::Comma => Some(VirtualKeyCode::OEM_COMMA),
        Key::Minus => Some(VirtualKeyCode::OEM_MINUS),
        Key::Dot => Some(VirtualKeyCode::OEM_PERIOD),
        Key::Slash => Some(VirtualKeyCode::OEM_2),
        Key::BackQuote => Some(VirtualKeyCode::OEM_3),
        Key::LeftBracket => Some(VirtualKeyCode::OEM_4),
        Key::BackSlash => Some(VirtualKeyCode::OEM_5),
        Key::RightBracket => Some(VirtualKeyCode::OEM_6),
        Key::Quote => Some(VirtualKeyCode::OEM_7),
        // On Windows rdev reports unmapped keys by their virtual-key code
        #[cfg(target_os = "windows")]
        Key::Unknown(code) => u8::try_from(code).ok().map(VirtualKeyCode),
        _ => None,
    }
}
