//! Global key hook using macOS CGEventTap
//!
//! Monitors system-wide key down/up and modifier flag changes.
//! Runs on a dedicated thread with its own CFRunLoop.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTap, CGEventTapLocation, CGEventTapOptions,
    CGEventTapPlacement, CGEventType, EventField,
};
use tracing::{debug, error, info, warn};

use super::hook::{HookError, KeyHook, KeySink};
use super::keys::{KeyEvent, VirtualKeyCode};

/// Key hook backed by a listen-only CGEventTap
pub struct EventTapHook {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl EventTapHook {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

impl Default for EventTapHook {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyHook for EventTapHook {
    fn install(&mut self, sink: KeySink) -> Result<(), HookError> {
        if self.thread.is_some() {
            return Err(HookError::Install("event tap already installed".to_string()));
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let (ready_tx, ready_rx) = std_mpsc::channel();

        let handle = thread::Builder::new()
            .name("key-hook".to_string())
            .spawn(move || {
                info!("key hook thread started");
                run_event_loop(sink, Arc::clone(&running), ready_tx);
                running.store(false, Ordering::SeqCst);
                info!("key hook thread stopped");
            })
            .map_err(|e| HookError::Install(format!("failed to spawn hook thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.thread = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(HookError::Install("hook thread exited during setup".to_string()))
            }
        }
    }

    fn uninstall(&mut self) -> Result<(), HookError> {
        let Some(handle) = self.thread.take() else {
            return Ok(());
        };

        self.running.store(false, Ordering::SeqCst);
        // The run loop wakes at least every 100ms to observe the flag
        handle
            .join()
            .map_err(|_| HookError::Uninstall("hook thread panicked".to_string()))
    }
}

/// Raw event copied out of the tap callback
#[derive(Debug, Clone, Copy)]
enum RawKey {
    Down(u16),
    Up(u16),
    Flags(u16, CGEventFlags),
}

/// Run the CFRunLoop with the event tap until `running` is cleared
fn run_event_loop(
    sink: KeySink,
    running: Arc<AtomicBool>,
    ready_tx: std_mpsc::Sender<Result<(), HookError>>,
) {
    let (callback_tx, callback_rx) = std_mpsc::channel::<RawKey>();

    // CGEventTap callback - must be fast and non-blocking
    let callback = move |_proxy: core_graphics::event::CGEventTapProxy,
                         event_type: CGEventType,
                         event: &CGEvent|
                         -> Option<CGEvent> {
        let code = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16;
        let raw = match event_type {
            CGEventType::KeyDown => Some(RawKey::Down(code)),
            CGEventType::KeyUp => Some(RawKey::Up(code)),
            CGEventType::FlagsChanged => Some(RawKey::Flags(code, event.get_flags())),
            CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                warn!("event tap disabled, will re-enable");
                None
            }
            _ => None,
        };
        if let Some(raw) = raw {
            let _ = callback_tx.send(raw);
        }
        Some(event.clone())
    };

    let tap = match CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![
            CGEventType::KeyDown,
            CGEventType::KeyUp,
            CGEventType::FlagsChanged,
        ],
        callback,
    ) {
        Ok(tap) => tap,
        Err(()) => {
            error!("failed to create event tap - is Accessibility permission granted?");
            let _ = ready_tx.send(Err(HookError::Install(
                "failed to create event tap - check Accessibility permissions".to_string(),
            )));
            return;
        }
    };

    let run_loop_source = match tap.mach_port.create_runloop_source(0) {
        Ok(source) => source,
        Err(()) => {
            let _ = ready_tx.send(Err(HookError::Install(
                "failed to create run loop source".to_string(),
            )));
            return;
        }
    };

    let run_loop = CFRunLoop::get_current();
    unsafe {
        run_loop.add_source(&run_loop_source, kCFRunLoopCommonModes);
    }
    tap.enable();

    info!("event tap created and enabled");
    let _ = ready_tx.send(Ok(()));

    let mut held_modifiers = HashSet::new();

    'outer: while running.load(Ordering::SeqCst) {
        unsafe {
            CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, Duration::from_millis(100), true);
        }

        while let Ok(raw) = callback_rx.try_recv() {
            let Some(event) = translate(raw, &mut held_modifiers) else {
                continue;
            };
            debug!(?event, "key event");
            if sink.send(event).is_err() {
                warn!("failed to send key event - queue closed?");
                break 'outer;
            }
        }
    }
}

/// Convert a raw tap event into a key transition
///
/// FlagsChanged carries no direction, so each modifier's held state is
/// tracked locally: a change with the modifier's flag set presses it unless
/// it is already held.
fn translate(raw: RawKey, held_modifiers: &mut HashSet<u16>) -> Option<KeyEvent> {
    match raw {
        RawKey::Down(code) => mac_to_virtual(code).map(KeyEvent::press),
        RawKey::Up(code) => mac_to_virtual(code).map(KeyEvent::release),
        RawKey::Flags(code, flags) => {
            let vk = mac_to_virtual(code)?;
            let mask = modifier_mask(code)?;
            if flags.contains(mask) && held_modifiers.insert(code) {
                Some(KeyEvent::press(vk))
            } else {
                held_modifiers.remove(&code);
                Some(KeyEvent::release(vk))
            }
        }
    }
}

fn modifier_mask(code: u16) -> Option<CGEventFlags> {
    match code {
        0x37 | 0x36 => Some(CGEventFlags::CGEventFlagCommand),
        0x38 | 0x3C => Some(CGEventFlags::CGEventFlagShift),
        0x3A | 0x3D => Some(CGEventFlags::CGEventFlagAlternate),
        0x3B | 0x3E => Some(CGEventFlags::CGEventFlagControl),
        0x39 => Some(CGEventFlags::CGEventFlagAlphaShift),
        _ => None,
    }
}

/// Map a macOS hardware key code to a virtual key code
fn mac_to_virtual(code: u16) -> Option<VirtualKeyCode> {
    const LETTERS: &[(u16, char)] = &[
        (0x00, 'A'), (0x01, 'S'), (0x02, 'D'), (0x03, 'F'), (0x04, 'H'),
        (0x05, 'G'), (0x06, 'Z'), (0x07, 'X'), (0x08, 'C'), (0x09, 'V'),
        (0x0B, 'B'), (0x0C, 'Q'), (0x0D, 'W'), (0x0E, 'E'), (0x0F, 'R'),
        (0x10, 'Y'), (0x11, 'T'), (0x1F, 'O'), (0x20, 'U'), (0x22, 'I'),
        (0x23, 'P'), (0x25, 'L'), (0x26, 'J'), (0x28, 'K'), (0x2D, 'N'),
        (0x2E, 'M'),
    ];
    const DIGITS: &[(u16, u8)] = &[
        (0x12, 1), (0x13, 2), (0x14, 3), (0x15, 4), (0x17, 5),
        (0x16, 6), (0x1A, 7), (0x1C, 8), (0x19, 9), (0x1D, 0),
    ];
    const FUNCTION: &[(u16, u8)] = &[
        (0x7A, 1), (0x78, 2), (0x63, 3), (0x76, 4), (0x60, 5), (0x61, 6),
        (0x62, 7), (0x64, 8), (0x65, 9), (0x6D, 10), (0x67, 11), (0x6F, 12),
        (0x69, 13), (0x6B, 14), (0x71, 15), (0x6A, 16), (0x40, 17), (0x4F, 18),
        (0x50, 19), (0x5A, 20),
    ];

    if let Some(&(_, c)) = LETTERS.iter().find(|(k, _)| *k == code) {
        return VirtualKeyCode::letter(c);
    }
    if let Some(&(_, d)) = DIGITS.iter().find(|(k, _)| *k == code) {
        return VirtualKeyCode::digit(d);
    }
    if let Some(&(_, n)) = FUNCTION.iter().find(|(k, _)| *k == code) {
        return VirtualKeyCode::function(n);
    }

    let vk = match code {
        0x18 => VirtualKeyCode::OEM_PLUS,
        0x1B => VirtualKeyCode::OEM_MINUS,
        0x1E => VirtualKeyCode::OEM_6,
        0x21 => VirtualKeyCode::OEM_4,
        0x24 => VirtualKeyCode::RETURN,
        0x27 => VirtualKeyCode::OEM_7,
        0x29 => VirtualKeyCode::OEM_1,
        0x2A => VirtualKeyCode::OEM_5,
        0x2B => VirtualKeyCode::OEM_COMMA,
        0x2C => VirtualKeyCode::OEM_2,
        0x2F => VirtualKeyCode::OEM_PERIOD,
        0x30 => VirtualKeyCode::TAB,
        0x31 => VirtualKeyCode::SPACE,
        0x32 => VirtualKeyCode::OEM_3,
        0x33 => VirtualKeyCode::BACK,
        0x35 => VirtualKeyCode::ESCAPE,
        0x36 => VirtualKeyCode::RWIN,
        0x37 => VirtualKeyCode::LWIN,
        0x38 => VirtualKeyCode::LSHIFT,
        0x39 => VirtualKeyCode::CAPITAL,
        0x3A => VirtualKeyCode::LMENU,
        0x3B => VirtualKeyCode::LCONTROL,
        0x3C => VirtualKeyCode::RSHIFT,
        0x3D => VirtualKeyCode::RMENU,
        0x3E => VirtualKeyCode::RCONTROL,
        0x73 => VirtualKeyCode::HOME,
        0x74 => VirtualKeyCode::PRIOR,
        0x75 => VirtualKeyCode::DELETE,
        0x77 => VirtualKeyCode::END,
        0x79 => VirtualKeyCode::NEXT,
        0x7B => VirtualKeyCode::LEFT,
        0x7C => VirtualKeyCode::RIGHT,
        0x7D => VirtualKeyCode::DOWN,
        0x7E => VirtualKeyCode::UP,
        _ => return None,
    };
    Some(vk)
}
