//! Virtual key codes and held-key state tracking
//!
//! Key codes follow the Windows virtual-key numbering. Native hook
//! backends translate their platform codes into this domain so the
//! engine sees one consistent set of identifiers.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

/// Number of distinct virtual key codes
pub const KEY_CODE_COUNT: usize = 256;

/// Identifier for a physical key, independent of layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualKeyCode(pub u8);

impl VirtualKeyCode {
    pub const BACK: Self = Self(0x08);
    pub const TAB: Self = Self(0x09);
    pub const RETURN: Self = Self(0x0D);
    pub const SHIFT: Self = Self(0x10);
    pub const CONTROL: Self = Self(0x11);
    pub const MENU: Self = Self(0x12);
    pub const PAUSE: Self = Self(0x13);
    pub const CAPITAL: Self = Self(0x14);
    pub const ESCAPE: Self = Self(0x1B);
    pub const SPACE: Self = Self(0x20);
    pub const PRIOR: Self = Self(0x21);
    pub const NEXT: Self = Self(0x22);
    pub const END: Self = Self(0x23);
    pub const HOME: Self = Self(0x24);
    pub const LEFT: Self = Self(0x25);
    pub const UP: Self = Self(0x26);
    pub const RIGHT: Self = Self(0x27);
    pub const DOWN: Self = Self(0x28);
    pub const SNAPSHOT: Self = Self(0x2C);
    pub const INSERT: Self = Self(0x2D);
    pub const DELETE: Self = Self(0x2E);
    pub const LWIN: Self = Self(0x5B);
    pub const RWIN: Self = Self(0x5C);
    pub const APPS: Self = Self(0x5D);
    pub const NUMLOCK: Self = Self(0x90);
    pub const SCROLL: Self = Self(0x91);
    pub const LSHIFT: Self = Self(0xA0);
    pub const RSHIFT: Self = Self(0xA1);
    pub const LCONTROL: Self = Self(0xA2);
    pub const RCONTROL: Self = Self(0xA3);
    pub const LMENU: Self = Self(0xA4);
    pub const RMENU: Self = Self(0xA5);
    pub const OEM_1: Self = Self(0xBA);
    pub const OEM_PLUS: Self = Self(0xBB);
    pub const OEM_COMMA: Self = Self(0xBC);
    pub const OEM_MINUS: Self = Self(0xBD);
    pub const OEM_PERIOD: Self = Self(0xBE);
    pub const OEM_2: Self = Self(0xBF);
    pub const OEM_3: Self = Self(0xC0);
    pub const OEM_4: Self = Self(0xDB);
    pub const OEM_5: Self = Self(0xDC);
    pub const OEM_6: Self = Self(0xDD);
    pub const OEM_7: Self = Self(0xDE);

    /// Letter key `A`..=`Z` (case-insensitive)
    pub fn letter(c: char) -> Option<Self> {
        let upper = c.to_ascii_uppercase();
        upper.is_ascii_uppercase().then(|| Self(upper as u8))
    }

    /// Top-row digit key `0`..=`9`
    pub fn digit(d: u8) -> Option<Self> {
        (d <= 9).then(|| Self(0x30 + d))
    }

    /// Function key `F1`..=`F24`
    pub fn function(n: u8) -> Option<Self> {
        (1..=24).contains(&n).then(|| Self(0x6F + n))
    }

    /// Numpad digit key
    pub fn numpad(d: u8) -> Option<Self> {
        (d <= 9).then(|| Self(0x60 + d))
    }

    /// Index into a [`KeyStateTable`]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Names for codes that are not letters, digits, function or numpad keys.
/// The first entry for a code is its display name.
const NAMED: &[(VirtualKeyCode, &str)] = &[
    (VirtualKeyCode::BACK, "Backspace"),
    (VirtualKeyCode::TAB, "Tab"),
    (VirtualKeyCode::RETURN, "Return"),
    (VirtualKeyCode::RETURN, "Enter"),
    // Side-less codes; hooks only ever report the left or right variant
    (VirtualKeyCode::SHIFT, "AnyShift"),
    (VirtualKeyCode::CONTROL, "AnyControl"),
    (VirtualKeyCode::MENU, "AnyMenu"),
    (VirtualKeyCode::PAUSE, "Pause"),
    (VirtualKeyCode::CAPITAL, "CapsLock"),
    (VirtualKeyCode::ESCAPE, "Escape"),
    (VirtualKeyCode::ESCAPE, "Esc"),
    (VirtualKeyCode::SPACE, "Space"),
    (VirtualKeyCode::PRIOR, "PageUp"),
    (VirtualKeyCode::NEXT, "PageDown"),
    (VirtualKeyCode::END, "End"),
    (VirtualKeyCode::HOME, "Home"),
    (VirtualKeyCode::LEFT, "Left"),
    (VirtualKeyCode::UP, "Up"),
    (VirtualKeyCode::RIGHT, "Right"),
    (VirtualKeyCode::DOWN, "Down"),
    (VirtualKeyCode::SNAPSHOT, "PrintScreen"),
    (VirtualKeyCode::INSERT, "Insert"),
    (VirtualKeyCode::DELETE, "Delete"),
    (VirtualKeyCode::LWIN, "LWin"),
    (VirtualKeyCode::LWIN, "Cmd"),
    (VirtualKeyCode::LWIN, "Super"),
    (VirtualKeyCode::RWIN, "RWin"),
    (VirtualKeyCode::APPS, "Apps"),
    (VirtualKeyCode::NUMLOCK, "NumLock"),
    (VirtualKeyCode::SCROLL, "ScrollLock"),
    (VirtualKeyCode::LSHIFT, "LShift"),
    (VirtualKeyCode::LSHIFT, "Shift"),
    (VirtualKeyCode::RSHIFT, "RShift"),
    (VirtualKeyCode::LCONTROL, "LControl"),
    (VirtualKeyCode::LCONTROL, "Ctrl"),
    (VirtualKeyCode::LCONTROL, "Control"),
    (VirtualKeyCode::RCONTROL, "RControl"),
    (VirtualKeyCode::LMENU, "LMenu"),
    (VirtualKeyCode::LMENU, "Alt"),
    (VirtualKeyCode::LMENU, "Option"),
    (VirtualKeyCode::LMENU, "Menu"),
    (VirtualKeyCode::RMENU, "RMenu"),
    (VirtualKeyCode::OEM_1, "Semicolon"),
    (VirtualKeyCode::OEM_PLUS, "Equal"),
    (VirtualKeyCode::OEM_COMMA, "Comma"),
    (VirtualKeyCode::OEM_MINUS, "Minus"),
    (VirtualKeyCode::OEM_PERIOD, "Period"),
    (VirtualKeyCode::OEM_2, "Slash"),
    (VirtualKeyCode::OEM_3, "Backquote"),
    (VirtualKeyCode::OEM_4, "LeftBracket"),
    (VirtualKeyCode::OEM_5, "Backslash"),
    (VirtualKeyCode::OEM_6, "RightBracket"),
    (VirtualKeyCode::OEM_7, "Quote"),
];

impl fmt::Display for VirtualKeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.0;
        match code {
            0x30..=0x39 | 0x41..=0x5A => write!(f, "{}", code as char),
            0x60..=0x69 => write!(f, "Numpad{}", code - 0x60),
            0x70..=0x87 => write!(f, "F{}", code - 0x6F),
            _ => match NAMED.iter().find(|(c, _)| *c == *self) {
                Some((_, name)) => f.write_str(name),
                None => write!(f, "0x{:02X}", code),
            },
        }
    }
}

/// Errors produced while parsing key names and hotkey strings
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyParseError {
    #[error("hotkey contains no keys")]
    Empty,

    #[error("unknown key name: {0}")]
    UnknownKey(String),
}

impl FromStr for VirtualKeyCode {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        let unknown = || KeyParseError::UnknownKey(name.to_string());

        let mut chars = name.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if let Some(key) = Self::letter(c) {
                return Ok(key);
            }
            if let Some(d) = c.to_digit(10) {
                return Self::digit(d as u8).ok_or_else(unknown);
            }
        }

        if let Some(hex) = name.strip_prefix("0x").or_else(|| name.strip_prefix("0X")) {
            return u8::from_str_radix(hex, 16).map(Self).map_err(|_| unknown());
        }

        let lower = name.to_ascii_lowercase();
        if let Some(n) = lower.strip_prefix("numpad").and_then(|n| n.parse().ok()) {
            return Self::numpad(n).ok_or_else(unknown);
        }
        if let Some(n) = lower.strip_prefix('f').and_then(|n| n.parse().ok()) {
            return Self::function(n).ok_or_else(unknown);
        }

        NAMED
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(code, _)| *code)
            .ok_or_else(unknown)
    }
}

/// Direction of a key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDirection {
    Press,
    Release,
}

/// A raw key transition delivered by a hook provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: VirtualKeyCode,
    pub direction: KeyDirection,
}

impl KeyEvent {
    pub fn press(code: VirtualKeyCode) -> Self {
        Self {
            code,
            direction: KeyDirection::Press,
        }
    }

    pub fn release(code: VirtualKeyCode) -> Self {
        Self {
            code,
            direction: KeyDirection::Release,
        }
    }
}

/// Tracks which keys are currently held
///
/// Covers the whole key-code domain and is never resized. Written only by
/// the event consumer; readers observe flags without taking a lock.
pub struct KeyStateTable {
    held: [AtomicBool; KEY_CODE_COUNT],
}

impl KeyStateTable {
    pub fn new() -> Self {
        Self {
            held: std::array::from_fn(|_| AtomicBool::new(false)),
        }
    }

    pub fn set(&self, code: VirtualKeyCode, held: bool) {
        self.held[code.index()].store(held, Ordering::Release);
    }

    pub fn is_held(&self, code: VirtualKeyCode) -> bool {
        self.held[code.index()].load(Ordering::Acquire)
    }

    /// True when every key in `codes` is held. An empty set is never held.
    pub fn all_held(&self, codes: &[VirtualKeyCode]) -> bool {
        !codes.is_empty() && codes.iter().all(|&code| self.is_held(code))
    }

    /// Number of keys currently held
    pub fn held_count(&self) -> usize {
        self.held
            .iter()
            .filter(|flag| flag.load(Ordering::Acquire))
            .count()
    }

    /// Mark every key as released
    pub fn clear(&self) {
        for flag in &self.held {
            flag.store(false, Ordering::Release);
        }
    }
}

impl Default for KeyStateTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeyStateTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let held: Vec<VirtualKeyCode> = (0..KEY_CODE_COUNT)
            .map(|i| VirtualKeyCode(i as u8))
            .filter(|&code| self.is_held(code))
            .collect();
        f.debug_struct("KeyStateTable").field("held", &held).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names() {
        assert_eq!(VirtualKeyCode(0x41).to_string(), "A");
        assert_eq!(VirtualKeyCode(0x37).to_string(), "7");
        assert_eq!(VirtualKeyCode(0x70).to_string(), "F1");
        assert_eq!(VirtualKeyCode(0x87).to_string(), "F24");
        assert_eq!(VirtualKeyCode::LCONTROL.to_string(), "LControl");
        assert_eq!(VirtualKeyCode::RETURN.to_string(), "Return");
        assert_eq!(VirtualKeyCode(0xFF).to_string(), "0xFF");
    }

    #[test]
    fn test_parse_names_and_aliases() {
        assert_eq!("a".parse(), Ok(VirtualKeyCode(0x41)));
        assert_eq!("5".parse(), Ok(VirtualKeyCode(0x35)));
        assert_eq!("f12".parse(), Ok(VirtualKeyCode(0x7B)));
        assert_eq!("ctrl".parse(), Ok(VirtualKeyCode::LCONTROL));
        assert_eq!("ALT".parse(), Ok(VirtualKeyCode::LMENU));
        assert_eq!("lmenu".parse(), Ok(VirtualKeyCode::LMENU));
        assert_eq!("shift".parse(), Ok(VirtualKeyCode::LSHIFT));
        assert_eq!("Control".parse(), Ok(VirtualKeyCode::LCONTROL));
        assert_eq!("menu".parse(), Ok(VirtualKeyCode::LMENU));
        assert_eq!("AnyShift".parse(), Ok(VirtualKeyCode::SHIFT));
        assert_eq!("Numpad3".parse(), Ok(VirtualKeyCode(0x63)));
        assert_eq!("0xFF".parse(), Ok(VirtualKeyCode(0xFF)));
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(
            "hyper".parse::<VirtualKeyCode>(),
            Err(KeyParseError::UnknownKey("hyper".to_string()))
        );
        assert!("F25".parse::<VirtualKeyCode>().is_err());
        assert!("0x1FF".parse::<VirtualKeyCode>().is_err());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for i in 0..KEY_CODE_COUNT {
            let code = VirtualKeyCode(i as u8);
            assert_eq!(code.to_string().parse(), Ok(code), "code {:#04x}", i);
        }
    }

    #[test]
    fn test_state_table() {
        let table = KeyStateTable::new();
        assert_eq!(table.held_count(), 0);

        table.set(VirtualKeyCode::LCONTROL, true);
        table.set(VirtualKeyCode(0x41), true);
        assert!(table.is_held(VirtualKeyCode::LCONTROL));
        assert!(table.all_held(&[VirtualKeyCode::LCONTROL, VirtualKeyCode(0x41)]));
        assert!(!table.all_held(&[VirtualKeyCode::LCONTROL, VirtualKeyCode::LMENU]));
        assert_eq!(table.held_count(), 2);

        table.set(VirtualKeyCode(0x41), false);
        assert!(!table.is_held(VirtualKeyCode(0x41)));

        table.clear();
        assert_eq!(table.held_count(), 0);
    }

    #[test]
    fn test_empty_set_never_held() {
        let table = KeyStateTable::new();
        assert!(!table.all_held(&[]));
    }
}
