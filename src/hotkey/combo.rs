//! Canonical key combinations

use std::fmt;
use std::str::FromStr;

use super::keys::{KeyParseError, KeyStateTable, VirtualKeyCode};

/// An order-independent key combination
///
/// Keys are sorted ascending and de-duplicated at construction, so the same
/// key set given in any order produces an equal value. The canonical
/// identity is the `+`-joined names of the sorted keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hotkey {
    keys: Vec<VirtualKeyCode>,
}

impl Hotkey {
    pub fn new(keys: impl IntoIterator<Item = VirtualKeyCode>) -> Self {
        let mut keys: Vec<VirtualKeyCode> = keys.into_iter().collect();
        keys.sort_unstable();
        keys.dedup();
        Self { keys }
    }

    /// Sorted component keys
    pub fn keys(&self) -> &[VirtualKeyCode] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, code: VirtualKeyCode) -> bool {
        self.keys.binary_search(&code).is_ok()
    }

    /// True when every component key is held in `table`
    pub fn is_held(&self, table: &KeyStateTable) -> bool {
        table.all_held(&self.keys)
    }
}

impl fmt::Display for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.keys.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            write!(f, "{}", key)?;
        }
        Ok(())
    }
}

impl FromStr for Hotkey {
    type Err = KeyParseError;

    /// Parse a `+`-separated list of key names such as `LControl+LMenu+A`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let keys = s
            .split('+')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<VirtualKeyCode>, _>>()?;

        if keys.is_empty() {
            return Err(KeyParseError::Empty);
        }
        Ok(Self::new(keys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: VirtualKeyCode = VirtualKeyCode(0x41);

    #[test]
    fn test_input_order_is_irrelevant() {
        let first = Hotkey::new([VirtualKeyCode::LCONTROL, VirtualKeyCode::LMENU, A]);
        let second = Hotkey::new([A, VirtualKeyCode::LCONTROL, VirtualKeyCode::LMENU]);
        assert_eq!(first, second);
        assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn test_identity_is_sorted_names() {
        let hotkey = Hotkey::new([VirtualKeyCode::LMENU, VirtualKeyCode::LCONTROL, A]);
        assert_eq!(hotkey.to_string(), "A+LControl+LMenu");
        assert_eq!(hotkey.keys(), &[A, VirtualKeyCode::LCONTROL, VirtualKeyCode::LMENU]);
    }

    #[test]
    fn test_duplicates_collapse() {
        let hotkey = Hotkey::new([A, A, VirtualKeyCode::LSHIFT]);
        assert_eq!(hotkey.keys().len(), 2);
        assert!(hotkey.contains(A));
    }

    #[test]
    fn test_parse() {
        let parsed: Hotkey = "LControl + LMenu + A".parse().unwrap();
        assert_eq!(
            parsed,
            Hotkey::new([VirtualKeyCode::LCONTROL, VirtualKeyCode::LMENU, A])
        );
        assert_eq!("ctrl+alt+a".parse::<Hotkey>().unwrap(), parsed);
        assert_eq!(parsed.to_string().parse::<Hotkey>().unwrap(), parsed);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Hotkey>(), Err(KeyParseError::Empty));
        assert_eq!(" + ".parse::<Hotkey>(), Err(KeyParseError::Empty));
        assert!(matches!(
            "Ctrl+Meta".parse::<Hotkey>(),
            Err(KeyParseError::UnknownKey(name)) if name == "Meta"
        ));
    }

    #[test]
    fn test_is_held() {
        let table = KeyStateTable::new();
        let hotkey = Hotkey::new([VirtualKeyCode::LCONTROL, A]);
        table.set(VirtualKeyCode::LCONTROL, true);
        assert!(!hotkey.is_held(&table));
        table.set(A, true);
        assert!(hotkey.is_held(&table));
        assert!(!Hotkey::new(Vec::<VirtualKeyCode>::new()).is_held(&table));
    }
}
