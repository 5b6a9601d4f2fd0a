//! Keyboard input as seen by suggestion popups and shortcuts.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Enter,
    Escape,
    Backspace,
    Tab,
    Char(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        ctrl: false,
        meta: false,
        shift: false,
        alt: false,
    };

    /// The platform command modifier (`Mod` in shortcut notation)
    pub fn is_mod(&self) -> bool {
        self.ctrl || self.meta
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub key: Key,
    pub modifiers: Modifiers,
}

impl KeyPress {
    pub fn plain(key: Key) -> Self {
        Self {
            key,
            modifiers: Modifiers::NONE,
        }
    }

    pub fn with(key: Key, modifiers: Modifiers) -> Self {
        Self { key, modifiers }
    }

    /// Whether this press matches a shortcut such as `Mod-Shift-r`
    pub fn matches(&self, shortcut: &str) -> bool {
        let mut want = Modifiers::NONE;
        let mut want_mod = false;
        let mut key = None;
        for part in shortcut.split('-') {
            match part {
                "Mod" => want_mod = true,
                "Ctrl" => want.ctrl = true,
                "Meta" => want.meta = true,
                "Shift" => want.shift = true,
                "Alt" => want.alt = true,
                other => key = other.chars().next().filter(|_| other.chars().count() == 1),
            }
        }
        let Some(key) = key else {
            return false;
        };
        let Key::Char(pressed) = self.key else {
            return false;
        };

        let m = self.modifiers;
        let mod_ok = if want_mod {
            m.is_mod()
        } else {
            m.ctrl == want.ctrl && m.meta == want.meta
        };
        mod_ok
            && m.shift == want.shift
            && m.alt == want.alt
            && pressed.eq_ignore_ascii_case(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn press(c: char, ctrl: bool, shift: bool) -> KeyPress {
        KeyPress::with(
            Key::Char(c),
            Modifiers {
                ctrl,
                shift,
                ..Modifiers::NONE
            },
        )
    }

    #[rstest]
    #[case(press('r', true, true), true)]
    #[case(press('R', true, true), true)]
    #[case(press('r', true, false), false)]
    #[case(press('r', false, true), false)]
    #[case(press('x', true, true), false)]
    fn test_mod_shift_r(#[case] key: KeyPress, #[case] expected: bool) {
        assert_eq!(key.matches("Mod-Shift-r"), expected);
    }

    #[test]
    fn test_meta_counts_as_mod() {
        let key = KeyPress::with(
            Key::Char('r'),
            Modifiers {
                meta: true,
                shift: true,
                ..Modifiers::NONE
            },
        );
        assert!(key.matches("Mod-Shift-r"));
    }
}
