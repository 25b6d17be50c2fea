/// Key specs — keybinding strings from config.toml ("ctrl+space", "shift+tab", "G")
/// parsed into something comparable against crossterm key events.
///
/// Terminals encode some chords in more than one way. Ctrl+Space arrives as
/// `Char(' ')`+CONTROL, `Char('@')`+CONTROL or a bare `Null` depending on the
/// terminal, and Shift+Tab arrives as `BackTab` with or without SHIFT set.
/// Both sides of a comparison go through `normalize()` so those spellings match.
use anyhow::{Result, bail};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySpec {
    code: KeyCode,
    modifiers: KeyModifiers,
}

impl KeySpec {
    pub const fn new(code: KeyCode, modifiers: KeyModifiers) -> Self {
        Self { code, modifiers }
    }

    pub const fn plain(c: char) -> Self {
        Self::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    /// Parse a binding such as `"q"`, `"ctrl+r"`, `"alt+x"`, `"shift+tab"`, `"ctrl+space"`.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            bail!("empty key binding");
        }
        // A lone "+" is a key in its own right, not a separator.
        if spec == "+" {
            return Ok(Self::plain('+'));
        }

        let mut modifiers = KeyModifiers::NONE;
        let mut parts: Vec<&str> = spec.split('+').collect();
        let last = parts.pop().unwrap_or_default();
        for m in parts {
            match m.to_ascii_lowercase().as_str() {
                "ctrl" | "control" | "c" => modifiers |= KeyModifiers::CONTROL,
                "alt" | "meta" | "m" => modifiers |= KeyModifiers::ALT,
                "shift" | "s" => modifiers |= KeyModifiers::SHIFT,
                other => bail!("unknown modifier '{other}' in key binding '{spec}'"),
            }
        }

        let code = match last.to_ascii_lowercase().as_str() {
            "" if spec.ends_with('+') => KeyCode::Char('+'),
            "space" | " " => KeyCode::Char(' '),
            "tab" if modifiers.contains(KeyModifiers::SHIFT) => KeyCode::BackTab,
            "tab" => KeyCode::Tab,
            "backtab" => KeyCode::BackTab,
            "enter" | "return" => KeyCode::Enter,
            "esc" | "escape" => KeyCode::Esc,
            "backspace" => KeyCode::Backspace,
            "delete" | "del" => KeyCode::Delete,
            "up" => KeyCode::Up,
            "down" => KeyCode::Down,
            "left" => KeyCode::Left,
            "right" => KeyCode::Right,
            "home" => KeyCode::Home,
            "end" => KeyCode::End,
            "pgup" | "pageup" => KeyCode::PageUp,
            "pgdown" | "pgdn" | "pagedown" => KeyCode::PageDown,
            lower => {
                if let Some(n) = lower.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
                    KeyCode::F(n)
                } else {
                    let mut chars = last.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => KeyCode::Char(c),
                        _ => bail!("unknown key '{last}' in key binding '{spec}'"),
                    }
                }
            }
        };

        let (code, modifiers) = normalize(code, modifiers);
        Ok(Self { code, modifiers })
    }

    /// True when `key` is a press of this chord, in any of its known encodings.
    pub fn matches(&self, key: &KeyEvent) -> bool {
        if key.kind == KeyEventKind::Release {
            return false;
        }
        normalize(key.code, key.modifiers) == (self.code, self.modifiers)
    }

    /// Short human label for help text, e.g. "C-space", "S-tab", "q".
    pub fn label(&self) -> String {
        let mut out = String::new();
        if self.modifiers.contains(KeyModifiers::CONTROL) {
            out.push_str("C-");
        }
        if self.modifiers.contains(KeyModifiers::ALT) {
            out.push_str("M-");
        }
        if self.modifiers.contains(KeyModifiers::SHIFT) {
            out.push_str("S-");
        }
        match self.code {
            KeyCode::Char(' ') => out.push_str("space"),
            KeyCode::Char(c) => out.push(c),
            KeyCode::Tab => out.push_str("tab"),
            KeyCode::BackTab => out.push_str("S-tab"),
            KeyCode::Enter => out.push_str("enter"),
            KeyCode::Esc => out.push_str("esc"),
            KeyCode::F(n) => out.push_str(&format!("F{n}")),
            other => out.push_str(&format!("{other:?}").to_lowercase()),
        }
        out
    }
}

/// Fold alternate encodings of the same physical chord into one canonical form.
fn normalize(code: KeyCode, modifiers: KeyModifiers) -> (KeyCode, KeyModifiers) {
    // Only these three modifiers take part in matching (ignore SUPER, keypad flags, ...)
    let mut mods = modifiers & (KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SHIFT);
    let code = match code {
        // NUL — what most terminals send for Ctrl+Space (and Ctrl+@)
        KeyCode::Null => {
            mods |= KeyModifiers::CONTROL;
            KeyCode::Char(' ')
        }
        KeyCode::Char('@') if mods.contains(KeyModifiers::CONTROL) => KeyCode::Char(' '),
        KeyCode::Char('\0') => {
            mods |= KeyModifiers::CONTROL;
            KeyCode::Char(' ')
        }
        KeyCode::BackTab => {
            mods.remove(KeyModifiers::SHIFT);
            KeyCode::BackTab
        }
        KeyCode::Char(c) if mods.contains(KeyModifiers::CONTROL) => {
            // Ctrl+letter is case-insensitive in a terminal
            mods.remove(KeyModifiers::SHIFT);
            KeyCode::Char(c.to_ascii_lowercase())
        }
        KeyCode::Char(c) => {
            // The character already carries its case; SHIFT is noise
            mods.remove(KeyModifiers::SHIFT);
            KeyCode::Char(c)
        }
        other => other,
    };
    (code, mods)
}

/// Plain printable character of an event, ignoring SHIFT (which only sets case).
/// Returns None for control/alt chords and non-character keys.
pub fn plain_char(key: &KeyEvent) -> Option<char> {
    match key.code {
        KeyCode::Char(c)
            if !key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
        {
            Some(c)
        }
        _ => None,
    }
}

/// True when `key` is Ctrl+`c` (case-insensitive).
pub fn is_ctrl(key: &KeyEvent, c: char) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL)
        && matches!(key.code, KeyCode::Char(k) if k.eq_ignore_ascii_case(&c))
}
