/// Panel focus and the leader-key chord.
///
/// Exactly one of the three panels is focused at any time. Focus moves by
/// cycling (Tab / Shift+Tab) or by a two-key chord: the leader key, then a
/// navigation key. A pending chord swallows the very next key whether or not
/// it maps to anything.
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::config::KeybindConfig;
use crate::keys::KeySpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Panel {
    #[default]
    List,
    Detail,
    Input,
}

impl Panel {
    const ALL: [Panel; 3] = [Panel::List, Panel::Detail, Panel::Input];

    pub fn index(self) -> usize {
        match self {
            Panel::List => 0,
            Panel::Detail => 1,
            Panel::Input => 2,
        }
    }

    pub fn from_index(i: usize) -> Self {
        Self::ALL[i % Self::ALL.len()]
    }

    pub fn title(self) -> &'static str {
        match self {
            Panel::List => "Conversations",
            Panel::Detail => "Messages",
            Panel::Input => "Compose",
        }
    }
}

/// Focus moved from one panel to another. Panels whose state depends on
/// focus (the editor's mode) react to this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusChange {
    pub from: Panel,
    pub to: Panel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalCommand {
    Refresh,
    Quit,
}

/// What the key after the leader turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChordOutcome {
    Focus(Panel),
    Command(GlobalCommand),
    Cancelled,
    Unmapped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaderPending {
    pub seq: u64,
    pub started_at: Instant,
}

// ── Keymap ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Keymap {
    pub leader: KeySpec,
    pub leader_timeout: Duration,
    pub to_list: KeySpec,
    pub to_detail: KeySpec,
    pub to_input: KeySpec,
    pub quit: KeySpec,
    pub next_panel: KeySpec,
    pub prev_panel: KeySpec,
    pub help: KeySpec,
    pub refresh: KeySpec,
}

impl Default for Keymap {
    fn default() -> Self {
        Self {
            leader: KeySpec::new(KeyCode::Char(' '), KeyModifiers::CONTROL),
            leader_timeout: Duration::from_millis(2000),
            to_list: KeySpec::plain('c'),
            to_detail: KeySpec::plain('m'),
            to_input: KeySpec::plain('i'),
            quit: KeySpec::plain('q'),
            next_panel: KeySpec::new(KeyCode::Tab, KeyModifiers::NONE),
            prev_panel: KeySpec::new(KeyCode::BackTab, KeyModifiers::NONE),
            help: KeySpec::plain('?'),
            refresh: KeySpec::new(KeyCode::Char('r'), KeyModifiers::CONTROL),
        }
    }
}

impl Keymap {
    pub fn from_config(cfg: &KeybindConfig) -> Result<Self> {
        let parse = |what: &str, spec: &str| {
            KeySpec::parse(spec).with_context(|| format!("keybinds: bad {what} key"))
        };
        Ok(Self {
            leader: parse("leader", &cfg.leader_key)?,
            leader_timeout: Duration::from_millis(cfg.leader_timeout_ms),
            to_list: parse("navigation.conversations", &cfg.navigation.conversations)?,
            to_detail: parse("navigation.messages", &cfg.navigation.messages)?,
            to_input: parse("navigation.input", &cfg.navigation.input)?,
            quit: parse("global.quit", &cfg.global.quit)?,
            next_panel: parse("global.next_panel", &cfg.global.next_panel)?,
            prev_panel: parse("global.prev_panel", &cfg.global.prev_panel)?,
            help: parse("global.help", &cfg.global.help)?,
            refresh: parse("global.refresh", &cfg.global.refresh)?,
        })
    }

    /// (keys, description) rows for the help overlay.
    pub fn help_rows(&self) -> Vec<(String, &'static str)> {
        let lead = self.leader.label();
        vec![
            (format!("{lead} {}", self.to_list.label()), "jump to conversations"),
            (format!("{lead} {}", self.to_detail.label()), "jump to messages"),
            (format!("{lead} {}", self.to_input.label()), "jump to compose"),
            (format!("{lead} r"), "refresh"),
            (format!("{} / {}", self.next_panel.label(), self.prev_panel.label()), "cycle panels"),
            (self.refresh.label(), "refresh conversations"),
            (self.help.label(), "toggle this help"),
            (self.quit.label(), "quit"),
            ("j k gg G /".to_string(), "conversations: move, search"),
            ("enter".to_string(), "conversations: open"),
            ("j k C-u C-d r".to_string(), "messages: move, page, react"),
            ("esc i a A I".to_string(), "compose: normal / insert mode"),
            ("h l w b e 0 $".to_string(), "compose: motions"),
            ("x D C dd cc dw f F ; ,".to_string(), "compose: edits, find"),
            ("v  /  C-e".to_string(), "compose in external editor"),
        ]
    }
}

// ── Focus state ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct PanelFocus {
    current: Panel,
    leader: Option<LeaderPending>,
    next_seq: u64,
}

impl PanelFocus {
    pub fn new(start: Panel) -> Self {
        Self {
            current: start,
            ..Self::default()
        }
    }

    pub fn current(&self) -> Panel {
        self.current
    }

    pub fn leader(&self) -> Option<LeaderPending> {
        self.leader
    }

    pub fn leader_pending(&self) -> bool {
        self.leader.is_some()
    }

    /// Move focus `delta` steps around the ring of three panels.
    pub fn cycle(&mut self, delta: i32) -> FocusChange {
        let from = self.current;
        let idx = (from.index() as i32 + delta).rem_euclid(Panel::ALL.len() as i32) as usize;
        self.current = Panel::from_index(idx);
        FocusChange { from, to: self.current }
    }

    /// Focus `panel` directly. `None` if it already had focus.
    pub fn focus(&mut self, panel: Panel) -> Option<FocusChange> {
        if panel == self.current {
            return None;
        }
        let from = self.current;
        self.current = panel;
        Some(FocusChange { from, to: panel })
    }

    pub fn begin_leader(&mut self, now: Instant) {
        self.next_seq += 1;
        self.leader = Some(LeaderPending {
            seq: self.next_seq,
            started_at: now,
        });
    }

    /// Interpret the key after the leader. Pending state is cleared no matter what.
    pub fn resolve_leader(&mut self, key: &KeyEvent, keymap: &Keymap) -> ChordOutcome {
        self.leader = None;
        if key.code == KeyCode::Esc {
            return ChordOutcome::Cancelled;
        }
        if keymap.to_list.matches(key) {
            ChordOutcome::Focus(Panel::List)
        } else if keymap.to_detail.matches(key) {
            ChordOutcome::Focus(Panel::Detail)
        } else if keymap.to_input.matches(key) {
            ChordOutcome::Focus(Panel::Input)
        } else if keymap.refresh.matches(key) || key.code == KeyCode::Char('r') {
            ChordOutcome::Command(GlobalCommand::Refresh)
        } else if keymap.quit.matches(key) {
            ChordOutcome::Command(GlobalCommand::Quit)
        } else {
            ChordOutcome::Unmapped
        }
    }

    /// Drop a chord that has waited longer than `timeout`. True if one was dropped.
    pub fn expire_leader(&mut self, now: Instant, timeout: Duration) -> bool {
        match self.leader {
            Some(p) if now.saturating_duration_since(p.started_at) >= timeout => {
                self.leader = None;
                true
            }
            _ => false,
        }
    }
}
