use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::store::write_atomic;

// ── Keybinds ──────────────────────────────────────────────────────────────────

/// Panel jumps, interpreted as the key right after the leader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NavigationKeybinds {
    pub conversations: String,
    pub messages: String,
    pub input: String,
}

impl Default for NavigationKeybinds {
    fn default() -> Self {
        Self {
            conversations: "c".to_string(),
            messages: "m".to_string(),
            input: "i".to_string(),
        }
    }
}

/// Keys that work from any panel without the leader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GlobalKeybinds {
    pub quit: String,
    pub next_panel: String,
    pub prev_panel: String,
    pub help: String,
    pub refresh: String,
}

impl Default for GlobalKeybinds {
    fn default() -> Self {
        Self {
            quit: "q".to_string(),
            next_panel: "tab".to_string(),
            prev_panel: "shift+tab".to_string(),
            help: "?".to_string(),
            refresh: "ctrl+r".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeybindConfig {
    #[serde(default = "default_leader_key")]
    pub leader_key: String,
    /// A leader chord with no follow-up key is dropped after this long.
    #[serde(default = "default_leader_timeout_ms")]
    pub leader_timeout_ms: u64,
    #[serde(default)]
    pub navigation: NavigationKeybinds,
    #[serde(default)]
    pub global: GlobalKeybinds,
}

fn default_leader_key() -> String {
    "ctrl+space".to_string()
}

fn default_leader_timeout_ms() -> u64 {
    2000
}

impl Default for KeybindConfig {
    fn default() -> Self {
        Self {
            leader_key: default_leader_key(),
            leader_timeout_ms: default_leader_timeout_ms(),
            navigation: NavigationKeybinds::default(),
            global: GlobalKeybinds::default(),
        }
    }
}

impl KeybindConfig {
    /// Blank strings in the file mean "use the default", not "unbound".
    fn fill_blanks(&mut self) {
        let d = KeybindConfig::default();
        fill(&mut self.leader_key, d.leader_key);
        fill(&mut self.navigation.conversations, d.navigation.conversations);
        fill(&mut self.navigation.messages, d.navigation.messages);
        fill(&mut self.navigation.input, d.navigation.input);
        fill(&mut self.global.quit, d.global.quit);
        fill(&mut self.global.next_panel, d.global.next_panel);
        fill(&mut self.global.prev_panel, d.global.prev_panel);
        fill(&mut self.global.help, d.global.help);
        fill(&mut self.global.refresh, d.global.refresh);
        if self.leader_timeout_ms == 0 {
            self.leader_timeout_ms = d.leader_timeout_ms;
        }
    }
}

fn fill(slot: &mut String, default: String) {
    if slot.trim().is_empty() {
        *slot = default;
    }
}

// ── Config file ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigFile {
    /// Base URL of the messaging bridge daemon
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// External editor command; may include its own arguments ("code --wait").
    /// Empty means $VISUAL, then $EDITOR, then vi.
    #[serde(default)]
    pub editor: String,
    /// Extra arguments placed before the scratch file path
    #[serde(default)]
    pub editor_args: Vec<String>,
    /// How many conversations to list
    #[serde(default = "default_conversation_limit")]
    pub conversation_limit: usize,
    /// How many messages to fetch per conversation
    #[serde(default = "default_message_limit")]
    pub message_limit: usize,
    /// Emoji sent by the react key in the messages panel
    #[serde(default = "default_reaction")]
    pub reaction: String,
    #[serde(default)]
    pub keybinds: KeybindConfig,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8787".to_string()
}

fn default_conversation_limit() -> usize {
    25
}

fn default_message_limit() -> usize {
    50
}

fn default_reaction() -> String {
    "👍".to_string()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            editor: String::new(),
            editor_args: Vec::new(),
            conversation_limit: default_conversation_limit(),
            message_limit: default_message_limit(),
            reaction: default_reaction(),
            keybinds: KeybindConfig::default(),
        }
    }
}

impl ConfigFile {
    /// Load from disk, or return a default config if the file doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        let mut cfg: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
        cfg.keybinds.fill_blanks();
        if cfg.conversation_limit == 0 {
            cfg.conversation_limit = default_conversation_limit();
        }
        if cfg.message_limit == 0 {
            cfg.message_limit = default_message_limit();
        }
        if cfg.reaction.trim().is_empty() {
            cfg.reaction = default_reaction();
        }
        Ok(cfg)
    }

    /// Write the config back. Overwrites atomically, so repeating a save is harmless.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let raw = toml::to_string_pretty(self).context("Failed to serialise config")?;
        write_atomic(path, raw.as_bytes())
            .with_context(|| format!("Failed to write config file at {}", path.display()))
    }

    /// Write a starter config file to disk (only if it doesn't exist).
    pub fn write_default_if_missing() -> Result<PathBuf> {
        let path = config_path();
        if path.exists() {
            return Ok(path);
        }
        write_atomic(&path, DEFAULT_CONFIG_TOML.as_bytes())
            .with_context(|| format!("Failed to write config file at {}", path.display()))?;
        Ok(path)
    }

    /// Editor program and its arguments, without the file path.
    pub fn editor_command(&self) -> (String, Vec<String>) {
        self.editor_command_with(|k| std::env::var(k).ok())
    }

    /// Resolution order: `editor` field, `$VISUAL`, `$EDITOR`, `vi`.
    fn editor_command_with(&self, env: impl Fn(&str) -> Option<String>) -> (String, Vec<String>) {
        let raw = [Some(self.editor.clone()), env("VISUAL"), env("EDITOR")]
            .into_iter()
            .flatten()
            .find(|e| !e.trim().is_empty())
            .unwrap_or_else(|| "vi".to_string());

        let mut words = raw.split_whitespace().map(str::to_string);
        let program = words.next().unwrap_or_else(|| "vi".to_string());
        let mut args: Vec<String> = words.collect();
        args.extend(self.editor_args.iter().cloned());
        (program, args)
    }
}

// ── Paths ─────────────────────────────────────────────────────────────────────

/// Directory holding config.toml, session.json and the log file.
pub fn config_dir() -> PathBuf {
    dirs_config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chatterm")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

fn dirs_config_dir() -> Option<PathBuf> {
    // XDG_CONFIG_HOME or ~/.config on Linux/macOS
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".config"))
        })
}

// ── Default config template written on first run ──────────────────────────────

const DEFAULT_CONFIG_TOML: &str = r#"# chatterm configuration
# Run `chatterm --init` to regenerate this file.

# Messaging bridge daemon (overridable with --endpoint / CHATTERM_ENDPOINT)
endpoint = "http://127.0.0.1:8787"

# External editor for long messages (`v` in normal mode, Ctrl+E in insert mode).
# Empty = $VISUAL, then $EDITOR, then vi.
editor      = ""
editor_args = []

conversation_limit = 25
message_limit      = 50

# Sent by `r` in the messages panel
reaction = "👍"

# ── Keybinds ─────────────────────────────────────────────────────────────────
[keybinds]
leader_key        = "ctrl+space"
leader_timeout_ms = 2000

# Pressed right after the leader key
[keybinds.navigation]
conversations = "c"
messages      = "m"
input         = "i"

[keybinds.global]
quit       = "q"
next_panel = "tab"
prev_panel = "shift+tab"
help       = "?"
refresh    = "ctrl+r"
"#;
