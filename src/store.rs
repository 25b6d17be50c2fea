/// Local state: the persisted pairing session and the in-memory
/// conversation/message cache.
///
/// The session file lives next to config.toml as `session.json` and is only
/// ever replaced whole (temp file + rename), so a crash mid-write leaves the
/// previous session intact. The cache is plain data owned by the session loop;
/// background work never touches it.
use std::cmp::Reverse;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::{Conversation, Message};

// ── Atomic writes ─────────────────────────────────────────────────────────────

/// Replace `path` with `bytes` (mode 0644 on unix). Parent directories are created.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    write_atomic_mode(path, bytes, 0o644)
}

/// Like [`write_atomic`] but readable by the owner only.
pub fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    write_atomic_mode(path, bytes, 0o600)
}

fn write_atomic_mode(path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)
        .with_context(|| format!("Failed to create directory {}", parent.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

// ── Persisted session ─────────────────────────────────────────────────────────

/// Credentials handed back by the bridge after pairing. Opaque to us.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedSession {
    pub device_pair: serde_json::Value,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
}

impl SavedSession {
    pub fn new(device_pair: serde_json::Value) -> Self {
        Self {
            device_pair,
            created_at: None,
            last_used: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `<config dir>/session.json`
    pub fn default_location() -> Self {
        Self::new(crate::config::config_dir().join("session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when nothing has been saved; `Err` when the file exists but is unusable.
    pub fn load(&self) -> Result<Option<SavedSession>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read session at {}", self.path.display()));
            }
        };
        let session = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse session at {}", self.path.display()))?;
        Ok(Some(session))
    }

    /// Stamp `created_at` (first save only) and `last_used`, then write.
    pub fn save(&self, session: &mut SavedSession) -> Result<()> {
        let now = Utc::now();
        session.created_at.get_or_insert(now);
        session.last_used = Some(now);
        let raw = serde_json::to_string_pretty(session)?;
        write_private(&self.path, raw.as_bytes())
    }

    /// Remove the saved session. Nothing saved is not an error.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove session at {}", self.path.display())),
        }
    }
}

// ── Message cache ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MessageCache {
    conversations: HashMap<String, Conversation>,
    messages: HashMap<String, Vec<Message>>,
}

impl MessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_conversations(&mut self, convs: Vec<Conversation>) {
        self.conversations = convs.into_iter().map(|c| (c.id.clone(), c)).collect();
    }

    /// All conversations, newest activity first.
    pub fn conversations(&self) -> Vec<Conversation> {
        let mut out: Vec<Conversation> = self.conversations.values().cloned().collect();
        out.sort_by(|a, b| {
            Reverse(a.latest_timestamp)
                .cmp(&Reverse(b.latest_timestamp))
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.id.cmp(&b.id))
        });
        out
    }

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn set_messages(&mut self, conversation_id: &str, msgs: Vec<Message>) {
        self.messages.insert(conversation_id.to_string(), msgs);
    }

    pub fn messages(&self, conversation_id: &str) -> &[Message] {
        self.messages
            .get(conversation_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Append a pushed message. Returns false if its id was already cached.
    ///
    /// The owning conversation's preview follows the newest message, and
    /// anything not sent by us marks it unread.
    pub fn add_message(&mut self, msg: Message) -> bool {
        let list = self.messages.entry(msg.conversation_id.clone()).or_default();
        if list.iter().any(|m| m.id == msg.id) {
            return false;
        }
        if let Some(conv) = self.conversations.get_mut(&msg.conversation_id) {
            if msg.timestamp >= conv.latest_timestamp {
                conv.latest_message = msg.content.clone();
                conv.latest_timestamp = msg.timestamp;
            }
            if !msg.is_from_me {
                conv.unread = true;
            }
        }
        list.push(msg);
        true
    }

    pub fn mark_read(&mut self, conversation_id: &str) {
        if let Some(conv) = self.conversations.get_mut(conversation_id) {
            conv.unread = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MessageStatus;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn conv(id: &str, name: &str, at: i64) -> Conversation {
        Conversation {
            id: id.into(),
            name: name.into(),
            latest_message: String::new(),
            latest_timestamp: ts(at),
            unread: false,
            is_group: false,
            participants: vec![],
        }
    }

    fn msg(id: &str, conv: &str, at: i64, from_me: bool) -> Message {
        Message {
            id: id.into(),
            conversation_id: conv.into(),
            sender_name: "Ann".into(),
            content: format!("body {id}"),
            timestamp: ts(at),
            is_from_me: from_me,
            status: MessageStatus::Delivered,
            reactions: vec![],
        }
    }

    #[test]
    fn load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        assert!(store.load().unwrap().is_none());
        // clearing twice is fine
        store.clear().unwrap();
        store.clear().unwrap();
    }

    #[test]
    fn corrupt_session_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(SessionStore::new(path).load().is_err());
    }

    #[test]
    fn save_stamps_times_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("sub").join("session.json"));
        let mut s = SavedSession::new(serde_json::json!({ "token": "abc" }));
        store.save(&mut s).unwrap();
        let created = s.created_at.unwrap();
        assert!(s.last_used.is_some());

        store.save(&mut s).unwrap();
        assert_eq!(s.created_at, Some(created));

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, s);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn conversations_sorted_newest_first() {
        let mut cache = MessageCache::new();
        cache.set_conversations(vec![conv("a", "Alice", 10), conv("b", "Bob", 30), conv("c", "Cat", 20)]);
        let ids: Vec<String> = cache.conversations().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, ["b", "c", "a"]);
    }

    #[test]
    fn add_message_updates_preview_and_unread() {
        let mut cache = MessageCache::new();
        cache.set_conversations(vec![conv("a", "Alice", 10), conv("b", "Bob", 30)]);
        assert!(cache.add_message(msg("m1", "a", 40, false)));
        let a = cache.conversation("a").unwrap();
        assert!(a.unread);
        assert_eq!(a.latest_message, "body m1");
        assert_eq!(cache.conversations()[0].id, "a");

        // duplicates are ignored
        assert!(!cache.add_message(msg("m1", "a", 40, false)));
        assert_eq!(cache.messages("a").len(), 1);

        cache.mark_read("a");
        assert!(cache.add_message(msg("m2", "a", 41, true)));
        assert!(!cache.conversation("a").unwrap().unread);
    }

    #[test]
    fn messages_for_unknown_conversation_are_empty() {
        let cache = MessageCache::new();
        assert!(cache.messages("zzz").is_empty());
    }
}
