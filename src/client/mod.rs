/// The chat-protocol side of the app: domain types, the push events a
/// service emits, and the two traits the session engine talks to.
///
/// Everything here is transport-agnostic. `bridge` holds the HTTP
/// implementation; `pairing` holds the state machine that turns a stream of
/// pairing events into "done" or "failed".
pub mod bridge;
pub mod pairing;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// ── Domain types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub latest_message: String,
    pub latest_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub unread: bool,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub participants: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    pub fn glyph(self) -> &'static str {
        match self {
            MessageStatus::Sent => "✓",
            MessageStatus::Delivered => "✓✓",
            MessageStatus::Read => "👁",
            MessageStatus::Failed => "✗",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    #[serde(default)]
    pub sender_name: String,
    #[serde(default)]
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_from_me: bool,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(default)]
    pub reactions: Vec<String>,
}

// ── Push events ───────────────────────────────────────────────────────────────

/// Pushed by a connected service on its own schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Connected,
    Disconnected,
    NewMessage { message: Message },
    ConversationsChanged,
    FatalError { error: String },
    TemporaryError { error: String },
}

/// Pushed while pairing a new device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PairingEvent {
    /// Show this URL as a QR code for the phone to scan.
    QrReady { url: String },
    /// The phone accepted; `session` is the credential blob to persist.
    Paired { session: serde_json::Value },
    /// The service finished its own setup.
    Ready,
    FatalError { error: String },
    TemporaryError { error: String },
}

// ── Service traits ────────────────────────────────────────────────────────────

/// A connected chat account. Every call may fail; none of them touch UI state.
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn connect(&self) -> Result<()>;
    async fn list_conversations(&self, limit: usize) -> Result<Vec<Conversation>>;
    async fn fetch_messages(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>>;
    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<()>;
    async fn mark_read(&self, conversation_id: &str, message_id: &str) -> Result<()>;
    async fn send_reaction(&self, conversation_id: &str, message_id: &str, emoji: &str)
    -> Result<()>;
    /// Push feed of [`ClientEvent`]s. The sender side stops when `cancel` fires.
    async fn subscribe(&self, cancel: CancellationToken)
    -> Result<mpsc::UnboundedReceiver<ClientEvent>>;
}

/// Device pairing and persisted-session restore.
#[async_trait]
pub trait Pairing: Send + Sync {
    /// Re-attach a saved credential blob. `Ok(false)` means the session expired.
    async fn restore(&self, device_pair: &serde_json::Value) -> Result<bool>;
    /// Begin a fresh pairing. The sender side stops when `cancel` fires.
    async fn start_pairing(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<PairingEvent>>;
}
