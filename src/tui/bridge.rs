/// Command/event bridge: everything that runs off the UI loop and reports back.
///
/// Background work never touches session state. It gets its inputs by value
/// (ids, text, limits), runs against the chat service, and sends exactly one
/// [`UiEvent`] when it finishes. Cancelling the token stops waiting for
/// results; nothing is sent after that.
use std::sync::Arc;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::UiEvent;
use crate::client::pairing::{PairingState, PairingStep};
use crate::client::{ChatService, ClientEvent, Conversation, Message, Pairing};
use crate::store::{SavedSession, SessionStore};

// ── Operations ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    ListConversations { limit: usize },
    FetchMessages { conversation_id: String, limit: usize },
    SendMessage { conversation_id: String, text: String },
    MarkRead { conversation_id: String, message_id: String },
    SendReaction { conversation_id: String, message_id: String, emoji: String },
}

/// Result of one [`Operation`]. Errors are flattened to text for the status line.
#[derive(Debug, Clone, PartialEq)]
pub enum OpResult {
    ConversationsLoaded(Result<Vec<Conversation>, String>),
    MessagesLoaded {
        conversation_id: String,
        result: Result<Vec<Message>, String>,
    },
    MessageSent {
        conversation_id: String,
        result: Result<(), String>,
    },
    MarkedRead {
        conversation_id: String,
        result: Result<(), String>,
    },
    ReactionSent {
        conversation_id: String,
        message_id: String,
        result: Result<(), String>,
    },
}

fn flat<T>(r: anyhow::Result<T>) -> Result<T, String> {
    r.map_err(|e| format!("{e:#}"))
}

async fn perform(service: &dyn ChatService, op: Operation) -> OpResult {
    match op {
        Operation::ListConversations { limit } => {
            OpResult::ConversationsLoaded(flat(service.list_conversations(limit).await))
        }
        Operation::FetchMessages { conversation_id, limit } => {
            let result = flat(service.fetch_messages(&conversation_id, limit).await);
            OpResult::MessagesLoaded { conversation_id, result }
        }
        Operation::SendMessage { conversation_id, text } => {
            let result = flat(service.send_message(&conversation_id, &text).await);
            OpResult::MessageSent { conversation_id, result }
        }
        Operation::MarkRead { conversation_id, message_id } => {
            let result = flat(service.mark_read(&conversation_id, &message_id).await);
            OpResult::MarkedRead { conversation_id, result }
        }
        Operation::SendReaction { conversation_id, message_id, emoji } => {
            let result = flat(service.send_reaction(&conversation_id, &message_id, &emoji).await);
            OpResult::ReactionSent { conversation_id, message_id, result }
        }
    }
}

/// Run `op` in the background; its result arrives as `UiEvent::Op`.
pub fn dispatch(
    service: Arc<dyn ChatService>,
    op: Operation,
    tx: UnboundedSender<UiEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    debug!(?op, "dispatch");
    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            result = perform(service.as_ref(), op) => {
                let _ = tx.send(UiEvent::Op(result));
            }
        }
    })
}

/// Forward a service's push feed into the UI queue. Ends quietly when the
/// feed closes, the UI queue goes away, or `cancel` fires.
pub fn merge_feed(
    mut feed: UnboundedReceiver<ClientEvent>,
    tx: UnboundedSender<UiEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                ev = feed.recv() => match ev {
                    Some(ev) => {
                        if tx.send(UiEvent::Client(ev)).is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        debug!("push feed merge stopped");
    })
}

// ── Startup ───────────────────────────────────────────────────────────────────

/// Progress of getting from launch to a connected session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupEvent {
    QrReady(String),
    Connected,
    Failed(String),
    /// Informational text for the status line.
    Notice(String),
}

/// Restore the saved session or pair a new device, then connect and start
/// the push feed. Progress arrives as `UiEvent::Startup`.
pub fn start_session(
    chat: Arc<dyn ChatService>,
    pairing: Arc<dyn Pairing>,
    store: SessionStore,
    tx: UnboundedSender<UiEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let send = |ev: StartupEvent| {
            let _ = tx.send(UiEvent::Startup(ev));
        };

        let restored = tokio::select! {
            _ = cancel.cancelled() => return,
            r = restore_saved(pairing.as_ref(), &store) => r,
        };
        let paired = match restored {
            Ok(true) => true,
            Ok(false) => false,
            Err(e) => {
                send(StartupEvent::Failed(e));
                return;
            }
        };

        if !paired {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return,
                r = pair_device(pairing.as_ref(), &store, &send, cancel.child_token()) => r,
            };
            if let Err(e) = outcome {
                send(StartupEvent::Failed(e));
                return;
            }
        }

        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            r = chat.connect() => r,
        };
        if let Err(e) = connected {
            send(StartupEvent::Failed(format!("Could not connect: {e:#}")));
            return;
        }

        match chat.subscribe(cancel.clone()).await {
            Ok(feed) => {
                info!("connected, push feed open");
                send(StartupEvent::Connected);
                merge_feed(feed, tx.clone(), cancel.clone());
            }
            Err(e) => send(StartupEvent::Failed(format!("Could not open event stream: {e:#}"))),
        }
    })
}

/// `Ok(true)` if a saved session was re-attached, `Ok(false)` if we need to pair.
async fn restore_saved(pairing: &dyn Pairing, store: &SessionStore) -> Result<bool, String> {
    let mut saved = match store.load() {
        Ok(Some(s)) => s,
        Ok(None) => return Ok(false),
        Err(e) => {
            warn!("discarding unreadable session: {e:#}");
            let _ = store.clear();
            return Ok(false);
        }
    };
    match pairing.restore(&saved.device_pair).await {
        Ok(true) => {
            if let Err(e) = store.save(&mut saved) {
                warn!("could not update session timestamp: {e:#}");
            }
            info!("restored saved session");
            Ok(true)
        }
        Ok(false) => {
            info!("saved session expired, pairing again");
            let _ = store.clear();
            Ok(false)
        }
        Err(e) => Err(format!("Could not restore session: {e:#}")),
    }
}

/// Drive the pairing state machine until it completes or fails.
async fn pair_device(
    pairing: &dyn Pairing,
    store: &SessionStore,
    send: &impl Fn(StartupEvent),
    cancel: CancellationToken,
) -> Result<(), String> {
    let mut feed = pairing
        .start_pairing(cancel)
        .await
        .map_err(|e| format!("Could not start pairing: {e:#}"))?;

    let mut state = PairingState::Started;
    while let Some(ev) = feed.recv().await {
        let (next, steps) = state.transition(ev);
        state = next;
        for step in steps {
            match step {
                PairingStep::ShowQr(url) => send(StartupEvent::QrReady(url)),
                PairingStep::Persist(blob) => {
                    if let Err(e) = store.save(&mut SavedSession::new(blob)) {
                        warn!("could not save session: {e:#}");
                        send(StartupEvent::Notice(format!("Could not save session: {e:#}")));
                    }
                }
                PairingStep::Done => {
                    info!("pairing complete");
                    return Ok(());
                }
                PairingStep::Fail(e) => return Err(format!("Pairing failed: {e}")),
                PairingStep::Warn(e) => {
                    warn!("pairing: {e}");
                    send(StartupEvent::Notice(e));
                }
            }
        }
    }
    Err("Pairing ended before the phone confirmed".to_string())
}
