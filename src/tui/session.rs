/// The session: every piece of UI state and the one function that changes it.
///
/// [`Session::handle`] takes one inbound event, updates state, and returns the
/// work the loop should start. It performs no I/O itself, so a whole
/// conversation with the UI can be replayed in a test.
use std::collections::HashSet;
use std::time::Instant;

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use tracing::{debug, info, warn};

use super::UiEvent;
use super::bridge::{OpResult, Operation, StartupEvent};
use super::compose::EditorOutcome;
use super::detail::{DetailIntent, MessageView};
use super::editor::{EditorBuffer, EditorIntent};
use super::list::{ConversationList, ListIntent};
use super::panels::{ChordOutcome, FocusChange, GlobalCommand, Keymap, Panel, PanelFocus};
use crate::client::{ClientEvent, Conversation, Message};
use crate::config::ConfigFile;
use crate::keys::is_ctrl;
use crate::store::MessageCache;

// ── Lifecycle ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    Loading,
    Pairing { qr_url: Option<String> },
    Connected,
    Errored(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleSignal {
    QrReady(String),
    Ready,
    Fatal(String),
}

impl Lifecycle {
    /// Errors never take down a connected session, and nothing leaves `Errored`.
    pub fn next(&self, signal: LifecycleSignal) -> Lifecycle {
        use Lifecycle::*;
        match (self, signal) {
            (Errored(e), _) => Errored(e.clone()),
            (Connected, _) => Connected,
            (_, LifecycleSignal::Fatal(e)) => Errored(e),
            (_, LifecycleSignal::QrReady(url)) => Pairing { qr_url: Some(url) },
            (_, LifecycleSignal::Ready) => Connected,
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Work the loop starts on the session's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Op(Operation),
    OpenEditor { initial: String },
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveConversation {
    pub id: String,
    pub name: String,
}

/// Outstanding background operations, one slot per kind.
#[derive(Debug, Default)]
struct InFlight {
    list: bool,
    list_again: bool,
    fetch: Option<String>,
    fetch_next: Option<String>,
    mark_read: HashSet<String>,
    reactions: HashSet<(String, String)>,
}

// ── Session ───────────────────────────────────────────────────────────────────

pub struct Session {
    pub lifecycle: Lifecycle,
    pub focus: PanelFocus,
    pub keymap: Keymap,
    pub status: String,
    pub editor: EditorBuffer,
    pub list: ConversationList,
    pub detail: MessageView,
    pub cache: MessageCache,
    /// Where sends go. Set by Enter in the list, not by merely highlighting.
    pub active: Option<ActiveConversation>,
    pub show_help: bool,
    pub spinner_frame: usize,
    conversation_limit: usize,
    message_limit: usize,
    reaction: String,
    inflight: InFlight,
}

impl Session {
    pub fn new(cfg: &ConfigFile) -> Result<Self> {
        Ok(Self {
            lifecycle: Lifecycle::Loading,
            focus: PanelFocus::new(Panel::List),
            keymap: Keymap::from_config(&cfg.keybinds)?,
            status: String::new(),
            editor: EditorBuffer::new(),
            list: ConversationList::new(),
            detail: MessageView::new(),
            cache: MessageCache::new(),
            active: None,
            show_help: false,
            spinner_frame: 0,
            conversation_limit: cfg.conversation_limit,
            message_limit: cfg.message_limit,
            reaction: cfg.reaction.clone(),
            inflight: InFlight::default(),
        })
    }

    /// Something on screen moves by itself, so ticks need a redraw.
    pub fn is_animating(&self) -> bool {
        self.editor.is_sending()
            || self.focus.leader_pending()
            || matches!(self.lifecycle, Lifecycle::Loading)
    }

    /// Bare letters are text, not commands.
    fn is_typing(&self) -> bool {
        match self.focus.current() {
            Panel::Input => self.editor.is_typing(),
            Panel::List => self.list.is_searching(),
            Panel::Detail => false,
        }
    }

    pub fn handle(&mut self, event: UiEvent, now: Instant) -> Vec<Command> {
        match event {
            UiEvent::Key(key) => self.on_key(key, now),
            UiEvent::Resize(w, h) => {
                self.on_resize(w, h);
                vec![]
            }
            UiEvent::Tick => {
                self.on_tick(now);
                vec![]
            }
            UiEvent::Op(result) => self.on_op_result(result),
            UiEvent::Client(ev) => self.on_client_event(ev),
            UiEvent::Startup(ev) => self.on_startup(ev),
            UiEvent::Editor(outcome) => {
                self.on_editor_outcome(outcome);
                vec![]
            }
        }
    }

    // ── Keys ──────────────────────────────────────────────────────────────────

    fn on_key(&mut self, key: KeyEvent, now: Instant) -> Vec<Command> {
        if key.kind == KeyEventKind::Release {
            return vec![];
        }

        if self.lifecycle != Lifecycle::Connected {
            if is_ctrl(&key, 'c') || self.keymap.quit.matches(&key) {
                return vec![Command::Quit];
            }
            return vec![];
        }

        if self.focus.leader_pending() {
            self.status.clear();
            return match self.focus.resolve_leader(&key, &self.keymap) {
                ChordOutcome::Focus(panel) => {
                    if let Some(change) = self.focus.focus(panel) {
                        self.apply_focus(change);
                    }
                    vec![]
                }
                ChordOutcome::Command(GlobalCommand::Refresh) => self.refresh(),
                ChordOutcome::Command(GlobalCommand::Quit) => vec![Command::Quit],
                ChordOutcome::Cancelled | ChordOutcome::Unmapped => vec![],
            };
        }

        if self.keymap.leader.matches(&key) {
            self.focus.begin_leader(now);
            self.status = "-- LEADER --".to_string();
            return vec![];
        }

        if is_ctrl(&key, 'c') {
            return vec![Command::Quit];
        }

        if self.show_help && key.code == KeyCode::Esc {
            self.show_help = false;
            return vec![];
        }

        let typing = self.is_typing();
        if !typing && self.keymap.quit.matches(&key) {
            return vec![Command::Quit];
        }
        if self.keymap.next_panel.matches(&key) {
            let change = self.focus.cycle(1);
            self.apply_focus(change);
            return vec![];
        }
        if self.keymap.prev_panel.matches(&key) {
            let change = self.focus.cycle(-1);
            self.apply_focus(change);
            return vec![];
        }
        if !typing && self.keymap.help.matches(&key) {
            self.show_help = !self.show_help;
            return vec![];
        }
        if self.keymap.refresh.matches(&key) {
            return self.refresh();
        }

        match self.focus.current() {
            Panel::List => match self.list.handle_key(&key) {
                ListIntent::None => vec![],
                ListIntent::Preview(id) => self.fetch(id),
                ListIntent::Activate { id, name } => {
                    self.status = format!("Selected: {name}");
                    self.active = Some(ActiveConversation { id: id.clone(), name });
                    self.fetch(id)
                }
            },
            Panel::Detail => match self.detail.handle_key(&key) {
                DetailIntent::None => vec![],
                DetailIntent::React { conversation_id, message_id } => {
                    self.react(conversation_id, message_id)
                }
            },
            Panel::Input => match self.editor.handle_key(&key) {
                EditorIntent::None => vec![],
                EditorIntent::Send(text) => self.send(text),
                EditorIntent::SendBlocked => {
                    self.status = "Still sending the previous message".to_string();
                    vec![]
                }
                EditorIntent::OpenExternal(initial) => vec![Command::OpenEditor { initial }],
            },
        }
    }

    fn apply_focus(&mut self, change: FocusChange) {
        if change.from == Panel::Input || change.to == Panel::Input {
            self.editor.set_focused(change.to == Panel::Input);
        }
    }

    fn on_resize(&mut self, w: u16, h: u16) {
        let (list_rows, detail_items) = super::render::viewport_for(w, h);
        self.list.set_viewport(list_rows);
        self.detail.set_viewport(detail_items);
    }

    fn on_tick(&mut self, now: Instant) {
        self.spinner_frame = self.spinner_frame.wrapping_add(1);
        if self.focus.expire_leader(now, self.keymap.leader_timeout) {
            self.status.clear();
        }
    }

    // ── Operation dispatch ────────────────────────────────────────────────────

    fn list_conversations(&mut self) -> Vec<Command> {
        if self.inflight.list {
            self.inflight.list_again = true;
            return vec![];
        }
        self.inflight.list = true;
        vec![Command::Op(Operation::ListConversations { limit: self.conversation_limit })]
    }

    /// At most one fetch outstanding; the newest request waits for it.
    fn fetch(&mut self, conversation_id: String) -> Vec<Command> {
        if self.inflight.fetch.is_some() {
            self.inflight.fetch_next = Some(conversation_id);
            return vec![];
        }
        self.inflight.fetch = Some(conversation_id.clone());
        vec![Command::Op(Operation::FetchMessages {
            conversation_id,
            limit: self.message_limit,
        })]
    }

    fn refresh(&mut self) -> Vec<Command> {
        self.status = "Refreshing…".to_string();
        let mut cmds = self.list_conversations();
        if let Some(id) = self.detail.conversation_id().map(str::to_string) {
            cmds.extend(self.fetch(id));
        }
        cmds
    }

    fn send(&mut self, text: String) -> Vec<Command> {
        let Some(active) = &self.active else {
            self.status = "Select a conversation first! (Enter in conversations)".to_string();
            self.editor.send_failed();
            return vec![];
        };
        self.status = format!("Sending to {}…", active.name);
        vec![Command::Op(Operation::SendMessage {
            conversation_id: active.id.clone(),
            text,
        })]
    }

    fn react(&mut self, conversation_id: String, message_id: String) -> Vec<Command> {
        let key = (conversation_id.clone(), message_id.clone());
        if !self.inflight.reactions.insert(key) {
            return vec![];
        }
        self.status = format!("Reacting {}", self.reaction);
        vec![Command::Op(Operation::SendReaction {
            conversation_id,
            message_id,
            emoji: self.reaction.clone(),
        })]
    }

    fn mark_read_if_unread(&mut self, conversation_id: &str) -> Vec<Command> {
        let unread = self.cache.conversation(conversation_id).is_some_and(|c| c.unread);
        let last = self.cache.messages(conversation_id).last().map(|m| m.id.clone());
        let Some(message_id) = last.filter(|_| unread) else {
            return vec![];
        };
        if !self.inflight.mark_read.insert(conversation_id.to_string()) {
            return vec![];
        }
        vec![Command::Op(Operation::MarkRead {
            conversation_id: conversation_id.to_string(),
            message_id,
        })]
    }

    // ── Operation results ─────────────────────────────────────────────────────

    fn on_op_result(&mut self, result: OpResult) -> Vec<Command> {
        match result {
            OpResult::ConversationsLoaded(result) => {
                self.inflight.list = false;
                let mut cmds = match result {
                    Ok(convs) => self.conversations_loaded(convs),
                    Err(e) => {
                        warn!("list conversations: {e}");
                        self.status = format!("Error: failed to load conversations: {e}");
                        vec![]
                    }
                };
                if std::mem::take(&mut self.inflight.list_again) {
                    cmds.extend(self.list_conversations());
                }
                cmds
            }
            OpResult::MessagesLoaded { conversation_id, result } => {
                self.inflight.fetch = None;
                let mut cmds = match result {
                    Ok(msgs) => self.messages_loaded(&conversation_id, msgs),
                    Err(e) => {
                        warn!("fetch messages for {conversation_id}: {e}");
                        self.status = format!("Error: failed to load messages: {e}");
                        vec![]
                    }
                };
                if let Some(next) = self.inflight.fetch_next.take() {
                    cmds.extend(self.fetch(next));
                }
                cmds
            }
            OpResult::MessageSent { conversation_id, result } => match result {
                Ok(()) => {
                    info!("message sent to {conversation_id}");
                    self.editor.send_succeeded();
                    self.status = "Message sent".to_string();
                    self.fetch(conversation_id)
                }
                Err(e) => {
                    warn!("send to {conversation_id}: {e}");
                    self.editor.send_failed();
                    self.status = format!("Error: {e}");
                    vec![]
                }
            },
            OpResult::MarkedRead { conversation_id, result } => {
                self.inflight.mark_read.remove(&conversation_id);
                match result {
                    Ok(()) => {
                        self.cache.mark_read(&conversation_id);
                        self.list.set_conversations(self.cache.conversations());
                    }
                    Err(e) => {
                        warn!("mark read {conversation_id}: {e}");
                        self.status = format!("Error: failed to mark read: {e}");
                    }
                }
                vec![]
            }
            OpResult::ReactionSent { conversation_id, message_id, result } => {
                self.inflight.reactions.remove(&(conversation_id.clone(), message_id));
                match result {
                    Ok(()) => {
                        self.status = "Reaction sent".to_string();
                        if self.detail.conversation_id() == Some(conversation_id.as_str()) {
                            return self.fetch(conversation_id);
                        }
                        vec![]
                    }
                    Err(e) => {
                        self.status = format!("Error: failed to react: {e}");
                        vec![]
                    }
                }
            }
        }
    }

    fn conversations_loaded(&mut self, convs: Vec<Conversation>) -> Vec<Command> {
        debug!(count = convs.len(), "conversations loaded");
        self.cache.set_conversations(convs);
        self.list.set_conversations(self.cache.conversations());
        if let Some(active) = &mut self.active {
            if let Some(c) = self.cache.conversation(&active.id) {
                active.name = c.name.clone();
            }
        }
        // Nothing on the right yet: show whatever is highlighted
        if self.detail.conversation_id().is_none() && self.inflight.fetch.is_none() {
            if let Some(id) = self.list.selected_conversation().map(|c| c.id.clone()) {
                return self.fetch(id);
            }
        }
        vec![]
    }

    fn messages_loaded(&mut self, conversation_id: &str, msgs: Vec<Message>) -> Vec<Command> {
        debug!(conversation_id, count = msgs.len(), "messages loaded");
        self.cache.set_messages(conversation_id, msgs.clone());

        // A stale preview result must not replace what the user moved on to
        let wanted = self.inflight.fetch_next.is_none()
            || self.inflight.fetch_next.as_deref() == Some(conversation_id);
        let showing = self.detail.conversation_id() == Some(conversation_id);
        if wanted || showing {
            let title = self
                .cache
                .conversation(conversation_id)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| conversation_id.to_string());
            self.detail.set_messages(conversation_id, &title, msgs);
        }

        if self.active.as_ref().is_some_and(|a| a.id == conversation_id) {
            return self.mark_read_if_unread(conversation_id);
        }
        vec![]
    }

    // ── Pushed events ─────────────────────────────────────────────────────────

    fn on_client_event(&mut self, ev: ClientEvent) -> Vec<Command> {
        match ev {
            ClientEvent::Connected => {
                self.status = "Connected".to_string();
                vec![]
            }
            ClientEvent::Disconnected => {
                self.status = "Disconnected from bridge".to_string();
                vec![]
            }
            ClientEvent::NewMessage { message } => {
                let conv_id = message.conversation_id.clone();
                let from = message.sender_name.clone();
                let from_me = message.is_from_me;
                if !self.cache.add_message(message.clone()) {
                    return vec![];
                }
                self.detail.add_message(message);
                self.list.set_conversations(self.cache.conversations());
                if !from_me && self.detail.conversation_id() != Some(conv_id.as_str()) {
                    self.status = format!("New message from {from}");
                }
                let mut cmds = self.list_conversations();
                if self.active.as_ref().is_some_and(|a| a.id == conv_id) {
                    cmds.extend(self.mark_read_if_unread(&conv_id));
                }
                cmds
            }
            ClientEvent::ConversationsChanged => self.list_conversations(),
            ClientEvent::FatalError { error } => {
                self.fatal(error);
                vec![]
            }
            ClientEvent::TemporaryError { error } => {
                warn!("temporary error: {error}");
                self.status = format!("Warning: {error}");
                vec![]
            }
        }
    }

    fn on_startup(&mut self, ev: StartupEvent) -> Vec<Command> {
        match ev {
            StartupEvent::QrReady(url) => {
                self.lifecycle = self.lifecycle.next(LifecycleSignal::QrReady(url));
                self.status = "Scan the QR code with your phone".to_string();
                vec![]
            }
            StartupEvent::Connected => {
                let was_connected = self.lifecycle == Lifecycle::Connected;
                self.lifecycle = self.lifecycle.next(LifecycleSignal::Ready);
                if was_connected || self.lifecycle != Lifecycle::Connected {
                    return vec![];
                }
                self.status = "Connected".to_string();
                self.list_conversations()
            }
            StartupEvent::Failed(error) => {
                self.fatal(error);
                vec![]
            }
            StartupEvent::Notice(text) => {
                self.status = text;
                vec![]
            }
        }
    }

    fn fatal(&mut self, error: String) {
        warn!("fatal: {error}");
        if self.lifecycle == Lifecycle::Connected {
            self.status = format!("Connection error: {error}");
        } else {
            self.lifecycle = self.lifecycle.next(LifecycleSignal::Fatal(error));
        }
    }

    fn on_editor_outcome(&mut self, outcome: EditorOutcome) {
        match outcome {
            EditorOutcome::Composed(text) => {
                self.editor.set_draft(text);
                if let Some(change) = self.focus.focus(Panel::Input) {
                    self.apply_focus(change);
                }
                self.status = "Press Enter to send".to_string();
            }
            EditorOutcome::Cancelled => self.status = "Message cancelled".to_string(),
            EditorOutcome::Failed(e) => self.status = format!("Editor error: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MessageStatus;
    use crate::tui::editor::EditorMode;
    use chrono::{TimeZone, Utc};
    use crossterm::event::KeyModifiers;

    fn session() -> Session {
        let mut s = Session::new(&ConfigFile::default()).unwrap();
        s.handle(UiEvent::Startup(StartupEvent::Connected), Instant::now());
        s.inflight = InFlight::default();
        s
    }

    fn press(s: &mut Session, code: KeyCode, mods: KeyModifiers) -> Vec<Command> {
        s.handle(UiEvent::Key(KeyEvent::new(code, mods)), Instant::now())
    }

    fn typ(s: &mut Session, text: &str) -> Vec<Command> {
        let mut out = vec![];
        for c in text.chars() {
            out.extend(press(s, KeyCode::Char(c), KeyModifiers::NONE));
        }
        out
    }

    fn conv(id: &str, name: &str, at: i64, unread: bool) -> Conversation {
        Conversation {
            id: id.into(),
            name: name.into(),
            latest_message: String::new(),
            latest_timestamp: Utc.timestamp_opt(at, 0).unwrap(),
            unread,
            is_group: false,
            participants: vec![],
        }
    }

    fn msg(id: &str, conv: &str, from_me: bool) -> Message {
        Message {
            id: id.into(),
            conversation_id: conv.into(),
            sender_name: "Bob".into(),
            content: "hey".into(),
            timestamp: Utc.timestamp_opt(500, 0).unwrap(),
            is_from_me: from_me,
            status: MessageStatus::Sent,
            reactions: vec![],
        }
    }

    fn leader(s: &mut Session) {
        press(s, KeyCode::Char(' '), KeyModifiers::CONTROL);
    }

    fn ops(cmds: &[Command]) -> Vec<&Operation> {
        cmds.iter()
            .filter_map(|c| match c {
                Command::Op(op) => Some(op),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn lifecycle_transitions() {
        let l = Lifecycle::Loading.next(LifecycleSignal::QrReady("u".into()));
        assert_eq!(l, Lifecycle::Pairing { qr_url: Some("u".into()) });
        assert_eq!(l.next(LifecycleSignal::Ready), Lifecycle::Connected);
        assert_eq!(
            Lifecycle::Loading.next(LifecycleSignal::Fatal("x".into())),
            Lifecycle::Errored("x".into())
        );
        assert_eq!(Lifecycle::Connected.next(LifecycleSignal::Fatal("x".into())), Lifecycle::Connected);
        assert_eq!(
            Lifecycle::Errored("a".into()).next(LifecycleSignal::Ready),
            Lifecycle::Errored("a".into())
        );
    }

    #[test]
    fn connecting_lists_conversations() {
        let mut s = Session::new(&ConfigFile::default()).unwrap();
        let cmds = s.handle(UiEvent::Startup(StartupEvent::Connected), Instant::now());
        assert_eq!(cmds, vec![Command::Op(Operation::ListConversations { limit: 25 })]);
        assert_eq!(s.lifecycle, Lifecycle::Connected);
    }

    #[test]
    fn fatal_error_only_degrades_once_connected() {
        let mut s = Session::new(&ConfigFile::default()).unwrap();
        s.handle(UiEvent::Startup(StartupEvent::Failed("boom".into())), Instant::now());
        assert_eq!(s.lifecycle, Lifecycle::Errored("boom".into()));

        let mut s = session();
        s.handle(
            UiEvent::Client(ClientEvent::FatalError { error: "dup".into() }),
            Instant::now(),
        );
        assert_eq!(s.lifecycle, Lifecycle::Connected);
        assert!(s.status.contains("dup"));
    }

    #[test]
    fn keys_are_gated_until_connected() {
        let mut s = Session::new(&ConfigFile::default()).unwrap();
        assert!(press(&mut s, KeyCode::Tab, KeyModifiers::NONE).is_empty());
        assert_eq!(s.focus.current(), Panel::List);
        assert_eq!(press(&mut s, KeyCode::Char('q'), KeyModifiers::NONE), vec![Command::Quit]);
    }

    #[test]
    fn send_without_active_conversation_makes_no_call() {
        let mut s = session();
        press(&mut s, KeyCode::Tab, KeyModifiers::NONE);
        press(&mut s, KeyCode::Tab, KeyModifiers::NONE);
        assert_eq!(s.focus.current(), Panel::Input);
        typ(&mut s, "hello");
        let cmds = press(&mut s, KeyCode::Enter, KeyModifiers::NONE);
        assert!(cmds.is_empty());
        assert!(s.status.starts_with("Select a conversation first!"));
        assert!(!s.editor.is_sending());
    }

    fn with_active(s: &mut Session) {
        s.handle(
            UiEvent::Op(OpResult::ConversationsLoaded(Ok(vec![conv("c1", "Alice", 10, false)]))),
            Instant::now(),
        );
        s.inflight = InFlight::default();
        let cmds = press(s, KeyCode::Enter, KeyModifiers::NONE);
        assert_eq!(s.status, "Selected: Alice");
        assert_eq!(ops(&cmds).len(), 1);
        s.inflight = InFlight::default();
    }

    #[test]
    fn send_round_trip_refetches() {
        let mut s = session();
        with_active(&mut s);
        leader(&mut s);
        press(&mut s, KeyCode::Char('i'), KeyModifiers::NONE);
        assert_eq!(s.focus.current(), Panel::Input);

        typ(&mut s, "  hi there ");
        let cmds = press(&mut s, KeyCode::Enter, KeyModifiers::NONE);
        assert_eq!(
            cmds,
            vec![Command::Op(Operation::SendMessage {
                conversation_id: "c1".into(),
                text: "hi there".into()
            })]
        );
        assert!(s.editor.is_sending());

        // A second Enter while sending goes nowhere
        typ(&mut s, "more");
        assert!(press(&mut s, KeyCode::Enter, KeyModifiers::NONE).is_empty());

        let cmds = s.handle(
            UiEvent::Op(OpResult::MessageSent { conversation_id: "c1".into(), result: Ok(()) }),
            Instant::now(),
        );
        assert_eq!(s.status, "Message sent");
        assert!(!s.editor.is_sending());
        assert_eq!(
            cmds,
            vec![Command::Op(Operation::FetchMessages { conversation_id: "c1".into(), limit: 50 })]
        );
    }

    #[test]
    fn multiline_draft_is_sent_verbatim() {
        let mut s = session();
        with_active(&mut s);
        let text = "line one\nline two\n  indented";
        s.handle(UiEvent::Editor(EditorOutcome::Composed(text.into())), Instant::now());
        assert_eq!(s.focus.current(), Panel::Input);
        assert_eq!(s.status, "Press Enter to send");
        assert_ne!(s.editor.text(), text);

        let cmds = press(&mut s, KeyCode::Enter, KeyModifiers::NONE);
        assert_eq!(
            cmds,
            vec![Command::Op(Operation::SendMessage {
                conversation_id: "c1".into(),
                text: text.into()
            })]
        );
    }

    #[test]
    fn failed_send_restores_text() {
        let mut s = session();
        with_active(&mut s);
        leader(&mut s);
        press(&mut s, KeyCode::Char('i'), KeyModifiers::NONE);
        typ(&mut s, "retry me");
        press(&mut s, KeyCode::Enter, KeyModifiers::NONE);
        s.handle(
            UiEvent::Op(OpResult::MessageSent {
                conversation_id: "c1".into(),
                result: Err("timeout".into()),
            }),
            Instant::now(),
        );
        assert_eq!(s.editor.text(), "retry me");
        assert!(!s.editor.is_sending());
        assert_eq!(s.status, "Error: timeout");
    }

    #[test]
    fn editor_cancel_and_failure_set_status() {
        let mut s = session();
        s.handle(UiEvent::Editor(EditorOutcome::Cancelled), Instant::now());
        assert_eq!(s.status, "Message cancelled");
        s.handle(UiEvent::Editor(EditorOutcome::Failed("no vi".into())), Instant::now());
        assert_eq!(s.status, "Editor error: no vi");
    }

    #[test]
    fn leader_consumes_exactly_one_key() {
        let mut s = session();
        leader(&mut s);
        assert_eq!(s.status, "-- LEADER --");
        press(&mut s, KeyCode::Char('z'), KeyModifiers::NONE);
        press(&mut s, KeyCode::Char('i'), KeyModifiers::NONE);
        assert_eq!(s.focus.current(), Panel::List);

        leader(&mut s);
        press(&mut s, KeyCode::Char('m'), KeyModifiers::NONE);
        assert_eq!(s.focus.current(), Panel::Detail);
    }

    #[test]
    fn leader_expires_on_tick() {
        let mut s = session();
        let t0 = Instant::now();
        s.handle(UiEvent::Key(KeyEvent::new(KeyCode::Char(' '), KeyModifiers::CONTROL)), t0);
        s.handle(UiEvent::Tick, t0 + std::time::Duration::from_secs(3));
        assert!(!s.focus.leader_pending());
        assert!(s.status.is_empty());
    }

    #[test]
    fn quit_is_text_while_typing() {
        let mut s = session();
        leader(&mut s);
        press(&mut s, KeyCode::Char('i'), KeyModifiers::NONE);
        assert!(typ(&mut s, "q").is_empty());
        assert_eq!(s.editor.text(), "q");
        assert_eq!(press(&mut s, KeyCode::Char('c'), KeyModifiers::CONTROL), vec![Command::Quit]);

        let mut s = session();
        assert_eq!(typ(&mut s, "q"), vec![Command::Quit]);
    }

    #[test]
    fn pending_normal_action_takes_the_next_key() {
        let mut s = session();
        leader(&mut s);
        press(&mut s, KeyCode::Char('i'), KeyModifiers::NONE);
        press(&mut s, KeyCode::Esc, KeyModifiers::NONE);
        assert_eq!(s.editor.mode(), EditorMode::Normal);
        assert!(s.editor.text().is_empty());

        assert!(typ(&mut s, "fq").is_empty());
        assert_eq!(s.editor.pending(), None);

        assert!(typ(&mut s, "d?").is_empty());
        assert!(!s.show_help);
        assert_eq!(s.editor.pending(), None);

        // Nothing pending any more, so the keys are commands again
        typ(&mut s, "?");
        assert!(s.show_help);
        assert_eq!(typ(&mut s, "q"), vec![Command::Quit]);
    }

    #[test]
    fn focus_change_resets_editor_to_insert() {
        let mut s = session();
        leader(&mut s);
        press(&mut s, KeyCode::Char('i'), KeyModifiers::NONE);
        press(&mut s, KeyCode::Esc, KeyModifiers::NONE);
        assert_eq!(s.editor.mode(), EditorMode::Normal);
        press(&mut s, KeyCode::Tab, KeyModifiers::NONE);
        assert!(!s.editor.is_focused());
        press(&mut s, KeyCode::BackTab, KeyModifiers::SHIFT);
        assert_eq!(s.editor.mode(), EditorMode::Insert);
    }

    #[test]
    fn v_in_normal_mode_opens_editor() {
        let mut s = session();
        leader(&mut s);
        press(&mut s, KeyCode::Char('i'), KeyModifiers::NONE);
        typ(&mut s, "seed");
        press(&mut s, KeyCode::Esc, KeyModifiers::NONE);
        assert_eq!(
            typ(&mut s, "v"),
            vec![Command::OpenEditor { initial: "seed".into() }]
        );
    }

    #[test]
    fn fetches_coalesce_latest_wins() {
        let mut s = session();
        s.handle(
            UiEvent::Op(OpResult::ConversationsLoaded(Ok(vec![
                conv("a", "A", 30, false),
                conv("b", "B", 20, false),
                conv("c", "C", 10, false),
            ]))),
            Instant::now(),
        );
        // the first conversation was previewed automatically
        assert_eq!(s.inflight.fetch.as_deref(), Some("a"));
        assert!(typ(&mut s, "j").is_empty());
        assert!(typ(&mut s, "j").is_empty());

        let cmds = s.handle(
            UiEvent::Op(OpResult::MessagesLoaded {
                conversation_id: "a".into(),
                result: Ok(vec![msg("m1", "a", false)]),
            }),
            Instant::now(),
        );
        assert_eq!(
            cmds,
            vec![Command::Op(Operation::FetchMessages { conversation_id: "c".into(), limit: 50 })]
        );
        // the stale result for "a" was cached but not shown
        assert_eq!(s.detail.conversation_id(), None);
        assert_eq!(s.cache.messages("a").len(), 1);
    }

    #[test]
    fn list_requests_coalesce() {
        let mut s = session();
        let first = s.handle(UiEvent::Client(ClientEvent::ConversationsChanged), Instant::now());
        assert_eq!(ops(&first).len(), 1);
        let second = s.handle(UiEvent::Client(ClientEvent::ConversationsChanged), Instant::now());
        assert!(second.is_empty());
        let after = s.handle(UiEvent::Op(OpResult::ConversationsLoaded(Ok(vec![]))), Instant::now());
        assert_eq!(after, vec![Command::Op(Operation::ListConversations { limit: 25 })]);
    }

    #[test]
    fn unread_active_conversation_is_marked_read() {
        let mut s = session();
        s.handle(
            UiEvent::Op(OpResult::ConversationsLoaded(Ok(vec![conv("c1", "Alice", 10, true)]))),
            Instant::now(),
        );
        s.inflight = InFlight::default();
        press(&mut s, KeyCode::Enter, KeyModifiers::NONE);

        let cmds = s.handle(
            UiEvent::Op(OpResult::MessagesLoaded {
                conversation_id: "c1".into(),
                result: Ok(vec![msg("m1", "c1", false), msg("m2", "c1", false)]),
            }),
            Instant::now(),
        );
        assert_eq!(
            cmds,
            vec![Command::Op(Operation::MarkRead {
                conversation_id: "c1".into(),
                message_id: "m2".into()
            })]
        );

        s.handle(
            UiEvent::Op(OpResult::MarkedRead { conversation_id: "c1".into(), result: Ok(()) }),
            Instant::now(),
        );
        assert!(!s.cache.conversation("c1").unwrap().unread);
    }

    #[test]
    fn pushed_message_appends_and_relists() {
        let mut s = session();
        s.handle(
            UiEvent::Op(OpResult::ConversationsLoaded(Ok(vec![conv("c1", "Alice", 10, false)]))),
            Instant::now(),
        );
        s.handle(
            UiEvent::Op(OpResult::MessagesLoaded { conversation_id: "c1".into(), result: Ok(vec![]) }),
            Instant::now(),
        );
        s.inflight = InFlight::default();

        let cmds = s.handle(
            UiEvent::Client(ClientEvent::NewMessage { message: msg("n1", "c1", false) }),
            Instant::now(),
        );
        assert_eq!(s.detail.messages().len(), 1);
        assert_eq!(cmds, vec![Command::Op(Operation::ListConversations { limit: 25 })]);

        // duplicates are ignored entirely
        let again = s.handle(
            UiEvent::Client(ClientEvent::NewMessage { message: msg("n1", "c1", false) }),
            Instant::now(),
        );
        assert!(again.is_empty());
    }

    #[test]
    fn reactions_dedupe_while_in_flight() {
        let mut s = session();
        s.handle(
            UiEvent::Op(OpResult::ConversationsLoaded(Ok(vec![conv("c1", "Alice", 10, false)]))),
            Instant::now(),
        );
        s.handle(
            UiEvent::Op(OpResult::MessagesLoaded {
                conversation_id: "c1".into(),
                result: Ok(vec![msg("m1", "c1", false)]),
            }),
            Instant::now(),
        );
        leader(&mut s);
        press(&mut s, KeyCode::Char('m'), KeyModifiers::NONE);

        let first = typ(&mut s, "r");
        assert_eq!(
            first,
            vec![Command::Op(Operation::SendReaction {
                conversation_id: "c1".into(),
                message_id: "m1".into(),
                emoji: "👍".into()
            })]
        );
        assert!(typ(&mut s, "r").is_empty());
    }

    #[test]
    fn help_toggles_and_escape_closes() {
        let mut s = session();
        typ(&mut s, "?");
        assert!(s.show_help);
        press(&mut s, KeyCode::Esc, KeyModifiers::NONE);
        assert!(!s.show_help);
    }
}
