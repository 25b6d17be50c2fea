/// Message detail panel: the messages of one conversation, newest at the bottom.
use crossterm::event::{KeyCode, KeyEvent};
use unicode_width::UnicodeWidthStr;

use crate::client::Message;
use crate::keys::{is_ctrl, plain_char};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailIntent {
    None,
    /// React to this message with the configured emoji.
    React { conversation_id: String, message_id: String },
}

#[derive(Debug)]
pub struct MessageView {
    conversation_id: Option<String>,
    title: String,
    messages: Vec<Message>,
    selected: usize,
    offset: usize,
    pending_g: bool,
    /// Messages that fit on screen; kept current by the renderer.
    viewport: usize,
}

impl Default for MessageView {
    fn default() -> Self {
        Self {
            conversation_id: None,
            title: String::new(),
            messages: Vec::new(),
            selected: 0,
            offset: 0,
            pending_g: false,
            viewport: 8,
        }
    }
}

impl MessageView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn selected_message(&self) -> Option<&Message> {
        self.messages.get(self.selected)
    }

    pub fn set_viewport(&mut self, items: usize) {
        self.viewport = items.max(1);
        self.scroll_into_view();
    }

    /// Show `msgs` for `conversation_id`, scrolled to the newest.
    pub fn set_messages(&mut self, conversation_id: &str, title: &str, msgs: Vec<Message>) {
        let same = self.conversation_id.as_deref() == Some(conversation_id);
        let keep = same.then(|| self.selected_message().map(|m| m.id.clone())).flatten();
        let was_at_bottom = self.selected + 1 >= self.messages.len();

        self.conversation_id = Some(conversation_id.to_string());
        self.title = title.to_string();
        self.messages = msgs;

        // A refresh of the same conversation keeps a highlight the user moved away from the bottom
        let pos = keep
            .filter(|_| !was_at_bottom)
            .and_then(|id| self.messages.iter().position(|m| m.id == id));
        match pos {
            Some(p) => self.selected = p,
            None => self.jump_bottom(),
        }
        self.scroll_into_view();
    }

    /// Append a pushed message if it belongs here and isn't already shown.
    pub fn add_message(&mut self, msg: Message) -> bool {
        if self.conversation_id.as_deref() != Some(msg.conversation_id.as_str()) {
            return false;
        }
        if self.messages.iter().any(|m| m.id == msg.id) {
            return false;
        }
        self.messages.push(msg);
        self.jump_bottom();
        true
    }

    pub fn handle_key(&mut self, key: &KeyEvent) -> DetailIntent {
        let c = plain_char(key);
        if c == Some('g') {
            if self.pending_g {
                self.pending_g = false;
                self.jump_top();
            } else {
                self.pending_g = true;
            }
            return DetailIntent::None;
        }
        self.pending_g = false;

        if is_ctrl(key, 'u') {
            self.page(-1);
            return DetailIntent::None;
        }
        if is_ctrl(key, 'd') {
            self.page(1);
            return DetailIntent::None;
        }

        match (key.code, c) {
            (KeyCode::Up, _) | (_, Some('k')) => {
                self.selected = self.selected.saturating_sub(1);
            }
            (KeyCode::Down, _) | (_, Some('j')) => {
                if self.selected + 1 < self.messages.len() {
                    self.selected += 1;
                }
            }
            (KeyCode::PageUp, _) => self.page(-1),
            (KeyCode::PageDown, _) => self.page(1),
            (KeyCode::Home, _) => self.jump_top(),
            (KeyCode::End, _) | (_, Some('G')) => self.jump_bottom(),
            (_, Some('r')) => {
                if let (Some(conv), Some(msg)) = (&self.conversation_id, self.selected_message()) {
                    return DetailIntent::React {
                        conversation_id: conv.clone(),
                        message_id: msg.id.clone(),
                    };
                }
            }
            _ => {}
        }
        self.scroll_into_view();
        DetailIntent::None
    }

    fn page(&mut self, dir: i32) {
        let step = self.viewport;
        if dir < 0 {
            self.selected = self.selected.saturating_sub(step);
        } else {
            self.selected = (self.selected + step).min(self.messages.len().saturating_sub(1));
        }
        self.scroll_into_view();
    }

    fn jump_top(&mut self) {
        self.selected = 0;
        self.offset = 0;
    }

    fn jump_bottom(&mut self) {
        self.selected = self.messages.len().saturating_sub(1);
        self.offset = self.messages.len().saturating_sub(self.viewport);
    }

    fn scroll_into_view(&mut self) {
        if self.selected < self.offset {
            self.offset = self.selected;
        } else if self.selected >= self.offset + self.viewport {
            self.offset = self.selected + 1 - self.viewport;
        }
    }
}

/// Greedy word wrap by display width. Long words get a line of their own.
/// Explicit newlines in `text` are kept.
pub fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for para in text.split('\n') {
        let mut current = String::new();
        let mut current_width = 0usize;
        for word in para.split_whitespace() {
            let word_width = word.width();
            if current_width == 0 {
                current.push_str(word);
                current_width = word_width;
            } else if current_width + 1 + word_width <= max_width {
                current.push(' ');
                current.push_str(word);
                current_width += 1 + word_width;
            } else {
                lines.push(std::mem::take(&mut current));
                current.push_str(word);
                current_width = word_width;
            }
        }
        lines.push(current);
    }
    lines
}
