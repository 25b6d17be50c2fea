/// Modal editor — the single-line compose buffer of the input panel.
///
/// Insert mode behaves like a readline prompt; Normal mode carries a small
/// vim vocabulary (`h l w b e 0 $ x D C i a A I v`, `f`/`F` with `;`/`,`
/// repeat, and `d`/`c` + motion). Multi-line text composed in the external
/// editor is held as a separate draft and shown as a one-line preview.
///
/// No I/O happens here. Every key either edits the buffer or yields an
/// [`EditorIntent`] for the session loop to act on.
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::keys::{is_ctrl, plain_char};

/// Maximum number of characters the inline buffer accepts.
pub const MAX_CHARS: usize = 5000;

/// Preview of a multi-line draft keeps this many characters of its first line.
const PREVIEW_CHARS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditorMode {
    #[default]
    Insert,
    Normal,
}

impl EditorMode {
    pub fn tag(self) -> &'static str {
        match self {
            EditorMode::Insert => "[I]",
            EditorMode::Normal => "[N]",
        }
    }
}

/// A Normal-mode command waiting for exactly one more key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    FindForward,
    FindBackward,
    Change,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindDirection {
    Forward,
    Backward,
}

impl FindDirection {
    fn reversed(self) -> Self {
        match self {
            FindDirection::Forward => FindDirection::Backward,
            FindDirection::Backward => FindDirection::Forward,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastFind {
    pub ch: char,
    pub dir: FindDirection,
}

/// What a keystroke asks the outside world to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorIntent {
    None,
    /// Submit this text to the active conversation.
    Send(String),
    /// A send is already outstanding; the submit was refused.
    SendBlocked,
    /// Open the external editor pre-filled with this text.
    OpenExternal(String),
}

/// Text taken out of the editor by the last submit, kept until the send resolves.
#[derive(Debug, Clone)]
struct Outgoing {
    text: String,
    from_draft: bool,
}

#[derive(Debug, Default)]
pub struct EditorBuffer {
    text: String,
    /// Byte offset into `text`, always on a char boundary, `0..=text.len()`.
    cursor: usize,
    mode: EditorMode,
    pending: Option<PendingAction>,
    last_find: Option<LastFind>,
    draft: Option<String>,
    sending: bool,
    outgoing: Option<Outgoing>,
    focused: bool,
}

impl EditorBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn mode(&self) -> EditorMode {
        self.mode
    }

    pub fn pending(&self) -> Option<PendingAction> {
        self.pending
    }

    pub fn last_find(&self) -> Option<LastFind> {
        self.last_find
    }

    pub fn draft(&self) -> Option<&str> {
        self.draft.as_deref()
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// True when a bare letter key should be treated as text, not a command.
    /// A pending `f`/`F`/`d`/`c` claims the next key as its argument.
    pub fn is_typing(&self) -> bool {
        self.focused
            && (self.mode == EditorMode::Insert || !self.text.is_empty() || self.pending.is_some())
    }

    /// Focus changes reset the mode: gaining focus always starts in Insert.
    pub fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
        self.pending = None;
        if focused {
            self.mode = EditorMode::Insert;
        }
    }

    /// Install text composed in the external editor.
    ///
    /// Multi-line text becomes the draft and the buffer shows a preview of it;
    /// single-line text goes straight into the buffer.
    pub fn set_draft(&mut self, value: String) {
        self.pending = None;
        if value.contains('\n') {
            self.text = draft_preview(&value);
            self.draft = Some(value);
        } else {
            self.text = value;
            self.draft = None;
        }
        self.cursor = self.text.len();
    }

    /// Empty the buffer and drop any draft.
    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
        self.draft = None;
    }

    /// The content the external editor should open with.
    pub fn compose_seed(&self) -> String {
        match &self.draft {
            Some(d) if !d.is_empty() => d.clone(),
            _ => self.text.clone(),
        }
    }

    // ── Submit / send lifecycle ──────────────────────────────────────────────

    /// Take the outgoing text: the draft verbatim if present, else the trimmed buffer.
    pub fn submit(&mut self) -> EditorIntent {
        if self.sending {
            return EditorIntent::SendBlocked;
        }
        let (content, from_draft) = match &self.draft {
            Some(d) if !d.trim().is_empty() => (d.clone(), true),
            _ => (self.text.trim().to_string(), false),
        };
        if content.is_empty() {
            return EditorIntent::None;
        }
        self.clear();
        self.pending = None;
        self.sending = true;
        self.outgoing = Some(Outgoing {
            text: content.clone(),
            from_draft,
        });
        EditorIntent::Send(content)
    }

    pub fn send_succeeded(&mut self) {
        self.sending = false;
        self.outgoing = None;
    }

    /// Clear the sending flag and put the unsent text back, unless the user
    /// has started a new message in the meantime.
    pub fn send_failed(&mut self) {
        self.sending = false;
        let Some(out) = self.outgoing.take() else {
            return;
        };
        if !self.text.is_empty() || self.draft.is_some() {
            return;
        }
        if out.from_draft {
            self.set_draft(out.text);
        } else {
            self.text = out.text;
            self.cursor = self.text.len();
        }
    }

    // ── Key handling ─────────────────────────────────────────────────────────

    pub fn handle_key(&mut self, key: &KeyEvent) -> EditorIntent {
        let intent = match self.mode {
            EditorMode::Insert => self.handle_insert(key),
            EditorMode::Normal => match self.pending {
                Some(action) => {
                    self.handle_pending(action, key);
                    EditorIntent::None
                }
                None => self.handle_normal(key),
            },
        };
        self.cursor = clamp_boundary(&self.text, self.cursor);
        intent
    }

    fn handle_insert(&mut self, key: &KeyEvent) -> EditorIntent {
        if is_ctrl(key, 'e') {
            return EditorIntent::OpenExternal(self.compose_seed());
        }
        if is_ctrl(key, 'w') {
            let start = word_left(&self.text, self.cursor);
            self.delete_range(start, self.cursor);
            return EditorIntent::None;
        }
        if is_ctrl(key, 'u') {
            self.delete_range(0, self.cursor);
            return EditorIntent::None;
        }
        if is_ctrl(key, 'k') {
            self.delete_range(self.cursor, self.text.len());
            return EditorIntent::None;
        }
        if is_ctrl(key, 'a') {
            self.cursor = 0;
            return EditorIntent::None;
        }

        match key.code {
            KeyCode::Esc => {
                self.mode = EditorMode::Normal;
            }
            KeyCode::Enter => return self.submit(),
            KeyCode::Backspace => {
                let prev = prev_char_boundary(&self.text, self.cursor);
                self.delete_range(prev, self.cursor);
            }
            KeyCode::Delete => {
                let next = next_char_boundary(&self.text, self.cursor);
                self.delete_range(self.cursor, next);
            }
            KeyCode::Left if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.cursor = word_left(&self.text, self.cursor);
            }
            KeyCode::Right if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.cursor = next_word_start(&self.text, self.cursor);
            }
            KeyCode::Left => self.cursor = prev_char_boundary(&self.text, self.cursor),
            KeyCode::Right => self.cursor = next_char_boundary(&self.text, self.cursor),
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = self.text.len(),
            _ => {
                if let Some(c) = plain_char(key) {
                    self.insert_char(c);
                }
            }
        }
        EditorIntent::None
    }

    fn handle_normal(&mut self, key: &KeyEvent) -> EditorIntent {
        match key.code {
            KeyCode::Enter => return self.submit(),
            KeyCode::Esc => {
                self.pending = None;
                return EditorIntent::None;
            }
            KeyCode::Left => {
                self.cursor = prev_char_boundary(&self.text, self.cursor);
                return EditorIntent::None;
            }
            KeyCode::Right => {
                self.cursor = next_char_boundary(&self.text, self.cursor);
                return EditorIntent::None;
            }
            _ => {}
        }
        let Some(c) = plain_char(key) else {
            return EditorIntent::None;
        };

        match c {
            'i' => self.mode = EditorMode::Insert,
            'a' => {
                self.cursor = next_char_boundary(&self.text, self.cursor);
                self.mode = EditorMode::Insert;
            }
            'A' => {
                self.cursor = self.text.len();
                self.mode = EditorMode::Insert;
            }
            'I' => {
                self.cursor = 0;
                self.mode = EditorMode::Insert;
            }
            'v' => return EditorIntent::OpenExternal(self.compose_seed()),
            'd' => self.pending = Some(PendingAction::Delete),
            'c' => self.pending = Some(PendingAction::Change),
            'f' => self.pending = Some(PendingAction::FindForward),
            'F' => self.pending = Some(PendingAction::FindBackward),
            'D' => self.delete_range(self.cursor, self.text.len()),
            'C' => {
                self.delete_range(self.cursor, self.text.len());
                self.mode = EditorMode::Insert;
            }
            ';' => {
                if let Some(last) = self.last_find {
                    self.find(last.ch, last.dir);
                }
            }
            ',' => {
                if let Some(last) = self.last_find {
                    self.find(last.ch, last.dir.reversed());
                }
            }
            '0' => self.cursor = 0,
            '$' => self.cursor = self.text.len(),
            'h' => self.cursor = prev_char_boundary(&self.text, self.cursor),
            'l' => self.cursor = next_char_boundary(&self.text, self.cursor),
            'w' => self.cursor = next_word_start(&self.text, self.cursor),
            'b' => self.cursor = word_left(&self.text, self.cursor),
            'e' => self.cursor = word_end(&self.text, self.cursor),
            'x' => {
                let next = next_char_boundary(&self.text, self.cursor);
                self.delete_range(self.cursor, next);
            }
            _ => {}
        }
        EditorIntent::None
    }

    /// The argument key of a pending command. Always clears the pending state.
    fn handle_pending(&mut self, action: PendingAction, key: &KeyEvent) {
        self.pending = None;
        if key.code == KeyCode::Esc {
            return;
        }
        let Some(c) = plain_char(key) else {
            return;
        };

        match action {
            PendingAction::FindForward | PendingAction::FindBackward => {
                let dir = if action == PendingAction::FindForward {
                    FindDirection::Forward
                } else {
                    FindDirection::Backward
                };
                // Recorded even when nothing matches, so `;` retries the same search
                self.last_find = Some(LastFind { ch: c, dir });
                self.find(c, dir);
            }
            PendingAction::Change | PendingAction::Delete => {
                let same_key = match action {
                    PendingAction::Change => 'c',
                    _ => 'd',
                };
                let applied = match c {
                    'w' | 'e' => {
                        let end = delete_word_end(&self.text, self.cursor);
                        self.delete_range(self.cursor, end);
                        true
                    }
                    '$' => {
                        self.delete_range(self.cursor, self.text.len());
                        true
                    }
                    '0' => {
                        self.delete_range(0, self.cursor);
                        true
                    }
                    k if k == same_key => {
                        self.clear();
                        true
                    }
                    _ => false,
                };
                if applied && action == PendingAction::Change {
                    self.mode = EditorMode::Insert;
                }
            }
        }
    }

    // ── Edits ────────────────────────────────────────────────────────────────

    fn insert_char(&mut self, c: char) {
        if self.text.chars().count() >= MAX_CHARS {
            return;
        }
        self.text.insert(self.cursor, c);
        self.cursor += c.len_utf8();
    }

    /// Remove `start..end` (byte offsets on char boundaries) and park the cursor at `start`.
    fn delete_range(&mut self, start: usize, end: usize) {
        let end = end.min(self.text.len());
        if start >= end {
            return;
        }
        self.text.drain(start..end);
        self.cursor = start;
        if self.text.is_empty() {
            self.draft = None;
        }
    }

    fn find(&mut self, ch: char, dir: FindDirection) {
        let hit = match dir {
            FindDirection::Forward => {
                let from = next_char_boundary(&self.text, self.cursor);
                self.text[from..].find(ch).map(|i| from + i)
            }
            FindDirection::Backward => self.text[..self.cursor].rfind(ch),
        };
        if let Some(pos) = hit {
            self.cursor = pos;
        }
    }
}

/// One-line stand-in for a multi-line draft: `first line... [+N lines]`.
pub fn draft_preview(value: &str) -> String {
    let mut lines = value.split('\n');
    let first = lines.next().unwrap_or_default();
    let extra = lines.count();
    let mut preview: String = first.chars().take(PREVIEW_CHARS).collect();
    if first.chars().count() > PREVIEW_CHARS {
        preview.push_str("...");
    }
    format!("{preview} [+{extra} lines]")
}

// ── Cursor arithmetic (byte offsets, char-boundary safe) ─────────────────────

fn clamp_boundary(s: &str, pos: usize) -> usize {
    let mut p = pos.min(s.len());
    while !s.is_char_boundary(p) {
        p -= 1;
    }
    p
}

fn prev_char_boundary(s: &str, pos: usize) -> usize {
    if pos == 0 {
        return 0;
    }
    let mut p = pos - 1;
    while !s.is_char_boundary(p) {
        p -= 1;
    }
    p
}

fn next_char_boundary(s: &str, pos: usize) -> usize {
    if pos >= s.len() {
        return s.len();
    }
    let mut p = pos + 1;
    while p < s.len() && !s.is_char_boundary(p) {
        p += 1;
    }
    p
}

fn is_space(s: &str, pos: usize) -> bool {
    s.as_bytes().get(pos) == Some(&b' ')
}

/// Start of the previous word: skip spaces to the left, then the word.
fn word_left(s: &str, mut pos: usize) -> usize {
    while pos > 0 && is_space(s, pos - 1) {
        pos -= 1;
    }
    while pos > 0 && !is_space(s, pos - 1) {
        pos = prev_char_boundary(s, pos);
    }
    pos
}

/// Start of the next word: skip the rest of this word, then spaces.
fn next_word_start(s: &str, mut pos: usize) -> usize {
    while pos < s.len() && !is_space(s, pos) {
        pos = next_char_boundary(s, pos);
    }
    while pos < s.len() && is_space(s, pos) {
        pos += 1;
    }
    pos
}

/// Last character of the current or next word.
fn word_end(s: &str, mut pos: usize) -> usize {
    if pos < s.len() {
        pos = next_char_boundary(s, pos);
    }
    while pos < s.len() && is_space(s, pos) {
        pos += 1;
    }
    while pos < s.len() && !is_space(s, pos) {
        pos = next_char_boundary(s, pos);
    }
    if pos > 0 && (pos >= s.len() || is_space(s, pos)) {
        pos = prev_char_boundary(s, pos);
    }
    pos
}

/// End of the span `dw`/`cw` removes: the word at the cursor plus trailing spaces.
fn delete_word_end(s: &str, pos: usize) -> usize {
    next_word_start(s, pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    fn code(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn feed(ed: &mut EditorBuffer, keys: &str) -> EditorIntent {
        let mut last = EditorIntent::None;
        for c in keys.chars() {
            last = ed.handle_key(&key(c));
        }
        last
    }

    /// Buffer holding `text` in Normal mode with the cursor at `cursor`.
    fn normal(text: &str, cursor: usize) -> EditorBuffer {
        let mut ed = EditorBuffer::new();
        ed.set_focused(true);
        feed(&mut ed, text);
        ed.handle_key(&code(KeyCode::Esc));
        ed.cursor = cursor;
        ed
    }

    #[test]
    fn starts_in_insert_and_types() {
        let mut ed = EditorBuffer::new();
        ed.set_focused(true);
        feed(&mut ed, "hi there");
        assert_eq!(ed.text(), "hi there");
        assert_eq!(ed.cursor(), 8);
        assert_eq!(ed.mode(), EditorMode::Insert);
        ed.handle_key(&code(KeyCode::Esc));
        assert_eq!(ed.mode(), EditorMode::Normal);
    }

    #[test]
    fn dw_deletes_word_and_trailing_space() {
        let mut ed = normal("hello world", 0);
        feed(&mut ed, "dw");
        assert_eq!(ed.text(), "world");
        assert_eq!(ed.cursor(), 0);
        assert_eq!(ed.pending(), None);
        assert_eq!(ed.mode(), EditorMode::Normal);
    }

    #[test]
    fn dd_and_cc_empty_the_buffer() {
        let mut ed = normal("some text here", 5);
        feed(&mut ed, "dd");
        assert_eq!(ed.text(), "");
        assert_eq!(ed.mode(), EditorMode::Normal);

        let mut ed = normal("some text here", 5);
        feed(&mut ed, "cc");
        assert_eq!(ed.text(), "");
        assert_eq!(ed.cursor(), 0);
        assert_eq!(ed.mode(), EditorMode::Insert);
    }

    #[test]
    fn unknown_motion_aborts_pending_without_edit() {
        let mut ed = normal("hello world", 3);
        feed(&mut ed, "dz");
        assert_eq!(ed.text(), "hello world");
        assert_eq!(ed.cursor(), 3);
        assert_eq!(ed.pending(), None);

        // Next key is a plain command again, not a motion
        feed(&mut ed, "x");
        assert_eq!(ed.text(), "helo world");
    }

    #[test]
    fn escape_cancels_pending() {
        let mut ed = normal("abc", 0);
        feed(&mut ed, "c");
        assert_eq!(ed.pending(), Some(PendingAction::Change));
        ed.handle_key(&code(KeyCode::Esc));
        assert_eq!(ed.pending(), None);
        assert_eq!(ed.mode(), EditorMode::Normal);
        assert_eq!(ed.text(), "abc");
    }

    #[test]
    fn change_motions_enter_insert() {
        let mut ed = normal("hello big world", 6);
        feed(&mut ed, "cw");
        assert_eq!(ed.text(), "hello world");
        assert_eq!(ed.mode(), EditorMode::Insert);

        let mut ed = normal("hello world", 5);
        feed(&mut ed, "c$");
        assert_eq!(ed.text(), "hello");
        assert_eq!(ed.mode(), EditorMode::Insert);

        let mut ed = normal("hello world", 6);
        feed(&mut ed, "d0");
        assert_eq!(ed.text(), "world");
        assert_eq!(ed.cursor(), 0);
    }

    #[test]
    fn find_and_repeat() {
        let mut ed = normal("a-b-c-d", 0);
        feed(&mut ed, "f-");
        assert_eq!(ed.cursor(), 1);
        feed(&mut ed, ";");
        assert_eq!(ed.cursor(), 3);
        feed(&mut ed, ";");
        assert_eq!(ed.cursor(), 5);
        feed(&mut ed, ",");
        assert_eq!(ed.cursor(), 3);
        feed(&mut ed, "Fa");
        assert_eq!(ed.cursor(), 0);
        assert_eq!(
            ed.last_find(),
            Some(LastFind { ch: 'a', dir: FindDirection::Backward })
        );
    }

    #[test]
    fn failed_find_keeps_cursor_and_records_search() {
        let mut ed = normal("x-y", 0);
        feed(&mut ed, "f-");
        assert_eq!(ed.cursor(), 1);
        feed(&mut ed, "fz");
        assert_eq!(ed.cursor(), 1);
        assert_eq!(ed.last_find(), Some(LastFind { ch: 'z', dir: FindDirection::Forward }));
        // `,` searches backwards for the recorded char, still no match
        feed(&mut ed, ",");
        assert_eq!(ed.cursor(), 1);
    }

    #[test]
    fn motions_follow_words() {
        let mut ed = normal("one two  three", 0);
        feed(&mut ed, "w");
        assert_eq!(ed.cursor(), 4);
        feed(&mut ed, "e");
        assert_eq!(ed.cursor(), 6);
        feed(&mut ed, "w");
        assert_eq!(ed.cursor(), 9);
        feed(&mut ed, "b");
        assert_eq!(ed.cursor(), 4);
        feed(&mut ed, "$");
        assert_eq!(ed.cursor(), 14);
        feed(&mut ed, "0");
        assert_eq!(ed.cursor(), 0);
    }

    #[test]
    fn cursor_stays_in_bounds_for_any_motion_sequence() {
        let motions = ['h', 'l', 'w', 'b', 'e', '0', '$', 'x', ';', ','];
        for text in ["", "a", "hello world", "  spaced  out  ", "héllo wörld ✓"] {
            for (i, first) in motions.iter().enumerate() {
                let mut ed = normal(text, 0);
                ed.last_find = Some(LastFind { ch: 'o', dir: FindDirection::Forward });
                for step in 0..40 {
                    let m = motions[(i + step * 7) % motions.len()];
                    let k = if step == 0 { *first } else { m };
                    ed.handle_key(&key(k));
                    assert!(ed.cursor() <= ed.text().len());
                    assert!(ed.text().is_char_boundary(ed.cursor()));
                }
            }
        }
    }

    #[test]
    fn empty_buffer_operations_are_noops() {
        let mut ed = normal("", 0);
        for k in "hlwbe0$xDdwdd".chars() {
            ed.handle_key(&key(k));
        }
        assert_eq!(ed.text(), "");
        assert_eq!(ed.cursor(), 0);
    }

    #[test]
    fn insert_positions() {
        let mut ed = normal("abc", 1);
        feed(&mut ed, "a");
        assert_eq!(ed.cursor(), 2);
        let mut ed = normal("abc", 1);
        feed(&mut ed, "A");
        assert_eq!(ed.cursor(), 3);
        let mut ed = normal("abc", 1);
        feed(&mut ed, "I");
        assert_eq!(ed.cursor(), 0);
        assert_eq!(ed.mode(), EditorMode::Insert);
    }

    #[test]
    fn insert_mode_editing_keys() {
        let mut ed = EditorBuffer::new();
        ed.set_focused(true);
        feed(&mut ed, "hello big world");
        ed.handle_key(&ctrl('w'));
        assert_eq!(ed.text(), "hello big ");
        ed.handle_key(&code(KeyCode::Backspace));
        assert_eq!(ed.text(), "hello big");
        ed.handle_key(&code(KeyCode::Home));
        ed.handle_key(&code(KeyCode::Delete));
        assert_eq!(ed.text(), "ello big");
        ed.handle_key(&code(KeyCode::End));
        ed.handle_key(&ctrl('u'));
        assert_eq!(ed.text(), "");
    }

    #[test]
    fn enter_sends_trimmed_text_and_sets_sending() {
        let mut ed = EditorBuffer::new();
        ed.set_focused(true);
        feed(&mut ed, "  hi  ");
        let intent = ed.handle_key(&code(KeyCode::Enter));
        assert_eq!(intent, EditorIntent::Send("hi".into()));
        assert!(ed.is_sending());
        assert_eq!(ed.text(), "");

        feed(&mut ed, "again");
        assert_eq!(ed.handle_key(&code(KeyCode::Enter)), EditorIntent::SendBlocked);
        assert_eq!(ed.text(), "again");
    }

    #[test]
    fn blank_buffer_does_not_send() {
        let mut ed = EditorBuffer::new();
        ed.set_focused(true);
        feed(&mut ed, "   ");
        assert_eq!(ed.handle_key(&code(KeyCode::Enter)), EditorIntent::None);
        assert!(!ed.is_sending());
    }

    #[test]
    fn multiline_draft_is_sent_verbatim() {
        let body = "first line of a long message here\nsecond\nthird".to_string();
        let mut ed = EditorBuffer::new();
        ed.set_focused(true);
        ed.set_draft(body.clone());
        assert_eq!(ed.text(), "first line of a long message h... [+2 lines]");
        let intent = ed.handle_key(&code(KeyCode::Enter));
        assert_eq!(intent, EditorIntent::Send(body));
        assert_eq!(ed.draft(), None);
    }

    #[test]
    fn single_line_editor_result_lands_in_buffer() {
        let mut ed = EditorBuffer::new();
        ed.set_draft("short".into());
        assert_eq!(ed.text(), "short");
        assert_eq!(ed.draft(), None);
        assert_eq!(ed.cursor(), 5);
    }

    #[test]
    fn failed_send_restores_text() {
        let mut ed = EditorBuffer::new();
        ed.set_focused(true);
        feed(&mut ed, "retry me");
        ed.handle_key(&code(KeyCode::Enter));
        ed.send_failed();
        assert!(!ed.is_sending());
        assert_eq!(ed.text(), "retry me");

        ed.set_draft("a\nb".into());
        ed.handle_key(&code(KeyCode::Enter));
        ed.send_failed();
        assert_eq!(ed.draft(), Some("a\nb"));
    }

    #[test]
    fn successful_send_forgets_text() {
        let mut ed = EditorBuffer::new();
        ed.set_focused(true);
        feed(&mut ed, "done");
        ed.handle_key(&code(KeyCode::Enter));
        ed.send_succeeded();
        ed.send_failed();
        assert_eq!(ed.text(), "");
    }

    #[test]
    fn v_and_ctrl_e_request_external_editor() {
        let mut ed = normal("seed", 0);
        assert_eq!(feed(&mut ed, "v"), EditorIntent::OpenExternal("seed".into()));
        ed.set_draft("x\ny".into());
        ed.set_focused(true);
        assert_eq!(ed.handle_key(&ctrl('e')), EditorIntent::OpenExternal("x\ny".into()));
    }

    #[test]
    fn focus_resets_to_insert() {
        let mut ed = normal("abc", 0);
        feed(&mut ed, "d");
        ed.set_focused(false);
        ed.set_focused(true);
        assert_eq!(ed.mode(), EditorMode::Insert);
        assert_eq!(ed.pending(), None);
    }

    #[test]
    fn char_limit_is_enforced() {
        let mut ed = EditorBuffer::new();
        ed.set_focused(true);
        for _ in 0..MAX_CHARS + 10 {
            ed.handle_key(&key('a'));
        }
        assert_eq!(ed.text().chars().count(), MAX_CHARS);
    }

    #[test]
    fn typing_state_drives_quit_suppression() {
        let mut ed = EditorBuffer::new();
        assert!(!ed.is_typing());
        ed.set_focused(true);
        assert!(ed.is_typing());
        ed.handle_key(&code(KeyCode::Esc));
        assert!(!ed.is_typing());
        ed.handle_key(&key('f'));
        assert!(ed.is_typing());
        ed.handle_key(&key('q'));
        assert_eq!(ed.pending(), None);
        assert!(!ed.is_typing());
    }
}
