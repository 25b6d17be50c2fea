/// Conversation list panel: selection, `gg`/`G`, and `/` fuzzy search.
use chrono::{DateTime, Utc};
use crossterm::event::{KeyCode, KeyEvent};

use crate::client::Conversation;
use crate::keys::{is_ctrl, plain_char};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListIntent {
    None,
    /// The highlight moved onto this conversation.
    Preview(String),
    /// Enter: make this the conversation we send to.
    Activate { id: String, name: String },
}

#[derive(Debug)]
pub struct ConversationList {
    items: Vec<Conversation>,
    /// Index into the filtered view.
    selected: usize,
    offset: usize,
    searching: bool,
    query: String,
    pending_g: bool,
    /// How many entries fit on screen; kept current by the renderer.
    viewport: usize,
}

impl Default for ConversationList {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            selected: 0,
            offset: 0,
            searching: false,
            query: String::new(),
            pending_g: false,
            viewport: 10,
        }
    }
}

impl ConversationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list, keeping the highlight on the same conversation if it survived.
    pub fn set_conversations(&mut self, items: Vec<Conversation>) {
        let keep = self.selected_id();
        self.items = items;
        let pos = keep.and_then(|id| self.visible().iter().position(|c| c.id == id));
        self.selected = pos.unwrap_or(0);
        self.scroll_into_view();
    }

    pub fn set_viewport(&mut self, rows: usize) {
        self.viewport = rows.max(1);
        self.scroll_into_view();
    }

    pub fn is_searching(&self) -> bool {
        self.searching
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Conversations currently shown: all of them, or the search matches best-first.
    pub fn visible(&self) -> Vec<&Conversation> {
        if self.query.is_empty() {
            return self.items.iter().collect();
        }
        let mut scored: Vec<(i32, &Conversation)> = self
            .items
            .iter()
            .filter_map(|c| fuzzy_score(&self.query, &c.name).map(|s| (s, c)))
            .collect();
        // sort_by is stable: equal scores keep list order
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().map(|(_, c)| c).collect()
    }

    pub fn selected_conversation(&self) -> Option<&Conversation> {
        self.visible().get(self.selected).copied()
    }

    fn selected_id(&self) -> Option<String> {
        self.selected_conversation().map(|c| c.id.clone())
    }

    pub fn handle_key(&mut self, key: &KeyEvent) -> ListIntent {
        let before = self.selected_id();

        if self.searching {
            self.handle_search_key(key);
        } else if let Some(intent) = self.handle_nav_key(key) {
            return intent;
        }

        let after = self.selected_id();
        match after {
            Some(id) if before.as_ref() != Some(&id) => ListIntent::Preview(id),
            _ => ListIntent::None,
        }
    }

    /// Returns Some only for intents other than a highlight move.
    fn handle_nav_key(&mut self, key: &KeyEvent) -> Option<ListIntent> {
        let c = plain_char(key);
        if c == Some('g') {
            if self.pending_g {
                self.pending_g = false;
                self.selected = 0;
                self.offset = 0;
            } else {
                self.pending_g = true;
            }
            return None;
        }
        self.pending_g = false;

        let count = self.visible().len();
        match (key.code, c) {
            (KeyCode::Up, _) | (_, Some('k')) => {
                self.selected = self.selected.saturating_sub(1);
            }
            (KeyCode::Down, _) | (_, Some('j')) => {
                if self.selected + 1 < count {
                    self.selected += 1;
                }
            }
            (KeyCode::End, _) | (_, Some('G')) => {
                self.selected = count.saturating_sub(1);
            }
            (KeyCode::Home, _) => self.selected = 0,
            (_, Some('/')) => {
                self.searching = true;
                self.query.clear();
            }
            (KeyCode::Enter, _) => {
                return self.selected_conversation().map(|c| ListIntent::Activate {
                    id: c.id.clone(),
                    name: c.name.clone(),
                });
            }
            _ => {}
        }
        self.scroll_into_view();
        None
    }

    fn handle_search_key(&mut self, key: &KeyEvent) {
        if is_ctrl(key, 'u') {
            self.query.clear();
            self.reset_selection();
            return;
        }
        if is_ctrl(key, 'w') {
            let trimmed = self.query.trim_end_matches(' ');
            let start = trimmed.rfind(' ').map(|i| i + 1).unwrap_or(0);
            self.query.truncate(start);
            self.reset_selection();
            return;
        }
        match key.code {
            KeyCode::Esc => {
                self.searching = false;
                self.query.clear();
                self.reset_selection();
            }
            // Leave search but keep the filter and the highlighted match
            KeyCode::Enter => self.searching = false,
            KeyCode::Backspace => {
                if self.query.pop().is_some() {
                    self.reset_selection();
                }
            }
            KeyCode::Up => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down => {
                if self.selected + 1 < self.visible().len() {
                    self.selected += 1;
                }
            }
            _ => {
                if let Some(c) = plain_char(key) {
                    self.query.push(c);
                    self.reset_selection();
                }
            }
        }
        self.scroll_into_view();
    }

    fn reset_selection(&mut self) {
        self.selected = 0;
        self.offset = 0;
    }

    fn scroll_into_view(&mut self) {
        if self.selected < self.offset {
            self.offset = self.selected;
        } else if self.selected >= self.offset + self.viewport {
            self.offset = self.selected + 1 - self.viewport;
        }
    }
}

// ── Fuzzy ranking ─────────────────────────────────────────────────────────────

/// Ceiling for scattered matches, below any contiguous substring.
const SCATTERED_MAX: i32 = 499;

/// Score `target` against `query`, case-insensitively. `None` means no match.
///
/// A contiguous substring always outranks a scattered match, and a prefix
/// outranks an inner substring. Scattered matches earn extra for runs of
/// adjacent characters and for hits at the start of a word.
pub fn fuzzy_score(query: &str, target: &str) -> Option<i32> {
    if query.is_empty() {
        return Some(0);
    }
    let query = query.to_lowercase();
    let target = target.to_lowercase();
    let qlen = query.chars().count() as i32;

    if let Some(idx) = target.find(&query) {
        return Some(if idx == 0 { 1000 + qlen } else { 500 + qlen });
    }

    let mut wanted = query.chars().peekable();
    let mut score = 0;
    let mut consecutive = 0;
    let mut last_match: Option<usize> = None;
    let mut prev: Option<char> = None;

    for (i, tc) in target.chars().enumerate() {
        let Some(&qc) = wanted.peek() else { break };
        if tc == qc {
            score += 10;
            if last_match.is_some_and(|l| l + 1 == i) {
                consecutive += 1;
                score += consecutive * 5;
            } else {
                consecutive = 0;
            }
            if matches!(prev, None | Some(' ' | '-' | '_')) {
                score += 20;
            }
            last_match = Some(i);
            wanted.next();
        }
        prev = Some(tc);
    }

    if wanted.peek().is_some() {
        None
    } else {
        Some(score.min(SCATTERED_MAX))
    }
}

/// Compact age of a timestamp: "now", "5m", "3h", "2d", or "Jan 2".
pub fn relative_time(t: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now.signed_duration_since(t);
    if diff.num_minutes() < 1 {
        "now".to_string()
    } else if diff.num_hours() < 1 {
        format!("{}m", diff.num_minutes())
    } else if diff.num_days() < 1 {
        format!("{}h", diff.num_hours())
    } else if diff.num_days() < 7 {
        format!("{}d", diff.num_days())
    } else {
        t.format("%b %-d").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crossterm::event::KeyModifiers;

    fn conv(id: &str, name: &str) -> Conversation {
        Conversation {
            id: id.into(),
            name: name.into(),
            latest_message: String::new(),
            latest_timestamp: Utc.timestamp_opt(0, 0).unwrap(),
            unread: false,
            is_group: false,
            participants: vec![],
        }
    }

    fn key(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    fn code(c: KeyCode) -> KeyEvent {
        KeyEvent::new(c, KeyModifiers::NONE)
    }

    fn list() -> ConversationList {
        let mut l = ConversationList::new();
        l.set_conversations(vec![
            conv("1", "Alice Smith"),
            conv("2", "Bob Jones"),
            conv("3", "Carol-Ann"),
            conv("4", "Dave"),
        ]);
        l
    }

    #[test]
    fn substring_beats_scattered_and_prefix_beats_inner() {
        let prefix = fuzzy_score("ali", "Alice").unwrap();
        let inner = fuzzy_score("lic", "Alice").unwrap();
        let scattered = fuzzy_score("ace", "Alice").unwrap();
        assert!(prefix > inner);
        assert!(inner > scattered);
        assert_eq!(fuzzy_score("xyz", "Alice"), None);
        assert_eq!(fuzzy_score("", "anything"), Some(0));
    }

    #[test]
    fn long_scattered_query_stays_below_substring() {
        let target = "a b c d e f g h i j k l m n o p q r s t u v w x y z";
        let initials = fuzzy_score("abcdefghijklmnopqrstuvwxyz", target).unwrap();
        let inner = fuzzy_score("b", target).unwrap();
        assert!(initials < 500);
        assert!(inner > initials);
    }

    #[test]
    fn word_boundaries_and_runs_score_higher() {
        // both letters start a word in "carol-nash", only the first does in "cabin"
        let boundary = fuzzy_score("cn", "carol-nash").unwrap();
        let inside = fuzzy_score("cn", "cabin").unwrap();
        assert!(boundary > inside);

        let run = fuzzy_score("abd", "abxd").unwrap();
        let spread = fuzzy_score("abd", "axbxd").unwrap();
        assert!(run > spread);
    }

    #[test]
    fn navigation_and_gg_g() {
        let mut l = list();
        assert_eq!(l.handle_key(&key('j')), ListIntent::Preview("2".into()));
        l.handle_key(&key('G'));
        assert_eq!(l.selected(), 3);
        assert_eq!(l.handle_key(&key('g')), ListIntent::None);
        assert_eq!(l.selected(), 3);
        assert_eq!(l.handle_key(&key('g')), ListIntent::Preview("1".into()));
        assert_eq!(l.selected(), 0);
        // k at the top stays put
        assert_eq!(l.handle_key(&key('k')), ListIntent::None);
    }

    #[test]
    fn g_then_other_key_does_not_jump() {
        let mut l = list();
        l.handle_key(&key('G'));
        l.handle_key(&key('g'));
        l.handle_key(&key('k'));
        l.handle_key(&key('g'));
        assert_eq!(l.selected(), 2);
    }

    #[test]
    fn enter_activates_selection() {
        let mut l = list();
        l.handle_key(&key('j'));
        assert_eq!(
            l.handle_key(&code(KeyCode::Enter)),
            ListIntent::Activate { id: "2".into(), name: "Bob Jones".into() }
        );
    }

    #[test]
    fn search_filters_and_ranks() {
        let mut l = list();
        l.handle_key(&key('/'));
        assert!(l.is_searching());
        for c in "an".chars() {
            l.handle_key(&key(c));
        }
        let names: Vec<&str> = l.visible().iter().map(|c| c.name.as_str()).collect();
        // "Carol-Ann" contains "an"; the others only match scattered or not at all
        assert_eq!(names[0], "Carol-Ann");
        assert!(!names.contains(&"Dave"));

        l.handle_key(&code(KeyCode::Enter));
        assert!(!l.is_searching());
        assert_eq!(l.query(), "an");
        assert_eq!(
            l.handle_key(&code(KeyCode::Enter)),
            ListIntent::Activate { id: "3".into(), name: "Carol-Ann".into() }
        );
    }

    #[test]
    fn search_editing_keys() {
        let mut l = list();
        l.handle_key(&key('/'));
        for c in "bob jo".chars() {
            l.handle_key(&key(c));
        }
        l.handle_key(&KeyEvent::new(KeyCode::Char('w'), KeyModifiers::CONTROL));
        assert_eq!(l.query(), "bob ");
        l.handle_key(&code(KeyCode::Backspace));
        assert_eq!(l.query(), "bob");
        l.handle_key(&KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL));
        assert_eq!(l.query(), "");
        l.handle_key(&key('x'));
        l.handle_key(&code(KeyCode::Esc));
        assert!(!l.is_searching());
        assert_eq!(l.query(), "");
        assert_eq!(l.visible().len(), 4);
    }

    #[test]
    fn equal_scores_keep_list_order() {
        let mut l = ConversationList::new();
        l.set_conversations(vec![conv("1", "Sam A"), conv("2", "Sam B"), conv("3", "Sam C")]);
        l.handle_key(&key('/'));
        for c in "sam".chars() {
            l.handle_key(&key(c));
        }
        let ids: Vec<&str> = l.visible().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3"]);
    }

    #[test]
    fn refresh_keeps_highlight() {
        let mut l = list();
        l.handle_key(&key('j'));
        l.handle_key(&key('j'));
        l.set_conversations(vec![conv("9", "New"), conv("1", "Alice Smith"), conv("3", "Carol-Ann")]);
        assert_eq!(l.selected_conversation().unwrap().id, "3");
    }

    #[test]
    fn viewport_scrolls_with_selection() {
        let mut l = list();
        l.set_viewport(2);
        l.handle_key(&key('G'));
        assert_eq!(l.offset(), 2);
        l.handle_key(&key('g'));
        l.handle_key(&key('g'));
        assert_eq!(l.offset(), 0);
    }

    #[test]
    fn relative_times() {
        let now = Utc.with_ymd_and_hms(2026, 3, 20, 12, 0, 0).unwrap();
        assert_eq!(relative_time(now, now), "now");
        assert_eq!(relative_time(now - chrono::Duration::minutes(5), now), "5m");
        assert_eq!(relative_time(now - chrono::Duration::hours(3), now), "3h");
        assert_eq!(relative_time(now - chrono::Duration::days(2), now), "2d");
        assert_eq!(relative_time(now - chrono::Duration::days(30), now), "Feb 18");
    }
}
