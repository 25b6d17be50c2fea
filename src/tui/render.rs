/// Ratatui draw entry-point. Pure function of the session.
use chrono::Utc;
use qrcode::QrCode;
use qrcode::render::unicode;
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};
use unicode_width::UnicodeWidthStr;

use super::detail::wrap_text;
use super::editor::EditorMode;
use super::list::relative_time;
use super::panels::Panel;
use super::session::{Lifecycle, Session};

pub const SPINNER_GLYPHS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

const INPUT_HEIGHT: u16 = 3;

/// (conversation rows, message slots) that fit a `w`×`h` terminal.
/// Each conversation takes two lines; a message at least two.
pub fn viewport_for(_w: u16, h: u16) -> (usize, usize) {
    let content = h.saturating_sub(1);
    let list_rows = content.saturating_sub(3) / 2;
    let detail_items = content.saturating_sub(INPUT_HEIGHT + 2) / 2;
    (list_rows.max(1) as usize, detail_items.max(1) as usize)
}

pub fn draw(f: &mut Frame, s: &Session) {
    let area = f.area();
    match &s.lifecycle {
        Lifecycle::Loading => draw_loading(f, s, area),
        Lifecycle::Pairing { qr_url } => draw_pairing(f, s, qr_url.as_deref(), area),
        Lifecycle::Errored(e) => draw_error(f, e, area),
        Lifecycle::Connected => draw_main(f, s, area),
    }
}

// ── Lifecycle screens ─────────────────────────────────────────────────────────

fn draw_loading(f: &mut Frame, s: &Session, area: Rect) {
    let glyph = SPINNER_GLYPHS[s.spinner_frame % SPINNER_GLYPHS.len()];
    let y = area.height / 2;
    let line = Line::from(vec![
        Span::styled(glyph, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(" Connecting to bridge…"),
    ]);
    f.render_widget(
        Paragraph::new(line).alignment(Alignment::Center),
        Rect { y: area.y + y, height: 1, ..area },
    );
    if !s.status.is_empty() {
        f.render_widget(
            Paragraph::new(Span::styled(s.status.clone(), Style::default().fg(Color::DarkGray)))
                .alignment(Alignment::Center),
            Rect { y: area.y + y + 2, height: 1, ..area },
        );
    }
}

fn qr_lines(url: &str) -> Vec<String> {
    match QrCode::new(url.as_bytes()) {
        Ok(code) => code
            .render::<unicode::Dense1x2>()
            .dark_color(unicode::Dense1x2::Light)
            .light_color(unicode::Dense1x2::Dark)
            .build()
            .lines()
            .map(str::to_string)
            .collect(),
        Err(e) => vec![format!("(cannot draw QR code: {e})"), url.to_string()],
    }
}

fn draw_pairing(f: &mut Frame, s: &Session, qr_url: Option<&str>, area: Rect) {
    let mut lines = vec![
        Line::from(Span::styled(
            "Pair this terminal with your phone",
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        )),
        Line::default(),
    ];
    match qr_url {
        Some(url) => {
            lines.extend(qr_lines(url).into_iter().map(Line::from));
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                "Messages → Device pairing → scan",
                Style::default().fg(Color::DarkGray),
            )));
        }
        None => lines.push(Line::from("Waiting for pairing code…")),
    }
    if !s.status.is_empty() {
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            s.status.clone(),
            Style::default().fg(Color::Yellow),
        )));
    }
    let top = area.height.saturating_sub(lines.len() as u16) / 2;
    f.render_widget(
        Paragraph::new(lines).alignment(Alignment::Center),
        Rect { y: area.y + top, height: area.height - top, ..area },
    );
}

fn draw_error(f: &mut Frame, error: &str, area: Rect) {
    let lines = vec![
        Line::from(Span::styled(
            "✗ Could not start",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        Line::default(),
        Line::from(error.to_string()),
        Line::default(),
        Line::from(Span::styled("q to quit", Style::default().fg(Color::DarkGray))),
    ];
    let top = area.height.saturating_sub(lines.len() as u16) / 2;
    f.render_widget(
        Paragraph::new(lines).alignment(Alignment::Center).wrap(Wrap { trim: true }),
        Rect { y: area.y + top, height: area.height - top, ..area },
    );
}

// ── Connected layout ──────────────────────────────────────────────────────────

fn draw_main(f: &mut Frame, s: &Session, area: Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(area);
    let list_width = (area.width / 4).max(20).min(area.width);
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(list_width), Constraint::Min(0)])
        .split(rows[0]);
    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(INPUT_HEIGHT)])
        .split(cols[1]);

    draw_list(f, s, cols[0]);
    draw_detail(f, s, right[0]);
    draw_input(f, s, right[1]);
    draw_status_bar(f, s, rows[1]);

    if s.show_help {
        draw_help(f, s, area);
    }
}

fn panel_block(s: &Session, panel: Panel, title: String) -> Block<'static> {
    let focused = s.focus.current() == panel;
    let border = if focused { Color::Cyan } else { Color::Rgb(60, 60, 80) };
    let title_style = if focused {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Gray)
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .title(Span::styled(title, title_style))
}

fn draw_list(f: &mut Frame, s: &Session, area: Rect) {
    let block = panel_block(s, Panel::List, format!(" {} ", Panel::List.title()));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let mut lines = Vec::new();
    if s.list.is_searching() || !s.list.query().is_empty() {
        lines.push(Line::from(vec![
            Span::styled("/", Style::default().fg(Color::Yellow)),
            Span::raw(s.list.query().to_string()),
        ]));
    }

    let now = Utc::now();
    let width = inner.width as usize;
    let visible = s.list.visible();
    let active = s.active.as_ref().map(|a| a.id.as_str());
    for (i, conv) in visible.iter().enumerate().skip(s.list.offset()) {
        let highlighted = i == s.list.selected();
        let mut name_style = Style::default().fg(Color::White);
        if conv.unread {
            name_style = name_style.add_modifier(Modifier::BOLD);
        }
        if highlighted {
            name_style = name_style.bg(Color::Rgb(30, 30, 50));
        }
        let marker = if Some(conv.id.as_str()) == active { "▸" } else { " " };
        let dot = if conv.unread { "●" } else { " " };
        let when = relative_time(conv.latest_timestamp, now);
        let name_room = width.saturating_sub(when.width() + 4);
        lines.push(Line::from(vec![
            Span::styled(marker, Style::default().fg(Color::Cyan)),
            Span::styled(dot, Style::default().fg(Color::Green)),
            Span::styled(truncate(&conv.name, name_room), name_style),
            Span::raw(" "),
            Span::styled(when, Style::default().fg(Color::DarkGray)),
        ]));
        lines.push(Line::from(Span::styled(
            format!("  {}", truncate(&conv.latest_message.replace('\n', " "), width.saturating_sub(2))),
            Style::default().fg(Color::DarkGray),
        )));
        if lines.len() >= inner.height as usize {
            break;
        }
    }
    if visible.is_empty() {
        lines.push(Line::from(Span::styled("no conversations", Style::default().fg(Color::DarkGray))));
    }
    f.render_widget(Paragraph::new(lines), inner);
}

fn draw_detail(f: &mut Frame, s: &Session, area: Rect) {
    let title = if s.detail.title().is_empty() {
        format!(" {} ", Panel::Detail.title())
    } else {
        format!(" {} ", s.detail.title())
    };
    let block = panel_block(s, Panel::Detail, title);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let width = inner.width.saturating_sub(2).max(1) as usize;
    let mut lines = Vec::new();
    for (i, m) in s.detail.messages().iter().enumerate().skip(s.detail.offset()) {
        let highlighted = i == s.detail.selected() && s.focus.current() == Panel::Detail;
        let who = if m.is_from_me { "me".to_string() } else { m.sender_name.clone() };
        let who_color = if m.is_from_me { Color::Cyan } else { Color::Rgb(140, 120, 220) };
        let mut header = vec![
            Span::styled(
                if highlighted { "▌" } else { " " },
                Style::default().fg(Color::Yellow),
            ),
            Span::styled(who, Style::default().fg(who_color).add_modifier(Modifier::BOLD)),
            Span::styled(
                format!("  {}", m.timestamp.with_timezone(&chrono::Local).format("%H:%M")),
                Style::default().fg(Color::DarkGray),
            ),
        ];
        if m.is_from_me {
            header.push(Span::styled(
                format!(" {}", m.status.glyph()),
                Style::default().fg(Color::DarkGray),
            ));
        }
        if !m.reactions.is_empty() {
            header.push(Span::raw(format!("  {}", m.reactions.join(""))));
        }
        lines.push(Line::from(header));
        for l in wrap_text(&m.content, width) {
            lines.push(Line::from(format!("  {l}")));
        }
        if lines.len() >= inner.height as usize {
            break;
        }
    }
    if s.detail.conversation_id().is_none() {
        lines.push(Line::from(Span::styled(
            "Pick a conversation on the left",
            Style::default().fg(Color::DarkGray),
        )));
    }
    f.render_widget(Paragraph::new(lines), inner);
}

fn draw_input(f: &mut Frame, s: &Session, area: Rect) {
    let title = match &s.active {
        Some(a) => format!(" {} → {} ", Panel::Input.title(), a.name),
        None => format!(" {} ", Panel::Input.title()),
    };
    let block = panel_block(s, Panel::Input, title);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let focused = s.focus.current() == Panel::Input;
    let mode_color = match s.editor.mode() {
        EditorMode::Insert => Color::Green,
        EditorMode::Normal => Color::Yellow,
    };
    let tag = format!("[{}] ", s.editor.mode().tag());
    let content = if s.editor.is_sending() {
        let glyph = SPINNER_GLYPHS[s.spinner_frame % SPINNER_GLYPHS.len()];
        Span::styled(format!("{glyph} sending…"), Style::default().fg(Color::DarkGray))
    } else if s.editor.text().is_empty() && !focused {
        Span::styled("message · v / C-e for editor", Style::default().fg(Color::Rgb(70, 70, 90)))
    } else {
        Span::styled(s.editor.text().to_string(), Style::default().fg(Color::White))
    };
    let line = Line::from(vec![
        Span::styled(tag.clone(), Style::default().fg(mode_color).add_modifier(Modifier::BOLD)),
        content,
    ]);
    f.render_widget(Paragraph::new(line), inner);

    if focused && !s.editor.is_sending() {
        let text = s.editor.text();
        let before = &text[..s.editor.cursor().min(text.len())];
        let x = inner.x + tag.width() as u16 + before.width() as u16;
        if x < inner.x + inner.width {
            f.set_cursor_position((x, inner.y));
        }
    }
}

fn draw_status_bar(f: &mut Frame, s: &Session, area: Rect) {
    let (glyph, color) = if s.focus.leader_pending() {
        ("◆", Color::Yellow)
    } else if s.editor.is_sending() {
        (SPINNER_GLYPHS[s.spinner_frame % SPINNER_GLYPHS.len()], Color::Cyan)
    } else {
        ("▲", Color::White)
    };
    let line = Line::from(vec![
        Span::raw(" "),
        Span::styled(glyph, Style::default().fg(color).add_modifier(Modifier::BOLD)),
        Span::styled(" chatterm", Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        Span::styled("  ·  ", Style::default().fg(Color::DarkGray)),
        Span::styled(s.focus.current().title(), Style::default().fg(Color::Cyan)),
        Span::raw("  "),
        Span::styled(s.status.clone(), Style::default().fg(Color::Rgb(200, 200, 120))),
        Span::styled(
            format!("  {} help", s.keymap.help.label()),
            Style::default().fg(Color::Rgb(55, 50, 90)),
        ),
    ]);
    f.render_widget(
        Paragraph::new(line).style(Style::default().bg(Color::Rgb(10, 10, 18))),
        area,
    );
}

fn draw_help(f: &mut Frame, s: &Session, area: Rect) {
    let rows = s.keymap.help_rows();
    let key_width = rows.iter().map(|(k, _)| k.width()).max().unwrap_or(0);
    let lines: Vec<Line> = rows
        .into_iter()
        .map(|(keys, what)| {
            Line::from(vec![
                Span::styled(
                    format!(" {keys:<key_width$}  "),
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                ),
                Span::raw(what),
            ])
        })
        .collect();

    let w = (key_width as u16 + 40).min(area.width);
    let h = (lines.len() as u16 + 2).min(area.height);
    let popup = Rect {
        x: area.x + area.width.saturating_sub(w) / 2,
        y: area.y + area.height.saturating_sub(h) / 2,
        width: w,
        height: h,
    };
    f.render_widget(Clear, popup);
    f.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(" Keys · esc to close "),
        ),
        popup,
    );
}

/// Cut `s` to `max` display columns, ending in `…` if anything was dropped.
fn truncate(s: &str, max: usize) -> String {
    if s.width() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in s.chars() {
        let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w + 1 > max {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    out
}
