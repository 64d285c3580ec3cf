use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};

pub use thread::{render_thread, ThreadLayout};

use crate::app::{App, InputMode, Overlay};
use crate::i18n::{t, Key};

mod thread;

/// Draw one frame. Returns the thread layout so the caller can hand it to
/// the read trackers.
pub fn draw(f: &mut Frame<'_>, app: &App) -> Option<ThreadLayout> {
    let size = f.size();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Min(0),    // Main content
            Constraint::Length(3), // Input area
        ])
        .split(size);

    draw_title_bar(f, app, chunks[0]);

    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(25), // Conversation list
            Constraint::Percentage(75), // Thread
        ])
        .split(chunks[1]);

    draw_sidebar(f, app, main_chunks[0]);
    let layout = draw_thread(f, app, main_chunks[1]);
    draw_input_area(f, app, chunks[2]);

    if let Some(overlay) = &app.overlay {
        draw_overlay(f, app, overlay, size);
    }
    layout
}

fn draw_title_bar(f: &mut Frame, app: &App, area: Rect) {
    let title = match app.current.and_then(|id| app.conversations.get(id)) {
        Some(conv) => format!(
            " chatmock | {} | {} {} | {} ",
            conv.title,
            app.conversations.total_unread(),
            t(app.language, Key::Unread),
            app.language
        ),
        None => format!(" chatmock | {} ", app.language),
    };
    let style = if app.tracking_enabled() {
        Style::default().fg(Color::Green)
    } else {
        Style::default().fg(Color::Yellow)
    };

    let paragraph = Paragraph::new(title)
        .block(Block::default().borders(Borders::ALL).style(style).title(" chatmock "))
        .alignment(Alignment::Center);
    f.render_widget(paragraph, area);
}

fn draw_sidebar(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} ", t(app.language, Key::Conversations)))
        .style(Style::default().fg(Color::Blue));

    let items: Vec<ListItem> = app
        .conversations
        .list_conversations()
        .into_iter()
        .filter_map(|id| app.conversations.get(id))
        .map(|conv| {
            let unread = app.conversations.unread_count(conv.id);
            let selected = app.current == Some(conv.id);
            let mut spans = vec![Span::raw(conv.title.clone())];
            if unread > 0 {
                spans.push(Span::styled(
                    format!(" ({})", unread),
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                ));
            }
            let style = if selected {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            ListItem::new(Line::from(spans)).style(style)
        })
        .collect();

    f.render_widget(List::new(items).block(block), area);
}

fn draw_thread(f: &mut Frame, app: &App, area: Rect) -> Option<ThreadLayout> {
    let conversation = app.current.and_then(|id| app.conversations.get(id));
    let title = match conversation {
        Some(conv) => format!(" {} ", conv.title),
        None => " chatmock ".to_string(),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let Some(conversation) = conversation else {
        draw_hint(f, t(app.language, Key::NoConversation), inner);
        return None;
    };
    if conversation.messages.is_empty() {
        draw_hint(f, t(app.language, Key::NoMessages), inner);
        return None;
    }

    let rendered = render_thread(
        conversation,
        &app.conversations,
        app.focused,
        inner.width,
        inner.height,
        app.scroll_offset,
    );
    let offset = u16::try_from(rendered.layout.viewport.offset).unwrap_or(u16::MAX);
    f.render_widget(Paragraph::new(rendered.lines).scroll((offset, 0)), inner);
    Some(rendered.layout)
}

fn draw_hint(f: &mut Frame, text: &str, area: Rect) {
    let hint = Paragraph::new(Line::from(Span::styled(
        text.to_string(),
        Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
    )))
    .wrap(Wrap { trim: false });
    f.render_widget(hint, area);
}

fn draw_input_area(f: &mut Frame, app: &App, area: Rect) {
    let input_style = match app.input_mode {
        InputMode::Normal => Style::default().fg(Color::White),
        InputMode::Editing => Style::default().fg(Color::Green),
    };

    let mode_indicator = match (&app.input_mode, &app.status) {
        (InputMode::Editing, _) => match app.reply_to {
            Some(id) => format!(" {} #{} | {} ", t(app.language, Key::Replying), id, t(app.language, Key::InputHint)),
            None => format!(" {} ", t(app.language, Key::InputHint)),
        },
        (InputMode::Normal, Some(status)) => format!(" {} ", status),
        (InputMode::Normal, None) => format!(" {} ", t(app.language, Key::NormalHint)),
    };

    let input_text = if app.input_mode == InputMode::Editing {
        app.input.as_str()
    } else {
        ""
    };
    let input_paragraph = Paragraph::new(input_text)
        .block(Block::default().borders(Borders::ALL).title(mode_indicator).style(input_style));
    f.render_widget(input_paragraph, area);

    if app.input_mode == InputMode::Editing {
        f.set_cursor(area.x + app.cursor_position as u16 + 1, area.y + 1);
    }
}

fn draw_overlay(f: &mut Frame, app: &App, overlay: &Overlay, size: Rect) {
    let lang = app.language;
    let current = app.current;
    let (title, lines): (String, Vec<String>) = match overlay {
        Overlay::Help => (t(lang, Key::Help).to_string(), help_lines()),
        Overlay::Participants => (
            t(lang, Key::Participants).to_string(),
            current
                .map(|c| app.conversations.participants(c))
                .unwrap_or_default()
                .into_iter()
                .map(|u| if u.is_self { format!("{} (you)", u.name) } else { u.name.clone() })
                .collect(),
        ),
        Overlay::Pinned => {
            let pinned: Vec<String> = current
                .and_then(|c| app.conversations.get(c))
                .map(|c| {
                    c.pinned()
                        .into_iter()
                        .map(|m| format!("#{} <{}> {}", m.id, app.conversations.user_name(m.sender_id), m.content))
                        .collect()
                })
                .unwrap_or_default();
            let lines = if pinned.is_empty() {
                vec![t(lang, Key::NoPinned).to_string()]
            } else {
                pinned
            };
            (t(lang, Key::Pinned).to_string(), lines)
        }
        Overlay::Templates => (
            t(lang, Key::Templates).to_string(),
            app.templates
                .iter()
                .enumerate()
                .map(|(i, tpl)| format!("{}. {}: {}", i + 1, tpl.name, tpl.body))
                .collect(),
        ),
        Overlay::Links => {
            let links: Vec<String> = app
                .current_links()
                .into_iter()
                .map(|(id, url)| format!("#{} {}", id, url))
                .collect();
            let lines = if links.is_empty() {
                vec![t(lang, Key::NoLinks).to_string()]
            } else {
                links
            };
            (t(lang, Key::Links).to_string(), lines)
        }
        Overlay::Search(query) => (
            format!("{}: {}", t(lang, Key::SearchResults), query),
            current
                .map(|c| app.conversations.search(c, query))
                .unwrap_or_default()
                .into_iter()
                .map(|m| format!("#{} <{}> {}", m.id, app.conversations.user_name(m.sender_id), m.content))
                .collect(),
        ),
    };

    let area = centered_rect(70, 60, size);
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} ", title))
        .style(Style::default().fg(Color::Magenta));
    let text: Vec<Line> = lines.into_iter().map(Line::from).collect();
    f.render_widget(Clear, area);
    f.render_widget(Paragraph::new(text).block(block).wrap(Wrap { trim: false }), area);
}

fn help_lines() -> Vec<String> {
    [
        "/help - Show this help",
        "/lang <en|es|de> - Change the interface language",
        "/unread <#> - Mark a message as unread",
        "/pin <#> - Pin or unpin a message",
        "/reply <#> <text> - Reply to a message",
        "/pinned, /links, /participants - Show conversation details",
        "/template [name|n] - Insert a template",
        "/search <text> - Search this conversation",
        "/quit - Exit",
        "",
        "Keyboard:",
        "i=input, Esc=normal/close, q=quit, ?=help",
        "Tab/Shift-Tab=switch conversation, Up/Down=focus message",
        "u=mark focused unread, p=pin focused, r=reply to focused",
        "PageUp/PageDown=scroll, End=jump to newest",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
