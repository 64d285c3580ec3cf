use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};

use crate::conversations::{Conversation, ConversationManager, Message, MessageId};
use crate::links::extract_links;
use crate::tracking::{RowSpan, Viewport};

/// Where each message of the open conversation landed in the last frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadLayout {
    pub viewport: Viewport,
    pub spans: Vec<(MessageId, RowSpan)>,
    pub total_rows: u32,
}

impl ThreadLayout {
    pub fn span(&self, id: MessageId) -> Option<RowSpan> {
        self.spans.iter().find(|(m, _)| *m == id).map(|(_, s)| *s)
    }

    /// Largest usable scroll distance from the bottom.
    pub fn max_scroll(&self) -> u32 {
        self.total_rows.saturating_sub(self.viewport.height)
    }
}

pub struct RenderedThread {
    pub lines: Vec<Line<'static>>,
    pub layout: ThreadLayout,
}

/// Lay out every message of `conversation` for a pane of `width` x `height`
/// scrolled `scroll` rows up from the bottom.
pub fn render_thread(
    conversation: &Conversation,
    manager: &ConversationManager,
    focused: Option<MessageId>,
    width: u16,
    height: u16,
    scroll: u32,
) -> RenderedThread {
    let mut lines = Vec::new();
    let mut spans = Vec::with_capacity(conversation.messages.len());

    for message in &conversation.messages {
        let top = lines.len() as u32;
        let is_focused = focused == Some(message.id);
        let mut block = message_lines(message, manager, width as usize);
        if is_focused {
            for span in block.iter_mut().flat_map(|line| line.spans.iter_mut()) {
                span.style = span.style.bg(Color::DarkGray);
            }
        }
        let rows = block.len() as u32;
        lines.extend(block);
        spans.push((message.id, RowSpan::new(top, rows)));
    }

    let total_rows = lines.len() as u32;
    let height = u32::from(height);
    let scroll = scroll.min(total_rows.saturating_sub(height));
    let offset = total_rows.saturating_sub(height).saturating_sub(scroll);

    RenderedThread {
        lines,
        layout: ThreadLayout {
            viewport: Viewport::new(offset, height),
            spans,
            total_rows,
        },
    }
}

fn message_lines(message: &Message, manager: &ConversationManager, width: usize) -> Vec<Line<'static>> {
    let is_own = message.is_from(manager.self_id());
    let mut lines = Vec::new();

    if let Some(reply) = &message.reply_to {
        let quoted = truncate(
            &format!("  ↳ {}: {}", reply.sender_name, reply.snippet),
            width,
        );
        lines.push(Line::from(Span::styled(
            quoted,
            Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
        )));
    }

    let nick_color = if is_own { Color::Green } else { Color::Magenta };
    let mut header = vec![
        Span::styled(
            format!("[{}] ", message.timestamp.with_timezone(&chrono::Local).format("%H:%M")),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(
            format!("<{}>", manager.user_name(message.sender_id)),
            Style::default().fg(nick_color),
        ),
        Span::styled(format!(" #{}", message.id), Style::default().fg(Color::DarkGray)),
    ];
    if !message.read && !is_own {
        header.push(Span::styled(" ●", Style::default().fg(Color::Yellow)));
    }
    if message.pinned {
        header.push(Span::styled(" ◆", Style::default().fg(Color::Cyan)));
    }
    lines.push(Line::from(header));

    for row in wrap_text(&message.content, width.saturating_sub(2).max(1)) {
        lines.push(styled_content_line(format!("  {}", row)));
    }
    lines
}

fn styled_content_line(text: String) -> Line<'static> {
    let links = extract_links(&text);
    if links.is_empty() {
        return Line::from(text);
    }
    let mut spans = Vec::new();
    let mut cursor = 0;
    for link in links {
        if link.range.start > cursor {
            spans.push(Span::raw(text[cursor..link.range.start].to_string()));
        }
        spans.push(Span::styled(
            text[link.range.clone()].to_string(),
            Style::default().fg(Color::Blue).add_modifier(Modifier::UNDERLINED),
        ));
        cursor = link.range.end;
    }
    if cursor < text.len() {
        spans.push(Span::raw(text[cursor..].to_string()));
    }
    Line::from(spans)
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Greedy word wrap; words longer than `width` are split.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut rows = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        loop {
            let needed = if current_len == 0 { word.len() } else { current_len + 1 + word.len() };
            if needed <= width {
                if current_len > 0 {
                    current.push(' ');
                    current_len += 1;
                }
                current.extend(word.iter());
                current_len += word.len();
                break;
            }
            if current_len > 0 {
                rows.push(std::mem::take(&mut current));
                current_len = 0;
                continue;
            }
            let rest = word.split_off(width);
            rows.push(word.into_iter().collect());
            word = rest;
            if word.is_empty() {
                break;
            }
        }
    }
    if current_len > 0 || rows.is_empty() {
        rows.push(current);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversations::{ConversationId, ReplyRef, User, UserId};

    fn manager_with(messages: Vec<Message>) -> ConversationManager {
        let users = vec![
            User { id: UserId(1), name: "you".into(), is_self: true },
            User { id: UserId(7), name: "dana".into(), is_self: false },
        ];
        let mut conv = Conversation::new(ConversationId(1), "dana", vec![UserId(1), UserId(7)]);
        for m in messages {
            conv.add_message(m);
        }
        ConversationManager::new(UserId(1), users, vec![conv])
    }

    fn message(id: u64, content: &str) -> Message {
        Message {
            id: MessageId(id),
            sender_id: UserId(7),
            content: content.to_string(),
            timestamp: chrono::Utc::now(),
            read: false,
            reply_to: None,
            pinned: false,
        }
    }

    #[test]
    fn wraps_on_word_boundaries() {
        assert_eq!(wrap_text("one two three", 7), vec!["one two", "three"]);
        assert_eq!(wrap_text("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap_text("", 10), vec![String::new()]);
    }

    #[test]
    fn spans_are_stacked_and_viewport_sticks_to_bottom() {
        let mut reply = message(2, "short");
        reply.reply_to = Some(ReplyRef::new(MessageId(1), "dana", "hello"));
        let manager = manager_with(vec![message(1, "hello"), reply]);
        let conv = manager.get(ConversationId(1)).unwrap();

        let rendered = render_thread(conv, &manager, None, 40, 2, 0);
        let layout = rendered.layout;
        assert_eq!(layout.span(MessageId(1)), Some(RowSpan::new(0, 2)));
        assert_eq!(layout.span(MessageId(2)), Some(RowSpan::new(2, 3)));
        assert_eq!(layout.total_rows, 5);
        assert_eq!(rendered.lines.len(), 5);
        assert_eq!(layout.viewport, Viewport::new(3, 2));
        assert_eq!(layout.max_scroll(), 3);
    }

    #[test]
    fn scroll_is_clamped_to_top() {
        let manager = manager_with(vec![message(1, "a"), message(2, "b"), message(3, "c")]);
        let conv = manager.get(ConversationId(1)).unwrap();
        let rendered = render_thread(conv, &manager, None, 40, 2, 99);
        assert_eq!(rendered.layout.viewport.offset, 0);
    }
}
