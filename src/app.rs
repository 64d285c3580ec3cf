use anyhow::Result;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{Preferences, Settings};
use crate::conversations::{ConversationId, ConversationManager, Message, MessageId};
use crate::i18n::{t, Key, Language};
use crate::links::extract_links;
use crate::mock::{IncomingReply, MockData, Responder, Template};
use crate::tracking::{NoopObserver, TrackerRegistry, ViewportObserver, VisibilityObserver};
use crate::ui::ThreadLayout;

#[derive(Debug, Clone, PartialEq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Overlay {
    Help,
    Participants,
    Pinned,
    Templates,
    Links,
    Search(String),
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub input: String,
    /// Cursor position in characters.
    pub cursor_position: usize,
    /// Rows scrolled up from the bottom of the thread.
    pub scroll_offset: u32,

    pub language: Language,
    preferences: Preferences,

    pub conversations: ConversationManager,
    pub current: Option<ConversationId>,
    pub focused: Option<MessageId>,
    pub reply_to: Option<MessageId>,
    pub templates: Vec<Template>,
    pub overlay: Option<Overlay>,
    pub status: Option<String>,

    trackers: TrackerRegistry,
    observer: Box<dyn VisibilityObserver>,

    responder: Responder,
    reply_rx: mpsc::UnboundedReceiver<IncomingReply>,
}

impl App {
    pub fn new(settings: &Settings, preferences: Preferences, data: MockData) -> Self {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let responder = Responder::new(settings.reply_delay(), data.canned_replies, reply_tx);

        let observer: Box<dyn VisibilityObserver> = if settings.visibility_tracking {
            Box::new(ViewportObserver::new())
        } else {
            Box::new(NoopObserver)
        };

        let conversations = ConversationManager::new(data.self_id, data.users, data.conversations);
        let language = settings.language.unwrap_or(preferences.language);

        let mut app = Self {
            should_quit: false,
            input_mode: InputMode::Normal,
            input: String::new(),
            cursor_position: 0,
            scroll_offset: 0,

            language,
            preferences,

            conversations,
            current: None,
            focused: None,
            reply_to: None,
            templates: data.templates,
            overlay: None,
            status: None,

            trackers: TrackerRegistry::new(),
            observer,

            responder,
            reply_rx,
        };

        if let Some(first) = app.conversations.list_conversations().first().copied() {
            app.open_conversation(first);
        }
        info!(
            language = %app.language,
            unread = app.conversations.total_unread(),
            "chat client ready"
        );
        app
    }

    pub fn handle_input(&mut self, event: Event) -> Result<()> {
        if let Event::Key(key) = event {
            if key.kind == KeyEventKind::Press {
                self.handle_key_event(key)?;
            }
        }
        Ok(())
    }

    fn handle_key_event(&mut self, key: KeyEvent) -> Result<()> {
        if self.overlay.is_some() && self.input_mode == InputMode::Normal {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('q') | KeyCode::Enter) {
                self.overlay = None;
            }
            return Ok(());
        }

        match self.input_mode {
            InputMode::Normal => match key.code {
                KeyCode::Char('q') => {
                    self.should_quit = true;
                }
                KeyCode::Char('i') => {
                    self.input_mode = InputMode::Editing;
                }
                KeyCode::Char('r') => {
                    if let Some(id) = self.focused {
                        self.reply_to = Some(id);
                        self.input_mode = InputMode::Editing;
                    }
                }
                KeyCode::Char('u') => {
                    if let Some(id) = self.focused {
                        self.mark_unread(id);
                    }
                }
                KeyCode::Char('p') => {
                    if let Some(id) = self.focused {
                        self.toggle_pin(id);
                    }
                }
                KeyCode::Char('?') => {
                    self.overlay = Some(Overlay::Help);
                }
                KeyCode::Tab => self.cycle_conversation(1),
                KeyCode::BackTab => self.cycle_conversation(-1),
                KeyCode::Up => self.move_focus(-1),
                KeyCode::Down => self.move_focus(1),
                KeyCode::PageUp => {
                    self.scroll_offset = self.scroll_offset.saturating_add(10);
                }
                KeyCode::PageDown => {
                    self.scroll_offset = self.scroll_offset.saturating_sub(10);
                }
                KeyCode::End => {
                    self.scroll_offset = 0;
                }
                _ => {}
            },
            InputMode::Editing => match key.code {
                KeyCode::Enter => {
                    let input = std::mem::take(&mut self.input);
                    self.cursor_position = 0;
                    self.input_mode = InputMode::Normal;
                    self.submit_input(&input)?;
                }
                KeyCode::Char(c) => {
                    let at = self.byte_index();
                    self.input.insert(at, c);
                    self.cursor_position += 1;
                }
                KeyCode::Backspace => {
                    if self.cursor_position > 0 {
                        self.cursor_position -= 1;
                        let at = self.byte_index();
                        self.input.remove(at);
                    }
                }
                KeyCode::Delete => {
                    if self.cursor_position < self.input.chars().count() {
                        let at = self.byte_index();
                        self.input.remove(at);
                    }
                }
                KeyCode::Left => {
                    self.cursor_position = self.cursor_position.saturating_sub(1);
                }
                KeyCode::Right => {
                    if self.cursor_position < self.input.chars().count() {
                        self.cursor_position += 1;
                    }
                }
                KeyCode::Home => {
                    self.cursor_position = 0;
                }
                KeyCode::End => {
                    self.cursor_position = self.input.chars().count();
                }
                KeyCode::Esc => {
                    self.input.clear();
                    self.cursor_position = 0;
                    self.reply_to = None;
                    self.input_mode = InputMode::Normal;
                }
                _ => {}
            },
        }
        Ok(())
    }

    fn byte_index(&self) -> usize {
        self.input
            .char_indices()
            .nth(self.cursor_position)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }

    fn submit_input(&mut self, input: &str) -> Result<()> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(());
        }

        if input.starts_with('/') {
            self.handle_command(input)?;
        } else {
            self.send_message(input);
        }
        Ok(())
    }

    fn handle_command(&mut self, input: &str) -> Result<()> {
        let parts: Vec<&str> = input[1..].split_whitespace().collect();
        if parts.is_empty() {
            return Ok(());
        }

        match parts[0].to_lowercase().as_str() {
            "help" | "h" | "commands" => {
                self.overlay = Some(Overlay::Help);
            }
            "lang" | "language" => match parts.get(1) {
                Some(code) => self.change_language(code),
                None => {
                    let codes: Vec<&str> = Language::ALL.iter().map(|l| l.code()).collect();
                    self.set_status(format!("Usage: /lang <{}>", codes.join("|")));
                }
            },
            "unread" | "u" => match self.message_arg(parts.get(1)) {
                Some(id) => self.mark_unread(id),
                None => self.set_status("Usage: /unread <message #>"),
            },
            "pin" => match self.message_arg(parts.get(1)) {
                Some(id) => self.toggle_pin(id),
                None => self.set_status("Usage: /pin <message #>"),
            },
            "reply" | "r" => {
                let Some(id) = self.message_arg(parts.get(1)) else {
                    self.set_status("Usage: /reply <message #> <text>");
                    return Ok(());
                };
                if self.current_message(id).is_none() {
                    self.set_status(t(self.language, Key::NotFound));
                    return Ok(());
                }
                self.reply_to = Some(id);
                if parts.len() > 2 {
                    self.send_message(&parts[2..].join(" "));
                }
            }
            "links" => {
                self.overlay = Some(Overlay::Links);
            }
            "participants" | "who" => {
                self.overlay = Some(Overlay::Participants);
            }
            "pinned" => {
                self.overlay = Some(Overlay::Pinned);
            }
            "template" | "t" => match parts.get(1) {
                Some(arg) => self.use_template(arg),
                None => self.overlay = Some(Overlay::Templates),
            },
            "search" | "s" => {
                if parts.len() < 2 {
                    self.set_status("Usage: /search <text>");
                } else {
                    self.overlay = Some(Overlay::Search(parts[1..].join(" ")));
                }
            }
            "quit" | "q" | "exit" => {
                self.should_quit = true;
            }
            _ => {
                self.set_status(t(self.language, Key::UnknownCommand));
            }
        }
        Ok(())
    }

    fn message_arg(&self, arg: Option<&&str>) -> Option<MessageId> {
        arg.and_then(|a| a.trim_start_matches('#').parse::<u64>().ok())
            .map(MessageId)
    }

    fn send_message(&mut self, content: &str) {
        let Some(conversation) = self.current else {
            self.set_status(t(self.language, Key::NoConversation));
            return;
        };
        let reply_to = self.reply_to.take();
        if self
            .conversations
            .compose(conversation, content, reply_to)
            .is_none()
        {
            return;
        }
        self.scroll_offset = 0;

        let self_id = self.conversations.self_id();
        let candidates: Vec<_> = self
            .conversations
            .get(conversation)
            .map(|c| c.participants.iter().copied().filter(|id| *id != self_id).collect())
            .unwrap_or_default();
        self.responder.schedule_reply(conversation, &candidates);
    }

    fn use_template(&mut self, arg: &str) {
        let template = arg
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| self.templates.get(i))
            .or_else(|| self.templates.iter().find(|t| t.name.eq_ignore_ascii_case(arg)));
        match template {
            Some(template) => {
                let body = template.body.clone();
                self.input = body;
                self.cursor_position = self.input.chars().count();
                // Stay in editing mode so the template can be tweaked.
                self.input_mode = InputMode::Editing;
            }
            None => self.set_status(format!("No template named {}", arg)),
        }
    }

    fn change_language(&mut self, code: &str) {
        let Some(language) = Language::from_code(code) else {
            self.set_status(format!("Unknown language: {}", code));
            return;
        };
        self.language = language;
        if let Err(e) = self.preferences.set_language(language) {
            warn!(error = %e, "failed to save language preference");
        }
        self.set_status(format!("{}: {}", t(language, Key::LanguageChanged), language));
    }

    pub fn mark_unread(&mut self, id: MessageId) {
        let Some(conversation) = self.current else {
            return;
        };
        if self.conversations.mark_unread(conversation, id) {
            self.trackers.mark_unread(id, self.observer.as_mut());
            self.set_status(format!("{} (#{})", t(self.language, Key::MarkedUnread), id));
        } else {
            self.set_status(t(self.language, Key::NotFound));
        }
    }

    fn toggle_pin(&mut self, id: MessageId) {
        let Some(conversation) = self.current else {
            return;
        };
        match self.conversations.toggle_pin(conversation, id) {
            Some(_) => self.set_status(format!("{} (#{})", t(self.language, Key::PinToggled), id)),
            None => self.set_status(t(self.language, Key::NotFound)),
        }
    }

    pub fn open_conversation(&mut self, id: ConversationId) {
        if self.current == Some(id) {
            return;
        }
        // Reads already reported belong to the conversation being left.
        self.apply_read_requests();
        self.trackers.clear(self.observer.as_mut());
        self.current = Some(id);
        self.focused = self
            .conversations
            .get(id)
            .and_then(|c| c.messages.last())
            .map(|m| m.id);
        self.reply_to = None;
        self.scroll_offset = 0;
    }

    fn cycle_conversation(&mut self, step: isize) {
        let ids = self.conversations.list_conversations();
        if ids.is_empty() {
            return;
        }
        let index = self
            .current
            .and_then(|c| ids.iter().position(|id| *id == c))
            .unwrap_or(0) as isize;
        let next = (index + step).rem_euclid(ids.len() as isize) as usize;
        self.open_conversation(ids[next]);
    }

    fn move_focus(&mut self, step: isize) {
        let Some(conversation) = self.current.and_then(|id| self.conversations.get(id)) else {
            return;
        };
        if conversation.messages.is_empty() {
            return;
        }
        let last = conversation.messages.len() as isize - 1;
        let index = self
            .focused
            .and_then(|f| conversation.messages.iter().position(|m| m.id == f))
            .map(|i| i as isize)
            .unwrap_or(last);
        let next = (index + step).clamp(0, last) as usize;
        self.focused = Some(conversation.messages[next].id);
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!(status = %message, "status");
        self.status = Some(message);
    }

    /// Feed the layout of the frame just drawn to the read trackers.
    pub fn observe_thread(&mut self, layout: ThreadLayout, now: Instant) {
        let Some(conversation) = self.current else {
            return;
        };

        let mounted = self.conversations.mounted_messages(conversation);
        self.trackers.sync(mounted, self.observer.as_mut(), now);
        let entries = self.observer.measure(layout.viewport, &layout.spans);
        self.trackers.dispatch(&entries, self.observer.as_mut());
        self.apply_read_requests();

        self.scroll_offset = self.scroll_offset.min(layout.max_scroll());
        self.keep_focus_visible(&layout);
    }

    fn keep_focus_visible(&mut self, layout: &ThreadLayout) {
        let Some(span) = self.focused.and_then(|id| layout.span(id)) else {
            return;
        };
        let viewport = layout.viewport;
        if span.top < viewport.offset {
            self.scroll_offset += viewport.offset - span.top;
        } else if span.bottom() > viewport.offset + viewport.height {
            let below = span.bottom() - (viewport.offset + viewport.height);
            self.scroll_offset = self.scroll_offset.saturating_sub(below);
        }
        self.scroll_offset = self.scroll_offset.min(layout.max_scroll());
    }

    pub fn on_tick(&mut self, now: Instant) -> Result<()> {
        while let Ok(reply) = self.reply_rx.try_recv() {
            self.deliver_reply(reply);
        }

        self.trackers.poll_fallbacks(now, self.observer.as_mut());
        self.apply_read_requests();
        Ok(())
    }

    fn deliver_reply(&mut self, reply: IncomingReply) {
        let Some(conversation) = self.conversations.get(reply.conversation) else {
            return;
        };
        let message = Message {
            id: conversation.next_message_id(),
            sender_id: reply.sender_id,
            content: reply.content,
            timestamp: chrono::Utc::now(),
            read: false,
            reply_to: None,
            pinned: false,
        };
        self.conversations.append_message(reply.conversation, message);
    }

    fn apply_read_requests(&mut self) {
        let Some(conversation) = self.current else {
            return;
        };
        for id in self.trackers.drain_read_requests() {
            self.conversations.mark_read(conversation, id);
        }
    }

    pub fn current_message(&self, id: MessageId) -> Option<&Message> {
        self.current
            .and_then(|c| self.conversations.get(c))
            .and_then(|c| c.message(id))
    }

    /// Links found in the open conversation, oldest message first.
    pub fn current_links(&self) -> Vec<(MessageId, String)> {
        self.current
            .and_then(|c| self.conversations.get(c))
            .map(|c| {
                c.messages
                    .iter()
                    .flat_map(|m| extract_links(&m.content).into_iter().map(move |l| (m.id, l.url)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn tracking_enabled(&self) -> bool {
        self.observer.supports_visibility()
    }
}
