use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Es,
    De,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::En, Language::Es, Language::De];

    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
            Language::De => "de",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim().to_ascii_lowercase();
        // Accept region-tagged codes like "es-MX".
        let primary = code.split(|c: char| c == '-' || c == '_').next().unwrap_or_default();
        Self::ALL.into_iter().find(|l| l.code() == primary)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s).ok_or_else(|| ConfigError::UnknownLanguage(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Conversations,
    NoConversation,
    NoMessages,
    Unread,
    Pinned,
    NoPinned,
    Participants,
    Templates,
    Links,
    NoLinks,
    Help,
    NormalHint,
    InputHint,
    LanguageChanged,
    UnknownCommand,
    MarkedUnread,
    PinToggled,
    NotFound,
    Replying,
    SearchResults,
}

/// Translated UI string, falling back to English when a language lacks it.
pub fn t(lang: Language, key: Key) -> &'static str {
    lookup(lang, key).or_else(|| lookup(Language::En, key)).unwrap_or("?")
}

fn lookup(lang: Language, key: Key) -> Option<&'static str> {
    use Key::*;
    let text = match (lang, key) {
        (Language::En, Conversations) => "Conversations",
        (Language::En, NoConversation) => "No conversation selected. Press Tab to pick one.",
        (Language::En, NoMessages) => "No messages yet. Press i and say hello.",
        (Language::En, Unread) => "unread",
        (Language::En, Pinned) => "Pinned messages",
        (Language::En, NoPinned) => "Nothing pinned in this conversation",
        (Language::En, Participants) => "Participants",
        (Language::En, Templates) => "Templates",
        (Language::En, Links) => "Links",
        (Language::En, NoLinks) => "No links in this conversation",
        (Language::En, Help) => "Help",
        (Language::En, NormalHint) => "[NORMAL] i=input Tab=next u=unread p=pin ?=help q=quit",
        (Language::En, InputHint) => "[INPUT] ESC=normal, ENTER=send",
        (Language::En, LanguageChanged) => "Language changed",
        (Language::En, UnknownCommand) => "Unknown command. Type /help for available commands.",
        (Language::En, MarkedUnread) => "Marked as unread",
        (Language::En, PinToggled) => "Pin toggled",
        (Language::En, NotFound) => "No such message",
        (Language::En, Replying) => "Replying to",
        (Language::En, SearchResults) => "Search results",

        (Language::Es, Conversations) => "Conversaciones",
        (Language::Es, NoConversation) => "Ninguna conversación seleccionada. Pulsa Tab para elegir una.",
        (Language::Es, NoMessages) => "Aún no hay mensajes. Pulsa i y saluda.",
        (Language::Es, Unread) => "sin leer",
        (Language::Es, Pinned) => "Mensajes fijados",
        (Language::Es, NoPinned) => "No hay nada fijado en esta conversación",
        (Language::Es, Participants) => "Participantes",
        (Language::Es, Templates) => "Plantillas",
        (Language::Es, Links) => "Enlaces",
        (Language::Es, NoLinks) => "No hay enlaces en esta conversación",
        (Language::Es, Help) => "Ayuda",
        (Language::Es, InputHint) => "[ENTRADA] ESC=normal, ENTER=enviar",
        (Language::Es, LanguageChanged) => "Idioma cambiado",
        (Language::Es, UnknownCommand) => "Comando desconocido. Escribe /help para ver los comandos.",
        (Language::Es, MarkedUnread) => "Marcado como no leído",
        (Language::Es, NotFound) => "No existe ese mensaje",
        (Language::Es, Replying) => "Respondiendo a",

        (Language::De, Conversations) => "Unterhaltungen",
        (Language::De, NoConversation) => "Keine Unterhaltung ausgewählt. Mit Tab auswählen.",
        (Language::De, NoMessages) => "Noch keine Nachrichten. Drücke i und sag hallo.",
        (Language::De, Unread) => "ungelesen",
        (Language::De, Pinned) => "Angeheftete Nachrichten",
        (Language::De, Participants) => "Teilnehmer",
        (Language::De, Templates) => "Vorlagen",
        (Language::De, Links) => "Links",
        (Language::De, Help) => "Hilfe",
        (Language::De, LanguageChanged) => "Sprache geändert",
        (Language::De, UnknownCommand) => "Unbekannter Befehl. /help zeigt alle Befehle.",
        (Language::De, MarkedUnread) => "Als ungelesen markiert",
        (Language::De, NotFound) => "Keine solche Nachricht",

        _ => return None,
    };
    Some(text)
}
