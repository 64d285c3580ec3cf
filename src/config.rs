use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::error::ConfigError;
use crate::i18n::Language;

const APP_DIR: &str = "chatmock";

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join(APP_DIR)
}

pub fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join(APP_DIR)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Overrides the saved language preference for this session.
    pub language: Option<Language>,
    pub reply_delay_ms: u64,
    pub log_filter: String,
    pub log_file: Option<PathBuf>,
    pub visibility_tracking: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            language: None,
            reply_delay_ms: 1500,
            log_filter: "info".to_string(),
            log_file: None,
            visibility_tracking: true,
        }
    }
}

impl Settings {
    /// Load `config.toml`. An explicit path must exist; the default one may
    /// be absent.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (config_dir().join("config.toml"), false),
        };

        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        toml::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CHATMOCK_LANG") {
            match Language::from_code(&v) {
                Some(lang) => self.language = Some(lang),
                None => warn!(value = %v, "ignoring unknown CHATMOCK_LANG"),
            }
        }
        if let Some(v) = lookup("CHATMOCK_REPLY_DELAY_MS") {
            match v.parse::<u64>() {
                Ok(ms) => self.reply_delay_ms = ms,
                Err(_) => warn!(value = %v, "ignoring invalid CHATMOCK_REPLY_DELAY_MS"),
            }
        }
        if let Some(v) = lookup("CHATMOCK_LOG") {
            self.log_filter = v;
        }
    }

    pub fn reply_delay(&self) -> Duration {
        Duration::from_millis(self.reply_delay_ms)
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| cache_dir().join("chatmock.log"))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PreferenceFile {
    language: Option<Language>,
}

/// The one value that survives restarts: the chosen UI language.
#[derive(Debug, Clone)]
pub struct Preferences {
    path: PathBuf,
    pub language: Language,
}

impl Preferences {
    pub fn default_path() -> PathBuf {
        config_dir().join("preferences.toml")
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = match fs::read_to_string(path) {
            Ok(raw) => toml::from_str::<PreferenceFile>(&raw).map_err(|source| {
                ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PreferenceFile::default(),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            language: file.language.unwrap_or_default(),
        })
    }

    /// Like `load`, but a broken preference file only costs the saved value.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!(error = %e, "failed to load preferences, using defaults");
            Self {
                path: path.to_path_buf(),
                language: Language::default(),
            }
        })
    }

    pub fn set_language(&mut self, language: Language) -> Result<(), ConfigError> {
        self.language = language;
        self.save()
    }

    fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let body = toml::to_string(&PreferenceFile {
            language: Some(self.language),
        })?;
        fs::write(&self.path, body).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(Some(dir.path().join("nope.toml").as_path())).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn parses_partial_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "language = \"de\"\nreply_delay_ms = 250\n").unwrap();

        let settings = Settings::load(Some(path.as_path())).unwrap();
        assert_eq!(settings.language, Some(Language::De));
        assert_eq!(settings.reply_delay(), Duration::from_millis(250));
        assert_eq!(settings.log_filter, "info");
        assert!(settings.visibility_tracking);
    }

    #[test]
    fn invalid_config_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "reply_delay_ms = \"soon\"").unwrap();
        assert!(matches!(
            Settings::load(Some(path.as_path())),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn env_overrides_apply_and_bad_values_are_ignored() {
        let vars: HashMap<&str, &str> = [
            ("CHATMOCK_LANG", "es"),
            ("CHATMOCK_REPLY_DELAY_MS", "later"),
            ("CHATMOCK_LOG", "chatmock=debug"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings.apply_vars(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(settings.language, Some(Language::Es));
        assert_eq!(settings.reply_delay_ms, 1500);
        assert_eq!(settings.log_filter, "chatmock=debug");
    }

    #[test]
    fn language_preference_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("preferences.toml");

        let mut prefs = Preferences::load(&path).unwrap();
        assert_eq!(prefs.language, Language::En);
        prefs.set_language(Language::Es).unwrap();

        let reloaded = Preferences::load(&path).unwrap();
        assert_eq!(reloaded.language, Language::Es);
        assert!(fs::read_to_string(&path).unwrap().contains("language = \"es\""));
    }

    #[test]
    fn corrupt_preferences_fall_back_to_english() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.toml");
        fs::write(&path, "language = \"klingon\"").unwrap();

        assert!(Preferences::load(&path).is_err());
        assert_eq!(Preferences::load_or_default(&path).language, Language::En);
    }
}
