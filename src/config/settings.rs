//! Application settings and Telegram configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{
    DEFAULT_MAX_DOWNLOAD_BYTES, DEFAULT_MAX_STICKER_VIDEO_SECS, DEFAULT_STICKER_SIZE,
    DEFAULT_TEMP_DIR, PLACEHOLDER_BOT_TOKEN,
};

/// Telegram API configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Telegram API ID (obtain from <https://my.telegram.org>).
    pub api_id: i32,

    /// Telegram API hash (obtain from <https://my.telegram.org>).
    pub api_hash: String,

    /// Bot token issued by `@BotFather`.
    pub bot_token: String,

    /// Path to the session file.
    #[serde(default = "default_session_path")]
    pub session_path: PathBuf,
}

fn default_session_path() -> PathBuf {
    PathBuf::from("bot.session")
}

impl TelegramConfig {
    /// Creates a new Telegram configuration.
    #[must_use]
    pub fn new(api_id: i32, api_hash: String, bot_token: String) -> Self {
        Self {
            api_id,
            api_hash,
            bot_token,
            session_path: default_session_path(),
        }
    }

    /// Creates configuration from environment variables.
    ///
    /// Expects `BOT_TOKEN`, `TG_API_ID` and `TG_API_HASH` to be set.
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token = read_bot_token(std::env::var("BOT_TOKEN").ok())?;

        let api_id = parse_api_id(
            &std::env::var("TG_API_ID").map_err(|_| ConfigError::MissingEnvVar("TG_API_ID"))?,
        )?;

        let api_hash = std::env::var("TG_API_HASH")
            .map_err(|_| ConfigError::MissingEnvVar("TG_API_HASH"))?;

        let config = Self::new(api_id, api_hash, bot_token);
        Ok(match std::env::var("TG_SESSION_PATH") {
            Ok(path) => Self {
                session_path: PathBuf::from(path),
                ..config
            },
            Err(_) => config,
        })
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_id", &self.api_id)
            .field("session_path", &self.session_path)
            .finish_non_exhaustive()
    }
}

/// Validates the raw `BOT_TOKEN` value.
pub(crate) fn read_bot_token(raw: Option<String>) -> Result<String, ConfigError> {
    let token = raw
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty())
        .ok_or(ConfigError::MissingEnvVar("BOT_TOKEN"))?;

    if token == PLACEHOLDER_BOT_TOKEN {
        return Err(ConfigError::PlaceholderToken);
    }

    Ok(token)
}

/// Parses the API ID, which must be a positive integer.
pub(crate) fn parse_api_id(raw: &str) -> Result<i32, ConfigError> {
    raw.trim()
        .parse::<i32>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or(ConfigError::InvalidApiId)
}

/// Bot-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSettings {
    /// Scratch directory for downloaded and converted files.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// `ffmpeg` executable name or path.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// `ffprobe` executable name or path.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,

    /// Longest video (in seconds) accepted for sticker conversion.
    #[serde(default = "default_max_sticker_video_secs")]
    pub max_sticker_video_secs: f64,

    /// Side of the square box stickers must fit in.
    #[serde(default = "default_sticker_size")]
    pub sticker_size: u32,

    /// Largest declared file size the bot will download.
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: u64,

    /// Maximum number of conversions running at once.
    #[serde(default = "default_max_concurrent_conversions")]
    pub max_concurrent_conversions: usize,

    /// Minimum interval between outgoing uploads in milliseconds.
    #[serde(default = "default_min_send_interval_ms")]
    pub min_send_interval_ms: u64,

    /// Upper bound for a single ffmpeg/ffprobe run in seconds.
    #[serde(default = "default_conversion_timeout_secs")]
    pub conversion_timeout_secs: u64,
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from(DEFAULT_TEMP_DIR)
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_owned()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_owned()
}

const fn default_max_sticker_video_secs() -> f64 {
    DEFAULT_MAX_STICKER_VIDEO_SECS
}

const fn default_sticker_size() -> u32 {
    DEFAULT_STICKER_SIZE
}

const fn default_max_download_bytes() -> u64 {
    DEFAULT_MAX_DOWNLOAD_BYTES
}

const fn default_max_concurrent_conversions() -> usize {
    4
}

const fn default_min_send_interval_ms() -> u64 {
    50 // keeps well under the ~30 messages/second bot limit
}

const fn default_conversion_timeout_secs() -> u64 {
    60
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            max_sticker_video_secs: default_max_sticker_video_secs(),
            sticker_size: default_sticker_size(),
            max_download_bytes: default_max_download_bytes(),
            max_concurrent_conversions: default_max_concurrent_conversions(),
            min_send_interval_ms: default_min_send_interval_ms(),
            conversion_timeout_secs: default_conversion_timeout_secs(),
        }
    }
}

impl BotSettings {
    /// Creates bot settings from environment variables with defaults.
    #[must_use]
    pub fn from_env_with_defaults() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup, falling back to
    /// defaults for missing or unparsable values.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed_with<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            lookup(key).and_then(|s| s.trim().parse().ok())
        }

        Self {
            temp_dir: lookup("BOT_FILES_DIR").map_or_else(default_temp_dir, PathBuf::from),
            ffmpeg_path: lookup("FFMPEG_PATH").unwrap_or_else(default_ffmpeg_path),
            ffprobe_path: lookup("FFPROBE_PATH").unwrap_or_else(default_ffprobe_path),
            max_sticker_video_secs: parsed_with(&lookup, "MAX_STICKER_VIDEO_SECS")
                .filter(|secs: &f64| secs.is_finite() && *secs > 0.0)
                .unwrap_or_else(default_max_sticker_video_secs),
            sticker_size: parsed_with(&lookup, "STICKER_SIZE")
                .filter(|size: &u32| *size > 0)
                .unwrap_or_else(default_sticker_size),
            max_download_bytes: parsed_with(&lookup, "MAX_DOWNLOAD_BYTES")
                .filter(|bytes: &u64| *bytes > 0)
                .unwrap_or_else(default_max_download_bytes),
            max_concurrent_conversions: parsed_with(&lookup, "MAX_CONCURRENT_CONVERSIONS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or_else(default_max_concurrent_conversions),
            min_send_interval_ms: parsed_with(&lookup, "MIN_SEND_INTERVAL_MS")
                .unwrap_or_else(default_min_send_interval_ms),
            conversion_timeout_secs: parsed_with(&lookup, "CONVERSION_TIMEOUT_SECS")
                .filter(|secs: &u64| *secs > 0)
                .unwrap_or_else(default_conversion_timeout_secs),
        }
    }

    /// Creates the scratch directory if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn ensure_temp_dir(&self) -> Result<&Path, ConfigError> {
        std::fs::create_dir_all(&self.temp_dir).map_err(|source| ConfigError::TempDir {
            path: self.temp_dir.clone(),
            source,
        })?;
        Ok(&self.temp_dir)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("BOT_TOKEN still holds the placeholder value; set your real bot token")]
    PlaceholderToken,

    #[error("Invalid API ID format (must be a positive integer)")]
    InvalidApiId,

    #[error("Failed to create scratch directory {path}: {source}")]
    TempDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_settings() {
        let settings = BotSettings::default();
        assert_eq!(settings.temp_dir, PathBuf::from("/tmp/bot_files"));
        assert_eq!(settings.sticker_size, 512);
        assert!((settings.max_sticker_video_secs - 2.0).abs() < f64::EPSILON);
        assert_eq!(settings.ffmpeg_path, "ffmpeg");
        assert_eq!(settings.max_download_bytes, 20 * 1024 * 1024);
    }

    #[test]
    fn test_settings_from_lookup_overrides() {
        let settings = BotSettings::from_lookup(lookup_from(&[
            ("BOT_FILES_DIR", "/var/tmp/stickers"),
            ("MAX_STICKER_VIDEO_SECS", "3"),
            ("MAX_CONCURRENT_CONVERSIONS", "2"),
            ("MAX_DOWNLOAD_BYTES", "1048576"),
        ]));
        assert_eq!(settings.max_download_bytes, 1_048_576);
        assert_eq!(settings.temp_dir, PathBuf::from("/var/tmp/stickers"));
        assert!((settings.max_sticker_video_secs - 3.0).abs() < f64::EPSILON);
        assert_eq!(settings.max_concurrent_conversions, 2);
    }

    #[test]
    fn test_settings_invalid_values_fall_back() {
        let settings = BotSettings::from_lookup(lookup_from(&[
            ("STICKER_SIZE", "huge"),
            ("MAX_CONCURRENT_CONVERSIONS", "0"),
            ("MAX_STICKER_VIDEO_SECS", "-1"),
            ("MAX_DOWNLOAD_BYTES", "0"),
        ]));
        assert_eq!(settings.max_download_bytes, 20 * 1024 * 1024);
        assert_eq!(settings.sticker_size, 512);
        assert_eq!(settings.max_concurrent_conversions, 4);
        assert!((settings.max_sticker_video_secs - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ensure_temp_dir_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let settings = BotSettings {
            temp_dir: root.path().join("bot_files"),
            ..BotSettings::default()
        };
        settings.ensure_temp_dir().unwrap();
        settings.ensure_temp_dir().unwrap();
        assert!(settings.temp_dir.is_dir());
    }

    #[test]
    fn test_read_bot_token() {
        assert_eq!(read_bot_token(Some(" 123:abc ".to_owned())).unwrap(), "123:abc");
        assert!(matches!(
            read_bot_token(None),
            Err(ConfigError::MissingEnvVar("BOT_TOKEN"))
        ));
        assert!(matches!(
            read_bot_token(Some(String::new())),
            Err(ConfigError::MissingEnvVar("BOT_TOKEN"))
        ));
        assert!(matches!(
            read_bot_token(Some("your_bot_token_here".to_owned())),
            Err(ConfigError::PlaceholderToken)
        ));
    }

    #[test]
    fn test_parse_api_id() {
        assert_eq!(parse_api_id("12345").unwrap(), 12345);
        assert!(parse_api_id("-5").is_err());
        assert!(parse_api_id("abc").is_err());
    }

    #[test]
    fn test_telegram_config_new() {
        let config = TelegramConfig::new(12345, "abc123".to_owned(), "1:tok".to_owned());
        assert_eq!(config.api_id, 12345);
        assert_eq!(config.api_hash, "abc123");
        assert_eq!(config.session_path, PathBuf::from("bot.session"));
    }

    #[test]
    fn test_telegram_config_debug_hides_secrets() {
        let config = TelegramConfig::new(1, "secret_hash".to_owned(), "1:secret_token".to_owned());
        let printed = format!("{config:?}");
        assert!(!printed.contains("secret_hash"));
        assert!(!printed.contains("secret_token"));
    }
}
