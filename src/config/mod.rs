//! Configuration module for the sticker converter bot.
//!
//! Handles loading of Telegram credentials and conversion settings
//! from the environment (optionally seeded from a `.env` file).

mod settings;

pub use settings::{BotSettings, ConfigError, TelegramConfig};

/// Default scratch directory for per-message files.
pub const DEFAULT_TEMP_DIR: &str = "/tmp/bot_files";

/// Longest video, in seconds, accepted for sticker conversion.
pub const DEFAULT_MAX_STICKER_VIDEO_SECS: f64 = 2.0;

/// Stickers must fit in a square of this many pixels.
pub const DEFAULT_STICKER_SIZE: u32 = 512;

/// Largest declared file size downloaded for conversion (20 MiB).
pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 20 * 1024 * 1024;

/// Value shipped in `.env.example`, never a usable token.
pub const PLACEHOLDER_BOT_TOKEN: &str = "your_bot_token_here";
