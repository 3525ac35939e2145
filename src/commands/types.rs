//! Command types and definitions.

use std::fmt;

/// Available bot commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    /// Show the welcome message.
    Start,

    /// Show help information and conversion limits.
    Help,

    /// Show uptime and conversion counters.
    Status,
}

impl BotCommand {
    /// Parses a command from a message text.
    ///
    /// Accepts an optional `@botname` suffix (as Telegram adds in groups).
    /// Returns `None` if the message is not a known command.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let after_slash = text.strip_prefix('/')?;

        let word = after_slash
            .split_whitespace()
            .next()
            .unwrap_or_default();

        // Strip the "@botname" mention, if any
        let cmd = word
            .split_once('@')
            .map_or(word, |(cmd, _)| cmd)
            .to_lowercase();

        match cmd.as_str() {
            "start" => Some(Self::Start),
            "help" | "h" => Some(Self::Help),
            "status" | "stats" => Some(Self::Status),
            _ => None,
        }
    }

    /// Returns the command name as it appears in help.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
            Self::Status => "status",
        }
    }

    /// Returns the command description for help.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Start => "Show the welcome message",
            Self::Help => "Show this help message",
            Self::Status => "Show uptime and conversion statistics",
        }
    }

    /// Returns all available commands.
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::Start, Self::Help, Self::Status]
    }
}

impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.name())
    }
}

/// Result of command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Whether the command was successful.
    pub success: bool,

    /// Response message to show the user.
    pub message: String,
}

impl CommandResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start() {
        assert_eq!(BotCommand::parse("/start"), Some(BotCommand::Start));
        assert_eq!(
            BotCommand::parse("/start deep_link_payload"),
            Some(BotCommand::Start)
        );
    }

    #[test]
    fn test_parse_with_bot_mention() {
        assert_eq!(
            BotCommand::parse("/help@StickerConverterBot"),
            Some(BotCommand::Help)
        );
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!(BotCommand::parse("/h"), Some(BotCommand::Help));
        assert_eq!(BotCommand::parse("/stats"), Some(BotCommand::Status));
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!(BotCommand::parse("/START"), Some(BotCommand::Start));
        assert_eq!(BotCommand::parse("/Status"), Some(BotCommand::Status));
    }

    #[test]
    fn test_parse_with_extra_whitespace() {
        assert_eq!(BotCommand::parse("  /start  "), Some(BotCommand::Start));
    }

    #[test]
    fn test_parse_rejects_non_commands() {
        assert_eq!(BotCommand::parse("start"), None);
        assert_eq!(BotCommand::parse("/unknown"), None);
        assert_eq!(BotCommand::parse("/"), None);
        assert_eq!(BotCommand::parse(""), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(BotCommand::Status.to_string(), "/status");
    }
}
