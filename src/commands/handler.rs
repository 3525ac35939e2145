//! Command handler implementation.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use super::types::{BotCommand, CommandResult};
use crate::dispatcher::{DispatchStats, format_uptime};

/// Greeting sent in reply to `/start`.
pub const WELCOME_MESSAGE: &str = "🎉 Welcome to the Sticker Converter Bot!

Just send me a sticker or a photo/video, and I'll magically convert it for you:

📸 Sticker ➡️ Image/Video

🖼️ Image/Video ➡️ Sticker

No commands needed — just drop it in and watch the magic happen! ✨";

/// Handles bot commands.
#[derive(Debug)]
pub struct CommandHandler {
    /// Shared dispatcher statistics.
    stats: Arc<RwLock<DispatchStats>>,

    /// Longest accepted video, shown in help.
    max_video_secs: f64,

    /// Sticker box size, shown in help.
    sticker_size: u32,
}

impl CommandHandler {
    /// Creates a new command handler.
    #[must_use]
    pub const fn new(
        stats: Arc<RwLock<DispatchStats>>,
        max_video_secs: f64,
        sticker_size: u32,
    ) -> Self {
        Self {
            stats,
            max_video_secs,
            sticker_size,
        }
    }

    /// Tries to parse and execute a command from a message.
    ///
    /// Returns `None` if the message is not a command.
    pub async fn try_handle(&self, message_text: &str) -> Option<CommandResult> {
        let command = BotCommand::parse(message_text)?;

        debug!("Handling command: {}", command);
        let result = self.execute(command).await;
        info!("Command {} result: success={}", command, result.success);

        Some(result)
    }

    /// Executes a parsed command.
    async fn execute(&self, command: BotCommand) -> CommandResult {
        match command {
            BotCommand::Start => CommandResult::success(WELCOME_MESSAGE),
            BotCommand::Help => self.handle_help(),
            BotCommand::Status => self.handle_status().await,
        }
    }

    fn handle_help(&self) -> CommandResult {
        let mut lines = vec![
            "Sticker Converter Bot".to_owned(),
            String::new(),
            "Send me:".to_owned(),
            "  • a sticker → image (static) or video (animated)".to_owned(),
            "  • a photo or image file → sticker".to_owned(),
            format!(
                "  • a video or video note up to {}s → animated sticker",
                self.max_video_secs
            ),
            String::new(),
            format!(
                "Stickers are sized to fit {size}×{size} px.",
                size = self.sticker_size
            ),
            String::new(),
            "Commands:".to_owned(),
        ];

        for command in BotCommand::all() {
            lines.push(format!("  {command} - {}", command.description()));
        }

        CommandResult::success(lines.join("\n"))
    }

    async fn handle_status(&self) -> CommandResult {
        let stats = self.stats.read().await;

        let message = format!(
            "Status: ▶ Running\n\
             Uptime: {}\n\
             Received: {}\n\
             Converted: {}\n\
             Rejected: {}\n\
             Failed: {}\n\
             In progress: {}",
            format_uptime(stats.uptime()),
            stats.received,
            stats.converted,
            stats.rejected,
            stats.failed,
            stats.in_flight(),
        );

        CommandResult::success(message)
    }
}
