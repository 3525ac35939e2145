//! Command handling module.
//!
//! Processes the slash commands users send to the bot.
//! Everything else is media and goes to the dispatcher.

mod handler;
mod types;

pub use handler::{CommandHandler, WELCOME_MESSAGE};
pub use types::{BotCommand, CommandResult};
