//! Telegram client wrapper module.
//!
//! Provides high-level abstractions for talking to Telegram as a bot,
//! including sign in, the update stream, file transfer and rate limiting.

mod client;
mod rate_limiter;

pub use client::{IncomingMessage, ReplyAs, TelegramBot, TelegramError};
pub use grammers_client::message::Message;
pub use rate_limiter::RateLimiter;
