//! Sticker Converter Bot Library
//!
//! A Telegram bot that converts stickers to images/videos and
//! images/videos to stickers.
//!
//! This crate provides the core functionality for:
//! - Loading configuration from the environment
//! - Connecting to Telegram as a bot via `MTProto`
//! - Detecting media types and converting them with `ffmpeg`
//! - Dispatching incoming messages to bounded conversion jobs

pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod media;
pub mod telegram;
