//! Sticker Converter Bot - Main Entry Point
//!
//! A Telegram bot that converts stickers to images/videos and
//! images/videos to stickers using `ffmpeg`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use sticker_converter_bot::config::{BotSettings, TelegramConfig};
use sticker_converter_bot::dispatcher::{DispatchMessage, DispatchStats, Dispatcher};
use sticker_converter_bot::media::{Ffmpeg, StickerConverter, Workspace};
use sticker_converter_bot::telegram::TelegramBot;

/// Telegram bot converting stickers to images/videos and back.
#[derive(Parser, Debug)]
#[command(name = "sticker_bot")]
#[command(about = "Convert Telegram stickers to images/videos and images/videos to stickers")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level);

    // Load environment variables
    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    // Load configurations
    let tg_config = TelegramConfig::from_env()
        .context("Failed to load Telegram configuration from environment")?;

    let settings = BotSettings::from_env_with_defaults();

    let temp_dir = settings
        .ensure_temp_dir()
        .context("Failed to prepare scratch directory")?;
    info!("Scratch directory: {}", temp_dir.display());

    let ffmpeg = Ffmpeg::locate(
        &settings.ffmpeg_path,
        &settings.ffprobe_path,
        Duration::from_secs(settings.conversion_timeout_secs),
    )
    .context("ffmpeg is required for conversions")?;

    let converter = StickerConverter::new(
        ffmpeg,
        settings.sticker_size,
        settings.max_sticker_video_secs,
    );

    // Connect to Telegram
    let bot = TelegramBot::connect(&tg_config, settings.min_send_interval_ms)
        .await
        .context("Failed to connect to Telegram")?;

    let bot = Arc::new(bot);
    let stats = Arc::new(RwLock::new(DispatchStats::new()));

    // Create dispatcher channel
    let (dispatch_tx, dispatch_rx) = mpsc::channel::<DispatchMessage>(64);

    let dispatcher = Dispatcher::new(
        Arc::clone(&bot),
        converter,
        Workspace::new(temp_dir),
        Arc::clone(&stats),
        settings.max_concurrent_conversions,
        settings.max_download_bytes,
    );

    info!("Starting Telegram Sticker Converter Bot...");
    info!(
        "Max video length: {}s, sticker size: {}px, concurrent conversions: {}",
        settings.max_sticker_video_secs,
        settings.sticker_size,
        settings.max_concurrent_conversions
    );

    // Spawn dispatcher task
    let dispatcher_handle = tokio::spawn(async move {
        dispatcher.run(dispatch_rx).await;
    });

    info!("Bot is running. Use Ctrl+C to stop.");

    let reason = tokio::select! {
        () = receive_updates(&bot, &dispatch_tx) => "update stream ended",
        () = shutdown_signal() => "shutdown signal received",
    };
    info!("Stopping: {}", reason);

    // Cleanup
    info!("Shutting down...");
    let _ = dispatch_tx.send(DispatchMessage::Shutdown).await;
    let _ = dispatcher_handle.await;
    bot.disconnect();

    Ok(())
}

/// Feeds incoming messages to the dispatcher until the stream fails.
async fn receive_updates(bot: &TelegramBot, tx: &mpsc::Sender<DispatchMessage>) {
    loop {
        match bot.next_message().await {
            Ok(incoming) => {
                if tx
                    .send(DispatchMessage::Process(Box::new(incoming)))
                    .await
                    .is_err()
                {
                    error!("Dispatcher is gone, stopping update loop");
                    return;
                }
            }
            Err(e) => {
                error!("Update stream error: {}", e);
                return;
            }
        }
    }
}

/// Resolves on Ctrl+C, or SIGTERM on Unix (what `docker stop` sends).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
