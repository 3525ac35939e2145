//! Telegram client wrapper for the bot account.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use grammers_client::client::{UpdateStream, UpdatesConfiguration};
use grammers_client::media::{Attribute, Document, Media};
use grammers_client::message::{InputMessage, Message};
use grammers_client::update::Update;
use grammers_client::{sender, Client, InvocationError, SenderPool};
use grammers_session::storages::SqliteSession;
use grammers_tl_types as tl;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::RateLimiter;
use crate::config::TelegramConfig;
use crate::media::{IncomingMedia, MediaKind, ProbeInfo};

/// Errors that can occur during Telegram operations.
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Bot sign in failed: {0}")]
    SignInFailed(String),

    #[error("Flood wait required: {0} seconds")]
    FloodWait(u32),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Message carries no downloadable media")]
    NoMedia,

    #[error("File transfer failed: {0}")]
    Transfer(#[from] std::io::Error),

    #[error("API invocation error: {0}")]
    Invocation(String),
}

impl From<InvocationError> for TelegramError {
    fn from(err: InvocationError) -> Self {
        if let InvocationError::Rpc(rpc) = &err
            && rpc.name == "FLOOD_WAIT"
            && let Some(seconds) = rpc.value
        {
            return Self::FloodWait(seconds);
        }

        let err_str = err.to_string();

        // Check for flood wait errors
        if (err_str.contains("FLOOD_WAIT") || err_str.contains("flood"))
            && let Some(seconds) = extract_flood_wait_seconds(&err_str)
        {
            return Self::FloodWait(seconds);
        }

        Self::Invocation(err_str)
    }
}

/// Extracts flood wait seconds from an error message.
fn extract_flood_wait_seconds(err_msg: &str) -> Option<u32> {
    let patterns = ["FLOOD_WAIT_", "flood wait "];
    // ASCII lowercasing keeps byte offsets valid for slicing `err_msg`
    let lowered = err_msg.to_ascii_lowercase();

    for pattern in patterns {
        if let Some(idx) = lowered.find(&pattern.to_ascii_lowercase()) {
            let start = idx + pattern.len();
            let num_str: String = err_msg[start..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            if let Ok(seconds) = num_str.parse() {
                return Some(seconds);
            }
        }
    }
    None
}

/// How a converted file is sent back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyAs {
    /// Compressed photo.
    Photo,
    /// Inline-playable video.
    Video,
    /// WEBP sticker.
    Sticker,
    /// Plain file, unchanged.
    Document,
}

/// An incoming, non-outgoing message together with its extracted media.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    message: Message,

    /// Media details, if the message carries any.
    pub media: Option<IncomingMedia>,
}

impl IncomingMessage {
    fn new(message: Message) -> Self {
        let media = message.media().as_ref().and_then(describe_media);
        Self { message, media }
    }

    /// Message ID within its chat.
    #[must_use]
    pub fn id(&self) -> i32 {
        self.message.id()
    }

    /// Message text (or caption).
    #[must_use]
    pub fn text(&self) -> &str {
        self.message.text()
    }
}

/// Maps grammers media into our own description.
fn describe_media(media: &Media) -> Option<IncomingMedia> {
    match media {
        Media::Photo(_) => Some(IncomingMedia::new(MediaKind::Photo)),
        Media::Sticker(sticker) => Some(describe_document(&sticker.document, true)),
        Media::Document(document) => Some(describe_document(document, false)),
        _ => None,
    }
}

fn describe_document(document: &Document, is_sticker: bool) -> IncomingMedia {
    let Some(tl::enums::Document::Document(raw)) = &document.raw.document else {
        return IncomingMedia::new(MediaKind::Unsupported);
    };

    let mut is_sticker = is_sticker;
    let mut is_round = false;
    let mut duration_secs = None;
    let mut file_name = None;

    for attribute in &raw.attributes {
        match attribute {
            tl::enums::DocumentAttribute::Sticker(_) => is_sticker = true,
            tl::enums::DocumentAttribute::Video(video) => {
                is_round = video.round_message;
                duration_secs = Some(f64::from(video.duration));
            }
            tl::enums::DocumentAttribute::Filename(name) => {
                file_name = Some(name.file_name.clone());
            }
            _ => {}
        }
    }

    let kind = MediaKind::from_document(Some(&raw.mime_type), is_sticker, is_round);

    IncomingMedia {
        kind,
        mime_type: Some(raw.mime_type.clone()),
        file_name,
        duration_secs: duration_secs.filter(|_| kind.is_video_input()),
        size_bytes: u64::try_from(raw.size).ok(),
    }
}

/// High-level Telegram client wrapper for a bot account.
pub struct TelegramBot {
    /// The underlying grammers client.
    client: Client,

    /// Handle to the sender pool for disconnection.
    handle: sender::SenderPoolHandle,

    /// Update stream, consumed by a single reader.
    updates: Mutex<UpdateStream>,

    /// Rate limiter for outgoing requests.
    rate_limiter: RateLimiter,

    /// Background task running the sender pool.
    _pool_task: JoinHandle<()>,
}

impl TelegramBot {
    /// Connects to Telegram and signs in with the bot token if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if connection or sign in fails.
    pub async fn connect(
        config: &TelegramConfig,
        min_send_interval_ms: u64,
    ) -> Result<Self, TelegramError> {
        info!("Connecting to Telegram...");

        let session = Arc::new(
            SqliteSession::open(&config.session_path)
                .await
                .map_err(|e| TelegramError::Session(e.to_string()))?,
        );

        let SenderPool {
            runner,
            updates,
            handle,
        } = SenderPool::new(Arc::clone(&session), config.api_id);

        let client = Client::new(handle.clone());

        // Spawn the sender pool runner
        let pool_task = tokio::spawn(async move {
            runner.run().await;
        });

        let is_authorized = client
            .is_authorized()
            .await
            .map_err(|e| TelegramError::Connection(e.to_string()))?;

        if is_authorized {
            info!("Connected to Telegram with existing bot session");
        } else {
            info!("Signing in with bot token...");
            let user = client
                .bot_sign_in(&config.bot_token, &config.api_hash)
                .await
                .map_err(|e| TelegramError::SignInFailed(e.to_string()))?;
            info!(
                "Signed in as @{}",
                user.username().unwrap_or("<no username>")
            );
        }

        let updates = client
            .stream_updates(
                updates,
                UpdatesConfiguration {
                    catch_up: false,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| TelegramError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            handle: handle.thin,
            updates: Mutex::new(updates),
            rate_limiter: RateLimiter::from_millis(min_send_interval_ms),
            _pool_task: pool_task,
        })
    }

    /// Waits for the next incoming message, skipping other updates.
    ///
    /// # Errors
    ///
    /// Returns an error if the update stream fails.
    pub async fn next_message(&self) -> Result<IncomingMessage, TelegramError> {
        let mut updates = self.updates.lock().await;
        loop {
            match updates.next().await? {
                Update::NewMessage(message) if !message.outgoing() => {
                    return Ok(IncomingMessage::new(message.into_inner()));
                }
                _ => debug!("Ignoring non-message update"),
            }
        }
    }

    /// Downloads the media of a message to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the message has no media or the download fails.
    pub async fn download(
        &self,
        incoming: &IncomingMessage,
        path: &Path,
    ) -> Result<(), TelegramError> {
        let media = incoming.message.media().ok_or(TelegramError::NoMedia)?;
        debug!("Downloading media of message {} to {}", incoming.id(), path.display());
        self.client.download_media(&media, path).await?;
        Ok(())
    }

    /// Downloads at most the first `len` bytes of a message's media.
    ///
    /// # Errors
    ///
    /// Returns an error if the message has no media or the download fails.
    pub async fn download_head(
        &self,
        incoming: &IncomingMessage,
        len: usize,
    ) -> Result<Vec<u8>, TelegramError> {
        let media = incoming.message.media().ok_or(TelegramError::NoMedia)?;
        let mut download = self.client.iter_download(&media);

        let mut head = Vec::with_capacity(len);
        while head.len() < len {
            match download.next().await? {
                Some(chunk) => head.extend_from_slice(&chunk),
                None => break,
            }
        }
        head.truncate(len);

        debug!("Fetched {} head bytes of message {}", head.len(), incoming.id());
        Ok(head)
    }

    /// Replies with plain text and returns the sent message.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails.
    pub async fn reply_text(
        &self,
        incoming: &IncomingMessage,
        text: &str,
    ) -> Result<Message, TelegramError> {
        self.send(|| incoming.message.reply(InputMessage::new().text(text)))
            .await
    }

    /// Uploads `path` and replies with it in the requested form.
    ///
    /// `mime` labels document uploads (it must match the file's container).
    /// `probe` carries video metadata for [`ReplyAs::Video`]; stickers
    /// can't have captions, so for them the caption follows as text.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload or sending fails.
    pub async fn reply_file(
        &self,
        incoming: &IncomingMessage,
        path: &Path,
        reply_as: ReplyAs,
        mime: Option<&str>,
        caption: &str,
        probe: Option<ProbeInfo>,
    ) -> Result<(), TelegramError> {
        let uploaded = self.client.upload_file(path).await?;
        debug!("Uploaded {} as {:?} ({:?})", path.display(), reply_as, mime);

        let document = |base: InputMessage| {
            let base = base.document(uploaded.clone());
            match mime {
                Some(mime) => base.mime_type(mime),
                None => base,
            }
        };

        let build = || {
            let base = InputMessage::new();
            match reply_as {
                ReplyAs::Photo => base.text(caption).photo(uploaded.clone()),
                ReplyAs::Video => {
                    let info = probe.unwrap_or_default();
                    document(base.text(caption))
                        .attribute(Attribute::Video {
                            round_message: false,
                            supports_streaming: true,
                            duration: Duration::from_secs_f64(info.duration_secs.unwrap_or(0.0)),
                            w: dimension(info.width),
                            h: dimension(info.height),
                        })
                }
                ReplyAs::Sticker => document(base),
                ReplyAs::Document => document(base.text(caption)),
            }
        };

        self.send(|| incoming.message.reply(build())).await?;

        if reply_as == ReplyAs::Sticker && !caption.is_empty() {
            self.reply_text(incoming, caption).await?;
        }

        Ok(())
    }

    /// Deletes a message previously sent by the bot.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    pub async fn delete(&self, message: &Message) -> Result<(), TelegramError> {
        self.send(|| message.delete()).await
    }

    /// Runs a request through the rate limiter, retrying once after a flood wait.
    async fn send<T, F, Fut>(&self, mut request: F) -> Result<T, TelegramError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, InvocationError>>,
    {
        let waited = self.rate_limiter.wait_and_acquire().await;
        if !waited.is_zero() {
            debug!("Waited {:?} for rate limit", waited);
        }

        match request().await {
            Ok(value) => Ok(value),
            Err(e) => match TelegramError::from(e) {
                TelegramError::FloodWait(seconds) => {
                    warn!("Flood wait triggered: {} seconds, retrying once", seconds);
                    self.rate_limiter.handle_flood_wait(seconds).await;
                    self.rate_limiter.wait_and_acquire().await;
                    request().await.map_err(TelegramError::from)
                }
                err => Err(err),
            },
        }
    }

    /// Disconnects from Telegram.
    pub fn disconnect(&self) {
        info!("Disconnecting from Telegram...");
        self.handle.quit();
    }
}

impl std::fmt::Debug for TelegramBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBot")
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

/// Converts a probed dimension into the `i32` Telegram expects.
fn dimension(value: Option<u32>) -> i32 {
    value.and_then(|v| i32::try_from(v).ok()).unwrap_or(0)
}
