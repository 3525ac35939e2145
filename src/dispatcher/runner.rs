//! Message dispatcher.
//!
//! Every incoming message becomes a job on its own task:
//! 1. Commands are answered right away
//! 2. Media is checked against cheap limits (declared size and video duration)
//! 3. Undeclared documents are sniffed from their first bytes; the file is
//!    then downloaded into a per-job scratch directory and sniffed again
//! 4. A conversion permit is acquired, the conversion runs, the result is sent
//! 5. The progress message is deleted and the job's scratch directory removed
//!
//! Conversions are bounded by a semaphore since each one is an ffmpeg process.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::sync::{RwLock, Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::DispatchStats;
use super::plan::{ConversionPlan, ConversionStep, UNSUPPORTED_TEXT, error_text, input_file_name};
use crate::commands::CommandHandler;
use crate::media::{
    IncomingMedia, MediaError, MediaKind, SNIFF_LEN, ScratchFile, StickerConverter, Workspace,
    check_duration, sniff_bytes, sniff_file,
};
use crate::telegram::{IncomingMessage, Message, ReplyAs, TelegramBot, TelegramError};

/// Messages that can be sent to the dispatcher.
#[derive(Debug)]
pub enum DispatchMessage {
    /// Handle an incoming message.
    Process(Box<IncomingMessage>),
    /// Stop accepting work and wait for running jobs.
    Shutdown,
}

/// Why a single job failed.
#[derive(Debug, Error)]
enum JobError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Telegram(#[from] TelegramError),
}

/// Shared state every job needs.
struct JobContext {
    bot: Arc<TelegramBot>,
    converter: StickerConverter,
    workspace: Workspace,
    commands: CommandHandler,
    stats: Arc<RwLock<DispatchStats>>,
    permits: Semaphore,
    next_job: AtomicU64,
    max_download_bytes: u64,
}

/// Dispatches incoming messages to conversion jobs.
pub struct Dispatcher {
    ctx: Arc<JobContext>,
}

impl Dispatcher {
    /// Creates a new dispatcher.
    #[must_use]
    pub fn new(
        bot: Arc<TelegramBot>,
        converter: StickerConverter,
        workspace: Workspace,
        stats: Arc<RwLock<DispatchStats>>,
        max_concurrent_conversions: usize,
        max_download_bytes: u64,
    ) -> Self {
        let commands = CommandHandler::new(
            Arc::clone(&stats),
            converter.max_video_secs(),
            converter.sticker_size(),
        );

        Self {
            ctx: Arc::new(JobContext {
                bot,
                converter,
                workspace,
                commands,
                stats,
                permits: Semaphore::new(max_concurrent_conversions.max(1)),
                next_job: AtomicU64::new(1),
                max_download_bytes,
            }),
        }
    }

    /// Runs the dispatch loop until shutdown.
    pub async fn run(&self, mut rx: mpsc::Receiver<DispatchMessage>) {
        info!("Dispatcher started");

        let mut jobs = JoinSet::new();

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(DispatchMessage::Process(incoming)) => {
                            let ctx = Arc::clone(&self.ctx);
                            jobs.spawn(async move { ctx.handle(&incoming).await });
                        }
                        Some(DispatchMessage::Shutdown) | None => {
                            info!("Dispatcher shutting down");
                            break;
                        }
                    }
                }
                Some(finished) = jobs.join_next(), if !jobs.is_empty() => {
                    if let Err(e) = finished {
                        error!("Job task panicked: {}", e);
                    }
                }
            }
        }

        if !jobs.is_empty() {
            info!("Waiting for {} running job(s)...", jobs.len());
        }
        while let Some(finished) = jobs.join_next().await {
            if let Err(e) = finished {
                error!("Job task panicked: {}", e);
            }
        }

        let stats = self.ctx.stats.read().await;
        match serde_json::to_string(&*stats) {
            Ok(summary) => info!("Dispatcher stopped: {}", summary),
            Err(e) => warn!("Failed to serialize stats: {}", e),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("workspace", &self.ctx.workspace.root())
            .field("available_permits", &self.ctx.permits.available_permits())
            .field("max_download_bytes", &self.ctx.max_download_bytes)
            .finish_non_exhaustive()
    }
}

impl JobContext {
    async fn handle(&self, incoming: &IncomingMessage) {
        if let Some(media) = &incoming.media {
            self.handle_media(incoming, media).await;
        } else if let Some(result) = self.commands.try_handle(incoming.text()).await {
            if let Err(e) = self.bot.reply_text(incoming, &result.message).await {
                warn!("Failed to answer command: {}", e);
            }
        } else {
            debug!("Ignoring message {} without media", incoming.id());
        }
    }

    async fn handle_media(&self, incoming: &IncomingMessage, media: &IncomingMedia) {
        let message_id = incoming.id();
        info!("Message {}: received {}", message_id, media.kind);
        self.stats.write().await.record_received();

        let mut progress = None;
        let result = match precheck(media, self.converter.max_video_secs(), self.max_download_bytes)
        {
            Ok(()) => self.run_job(incoming, media, &mut progress).await,
            Err(rejected) => Err(rejected),
        };

        record_outcome(&mut *self.stats.write().await, &result);

        if let Err(err) = &result {
            match err {
                ProcessError::Rejected(_) => info!("Message {}: rejected", message_id),
                ProcessError::Failed { kind, source, .. } => {
                    error!("Message {}: error converting {}: {}", message_id, kind, source);
                }
            }
            if let Err(e) = self.bot.reply_text(incoming, err.user_text()).await {
                warn!("Failed to report outcome: {}", e);
            }
        }

        if let Some(progress) = progress
            && let Err(e) = self.bot.delete(&progress).await
        {
            debug!("Could not delete progress message: {}", e);
        }
    }

    /// Runs one media job inside its own scratch directory.
    async fn run_job(
        &self,
        incoming: &IncomingMessage,
        media: &IncomingMedia,
        progress: &mut Option<Message>,
    ) -> Result<(), ProcessError> {
        let declared = media.kind;

        // Documents of unknown type: fetch just enough to sniff before committing
        if declared == MediaKind::Unsupported {
            let head = self
                .bot
                .download_head(incoming, SNIFF_LEN)
                .await
                .map_err(|e| ProcessError::unexpected(declared, e))?;
            let kind = check_head(declared, &head)?;
            debug!("Message {}: head sniffed as {}", incoming.id(), kind);
        }

        // Message IDs are only unique per chat, so each job gets its own directory
        let job_id = self.next_job.fetch_add(1, Ordering::Relaxed);
        let scope = self
            .workspace
            .scope(&format!("job_{job_id}"))
            .await
            .map_err(|e| ProcessError::unexpected(declared, MediaError::Io(e)))?;

        if let Some(plan) = ConversionPlan::for_kind(declared, incoming.id()) {
            *progress = self.send_progress(incoming, plan.progress_text).await;
        }

        let result = self
            .process(scope.workspace(), incoming, media, progress)
            .await;
        scope.close().await;
        result
    }

    /// Downloads, sniffs, converts and replies.
    async fn process(
        &self,
        workspace: &Workspace,
        incoming: &IncomingMessage,
        media: &IncomingMedia,
        progress: &mut Option<Message>,
    ) -> Result<(), ProcessError> {
        let message_id = incoming.id();
        let declared = media.kind;

        let input = workspace.named(&input_file_name(media, message_id));
        self.bot
            .download(incoming, input.path())
            .await
            .map_err(|e| ProcessError::unexpected(declared, e))?;

        let sniffed = sniff_file(input.path())
            .await
            .map_err(|e| ProcessError::unexpected(declared, e))?;
        let kind = declared.refine(sniffed);
        if kind != declared {
            debug!(
                "Message {}: content says {} instead of {}",
                message_id, kind, declared
            );
        }

        let Some(plan) = ConversionPlan::for_kind(kind, message_id) else {
            return Err(ProcessError::Rejected(UNSUPPORTED_TEXT.to_owned()));
        };

        if progress.is_none() {
            *progress = self.send_progress(incoming, plan.progress_text).await;
        }

        self.convert_and_reply(workspace, incoming, &plan, &input)
            .await
            .map_err(|e| classify(&plan, e))
    }

    async fn convert_and_reply(
        &self,
        workspace: &Workspace,
        incoming: &IncomingMessage,
        plan: &ConversionPlan,
        input: &ScratchFile,
    ) -> Result<(), JobError> {
        let output: Option<ScratchFile> = plan
            .output_file
            .as_deref()
            .map(|name| workspace.named(name));

        let reply_path = match (&output, plan.step) {
            (None, _) | (_, ConversionStep::Passthrough) => input.path(),
            (Some(output), step) => {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|e| MediaError::Io(std::io::Error::other(e)))?;

                let (src, dst) = (input.path(), output.path());
                match step {
                    ConversionStep::StickerToImage => {
                        self.converter.sticker_to_image(src, dst).await?;
                    }
                    ConversionStep::VideoStickerToVideo => {
                        self.converter.video_sticker_to_video(src, dst).await?;
                    }
                    ConversionStep::ImageToSticker => {
                        self.converter.image_to_sticker(src, dst).await?;
                    }
                    ConversionStep::VideoToSticker => {
                        self.converter.video_to_sticker(src, dst).await?;
                    }
                    ConversionStep::Passthrough => {}
                }
                dst
            }
        };

        let probe = if plan.reply_as == ReplyAs::Video {
            self.converter.probe(reply_path).await.ok()
        } else {
            None
        };

        self.bot
            .reply_file(
                incoming,
                reply_path,
                plan.reply_as,
                plan.reply_mime,
                plan.caption,
                probe,
            )
            .await?;

        info!("Message {}: sent {} result", incoming.id(), plan.kind);
        Ok(())
    }

    async fn send_progress(&self, incoming: &IncomingMessage, text: &str) -> Option<Message> {
        match self.bot.reply_text(incoming, text).await {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("Failed to send progress message: {}", e);
                None
            }
        }
    }
}

/// Outcome of a job that did not deliver a conversion.
#[derive(Debug)]
enum ProcessError {
    /// The input was refused; the text explains why.
    Rejected(String),
    /// Something broke; the user sees `user_text`.
    Failed {
        kind: MediaKind,
        user_text: String,
        source: Box<JobError>,
    },
}

impl ProcessError {
    fn unexpected(kind: MediaKind, source: impl Into<JobError>) -> Self {
        Self::Failed {
            kind,
            user_text: error_text(kind),
            source: Box::new(source.into()),
        }
    }

    fn user_text(&self) -> &str {
        match self {
            Self::Rejected(text) | Self::Failed { user_text: text, .. } => text,
        }
    }
}

/// Checks declared metadata before anything is downloaded.
fn precheck(
    media: &IncomingMedia,
    max_video_secs: f64,
    max_download_bytes: u64,
) -> Result<(), ProcessError> {
    if let Some(size_bytes) = media.size_bytes
        && size_bytes > max_download_bytes
    {
        let err = MediaError::TooLarge {
            size_bytes,
            max_bytes: max_download_bytes,
        };
        return Err(ProcessError::Rejected(err.to_string()));
    }

    if media.kind.is_video_input()
        && let Some(duration) = media.duration_secs
    {
        check_duration(duration, max_video_secs)
            .map_err(|e| ProcessError::Rejected(e.to_string()))?;
    }

    Ok(())
}

/// Decides from the first bytes whether a document is worth downloading.
fn check_head(declared: MediaKind, head: &[u8]) -> Result<MediaKind, ProcessError> {
    let kind = declared.refine(sniff_bytes(head));
    if kind == MediaKind::Unsupported {
        return Err(ProcessError::Rejected(UNSUPPORTED_TEXT.to_owned()));
    }
    Ok(kind)
}

/// Maps a conversion or delivery error to what the user is told.
fn classify(plan: &ConversionPlan, err: JobError) -> ProcessError {
    match err {
        JobError::Media(source) => match source.user_message() {
            Some(text) => ProcessError::Rejected(text),
            None => ProcessError::Failed {
                kind: plan.kind,
                user_text: plan.failure_text.to_owned(),
                source: Box::new(JobError::Media(source)),
            },
        },
        JobError::Telegram(_) => ProcessError::unexpected(plan.kind, err),
    }
}

fn record_outcome(stats: &mut DispatchStats, result: &Result<(), ProcessError>) {
    match result {
        Ok(()) => stats.record_converted(),
        Err(ProcessError::Rejected(_)) => stats.record_rejected(),
        Err(ProcessError::Failed { .. }) => stats.record_failed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_BYTES: u64 = 20 * 1024 * 1024;
    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];
    const ZIP_HEADER: &[u8] = &[b'P', b'K', 0x03, 0x04, 0x14, 0x00, 0x00, 0x00, 0x08, 0x00];

    fn video(duration_secs: f64) -> IncomingMedia {
        IncomingMedia {
            duration_secs: Some(duration_secs),
            ..IncomingMedia::new(MediaKind::Video)
        }
    }

    #[test]
    fn test_long_declared_video_is_rejected_not_failed() {
        let result = precheck(&video(2.5), 2.0, MAX_BYTES);
        match &result {
            Err(ProcessError::Rejected(text)) => assert_eq!(
                text,
                "❌ Video is too long! Telegram stickers must be 2 seconds or less."
            ),
            other => panic!("expected rejection, got {other:?}"),
        }

        let mut stats = DispatchStats::new();
        stats.record_received();
        record_outcome(&mut stats, &result);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.in_flight(), 0);
    }

    #[test]
    fn test_short_video_passes_precheck() {
        assert!(precheck(&video(1.5), 2.0, MAX_BYTES).is_ok());
        assert!(precheck(&video(2.0), 2.0, MAX_BYTES).is_ok());
        assert!(precheck(&IncomingMedia::new(MediaKind::Video), 2.0, MAX_BYTES).is_ok());
    }

    #[test]
    fn test_duration_ignored_for_non_video_kinds() {
        let sticker = IncomingMedia {
            duration_secs: Some(3.0),
            ..IncomingMedia::new(MediaKind::VideoSticker)
        };
        assert!(precheck(&sticker, 2.0, MAX_BYTES).is_ok());
    }

    #[test]
    fn test_oversized_document_rejected_before_download() {
        let archive = IncomingMedia {
            mime_type: Some("application/zip".to_owned()),
            size_bytes: Some(2 * 1024 * 1024 * 1024),
            ..IncomingMedia::new(MediaKind::Unsupported)
        };
        match precheck(&archive, 2.0, MAX_BYTES) {
            Err(ProcessError::Rejected(text)) => assert_eq!(
                text,
                "❌ File is too large! I can only convert files up to 20 MB."
            ),
            other => panic!("expected rejection, got {other:?}"),
        }

        let small = IncomingMedia {
            size_bytes: Some(MAX_BYTES),
            ..IncomingMedia::new(MediaKind::ImageDocument)
        };
        assert!(precheck(&small, 2.0, MAX_BYTES).is_ok());
    }

    #[test]
    fn test_check_head_rejects_unconvertible_documents() {
        for head in [ZIP_HEADER, b"plain text, nothing to see".as_slice()] {
            match check_head(MediaKind::Unsupported, head) {
                Err(ProcessError::Rejected(text)) => assert_eq!(text, UNSUPPORTED_TEXT),
                other => panic!("expected rejection, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_check_head_accepts_mislabelled_image() {
        let kind = check_head(MediaKind::Unsupported, PNG_HEADER).unwrap();
        assert_eq!(kind, MediaKind::ImageDocument);
    }

    #[test]
    fn test_classify_too_long_is_rejection() {
        let plan = ConversionPlan::for_kind(MediaKind::Video, 1).unwrap();
        let err = JobError::Media(MediaError::TooLong {
            duration_secs: 4.0,
            max_secs: 2.0,
        });
        match classify(&plan, err) {
            ProcessError::Rejected(text) => assert!(text.starts_with("❌ Video is too long!")),
            ProcessError::Failed { .. } => panic!("expected rejection"),
        }
    }

    #[test]
    fn test_classify_conversion_failure_uses_plan_text() {
        let plan = ConversionPlan::for_kind(MediaKind::StaticSticker, 1).unwrap();
        let err = JobError::Media(MediaError::Ffmpeg {
            tool: "ffmpeg".to_owned(),
            status: "exit status: 1".to_owned(),
            stderr_tail: "Invalid data found".to_owned(),
        });
        let outcome = classify(&plan, err);
        assert_eq!(
            outcome.user_text(),
            "❌ Failed to convert sticker. Please try again."
        );

        let mut stats = DispatchStats::new();
        stats.record_received();
        record_outcome(&mut stats, &Err(outcome));
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.rejected, 0);
    }

    #[test]
    fn test_classify_delivery_failure_uses_generic_text() {
        let plan = ConversionPlan::for_kind(MediaKind::VideoNote, 1).unwrap();
        let outcome = classify(&plan, JobError::Telegram(TelegramError::NoMedia));
        assert_eq!(
            outcome.user_text(),
            "❌ An error occurred while processing your video note."
        );
        match outcome {
            ProcessError::Failed { source, .. } => {
                assert!(matches!(*source, JobError::Telegram(TelegramError::NoMedia)));
            }
            ProcessError::Rejected(_) => panic!("expected failure"),
        }
    }

    #[test]
    fn test_record_outcome_counts_conversions() {
        let mut stats = DispatchStats::new();
        stats.record_received();
        stats.record_received();
        record_outcome(&mut stats, &Ok(()));
        assert_eq!(stats.converted, 1);
        assert_eq!(stats.in_flight(), 1);
    }

    #[test]
    fn test_unexpected_uses_generic_text() {
        let err = ProcessError::unexpected(MediaKind::Video, TelegramError::NoMedia);
        assert_eq!(err.user_text(), "❌ An error occurred while processing your video.");
    }

    #[test]
    fn test_job_error_is_transparent() {
        let err = JobError::from(MediaError::Probe("bad".to_owned()));
        assert_eq!(err.to_string(), "Could not determine media duration: bad");
    }
}
