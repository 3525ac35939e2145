//! Per-kind conversion plans.
//!
//! A plan fixes everything about handling one kind of media: scratch file
//! names, which conversion runs, how the result is sent and what the user
//! reads while waiting or after a failure.

use crate::media::{IncomingMedia, MediaKind, TGS_MIME, scratch_name};
use crate::telegram::ReplyAs;

/// Conversion performed for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStep {
    /// Static sticker to PNG.
    StickerToImage,
    /// WEBM video sticker to MP4.
    VideoStickerToVideo,
    /// Send the downloaded file back unchanged.
    Passthrough,
    /// Image to WEBP sticker.
    ImageToSticker,
    /// Video to WEBM video sticker.
    VideoToSticker,
}

/// How one media message is processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionPlan {
    pub kind: MediaKind,
    pub step: ConversionStep,
    /// Scratch file name for the converted output, if any.
    pub output_file: Option<String>,
    pub progress_text: &'static str,
    pub caption: &'static str,
    pub reply_as: ReplyAs,
    /// Mime type the reply is labelled with, matching the output container.
    pub reply_mime: Option<&'static str>,
    pub failure_text: &'static str,
}

impl ConversionPlan {
    /// Builds the plan for a media kind, or `None` if it can't be converted.
    #[must_use]
    pub fn for_kind(kind: MediaKind, message_id: i32) -> Option<Self> {
        let output = |prefix: &str, ext: &str| Some(scratch_name(prefix, message_id, ext));

        let plan = match kind {
            MediaKind::StaticSticker => Self {
                kind,
                step: ConversionStep::StickerToImage,
                output_file: output("image", "png"),
                progress_text: "🔄 Converting sticker...",
                caption: "🖼️ Here's your sticker as an image!",
                reply_as: ReplyAs::Photo,
                reply_mime: None,
                failure_text: "❌ Failed to convert sticker. Please try again.",
            },
            MediaKind::VideoSticker => Self {
                kind,
                step: ConversionStep::VideoStickerToVideo,
                output_file: output("video", "mp4"),
                progress_text: "🔄 Converting sticker...",
                caption: "🎬 Here's your sticker as a video!",
                reply_as: ReplyAs::Video,
                reply_mime: Some("video/mp4"),
                failure_text: "❌ Failed to convert sticker. Please try again.",
            },
            MediaKind::AnimatedSticker => Self {
                kind,
                step: ConversionStep::Passthrough,
                output_file: None,
                progress_text: "🔄 Converting sticker...",
                caption: "🎬 Here's your sticker as a video!",
                reply_as: ReplyAs::Document,
                reply_mime: Some(TGS_MIME),
                failure_text: "❌ Failed to convert sticker. Please try again.",
            },
            MediaKind::Photo | MediaKind::ImageDocument => Self {
                kind,
                step: ConversionStep::ImageToSticker,
                output_file: output("sticker", "webp"),
                progress_text: "🔄 Converting image to sticker...",
                caption: "📸 Here's your image as a sticker!",
                reply_as: ReplyAs::Sticker,
                reply_mime: Some("image/webp"),
                failure_text: "❌ Failed to convert image. Please try again.",
            },
            MediaKind::Video | MediaKind::VideoDocument => Self {
                kind,
                step: ConversionStep::VideoToSticker,
                output_file: output("sticker", "webm"),
                progress_text: "🔄 Converting video to sticker...",
                caption: "🎬 Here's your video as an animated sticker!",
                reply_as: ReplyAs::Video,
                reply_mime: Some("video/webm"),
                failure_text: "❌ Failed to convert video. Please try again.",
            },
            MediaKind::VideoNote => Self {
                kind,
                step: ConversionStep::VideoToSticker,
                output_file: output("sticker", "webm"),
                progress_text: "🔄 Converting video note to sticker...",
                caption: "🎬 Here's your video note as an animated sticker!",
                reply_as: ReplyAs::Video,
                reply_mime: Some("video/webm"),
                failure_text: "❌ Failed to convert video note. Please try again.",
            },
            MediaKind::Unsupported => return None,
        };

        Some(plan)
    }
}

/// Scratch file name the incoming media is downloaded to.
///
/// Files sent as documents keep the extension the sender declared.
#[must_use]
pub fn input_file_name(media: &IncomingMedia, message_id: i32) -> String {
    let (prefix, ext) = match media.kind {
        MediaKind::StaticSticker => ("sticker", "webp"),
        MediaKind::VideoSticker => ("sticker", "webm"),
        MediaKind::AnimatedSticker => ("sticker", "tgs"),
        MediaKind::Photo | MediaKind::ImageDocument => ("photo", "jpg"),
        MediaKind::Video | MediaKind::VideoDocument => ("video", "mp4"),
        MediaKind::VideoNote => ("video_note", "mp4"),
        MediaKind::Unsupported => ("document", "bin"),
    };

    let declared = match media.kind {
        MediaKind::ImageDocument | MediaKind::VideoDocument | MediaKind::Unsupported => {
            media.declared_extension()
        }
        _ => None,
    };

    scratch_name(prefix, message_id, declared.as_deref().unwrap_or(ext))
}

/// Generic reply when something unexpected goes wrong.
#[must_use]
pub fn error_text(kind: MediaKind) -> String {
    format!("❌ An error occurred while processing your {}.", kind.noun())
}

/// Reply for media that can't be converted.
pub const UNSUPPORTED_TEXT: &str =
    "🤔 I can only convert stickers, photos, videos and video notes. Send me one of those!";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_sticker_plan() {
        let plan = ConversionPlan::for_kind(MediaKind::StaticSticker, 10).unwrap();
        assert_eq!(plan.step, ConversionStep::StickerToImage);
        assert_eq!(plan.output_file.as_deref(), Some("image_10.png"));
        assert_eq!(plan.reply_as, ReplyAs::Photo);
        assert_eq!(plan.caption, "🖼️ Here's your sticker as an image!");
        assert_eq!(
            input_file_name(&IncomingMedia::new(MediaKind::StaticSticker), 10),
            "sticker_10.webp"
        );
    }

    #[test]
    fn test_animated_sticker_is_passed_through() {
        let plan = ConversionPlan::for_kind(MediaKind::AnimatedSticker, 3).unwrap();
        assert_eq!(plan.step, ConversionStep::Passthrough);
        assert!(plan.output_file.is_none());
        assert_eq!(plan.reply_as, ReplyAs::Document);
    }

    #[test]
    fn test_photo_plan() {
        let plan = ConversionPlan::for_kind(MediaKind::Photo, 5).unwrap();
        assert_eq!(plan.step, ConversionStep::ImageToSticker);
        assert_eq!(plan.output_file.as_deref(), Some("sticker_5.webp"));
        assert_eq!(plan.reply_as, ReplyAs::Sticker);
        assert_eq!(
            input_file_name(&IncomingMedia::new(MediaKind::Photo), 5),
            "photo_5.jpg"
        );
    }

    #[test]
    fn test_video_note_plan() {
        let plan = ConversionPlan::for_kind(MediaKind::VideoNote, 8).unwrap();
        assert_eq!(plan.step, ConversionStep::VideoToSticker);
        assert_eq!(plan.output_file.as_deref(), Some("sticker_8.webm"));
        assert_eq!(plan.progress_text, "🔄 Converting video note to sticker...");
        assert_eq!(
            plan.failure_text,
            "❌ Failed to convert video note. Please try again."
        );
        assert_eq!(
            input_file_name(&IncomingMedia::new(MediaKind::VideoNote), 8),
            "video_note_8.mp4"
        );
    }

    #[test]
    fn test_unsupported_has_no_plan() {
        assert!(ConversionPlan::for_kind(MediaKind::Unsupported, 1).is_none());
        assert_eq!(
            input_file_name(&IncomingMedia::new(MediaKind::Unsupported), 1),
            "document_1.bin"
        );
    }

    #[test]
    fn test_every_supported_kind_has_distinct_io_files() {
        let kinds = [
            MediaKind::StaticSticker,
            MediaKind::VideoSticker,
            MediaKind::Photo,
            MediaKind::ImageDocument,
            MediaKind::Video,
            MediaKind::VideoDocument,
            MediaKind::VideoNote,
        ];
        for kind in kinds {
            let plan = ConversionPlan::for_kind(kind, 99).unwrap();
            let output = plan.output_file.unwrap();
            assert_ne!(output, input_file_name(&IncomingMedia::new(kind), 99), "{kind}");
        }
    }

    #[test]
    fn test_reply_mime_matches_output_container() {
        for kind in [MediaKind::Video, MediaKind::VideoDocument, MediaKind::VideoNote] {
            let plan = ConversionPlan::for_kind(kind, 1).unwrap();
            assert_eq!(plan.output_file.as_deref(), Some("sticker_1.webm"));
            assert_eq!(plan.reply_as, ReplyAs::Video);
            assert_eq!(plan.reply_mime, Some("video/webm"), "{kind}");
        }

        let plan = ConversionPlan::for_kind(MediaKind::VideoSticker, 1).unwrap();
        assert_eq!(plan.output_file.as_deref(), Some("video_1.mp4"));
        assert_eq!(plan.reply_mime, Some("video/mp4"));

        let plan = ConversionPlan::for_kind(MediaKind::Photo, 1).unwrap();
        assert_eq!(plan.reply_mime, Some("image/webp"));

        let plan = ConversionPlan::for_kind(MediaKind::AnimatedSticker, 1).unwrap();
        assert_eq!(plan.reply_mime, Some("application/x-tgsticker"));
    }

    #[test]
    fn test_document_input_keeps_declared_extension() {
        let png = IncomingMedia {
            mime_type: Some("image/png".to_owned()),
            file_name: Some("scan.png".to_owned()),
            ..IncomingMedia::new(MediaKind::ImageDocument)
        };
        assert_eq!(input_file_name(&png, 4), "photo_4.png");

        let mov = IncomingMedia {
            mime_type: Some("video/quicktime".to_owned()),
            ..IncomingMedia::new(MediaKind::VideoDocument)
        };
        assert_eq!(input_file_name(&mov, 4), "video_4.mov");

        // Compressed photos always arrive as JPEG
        let photo = IncomingMedia {
            file_name: Some("x.png".to_owned()),
            ..IncomingMedia::new(MediaKind::Photo)
        };
        assert_eq!(input_file_name(&photo, 4), "photo_4.jpg");
    }

    #[test]
    fn test_error_text() {
        assert_eq!(
            error_text(MediaKind::VideoNote),
            "❌ An error occurred while processing your video note."
        );
        assert_eq!(
            error_text(MediaKind::Photo),
            "❌ An error occurred while processing your image."
        );
    }
}
