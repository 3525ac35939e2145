//! Media kind classification.
//!
//! Telegram tells us what it *thinks* a file is (mime type plus document
//! attributes). The downloaded bytes are then sniffed with `infer`, which
//! wins when the two disagree.

use std::fmt;
use std::path::Path;

use tracing::debug;

use super::MediaError;

/// Mime type Telegram uses for Lottie (TGS) animated stickers.
pub const TGS_MIME: &str = "application/x-tgsticker";

/// Number of leading bytes needed by `infer` to recognise every format we handle.
pub const SNIFF_LEN: usize = 8192;

/// What kind of media an incoming message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Static WEBP sticker.
    StaticSticker,
    /// Lottie (TGS) animated sticker.
    AnimatedSticker,
    /// WEBM video sticker.
    VideoSticker,
    /// Compressed photo.
    Photo,
    /// Regular video.
    Video,
    /// Round video message.
    VideoNote,
    /// Image sent as a file.
    ImageDocument,
    /// Video sent as a file.
    VideoDocument,
    /// Anything else.
    Unsupported,
}

impl MediaKind {
    /// Classifies a document from Telegram's declared metadata.
    #[must_use]
    pub fn from_document(mime: Option<&str>, is_sticker: bool, is_round: bool) -> Self {
        let mime = mime.unwrap_or_default().to_ascii_lowercase();

        if is_sticker || mime == TGS_MIME {
            return match mime.as_str() {
                TGS_MIME => Self::AnimatedSticker,
                "video/webm" => Self::VideoSticker,
                _ => Self::StaticSticker,
            };
        }

        if mime.starts_with("video/") {
            if is_round {
                Self::VideoNote
            } else {
                Self::Video
            }
        } else if mime.starts_with("image/") {
            Self::ImageDocument
        } else {
            Self::Unsupported
        }
    }

    /// Reconciles the declared kind with the content sniffed from disk.
    ///
    /// Stickers and round videos keep their kind since their Telegram
    /// attributes are authoritative; plain documents follow the content.
    #[must_use]
    pub fn refine(self, sniffed: Option<SniffedType>) -> Self {
        match (self, sniffed) {
            (_, None)
            | (
                Self::StaticSticker
                | Self::AnimatedSticker
                | Self::VideoSticker
                | Self::VideoNote
                | Self::Photo,
                _,
            ) => self,
            (_, Some(SniffedType::Image)) => Self::ImageDocument,
            (_, Some(SniffedType::Video)) => Self::VideoDocument,
            (_, Some(SniffedType::Other)) => Self::Unsupported,
        }
    }

    /// Whether the input is a video whose duration must be checked.
    #[must_use]
    pub const fn is_video_input(self) -> bool {
        matches!(self, Self::Video | Self::VideoNote | Self::VideoDocument)
    }

    /// Human-readable noun used in replies.
    #[must_use]
    pub const fn noun(self) -> &'static str {
        match self {
            Self::StaticSticker | Self::AnimatedSticker | Self::VideoSticker => "sticker",
            Self::Photo | Self::ImageDocument => "image",
            Self::Video | Self::VideoDocument => "video",
            Self::VideoNote => "video note",
            Self::Unsupported => "file",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StaticSticker => "static sticker",
            Self::AnimatedSticker => "animated sticker",
            Self::VideoSticker => "video sticker",
            Self::Photo => "photo",
            Self::Video => "video",
            Self::VideoNote => "video note",
            Self::ImageDocument => "image document",
            Self::VideoDocument => "video document",
            Self::Unsupported => "unsupported",
        };
        f.write_str(name)
    }
}

/// Coarse content type detected from file bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffedType {
    Image,
    Video,
    Other,
}

/// Media details extracted from an incoming message.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMedia {
    /// Declared kind.
    pub kind: MediaKind,

    /// Declared mime type, if any.
    pub mime_type: Option<String>,

    /// Original file name, if any.
    pub file_name: Option<String>,

    /// Declared duration in seconds for videos.
    pub duration_secs: Option<f64>,

    /// Declared file size in bytes, if Telegram reports one.
    pub size_bytes: Option<u64>,
}

impl IncomingMedia {
    /// Creates media info with only a kind.
    #[must_use]
    pub const fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            mime_type: None,
            file_name: None,
            duration_secs: None,
            size_bytes: None,
        }
    }

    /// File extension hinted by the sender, from the file name or else the mime type.
    #[must_use]
    pub fn declared_extension(&self) -> Option<String> {
        let from_name = self
            .file_name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .and_then(clean_extension);

        from_name.or_else(|| {
            self.mime_type
                .as_deref()
                .and_then(extension_for_mime)
                .map(str::to_owned)
        })
    }
}

/// Accepts short alphanumeric extensions only, lowercased.
fn clean_extension(ext: &str) -> Option<String> {
    let valid = (1..=5).contains(&ext.len()) && ext.bytes().all(|b| b.is_ascii_alphanumeric());
    valid.then(|| ext.to_ascii_lowercase())
}

fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let ext = match mime.to_ascii_lowercase().as_str() {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "video/x-matroska" => "mkv",
        TGS_MIME => "tgs",
        _ => return None,
    };
    Some(ext)
}

/// Classifies raw bytes.
#[must_use]
pub fn sniff_bytes(bytes: &[u8]) -> Option<SniffedType> {
    let kind = infer::get(bytes)?;
    let sniffed = match kind.matcher_type() {
        infer::MatcherType::Image => SniffedType::Image,
        infer::MatcherType::Video => SniffedType::Video,
        _ => SniffedType::Other,
    };
    debug!("Sniffed content as {} ({:?})", kind.mime_type(), sniffed);
    Some(sniffed)
}

/// Reads the head of a file and classifies it.
pub async fn sniff_file(path: &Path) -> Result<Option<SniffedType>, MediaError> {
    use tokio::io::AsyncReadExt;

    let file = tokio::fs::File::open(path).await?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut head).await?;

    Ok(sniff_bytes(&head))
}
