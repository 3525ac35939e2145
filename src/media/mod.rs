//! Media handling module.
//!
//! Detects what a downloaded file really is, manages scratch files,
//! and drives `ffmpeg` to convert between stickers, images and videos.

mod converter;
mod detect;
mod ffmpeg;
mod workspace;

use std::time::Duration;

use thiserror::Error;

pub use converter::{StickerConverter, check_duration};
pub use detect::{
    IncomingMedia, MediaKind, SNIFF_LEN, SniffedType, TGS_MIME, sniff_bytes, sniff_file,
};
pub use ffmpeg::{Ffmpeg, ProbeInfo};
pub use workspace::{ScratchDir, ScratchFile, Workspace, scratch_name};

/// Errors that can occur while processing media.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("❌ Video is too long! Telegram stickers must be {max_secs} seconds or less.")]
    TooLong { duration_secs: f64, max_secs: f64 },

    #[error("❌ File is too large! I can only convert files up to {} MB.", .max_bytes / (1024 * 1024))]
    TooLarge { size_bytes: u64, max_bytes: u64 },

    #[error("Executable not found: {0}")]
    ToolNotFound(String),

    #[error("{tool} exited with {status}: {stderr_tail}")]
    Ffmpeg {
        tool: String,
        status: String,
        stderr_tail: String,
    },

    #[error("{tool} did not finish within {timeout:?}")]
    Timeout { tool: String, timeout: Duration },

    #[error("Could not determine media duration: {0}")]
    Probe(String),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Message shown to the user when this error is the user's to fix.
    #[must_use]
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::TooLong { .. } | Self::TooLarge { .. } => Some(self.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_long_message_matches_limit() {
        let err = MediaError::TooLong {
            duration_secs: 5.3,
            max_secs: 2.0,
        };
        assert_eq!(
            err.user_message().as_deref(),
            Some("❌ Video is too long! Telegram stickers must be 2 seconds or less.")
        );
    }

    #[test]
    fn test_too_large_message_in_megabytes() {
        let err = MediaError::TooLarge {
            size_bytes: 300 * 1024 * 1024,
            max_bytes: 20 * 1024 * 1024,
        };
        assert_eq!(
            err.user_message().as_deref(),
            Some("❌ File is too large! I can only convert files up to 20 MB.")
        );
    }

    #[test]
    fn test_internal_errors_have_no_user_message() {
        let err = MediaError::Probe("no duration".to_owned());
        assert!(err.user_message().is_none());
    }
}
