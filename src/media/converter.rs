//! Sticker conversions built on `ffmpeg`.

use std::ffi::OsString;
use std::path::Path;

use tracing::{debug, info};

use super::{Ffmpeg, MediaError, ProbeInfo};

/// Performs all sticker conversion operations.
#[derive(Debug, Clone)]
pub struct StickerConverter {
    ffmpeg: Ffmpeg,
    sticker_size: u32,
    max_video_secs: f64,
}

impl StickerConverter {
    /// Creates a converter.
    #[must_use]
    pub const fn new(ffmpeg: Ffmpeg, sticker_size: u32, max_video_secs: f64) -> Self {
        Self {
            ffmpeg,
            sticker_size,
            max_video_secs,
        }
    }

    /// Longest video accepted by [`Self::video_to_sticker`].
    #[must_use]
    pub const fn max_video_secs(&self) -> f64 {
        self.max_video_secs
    }

    /// Side of the square stickers are fitted in.
    #[must_use]
    pub const fn sticker_size(&self) -> u32 {
        self.sticker_size
    }

    /// Converts a static sticker (WEBP) into a PNG image on a white background.
    pub async fn sticker_to_image(&self, input: &Path, output: &Path) -> Result<(), MediaError> {
        self.ffmpeg
            .run_ffmpeg(sticker_to_image_args(input, output))
            .await?;
        info!("Converted sticker to image: {}", output.display());
        Ok(())
    }

    /// Converts an image into a WEBP sticker, shrinking it to fit the sticker box.
    pub async fn image_to_sticker(&self, input: &Path, output: &Path) -> Result<(), MediaError> {
        self.ffmpeg
            .run_ffmpeg(image_to_sticker_args(input, output, self.sticker_size))
            .await?;
        info!("Converted image to sticker: {}", output.display());
        Ok(())
    }

    /// Converts a short video into a VP9 WEBM video sticker.
    ///
    /// Videos longer than the configured maximum are rejected with
    /// [`MediaError::TooLong`] before any encoding happens.
    pub async fn video_to_sticker(&self, input: &Path, output: &Path) -> Result<(), MediaError> {
        let duration_secs = self.ffmpeg.probe_duration(input).await?;
        self.check_duration(duration_secs)?;

        self.ffmpeg
            .run_ffmpeg(video_to_sticker_args(input, output, self.sticker_size))
            .await?;
        info!(
            "Converted {:.2}s video to sticker: {}",
            duration_secs,
            output.display()
        );
        Ok(())
    }

    /// Converts a WEBM video sticker into an MP4 that plays inline in chats.
    pub async fn video_sticker_to_video(
        &self,
        input: &Path,
        output: &Path,
    ) -> Result<(), MediaError> {
        self.ffmpeg
            .run_ffmpeg(video_sticker_to_video_args(input, output))
            .await?;
        info!("Converted video sticker to video: {}", output.display());
        Ok(())
    }

    /// Probes a (converted) file for the metadata Telegram wants with videos.
    pub async fn probe(&self, path: &Path) -> Result<ProbeInfo, MediaError> {
        self.ffmpeg.probe(path).await
    }

    /// Rejects durations over the configured limit.
    pub fn check_duration(&self, duration_secs: f64) -> Result<(), MediaError> {
        check_duration(duration_secs, self.max_video_secs)
    }
}

/// Rejects videos longer than `max_secs`.
pub fn check_duration(duration_secs: f64, max_secs: f64) -> Result<(), MediaError> {
    if duration_secs > max_secs {
        debug!("Rejecting {:.2}s video (limit {}s)", duration_secs, max_secs);
        return Err(MediaError::TooLong {
            duration_secs,
            max_secs,
        });
    }
    Ok(())
}

fn args<const N: usize>(flags: [&str; N]) -> Vec<OsString> {
    flags.into_iter().map(OsString::from).collect()
}

fn input_args(input: &Path) -> Vec<OsString> {
    let mut list = args(["-hide_banner", "-loglevel", "error", "-y", "-i"]);
    list.push(input.as_os_str().to_owned());
    list
}

fn sticker_to_image_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut list = input_args(input);
    list.extend(args([
        "-filter_complex",
        "color=c=white,format=rgb24[bg];[bg][0:v]scale2ref[bg][img];\
         [bg][img]overlay=shortest=1:format=auto,format=rgb24",
        "-frames:v",
        "1",
        "-c:v",
        "png",
    ]));
    list.push(output.as_os_str().to_owned());
    list
}

fn image_to_sticker_args(input: &Path, output: &Path, size: u32) -> Vec<OsString> {
    let mut list = input_args(input);
    list.push("-vf".into());
    list.push(
        format!(
            "scale='min({size},iw)':'min({size},ih)':force_original_aspect_ratio=decrease,format=rgba"
        )
        .into(),
    );
    list.extend(args([
        "-frames:v",
        "1",
        "-c:v",
        "libwebp",
        "-lossless",
        "0",
        "-quality",
        "95",
    ]));
    list.push(output.as_os_str().to_owned());
    list
}

fn video_to_sticker_args(input: &Path, output: &Path, size: u32) -> Vec<OsString> {
    let mut list = input_args(input);
    list.push("-vf".into());
    list.push(format!("scale={size}:{size}:force_original_aspect_ratio=decrease").into());
    list.extend(args([
        "-an",
        "-c:v",
        "libvpx-vp9",
        "-pix_fmt",
        "yuva420p",
        "-b:v",
        "0",
        "-crf",
        "32",
        "-deadline",
        "good",
        "-f",
        "webm",
    ]));
    list.push(output.as_os_str().to_owned());
    list
}

fn video_sticker_to_video_args(input: &Path, output: &Path) -> Vec<OsString> {
    // libvpx decodes the alpha plane that the native VP9 decoder drops.
    let mut list = args(["-hide_banner", "-loglevel", "error", "-y", "-c:v", "libvpx-vp9", "-i"]);
    list.push(input.as_os_str().to_owned());
    list.extend(args([
        "-an",
        "-vf",
        "scale=trunc(iw/2)*2:trunc(ih/2)*2",
        "-c:v",
        "libx264",
        "-pix_fmt",
        "yuv420p",
        "-movflags",
        "+faststart",
    ]));
    list.push(output.as_os_str().to_owned());
    list
}
