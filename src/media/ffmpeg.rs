//! `ffmpeg` / `ffprobe` process runner.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use super::MediaError;

/// How much of stderr is kept for error messages.
const STDERR_TAIL_CHARS: usize = 400;

/// Resolved `ffmpeg` and `ffprobe` executables plus a run timeout.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    timeout: Duration,
}

impl Ffmpeg {
    /// Creates a runner from already resolved executables.
    #[must_use]
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf, timeout: Duration) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            timeout,
        }
    }

    /// Resolves both executables through `PATH` (or as given paths).
    ///
    /// # Errors
    ///
    /// Returns [`MediaError::ToolNotFound`] if either cannot be found.
    pub fn locate(ffmpeg: &str, ffprobe: &str, timeout: Duration) -> Result<Self, MediaError> {
        let resolve = |name: &str| {
            which::which(name).map_err(|_| MediaError::ToolNotFound(name.to_owned()))
        };

        let runner = Self::new(resolve(ffmpeg)?, resolve(ffprobe)?, timeout);
        debug!(
            "Using ffmpeg at {} and ffprobe at {}",
            runner.ffmpeg.display(),
            runner.ffprobe.display()
        );
        Ok(runner)
    }

    /// Runs `ffmpeg` with the given arguments.
    pub async fn run_ffmpeg(&self, args: Vec<OsString>) -> Result<(), MediaError> {
        run_tool(&self.ffmpeg, args, self.timeout).await?;
        Ok(())
    }

    /// Reads duration and frame size of a media file.
    pub async fn probe(&self, input: &Path) -> Result<ProbeInfo, MediaError> {
        let stdout = run_tool(&self.ffprobe, probe_args(input), self.timeout).await?;
        parse_probe(&stdout)
    }

    /// Returns the container duration of a media file in seconds.
    pub async fn probe_duration(&self, input: &Path) -> Result<f64, MediaError> {
        self.probe(input)
            .await?
            .duration_secs
            .ok_or_else(|| MediaError::Probe("no duration reported".to_owned()))
    }
}

/// Spawns a tool and waits for it, killing it if the timeout elapses.
///
/// Returns the captured stdout.
async fn run_tool(
    program: &Path,
    args: Vec<OsString>,
    timeout: Duration,
) -> Result<Vec<u8>, MediaError> {
    let tool = program
        .file_name()
        .map_or_else(|| program.display().to_string(), |n| n.to_string_lossy().into_owned());

    debug!("Running {} {:?}", tool, args);

    let child = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    // Dropping the wait future on timeout drops the child, which kills it.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => {
            warn!("{} timed out after {:?}", tool, timeout);
            return Err(MediaError::Timeout { tool, timeout });
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MediaError::Ffmpeg {
            tool,
            status: output.status.to_string(),
            stderr_tail: tail(&stderr, STDERR_TAIL_CHARS),
        });
    }

    Ok(output.stdout)
}

fn probe_args(input: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-v",
        "error",
        "-select_streams",
        "v:0",
        "-show_entries",
        "format=duration:stream=width,height",
        "-of",
        "json",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    args.push(input.as_os_str().to_owned());
    args
}

/// Facts `ffprobe` reports about a media file.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProbeInfo {
    pub duration_secs: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parses `ffprobe -of json` output.
fn parse_probe(stdout: &[u8]) -> Result<ProbeInfo, MediaError> {
    let probe: ProbeOutput =
        serde_json::from_slice(stdout).map_err(|e| MediaError::Probe(e.to_string()))?;

    let duration_secs = match probe.format.and_then(|f| f.duration) {
        Some(raw) => Some(
            raw.trim()
                .parse::<f64>()
                .ok()
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .ok_or_else(|| MediaError::Probe(format!("invalid duration '{raw}'")))?,
        ),
        None => None,
    };

    let stream = probe.streams.first();
    Ok(ProbeInfo {
        duration_secs,
        width: stream.and_then(|s| s.width),
        height: stream.and_then(|s| s.height),
    })
}

/// Keeps the last `max_chars` characters of a string.
fn tail(s: &str, max_chars: usize) -> String {
    let s = s.trim_end();
    let count = s.chars().count();
    if count <= max_chars {
        s.to_owned()
    } else {
        format!("...{}", s.chars().skip(count - max_chars).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe() {
        let json = br#"{
            "programs": [],
            "streams": [{"width": 640, "height": 360}],
            "format": {"duration": "1.534000"}
        }"#;
        let info = parse_probe(json).unwrap();
        assert!((info.duration_secs.unwrap() - 1.534).abs() < 1e-9);
        assert_eq!(info.width, Some(640));
        assert_eq!(info.height, Some(360));
    }

    #[test]
    fn test_parse_probe_without_duration() {
        let info = parse_probe(br#"{"format": {}}"#).unwrap();
        assert_eq!(info, ProbeInfo::default());
    }

    #[test]
    fn test_parse_probe_invalid() {
        assert!(matches!(
            parse_probe(br#"{"format": {"duration": "N/A"}}"#),
            Err(MediaError::Probe(_))
        ));
        assert!(matches!(parse_probe(b"not json"), Err(MediaError::Probe(_))));
    }

    #[test]
    fn test_probe_args_end_with_input() {
        let args = probe_args(Path::new("/tmp/bot_files/video_1.mp4"));
        assert_eq!(args.first().unwrap(), "-v");
        assert_eq!(args.last().unwrap(), "/tmp/bot_files/video_1.mp4");
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("short\n", 10), "short");
        assert_eq!(tail("0123456789", 4), "...6789");
    }

    #[test]
    fn test_locate_missing_tool() {
        let result = Ffmpeg::locate(
            "definitely-not-a-real-ffmpeg-binary",
            "ffprobe",
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(MediaError::ToolNotFound(name)) if name.contains("definitely")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_captures_stdout() {
        let stdout = run_tool(
            Path::new("echo"),
            vec![OsString::from(r#"{"format": {"duration": "1.0"}}"#)],
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        let info = parse_probe(&stdout).unwrap();
        assert_eq!(info.duration_secs, Some(1.0));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_reports_failure_status() {
        let result = run_tool(Path::new("false"), Vec::new(), Duration::from_secs(5)).await;
        assert!(matches!(result, Err(MediaError::Ffmpeg { tool, .. }) if tool == "false"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_times_out() {
        let result = run_tool(
            Path::new("sleep"),
            vec![OsString::from("5")],
            Duration::from_millis(50),
        )
        .await;
        assert!(matches!(result, Err(MediaError::Timeout { .. })));
    }
}
