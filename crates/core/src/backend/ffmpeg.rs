//! FFmpeg backend for video and audio.

use async_trait::async_trait;
use regex_lite::Regex;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::error::BackendError;
use super::locator::ToolLocator;
use super::process::{spawn_error, tool_name};
use super::traits::Backend;
use super::types::{
    report_progress, BackendStatus, ConversionRequest, ProgressSender, RawResult,
};
use crate::capability::{BackendKind, FormatCategory};

/// Minimum interval between progress updates.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Time allowed for ffprobe to report a source's duration.
const DURATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default video and audio codec for a container.
fn video_codecs(container: &str) -> (&'static str, &'static str) {
    match container {
        "webm" => ("libvpx-vp9", "libopus"),
        "avi" => ("mpeg4", "libmp3lame"),
        // mp4, mkv, mov
        _ => ("libx264", "aac"),
    }
}

/// Default codec for an audio-only output.
fn audio_codec(format: &str) -> &'static str {
    match format {
        "mp3" => "libmp3lame",
        "aac" | "m4a" => "aac",
        "ogg" => "libvorbis",
        "flac" => "flac",
        "wav" => "pcm_s16le",
        "opus" => "libopus",
        _ => "copy",
    }
}

fn is_lossless(format: &str) -> bool {
    matches!(format, "flac" | "wav")
}

fn default_audio_bitrate(format: &str) -> &'static str {
    if format == "opus" {
        "128k"
    } else {
        "192k"
    }
}

/// FFmpeg-based backend.
pub struct FfmpegBackend {
    timeout_secs: u64,
    log_level: String,
}

impl FfmpegBackend {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout_secs,
            log_level: "error".to_string(),
        }
    }

    /// Builds the full ffmpeg argument list for a request.
    pub(crate) fn build_args(&self, request: &ConversionRequest, output_path: &Path) -> Vec<String> {
        let options = &request.options;
        let output = request.output.as_str();

        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            request.source.to_string_lossy().to_string(),
        ];

        if output == "gif" {
            let fps = options.fps.unwrap_or(options.gif_fps as u32);
            let width = options.width.unwrap_or(options.gif_width);
            args.extend([
                "-vf".to_string(),
                format!("fps={},scale={}:-1:flags=lanczos", fps, width),
                "-loop".to_string(),
                "0".to_string(),
            ]);
        } else if request.output.category() == Some(FormatCategory::Audio) {
            let codec = options
                .audio_codec
                .clone()
                .unwrap_or_else(|| audio_codec(output).to_string());
            args.extend(["-vn".to_string(), "-c:a".to_string(), codec]);

            if !is_lossless(output) {
                let bitrate = options
                    .audio_bitrate
                    .clone()
                    .unwrap_or_else(|| default_audio_bitrate(output).to_string());
                args.extend(["-b:a".to_string(), bitrate]);
            }
            if let Some(rate) = options.sample_rate {
                args.extend(["-ar".to_string(), rate.to_string()]);
            }
        } else {
            let (default_video, default_audio) = video_codecs(output);
            args.extend([
                "-c:v".to_string(),
                options
                    .video_codec
                    .clone()
                    .unwrap_or_else(|| default_video.to_string()),
                "-c:a".to_string(),
                options
                    .audio_codec
                    .clone()
                    .unwrap_or_else(|| default_audio.to_string()),
            ]);

            if let Some(ref bitrate) = options.video_bitrate {
                args.extend(["-b:v".to_string(), bitrate.clone()]);
            }
            if let Some(ref bitrate) = options.audio_bitrate {
                args.extend(["-b:a".to_string(), bitrate.clone()]);
            }

            // Scale keeping aspect ratio when only one side is given.
            if options.width.is_some() || options.height.is_some() {
                let width = options.width.map(|w| w.to_string()).unwrap_or("-2".into());
                let height = options.height.map(|h| h.to_string()).unwrap_or("-2".into());
                args.extend(["-vf".to_string(), format!("scale={}:{}", width, height)]);
            }
            if let Some(fps) = options.fps {
                args.extend(["-r".to_string(), fps.to_string()]);
            }
            if let Some(rate) = options.sample_rate {
                args.extend(["-ar".to_string(), rate.to_string()]);
            }
        }

        args.extend([
            "-loglevel".to_string(),
            self.log_level.clone(),
            "-progress".to_string(),
            "pipe:2".to_string(),
        ]);

        args.push(output_path.to_string_lossy().to_string());
        args
    }

    /// Reads the source duration from ffprobe JSON output.
    fn parse_duration(output: &str) -> Option<f64> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            duration: Option<String>,
        }

        let probe: ProbeOutput = serde_json::from_str(output).ok()?;
        probe
            .format
            .duration
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| *d > 0.0)
    }

    async fn probe_duration(&self, ffprobe: &Path, source: &Path, limit: Duration) -> Option<f64> {
        let run = Command::new(ffprobe)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(source)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        let output = match timeout(limit, run).await {
            Ok(result) => result.ok()?,
            Err(_) => {
                debug!(source = %source.display(), "ffprobe timed out, converting without progress");
                return None;
            }
        };
        if !output.status.success() {
            return None;
        }
        Self::parse_duration(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl Backend for FfmpegBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Ffmpeg
    }

    async fn detect(&self, locator: &ToolLocator) -> BackendStatus {
        let mut status = locator
            .detect_tool(BackendKind::Ffmpeg, &["ffmpeg"], &["-version"])
            .await;
        if let Some(ffprobe) = status.path.as_deref().and_then(|p| locator.companion(p, "ffprobe")) {
            status.companions.insert("ffprobe".to_string(), ffprobe);
        }
        status
    }

    async fn convert(
        &self,
        status: &BackendStatus,
        request: &ConversionRequest,
        progress: ProgressSender,
    ) -> Result<RawResult, BackendError> {
        let program = status
            .path
            .as_deref()
            .ok_or_else(|| BackendError::unavailable(BackendKind::Ffmpeg, "no executable path"))?;
        let output_path = request.artifact_path(None);

        let duration_secs = match status.companion("ffprobe") {
            Some(ffprobe) => {
                self.probe_duration(ffprobe, &request.source, DURATION_TIMEOUT)
                    .await
            }
            None => None,
        };

        let args = self.build_args(request, &output_path);
        debug!(job_id = %request.job_id, ?args, "Starting ffmpeg");

        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(BackendKind::Ffmpeg, program, e))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BackendError::codec("ffmpeg stderr not captured"))?;
        let mut reader = BufReader::new(stderr).lines();
        let time_regex = Regex::new(r"out_time_ms=(\d+)").ok();

        let run = async {
            let mut last_progress_send = Instant::now();
            let mut error_output = String::new();

            while let Ok(Some(line)) = reader.next_line().await {
                if !line.contains('=') {
                    error_output.push_str(&line);
                    error_output.push('\n');
                }

                let current = time_regex
                    .as_ref()
                    .and_then(|re| re.captures(&line))
                    .and_then(|caps| caps.get(1))
                    .and_then(|m| m.as_str().parse::<f64>().ok())
                    .map(|us| us / 1_000_000.0);

                if let (Some(current), Some(total)) = (current, duration_secs) {
                    if last_progress_send.elapsed() >= PROGRESS_INTERVAL {
                        report_progress(&progress, (current / total) as f32);
                        last_progress_send = Instant::now();
                    }
                }
            }

            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, error_output))
        };

        let result = tokio::select! {
            result = timeout(Duration::from_secs(self.timeout_secs), run) => result,
            _ = request.cancel.cancelled() => return Err(BackendError::Cancelled),
        };

        match result {
            Ok(Ok((exit, error_output))) => {
                if !exit.success() {
                    return Err(BackendError::tool_failed(
                        tool_name(program),
                        exit.code(),
                        &error_output,
                    ));
                }
            }
            Ok(Err(e)) => return Err(BackendError::Io(e)),
            Err(_) => {
                return Err(BackendError::Timeout {
                    timeout_secs: self.timeout_secs,
                })
            }
        }

        if !output_path.is_file() {
            return Err(BackendError::NoOutput {
                expected: output_path,
                diagnostics: None,
            });
        }

        report_progress(&progress, 1.0);
        Ok(RawResult::single(output_path, request.output.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    fn args_for(input: &str, output: &str) -> Vec<String> {
        let request = fixtures::request(&format!("/in/clip.{}", input), input, output);
        let path = request.artifact_path(None);
        FfmpegBackend::new(60).build_args(&request, &path)
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_mp4_defaults() {
        let args = args_for("mkv", "mp4");
        assert!(has_pair(&args, "-c:v", "libx264"));
        assert!(has_pair(&args, "-c:a", "aac"));
        assert!(has_pair(&args, "-progress", "pipe:2"));
        assert!(args.last().unwrap().ends_with("clip.mp4"));
    }

    #[test]
    fn test_webm_defaults() {
        let args = args_for("mp4", "webm");
        assert!(has_pair(&args, "-c:v", "libvpx-vp9"));
        assert!(has_pair(&args, "-c:a", "libopus"));
    }

    #[test]
    fn test_audio_extraction() {
        let args = args_for("mp4", "mp3");
        assert!(args.contains(&"-vn".to_string()));
        assert!(has_pair(&args, "-c:a", "libmp3lame"));
        assert!(has_pair(&args, "-b:a", "192k"));
        assert!(!args.contains(&"-c:v".to_string()));
    }

    #[test]
    fn test_lossless_audio_has_no_bitrate() {
        let args = args_for("mp3", "flac");
        assert!(has_pair(&args, "-c:a", "flac"));
        assert!(!args.contains(&"-b:a".to_string()));
    }

    #[test]
    fn test_opus_bitrate() {
        let args = args_for("wav", "opus");
        assert!(has_pair(&args, "-b:a", "128k"));
    }

    #[test]
    fn test_gif_filter() {
        let args = args_for("mp4", "gif");
        assert!(has_pair(&args, "-vf", "fps=10,scale=480:-1:flags=lanczos"));
        assert!(has_pair(&args, "-loop", "0"));
    }

    #[test]
    fn test_scaling_and_overrides() {
        let mut request = fixtures::request("/in/clip.mov", "mov", "mp4");
        request.options.width = Some(1280);
        request.options.video_codec = Some("libx265".to_string());
        request.options.fps = Some(24);
        let path = request.artifact_path(None);
        let args = FfmpegBackend::new(60).build_args(&request, &path);
        assert!(has_pair(&args, "-vf", "scale=1280:-2"));
        assert!(has_pair(&args, "-c:v", "libx265"));
        assert!(has_pair(&args, "-r", "24"));
    }

    #[test]
    fn test_parse_duration() {
        let json = r#"{"format": {"filename": "a.mp4", "duration": "12.5"}}"#;
        assert_eq!(FfmpegBackend::parse_duration(json), Some(12.5));
        assert_eq!(FfmpegBackend::parse_duration(r#"{"format": {}}"#), None);
        assert_eq!(FfmpegBackend::parse_duration("not json"), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stalled_ffprobe_gives_up() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let ffprobe = dir.path().join("ffprobe");
        std::fs::write(&ffprobe, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&ffprobe, std::fs::Permissions::from_mode(0o755)).unwrap();
        let source = dir.path().join("clip.mp4");
        std::fs::write(&source, b"x").unwrap();

        let started = Instant::now();
        let duration = FfmpegBackend::new(60)
            .probe_duration(&ffprobe, &source, Duration::from_millis(200))
            .await;

        assert_eq!(duration, None);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
