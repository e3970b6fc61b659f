//! Media probing for duration and pixel dimensions.
//!
//! [`FfprobeProbe`] pipes the payload into `ffprobe` over stdin so no
//! temporary file is needed. [`NoopProbe`] reports nothing and is used when
//! probing is disabled or in tests.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use crate::metadata::{AssetKind, Dimensions};

/// Error type for probe operations.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("ffprobe binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeResult {
    /// Seconds.
    pub duration: Option<f64>,
    pub dimensions: Option<Dimensions>,
}

#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, kind: AssetKind, bytes: &[u8]) -> Result<ProbeResult, ProbeError>;
}

// ---------------------------------------------------------------------------
// NoopProbe
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProbe;

#[async_trait]
impl MediaProbe for NoopProbe {
    async fn probe(&self, _kind: AssetKind, _bytes: &[u8]) -> Result<ProbeResult, ProbeError> {
        Ok(ProbeResult::default())
    }
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Extract duration and video dimensions from raw ffprobe JSON.
pub fn parse_ffprobe_json(json: &str) -> Result<ProbeResult, ProbeError> {
    let output: FfprobeOutput =
        serde_json::from_str(json).map_err(|e| ProbeError::ParseError(format!("{e}: {json}")))?;

    let parse_secs = |s: &Option<String>| {
        s.as_deref()
            .and_then(|d| d.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0)
    };

    let video = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    let duration = output
        .format
        .as_ref()
        .and_then(|f| parse_secs(&f.duration))
        .or_else(|| output.streams.iter().find_map(|s| parse_secs(&s.duration)));

    let dimensions = video.and_then(|s| match (s.width, s.height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => {
            Some(Dimensions { width, height })
        }
        _ => None,
    });

    Ok(ProbeResult {
        duration,
        dimensions,
    })
}

// ---------------------------------------------------------------------------
// FfprobeProbe
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    binary: String,
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self {
            binary: "ffprobe".to_string(),
        }
    }
}

impl FfprobeProbe {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn probe(&self, kind: AssetKind, bytes: &[u8]) -> Result<ProbeResult, ProbeError> {
        if !kind.is_timed() {
            return Ok(ProbeResult::default());
        }

        let mut child = tokio::process::Command::new(&self.binary)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "-i",
                "pipe:0",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ProbeError::NotFound)?;

        // Feed stdin concurrently with reading stdout; ffprobe may stop
        // reading early, so a broken pipe is not an error.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProbeError::ParseError("ffprobe stdin unavailable".to_string()))?;
        let payload = bytes.to_vec();
        let writer = tokio::spawn(async move {
            let _ = stdin.write_all(&payload).await;
            let _ = stdin.shutdown().await;
        });

        let output = child.wait_with_output().await?;
        let _ = writer.await;

        if !output.status.success() {
            return Err(ProbeError::ExecutionFailed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let mut result = parse_ffprobe_json(&String::from_utf8_lossy(&output.stdout))?;
        if kind == AssetKind::Audio {
            result.dimensions = None;
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parses_video_probe() {
        let json = r#"{
            "streams": [
                {"index": 0, "codec_type": "video", "width": 1920, "height": 1080, "duration": "12.5"},
                {"index": 1, "codec_type": "audio", "duration": "12.48"}
            ],
            "format": {"duration": "12.500000", "format_name": "mov,mp4"}
        }"#;
        let result = parse_ffprobe_json(json).unwrap();
        assert_eq!(result.duration, Some(12.5));
        assert_eq!(result.dimensions, Some(Dimensions { width: 1920, height: 1080 }));
    }

    #[test]
    fn falls_back_to_stream_duration() {
        let json = r#"{"streams": [{"codec_type": "audio", "duration": "3.25"}], "format": {}}"#;
        let result = parse_ffprobe_json(json).unwrap();
        assert_eq!(result.duration, Some(3.25));
        assert!(result.dimensions.is_none());
    }

    #[test]
    fn ignores_unparseable_duration() {
        let json = r#"{"streams": [], "format": {"duration": "N/A"}}"#;
        assert_eq!(parse_ffprobe_json(json).unwrap(), ProbeResult::default());
    }

    #[test]
    fn rejects_invalid_json() {
        assert_matches!(parse_ffprobe_json("not json"), Err(ProbeError::ParseError(_)));
    }

    #[tokio::test]
    async fn noop_probe_reports_nothing() {
        let result = NoopProbe.probe(AssetKind::Video, b"data").await.unwrap();
        assert_eq!(result, ProbeResult::default());
    }

    #[tokio::test]
    async fn missing_binary_is_reported() {
        let probe = FfprobeProbe::new("definitely-not-a-real-ffprobe-binary");
        assert_matches!(
            probe.probe(AssetKind::Audio, b"data").await,
            Err(ProbeError::NotFound(_))
        );
    }
}
