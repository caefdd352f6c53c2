//! # Media Probe Module
//!
//! Questo modulo interroga ffprobe per ottenere i metadati di ogni file.
//!
//! ## Responsabilità:
//! - Esecuzione di `ffprobe -v quiet -print_format json -show_format -show_streams`
//! - Parsing del JSON in strutture tipizzate
//! - Estrazione di durata e numero di frame dallo stream video, con fallback
//!   alla durata del container
//! - Dimensione in byte letta dal filesystem, indipendente da ffprobe
//!
//! ## Metadati mancanti:
//! Frame count e durata sono `Option`: se ffprobe non li riporta il valore è
//! "sconosciuto", mai zero.
//!
//! ## Esempio:
//! ```rust,ignore
//! let probe = MediaProbe::new(toolchain);
//! if let Some(summary) = probe.probe_safe(&path).await {
//!     println!("{} frames", summary.frame_count.unwrap_or_default());
//! }
//! ```

use crate::batch::scheduler::run_phase;
use crate::error::ProbeError;
use crate::platform::Toolchain;
use crate::utils::to_string_vec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    #[serde(default)]
    r_frame_rate: Option<String>,
    #[serde(default)]
    nb_frames: Option<String>,
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: Option<FfprobeFormat>,
}

/// Parsed ffprobe report for one file
#[derive(Debug)]
pub struct ProbeReport {
    output: FfprobeOutput,
}

/// What the batch needs to know about a file before transcoding it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaSummary {
    pub path: PathBuf,
    /// Frames in the video stream, if known
    pub frame_count: Option<u64>,
    /// Duration in seconds, if known
    pub duration_seconds: Option<f64>,
    /// Size on disk
    pub byte_size: u64,
}

fn parse_frame_rate(s: &str) -> Option<f64> {
    let (num, den) = s.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}

fn parse_seconds(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|d| d.is_finite() && *d >= 0.0)
}

/// Parse ffprobe JSON output
pub fn parse_ffprobe_json(json: &str) -> Result<ProbeReport, ProbeError> {
    let output: FfprobeOutput = serde_json::from_str(json)?;
    Ok(ProbeReport { output })
}

impl ProbeReport {
    /// Number of streams reported
    pub fn stream_count(&self) -> usize {
        self.output.streams.len()
    }

    /// Whether at least one video stream is present
    pub fn has_video_stream(&self) -> bool {
        self.video_stream().is_some()
    }

    fn video_stream(&self) -> Option<&FfprobeStream> {
        self.output
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
    }

    /// Duration from the video stream, falling back to the container
    pub fn duration_seconds(&self) -> Option<f64> {
        let stream_duration = self
            .video_stream()
            .and_then(|s| s.duration.as_deref())
            .and_then(parse_seconds);

        stream_duration.or_else(|| {
            self.output
                .format
                .as_ref()
                .and_then(|f| f.duration.as_deref())
                .and_then(parse_seconds)
        })
    }

    /// Frame count: reported `nb_frames`, else frame rate times duration
    pub fn frame_count(&self) -> Option<u64> {
        let stream = self.video_stream()?;

        let reported = stream
            .nb_frames
            .as_deref()
            .and_then(|n| n.trim().parse::<u64>().ok())
            .filter(|n| *n > 0);
        if reported.is_some() {
            return reported;
        }

        let fps = stream.r_frame_rate.as_deref().and_then(parse_frame_rate)?;
        let duration = self.duration_seconds()?;
        let frames = (fps * duration) as u64;
        (frames > 0).then_some(frames)
    }

    /// Build the summary for `path`, failing when there is nothing to transcode
    pub fn into_summary(self, path: &Path, byte_size: u64) -> Result<MediaSummary, ProbeError> {
        if self.stream_count() == 0 {
            return Err(ProbeError::NoStreams);
        }
        if !self.has_video_stream() {
            return Err(ProbeError::NoVideoStream);
        }

        Ok(MediaSummary {
            path: path.to_path_buf(),
            frame_count: self.frame_count(),
            duration_seconds: self.duration_seconds(),
            byte_size,
        })
    }
}

/// Run ffprobe on `path` and parse its report
pub async fn run_ffprobe(ffprobe: &Path, path: &Path) -> Result<ProbeReport, ProbeError> {
    let mut cmd = tokio::process::Command::new(ffprobe);
    cmd.args(to_string_vec(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"]))
        .arg(path)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let output = cmd.output().await.map_err(|source| ProbeError::Spawn {
        tool: ffprobe.display().to_string(),
        source,
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("exit status {}", output.status)
        } else {
            stderr
        };
        return Err(ProbeError::ToolFailed(message));
    }

    parse_ffprobe_json(&String::from_utf8_lossy(&output.stdout))
}

/// Reads media metadata through ffprobe
#[derive(Debug, Clone)]
pub struct MediaProbe {
    toolchain: Toolchain,
}

impl MediaProbe {
    pub fn new(toolchain: Toolchain) -> Self {
        Self { toolchain }
    }

    /// Probe a single file
    pub async fn probe(&self, path: &Path) -> Result<MediaSummary, ProbeError> {
        let report = run_ffprobe(self.toolchain.ffprobe(), path).await?;
        let byte_size = tokio::fs::metadata(path).await?.len();
        let summary = report.into_summary(path, byte_size)?;
        debug!(
            "Probed {}: frames={:?}, duration={:?}, size={}",
            path.display(),
            summary.frame_count,
            summary.duration_seconds,
            summary.byte_size
        );
        Ok(summary)
    }

    /// Probe a file, warning and returning `None` instead of failing
    pub async fn probe_safe(&self, path: &Path) -> Option<MediaSummary> {
        match self.probe(path).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!("Error probing {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Probe every file with at most `jobs` ffprobe processes at once.
    ///
    /// Files that cannot be probed are dropped; the rest keep input order.
    pub async fn probe_all(&self, paths: &[PathBuf], jobs: usize) -> Vec<MediaSummary> {
        let probe = Arc::new(self.clone());
        let mut results = run_phase("probe", paths.to_vec(), jobs, move |path: PathBuf| {
            let probe = probe.clone();
            async move { Ok(probe.probe_safe(&path).await) }
        })
        .await;

        paths
            .iter()
            .filter_map(|path| match results.remove(path) {
                Some(Ok(summary)) => summary,
                Some(Err(e)) => {
                    warn!("Error probing {}: {}", path.display(), e);
                    None
                }
                None => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_REPORT: &str = r#"{
        "streams": [
            {"codec_type": "audio", "duration": "12.0"},
            {"codec_type": "video", "r_frame_rate": "30000/1001", "nb_frames": "359", "duration": "11.978"}
        ],
        "format": {"duration": "12.010000"}
    }"#;

    #[test]
    fn test_reported_frame_count_wins() {
        let report = parse_ffprobe_json(FULL_REPORT).unwrap();
        assert!(report.has_video_stream());
        assert_eq!(report.stream_count(), 2);
        assert_eq!(report.frame_count(), Some(359));
        assert_eq!(report.duration_seconds(), Some(11.978));
    }

    #[test]
    fn test_duration_falls_back_to_container() {
        let json = r#"{
            "streams": [{"codec_type": "video", "r_frame_rate": "25/1"}],
            "format": {"duration": "8.0"}
        }"#;
        let report = parse_ffprobe_json(json).unwrap();
        assert_eq!(report.duration_seconds(), Some(8.0));
        // 25 fps * 8 s
        assert_eq!(report.frame_count(), Some(200));
    }

    #[test]
    fn test_missing_metadata_is_unknown() {
        let json = r#"{"streams": [{"codec_type": "video", "r_frame_rate": "0/0"}]}"#;
        let report = parse_ffprobe_json(json).unwrap();
        let summary = report.into_summary(Path::new("clip.mkv"), 4096).unwrap();
        assert_eq!(summary.frame_count, None);
        assert_eq!(summary.duration_seconds, None);
        assert_eq!(summary.byte_size, 4096);
    }

    #[test]
    fn test_frame_count_unknown_with_duration() {
        let json = r#"{
            "streams": [{"codec_type": "video", "nb_frames": "N/A"}],
            "format": {"duration": "3.5"}
        }"#;
        let summary = parse_ffprobe_json(json)
            .unwrap()
            .into_summary(Path::new("clip.webm"), 10)
            .unwrap();
        assert_eq!(summary.frame_count, None);
        assert_eq!(summary.duration_seconds, Some(3.5));
    }

    #[test]
    fn test_no_streams_is_an_error() {
        let report = parse_ffprobe_json(r#"{"streams": [], "format": {}}"#).unwrap();
        assert!(matches!(report.into_summary(Path::new("x"), 1), Err(ProbeError::NoStreams)));
    }

    #[test]
    fn test_audio_only_is_an_error() {
        let report = parse_ffprobe_json(r#"{"streams": [{"codec_type": "audio"}]}"#).unwrap();
        assert!(!report.has_video_stream());
        assert!(matches!(report.into_summary(Path::new("x"), 1), Err(ProbeError::NoVideoStream)));
    }

    #[test]
    fn test_garbage_output_is_a_parse_error() {
        assert!(matches!(parse_ffprobe_json("not json"), Err(ProbeError::Parse(_))));
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("25/1"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("garbage"), None);
    }

    #[tokio::test]
    async fn test_probe_safe_missing_tool_returns_none() {
        let probe = MediaProbe::new(Toolchain::new("ffmpeg", "/nonexistent/vidsqueeze/ffprobe"));
        assert!(probe.probe_safe(Path::new("/nonexistent/clip.mp4")).await.is_none());
        assert!(matches!(
            probe.probe(Path::new("/nonexistent/clip.mp4")).await,
            Err(ProbeError::Spawn { .. })
        ));
    }
}
