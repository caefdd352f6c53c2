//! # FFmpeg Module
//!
//! Costruzione della riga di comando ffmpeg e interpretazione del suo output
//! di progresso (`-progress pipe:1`).
//!
//! ## Responsabilità:
//! - Argomenti ffmpeg derivati da `TranscodeOptions` (audio, risoluzione, fps, CRF)
//! - Scelta della metrica di progresso: frame di output quando sono noti (ricalcolati
//!   sul frame rate di destinazione se impostato), altrimenti byte stimati dal
//!   tempo di output
//! - Conversione delle righe `frame=N` / `out_time_us=N` in incrementi positivi
//!
//! ## Formato del progresso:
//! ffmpeg scrive blocchi `chiave=valore` terminati da `progress=continue` o
//! `progress=end`. `out_time_ms` è espresso in microsecondi come `out_time_us`.

use crate::args;
use crate::config::TranscodeOptions;
use crate::probe::MediaSummary;
use crate::progress::ProgressUnit;
use crate::utils::to_os_args;
use regex::Regex;
use std::ffi::OsString;
use std::path::Path;
use std::sync::LazyLock;

static FRAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^frame=\s*(\d+)\s*$").expect("invalid frame regex"));

static OUT_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^out_time_(?:us|ms)=\s*(\d+)\s*$").expect("invalid out_time regex"));

/// Encoder settings that are not user-configurable
const VIDEO_CODEC: &str = "libx264";
const PRESET: &str = "medium";
const AUDIO_CODEC: &str = "aac";
const AUDIO_BITRATE: &str = "128k";

/// Build the ffmpeg argument list for one transcode
pub fn build_args(input: &Path, output: &Path, options: &TranscodeOptions) -> Vec<OsString> {
    let mut cmd = to_os_args(args!["-hide_banner", "-nostdin", "-i"]);
    cmd.push(input.as_os_str().to_os_string());
    cmd.extend(to_os_args(args!["-progress", "pipe:1", "-nostats"]));

    if options.drop_audio {
        cmd.extend(to_os_args(args!["-an"]));
    } else {
        cmd.extend(to_os_args(args!["-c:a", AUDIO_CODEC, "-b:a", AUDIO_BITRATE]));
    }

    if let Some(resolution) = options.resolution {
        match resolution.scale_filter() {
            Some(filter) => cmd.extend(to_os_args(args!["-vf", filter])),
            None => cmd.extend(to_os_args(args!["-s", resolution])),
        }
    }

    if let Some(frame_rate) = options.frame_rate {
        cmd.extend(to_os_args(args!["-r", frame_rate.ffmpeg_value()]));
    }

    cmd.extend(to_os_args(args![
        "-c:v",
        VIDEO_CODEC,
        "-preset",
        PRESET,
        "-crf",
        options.crf()
    ]));

    cmd.extend(to_os_args(args!["-y"]));
    cmd.push(output.as_os_str().to_os_string());
    cmd
}

/// What the progress indicator counts for one job
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressMetric {
    /// Encoded frames out of the probed frame count
    Frames { total: u64 },
    /// Bytes estimated from output time over duration
    Bytes { total: u64, duration_seconds: Option<f64> },
}

/// Turns ffmpeg progress lines into monotonic increments
#[derive(Debug, Clone)]
pub struct ProgressMeter {
    metric: ProgressMetric,
    reported: u64,
}

impl ProgressMeter {
    pub fn new(metric: ProgressMetric) -> Self {
        Self { metric, reported: 0 }
    }

    /// Frames when the output frame count is known, bytes otherwise.
    ///
    /// ffmpeg counts output frames, so a frame rate override sizes the total
    /// from the duration at the target rate instead of the probed count.
    pub fn for_media(summary: &MediaSummary, options: &TranscodeOptions) -> Self {
        let duration_seconds = summary.duration_seconds.filter(|d| *d > 0.0);
        let frames = match options.frame_rate {
            Some(rate) => duration_seconds.map(|d| (d * rate.value()).round() as u64),
            None => summary.frame_count,
        };
        let metric = match frames {
            Some(total) if total > 0 => ProgressMetric::Frames { total },
            _ => ProgressMetric::Bytes {
                total: summary.byte_size,
                duration_seconds,
            },
        };
        Self::new(metric)
    }

    pub fn metric(&self) -> ProgressMetric {
        self.metric
    }

    /// Indicator total
    pub fn total(&self) -> u64 {
        match self.metric {
            ProgressMetric::Frames { total } | ProgressMetric::Bytes { total, .. } => total,
        }
    }

    pub fn unit(&self) -> ProgressUnit {
        match self.metric {
            ProgressMetric::Frames { .. } => ProgressUnit::Frames,
            ProgressMetric::Bytes { .. } => ProgressUnit::Bytes,
        }
    }

    /// Amount reported so far
    pub fn reported(&self) -> u64 {
        self.reported
    }

    /// Amount still missing to reach the total
    pub fn remaining(&self) -> u64 {
        self.total().saturating_sub(self.reported)
    }

    /// Feed one ffmpeg progress line, returning the positive increment it implies
    pub fn observe(&mut self, line: &str) -> Option<u64> {
        let position = self.position_for(line.trim())?.min(self.total());
        if position <= self.reported {
            return None;
        }
        let delta = position - self.reported;
        self.reported = position;
        Some(delta)
    }

    fn position_for(&self, line: &str) -> Option<u64> {
        match self.metric {
            ProgressMetric::Frames { .. } => {
                let caps = FRAME_RE.captures(line)?;
                caps[1].parse().ok()
            }
            ProgressMetric::Bytes { total, duration_seconds } => {
                let duration = duration_seconds?;
                let caps = OUT_TIME_RE.captures(line)?;
                let out_time_us: f64 = caps[1].parse().ok()?;
                let fraction = (out_time_us / (duration * 1_000_000.0)).clamp(0.0, 1.0);
                Some((fraction * total as f64) as u64)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FrameRate, Resolution};
    use std::path::PathBuf;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().to_string()).collect()
    }

    fn summary(frame_count: Option<u64>, duration_seconds: Option<f64>, byte_size: u64) -> MediaSummary {
        MediaSummary {
            path: PathBuf::from("clip.mp4"),
            frame_count,
            duration_seconds,
            byte_size,
        }
    }

    #[test]
    fn test_default_args() {
        let args = strings(&build_args(
            Path::new("in.mov"),
            Path::new("in-ffmpeg.mov"),
            &TranscodeOptions::default(),
        ));
        assert_eq!(
            args,
            vec![
                "-hide_banner", "-nostdin", "-i", "in.mov", "-progress", "pipe:1", "-nostats", "-c:a", "aac",
                "-b:a", "128k", "-c:v", "libx264", "-preset", "medium", "-crf", "23", "-y", "in-ffmpeg.mov",
            ]
        );
    }

    #[test]
    fn test_all_options() {
        let options = TranscodeOptions {
            drop_audio: true,
            resolution: Some(Resolution::P720),
            frame_rate: Some(FrameRate::Film),
            lossless: false,
            quality: Some(28),
        };
        let args = strings(&build_args(Path::new("a.mp4"), Path::new("b.mp4"), &options));

        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"-c:a".to_string()));
        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert!(args[vf + 1].starts_with("scale=min(1280"));
        let r = args.iter().position(|a| a == "-r").unwrap();
        assert_eq!(args[r + 1], "24");
        let crf = args.iter().position(|a| a == "-crf").unwrap();
        assert_eq!(args[crf + 1], "28");
        assert_eq!(args.last().unwrap(), "b.mp4");
    }

    #[test]
    fn test_lossless_and_explicit_size() {
        let options = TranscodeOptions {
            resolution: Some(Resolution::Explicit { width: 640, height: 360 }),
            lossless: true,
            quality: Some(30),
            ..Default::default()
        };
        let args = strings(&build_args(Path::new("a.mp4"), Path::new("b.mp4"), &options));
        let s = args.iter().position(|a| a == "-s").unwrap();
        assert_eq!(args[s + 1], "640x360");
        let crf = args.iter().position(|a| a == "-crf").unwrap();
        assert_eq!(args[crf + 1], "0");
    }

    #[test]
    fn test_frames_metric_when_frame_count_known() {
        let meter = ProgressMeter::for_media(&summary(Some(250), Some(10.0), 5_000), &TranscodeOptions::default());
        assert_eq!(meter.metric(), ProgressMetric::Frames { total: 250 });
        assert_eq!(meter.unit(), ProgressUnit::Frames);
        assert_eq!(meter.total(), 250);
    }

    #[test]
    fn test_bytes_metric_when_frame_count_unknown() {
        let meter = ProgressMeter::for_media(&summary(None, Some(10.0), 5_000), &TranscodeOptions::default());
        assert_eq!(meter.unit(), ProgressUnit::Bytes);
        assert_eq!(meter.total(), 5_000);
    }

    #[test]
    fn test_frame_rate_override_sizes_frames_at_target_rate() {
        let clip = summary(Some(100), Some(4.0), 5_000);
        let options = TranscodeOptions {
            frame_rate: Some(FrameRate::Custom(50.0)),
            ..Default::default()
        };
        let mut meter = ProgressMeter::for_media(&clip, &options);
        assert_eq!(meter.metric(), ProgressMetric::Frames { total: 200 });

        // Two seconds into a four second clip
        assert_eq!(meter.observe("frame=100"), Some(100));
        assert_eq!(meter.remaining(), 100);

        let slower = TranscodeOptions {
            frame_rate: Some(FrameRate::Film),
            ..Default::default()
        };
        let meter = ProgressMeter::for_media(&summary(Some(240), Some(4.0), 5_000), &slower);
        assert_eq!(meter.total(), 96);
    }

    #[test]
    fn test_frame_rate_override_without_duration_falls_back_to_bytes() {
        let options = TranscodeOptions {
            frame_rate: Some(FrameRate::Pal),
            ..Default::default()
        };
        let meter = ProgressMeter::for_media(&summary(Some(100), None, 5_000), &options);
        assert_eq!(meter.unit(), ProgressUnit::Bytes);
        assert_eq!(meter.total(), 5_000);
    }

    #[test]
    fn test_frame_deltas_are_monotonic_and_clamped() {
        let mut meter = ProgressMeter::for_media(&summary(Some(100), None, 1), &TranscodeOptions::default());
        assert_eq!(meter.observe("frame=10"), Some(10));
        assert_eq!(meter.observe("fps=25.0"), None);
        assert_eq!(meter.observe("frame=  40"), Some(30));
        // ffmpeg occasionally repeats or goes backwards
        assert_eq!(meter.observe("frame=40"), None);
        assert_eq!(meter.observe("frame=35"), None);
        assert_eq!(meter.observe("frame=130"), Some(60));
        assert_eq!(meter.reported(), 100);
        assert_eq!(meter.remaining(), 0);
    }

    #[test]
    fn test_byte_deltas_from_out_time() {
        let mut meter = ProgressMeter::for_media(&summary(None, Some(4.0), 1_000), &TranscodeOptions::default());
        assert_eq!(meter.observe("out_time_us=1000000"), Some(250));
        assert_eq!(meter.observe("out_time_ms=2000000"), Some(250));
        assert_eq!(meter.observe("out_time=00:00:02.000000"), None);
        assert_eq!(meter.observe("out_time_us=N/A"), None);
        assert_eq!(meter.observe("out_time_us=9000000"), Some(500));
        assert_eq!(meter.remaining(), 0);
    }

    #[test]
    fn test_unknown_duration_reports_nothing() {
        let mut meter = ProgressMeter::for_media(&summary(None, None, 1_000), &TranscodeOptions::default());
        assert_eq!(meter.observe("out_time_us=1000000"), None);
        assert_eq!(meter.remaining(), 1_000);
    }
}
