//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce `TranscodeOptions`, le opzioni immutabili passate a ffmpeg
//! - Definisce `Config` con i parametri del batch (concorrenza, verbosità, output JSON)
//! - Fornisce validazione dei parametri, eseguita una sola volta a inizio batch
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//!
//! ## Parametri di trascodifica:
//! - `drop_audio`: Rimuove la traccia audio (default: false)
//! - `resolution`: Preset (4k, 1080p, 720p, 576p, 480p) o dimensione esplicita `WxH`
//! - `frame_rate`: Preset (film, pal, ntsc, 60fps) o numero esplicito
//! - `lossless`: Modalità lossless, CRF 0 (default: false)
//! - `quality`: CRF 0-51 (default ffmpeg: 23)
//!
//! ## Parametri del batch:
//! - `jobs`: Numero massimo di job concorrenti per fase (default: core CPU)
//! - `verbosity`: normal / verbose / very_verbose
//! - `skip_existing`: Salta i file il cui output esiste già
//! - `stall_timeout_secs`: Uccide ffmpeg se non emette progresso per N secondi
//! - `json_output`: Eventi JSON su stdout al posto delle progress bar
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     options: TranscodeOptions { quality: Some(28), ..Default::default() },
//!     jobs: 4,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Highest CRF value accepted by libx264
pub const MAX_QUALITY: u8 = 51;

/// CRF used when no quality is given
pub const DEFAULT_QUALITY: u8 = 23;

/// Output resolution cap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Resolution {
    Uhd4k,
    P1080,
    P720,
    P576,
    P480,
    /// Explicit `WxH` frame size
    Explicit { width: u32, height: u32 },
}

impl Resolution {
    /// Bounding box for the preset resolutions
    pub fn bounds(&self) -> Option<(u32, u32)> {
        match self {
            Self::Uhd4k => Some((3840, 2160)),
            Self::P1080 => Some((1920, 1080)),
            Self::P720 => Some((1280, 720)),
            Self::P576 => Some((1024, 576)),
            Self::P480 => Some((854, 480)),
            Self::Explicit { .. } => None,
        }
    }

    /// ffmpeg scale filter that shrinks to fit the preset, never upscaling
    pub fn scale_filter(&self) -> Option<String> {
        self.bounds().map(|(w, h)| {
            format!("scale=min({w}\\,iw):min({h}\\,ih):force_original_aspect_ratio=decrease")
        })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uhd4k => write!(f, "4k"),
            Self::P1080 => write!(f, "1080p"),
            Self::P720 => write!(f, "720p"),
            Self::P576 => write!(f, "576p"),
            Self::P480 => write!(f, "480p"),
            Self::Explicit { width, height } => write!(f, "{width}x{height}"),
        }
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "4k" => Ok(Self::Uhd4k),
            "1080p" => Ok(Self::P1080),
            "720p" => Ok(Self::P720),
            "576p" => Ok(Self::P576),
            "480p" => Ok(Self::P480),
            other => {
                let (w, h) = other.split_once('x').ok_or_else(|| {
                    format!("invalid resolution '{s}' (expected 4k, 1080p, 720p, 576p, 480p or WxH)")
                })?;
                let width: u32 = w.parse().map_err(|_| format!("invalid width in '{s}'"))?;
                let height: u32 = h.parse().map_err(|_| format!("invalid height in '{s}'"))?;
                if width == 0 || height == 0 {
                    return Err(format!("resolution '{s}' must have non-zero dimensions"));
                }
                Ok(Self::Explicit { width, height })
            }
        }
    }
}

impl TryFrom<String> for Resolution {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.to_string()
    }
}

/// Output frame rate override
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FrameRate {
    Film,
    Pal,
    Ntsc,
    Fps60,
    Custom(f64),
}

impl FrameRate {
    /// Frames per second
    pub fn value(&self) -> f64 {
        match self {
            Self::Film => 24.0,
            Self::Pal => 25.0,
            Self::Ntsc => 30.0,
            Self::Fps60 => 60.0,
            Self::Custom(fps) => *fps,
        }
    }

    /// Value passed to ffmpeg `-r`
    pub fn ffmpeg_value(&self) -> String {
        // f64 Display drops the fraction for whole numbers: 24.0 -> "24"
        self.value().to_string()
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Film => write!(f, "film"),
            Self::Pal => write!(f, "pal"),
            Self::Ntsc => write!(f, "ntsc"),
            Self::Fps60 => write!(f, "60fps"),
            Self::Custom(fps) => write!(f, "{fps}"),
        }
    }
}

impl FromStr for FrameRate {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "film" => Ok(Self::Film),
            "pal" => Ok(Self::Pal),
            "ntsc" => Ok(Self::Ntsc),
            "60fps" => Ok(Self::Fps60),
            other => {
                let fps: f64 = other
                    .parse()
                    .map_err(|_| format!("invalid frame rate '{s}' (expected film, pal, ntsc, 60fps or a number)"))?;
                if !fps.is_finite() || fps <= 0.0 {
                    return Err(format!("frame rate '{s}' must be a positive number"));
                }
                Ok(Self::Custom(fps))
            }
        }
    }
}

impl TryFrom<String> for FrameRate {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FrameRate> for String {
    fn from(value: FrameRate) -> Self {
        value.to_string()
    }
}

/// How much the operator wants to see
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    #[default]
    Normal,
    Verbose,
    VeryVerbose,
}

impl Verbosity {
    /// Map a repeated `-v` flag count to a level
    pub fn from_occurrences(count: u8) -> Self {
        match count {
            0 => Self::Normal,
            1 => Self::Verbose,
            _ => Self::VeryVerbose,
        }
    }
}

/// Options that shape the ffmpeg command line and the output file name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeOptions {
    /// Drop the audio track
    pub drop_audio: bool,
    /// Output resolution cap or explicit size
    pub resolution: Option<Resolution>,
    /// Output frame rate
    pub frame_rate: Option<FrameRate>,
    /// Lossless encode (CRF 0)
    pub lossless: bool,
    /// CRF value (0-51, lower = better quality)
    pub quality: Option<u8>,
}

impl TranscodeOptions {
    /// Validate option ranges
    pub fn validate(&self) -> Result<()> {
        if let Some(quality) = self.quality {
            if quality > MAX_QUALITY {
                return Err(anyhow::anyhow!("Quality must be between 0 and {}", MAX_QUALITY));
            }
        }

        if let Some(frame_rate) = self.frame_rate {
            let fps = frame_rate.value();
            if !fps.is_finite() || fps <= 0.0 {
                return Err(anyhow::anyhow!("Frame rate must be a positive number"));
            }
        }

        if let Some(Resolution::Explicit { width, height }) = self.resolution {
            if width == 0 || height == 0 {
                return Err(anyhow::anyhow!("Resolution must have non-zero dimensions"));
            }
        }

        Ok(())
    }

    /// CRF handed to the encoder
    pub fn crf(&self) -> u8 {
        if self.lossless {
            0
        } else {
            self.quality.unwrap_or(DEFAULT_QUALITY)
        }
    }

    /// Output file name suffix encoding the active options.
    ///
    /// Depends on the options alone, so identical options against identical
    /// inputs always produce identical output names.
    pub fn suffix(&self) -> String {
        let mut suffix = String::from("-ffmpeg");
        if self.drop_audio {
            suffix.push_str("-n");
        }
        if let Some(resolution) = self.resolution {
            suffix.push_str(&format!("-r{resolution}"));
        }
        if let Some(frame_rate) = self.frame_rate {
            suffix.push_str(&format!("-f{frame_rate}"));
        }
        if self.lossless {
            suffix.push_str("-lossless");
        }
        if let Some(quality) = self.quality {
            suffix.push_str(&format!("-q{quality}"));
        }
        suffix
    }
}

/// Configuration for a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Transcode options shared by every file
    pub options: TranscodeOptions,
    /// Maximum number of concurrent jobs per phase
    pub jobs: usize,
    /// Output verbosity
    pub verbosity: Verbosity,
    /// Skip files whose output already exists
    pub skip_existing: bool,
    /// Kill ffmpeg when it reports no progress for this many seconds
    pub stall_timeout_secs: Option<u64>,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            options: TranscodeOptions::default(),
            jobs: default_jobs(),
            verbosity: Verbosity::Normal,
            skip_existing: false,
            stall_timeout_secs: None,
            json_output: false,
        }
    }
}

/// Default concurrency: one job per CPU core
pub fn default_jobs() -> usize {
    num_cpus::get().max(1)
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            return Err(anyhow::anyhow!("Number of jobs must be greater than 0"));
        }

        if self.stall_timeout_secs == Some(0) {
            return Err(anyhow::anyhow!("Stall timeout must be greater than 0 seconds"));
        }

        self.options.validate()
    }

    /// Stall timeout as a duration
    pub fn stall_timeout(&self) -> Option<Duration> {
        self.stall_timeout_secs.map(Duration::from_secs)
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
