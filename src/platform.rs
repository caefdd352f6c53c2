//! # Platform-specific utilities
//!
//! Questo modulo centralizza la risoluzione dei tool esterni (ffmpeg, ffprobe)
//! e la verifica della loro disponibilità prima dell'avvio del batch.
//!
//! ## Strategia di risoluzione:
//! 1. Variabile d'ambiente (`VIDSQUEEZE_FFMPEG`, `VIDSQUEEZE_FFPROBE`)
//! 2. Nome del comando specifico per piattaforma (`ffmpeg.exe` su Windows), cercato nel PATH

use crate::error::ToolError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding the ffmpeg executable
pub const FFMPEG_ENV: &str = "VIDSQUEEZE_FFMPEG";

/// Environment variable overriding the ffprobe executable
pub const FFPROBE_ENV: &str = "VIDSQUEEZE_FFPROBE";

/// Resolved external tools for a batch run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Toolchain {
    /// Use explicit tool locations
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Resolve tools from the environment, falling back to the platform command names
    pub fn from_env() -> Self {
        let resolve = |var: &str, base: &str| {
            std::env::var_os(var)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(Self::platform_command(base)))
        };

        let toolchain = Self {
            ffmpeg: resolve(FFMPEG_ENV, "ffmpeg"),
            ffprobe: resolve(FFPROBE_ENV, "ffprobe"),
        };
        debug!(
            "Resolved toolchain: ffmpeg={}, ffprobe={}",
            toolchain.ffmpeg.display(),
            toolchain.ffprobe.display()
        );
        toolchain
    }

    pub fn ffmpeg(&self) -> &Path {
        &self.ffmpeg
    }

    pub fn ffprobe(&self) -> &Path {
        &self.ffprobe
    }

    /// Get the platform-specific command name
    pub fn platform_command(base_name: &str) -> String {
        if cfg!(windows) {
            format!("{}.exe", base_name)
        } else {
            base_name.to_string()
        }
    }

    /// Get the command used to check if a program exists
    pub fn which_command() -> &'static str {
        if cfg!(windows) {
            "where"
        } else {
            "which"
        }
    }

    /// Check if a program is available, either at an explicit path or on PATH
    pub async fn is_available(program: &Path) -> bool {
        if program.components().count() > 1 || program.is_absolute() {
            return program.is_file();
        }

        let result = tokio::process::Command::new(Self::which_command())
            .arg(program)
            .output()
            .await;

        match result {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }

    /// Check if required tools are available
    pub async fn check_dependencies(&self) -> Result<(), ToolError> {
        for tool in [&self.ffmpeg, &self.ffprobe] {
            if !Self::is_available(tool).await {
                return Err(ToolError::MissingDependency(format!(
                    "{} is required for video processing",
                    tool.display()
                )));
            }
        }

        Ok(())
    }
}
