//! # File Validator Module
//!
//! Prima fase del batch: scarta i file che non possono essere transcodificati.
//!
//! ## Controlli (in ordine, il primo che fallisce decide):
//! 1. Il file esiste
//! 2. È un file regolare
//! 3. Non è vuoto
//! 4. ffprobe lo legge e riporta almeno uno stream video
//!
//! Ogni esito è un valore (`ValidationOutcome`), mai un errore propagato: un
//! file invalido non interrompe la validazione degli altri.

use crate::batch::scheduler::run_phase;
use crate::error::ProbeError;
use crate::platform::Toolchain;
use crate::probe::run_ffprobe;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of validating one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub ok: bool,
    /// Why the file was rejected
    pub reason: Option<String>,
    /// Size in bytes, when the file could be read
    pub file_size: Option<u64>,
}

impl ValidationOutcome {
    pub fn passed(file_size: u64) -> Self {
        Self {
            ok: true,
            reason: None,
            file_size: Some(file_size),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
            file_size: None,
        }
    }
}

/// Checks that inputs are readable, non-empty videos
#[derive(Debug, Clone)]
pub struct FileValidator {
    toolchain: Toolchain,
}

impl FileValidator {
    pub fn new(toolchain: Toolchain) -> Self {
        Self { toolchain }
    }

    /// Validate a single file
    pub async fn validate(&self, path: &Path) -> ValidationOutcome {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(_) => return ValidationOutcome::failed("File does not exist"),
        };

        if !metadata.is_file() {
            return ValidationOutcome::failed("Not a regular file");
        }

        let file_size = metadata.len();
        if file_size == 0 {
            return ValidationOutcome::failed("File is empty");
        }

        match self.check_video_format(path).await {
            Ok(()) => ValidationOutcome::passed(file_size),
            Err(reason) => ValidationOutcome::failed(reason),
        }
    }

    async fn check_video_format(&self, path: &Path) -> Result<(), String> {
        match run_ffprobe(self.toolchain.ffprobe(), path).await {
            Ok(report) if report.has_video_stream() => Ok(()),
            Ok(_) => Err(ProbeError::NoVideoStream.to_string()),
            Err(e @ ProbeError::ToolFailed(_)) => Err(e.to_string()),
            Err(e) => Err(format!("Error validating video format: {e}")),
        }
    }

    /// Validate every path with at most `jobs` checks running at once.
    ///
    /// The result has exactly one entry per distinct input path.
    pub async fn validate_all(&self, paths: &[PathBuf], jobs: usize) -> HashMap<PathBuf, ValidationOutcome> {
        let validator = Arc::new(self.clone());
        let results = run_phase("validate", paths.to_vec(), jobs, move |path: PathBuf| {
            let validator = validator.clone();
            async move { Ok(validator.validate(&path).await) }
        })
        .await;

        let outcomes: HashMap<PathBuf, ValidationOutcome> = results
            .into_iter()
            .map(|(path, result)| {
                let outcome = result
                    .unwrap_or_else(|e| ValidationOutcome::failed(format!("Validation task failed: {e}")));
                (path, outcome)
            })
            .collect();

        for path in paths {
            match outcomes.get(path) {
                Some(ValidationOutcome { ok: true, .. }) => debug!("Valid: {}", path.display()),
                Some(ValidationOutcome { reason, .. }) => warn!(
                    "Invalid file {}: {}",
                    path.display(),
                    reason.as_deref().unwrap_or("unknown reason")
                ),
                None => {}
            }
        }

        let valid = outcomes.values().filter(|o| o.ok).count();
        let total = outcomes.len().max(1);
        debug!(
            "Valid files: {} out of {} ({:.1}%)",
            valid,
            outcomes.len(),
            valid as f64 / total as f64 * 100.0
        );

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn validator() -> FileValidator {
        FileValidator::new(Toolchain::new("ffmpeg", "/nonexistent/vidsqueeze/ffprobe"))
    }

    #[tokio::test]
    async fn test_missing_file() {
        let outcome = validator().validate(Path::new("/nonexistent/clip.mp4")).await;
        assert_eq!(outcome, ValidationOutcome::failed("File does not exist"));
    }

    #[tokio::test]
    async fn test_directory_is_not_a_regular_file() {
        let temp_dir = TempDir::new().unwrap();
        let outcome = validator().validate(temp_dir.path()).await;
        assert_eq!(outcome.reason.as_deref(), Some("Not a regular file"));
    }

    #[tokio::test]
    async fn test_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.mp4");
        tokio::fs::write(&path, b"").await.unwrap();

        let outcome = validator().validate(&path).await;
        assert!(!outcome.ok);
        assert_eq!(outcome.reason.as_deref(), Some("File is empty"));
    }

    #[tokio::test]
    async fn test_unrunnable_probe_is_a_format_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("clip.mp4");
        tokio::fs::write(&path, b"not really a video").await.unwrap();

        let outcome = validator().validate(&path).await;
        assert!(!outcome.ok);
        assert!(outcome
            .reason
            .unwrap()
            .starts_with("Error validating video format:"));
    }

    #[tokio::test]
    async fn test_validate_all_one_entry_per_path() {
        let temp_dir = TempDir::new().unwrap();
        let empty = temp_dir.path().join("empty.mp4");
        tokio::fs::write(&empty, b"").await.unwrap();
        let missing = temp_dir.path().join("missing.mp4");

        let paths = vec![empty.clone(), missing.clone(), empty.clone()];
        let outcomes = validator().validate_all(&paths, 2).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[&empty].reason.as_deref(), Some("File is empty"));
        assert_eq!(outcomes[&missing].reason.as_deref(), Some("File does not exist"));
    }
}
