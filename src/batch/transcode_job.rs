//! # Transcode Job Module
//!
//! Worker per il transcode di un singolo file con ffmpeg.
//!
//! ## Flusso:
//! 1. Calcolo del path di output (`<stem><suffix><ext>`), skip se esiste già,
//!    è un video valido e `skip_existing` è attivo
//! 2. Apertura dell'indicatore sul progress board (frame o byte)
//! 3. Avvio di ffmpeg con `-progress pipe:1`, lettura riga per riga e
//!    avanzamento dell'indicatore
//! 4. Exit code non-zero: fallimento con l'ultima riga di stderr come motivo
//! 5. Successo: indicatore al 100%, validazione dell'output
//!
//! Il job non propaga mai errori: ogni esito diventa un `JobOutcome`.
//! Se il job viene cancellato il processo ffmpeg viene terminato e l'output
//! parziale rimosso.

use crate::config::{Config, TranscodeOptions};
use crate::error::TranscodeError;
use crate::ffmpeg::{build_args, ProgressMeter};
use crate::file_manager::FileManager;
use crate::path_display::{label_budget, truncate_path};
use crate::platform::Toolchain;
use crate::probe::MediaSummary;
use crate::progress::ProgressBoard;
use crate::units::{format_data_rate, format_data_volume, format_time};
use crate::validator::FileValidator;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, trace, warn};

/// Final state of one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    Failed(String),
    Skipped(String),
}

impl JobStatus {
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Succeeded => None,
            Self::Failed(reason) | Self::Skipped(reason) => Some(reason),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Everything the batch learns from one job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobOutcome {
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: JobStatus,
    pub elapsed_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    pub input_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_size: Option<u64>,
    /// Full ffmpeg error output for failed jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

impl JobOutcome {
    /// Outcome for a file that never got to run
    pub fn skipped(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: JobStatus::Skipped(reason.into()),
            elapsed_seconds: 0.0,
            output_path: None,
            input_size: 0,
            output_size: None,
            diagnostics: None,
        }
    }

    /// Outcome for a worker that failed outside the job itself
    pub fn failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed(reason.into()),
            ..Self::skipped(path, "")
        }
    }
}

#[derive(Debug, Default)]
struct JobTally {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

/// Transcodes one file at a time; cheap to clone across workers
#[derive(Clone)]
pub struct TranscodeJob {
    toolchain: Toolchain,
    options: TranscodeOptions,
    board: Arc<ProgressBoard>,
    validator: FileValidator,
    skip_existing: bool,
    stall_timeout: Option<Duration>,
    tally: Arc<JobTally>,
}

impl TranscodeJob {
    pub fn new(config: &Config, toolchain: Toolchain, board: Arc<ProgressBoard>) -> Self {
        Self {
            validator: FileValidator::new(toolchain.clone()),
            toolchain,
            options: config.options.clone(),
            board,
            skip_existing: config.skip_existing,
            stall_timeout: config.stall_timeout(),
            tally: Arc::new(JobTally::default()),
        }
    }

    /// Where the transcoded copy of `input` goes
    pub fn output_path(&self, input: &Path) -> PathBuf {
        FileManager::output_path(input, &self.options.suffix())
    }

    /// Transcode one probed file
    pub async fn run(&self, media: &MediaSummary) -> JobOutcome {
        let started = Instant::now();
        let input = &media.path;
        let output = self.output_path(input);

        let mut outcome = JobOutcome {
            input_size: media.byte_size,
            ..JobOutcome::skipped(input.clone(), "output already exists")
        };

        if self.skip_existing && output.exists() {
            let existing = self.validator.validate(&output).await;
            if existing.ok {
                info!("Skipping {}: {} already exists", input.display(), output.display());
                return outcome;
            }
            warn!(
                "Existing output {} is unusable ({}), transcoding again",
                output.display(),
                existing.reason.as_deref().unwrap_or("unknown reason")
            );
        }

        let mut partial = PartialOutput::new(&output);
        let result = match self.transcode(media, &output, &mut partial).await {
            Ok(()) => self.check_output(&output).await,
            Err(e) => Err(e),
        };
        outcome.elapsed_seconds = started.elapsed().as_secs_f64();

        match result {
            Ok(output_size) => {
                outcome.status = JobStatus::Succeeded;
                outcome.output_size = Some(output_size);
                debug!("Wrote: {}", output.display());
                trace!(
                    "Compressed {} in {} at {}",
                    format_data_volume(media.byte_size),
                    format_time(outcome.elapsed_seconds),
                    format_data_rate(media.byte_size as f64 / outcome.elapsed_seconds.max(f64::EPSILON))
                );
                partial.disarm();
                outcome.output_path = Some(output);
                self.tally.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!("Failed to compress {}: {}", input.display(), e);
                if let Some(diagnostics) = e.diagnostics() {
                    trace!("FFmpeg error output for {}:\n{}", input.display(), diagnostics);
                }
                partial.discard().await;
                outcome.diagnostics = e.diagnostics().map(str::to_string);
                outcome.status = JobStatus::Failed(e.to_string());
                self.tally.failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        debug!(
            "Transcodes so far: {} succeeded, {} failed",
            self.tally.succeeded.load(Ordering::Relaxed),
            self.tally.failed.load(Ordering::Relaxed)
        );
        outcome
    }

    /// Run ffmpeg with a live indicator, closing the indicator whatever happens
    async fn transcode(
        &self,
        media: &MediaSummary,
        output: &Path,
        partial: &mut PartialOutput,
    ) -> Result<(), TranscodeError> {
        let input = &media.path;
        let mut meter = ProgressMeter::for_media(media, &self.options);
        let label = truncate_path(input, label_budget());
        if let Err(e) = self.board.open(input, &label, meter.total(), meter.unit()) {
            debug!("{}", e);
        }

        let result = self.run_ffmpeg(input, output, &mut meter, partial).await;
        match &result {
            Ok(()) => self.board.complete(input),
            Err(_) => self.board.fail(input),
        };
        result
    }

    async fn run_ffmpeg(
        &self,
        input: &Path,
        output: &Path,
        meter: &mut ProgressMeter,
        partial: &mut PartialOutput,
    ) -> Result<(), TranscodeError> {
        let args = build_args(input, output, &self.options);
        trace!(
            "FFmpeg command: {} {}",
            self.toolchain.ffmpeg().display(),
            args.iter().map(|a| a.to_string_lossy()).collect::<Vec<_>>().join(" ")
        );

        let mut child = Command::new(self.toolchain.ffmpeg())
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TranscodeError::Spawn {
                tool: self.toolchain.ffmpeg().display().to_string(),
                source,
            })?;
        partial.arm();

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "ffmpeg stdout not captured"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "ffmpeg stderr not captured"))?;

        // Drained concurrently so a chatty ffmpeg never blocks on a full pipe
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).into_owned()
        });

        let mut lines = BufReader::new(stdout).lines();
        loop {
            let next = match self.stall_timeout {
                Some(limit) => match tokio::time::timeout(limit, lines.next_line()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(
                            "No progress from ffmpeg on {} for {}s, stopping it",
                            input.display(),
                            limit.as_secs()
                        );
                        kill(&mut child).await;
                        return Err(TranscodeError::Stalled(limit));
                    }
                },
                None => lines.next_line().await,
            };

            match next {
                Ok(Some(line)) => {
                    if let Some(delta) = meter.observe(&line) {
                        self.board.advance(input, delta);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("Stopped reading ffmpeg progress for {}: {}", input.display(), e);
                    break;
                }
            }
        }
        drop(lines);

        let status = child.wait().await?;
        let stderr_text = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let summary = stderr_text
                .lines()
                .rev()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .unwrap_or("no error output")
                .to_string();
            return Err(TranscodeError::Exited {
                code: status.code().unwrap_or(-1),
                summary,
                stderr: stderr_text,
            });
        }

        Ok(())
    }

    async fn check_output(&self, output: &Path) -> Result<u64, TranscodeError> {
        let validation = self.validator.validate(output).await;
        match (validation.ok, validation.file_size) {
            (true, Some(size)) => Ok(size),
            _ => Err(TranscodeError::OutputValidation(
                validation.reason.unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }
}

/// Output file that ffmpeg may have left half written.
///
/// Armed once ffmpeg starts; dropping it while armed removes the file, so a
/// cancelled job never leaves a truncated output behind.
struct PartialOutput {
    path: PathBuf,
    armed: bool,
}

impl PartialOutput {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: false,
        }
    }

    fn arm(&mut self) {
        self.armed = true;
    }

    fn disarm(&mut self) {
        self.armed = false;
    }

    /// Remove the file now if ffmpeg got to write it
    async fn discard(&mut self) {
        if !std::mem::take(&mut self.armed) {
            return;
        }
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!("Removed partial output {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove partial output {}: {}", self.path.display(), e),
        }
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed partial output {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove partial output {}: {}", self.path.display(), e),
        }
    }
}

async fn kill(child: &mut Child) {
    if let Err(e) = child.kill().await {
        debug!("Failed to kill ffmpeg: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn job(config: &Config) -> TranscodeJob {
        let toolchain = Toolchain::new("/nonexistent/vidsqueeze/ffmpeg", "/nonexistent/vidsqueeze/ffprobe");
        TranscodeJob::new(config, toolchain, Arc::new(ProgressBoard::hidden(None)))
    }

    fn media(path: PathBuf) -> MediaSummary {
        MediaSummary {
            path,
            frame_count: Some(100),
            duration_seconds: Some(4.0),
            byte_size: 2048,
        }
    }

    #[test]
    fn test_output_path_uses_option_suffix() {
        let mut config = Config::default();
        config.options.drop_audio = true;
        config.options.quality = Some(30);
        let job = job(&config);
        assert_eq!(
            job.output_path(Path::new("clips/a.mov")),
            PathBuf::from("clips/a-ffmpeg-n-q30.mov")
        );
    }

    #[tokio::test]
    async fn test_unusable_existing_output_is_not_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("clip.mp4");
        tokio::fs::write(&input, b"data").await.unwrap();

        let mut config = Config::default();
        config.skip_existing = true;
        let job = job(&config);
        let output = job.output_path(&input);
        tokio::fs::write(&output, b"old").await.unwrap();

        // ffprobe cannot vouch for the old file, so the job runs again
        let outcome = job.run(&media(input.clone())).await;
        assert!(matches!(outcome.status, JobStatus::Failed(_)));
        assert_eq!(outcome.path, input);
        assert_eq!(outcome.input_size, 2048);
        // ffmpeg never started, so the old file is left alone
        assert!(output.exists());
    }

    #[test]
    fn test_partial_output_removed_only_when_armed() {
        let temp_dir = TempDir::new().unwrap();
        let kept = temp_dir.path().join("kept.mp4");
        let removed = temp_dir.path().join("removed.mp4");
        std::fs::write(&kept, b"x").unwrap();
        std::fs::write(&removed, b"x").unwrap();

        drop(PartialOutput::new(&kept));
        let mut guard = PartialOutput::new(&removed);
        guard.arm();
        drop(guard);

        assert!(kept.exists());
        assert!(!removed.exists());
    }

    #[tokio::test]
    async fn test_disarmed_partial_output_is_kept() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("done.mp4");
        tokio::fs::write(&path, b"x").await.unwrap();

        let mut guard = PartialOutput::new(&path);
        guard.arm();
        guard.disarm();
        guard.discard().await;
        drop(guard);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_fails_without_leaking_indicator() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("clip.mp4");
        tokio::fs::write(&input, b"data").await.unwrap();

        let config = Config::default();
        let job = job(&config);
        let outcome = job.run(&media(input)).await;

        match &outcome.status {
            JobStatus::Failed(reason) => assert!(reason.starts_with("Failed to execute")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(outcome.output_path.is_none());
        assert_eq!(job.board.live_count(), 0);
    }

    #[test]
    fn test_status_serialization() {
        let outcome = JobOutcome::failed("a.mp4", "ffmpeg exited with code 1: boom");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "ffmpeg exited with code 1: boom");
        assert!(json.get("output_path").is_none());

        let json = serde_json::to_value(JobOutcome::skipped("b.mp4", "interrupted")).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "interrupted");
        assert_eq!(JobStatus::Succeeded.reason(), None);
    }
}
