//! # Batch Runner
//!
//! Orchestratore del batch: valida, analizza e transcodifica un insieme di
//! file delegando ai moduli specializzati.
//!
//! ## Fasi (sequenziali, ognuna con al massimo `jobs` worker):
//! 1. Validazione: i file invalidi vengono scartati con il loro motivo
//! 2. Probe: i file senza metadati leggibili vengono scartati
//! 3. Transcode: un job per file, con indicatore sul progress board
//!
//! Nessuna fase parte prima che la precedente sia terminata. Un fallimento
//! per singolo file non ferma il batch; lo fermano solo l'assenza di file
//! validi o analizzabili e l'interruzione dell'operatore.
//!
//! ## Interruzione:
//! Quando il future di shutdown si risolve, i transcode in corso vengono
//! cancellati (ffmpeg terminato, output parziale rimosso). Il runner attende
//! che ogni worker cancellato sia stato rilasciato, poi chiude il board e
//! riporta i file non completati come `Skipped("interrupted")`.

use crate::batch::scheduler::run_phase;
use crate::batch::summary::{BatchSummary, FileFailure};
use crate::batch::transcode_job::{JobOutcome, TranscodeJob};
use crate::config::Config;
use crate::error::BatchError;
use crate::json_output::JsonMessage;
use crate::platform::Toolchain;
use crate::probe::{MediaProbe, MediaSummary};
use crate::progress::ProgressBoard;
use crate::validator::FileValidator;
use indicatif::{MultiProgress, ProgressDrawTarget};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Runs a batch of transcodes end to end
pub struct BatchRunner {
    config: Config,
    toolchain: Toolchain,
    multi: MultiProgress,
}

impl BatchRunner {
    pub fn new(config: Config, toolchain: Toolchain) -> Result<Self, BatchError> {
        config.validate().map_err(|e| BatchError::Config(e.to_string()))?;
        Ok(Self {
            config,
            toolchain,
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
        })
    }

    /// Draw progress through `multi` instead of keeping it hidden
    pub fn with_progress(mut self, multi: MultiProgress) -> Self {
        self.multi = multi;
        self
    }

    /// Run the batch to completion
    pub async fn run(&self, inputs: Vec<PathBuf>) -> Result<BatchSummary, BatchError> {
        self.run_until(inputs, std::future::pending()).await
    }

    /// Run the batch, stopping early when `shutdown` resolves
    pub async fn run_until<S>(&self, inputs: Vec<PathBuf>, shutdown: S) -> Result<BatchSummary, BatchError>
    where
        S: Future<Output = ()>,
    {
        let result = self.run_phases(inputs, shutdown).await;
        if let (Err(e), true) = (&result, self.config.json_output) {
            JsonMessage::error(e.to_string()).emit();
        }
        result
    }

    async fn run_phases<S>(&self, inputs: Vec<PathBuf>, shutdown: S) -> Result<BatchSummary, BatchError>
    where
        S: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let inputs = dedup_in_order(inputs);
        if inputs.is_empty() {
            return Err(BatchError::NoInputFiles);
        }

        self.toolchain.check_dependencies().await?;

        let jobs = self.config.jobs;
        let mut summary = BatchSummary::new(inputs.len());
        if self.config.json_output {
            JsonMessage::start(inputs.len(), jobs, &self.config.options).emit();
        } else {
            info!("Processing {} files with up to {} parallel jobs", inputs.len(), jobs);
        }

        // Phase 1: validation
        let validator = FileValidator::new(self.toolchain.clone());
        let validations = validator.validate_all(&inputs, jobs).await;
        let mut valid_files = Vec::with_capacity(inputs.len());
        for path in &inputs {
            match validations.get(path) {
                Some(outcome) if outcome.ok => valid_files.push(path.clone()),
                Some(outcome) => summary.validation_failures.push(FileFailure {
                    path: path.clone(),
                    reason: outcome.reason.clone().unwrap_or_default(),
                }),
                None => summary.validation_failures.push(FileFailure {
                    path: path.clone(),
                    reason: "not validated".to_string(),
                }),
            }
        }
        summary.validated = valid_files.len();
        if valid_files.is_empty() {
            return Err(BatchError::NoValidFiles);
        }

        // Phase 2: probing
        let probe = MediaProbe::new(self.toolchain.clone());
        let media = probe.probe_all(&valid_files, jobs).await;
        let probed: HashSet<&PathBuf> = media.iter().map(|m| &m.path).collect();
        summary.probe_failures = valid_files
            .iter()
            .filter(|path| !probed.contains(path))
            .map(|path| FileFailure {
                path: path.clone(),
                reason: "could not read media metadata".to_string(),
            })
            .collect();
        summary.probed = media.len();
        if media.is_empty() {
            return Err(BatchError::NoFilesProbed);
        }

        // Phase 3: transcoding
        let order: Vec<PathBuf> = media.iter().map(|m| m.path.clone()).collect();
        let board = Arc::new(ProgressBoard::new(self.multi.clone(), Some(media.len() as u64)));
        let job = TranscodeJob::new(&self.config, self.toolchain.clone(), board.clone());
        let finished: Arc<Mutex<HashMap<PathBuf, JobOutcome>>> = Arc::new(Mutex::new(HashMap::new()));
        let media: Arc<HashMap<PathBuf, MediaSummary>> =
            Arc::new(media.into_iter().map(|m| (m.path.clone(), m)).collect());

        // Every worker holds a sender; recv() yields None once all of them are gone
        let (alive_tx, mut alive_rx) = mpsc::channel::<()>(1);

        let json_output = self.config.json_output;
        let worker = {
            let finished = finished.clone();
            let alive_tx = alive_tx.clone();
            move |path: PathBuf| {
                let job = job.clone();
                let media = media.clone();
                let finished = finished.clone();
                let alive_tx = alive_tx.clone();
                async move {
                    let _alive = alive_tx;
                    let Some(summary) = media.get(&path) else {
                        return Err(anyhow::anyhow!("no media summary for {}", path.display()));
                    };
                    let outcome = job.run(summary).await;
                    if json_output {
                        JsonMessage::file_complete(&outcome).emit();
                    }
                    finished.lock().insert(path, outcome.clone());
                    Ok(outcome)
                }
            }
        };

        let results = tokio::select! {
            results = run_phase("transcode", order.clone(), jobs, worker) => Some(results),
            _ = shutdown => None,
        };
        drop(alive_tx);
        if results.is_none() {
            // Aborted workers are dropped by the runtime, which removes their partial outputs
            let _ = alive_rx.recv().await;
        }
        board.close_all();

        match results {
            Some(mut results) => {
                for path in &order {
                    let outcome = match results.remove(path) {
                        Some(Ok(outcome)) => outcome,
                        Some(Err(e)) => {
                            error!("Transcode worker for {} failed: {}", path.display(), e);
                            let outcome = JobOutcome::failed(path.clone(), e.to_string());
                            if json_output {
                                JsonMessage::file_complete(&outcome).emit();
                            }
                            outcome
                        }
                        None => JobOutcome::failed(path.clone(), "no result"),
                    };
                    summary.record(outcome);
                }
            }
            None => {
                warn!("Interrupted, stopping running transcodes");
                summary.interrupted = true;
                let mut finished = finished.lock();
                for path in &order {
                    let outcome = finished.remove(path).unwrap_or_else(|| {
                        let outcome = JobOutcome::skipped(path.clone(), "interrupted");
                        if json_output {
                            JsonMessage::file_complete(&outcome).emit();
                        }
                        outcome
                    });
                    summary.record(outcome);
                }
            }
        }

        summary.duration_seconds = start_time.elapsed().as_secs_f64();
        debug!("Batch finished in {:.2}s", summary.duration_seconds);

        if json_output {
            JsonMessage::complete(&summary).emit();
        } else {
            summary.log();
        }

        Ok(summary)
    }
}

fn dedup_in_order(inputs: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::with_capacity(inputs.len());
    inputs.into_iter().filter(|path| seen.insert(path.clone())).collect()
}
