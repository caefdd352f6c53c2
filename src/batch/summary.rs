//! # Batch Summary Module
//!
//! Statistiche aggregate di un batch: quanti file sono sopravvissuti a ogni
//! fase, esito dei transcode, byte risparmiati e codice di uscita.
//!
//! ## Codice di uscita:
//! - `130`: batch interrotto dall'operatore
//! - `1`: nessun transcode riuscito e almeno uno fallito
//! - `0`: altrimenti (anche con fallimenti parziali)

use crate::batch::transcode_job::{JobOutcome, JobStatus};
use crate::file_manager::FileManager;
use crate::units::{format_data_volume, format_time};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Exit code reported when the operator interrupts the batch
pub const EXIT_INTERRUPTED: u8 = 130;

/// A file dropped by a phase, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Statistics for a whole batch run
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub inputs: usize,
    pub validated: usize,
    pub probed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub validation_failures: Vec<FileFailure>,
    pub probe_failures: Vec<FileFailure>,
    pub outcomes: Vec<JobOutcome>,
    pub interrupted: bool,
    pub duration_seconds: f64,
}

impl BatchSummary {
    pub fn new(inputs: usize) -> Self {
        Self {
            inputs,
            ..Self::default()
        }
    }

    /// Account for one finished job
    pub fn record(&mut self, outcome: JobOutcome) {
        match &outcome.status {
            JobStatus::Succeeded => {
                self.succeeded += 1;
                self.bytes_in += outcome.input_size;
                self.bytes_out += outcome.output_size.unwrap_or_default();
            }
            JobStatus::Failed(_) => self.failed += 1,
            JobStatus::Skipped(_) => self.skipped += 1,
        }
        self.outcomes.push(outcome);
    }

    /// Percentage saved across successful transcodes
    pub fn overall_reduction_percent(&self) -> f64 {
        FileManager::calculate_reduction(self.bytes_in, self.bytes_out)
    }

    /// Outcomes that failed
    pub fn failures(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, JobStatus::Failed(_)))
    }

    /// Process exit code for this batch
    pub fn exit_code(&self) -> u8 {
        if self.interrupted {
            EXIT_INTERRUPTED
        } else if self.succeeded == 0 && self.failed > 0 {
            1
        } else {
            0
        }
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Inputs: {} | Valid: {} | Probed: {} | Succeeded: {} | Failed: {} | Skipped: {} | Size: {} -> {} ({:.1}% saved) | Time: {}",
            self.inputs,
            self.validated,
            self.probed,
            self.succeeded,
            self.failed,
            self.skipped,
            format_data_volume(self.bytes_in),
            format_data_volume(self.bytes_out),
            self.overall_reduction_percent(),
            format_time(self.duration_seconds)
        )
    }

    /// Write the end-of-run report to the log
    pub fn log(&self) {
        if self.interrupted {
            warn!("Batch interrupted; unfinished files were skipped");
        }
        info!("{}", self.format_summary());

        for failure in &self.validation_failures {
            warn!("  invalid: {}: {}", failure.path.display(), failure.reason);
        }
        for failure in &self.probe_failures {
            warn!("  not probed: {}: {}", failure.path.display(), failure.reason);
        }
        for outcome in self.failures() {
            error!(
                "  failed: {}: {}",
                outcome.path.display(),
                outcome.status.reason().unwrap_or_default()
            );
        }
    }
}
