//! # JSON Output Module
//!
//! Output strutturato in JSON su stdout per l'uso da script e altri programmi
//! (`--json`). In questa modalità le barre di progresso sono nascoste e i log
//! restano su stderr.
//!
//! ## Tipi di messaggi (uno per riga):
//! - `start`: inizio del batch, numero di file e opzioni di transcode
//! - `file_complete`: esito di un singolo file
//! - `complete`: statistiche finali e codice di uscita
//! - `error`: errore fatale che termina il batch

use crate::batch::summary::BatchSummary;
use crate::batch::transcode_job::JobOutcome;
use crate::config::TranscodeOptions;
use serde::Serialize;

/// One JSON line on stdout
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage<'a> {
    Start {
        total_files: usize,
        jobs: usize,
        options: &'a TranscodeOptions,
    },

    FileComplete {
        #[serde(flatten)]
        outcome: &'a JobOutcome,
    },

    Complete {
        inputs: usize,
        validated: usize,
        probed: usize,
        succeeded: usize,
        failed: usize,
        skipped: usize,
        bytes_in: u64,
        bytes_out: u64,
        interrupted: bool,
        duration_seconds: f64,
        exit_code: u8,
    },

    Error {
        message: String,
    },
}

impl<'a> JsonMessage<'a> {
    /// Print the message on stdout as a single line
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(total_files: usize, jobs: usize, options: &'a TranscodeOptions) -> Self {
        Self::Start {
            total_files,
            jobs,
            options,
        }
    }

    pub fn file_complete(outcome: &'a JobOutcome) -> Self {
        Self::FileComplete { outcome }
    }

    pub fn complete(summary: &BatchSummary) -> Self {
        Self::Complete {
            inputs: summary.inputs,
            validated: summary.validated,
            probed: summary.probed,
            succeeded: summary.succeeded,
            failed: summary.failed,
            skipped: summary.skipped,
            bytes_in: summary.bytes_in,
            bytes_out: summary.bytes_out,
            interrupted: summary.interrupted,
            duration_seconds: summary.duration_seconds,
            exit_code: summary.exit_code(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
