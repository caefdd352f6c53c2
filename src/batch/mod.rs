//! # Batch Module
//!
//! Esecuzione di un batch di transcode separata in sottomoduli:
//! - `scheduler`: esecuzione di una fase con concorrenza limitata
//! - `transcode_job`: worker per il singolo file
//! - `summary`: statistiche aggregate e codice di uscita
//! - `runner`: orchestratore delle fasi

pub mod runner;
pub mod scheduler;
pub mod summary;
pub mod transcode_job;

pub use runner::BatchRunner;
pub use scheduler::run_phase;
pub use summary::{BatchSummary, FileFailure};
pub use transcode_job::{JobOutcome, JobStatus, TranscodeJob};
