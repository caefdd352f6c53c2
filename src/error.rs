//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom dell'applicazione.
//!
//! ## Responsabilità:
//! - Categorizza gli errori per fase (probe, progress board, tool esterni, batch)
//! - Fornisce messaggi di errore descrittivi e strutturati
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `ProbeError`: ffprobe non eseguibile, exit non-zero, JSON illeggibile, nessuno stream video
//! - `BoardError`: uso scorretto del progress board (chiave già aperta)
//! - `ToolError`: ffmpeg/ffprobe mancanti
//! - `TranscodeError`: fallimento di un singolo transcode (exit non-zero, stallo, output invalido)
//! - `BatchError`: condizioni fatali che terminano il batch (nessun input, nessun superstite)
//!
//! Gli errori per singolo file (validazione, probe, transcode) non attraversano mai
//! il confine di fase: vengono convertiti in valori (`ValidationOutcome`, `JobOutcome`).
//!
//! ## Esempio:
//! ```rust,ignore
//! if survivors.is_empty() {
//!     return Err(BatchError::NoValidFiles);
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while inspecting a file with ffprobe
#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("Failed to execute {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("FFprobe error: {0}")]
    ToolFailed(String),

    #[error("Failed to parse ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No streams found")]
    NoStreams,

    #[error("No video streams found")]
    NoVideoStream,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the progress board
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum BoardError {
    #[error("Progress indicator already open: {0}")]
    AlreadyOpen(String),
}

/// Missing or unusable external tools
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    #[error("Dependency missing: {0}")]
    MissingDependency(String),
}

/// Errors raised while transcoding one file
#[derive(thiserror::Error, Debug)]
pub enum TranscodeError {
    #[error("Failed to execute {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ffmpeg exited with code {code}: {summary}")]
    Exited {
        code: i32,
        summary: String,
        stderr: String,
    },

    #[error("ffmpeg stalled: no progress for {}s", .0.as_secs())]
    Stalled(Duration),

    #[error("output validation failed: {0}")]
    OutputValidation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TranscodeError {
    /// Full tool diagnostics, when the tool produced any
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::Exited { stderr, .. } if !stderr.trim().is_empty() => Some(stderr),
            _ => None,
        }
    }
}

/// Fatal conditions that stop the whole batch
#[derive(thiserror::Error, Debug)]
pub enum BatchError {
    #[error("No input files specified")]
    NoInputFiles,

    #[error("No valid video files found")]
    NoValidFiles,

    #[error("No files successfully probed")]
    NoFilesProbed,

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Input file does not exist: {}", .0.display())]
    MissingInput(PathBuf),
}

impl BatchError {
    /// Process exit code for a fatal batch condition
    pub fn exit_code(&self) -> u8 {
        1
    }
}
