//! # Vidsqueeze Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per i test di integrazione
//!
//! ## Architettura dei moduli:
//! - `config`: Opzioni di transcode, configurazione del batch e validazione
//! - `error`: Tipi di errore custom per fase
//! - `platform`: Risoluzione e verifica di ffmpeg/ffprobe
//! - `validator`: Prima fase, scarta i file non transcodificabili
//! - `probe`: Seconda fase, metadati via ffprobe
//! - `ffmpeg`: Riga di comando ffmpeg e parsing del progresso
//! - `progress`: Progress board multi-riga condiviso tra i worker
//! - `batch`: Scheduler, job di transcode, runner e statistiche
//! - `json_output`: Output strutturato per uso programmatico
//! - `units`, `path_display`, `file_manager`, `utils`: Utilità
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use vidsqueeze::{BatchRunner, Config, Toolchain};
//!
//! let runner = BatchRunner::new(Config::default(), Toolchain::from_env())?;
//! let summary = runner.run(vec!["clip.mov".into()]).await?;
//! std::process::exit(summary.exit_code() as i32);
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod file_manager;
pub mod json_output;
pub mod path_display;
pub mod platform;
pub mod probe;
pub mod progress;
pub mod units;
pub mod utils;
pub mod validator;

pub use batch::{BatchRunner, BatchSummary, JobOutcome, JobStatus};
pub use config::{Config, FrameRate, Resolution, TranscodeOptions, Verbosity};
pub use error::{BatchError, BoardError, ProbeError, ToolError, TranscodeError};
pub use platform::Toolchain;
pub use probe::{MediaProbe, MediaSummary};
pub use progress::{BoardLogWriter, ProgressBoard, ProgressUnit};
pub use validator::{FileValidator, ValidationOutcome};
