//! # Vidsqueeze - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del logging con `tracing`, instradato attraverso il
//!   progress board perché i log non spezzino le barre
//! - Validazione degli input dell'utente
//! - Avvio del batch e traduzione del risultato in codice di uscita
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI, opzionalmente sopra un file di configurazione
//!    (`--config`), e salva la configurazione risultante se richiesto (`--save-config`)
//! 2. Configura il logging (`-v` debug, `-vv` trace, `RUST_LOG` ha la precedenza)
//! 3. Verifica che ogni file di input esista
//! 4. Esegue il batch, interrompibile con Ctrl-C
//!
//! ## Esempio di utilizzo:
//! ```bash
//! vidsqueeze -n -r 720p -q 28 -j 4 clips/*.mov
//! ```

use anyhow::Result;
use clap::{ArgAction, Parser};
use indicatif::{MultiProgress, ProgressDrawTarget};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use vidsqueeze::config::MAX_QUALITY;
use vidsqueeze::{BatchError, BatchRunner, BoardLogWriter, Config, FrameRate, Resolution, Toolchain, Verbosity};

#[derive(Parser)]
#[command(name = "vidsqueeze", version)]
#[command(about = "Compress video files with ffmpeg, several at a time")]
struct Args {
    /// Video files to compress
    input_files: Vec<PathBuf>,

    /// Drop the audio track
    #[arg(short = 'n', long)]
    no_audio: bool,

    /// Output resolution: 4k, 1080p, 720p, 576p, 480p or WxH
    #[arg(short, long)]
    resolution: Option<Resolution>,

    /// Output frame rate: film, pal, ntsc, 60fps or a number
    #[arg(short, long)]
    fps: Option<FrameRate>,

    /// Lossless encode (CRF 0)
    #[arg(short, long)]
    lossless: bool,

    /// CRF quality (0-51, lower = better quality, default 23)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=MAX_QUALITY as i64))]
    quality: Option<u8>,

    /// Verbose output (-v for details, -vv for ffmpeg commands and diagnostics)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Maximum number of files processed at once (default: number of CPU cores)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Skip files whose output already exists
    #[arg(long)]
    skip_existing: bool,

    /// Kill ffmpeg when it reports no progress for this many seconds
    #[arg(long, value_name = "SECONDS")]
    stall_timeout: Option<u64>,

    /// Output progress and results as JSON lines on stdout
    #[arg(long)]
    json: bool,

    /// JSON configuration file; command line flags take precedence
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write the effective configuration to FILE before running
    #[arg(long, value_name = "FILE")]
    save_config: Option<PathBuf>,
}

impl Args {
    /// Layer the command line over `config`
    fn apply(&self, config: &mut Config) {
        let options = &mut config.options;
        options.drop_audio |= self.no_audio;
        options.lossless |= self.lossless;
        if self.resolution.is_some() {
            options.resolution = self.resolution;
        }
        if self.fps.is_some() {
            options.frame_rate = self.fps;
        }
        if self.quality.is_some() {
            options.quality = self.quality;
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if self.verbose > 0 {
            config.verbosity = Verbosity::from_occurrences(self.verbose);
        }
        config.skip_existing |= self.skip_existing;
        if self.stall_timeout.is_some() {
            config.stall_timeout_secs = self.stall_timeout;
        }
        config.json_output |= self.json;
    }
}

fn init_logging(verbosity: Verbosity, multi: &MultiProgress) -> Result<()> {
    let default_directive = match verbosity {
        Verbosity::Normal => "vidsqueeze=info",
        Verbosity::Verbose => "vidsqueeze=debug",
        Verbosity::VeryVerbose => "vidsqueeze=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(BoardLogWriter::new(multi.clone()))
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path).await?,
        None => Config::default(),
    };
    args.apply(&mut config);

    let multi = if config.json_output {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    } else {
        MultiProgress::new()
    };
    init_logging(config.verbosity, &multi)?;
    if let Some(path) = &args.config {
        debug!("Configuration loaded from {}", path.display());
    }
    if let Some(path) = &args.save_config {
        config.save_to_file(path).await?;
        info!("Configuration saved to {}", path.display());
    }

    if args.input_files.is_empty() {
        let e = BatchError::NoInputFiles;
        error!("{}", e);
        return Ok(ExitCode::from(e.exit_code()));
    }

    for path in &args.input_files {
        if !path.exists() {
            let e = BatchError::MissingInput(path.clone());
            error!("{}", e);
            return Ok(ExitCode::from(e.exit_code()));
        }
    }

    let runner = match BatchRunner::new(config, Toolchain::from_env()) {
        Ok(runner) => runner.with_progress(multi),
        Err(e) => {
            error!("{}", e);
            return Ok(ExitCode::from(e.exit_code()));
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            debug!("Ctrl-C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match runner.run_until(args.input_files, shutdown).await {
        Ok(summary) => Ok(ExitCode::from(summary.exit_code())),
        Err(e) => {
            error!("{}", e);
            Ok(ExitCode::from(e.exit_code()))
        }
    }
}
