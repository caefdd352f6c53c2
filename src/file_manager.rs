//! # File Management Module
//!
//! Questo modulo gestisce le operazioni sui file di input e di output.
//!
//! ## Responsabilità:
//! - Calcolo del path di output: `<stem><suffix><ext>` accanto all'originale
//! - Utilità per calcoli di riduzione dimensione
//!
//! ## Esempio:
//! ```rust,ignore
//! let output = FileManager::output_path(Path::new("clips/a.mov"), "-ffmpeg-q28");
//! assert_eq!(output, PathBuf::from("clips/a-ffmpeg-q28.mov"));
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Manages file operations for the batch
pub struct FileManager;

impl FileManager {
    /// Output path for a transcoded file: the suffix goes between stem and extension
    pub fn output_path(input_path: &Path, suffix: &str) -> PathBuf {
        let mut file_name = OsString::new();
        file_name.push(input_path.file_stem().unwrap_or_default());
        file_name.push(suffix);
        if let Some(ext) = input_path.extension() {
            file_name.push(".");
            file_name.push(ext);
        }
        input_path.with_file_name(file_name)
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
