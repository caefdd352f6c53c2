//! # Path Display Module
//!
//! Shortens file paths so progress bar labels fit the terminal.
//! The file name is always kept; leading directories are kept left to right
//! for as long as they fit, the rest is replaced with an ellipsis.

use std::path::{Component, Path, PathBuf};

/// Width assumed when stderr is not a terminal
pub const TERM_WIDTH_FALLBACK: usize = 80;

/// Share of the terminal width given to a path label
const PATH_DISPLAY_RATIO: f64 = 1.0 / 3.0;

const ELLIPSIS: &str = "...";

/// Current terminal width in columns
pub fn terminal_width() -> usize {
    console::Term::stderr()
        .size_checked()
        .map(|(_rows, cols)| cols as usize)
        .filter(|cols| *cols > 0)
        .unwrap_or(TERM_WIDTH_FALLBACK)
}

/// Column budget for a path label on the current terminal
pub fn label_budget() -> usize {
    (terminal_width() as f64 * PATH_DISPLAY_RATIO).floor() as usize
}

/// Truncate `path` to at most `max_len` characters for display
pub fn truncate_path(path: &Path, max_len: usize) -> String {
    let path_str = path.display().to_string();
    if path_str.chars().count() <= max_len {
        return path_str;
    }

    let basename = match path.file_name() {
        Some(name) => name.to_string_lossy().to_string(),
        None => return truncate_chars(&path_str, max_len),
    };

    let ellipsis_len = ELLIPSIS.len();
    if basename.chars().count() + ellipsis_len > max_len {
        return truncate_chars(&basename, max_len);
    }

    // Keep leading directories while they still fit next to the file name
    let mut available = max_len - ellipsis_len - basename.chars().count();
    let mut kept = PathBuf::new();
    let parent_components = path.parent().map(|p| p.components()).into_iter().flatten();
    for component in parent_components {
        let part = match component {
            Component::RootDir => continue,
            other => other.as_os_str().to_string_lossy().to_string(),
        };
        let cost = part.chars().count() + 1;
        if cost > available {
            break;
        }
        kept.push(part);
        available -= cost;
    }

    format!("{}{}", ELLIPSIS, kept.join(&basename).display())
}

/// Cut a plain string down to `max_len` characters, ending in an ellipsis
fn truncate_chars(s: &str, max_len: usize) -> String {
    let keep = max_len.saturating_sub(ELLIPSIS.len()).max(1);
    let head: String = s.chars().take(keep).collect();
    format!("{}{}", head, ELLIPSIS)
}
