//! # Progress Board Module
//!
//! Questo modulo gestisce il display multi-riga dei progressi dei transcode
//! in corso, condiviso da tutti i worker concorrenti.
//!
//! ## Responsabilità:
//! - Una barra `indicatif` per ogni file in lavorazione, una riga ciascuna
//! - Assegnazione delle righe: un nuovo indicatore prende la prima riga libera
//!   in fondo, quando uno termina le righe sotto risalgono di una posizione
//! - Riga "completata" stampata sopra l'area live quando un file finisce
//! - Barra complessiva opzionale (file completati su totale)
//! - Scrittura dei log senza corrompere le barre (`BoardLogWriter`)
//!
//! ## Concorrenza:
//! Tutte le mutazioni passano da un unico lock; il rendering avviene solo
//! mentre il lock è tenuto. Le operazioni su chiavi sconosciute sono no-op.
//!
//! ## Visual feedback:
//! ```text
//! clips/a.mov: 100%|██████████████████████████████| 250/250 frames [4.0s, 62.5 frames/s]
//! clips/b.mov:  42%|████████████▋                 | 105/250 frames [00:00:02<00:00:03, 52/s]
//! clips/c.mkv:  10%|███                           | 1.2 MiB/12.0 MiB [00:00:01<00:00:09, 1.1 MiB/s]
//! Overall [██████████                    ] 1/3 files [00:00:04]
//! ```

use crate::error::BoardError;
use crate::units::{format_data_rate, format_data_volume, format_time};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::fmt::MakeWriter;

const BYTES_TEMPLATE: &str =
    "{prefix}: {percent:>3}%|{wide_bar}| {bytes}/{total_bytes} [{elapsed_precise}<{eta_precise}, {binary_bytes_per_sec}]";
const FRAMES_TEMPLATE: &str =
    "{prefix}: {percent:>3}%|{wide_bar}| {pos}/{len} frames [{elapsed_precise}<{eta_precise}, {per_sec}]";
const OVERALL_TEMPLATE: &str = "{prefix} [{bar:30.cyan/blue}] {pos}/{len} files [{elapsed_precise}]";

/// What an indicator counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressUnit {
    Frames,
    Bytes,
}

impl ProgressUnit {
    fn style(&self) -> ProgressStyle {
        let template = match self {
            Self::Frames => FRAMES_TEMPLATE,
            Self::Bytes => BYTES_TEMPLATE,
        };
        ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏ ")
    }

    /// Closed form of an indicator: totals, elapsed time and average rate
    fn done_line(&self, label: &str, total: u64, elapsed: Duration) -> String {
        let seconds = elapsed.as_secs_f64();
        let rate = if seconds > 0.0 { total as f64 / seconds } else { 0.0 };
        match self {
            Self::Frames => format!(
                "{label}: {total}/{total} frames [{}, {:.1} frames/s]",
                format_time(seconds),
                rate
            ),
            Self::Bytes => {
                let volume = format_data_volume(total);
                format!("{label}: {volume}/{volume} [{}, {}]", format_time(seconds), format_data_rate(rate))
            }
        }
    }

    /// Closed form of an indicator whose job failed, at the position it reached
    fn failed_line(&self, label: &str, current: u64, total: u64, elapsed: Duration) -> String {
        let progress = match self {
            Self::Frames => format!("{current}/{total} frames"),
            Self::Bytes => format!("{}/{}", format_data_volume(current), format_data_volume(total)),
        };
        format!("{label}: failed at {progress} [{}]", format_time(elapsed.as_secs_f64()))
    }
}

/// Logical view of one live indicator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorSnapshot {
    pub label: String,
    pub total: u64,
    pub current: u64,
    /// Row among live indicators, 0 is the top
    pub position: usize,
    pub unit: ProgressUnit,
}

struct Indicator {
    label: String,
    total: u64,
    current: u64,
    position: usize,
    unit: ProgressUnit,
    started: Instant,
    bar: ProgressBar,
}

struct BoardState {
    live: HashMap<PathBuf, Indicator>,
    overall: Option<ProgressBar>,
}

/// Multi-row progress display shared by concurrent transcodes
pub struct ProgressBoard {
    multi: MultiProgress,
    state: Mutex<BoardState>,
}

impl ProgressBoard {
    /// Board drawing through `multi`, with an overall bar when `total_files` is given
    pub fn new(multi: MultiProgress, total_files: Option<u64>) -> Self {
        let overall = total_files.map(|total| {
            let bar = multi.add(ProgressBar::new(total));
            bar.set_style(
                ProgressStyle::with_template(OVERALL_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
            );
            bar.set_prefix("Overall");
            bar.enable_steady_tick(Duration::from_millis(250));
            bar
        });

        Self {
            multi,
            state: Mutex::new(BoardState {
                live: HashMap::new(),
                overall,
            }),
        }
    }

    /// Board that tracks state without drawing anything
    pub fn hidden(total_files: Option<u64>) -> Self {
        Self::new(MultiProgress::with_draw_target(ProgressDrawTarget::hidden()), total_files)
    }

    /// Open an indicator for `key` on the first free row, returning that row
    pub fn open(&self, key: &Path, label: &str, total: u64, unit: ProgressUnit) -> Result<usize, BoardError> {
        let mut state = self.state.lock();
        if state.live.contains_key(key) {
            return Err(BoardError::AlreadyOpen(key.display().to_string()));
        }

        let position = state.live.len();
        let bar = ProgressBar::new(total).with_style(unit.style()).with_prefix(label.to_string());
        let bar = match &state.overall {
            Some(overall) => self.multi.insert_before(overall, bar),
            None => self.multi.add(bar),
        };

        state.live.insert(
            key.to_path_buf(),
            Indicator {
                label: label.to_string(),
                total,
                current: 0,
                position,
                unit,
                started: Instant::now(),
                bar,
            },
        );
        Ok(position)
    }

    /// Advance `key` by `delta`, never past its total
    pub fn advance(&self, key: &Path, delta: u64) {
        let mut state = self.state.lock();
        if let Some(indicator) = state.live.get_mut(key) {
            indicator.current = indicator.current.saturating_add(delta).min(indicator.total);
            indicator.bar.set_position(indicator.current);
        }
    }

    /// Close `key`: force it to 100%, print its done line and free its row.
    ///
    /// Returns false when `key` was not live.
    pub fn complete(&self, key: &Path) -> bool {
        self.close(key, true)
    }

    /// Close `key` without filling it, printing a failed line where it stopped
    pub fn fail(&self, key: &Path) -> bool {
        self.close(key, false)
    }

    fn close(&self, key: &Path, finished: bool) -> bool {
        let mut state = self.state.lock();
        let Some(indicator) = state.live.remove(key) else {
            return false;
        };

        for other in state.live.values_mut() {
            if other.position > indicator.position {
                other.position -= 1;
            }
        }

        let elapsed = indicator.started.elapsed();
        let line = if finished {
            indicator.bar.set_position(indicator.total);
            indicator.unit.done_line(&indicator.label, indicator.total, elapsed)
        } else {
            indicator
                .unit
                .failed_line(&indicator.label, indicator.current, indicator.total, elapsed)
        };
        indicator.bar.finish_and_clear();
        self.multi.remove(&indicator.bar);
        let _ = self.multi.println(line);

        if let Some(overall) = &state.overall {
            overall.inc(1);
        }
        true
    }

    /// Close every live indicator top to bottom, then the overall bar
    pub fn close_all(&self) {
        let mut keys: Vec<(usize, PathBuf)> = {
            let state = self.state.lock();
            state
                .live
                .iter()
                .map(|(key, indicator)| (indicator.position, key.clone()))
                .collect()
        };
        keys.sort();

        for (_, key) in keys {
            self.complete(&key);
        }

        let state = self.state.lock();
        if let Some(overall) = &state.overall {
            overall.finish();
        }
    }

    /// Print a line above the live area
    pub fn println(&self, message: impl AsRef<str>) {
        let _state = self.state.lock();
        let _ = self.multi.println(message);
    }

    /// Logical state of `key`, if live
    pub fn snapshot(&self, key: &Path) -> Option<IndicatorSnapshot> {
        let state = self.state.lock();
        state.live.get(key).map(|indicator| IndicatorSnapshot {
            label: indicator.label.clone(),
            total: indicator.total,
            current: indicator.current,
            position: indicator.position,
            unit: indicator.unit,
        })
    }

    /// Number of live indicators
    pub fn live_count(&self) -> usize {
        self.state.lock().live.len()
    }
}

/// Log sink that suspends the progress bars while a record is written to stderr
#[derive(Clone)]
pub struct BoardLogWriter {
    multi: MultiProgress,
}

impl BoardLogWriter {
    pub fn new(multi: MultiProgress) -> Self {
        Self { multi }
    }
}

impl Write for BoardLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.multi.suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

impl<'a> MakeWriter<'a> for BoardLogWriter {
    type Writer = BoardLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(name: &str) -> PathBuf {
        PathBuf::from(name)
    }

    #[test]
    fn test_rows_are_assigned_in_order() {
        let board = ProgressBoard::hidden(None);
        assert_eq!(board.open(&key("a.mp4"), "a.mp4", 100, ProgressUnit::Frames), Ok(0));
        assert_eq!(board.open(&key("b.mp4"), "b.mp4", 100, ProgressUnit::Frames), Ok(1));
        assert_eq!(board.open(&key("c.mp4"), "c.mp4", 100, ProgressUnit::Bytes), Ok(2));
        assert_eq!(board.live_count(), 3);
    }

    #[test]
    fn test_duplicate_open_is_rejected() {
        let board = ProgressBoard::hidden(None);
        board.open(&key("a.mp4"), "a.mp4", 10, ProgressUnit::Frames).unwrap();
        assert_eq!(
            board.open(&key("a.mp4"), "a.mp4", 10, ProgressUnit::Frames),
            Err(BoardError::AlreadyOpen("a.mp4".to_string()))
        );
        assert_eq!(board.live_count(), 1);
    }

    #[test]
    fn test_advance_clamps_to_total() {
        let board = ProgressBoard::hidden(None);
        board.open(&key("a.mp4"), "a.mp4", 50, ProgressUnit::Bytes).unwrap();
        board.advance(&key("a.mp4"), 20);
        assert_eq!(board.snapshot(&key("a.mp4")).unwrap().current, 20);
        board.advance(&key("a.mp4"), 100);
        assert_eq!(board.snapshot(&key("a.mp4")).unwrap().current, 50);
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let board = ProgressBoard::hidden(None);
        board.advance(&key("ghost.mp4"), 5);
        assert!(!board.complete(&key("ghost.mp4")));
        assert!(board.snapshot(&key("ghost.mp4")).is_none());
    }

    #[test]
    fn test_complete_shifts_rows_below_up() {
        let board = ProgressBoard::hidden(Some(3));
        for name in ["a.mp4", "b.mp4", "c.mp4"] {
            board.open(&key(name), name, 10, ProgressUnit::Frames).unwrap();
        }

        assert!(board.complete(&key("b.mp4")));
        assert_eq!(board.snapshot(&key("a.mp4")).unwrap().position, 0);
        assert_eq!(board.snapshot(&key("c.mp4")).unwrap().position, 1);
        assert!(board.snapshot(&key("b.mp4")).is_none());

        // A reopened key takes the next free row
        assert_eq!(board.open(&key("b.mp4"), "b.mp4", 10, ProgressUnit::Frames), Ok(2));
    }

    #[test]
    fn test_close_all_empties_the_board() {
        let board = ProgressBoard::hidden(Some(2));
        board.open(&key("a.mp4"), "a.mp4", 10, ProgressUnit::Frames).unwrap();
        board.open(&key("b.mp4"), "b.mp4", 10, ProgressUnit::Frames).unwrap();
        board.close_all();
        assert_eq!(board.live_count(), 0);
        board.close_all();
    }

    #[test]
    fn test_concurrent_updates_keep_rows_unique() {
        let board = Arc::new(ProgressBoard::hidden(None));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let board = board.clone();
                std::thread::spawn(move || {
                    let k = PathBuf::from(format!("clip{i}.mp4"));
                    board.open(&k, "clip", 100, ProgressUnit::Frames).unwrap();
                    for _ in 0..10 {
                        board.advance(&k, 10);
                    }
                    if i % 2 == 0 {
                        board.complete(&k);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(board.live_count(), 4);
        let mut positions: Vec<usize> = (0..8)
            .filter_map(|i| board.snapshot(&PathBuf::from(format!("clip{i}.mp4"))))
            .map(|s| {
                assert_eq!(s.current, 100);
                s.position
            })
            .collect();
        positions.sort();
        assert_eq!(positions, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_fail_frees_the_row_without_filling_it() {
        let board = ProgressBoard::hidden(Some(2));
        board.open(&key("a.mp4"), "a.mp4", 100, ProgressUnit::Frames).unwrap();
        board.open(&key("b.mp4"), "b.mp4", 100, ProgressUnit::Frames).unwrap();
        board.advance(&key("a.mp4"), 40);

        assert!(board.fail(&key("a.mp4")));
        assert!(!board.fail(&key("a.mp4")));
        assert_eq!(board.live_count(), 1);
        assert_eq!(board.snapshot(&key("b.mp4")).unwrap().position, 0);
    }

    #[test]
    fn test_failed_line_shows_where_the_job_stopped() {
        let line = ProgressUnit::Frames.failed_line("a.mp4", 40, 100, Duration::from_secs(3));
        assert_eq!(line, "a.mp4: failed at 40/100 frames [3.0s]");
        let line = ProgressUnit::Bytes.failed_line("b.mp4", 1024, 4096, Duration::from_secs(1));
        assert_eq!(line, "b.mp4: failed at 1.0KB/4.0KB [1.0s]");
    }

    #[test]
    fn test_done_line() {
        let line = ProgressUnit::Frames.done_line("a.mp4", 250, Duration::from_secs(5));
        assert_eq!(line, "a.mp4: 250/250 frames [5.0s, 50.0 frames/s]");
        let line = ProgressUnit::Bytes.done_line("b.mp4", 2048, Duration::from_secs(2));
        assert_eq!(line, "b.mp4: 2.0KB/2.0KB [2.0s, 1.0KB/s]");
    }
}
