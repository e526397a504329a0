//! Progress reporting seam.
//!
//! The transfer engine only ever pushes byte counts and completion
//! events into a [`ProgressSink`]; it never reads from it. This keeps
//! the core testable with [`NullProgress`] while binaries can attach
//! the terminal renderer.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::Mutex;

/// One live progress row (a single file, or a batch counter).
pub trait ProgressRow: Send + Sync {
    /// Set the absolute position, used when a resumed transfer starts
    /// from a byte offset.
    fn set_position(&self, pos: u64);
    /// Advance by a number of bytes (or completed items).
    fn advance(&self, n: u64);
    /// Mark the row complete.
    fn finish(&self);
}

/// Sink that hands out progress rows. Row construction is serialized;
/// rows themselves are independently usable from worker tasks.
pub trait ProgressSink: Send + Sync {
    fn add_row(&self, label: &str, total: u64) -> Box<dyn ProgressRow>;
}

/// No-op sink for tests and embedding.
#[derive(Debug, Default)]
pub struct NullProgress;

struct NullRow;

impl ProgressRow for NullRow {
    fn set_position(&self, _pos: u64) {}
    fn advance(&self, _n: u64) {}
    fn finish(&self) {}
}

impl ProgressSink for NullProgress {
    fn add_row(&self, _label: &str, _total: u64) -> Box<dyn ProgressRow> {
        Box::new(NullRow)
    }
}

/// Terminal renderer backed by indicatif.
pub struct TermProgress {
    multi: Mutex<MultiProgress>,
}

impl TermProgress {
    pub fn new() -> Self {
        Self {
            multi: Mutex::new(MultiProgress::new()),
        }
    }
}

impl Default for TermProgress {
    fn default() -> Self {
        Self::new()
    }
}

struct TermRow {
    bar: ProgressBar,
}

impl ProgressRow for TermRow {
    fn set_position(&self, pos: u64) {
        self.bar.set_position(pos);
    }

    fn advance(&self, n: u64) {
        self.bar.inc(n);
    }

    fn finish(&self) {
        self.bar.finish();
    }
}

impl ProgressSink for TermProgress {
    fn add_row(&self, label: &str, total: u64) -> Box<dyn ProgressRow> {
        let multi = self.multi.lock().unwrap();
        let bar = multi.add(ProgressBar::new(total));
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{msg:40!} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.set_message(label.to_string());
        Box::new(TermRow { bar })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_progress_rows_are_inert() {
        let sink = NullProgress;
        let row = sink.add_row("file.bin", 100);
        row.set_position(10);
        row.advance(50);
        row.finish();
    }

    #[test]
    fn test_term_progress_hands_out_rows() {
        let sink = TermProgress::new();
        let row = sink.add_row("file.bin", 4);
        row.advance(4);
        row.finish();
    }
}
