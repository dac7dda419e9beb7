//! Timing helpers for engine calls

use std::time::{Duration, Instant};

/// A simple stopwatch with labelled splits
#[derive(Debug)]
pub struct Stopwatch {
    start: Instant,
    splits: Vec<(String, Duration)>,
}

impl Stopwatch {
    /// Start a new stopwatch
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            splits: Vec::new(),
        }
    }

    /// Record a split time with a label
    pub fn split(&mut self, label: impl Into<String>) {
        self.splits.push((label.into(), self.start.elapsed()));
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Elapsed time in fractional seconds, for log lines
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn splits(&self) -> &[(String, Duration)] {
        &self.splits
    }

    /// Render the splits as `label=1.23s` pairs
    pub fn summary(&self) -> String {
        self.splits
            .iter()
            .map(|(label, at)| format!("{}={:.2}s", label, at.as_secs_f64()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
