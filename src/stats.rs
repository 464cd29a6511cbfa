// src/stats.rs
//! Frame timing statistics, dumped to the log at shutdown.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Summary {
    pub samples: usize,
    pub average_ms: f32,
    pub max_ms: f32,
    pub std_dev_ms: f32,
}

/// Every sample of one timing, in milliseconds.
#[derive(Debug, Clone, Default)]
pub struct TimingSeries {
    samples: Vec<f32>,
}

impl TimingSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, ms: f32) {
        self.samples.push(ms);
    }

    pub fn record_duration(&mut self, elapsed: Duration) {
        self.record(elapsed.as_secs_f32() * 1000.0);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<f32> {
        self.samples.last().copied()
    }

    /// Standard deviation is the sample deviation (n - 1), zero below two samples.
    pub fn summary(&self) -> Summary {
        if self.samples.is_empty() {
            return Summary::default();
        }
        let n = self.samples.len() as f32;
        let average = self.samples.iter().sum::<f32>() / n;
        let max = self.samples.iter().copied().fold(f32::MIN, f32::max);
        let variance = if self.samples.len() < 2 {
            0.0
        } else {
            self.samples
                .iter()
                .map(|s| (s - average) * (s - average))
                .sum::<f32>()
                / (n - 1.0)
        };
        Summary {
            samples: self.samples.len(),
            average_ms: average,
            max_ms: max,
            std_dev_ms: variance.sqrt(),
        }
    }
}

/// The three timings the scene records every frame.
#[derive(Debug, Clone, Default)]
pub struct FrameStats {
    /// Whole frame, start to start.
    pub frame: TimingSeries,
    /// Player update, draw submission and the physics wait.
    pub render_and_physics: TimingSeries,
    /// Present and event handling.
    pub events_and_swap: TimingSeries,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> usize {
        self.frame.len()
    }

    pub fn dump(&self) {
        for (name, series) in [
            ("frame", &self.frame),
            ("render + physics", &self.render_and_physics),
            ("events + swap", &self.events_and_swap),
        ] {
            let s = series.summary();
            log::info!(
                "{name:<16} avg {:8.3} ms  max {:8.3} ms  std dev {:8.3} ms  ({} samples)",
                s.average_ms,
                s.max_ms,
                s.std_dev_ms,
                s.samples
            );
        }
    }
}

/// Start-to-start frame clock.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    last: Instant,
}

impl FrameClock {
    pub fn new() -> Self {
        Self { last: Instant::now() }
    }

    /// Milliseconds since the previous tick (or construction).
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let ms = now.duration_since(self.last).as_secs_f32() * 1000.0;
        self.last = now;
        ms
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
