//! Span accumulation state and the immutable cut product.

use std::time::{Duration, Instant};

/// Why a span was cut from the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutReason {
    /// Span reached the target duration.
    Duration,
    /// Enough audio accumulated and the speaker paused.
    Silence,
    /// Safety valve: the span outlived the hard ceiling.
    HardCeiling,
    /// Forced cut during drain.
    Flush,
}

impl CutReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CutReason::Duration => "duration",
            CutReason::Silence => "silence",
            CutReason::HardCeiling => "hard_ceiling",
            CutReason::Flush => "flush",
        }
    }
}

/// A cut span, ready for recognition. Immutable once produced.
#[derive(Debug, Clone)]
pub struct ReadySpan {
    /// Monotonic per-pipeline cut counter, assigned in cut order.
    pub sequence_id: u64,
    /// Normalized f32 samples.
    pub samples: Vec<f32>,
    /// Audio duration derived from the sample count, not wall time.
    pub duration: Duration,
    /// Highest absolute sample amplitude observed while accumulating.
    pub peak_amplitude: f32,
    /// True when the peak never exceeded the silence threshold.
    pub silent: bool,
    pub reason: CutReason,
    /// True for spans produced by `flush()`; these bypass the silent-drop
    /// policy so drain never discards trailing speech.
    pub forced: bool,
}

/// Mutable accumulation state between cuts.
#[derive(Debug)]
pub(crate) struct SampleSpan {
    pub samples: Vec<f32>,
    pub peak_amplitude: f32,
    /// Instant of the most recent chunk whose peak crossed the silence
    /// threshold. Starts at span creation so an all-silent stream still
    /// measures trailing silence from a defined point.
    pub last_voice_activity: Instant,
}

impl SampleSpan {
    pub fn new(now: Instant) -> Self {
        Self {
            samples: Vec::new(),
            peak_amplitude: 0.0,
            last_voice_activity: now,
        }
    }

    /// Appends a chunk, tracking its peak. Returns the chunk's own peak so
    /// the caller can decide whether it refreshed voice activity.
    pub fn append(&mut self, chunk: &[f32]) -> f32 {
        let chunk_peak = chunk.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        self.peak_amplitude = self.peak_amplitude.max(chunk_peak);
        self.samples.extend_from_slice(chunk);
        chunk_peak
    }

    /// Drops the oldest samples down to `max_samples`. Returns how many
    /// were evicted.
    pub fn evict_to(&mut self, max_samples: usize) -> usize {
        if self.samples.len() <= max_samples {
            return 0;
        }
        let excess = self.samples.len() - max_samples;
        self.samples.drain(..excess);
        excess
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
