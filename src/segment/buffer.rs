//! Segmentation: deciding where one recognition span ends and the next
//! begins.
//!
//! Cut evaluation happens after every appended chunk, never on a timer, so
//! an idle stream holds its partial span indefinitely until flushed. Three
//! triggers can cut, checked in this order:
//!
//! 1. span duration reached `chunk_duration`;
//! 2. span duration reached `min_audio_length` and the trailing silence
//!    reached `silence_duration`;
//! 3. span duration reached `hard_ceiling` (safety valve for a
//!    misconfigured silence threshold).

use std::time::Duration;

use crate::clock::Clock;
use crate::segment::span::{CutReason, ReadySpan, SampleSpan};

/// Tunable segmentation thresholds. Validated at config load time.
#[derive(Debug, Clone, Copy)]
pub struct SegmentPolicy {
    pub sample_rate: u32,
    pub chunk_duration: Duration,
    pub min_audio_length: Duration,
    pub silence_duration: Duration,
    /// Normalized peak threshold below which a chunk counts as silent.
    pub silence_threshold: f32,
    pub hard_ceiling: Duration,
    /// Sliding-window cap on buffered samples.
    pub max_span: Duration,
    /// Discard non-forced spans whose peak never crossed the threshold.
    pub drop_silent_spans: bool,
}

impl SegmentPolicy {
    fn max_span_samples(&self) -> usize {
        (self.max_span.as_secs_f64() * f64::from(self.sample_rate)) as usize
    }
}

impl Default for SegmentPolicy {
    fn default() -> Self {
        use crate::defaults;
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            chunk_duration: Duration::from_secs_f32(defaults::CHUNK_DURATION_SECS),
            min_audio_length: Duration::from_secs_f32(defaults::MIN_AUDIO_LENGTH_SECS),
            silence_duration: Duration::from_secs_f32(defaults::SILENCE_DURATION_SECS),
            silence_threshold: defaults::SILENCE_THRESHOLD,
            hard_ceiling: Duration::from_secs_f32(defaults::HARD_CEILING_SECS),
            max_span: Duration::from_secs_f32(defaults::MAX_SPAN_SECS),
            drop_silent_spans: true,
        }
    }
}

/// Accumulates decoded chunks and cuts [`ReadySpan`]s per the policy.
pub struct SegmentationBuffer<C: Clock> {
    policy: SegmentPolicy,
    clock: C,
    span: SampleSpan,
    next_sequence_id: u64,
    evicted_samples: u64,
    silent_dropped: u64,
}

impl<C: Clock> SegmentationBuffer<C> {
    pub fn new(policy: SegmentPolicy, clock: C) -> Self {
        let now = clock.now();
        Self {
            policy,
            clock,
            span: SampleSpan::new(now),
            next_sequence_id: 0,
            evicted_samples: 0,
            silent_dropped: 0,
        }
    }

    /// Appends one validated chunk and evaluates the cut triggers.
    ///
    /// Returns a span when a trigger fired and the span survived the
    /// silent-drop policy.
    pub fn push_chunk(&mut self, samples: &[f32]) -> Option<ReadySpan> {
        let now = self.clock.now();
        let chunk_peak = self.span.append(samples);
        if chunk_peak > self.policy.silence_threshold {
            self.span.last_voice_activity = now;
        }

        let evicted = self.span.evict_to(self.policy.max_span_samples());
        self.evicted_samples += evicted as u64;

        // Thresholds are configured in float seconds. Compare in float
        // seconds too: nanosecond Durations built from values like 1.2
        // land just above the intended boundary and would turn the
        // inclusive >= into a strict >.
        let duration_secs = self.span_duration().as_secs_f32();
        let trailing_silence_secs = now
            .duration_since(self.span.last_voice_activity)
            .as_secs_f32();
        let reason = if duration_secs >= self.policy.chunk_duration.as_secs_f32() {
            CutReason::Duration
        } else if duration_secs >= self.policy.min_audio_length.as_secs_f32()
            && trailing_silence_secs >= self.policy.silence_duration.as_secs_f32()
        {
            CutReason::Silence
        } else if duration_secs >= self.policy.hard_ceiling.as_secs_f32() {
            CutReason::HardCeiling
        } else {
            return None;
        };

        self.cut(reason, false)
    }

    /// Force-cuts whatever is buffered. Used when draining; the resulting
    /// span is marked forced and is never dropped as silent.
    pub fn flush(&mut self) -> Option<ReadySpan> {
        if self.span.is_empty() {
            return None;
        }
        self.cut(CutReason::Flush, true)
    }

    /// Total samples evicted by the sliding-window cap so far.
    pub fn evicted_samples(&self) -> u64 {
        self.evicted_samples
    }

    /// Total silent spans discarded by policy so far.
    pub fn silent_dropped(&self) -> u64 {
        self.silent_dropped
    }

    fn span_duration(&self) -> Duration {
        Duration::from_secs_f64(self.span.len() as f64 / f64::from(self.policy.sample_rate))
    }

    fn cut(&mut self, reason: CutReason, forced: bool) -> Option<ReadySpan> {
        let now = self.clock.now();
        let duration = self.span_duration();
        let finished = std::mem::replace(&mut self.span, SampleSpan::new(now));
        let silent = finished.peak_amplitude <= self.policy.silence_threshold;

        if silent && self.policy.drop_silent_spans && !forced {
            self.silent_dropped += 1;
            return None;
        }

        let sequence_id = self.next_sequence_id;
        self.next_sequence_id += 1;
        Some(ReadySpan {
            sequence_id,
            samples: finished.samples,
            duration,
            peak_amplitude: finished.peak_amplitude,
            silent,
            reason,
            forced,
        })
    }
}
