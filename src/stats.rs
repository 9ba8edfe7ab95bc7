//! Pipeline counters.
//!
//! One shared aggregate of atomic counters instead of per-component
//! globals. Components increment through an `Arc`; the lifecycle
//! controller takes a snapshot once at shutdown and reports it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the pipeline components.
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Chunks framed off the input stream and accepted by the validator.
    pub chunks_read: AtomicU64,
    /// Chunks rejected by the validator.
    pub chunks_rejected: AtomicU64,
    /// Spans cut by the segmentation buffer (including forced flushes).
    pub spans_cut: AtomicU64,
    /// Silent spans discarded before queueing.
    pub spans_silent_dropped: AtomicU64,
    /// Spans dropped because the work queue was full.
    pub spans_queue_dropped: AtomicU64,
    /// Samples evicted by the span overflow guard.
    pub samples_evicted: AtomicU64,
    /// Spans the invoker completed a recognition call for.
    pub spans_recognized: AtomicU64,
    /// Recognition calls that failed.
    pub recognition_errors: AtomicU64,
    /// Partial result events written.
    pub partials_emitted: AtomicU64,
    /// Final result events written.
    pub finals_emitted: AtomicU64,
    /// Final results dropped for arriving out of sequence order.
    pub finals_out_of_order: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter by one.
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Add to a counter.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Read a consistent-enough copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            chunks_read: self.chunks_read.load(Ordering::Relaxed),
            chunks_rejected: self.chunks_rejected.load(Ordering::Relaxed),
            spans_cut: self.spans_cut.load(Ordering::Relaxed),
            spans_silent_dropped: self.spans_silent_dropped.load(Ordering::Relaxed),
            spans_queue_dropped: self.spans_queue_dropped.load(Ordering::Relaxed),
            samples_evicted: self.samples_evicted.load(Ordering::Relaxed),
            spans_recognized: self.spans_recognized.load(Ordering::Relaxed),
            recognition_errors: self.recognition_errors.load(Ordering::Relaxed),
            partials_emitted: self.partials_emitted.load(Ordering::Relaxed),
            finals_emitted: self.finals_emitted.load(Ordering::Relaxed),
            finals_out_of_order: self.finals_out_of_order.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the pipeline counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub chunks_read: u64,
    pub chunks_rejected: u64,
    pub spans_cut: u64,
    pub spans_silent_dropped: u64,
    pub spans_queue_dropped: u64,
    pub samples_evicted: u64,
    pub spans_recognized: u64,
    pub recognition_errors: u64,
    pub partials_emitted: u64,
    pub finals_emitted: u64,
    pub finals_out_of_order: u64,
}

impl StatsSnapshot {
    /// Spans that were admitted to the queue but never recognized
    /// (abandoned during drain).
    pub fn spans_abandoned(&self) -> u64 {
        let admitted = self
            .spans_cut
            .saturating_sub(self.spans_silent_dropped)
            .saturating_sub(self.spans_queue_dropped);
        admitted
            .saturating_sub(self.spans_recognized)
            .saturating_sub(self.recognition_errors)
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chunks: {} read, {} rejected | spans: {} cut, {} silent, {} queue-dropped, {} recognized, {} failed | events: {} partial, {} final",
            self.chunks_read,
            self.chunks_rejected,
            self.spans_cut,
            self.spans_silent_dropped,
            self.spans_queue_dropped,
            self.spans_recognized,
            self.recognition_errors,
            self.partials_emitted,
            self.finals_emitted,
        )?;
        if self.samples_evicted > 0 {
            write!(f, " | {} samples evicted", self.samples_evicted)?;
        }
        if self.finals_out_of_order > 0 {
            write!(f, " | {} finals out of order", self.finals_out_of_order)?;
        }
        Ok(())
    }
}
