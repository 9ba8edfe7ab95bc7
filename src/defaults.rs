//! Default configuration constants for voxpipe.
//!
//! These are tuning defaults, not requirements: every threshold here is
//! overridable through the config file and CLI. Different recognition
//! engines justify different values.

use std::time::Duration;

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and provides a good balance
/// between quality and computational cost.
pub const SAMPLE_RATE: u32 = 16000;

/// Default hard cap on span duration before a cut is forced.
///
/// 2 seconds keeps worst-case result latency bounded while still giving the
/// engine enough context for usable output.
pub const CHUNK_DURATION_SECS: f32 = 2.0;

/// Minimum span duration before a silence-triggered cut is allowed.
///
/// Spans shorter than 800ms rarely contain a complete word and waste a
/// recognition call.
pub const MIN_AUDIO_LENGTH_SECS: f32 = 0.8;

/// Trailing-silence duration that triggers a cut once the minimum span
/// length is reached. Aligns cuts with natural speech pauses.
pub const SILENCE_DURATION_SECS: f32 = 1.2;

/// Peak-amplitude threshold (normalized, 0.0 to 1.0) below which a chunk is
/// considered silent for voice-activity tracking.
pub const SILENCE_THRESHOLD: f32 = 0.01;

/// Safety-valve span duration. A cut fires here regardless of the amplitude
/// logic, so a misconfigured silence threshold cannot grow the span forever.
pub const HARD_CEILING_SECS: f32 = 8.0;

/// Maximum span length in seconds; older samples are evicted past this.
pub const MAX_SPAN_SECS: f32 = 10.0;

/// Default work queue capacity (spans buffered between intake and
/// recognition). Full-queue behavior is drop, not block.
pub const QUEUE_CAPACITY: usize = 30;

/// Minimum accepted chunk payload in bytes (10 samples).
pub const MIN_CHUNK_BYTES: u32 = 20;

/// Maximum accepted chunk payload in bytes (~31s of 16kHz mono).
pub const MAX_CHUNK_BYTES: u32 = 1_000_000;

/// Absolute cap on a declared frame length. A length prefix beyond this is
/// treated as a framing error rather than a rejectable chunk, because the
/// stream cannot be resynchronized past a multi-gigabyte bogus payload.
pub const FRAME_RESYNC_CAP_BYTES: u32 = 16 * 1024 * 1024;

/// Bounded wait used by the intake and processing loops so shutdown is
/// observed within one interval.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Deadline for the drain phase during shutdown. Past this, the in-flight
/// span is abandoned and remaining threads are detached.
pub const DRAIN_DEADLINE: Duration = Duration::from_secs(5);

/// Minimum interval between queue-full diagnostics on stderr. Every drop
/// still produces an error event on stdout.
pub const QUEUE_FULL_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Readiness token written to stdout when the pipeline reaches `Ready`.
pub const READY_TOKEN: &str = "ENGINE_READY";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_bounds_are_sample_aligned() {
        assert_eq!(MIN_CHUNK_BYTES % 2, 0);
        assert_eq!(MAX_CHUNK_BYTES % 2, 0);
        assert!(MIN_CHUNK_BYTES < MAX_CHUNK_BYTES);
        assert!(MAX_CHUNK_BYTES < FRAME_RESYNC_CAP_BYTES);
    }

    #[test]
    fn cut_thresholds_are_ordered() {
        assert!(MIN_AUDIO_LENGTH_SECS < CHUNK_DURATION_SECS);
        assert!(CHUNK_DURATION_SECS < HARD_CEILING_SECS);
        assert!(HARD_CEILING_SECS < MAX_SPAN_SECS);
    }
}
