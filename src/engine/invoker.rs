//! The recognition consumer loop.
//!
//! A single thread pops spans in cut order and runs them through the
//! engine one at a time. Single consumption is what makes final results
//! leave in sequence order without any reordering buffer downstream.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::defaults::POLL_INTERVAL;
use crate::emit::EmitterHandle;
use crate::engine::recognizer::Recognizer;
use crate::error::VoxpipeError;
use crate::queue::{PopOutcome, SpanConsumer};
use crate::segment::ReadySpan;
use crate::stats::PipelineStats;

pub struct RecognitionInvoker<R: Recognizer> {
    recognizer: R,
    consumer: SpanConsumer,
    emitter: EmitterHandle,
    stats: Arc<PipelineStats>,
    /// Set when the drain deadline passes; queued spans are discarded.
    abandon: Arc<AtomicBool>,
    sample_rate: u32,
}

impl<R: Recognizer> RecognitionInvoker<R> {
    pub fn new(
        recognizer: R,
        consumer: SpanConsumer,
        emitter: EmitterHandle,
        stats: Arc<PipelineStats>,
        abandon: Arc<AtomicBool>,
        sample_rate: u32,
    ) -> Self {
        Self {
            recognizer,
            consumer,
            emitter,
            stats,
            abandon,
            sample_rate,
        }
    }

    /// Runs until the producer side disconnects and the queue is empty, or
    /// the abandon flag is raised.
    pub fn run(self) {
        loop {
            if self.abandon.load(Ordering::Acquire) {
                break;
            }
            match self.consumer.pop(POLL_INTERVAL) {
                PopOutcome::Span(span) => self.process(span),
                PopOutcome::TimedOut => continue,
                PopOutcome::Disconnected => break,
            }
        }
    }

    /// One span, one engine call. An engine failure costs exactly this
    /// span: one error event, then the loop moves on.
    fn process(&self, span: ReadySpan) {
        match self.recognizer.recognize(&span.samples, self.sample_rate) {
            Ok(segments) => {
                PipelineStats::incr(&self.stats.spans_recognized);
                for segment in segments {
                    if segment.text.is_empty() {
                        continue;
                    }
                    if segment.provisional {
                        self.emitter.partial(segment.text);
                    } else {
                        self.emitter.final_result(
                            span.sequence_id,
                            segment.text,
                            segment.confidence,
                            segment.start,
                            segment.end,
                        );
                    }
                }
            }
            Err(e) => {
                PipelineStats::incr(&self.stats.recognition_errors);
                let err = VoxpipeError::Processing {
                    sequence_id: span.sequence_id,
                    message: e.to_string(),
                };
                self.emitter.error(err.to_string());
            }
        }
    }
}
