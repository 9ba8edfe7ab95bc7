//! The intake loop: wire frames in, queued spans out.
//!
//! Runs on its own thread in strict arrival order. Chunk rejection and
//! queue drops are local events; only EOF, a framing error, or an external
//! drain request end the loop. Ending the loop flushes the segmentation
//! buffer and drops the producer side of the queue, which is how the
//! invoker learns that no more work is coming.

use std::sync::Arc;
use std::time::Instant;

use crate::clock::Clock;
use crate::defaults::QUEUE_FULL_LOG_INTERVAL;
use crate::emit::EmitterHandle;
use crate::error::VoxpipeError;
use crate::pipeline::state::{PipelineState, SharedState};
use crate::queue::SpanProducer;
use crate::segment::{ReadySpan, SegmentationBuffer};
use crate::stats::PipelineStats;
use crate::wire::{ByteSource, ChunkValidator, FrameEvent, FrameReader, decode_samples};

pub struct IntakeLoop<S: ByteSource, C: Clock> {
    reader: FrameReader<S>,
    validator: ChunkValidator,
    buffer: SegmentationBuffer<C>,
    producer: SpanProducer,
    emitter: EmitterHandle,
    stats: Arc<PipelineStats>,
    state: SharedState,
    /// Counter values already folded into `stats`.
    seen_silent_dropped: u64,
    seen_evicted: u64,
    last_queue_full_log: Option<Instant>,
}

impl<S: ByteSource, C: Clock> IntakeLoop<S, C> {
    pub fn new(
        reader: FrameReader<S>,
        validator: ChunkValidator,
        buffer: SegmentationBuffer<C>,
        producer: SpanProducer,
        emitter: EmitterHandle,
        stats: Arc<PipelineStats>,
        state: SharedState,
    ) -> Self {
        Self {
            reader,
            validator,
            buffer,
            producer,
            emitter,
            stats,
            state,
            seen_silent_dropped: 0,
            seen_evicted: 0,
            last_queue_full_log: None,
        }
    }

    /// Runs until the stream or the pipeline ends, then drains the buffer.
    /// Consumes self so the producer is dropped on return.
    pub fn run(mut self) {
        loop {
            if self.state.get() >= PipelineState::Draining {
                break;
            }
            match self.reader.next_frame() {
                Ok(FrameEvent::Chunk(chunk)) => self.handle_chunk(chunk),
                Ok(FrameEvent::Idle) => continue,
                Ok(FrameEvent::Eof) => break,
                Err(e) => {
                    // Framing errors are not resynchronizable; report and
                    // treat the stream as ended.
                    self.emitter.error(e.to_string());
                    break;
                }
            }
        }

        self.state.advance_to(PipelineState::Draining);
        if let Some(span) = self.buffer.flush() {
            PipelineStats::incr(&self.stats.spans_cut);
            self.enqueue(span);
        }
        self.sync_buffer_counters();
    }

    fn handle_chunk(&mut self, chunk: crate::wire::AudioChunk) {
        if let Err(e) = self.validator.validate(&chunk) {
            PipelineStats::incr(&self.stats.chunks_rejected);
            self.emitter.error(e.to_string());
            return;
        }
        PipelineStats::incr(&self.stats.chunks_read);

        let samples = decode_samples(&chunk.payload);
        if let Some(span) = self.buffer.push_chunk(&samples) {
            PipelineStats::incr(&self.stats.spans_cut);
            self.enqueue(span);
        }
        self.sync_buffer_counters();
    }

    fn enqueue(&mut self, span: ReadySpan) {
        match self.producer.push(span) {
            Ok(()) => {}
            Err(e @ VoxpipeError::QueueFull { .. }) => {
                PipelineStats::incr(&self.stats.spans_queue_dropped);
                // One error event per drop; the stderr diagnostic alone is
                // rate-limited to keep a stalled engine from flooding logs.
                self.emitter.error(e.to_string());
                let now = Instant::now();
                let due = self
                    .last_queue_full_log
                    .is_none_or(|last| now.duration_since(last) >= QUEUE_FULL_LOG_INTERVAL);
                if due {
                    eprintln!("voxpipe: {e}");
                    self.last_queue_full_log = Some(now);
                }
            }
            Err(e) => {
                // Consumer gone mid-stream; nothing downstream can report.
                eprintln!("voxpipe: {e}");
            }
        }
    }

    /// Folds the buffer-owned counters into the shared stats.
    fn sync_buffer_counters(&mut self) {
        let silent = self.buffer.silent_dropped();
        if silent > self.seen_silent_dropped {
            let delta = silent - self.seen_silent_dropped;
            PipelineStats::add(&self.stats.spans_cut, delta);
            PipelineStats::add(&self.stats.spans_silent_dropped, delta);
            self.seen_silent_dropped = silent;
        }
        let evicted = self.buffer.evicted_samples();
        if evicted > self.seen_evicted {
            PipelineStats::add(&self.stats.samples_evicted, evicted - self.seen_evicted);
            self.seen_evicted = evicted;
        }
    }
}
