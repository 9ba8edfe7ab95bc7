//! Bounded work queue between intake and recognition.
//!
//! Backpressure policy is drop, never block: recognition lag must not stall
//! the intake loop, because a stalled intake loses wire bytes. A full queue
//! rejects the newest span and the caller reports the drop.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};

use crate::error::{Result, VoxpipeError};
use crate::segment::ReadySpan;

/// Producer half. Dropping it signals the consumer that no more spans are
/// coming.
pub struct SpanProducer {
    sender: Sender<ReadySpan>,
}

/// Consumer half with bounded-wait pops.
pub struct SpanConsumer {
    receiver: Receiver<ReadySpan>,
}

/// What a bounded-wait pop observed.
#[derive(Debug)]
pub enum PopOutcome {
    Span(ReadySpan),
    TimedOut,
    /// All producers are gone and the queue is empty.
    Disconnected,
}

/// Creates the queue with a fixed capacity.
pub fn work_queue(capacity: usize) -> (SpanProducer, SpanConsumer) {
    let (sender, receiver) = bounded(capacity);
    (SpanProducer { sender }, SpanConsumer { receiver })
}

impl SpanProducer {
    /// Non-blocking push. A full queue drops `span` and reports which
    /// sequence id was lost.
    pub fn push(&self, span: ReadySpan) -> Result<()> {
        match self.sender.try_send(span) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(span)) => Err(VoxpipeError::QueueFull {
                sequence_id: span.sequence_id,
            }),
            Err(TrySendError::Disconnected(span)) => Err(VoxpipeError::Other(format!(
                "work queue consumer gone, span {} lost",
                span.sequence_id
            ))),
        }
    }
}

impl SpanConsumer {
    /// Blocks up to `timeout` for the next span.
    pub fn pop(&self, timeout: Duration) -> PopOutcome {
        match self.receiver.recv_timeout(timeout) {
            Ok(span) => PopOutcome::Span(span),
            Err(RecvTimeoutError::Timeout) => PopOutcome::TimedOut,
            Err(RecvTimeoutError::Disconnected) => PopOutcome::Disconnected,
        }
    }

    /// Spans currently waiting.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
