//! Length-prefixed frame parsing.
//!
//! The wire format is `[u32 little-endian payload length][payload]`,
//! repeated until the producer closes the stream. The reader is an
//! incremental state machine: a timeout mid-frame keeps the partial header
//! or payload for the next call, because a slow producer is not a closed
//! producer.

use std::time::Duration;

use crate::defaults::FRAME_RESYNC_CAP_BYTES;
use crate::error::{Result, VoxpipeError};
use crate::wire::source::{ByteSource, ReadOutcome};

/// One framed message off the wire. The reader guarantees
/// `payload.len() == declared_len as usize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub declared_len: u32,
    pub payload: Vec<u8>,
}

/// Result of one `next_frame()` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// A complete frame was assembled.
    Chunk(AudioChunk),
    /// The timeout elapsed; any partial frame is retained.
    Idle,
    /// The stream ended cleanly at a frame boundary.
    Eof,
}

enum ParseState {
    /// Accumulating the 4-byte length prefix.
    Header,
    /// Accumulating `declared_len` payload bytes.
    Payload { declared_len: u32 },
}

/// Incremental frame parser over a [`ByteSource`].
pub struct FrameReader<S: ByteSource> {
    source: S,
    state: ParseState,
    /// Bytes of the current header or payload accumulated so far.
    partial: Vec<u8>,
    read_timeout: Duration,
}

const HEADER_LEN: usize = 4;

impl<S: ByteSource> FrameReader<S> {
    pub fn new(source: S, read_timeout: Duration) -> Self {
        Self {
            source,
            state: ParseState::Header,
            partial: Vec::new(),
            read_timeout,
        }
    }

    /// Reads until a complete frame, the timeout, or end of stream.
    ///
    /// EOF in the middle of a frame is a `Framing` error: the producer died
    /// mid-message and the remainder can never arrive. A declared length
    /// above the resync cap is also a framing error, since skipping a
    /// multi-gigabyte bogus payload is not recoverable in practice.
    pub fn next_frame(&mut self) -> Result<FrameEvent> {
        let mut buf = [0u8; 8192];
        loop {
            let needed = match self.state {
                ParseState::Header => HEADER_LEN - self.partial.len(),
                ParseState::Payload { declared_len } => {
                    declared_len as usize - self.partial.len()
                }
            };

            if needed == 0 {
                if let Some(event) = self.advance()? {
                    return Ok(event);
                }
                continue;
            }

            let want = needed.min(buf.len());
            match self.source.read_with_timeout(&mut buf[..want], self.read_timeout)? {
                ReadOutcome::Data(n) => {
                    self.partial.extend_from_slice(&buf[..n]);
                    if let Some(event) = self.advance()? {
                        return Ok(event);
                    }
                }
                ReadOutcome::TimedOut => return Ok(FrameEvent::Idle),
                ReadOutcome::Eof => {
                    if matches!(self.state, ParseState::Header) && self.partial.is_empty() {
                        return Ok(FrameEvent::Eof);
                    }
                    let context = match self.state {
                        ParseState::Header => format!(
                            "stream ended mid-header ({} of {} bytes)",
                            self.partial.len(),
                            HEADER_LEN
                        ),
                        ParseState::Payload { declared_len } => format!(
                            "stream ended mid-payload ({} of {} bytes)",
                            self.partial.len(),
                            declared_len
                        ),
                    };
                    return Err(VoxpipeError::Framing { message: context });
                }
            }
        }
    }

    /// Moves the state machine forward if the current piece is complete.
    fn advance(&mut self) -> Result<Option<FrameEvent>> {
        match self.state {
            ParseState::Header => {
                if self.partial.len() < HEADER_LEN {
                    return Ok(None);
                }
                let declared_len = u32::from_le_bytes([
                    self.partial[0],
                    self.partial[1],
                    self.partial[2],
                    self.partial[3],
                ]);
                self.partial.clear();
                if declared_len > FRAME_RESYNC_CAP_BYTES {
                    return Err(VoxpipeError::Framing {
                        message: format!(
                            "declared frame length {declared_len} exceeds resync cap {FRAME_RESYNC_CAP_BYTES}"
                        ),
                    });
                }
                if declared_len == 0 {
                    // Zero-length frame: complete, will be rejected downstream.
                    return Ok(Some(FrameEvent::Chunk(AudioChunk {
                        declared_len: 0,
                        payload: Vec::new(),
                    })));
                }
                self.state = ParseState::Payload { declared_len };
                Ok(None)
            }
            ParseState::Payload { declared_len } => {
                if self.partial.len() < declared_len as usize {
                    return Ok(None);
                }
                let payload = std::mem::take(&mut self.partial);
                self.state = ParseState::Header;
                Ok(Some(FrameEvent::Chunk(AudioChunk {
                    declared_len,
                    payload,
                })))
            }
        }
    }
}
