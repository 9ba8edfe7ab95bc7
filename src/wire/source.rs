//! Byte input with bounded-wait reads.
//!
//! `std::io::Read` on a pipe blocks indefinitely, which would make the
//! intake loop unable to observe shutdown. `ThreadedByteSource` moves the
//! blocking read onto its own thread and hands bytes over a bounded
//! channel, so the consumer side always waits with a timeout.

use std::io::Read;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};

use crate::error::Result;

/// Outcome of a single bounded-wait read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were copied into the buffer.
    Data(usize),
    /// No bytes arrived within the timeout; the source may still produce.
    TimedOut,
    /// The source is exhausted and will never produce again.
    Eof,
}

/// A byte stream that can be read with a timeout.
pub trait ByteSource {
    fn read_with_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<ReadOutcome>;
}

enum PumpMessage {
    Bytes(Vec<u8>),
    Eof,
    Error(std::io::Error),
}

/// Adapts any `Read + Send` into a `ByteSource` by pumping it from a
/// dedicated thread.
pub struct ThreadedByteSource {
    receiver: Receiver<PumpMessage>,
    /// Bytes received but not yet handed to the caller.
    pending: Vec<u8>,
    pending_offset: usize,
    eof_seen: bool,
}

const PUMP_READ_SIZE: usize = 8192;
const PUMP_CHANNEL_CAPACITY: usize = 64;

impl ThreadedByteSource {
    /// Spawns the pump thread. The thread exits on EOF, on a read error, or
    /// when the receiving side is dropped.
    pub fn new<R: Read + Send + 'static>(mut inner: R) -> Self {
        let (sender, receiver) = bounded(PUMP_CHANNEL_CAPACITY);

        thread::Builder::new()
            .name("voxpipe-byte-pump".to_string())
            .spawn(move || {
                let mut buf = vec![0u8; PUMP_READ_SIZE];
                loop {
                    match inner.read(&mut buf) {
                        Ok(0) => {
                            let _ = sender.send(PumpMessage::Eof);
                            break;
                        }
                        Ok(n) => {
                            if sender.send(PumpMessage::Bytes(buf[..n].to_vec())).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            let _ = sender.send(PumpMessage::Error(e));
                            break;
                        }
                    }
                }
            })
            .expect("failed to spawn byte pump thread");

        Self {
            receiver,
            pending: Vec::new(),
            pending_offset: 0,
            eof_seen: false,
        }
    }

    fn take_pending(&mut self, buf: &mut [u8]) -> usize {
        let available = self.pending.len() - self.pending_offset;
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&self.pending[self.pending_offset..self.pending_offset + n]);
        self.pending_offset += n;
        if self.pending_offset == self.pending.len() {
            self.pending.clear();
            self.pending_offset = 0;
        }
        n
    }
}

impl ByteSource for ThreadedByteSource {
    fn read_with_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<ReadOutcome> {
        if self.pending_offset < self.pending.len() {
            return Ok(ReadOutcome::Data(self.take_pending(buf)));
        }
        if self.eof_seen {
            return Ok(ReadOutcome::Eof);
        }

        match self.receiver.recv_timeout(timeout) {
            Ok(PumpMessage::Bytes(bytes)) => {
                self.pending = bytes;
                self.pending_offset = 0;
                Ok(ReadOutcome::Data(self.take_pending(buf)))
            }
            Ok(PumpMessage::Eof) => {
                self.eof_seen = true;
                Ok(ReadOutcome::Eof)
            }
            Ok(PumpMessage::Error(e)) => {
                self.eof_seen = true;
                Err(e.into())
            }
            Err(RecvTimeoutError::Timeout) => Ok(ReadOutcome::TimedOut),
            // Pump thread gone without an EOF marker; treat as end of stream.
            Err(RecvTimeoutError::Disconnected) => {
                self.eof_seen = true;
                Ok(ReadOutcome::Eof)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn drain(source: &mut ThreadedByteSource) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 16];
        loop {
            match source.read_with_timeout(&mut buf, TIMEOUT).unwrap() {
                ReadOutcome::Data(n) => out.extend_from_slice(&buf[..n]),
                ReadOutcome::Eof => return out,
                ReadOutcome::TimedOut => continue,
            }
        }
    }

    #[test]
    fn delivers_all_bytes_then_eof() {
        let data: Vec<u8> = (0..100).collect();
        let mut source = ThreadedByteSource::new(Cursor::new(data.clone()));
        assert_eq!(drain(&mut source), data);
    }

    #[test]
    fn eof_is_sticky() {
        let mut source = ThreadedByteSource::new(Cursor::new(Vec::new()));
        let mut buf = [0u8; 4];
        assert_eq!(
            source.read_with_timeout(&mut buf, TIMEOUT).unwrap(),
            ReadOutcome::Eof
        );
        assert_eq!(
            source.read_with_timeout(&mut buf, TIMEOUT).unwrap(),
            ReadOutcome::Eof
        );
    }

    #[test]
    fn small_buffer_consumes_pending_across_calls() {
        let mut source = ThreadedByteSource::new(Cursor::new(vec![1, 2, 3, 4, 5]));
        let mut buf = [0u8; 2];
        let mut out = Vec::new();
        loop {
            match source.read_with_timeout(&mut buf, TIMEOUT).unwrap() {
                ReadOutcome::Data(n) => out.extend_from_slice(&buf[..n]),
                ReadOutcome::Eof => break,
                ReadOutcome::TimedOut => continue,
            }
        }
        assert_eq!(out, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn slow_source_times_out_without_erroring() {
        struct Stalled;
        impl Read for Stalled {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                std::thread::sleep(Duration::from_secs(60));
                Ok(0)
            }
        }
        let mut source = ThreadedByteSource::new(Stalled);
        let mut buf = [0u8; 4];
        assert_eq!(
            source
                .read_with_timeout(&mut buf, Duration::from_millis(20))
                .unwrap(),
            ReadOutcome::TimedOut
        );
    }

    #[test]
    fn read_error_is_surfaced_once_then_eof() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "pipe closed",
                ))
            }
        }
        let mut source = ThreadedByteSource::new(Broken);
        let mut buf = [0u8; 4];
        assert!(source.read_with_timeout(&mut buf, TIMEOUT).is_err());
        assert_eq!(
            source.read_with_timeout(&mut buf, TIMEOUT).unwrap(),
            ReadOutcome::Eof
        );
    }
}
