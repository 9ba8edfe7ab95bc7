//! Output event stream.
//!
//! All machine-readable output goes through one writer thread, so results
//! and errors from different components interleave as whole lines, never
//! mid-line. Every line is flushed immediately; a downstream consumer
//! must not wait on a buffer.
//!
//! Wire shapes:
//!
//! ```text
//! {"type":"partial","text":"..."}
//! {"type":"final","text":"...","confidence":0.92,"start":0.0,"end":1.4}
//! {"type":"error","error":"..."}
//! ENGINE_READY
//! ```

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{RecvTimeoutError, Sender, unbounded};
use serde::Serialize;

use crate::defaults::{POLL_INTERVAL, READY_TOKEN};
use crate::stats::PipelineStats;

/// One JSON line on stdout.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputEvent {
    Partial {
        text: String,
    },
    Final {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        confidence: Option<f32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        start: Option<f32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        end: Option<f32>,
    },
    Error {
        error: String,
    },
}

enum EmitMessage {
    /// Bare readiness token, not JSON.
    Ready,
    /// Final results carry their span's sequence id for the order guard.
    Event {
        sequence_id: Option<u64>,
        event: OutputEvent,
    },
}

/// Cloneable sending side of the emitter.
#[derive(Clone)]
pub struct EmitterHandle {
    sender: Sender<EmitMessage>,
}

impl EmitterHandle {
    pub fn ready(&self) {
        let _ = self.sender.send(EmitMessage::Ready);
    }

    pub fn partial(&self, text: String) {
        let _ = self.sender.send(EmitMessage::Event {
            sequence_id: None,
            event: OutputEvent::Partial { text },
        });
    }

    pub fn final_result(
        &self,
        sequence_id: u64,
        text: String,
        confidence: Option<f32>,
        start: Option<f32>,
        end: Option<f32>,
    ) {
        let _ = self.sender.send(EmitMessage::Event {
            sequence_id: Some(sequence_id),
            event: OutputEvent::Final {
                text,
                confidence,
                start,
                end,
            },
        });
    }

    pub fn error(&self, message: String) {
        let _ = self.sender.send(EmitMessage::Event {
            sequence_id: None,
            event: OutputEvent::Error { error: message },
        });
    }
}

/// Owns the writer thread. Closing delivers everything already sent, then
/// stops the writer even if stray handles are still alive (a detached
/// invoker past the drain deadline must not wedge shutdown).
pub struct EventEmitter {
    sender: Option<Sender<EmitMessage>>,
    closing: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl EventEmitter {
    /// Spawns the writer thread over any `Write + Send` sink.
    pub fn spawn<W: Write + Send + 'static>(mut writer: W, stats: Arc<PipelineStats>) -> Self {
        let (sender, receiver) = unbounded::<EmitMessage>();
        let closing = Arc::new(AtomicBool::new(false));
        let closing_flag = Arc::clone(&closing);

        let thread = thread::Builder::new()
            .name("voxpipe-emitter".to_string())
            .spawn(move || {
                // Finals must leave in non-decreasing sequence order. The
                // single-consumer invoker makes this structural; a late
                // final is still dropped rather than emitted out of order.
                let mut last_final_seq: Option<u64> = None;

                loop {
                    let message = match receiver.recv_timeout(POLL_INTERVAL) {
                        Ok(message) => message,
                        Err(RecvTimeoutError::Timeout) => {
                            if closing_flag.load(Ordering::Acquire) {
                                break;
                            }
                            continue;
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    };
                    let line = match message {
                        EmitMessage::Ready => READY_TOKEN.to_string(),
                        EmitMessage::Event { sequence_id, event } => {
                            if let OutputEvent::Final { .. } = event {
                                let seq = sequence_id.unwrap_or(0);
                                if last_final_seq.is_some_and(|last| seq < last) {
                                    PipelineStats::incr(&stats.finals_out_of_order);
                                    continue;
                                }
                                last_final_seq = Some(seq);
                                PipelineStats::incr(&stats.finals_emitted);
                            } else if let OutputEvent::Partial { .. } = event {
                                PipelineStats::incr(&stats.partials_emitted);
                            }
                            match serde_json::to_string(&event) {
                                Ok(json) => json,
                                Err(e) => {
                                    eprintln!("voxpipe: failed to serialize event: {e}");
                                    continue;
                                }
                            }
                        }
                    };
                    if writeln!(writer, "{line}").and_then(|_| writer.flush()).is_err() {
                        // Consumer closed stdout; nothing more to deliver.
                        break;
                    }
                }
            })
            .expect("failed to spawn emitter thread");

        Self {
            sender: Some(sender),
            closing,
            thread: Some(thread),
        }
    }

    pub fn handle(&self) -> EmitterHandle {
        EmitterHandle {
            sender: self.sender.clone().expect("emitter already closed"),
        }
    }

    /// Flushes remaining messages and stops the writer thread. Messages
    /// sent before this call are delivered; anything a stray handle sends
    /// afterwards is discarded with the channel.
    pub fn close(mut self) {
        self.closing.store(true, Ordering::Release);
        drop(self.sender.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for EventEmitter {
    fn drop(&mut self) {
        self.closing.store(true, Ordering::Release);
        drop(self.sender.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Shared sink so the test can inspect what the writer thread wrote.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn lines(&self) -> Vec<String> {
            let buf = self.0.lock().unwrap();
            String::from_utf8(buf.clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn partial_event_shape() {
        let event = OutputEvent::Partial {
            text: "hel".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"type":"partial","text":"hel"}"#
        );
    }

    #[test]
    fn final_event_omits_absent_optionals() {
        let event = OutputEvent::Final {
            text: "hello".to_string(),
            confidence: None,
            start: None,
            end: None,
        };
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"type":"final","text":"hello"}"#
        );

        let event = OutputEvent::Final {
            text: "hello".to_string(),
            confidence: Some(0.5),
            start: Some(0.0),
            end: Some(1.5),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""confidence":0.5"#));
        assert!(json.contains(r#""start":0.0"#));
        assert!(json.contains(r#""end":1.5"#));
    }

    #[test]
    fn error_event_shape() {
        let event = OutputEvent::Error {
            error: "queue full".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"type":"error","error":"queue full"}"#
        );
    }

    #[test]
    fn ready_token_is_a_bare_line() {
        let sink = SharedBuf::default();
        let emitter = EventEmitter::spawn(sink.clone(), Arc::new(PipelineStats::new()));
        let handle = emitter.handle();
        handle.ready();
        handle.partial("one".to_string());
        drop(handle);
        emitter.close();

        let lines = sink.lines();
        assert_eq!(lines[0], "ENGINE_READY");
        assert_eq!(lines[1], r#"{"type":"partial","text":"one"}"#);
    }

    #[test]
    fn close_delivers_everything_sent_before_it() {
        let sink = SharedBuf::default();
        let stats = Arc::new(PipelineStats::new());
        let emitter = EventEmitter::spawn(sink.clone(), Arc::clone(&stats));
        let handle = emitter.handle();
        for i in 0..100 {
            handle.final_result(i, format!("span {i}"), None, None, None);
        }
        drop(handle);
        emitter.close();

        assert_eq!(sink.lines().len(), 100);
        assert_eq!(stats.snapshot().finals_emitted, 100);
    }

    #[test]
    fn late_final_is_dropped_and_counted() {
        let sink = SharedBuf::default();
        let stats = Arc::new(PipelineStats::new());
        let emitter = EventEmitter::spawn(sink.clone(), Arc::clone(&stats));
        let handle = emitter.handle();
        handle.final_result(5, "five".to_string(), None, None, None);
        handle.final_result(3, "three".to_string(), None, None, None);
        handle.final_result(5, "five again".to_string(), None, None, None);
        drop(handle);
        emitter.close();

        let lines = sink.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("five"));
        assert!(lines[1].contains("five again"));
        assert_eq!(stats.snapshot().finals_out_of_order, 1);
    }

    #[test]
    fn errors_do_not_disturb_final_ordering() {
        let sink = SharedBuf::default();
        let stats = Arc::new(PipelineStats::new());
        let emitter = EventEmitter::spawn(sink.clone(), Arc::clone(&stats));
        let handle = emitter.handle();
        handle.final_result(0, "zero".to_string(), None, None, None);
        handle.error("dropped span 1".to_string());
        handle.final_result(2, "two".to_string(), None, None, None);
        drop(handle);
        emitter.close();

        assert_eq!(sink.lines().len(), 3);
        assert_eq!(stats.snapshot().finals_emitted, 2);
    }
}
