//! Pipeline assembly and lifecycle control.
//!
//! The controller wires the stations together and owns startup: engine
//! warm-up, the readiness token, then the intake and invoker threads. The
//! returned handle drives shutdown: a bounded drain, then abandonment of
//! whatever is still in flight.

use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};
use crate::defaults::{self, POLL_INTERVAL};
use crate::emit::EventEmitter;
use crate::engine::{RecognitionInvoker, Recognizer};
use crate::error::Result;
use crate::pipeline::intake::IntakeLoop;
use crate::pipeline::state::{PipelineState, SharedState};
use crate::queue::work_queue;
use crate::segment::{SegmentPolicy, SegmentationBuffer};
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::wire::{ChunkValidator, FrameReader, ThreadedByteSource};

/// Everything tunable about one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub policy: SegmentPolicy,
    pub min_chunk_bytes: u32,
    pub max_chunk_bytes: u32,
    pub queue_capacity: usize,
    pub drain_deadline: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            policy: SegmentPolicy::default(),
            min_chunk_bytes: defaults::MIN_CHUNK_BYTES,
            max_chunk_bytes: defaults::MAX_CHUNK_BYTES,
            queue_capacity: defaults::QUEUE_CAPACITY,
            drain_deadline: defaults::DRAIN_DEADLINE,
        }
    }
}

pub struct PipelineController<R: Recognizer> {
    settings: PipelineSettings,
    recognizer: R,
    clock: Arc<dyn Clock>,
}

impl<R: Recognizer + 'static> PipelineController<R> {
    pub fn new(settings: PipelineSettings, recognizer: R) -> Self {
        Self {
            settings,
            recognizer,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source. Tests use this with a mock clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Warms the engine, announces readiness, and spawns the stations.
    ///
    /// Warm-up failure is fatal: the error is returned before any thread
    /// starts, and the caller reports it and exits non-zero.
    pub fn start<I, O>(self, input: I, output: O) -> Result<PipelineHandle>
    where
        I: Read + Send + 'static,
        O: Write + Send + 'static,
    {
        let stats = Arc::new(PipelineStats::new());
        let state = SharedState::new();

        self.recognizer.warm_up()?;

        let emitter = EventEmitter::spawn(output, Arc::clone(&stats));
        emitter.handle().ready();
        state.advance_to(PipelineState::Ready);

        let (producer, consumer) = work_queue(self.settings.queue_capacity);
        let abandon = Arc::new(AtomicBool::new(false));

        let intake = IntakeLoop::new(
            FrameReader::new(ThreadedByteSource::new(input), POLL_INTERVAL),
            ChunkValidator::new(self.settings.min_chunk_bytes, self.settings.max_chunk_bytes),
            SegmentationBuffer::new(self.settings.policy, Arc::clone(&self.clock)),
            producer,
            emitter.handle(),
            Arc::clone(&stats),
            state.clone(),
        );
        let intake_thread = thread::Builder::new()
            .name("voxpipe-intake".to_string())
            .spawn(move || intake.run())
            .expect("failed to spawn intake thread");

        let invoker = RecognitionInvoker::new(
            self.recognizer,
            consumer,
            emitter.handle(),
            Arc::clone(&stats),
            Arc::clone(&abandon),
            self.settings.policy.sample_rate,
        );
        let invoker_thread = thread::Builder::new()
            .name("voxpipe-invoker".to_string())
            .spawn(move || invoker.run())
            .expect("failed to spawn invoker thread");

        Ok(PipelineHandle {
            state,
            stats,
            abandon,
            intake: Some(intake_thread),
            invoker: Some(invoker_thread),
            emitter: Some(emitter),
            drain_deadline: self.settings.drain_deadline,
        })
    }
}

pub struct PipelineHandle {
    state: SharedState,
    stats: Arc<PipelineStats>,
    abandon: Arc<AtomicBool>,
    intake: Option<JoinHandle<()>>,
    invoker: Option<JoinHandle<()>>,
    emitter: Option<EventEmitter>,
    drain_deadline: Duration,
}

impl PipelineHandle {
    pub fn state(&self) -> PipelineState {
        self.state.get()
    }

    /// Requests a drain. Safe to call from any thread, any number of
    /// times; the intake loop observes it within one poll interval.
    pub fn shutdown(&self) {
        self.state.advance_to(PipelineState::Draining);
    }

    /// Cheap clone for requesting shutdown after the handle itself has
    /// been moved into `join()`.
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        ShutdownTrigger {
            state: self.state.clone(),
        }
    }

    /// Waits for the stream to end (or a prior [`shutdown`] request),
    /// drains queued work under the deadline, and stops everything.
    ///
    /// [`shutdown`]: PipelineHandle::shutdown
    pub fn join(mut self) -> StatsSnapshot {
        // Intake ends on EOF, framing error, or the drain flag. It flushes
        // the buffer and drops the producer on its way out.
        if let Some(intake) = self.intake.take() {
            let _ = intake.join();
        }
        self.state.advance_to(PipelineState::Draining);

        // Bounded drain: give the invoker until the deadline to clear the
        // queue, then abandon whatever is left.
        if let Some(invoker) = self.invoker.take() {
            let deadline = Instant::now() + self.drain_deadline;
            loop {
                if invoker.is_finished() {
                    let _ = invoker.join();
                    break;
                }
                if Instant::now() >= deadline {
                    self.abandon.store(true, Ordering::Release);
                    // One grace poll so a between-spans invoker can exit
                    // cleanly; a mid-inference engine call cannot be
                    // interrupted, so past this the thread is detached.
                    thread::sleep(2 * POLL_INTERVAL);
                    if invoker.is_finished() {
                        let _ = invoker.join();
                    } else {
                        eprintln!(
                            "voxpipe: drain deadline passed, abandoning in-flight recognition"
                        );
                    }
                    break;
                }
                thread::sleep(POLL_INTERVAL);
            }
        }

        // Closed last so every accepted result or error reaches stdout.
        if let Some(emitter) = self.emitter.take() {
            emitter.close();
        }

        self.state.advance_to(PipelineState::Stopped);
        self.stats.snapshot()
    }
}

/// Clonable drain request, detached from the handle's lifetime.
#[derive(Clone)]
pub struct ShutdownTrigger {
    state: SharedState,
}

impl ShutdownTrigger {
    pub fn shutdown(&self) {
        self.state.advance_to(PipelineState::Draining);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::engine::{MockRecognizer, NullRecognizer, RecognizedSegment, Recognizer};
    use std::io::Cursor;
    use std::sync::Mutex;

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

    fn frame_of(samples: &[i16]) -> Vec<u8> {
        let payload: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let mut out = (payload.len() as u32).to_le_bytes().to_vec();
        out.extend(payload);
        out
    }

    #[test]
    fn warm_up_failure_aborts_before_any_output() {
        let sink = SharedBuf::default();
        let controller = PipelineController::new(
            PipelineSettings::default(),
            MockRecognizer::new("mock").with_warm_up_failure(),
        );
        let result = controller.start(Cursor::new(Vec::<u8>::new()), sink.clone());

        assert!(matches!(result, Err(ref e) if e.is_fatal()));
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn ready_token_is_the_first_line() {
        let sink = SharedBuf::default();
        let controller = PipelineController::new(PipelineSettings::default(), NullRecognizer);
        let handle = controller
            .start(Cursor::new(Vec::<u8>::new()), sink.clone())
            .unwrap();
        handle.join();

        assert_eq!(sink.lines().first().map(String::as_str), Some("ENGINE_READY"));
    }

    #[test]
    fn end_to_end_voiced_stream_yields_finals_and_stops() {
        // 3s of voiced audio: one 2s span plus a forced flush span.
        let mut bytes = Vec::new();
        for _ in 0..30 {
            bytes.extend(frame_of(&[8000i16; 1600]));
        }

        let sink = SharedBuf::default();
        let controller = PipelineController::new(
            PipelineSettings::default(),
            MockRecognizer::new("mock").with_text("hello world"),
        );
        let handle = controller.start(Cursor::new(bytes), sink.clone()).unwrap();
        let snapshot = handle.join();

        let lines = sink.lines();
        assert_eq!(lines[0], "ENGINE_READY");
        let finals: Vec<_> = lines
            .iter()
            .filter(|l| l.contains(r#""type":"final""#))
            .collect();
        assert_eq!(finals.len(), 2);
        assert!(finals.iter().all(|l| l.contains("hello world")));
        assert_eq!(snapshot.finals_emitted, 2);
        assert_eq!(snapshot.chunks_read, 30);
    }

    #[test]
    fn shutdown_drains_and_reaches_stopped() {
        // A source that never delivers and never ends on its own; only the
        // shutdown request can end this run.
        struct Stalled;
        impl Read for Stalled {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                std::thread::sleep(Duration::from_secs(10));
                Ok(0)
            }
        }

        let sink = SharedBuf::default();
        let controller = PipelineController::new(PipelineSettings::default(), NullRecognizer);
        let handle = controller.start(Stalled, sink.clone()).unwrap();

        handle.shutdown();
        let _ = handle.join();
        assert_eq!(sink.lines().first().map(String::as_str), Some("ENGINE_READY"));
    }

    #[test]
    fn drain_deadline_abandons_hung_recognition() {
        /// Engine that never returns within any reasonable deadline.
        struct HangingRecognizer;
        impl Recognizer for HangingRecognizer {
            fn recognize(
                &self,
                _samples: &[f32],
                _sample_rate: u32,
            ) -> crate::error::Result<Vec<RecognizedSegment>> {
                std::thread::sleep(Duration::from_secs(30));
                Ok(Vec::new())
            }
            fn engine_name(&self) -> &str {
                "hanging"
            }
            fn is_ready(&self) -> bool {
                true
            }
        }

        let settings = PipelineSettings {
            drain_deadline: Duration::from_millis(300),
            ..PipelineSettings::default()
        };

        // 3s of voiced audio: two spans reach the queue; the engine hangs
        // on the first one forever.
        let mut bytes = Vec::new();
        for _ in 0..30 {
            bytes.extend(frame_of(&[8000i16; 1600]));
        }

        let sink = SharedBuf::default();
        let controller = PipelineController::new(settings, HangingRecognizer);
        let handle = controller.start(Cursor::new(bytes), sink.clone()).unwrap();

        let started = Instant::now();
        let snapshot = handle.join();

        assert!(
            started.elapsed() < Duration::from_secs(5),
            "join must not wait for the hung engine"
        );
        assert!(snapshot.spans_abandoned() >= 1);
        assert_eq!(snapshot.finals_emitted, 0);
        assert_eq!(sink.lines().first().map(String::as_str), Some("ENGINE_READY"));
    }

    #[test]
    fn cuts_are_driven_by_audio_time_not_wall_time() {
        // A frozen clock starves the silence trigger, but the duration
        // trigger counts samples, so 2s of audio still cuts one span.
        let mut bytes = Vec::new();
        for _ in 0..20 {
            bytes.extend(frame_of(&[8000i16; 1600]));
        }

        let sink = SharedBuf::default();
        let controller = PipelineController::new(
            PipelineSettings::default(),
            MockRecognizer::new("mock").with_text("tick"),
        )
        .with_clock(Arc::new(MockClock::new()));
        let handle = controller.start(Cursor::new(bytes), sink.clone()).unwrap();
        let snapshot = handle.join();

        assert_eq!(snapshot.spans_cut, 1);
        assert_eq!(snapshot.finals_emitted, 1);
    }

    #[test]
    fn join_reports_final_state_stopped() {
        let controller = PipelineController::new(PipelineSettings::default(), NullRecognizer);
        let handle = controller
            .start(Cursor::new(Vec::<u8>::new()), SharedBuf::default())
            .unwrap();
        let state = handle.state.clone();
        handle.join();
        assert_eq!(state.get(), PipelineState::Stopped);
    }
}
