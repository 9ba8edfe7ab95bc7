//! Lifecycle state shared across pipeline threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Pipeline lifecycle. Transitions are forward-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum PipelineState {
    /// Engine warming up; nothing consumed, nothing emitted.
    Starting = 0,
    /// Readiness token emitted, all stations running.
    Ready = 1,
    /// No new input accepted; queued work finishing under a deadline.
    Draining = 2,
    /// Terminal.
    Stopped = 3,
}

impl PipelineState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => PipelineState::Starting,
            1 => PipelineState::Ready,
            2 => PipelineState::Draining,
            _ => PipelineState::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Starting => "starting",
            PipelineState::Ready => "ready",
            PipelineState::Draining => "draining",
            PipelineState::Stopped => "stopped",
        }
    }
}

/// Atomic cell holding the current [`PipelineState`].
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    inner: Arc<AtomicU8>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AtomicU8::new(PipelineState::Starting as u8)),
        }
    }

    pub fn get(&self) -> PipelineState {
        PipelineState::from_u8(self.inner.load(Ordering::Acquire))
    }

    /// Moves to `target` unless the pipeline is already at or past it.
    /// Returns true when this call performed the transition.
    pub fn advance_to(&self, target: PipelineState) -> bool {
        let target_v = target as u8;
        let mut current = self.inner.load(Ordering::Acquire);
        loop {
            if current >= target_v {
                return false;
            }
            match self.inner.compare_exchange_weak(
                current,
                target_v,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}
