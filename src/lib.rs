//! voxpipe: streaming speech recognition over stdin/stdout pipes.
//!
//! A producer writes length-prefixed 16-bit PCM frames to stdin; voxpipe
//! validates and segments the audio into recognition-sized spans, runs
//! them through a pluggable engine, and writes one JSON event per line to
//! stdout. The design goal is graceful degradation: a bad chunk, a full
//! queue, or a failed recognition call costs exactly that chunk or span,
//! never the stream.

pub mod cli;
pub mod clock;
pub mod config;
pub mod defaults;
pub mod emit;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod queue;
pub mod segment;
pub mod stats;
pub mod wire;

pub use config::Config;
pub use error::{Result, VoxpipeError};
pub use pipeline::{PipelineController, PipelineHandle, PipelineSettings, PipelineState};
