//! Command-line interface.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::config::Config;

/// Recognition backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EngineChoice {
    /// Whisper via whisper-rs (requires the `whisper` build feature)
    Whisper,
    /// Accepts every span and recognizes nothing; pipeline testing
    Null,
}

impl EngineChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineChoice::Whisper => "whisper",
            EngineChoice::Null => "null",
        }
    }
}

/// Streaming speech recognition over stdin/stdout pipes.
///
/// Reads length-prefixed 16-bit PCM frames from stdin and writes one JSON
/// event per line to stdout. Diagnostics go to stderr.
#[derive(Parser, Debug)]
#[command(name = "voxpipe", version, about, long_about = None)]
pub struct Cli {
    /// Path to the recognition model file (e.g. a ggml Whisper model)
    pub model: Option<PathBuf>,

    /// Recognition backend
    #[arg(long, value_enum)]
    pub engine: Option<EngineChoice>,

    /// Configuration file (default: ~/.config/voxpipe/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Language code for recognition, or "auto"
    #[arg(long)]
    pub language: Option<String>,

    /// Inference threads (default: auto-detect)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Target span duration before a cut is forced (e.g. "2s", "1500ms")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub chunk_duration: Option<Duration>,

    /// Trailing-silence duration that triggers a cut (e.g. "1200ms")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub silence_duration: Option<Duration>,

    /// Normalized peak amplitude below which audio counts as silent
    #[arg(long)]
    pub silence_threshold: Option<f32>,

    /// Spans buffered between segmentation and recognition
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// How long shutdown waits for queued work (e.g. "5s")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub drain_deadline: Option<Duration>,

    /// Suppress the shutdown stats report on stderr
    #[arg(short, long)]
    pub quiet: bool,

    /// Extra diagnostics on stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Layer the CLI overrides on top of a loaded configuration.
    pub fn apply_to(&self, mut config: Config) -> Config {
        if let Some(model) = &self.model {
            config.engine.model = Some(model.clone());
        }
        if let Some(engine) = self.engine {
            config.engine.backend = engine.as_str().to_string();
        }
        if let Some(language) = &self.language {
            config.engine.language = language.clone();
        }
        if let Some(threads) = self.threads {
            config.engine.threads = Some(threads);
        }
        if let Some(d) = self.chunk_duration {
            config.segment.chunk_duration_secs = d.as_secs_f32();
        }
        if let Some(d) = self.silence_duration {
            config.segment.silence_duration_secs = d.as_secs_f32();
        }
        if let Some(threshold) = self.silence_threshold {
            config.audio.silence_threshold = threshold;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue.capacity = capacity;
        }
        if let Some(d) = self.drain_deadline {
            config.shutdown.drain_deadline_secs = d.as_secs_f32();
        }
        config
    }
}
