use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::defaults;
use crate::error::{Result, VoxpipeError};
use crate::pipeline::PipelineSettings;
use crate::segment::SegmentPolicy;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub segment: SegmentConfig,
    pub wire: WireConfig,
    pub queue: QueueConfig,
    pub shutdown: ShutdownConfig,
    pub engine: EngineConfig,
}

/// Audio stream parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Normalized peak amplitude below which a chunk counts as silent
    pub silence_threshold: f32,
}

/// Segmentation cut thresholds, all in seconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmentConfig {
    pub chunk_duration_secs: f32,
    pub min_audio_length_secs: f32,
    pub silence_duration_secs: f32,
    pub hard_ceiling_secs: f32,
    pub max_span_secs: f32,
    pub drop_silent_spans: bool,
}

/// Wire-level chunk bounds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WireConfig {
    pub min_chunk_bytes: u32,
    pub max_chunk_bytes: u32,
}

/// Work queue sizing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
}

/// Shutdown timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShutdownConfig {
    pub drain_deadline_secs: f32,
}

/// Recognition engine selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: String,
    pub model: Option<PathBuf>,
    pub language: String,
    pub threads: Option<usize>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            silence_threshold: defaults::SILENCE_THRESHOLD,
        }
    }
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            chunk_duration_secs: defaults::CHUNK_DURATION_SECS,
            min_audio_length_secs: defaults::MIN_AUDIO_LENGTH_SECS,
            silence_duration_secs: defaults::SILENCE_DURATION_SECS,
            hard_ceiling_secs: defaults::HARD_CEILING_SECS,
            max_span_secs: defaults::MAX_SPAN_SECS,
            drop_silent_spans: true,
        }
    }
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            min_chunk_bytes: defaults::MIN_CHUNK_BYTES,
            max_chunk_bytes: defaults::MAX_CHUNK_BYTES,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::QUEUE_CAPACITY,
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_deadline_secs: defaults::DRAIN_DEADLINE.as_secs_f32(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: "whisper".to_string(),
            model: None,
            language: "auto".to_string(),
            threads: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file is missing or contains invalid TOML.
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from the default path, or return defaults if no file exists
    /// there. An unparsable file is still an error.
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXPIPE_MODEL → engine.model
    /// - VOXPIPE_LANGUAGE → engine.language
    /// - VOXPIPE_ENGINE → engine.backend
    /// - VOXPIPE_SAMPLE_RATE → audio.sample_rate
    /// - VOXPIPE_SILENCE_THRESHOLD → audio.silence_threshold
    /// - VOXPIPE_QUEUE_CAPACITY → queue.capacity
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("VOXPIPE_MODEL")
            && !model.is_empty()
        {
            self.engine.model = Some(PathBuf::from(model));
        }

        if let Ok(language) = std::env::var("VOXPIPE_LANGUAGE")
            && !language.is_empty()
        {
            self.engine.language = language;
        }

        if let Ok(backend) = std::env::var("VOXPIPE_ENGINE")
            && !backend.is_empty()
        {
            self.engine.backend = backend;
        }

        if let Ok(rate) = std::env::var("VOXPIPE_SAMPLE_RATE")
            && let Ok(rate) = rate.parse()
        {
            self.audio.sample_rate = rate;
        }

        if let Ok(threshold) = std::env::var("VOXPIPE_SILENCE_THRESHOLD")
            && let Ok(threshold) = threshold.parse()
        {
            self.audio.silence_threshold = threshold;
        }

        if let Ok(capacity) = std::env::var("VOXPIPE_QUEUE_CAPACITY")
            && let Ok(capacity) = capacity.parse()
        {
            self.queue.capacity = capacity;
        }

        self
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        fn invalid(key: &str, message: &str) -> VoxpipeError {
            VoxpipeError::ConfigInvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            }
        }

        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.audio.silence_threshold) {
            return Err(invalid(
                "audio.silence_threshold",
                "must be within [0.0, 1.0]",
            ));
        }
        if self.segment.chunk_duration_secs <= 0.0 {
            return Err(invalid("segment.chunk_duration_secs", "must be positive"));
        }
        if self.segment.min_audio_length_secs <= 0.0 {
            return Err(invalid("segment.min_audio_length_secs", "must be positive"));
        }
        if self.segment.silence_duration_secs <= 0.0 {
            return Err(invalid("segment.silence_duration_secs", "must be positive"));
        }
        if self.segment.hard_ceiling_secs < self.segment.chunk_duration_secs {
            return Err(invalid(
                "segment.hard_ceiling_secs",
                "must not be below chunk_duration_secs",
            ));
        }
        if self.segment.max_span_secs < self.segment.hard_ceiling_secs {
            return Err(invalid(
                "segment.max_span_secs",
                "must not be below hard_ceiling_secs",
            ));
        }
        if self.wire.min_chunk_bytes == 0 || self.wire.min_chunk_bytes % 2 != 0 {
            return Err(invalid(
                "wire.min_chunk_bytes",
                "must be positive and sample-aligned",
            ));
        }
        if self.wire.max_chunk_bytes <= self.wire.min_chunk_bytes {
            return Err(invalid(
                "wire.max_chunk_bytes",
                "must exceed min_chunk_bytes",
            ));
        }
        if self.wire.max_chunk_bytes > defaults::FRAME_RESYNC_CAP_BYTES {
            return Err(invalid(
                "wire.max_chunk_bytes",
                "must not exceed the frame resync cap",
            ));
        }
        if self.queue.capacity == 0 {
            return Err(invalid("queue.capacity", "must be positive"));
        }
        if self.shutdown.drain_deadline_secs < 0.0 {
            return Err(invalid("shutdown.drain_deadline_secs", "must not be negative"));
        }
        Ok(())
    }

    /// Flatten into the settings struct the controller consumes.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            policy: SegmentPolicy {
                sample_rate: self.audio.sample_rate,
                chunk_duration: Duration::from_secs_f32(self.segment.chunk_duration_secs),
                min_audio_length: Duration::from_secs_f32(self.segment.min_audio_length_secs),
                silence_duration: Duration::from_secs_f32(self.segment.silence_duration_secs),
                silence_threshold: self.audio.silence_threshold,
                hard_ceiling: Duration::from_secs_f32(self.segment.hard_ceiling_secs),
                max_span: Duration::from_secs_f32(self.segment.max_span_secs),
                drop_silent_spans: self.segment.drop_silent_spans,
            },
            min_chunk_bytes: self.wire.min_chunk_bytes,
            max_chunk_bytes: self.wire.max_chunk_bytes,
            queue_capacity: self.queue.capacity,
            drain_deadline: Duration::from_secs_f32(self.shutdown.drain_deadline_secs),
        }
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voxpipe/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voxpipe")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_voxpipe_env() {
        remove_env("VOXPIPE_MODEL");
        remove_env("VOXPIPE_LANGUAGE");
        remove_env("VOXPIPE_ENGINE");
        remove_env("VOXPIPE_SAMPLE_RATE");
        remove_env("VOXPIPE_SILENCE_THRESHOLD");
        remove_env("VOXPIPE_QUEUE_CAPACITY");
    }

    #[test]
    fn default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.silence_threshold, 0.01);

        assert_eq!(config.segment.chunk_duration_secs, 2.0);
        assert_eq!(config.segment.min_audio_length_secs, 0.8);
        assert_eq!(config.segment.silence_duration_secs, 1.2);
        assert!(config.segment.drop_silent_spans);

        assert_eq!(config.wire.min_chunk_bytes, 20);
        assert_eq!(config.wire.max_chunk_bytes, 1_000_000);
        assert_eq!(config.queue.capacity, 30);
        assert_eq!(config.engine.backend, "whisper");

        config.validate().expect("defaults must validate");
    }

    #[test]
    fn load_from_toml_file() {
        let toml_content = r#"
            [audio]
            sample_rate = 48000
            silence_threshold = 0.05

            [segment]
            chunk_duration_secs = 3.0
            max_span_secs = 20.0

            [queue]
            capacity = 8

            [engine]
            backend = "null"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.audio.silence_threshold, 0.05);
        assert_eq!(config.segment.chunk_duration_secs, 3.0);
        assert_eq!(config.segment.max_span_secs, 20.0);
        // Unspecified fields keep their defaults.
        assert_eq!(config.segment.min_audio_length_secs, 0.8);
        assert_eq!(config.queue.capacity, 8);
        assert_eq!(config.engine.backend, "null");
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"audio = not valid toml").unwrap();

        let err = Config::load(temp_file.path()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(Config::load(Path::new("/nonexistent/voxpipe.toml")).is_err());
    }

    #[test]
    fn env_overrides_take_effect() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_voxpipe_env();

        set_env("VOXPIPE_ENGINE", "null");
        set_env("VOXPIPE_SAMPLE_RATE", "8000");
        set_env("VOXPIPE_QUEUE_CAPACITY", "5");

        let config = Config::default().with_env_overrides();
        assert_eq!(config.engine.backend, "null");
        assert_eq!(config.audio.sample_rate, 8000);
        assert_eq!(config.queue.capacity, 5);

        clear_voxpipe_env();
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_voxpipe_env();

        set_env("VOXPIPE_ENGINE", "");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.engine.backend, "whisper");

        clear_voxpipe_env();
    }

    #[test]
    fn validate_rejects_zero_sample_rate() {
        let mut config = Config::default();
        config.audio.sample_rate = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("audio.sample_rate"));
        assert!(err.is_fatal());
    }

    #[test]
    fn validate_rejects_out_of_range_threshold() {
        let mut config = Config::default();
        config.audio.silence_threshold = 1.5;
        assert!(config.validate().is_err());

        config.audio.silence_threshold = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_queue_capacity() {
        let mut config = Config::default();
        config.queue.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_thresholds() {
        let mut config = Config::default();
        config.segment.hard_ceiling_secs = 1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.wire.max_chunk_bytes = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn pipeline_settings_carry_config_values() {
        let mut config = Config::default();
        config.segment.chunk_duration_secs = 3.0;
        config.queue.capacity = 12;

        let settings = config.pipeline_settings();
        assert_eq!(settings.policy.chunk_duration, Duration::from_secs(3));
        assert_eq!(settings.queue_capacity, 12);
        assert_eq!(settings.policy.sample_rate, 16000);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(config, parsed);
    }
}
