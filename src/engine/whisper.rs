//! Whisper-based recognition engine.
//!
//! # Feature Gate
//!
//! This module requires the `whisper` feature to be enabled and cmake to be
//! installed. To build with Whisper support:
//!
//! ```bash
//! cargo build --features whisper
//! ```

use std::path::PathBuf;

use crate::engine::recognizer::{RecognizedSegment, Recognizer};
use crate::error::{Result, VoxpipeError};

#[cfg(feature = "whisper")]
use std::sync::{Mutex, Once};
#[cfg(feature = "whisper")]
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, install_logging_hooks,
};

#[cfg(feature = "whisper")]
static LOGGING_HOOKS_INSTALLED: Once = Once::new();

/// Language code meaning "let the model detect the language".
pub const AUTO_LANGUAGE: &str = "auto";

/// Configuration for the Whisper engine.
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    /// Path to the ggml model file
    pub model_path: PathBuf,
    /// Language code (e.g., "en", "es") or [`AUTO_LANGUAGE`]
    pub language: String,
    /// Number of threads for inference (None = auto-detect)
    pub threads: Option<usize>,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/ggml-base.bin"),
            language: AUTO_LANGUAGE.to_string(),
            threads: None,
        }
    }
}

/// Whisper-based recognizer. The context is wrapped in a Mutex because
/// whisper state creation needs exclusive access.
#[cfg(feature = "whisper")]
pub struct WhisperRecognizer {
    context: Mutex<WhisperContext>,
    config: WhisperConfig,
    model_name: String,
}

#[cfg(feature = "whisper")]
impl std::fmt::Debug for WhisperRecognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperRecognizer")
            .field("config", &self.config)
            .field("model_name", &self.model_name)
            .field("context", &"<WhisperContext>")
            .finish()
    }
}

/// Whisper-based recognizer placeholder (without the whisper feature).
///
/// Constructs if the model file exists, but `warm_up()` fails so the
/// pipeline never reports ready with a non-functional engine.
#[cfg(not(feature = "whisper"))]
#[derive(Debug)]
pub struct WhisperRecognizer {
    config: WhisperConfig,
    model_name: String,
}

fn model_name_of(path: &std::path::Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(feature = "whisper")]
impl WhisperRecognizer {
    /// Loads the model. Fails with a `Startup` error when the model file is
    /// missing or unloadable.
    pub fn new(config: WhisperConfig) -> Result<Self> {
        // Install logging hooks to suppress whisper.cpp output (only once)
        LOGGING_HOOKS_INSTALLED.call_once(|| {
            install_logging_hooks();
        });

        if !config.model_path.exists() {
            return Err(VoxpipeError::Startup {
                message: format!("model not found: {}", config.model_path.display()),
            });
        }

        let model_name = model_name_of(&config.model_path);

        let mut context_params = WhisperContextParameters::default();
        context_params.flash_attn(true);
        let context = WhisperContext::new_with_params(
            config.model_path.to_str().ok_or_else(|| VoxpipeError::Startup {
                message: "invalid UTF-8 in model path".to_string(),
            })?,
            context_params,
        )
        .map_err(|e| VoxpipeError::Startup {
            message: format!("failed to load Whisper model: {e}"),
        })?;

        Ok(Self {
            context: Mutex::new(context),
            config,
            model_name,
        })
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }
}

#[cfg(not(feature = "whisper"))]
impl WhisperRecognizer {
    pub fn new(config: WhisperConfig) -> Result<Self> {
        if !config.model_path.exists() {
            return Err(VoxpipeError::Startup {
                message: format!("model not found: {}", config.model_path.display()),
            });
        }
        let model_name = model_name_of(&config.model_path);
        Ok(Self { config, model_name })
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }
}

#[cfg(feature = "whisper")]
impl Recognizer for WhisperRecognizer {
    fn recognize(&self, samples: &[f32], _sample_rate: u32) -> Result<Vec<RecognizedSegment>> {
        let context = self.context.lock().map_err(|e| VoxpipeError::Other(format!(
            "failed to acquire context lock: {e}"
        )))?;

        let mut state = context.create_state().map_err(|e| VoxpipeError::Other(format!(
            "failed to create Whisper state: {e}"
        )))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

        if self.config.language == AUTO_LANGUAGE {
            params.set_language(None);
        } else {
            params.set_language(Some(&self.config.language));
        }

        if let Some(threads) = self.config.threads {
            params.set_n_threads(threads as i32);
        }

        // Our stdout carries the event stream; nothing may print there.
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, samples)
            .map_err(|e| VoxpipeError::Other(format!("Whisper inference failed: {e}")))?;

        let mut segments = Vec::new();
        for segment in state.as_iter() {
            let text = segment.to_string().trim().to_string();
            if text.is_empty() {
                continue;
            }
            // Timestamps are centiseconds from span start.
            segments.push(RecognizedSegment {
                text,
                confidence: Some((1.0 - segment.no_speech_probability()).clamp(0.0, 1.0)),
                start: Some(segment.start_timestamp() as f32 / 100.0),
                end: Some(segment.end_timestamp() as f32 / 100.0),
                provisional: false,
            });
        }
        Ok(segments)
    }

    fn warm_up(&self) -> Result<()> {
        // One short inference so model problems surface before readiness.
        let silence = vec![0.0f32; 16000];
        self.recognize(&silence, 16000)
            .map(|_| ())
            .map_err(|e| VoxpipeError::Startup {
                message: format!("warm-up inference failed: {e}"),
            })
    }

    fn engine_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        true
    }
}

#[cfg(not(feature = "whisper"))]
impl Recognizer for WhisperRecognizer {
    fn recognize(&self, _samples: &[f32], _sample_rate: u32) -> Result<Vec<RecognizedSegment>> {
        Err(VoxpipeError::Other(
            "whisper feature not enabled; rebuild with --features whisper".to_string(),
        ))
    }

    fn warm_up(&self) -> Result<()> {
        Err(VoxpipeError::Startup {
            message: concat!(
                "this binary was built without Whisper support.\n",
                "To fix: cargo build --release --features whisper\n",
                "If the build fails with cmake errors, install: sudo apt install cmake"
            )
            .to_string(),
        })
    }

    fn engine_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        false
    }
}
