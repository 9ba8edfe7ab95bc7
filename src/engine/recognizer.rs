//! The recognition engine seam.
//!
//! Everything upstream treats the engine as an opaque capability behind the
//! [`Recognizer`] trait, which allows swapping implementations (real
//! Whisper, the null engine, mocks).

use std::sync::Arc;

use crate::error::{Result, VoxpipeError};

/// One recognized segment of speech within a span.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedSegment {
    pub text: String,
    /// Engine confidence in [0.0, 1.0], when the engine reports one.
    pub confidence: Option<f32>,
    /// Segment start offset within the span, in seconds.
    pub start: Option<f32>,
    /// Segment end offset within the span, in seconds.
    pub end: Option<f32>,
    /// True for an interim hypothesis that later output may revise.
    pub provisional: bool,
}

impl RecognizedSegment {
    /// A plain final segment with just text.
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: None,
            start: None,
            end: None,
            provisional: false,
        }
    }

    /// An interim hypothesis with just text.
    pub fn partial_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: None,
            start: None,
            end: None,
            provisional: true,
        }
    }
}

/// Trait for speech recognition engines.
pub trait Recognizer: Send + Sync {
    /// Recognizes one span of normalized f32 mono audio.
    ///
    /// An empty result means the engine heard nothing worth reporting; it
    /// is not an error.
    fn recognize(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<RecognizedSegment>>;

    /// One-time initialization before the pipeline reports ready. Failures
    /// here are fatal startup errors.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }

    /// Name of the engine or loaded model.
    fn engine_name(&self) -> &str;

    /// Whether the engine can accept work.
    fn is_ready(&self) -> bool;
}

/// Implement Recognizer for Arc<T> so one engine can be shared.
impl<T: Recognizer + ?Sized> Recognizer for Arc<T> {
    fn recognize(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<RecognizedSegment>> {
        (**self).recognize(samples, sample_rate)
    }

    fn warm_up(&self) -> Result<()> {
        (**self).warm_up()
    }

    fn engine_name(&self) -> &str {
        (**self).engine_name()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}

/// Engine that accepts every span and recognizes nothing. Exercises the
/// whole pipeline without a model.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRecognizer;

impl Recognizer for NullRecognizer {
    fn recognize(&self, _samples: &[f32], _sample_rate: u32) -> Result<Vec<RecognizedSegment>> {
        Ok(Vec::new())
    }

    fn engine_name(&self) -> &str {
        "null"
    }

    fn is_ready(&self) -> bool {
        true
    }
}

/// Mock recognizer for testing.
#[derive(Debug, Clone)]
pub struct MockRecognizer {
    engine_name: String,
    segments: Vec<RecognizedSegment>,
    should_fail: bool,
    warm_up_fails: bool,
}

impl MockRecognizer {
    /// Creates a mock that returns no segments.
    pub fn new(engine_name: &str) -> Self {
        Self {
            engine_name: engine_name.to_string(),
            segments: Vec::new(),
            should_fail: false,
            warm_up_fails: false,
        }
    }

    /// Configure the mock to return one final segment with this text.
    pub fn with_text(mut self, text: &str) -> Self {
        self.segments = vec![RecognizedSegment::final_text(text)];
        self
    }

    /// Configure the mock to return these exact segments.
    pub fn with_segments(mut self, segments: Vec<RecognizedSegment>) -> Self {
        self.segments = segments;
        self
    }

    /// Configure the mock to fail every recognize call.
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Configure the mock to fail warm-up.
    pub fn with_warm_up_failure(mut self) -> Self {
        self.warm_up_fails = true;
        self
    }
}

impl Recognizer for MockRecognizer {
    fn recognize(&self, _samples: &[f32], _sample_rate: u32) -> Result<Vec<RecognizedSegment>> {
        if self.should_fail {
            Err(VoxpipeError::Other("mock recognition failure".to_string()))
        } else {
            Ok(self.segments.clone())
        }
    }

    fn warm_up(&self) -> Result<()> {
        if self.warm_up_fails {
            Err(VoxpipeError::Startup {
                message: "mock warm-up failure".to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn engine_name(&self) -> &str {
        &self.engine_name
    }

    fn is_ready(&self) -> bool {
        !self.should_fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_recognizer_accepts_everything() {
        let engine = NullRecognizer;
        assert!(engine.is_ready());
        assert_eq!(engine.recognize(&[0.5; 16000], 16000).unwrap(), vec![]);
        assert_eq!(engine.recognize(&[], 16000).unwrap(), vec![]);
    }

    #[test]
    fn mock_returns_configured_text() {
        let engine = MockRecognizer::new("test-model").with_text("hello world");
        let segments = engine.recognize(&[0.1; 100], 16000).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "hello world");
        assert!(!segments[0].provisional);
    }

    #[test]
    fn mock_returns_error_when_configured() {
        let engine = MockRecognizer::new("test-model").with_failure();
        assert!(engine.recognize(&[0.1; 100], 16000).is_err());
        assert!(!engine.is_ready());
    }

    #[test]
    fn mock_warm_up_failure_is_fatal() {
        let engine = MockRecognizer::new("test-model").with_warm_up_failure();
        let err = engine.warm_up().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn recognizer_trait_is_object_safe() {
        let engine: Box<dyn Recognizer> =
            Box::new(MockRecognizer::new("boxed").with_text("boxed test"));
        assert_eq!(engine.engine_name(), "boxed");
        let segments = engine.recognize(&[0.0; 10], 16000).unwrap();
        assert_eq!(segments[0].text, "boxed test");
    }

    #[test]
    fn arc_forwards_to_inner_recognizer() {
        let engine = Arc::new(MockRecognizer::new("shared").with_text("shared"));
        let clone = Arc::clone(&engine);
        assert_eq!(clone.engine_name(), "shared");
        assert_eq!(clone.recognize(&[0.0; 10], 16000).unwrap().len(), 1);
    }

    #[test]
    fn segment_constructors_set_provisional_flag() {
        assert!(!RecognizedSegment::final_text("a").provisional);
        assert!(RecognizedSegment::partial_text("a").provisional);
    }
}
