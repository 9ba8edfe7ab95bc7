//! Recognition engines and the consumer loop that drives them.

pub mod invoker;
pub mod recognizer;
pub mod whisper;

pub use invoker::RecognitionInvoker;
pub use recognizer::{MockRecognizer, NullRecognizer, RecognizedSegment, Recognizer};
pub use whisper::{AUTO_LANGUAGE, WhisperConfig, WhisperRecognizer};
