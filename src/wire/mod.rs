//! Wire protocol: length-prefixed PCM frames over a byte stream.

pub mod reader;
pub mod source;
pub mod validator;

pub use reader::{AudioChunk, FrameEvent, FrameReader};
pub use source::{ByteSource, ReadOutcome, ThreadedByteSource};
pub use validator::{ChunkValidator, decode_samples};
