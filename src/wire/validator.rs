//! Chunk sanity checks and sample decoding.

use crate::defaults::{MAX_CHUNK_BYTES, MIN_CHUNK_BYTES};
use crate::error::{Result, VoxpipeError};
use crate::wire::reader::AudioChunk;

/// Rejects chunks that cannot be valid 16-bit PCM before any decoding
/// happens. Rejection is recoverable: the chunk is discarded and the
/// stream continues at the next frame.
#[derive(Debug, Clone, Copy)]
pub struct ChunkValidator {
    min_bytes: u32,
    max_bytes: u32,
}

impl Default for ChunkValidator {
    fn default() -> Self {
        Self {
            min_bytes: MIN_CHUNK_BYTES,
            max_bytes: MAX_CHUNK_BYTES,
        }
    }
}

impl ChunkValidator {
    pub fn new(min_bytes: u32, max_bytes: u32) -> Self {
        Self { min_bytes, max_bytes }
    }

    /// Checks the declared length bounds and sample alignment.
    pub fn validate(&self, chunk: &AudioChunk) -> Result<()> {
        if chunk.declared_len < self.min_bytes {
            return Err(VoxpipeError::Validation {
                message: format!(
                    "chunk of {} bytes is below the {}-byte minimum",
                    chunk.declared_len, self.min_bytes
                ),
            });
        }
        if chunk.declared_len > self.max_bytes {
            return Err(VoxpipeError::Validation {
                message: format!(
                    "chunk of {} bytes exceeds the {}-byte maximum",
                    chunk.declared_len, self.max_bytes
                ),
            });
        }
        if chunk.declared_len % 2 != 0 {
            return Err(VoxpipeError::Validation {
                message: format!(
                    "chunk of {} bytes is not aligned to 16-bit samples",
                    chunk.declared_len
                ),
            });
        }
        Ok(())
    }
}

/// Decodes little-endian i16 PCM into normalized f32 samples in [-1.0, 1.0).
pub fn decode_samples(payload: &[u8]) -> Vec<f32> {
    payload
        .chunks_exact(2)
        .map(|pair| {
            let sample = i16::from_le_bytes([pair[0], pair[1]]);
            f32::from(sample) / 32768.0
        })
        .collect()
}
