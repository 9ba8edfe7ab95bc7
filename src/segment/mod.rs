//! Segmentation of the decoded sample stream into recognition spans.

pub mod buffer;
pub mod span;

pub use buffer::{SegmentPolicy, SegmentationBuffer};
pub use span::{CutReason, ReadySpan};
