//! Streaming text processing
//!
//! Incremental decoding and segmentation of generated text.

pub mod decoder;
pub mod segmenter;
pub mod text_stream;

pub use segmenter::{speech_text, SegmentMode, Segmenter};
pub use text_stream::{stream_to_text, text_stream, StreamHandler};
