//! Speech output
//!
//! Statements cut from a response stream are synthesized and played one at a
//! time through a [`SpeechQueue`]. Synthesis and playback sit behind the
//! [`SpeechSynthesizer`] and [`AudioOutput`] traits.

pub mod output;
pub mod queue;
pub mod synth;

use thiserror::Error;

pub use output::{AudioOutput, FileOutput};
#[cfg(feature = "playback")]
pub use output::RodioOutput;
pub use queue::{SpeechEvent, SpeechQueue, SpeechTicket, DEFAULT_SEGMENT_GAP};
pub use synth::{HttpSynthesizer, SpeechSynthesizer};

/// Speech errors
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("Speech request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TTS API error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Audio output failed: {0}")]
    Output(String),

    #[error("Audio file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Speech cancelled")]
    Cancelled,

    #[error("Speech queue is closed")]
    Closed,
}
