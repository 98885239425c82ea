//! Audio outputs

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::speech::SpeechError;

/// Plays encoded audio
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Play `audio` to the end; `text` is what it says
    async fn play(&self, audio: Vec<u8>, text: &str) -> Result<(), SpeechError>;

    /// Halt whatever is playing right now
    fn stop(&self);
}

/// Writes each segment to a numbered file instead of playing it
#[derive(Debug)]
pub struct FileOutput {
    dir: PathBuf,
    extension: String,
    next: AtomicUsize,
    written: Mutex<Vec<PathBuf>>,
}

impl FileOutput {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
            next: AtomicUsize::new(1),
            written: Mutex::new(Vec::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files written so far, in order
    pub fn written(&self) -> Vec<PathBuf> {
        self.written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AudioOutput for FileOutput {
    async fn play(&self, audio: Vec<u8>, text: &str) -> Result<(), SpeechError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        let path = self
            .dir
            .join(format!("segment-{:04}.{}", index, self.extension));
        tokio::fs::write(&path, &audio).await?;
        tracing::debug!("Wrote {:?} ({} bytes): {}", path, audio.len(), text.trim());
        self.written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path);
        Ok(())
    }

    fn stop(&self) {}
}

/// The sink currently playing, shared by `play` and `stop`
///
/// `stop` bumps the generation so a sink installed by a `play` that started
/// before the stop is halted as soon as it lands.
#[cfg_attr(not(feature = "playback"), allow(dead_code))]
struct PlaybackSlot<T> {
    current: Mutex<Option<Arc<T>>>,
    generation: AtomicU64,
}

#[cfg_attr(not(feature = "playback"), allow(dead_code))]
impl<T> PlaybackSlot<T> {
    fn new() -> Self {
        Self {
            current: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<T>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Make `sink` current; false if a stop happened since `generation`
    fn install(&self, sink: Arc<T>, generation: u64) -> bool {
        let mut current = self.lock();
        *current = Some(sink);
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Clear the slot, but only if it still holds `sink`
    fn release(&self, sink: &Arc<T>) {
        let mut current = self.lock();
        if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, sink)) {
            *current = None;
        }
    }

    fn stop(&self) -> Option<Arc<T>> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.lock().take()
    }
}

#[cfg(feature = "playback")]
pub use playback::RodioOutput;

#[cfg(feature = "playback")]
mod playback {
    use std::io::Cursor;
    use std::sync::Arc;

    use async_trait::async_trait;
    use rodio::{OutputStreamBuilder, Sink};

    use super::{AudioOutput, PlaybackSlot};
    use crate::speech::SpeechError;

    /// Plays through the default output device
    pub struct RodioOutput {
        current: Arc<PlaybackSlot<Sink>>,
        volume: f32,
    }

    impl RodioOutput {
        pub fn new() -> Self {
            Self {
                current: Arc::new(PlaybackSlot::new()),
                volume: 1.0,
            }
        }

        pub fn with_volume(mut self, volume: f32) -> Self {
            self.volume = volume.clamp(0.0, 1.0);
            self
        }
    }

    impl Default for RodioOutput {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl AudioOutput for RodioOutput {
        async fn play(&self, audio: Vec<u8>, _text: &str) -> Result<(), SpeechError> {
            let current = self.current.clone();
            let volume = self.volume;
            let generation = current.generation();

            // The output stream is not Send; it lives and dies on this thread.
            tokio::task::spawn_blocking(move || {
                let stream = OutputStreamBuilder::from_default_device()
                    .and_then(|builder| builder.open_stream())
                    .map_err(|e| SpeechError::Output(format!("Failed to open audio stream: {}", e)))?;
                let sink = rodio::play(stream.mixer(), Cursor::new(audio))
                    .map_err(|e| SpeechError::Output(format!("Failed to play audio: {}", e)))?;
                sink.set_volume(volume);

                let sink = Arc::new(sink);
                if !current.install(sink.clone(), generation) {
                    sink.stop();
                }
                sink.sleep_until_end();
                current.release(&sink);
                Ok(())
            })
            .await
            .map_err(|e| SpeechError::Output(format!("Playback task failed: {}", e)))?
        }

        fn stop(&self) {
            if let Some(sink) = self.current.stop() {
                sink.stop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_output_numbers_segments() {
        let dir = tempfile::tempdir().unwrap();
        let output = FileOutput::new(dir.path().join("audio"), "mp3");

        output.play(b"first".to_vec(), "One.").await.unwrap();
        output.play(b"second".to_vec(), "Two.").await.unwrap();

        let written = output.written();
        assert_eq!(written.len(), 2);
        assert!(written[0].ends_with("segment-0001.mp3"));
        assert!(written[1].ends_with("segment-0002.mp3"));
        assert_eq!(std::fs::read(&written[1]).unwrap(), b"second");
    }

    #[test]
    fn test_finished_playback_leaves_newer_sink() {
        let slot = PlaybackSlot::new();
        let first = Arc::new("first");
        assert!(slot.install(first.clone(), slot.generation()));
        assert!(slot.stop().is_some_and(|s| Arc::ptr_eq(&s, &first)));

        let second = Arc::new("second");
        assert!(slot.install(second.clone(), slot.generation()));
        // The stopped playback finishes after the next one started
        slot.release(&first);

        assert!(slot.stop().is_some_and(|s| Arc::ptr_eq(&s, &second)));
        assert!(slot.stop().is_none());
    }

    #[test]
    fn test_stop_before_install_halts_new_sink() {
        let slot = PlaybackSlot::new();
        let generation = slot.generation();
        assert!(slot.stop().is_none());
        assert!(!slot.install(Arc::new(1u8), generation));
    }

    #[test]
    fn test_release_clears_own_sink() {
        let slot = PlaybackSlot::new();
        let sink = Arc::new(1u8);
        assert!(slot.install(sink.clone(), slot.generation()));
        slot.release(&sink);
        assert!(slot.stop().is_none());
    }
}
