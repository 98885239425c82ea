//! Speech queue
//!
//! A single worker task speaks queued statements strictly in order: synthesize,
//! play, pause, next. [`SpeechQueue::stop`] bumps an epoch counter; every task
//! queued under an older epoch resolves as cancelled and the statement in
//! flight is abandoned at once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, Notify};

use crate::speech::{AudioOutput, SpeechError, SpeechSynthesizer};

/// Pause between consecutive statements
pub const DEFAULT_SEGMENT_GAP: Duration = Duration::from_millis(500);

const EVENT_CAPACITY: usize = 64;

/// Playback progress, broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    Started { text: String },
    Finished { text: String },
    /// Nothing is playing and nothing is queued
    Idle,
}

type Outcome = Result<(), SpeechError>;

struct Task {
    text: String,
    epoch: u64,
    done: oneshot::Sender<Outcome>,
}

struct Shared {
    epoch: AtomicU64,
    cancel: Notify,
    output: Arc<dyn AudioOutput>,
    events: broadcast::Sender<SpeechEvent>,
}

impl Shared {
    fn emit(&self, event: SpeechEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Resolves once the epoch moves past `epoch`
    async fn cancelled(&self, epoch: u64) {
        loop {
            let notified = self.cancel.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return;
            }
            notified.await;
        }
    }
}

/// Resolves when a queued statement has been spoken, failed or was cancelled
#[derive(Debug)]
pub struct SpeechTicket {
    rx: oneshot::Receiver<Outcome>,
}

impl SpeechTicket {
    fn resolved(outcome: Outcome) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Self { rx }
    }

    pub async fn wait(self) -> Outcome {
        self.rx.await.unwrap_or(Err(SpeechError::Closed))
    }
}

/// Sequential speech queue
///
/// Must be created inside a tokio runtime. The worker exits once every
/// handle to the queue is dropped and the remaining statements are done.
#[derive(Clone)]
pub struct SpeechQueue {
    tx: mpsc::UnboundedSender<Task>,
    shared: Arc<Shared>,
}

impl SpeechQueue {
    pub fn new(synth: Arc<dyn SpeechSynthesizer>, output: Arc<dyn AudioOutput>) -> Self {
        Self::with_gap(synth, output, DEFAULT_SEGMENT_GAP)
    }

    pub fn with_gap(
        synth: Arc<dyn SpeechSynthesizer>,
        output: Arc<dyn AudioOutput>,
        gap: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Arc::new(Shared {
            epoch: AtomicU64::new(0),
            cancel: Notify::new(),
            output,
            events,
        });
        tokio::spawn(run_worker(rx, synth, shared.clone(), gap));
        Self { tx, shared }
    }

    /// Queue `text` behind everything already queued
    ///
    /// Blank text is not spoken; its ticket resolves right away.
    pub fn enqueue(&self, text: impl Into<String>) -> SpeechTicket {
        let text = text.into();
        if text.trim().is_empty() {
            return SpeechTicket::resolved(Ok(()));
        }
        let (done, rx) = oneshot::channel();
        let task = Task {
            text,
            epoch: self.shared.epoch.load(Ordering::SeqCst),
            done,
        };
        // A closed channel drops the task, and the ticket reports Closed.
        let _ = self.tx.send(task);
        SpeechTicket { rx }
    }

    /// Drop everything queued and cut off the statement being spoken
    ///
    /// The queue accepts new statements immediately afterwards.
    pub fn stop(&self) {
        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.cancel.notify_waiters();
        self.shared.output.stop();
        tracing::debug!("Speech queue stopped, epoch {}", epoch);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SpeechEvent> {
        self.shared.events.subscribe()
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<Task>,
    synth: Arc<dyn SpeechSynthesizer>,
    shared: Arc<Shared>,
    gap: Duration,
) {
    let mut spoke_last = false;

    while let Some(task) = rx.recv().await {
        let outcome = if task.epoch != shared.epoch.load(Ordering::SeqCst) {
            Err(SpeechError::Cancelled)
        } else {
            let pause = if spoke_last { gap } else { Duration::ZERO };
            tokio::select! {
                outcome = speak(&*synth, &shared, &task.text, pause) => outcome,
                _ = shared.cancelled(task.epoch) => Err(SpeechError::Cancelled),
            }
        };

        match &outcome {
            Ok(()) => spoke_last = true,
            Err(SpeechError::Cancelled) => spoke_last = false,
            Err(e) => {
                tracing::warn!("Failed to speak statement: {}", e);
                spoke_last = false;
            }
        }
        let _ = task.done.send(outcome);

        if rx.is_empty() {
            spoke_last = false;
            shared.emit(SpeechEvent::Idle);
        }
    }
}

async fn speak(
    synth: &dyn SpeechSynthesizer,
    shared: &Shared,
    text: &str,
    pause: Duration,
) -> Outcome {
    if !pause.is_zero() {
        tokio::time::sleep(pause).await;
    }
    let audio = synth.synthesize(text).await?;
    shared.emit(SpeechEvent::Started {
        text: text.to_string(),
    });
    shared.output.play(audio, text).await?;
    shared.emit(SpeechEvent::Finished {
        text: text.to_string(),
    });
    Ok(())
}
