//! Background speech worker
//!
//! Segments are synthesized and played strictly one at a time, in the order
//! they were queued. The producer never waits on audio.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::Result;

/// Text-to-speech backend
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Render `text` to an audio buffer
    ///
    /// # Errors
    ///
    /// Returns error if the backend call fails
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Audio output
#[async_trait]
pub trait Player: Send {
    /// Play one buffer to completion
    ///
    /// # Errors
    ///
    /// Returns error if the buffer cannot be decoded or the device fails
    async fn play(&mut self, audio: &[u8]) -> Result<()>;
}

enum Job {
    Speak(String),
    Barrier(oneshot::Sender<()>),
}

/// FIFO queue feeding a single synthesize-then-play worker
pub struct AudioDispatcher {
    tx: mpsc::UnboundedSender<Job>,
    worker: JoinHandle<()>,
}

impl AudioDispatcher {
    /// Start the worker on the current tokio runtime
    #[must_use]
    pub fn spawn(synth: Box<dyn Synthesizer>, player: Box<dyn Player>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(rx, synth, player));
        tracing::debug!("audio worker started");
        Self { tx, worker }
    }

    /// Queue a segment for playback and return immediately
    pub fn enqueue(&self, text: impl Into<String>) {
        let text = text.into();
        tracing::trace!(text = %text, "segment queued");
        if self.tx.send(Job::Speak(text)).is_err() {
            tracing::warn!("audio worker has stopped, dropping segment");
        }
    }

    /// Wait until everything queued so far has been played
    pub async fn wait_idle(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Job::Barrier(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Close the queue, let the worker drain it, and wait for it to exit
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            tracing::warn!(error = %e, "audio worker ended abnormally");
        }
        tracing::debug!("audio worker stopped");
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<Job>,
    synth: Box<dyn Synthesizer>,
    mut player: Box<dyn Player>,
) {
    while let Some(job) = rx.recv().await {
        match job {
            Job::Speak(text) => speak(synth.as_ref(), player.as_mut(), &text).await,
            Job::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
}

async fn speak(synth: &dyn Synthesizer, player: &mut dyn Player, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        tracing::debug!("empty segment, skipping TTS");
        return;
    }

    let audio = match synth.synthesize(text).await {
        Ok(audio) => audio,
        Err(e) => {
            tracing::warn!(error = %e, text, "synthesis failed, skipping segment");
            return;
        }
    };

    if let Err(e) = player.play(&audio).await {
        tracing::warn!(error = %e, text, "playback failed, skipping segment");
    }
}
