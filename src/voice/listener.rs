//! Utterance capture: microphone, energy endpointing, transcription

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
use super::stt::SpeechToText;
use crate::{CaptureError, Error};

/// Default RMS energy above which a frame counts as speech
pub const DEFAULT_ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum amount of speech for an utterance (0.3 s)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Trailing silence that ends an utterance (0.5 s)
const SILENCE_SAMPLES: usize = 8000;

/// Analysis frame (30 ms)
const FRAME_SAMPLES: usize = 480;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Source of user transcripts
#[async_trait(?Send)]
pub trait Listener {
    /// Block until the user has said something
    ///
    /// # Errors
    ///
    /// Returns a miss ([`CaptureError::Timeout`] or
    /// [`CaptureError::NoSpeechDetected`]) when nothing usable was heard, or
    /// [`CaptureError::Failed`] on a device or backend fault
    async fn listen(&mut self) -> std::result::Result<String, CaptureError>;
}

/// Phase of the endpoint detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for speech
    Idle,
    /// Speech started, accumulating until trailing silence
    Speaking,
}

/// Energy-based end-of-utterance detector
///
/// Starts on the first loud frame and completes once at least
/// [`MIN_SPEECH_SAMPLES`] have been buffered and the speaker has been quiet
/// for [`SILENCE_SAMPLES`]. A blip followed by long silence is discarded.
#[derive(Debug)]
pub struct UtteranceDetector {
    threshold: f32,
    state: DetectorState,
    speech_buffer: Vec<f32>,
    silence_counter: usize,
}

impl UtteranceDetector {
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self {
            threshold,
            state: DetectorState::Idle,
            speech_buffer: Vec::new(),
            silence_counter: 0,
        }
    }

    /// Feed one frame, returning true when an utterance is complete
    pub fn process(&mut self, samples: &[f32]) -> bool {
        let energy = calculate_energy(samples);
        let is_speech = energy > self.threshold;

        match self.state {
            DetectorState::Idle => {
                if is_speech {
                    self.state = DetectorState::Speaking;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech started");
                }
                false
            }
            DetectorState::Speaking => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                if self.silence_counter > SILENCE_SAMPLES
                    && self.speech_buffer.len() > MIN_SPEECH_SAMPLES + self.silence_counter
                {
                    tracing::debug!(samples = self.speech_buffer.len(), "utterance complete");
                    return true;
                }

                if self.silence_counter > SILENCE_SAMPLES {
                    tracing::trace!("too short, discarding");
                    self.reset();
                }
                false
            }
        }
    }

    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }

    #[must_use]
    pub fn buffered(&self) -> usize {
        self.speech_buffer.len()
    }

    /// Take the captured utterance and go back to idle
    pub fn take_utterance(&mut self) -> Vec<f32> {
        let utterance = std::mem::take(&mut self.speech_buffer);
        self.reset();
        utterance
    }

    pub fn reset(&mut self) {
        self.state = DetectorState::Idle;
        self.speech_buffer.clear();
        self.silence_counter = 0;
    }
}

/// Root mean square of a frame
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Limits for one listen call
#[derive(Debug, Clone, Copy)]
pub struct ListenOptions {
    /// How long to wait for speech to start
    pub listen_timeout: Duration,
    /// Hard cap on a single utterance
    pub max_utterance: Duration,
    pub energy_threshold: f32,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self {
            listen_timeout: Duration::from_secs(30),
            max_utterance: Duration::from_secs(20),
            energy_threshold: DEFAULT_ENERGY_THRESHOLD,
        }
    }
}

/// Microphone listener backed by Whisper
pub struct VoiceListener {
    capture: AudioCapture,
    detector: UtteranceDetector,
    stt: SpeechToText,
    options: ListenOptions,
}

impl VoiceListener {
    #[must_use]
    pub fn new(capture: AudioCapture, stt: SpeechToText, options: ListenOptions) -> Self {
        Self {
            capture,
            detector: UtteranceDetector::new(options.energy_threshold),
            stt,
            options,
        }
    }

    async fn record_utterance(&mut self) -> std::result::Result<Vec<f32>, CaptureError> {
        self.detector.reset();
        self.capture.clear_buffer();
        self.capture.start()?;

        let started = Instant::now();
        let mut pending: Vec<f32> = Vec::new();
        let mut ticker = tokio::time::interval(POLL_INTERVAL);

        let outcome = loop {
            ticker.tick().await;
            pending.extend(self.capture.take_buffer());

            let whole = pending.len() - pending.len() % FRAME_SAMPLES;
            let complete = pending
                .drain(..whole)
                .collect::<Vec<_>>()
                .chunks(FRAME_SAMPLES)
                .any(|frame| self.detector.process(frame));
            if complete {
                break Ok(self.detector.take_utterance());
            }

            let elapsed = started.elapsed();
            match self.detector.state() {
                DetectorState::Idle if elapsed >= self.options.listen_timeout => {
                    break Err(CaptureError::Timeout);
                }
                DetectorState::Speaking if self.utterance_too_long() => {
                    tracing::debug!("utterance hit length cap");
                    break Ok(self.detector.take_utterance());
                }
                _ => {}
            }
        };

        self.capture.stop();
        outcome
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn utterance_too_long(&self) -> bool {
        let cap = (self.options.max_utterance.as_secs_f64() * f64::from(SAMPLE_RATE)) as usize;
        self.detector.buffered() >= cap
    }
}

#[async_trait(?Send)]
impl Listener for VoiceListener {
    async fn listen(&mut self) -> std::result::Result<String, CaptureError> {
        let utterance = self.record_utterance().await?;
        let wav = samples_to_wav(&utterance, SAMPLE_RATE)?;

        let text = match self.stt.transcribe(&wav).await {
            Ok(text) => text,
            Err(Error::Timeout(e)) => {
                tracing::debug!(error = %e, "transcription timed out");
                return Err(CaptureError::Timeout);
            }
            Err(e) => return Err(e.into()),
        };

        if text.is_empty() {
            Err(CaptureError::NoSpeechDetected)
        } else {
            Ok(text)
        }
    }
}
