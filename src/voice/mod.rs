//! Streaming voice pipeline
//!
//! Transcripts pass through the [`WakeGate`]; replies are cut into sentences
//! by the [`SpeechSegmenter`] and spoken by the [`AudioDispatcher`] worker.

mod capture;
mod dispatcher;
mod listener;
mod playback;
mod segmenter;
mod stt;
mod tts;
mod wake_gate;

pub use capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
pub use dispatcher::{AudioDispatcher, Player, Synthesizer};
pub use listener::{
    DEFAULT_ENERGY_THRESHOLD, DetectorState, ListenOptions, Listener, UtteranceDetector,
    VoiceListener,
};
pub use playback::{AudioPlayback, Clip, decode_wav};
pub use segmenter::{DEFAULT_DELIMITERS, SpeechSegmenter};
pub use stt::SpeechToText;
pub use tts::{VoiceParams, Voicevox};
pub use wake_gate::{DEFAULT_STOP_TOKENS, DEFAULT_WAKE_TOKENS, Directive, WakeGate, WakeState};
