//! Sena - wake-word voice companion with long-term memory
//!
//! This library provides the core functionality for Sena:
//! - Bounded conversational memory with summarization of older turns
//! - Streaming chat completion against an OpenAI-compatible API
//! - Voice processing (wake gate, STT, sentence segmentation, VOICEVOX TTS)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Interfaces                        │
//! │         Microphone loop   │   Text REPL              │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                   Session                            │
//! │   TurnStore  │  Compactor  │  Segmenter  │ Dispatcher│
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │              External services                       │
//! │   Chat completion  │  Transcription  │  VOICEVOX     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod daemon;
pub mod error;
pub mod llm;
pub mod memory;
pub mod session;
pub mod voice;

pub use config::Config;
pub use daemon::{Daemon, DaemonOptions};
pub use error::{CaptureError, Error, Result};
pub use llm::{ChatBackend, ChatClient, ChatRequest, DeltaStream};
pub use memory::{Compactor, HistoryFile, Profile, Role, TurnStore, Utterance};
pub use session::{Session, SessionCommand, SessionOptions, TurnOutcome};
pub use voice::{AudioDispatcher, Directive, SpeechSegmenter, WakeGate, WakeState};
