//! Shared test utilities
//!
//! Scripted stand-ins for the model, the synthesizer, the speaker and the
//! microphone, so whole turns run without network or audio hardware.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;

use sena::llm::{ChatBackend, ChatRequest, DeltaStream};
use sena::memory::{HistoryFile, Profile, Utterance, default_seed};
use sena::session::{Session, SessionOptions};
use sena::voice::{Listener, Player, Synthesizer};
use sena::{CaptureError, Error, Result};

/// One scripted streaming reply
pub enum Reply {
    /// Deltas delivered in order
    Deltas(Vec<&'static str>),
    /// Deltas followed by a mid-stream failure
    FailAfter(Vec<&'static str>),
    /// The request itself is refused
    Refused,
}

/// Chat backend that replays queued replies and records every request
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Reply>>,
    summaries: Mutex<VecDeque<Result<String>>>,
    streamed: Mutex<Vec<ChatRequest>>,
    completed: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_reply(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn push_summary(&self, summary: &str) {
        self.summaries
            .lock()
            .unwrap()
            .push_back(Ok(summary.to_string()));
    }

    pub fn push_summary_failure(&self) {
        self.summaries
            .lock()
            .unwrap()
            .push_back(Err(Error::Backend("summarizer down".to_string())));
    }

    /// Requests sent to `stream`, oldest first
    pub fn streamed(&self) -> Vec<ChatRequest> {
        self.streamed.lock().unwrap().clone()
    }

    /// Requests sent to `complete`, oldest first
    pub fn completed(&self) -> Vec<ChatRequest> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        self.completed.lock().unwrap().push(request.clone());
        self.summaries
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("要約".to_string()))
    }

    async fn stream(&self, request: &ChatRequest) -> Result<DeltaStream> {
        self.streamed.lock().unwrap().push(request.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Deltas(vec!["はい。"]));

        match reply {
            Reply::Deltas(deltas) => {
                let items: Vec<Result<String>> =
                    deltas.into_iter().map(|d| Ok(d.to_string())).collect();
                Ok(Box::pin(stream::iter(items)))
            }
            Reply::FailAfter(deltas) => {
                let mut items: Vec<Result<String>> =
                    deltas.into_iter().map(|d| Ok(d.to_string())).collect();
                items.push(Err(Error::Backend("stream dropped".to_string())));
                Ok(Box::pin(stream::iter(items)))
            }
            Reply::Refused => Err(Error::Backend("503 Service Unavailable".to_string())),
        }
    }
}

/// What reached the speaker
pub type PlayLog = Arc<Mutex<Vec<String>>>;

/// Synthesizer whose "audio" is the UTF-8 text itself
#[derive(Default)]
pub struct RecordingSynth {
    delays: HashMap<String, Duration>,
    failing: Vec<String>,
}

impl RecordingSynth {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make synthesis of `text` take `delay`
    #[must_use]
    pub fn slow_on(mut self, text: &str, delay: Duration) -> Self {
        self.delays.insert(text.to_string(), delay);
        self
    }

    /// Make synthesis of `text` fail
    #[must_use]
    pub fn fail_on(mut self, text: &str) -> Self {
        self.failing.push(text.to_string());
        self
    }
}

#[async_trait]
impl Synthesizer for RecordingSynth {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if let Some(delay) = self.delays.get(text) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.iter().any(|f| f == text) {
            return Err(Error::Tts(format!("cannot synthesize {text}")));
        }
        Ok(text.as_bytes().to_vec())
    }
}

/// Player that appends each decoded clip to a shared log
pub struct RecordingPlayer {
    log: PlayLog,
    failing: Vec<String>,
}

impl RecordingPlayer {
    #[must_use]
    pub fn new() -> (Self, PlayLog) {
        let log = PlayLog::default();
        (
            Self {
                log: Arc::clone(&log),
                failing: Vec::new(),
            },
            log,
        )
    }

    /// Make playback of `text` fail as a device fault would
    #[must_use]
    pub fn fail_on(mut self, text: &str) -> Self {
        self.failing.push(text.to_string());
        self
    }
}

#[async_trait]
impl Player for RecordingPlayer {
    async fn play(&mut self, audio: &[u8]) -> Result<()> {
        let text = String::from_utf8_lossy(audio).into_owned();
        if self.failing.contains(&text) {
            return Err(Error::Audio(format!("playback stream failed on {text}")));
        }
        self.log.lock().unwrap().push(text);
        Ok(())
    }
}

/// One scripted listen result
pub enum Heard {
    Text(&'static str),
    Silence,
    Fault,
}

/// Listener that replays a fixed script and then says "exit"
pub struct ScriptedListener {
    script: VecDeque<Heard>,
}

impl ScriptedListener {
    #[must_use]
    pub fn new(script: Vec<Heard>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

#[async_trait(?Send)]
impl Listener for ScriptedListener {
    async fn listen(&mut self) -> std::result::Result<String, CaptureError> {
        match self.script.pop_front() {
            Some(Heard::Text(text)) => Ok(text.to_string()),
            Some(Heard::Silence) => Err(CaptureError::Timeout),
            Some(Heard::Fault) => Err(CaptureError::Failed(Error::Audio(
                "device unplugged".to_string(),
            ))),
            None => Ok("exit".to_string()),
        }
    }
}

/// Session over a scripted backend with its history in `dir`
pub fn open_session(
    backend: Arc<ScriptedBackend>,
    dir: &std::path::Path,
    keep_last_n: usize,
) -> Session {
    Session::open(
        backend,
        HistoryFile::new(dir.join("history.json")),
        &Profile::default(),
        default_seed(),
        SessionOptions {
            keep_last_n,
            max_tokens: Some(140),
        },
    )
    .unwrap()
}

/// Contents of a request, role name and text per turn
pub fn turns_of(request: &ChatRequest) -> Vec<(&'static str, String)> {
    request
        .turns
        .iter()
        .map(|u: &Utterance| (u.role.as_str(), u.content.clone()))
        .collect()
}
