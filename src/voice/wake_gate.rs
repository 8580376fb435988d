//! Wake-word gate over transcribed text
//!
//! The gate is pure: the caller owns [`WakeState`], passes it in with each
//! transcript and keeps the state handed back.

use std::time::{Duration, Instant};

/// Accepted spellings of the assistant's name
pub const DEFAULT_WAKE_TOKENS: &[&str] = &[
    "セナ", "せな", "瀬名", "聖奈", "星奈", "せいな", "せーな", "セーナ",
];

/// Any transcript containing one of these ends the session
pub const DEFAULT_STOP_TOKENS: &[&str] = &["終了", "ストップ", "やめ", "やめて"];

const SEPARATORS: &[char] = &['、', ',', ' ', '\u{3000}'];

/// Whether the assistant is currently listening without being called
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WakeState {
    pub awake: bool,
    pub last_awake: Option<Instant>,
}

impl WakeState {
    #[must_use]
    pub const fn asleep() -> Self {
        Self {
            awake: false,
            last_awake: None,
        }
    }

    /// Fall asleep when nothing has kept the session awake for `window`
    #[must_use]
    pub fn expire_if_idle(self, now: Instant, window: Duration) -> Self {
        match self.last_awake {
            Some(at) if self.awake && now.saturating_duration_since(at) >= window => {
                tracing::debug!(idle_secs = window.as_secs(), "wake state expired");
                Self {
                    awake: false,
                    last_awake: self.last_awake,
                }
            }
            _ => self,
        }
    }

    const fn woken(now: Instant) -> Self {
        Self {
            awake: true,
            last_awake: Some(now),
        }
    }
}

/// What the caller should do with a transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// The assistant was called by name with nothing else
    WakeOnly,
    /// End the session
    Stop,
    /// Not addressed to the assistant
    Ignore,
    /// Conversational text for the model
    Converse(String),
}

/// Classifies transcripts into directives
#[derive(Debug, Clone)]
pub struct WakeGate {
    wake_tokens: Vec<String>,
    stop_tokens: Vec<String>,
}

impl Default for WakeGate {
    fn default() -> Self {
        Self::new(
            DEFAULT_WAKE_TOKENS.iter().map(ToString::to_string).collect(),
            DEFAULT_STOP_TOKENS.iter().map(ToString::to_string).collect(),
        )
    }
}

impl WakeGate {
    #[must_use]
    pub fn new(wake_tokens: Vec<String>, stop_tokens: Vec<String>) -> Self {
        let mut wake_tokens: Vec<String> = wake_tokens
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        // longest first so prefix matching picks the fullest spelling
        wake_tokens.sort_by_key(|t| std::cmp::Reverse(t.len()));

        let stop_tokens = stop_tokens
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        Self {
            wake_tokens,
            stop_tokens,
        }
    }

    #[must_use]
    pub fn wake_tokens(&self) -> &[String] {
        &self.wake_tokens
    }

    /// Classify one transcript
    ///
    /// Rules apply in order: a bare wake token, then any stop token, then a
    /// wake token followed by the request, then the current state decides.
    #[must_use]
    pub fn classify(
        &self,
        state: WakeState,
        transcript: &str,
        now: Instant,
    ) -> (WakeState, Directive) {
        let text = transcript.trim();

        if self.wake_tokens.iter().any(|w| w == text) {
            tracing::info!(transcript = text, "woken by name");
            return (WakeState::woken(now), Directive::WakeOnly);
        }

        if let Some(stop) = self.stop_tokens.iter().find(|s| text.contains(s.as_str())) {
            tracing::info!(stop = %stop, "stop word heard");
            return (
                WakeState {
                    awake: false,
                    last_awake: state.last_awake,
                },
                Directive::Stop,
            );
        }

        if let Some(rest) = self.strip_wake_token(text) {
            let request = rest.trim_start_matches(SEPARATORS).trim();
            tracing::info!(request, "woken with request");
            let directive = if request.is_empty() {
                Directive::WakeOnly
            } else {
                Directive::Converse(request.to_string())
            };
            return (WakeState::woken(now), directive);
        }

        if state.awake {
            (WakeState::woken(now), Directive::Converse(text.to_string()))
        } else {
            tracing::debug!(transcript = text, "asleep, ignoring");
            (state, Directive::Ignore)
        }
    }

    fn strip_wake_token<'a>(&self, text: &'a str) -> Option<&'a str> {
        self.wake_tokens
            .iter()
            .find_map(|w| text.strip_prefix(w.as_str()))
    }
}
