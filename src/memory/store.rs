//! Short-term transcript and long-term summary
//!
//! The transcript grows by one utterance per user or assistant turn and is
//! only shortened by the compactor. The whole store is written to disk after
//! every turn.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Speaker of an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Wire name used by chat-completion APIs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One role-tagged message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub role: Role,
    pub content: String,
}

impl Utterance {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// On-disk shape of the store
///
/// Both fields are required; `messages` is accepted for history files
/// written by older builds.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedState {
    summary: String,
    #[serde(alias = "messages")]
    transcript: Vec<Utterance>,
}

/// Conversation memory: running summary plus the retained transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnStore {
    summary: String,
    transcript: Vec<Utterance>,
}

impl TurnStore {
    /// Fresh store seeded with the default transcript and an empty summary
    #[must_use]
    pub fn new(seed: Vec<Utterance>) -> Self {
        Self {
            summary: String::new(),
            transcript: seed,
        }
    }

    /// Rebuild a store from previously saved parts
    #[must_use]
    pub const fn from_parts(summary: String, transcript: Vec<Utterance>) -> Self {
        Self {
            summary,
            transcript,
        }
    }

    /// Push an utterance to the end of the transcript
    ///
    /// No size policy is applied here; see [`crate::memory::Compactor`].
    pub fn append(&mut self, utterance: Utterance) {
        self.transcript.push(utterance);
    }

    #[must_use]
    pub fn summary(&self) -> &str {
        &self.summary
    }

    #[must_use]
    pub fn transcript(&self) -> &[Utterance] {
        &self.transcript
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.transcript.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transcript.is_empty()
    }

    /// Copy of `(summary, transcript)` for persistence or compaction
    #[must_use]
    pub fn snapshot(&self) -> (String, Vec<Utterance>) {
        (self.summary.clone(), self.transcript.clone())
    }

    /// Replace both halves, typically with the output of a compaction
    pub fn replace(&mut self, summary: String, transcript: Vec<Utterance>) {
        self.summary = summary;
        self.transcript = transcript;
    }

    /// Clear the summary and reseed the transcript
    pub fn reset(&mut self, seed: Vec<Utterance>) {
        self.summary.clear();
        self.transcript = seed;
    }

    /// Serialize the store as pretty-printed UTF-8 JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<String> {
        let state = PersistedState {
            summary: self.summary.clone(),
            transcript: self.transcript.clone(),
        };
        Ok(serde_json::to_string_pretty(&state)?)
    }

    /// Strictly parse a persisted record
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedState`] on any structural violation,
    /// including a single utterance with a missing or mistyped field
    pub fn try_from_json(raw: &str) -> Result<Self> {
        let state: PersistedState =
            serde_json::from_str(raw).map_err(|e| Error::MalformedState(e.to_string()))?;
        Ok(Self::from_parts(state.summary, state.transcript))
    }

    /// Parse a persisted record, falling back to a fresh store
    ///
    /// Recovery is all-or-nothing: a corrupt record is discarded entirely.
    #[must_use]
    pub fn from_json_or(raw: &str, seed: Vec<Utterance>) -> Self {
        match Self::try_from_json(raw) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(error = %e, "discarding persisted history");
                Self::new(seed)
            }
        }
    }
}

/// JSON file that holds the store between sessions
#[derive(Debug, Clone)]
pub struct HistoryFile {
    path: PathBuf,
}

impl HistoryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the store, or a fresh one seeded with `seed`
    ///
    /// A missing or malformed file yields the seed. A file that exists but
    /// cannot be read is an error, so a later save never overwrites history
    /// that was only temporarily unreadable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file exists but cannot be read
    pub fn load(&self, seed: Vec<Utterance>) -> Result<TurnStore> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => {
                let store = TurnStore::from_json_or(&raw, seed);
                tracing::debug!(
                    path = %self.path.display(),
                    utterances = store.len(),
                    has_summary = !store.summary().is_empty(),
                    "history loaded"
                );
                Ok(store)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no history yet");
                Ok(TurnStore::new(seed))
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "failed to read history");
                Err(e.into())
            }
        }
    }

    /// Write the store to disk
    ///
    /// The record is written to a sibling temp file and renamed over the
    /// target so an interrupted save never leaves a truncated history.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn save(&self, store: &TurnStore) -> Result<()> {
        let text = store.to_json()?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::trace!(path = %self.path.display(), utterances = store.len(), "history saved");
        Ok(())
    }
}
