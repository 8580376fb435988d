//! One conversation: memory, request assembly and the per-turn pipeline

use std::sync::Arc;

use futures::StreamExt;

use crate::Result;
use crate::llm::{ChatBackend, ChatRequest};
use crate::memory::{
    Compactor, HistoryFile, Profile, Role, SUMMARY_PREFIX, TurnStore, Utterance,
};
use crate::voice::{AudioDispatcher, SpeechSegmenter};

/// Directives typed or spoken outside the wake gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Persist and end the session
    Exit,
    /// Clear summary and transcript back to defaults
    Reset,
    /// Show the long-term summary
    Summary,
}

impl SessionCommand {
    /// Match the whole input, ignoring case and surrounding whitespace
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "exit" | "quit" | "q" => Some(Self::Exit),
            "reset" => Some(Self::Reset),
            "summary" => Some(Self::Summary),
            _ => None,
        }
    }
}

/// Per-session tuning
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Utterances kept verbatim by compaction
    pub keep_last_n: usize,
    /// Reply length cap
    pub max_tokens: Option<u32>,
}

/// What a completed turn produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub reply: String,
    pub segments: usize,
    pub compacted: bool,
}

/// A running conversation
pub struct Session {
    store: TurnStore,
    history: HistoryFile,
    compactor: Compactor,
    backend: Arc<dyn ChatBackend>,
    directive: String,
    seed: Vec<Utterance>,
    options: SessionOptions,
}

impl Session {
    /// Open a session, restoring whatever `history` holds
    ///
    /// # Errors
    ///
    /// Returns error if the history file exists but cannot be read
    pub fn open(
        backend: Arc<dyn ChatBackend>,
        history: HistoryFile,
        profile: &Profile,
        seed: Vec<Utterance>,
        options: SessionOptions,
    ) -> Result<Self> {
        let store = history.load(seed.clone())?;
        tracing::info!(
            utterances = store.len(),
            has_summary = !store.summary().is_empty(),
            "session opened"
        );

        Ok(Self {
            store,
            history,
            compactor: Compactor::new(Arc::clone(&backend)),
            backend,
            directive: profile.system_directive(),
            seed,
            options,
        })
    }

    #[must_use]
    pub const fn store(&self) -> &TurnStore {
        &self.store
    }

    #[must_use]
    pub fn summary(&self) -> &str {
        self.store.summary()
    }

    /// Model request for the current memory
    ///
    /// Profile directive, then the summary if there is one, then the
    /// transcript without its leading system utterance.
    #[must_use]
    pub fn build_request(&self) -> ChatRequest {
        let transcript = self.store.transcript();
        let body = match transcript.first() {
            Some(first) if first.role == Role::System => &transcript[1..],
            _ => transcript,
        };

        let mut turns = Vec::with_capacity(body.len() + 2);
        turns.push(Utterance::system(self.directive.clone()));
        if !self.store.summary().is_empty() {
            turns.push(Utterance::system(format!(
                "{SUMMARY_PREFIX}{}",
                self.store.summary()
            )));
        }
        turns.extend_from_slice(body);

        let request = ChatRequest::new(turns);
        match self.options.max_tokens {
            Some(max) => request.with_max_tokens(max),
            None => request,
        }
    }

    /// Run one conversational turn
    ///
    /// Each reply delta is handed to `on_delta` as it arrives and every
    /// completed sentence is queued on `voice`. On error the memory is rolled
    /// back to where it was before the turn; sentences already queued are
    /// still spoken.
    ///
    /// # Errors
    ///
    /// Returns the backend error that abandoned the turn
    pub async fn respond<F>(
        &mut self,
        user_text: &str,
        voice: Option<&AudioDispatcher>,
        on_delta: F,
    ) -> Result<TurnOutcome>
    where
        F: FnMut(&str),
    {
        let checkpoint = self.store.clone();

        match self.run_turn(user_text, voice, on_delta).await {
            Ok(outcome) => {
                if let Err(e) = self.persist() {
                    tracing::error!(error = %e, "failed to save history");
                }
                tracing::info!(
                    segments = outcome.segments,
                    compacted = outcome.compacted,
                    "turn complete"
                );
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(error = %e, "turn abandoned, memory unchanged");
                self.store = checkpoint;
                Err(e)
            }
        }
    }

    async fn run_turn<F>(
        &mut self,
        user_text: &str,
        voice: Option<&AudioDispatcher>,
        mut on_delta: F,
    ) -> Result<TurnOutcome>
    where
        F: FnMut(&str),
    {
        self.store.append(Utterance::user(user_text));
        let compacted_before = self.compact().await?;

        let request = self.build_request();
        let mut stream = self.backend.stream(&request).await?;

        let mut segmenter = SpeechSegmenter::default();
        let mut reply = String::new();
        let mut segments = 0;

        while let Some(delta) = stream.next().await {
            let delta = delta?;
            on_delta(&delta);
            reply.push_str(&delta);

            if let Some(segment) = segmenter.push(&delta) {
                speak(voice, segment);
                segments += 1;
            }
        }
        if let Some(segment) = segmenter.finish() {
            speak(voice, segment);
            segments += 1;
        }

        self.store.append(Utterance::assistant(reply.clone()));
        let compacted_after = self.compact().await?;

        Ok(TurnOutcome {
            reply,
            segments,
            compacted: compacted_before || compacted_after,
        })
    }

    async fn compact(&mut self) -> Result<bool> {
        let compaction = self
            .compactor
            .maybe_compact(
                self.store.summary(),
                self.store.transcript(),
                self.options.keep_last_n,
            )
            .await?;

        if compaction.compacted {
            self.store.replace(compaction.summary, compaction.transcript);
        }
        Ok(compaction.compacted)
    }

    /// Clear memory back to the seed and save
    ///
    /// # Errors
    ///
    /// Returns error if the history file cannot be written
    pub fn reset(&mut self) -> Result<()> {
        self.store.reset(self.seed.clone());
        tracing::info!("conversation reset");
        self.persist()
    }

    /// Save memory to the history file
    ///
    /// # Errors
    ///
    /// Returns error if the history file cannot be written
    pub fn persist(&self) -> Result<()> {
        self.history.save(&self.store)
    }
}

fn speak(voice: Option<&AudioDispatcher>, segment: String) {
    if let Some(dispatcher) = voice {
        dispatcher.enqueue(segment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_match_whole_input_only() {
        assert_eq!(SessionCommand::parse("EXIT"), Some(SessionCommand::Exit));
        assert_eq!(SessionCommand::parse(" quit "), Some(SessionCommand::Exit));
        assert_eq!(SessionCommand::parse("q"), Some(SessionCommand::Exit));
        assert_eq!(SessionCommand::parse("Reset"), Some(SessionCommand::Reset));
        assert_eq!(SessionCommand::parse("summary"), Some(SessionCommand::Summary));
        assert_eq!(SessionCommand::parse("summary please"), None);
        assert_eq!(SessionCommand::parse("セナ、reset"), None);
    }
}
