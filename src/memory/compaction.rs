//! Lossy compaction of the transcript into the running summary

use std::sync::Arc;

use crate::Result;
use crate::llm::{ChatBackend, ChatRequest};
use crate::memory::Utterance;

const SUMMARY_INSTRUCTION: &str = "あなたは会話ログを要約する担当です。\n\
目的: 長期記憶として使える要約を作ること。\n\
制約:\n\
- 日本語で。\n\
- 200〜500文字程度。\n\
- 固有名詞・重要な好み・目標・決定事項・未解決タスクを優先。\n\
- 余計な推測はしない。\n\
- 箇条書き多めで読みやすく。\n";

/// Result of a compaction check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compaction {
    pub summary: String,
    pub transcript: Vec<Utterance>,
    pub compacted: bool,
}

/// Folds everything but the last `keep_last_n` utterances into the summary
///
/// One call makes at most one backend request. Material already in the
/// summary is passed back as text, never re-split.
pub struct Compactor {
    backend: Arc<dyn ChatBackend>,
}

impl Compactor {
    #[must_use]
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    /// Compact when the transcript is longer than `keep_last_n`
    ///
    /// With `keep_last_n == 0` every non-empty transcript is folded in full.
    ///
    /// # Errors
    ///
    /// Returns the backend error unchanged; the inputs are left untouched so
    /// the caller can keep the pre-compaction state
    pub async fn maybe_compact(
        &self,
        summary: &str,
        transcript: &[Utterance],
        keep_last_n: usize,
    ) -> Result<Compaction> {
        if transcript.len() <= keep_last_n {
            return Ok(Compaction {
                summary: summary.to_string(),
                transcript: transcript.to_vec(),
                compacted: false,
            });
        }

        let split = transcript.len() - keep_last_n;
        let (older, recent) = transcript.split_at(split);

        tracing::info!(
            older = older.len(),
            kept = recent.len(),
            "compacting conversation history"
        );

        let request = build_summary_request(summary, older)?;
        let reply = self.backend.complete(&request).await?;

        Ok(Compaction {
            summary: reply.trim().to_string(),
            transcript: recent.to_vec(),
            compacted: true,
        })
    }
}

/// Summarization prompt over the existing summary and the utterances to fold
///
/// # Errors
///
/// Returns error if the utterances cannot be serialized
pub fn build_summary_request(old_summary: &str, older: &[Utterance]) -> Result<ChatRequest> {
    let log = serde_json::to_string(older)?;
    let prompt = format!(
        "これまでの要約（既存）:\n{old_summary}\n\n\
         新しく追加して要約したい過去会話:\n{log}\n\n\
         更新後の要約を作ってください。"
    );

    Ok(ChatRequest::new(vec![
        Utterance::system(SUMMARY_INSTRUCTION),
        Utterance::user(prompt),
    ]))
}
