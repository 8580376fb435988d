//! Bounded conversational memory
//!
//! [`TurnStore`] holds the retained transcript and the long-term summary,
//! [`Compactor`] folds older turns into that summary, and [`HistoryFile`]
//! keeps both on disk between sessions.

mod compaction;
mod profile;
mod store;

pub use compaction::{Compaction, Compactor, build_summary_request};
pub use profile::Profile;
pub use store::{HistoryFile, Role, TurnStore, Utterance};

/// Prefix of the system message that carries the long-term summary
pub const SUMMARY_PREFIX: &str = "【長期記憶（要約）】\n";

/// Default transcript for a fresh store
#[must_use]
pub fn default_seed() -> Vec<Utterance> {
    vec![Utterance::system(
        "あなたはセナ。優しく、短めに、わかりやすく日本語で返答します。",
    )]
}
