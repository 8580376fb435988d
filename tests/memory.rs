//! Conversation memory integration tests
//!
//! Compaction against a scripted summarizer and history persistence on disk

use sena::memory::{Compactor, HistoryFile, Role, TurnStore, Utterance, default_seed};

mod common;

use common::ScriptedBackend;

fn exchange(n: usize) -> Vec<Utterance> {
    (0..n)
        .map(|i| {
            if i % 2 == 0 {
                Utterance::user(format!("u{i}"))
            } else {
                Utterance::assistant(format!("a{i}"))
            }
        })
        .collect()
}

#[tokio::test]
async fn test_short_transcript_is_left_alone() {
    let backend = ScriptedBackend::new();
    let compactor = Compactor::new(backend.clone());

    let transcript = exchange(10);
    let result = compactor.maybe_compact("前の要約", &transcript, 10).await.unwrap();

    assert!(!result.compacted);
    assert_eq!(result.summary, "前の要約");
    assert_eq!(result.transcript, transcript);
    assert!(backend.completed().is_empty());
}

#[tokio::test]
async fn test_long_transcript_keeps_last_n_verbatim() {
    let backend = ScriptedBackend::new();
    backend.push_summary("  - 猫が好き\n");
    let compactor = Compactor::new(backend.clone());

    let transcript = exchange(13);
    let result = compactor.maybe_compact("", &transcript, 10).await.unwrap();

    assert!(result.compacted);
    assert_eq!(result.summary, "- 猫が好き");
    assert_eq!(result.transcript.len(), 10);
    assert_eq!(result.transcript, transcript[3..].to_vec());

    // exactly one summarizer call, over the three oldest utterances only
    let calls = backend.completed();
    assert_eq!(calls.len(), 1);
    let prompt = &calls[0].turns[1].content;
    assert!(prompt.contains("\"u0\"") && prompt.contains("\"a1\"") && prompt.contains("\"u2\""));
    assert!(!prompt.contains("\"a3\""));
}

#[tokio::test]
async fn test_existing_summary_is_passed_back() {
    let backend = ScriptedBackend::new();
    let compactor = Compactor::new(backend.clone());

    compactor.maybe_compact("好きな色は青", &exchange(4), 2).await.unwrap();

    let prompt = &backend.completed()[0].turns[1].content;
    assert!(prompt.contains("好きな色は青"));
}

#[tokio::test]
async fn test_keep_zero_folds_everything() {
    let backend = ScriptedBackend::new();
    let compactor = Compactor::new(backend.clone());

    let result = compactor.maybe_compact("", &exchange(3), 0).await.unwrap();

    assert!(result.compacted);
    assert!(result.transcript.is_empty());
}

#[tokio::test]
async fn test_summarizer_failure_is_returned() {
    let backend = ScriptedBackend::new();
    backend.push_summary_failure();
    let compactor = Compactor::new(backend.clone());

    let result = compactor.maybe_compact("old", &exchange(5), 2).await;
    assert!(matches!(result, Err(sena::Error::Backend(_))));
}

#[test]
fn test_history_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let history = HistoryFile::new(dir.path().join("nested").join("history.json"));

    let mut store = TurnStore::new(default_seed());
    store.append(Utterance::user("おはよう"));
    store.append(Utterance::assistant("おはよう！"));
    store.replace("朝型".to_string(), store.transcript().to_vec());

    history.save(&store).unwrap();
    let restored = history.load(vec![Utterance::system("other seed")]).unwrap();

    assert_eq!(restored, store);
    assert_eq!(restored.transcript()[0].role, Role::System);
}

#[test]
fn test_save_leaves_no_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let history = HistoryFile::new(dir.path().join("history.json"));

    history.save(&TurnStore::new(default_seed())).unwrap();

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["history.json".to_string()]);
}

#[test]
fn test_missing_history_yields_seed() {
    let dir = tempfile::tempdir().unwrap();
    let history = HistoryFile::new(dir.path().join("absent.json"));

    let store = history.load(default_seed()).unwrap();
    assert_eq!(store, TurnStore::new(default_seed()));
}

#[test]
fn test_corrupt_history_yields_seed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    std::fs::write(&path, "{\"summary\": \"s\", \"transcript\": [{\"role\": \"user\"}]").unwrap();

    let store = HistoryFile::new(&path).load(default_seed()).unwrap();
    assert_eq!(store.summary(), "");
    assert_eq!(store.transcript(), default_seed().as_slice());
}

#[test]
fn test_utterance_without_role_yields_seed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    std::fs::write(&path, r#"{"summary":"","transcript":[{"content":"x"}]}"#).unwrap();

    let store = HistoryFile::new(&path).load(default_seed()).unwrap();
    assert_eq!(store, TurnStore::new(default_seed()));
}

#[test]
fn test_unreadable_history_is_not_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    std::fs::create_dir(&path).unwrap();
    std::fs::write(path.join("keep.txt"), "real history").unwrap();

    let history = HistoryFile::new(&path);
    assert!(matches!(history.load(default_seed()), Err(sena::Error::Io(_))));
    assert_eq!(std::fs::read_to_string(path.join("keep.txt")).unwrap(), "real history");
}
