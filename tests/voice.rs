//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::time::{Duration, Instant};

use sena::voice::{
    AudioDispatcher, DetectorState, Directive, SAMPLE_RATE, SpeechSegmenter, UtteranceDetector,
    WakeGate, WakeState, decode_wav, samples_to_wav,
};

mod common;

use common::{RecordingPlayer, RecordingSynth};

/// Generate sine wave audio samples
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn generate_silence(duration_secs: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

#[tokio::test]
async fn test_dispatcher_plays_in_queue_order() {
    let synth = RecordingSynth::new().slow_on("A。", Duration::from_millis(150));
    let (player, log) = RecordingPlayer::new();
    let dispatcher = AudioDispatcher::spawn(Box::new(synth), Box::new(player));

    let started = Instant::now();
    dispatcher.enqueue("A。");
    dispatcher.enqueue("B。");
    dispatcher.enqueue("C。");
    // enqueue never waits on synthesis
    assert!(started.elapsed() < Duration::from_millis(100));

    dispatcher.wait_idle().await;
    assert_eq!(*log.lock().unwrap(), vec!["A。", "B。", "C。"]);

    dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_dispatcher_skips_failed_segment() {
    let synth = RecordingSynth::new().fail_on("B。");
    let (player, log) = RecordingPlayer::new();
    let dispatcher = AudioDispatcher::spawn(Box::new(synth), Box::new(player));

    for text in ["A。", "B。", "C。"] {
        dispatcher.enqueue(text);
    }
    dispatcher.shutdown().await;

    assert_eq!(*log.lock().unwrap(), vec!["A。", "C。"]);
}

#[tokio::test]
async fn test_dispatcher_survives_playback_fault() {
    let (player, log) = RecordingPlayer::new();
    let player = player.fail_on("B。");
    let dispatcher = AudioDispatcher::spawn(Box::new(RecordingSynth::new()), Box::new(player));

    for text in ["A。", "B。", "C。"] {
        dispatcher.enqueue(text);
    }
    tokio::time::timeout(Duration::from_secs(1), dispatcher.wait_idle())
        .await
        .expect("worker should move past a failed clip");
    assert_eq!(*log.lock().unwrap(), vec!["A。", "C。"]);

    dispatcher.enqueue("D。");
    dispatcher.shutdown().await;
    assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("D。"));
}

#[tokio::test]
async fn test_dispatcher_drops_blank_segments() {
    let (player, log) = RecordingPlayer::new();
    let dispatcher = AudioDispatcher::spawn(Box::new(RecordingSynth::new()), Box::new(player));

    dispatcher.enqueue("  ");
    dispatcher.enqueue("\n");
    dispatcher.enqueue(" やあ。 ");
    dispatcher.shutdown().await;

    assert_eq!(*log.lock().unwrap(), vec!["やあ。"]);
}

#[tokio::test]
async fn test_wait_idle_on_empty_queue_returns() {
    let (player, _log) = RecordingPlayer::new();
    let dispatcher = AudioDispatcher::spawn(Box::new(RecordingSynth::new()), Box::new(player));

    tokio::time::timeout(Duration::from_secs(1), dispatcher.wait_idle())
        .await
        .expect("idle dispatcher should not block");
    dispatcher.shutdown().await;
}

#[test]
fn test_segmenter_splits_streamed_reply() {
    let mut segmenter = SpeechSegmenter::default();

    let mut spoken = Vec::new();
    for delta in ["今日は", "晴れ。明日", "は雨かも", "！", "傘を"] {
        if let Some(segment) = segmenter.push(delta) {
            spoken.push(segment);
        }
    }
    assert_eq!(segmenter.pending(), "傘を");
    spoken.extend(segmenter.finish());

    assert_eq!(spoken, vec!["今日は晴れ。", "明日は雨かも！", "傘を"]);
    assert_eq!(spoken.concat(), "今日は晴れ。明日は雨かも！傘を");
}

#[test]
fn test_wake_gate_conversation_flow() {
    let gate = WakeGate::default();
    let now = Instant::now();

    let (state, directive) = gate.classify(WakeState::asleep(), "今日は暑いね", now);
    assert_eq!(directive, Directive::Ignore);
    assert!(!state.awake);

    let (state, directive) = gate.classify(state, "セナ", now);
    assert_eq!(directive, Directive::WakeOnly);
    assert!(state.awake);

    let (state, directive) = gate.classify(state, "明日の天気は？", now);
    assert_eq!(directive, Directive::Converse("明日の天気は？".to_string()));

    let (state, directive) = gate.classify(state, "ストップ", now);
    assert_eq!(directive, Directive::Stop);
    assert!(!state.awake);
}

#[test]
fn test_wake_gate_custom_tokens() {
    let gate = WakeGate::new(vec!["ねえ".to_string()], vec!["おしまい".to_string()]);
    let now = Instant::now();

    let (_, directive) = gate.classify(WakeState::asleep(), "ねえ、音楽かけて", now);
    assert_eq!(directive, Directive::Converse("音楽かけて".to_string()));

    let (_, directive) = gate.classify(WakeState::asleep(), "セナ", now);
    assert_eq!(directive, Directive::Ignore);

    let (_, directive) = gate.classify(WakeState::asleep(), "もうおしまい", now);
    assert_eq!(directive, Directive::Stop);
}

#[test]
fn test_detector_full_utterance() {
    let mut detector = UtteranceDetector::new(0.03);
    let speech = generate_sine_samples(440.0, 0.6, 0.5);
    let silence = generate_silence(0.6);

    let mut complete = false;
    for frame in speech.chunks(480).chain(silence.chunks(480)) {
        if detector.process(frame) {
            complete = true;
            break;
        }
    }

    assert!(complete);
    assert!(detector.buffered() >= speech.len());
    let utterance = detector.take_utterance();
    assert!(!utterance.is_empty());
    assert_eq!(detector.state(), DetectorState::Idle);
}

#[test]
fn test_detector_ignores_silence() {
    let mut detector = UtteranceDetector::new(0.03);
    for frame in generate_silence(1.0).chunks(480) {
        assert!(!detector.process(frame));
    }
    assert_eq!(detector.state(), DetectorState::Idle);
}

#[test]
fn test_captured_audio_decodes_for_playback() {
    let samples = generate_sine_samples(440.0, 0.1, 0.3);
    let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    let clip = decode_wav(&wav).unwrap();
    assert_eq!(clip.sample_rate, SAMPLE_RATE);
    assert_eq!(clip.samples.len(), samples.len());
}
