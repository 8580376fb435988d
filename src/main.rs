use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sena::config::Config;
use sena::daemon::{Daemon, DaemonOptions};
use sena::llm::ChatClient;
use sena::memory::{HistoryFile, Profile, TurnStore, default_seed};
use sena::session::{Session, SessionOptions};
use sena::voice::{
    AudioCapture, AudioDispatcher, AudioPlayback, ListenOptions, Player, SAMPLE_RATE,
    SpeechToText, Synthesizer, VoiceListener, Voicevox, WakeGate, samples_to_wav,
};

/// Sena - voice assistant with long-term conversational memory
#[derive(Parser)]
#[command(name = "sena", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/sena/config.toml)
    #[arg(short, long, env = "SENA_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print replies without speaking them
    #[arg(long)]
    mute: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Chat from the keyboard instead of the microphone
    Chat,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test VOICEVOX synthesis and playback
    TestTts {
        /// Text to speak
        #[arg(default_value = "こんにちは。音声合成のテストだよ。")]
        text: String,
    },
    /// Print the stored long-term summary
    Summary,
    /// Clear the stored conversation
    Reset,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,sena=info",
        1 => "info,sena=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let text_mode = matches!(cli.command, Some(Command::Chat));

    match cli.command {
        Some(Command::TestMic { duration }) => return test_mic(duration).await,
        Some(Command::TestSpeaker) => return test_speaker().await,
        Some(Command::TestTts { text }) => return test_tts(&config, &text).await,
        Some(Command::Summary) => return show_summary(&config),
        Some(Command::Reset) => return reset_history(&config),
        Some(Command::Chat) | None => {}
    }

    let backend = Arc::new(ChatClient::new(
        config.llm.api_key()?,
        &config.llm.base_url,
        &config.llm.model,
        config.llm.timeout,
    )?);

    let profile = Profile::load(&config.memory.profile_path);
    let session = Session::open(
        backend,
        HistoryFile::new(&config.memory.history_path),
        &profile,
        default_seed(),
        SessionOptions {
            keep_last_n: config.memory.keep_last_n,
            max_tokens: Some(config.llm.max_tokens),
        },
    )?;

    let voice = if cli.mute {
        None
    } else {
        Some(spawn_dispatcher(&config)?)
    };

    let gate = WakeGate::new(
        config.voice.wake_tokens.clone(),
        config.voice.stop_tokens.clone(),
    );
    let options = DaemonOptions {
        assistant_name: profile.assistant_name.clone(),
        idle_sleep: config.voice.idle_sleep,
    };
    let mut daemon = Daemon::new(session, gate, voice, options);
    let mut stdout = std::io::stdout();

    let finished = if text_mode {
        tracing::info!(model = %config.llm.model, muted = cli.mute, "starting text chat");
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        tokio::select! {
            result = daemon.run_text(stdin, &mut stdout) => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        }
    } else {
        let stt = SpeechToText::new(
            config.llm.api_key()?,
            &config.llm.base_url,
            &config.voice.stt_model,
            config.voice.stt_language.clone(),
            config.llm.timeout,
        )?;
        let mut listener = VoiceListener::new(
            AudioCapture::new()?,
            stt,
            ListenOptions {
                listen_timeout: config.voice.listen_timeout,
                ..ListenOptions::default()
            },
        );

        tracing::info!(model = %config.llm.model, muted = cli.mute, "starting voice loop");
        tokio::select! {
            result = daemon.run_voice(&mut listener, &mut stdout) => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        }
    };

    match finished {
        Some(result) => {
            result?;
            daemon.shutdown().await;
        }
        None => tracing::info!("interrupted"),
    }

    Ok(())
}

fn spawn_dispatcher(config: &Config) -> anyhow::Result<AudioDispatcher> {
    let synth = Voicevox::new(
        &config.voice.voicevox_url,
        config.voice.speaker,
        config.voice.params,
    );
    let player = AudioPlayback::new()?;
    tracing::debug!(device = player.device_name(), "speech output ready");
    Ok(AudioDispatcher::spawn(Box::new(synth), Box::new(player)))
}

fn show_summary(config: &Config) -> anyhow::Result<()> {
    let store = HistoryFile::new(&config.memory.history_path).load(default_seed())?;

    println!("--- 長期記憶（要約） ---");
    if store.summary().is_empty() {
        println!("(まだ要約は空だよ)");
    } else {
        println!("{}", store.summary());
    }
    println!("----------------------");
    println!("直近の発話: {} 件", store.len());
    Ok(())
}

fn reset_history(config: &Config) -> anyhow::Result<()> {
    let history = HistoryFile::new(&config.memory.history_path);
    history.save(&TurnStore::new(default_seed()))?;
    println!("Cleared {}", history.path().display());
    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;
    println!("Sample rate: {SAMPLE_RATE} Hz");
    println!("---");

    let mut loudest = 0.0_f32;
    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let rms = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        loudest = loudest.max(peak);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (rms * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {rms:.4} | Peak: {peak:.4} | [{meter}]", i + 1);
    }

    capture.stop();

    println!("\n---");
    println!("Loudest peak: {loudest:.4}");
    if loudest < 0.01 {
        println!("Nothing above the noise floor. Check the default input device.");
    }

    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = 24_000_u32;
    let frequency = 440.0_f32;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    let wav = samples_to_wav(&samples, sample_rate)?;
    let mut playback = AudioPlayback::new()?;
    playback.play(&wav).await?;

    println!("If you heard the tone, your speakers are working!");
    Ok(())
}

/// Synthesize one phrase with VOICEVOX and play it
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"");
    println!(
        "Engine: {} (speaker {})\n",
        config.voice.voicevox_url, config.voice.speaker
    );

    let synth = Voicevox::new(
        &config.voice.voicevox_url,
        config.voice.speaker,
        config.voice.params,
    );
    let wav = synth.synthesize(text).await?;
    println!("Got {} bytes of audio", wav.len());

    let mut playback = AudioPlayback::new()?;
    playback.play(&wav).await?;

    println!("If you heard the speech, TTS is working!");
    Ok(())
}
