//! Audio playback to speakers

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::dispatcher::Player;
use crate::{Error, Result};

/// Decoded mono audio
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Plays WAV buffers on the default output device
pub struct AudioPlayback {
    device_name: String,
}

impl AudioPlayback {
    /// Check that an output device exists
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new() -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;
        let device_name = device.name().unwrap_or_default();

        tracing::debug!(device = %device_name, "audio playback initialized");
        Ok(Self { device_name })
    }

    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

#[async_trait]
impl Player for AudioPlayback {
    async fn play(&mut self, audio: &[u8]) -> Result<()> {
        let clip = decode_wav(audio)?;
        tokio::task::spawn_blocking(move || play_blocking(&clip))
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
    }
}

/// Decode a WAV buffer and mix it down to mono
///
/// # Errors
///
/// Returns error if the buffer is not a readable WAV file
#[allow(clippy::cast_precision_loss)]
pub fn decode_wav(bytes: &[u8]) -> Result<Clip> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>(),
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
        }
    }
    .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?;

    let channels = usize::from(spec.channels.max(1));
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok(Clip {
        samples,
        sample_rate: spec.sample_rate,
    })
}

fn output_config(device: &cpal::Device, sample_rate: u32) -> Result<StreamConfig> {
    let rate = SampleRate(sample_rate);
    let supports = |channels: u16| {
        device.supported_output_configs().ok()?.find(|c| {
            c.channels() == channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
        })
    };

    let supported = supports(1)
        .or_else(|| supports(2))
        .ok_or_else(|| Error::Audio(format!("no output config for {sample_rate} Hz")))?;

    Ok(supported.with_sample_rate(rate).config())
}

/// Shared between the cpal callbacks and the thread waiting on playback
#[derive(Debug, Default)]
struct PlaybackSignal {
    finished: AtomicBool,
    error: Mutex<Option<String>>,
}

impl PlaybackSignal {
    fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    /// Record a stream error; the first one wins
    fn fail(&self, message: String) {
        if let Ok(mut error) = self.error.lock()
            && error.is_none()
        {
            *error = Some(message);
        }
        self.finish();
    }

    /// Block until the clip ends or the stream reports an error
    fn wait(&self, poll: Duration) -> Result<()> {
        while !self.finished.load(Ordering::Acquire) {
            std::thread::sleep(poll);
        }

        match self.error.lock().map(|mut e| e.take()) {
            Ok(None) => Ok(()),
            Ok(Some(message)) => Err(Error::Audio(format!("playback stream failed: {message}"))),
            Err(_) => Err(Error::Audio("playback state poisoned".to_string())),
        }
    }
}

/// Play a clip and block until the last sample has been handed to the device
fn play_blocking(clip: &Clip) -> Result<()> {
    if clip.samples.is_empty() {
        return Ok(());
    }

    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device".to_string()))?;
    let config = output_config(&device, clip.sample_rate)?;
    let channels = usize::from(config.channels);

    let samples = Arc::new(clip.samples.clone());
    let position = Arc::new(AtomicUsize::new(0));
    let signal = Arc::new(PlaybackSignal::default());

    let stream = {
        let samples = Arc::clone(&samples);
        let position = Arc::clone(&position);
        let on_data = Arc::clone(&signal);
        let on_error = Arc::clone(&signal);

        device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let pos = position.load(Ordering::Relaxed);
                        let sample = if let Some(&s) = samples.get(pos) {
                            position.store(pos + 1, Ordering::Relaxed);
                            s
                        } else {
                            on_data.finish();
                            0.0
                        };
                        frame.fill(sample);
                    }
                },
                move |err| {
                    tracing::error!(error = %err, "audio playback error");
                    on_error.fail(err.to_string());
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?
    };

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let outcome = signal.wait(Duration::from_millis(20));
    if outcome.is_ok() {
        // let the device drain its last buffer
        std::thread::sleep(Duration::from_millis(100));
    }

    drop(stream);
    tracing::debug!(
        samples = samples.len(),
        played = position.load(Ordering::Relaxed),
        sample_rate = clip.sample_rate,
        ok = outcome.is_ok(),
        "playback ended"
    );
    outcome
}
