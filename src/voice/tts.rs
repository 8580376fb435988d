//! Text-to-speech through a VOICEVOX engine

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::dispatcher::Synthesizer;
use crate::{Error, Result};

const QUERY_TIMEOUT: Duration = Duration::from_secs(15);
const SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(30);

/// Prosody overrides applied to every audio query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VoiceParams {
    /// Playback rate multiplier
    pub speed: f32,
    /// Base pause between phrases, in seconds
    pub pause: f32,
    /// Pause duration multiplier
    pub pause_scale: f32,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            speed: 1.15,
            pause: 0.12,
            pause_scale: 0.7,
        }
    }
}

impl VoiceParams {
    fn apply(self, query: &mut serde_json::Value) -> Result<()> {
        let fields = query
            .as_object_mut()
            .ok_or_else(|| Error::Tts("audio query is not an object".to_string()))?;
        fields.insert("speedScale".to_string(), self.speed.into());
        fields.insert("pauseLength".to_string(), self.pause.into());
        fields.insert("pauseLengthScale".to_string(), self.pause_scale.into());
        Ok(())
    }
}

/// VOICEVOX engine client
pub struct Voicevox {
    client: reqwest::Client,
    base_url: String,
    speaker: u32,
    params: VoiceParams,
}

impl Voicevox {
    #[must_use]
    pub fn new(base_url: impl Into<String>, speaker: u32, params: VoiceParams) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            speaker,
            params,
        }
    }

    #[must_use]
    pub const fn speaker(&self) -> u32 {
        self.speaker
    }

    async fn audio_query(&self, text: &str) -> Result<serde_json::Value> {
        let speaker = self.speaker.to_string();
        let response = self
            .client
            .post(format!("{}/audio_query", self.base_url))
            .query(&[("text", text), ("speaker", speaker.as_str())])
            .timeout(QUERY_TIMEOUT)
            .send()
            .await
            .map_err(tts_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("audio_query error {status}: {body}")));
        }

        response.json().await.map_err(tts_error)
    }
}

#[async_trait]
impl Synthesizer for Voicevox {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        tracing::debug!(speaker = self.speaker, chars = text.chars().count(), "synthesizing");

        let mut query = self.audio_query(text).await?;
        self.params.apply(&mut query)?;

        let response = self
            .client
            .post(format!("{}/synthesis", self.base_url))
            .query(&[("speaker", self.speaker)])
            .json(&query)
            .timeout(SYNTHESIS_TIMEOUT)
            .send()
            .await
            .map_err(tts_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("synthesis error {status}: {body}")));
        }

        let audio = response.bytes().await.map_err(tts_error)?;
        Ok(audio.to_vec())
    }
}

fn tts_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("VOICEVOX: {e}"))
    } else {
        Error::Tts(e.to_string())
    }
}
