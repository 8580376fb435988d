//! Speech-to-text through a Whisper-compatible transcription endpoint

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::{Error, Result};

#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Transcribes WAV audio
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    language: Option<String>,
    timeout: Duration,
}

impl SpeechToText {
    /// Create a Whisper client
    ///
    /// `language` is an ISO-639-1 hint such as `ja`.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn new(
        api_key: SecretString,
        base_url: impl Into<String>,
        model: impl Into<String>,
        language: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(Error::Config("API key required for transcription".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            language,
            timeout,
        })
    }

    /// Transcribe a WAV buffer, returning the trimmed text
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the call exceeds its deadline, or
    /// [`Error::Stt`] if the backend rejects the audio
    pub async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                stt_error(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await.map_err(stt_error)?;
        let text = result.text.trim().to_string();

        tracing::info!(transcript = %text, "transcription complete");
        Ok(text)
    }
}

fn stt_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("transcription: {e}"))
    } else {
        Error::Stt(e.to_string())
    }
}
