//! TOML configuration file loading
//!
//! Supports `~/.config/sena/config.toml` as a persistent config source.
//! Every field is optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::voice::VoiceParams;
use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub llm: LlmFileConfig,

    #[serde(default)]
    pub memory: MemoryFileConfig,

    #[serde(default)]
    pub voice: VoiceFileConfig,
}

/// Chat-completion settings
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// OpenAI-compatible API root (e.g. "https://api.openai.com/v1")
    pub base_url: Option<String>,

    /// Model identifier (e.g. "gpt-4o-mini")
    pub model: Option<String>,

    /// Reply length cap
    pub max_tokens: Option<u32>,

    /// Network timeout for each request, in seconds
    pub timeout_secs: Option<u64>,
}

/// Conversation memory settings
#[derive(Debug, Default, Deserialize)]
pub struct MemoryFileConfig {
    pub history_path: Option<PathBuf>,
    pub profile_path: Option<PathBuf>,

    /// Utterances kept verbatim after compaction
    pub keep_last_n: Option<usize>,
}

/// Voice pipeline settings
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// VOICEVOX engine URL
    pub voicevox_url: Option<String>,

    /// VOICEVOX speaker id
    pub speaker: Option<u32>,

    pub speed: Option<f32>,
    pub pause: Option<f32>,
    #[serde(rename = "pauseScale", alias = "pause_scale")]
    pub pause_scale: Option<f32>,

    /// Transcription model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// Transcription language hint (e.g. "ja")
    pub stt_language: Option<String>,

    /// Seconds to wait for speech before a listen call times out
    pub listen_timeout_secs: Option<u64>,

    pub wake_tokens: Option<Vec<String>>,
    pub stop_tokens: Option<Vec<String>>,

    /// Fall asleep after this many seconds without being addressed
    pub idle_sleep_secs: Option<u64>,
}

impl VoiceFileConfig {
    /// Overlay the prosody fields on `base`
    #[must_use]
    pub fn voice_params(&self, base: VoiceParams) -> VoiceParams {
        VoiceParams {
            speed: self.speed.unwrap_or(base.speed),
            pause: self.pause.unwrap_or(base.pause),
            pause_scale: self.pause_scale.unwrap_or(base.pause_scale),
        }
    }
}

/// Load the TOML config file
///
/// With an explicit path the file must exist and parse. The standard path
/// is optional: a missing file yields defaults and a broken one is logged
/// and ignored.
///
/// # Errors
///
/// Returns error if an explicitly given file cannot be read or parsed
pub fn load_config_file(explicit: Option<&Path>) -> Result<ConfigFile> {
    if let Some(path) = explicit {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(ConfigFile::default());
    };

    if !path.exists() {
        return Ok(ConfigFile::default());
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                Ok(config)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                Ok(ConfigFile::default())
            }
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read config file");
            Ok(ConfigFile::default())
        }
    }
}

/// Return the config file path: `~/.config/sena/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("sena").join("config.toml"))
}
