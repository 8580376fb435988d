//! Configuration management for Sena
//!
//! Precedence, lowest first: built-in defaults, the TOML file, environment
//! variables.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::voice::{DEFAULT_STOP_TOKENS, DEFAULT_WAKE_TOKENS, VoiceParams};
use crate::{Error, Result};

pub use file::{ConfigFile, config_file_path, load_config_file};

/// Sena configuration
#[derive(Debug)]
pub struct Config {
    pub llm: LlmConfig,
    pub memory: MemoryConfig,
    pub voice: VoiceConfig,
}

/// Chat-completion configuration
#[derive(Debug)]
pub struct LlmConfig {
    /// API key (from `OPENAI_API_KEY`)
    api_key: Option<SecretString>,

    /// OpenAI-compatible API root
    pub base_url: String,

    /// Model identifier for replies and summaries
    pub model: String,

    /// Reply length cap; summaries are uncapped
    pub max_tokens: u32,

    /// Timeout for each network call
    pub timeout: Duration,
}

impl LlmConfig {
    /// A fresh handle on the API key for a client
    ///
    /// # Errors
    ///
    /// Returns error if `OPENAI_API_KEY` was not set
    pub fn api_key(&self) -> Result<SecretString> {
        self.api_key
            .as_ref()
            .map(|key| SecretString::from(key.expose_secret().to_string()))
            .ok_or_else(|| Error::Config("OPENAI_API_KEY is not set".to_string()))
    }
}

/// Conversation memory configuration
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub history_path: PathBuf,
    pub profile_path: PathBuf,
    pub keep_last_n: usize,
}

/// Voice pipeline configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub voicevox_url: String,
    pub speaker: u32,
    pub params: VoiceParams,
    pub stt_model: String,
    pub stt_language: Option<String>,
    pub listen_timeout: Duration,
    pub wake_tokens: Vec<String>,
    pub stop_tokens: Vec<String>,

    /// Auto-sleep window; `None` keeps the session awake until told to stop
    pub idle_sleep: Option<Duration>,
}

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_MAX_TOKENS: u32 = 140;
const DEFAULT_KEEP_LAST_N: usize = 10;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_VOICEVOX_URL: &str = "http://127.0.0.1:50021";
const DEFAULT_SPEAKER: u32 = 1;
const DEFAULT_STT_MODEL: &str = "whisper-1";
const DEFAULT_STT_LANGUAGE: &str = "ja";
const DEFAULT_LISTEN_TIMEOUT_SECS: u64 = 30;

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// A `.env` file in the working directory is read first.
    ///
    /// # Errors
    ///
    /// Returns error if a variable does not parse or an explicit config file
    /// cannot be loaded
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }

        let fc = load_config_file(config_path)?;
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Assemble configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a variable does not parse
    pub fn from_sources(fc: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = env("OPENAI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);

        let llm = LlmConfig {
            api_key,
            base_url: env("OPENAI_BASE_URL")
                .or(fc.llm.base_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: env("SENA_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: fc.llm.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            timeout: Duration::from_secs(fc.llm.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        };

        let keep_last_n = match env("SENA_KEEP_LAST_N") {
            Some(raw) => parse_var("SENA_KEEP_LAST_N", &raw)?,
            None => fc.memory.keep_last_n.unwrap_or(DEFAULT_KEEP_LAST_N),
        };

        let memory = MemoryConfig {
            history_path: env("SENA_HISTORY_PATH")
                .map(PathBuf::from)
                .or(fc.memory.history_path)
                .unwrap_or_else(|| data_dir().join("history.json")),
            profile_path: env("SENA_PROFILE_PATH")
                .map(PathBuf::from)
                .or(fc.memory.profile_path)
                .unwrap_or_else(|| config_dir().join("profile.json")),
            keep_last_n,
        };

        let speaker = match env("SENA_SPEAKER") {
            Some(raw) => parse_var("SENA_SPEAKER", &raw)?,
            None => fc.voice.speaker.unwrap_or(DEFAULT_SPEAKER),
        };

        let params = fc.voice.voice_params(VoiceParams::default());
        let voice = VoiceConfig {
            voicevox_url: env("VOICEVOX_URL")
                .or(fc.voice.voicevox_url)
                .unwrap_or_else(|| DEFAULT_VOICEVOX_URL.to_string()),
            speaker,
            params,
            stt_model: fc
                .voice
                .stt_model
                .unwrap_or_else(|| DEFAULT_STT_MODEL.to_string()),
            stt_language: Some(
                fc.voice
                    .stt_language
                    .unwrap_or_else(|| DEFAULT_STT_LANGUAGE.to_string()),
            )
            .filter(|l| !l.is_empty()),
            listen_timeout: Duration::from_secs(
                fc.voice
                    .listen_timeout_secs
                    .unwrap_or(DEFAULT_LISTEN_TIMEOUT_SECS),
            ),
            wake_tokens: fc.voice.wake_tokens.unwrap_or_else(|| owned(DEFAULT_WAKE_TOKENS)),
            stop_tokens: fc.voice.stop_tokens.unwrap_or_else(|| owned(DEFAULT_STOP_TOKENS)),
            idle_sleep: fc.voice.idle_sleep_secs.map(Duration::from_secs),
        };

        tracing::debug!(
            model = %llm.model,
            keep_last_n = memory.keep_last_n,
            history = %memory.history_path.display(),
            speaker = voice.speaker,
            "configuration loaded"
        );

        Ok(Self { llm, memory, voice })
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key} has an invalid value: {raw}")))
}

fn owned(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(ToString::to_string).collect()
}

/// `~/.local/share/sena` on Linux
fn data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("sena"))
}

/// `~/.config/sena` on Linux
fn config_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map_or_else(|| PathBuf::from("."), |d| d.config_dir().join("sena"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_api_key_is_reported_on_use() {
        let config = Config::from_sources(ConfigFile::default(), env_of(&[])).unwrap();
        assert!(matches!(config.llm.api_key(), Err(Error::Config(_))));

        let config =
            Config::from_sources(ConfigFile::default(), env_of(&[("OPENAI_API_KEY", " ")]))
                .unwrap();
        assert!(matches!(config.llm.api_key(), Err(Error::Config(_))));
    }

    #[test]
    fn defaults() {
        let config =
            Config::from_sources(ConfigFile::default(), env_of(&[("OPENAI_API_KEY", "sk-test")]))
                .unwrap();

        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.max_tokens, 140);
        assert_eq!(config.llm.api_key().unwrap().expose_secret(), "sk-test");
        assert_eq!(config.memory.keep_last_n, 10);
        assert_eq!(config.voice.voicevox_url, "http://127.0.0.1:50021");
        assert_eq!(config.voice.speaker, 1);
        assert_eq!(config.voice.stt_language.as_deref(), Some("ja"));
        assert_eq!(config.voice.wake_tokens.len(), DEFAULT_WAKE_TOKENS.len());
        assert!(config.voice.idle_sleep.is_none());
        assert!(config.memory.history_path.ends_with("history.json"));
    }

    #[test]
    fn env_beats_file() {
        let fc: ConfigFile = toml::from_str(concat!(
            "[llm]\nmodel = \"from-file\"\n",
            "[memory]\nkeep_last_n = 3\n",
            "[voice]\nidle_sleep_secs = 60\n",
        ))
        .unwrap();
        let config = Config::from_sources(
            fc,
            env_of(&[
                ("OPENAI_API_KEY", "k"),
                ("SENA_MODEL", "from-env"),
                ("SENA_SPEAKER", "8"),
            ]),
        )
        .unwrap();

        assert_eq!(config.llm.model, "from-env");
        assert_eq!(config.memory.keep_last_n, 3);
        assert_eq!(config.voice.speaker, 8);
        assert_eq!(config.voice.idle_sleep, Some(Duration::from_secs(60)));
    }

    #[test]
    fn bad_number_is_reported() {
        let result = Config::from_sources(
            ConfigFile::default(),
            env_of(&[("OPENAI_API_KEY", "k"), ("SENA_KEEP_LAST_N", "many")]),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
