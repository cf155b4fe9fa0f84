//! TOML configuration file loading
//!
//! Supports `~/.config/character-call/config.toml` as a persistent config source.
//! All fields are optional — the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct CallConfigFile {
    /// Credential for the live model endpoint
    #[serde(default)]
    pub api_key: Option<String>,

    /// Path to a JSON file of stories
    #[serde(default)]
    pub stories: Option<String>,

    /// Live model connection settings
    #[serde(default)]
    pub live: LiveFileConfig,

    /// Audio device settings
    #[serde(default)]
    pub audio: AudioFileConfig,
}

/// Live model connection settings
#[derive(Debug, Default, Deserialize)]
pub struct LiveFileConfig {
    /// Model identifier (e.g. "gemini-2.5-flash-native-audio-preview-09-2025")
    pub model: Option<String>,

    /// Prebuilt voice name (e.g. "Kore")
    pub voice: Option<String>,

    /// Websocket endpoint
    pub endpoint: Option<String>,

    /// Seconds to wait for the websocket handshake
    pub connect_timeout_secs: Option<u64>,

    /// Milliseconds to wait for a graceful close
    pub close_timeout_ms: Option<u64>,
}

/// Audio device settings
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Samples per outbound frame
    pub frame_size: Option<usize>,

    /// Microphone sample rate
    pub input_sample_rate: Option<u32>,

    /// Speaker sample rate
    pub output_sample_rate: Option<u32>,
}

/// Load the TOML config file from the standard path
///
/// Returns `CallConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> CallConfigFile {
    config_file_path().map_or_else(CallConfigFile::default, |path| load_config_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Missing or invalid files fall back to defaults.
pub fn load_config_from(path: &Path) -> CallConfigFile {
    if !path.exists() {
        return CallConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                CallConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            CallConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/character-call/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("character-call").join("config.toml"))
}
