//! Configuration management for character calls

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use self::file::CallConfigFile;

/// Default live model for voice conversations
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Default prebuilt voice
pub const DEFAULT_VOICE: &str = "Kore";

/// Gemini Live bidirectional streaming endpoint
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Samples per outbound frame; small to keep capture-to-network latency low
pub const DEFAULT_FRAME_SIZE: usize = 512;

/// Microphone sample rate (16kHz mono PCM)
pub const DEFAULT_INPUT_SAMPLE_RATE: u32 = 16_000;

/// Synthesized speech sample rate (24kHz mono PCM)
pub const DEFAULT_OUTPUT_SAMPLE_RATE: u32 = 24_000;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 2_000;

/// Character call configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Credential for the live model endpoint
    pub api_key: Option<SecretString>,

    /// Live model connection settings
    pub live: LiveConfig,

    /// Audio device settings
    pub audio: AudioConfig,

    /// Optional JSON file of stories backing the feed
    pub stories_path: Option<PathBuf>,
}

/// Live model connection settings
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// Model identifier
    pub model: String,

    /// Prebuilt synthesized voice
    pub voice: String,

    /// Websocket endpoint
    pub endpoint: String,

    /// Upper bound on the connect handshake
    pub connect_timeout: Duration,

    /// Upper bound on a graceful close
    pub close_timeout: Duration,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            close_timeout: Duration::from_millis(DEFAULT_CLOSE_TIMEOUT_MS),
        }
    }
}

/// Audio device settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConfig {
    /// Samples per outbound frame
    pub frame_size: usize,

    /// Microphone sample rate
    pub input_sample_rate: u32,

    /// Speaker sample rate
    pub output_sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
            input_sample_rate: DEFAULT_INPUT_SAMPLE_RATE,
            output_sample_rate: DEFAULT_OUTPUT_SAMPLE_RATE,
        }
    }
}

impl Config {
    /// Load configuration (env > toml > default)
    #[must_use]
    pub fn load() -> Self {
        let fc = file::load_config_file();
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with an environment lookup
    pub fn resolve(fc: CallConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        // A blank source counts as unset so the next one is consulted
        let non_blank = |key: Option<String>| key.filter(|k| !k.trim().is_empty());
        let api_key = non_blank(env("GEMINI_API_KEY"))
            .or_else(|| non_blank(env("API_KEY")))
            .or_else(|| non_blank(fc.api_key))
            .map(SecretString::from);

        let live = LiveConfig {
            model: env("CHARCALL_MODEL")
                .or(fc.live.model)
                .unwrap_or(defaults.live.model),
            voice: env("CHARCALL_VOICE")
                .or(fc.live.voice)
                .unwrap_or(defaults.live.voice),
            endpoint: env("CHARCALL_ENDPOINT")
                .or(fc.live.endpoint)
                .unwrap_or(defaults.live.endpoint),
            connect_timeout: env("CHARCALL_CONNECT_TIMEOUT")
                .and_then(|s| s.parse().ok())
                .or(fc.live.connect_timeout_secs)
                .map_or(defaults.live.connect_timeout, Duration::from_secs),
            close_timeout: fc
                .live
                .close_timeout_ms
                .map_or(defaults.live.close_timeout, Duration::from_millis),
        };

        let audio = AudioConfig {
            frame_size: env("CHARCALL_FRAME_SIZE")
                .and_then(|s| s.parse().ok())
                .or(fc.audio.frame_size)
                .filter(|&n| n > 0)
                .unwrap_or(defaults.audio.frame_size),
            input_sample_rate: fc
                .audio
                .input_sample_rate
                .unwrap_or(defaults.audio.input_sample_rate),
            output_sample_rate: fc
                .audio
                .output_sample_rate
                .unwrap_or(defaults.audio.output_sample_rate),
        };

        let stories_path = env("CHARCALL_STORIES")
            .or(fc.stories)
            .map(PathBuf::from);

        Self {
            api_key,
            live,
            audio,
            stories_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::resolve(CallConfigFile::default(), env_from(&[]));

        assert!(config.api_key.is_none());
        assert_eq!(config.live.model, DEFAULT_MODEL);
        assert_eq!(config.live.voice, "Kore");
        assert_eq!(config.audio.frame_size, 512);
        assert_eq!(config.audio.input_sample_rate, 16_000);
        assert_eq!(config.audio.output_sample_rate, 24_000);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut fc = CallConfigFile::default();
        fc.live.voice = Some("Puck".to_string());
        fc.api_key = Some("from-file".to_string());

        let config = Config::resolve(
            fc,
            env_from(&[("CHARCALL_VOICE", "Charon"), ("API_KEY", "from-env")]),
        );

        assert_eq!(config.live.voice, "Charon");
        assert_eq!(config.api_key.unwrap().expose_secret(), "from-env");
    }

    #[test]
    fn test_gemini_key_preferred() {
        let config = Config::resolve(
            CallConfigFile::default(),
            env_from(&[("GEMINI_API_KEY", "g"), ("API_KEY", "a")]),
        );
        assert_eq!(config.api_key.unwrap().expose_secret(), "g");
    }

    #[test]
    fn test_blank_key_is_missing() {
        let config = Config::resolve(CallConfigFile::default(), env_from(&[("API_KEY", "  ")]));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_blank_key_falls_through() {
        let config = Config::resolve(
            CallConfigFile::default(),
            env_from(&[("GEMINI_API_KEY", ""), ("API_KEY", "k")]),
        );
        assert_eq!(config.api_key.unwrap().expose_secret(), "k");

        let mut fc = CallConfigFile::default();
        fc.api_key = Some("from-file".to_string());
        let config = Config::resolve(
            fc,
            env_from(&[("GEMINI_API_KEY", " "), ("API_KEY", "\t")]),
        );
        assert_eq!(config.api_key.unwrap().expose_secret(), "from-file");
    }

    #[test]
    fn test_zero_frame_size_rejected() {
        let config = Config::resolve(
            CallConfigFile::default(),
            env_from(&[("CHARCALL_FRAME_SIZE", "0")]),
        );
        assert_eq!(config.audio.frame_size, DEFAULT_FRAME_SIZE);
    }
}
