//! Wire messages for the Gemini Live bidirectional stream
//!
//! Client messages are JSON objects with a single top-level key (`setup`,
//! `realtimeInput`). Server messages carry `setupComplete`, `serverContent`
//! or `goAway`; every field is optional and absent fields are no-ops.

use serde::{Deserialize, Serialize};

use crate::voice::RealtimeAudio;

/// Settings sent when a session opens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSetup {
    /// Model identifier without the `models/` prefix
    pub model: String,
    /// Prebuilt synthesized voice
    pub voice: String,
    /// Character instructions
    pub system_prompt: String,
    /// Request transcripts of the user's speech
    pub transcribe_input: bool,
    /// Request transcripts of the model's speech
    pub transcribe_output: bool,
}

/// First client message on a new connection
#[derive(Debug, Serialize)]
pub struct SetupMessage {
    pub setup: Setup,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<TranscriptionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<TranscriptionConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<Modality>,
    pub speech_config: SpeechConfig,
}

/// Requested response modality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Modality {
    Audio,
    Text,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Empty object enabling transcription in one direction
#[derive(Debug, Default, Serialize)]
pub struct TranscriptionConfig {}

impl From<&LiveSetup> for SetupMessage {
    fn from(setup: &LiveSetup) -> Self {
        Self {
            setup: Setup {
                model: format!("models/{}", setup.model),
                generation_config: GenerationConfig {
                    response_modalities: vec![Modality::Audio],
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: setup.voice.clone(),
                            },
                        },
                    },
                },
                system_instruction: Content::text(&setup.system_prompt),
                input_audio_transcription: setup
                    .transcribe_input
                    .then(TranscriptionConfig::default),
                output_audio_transcription: setup
                    .transcribe_output
                    .then(TranscriptionConfig::default),
            },
        }
    }
}

/// Streamed microphone audio
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<RealtimeAudio>,
}

impl From<RealtimeAudio> for RealtimeInputMessage {
    fn from(audio: RealtimeAudio) -> Self {
        Self {
            realtime_input: RealtimeInput {
                media_chunks: vec![audio],
            },
        }
    }
}

/// Content made of parts (text or inline media)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// Single text part
    #[must_use]
    pub fn text(text: &str) -> Self {
        Self {
            parts: vec![Part {
                text: Some(text.to_string()),
                inline_data: None,
            }],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

/// Base64 media embedded in a part
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub mime_type: String,
    pub data: String,
}

/// Any message from the server
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

impl ServerMessage {
    /// Message carrying only server content
    #[must_use]
    pub const fn content(content: ServerContent) -> Self {
        Self {
            setup_complete: None,
            server_content: Some(content),
            go_away: None,
        }
    }
}

/// Model output, transcripts and turn signals
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    /// User started speaking over the model
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
}

impl ServerContent {
    /// Base64 audio payloads of the model turn, in part order
    pub fn audio_payloads(&self) -> impl Iterator<Item = &str> {
        self.model_turn
            .iter()
            .flat_map(|turn| turn.parts.iter())
            .filter_map(|part| part.inline_data.as_ref())
            .filter(|data| data.mime_type.is_empty() || data.mime_type.starts_with("audio/"))
            .map(|data| data.data.as_str())
    }

    /// Non-empty transcript text of the user's speech
    #[must_use]
    pub fn input_text(&self) -> Option<&str> {
        non_empty(self.input_transcription.as_ref())
    }

    /// Non-empty transcript text of the model's speech
    #[must_use]
    pub fn output_text(&self) -> Option<&str> {
        non_empty(self.output_transcription.as_ref())
    }
}

fn non_empty(transcription: Option<&Transcription>) -> Option<&str> {
    transcription
        .and_then(|t| t.text.as_deref())
        .filter(|t| !t.is_empty())
}

/// Streaming transcript fragment
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: Option<String>,
}

/// Server is about to disconnect
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> LiveSetup {
        LiveSetup {
            model: "gemini-2.5-flash-native-audio-preview-09-2025".to_string(),
            voice: "Kore".to_string(),
            system_prompt: "You are Kizuna.".to_string(),
            transcribe_input: true,
            transcribe_output: true,
        }
    }

    #[test]
    fn test_setup_message_shape() {
        let json = serde_json::to_value(SetupMessage::from(&setup())).unwrap();

        assert_eq!(
            json["setup"]["model"],
            "models/gemini-2.5-flash-native-audio-preview-09-2025"
        );
        assert_eq!(
            json["setup"]["generationConfig"]["responseModalities"][0],
            "AUDIO"
        );
        assert_eq!(
            json["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Kore"
        );
        assert_eq!(
            json["setup"]["systemInstruction"]["parts"][0]["text"],
            "You are Kizuna."
        );
        assert!(json["setup"]["inputAudioTranscription"].is_object());
        assert!(json["setup"]["outputAudioTranscription"].is_object());
    }

    #[test]
    fn test_transcription_flags_omitted_when_off() {
        let mut s = setup();
        s.transcribe_input = false;
        let json = serde_json::to_value(SetupMessage::from(&s)).unwrap();
        assert!(json["setup"].get("inputAudioTranscription").is_none());
    }

    #[test]
    fn test_realtime_input_shape() {
        let msg = RealtimeInputMessage::from(RealtimeAudio {
            data: "AAA=".to_string(),
            mime_type: "audio/pcm;rate=16000".to_string(),
        });
        let json = serde_json::to_value(msg).unwrap();
        assert_eq!(json["realtimeInput"]["mediaChunks"][0]["data"], "AAA=");
        assert_eq!(
            json["realtimeInput"]["mediaChunks"][0]["mimeType"],
            "audio/pcm;rate=16000"
        );
    }

    #[test]
    fn test_parse_server_content() {
        let msg: ServerMessage = serde_json::from_str(
            r#"{
                "serverContent": {
                    "interrupted": true,
                    "outputTranscription": {"text": "Hi"},
                    "modelTurn": {"parts": [
                        {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAAA"}},
                        {"text": "ignored"},
                        {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "BBBB"}}
                    ]}
                }
            }"#,
        )
        .unwrap();

        let content = msg.server_content.unwrap();
        assert!(content.interrupted);
        assert_eq!(content.output_text(), Some("Hi"));
        assert_eq!(content.input_text(), None);
        assert_eq!(content.audio_payloads().collect::<Vec<_>>(), ["AAAA", "BBBB"]);
    }

    #[test]
    fn test_parse_setup_complete() {
        let msg: ServerMessage = serde_json::from_str(r#"{"setupComplete": {}}"#).unwrap();
        assert!(msg.setup_complete.is_some());
        assert!(msg.server_content.is_none());
    }

    #[test]
    fn test_empty_transcript_is_none() {
        let content: ServerContent =
            serde_json::from_str(r#"{"inputTranscription": {"text": ""}}"#).unwrap();
        assert_eq!(content.input_text(), None);
    }
}
