//! Streaming transcript aggregation
//!
//! Fragments arrive as small text deltas. Consecutive fragments from the
//! same speaker grow the last turn in place, so one utterance is always one
//! turn and adjacent turns never share a speaker.

use serde::Serialize;

/// Who said a piece of transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Character,
}

/// Contiguous text from one speaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptTurn {
    pub speaker: Speaker,
    pub text: String,
}

/// Ordered transcript of the active call
#[derive(Debug, Clone, Default)]
pub struct TranscriptAggregator {
    turns: Vec<TranscriptTurn>,
}

impl TranscriptAggregator {
    /// Create an empty transcript
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text delta from `speaker`
    ///
    /// Empty deltas are ignored.
    pub fn append(&mut self, speaker: Speaker, delta: &str) {
        if delta.is_empty() {
            return;
        }

        match self.turns.last_mut() {
            Some(last) if last.speaker == speaker => last.text.push_str(delta),
            _ => self.turns.push(TranscriptTurn {
                speaker,
                text: delta.to_string(),
            }),
        }
    }

    /// Drop all turns
    pub fn reset(&mut self) {
        self.turns.clear();
    }

    /// Turns in order
    #[must_use]
    pub fn turns(&self) -> &[TranscriptTurn] {
        &self.turns
    }

    /// Whether nothing has been said yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_speaker_grows_turn() {
        let mut transcript = TranscriptAggregator::new();
        transcript.append(Speaker::User, "Hel");
        transcript.append(Speaker::User, "lo");
        transcript.append(Speaker::Character, "Hi");

        assert_eq!(
            transcript.turns(),
            [
                TranscriptTurn {
                    speaker: Speaker::User,
                    text: "Hello".to_string()
                },
                TranscriptTurn {
                    speaker: Speaker::Character,
                    text: "Hi".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_alternating_speakers_never_merge() {
        let mut transcript = TranscriptAggregator::new();
        for (speaker, text) in [
            (Speaker::Character, "Welcome."),
            (Speaker::User, "Thanks"),
            (Speaker::Character, " back"),
            (Speaker::Character, "!"),
            (Speaker::User, "Bye"),
        ] {
            transcript.append(speaker, text);
        }

        let turns = transcript.turns();
        assert_eq!(turns.len(), 4);
        assert!(turns.windows(2).all(|w| w[0].speaker != w[1].speaker));
        assert_eq!(turns[2].text, " back!");
    }

    #[test]
    fn test_empty_delta_ignored() {
        let mut transcript = TranscriptAggregator::new();
        transcript.append(Speaker::User, "");
        assert!(transcript.is_empty());

        transcript.append(Speaker::User, "Hi");
        transcript.append(Speaker::Character, "");
        assert_eq!(transcript.turns().last().unwrap().speaker, Speaker::User);
    }

    #[test]
    fn test_reset() {
        let mut transcript = TranscriptAggregator::new();
        transcript.append(Speaker::User, "Hi");
        transcript.reset();
        assert!(transcript.is_empty());
    }
}
