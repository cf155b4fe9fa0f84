//! Story store and the feed of callable characters
//!
//! A call only needs a character's name, concept and seed dialogue lines.
//! Those are read from published stories; when nothing is published the
//! feed falls back to a single built-in demo character.

use std::path::Path;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Identifier of the built-in demo character
pub const DEMO_CHARACTER_ID: &str = "demo_char";

/// Publication state of a story
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoryStatus {
    /// Profile generation in progress
    Processing,
    /// Saved but not visible in the feed
    Draft,
    /// Visible in the feed and callable
    Published,
    /// Removed from the feed by moderation
    TakenDown,
}

/// A character record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    pub character_name: String,
    /// One-line concept the profile was generated from
    pub idea: String,
    #[serde(default)]
    pub video_url: Option<String>,
    pub status: StoryStatus,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub opening_line: Option<String>,
    #[serde(default)]
    pub generated_name: Option<String>,
}

/// Fields supplied when creating a story
#[derive(Debug, Clone, Default)]
pub struct NewStory {
    pub character_name: String,
    pub idea: String,
    pub video_url: Option<String>,
    pub synopsis: Option<String>,
    pub opening_line: Option<String>,
    pub generated_name: Option<String>,
}

/// Partial update of a story; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct StoryUpdate {
    pub character_name: Option<String>,
    pub idea: Option<String>,
    pub video_url: Option<String>,
    pub status: Option<StoryStatus>,
    pub synopsis: Option<String>,
    pub opening_line: Option<String>,
    pub generated_name: Option<String>,
}

/// Source of character records
pub trait StoryStore: Send + Sync {
    /// All stories, newest first
    fn list(&self) -> Vec<Story>;

    /// Look up one story
    fn get(&self, id: &str) -> Option<Story>;

    /// Create a story in `Processing` state
    fn create(&self, story: NewStory) -> Story;

    /// Apply a partial update
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no story has this id
    fn update(&self, id: &str, update: StoryUpdate) -> Result<Story>;

    /// Remove a story
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no story has this id
    fn delete(&self, id: &str) -> Result<()>;
}

/// In-memory story store
#[derive(Debug, Default)]
pub struct MemoryStoryStore {
    stories: RwLock<Vec<Story>>,
}

impl MemoryStoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store from existing stories
    #[must_use]
    pub fn with_stories(stories: Vec<Story>) -> Self {
        Self {
            stories: RwLock::new(stories),
        }
    }

    /// Load stories from a JSON array file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let stories: Vec<Story> = serde_json::from_str(&content)?;
        tracing::debug!(path = %path.display(), count = stories.len(), "loaded stories");
        Ok(Self::with_stories(stories))
    }
}

impl StoryStore for MemoryStoryStore {
    fn list(&self) -> Vec<Story> {
        self.stories
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    fn get(&self, id: &str) -> Option<Story> {
        self.stories
            .read()
            .ok()
            .and_then(|s| s.iter().find(|story| story.id == id).cloned())
    }

    fn create(&self, story: NewStory) -> Story {
        let story = Story {
            id: uuid::Uuid::new_v4().to_string(),
            character_name: story.character_name,
            idea: story.idea,
            video_url: story.video_url,
            status: StoryStatus::Processing,
            created_at: Utc::now(),
            synopsis: story.synopsis,
            opening_line: story.opening_line,
            generated_name: story.generated_name,
        };

        if let Ok(mut stories) = self.stories.write() {
            stories.insert(0, story.clone());
        }
        story
    }

    fn update(&self, id: &str, update: StoryUpdate) -> Result<Story> {
        let mut stories = self
            .stories
            .write()
            .map_err(|_| Error::Story("story store lock poisoned".to_string()))?;
        let story = stories
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::NotFound(format!("story {id}")))?;

        if let Some(v) = update.character_name {
            story.character_name = v;
        }
        if let Some(v) = update.idea {
            story.idea = v;
        }
        if let Some(v) = update.video_url {
            story.video_url = Some(v);
        }
        if let Some(v) = update.status {
            story.status = v;
        }
        if let Some(v) = update.synopsis {
            story.synopsis = Some(v);
        }
        if let Some(v) = update.opening_line {
            story.opening_line = Some(v);
        }
        if let Some(v) = update.generated_name {
            story.generated_name = Some(v);
        }

        Ok(story.clone())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let mut stories = self
            .stories
            .write()
            .map_err(|_| Error::Story("story store lock poisoned".to_string()))?;
        let before = stories.len();
        stories.retain(|s| s.id != id);
        if stories.len() == before {
            return Err(Error::NotFound(format!("story {id}")));
        }
        Ok(())
    }
}

/// What a call needs to know about a character
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterProfile {
    pub id: String,
    pub name: String,
    pub concept: String,
    /// Seed dialogue lines
    pub lines: Vec<String>,
}

impl CharacterProfile {
    /// Build a profile from a story record
    #[must_use]
    pub fn from_story(story: &Story) -> Self {
        let first = story
            .synopsis
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| story.idea.clone());
        let second = story
            .opening_line
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "...".to_string());

        Self {
            id: story.id.clone(),
            name: story.character_name.clone(),
            concept: story.idea.clone(),
            lines: vec![first, second],
        }
    }

    /// Built-in character shown when nothing is published
    #[must_use]
    pub fn demo() -> Self {
        Self {
            id: DEMO_CHARACTER_ID.to_string(),
            name: "Kizuna".to_string(),
            concept: "A cheerful girl enjoying a summer day at the pool.".to_string(),
            lines: vec![
                "The moment the water splashed, Kizuna's laughter echoed above the pool."
                    .to_string(),
                "You just sat down by the pool, but she was already in the water...".to_string(),
            ],
        }
    }

    /// System instruction for a voice conversation as this character
    #[must_use]
    pub fn system_prompt(&self) -> String {
        format!(
            "You are {}.\nCharacter Concept: {}.\nOpening lines: {}.\nRoleplay this character naturally in a voice conversation. Be concise and conversational.",
            self.name,
            self.concept,
            self.lines.join(" ")
        )
    }
}

/// Callable characters in feed order
#[must_use]
pub fn feed(stories: &[Story]) -> Vec<CharacterProfile> {
    let published: Vec<CharacterProfile> = stories
        .iter()
        .filter(|s| s.status == StoryStatus::Published)
        .map(CharacterProfile::from_story)
        .collect();

    if published.is_empty() {
        vec![CharacterProfile::demo()]
    } else {
        published
    }
}

/// Cursor over the feed; moving past either end wraps around
#[derive(Debug, Clone)]
pub struct Feed {
    items: Vec<CharacterProfile>,
    index: usize,
}

impl Feed {
    /// Build the feed from a story store
    #[must_use]
    pub fn from_store(store: &dyn StoryStore) -> Self {
        Self {
            items: feed(&store.list()),
            index: 0,
        }
    }

    /// Currently displayed character
    #[must_use]
    pub fn current(&self) -> &CharacterProfile {
        &self.items[self.index]
    }

    /// Index of the displayed character
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// All characters in feed order
    #[must_use]
    pub fn items(&self) -> &[CharacterProfile] {
        &self.items
    }

    /// Advance to the next character
    pub fn next_character(&mut self) -> &CharacterProfile {
        self.index = (self.index + 1) % self.items.len();
        self.current()
    }

    /// Go back to the previous character
    pub fn previous_character(&mut self) -> &CharacterProfile {
        self.index = self.index.checked_sub(1).unwrap_or(self.items.len() - 1);
        self.current()
    }

    /// Jump to a character by id
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the character is not in the feed
    pub fn select(&mut self, id: &str) -> Result<&CharacterProfile> {
        let index = self
            .items
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| Error::NotFound(format!("character {id}")))?;
        self.index = index;
        Ok(self.current())
    }

    /// Jump to a character by position
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the index is out of range
    pub fn select_index(&mut self, index: usize) -> Result<&CharacterProfile> {
        if index >= self.items.len() {
            return Err(Error::NotFound(format!("feed index {index}")));
        }
        self.index = index;
        Ok(self.current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(id: &str, name: &str, status: StoryStatus) -> Story {
        Story {
            id: id.to_string(),
            character_name: name.to_string(),
            idea: format!("{name} concept"),
            video_url: None,
            status,
            created_at: Utc::now(),
            synopsis: None,
            opening_line: None,
            generated_name: None,
        }
    }

    #[test]
    fn test_feed_falls_back_to_demo() {
        let items = feed(&[story("a", "Ayla", StoryStatus::Draft)]);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, DEMO_CHARACTER_ID);
        assert_eq!(items[0].name, "Kizuna");
    }

    #[test]
    fn test_feed_only_published() {
        let items = feed(&[
            story("a", "Ayla", StoryStatus::Published),
            story("b", "Bram", StoryStatus::TakenDown),
            story("c", "Cato", StoryStatus::Published),
        ]);
        let ids: Vec<&str> = items.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);
    }

    #[test]
    fn test_profile_lines_fall_back_to_idea() {
        let profile = CharacterProfile::from_story(&story("a", "Ayla", StoryStatus::Published));
        assert_eq!(profile.lines, ["Ayla concept", "..."]);

        let mut s = story("b", "Bram", StoryStatus::Published);
        s.synopsis = Some("A knight".to_string());
        s.opening_line = Some("Halt!".to_string());
        let profile = CharacterProfile::from_story(&s);
        assert_eq!(profile.lines, ["A knight", "Halt!"]);
    }

    #[test]
    fn test_system_prompt_mentions_character() {
        let prompt = CharacterProfile::demo().system_prompt();
        assert!(prompt.starts_with("You are Kizuna.\n"));
        assert!(prompt.contains("Character Concept: A cheerful girl"));
        assert!(prompt.contains("echoed above the pool. You just sat down"));
        assert!(prompt.ends_with("Be concise and conversational."));
    }

    #[test]
    fn test_feed_wraps() {
        let store = MemoryStoryStore::with_stories(vec![
            story("a", "Ayla", StoryStatus::Published),
            story("b", "Bram", StoryStatus::Published),
        ]);
        let mut feed = Feed::from_store(&store);

        assert_eq!(feed.previous_character().id, "b");
        assert_eq!(feed.next_character().id, "a");
        assert_eq!(feed.next_character().id, "b");
        assert_eq!(feed.next_character().id, "a");
        assert!(feed.select("zzz").is_err());
        assert_eq!(feed.select_index(1).unwrap().id, "b");
    }

    #[test]
    fn test_store_crud() {
        let store = MemoryStoryStore::new();
        let created = store.create(NewStory {
            character_name: "Tifa".to_string(),
            idea: "Bartender".to_string(),
            ..NewStory::default()
        });
        assert_eq!(created.status, StoryStatus::Processing);

        let updated = store
            .update(
                &created.id,
                StoryUpdate {
                    status: Some(StoryStatus::Published),
                    ..StoryUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.status, StoryStatus::Published);
        assert_eq!(store.get(&created.id).unwrap().status, StoryStatus::Published);

        store.delete(&created.id).unwrap();
        assert!(store.list().is_empty());
        assert!(matches!(store.delete(&created.id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stories.json");
        std::fs::write(
            &path,
            r#"[{"id":"s1","characterName":"Ayla","idea":"A pilot","status":"PUBLISHED","openingLine":"Buckle up."}]"#,
        )
        .unwrap();

        let store = MemoryStoryStore::load(&path).unwrap();
        let story = store.get("s1").unwrap();
        assert_eq!(story.status, StoryStatus::Published);
        assert_eq!(story.opening_line.as_deref(), Some("Buckle up."));
    }
}
