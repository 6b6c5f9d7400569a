use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Professional,
    Casual,
    Academic,
    Persuasive,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Professional => "professional",
            Tone::Casual => "casual",
            Tone::Academic => "academic",
            Tone::Persuasive => "persuasive",
        }
    }

    /// How a speaker should sound in this tone.
    pub fn speaking_style(&self) -> &'static str {
        match self {
            Tone::Professional => "formal, clear, authoritative, business-appropriate",
            Tone::Casual => "conversational, friendly, easy to follow, relatable",
            Tone::Academic => "scholarly, detailed, evidence-based, intellectual",
            Tone::Persuasive => "compelling, convincing, engaging, motivating",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "professional" => Ok(Tone::Professional),
            "casual" => Ok(Tone::Casual),
            "academic" => Ok(Tone::Academic),
            "persuasive" => Ok(Tone::Persuasive),
            other => Err(format!(
                "tone must be one of professional, casual, academic, persuasive, got '{other}'"
            )),
        }
    }
}

/// Domain tag steering vocabulary and examples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    #[default]
    General,
    English,
    Urdu,
    Science,
    Biology,
    Physics,
    Medical,
    It,
    Engineering,
}

impl Subject {
    pub fn label(&self) -> &'static str {
        match self {
            Subject::General => "General",
            Subject::English => "English",
            Subject::Urdu => "Urdu",
            Subject::Science => "Science",
            Subject::Biology => "Biology",
            Subject::Physics => "Physics",
            Subject::Medical => "Medical Field",
            Subject::It => "IT Field",
            Subject::Engineering => "Engineering Field",
        }
    }
}

impl FromStr for Subject {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "general" => Ok(Subject::General),
            "english" => Ok(Subject::English),
            "urdu" => Ok(Subject::Urdu),
            "science" => Ok(Subject::Science),
            "biology" => Ok(Subject::Biology),
            "physics" => Ok(Subject::Physics),
            "medical" => Ok(Subject::Medical),
            "it" => Ok(Subject::It),
            "engineering" => Ok(Subject::Engineering),
            other => Err(format!("unknown subject '{other}'")),
        }
    }
}

pub const MIN_SLIDE_TARGET: u32 = 3;
pub const MAX_SLIDE_TARGET: u32 = 100;

/// Request to turn raw text into a deck. Never persisted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawInput {
    pub topic: String,
    pub body: String,
    pub audience: String,
    pub tone: Tone,
    pub subject: Subject,
    pub slide_target: Option<u32>,
    pub visuals: bool,
    /// Force chunked generation even for short bodies.
    #[serde(default)]
    pub chunking: bool,
}

impl RawInput {
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |reason: &str| {
            Err(PipelineError::InvalidInput {
                reason: reason.to_string(),
            })
        };

        if self.topic.trim().is_empty() {
            return invalid("topic must be a non-empty string");
        }
        if self.body.trim().is_empty() {
            return invalid("body text must be a non-empty string");
        }
        if self.audience.trim().is_empty() {
            return invalid("target audience must be a non-empty string");
        }
        if let Some(target) = self.slide_target {
            if !(MIN_SLIDE_TARGET..=MAX_SLIDE_TARGET).contains(&target) {
                return Err(PipelineError::InvalidInput {
                    reason: format!(
                        "slide target must be between {MIN_SLIDE_TARGET} and {MAX_SLIDE_TARGET}, got {target}"
                    ),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub word_count: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlideType {
    Title,
    #[default]
    Content,
    Section,
    Closing,
}

impl SlideType {
    /// Lenient mapping of generator-proposed type names.
    pub fn from_loose(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "title" | "intro" | "overview" => SlideType::Title,
            "section" | "divider" | "section_header" => SlideType::Section,
            "closing" | "conclusion" | "summary" => SlideType::Closing,
            _ => SlideType::Content,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bullet {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Bullet {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualSuggestion {
    #[serde(default)]
    pub icons: Vec<String>,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub image_ideas: Vec<String>,
}

impl VisualSuggestion {
    pub fn is_empty(&self) -> bool {
        self.icons.is_empty() && self.symbols.is_empty() && self.image_ideas.is_empty()
    }
}

/// One slide as produced by a single chunk, before global numbering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlideFragment {
    pub slide_type: SlideType,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub bullets: Vec<Bullet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visuals: Option<VisualSuggestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckSlide {
    pub slide_number: u32,
    /// Content chunk the slide was generated from.
    pub chunk_index: usize,
    #[serde(flatten)]
    pub slide: SlideFragment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deck {
    pub title: String,
    pub tone: Tone,
    pub slides: Vec<DeckSlide>,
}

impl Deck {
    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }
}

/// Client-facing shape of a generated deck.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckResponse {
    pub slides: Vec<DeckSlide>,
    pub total_slides: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptUnit {
    pub slide_number: u32,
    pub slide_explanation: String,
    pub script: String,
    pub key_points: Vec<String>,
    pub talking_points: String,
    pub estimated_duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_to_next: Option<String>,
    pub chunk_index: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    Single,
    Chunked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptMetadata {
    /// Minutes.
    pub total_duration: f64,
    /// Minutes, rounded to two decimals.
    pub duration_per_slide: f64,
    pub processing_mode: ProcessingMode,
    pub num_chunks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptSet {
    pub scripts: Vec<ScriptUnit>,
    pub metadata: ScriptMetadata,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ScriptSet {
    pub fn total_seconds(&self) -> f64 {
        self.scripts
            .iter()
            .map(|s| s.estimated_duration_seconds)
            .sum()
    }
}
