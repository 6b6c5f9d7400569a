use serde::Serialize;

use crate::{
    chunker::word_count,
    types::{Chunk, DeckSlide, Subject, Tone},
};

/// Shared context sent with every chunk of one request.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub topic: String,
    pub audience: String,
    pub tone: Tone,
    pub subject: Subject,
    /// Desired number of slides for the chunk being prompted.
    pub slide_hint: Option<u32>,
    pub visuals: bool,
}

/// One group of deck slides to script in a single call.
#[derive(Debug, Clone)]
pub struct ScriptGroupPrompt<'a> {
    pub deck_title: &'a str,
    pub tone: Tone,
    pub group_index: usize,
    pub total_groups: usize,
    pub slides: &'a [DeckSlide],
    pub total_minutes: f64,
    pub baseline_seconds: f64,
    pub group_seconds: f64,
    pub previous_title: Option<&'a str>,
    pub next_title: Option<&'a str>,
}

pub fn slide_system_prompt() -> String {
    "You are a professional presentation structure organizer. You turn user content into \
     well-structured slides. You output ONLY machine-parseable JSON: no markdown, no \
     explanation, no commentary."
        .to_string()
}

fn slide_count_instruction(context: &PromptContext, chunk: &Chunk, total_chunks: usize) -> String {
    if let Some(hint) = context.slide_hint {
        return format!("Generate EXACTLY {hint} slides for this content (not more, not less).");
    }
    if total_chunks > 1 {
        return "Create 2-4 comprehensive slides from this chunk's content.".to_string();
    }
    let range = match word_count(&chunk.text) {
        0..200 => "3-4",
        200..500 => "5-7",
        500..1000 => "8-12",
        _ => "13-20",
    };
    format!(
        "Determine the slide count from the content volume: {range} slides, including one \
         title slide and one closing slide."
    )
}

fn bullet_shape(visuals: bool) -> &'static str {
    if visuals {
        r#"    "bullets": [
      {"text": "Bullet point from content (max 12 words)", "icon": "relevant-icon-name", "emoji": "📊", "color": "color-name"}
    ],
    "visuals": {"icons": ["icon"], "symbols": ["symbol"], "image_ideas": ["Specific image description"]},"#
    } else {
        r#"    "bullets": ["Bullet point from content (max 12 words)"],"#
    }
}

pub fn slide_user_prompt(context: &PromptContext, chunk: &Chunk, total_chunks: usize) -> String {
    let position = format!("This is chunk {} of {}", chunk.index + 1, total_chunks);
    let scope = if total_chunks > 1 {
        "It is part of a larger presentation. Generate slides for THIS CHUNK ONLY and do not \
         reference other chunks."
    } else {
        "It holds the complete content of the presentation."
    };
    let visual_rules = if context.visuals {
        "For every bullet suggest an icon, an emoji and a color that relate directly to the \
         bullet's meaning, and add slide-level visual suggestions."
    } else {
        "No visual suggestions are needed; focus on text content only."
    };

    format!(
        r#"Topic: {topic}
Target Audience: {audience}
Tone: {tone}
Subject Area: {subject}

CHUNK CONTEXT:
{position}. {scope}

CONTENT:
{content}

REQUIREMENTS:
1. Use ONLY information from the content above. Do not add external knowledge.
2. {count}
3. Each slide focuses on one topic with 2-5 bullets of at most 12 words each.
4. Speaker notes expand on the bullets using the content only.
5. Maintain a "{tone}" tone throughout.
6. {visual_rules}
7. slide_type is one of "title", "content", "section", "closing".

OUTPUT: a JSON array of slides and nothing else:
[
  {{
    "slide_type": "content",
    "title": "Slide title from content",
    "subtitle": "Optional subtitle",
{bullets}
    "speaker_notes": "Detailed explanation from content"
  }}
]"#,
        topic = context.topic,
        audience = context.audience,
        tone = context.tone,
        subject = context.subject.label(),
        content = chunk.text,
        count = slide_count_instruction(context, chunk, total_chunks),
        bullets = bullet_shape(context.visuals),
    )
}

pub fn script_system_prompt() -> String {
    "You are an expert presentation speaker and coach. You write natural, human-sounding \
     speaker scripts timed to a schedule. You output ONLY a JSON array."
        .to_string()
}

#[derive(Serialize)]
struct SlideBrief<'a> {
    slide_number: u32,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    subtitle: Option<&'a str>,
    bullets: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

fn slide_briefs(slides: &[DeckSlide]) -> String {
    let briefs: Vec<SlideBrief<'_>> = slides
        .iter()
        .map(|s| SlideBrief {
            slide_number: s.slide_number,
            title: &s.slide.title,
            subtitle: s.slide.subtitle.as_deref(),
            bullets: s.slide.bullets.iter().map(|b| b.text.as_str()).collect(),
            notes: s.slide.speaker_notes.as_deref(),
        })
        .collect();
    serde_json::to_string_pretty(&briefs).unwrap_or_else(|_| "[]".to_string())
}

pub fn script_user_prompt(group: &ScriptGroupPrompt<'_>, strict: bool) -> String {
    let numbers = group
        .slides
        .iter()
        .map(|s| s.slide_number.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let strict_preamble = if strict {
        format!(
            "Your previous answer could not be parsed. Return a bare JSON array, starting with \
             '[' and ending with ']', with exactly one object for each of slide numbers {numbers}. \
             No prose, no markdown fences, no trailing commas.\n\n"
        )
    } else {
        String::new()
    };

    format!(
        r#"{strict_preamble}PRESENTATION DETAILS:
- Title: {title}
- Tone: {tone} ({style})
- Total Duration: {total_minutes:.1} minutes
- Baseline per slide: {baseline:.0} seconds
- This group: part {part} of {groups}, {count} slides, {group_seconds:.0} seconds in total
- Previous slide: {previous}
- Next slide after this group: {next}

SLIDES:
{slides}
END SLIDES

REQUIREMENTS:
1. Write a natural, conversational script for each slide, as a real person would say it.
2. Size each script to roughly its estimated duration; the durations of this group should add up to {group_seconds:.0} seconds.
3. Make the transition from the previous slide and into the next one feel natural.
4. Use slide_number exactly as given above.

OUTPUT: a JSON array, one object per slide:
[
  {{
    "slide_number": <number>,
    "slide_explanation": "<what this slide is really about>",
    "script": "<natural speaker script>",
    "key_points": ["point1", "point2"],
    "talking_points": "<casual notes for the speaker>",
    "estimated_duration_seconds": <number>,
    "transition_to_next": "<natural transition to the next slide>"
  }}
]"#,
        title = group.deck_title,
        tone = group.tone,
        style = group.tone.speaking_style(),
        total_minutes = group.total_minutes,
        baseline = group.baseline_seconds,
        part = group.group_index + 1,
        groups = group.total_groups,
        count = group.slides.len(),
        group_seconds = group.group_seconds,
        previous = group.previous_title.unwrap_or("This is the opening"),
        next = group.next_title.unwrap_or("None, this group ends the presentation"),
        slides = slide_briefs(group.slides),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Bullet, SlideFragment};

    fn context(visuals: bool, slide_hint: Option<u32>) -> PromptContext {
        PromptContext {
            topic: "Soil health".into(),
            audience: "Farmers".into(),
            tone: Tone::Casual,
            subject: Subject::Biology,
            slide_hint,
            visuals,
        }
    }

    fn chunk(index: usize, words: usize) -> Chunk {
        Chunk {
            index,
            text: vec!["soil"; words].join(" "),
            word_count: words,
        }
    }

    #[test]
    fn slide_prompt_carries_position_and_context() {
        let prompt = slide_user_prompt(&context(true, None), &chunk(1, 20), 5);
        assert!(prompt.contains("This is chunk 2 of 5"));
        assert!(prompt.contains("Target Audience: Farmers"));
        assert!(prompt.contains("Subject Area: Biology"));
        assert!(prompt.contains("2-4 comprehensive slides"));
        assert!(prompt.contains("\"emoji\""));
    }

    #[test]
    fn slide_prompt_honours_hint_and_plain_bullets() {
        let prompt = slide_user_prompt(&context(false, Some(6)), &chunk(0, 20), 1);
        assert!(prompt.contains("EXACTLY 6 slides"));
        assert!(!prompt.contains("\"emoji\""));
    }

    #[test]
    fn single_chunk_guidance_scales_with_words() {
        let prompt = slide_user_prompt(&context(false, None), &chunk(0, 600), 1);
        assert!(prompt.contains("8-12 slides"));
    }

    #[test]
    fn script_prompt_lists_slides_and_timing() {
        let slides = vec![DeckSlide {
            slide_number: 9,
            chunk_index: 0,
            slide: SlideFragment {
                title: "Compost".into(),
                bullets: vec![Bullet::plain("Feed the microbes")],
                ..SlideFragment::default()
            },
        }];
        let group = ScriptGroupPrompt {
            deck_title: "Soil health",
            tone: Tone::Professional,
            group_index: 1,
            total_groups: 3,
            slides: &slides,
            total_minutes: 12.0,
            baseline_seconds: 40.0,
            group_seconds: 40.0,
            previous_title: Some("Cover crops"),
            next_title: None,
        };

        let prompt = script_user_prompt(&group, false);
        assert!(prompt.contains("part 2 of 3"));
        assert!(prompt.contains("Previous slide: Cover crops"));
        assert!(prompt.contains("\"slide_number\": 9"));
        assert!(!prompt.contains("could not be parsed"));

        let strict = script_user_prompt(&group, true);
        assert!(strict.starts_with("Your previous answer could not be parsed"));
        assert!(strict.contains("slide numbers 9"));
    }
}
