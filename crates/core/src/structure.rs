//! Validator and repairer for generator output.
//!
//! Parsing is a chain of repair steps: the raw text is parsed directly, and
//! each failed attempt hands the (rewritten) candidate to the next step:
//!
//! 1. [`ExtractPayload`] strips prose and code fences outside the outermost
//!    JSON delimiters.
//! 2. [`RemoveTrailingCommas`] drops commas directly before `]` or `}`.
//! 3. [`EscapeControlChars`] escapes raw newlines, tabs and other control
//!    characters inside string literals.
//! 4. [`CloseTruncated`] closes strings, arrays and objects left open by a
//!    truncated answer.
//!
//! The parsed value is then normalized once into [`SlideFragment`]s or
//! [`ScriptDraft`]s, so nothing downstream sees the generator's loose shapes.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    error::{StructureError, excerpt},
    types::{Bullet, SlideFragment, SlideType, VisualSuggestion},
};

trait Repair {
    fn name(&self) -> &'static str;

    /// Rewrite the candidate, or `None` when the step does not apply.
    fn apply(&self, text: &str) -> Option<String>;
}

struct ExtractPayload;
struct RemoveTrailingCommas;
struct EscapeControlChars;
struct CloseTruncated;

const REPAIR_CHAIN: [&dyn Repair; 4] = [
    &ExtractPayload,
    &RemoveTrailingCommas,
    &EscapeControlChars,
    &CloseTruncated,
];

impl Repair for ExtractPayload {
    fn name(&self) -> &'static str {
        "extract_payload"
    }

    fn apply(&self, text: &str) -> Option<String> {
        let start = text.find(['[', '{'])?;
        let end = closing_offset(&text[start..]).map_or(text.len(), |len| start + len);
        let payload = &text[start..end];
        (payload.len() != text.len()).then(|| payload.to_string())
    }
}

/// Byte length of the first balanced value in `text`, or `None` when it
/// never closes.
fn closing_offset(text: &str) -> Option<usize> {
    let mut scanner = StringScanner::default();
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        let outside = !scanner.in_string();
        scanner.feed(c);
        if !outside {
            continue;
        }
        match c {
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

impl Repair for RemoveTrailingCommas {
    fn name(&self) -> &'static str {
        "remove_trailing_commas"
    }

    fn apply(&self, text: &str) -> Option<String> {
        let mut out = String::with_capacity(text.len());
        let mut scanner = StringScanner::default();
        let mut changed = false;

        for (i, c) in text.char_indices() {
            let outside = !scanner.in_string();
            scanner.feed(c);
            if outside && c == ',' {
                let next = text[i + 1..].chars().find(|n| !n.is_whitespace());
                if matches!(next, Some(']') | Some('}')) {
                    changed = true;
                    continue;
                }
            }
            out.push(c);
        }
        changed.then_some(out)
    }
}

impl Repair for EscapeControlChars {
    fn name(&self) -> &'static str {
        "escape_control_chars"
    }

    fn apply(&self, text: &str) -> Option<String> {
        let mut out = String::with_capacity(text.len());
        let mut scanner = StringScanner::default();
        let mut changed = false;

        for c in text.chars() {
            let inside = scanner.in_string();
            scanner.feed(c);
            if inside && (c as u32) < 0x20 {
                changed = true;
                match c {
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    other => out.push_str(&format!("\\u{:04x}", other as u32)),
                }
                continue;
            }
            out.push(c);
        }
        changed.then_some(out)
    }
}

impl Repair for CloseTruncated {
    fn name(&self) -> &'static str {
        "close_truncated"
    }

    fn apply(&self, text: &str) -> Option<String> {
        let mut scanner = StringScanner::default();
        let mut open: Vec<char> = Vec::new();

        for c in text.chars() {
            let outside = !scanner.in_string();
            scanner.feed(c);
            if !outside {
                continue;
            }
            match c {
                '[' => open.push(']'),
                '{' => open.push('}'),
                ']' | '}' => {
                    if open.last() == Some(&c) {
                        open.pop();
                    }
                }
                _ => {}
            }
        }

        if open.is_empty() && !scanner.in_string() {
            return None;
        }

        let mut out = text.to_string();
        if scanner.in_string() {
            out.push('"');
        }
        let trimmed_len = out.trim_end().trim_end_matches(',').trim_end().len();
        out.truncate(trimmed_len);
        out.extend(open.iter().rev());
        Some(out)
    }
}

/// Tracks whether a JSON character stream is inside a string literal.
#[derive(Default)]
struct StringScanner {
    in_string: bool,
    escaped: bool,
}

impl StringScanner {
    fn in_string(&self) -> bool {
        self.in_string
    }

    fn feed(&mut self, c: char) {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if c == '\\' {
                self.escaped = true;
            } else if c == '"' {
                self.in_string = false;
            }
        } else if c == '"' {
            self.in_string = true;
        }
    }
}

/// Parse raw generator text into JSON, repairing it when needed.
pub fn parse_json(raw: &str) -> Result<Value, StructureError> {
    let mut candidate = raw.trim().to_string();
    let mut last_error = match serde_json::from_str::<Value>(&candidate) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    for repair in REPAIR_CHAIN {
        let Some(next) = repair.apply(&candidate) else {
            continue;
        };
        candidate = next;
        match serde_json::from_str::<Value>(&candidate) {
            Ok(value) => {
                debug!(repair = repair.name(), "repaired generator output");
                return Ok(value);
            }
            Err(e) => last_error = e,
        }
    }

    Err(StructureError::Malformed {
        reason: last_error.to_string(),
        raw_excerpt: excerpt(raw),
    })
}

/// Top-level items: a bare array, an object wrapping an array under
/// `list_key`, or a single item object.
fn items(value: Value, list_key: &str, raw: &str) -> Result<Vec<Value>, StructureError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove(list_key) {
            Some(Value::Array(items)) => Ok(items),
            Some(other) => {
                map.insert(list_key.to_string(), other);
                Ok(vec![Value::Object(map)])
            }
            None => Ok(vec![Value::Object(map)]),
        },
        other => Err(StructureError::Malformed {
            reason: format!("expected a JSON array or object, got {}", kind_of(&other)),
            raw_excerpt: excerpt(raw),
        }),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// First non-empty text under any of `keys`.
fn text_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .find_map(scalar_text)
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
        other => scalar_text(other).into_iter().collect(),
    }
}

fn list_field(map: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .map(string_list)
        .find(|list| !list.is_empty())
        .unwrap_or_default()
}

fn number_field(map: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .find_map(|value| match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSlides {
    pub slides: Vec<SlideFragment>,
    pub warnings: Vec<String>,
}

/// Parse one chunk's answer into slide fragments.
///
/// Slides without a title are dropped into `warnings`; the chunk fails only
/// when nothing usable remains.
pub fn parse_slides(raw: &str) -> Result<ParsedSlides, StructureError> {
    let value = parse_json(raw)?;
    let items = items(value, "slides", raw)?;

    let mut slides = Vec::with_capacity(items.len());
    let mut warnings = Vec::new();
    let mut dropped = 0;

    for (i, item) in items.iter().enumerate() {
        match slide_from_value(item, &mut warnings, i + 1) {
            Ok(slide) => slides.push(slide),
            Err(reason) => {
                dropped += 1;
                warn!(position = i + 1, %reason, "dropping invalid slide");
                warnings.push(format!("slide {} dropped: {reason}", i + 1));
            }
        }
    }

    if slides.is_empty() {
        return Err(StructureError::EmptyResult { dropped });
    }
    Ok(ParsedSlides { slides, warnings })
}

fn slide_from_value(
    value: &Value,
    warnings: &mut Vec<String>,
    position: usize,
) -> Result<SlideFragment, String> {
    let Value::Object(map) = value else {
        return Err(format!("expected an object, got {}", kind_of(value)));
    };
    let title = text_field(map, &["title", "slide_title"]).ok_or("missing title")?;

    let slide_type = map
        .get("slide_type")
        .or_else(|| map.get("type"))
        .and_then(Value::as_str)
        .map(SlideType::from_loose)
        .unwrap_or_default();

    let bullets = ["bullets", "slide_bullets", "points"]
        .iter()
        .find_map(|key| map.get(*key))
        .map(|value| bullets_from_value(value, warnings, position))
        .unwrap_or_default();

    let visuals = map
        .get("visuals")
        .or_else(|| map.get("slide_visuals"))
        .and_then(Value::as_object)
        .map(|v| VisualSuggestion {
            icons: list_field(v, &["icons", "slide_icons"]),
            symbols: list_field(v, &["symbols", "slide_symbols"]),
            image_ideas: list_field(v, &["image_ideas", "slide_image_ideas"]),
        })
        .filter(|v| !v.is_empty());

    Ok(SlideFragment {
        slide_type,
        title,
        subtitle: text_field(map, &["subtitle"]),
        bullets,
        speaker_notes: text_field(map, &["speaker_notes", "notes"]),
        visuals,
    })
}

/// Bullets arrive as plain strings or as objects with presentation hints.
fn bullets_from_value(value: &Value, warnings: &mut Vec<String>, position: usize) -> Vec<Bullet> {
    let entries = match value {
        Value::Array(entries) => entries.as_slice(),
        other => return scalar_text(other).map(Bullet::plain).into_iter().collect(),
    };

    let mut bullets = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        match entry {
            Value::Object(map) => match text_field(map, &["text", "content", "point"]) {
                Some(text) => bullets.push(Bullet {
                    text,
                    icon: text_field(map, &["icon"]),
                    emoji: text_field(map, &["emoji"]),
                    color: text_field(map, &["color"]),
                }),
                None => warnings.push(format!(
                    "slide {position}: bullet {} dropped: no text",
                    i + 1
                )),
            },
            other => {
                if let Some(text) = scalar_text(other) {
                    bullets.push(Bullet::plain(text));
                }
            }
        }
    }
    bullets
}

/// A script as proposed by the generator, before it is matched to a slide.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptDraft {
    pub slide_number: Option<u32>,
    pub slide_explanation: Option<String>,
    pub script: String,
    pub key_points: Vec<String>,
    pub talking_points: Option<String>,
    pub estimated_duration_seconds: Option<f64>,
    pub transition_to_next: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedScripts {
    pub drafts: Vec<ScriptDraft>,
    pub warnings: Vec<String>,
}

/// Parse one script group's answer. Entries without script text are dropped.
pub fn parse_scripts(raw: &str) -> Result<ParsedScripts, StructureError> {
    let value = parse_json(raw)?;
    let items = items(value, "scripts", raw)?;

    let mut drafts = Vec::with_capacity(items.len());
    let mut warnings = Vec::new();
    let mut dropped = 0;

    for (i, item) in items.iter().enumerate() {
        match script_from_value(item) {
            Ok(draft) => drafts.push(draft),
            Err(reason) => {
                dropped += 1;
                warnings.push(format!("script {} dropped: {reason}", i + 1));
            }
        }
    }

    if drafts.is_empty() {
        return Err(StructureError::EmptyResult { dropped });
    }
    Ok(ParsedScripts { drafts, warnings })
}

fn script_from_value(value: &Value) -> Result<ScriptDraft, String> {
    let Value::Object(map) = value else {
        return Err(format!("expected an object, got {}", kind_of(value)));
    };
    let script = text_field(map, &["script", "speaker_script"]).ok_or("missing script text")?;

    let slide_number = number_field(map, &["slide_number"])
        .filter(|n| n.fract() == 0.0 && *n >= 1.0 && *n <= f64::from(u32::MAX))
        .map(|n| n as u32);
    let talking_points = match map.get("talking_points") {
        Some(Value::Array(_)) => {
            let list = list_field(map, &["talking_points"]);
            (!list.is_empty()).then(|| list.join("\n"))
        }
        _ => text_field(map, &["talking_points"]),
    };

    Ok(ScriptDraft {
        slide_number,
        slide_explanation: text_field(map, &["slide_explanation"]),
        script,
        key_points: list_field(map, &["key_points"]),
        talking_points,
        estimated_duration_seconds: number_field(map, &["estimated_duration_seconds"])
            .filter(|d| d.is_finite() && *d > 0.0),
        transition_to_next: text_field(map, &["transition_to_next"]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_array_parses_directly() {
        let parsed = parse_slides(
            r#"[{"slide_type":"title","title":"Intro","subtitle":"Why it matters","bullets":[]}]"#,
        )
        .unwrap();
        assert_eq!(parsed.slides.len(), 1);
        assert_eq!(parsed.slides[0].slide_type, SlideType::Title);
        assert_eq!(parsed.slides[0].subtitle.as_deref(), Some("Why it matters"));
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn prose_and_fences_are_stripped() {
        let raw = "Sure! Here are your slides:\n```json\n[{\"title\": \"Roots\", \"bullets\": [\"Anchor plants\"]}]\n```\nLet me know if you need more.";
        let parsed = parse_slides(raw).unwrap();
        assert_eq!(parsed.slides[0].title, "Roots");
        assert_eq!(parsed.slides[0].bullets, vec![Bullet::plain("Anchor plants")]);
    }

    #[test]
    fn trailing_commas_are_removed_outside_strings() {
        let raw = r#"[{"title": "Lists, commas,", "bullets": ["a, ]", "b",],},]"#;
        let parsed = parse_slides(raw).unwrap();
        assert_eq!(parsed.slides[0].title, "Lists, commas,");
        assert_eq!(parsed.slides[0].bullets.len(), 2);
        assert_eq!(parsed.slides[0].bullets[0].text, "a, ]");
    }

    #[test]
    fn truncated_output_is_closed() {
        let raw = r#"[{"title": "Complete", "bullets": ["one"]}, {"title": "Cut off", "bullets": ["half a sent"#;
        let parsed = parse_slides(raw).unwrap();
        assert_eq!(parsed.slides.len(), 2);
        assert_eq!(parsed.slides[1].bullets[0].text, "half a sent");
    }

    #[test]
    fn raw_newlines_inside_strings_are_escaped() {
        let raw = "[{\"slide_number\": 1, \"script\": \"So here's the thing.\nNext paragraph.\",\n  \"estimated_duration_seconds\": 45}]";
        let parsed = parse_scripts(raw).unwrap();
        assert_eq!(parsed.drafts.len(), 1);
        assert_eq!(parsed.drafts[0].script, "So here's the thing.\nNext paragraph.");
        assert_eq!(parsed.drafts[0].estimated_duration_seconds, Some(45.0));
    }

    #[test]
    fn truncated_output_with_raw_tab_is_escaped_and_closed() {
        let raw = "[{\"title\": \"Cut\", \"bullets\": [\"col\tumn";
        let parsed = parse_slides(raw).unwrap();
        assert_eq!(parsed.slides[0].bullets[0].text, "col\tumn");
    }

    #[test]
    fn unparseable_output_is_malformed_with_excerpt() {
        let err = parse_slides("I'm sorry, I can't help with that.").unwrap_err();
        match err {
            StructureError::Malformed { raw_excerpt, .. } => {
                assert!(raw_excerpt.starts_with("I'm sorry"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn scalar_json_is_malformed() {
        assert!(matches!(
            parse_slides("42"),
            Err(StructureError::Malformed { .. })
        ));
    }

    #[test]
    fn bullets_normalize_from_strings_and_objects() {
        let raw = r#"[{"title":"Growth","bullets":[
            "Plain bullet",
            {"text":"Sales up 45%","icon":"trending-up","emoji":"📈","color":"green"},
            {"icon":"orphan"},
            7
        ]}]"#;
        let parsed = parse_slides(raw).unwrap();
        let bullets = &parsed.slides[0].bullets;
        assert_eq!(bullets.len(), 3);
        assert_eq!(bullets[0], Bullet::plain("Plain bullet"));
        assert_eq!(bullets[1].emoji.as_deref(), Some("📈"));
        assert_eq!(bullets[1].color.as_deref(), Some("green"));
        assert_eq!(bullets[2].text, "7");
        assert_eq!(parsed.warnings, vec!["slide 1: bullet 3 dropped: no text"]);
    }

    #[test]
    fn key_aliases_are_accepted() {
        let raw = r#"{"presentation_title":"Deck","slides":[{
            "type":"conclusion","title":"Wrap up",
            "slide_bullets":["Done"],
            "slide_visuals":{"slide_icons":["check"],"slide_image_ideas":["A finish line"]}
        }]}"#;
        let parsed = parse_slides(raw).unwrap();
        let slide = &parsed.slides[0];
        assert_eq!(slide.slide_type, SlideType::Closing);
        assert_eq!(slide.bullets.len(), 1);
        let visuals = slide.visuals.as_ref().unwrap();
        assert_eq!(visuals.icons, vec!["check"]);
        assert_eq!(visuals.image_ideas, vec!["A finish line"]);
        assert!(visuals.symbols.is_empty());
    }

    #[test]
    fn untitled_slides_are_dropped_with_warning() {
        let raw = r#"[{"title":"Kept"},{"title":"   "},{"bullets":["orphan"]},"text"]"#;
        let parsed = parse_slides(raw).unwrap();
        assert_eq!(parsed.slides.len(), 1);
        assert_eq!(parsed.warnings.len(), 3);
        assert!(parsed.warnings[0].starts_with("slide 2 dropped"));
    }

    #[test]
    fn all_invalid_slides_is_empty_result() {
        let err = parse_slides(r#"[{"subtitle":"no title"},{"title":""}]"#).unwrap_err();
        assert_eq!(err, StructureError::EmptyResult { dropped: 2 });
        assert_eq!(
            parse_slides("[]").unwrap_err(),
            StructureError::EmptyResult { dropped: 0 }
        );
    }

    #[test]
    fn single_slide_object_is_wrapped() {
        let parsed = parse_slides(r#"{"title":"Alone","bullets":["x"]}"#).unwrap();
        assert_eq!(parsed.slides.len(), 1);
    }

    #[test]
    fn scripts_parse_with_loose_fields() {
        let raw = r#"Here you go: [
            {"slide_number": "3", "script": "So here's the thing...", "key_points": "one point",
             "talking_points": ["pause", "smile"], "estimated_duration_seconds": "75",
             "transition_to_next": "", "slide_explanation": "Context"},
            {"slide_number": 4, "script": "  ", "estimated_duration_seconds": 60},
            {"script": "Wrap up", "estimated_duration_seconds": -5},
        ]"#;
        let parsed = parse_scripts(raw).unwrap();
        assert_eq!(parsed.drafts.len(), 2);
        let first = &parsed.drafts[0];
        assert_eq!(first.slide_number, Some(3));
        assert_eq!(first.key_points, vec!["one point"]);
        assert_eq!(first.talking_points.as_deref(), Some("pause\nsmile"));
        assert_eq!(first.estimated_duration_seconds, Some(75.0));
        assert_eq!(first.transition_to_next, None);
        let last = &parsed.drafts[1];
        assert_eq!(last.slide_number, None);
        assert_eq!(last.estimated_duration_seconds, None);
        assert_eq!(parsed.warnings, vec!["script 2 dropped: missing script text"]);
    }

    #[test]
    fn scripts_wrapped_in_object_are_found() {
        let parsed =
            parse_scripts(r#"{"scripts":[{"slide_number":1,"script":"Hello"}]}"#).unwrap();
        assert_eq!(parsed.drafts[0].script, "Hello");
    }
}
