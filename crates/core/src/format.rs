use crate::types::{Deck, ScriptSet, SlideType};

/// Format seconds as MM:SS timestamp
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0).round();
    let mins = (seconds / 60.0) as u32;
    let secs = (seconds % 60.0) as u32;
    format!("{:02}:{:02}", mins, secs)
}

fn slide_type_label(slide_type: SlideType) -> &'static str {
    match slide_type {
        SlideType::Title => "Title",
        SlideType::Content => "Content",
        SlideType::Section => "Section",
        SlideType::Closing => "Closing",
    }
}

pub fn format_deck_readable(deck: &Deck) -> String {
    let mut output = String::new();
    output.push_str(&format!("# {}\n\n", deck.title));
    output.push_str(&format!(
        "**Slides:** {} | **Tone:** {}\n\n",
        deck.len(),
        deck.tone
    ));

    for deck_slide in &deck.slides {
        let slide = &deck_slide.slide;
        output.push_str(&format!(
            "## {}. {} ({})\n\n",
            deck_slide.slide_number,
            slide.title,
            slide_type_label(slide.slide_type)
        ));
        if let Some(subtitle) = &slide.subtitle {
            output.push_str(&format!("_{}_\n\n", subtitle));
        }

        for bullet in &slide.bullets {
            match &bullet.emoji {
                Some(emoji) => output.push_str(&format!("{} {}\n", emoji, bullet.text)),
                None => output.push_str(&format!("• {}\n", bullet.text)),
            }
        }
        if !slide.bullets.is_empty() {
            output.push('\n');
        }

        if let Some(visuals) = &slide.visuals {
            if !visuals.image_ideas.is_empty() {
                output.push_str(&format!(
                    "**Image ideas:** {}\n\n",
                    visuals.image_ideas.join("; ")
                ));
            }
        }

        if let Some(notes) = &slide.speaker_notes {
            output.push_str(&format!("> {}\n\n", notes));
        }
    }

    output
}

pub fn format_scripts_readable(deck: &Deck, scripts: &ScriptSet) -> String {
    let mut output = String::new();
    output.push_str(&format!("# Speaker scripts: {}\n\n", deck.title));
    output.push_str(&format!(
        "**Total:** {} | **Per slide:** {:.2} min | **Mode:** {:?} ({} groups)\n\n",
        format_timestamp(scripts.total_seconds()),
        scripts.metadata.duration_per_slide,
        scripts.metadata.processing_mode,
        scripts.metadata.num_chunks
    ));

    let mut elapsed = 0.0;
    for unit in &scripts.scripts {
        let title = deck
            .slides
            .iter()
            .find(|s| s.slide_number == unit.slide_number)
            .map(|s| s.slide.title.as_str())
            .unwrap_or(unit.slide_explanation.as_str());
        let start = format_timestamp(elapsed);
        elapsed += unit.estimated_duration_seconds;
        let end = format_timestamp(elapsed);

        output.push_str(&format!(
            "## [{}–{}] {}. {}\n\n",
            start, end, unit.slide_number, title
        ));
        output.push_str(&format!("{}\n\n", unit.script));

        if !unit.key_points.is_empty() {
            output.push_str("**Key points:**\n");
            for point in &unit.key_points {
                output.push_str(&format!("• {}\n", point));
            }
            output.push('\n');
        }
        if !unit.talking_points.is_empty() {
            output.push_str(&format!("_Notes:_ {}\n\n", unit.talking_points));
        }
        if let Some(transition) = &unit.transition_to_next {
            output.push_str(&format!("→ {}\n\n", transition));
        }
    }

    output.push_str(&format!(
        "**Scripted time:** {} of {:.1} minutes\n",
        format_timestamp(scripts.total_seconds()),
        scripts.metadata.total_duration
    ));

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Bullet, DeckSlide, ProcessingMode, ScriptMetadata, ScriptUnit, SlideFragment, Tone,
    };

    fn deck() -> Deck {
        Deck {
            title: "Composting".into(),
            tone: Tone::Casual,
            slides: vec![
                DeckSlide {
                    slide_number: 1,
                    chunk_index: 0,
                    slide: SlideFragment {
                        slide_type: SlideType::Title,
                        title: "Composting 101".into(),
                        subtitle: Some("Turning scraps into soil".into()),
                        ..SlideFragment::default()
                    },
                },
                DeckSlide {
                    slide_number: 2,
                    chunk_index: 0,
                    slide: SlideFragment {
                        title: "Greens and browns".into(),
                        bullets: vec![
                            Bullet {
                                emoji: Some("🥬".into()),
                                ..Bullet::plain("Greens bring nitrogen")
                            },
                            Bullet::plain("Browns bring carbon"),
                        ],
                        speaker_notes: Some("Aim for a 3:1 ratio.".into()),
                        ..SlideFragment::default()
                    },
                },
            ],
        }
    }

    fn unit(slide_number: u32, seconds: f64, transition: Option<&str>) -> ScriptUnit {
        ScriptUnit {
            slide_number,
            slide_explanation: "explanation".into(),
            script: format!("Script {slide_number}"),
            key_points: vec!["point".into()],
            talking_points: String::new(),
            estimated_duration_seconds: seconds,
            transition_to_next: transition.map(str::to_string),
            chunk_index: 0,
        }
    }

    #[test]
    fn timestamps_are_minutes_and_seconds() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(75.0), "01:15");
        assert_eq!(format_timestamp(599.6), "10:00");
    }

    #[test]
    fn deck_renders_bullets_with_emoji() {
        let readable = format_deck_readable(&deck());
        assert!(readable.starts_with("# Composting\n"));
        assert!(readable.contains("## 1. Composting 101 (Title)"));
        assert!(readable.contains("_Turning scraps into soil_"));
        assert!(readable.contains("🥬 Greens bring nitrogen"));
        assert!(readable.contains("• Browns bring carbon"));
        assert!(readable.contains("> Aim for a 3:1 ratio."));
    }

    #[test]
    fn scripts_render_running_timestamps() {
        let scripts = ScriptSet {
            scripts: vec![unit(1, 45.0, Some("Let's dig in")), unit(2, 90.0, None)],
            metadata: ScriptMetadata {
                total_duration: 2.5,
                duration_per_slide: 1.13,
                processing_mode: ProcessingMode::Single,
                num_chunks: 1,
            },
            warnings: vec![],
        };
        let readable = format_scripts_readable(&deck(), &scripts);
        assert!(readable.contains("## [00:00–00:45] 1. Composting 101"));
        assert!(readable.contains("## [00:45–02:15] 2. Greens and browns"));
        assert!(readable.contains("→ Let's dig in"));
        assert!(readable.contains("**Scripted time:** 02:15 of 2.5 minutes"));
    }
}
