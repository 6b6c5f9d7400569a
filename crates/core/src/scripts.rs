//! Script timing engine: plans slide groups, reconciles generated scripts
//! against the deck and builds the final [`ScriptSet`].
//!
//! The generator's `estimated_duration_seconds` is authoritative. The engine
//! only falls back to the arithmetic baseline when a value is missing or a
//! whole group could not be produced.

use std::ops::Range;

use tracing::warn;

use crate::{
    config::ScriptsConfig,
    error::PipelineError,
    prompt::ScriptGroupPrompt,
    structure::ScriptDraft,
    types::{Deck, DeckSlide, ProcessingMode, ScriptMetadata, ScriptSet, ScriptUnit, Tone},
};

/// Whether a deck is large enough to script in groups.
pub fn auto_chunk_mode(deck: &Deck, config: &ScriptsConfig) -> bool {
    deck.len() > config.auto_chunk_threshold_slides
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptPlan {
    pub total_minutes: f64,
    pub baseline_seconds: f64,
    pub mode: ProcessingMode,
    pub groups: Vec<Range<usize>>,
}

impl ScriptPlan {
    pub fn new(
        slide_count: usize,
        total_minutes: f64,
        chunk_mode: bool,
        group_size: usize,
    ) -> Result<Self, PipelineError> {
        if slide_count == 0 {
            return Err(PipelineError::InvalidInput {
                reason: "deck has no slides".to_string(),
            });
        }
        if !(total_minutes.is_finite() && total_minutes > 0.0) {
            return Err(PipelineError::InvalidInput {
                reason: format!("duration must be a positive number of minutes, got {total_minutes}"),
            });
        }

        let (mode, group_size) = if chunk_mode {
            (ProcessingMode::Chunked, group_size.max(1))
        } else {
            (ProcessingMode::Single, slide_count)
        };
        let groups = (0..slide_count)
            .step_by(group_size)
            .map(|start| start..(start + group_size).min(slide_count))
            .collect();

        Ok(Self {
            total_minutes,
            baseline_seconds: total_minutes * 60.0 / slide_count as f64,
            mode,
            groups,
        })
    }

    pub fn total_seconds(&self) -> f64 {
        self.total_minutes * 60.0
    }

    /// Owned per-group jobs, ready to be sent to concurrent tasks.
    pub fn groups(&self, deck: &Deck) -> Vec<ScriptGroup> {
        let total_groups = self.groups.len();
        self.groups
            .iter()
            .enumerate()
            .map(|(group_index, range)| {
                let title_at = |i: usize| deck.slides.get(i).map(|s| s.slide.title.clone());
                ScriptGroup {
                    group_index,
                    total_groups,
                    deck_title: deck.title.clone(),
                    tone: deck.tone,
                    slides: deck.slides[range.clone()].to_vec(),
                    total_minutes: self.total_minutes,
                    baseline_seconds: self.baseline_seconds,
                    previous_title: range.start.checked_sub(1).and_then(title_at),
                    next_title: title_at(range.end),
                }
            })
            .collect()
    }
}

/// One group of slides scripted by a single generation call.
#[derive(Debug, Clone)]
pub struct ScriptGroup {
    pub group_index: usize,
    pub total_groups: usize,
    pub deck_title: String,
    pub tone: Tone,
    pub slides: Vec<DeckSlide>,
    pub total_minutes: f64,
    pub baseline_seconds: f64,
    pub previous_title: Option<String>,
    pub next_title: Option<String>,
}

/// Scripts produced for one group plus what went wrong on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupScripts {
    pub units: Vec<ScriptUnit>,
    pub warnings: Vec<String>,
    pub fallback: bool,
}

impl ScriptGroup {
    /// This group's share of the total duration.
    pub fn share_seconds(&self) -> f64 {
        self.slides.len() as f64 * self.baseline_seconds
    }

    pub fn prompt(&self) -> ScriptGroupPrompt<'_> {
        ScriptGroupPrompt {
            deck_title: &self.deck_title,
            tone: self.tone,
            group_index: self.group_index,
            total_groups: self.total_groups,
            slides: &self.slides,
            total_minutes: self.total_minutes,
            baseline_seconds: self.baseline_seconds,
            group_seconds: self.share_seconds(),
            previous_title: self.previous_title.as_deref(),
            next_title: self.next_title.as_deref(),
        }
    }

    /// Match drafts to this group's slides.
    ///
    /// Drafts are matched by `slide_number` when every draft carries a number
    /// inside the group, otherwise by position. Slides left without a draft
    /// get a fallback unit; duplicates and extras are dropped.
    pub fn reconcile(&self, drafts: Vec<ScriptDraft>) -> GroupScripts {
        let first = self.slides.first().map_or(1, |s| s.slide_number);
        let slot_of_number = |n: u32| {
            n.checked_sub(first)
                .map(|offset| offset as usize)
                .filter(|slot| *slot < self.slides.len())
        };
        let by_number = drafts
            .iter()
            .all(|d| d.slide_number.and_then(slot_of_number).is_some());

        let mut slots: Vec<Option<ScriptDraft>> = vec![None; self.slides.len()];
        let mut warnings = Vec::new();

        for (position, draft) in drafts.into_iter().enumerate() {
            let slot = if by_number {
                draft.slide_number.and_then(slot_of_number)
            } else {
                Some(position).filter(|p| *p < self.slides.len())
            };
            match slot {
                Some(slot) if slots[slot].is_none() => slots[slot] = Some(draft),
                Some(slot) => warnings.push(format!(
                    "slide {}: duplicate script dropped",
                    self.slides[slot].slide_number
                )),
                None => warnings.push(format!(
                    "script group {}: extra script dropped",
                    self.group_index + 1
                )),
            }
        }

        let mut fallback = false;
        let units = self
            .slides
            .iter()
            .zip(slots)
            .map(|(slide, draft)| match draft {
                Some(draft) => self.unit_from_draft(slide, draft),
                None => {
                    fallback = true;
                    warnings.push(format!(
                        "slide {}: no script returned, using fallback",
                        slide.slide_number
                    ));
                    self.fallback_unit(slide)
                }
            })
            .collect();

        GroupScripts {
            units,
            warnings,
            fallback,
        }
    }

    /// Minimal scripts for every slide of the group.
    pub fn fallback(&self, reason: &str) -> GroupScripts {
        warn!(group = self.group_index, %reason, "using fallback scripts");
        GroupScripts {
            units: self.slides.iter().map(|s| self.fallback_unit(s)).collect(),
            warnings: vec![format!(
                "script group {}/{} fell back to slide content: {reason}",
                self.group_index + 1,
                self.total_groups
            )],
            fallback: true,
        }
    }

    fn unit_from_draft(&self, slide: &DeckSlide, draft: ScriptDraft) -> ScriptUnit {
        ScriptUnit {
            slide_number: slide.slide_number,
            slide_explanation: draft
                .slide_explanation
                .unwrap_or_else(|| slide.slide.title.clone()),
            script: draft.script,
            key_points: draft.key_points,
            talking_points: draft.talking_points.unwrap_or_default(),
            estimated_duration_seconds: draft
                .estimated_duration_seconds
                .unwrap_or(self.baseline_seconds),
            transition_to_next: draft.transition_to_next,
            chunk_index: self.group_index,
        }
    }

    fn fallback_unit(&self, slide: &DeckSlide) -> ScriptUnit {
        let key_points: Vec<String> = slide.slide.bullets.iter().map(|b| b.text.clone()).collect();
        let script = if key_points.is_empty() {
            slide
                .slide
                .speaker_notes
                .clone()
                .unwrap_or_else(|| slide.slide.title.clone())
        } else {
            key_points.join(" ")
        };

        ScriptUnit {
            slide_number: slide.slide_number,
            slide_explanation: slide.slide.title.clone(),
            script,
            key_points,
            talking_points: slide.slide.speaker_notes.clone().unwrap_or_default(),
            estimated_duration_seconds: self.baseline_seconds,
            transition_to_next: None,
            chunk_index: self.group_index,
        }
    }
}

/// Order units by slide number and attach metadata.
pub fn finish(
    plan: &ScriptPlan,
    mut units: Vec<ScriptUnit>,
    mut warnings: Vec<String>,
    duration_tolerance: f64,
) -> ScriptSet {
    units.sort_by_key(|u| u.slide_number);
    if let Some(last) = units.last_mut() {
        last.transition_to_next = None;
    }

    let target = plan.total_seconds();
    let total: f64 = units.iter().map(|u| u.estimated_duration_seconds).sum();
    let drift = (total - target).abs() / target;
    if drift > duration_tolerance {
        warnings.push(format!(
            "script durations sum to {total:.0}s against a target of {target:.0}s ({:.0}% off)",
            drift * 100.0
        ));
    }

    let slide_count = units.len().max(1) as f64;
    ScriptSet {
        metadata: ScriptMetadata {
            total_duration: plan.total_minutes,
            duration_per_slide: (plan.total_minutes / slide_count * 100.0).round() / 100.0,
            processing_mode: plan.mode,
            num_chunks: plan.groups.len(),
        },
        scripts: units,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Bullet, SlideFragment};

    fn deck(n: usize) -> Deck {
        Deck {
            title: "Soil".into(),
            tone: Tone::Casual,
            slides: (1..=n as u32)
                .map(|i| DeckSlide {
                    slide_number: i,
                    chunk_index: 0,
                    slide: SlideFragment {
                        title: format!("Slide {i}"),
                        bullets: vec![Bullet::plain(format!("b{i}a")), Bullet::plain(format!("b{i}b"))],
                        ..SlideFragment::default()
                    },
                })
                .collect(),
        }
    }

    fn draft(slide_number: Option<u32>, seconds: Option<f64>) -> ScriptDraft {
        ScriptDraft {
            slide_number,
            slide_explanation: None,
            script: format!("script for {slide_number:?}"),
            key_points: vec![],
            talking_points: None,
            estimated_duration_seconds: seconds,
            transition_to_next: Some("next".into()),
        }
    }

    #[test]
    fn plan_splits_into_groups_with_baseline() {
        let plan = ScriptPlan::new(20, 10.0, true, 8).unwrap();
        assert_eq!(plan.groups, vec![0..8, 8..16, 16..20]);
        assert_eq!(plan.baseline_seconds, 30.0);
        assert_eq!(plan.mode, ProcessingMode::Chunked);

        let single = ScriptPlan::new(20, 10.0, false, 8).unwrap();
        assert_eq!(single.groups, vec![0..20]);
        assert_eq!(single.mode, ProcessingMode::Single);
    }

    #[test]
    fn plan_rejects_empty_deck_and_bad_duration() {
        assert!(ScriptPlan::new(0, 10.0, false, 8).is_err());
        assert!(ScriptPlan::new(5, 0.0, false, 8).is_err());
        assert!(ScriptPlan::new(5, f64::NAN, false, 8).is_err());
    }

    #[test]
    fn groups_carry_neighbour_titles_and_share() {
        let deck = deck(5);
        let plan = ScriptPlan::new(5, 5.0, true, 2).unwrap();
        let groups = plan.groups(&deck);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].previous_title, None);
        assert_eq!(groups[0].next_title.as_deref(), Some("Slide 3"));
        assert_eq!(groups[1].previous_title.as_deref(), Some("Slide 2"));
        assert_eq!(groups[2].next_title, None);
        assert_eq!(groups[1].share_seconds(), 120.0);
        assert_eq!(groups[2].slides.len(), 1);
    }

    #[test]
    fn reconcile_matches_by_number_in_any_order() {
        let deck = deck(4);
        let plan = ScriptPlan::new(4, 4.0, true, 2).unwrap();
        let group = &plan.groups(&deck)[1];
        let out = group.reconcile(vec![draft(Some(4), Some(50.0)), draft(Some(3), None)]);

        assert!(!out.fallback);
        assert_eq!(out.units[0].slide_number, 3);
        assert_eq!(out.units[0].estimated_duration_seconds, 60.0);
        assert_eq!(out.units[0].slide_explanation, "Slide 3");
        assert_eq!(out.units[1].estimated_duration_seconds, 50.0);
        assert!(out.units.iter().all(|u| u.chunk_index == 1));
    }

    #[test]
    fn reconcile_falls_back_to_position_for_foreign_numbers() {
        let deck = deck(4);
        let plan = ScriptPlan::new(4, 4.0, true, 2).unwrap();
        let group = &plan.groups(&deck)[1];
        let out = group.reconcile(vec![
            draft(Some(1), Some(40.0)),
            draft(Some(2), Some(45.0)),
            draft(Some(7), Some(45.0)),
        ]);

        let numbers: Vec<u32> = out.units.iter().map(|u| u.slide_number).collect();
        assert_eq!(numbers, vec![3, 4]);
        assert_eq!(out.units[0].estimated_duration_seconds, 40.0);
        assert_eq!(out.warnings, vec!["script group 2: extra script dropped"]);
    }

    #[test]
    fn missing_and_duplicate_drafts_are_reconciled() {
        let deck = deck(3);
        let plan = ScriptPlan::new(3, 3.0, false, 8).unwrap();
        let group = &plan.groups(&deck)[0];
        let out = group.reconcile(vec![draft(Some(1), Some(60.0)), draft(Some(1), Some(10.0))]);

        assert!(out.fallback);
        assert_eq!(out.units.len(), 3);
        assert_eq!(out.units[0].estimated_duration_seconds, 60.0);
        assert_eq!(out.units[1].script, "b2a b2b");
        assert_eq!(out.units[1].estimated_duration_seconds, 60.0);
        assert_eq!(
            out.warnings,
            vec![
                "slide 1: duplicate script dropped",
                "slide 2: no script returned, using fallback",
                "slide 3: no script returned, using fallback",
            ]
        );
    }

    #[test]
    fn fallback_covers_every_slide_with_baseline() {
        let deck = deck(3);
        let plan = ScriptPlan::new(3, 6.0, false, 8).unwrap();
        let group = &plan.groups(&deck)[0];
        let out = group.fallback("Malformed generator output");

        assert!(out.fallback);
        assert_eq!(out.units.len(), 3);
        assert!(out.units.iter().all(|u| u.estimated_duration_seconds == 120.0));
        assert_eq!(out.units[2].slide_explanation, "Slide 3");
        assert_eq!(out.units[2].key_points, vec!["b3a", "b3b"]);
    }

    #[test]
    fn finish_sorts_and_builds_metadata() {
        let deck = deck(3);
        let plan = ScriptPlan::new(3, 2.0, true, 2).unwrap();
        let groups = plan.groups(&deck);
        let mut units = groups[1].fallback("x").units;
        units.extend(groups[0].reconcile(vec![draft(Some(1), None), draft(Some(2), None)]).units);

        let set = finish(&plan, units, Vec::new(), 0.05);
        let numbers: Vec<u32> = set.scripts.iter().map(|u| u.slide_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(set.scripts[0].transition_to_next.as_deref(), Some("next"));
        assert_eq!(set.scripts[2].transition_to_next, None);
        assert_eq!(set.metadata.duration_per_slide, 0.67);
        assert_eq!(set.metadata.num_chunks, 2);
        assert_eq!(set.metadata.processing_mode, ProcessingMode::Chunked);
        assert!((set.total_seconds() - 120.0).abs() < 1e-9);
        assert!(set.warnings.is_empty());
    }

    #[test]
    fn finish_warns_on_duration_drift() {
        let deck = deck(2);
        let plan = ScriptPlan::new(2, 2.0, false, 8).unwrap();
        let group = &plan.groups(&deck)[0];
        let units = group
            .reconcile(vec![draft(Some(1), Some(90.0)), draft(Some(2), Some(90.0))])
            .units;

        let set = finish(&plan, units, Vec::new(), 0.05);
        assert_eq!(set.total_seconds(), 180.0);
        assert_eq!(
            set.warnings,
            vec!["script durations sum to 180s against a target of 120s (50% off)"]
        );
    }

    #[test]
    fn auto_chunk_mode_follows_threshold() {
        let config = ScriptsConfig::default();
        assert!(!auto_chunk_mode(&deck(15), &config));
        assert!(auto_chunk_mode(&deck(16), &config));
    }
}
