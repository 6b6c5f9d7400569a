//! Joins per-chunk slide lists into one globally numbered deck.
//!
//! Numbering is a pure function of the final chunk order: results may arrive
//! in any completion order, they are sorted by chunk index before slide
//! numbers 1..N are assigned.

use tracing::{info, warn};

use crate::{
    error::PipelineError,
    structure::ParsedSlides,
    types::{Deck, DeckSlide, Tone},
};

/// Outcome of one chunk's generation, successful or not.
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub chunk_index: usize,
    pub outcome: Result<ParsedSlides, String>,
}

impl ChunkResult {
    pub fn failed(chunk_index: usize, reason: impl Into<String>) -> Self {
        Self {
            chunk_index,
            outcome: Err(reason.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssembledDeck {
    pub deck: Deck,
    pub warnings: Vec<String>,
    /// Set when some chunks were skipped.
    pub partial_failure: Option<PipelineError>,
}

#[derive(Debug, Clone)]
pub struct Assembler {
    pub total_chunks: usize,
    pub slide_target: Option<u32>,
    /// Relative deviation from `slide_target` tolerated without a warning.
    pub tolerance: f64,
}

impl Assembler {
    pub fn assemble(
        &self,
        title: &str,
        tone: Tone,
        mut results: Vec<ChunkResult>,
    ) -> Result<AssembledDeck, PipelineError> {
        results.sort_by_key(|r| r.chunk_index);

        let total = self.total_chunks.max(results.len());
        let mut slides = Vec::new();
        let mut warnings = Vec::new();
        let mut failures = Vec::new();

        for result in results {
            let label = format!("chunk {}/{}", result.chunk_index + 1, total);
            match result.outcome {
                Ok(parsed) => {
                    warnings.extend(parsed.warnings.iter().map(|w| format!("{label}: {w}")));
                    slides.extend(parsed.slides.into_iter().map(|slide| DeckSlide {
                        slide_number: 0,
                        chunk_index: result.chunk_index,
                        slide,
                    }));
                }
                Err(reason) => {
                    warn!(chunk = result.chunk_index, %reason, "skipping failed chunk");
                    let failure = format!("{label} failed: {reason}");
                    warnings.push(failure.clone());
                    failures.push(failure);
                }
            }
        }

        if slides.is_empty() {
            return Err(PipelineError::NoContent { failures });
        }

        for (i, slide) in slides.iter_mut().enumerate() {
            slide.slide_number = i as u32 + 1;
        }

        if let Some(warning) = self.target_deviation(slides.len()) {
            warnings.push(warning);
        }

        let partial_failure = (!failures.is_empty()).then(|| PipelineError::PartialFailure {
            failed: failures.len(),
            total,
        });

        info!(
            slides = slides.len(),
            chunks = total,
            failed = failures.len(),
            "deck assembled"
        );

        Ok(AssembledDeck {
            deck: Deck {
                title: title.to_string(),
                tone,
                slides,
            },
            warnings,
            partial_failure,
        })
    }

    fn target_deviation(&self, count: usize) -> Option<String> {
        let target = self.slide_target.filter(|t| *t > 0)?;
        let deviation = (count as f64 - f64::from(target)).abs() / f64::from(target);
        (deviation > self.tolerance).then(|| {
            format!(
                "generated {count} slides for a target of {target} ({:.0}% off)",
                deviation * 100.0
            )
        })
    }
}
