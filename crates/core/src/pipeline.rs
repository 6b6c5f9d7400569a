//! Pipeline orchestrator: sequences chunking, generation, validation,
//! assembly and script timing. Owns retries, fallbacks and the overall
//! timeout, and is the only place with end-to-end failure visibility.

use std::{future::Future, sync::Arc};

use tokio::{
    sync::Semaphore,
    task::JoinSet,
    time::{Instant, timeout_at},
};
use tracing::{debug, info, warn};

use crate::{
    assembler::{Assembler, ChunkResult},
    chunker::{self, chunk_statistics, word_count},
    client::GenerationClient,
    config::{GenerationConfig, PipelineConfig},
    error::{GenerationError, PipelineError},
    events::{EventSender, EventSink, PipelineEvent},
    prompt::PromptContext,
    scripts::{self, GroupScripts, ScriptGroup, ScriptPlan},
    structure::{self, ParsedSlides},
    types::{Chunk, Deck, DeckResponse, RawInput, ScriptSet},
};

/// A generated deck plus everything that degraded it.
#[derive(Debug, Clone)]
pub struct DeckOutcome {
    pub deck: Deck,
    pub warnings: Vec<String>,
    /// `PartialFailure` and/or `Timeout` when chunks were skipped.
    pub degraded: Vec<PipelineError>,
}

impl DeckOutcome {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    /// Client-facing result shape.
    pub fn response(&self) -> DeckResponse {
        DeckResponse {
            slides: self.deck.slides.clone(),
            total_slides: self.deck.len(),
            warnings: self.warnings.clone(),
        }
    }
}

pub struct Pipeline {
    client: GenerationClient,
    config: PipelineConfig,
    events: EventSink,
}

impl Pipeline {
    pub fn new(client: GenerationClient, config: PipelineConfig) -> Self {
        Self {
            client,
            config,
            events: EventSink::default(),
        }
    }

    pub fn with_events(mut self, sender: EventSender) -> Self {
        self.events = EventSink::new(Some(sender));
        self
    }

    /// Turn raw input into a numbered deck.
    ///
    /// Chunks are generated concurrently (bounded by `max_in_flight`) and
    /// joined before numbering. Fails only on invalid input or when no chunk
    /// produced a usable slide.
    pub async fn generate_deck(&self, input: &RawInput) -> Result<DeckOutcome, PipelineError> {
        input.validate()?;

        let total_words = word_count(&input.body);
        let chunked = input.chunking || total_words > self.config.chunking.auto_chunk_threshold_words;
        let chunks = if chunked {
            chunker::chunk(&input.body, self.config.chunking.max_words_per_chunk)
        } else {
            vec![Chunk {
                index: 0,
                text: input.body.clone(),
                word_count: total_words,
            }]
        };

        let stats = chunk_statistics(&chunks);
        info!(
            chunks = stats.total_chunks,
            words = stats.total_words,
            estimated_tokens = stats.estimated_tokens,
            model = self.client.model_name(),
            "generating deck"
        );
        debug!(chunk_words = ?stats.chunk_words, "chunk plan");
        self.events.emit(PipelineEvent::ChunksPlanned {
            total: stats.total_chunks,
            words: stats.total_words,
            estimated_tokens: stats.estimated_tokens,
        });

        let total = chunks.len();
        let semaphore = Arc::new(Semaphore::new(self.config.pipeline.max_in_flight.max(1)));
        let mut tasks = JoinSet::new();

        for chunk in chunks {
            let context = PromptContext {
                topic: input.topic.clone(),
                audience: input.audience.clone(),
                tone: input.tone,
                subject: input.subject,
                slide_hint: slide_hint(input.slide_target, &chunk, total_words, total),
                visuals: input.visuals,
            };
            let client = self.client.clone();
            let semaphore = Arc::clone(&semaphore);
            let events = self.events.clone();

            tasks.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => run_chunk(&client, &context, &chunk, total, &events).await,
                    Err(e) => Err(e.to_string()),
                };
                ChunkResult {
                    chunk_index: chunk.index,
                    outcome,
                }
            });
        }

        let deadline = Instant::now() + self.config.pipeline.overall_timeout();
        let mut results = Vec::with_capacity(total);
        let mut timed_out = false;
        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(result))) => results.push(result),
                Ok(Some(Err(e))) => warn!(error = %e, "chunk task did not finish"),
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    tasks.abort_all();
                    break;
                }
            }
        }

        let completed = results.len();
        let abandoned = if timed_out {
            "abandoned at overall timeout"
        } else {
            "task aborted"
        };
        for index in 0..total {
            if !results.iter().any(|r| r.chunk_index == index) {
                results.push(ChunkResult::failed(index, abandoned));
            }
        }

        let assembler = Assembler {
            total_chunks: total,
            slide_target: input.slide_target,
            tolerance: self.config.assembly.slide_count_tolerance,
        };
        let assembled = assembler.assemble(&input.topic, input.tone, results)?;

        let mut degraded: Vec<PipelineError> = assembled.partial_failure.into_iter().collect();
        if timed_out {
            warn!(completed, total, "overall timeout reached");
            degraded.push(PipelineError::Timeout { completed, total });
        }

        self.events.emit(PipelineEvent::DeckAssembled {
            slides: assembled.deck.len(),
            warnings: assembled.warnings.len(),
        });

        Ok(DeckOutcome {
            deck: assembled.deck,
            warnings: assembled.warnings,
            degraded,
        })
    }

    /// Generate timed speaker scripts for every slide of `deck`.
    ///
    /// Never aborts once the plan is valid: groups that cannot be generated
    /// get fallback scripts built from the slide content.
    pub async fn generate_scripts(
        &self,
        deck: &Deck,
        total_minutes: f64,
        chunk_mode: bool,
    ) -> Result<ScriptSet, PipelineError> {
        let plan = ScriptPlan::new(
            deck.len(),
            total_minutes,
            chunk_mode,
            self.config.scripts.group_size,
        )?;
        let groups = plan.groups(deck);
        let total_groups = groups.len();

        info!(
            slides = deck.len(),
            groups = total_groups,
            minutes = total_minutes,
            baseline_seconds = plan.baseline_seconds,
            "generating scripts"
        );
        self.events.emit(PipelineEvent::ScriptGroupsPlanned {
            groups: total_groups,
            slides: deck.len(),
        });

        let semaphore = Arc::new(Semaphore::new(self.config.pipeline.max_in_flight.max(1)));
        let mut tasks = JoinSet::new();
        for group in groups.iter().cloned() {
            let client = self.client.clone();
            let semaphore = Arc::clone(&semaphore);
            let events = self.events.clone();

            tasks.spawn(async move {
                let scripts = match semaphore.acquire_owned().await {
                    Ok(_permit) => run_group(&client, &group).await,
                    Err(e) => group.fallback(&e.to_string()),
                };
                events.emit(PipelineEvent::ScriptGroupCompleted {
                    group: group.group_index,
                    total: group.total_groups,
                    fallback: scripts.fallback,
                });
                (group.group_index, scripts)
            });
        }

        let deadline = Instant::now() + self.config.pipeline.overall_timeout();
        let mut finished: Vec<Option<GroupScripts>> = vec![None; total_groups];
        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((index, scripts)))) => finished[index] = Some(scripts),
                Ok(Some(Err(e))) => warn!(error = %e, "script group task did not finish"),
                Ok(None) => break,
                Err(_) => {
                    warn!("overall timeout reached while generating scripts");
                    tasks.abort_all();
                    break;
                }
            }
        }

        let mut units = Vec::with_capacity(deck.len());
        let mut warnings = Vec::new();
        for (group, scripts) in groups.iter().zip(finished) {
            let scripts = scripts.unwrap_or_else(|| group.fallback("not completed in time"));
            units.extend(scripts.units);
            warnings.extend(scripts.warnings);
        }

        Ok(scripts::finish(
            &plan,
            units,
            warnings,
            self.config.scripts.duration_tolerance,
        ))
    }
}

/// Proportional share of an explicit slide target for one chunk.
fn slide_hint(target: Option<u32>, chunk: &Chunk, total_words: usize, total_chunks: usize) -> Option<u32> {
    let target = target?;
    if total_chunks <= 1 || total_words == 0 {
        return Some(target);
    }
    let share = f64::from(target) * chunk.word_count as f64 / total_words as f64;
    Some((share.round() as u32).max(1))
}

/// Call the generator, retrying retryable failures with linear backoff.
async fn with_retries<F, Fut>(
    config: &GenerationConfig,
    what: &str,
    mut call: F,
) -> Result<String, GenerationError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<String, GenerationError>>,
{
    let mut attempt = 1;
    loop {
        match call(attempt).await {
            Err(e) if e.is_retryable() && attempt <= config.max_retries => {
                let delay = config.retry_backoff(attempt);
                warn!(what, attempt, error = %e, ?delay, "generation call failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

async fn run_chunk(
    client: &GenerationClient,
    context: &PromptContext,
    chunk: &Chunk,
    total: usize,
    events: &EventSink,
) -> Result<ParsedSlides, String> {
    let what = format!("chunk {}/{}", chunk.index + 1, total);
    let raw = with_retries(client.config(), &what, move |attempt| {
        events.emit(PipelineEvent::ChunkStarted {
            index: chunk.index,
            total,
            attempt,
        });
        client.generate(context, chunk, total)
    })
    .await;

    let parsed = raw
        .map_err(|e| e.to_string())
        .and_then(|raw| structure::parse_slides(&raw).map_err(|e| e.to_string()));

    match &parsed {
        Ok(slides) => events.emit(PipelineEvent::ChunkSucceeded {
            index: chunk.index,
            total,
            slides: slides.slides.len(),
        }),
        Err(reason) => {
            warn!(chunk = chunk.index, %reason, "chunk failed");
            events.emit(PipelineEvent::ChunkFailed {
                index: chunk.index,
                total,
                reason: reason.clone(),
            });
        }
    }
    parsed
}

/// One group: a regular attempt, one strict retry on unparseable output,
/// then fallback.
async fn run_group(client: &GenerationClient, group: &ScriptGroup) -> GroupScripts {
    let what = format!("script group {}/{}", group.group_index + 1, group.total_groups);
    let prompt = group.prompt();

    let prompt = &prompt;
    for strict in [false, true] {
        let raw = with_retries(client.config(), &what, move |_| {
            client.generate_scripts(prompt, strict)
        })
        .await;

        let raw = match raw {
            Ok(raw) => raw,
            Err(e) => return group.fallback(&e.to_string()),
        };

        match structure::parse_scripts(&raw) {
            Ok(parsed) => {
                let mut scripts = group.reconcile(parsed.drafts);
                let prefix = format!("script group {}", group.group_index + 1);
                let mut warnings: Vec<String> = parsed
                    .warnings
                    .iter()
                    .map(|w| format!("{prefix}: {w}"))
                    .collect();
                warnings.append(&mut scripts.warnings);
                scripts.warnings = warnings;
                return scripts;
            }
            Err(e) if !strict => {
                warn!(group = group.group_index, error = %e, "unparseable scripts, retrying with strict prompt");
            }
            Err(e) => return group.fallback(&e.to_string()),
        }
    }

    group.fallback("no usable answer")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(words: usize) -> Chunk {
        Chunk {
            index: 0,
            text: String::new(),
            word_count: words,
        }
    }

    #[test]
    fn slide_hint_is_proportional_with_floor_of_one() {
        assert_eq!(slide_hint(None, &chunk(500), 1200, 3), None);
        assert_eq!(slide_hint(Some(12), &chunk(500), 1200, 3), Some(5));
        assert_eq!(slide_hint(Some(12), &chunk(200), 1200, 3), Some(2));
        assert_eq!(slide_hint(Some(3), &chunk(10), 1200, 3), Some(1));
        assert_eq!(slide_hint(Some(7), &chunk(1200), 1200, 1), Some(7));
    }
}
