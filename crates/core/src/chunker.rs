//! Splits raw input into word-bounded chunks along paragraph boundaries.

use crate::types::Chunk;

/// Rough generator tokens per whitespace-separated word.
pub const TOKENS_PER_WORD: f64 = 1.3;

const PARAGRAPH_SEPARATOR: &str = "\n\n";

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Split `body` into ordered chunks of at most `max_words` words.
///
/// Paragraphs (blank-line delimited) are packed greedily. A paragraph longer
/// than the budget is cut at word boundaries; the cut pieces are re-joined
/// with single spaces.
pub fn chunk(body: &str, max_words: usize) -> Vec<Chunk> {
    let max_words = max_words.max(1);
    let total = word_count(body);

    if total <= max_words {
        return vec![Chunk {
            index: 0,
            text: body.to_string(),
            word_count: total,
        }];
    }

    let mut builder = ChunkBuilder::new(max_words);
    for paragraph in paragraphs(body) {
        let words = word_count(&paragraph);
        if words > max_words {
            builder.push_oversized(&paragraph);
        } else {
            builder.push(paragraph, words);
        }
    }
    builder.finish()
}

/// Blank-line delimited paragraphs, trimmed, never empty.
fn paragraphs(body: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in body.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(current.join("\n").trim().to_string());
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        out.push(current.join("\n").trim().to_string());
    }
    out
}

struct ChunkBuilder {
    max_words: usize,
    chunks: Vec<Chunk>,
    pending: Vec<String>,
    pending_words: usize,
}

impl ChunkBuilder {
    fn new(max_words: usize) -> Self {
        Self {
            max_words,
            chunks: Vec::new(),
            pending: Vec::new(),
            pending_words: 0,
        }
    }

    fn push(&mut self, paragraph: String, words: usize) {
        if self.pending_words + words > self.max_words {
            self.flush();
        }
        self.pending.push(paragraph);
        self.pending_words += words;
    }

    /// Hard-split a paragraph that alone exceeds the budget. The trailing
    /// remainder stays pending so following paragraphs can join it.
    fn push_oversized(&mut self, paragraph: &str) {
        self.flush();
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        let mut pieces = words.chunks(self.max_words).peekable();
        while let Some(piece) = pieces.next() {
            let text = piece.join(" ");
            if pieces.peek().is_some() {
                self.emit(text, piece.len());
            } else {
                self.pending.push(text);
                self.pending_words = piece.len();
            }
        }
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let text = self.pending.join(PARAGRAPH_SEPARATOR);
        let words = self.pending_words;
        self.pending.clear();
        self.pending_words = 0;
        self.emit(text, words);
    }

    fn emit(&mut self, text: String, word_count: usize) {
        self.chunks.push(Chunk {
            index: self.chunks.len(),
            text,
            word_count,
        });
    }

    fn finish(mut self) -> Vec<Chunk> {
        self.flush();
        self.chunks
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkStatistics {
    pub total_chunks: usize,
    pub chunk_words: Vec<usize>,
    pub total_words: usize,
    pub estimated_tokens: usize,
}

pub fn chunk_statistics(chunks: &[Chunk]) -> ChunkStatistics {
    let chunk_words: Vec<usize> = chunks.iter().map(|c| c.word_count).collect();
    let total_words = chunk_words.iter().sum();
    ChunkStatistics {
        total_chunks: chunks.len(),
        estimated_tokens: (total_words as f64 * TOKENS_PER_WORD) as usize,
        chunk_words,
        total_words,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(prefix: &str, words: usize) -> String {
        (0..words)
            .map(|i| format!("{prefix}{i}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn words_of(chunks: &[Chunk]) -> Vec<String> {
        chunks
            .iter()
            .flat_map(|c| c.text.split_whitespace().map(str::to_string))
            .collect()
    }

    #[test]
    fn short_body_is_one_chunk_verbatim() {
        let body = "  One paragraph.\n\nAnother one.  ";
        let chunks = chunk(body, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, body);
        assert_eq!(chunks[0].word_count, 4);
    }

    #[test]
    fn empty_body_yields_single_empty_chunk() {
        let chunks = chunk("", 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].word_count, 0);
        assert!(chunks[0].text.is_empty());
    }

    #[test]
    fn twelve_hundred_words_split_five_hundred() {
        let body = (0..12)
            .map(|p| paragraph(&format!("p{p}w"), 100))
            .collect::<Vec<_>>()
            .join("\n\n");

        let chunks = chunk(&body, 500);
        let counts: Vec<usize> = chunks.iter().map(|c| c.word_count).collect();
        assert_eq!(counts, vec![500, 500, 200]);
        assert_eq!(
            chunks.iter().map(|c| c.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(chunks[0].text.contains("\n\n"));
    }

    #[test]
    fn greedy_packing_never_exceeds_budget() {
        let body = [30, 50, 40, 10, 60, 5]
            .iter()
            .enumerate()
            .map(|(i, n)| paragraph(&format!("x{i}_"), *n))
            .collect::<Vec<_>>()
            .join("\n\n");

        let chunks = chunk(&body, 80);
        assert!(chunks.iter().all(|c| c.word_count <= 80 && c.word_count > 0));
        assert_eq!(
            chunks.iter().map(|c| c.word_count).collect::<Vec<_>>(),
            vec![80, 50, 65]
        );
    }

    #[test]
    fn oversized_paragraph_is_cut_between_words() {
        let body = format!(
            "{}\n\n{}",
            paragraph("long", 25),
            paragraph("tail", 3)
        );
        let chunks = chunk(&body, 10);
        let counts: Vec<usize> = chunks.iter().map(|c| c.word_count).collect();
        assert_eq!(counts, vec![10, 10, 8]);
        assert!(chunks[2].text.starts_with("long20"));
        assert!(chunks[2].text.ends_with("tail2"));
    }

    #[test]
    fn reconstruction_preserves_word_sequence() {
        let body = format!(
            "{}\n   \n{}\n\n\n{}\nstill same paragraph\n\n{}",
            paragraph("a", 7),
            paragraph("b", 23),
            paragraph("c", 4),
            paragraph("d", 11)
        );
        for max_words in [1, 3, 5, 8, 13, 100] {
            let chunks = chunk(&body, max_words);
            let expected: Vec<String> = body.split_whitespace().map(str::to_string).collect();
            assert_eq!(words_of(&chunks), expected, "max_words={max_words}");
            let total: usize = chunks.iter().map(|c| c.word_count).sum();
            assert_eq!(total, expected.len());
            assert!(chunks.iter().all(|c| !c.text.trim().is_empty()));
        }
    }

    #[test]
    fn zero_budget_is_treated_as_one_word() {
        let chunks = chunk("alpha beta gamma", 0);
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn statistics_sum_chunk_words() {
        let chunks = chunk(&format!("{}\n\n{}", paragraph("a", 6), paragraph("b", 4)), 6);
        let stats = chunk_statistics(&chunks);
        assert_eq!(stats.total_chunks, 2);
        assert_eq!(stats.chunk_words, vec![6, 4]);
        assert_eq!(stats.total_words, 10);
        assert_eq!(stats.estimated_tokens, 13);
    }
}
