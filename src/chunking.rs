//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and four implementations:
//!
//! - [`ParagraphChunker`] — walks forward by `max_chunk_size` and cuts at
//!   paragraph breaks, the baseline strategy
//! - [`SentenceChunker`] — accumulates whole sentences up to `max_chunk_size`
//! - [`DynamicChunker`] — splits on a configurable regex delimiter
//! - [`EntityAwareChunker`] — sentence-based, but keeps sentences that share
//!   a named entity in the same chunk
//!
//! All strategies honor the same contract: no text is silently dropped. A
//! candidate slice shorter than `min_chunk_size` is carried forward into the
//! next slice, or — at the end of the document — merged backward into the
//! previous chunk. Re-chunking identical input with identical parameters
//! yields identical boundaries and ids.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::config::ChunkingStrategy;
use crate::document::{Chunk, ChunkMetadata, Document, Page};
use crate::error::{PipelineError, Result};

/// Matches the end of a sentence: terminal punctuation, optional closing
/// quotes or brackets, then whitespace.
static SENTENCE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.!?]+["')\]]*\s+"#).unwrap());

/// Matches multi-word proper names ("Ada Lovelace", "New South Wales").
static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z][a-z]+(?:\s+[A-Z][a-z]+)+").unwrap());

/// A strategy for splitting extracted pages into bounded chunks.
///
/// Implementations produce [`Chunk`]s with sequence-based ids
/// (`"{document_id}:{index}"`) and page-level metadata, including the
/// language identified over each chunk's text. Embeddings are attached
/// later by the pipeline.
pub trait Chunker: Send + Sync {
    /// Split a document's extracted pages into chunks.
    ///
    /// Returns an empty `Vec` if every page is empty.
    fn chunk(&self, document: &Document, pages: &[Page]) -> Result<Vec<Chunk>>;
}

/// Build the configured chunking strategy.
pub fn chunker_for(
    strategy: ChunkingStrategy,
    min_chunk_size: usize,
    max_chunk_size: usize,
) -> Arc<dyn Chunker> {
    match strategy {
        ChunkingStrategy::Paragraph => {
            Arc::new(ParagraphChunker::new(min_chunk_size, max_chunk_size))
        }
        ChunkingStrategy::Sentence => {
            Arc::new(SentenceChunker::new(min_chunk_size, max_chunk_size))
        }
        ChunkingStrategy::Dynamic => Arc::new(DynamicChunker::new(min_chunk_size, max_chunk_size)),
        ChunkingStrategy::EntityAware => {
            Arc::new(EntityAwareChunker::new(min_chunk_size, max_chunk_size))
        }
    }
}

/// A piece of chunk text attributed to the page its main slice came from.
struct Piece {
    page_number: u32,
    text: String,
}

/// Assemble final [`Chunk`]s from accumulated pieces: sequence ids, page
/// attribution, and language identification over each chunk's text.
fn finish(document: &Document, pieces: Vec<Piece>) -> Vec<Chunk> {
    pieces
        .into_iter()
        .enumerate()
        .map(|(index, piece)| Chunk {
            id: format!("{}:{index}", document.id),
            text: piece.text.clone(),
            metadata: ChunkMetadata {
                file_name: document.name.clone(),
                file_type: document.content_type.clone(),
                page_number: Some(piece.page_number),
                languages: detect_languages(&piece.text),
                parent_id: document.id.clone(),
                owner: document.owner.clone(),
            },
        })
        .collect()
}

/// Identify the language of a chunk as an ISO 639-3 code list.
///
/// Empty when identification is not confident enough (very short or
/// non-linguistic text).
fn detect_languages(text: &str) -> Vec<String> {
    match whatlang::detect(text) {
        Some(info) if info.is_reliable() => vec![info.lang().code().to_string()],
        _ => Vec::new(),
    }
}

/// Flush a leftover carry buffer at the end of the document: merge backward
/// into the last emitted piece, or emit it alone if nothing was emitted.
fn flush_carry(pieces: &mut Vec<Piece>, carry: String, page_number: u32) {
    if carry.is_empty() {
        return;
    }
    match pieces.last_mut() {
        Some(last) => {
            last.text.push_str("\n\n");
            last.text.push_str(&carry);
        }
        None => pieces.push(Piece { page_number, text: carry }),
    }
}

/// Byte offset `n` characters past `byte_start`, clamped to the end of `text`.
fn advance_chars(text: &str, byte_start: usize, n: usize) -> usize {
    text[byte_start..]
        .char_indices()
        .nth(n)
        .map(|(offset, _)| byte_start + offset)
        .unwrap_or(text.len())
}

/// Cut `text` into pieces of at most `max` characters.
fn hard_split(text: &str, max: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let end = advance_chars(text, start, max);
        out.push(&text[start..end]);
        start = end;
    }
    out
}

/// Splits page text at paragraph boundaries, hard-capped at `max_chunk_size`.
///
/// The cursor walks forward by `max_chunk_size` characters; if that lands
/// mid-page, the cut moves back to the last paragraph break (`\n\n`) inside
/// the window, so a paragraph is only ever split when it exceeds the cap by
/// itself. Slices below `min_chunk_size` are carried into the next slice
/// (shrinking its window so the combined chunk still fits the cap) and the
/// final remainder merges backward into the previous chunk.
#[derive(Debug, Clone)]
pub struct ParagraphChunker {
    min_chunk_size: usize,
    max_chunk_size: usize,
}

impl ParagraphChunker {
    /// Create a new `ParagraphChunker`.
    pub fn new(min_chunk_size: usize, max_chunk_size: usize) -> Self {
        Self { min_chunk_size, max_chunk_size }
    }
}

impl Chunker for ParagraphChunker {
    fn chunk(&self, document: &Document, pages: &[Page]) -> Result<Vec<Chunk>> {
        let mut pieces: Vec<Piece> = Vec::new();
        let mut carry = String::new();
        let mut last_page = 1;

        for page in pages {
            let text = page.text.as_str();
            last_page = page.page_number;
            let mut start = 0;

            while start < text.len() {
                // Leave room for the carry so the combined chunk stays
                // within the hard cap.
                let budget = if carry.is_empty() {
                    self.max_chunk_size
                } else {
                    (self.max_chunk_size)
                        .saturating_sub(carry.chars().count() + 2)
                        .max(1)
                };

                let window_end = advance_chars(text, start, budget);
                let (end, next) = if window_end >= text.len() {
                    (text.len(), text.len())
                } else {
                    match text[start..window_end].rfind("\n\n") {
                        Some(pos) if pos > 0 => (start + pos, start + pos + 2),
                        // No break inside the window: the paragraph exceeds
                        // the cap, cut at the character boundary.
                        _ => (window_end, window_end),
                    }
                };

                let slice = text[start..end].trim();
                start = next;
                if slice.is_empty() {
                    continue;
                }

                let candidate = if carry.is_empty() {
                    slice.to_string()
                } else {
                    format!("{carry}\n\n{slice}")
                };

                if candidate.chars().count() >= self.min_chunk_size {
                    pieces.push(Piece { page_number: page.page_number, text: candidate });
                    carry = String::new();
                } else {
                    carry = candidate;
                }
            }
        }

        flush_carry(&mut pieces, carry, last_page);
        Ok(finish(document, pieces))
    }
}

/// Split text into sentences, keeping terminal punctuation attached.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for boundary in SENTENCE_BOUNDARY.find_iter(text) {
        let sentence = text[start..boundary.end()].trim();
        if !sentence.is_empty() {
            out.push(sentence);
        }
        start = boundary.end();
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Accumulate pre-split segments into chunks respecting `min`/`max`,
/// carrying sub-minimum leftovers forward and merging the final remainder
/// backward. Segments longer than `max` are cut at the character boundary
/// first, so the hard cap always holds.
fn accumulate<'a>(
    pieces: &mut Vec<Piece>,
    segments: impl IntoIterator<Item = &'a str>,
    joiner: &str,
    page_number: u32,
    carry: &mut String,
    min: usize,
    max: usize,
) {
    for segment in segments {
        for part in hard_split(segment, max) {
            let mut rest = part;
            while !rest.is_empty() {
                let carry_len = carry.chars().count();
                let sep = if carry.is_empty() { 0 } else { joiner.chars().count() };
                let rest_len = rest.chars().count();

                if carry_len + sep + rest_len <= max {
                    if !carry.is_empty() {
                        carry.push_str(joiner);
                    }
                    carry.push_str(rest);
                    break;
                }

                // The buffer can't absorb the segment. Emit it if it reached
                // the minimum; a sub-minimum buffer instead fills up to the
                // hard cap and the segment remainder carries over, so the
                // cap always wins over segment integrity.
                if carry_len >= min {
                    pieces.push(Piece { page_number, text: std::mem::take(carry) });
                    continue;
                }

                let room = max.saturating_sub(carry_len + sep).max(1);
                let cut = advance_chars(rest, 0, room);
                if !carry.is_empty() {
                    carry.push_str(joiner);
                }
                carry.push_str(&rest[..cut]);
                pieces.push(Piece { page_number, text: std::mem::take(carry) });
                rest = &rest[cut..];
            }
        }
    }

    if carry.chars().count() >= min {
        pieces.push(Piece { page_number, text: std::mem::take(carry) });
    }
}

/// Accumulates whole sentences up to `max_chunk_size` characters.
///
/// Sentence boundaries are terminal punctuation followed by whitespace. A
/// sentence longer than the cap is cut at the character boundary.
#[derive(Debug, Clone)]
pub struct SentenceChunker {
    min_chunk_size: usize,
    max_chunk_size: usize,
}

impl SentenceChunker {
    /// Create a new `SentenceChunker`.
    pub fn new(min_chunk_size: usize, max_chunk_size: usize) -> Self {
        Self { min_chunk_size, max_chunk_size }
    }
}

impl Chunker for SentenceChunker {
    fn chunk(&self, document: &Document, pages: &[Page]) -> Result<Vec<Chunk>> {
        let mut pieces = Vec::new();
        let mut carry = String::new();
        let mut last_page = 1;

        for page in pages {
            last_page = page.page_number;
            accumulate(
                &mut pieces,
                split_sentences(&page.text),
                " ",
                page.page_number,
                &mut carry,
                self.min_chunk_size,
                self.max_chunk_size,
            );
        }

        flush_carry(&mut pieces, carry, last_page);
        Ok(finish(document, pieces))
    }
}

/// Splits on a configurable regex delimiter, then accumulates segments up
/// to `max_chunk_size`.
///
/// The default delimiter is a run of newlines; pass a custom pattern with
/// [`with_pattern`](DynamicChunker::with_pattern).
#[derive(Debug, Clone)]
pub struct DynamicChunker {
    min_chunk_size: usize,
    max_chunk_size: usize,
    delimiter: Regex,
}

impl DynamicChunker {
    /// Create a new `DynamicChunker` splitting on newline runs.
    pub fn new(min_chunk_size: usize, max_chunk_size: usize) -> Self {
        Self {
            min_chunk_size,
            max_chunk_size,
            delimiter: Regex::new(r"\n+").unwrap(),
        }
    }

    /// Replace the delimiter with a custom regex pattern.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ConfigError`] if the pattern does not compile.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self> {
        self.delimiter = Regex::new(pattern).map_err(|e| {
            PipelineError::ConfigError(format!("invalid chunk delimiter pattern: {e}"))
        })?;
        Ok(self)
    }
}

impl Chunker for DynamicChunker {
    fn chunk(&self, document: &Document, pages: &[Page]) -> Result<Vec<Chunk>> {
        let mut pieces = Vec::new();
        let mut carry = String::new();
        let mut last_page = 1;

        for page in pages {
            last_page = page.page_number;
            let segments: Vec<&str> = self
                .delimiter
                .split(&page.text)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();
            accumulate(
                &mut pieces,
                segments,
                "\n",
                page.page_number,
                &mut carry,
                self.min_chunk_size,
                self.max_chunk_size,
            );
        }

        flush_carry(&mut pieces, carry, last_page);
        Ok(finish(document, pieces))
    }
}

/// Sentence-based chunking that keeps sentences sharing a named entity in
/// the same chunk where the hard cap allows.
///
/// Consecutive sentences mentioning the same multi-word proper name are
/// grouped before accumulation, so a chunk boundary never separates them
/// unless the group itself exceeds `max_chunk_size`.
#[derive(Debug, Clone)]
pub struct EntityAwareChunker {
    min_chunk_size: usize,
    max_chunk_size: usize,
}

impl EntityAwareChunker {
    /// Create a new `EntityAwareChunker`.
    pub fn new(min_chunk_size: usize, max_chunk_size: usize) -> Self {
        Self { min_chunk_size, max_chunk_size }
    }

    /// Group consecutive sentences that share at least one detected entity.
    fn entity_groups<'a>(sentences: Vec<&'a str>) -> Vec<String> {
        let mut groups: Vec<String> = Vec::new();
        let mut previous_entities: Vec<&'a str> = Vec::new();

        for sentence in sentences {
            let entities: Vec<&str> =
                ENTITY.find_iter(sentence).map(|m| m.as_str()).collect();
            let linked = !previous_entities.is_empty()
                && entities.iter().any(|e| previous_entities.contains(e));

            match groups.last_mut() {
                Some(last) if linked => {
                    last.push(' ');
                    last.push_str(sentence);
                }
                _ => groups.push(sentence.to_string()),
            }
            previous_entities = entities;
        }

        groups
    }
}

impl Chunker for EntityAwareChunker {
    fn chunk(&self, document: &Document, pages: &[Page]) -> Result<Vec<Chunk>> {
        let mut pieces = Vec::new();
        let mut carry = String::new();
        let mut last_page = 1;

        for page in pages {
            last_page = page.page_number;
            let groups = Self::entity_groups(split_sentences(&page.text));
            accumulate(
                &mut pieces,
                groups.iter().map(String::as_str),
                " ",
                page.page_number,
                &mut carry,
                self.min_chunk_size,
                self.max_chunk_size,
            );
        }

        flush_carry(&mut pieces, carry, last_page);
        Ok(finish(document, pieces))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        let mut d = Document::new("user@example.com", "report.txt", "text/plain");
        d.id = "doc-1".to_string();
        d
    }

    fn page(text: &str) -> Vec<Page> {
        vec![Page { page_number: 1, text: text.to_string() }]
    }

    #[test]
    fn unbroken_text_cuts_at_character_boundary() {
        // 2600 chars, no paragraph breaks, min 256 / max 1024:
        // expect 1024, 1024, 552.
        let text = "x".repeat(2600);
        let chunker = ParagraphChunker::new(256, 1024);
        let chunks = chunker.chunk(&doc(), &page(&text)).unwrap();

        let lengths: Vec<usize> = chunks.iter().map(|c| c.text.chars().count()).collect();
        assert_eq!(lengths, vec![1024, 1024, 552]);
        assert_eq!(chunks[0].id, "doc-1:0");
        assert_eq!(chunks[2].id, "doc-1:2");
    }

    #[test]
    fn cuts_at_paragraph_break_inside_window() {
        let text = format!("{}\n\n{}", "a".repeat(300), "b".repeat(300));
        let chunker = ParagraphChunker::new(100, 400);
        let chunks = chunker.chunk(&doc(), &page(&text)).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "a".repeat(300));
        assert_eq!(chunks[1].text, "b".repeat(300));
    }

    #[test]
    fn sub_minimum_slice_carries_into_next_chunk() {
        let text = format!("{}\n\n{}", "a".repeat(50), "b".repeat(200));
        let chunker = ParagraphChunker::new(100, 150);
        let chunks = chunker.chunk(&doc(), &page(&text)).unwrap();

        // The 50-char paragraph is below the minimum; it joins the next
        // slice, with the window shrunk so the chunk stays within the cap.
        assert!(chunks[0].text.starts_with(&"a".repeat(50)));
        assert!(chunks[0].text.chars().count() <= 150);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() >= 100);
        }
        let total_b: usize =
            chunks.iter().map(|c| c.text.chars().filter(|&ch| ch == 'b').count()).sum();
        assert_eq!(total_b, 200);
    }

    #[test]
    fn final_remainder_merges_backward() {
        let text = format!("{}\n\n{}", "a".repeat(200), "b".repeat(30));
        let chunker = ParagraphChunker::new(100, 150);
        let chunks = chunker.chunk(&doc(), &page(&text)).unwrap();

        // The trailing 30 chars fall below the minimum and have no next
        // slice: they merge into the previous chunk instead of dropping.
        let last = chunks.last().unwrap();
        assert!(last.text.ends_with(&"b".repeat(30)));
        let total: usize = chunks.iter().map(|c| c.text.chars().filter(|&ch| ch != '\n').count()).sum();
        assert_eq!(total, 230);
    }

    #[test]
    fn sole_sub_minimum_slice_is_still_emitted() {
        let chunker = ParagraphChunker::new(100, 400);
        let chunks = chunker.chunk(&doc(), &page("tiny")).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "tiny");
    }

    #[test]
    fn empty_page_yields_no_chunks() {
        let chunker = ParagraphChunker::new(100, 400);
        assert!(chunker.chunk(&doc(), &page("")).unwrap().is_empty());
        assert!(chunker.chunk(&doc(), &[]).unwrap().is_empty());
    }

    #[test]
    fn size_invariant_holds_for_all_but_last_chunk() {
        let text = (0..40)
            .map(|i| format!("Paragraph number {i} with a little bit of filler text."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunker = ParagraphChunker::new(128, 512);
        let chunks = chunker.chunk(&doc(), &page(&text)).unwrap();

        assert!(chunks.len() > 1);
        for chunk in &chunks[..chunks.len() - 1] {
            let len = chunk.text.chars().count();
            assert!((128..=512).contains(&len), "chunk length {len} outside [128, 512]");
        }
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = (0..20)
            .map(|i| format!("Some paragraph {i} that repeats across runs."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunker = ParagraphChunker::new(64, 256);
        let first = chunker.chunk(&doc(), &page(&text)).unwrap();
        let second = chunker.chunk(&doc(), &page(&text)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn chunks_inherit_page_and_document_metadata() {
        let pages = vec![
            Page { page_number: 1, text: "First page text. ".repeat(40) },
            Page { page_number: 2, text: "Second page text. ".repeat(40) },
        ];
        let chunker = ParagraphChunker::new(64, 256);
        let chunks = chunker.chunk(&doc(), &pages).unwrap();

        assert!(chunks.iter().any(|c| c.metadata.page_number == Some(1)));
        assert!(chunks.iter().any(|c| c.metadata.page_number == Some(2)));
        for chunk in &chunks {
            assert_eq!(chunk.metadata.parent_id, "doc-1");
            assert_eq!(chunk.metadata.file_name, "report.txt");
            assert_eq!(chunk.metadata.owner, "user@example.com");
        }
    }

    #[test]
    fn detects_language_of_english_prose() {
        let text = "The quick brown fox jumps over the lazy dog. \
                    It was the best of times, it was the worst of times."
            .repeat(4);
        let chunker = SentenceChunker::new(32, 512);
        let chunks = chunker.chunk(&doc(), &page(&text)).unwrap();
        assert!(chunks.iter().all(|c| c.metadata.languages == vec!["eng".to_string()]));
    }

    #[test]
    fn sentence_chunker_respects_boundaries_and_cap() {
        let text = "Short one. Another short sentence here! A third? ".repeat(20);
        let chunker = SentenceChunker::new(32, 128);
        let chunks = chunker.chunk(&doc(), &page(&text)).unwrap();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 128);
        }
        // No mid-sentence cut: every chunk ends with terminal punctuation.
        for chunk in &chunks[..chunks.len() - 1] {
            let last = chunk.text.trim_end().chars().last().unwrap();
            assert!(matches!(last, '.' | '!' | '?'));
        }
    }

    #[test]
    fn sentence_longer_than_cap_is_hard_cut() {
        let text = "y".repeat(700);
        let chunker = SentenceChunker::new(64, 256);
        let chunks = chunker.chunk(&doc(), &page(&text)).unwrap();
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 256));
        let total: usize = chunks.iter().map(|c| c.text.chars().count()).sum();
        assert_eq!(total, 700);
    }

    #[test]
    fn dynamic_chunker_splits_on_custom_pattern() {
        let text = "alpha|beta|gamma|delta";
        let chunker = DynamicChunker::new(2, 12).with_pattern(r"\|").unwrap();
        let chunks = chunker.chunk(&doc(), &page(text)).unwrap();

        assert!(chunks.len() > 1);
        let joined: String = chunks.iter().map(|c| c.text.replace('\n', " ")).collect::<Vec<_>>().join(" ");
        for word in ["alpha", "beta", "gamma", "delta"] {
            assert!(joined.contains(word));
        }
    }

    #[test]
    fn dynamic_chunker_rejects_invalid_pattern() {
        let err = DynamicChunker::new(2, 12).with_pattern("([");
        assert!(matches!(err, Err(PipelineError::ConfigError(_))));
    }

    #[test]
    fn entity_aware_keeps_entity_sentences_together() {
        let text = "Marie Curie won a Nobel Prize. Marie Curie later won another. \
                    Unrelated filler sentence follows here. More filler text continues.";
        let chunker = EntityAwareChunker::new(16, 100);
        let chunks = chunker.chunk(&doc(), &page(text)).unwrap();

        // Both Marie Curie sentences land in the same chunk.
        let holder: Vec<&Chunk> =
            chunks.iter().filter(|c| c.text.contains("Marie Curie")).collect();
        assert_eq!(holder.len(), 1);
        assert!(holder[0].text.contains("won another"));
    }

    #[test]
    fn strategies_share_the_no_drop_invariant() {
        let text = "One sentence here. Two sentences now! Three of them? Plus a tail.";
        for strategy in [
            ChunkingStrategy::Paragraph,
            ChunkingStrategy::Sentence,
            ChunkingStrategy::Dynamic,
            ChunkingStrategy::EntityAware,
        ] {
            let chunker = chunker_for(strategy, 8, 40);
            let chunks = chunker.chunk(&doc(), &page(text)).unwrap();
            let emitted: usize = chunks
                .iter()
                .map(|c| c.text.chars().filter(|ch| !ch.is_whitespace()).count())
                .sum();
            let source: usize = text.chars().filter(|ch| !ch.is_whitespace()).count();
            assert_eq!(emitted, source, "strategy {strategy:?} dropped text");
        }
    }
}
