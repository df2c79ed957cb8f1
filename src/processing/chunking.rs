//! Boundary-aware chunking for the summarizer.
//!
//! Text is measured either in characters or in `cl100k_base` BPE tokens. Each chunk is the
//! longest prefix that fits the threshold, shortened to the last paragraph break, else the
//! last sentence end, else the last whitespace. Only a single word longer than the threshold
//! is cut mid-word.

use crate::config::ChunkUnit;
use std::sync::Arc;
use tiktoken_rs::cl100k_base;

use super::types::ChunkingError;

/// Measures a text segment in the configured unit.
pub type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

const TOKEN_ENCODING: &str = "cl100k_base";

/// Upper bound on characters covered by one measure unit when sizing the search window.
const MAX_CHARS_PER_UNIT: usize = 16;

/// Build the counter for the configured unit.
pub fn build_token_counter(unit: ChunkUnit) -> Result<TokenCounter, ChunkingError> {
    match unit {
        ChunkUnit::Chars => Ok(char_counter()),
        ChunkUnit::Tokens => build_tiktoken_counter(),
    }
}

/// Counter measuring Unicode scalar values.
pub fn char_counter() -> TokenCounter {
    Arc::new(|segment: &str| segment.chars().count())
}

fn build_tiktoken_counter() -> Result<TokenCounter, ChunkingError> {
    let encoding = cl100k_base().map_err(|source| ChunkingError::Tokenizer {
        encoding: TOKEN_ENCODING.to_string(),
        source,
    })?;
    let encoding = Arc::new(encoding);
    tracing::debug!(encoding = TOKEN_ENCODING, "Initialized token counter");

    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

/// Split `text` into contiguous, non-overlapping chunks each within `threshold`.
///
/// Chunks are trimmed and never empty; whitespace-only input yields no chunks.
pub fn split_into_chunks(
    text: &str,
    threshold: usize,
    counter: &TokenCounter,
) -> Result<Vec<String>, ChunkingError> {
    if threshold == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }

    let mut chunks = Vec::new();
    let mut rest = text.trim();
    while !rest.is_empty() {
        let (chunk, remainder) = next_chunk(rest, threshold, counter);
        chunks.push(chunk.to_string());
        rest = remainder;
    }
    Ok(chunks)
}

/// First chunk of `text`, used to cut an intermediate summary down to the threshold.
pub(crate) fn first_chunk(
    text: &str,
    threshold: usize,
    counter: &TokenCounter,
) -> Result<String, ChunkingError> {
    if threshold == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    Ok(next_chunk(trimmed, threshold, counter).0.to_string())
}

/// Split one chunk off the front of `rest`, which starts with a non-whitespace char.
fn next_chunk<'a>(rest: &'a str, threshold: usize, counter: &TokenCounter) -> (&'a str, &'a str) {
    let mut limit = longest_fitting_prefix(rest, threshold, counter);
    if limit == rest.len() {
        return (rest.trim_end(), "");
    }
    if limit == 0 {
        // A single char already exceeds the threshold; emit it to keep making progress.
        limit = rest.chars().next().map(char::len_utf8).unwrap_or(rest.len());
    }

    let cut = boundary_before(rest, limit).unwrap_or(limit);
    let chunk = rest[..cut].trim_end();
    if chunk.is_empty() {
        return (rest[..limit].trim_end(), rest[limit..].trim_start());
    }
    (chunk, rest[cut..].trim_start())
}

/// Byte length of the longest prefix of `text` whose measure fits `threshold`.
fn longest_fitting_prefix(text: &str, threshold: usize, counter: &TokenCounter) -> usize {
    let window_chars = threshold.saturating_mul(MAX_CHARS_PER_UNIT);
    let ends: Vec<usize> = text
        .char_indices()
        .skip(1)
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .take(window_chars)
        .collect();

    let fitting = ends.partition_point(|&end| counter.as_ref()(&text[..end]) <= threshold);
    if fitting == 0 { 0 } else { ends[fitting - 1] }
}

/// Best split point at or before `limit`: paragraph, then sentence, then word boundary.
fn boundary_before(text: &str, limit: usize) -> Option<usize> {
    let prefix = &text[..limit];

    if let Some(index) = prefix.rfind("\n\n").filter(|&index| index > 0) {
        return Some(index);
    }

    for (index, ch) in prefix.char_indices().rev() {
        if matches!(ch, '.' | '!' | '?') && starts_with_whitespace(&text[index + 1..]) {
            return Some(index + 1);
        }
    }

    if starts_with_whitespace(&text[limit..]) {
        return Some(limit);
    }
    prefix
        .char_indices()
        .rev()
        .find(|(_, ch)| ch.is_whitespace())
        .map(|(index, _)| index)
        .filter(|&index| index > 0)
}

fn starts_with_whitespace(text: &str) -> bool {
    text.chars()
        .next()
        .map(|c| c.is_whitespace())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(text: &str) -> Vec<&str> {
        text.split_whitespace().collect()
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let error = split_into_chunks("text", 0, &char_counter()).expect_err("zero");
        assert!(matches!(error, ChunkingError::InvalidChunkSize));
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split_into_chunks("  short text \n", 100, &char_counter()).expect("chunks");
        assert_eq!(chunks, vec!["short text"]);
    }

    #[test]
    fn whitespace_only_text_has_no_chunks() {
        let chunks = split_into_chunks(" \n\n\t ", 10, &char_counter()).expect("chunks");
        assert!(chunks.is_empty());
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let text = "First paragraph here.\n\nSecond one. It has two sentences.";
        let chunks = split_into_chunks(text, 40, &char_counter()).expect("chunks");
        assert_eq!(
            chunks,
            vec!["First paragraph here.", "Second one. It has two sentences."]
        );
    }

    #[test]
    fn falls_back_to_sentence_then_word_boundaries() {
        let text = "Alpha beta gamma. Delta epsilon zeta eta theta";
        let chunks = split_into_chunks(text, 25, &char_counter()).expect("chunks");
        assert_eq!(chunks[0], "Alpha beta gamma.");
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 25, "chunk too long: {chunk:?}");
        }
        assert_eq!(chunks[1], "Delta epsilon zeta eta");
        assert_eq!(chunks[2], "theta");
    }

    #[test]
    fn hard_cuts_words_longer_than_threshold() {
        let chunks = split_into_chunks("abcdefghij kl", 4, &char_counter()).expect("chunks");
        assert_eq!(chunks, vec!["abcd", "efgh", "ij", "kl"]);
    }

    #[test]
    fn chunks_respect_threshold_and_preserve_words() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40)
            + "\n\nA second paragraph follows! Does it split well? Yes.";
        let counter = char_counter();
        let chunks = split_into_chunks(&text, 120, &counter).expect("chunks");

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.is_empty());
            assert!(counter.as_ref()(chunk) <= 120);
            assert_eq!(chunk.trim(), chunk);
        }
        let rejoined = chunks.join(" ");
        assert_eq!(words(&rejoined), words(&text));
    }

    #[test]
    fn three_paragraphs_split_at_breaks() {
        let paragraph = format!("{}abcdefg.", "xxxxxxxxx ".repeat(99));
        assert_eq!(paragraph.chars().count(), 998);
        let text = [paragraph.clone(), paragraph.clone(), paragraph.clone()].join("\n\n");

        let chunks = split_into_chunks(&text, 1000, &char_counter()).expect("chunks");
        assert_eq!(chunks, vec![paragraph.clone(), paragraph.clone(), paragraph]);
    }

    #[test]
    fn first_chunk_cuts_at_boundary() {
        let chunk = first_chunk("One two three. Four five six.", 20, &char_counter())
            .expect("first chunk");
        assert_eq!(chunk, "One two three.");
    }

    #[test]
    fn token_counter_measures_bpe_tokens() {
        let counter = build_token_counter(ChunkUnit::Tokens).expect("tokenizer");
        let count = counter.as_ref()("hello world");
        assert!((1..=3).contains(&count));

        let text = "Tokens are measured with the cl100k encoding here. ".repeat(50);
        let chunks = split_into_chunks(&text, 64, &counter).expect("chunks");
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(counter.as_ref()(chunk) <= 64);
        }
    }
}
