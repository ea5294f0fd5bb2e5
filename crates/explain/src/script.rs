//! Deterministic explanation script assembly

use ruleforge_common::models::{ScriptChunk, SearchResult};

/// Explanation body: retrieved passages in rank order, blank line between
pub fn compose_script(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|result| result.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Split the body into pieces of `chunk_size` characters.
///
/// Only the last piece may be shorter. Splits can fall mid-word.
pub fn split_script(script: &str, chunk_size: usize) -> Vec<ScriptChunk> {
    let chunk_size = chunk_size.max(1);
    let chars: Vec<char> = script.chars().collect();
    let total_chunks = chars.len().div_ceil(chunk_size);

    chars
        .chunks(chunk_size)
        .enumerate()
        .map(|(chunk_index, piece)| ScriptChunk {
            chunk_index,
            total_chunks,
            chunk: piece.iter().collect(),
        })
        .collect()
}

/// Whole minutes to read the script, never below one
pub fn estimate_reading_minutes(script: &str, words_per_minute: usize) -> u32 {
    let words = script.split_whitespace().count();
    let minutes = words.div_ceil(words_per_minute.max(1)).max(1);
    u32::try_from(minutes).unwrap_or(u32::MAX)
}
