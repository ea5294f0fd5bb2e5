//! Citations and outline derived from search results

use ruleforge_common::models::{Citation, Outline, SearchResult};

const ELLIPSIS: &str = "...";

/// One citation per result, same order
pub fn build_citations(results: &[SearchResult]) -> Vec<Citation> {
    results
        .iter()
        .map(|result| Citation {
            text: result.text.clone(),
            source: format!("PDF:{}", result.pdf_id),
            page: result.page,
        })
        .collect()
}

/// Outline with the topic verbatim and one section title per result
pub fn build_outline(topic: &str, results: &[SearchResult], max_chars: usize) -> Outline {
    Outline {
        main_topic: topic.to_string(),
        sections: results
            .iter()
            .map(|result| section_title(&result.text, max_chars))
            .collect(),
    }
}

/// Single-line preview of a passage, at most `max_chars` characters.
///
/// Whitespace runs collapse to one space. Cut titles end in `...`, which
/// counts toward the limit. Limits too small for the ellipsis cut without it.
pub fn section_title(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    if max_chars <= ELLIPSIS.len() {
        return collapsed.chars().take(max_chars).collect();
    }

    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut title: String = collapsed.chars().take(keep).collect();
    title.truncate(title.trim_end().len());
    title.push_str(ELLIPSIS);
    title
}
