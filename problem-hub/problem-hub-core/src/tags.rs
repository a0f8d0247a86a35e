//! Tag normalization and suggestions.

use std::collections::BTreeSet;

use crate::model::Problem;

/// Keyword → tags offered when the keyword appears in the text.
const KEYWORD_TAGS: &[(&str, &[&str])] = &[
    ("budget", &["finance", "expenses", "savings"]),
    ("money", &["finance", "payment", "expenses"]),
    ("health", &["medical", "treatment", "checkups"]),
    ("work", &["career", "job", "professional"]),
    ("family", &["parents", "children", "relationship"]),
    ("urgent", &["critical", "important", "immediate"]),
];

/// Trim, drop empties and duplicates, keep first-seen order.
pub fn normalize(tags: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

/// Split a comma separated list.
pub fn split_list(raw: &str) -> Vec<String> {
    normalize(raw.split(',').map(str::to_string))
}

fn known_tags(problems: &[Problem]) -> BTreeSet<String> {
    problems
        .iter()
        .flat_map(|p| p.tags.iter().map(|t| t.to_lowercase()))
        .collect()
}

/// Lower-cased known tags containing `query`, sorted.
pub fn autocomplete(problems: &[Problem], query: &str) -> Vec<String> {
    let query = query.to_lowercase();
    known_tags(problems)
        .into_iter()
        .filter(|tag| tag.contains(&query))
        .collect()
}

/// Tags for free text: keyword table hits plus known tags containing any
/// word of the text.
pub fn suggest(problems: &[Problem], text: &str) -> Vec<String> {
    let text = text.to_lowercase();
    let mut out = BTreeSet::new();
    for (keyword, tags) in KEYWORD_TAGS {
        if text.contains(keyword) {
            out.extend(tags.iter().map(|t| t.to_string()));
        }
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    for tag in known_tags(problems) {
        if words.iter().any(|w| tag.contains(w)) {
            out.insert(tag);
        }
    }
    out.into_iter().collect()
}

/// `@name` tokens of a comment, without the `@` and trailing punctuation.
pub fn extract_mentions(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter_map(|word| word.strip_prefix('@'))
        .map(|name| name.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_'))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
