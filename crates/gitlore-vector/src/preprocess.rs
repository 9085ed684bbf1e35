//! Text preprocessing applied before embedding, by context type.

use gitlore_core::types::ContextType;

/// Maximum chars kept from preprocessed code.
pub const CODE_MAX_CHARS: usize = 1000;
/// Maximum chars kept from an enhanced commit message.
pub const COMMIT_MAX_CHARS: usize = 500;

/// Category keywords appended to commit text, in order. A category is added
/// when any of its needles occurs in the lowercased message.
const COMMIT_CATEGORIES: &[(&[&str], &str)] = &[
    (&["feat", "feature"], "feature"),
    (&["fix", "bug"], "bugfix"),
    (&["refactor"], "refactoring"),
    (&["test"], "testing"),
    (&["doc"], "documentation"),
];

pub fn preprocess(text: &str, context_type: ContextType) -> String {
    match context_type {
        ContextType::Code => preprocess_code(text),
        ContextType::Commit => preprocess_commit(text),
        ContextType::General => text.to_string(),
    }
}

/// Drop blank and comment-only lines, join the rest with single spaces.
pub fn preprocess_code(code: &str) -> String {
    let joined = code
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with("//"))
        .collect::<Vec<_>>()
        .join(" ");
    truncate_chars(&joined, CODE_MAX_CHARS).to_string()
}

/// `"{title} {keywords} {message}"` where keywords name detected categories.
pub fn preprocess_commit(message: &str) -> String {
    let title = message.lines().next().unwrap_or_default();
    let keywords = commit_categories(message).join(" ");
    let enhanced = format!("{} {} {}", title, keywords, message);
    truncate_chars(&enhanced, COMMIT_MAX_CHARS).to_string()
}

/// Category keywords detected in a commit message.
pub fn commit_categories(message: &str) -> Vec<&'static str> {
    let lower = message.to_lowercase();
    COMMIT_CATEGORIES
        .iter()
        .filter(|(needles, _)| needles.iter().any(|n| lower.contains(n)))
        .map(|(_, category)| *category)
        .collect()
}

/// Longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
