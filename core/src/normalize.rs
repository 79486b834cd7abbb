//! Turns the accumulated model answer into the list of wheel items.
//!
//! The model is asked for one item per line but sometimes answers with a
//! single space-separated line instead, so a line split that yields at most
//! one item falls back to splitting on spaces.

/// Split `text` into trimmed, non-empty items in order of appearance.
pub fn normalize_items(text: &str) -> Vec<String> {
    let items = split_trimmed(text, '\n');
    if items.len() <= 1 && text.contains(' ') {
        return split_trimmed(text, ' ');
    }
    items
}

fn split_trimmed(text: &str, sep: char) -> Vec<String> {
    text.split(sep)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
