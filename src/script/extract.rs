//! Code fence extraction

use std::sync::OnceLock;

use regex::Regex;

fn fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)```(?:javascript|js)(.*?)```").expect("fence pattern is valid")
    })
}

/// Concatenate the contents of every JavaScript fence in `text`, in source order.
///
/// Returns an empty string when the text has no such fence.
pub fn extract_code_blocks(text: &str) -> String {
    fence_pattern()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
