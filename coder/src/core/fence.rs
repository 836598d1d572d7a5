//! Removal of markdown code-fence markup from generated artifacts.

use std::sync::LazyLock;

use regex::Regex;

const FENCE: &str = "```";

/// Language tags dropped when they follow an opener glued to code on one line.
const LANGUAGE_TAGS: &[&str] = &[
    "python", "python3", "py", "sh", "bash", "shell", "text", "plaintext",
];

/// A whole line holding only a fence opener/closer, with an optional language hint.
static FENCE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*```[\w+#.-]*[ \t]*\r?$\n?").expect("fence line regex is valid")
});

/// Strip code-fence markers from a model response.
///
/// Removes fence lines anywhere in the text (` ```python `, ` ``` `) as well as
/// fences glued to the start or end of the text, then trims surrounding
/// whitespace. The result is a fixed point: stripping it again changes nothing.
pub fn strip_code_fences(raw: &str) -> String {
    let mut current = raw.trim().to_string();
    loop {
        let next = strip_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn strip_once(text: &str) -> String {
    let without_lines = FENCE_LINE_RE.replace_all(text, "");
    let mut rest = without_lines.trim();

    if let Some(after) = rest.strip_prefix(FENCE) {
        rest = strip_language_tag(after).trim_start();
    }
    if let Some(before) = rest.strip_suffix(FENCE) {
        rest = before.trim_end();
    }
    rest.to_string()
}

/// Drop a known language tag at the start of `text` when whitespace follows it.
/// Anything else is code and is kept.
fn strip_language_tag(text: &str) -> &str {
    let word_len = text
        .find(|c: char| c.is_whitespace())
        .unwrap_or(text.len());
    let (word, rest) = text.split_at(word_len);
    if !rest.is_empty() && LANGUAGE_TAGS.iter().any(|tag| word.eq_ignore_ascii_case(tag)) {
        rest
    } else {
        text
    }
}
