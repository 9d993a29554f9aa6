use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static NEWLINE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{2,}").unwrap());
static HORIZONTAL_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\S\n]+").unwrap());
static PAGE_FOOTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)page\s*\d+\s*/\s*\d+").unwrap());
static BLANK_LINE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Cleans raw extractor output into plain text.
///
/// A single pass can expose new matches (a stripped control byte joining two
/// spaces, or a removed footer joining the halves of another one), so passes
/// repeat until the text stops changing. After the first pass every change
/// only removes characters, so the loop terminates and the result is
/// idempotent.
pub fn normalize_text(raw: &str) -> String {
    let mut current = clean_pass(raw);
    loop {
        let next = clean_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn clean_pass(raw: &str) -> String {
    let text: String = raw.nfkc().collect();
    let text = NEWLINE_RUNS.replace_all(&text, "\n");
    let text = HORIZONTAL_WHITESPACE.replace_all(&text, " ");
    let text = PAGE_FOOTER.replace_all(&text, "");
    let text = strip_control_characters(&text);

    let lines = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<&str>>()
        .join("\n");

    BLANK_LINE_RUNS
        .replace_all(&lines, "\n\n")
        .trim()
        .to_string()
}

fn strip_control_characters(text: &str) -> String {
    text.chars()
        .filter(|character| *character == '\n' || !character.is_control())
        .collect()
}
