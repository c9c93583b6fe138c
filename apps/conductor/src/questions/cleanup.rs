//! Turns raw LLM list output into clean, one-question-per-entry lists.

use once_cell::sync::Lazy;
use regex::Regex;

static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[-*•–—]+|\d{1,2}[.)])\s*").expect("valid regex"));
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^<>\s]+>|\{[^{}\s]*\}").expect("valid regex"));
static EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*|__|`").expect("valid regex"));
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#+\s*").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static LEADING_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\s,;:.]+").expect("valid regex"));

/// Splits `text` into lines and strips bullets, numbering, placeholder tokens
/// and markdown. Drops blank lines, code fences, section headers and
/// duplicates; keeps order.
pub fn clean_lines(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with("```") {
            continue;
        }
        let line = HEADING.replace(line, "");
        let line = LIST_MARKER.replace(&line, "");
        let line = PLACEHOLDER.replace_all(&line, "");
        let line = EMPHASIS.replace_all(&line, "");
        let line = WHITESPACE.replace_all(&line, " ");
        let line = LEADING_PUNCT.replace(&line, "");
        let line = line.trim();

        if line.is_empty() || line.ends_with(':') {
            continue;
        }
        if !out.iter().any(|existing| existing == line) {
            out.push(line.to_string());
        }
    }
    out
}
