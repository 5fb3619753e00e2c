//! Response sanitizer
//!
//! Turns raw model text into a hint that honors the template's constraints.
//! Steps run in a fixed order: trim, strip echoed cue and delimiters,
//! collapse refusals, cut at a code fence, drop code-like lines, keep the
//! first question. Running it twice gives the same text as running it once.

use regex::Regex;
use std::sync::LazyLock;

use crate::templates::{Constraint, PromptTemplate, LANGUAGE_REFUSAL};
use crate::types::{Hint, RawCompletion};

const CODE_FENCE: &str = "```";

// Lines that read like Python statements rather than prose
static CODE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^\s*(?:def\s+\w+\s*\(|class\s+\w+|for\s+.+\s+in\s+.+:\s*$|while\s+.+:\s*$|if\s+.+:\s*$|elif\s+.+:\s*$|else\s*:\s*$|return\b|import\s+\w+|from\s+\S+\s+import\b|print\(|[A-Za-z_][\w.\[\]]*\s*(?:[+\-*/%]?=)\s*[^=\s])",
    )
    .expect("invalid regex")
});

/// Turn a raw completion into a policy-compliant hint
pub fn clean(raw: &RawCompletion, template: &PromptTemplate) -> Hint {
    Hint::new(clean_text(&raw.text, template))
}

fn clean_text(raw: &str, template: &PromptTemplate) -> String {
    let mut text = raw.trim().to_string();

    let mut markers: Vec<&str> = vec![template.answer_cue.as_str()];
    if let Some(d) = &template.delimiters {
        markers.push(d.open.as_str());
        markers.push(d.close.as_str());
    }
    text = strip_markers(text, &markers);
    text = text.trim().to_string();

    if template.has(Constraint::TargetLanguageOnly) && text.contains(LANGUAGE_REFUSAL) {
        return LANGUAGE_REFUSAL.to_string();
    }
    if template.has(Constraint::NoCodeAuthoring) {
        if let Some(pos) = text.find(CODE_FENCE) {
            text.truncate(pos);
        }
        text = drop_code_lines(&text);
    }
    if template.has(Constraint::SingleQuestionOnly) {
        if let Some(pos) = text.find('?') {
            text.truncate(pos + 1);
        }
    }

    text.trim().to_string()
}

/// Remove markers until none remain; removal can splice a new one together
fn strip_markers(mut text: String, markers: &[&str]) -> String {
    loop {
        let before = text.len();
        for marker in markers.iter().filter(|m| !m.is_empty()) {
            if text.contains(marker) {
                text = text.replace(marker, "");
            }
        }
        if text.len() == before {
            return text;
        }
    }
}

fn is_code_line(line: &str) -> bool {
    CODE_LINE_RE.is_match(line)
}

fn code_line_count(text: &str) -> usize {
    text.lines().filter(|line| is_code_line(line)).count()
}

/// Remove unfenced code; a single inline reference stays
fn drop_code_lines(text: &str) -> String {
    if code_line_count(text) < 2 {
        return text.to_string();
    }
    text.lines()
        .filter(|line| !is_code_line(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Whether text holds a fenced block or several code-like lines
pub fn contains_code_markers(text: &str) -> bool {
    text.contains(CODE_FENCE) || code_line_count(text) >= 2
}

/// Number of question marks in the text
pub fn count_questions(text: &str) -> usize {
    text.matches('?').count()
}
