//! Parsing free-text model answers into a [`ModelResponse`].
//!
//! Models are asked for a three-part enumerated answer (code, reason,
//! references) but frequently drift from it. Each field is therefore found by
//! an ordered list of strategies; the first one that yields a value wins and
//! later ones are not consulted. Parsing never fails: anything not found is
//! simply absent.

use std::sync::LazyLock;

use regex::Regex;
use upgraider_core::report::NO_REFERENCES_USED;
use upgraider_core::{ModelResponse, UpdateStatus};

const REASON_PREFIX: &str = "Reason for update:";

const REFERENCE_KEYWORDS: &[&str] = &[
    "Reference used:",
    "Reference number:",
    "References used:",
    "Reference numbers used:",
    "List of reference numbers used:",
];

const LANGUAGE_TAGS: &[&str] = &["python", "python3", "py"];

static FENCED_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```\s*(.*?)(?:```|\z)").expect("fence regex"));

static ENUMERATED_REASON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^2\.(.*)$").expect("reason regex"));

static PREFIXED_REASON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?m)^.*{}(.*)$", regex::escape(REASON_PREFIX))).expect("prefix regex")
});

static BULLET_REASON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?m)^.*{}\n*(?P<reasons>(?:-[^\n]*(?:\n|\z))+)",
        regex::escape(REASON_PREFIX)
    ))
    .expect("bullet regex")
});

static ENUMERATED_REFERENCES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^3\.(.*)$").expect("references regex"));

type Strategy = fn(&str) -> Option<String>;

const REASON_STRATEGIES: &[Strategy] = &[enumerated_reason, prefixed_reason, bulleted_reason];

const REFERENCE_STRATEGIES: &[Strategy] = &[enumerated_references, keyword_references];

/// Parse a raw model answer.
pub fn parse_response(text: &str) -> ModelResponse {
    let code = extract_code(text);
    let update_status = match &code {
        Some(code) if !code.is_empty() && !code.contains("No changes needed") => {
            UpdateStatus::Update
        }
        Some(_) => UpdateStatus::NoUpdate,
        None if text.contains("No update") => UpdateStatus::NoUpdate,
        None => UpdateStatus::NoResponse,
    };

    let reason = first_match(REASON_STRATEGIES, text).filter(|r| r != "None");
    let references = first_match(REFERENCE_STRATEGIES, text).filter(|r| !cancels_references(r));

    ModelResponse {
        update_status,
        updated_code: code.filter(|c| !c.is_empty()),
        reason,
        references,
    }
}

fn first_match(strategies: &[Strategy], text: &str) -> Option<String> {
    strategies
        .iter()
        .find_map(|s| s(text))
        .filter(|v| !v.is_empty())
}

// ── Code ──

/// Body of the first fenced block; an unterminated final fence runs to the end.
fn extract_code(text: &str) -> Option<String> {
    let caps = FENCED_CODE_RE.captures(text)?;
    let body = caps.get(1)?.as_str().trim();
    Some(strip_language_tag(body).trim().to_string())
}

fn strip_language_tag(code: &str) -> &str {
    let (first, rest) = code.split_once('\n').unwrap_or((code, ""));
    if LANGUAGE_TAGS.contains(&first.trim()) {
        rest
    } else {
        code
    }
}

// ── Reason ──

fn enumerated_reason(text: &str) -> Option<String> {
    let line = ENUMERATED_REASON_RE.captures(text)?.get(1)?.as_str().trim();
    let reason = match line.find(REASON_PREFIX) {
        Some(at) => line[at + REASON_PREFIX.len()..].trim(),
        None => line,
    };
    non_empty(reason)
}

fn prefixed_reason(text: &str) -> Option<String> {
    let rest = PREFIXED_REASON_RE.captures(text)?.get(1)?.as_str();
    non_empty(rest.trim())
}

fn bulleted_reason(text: &str) -> Option<String> {
    let block = BULLET_REASON_RE
        .captures(text)?
        .name("reasons")?
        .as_str()
        .trim();
    if block.lines().count() == 1 {
        if let Some(single) = block.strip_prefix('-') {
            return non_empty(single.trim());
        }
    }
    non_empty(block)
}

// ── References ──

fn enumerated_references(text: &str) -> Option<String> {
    let line = ENUMERATED_REFERENCES_RE.captures(text)?.get(1)?.as_str();
    non_empty(line.trim())
}

fn keyword_references(text: &str) -> Option<String> {
    let keyword = REFERENCE_KEYWORDS.iter().find(|k| text.contains(**k))?;
    let after = text.split(keyword).nth(1)?;
    non_empty(after.trim())
}

/// "No references used", with any trailing punctuation, means none.
fn cancels_references(references: &str) -> bool {
    references.trim_end_matches(|c: char| c.is_ascii_punctuation()) == NO_REFERENCES_USED
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}
