//! Prompt templates with `${original_code}` and `${references}` placeholders.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]*)\}").expect("placeholder regex"));

/// Bundled default template.
pub const DEFAULT_TEMPLATE: &str = include_str!("../resources/chat_template.txt");

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("template is missing the ${{{0}}} placeholder")]
    MissingPlaceholder(&'static str),

    #[error("template uses unknown placeholder ${{{0}}}")]
    UnknownPlaceholder(String),

    #[error("failed to read template {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    OriginalCode,
    References,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Slot(Slot),
}

/// A validated template, split once into literal text and slots.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    pub fn new(source: &str) -> Result<Self, PromptError> {
        let mut segments = Vec::new();
        let mut last = 0;
        for caps in PLACEHOLDER_RE.captures_iter(source) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let slot = match name.as_str() {
                "original_code" => Slot::OriginalCode,
                "references" => Slot::References,
                other => return Err(PromptError::UnknownPlaceholder(other.to_string())),
            };
            if whole.start() > last {
                segments.push(Segment::Text(source[last..whole.start()].to_string()));
            }
            segments.push(Segment::Slot(slot));
            last = whole.end();
        }
        if last < source.len() {
            segments.push(Segment::Text(source[last..].to_string()));
        }

        for (slot, name) in [
            (Slot::OriginalCode, "original_code"),
            (Slot::References, "references"),
        ] {
            if !segments.contains(&Segment::Slot(slot)) {
                return Err(PromptError::MissingPlaceholder(name));
            }
        }
        Ok(Self { segments })
    }

    /// Load and validate a template file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, PromptError> {
        let text = std::fs::read_to_string(path).map_err(|source| PromptError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(&text)
    }

    /// The template shipped with the crate.
    pub fn bundled() -> Result<Self, PromptError> {
        Self::new(DEFAULT_TEMPLATE)
    }

    /// Substitute both placeholders. References are concatenated as-is.
    ///
    /// Substitution is single-pass: placeholder text inside the code or the
    /// references is never expanded again.
    pub fn render(&self, original_code: &str, references: &[String]) -> String {
        let references = references.concat();
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(t) => out.push_str(t),
                Segment::Slot(Slot::OriginalCode) => out.push_str(original_code),
                Segment::Slot(Slot::References) => out.push_str(&references),
            }
        }
        out
    }
}
