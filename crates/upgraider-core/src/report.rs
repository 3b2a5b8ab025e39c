//! Per-snippet and aggregate report model.
//!
//! Everything here serialises to the `report.json` layout: enums as
//! `SCREAMING_SNAKE_CASE` strings, snippets keyed by file name in sorted order.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diagnostic::RunOutcome;
use crate::library::Library;

/// Sentinel the model uses when it cites nothing.
pub const NO_REFERENCES_USED: &str = "No references used";

// ── Statuses ──

/// What the model said about the snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateStatus {
    Update,
    NoUpdate,
    NoResponse,
    /// Set when the snippet failed before a response could be parsed.
    Unknown,
}

/// Outcome of re-running the patched snippet against the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FixStatus {
    Fixed,
    NotFixed,
    NewError,
}

/// Where reference sections come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DbSource {
    /// Retrieve from the embedded documentation corpus.
    #[serde(rename = "doc")]
    Documentation,
    /// No retrieval; the model works from the code alone.
    #[serde(rename = "modelonly")]
    ModelOnly,
}

impl DbSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Documentation => "doc",
            Self::ModelOnly => "modelonly",
        }
    }
}

impl fmt::Display for DbSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "doc" => Ok(Self::Documentation),
            "modelonly" => Ok(Self::ModelOnly),
            other => Err(format!("unknown db source '{other}' (expected doc or modelonly)")),
        }
    }
}

// ── Model response ──

/// Structured view of a free-text model response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub update_status: UpdateStatus,
    pub updated_code: Option<String>,
    pub reason: Option<String>,
    pub references: Option<String>,
}

impl ModelResponse {
    /// Response recorded when the model could not be reached.
    pub fn no_response() -> Self {
        Self {
            update_status: UpdateStatus::NoResponse,
            updated_code: None,
            reason: None,
            references: None,
        }
    }

    /// Placeholder for a snippet whose processing aborted.
    pub fn unknown() -> Self {
        Self {
            update_status: UpdateStatus::Unknown,
            ..Self::no_response()
        }
    }

    /// An `Update` that actually cites at least one reference.
    pub fn updated_with_references(&self) -> bool {
        self.update_status == UpdateStatus::Update
            && self
                .references
                .as_deref()
                .is_some_and(|r| !r.contains(NO_REFERENCES_USED))
    }
}

// ── Reports ──

/// Everything recorded about one snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnippetReport {
    pub original_file: String,
    /// File stem; by convention the name of the API the snippet exercises.
    pub api: String,
    pub prompt_file: Option<String>,
    pub original_run: Option<RunOutcome>,
    pub model_response: ModelResponse,
    pub model_response_file: Option<String>,
    pub num_references: usize,
    pub modified_file: Option<String>,
    pub modified_run: Option<RunOutcome>,
    pub fix_status: FixStatus,
    pub diff: Option<String>,
    /// Set when processing this snippet aborted.
    pub error: Option<String>,
}

impl SnippetReport {
    /// Report for a snippet whose processing aborted with `error`.
    pub fn failed(original_file: &str, error: impl fmt::Display) -> Self {
        Self {
            original_file: original_file.to_string(),
            api: api_name(original_file),
            prompt_file: None,
            original_run: None,
            model_response: ModelResponse::unknown(),
            model_response_file: None,
            num_references: 0,
            modified_file: None,
            modified_run: None,
            fix_status: FixStatus::NotFixed,
            diff: None,
            error: Some(format!("{error:#}")),
        }
    }
}

/// `ExcelWriter.save().py` → `ExcelWriter.save()`.
pub fn api_name(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => file_name.to_string(),
    }
}

/// Aggregate over all snippets of one library run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub library: Library,
    pub db_source: DbSource,
    pub model: String,
    pub generated_at: DateTime<Utc>,
    pub num_snippets: usize,
    pub num_apis: usize,
    pub num_fixed: usize,
    pub num_updated: usize,
    pub num_updated_w_refs: usize,
    pub percent_updated: f64,
    pub percent_updated_w_refs: f64,
    pub percent_fixed: f64,
    pub snippets: BTreeMap<String, SnippetReport>,
}

impl Report {
    /// Build the aggregate, computing every count from `snippets`.
    pub fn new(
        library: Library,
        db_source: DbSource,
        model: impl Into<String>,
        snippets: BTreeMap<String, SnippetReport>,
    ) -> Self {
        let num_snippets = snippets.len();
        let num_fixed = snippets
            .values()
            .filter(|s| s.fix_status == FixStatus::Fixed)
            .count();
        let num_updated = snippets
            .values()
            .filter(|s| s.model_response.update_status == UpdateStatus::Update)
            .count();
        let num_updated_w_refs = snippets
            .values()
            .filter(|s| s.model_response.updated_with_references())
            .count();
        let num_apis = snippets
            .values()
            .map(|s| s.api.as_str())
            .collect::<BTreeSet<_>>()
            .len();

        Self {
            library,
            db_source,
            model: model.into(),
            generated_at: Utc::now(),
            num_snippets,
            num_apis,
            num_fixed,
            num_updated,
            num_updated_w_refs,
            percent_updated: percent(num_updated, num_snippets),
            percent_updated_w_refs: percent(num_updated_w_refs, num_snippets),
            percent_fixed: percent(num_fixed, num_snippets),
            snippets,
        }
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}
