//! Fix verification: re-run the patched snippet and compare diagnostics.
//!
//! ```text
//! response ──▶ NoAttempt ─────────────────────────────▶ NOT_FIXED
//!          └─▶ Attempted ─▶ reconcile imports ─▶ write ─▶ run ─▶ classify
//!                                                          │
//!              problem-free ──▶ FIXED                      │
//!              diagnostic != baseline ──▶ NEW_ERROR ◀──────┘
//!              diagnostic == baseline ──▶ NOT_FIXED
//! ```

use std::path::PathBuf;

use similar::TextDiff;
use tracing::{info, warn};
use upgraider_core::{FixStatus, Library, ModelResponse, RunOutcome, UpdateStatus};
use upgraider_store::ArtifactStore;

use crate::imports::reconcile_imports;
use crate::sandbox::{Sandbox, run_snippet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixAttempt<'a> {
    /// The model did not propose usable code; nothing is executed.
    NoAttempt,
    Attempted { updated_code: &'a str },
}

impl<'a> FixAttempt<'a> {
    pub fn from_response(response: &'a ModelResponse) -> Self {
        if response.update_status != UpdateStatus::Update {
            return Self::NoAttempt;
        }
        match response.updated_code.as_deref() {
            Some(code) => Self::Attempted { updated_code: code },
            None => {
                warn!("update reported but no updated code could be extracted");
                Self::NoAttempt
            }
        }
    }
}

/// Result of verifying one snippet.
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub modified_file: Option<PathBuf>,
    pub modified_run: Option<RunOutcome>,
    pub fix_status: FixStatus,
    pub diff: Option<String>,
}

impl Verification {
    fn not_attempted() -> Self {
        Self {
            modified_file: None,
            modified_run: None,
            fix_status: FixStatus::NotFixed,
            diff: None,
        }
    }
}

/// Classify a post-fix run against the baseline.
pub fn determine_fix_status(baseline: &RunOutcome, after: &RunOutcome) -> FixStatus {
    if after.problem_free {
        FixStatus::Fixed
    } else if baseline.diagnostic != after.diagnostic {
        FixStatus::NewError
    } else {
        FixStatus::NotFixed
    }
}

/// Unified line diff from `original` to `updated`.
pub fn unified_diff(original: &str, updated: &str) -> String {
    TextDiff::from_lines(original, updated)
        .unified_diff()
        .header("original", "updated")
        .to_string()
}

/// Apply the model's rewrite (if any), execute it and classify the result.
pub async fn verify_fix(
    original_code: &str,
    response: &ModelResponse,
    baseline: &RunOutcome,
    stem: &str,
    library: &Library,
    sandbox: &dyn Sandbox,
    artifacts: &ArtifactStore,
) -> anyhow::Result<Verification> {
    let updated_code = match FixAttempt::from_response(response) {
        FixAttempt::NoAttempt => return Ok(Verification::not_attempted()),
        FixAttempt::Attempted { updated_code } => updated_code,
    };

    let final_code = reconcile_imports(original_code, updated_code);
    let modified_file = artifacts.write_updated(stem, &final_code)?;
    let after = run_snippet(sandbox, &modified_file, library).await;
    let fix_status = determine_fix_status(baseline, &after);
    info!(snippet = stem, status = ?fix_status, "verified fix");

    Ok(Verification {
        modified_file: Some(modified_file),
        modified_run: Some(after),
        fix_status,
        diff: Some(unified_diff(original_code, &final_code)),
    })
}
