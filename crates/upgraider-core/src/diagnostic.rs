//! Classification of snippet execution output into structured diagnostics.
//!
//! A snippet run produces raw stderr text. [`classify`] scans it for the few
//! failure shapes that signal a deprecated or removed API:
//!
//! - `<file>.py:<line>: <Kind>Warning: <subject> is deprecated ...`
//! - `AttributeError: <object> object has no attribute <name>`
//! - `AttributeError: module <module> has no attribute <name>`
//! - `TypeError: <callable> got an unexpected keyword argument <name>`
//!
//! Matchers run in that order and the first hit wins, so a run yields at most
//! one [`Diagnostic`]. Output that carries a failure marker but matches none
//! of them becomes [`ProblemKind::UnclassifiedError`] with only the raw text.
//!
//! # Markers
//!
//! A run is considered problematic when the interpreter exited non-zero, when
//! stderr contains a traceback or a line starting with `...Error:` /
//! `...Exception`, or when a deprecation warning is present. Other warnings
//! (e.g. `UserWarning`) do not make a run problematic.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static DEPRECATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(.*\.py):(\d*): (\w*Warning): (.*) (?:is|has been) deprecated\b.*$")
        .expect("deprecation regex")
});

static ATTRIBUTE_OBJECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)AttributeError: (.+?) object has no attribute ('[^']*'|\S+)")
        .expect("attribute regex")
});

static ATTRIBUTE_MODULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)AttributeError: module (.+?) has no attribute ('[^']*'|\S+)")
        .expect("module attribute regex")
});

static TYPE_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)TypeError: (.+?) got an unexpected keyword argument ('[^']*'|\S+)")
        .expect("keyword regex")
});

static ERROR_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:Traceback \(most recent call last\)|[\w.]*(?:Error|Exception)\b)")
        .expect("error marker regex")
});

/// Category of problem observed when running a snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProblemKind {
    None,
    DeprecationWarning,
    AttributeError,
    TypeError,
    UnclassifiedError,
}

impl ProblemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::DeprecationWarning => "DEPRECATION_WARNING",
            Self::AttributeError => "ATTRIBUTE_ERROR",
            Self::TypeError => "TYPE_ERROR",
            Self::UnclassifiedError => "UNCLASSIFIED_ERROR",
        }
    }
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured classification of one failure or warning.
///
/// Equality compares `kind`, `subject` and `element` only; two runs that fail
/// the same way with different tracebacks (paths, line numbers) are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: ProblemKind,
    /// Object, module or callable the problem is about.
    pub subject: String,
    /// Attribute or argument name; the warning category for deprecations.
    pub element: String,
    pub raw_message: String,
}

impl PartialEq for Diagnostic {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.subject == other.subject && self.element == other.element
    }
}

impl Eq for Diagnostic {}

impl Diagnostic {
    fn new(kind: ProblemKind, subject: &str, element: &str, raw_message: &str) -> Self {
        Self {
            kind,
            subject: subject.trim().to_string(),
            element: element.trim().to_string(),
            raw_message: raw_message.to_string(),
        }
    }

    /// A failure that matched none of the known patterns.
    pub fn unclassified(raw_message: &str) -> Self {
        Self::new(ProblemKind::UnclassifiedError, "", "", raw_message)
    }
}

/// Result of one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// True if the run produced neither an error nor a deprecation warning.
    pub problem_free: bool,
    pub diagnostic: Option<Diagnostic>,
}

impl RunOutcome {
    pub fn clean() -> Self {
        Self {
            problem_free: true,
            diagnostic: None,
        }
    }

    pub fn problem(diagnostic: Diagnostic) -> Self {
        Self {
            problem_free: false,
            diagnostic: Some(diagnostic),
        }
    }

    /// The sandbox itself failed (missing script, spawn error, ...).
    pub fn execution_failed(message: &str) -> Self {
        Self::problem(Diagnostic::unclassified(message))
    }

    pub fn kind(&self) -> ProblemKind {
        self.diagnostic
            .as_ref()
            .map(|d| d.kind)
            .unwrap_or(ProblemKind::None)
    }
}

type Matcher = fn(&str) -> Option<Diagnostic>;

/// Matchers in priority order; the first one that returns a diagnostic wins.
const MATCHERS: &[Matcher] = &[deprecation_warning, attribute_error, type_error];

/// Classify the stderr of a run that exited successfully.
pub fn classify(stderr: &str) -> RunOutcome {
    classify_run(stderr, true)
}

/// Classify the stderr of a run, taking the process exit status into account.
///
/// A non-zero exit with no recognisable output still counts as a failure.
pub fn classify_run(stderr: &str, exited_ok: bool) -> RunOutcome {
    let marked =
        !exited_ok || ERROR_MARKER_RE.is_match(stderr) || DEPRECATION_RE.is_match(stderr);
    if !marked {
        return RunOutcome::clean();
    }

    let diagnostic = MATCHERS
        .iter()
        .find_map(|matcher| matcher(stderr))
        .unwrap_or_else(|| Diagnostic::unclassified(stderr));
    RunOutcome::problem(diagnostic)
}

fn deprecation_warning(stderr: &str) -> Option<Diagnostic> {
    let caps = DEPRECATION_RE.captures(stderr)?;
    Some(Diagnostic::new(
        ProblemKind::DeprecationWarning,
        &caps[4],
        &caps[3],
        stderr,
    ))
}

fn attribute_error(stderr: &str) -> Option<Diagnostic> {
    let caps = ATTRIBUTE_OBJECT_RE
        .captures(stderr)
        .or_else(|| ATTRIBUTE_MODULE_RE.captures(stderr))?;
    Some(Diagnostic::new(
        ProblemKind::AttributeError,
        &caps[1],
        &caps[2],
        stderr,
    ))
}

fn type_error(stderr: &str) -> Option<Diagnostic> {
    let caps = TYPE_KEYWORD_RE.captures(stderr)?;
    Some(Diagnostic::new(ProblemKind::TypeError, &caps[1], &caps[2], stderr))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACEBACK_HEAD: &str = "Traceback (most recent call last):\n  File \"/tmp/ex.py\", line 6, in <module>\n";

    #[test]
    fn empty_output_is_problem_free() {
        let outcome = classify("");
        assert!(outcome.problem_free);
        assert!(outcome.diagnostic.is_none());
        assert_eq!(outcome.kind(), ProblemKind::None);
    }

    #[test]
    fn unrelated_warning_is_problem_free() {
        let stderr = "/tmp/ex.py:3: UserWarning: something odd happened\n";
        assert!(classify(stderr).problem_free);
    }

    #[test]
    fn future_warning_is_deprecation() {
        let stderr = "/tmp/ex.py:5: FutureWarning: The 'infer_datetime_format' keyword is deprecated and will be removed in a future version.\n  df = pd.to_datetime(s, infer_datetime_format=True)\n";
        let outcome = classify(stderr);
        assert!(!outcome.problem_free);
        let diag = outcome.diagnostic.unwrap();
        assert_eq!(diag.kind, ProblemKind::DeprecationWarning);
        assert_eq!(diag.subject, "The 'infer_datetime_format' keyword");
        assert_eq!(diag.element, "FutureWarning");
        assert_eq!(diag.raw_message, stderr);
    }

    #[test]
    fn has_been_deprecated_form() {
        let stderr = "/tmp/ex.py:4: DeprecationWarning: msort has been deprecated since 1.24\n";
        let diag = classify(stderr).diagnostic.unwrap();
        assert_eq!(diag.kind, ProblemKind::DeprecationWarning);
        assert_eq!(diag.subject, "msort");
        assert_eq!(diag.element, "DeprecationWarning");
    }

    #[test]
    fn object_attribute_error() {
        let stderr = format!(
            "{TRACEBACK_HEAD}AttributeError: 'Categorical' object has no attribute 'to_dense'\n"
        );
        let diag = classify_run(&stderr, false).diagnostic.unwrap();
        assert_eq!(diag.kind, ProblemKind::AttributeError);
        assert_eq!(diag.subject, "'Categorical'");
        assert_eq!(diag.element, "'to_dense'");
    }

    #[test]
    fn module_attribute_error_with_suggestion() {
        let stderr = format!(
            "{TRACEBACK_HEAD}AttributeError: module 'numpy' has no attribute 'msort'. Did you mean: 'sort'?\n"
        );
        let diag = classify_run(&stderr, false).diagnostic.unwrap();
        assert_eq!(diag.kind, ProblemKind::AttributeError);
        assert_eq!(diag.subject, "'numpy'");
        assert_eq!(diag.element, "'msort'");
    }

    #[test]
    fn unexpected_keyword_is_type_error() {
        let stderr = format!(
            "{TRACEBACK_HEAD}TypeError: factorize() got an unexpected keyword argument 'na_sentinel'\n"
        );
        let diag = classify_run(&stderr, false).diagnostic.unwrap();
        assert_eq!(diag.kind, ProblemKind::TypeError);
        assert_eq!(diag.subject, "factorize()");
        assert_eq!(diag.element, "'na_sentinel'");
    }

    #[test]
    fn other_error_is_unclassified() {
        let stderr = format!("{TRACEBACK_HEAD}ValueError: bad value\n");
        let outcome = classify_run(&stderr, false);
        let diag = outcome.diagnostic.unwrap();
        assert_eq!(diag.kind, ProblemKind::UnclassifiedError);
        assert!(diag.subject.is_empty());
        assert!(diag.element.is_empty());
        assert_eq!(diag.raw_message, stderr);
    }

    #[test]
    fn error_marker_without_nonzero_exit_still_fails() {
        let stderr = format!("{TRACEBACK_HEAD}KeyError: 'x'\n");
        let outcome = classify(&stderr);
        assert!(!outcome.problem_free);
        assert_eq!(outcome.kind(), ProblemKind::UnclassifiedError);
    }

    #[test]
    fn nonzero_exit_without_output_is_unclassified() {
        let outcome = classify_run("", false);
        assert!(!outcome.problem_free);
        assert_eq!(outcome.kind(), ProblemKind::UnclassifiedError);
    }

    #[test]
    fn deprecation_wins_over_later_error() {
        let stderr = format!(
            "/tmp/ex.py:2: FutureWarning: Series.append is deprecated and will be removed\n{TRACEBACK_HEAD}TypeError: f() got an unexpected keyword argument 'x'\n"
        );
        let diag = classify_run(&stderr, false).diagnostic.unwrap();
        assert_eq!(diag.kind, ProblemKind::DeprecationWarning);
        assert_eq!(diag.subject, "Series.append");
    }

    #[test]
    fn attribute_wins_over_type_error() {
        let stderr = "TypeError: f() got an unexpected keyword argument 'x'\nAttributeError: module 'np' has no attribute 'y'\n";
        let diag = classify_run(stderr, false).diagnostic.unwrap();
        assert_eq!(diag.kind, ProblemKind::AttributeError);
    }

    #[test]
    fn equality_ignores_raw_message() {
        let a = classify_run(
            "AttributeError: module 'numpy' has no attribute 'msort'\n  at line 3",
            false,
        );
        let b = classify_run(
            "AttributeError: module 'numpy' has no attribute 'msort'\n  at line 9",
            false,
        );
        assert_eq!(a.diagnostic, b.diagnostic);
        assert_ne!(
            a.diagnostic.unwrap().raw_message,
            b.diagnostic.unwrap().raw_message
        );
    }

    #[test]
    fn equality_compares_element() {
        let a = classify_run("AttributeError: module 'numpy' has no attribute 'msort'", false);
        let b = classify_run("AttributeError: module 'numpy' has no attribute 'sort'", false);
        assert_ne!(a.diagnostic, b.diagnostic);
    }

    #[test]
    fn execution_failure_is_unclassified() {
        let outcome = RunOutcome::execution_failed("sandbox script not found");
        assert!(!outcome.problem_free);
        let diag = outcome.diagnostic.unwrap();
        assert_eq!(diag.kind, ProblemKind::UnclassifiedError);
        assert_eq!(diag.raw_message, "sandbox script not found");
    }

    #[test]
    fn kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&ProblemKind::DeprecationWarning).unwrap();
        assert_eq!(json, "\"DEPRECATION_WARNING\"");
    }
}
