pub mod diagnostic;
pub mod library;
pub mod report;
pub mod section;

pub use diagnostic::{Diagnostic, ProblemKind, RunOutcome, classify, classify_run};
pub use library::{Library, LibraryError};
pub use report::{DbSource, FixStatus, ModelResponse, Report, SnippetReport, UpdateStatus};
pub use section::{DocSection, RankedSection};
