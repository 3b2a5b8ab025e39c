//! Host side of a fixing run: executing snippets, reconciling imports,
//! verifying fixes and driving the per-library pipeline.

pub mod imports;
pub mod pipeline;
pub mod sandbox;
pub mod verify;

pub use imports::{Import, ImportParseError, parse_imports, reconcile_imports};
pub use pipeline::{Advisor, PipelineContext, Suggestion, fix_example, fix_examples, suggest_fix};
pub use sandbox::{Execution, Sandbox, ScriptSandbox, run_snippet};
pub use verify::{FixAttempt, Verification, determine_fix_status, unified_diff, verify_fix};
