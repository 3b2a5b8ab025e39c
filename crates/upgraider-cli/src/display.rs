//! Text rendering for the terminal: report summaries and inline suggestions.
//!
//! Summaries are GitHub-flavoured markdown so they can be pasted into issues
//! as they are.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use upgraider_core::{DbSource, FixStatus, ModelResponse, Report, UpdateStatus};

const COMMENT_WIDTH: usize = 80;
const SUGGESTION_HEADER: &str = "# I updated this code for you because:";

// ── Suggestions ──

/// Updated code preceded by the model's reason as wrapped `# ` comments.
///
/// `None` unless the model proposed an update with code.
pub fn render_suggestion(response: &ModelResponse) -> Option<String> {
    if response.update_status != UpdateStatus::Update {
        return None;
    }
    let code = response.updated_code.as_deref()?;

    let mut out = String::new();
    if let Some(reason) = &response.reason {
        out.push_str(SUGGESTION_HEADER);
        out.push('\n');
        for line in textwrap::wrap(reason, COMMENT_WIDTH) {
            out.push_str("# ");
            out.push_str(&line);
            out.push('\n');
        }
    }
    out.push_str(code);
    Some(out)
}

// ── Summaries ──

/// Per-report statistics followed by a per-example comparison of the
/// model-only and documentation runs of each library.
pub fn render_summary(reports: &[Report]) -> String {
    let mut out = String::new();
    write_stats_table(&mut out, reports);
    out.push('\n');
    write_example_table(&mut out, reports);
    out
}

fn write_stats_table(out: &mut String, reports: &[Report]) {
    let _ = writeln!(out, "# Results");
    let _ = writeln!(
        out,
        "| Library | Source | Model | # Snippets | Unique APIs | # (%) Updated | # (%) Use Ref | # (%) Fixed |"
    );
    let _ = writeln!(out, "| --- | --- | --- | --: | --: | --: | --: | --: |");
    for r in reports {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} ({}) | {} ({}) | {} ({}) |",
            r.library.name,
            r.db_source,
            r.model,
            r.num_snippets,
            r.num_apis,
            r.num_updated,
            percent(r.percent_updated),
            r.num_updated_w_refs,
            percent(r.percent_updated_w_refs),
            r.num_fixed,
            percent(r.percent_fixed),
        );
    }
}

#[derive(Default)]
struct LibraryRuns<'a> {
    model_only: Option<&'a Report>,
    documentation: Option<&'a Report>,
}

fn write_example_table(out: &mut String, reports: &[Report]) {
    let mut libraries: BTreeMap<&str, LibraryRuns<'_>> = BTreeMap::new();
    for r in reports {
        let runs = libraries.entry(r.library.name.as_str()).or_default();
        match r.db_source {
            DbSource::ModelOnly => runs.model_only = Some(r),
            DbSource::Documentation => runs.documentation = Some(r),
        }
    }

    let _ = writeln!(out, "# Examples");
    let _ = writeln!(out, "| Lib | Example | Model Only | Model + Doc |");
    let _ = writeln!(out, "| --- | --- | :-: | :-: |");

    let (mut total, mut fixed_model, mut fixed_doc) = (0, 0, 0);
    for (lib, runs) in &libraries {
        let examples: BTreeSet<&str> = [runs.model_only, runs.documentation]
            .into_iter()
            .flatten()
            .flat_map(|r| r.snippets.keys().map(String::as_str))
            .collect();
        for example in &examples {
            let _ = writeln!(
                out,
                "| {lib} | {example} | {} | {} |",
                status_icon(runs.model_only, example),
                status_icon(runs.documentation, example),
            );
        }
        total += examples.len();
        fixed_model += runs.model_only.map_or(0, |r| r.num_fixed);
        fixed_doc += runs.documentation.map_or(0, |r| r.num_fixed);
    }

    let best = fixed_model.max(fixed_doc);
    let _ = writeln!(
        out,
        "| Total | {total} | {} | {} |",
        total_cell(fixed_model, total, best),
        total_cell(fixed_doc, total, best),
    );
}

fn status_icon(report: Option<&Report>, example: &str) -> &'static str {
    let Some(snippet) = report.and_then(|r| r.snippets.get(example)) else {
        return "N/A";
    };
    if snippet.error.is_some() {
        return ":question:";
    }
    match snippet.fix_status {
        FixStatus::Fixed => ":white_check_mark:",
        FixStatus::NotFixed => ":x:",
        FixStatus::NewError => ":warning:",
    }
}

fn total_cell(fixed: usize, total: usize, best: usize) -> String {
    let ratio = if total == 0 {
        "--".to_string()
    } else {
        percent(fixed as f64 * 100.0 / total as f64)
    };
    let cell = format!("{fixed} ({ratio})");
    if fixed == best && total > 0 {
        format!("**{cell}**")
    } else {
        cell
    }
}

fn percent(value: f64) -> String {
    format!("{value:.2}%")
}
