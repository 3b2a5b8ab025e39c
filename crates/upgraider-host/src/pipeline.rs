//! The fixing pipeline for one library.
//!
//! For each example snippet, strictly in order:
//!
//! 1. run the original and classify it (baseline);
//! 2. retrieve references and render the prompt;
//! 3. ask the model and parse its answer;
//! 4. write the prompt and raw answer as audit artifacts;
//! 5. verify the proposed fix, if any.
//!
//! A snippet that fails outright is recorded with its error and the run
//! moves on. Snippets are separated by a fixed pause to stay under API rate
//! limits.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use upgraider_ai::{
    CompletionService, EmbeddingService, PromptTemplate, RetrievalConfig, parse_response, retrieve,
};
use upgraider_core::report::api_name;
use upgraider_core::{DbSource, DocSection, Library, ModelResponse, Report, SnippetReport};
use upgraider_store::ArtifactStore;

use crate::sandbox::{Sandbox, run_snippet};
use crate::verify::verify_fix;

/// Model side of the pipeline: retrieval, prompting and the model itself.
pub struct Advisor {
    pub completion: Box<dyn CompletionService>,
    pub embedder: Box<dyn EmbeddingService>,
    pub template: PromptTemplate,
    /// Ignored when `db_source` is [`DbSource::ModelOnly`].
    pub corpus: Vec<DocSection>,
    pub retrieval: RetrievalConfig,
    pub db_source: DbSource,
}

/// Everything a library run needs, built once by the caller.
pub struct PipelineContext {
    pub library: Library,
    pub advisor: Advisor,
    pub sandbox: Box<dyn Sandbox>,
    pub artifacts: ArtifactStore,
    /// Pause between consecutive snippets.
    pub delay: Duration,
}

/// A model suggestion for one piece of code.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub prompt: String,
    /// Raw model text; empty if the model could not be reached.
    pub raw_response: String,
    pub response: ModelResponse,
    pub num_references: usize,
}

/// Retrieve, prompt and parse. Model failures degrade to `NO_RESPONSE`.
pub async fn suggest_fix(advisor: &Advisor, code: &str) -> Suggestion {
    let references = match advisor.db_source {
        DbSource::Documentation => {
            retrieve(code, &advisor.corpus, advisor.embedder.as_ref(), &advisor.retrieval).await
        }
        DbSource::ModelOnly => Vec::new(),
    };
    let prompt = advisor.template.render(code, &references);

    let (raw_response, response) = match advisor.completion.complete(&prompt).await {
        Ok(text) => {
            let parsed = parse_response(&text);
            (text, parsed)
        }
        Err(e) => {
            warn!(error = %e, model = advisor.completion.model_name(), "model request failed");
            (String::new(), ModelResponse::no_response())
        }
    };

    Suggestion {
        prompt,
        raw_response,
        response,
        num_references: references.len(),
    }
}

/// Fix a single example file of `ctx.library`.
pub async fn fix_example(ctx: &PipelineContext, file_name: &str) -> anyhow::Result<SnippetReport> {
    let path = ctx.library.examples_dir().join(file_name);
    let original_code = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let stem = api_name(file_name);
    info!(file = file_name, "fixing example");

    let original_run = run_snippet(ctx.sandbox.as_ref(), &path, &ctx.library).await;
    let suggestion = suggest_fix(&ctx.advisor, &original_code).await;

    let prompt_file = ctx.artifacts.write_prompt(&stem, &suggestion.prompt)?;
    let response_file = ctx
        .artifacts
        .write_response(&stem, &suggestion.raw_response)?;

    let verification = verify_fix(
        &original_code,
        &suggestion.response,
        &original_run,
        &stem,
        &ctx.library,
        ctx.sandbox.as_ref(),
        &ctx.artifacts,
    )
    .await?;

    Ok(SnippetReport {
        original_file: file_name.to_string(),
        api: stem,
        prompt_file: Some(prompt_file.display().to_string()),
        original_run: Some(original_run),
        model_response: suggestion.response,
        model_response_file: Some(response_file.display().to_string()),
        num_references: suggestion.num_references,
        modified_file: verification
            .modified_file
            .map(|p| p.display().to_string()),
        modified_run: verification.modified_run,
        fix_status: verification.fix_status,
        diff: verification.diff,
        error: None,
    })
}

/// Fix every example of `ctx.library` and write `report.json`.
pub async fn fix_examples(ctx: &PipelineContext) -> anyhow::Result<Report> {
    let files = ctx
        .library
        .example_files()
        .context("failed to list examples")?;
    info!(
        library = %ctx.library.name,
        model = ctx.advisor.completion.model_name(),
        source = %ctx.advisor.db_source,
        count = files.len(),
        "fixing examples"
    );

    let mut snippets = BTreeMap::new();
    for (i, file) in files.iter().enumerate() {
        if i > 0 && !ctx.delay.is_zero() {
            tokio::time::sleep(ctx.delay).await;
        }
        eprintln!("  [{}/{}] {file}", i + 1, files.len());

        let report = match fix_example(ctx, file).await {
            Ok(report) => report,
            Err(e) => {
                warn!(file = %file, error = %e, "snippet failed");
                SnippetReport::failed(file, &e)
            }
        };
        snippets.insert(file.clone(), report);
    }

    let report = Report::new(
        ctx.library.clone(),
        ctx.advisor.db_source,
        ctx.advisor.completion.model_name(),
        snippets,
    );
    let path = ctx.artifacts.write_report(&report)?;
    info!(
        fixed = report.num_fixed,
        updated = report.num_updated,
        total = report.num_snippets,
        path = %path.display(),
        "report written"
    );
    Ok(report)
}
