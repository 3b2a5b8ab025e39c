//! Flags and environment shared by the fixing commands, and the wiring that
//! turns them into a pipeline.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use clap::{Args, ValueEnum};
use tracing::info;
use upgraider_ai::{
    ChatClient, CompletionClient, CompletionService, DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL,
    DEFAULT_EMBEDDING_MODEL, EmbeddingClient, EmbeddingService, LlmError, PromptTemplate,
    RetrievalConfig,
};
use upgraider_core::{DbSource, DocSection};
use upgraider_host::{Advisor, ScriptSandbox};
use upgraider_store::{DuckStore, load_sections_parquet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelChoice {
    /// Chat completions API.
    #[value(name = "gpt-3.5")]
    Gpt35,
    /// Plain completion endpoint with custom auth headers.
    #[value(name = "gpt-4")]
    Gpt4,
}

#[derive(Debug, Args)]
pub struct ModelArgs {
    /// Which model to use for fixing.
    #[arg(long, value_enum, default_value_t = ModelChoice::Gpt35)]
    pub model: ModelChoice,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(long, default_value = DEFAULT_CHAT_MODEL)]
    pub chat_model: String,

    #[arg(long, default_value = DEFAULT_EMBEDDING_MODEL)]
    pub embedding_model: String,

    /// Endpoint used by `--model gpt-4`.
    #[arg(long, env = "UPGRAIDER_COMPLETION_ENDPOINT")]
    pub completion_endpoint: Option<String>,

    /// JSON object of extra headers for the completion endpoint.
    #[arg(
        long,
        env = "UPGRAIDER_COMPLETION_HEADERS",
        default_value = "{}",
        hide_env_values = true
    )]
    pub completion_headers: String,

    /// Documentation corpus: a DuckDB database or a Parquet file.
    #[arg(long)]
    pub corpus: Option<PathBuf>,

    /// Prompt template overriding the bundled one.
    #[arg(long)]
    pub template: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct SandboxArgs {
    /// Script that runs a snippet against the library's current version.
    #[arg(long, env = "UPGRAIDER_SANDBOX_SCRIPT", default_value = "run_code.sh")]
    pub sandbox_script: PathBuf,

    /// Wall-clock limit for one snippet run.
    #[arg(long, default_value_t = 300)]
    pub timeout_secs: u64,
}

impl SandboxArgs {
    pub fn sandbox(&self) -> ScriptSandbox {
        ScriptSandbox::new(
            self.sandbox_script.clone(),
            Duration::from_secs(self.timeout_secs),
        )
    }
}

impl ModelArgs {
    fn api_key(&self) -> anyhow::Result<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .context("OPENAI_API_KEY is not set")
    }

    fn completion(&self) -> anyhow::Result<Box<dyn CompletionService>> {
        Ok(match self.model {
            ModelChoice::Gpt35 => Box::new(ChatClient::new(
                &self.base_url,
                self.api_key()?,
                self.chat_model.clone(),
            )),
            ModelChoice::Gpt4 => {
                let endpoint = self
                    .completion_endpoint
                    .clone()
                    .context("UPGRAIDER_COMPLETION_ENDPOINT is required for gpt-4")?;
                Box::new(CompletionClient::new(
                    endpoint,
                    &self.completion_headers,
                    "gpt-4".to_string(),
                )?)
            }
        })
    }

    pub fn embedder(&self) -> anyhow::Result<EmbeddingClient> {
        Ok(EmbeddingClient::new(
            &self.base_url,
            self.api_key()?,
            self.embedding_model.clone(),
        ))
    }

    fn template(&self) -> anyhow::Result<PromptTemplate> {
        Ok(match &self.template {
            Some(path) => PromptTemplate::from_file(path)?,
            None => PromptTemplate::bundled()?,
        })
    }

    /// Build the model side of the pipeline.
    ///
    /// With `Documentation` the corpus is required; `library` narrows a
    /// DuckDB corpus to that library's sections.
    pub fn advisor(
        &self,
        db_source: DbSource,
        threshold: Option<f32>,
        library: Option<&str>,
    ) -> anyhow::Result<Advisor> {
        let (corpus, embedder): (Vec<DocSection>, Box<dyn EmbeddingService>) = match db_source {
            DbSource::Documentation => {
                let path = self
                    .corpus
                    .as_deref()
                    .context("--corpus is required with --db-source doc")?;
                let corpus = load_corpus(path, library)?;
                let embedder: Box<dyn EmbeddingService> = Box::new(self.embedder()?);
                (corpus, embedder)
            }
            DbSource::ModelOnly => {
                let embedder: Box<dyn EmbeddingService> = Box::new(NoEmbedder);
                (Vec::new(), embedder)
            }
        };

        Ok(Advisor {
            completion: self.completion()?,
            embedder,
            template: self.template()?,
            corpus,
            retrieval: RetrievalConfig {
                threshold,
                ..RetrievalConfig::default()
            },
            db_source,
        })
    }
}

/// Embedder for runs that never retrieve.
struct NoEmbedder;

#[async_trait]
impl EmbeddingService for NoEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        Err(LlmError::Config("retrieval is disabled for model-only runs".into()))
    }
}

/// Load embedded sections from a `.parquet` file or a DuckDB database.
pub fn load_corpus(path: &Path, library: Option<&str>) -> anyhow::Result<Vec<DocSection>> {
    if !path.exists() {
        bail!("corpus not found: {}", path.display());
    }
    let sections = if path.extension().is_some_and(|e| e == "parquet") {
        load_sections_parquet(path)?
    } else {
        DuckStore::open_read_only(path)
            .with_context(|| format!("opening corpus {}", path.display()))?
            .doc_sections(library)?
    };
    info!(count = sections.len(), path = %path.display(), "corpus loaded");
    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        model: ModelArgs,
    }

    fn parse(args: &[&str]) -> ModelArgs {
        let mut argv = vec!["upgraider"];
        argv.extend_from_slice(args);
        Harness::parse_from(argv).model
    }

    #[test]
    fn model_names_match_cli_values() {
        assert_eq!(parse(&["--model", "gpt-4"]).model, ModelChoice::Gpt4);
        assert_eq!(parse(&[]).model, ModelChoice::Gpt35);
        assert!(Harness::try_parse_from(["upgraider", "--model", "claude"]).is_err());
    }

    #[test]
    fn model_only_needs_no_corpus() {
        let args = parse(&["--api-key", "sk-test"]);
        let advisor = args.advisor(DbSource::ModelOnly, Some(0.5), None).unwrap();
        assert!(advisor.corpus.is_empty());
        assert_eq!(advisor.retrieval.threshold, Some(0.5));
        assert_eq!(advisor.completion.model_name(), DEFAULT_CHAT_MODEL);
    }

    #[test]
    fn documentation_requires_corpus() {
        let args = parse(&["--api-key", "sk-test"]);
        let err = args
            .advisor(DbSource::Documentation, None, None)
            .err()
            .unwrap();
        assert!(err.to_string().contains("--corpus"));
    }

    #[test]
    fn gpt4_requires_endpoint() {
        let mut args = parse(&["--model", "gpt-4"]);
        args.completion_endpoint = None;
        assert!(args.advisor(DbSource::ModelOnly, None, None).is_err());

        args.completion_endpoint = Some("https://example.invalid/completions".into());
        args.completion_headers = r#"{"api-key": "k"}"#.into();
        let advisor = args.advisor(DbSource::ModelOnly, None, None).unwrap();
        assert_eq!(advisor.completion.model_name(), "gpt-4");
    }

    #[test]
    fn loads_duckdb_corpus_for_one_library() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("docs.duckdb");
        {
            let store = DuckStore::open_persistent(&db).unwrap();
            store.insert_section(1, "numpy", "1.25.0", "msort is deprecated").unwrap();
            store.insert_section(2, "pandas", "2.0.0", "append removed").unwrap();
            store.set_embedding(1, &[1.0, 0.0]).unwrap();
            store.set_embedding(2, &[0.0, 1.0]).unwrap();
        }
        let numpy = load_corpus(&db, Some("numpy")).unwrap();
        assert_eq!(numpy.len(), 1);
        assert_eq!(numpy[0].content, "msort is deprecated");
        assert_eq!(load_corpus(&db, None).unwrap().len(), 2);
    }

    #[test]
    fn database_without_doc_sections_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("unrelated.duckdb");
        duckdb::Connection::open(&db)
            .unwrap()
            .execute_batch("CREATE TABLE notes (id INTEGER)")
            .unwrap();

        let err = load_corpus(&db, None).unwrap_err();
        assert!(format!("{err:#}").contains("doc_sections"));
    }

    #[test]
    fn missing_corpus_is_an_error() {
        assert!(load_corpus(Path::new("/nonexistent/docs.duckdb"), None).is_err());
    }
}
