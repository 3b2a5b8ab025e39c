mod config;
mod display;
mod embed;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use upgraider_core::{DbSource, Library};
use upgraider_host::{PipelineContext, fix_example, fix_examples, suggest_fix};
use upgraider_store::{ArtifactStore, DuckStore, find_reports, read_report};

use crate::config::{ModelArgs, SandboxArgs};

const EXPERIMENT_THRESHOLD: f32 = 0.5;

#[derive(Parser)]
#[command(name = "upgraider")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Update code that uses deprecated library APIs with an LLM", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fix the examples of one library
    Fix {
        /// Library folder containing library.json and examples/
        #[arg(long)]
        libpath: PathBuf,

        /// Directory for prompts, responses, updated code and report.json
        #[arg(long)]
        output_dir: PathBuf,

        /// Reference source: doc (documentation) or modelonly
        #[arg(long)]
        db_source: DbSource,

        /// Similarity threshold for retrieval
        #[arg(long)]
        threshold: Option<f32>,

        /// Fix only this example (file name only)
        #[arg(long)]
        example_file: Option<String>,

        /// Pause between examples, to stay under API rate limits
        #[arg(long, default_value_t = 30)]
        delay_secs: u64,

        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        sandbox: SandboxArgs,
    },

    /// Run every library with and without documentation
    Experiment {
        /// Folder holding one sub-folder per library
        #[arg(long)]
        libraries: PathBuf,

        #[arg(long)]
        output_dir: PathBuf,

        #[arg(long, default_value_t = EXPERIMENT_THRESHOLD)]
        threshold: f32,

        #[arg(long, default_value_t = 30)]
        delay_secs: u64,

        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        sandbox: SandboxArgs,
    },

    /// Read code from stdin and print an updated version, if any
    Suggest {
        #[arg(long)]
        threshold: Option<f32>,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Compute embeddings for corpus sections that lack them
    Embed {
        /// DuckDB database holding doc_sections
        #[arg(long)]
        db: PathBuf,

        /// Replace doc_sections from this Parquet file first
        #[arg(long)]
        import: Option<PathBuf>,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Markdown summary of every report.json under a directory
    Summary {
        #[arg(long)]
        reports: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();
    info!("upgraider v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    match cli.command {
        Command::Fix {
            libpath,
            output_dir,
            db_source,
            threshold,
            example_file,
            delay_secs,
            model,
            sandbox,
        } => {
            let library = Library::load(&libpath)?;
            let ctx = pipeline(
                library,
                &model,
                &sandbox,
                db_source,
                threshold,
                output_dir,
                delay_secs,
            )?;
            match example_file {
                Some(file) => {
                    let report = fix_example(&ctx, &file).await?;
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                None => {
                    let report = fix_examples(&ctx).await?;
                    eprintln!(
                        "{}: {}/{} fixed, {} updated",
                        report.library.name,
                        report.num_fixed,
                        report.num_snippets,
                        report.num_updated
                    );
                }
            }
        }

        Command::Experiment {
            libraries,
            output_dir,
            threshold,
            delay_secs,
            model,
            sandbox,
        } => {
            for libpath in library_dirs(&libraries)? {
                let library = Library::load(&libpath)?;
                let lib_dir = libpath
                    .file_name()
                    .context("library folder has no name")?
                    .to_os_string();
                for db_source in [DbSource::ModelOnly, DbSource::Documentation] {
                    eprintln!("=== {} with {db_source}", library.name);
                    let ctx = pipeline(
                        library.clone(),
                        &model,
                        &sandbox,
                        db_source,
                        Some(threshold),
                        output_dir.join(&lib_dir).join(db_source.as_str()),
                        delay_secs,
                    )?;
                    fix_examples(&ctx).await?;
                }
            }
        }

        Command::Suggest { threshold, model } => {
            let mut code = String::new();
            std::io::stdin()
                .read_to_string(&mut code)
                .context("reading code from stdin")?;
            let db_source = if model.corpus.is_some() {
                DbSource::Documentation
            } else {
                DbSource::ModelOnly
            };
            let advisor = model.advisor(db_source, threshold, None)?;
            let suggestion = suggest_fix(&advisor, &code).await;
            if let Some(text) = display::render_suggestion(&suggestion.response) {
                println!("{text}");
            }
        }

        Command::Embed { db, import, model } => {
            let store = DuckStore::open_persistent(&db)
                .with_context(|| format!("opening {}", db.display()))?;
            let embedder = model.embedder()?;
            eprintln!("Embedding doc sections in {}", db.display());
            let stats = embed::run_embed_pipeline(&store, &embedder, import.as_deref()).await?;
            eprintln!(
                "Done: {} embedded, {} failed in {:.1}s",
                stats.embedded, stats.failed, stats.elapsed_secs
            );
        }

        Command::Summary { reports } => {
            let paths = find_reports(&reports)?;
            let mut loaded = Vec::with_capacity(paths.len());
            for path in &paths {
                loaded.push(
                    read_report(path).with_context(|| format!("reading {}", path.display()))?,
                );
            }
            print!("{}", display::render_summary(&loaded));
        }
    }

    Ok(())
}

fn pipeline(
    library: Library,
    model: &ModelArgs,
    sandbox: &SandboxArgs,
    db_source: DbSource,
    threshold: Option<f32>,
    output_dir: PathBuf,
    delay_secs: u64,
) -> anyhow::Result<PipelineContext> {
    let advisor = model.advisor(db_source, threshold, Some(&library.name))?;
    Ok(PipelineContext {
        library,
        advisor,
        sandbox: Box::new(sandbox.sandbox()),
        artifacts: ArtifactStore::new(output_dir),
        delay: Duration::from_secs(delay_secs),
    })
}

/// Library folders under `root`, sorted, skipping dotfiles.
fn library_dirs(root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in
        std::fs::read_dir(root).with_context(|| format!("listing {}", root.display()))?
    {
        let entry = entry?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if !hidden && entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}
