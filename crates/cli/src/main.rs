use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use slideforge_core::config::{LlmConfig, PipelineConfig};
use slideforge_core::progress::ProgressReporter;
use slideforge_core::{FormulaDetector, LlmClient, Pipeline};
use slideforge_db::{Db, JobStatus};
use slideforge_storage::StorageConfig;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// slideforge: turn a PDF paper into a citation-grounded slide deck
#[derive(Parser)]
#[command(name = "slideforge", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a PDF and run the processing pipeline inline
    Process(ProcessArgs),
    /// Print the persisted deck for a document
    Show(ShowArgs),
}

#[derive(Parser)]
struct ProcessArgs {
    /// Path to the PDF file
    #[arg(short, long)]
    input: PathBuf,

    /// SQLite database path
    #[arg(long, default_value = "./slideforge.db")]
    db: PathBuf,

    /// Owner identifier recorded on the document
    #[arg(long, default_value = "local")]
    owner: String,

    /// Document title (default: input file stem)
    #[arg(long)]
    title: Option<String>,

    /// Storage backend
    #[arg(long, default_value = "local", value_parser = ["local", "s3", "minio", "gcs"])]
    storage: String,

    /// Root directory for the local storage backend
    #[arg(long, default_value = "./data")]
    storage_dir: PathBuf,

    /// S3/MinIO endpoint URL
    #[arg(long, default_value = "http://localhost:9000")]
    s3_endpoint: String,

    #[arg(long, default_value = "us-east-1")]
    s3_region: String,

    #[arg(long, env = "SLIDEFORGE_S3_ACCESS_KEY", default_value = "")]
    s3_access_key: String,

    #[arg(long, env = "SLIDEFORGE_S3_SECRET_KEY", default_value = "", hide_env_values = true)]
    s3_secret_key: String,

    #[arg(long, default_value = "slideforge")]
    s3_bucket: String,

    /// Bucket for the GCS backend
    #[arg(long, default_value = "")]
    gcs_bucket: String,

    /// LLM provider
    #[arg(short, long, default_value = "openai", value_parser = ["openai", "anthropic", "mock"])]
    provider: String,

    /// Model name
    #[arg(short, long)]
    model: Option<String>,

    /// API key for the LLM provider
    #[arg(long, env = "SLIDEFORGE_LLM_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,

    /// Base URL for OpenAI-compatible providers
    #[arg(long)]
    base_url: Option<String>,

    /// Fail documents with more pages than this
    #[arg(long, default_value = "200")]
    max_pages: u32,
}

#[derive(Parser)]
struct ShowArgs {
    /// Document id to display
    document_id: String,

    /// SQLite database path
    #[arg(long, default_value = "./slideforge.db")]
    db: PathBuf,
}

/// Stage progress bar backed by indicatif.
struct CliProgressReporter {
    bar: ProgressBar,
}

impl CliProgressReporter {
    fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}",
            )
            .unwrap()
            .progress_chars("█▉▊▋▌▍▎▏ "),
        );
        Self { bar }
    }
}

impl ProgressReporter for CliProgressReporter {
    fn on_stage(&self, stage: &str, progress: f64) {
        self.bar.set_position((progress * 100.0) as u64);
        self.bar.set_message(stage.to_string());
        if progress >= 1.0 {
            self.bar.finish_with_message("done");
        }
    }

    fn on_error(&self, stage: &str, error: &str) {
        self.bar.println(format!("  Error [{stage}]: {error}"));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Process(args) => run_process(args).await?,
        Commands::Show(args) => run_show(args).await?,
    }

    Ok(())
}

async fn run_process(args: ProcessArgs) -> Result<()> {
    let file_bytes = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    let storage_config = StorageConfig {
        backend: args.storage.clone(),
        local_storage_dir: args.storage_dir.clone(),
        s3_endpoint_url: args.s3_endpoint.clone(),
        s3_region: args.s3_region.clone(),
        s3_access_key: args.s3_access_key.clone(),
        s3_secret_key: args.s3_secret_key.clone(),
        s3_bucket: args.s3_bucket.clone(),
        gcs_bucket: args.gcs_bucket.clone(),
    };
    let storage = slideforge_storage::from_config(&storage_config)?;

    // Keep the original bytes alongside the derived artifacts.
    let file_key = format!("documents/{}/{}.pdf", args.owner, Uuid::new_v4());
    storage
        .upload(&file_key, &file_bytes)
        .await
        .with_context(|| format!("Failed to store original at {file_key}"))?;

    let title = args.title.clone().unwrap_or_else(|| {
        args.input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_string()
    });

    let db = Db::open(&args.db)?;
    let doc = db.create_document(&args.owner, &title, &file_key).await?;
    let job = db.create_job(&doc.id).await?;

    let llm_config = LlmConfig {
        provider: args.provider.clone(),
        model: args.model.clone().unwrap_or_else(|| LlmConfig::default().model),
        api_key: args.api_key.clone(),
        base_url: args
            .base_url
            .clone()
            .unwrap_or_else(|| LlmConfig::default().base_url),
        ..Default::default()
    };
    let config = PipelineConfig {
        max_pages: args.max_pages,
        llm: llm_config,
        ..Default::default()
    };

    let llm = LlmClient::from_config(&config.llm)?;
    let pipeline = Pipeline::new(config, llm, storage, FormulaDetector::disabled())
        .with_reporter(Arc::new(CliProgressReporter::new()));

    println!(
        "Processing {} (document {}, job {})",
        args.input.display(),
        doc.id,
        job.id
    );

    let run_result = pipeline.run(&db, &doc.id, &job.id, file_bytes).await;

    let job = db
        .get_job(&job.id)
        .await?
        .context("job row disappeared mid-run")?;

    match job.status {
        JobStatus::Done => {
            println!("\nJob done.");
            if let Some(metrics) = &job.metrics {
                println!("Metrics: {}", serde_json::to_string_pretty(metrics)?);
            }
            print_deck(&db, &doc.id).await?;
            println!("\nInspect later with: slideforge show {}", doc.id);
        }
        _ => {
            let code = job.error_code.as_deref().unwrap_or("UNKNOWN");
            let detail = job.error_detail.as_deref().unwrap_or("");
            println!("\nJob failed: {code} {detail}");
            if let Err(e) = run_result {
                anyhow::bail!(e.to_string());
            }
        }
    }

    Ok(())
}

async fn run_show(args: ShowArgs) -> Result<()> {
    let db = Db::open(&args.db)?;
    let doc = db
        .get_document(&args.document_id)
        .await?
        .with_context(|| format!("No document with id {}", args.document_id))?;

    println!("Document: {} ({})", doc.title, doc.id);
    println!(
        "  status={} pages={} language={}",
        doc.status.as_str(),
        doc.pages.map_or("?".to_string(), |p| p.to_string()),
        doc.language.as_deref().unwrap_or("?"),
    );

    print_deck(&db, &doc.id).await
}

async fn print_deck(db: &Db, document_id: &str) -> Result<()> {
    let sections = db.sections_for_document(document_id).await?;
    if sections.is_empty() {
        println!("\n(no deck persisted)");
        return Ok(());
    }

    for section in &sections {
        println!("\n# {}", section.heading);
        if !section.summary_note.is_empty() {
            println!("  ({})", section.summary_note);
        }

        for sub in db.subsections_for_section(&section.id).await? {
            println!("  ## {}", sub.heading);
            if !sub.annotation.is_empty() {
                println!("     note: {}", sub.annotation);
            }

            for bullet in db.bullets_for_subsection(&sub.id).await? {
                println!("     - {}", bullet.text);
                for citation in db.citations_for_bullet(&bullet.id).await? {
                    if let Some(span) = db.span(&citation.source_span_id).await? {
                        println!(
                            "       [p.{} ¶{}] \"{}\"",
                            span.page, span.paragraph_index, span.quote_snippet
                        );
                    }
                }
            }
        }
    }

    Ok(())
}
