//! paperthread CLI: research-paper pipeline runner.
//!
//! Usage:
//!   paperthread run [--dry-run] [--limit N] [--input articles.json] [--config file.yaml] [--db path]
//!   paperthread worker --payload chunk.json
//!   paperthread reassemble --run-id ID --expected N
//!   paperthread thread --title T --url U [--tag #X]... < body.txt

use clap::{Parser, Subcommand};
use paperthread::{
    ArxivScraper, ChunkPayload, ChunkWorker, ClaudeSummarizer, LocalInvoker, OpenStore, Pipeline,
    PipelineConfig, Reassembler, RunId, RunOptions, Scraper, SqliteObjectStore, StaticScraper,
    Summarizer, ThreadSegmenter, Variant, WebhookNotifier, WorkerHandler, XClient,
};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "paperthread",
    version,
    about = "Scrape, dedupe, summarize and post research papers as threads"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to a YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole pipeline once
    Run {
        /// Build threads without posting them
        #[arg(long)]
        dry_run: bool,
        /// Number of threads to post
        #[arg(long, default_value_t = 1)]
        limit: usize,
        /// Position in the consolidated batch to start posting from
        #[arg(long, default_value_t = 0)]
        start_index: usize,
        /// Thread body: the generated summary or the original abstract
        #[arg(long, default_value = "summary")]
        variant: Variant,
        /// Maximum number of articles to scrape
        #[arg(long)]
        scrape_limit: Option<usize>,
        /// Articles per worker invocation
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Read articles from a JSON file instead of scraping
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Summarize one chunk payload
    Worker {
        /// JSON file holding the chunk payload
        #[arg(long)]
        payload: PathBuf,
    },
    /// Wait for a run's chunk artifacts and consolidate them
    Reassemble {
        #[arg(long)]
        run_id: String,
        #[arg(long)]
        expected: usize,
    },
    /// Split a body read from stdin into a thread
    Thread {
        #[arg(long)]
        title: String,
        #[arg(long)]
        url: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long, default_value_t = paperthread::DEFAULT_MAX_LEN)]
        max_len: usize,
    },
}

/// Get the default database path (~/.local/share/paperthread/objects.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    let app_dir = data_dir.join("paperthread");
    std::fs::create_dir_all(&app_dir).ok();
    app_dir.join("objects.db")
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,paperthread=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn print_json<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error: failed to encode output: {}", e);
            1
        }
    }
}

fn open_store(config: &PipelineConfig, db: Option<PathBuf>) -> Result<Arc<SqliteObjectStore>, String> {
    let db_path = db
        .or_else(|| config.storage.db_path.clone())
        .unwrap_or_else(default_db_path);
    SqliteObjectStore::open(&db_path)
        .map(Arc::new)
        .map_err(|e| format!("Failed to open object store at {}: {}", db_path.display(), e))
}

fn summarizer(config: &PipelineConfig) -> Result<Arc<dyn Summarizer>, String> {
    let api_key = config
        .credentials
        .anthropic_api_key
        .clone()
        .ok_or("ANTHROPIC_API_KEY is not set")?;
    Ok(Arc::new(
        ClaudeSummarizer::new(api_key)
            .with_model(config.worker.model.clone())
            .with_max_tokens(config.worker.max_tokens)
            .with_temperature(config.worker.temperature),
    ))
}

fn chunk_worker(config: &PipelineConfig, store: Arc<SqliteObjectStore>) -> Result<ChunkWorker, String> {
    Ok(ChunkWorker::new(summarizer(config)?, store, config.layout())
        .with_budget(config.worker_budget()))
}

fn scraper(config: &PipelineConfig, input: Option<&Path>) -> Result<Arc<dyn Scraper>, String> {
    match input {
        Some(path) => StaticScraper::from_json_file(path)
            .map(|s| Arc::new(s) as Arc<dyn Scraper>)
            .map_err(|e| e.to_string()),
        None => Ok(Arc::new(
            ArxivScraper::new(config.scrape.url.clone()).with_start(config.scrape.start),
        )),
    }
}

async fn cmd_run(
    mut config: PipelineConfig,
    db: Option<PathBuf>,
    chunk_size: Option<usize>,
    input: Option<PathBuf>,
    options: RunOptions,
) -> Result<i32, String> {
    if let Some(chunk_size) = chunk_size {
        config.dispatch.chunk_size = chunk_size;
    }
    config.validate().map_err(|e| e.to_string())?;

    let store = open_store(&config, db)?;
    let worker = chunk_worker(&config, store.clone())?;
    let invoker = Arc::new(LocalInvoker::new().with_handler(
        config.dispatch.worker_function.clone(),
        Arc::new(WorkerHandler::new(Arc::new(worker))),
    ));
    let scraper = scraper(&config, input.as_deref())?;

    let x_token = config.credentials.x_access_token.clone();
    let webhook = config.credentials.webhook_url.clone();
    let mut pipeline = Pipeline::new(config, store, scraper, invoker.clone());
    if let Some(token) = x_token {
        pipeline = pipeline.with_posting_client(Arc::new(XClient::new(token)));
    }
    if let Some(url) = webhook {
        pipeline = pipeline.with_notifier(Arc::new(WebhookNotifier::new(url)));
    }

    let report = pipeline.run(&options).await;
    invoker.drain().await;
    Ok(print_json(&report))
}

async fn cmd_worker(config: PipelineConfig, db: Option<PathBuf>, payload: &Path) -> Result<i32, String> {
    let body = std::fs::read_to_string(payload)
        .map_err(|e| format!("Failed to read {}: {}", payload.display(), e))?;
    let payload: ChunkPayload =
        serde_json::from_str(&body).map_err(|e| format!("Invalid chunk payload: {}", e))?;

    let store = open_store(&config, db)?;
    let report = chunk_worker(&config, store)?
        .process(payload)
        .await
        .map_err(|e| e.to_string())?;
    Ok(print_json(&report))
}

async fn cmd_reassemble(
    config: PipelineConfig,
    db: Option<PathBuf>,
    run_id: String,
    expected: usize,
) -> Result<i32, String> {
    let store = open_store(&config, db)?;
    let reassembler = Reassembler::new(store, config.layout()).with_poll(config.poll());
    let report = reassembler
        .reassemble(&RunId::new(run_id), expected)
        .await
        .map_err(|e| e.to_string())?;
    Ok(print_json(&report))
}

fn cmd_thread(config: &PipelineConfig, title: &str, url: &str, tags: Vec<String>, max_len: usize) -> Result<i32, String> {
    let mut body = String::new();
    std::io::stdin()
        .read_to_string(&mut body)
        .map_err(|e| format!("Failed to read body from stdin: {}", e))?;
    let tags = if tags.is_empty() {
        config.thread.default_tags.clone()
    } else {
        tags
    };
    let segments = ThreadSegmenter::new(max_len)
        .with_fallback_tag(config.thread.fallback_tag.clone())
        .segment(&body, title, url, &tags);
    Ok(print_json(&segments))
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let config = match PipelineConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run {
            dry_run,
            limit,
            start_index,
            variant,
            scrape_limit,
            chunk_size,
            input,
        } => {
            let options = RunOptions {
                dry_run,
                limit,
                start_index,
                variant,
                scrape_limit,
            };
            cmd_run(config, cli.db, chunk_size, input, options).await
        }
        Commands::Worker { payload } => cmd_worker(config, cli.db, &payload).await,
        Commands::Reassemble { run_id, expected } => {
            cmd_reassemble(config, cli.db, run_id, expected).await
        }
        Commands::Thread {
            title,
            url,
            tags,
            max_len,
        } => cmd_thread(&config, &title, &url, tags, max_len),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
