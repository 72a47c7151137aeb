//! paperthread: research-paper summarization pipeline
//!
//! Scrapes new papers, drops the ones already seen, fans the rest out to
//! independent summarization workers in chunks, waits for every chunk
//! artifact to land in the object store, merges them back into run order
//! and posts each paper as a reply-chained thread.
//!
//! # Core Concepts
//!
//! - **Object store**: the only shared medium between stages and workers
//! - **Chunk token**: ordered, collision-free id naming one worker's artifact
//! - **Run**: one scrape-to-post pass, identified by a timestamp `RunId`
//!
//! # Example
//!
//! ```
//! use paperthread::ThreadSegmenter;
//!
//! let posts = ThreadSegmenter::new(280).segment("A short summary.", "Title", "http://x", &[]);
//! assert_eq!(posts, vec!["Title\nA short summary.", "http://x"]);
//! ```

pub mod article;
pub mod artifact;
pub mod config;
pub mod fanout;
pub mod invoke;
pub mod keys;
pub mod library;
pub mod notify;
pub mod pipeline;
pub mod reassemble;
pub mod retry;
pub mod scrape;
pub mod storage;
pub mod summarize;
pub mod thread;
pub mod worker;

pub use article::{Article, SummarizedArticle, Summary, SummaryStatus, SUMMARY_UNAVAILABLE};
pub use artifact::{ChunkRecord, SummaryBatch};
pub use config::{ConfigError, PipelineConfig};
pub use fanout::{plan_chunks, Chunk, ChunkPayload, DispatchError, DispatchReceipt, Dispatcher, Throttle};
pub use invoke::{FunctionHandler, InvokeError, Invoker, LocalInvoker};
pub use keys::{ChunkToken, ResultLayout, RunId};
pub use library::{ArticleLibrary, DedupOutcome, LibraryError};
pub use notify::{MemoryNotifier, Notification, NotificationSink, WebhookNotifier};
pub use pipeline::{Pipeline, PipelineError, PipelineReport, RunOptions, RunStatus, Stage, Variant};
pub use reassemble::{MergePath, PollConfig, ReassembleError, Reassembler, ReassemblyReport};
pub use retry::{with_backoff, BackoffPolicy, RetryError, Retryable};
pub use scrape::{ArxivScraper, Scraper, StaticScraper};
pub use storage::{MemoryObjectStore, ObjectStore, OpenStore, SqliteObjectStore, StorageError, StorageResult};
pub use summarize::{ClaudeSummarizer, MockSummarizer, SummarizeError, Summarizer};
pub use thread::{
    MessageId, MockPostingClient, PostError, PostingClient, ThreadPoster, ThreadSegmenter,
    XClient, DEFAULT_MAX_LEN,
};
pub use worker::{ChunkReport, ChunkWorker, WorkerBudget, WorkerError, WorkerHandler};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
