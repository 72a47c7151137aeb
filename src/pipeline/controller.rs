//! Pipeline controller
//!
//! Sequences scrape → dedup → dispatch → reassemble → post for one run and
//! folds every stage outcome into a `PipelineReport`. A failing stage stops
//! the run; archiving and notification after a successful post are best
//! effort.

use super::status::{PipelineError, PipelineReport, RunStatus, Stage, StageReport};
use crate::article::{Article, SummarizedArticle};
use crate::config::PipelineConfig;
use crate::fanout::{DispatchReceipt, Dispatcher};
use crate::invoke::Invoker;
use crate::keys::{scrape_snapshot_key, RunId};
use crate::library::ArticleLibrary;
use crate::notify::{notify_best_effort, Notification, NotificationSink};
use crate::reassemble::{Reassembler, ReassemblyReport};
use crate::retry::BackoffPolicy;
use crate::scrape::Scraper;
use crate::storage::{put_json, ObjectStore};
use crate::thread::{tag_block, MessageId, PostingClient, ThreadPoster, ThreadSegmenter};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Which text of an article becomes the thread body
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    #[default]
    Summary,
    Abstract,
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "summary" => Ok(Self::Summary),
            "abstract" => Ok(Self::Abstract),
            other => Err(format!("unknown variant '{}', expected summary or abstract", other)),
        }
    }
}

/// Per-run options
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Build threads but do not post them
    pub dry_run: bool,
    /// Number of threads to post
    pub limit: usize,
    /// Position in the consolidated batch to start posting from
    pub start_index: usize,
    pub variant: Variant,
    /// Overrides the configured scrape limit
    pub scrape_limit: Option<usize>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            limit: 1,
            start_index: 0,
            variant: Variant::Summary,
            scrape_limit: None,
        }
    }
}

/// A thread built for one article
#[derive(Debug, Clone, Serialize)]
pub struct ThreadOutcome {
    pub title: String,
    pub url: String,
    pub segments: Vec<String>,
    pub ids: Vec<MessageId>,
}

fn detail<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Thread body for `variant`; unavailable summaries have none
fn thread_body(article: &SummarizedArticle, variant: Variant) -> Option<&str> {
    match variant {
        Variant::Summary if article.is_summarized() => Some(article.summary.as_str()),
        Variant::Summary => None,
        Variant::Abstract => Some(article.article.snippet.as_str()),
    }
}

fn record<T>(
    report: &mut PipelineReport,
    stage: Stage,
    result: Result<(T, Value), PipelineError>,
) -> Result<T, PipelineError> {
    match result {
        Ok((value, detail)) => {
            report.stages.push(StageReport::ok(stage, detail));
            Ok(value)
        }
        Err(e) => {
            error!(stage = ?stage, error = %e, "Stage failed");
            report.stages.push(StageReport::failed(stage, &e));
            Err(e)
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<dyn ObjectStore>,
    scraper: Arc<dyn Scraper>,
    invoker: Arc<dyn Invoker>,
    posting: Option<Arc<dyn PostingClient>>,
    notifier: Option<Arc<dyn NotificationSink>>,
    post_backoff: BackoffPolicy,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn ObjectStore>,
        scraper: Arc<dyn Scraper>,
        invoker: Arc<dyn Invoker>,
    ) -> Self {
        Self {
            config,
            store,
            scraper,
            invoker,
            posting: None,
            notifier: None,
            post_backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_posting_client(mut self, client: Arc<dyn PostingClient>) -> Self {
        self.posting = Some(client);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_post_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.post_backoff = backoff;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn reassembler(&self) -> Reassembler {
        Reassembler::new(self.store.clone(), self.config.layout()).with_poll(self.config.poll())
    }

    /// Run every stage once. Failures are reported, never returned.
    pub async fn run(&self, options: &RunOptions) -> PipelineReport {
        let mut report = PipelineReport::default();
        info!(dry_run = options.dry_run, variant = ?options.variant, "Starting pipeline run");

        match self.run_stages(options, &mut report).await {
            Ok(()) => info!(status = ?report.status, "Pipeline run finished"),
            Err(e) => report.fail(&e),
        }
        report
    }

    async fn run_stages(
        &self,
        options: &RunOptions,
        report: &mut PipelineReport,
    ) -> Result<(), PipelineError> {
        let scraped = record(report, Stage::Scrape, self.scrape(options).await)?;
        let new = record(report, Stage::Dedup, self.dedup(scraped).await)?;
        if new.is_empty() {
            report.status = RunStatus::NoNewArticles;
            return Ok(());
        }

        let run_id = RunId::generate();
        report.run_id = Some(run_id.clone());
        let receipt = record(report, Stage::Dispatch, self.dispatch(run_id.clone(), new).await)?;
        let reassembly = record(report, Stage::Reassemble, self.reassemble(&receipt).await)?;
        let threads = record(report, Stage::Post, self.post_run(&run_id, options).await)?;

        let posted = threads.iter().filter(|t| !t.ids.is_empty()).count();
        if !options.dry_run && posted > 0 {
            match self.reassembler().archive(&run_id).await {
                Ok(archived) => report.stages.push(StageReport::ok(Stage::Archive, detail(&archived))),
                Err(e) => {
                    warn!(run_id = %run_id, error = %e, "Archiving failed");
                    report.stages.push(StageReport::failed(Stage::Archive, &e));
                }
            }
        }

        if let Some(notifier) = &self.notifier {
            let notification = Notification {
                message: format!(
                    "Run {}: {} articles summarized, {} threads posted{}",
                    run_id,
                    reassembly.article_count,
                    posted,
                    if options.dry_run { " (dry run)" } else { "" }
                ),
                articles: reassembly.titles.clone(),
            };
            let delivered = notify_best_effort(notifier.as_ref(), &notification).await;
            report
                .stages
                .push(StageReport::ok(Stage::Notify, json!({ "delivered": delivered })));
        }
        Ok(())
    }

    async fn scrape(&self, options: &RunOptions) -> Result<(Vec<Article>, Value), PipelineError> {
        let limit = options.scrape_limit.unwrap_or(self.config.scrape.limit);
        let articles = self.scraper.scrape(Some(limit)).await;

        let key = scrape_snapshot_key(&self.config.storage.scraper_prefix, Utc::now());
        put_json(self.store.as_ref(), &key, &articles).await?;
        info!(count = articles.len(), key = %key, "Saved scrape snapshot");

        let detail = json!({ "count": articles.len(), "snapshot_key": key });
        Ok((articles, detail))
    }

    async fn dedup(&self, scraped: Vec<Article>) -> Result<(Vec<Article>, Value), PipelineError> {
        let library = ArticleLibrary::new(self.store.clone(), self.config.storage.library_key.clone());
        let outcome = library.filter_new(scraped).await?;
        let detail = json!({
            "new": outcome.new.len(),
            "already_seen": outcome.already_seen,
            "library_size": outcome.library_size,
            "persisted": outcome.persisted,
        });
        Ok((outcome.new, detail))
    }

    async fn dispatch(
        &self,
        run_id: RunId,
        articles: Vec<Article>,
    ) -> Result<(DispatchReceipt, Value), PipelineError> {
        let receipt = Dispatcher::new(self.invoker.clone(), self.config.dispatch.worker_function.clone())
            .with_chunk_size(self.config.dispatch.chunk_size)
            .with_throttle(self.config.throttle())
            .dispatch_run(run_id, articles)
            .await?;
        let detail = detail(&receipt);
        Ok((receipt, detail))
    }

    async fn reassemble(
        &self,
        receipt: &DispatchReceipt,
    ) -> Result<(ReassemblyReport, Value), PipelineError> {
        let report = self
            .reassembler()
            .reassemble(&receipt.run_id, receipt.expected_chunks)
            .await?;
        let detail = detail(&report);
        Ok((report, detail))
    }

    /// Build threads for the selected window of a run's consolidated
    /// artifact and post them unless this is a dry run.
    pub async fn post_run(
        &self,
        run_id: &RunId,
        options: &RunOptions,
    ) -> Result<(Vec<ThreadOutcome>, Value), PipelineError> {
        let batch = self.reassembler().load_final(run_id).await?;
        let segmenter = ThreadSegmenter::new(self.config.thread.max_len)
            .with_fallback_tag(self.config.thread.fallback_tag.clone());

        let mut threads = Vec::new();
        for article in batch.articles.iter().skip(options.start_index).take(options.limit) {
            let Some(body) = thread_body(article, options.variant) else {
                warn!(url = %article.article.url, "No summary available, skipping thread");
                continue;
            };
            let tags = tag_block(
                &self.config.thread.default_tags,
                &article.hashtags,
                self.config.thread.extra_tags,
            );
            threads.push(ThreadOutcome {
                title: article.article.title.clone(),
                url: article.article.url.clone(),
                segments: segmenter.segment(body, &article.article.title, &article.article.url, &tags),
                ids: Vec::new(),
            });
        }

        if options.dry_run {
            for thread in &threads {
                info!(title = %thread.title, posts = thread.segments.len(), "Dry run, thread not posted");
            }
            let detail = json!({ "dry_run": true, "threads": detail(&threads) });
            return Ok((threads, detail));
        }

        if !threads.is_empty() {
            let client = self.posting.clone().ok_or(PipelineError::NoPostingClient)?;
            let poster = ThreadPoster::new(client)
                .with_pause(self.config.post_pause())
                .with_backoff(self.post_backoff.clone());
            for thread in &mut threads {
                thread.ids = poster.post_thread(&thread.segments).await?.ids;
            }
        }

        let detail = json!({ "dry_run": false, "threads": detail(&threads) });
        Ok((threads, detail))
    }
}
