//! Per-chunk worker
//!
//! Summarizes one chunk of articles and deposits a single artifact under the
//! chunk's key. Article failures are isolated to the article; the worker
//! itself only fails when the payload is unusable or the artifact cannot be
//! written.

use crate::article::SummarizedArticle;
use crate::artifact::{ChunkRecord, SummaryBatch};
use crate::fanout::ChunkPayload;
use crate::invoke::{FunctionHandler, InvokeError};
use crate::keys::{ChunkToken, ResultLayout, RunId};
use crate::retry::{with_backoff, BackoffPolicy};
use crate::storage::{put_json, ObjectStore, StorageError};
use crate::summarize::Summarizer;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("chunk {token} of run {run_id} has no articles")]
    EmptyChunk { run_id: RunId, token: ChunkToken },
    #[error("failed to write chunk artifact {key}: {source}")]
    Storage {
        key: String,
        #[source]
        source: StorageError,
    },
}

/// Wall-clock limits for one worker invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerBudget {
    /// Total time the invocation may run
    pub total: Duration,
    /// Time kept back for writing the artifact
    pub reserve: Duration,
    /// Pause between articles, drawn uniformly from the range
    pub cooldown: Option<(Duration, Duration)>,
}

impl Default for WorkerBudget {
    fn default() -> Self {
        Self {
            total: Duration::from_secs(900),
            reserve: Duration::from_secs(45),
            cooldown: Some((Duration::from_secs(2), Duration::from_secs(4))),
        }
    }
}

impl WorkerBudget {
    pub fn without_cooldown(mut self) -> Self {
        self.cooldown = None;
        self
    }

    fn cooldown_delay(&self) -> Option<Duration> {
        let (min, max) = self.cooldown?;
        if max <= min {
            return Some(min);
        }
        let ms = rand::thread_rng().gen_range(min.as_millis() as u64..=max.as_millis() as u64);
        Some(Duration::from_millis(ms))
    }
}

/// Outcome of one chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkReport {
    pub key: String,
    pub run_id: RunId,
    pub token: ChunkToken,
    pub assigned: usize,
    pub summarized: usize,
    pub unavailable: usize,
    pub complete: bool,
}

pub struct ChunkWorker {
    summarizer: Arc<dyn Summarizer>,
    store: Arc<dyn ObjectStore>,
    layout: ResultLayout,
    budget: WorkerBudget,
    backoff: BackoffPolicy,
}

impl ChunkWorker {
    pub fn new(
        summarizer: Arc<dyn Summarizer>,
        store: Arc<dyn ObjectStore>,
        layout: ResultLayout,
    ) -> Self {
        Self {
            summarizer,
            store,
            layout,
            budget: WorkerBudget::default(),
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_budget(mut self, budget: WorkerBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Summarize every article of the chunk in order and write the artifact.
    ///
    /// Stops early, marking the chunk incomplete, once the time left in the
    /// budget falls to the reserve. The prefix processed so far is still
    /// written.
    pub async fn process(&self, payload: ChunkPayload) -> Result<ChunkReport, WorkerError> {
        let ChunkPayload {
            run_id,
            token,
            articles,
        } = payload;
        if articles.is_empty() {
            return Err(WorkerError::EmptyChunk { run_id, token });
        }

        let started = Instant::now();
        let work_deadline = started + self.budget.total.saturating_sub(self.budget.reserve);
        let assigned = articles.len();
        let mut results = Vec::with_capacity(assigned);
        let mut complete = true;

        info!(run_id = %run_id, chunk = %token, articles = assigned, "Processing chunk");

        for (i, article) in articles.into_iter().enumerate() {
            let now = Instant::now();
            if now >= work_deadline {
                warn!(
                    run_id = %run_id,
                    chunk = %token,
                    processed = i,
                    assigned,
                    "Time budget exhausted, writing partial chunk"
                );
                complete = false;
                break;
            }

            let retry_deadline = work_deadline.min(self.backoff.deadline_from(now));
            let attempt = with_backoff(&self.backoff, retry_deadline, || {
                self.summarizer.summarize(&article)
            });

            let outcome = tokio::time::timeout_at(work_deadline, attempt).await;
            let record = match outcome {
                Ok(Ok(summary)) => SummarizedArticle::summarized(article, summary),
                Ok(Err(e)) => {
                    warn!(url = %article.url, error = %e, "Summary failed, marking unavailable");
                    SummarizedArticle::unavailable(article)
                }
                Err(_) => {
                    warn!(url = %article.url, "Summary timed out, marking unavailable");
                    SummarizedArticle::unavailable(article)
                }
            };
            results.push(record);

            if i + 1 < assigned {
                if let Some(delay) = self.budget.cooldown_delay() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        let summarized = results.iter().filter(|r| r.is_summarized()).count();
        let unavailable = results.len() - summarized;
        let record = ChunkRecord {
            token,
            complete,
            assigned,
            summarized,
            unavailable,
        };
        let batch = SummaryBatch::for_chunk(run_id.clone(), record, results);

        let key = self.layout.chunk_key(&run_id, &token);
        put_json(self.store.as_ref(), &key, &batch)
            .await
            .map_err(|source| WorkerError::Storage {
                key: key.clone(),
                source,
            })?;

        info!(
            key = %key,
            summarized,
            unavailable,
            complete,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Chunk artifact written"
        );

        Ok(ChunkReport {
            key,
            run_id,
            token,
            assigned,
            summarized,
            unavailable,
            complete,
        })
    }
}

/// Exposes a `ChunkWorker` as an invocable function taking a `ChunkPayload`.
pub struct WorkerHandler {
    worker: Arc<ChunkWorker>,
}

impl WorkerHandler {
    pub fn new(worker: Arc<ChunkWorker>) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl FunctionHandler for WorkerHandler {
    async fn handle(&self, payload: Value) -> Result<Value, InvokeError> {
        let payload: ChunkPayload = serde_json::from_value(payload)
            .map_err(|e| InvokeError::InvalidPayload(e.to_string()))?;
        let report = self
            .worker
            .process(payload)
            .await
            .map_err(|e| InvokeError::Failed(e.to_string()))?;
        serde_json::to_value(report).map_err(|e| InvokeError::Failed(e.to_string()))
    }
}
