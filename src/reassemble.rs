//! Fan-in reassembler
//!
//! Polls the result namespace of a run until every chunk artifact is
//! visible, then writes the consolidated artifact. Workers report nothing
//! directly; the store listing is the only completion signal.

use crate::artifact::SummaryBatch;
use crate::keys::{ChunkToken, ResultLayout, RunId};
use crate::storage::{list_all, ObjectStore, StorageError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ReassembleError {
    #[error("no chunks expected for run {0}")]
    NothingExpected(RunId),
    #[error(
        "timed out waiting for run {run_id}: {found}/{expected} chunks after {attempts} listings"
    )]
    Timeout {
        run_id: RunId,
        found: usize,
        expected: usize,
        attempts: u32,
    },
    #[error("malformed artifact {key}: {source}")]
    MalformedArtifact {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Polling cadence for chunk discovery
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            max_wait: Duration::from_secs(600),
        }
    }
}

/// How the consolidated artifact was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePath {
    /// Single chunk copied server-side
    Copied,
    /// Chunk artifacts read and concatenated
    Merged,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReassemblyReport {
    pub run_id: RunId,
    pub final_key: String,
    pub chunk_keys: Vec<String>,
    pub article_count: usize,
    pub titles: Vec<String>,
    pub hashtags: Vec<String>,
    pub complete: bool,
    pub path: MergePath,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveReport {
    pub archived_key: String,
    pub deleted_chunks: usize,
}

/// A chunk artifact found in the listing
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FoundChunk {
    pub token: ChunkToken,
    pub key: String,
}

pub struct Reassembler {
    store: Arc<dyn ObjectStore>,
    layout: ResultLayout,
    poll: PollConfig,
}

impl Reassembler {
    pub fn new(store: Arc<dyn ObjectStore>, layout: ResultLayout) -> Self {
        Self {
            store,
            layout,
            poll: PollConfig::default(),
        }
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn layout(&self) -> &ResultLayout {
        &self.layout
    }

    async fn list_chunks(&self, run_id: &RunId) -> Result<Vec<FoundChunk>, ReassembleError> {
        let prefix = self.layout.chunk_prefix(run_id);
        let objects = list_all(self.store.as_ref(), &prefix).await?;
        let mut found: Vec<FoundChunk> = objects
            .into_iter()
            .filter_map(|meta| {
                let token = self.layout.parse_chunk_key(run_id, &meta.key)?;
                Some(FoundChunk {
                    token,
                    key: meta.key,
                })
            })
            .collect();
        found.sort();
        Ok(found)
    }

    /// Poll until at least `expected` chunk artifacts of `run_id` exist.
    ///
    /// Every listing page is drained before counting. Gives up once another
    /// interval would reach `max_wait`.
    pub async fn await_chunks(
        &self,
        run_id: &RunId,
        expected: usize,
    ) -> Result<Vec<FoundChunk>, ReassembleError> {
        let start = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let found = self.list_chunks(run_id).await?;
            if found.len() >= expected {
                info!(
                    run_id = %run_id,
                    found = found.len(),
                    attempts,
                    "All chunk artifacts present"
                );
                return Ok(found);
            }

            if start.elapsed() + self.poll.interval >= self.poll.max_wait {
                warn!(
                    run_id = %run_id,
                    found = found.len(),
                    expected,
                    attempts,
                    "Gave up waiting for chunk artifacts"
                );
                return Err(ReassembleError::Timeout {
                    run_id: run_id.clone(),
                    found: found.len(),
                    expected,
                    attempts,
                });
            }

            info!(
                run_id = %run_id,
                found = found.len(),
                expected,
                "Waiting for chunk artifacts"
            );
            tokio::time::sleep(self.poll.interval).await;
        }
    }

    async fn read_batch(&self, key: &str) -> Result<SummaryBatch, ReassembleError> {
        let body = self.store.get(key).await?;
        serde_json::from_slice(&body).map_err(|source| ReassembleError::MalformedArtifact {
            key: key.to_string(),
            source,
        })
    }

    /// Wait for the chunks of a run and write its consolidated artifact.
    ///
    /// A single chunk is copied as-is; several are concatenated in token
    /// order. Re-running produces a byte-identical result.
    pub async fn reassemble(
        &self,
        run_id: &RunId,
        expected: usize,
    ) -> Result<ReassemblyReport, ReassembleError> {
        if expected == 0 {
            return Err(ReassembleError::NothingExpected(run_id.clone()));
        }

        let found = self.await_chunks(run_id, expected).await?;
        let final_key = self.layout.final_key(run_id);
        let chunk_keys: Vec<String> = found.iter().map(|c| c.key.clone()).collect();

        let (batch, path) = match found.as_slice() {
            [only] => {
                self.store.copy(&only.key, &final_key).await?;
                debug!(source = %only.key, dest = %final_key, "Copied single chunk");
                (self.read_batch(&final_key).await?, MergePath::Copied)
            }
            _ => {
                let mut batches = Vec::with_capacity(found.len());
                for chunk in &found {
                    batches.push(self.read_batch(&chunk.key).await?);
                }
                let merged = SummaryBatch::merge(run_id.clone(), batches);
                let body = serde_json::to_vec_pretty(&merged)
                    .map_err(StorageError::Serialization)?;
                self.store.put(&final_key, body).await?;
                (merged, MergePath::Merged)
            }
        };

        info!(
            run_id = %run_id,
            final_key = %final_key,
            articles = batch.articles.len(),
            complete = batch.is_complete(),
            "Wrote consolidated artifact"
        );

        Ok(ReassemblyReport {
            run_id: run_id.clone(),
            final_key,
            chunk_keys,
            article_count: batch.articles.len(),
            titles: batch.titles(),
            hashtags: batch.hashtags(),
            complete: batch.is_complete(),
            path,
        })
    }

    pub async fn load_final(&self, run_id: &RunId) -> Result<SummaryBatch, ReassembleError> {
        self.read_batch(&self.layout.final_key(run_id)).await
    }

    /// Key of the most recently written consolidated artifact
    pub async fn latest_final_key(&self) -> Result<Option<String>, ReassembleError> {
        let objects = list_all(self.store.as_ref(), &self.layout.final_prefix()).await?;
        Ok(objects
            .into_iter()
            .filter(|meta| self.layout.parse_final_key(&meta.key).is_some())
            .max_by(|a, b| {
                a.last_modified
                    .cmp(&b.last_modified)
                    .then_with(|| a.key.cmp(&b.key))
            })
            .map(|meta| meta.key))
    }

    /// Move a finished run out of the live namespace.
    ///
    /// The consolidated artifact is copied under `archive/` and the run's
    /// chunk artifacts are deleted.
    pub async fn archive(&self, run_id: &RunId) -> Result<ArchiveReport, ReassembleError> {
        let archived_key = self.layout.archive_key(run_id);
        self.store
            .copy(&self.layout.final_key(run_id), &archived_key)
            .await?;

        let mut deleted_chunks = 0;
        for chunk in self.list_chunks(run_id).await? {
            if self.store.delete(&chunk.key).await? {
                deleted_chunks += 1;
            }
        }

        info!(run_id = %run_id, archived_key = %archived_key, deleted_chunks, "Archived run");
        Ok(ArchiveReport {
            archived_key,
            deleted_chunks,
        })
    }
}
