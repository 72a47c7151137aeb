//! Fan-out dispatcher
//!
//! Splits a batch of new articles into fixed-size chunks and fires one
//! asynchronous worker invocation per chunk. The dispatcher never waits for
//! workers; it hands the run id and expected chunk count to the reassembler.

use crate::article::Article;
use crate::invoke::{InvokeError, Invoker};
use crate::keys::{ChunkToken, RunId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Default number of articles per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 2;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("chunk size must be at least 1")]
    InvalidChunkSize,
    #[error("failed to encode payload for {token}: {source}")]
    Encode {
        token: ChunkToken,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to dispatch {token}: {source}")]
    Invoke {
        token: ChunkToken,
        #[source]
        source: InvokeError,
    },
}

/// One chunk of a run
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub token: ChunkToken,
    pub articles: Vec<Article>,
}

/// Payload handed to a worker invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub run_id: RunId,
    pub token: ChunkToken,
    pub articles: Vec<Article>,
}

/// Polling contract returned to the caller
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReceipt {
    pub run_id: RunId,
    pub expected_chunks: usize,
    pub tokens: Vec<ChunkToken>,
}

impl DispatchReceipt {
    /// True when there was nothing to dispatch
    pub fn is_empty(&self) -> bool {
        self.expected_chunks == 0
    }
}

/// Randomized pause between successive dispatches.
///
/// Pure load shedding: it keeps the invocation target from being hit in a
/// burst and plays no part in correctness.
#[derive(Debug, Clone, PartialEq)]
pub struct Throttle {
    pub base: Duration,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
}

impl Default for Throttle {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(3),
            jitter_min: Duration::from_millis(500),
            jitter_max: Duration::from_millis(2500),
        }
    }
}

impl Throttle {
    pub fn none() -> Self {
        Self {
            base: Duration::ZERO,
            jitter_min: Duration::ZERO,
            jitter_max: Duration::ZERO,
        }
    }

    pub fn delay(&self) -> Duration {
        let jitter = if self.jitter_max > self.jitter_min {
            let min = self.jitter_min.as_millis() as u64;
            let max = self.jitter_max.as_millis() as u64;
            Duration::from_millis(rand::thread_rng().gen_range(min..=max))
        } else {
            self.jitter_min
        };
        self.base + jitter
    }

    async fn pause(&self) {
        let delay = self.delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Split `articles` into `ceil(N / chunk_size)` chunks with one-based
/// indices and fresh tokens. Order within and across chunks is preserved.
pub fn plan_chunks(articles: Vec<Article>, chunk_size: usize) -> Result<Vec<Chunk>, DispatchError> {
    if chunk_size == 0 {
        return Err(DispatchError::InvalidChunkSize);
    }

    let mut chunks = Vec::with_capacity(articles.len().div_ceil(chunk_size));
    let mut articles = articles.into_iter().peekable();
    let mut index: u32 = 0;
    while articles.peek().is_some() {
        index += 1;
        chunks.push(Chunk {
            token: ChunkToken::new(index),
            articles: articles.by_ref().take(chunk_size).collect(),
        });
    }
    Ok(chunks)
}

/// Dispatches chunks to the worker function.
pub struct Dispatcher {
    invoker: Arc<dyn Invoker>,
    function: String,
    chunk_size: usize,
    throttle: Throttle,
}

impl Dispatcher {
    pub fn new(invoker: Arc<dyn Invoker>, function: impl Into<String>) -> Self {
        Self {
            invoker,
            function: function.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            throttle: Throttle::default(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = throttle;
        self
    }

    /// Dispatch under a freshly generated run id.
    pub async fn dispatch(&self, articles: Vec<Article>) -> Result<DispatchReceipt, DispatchError> {
        self.dispatch_run(RunId::generate(), articles).await
    }

    /// Dispatch every chunk in index order without waiting for completion.
    pub async fn dispatch_run(
        &self,
        run_id: RunId,
        articles: Vec<Article>,
    ) -> Result<DispatchReceipt, DispatchError> {
        let chunks = plan_chunks(articles, self.chunk_size)?;
        let expected_chunks = chunks.len();
        let mut tokens = Vec::with_capacity(expected_chunks);

        for (i, chunk) in chunks.into_iter().enumerate() {
            if i > 0 {
                self.throttle.pause().await;
            }

            let token = chunk.token;
            let count = chunk.articles.len();
            let payload = serde_json::to_value(ChunkPayload {
                run_id: run_id.clone(),
                token,
                articles: chunk.articles,
            })
            .map_err(|source| DispatchError::Encode { token, source })?;

            self.invoker
                .invoke_async(&self.function, payload)
                .await
                .map_err(|source| DispatchError::Invoke { token, source })?;
            debug!(run_id = %run_id, chunk = %token, articles = count, "Chunk dispatched");
            tokens.push(token);
        }

        info!(run_id = %run_id, chunks = expected_chunks, "Triggered worker invocations");
        Ok(DispatchReceipt {
            run_id,
            expected_chunks,
            tokens,
        })
    }
}
