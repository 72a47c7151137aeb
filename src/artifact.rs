//! Summary batches: the artifact shape shared by chunk and consolidated results

use crate::article::SummarizedArticle;
use crate::keys::{ChunkToken, RunId};
use serde::{Deserialize, Serialize};

/// Bookkeeping for one chunk inside a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub token: ChunkToken,
    /// False when the worker ran out of budget before finishing the chunk
    pub complete: bool,
    /// Articles the chunk was dispatched with
    pub assigned: usize,
    pub summarized: usize,
    pub unavailable: usize,
}

/// Summarized articles of one run, or of one chunk of it.
///
/// A worker writes a batch with a single record. The reassembler merges
/// chunk batches in token order, so `articles` preserves the original
/// scrape order across the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryBatch {
    pub run_id: RunId,
    pub chunks: Vec<ChunkRecord>,
    pub articles: Vec<SummarizedArticle>,
}

impl SummaryBatch {
    pub fn for_chunk(run_id: RunId, record: ChunkRecord, articles: Vec<SummarizedArticle>) -> Self {
        Self {
            run_id,
            chunks: vec![record],
            articles,
        }
    }

    /// Concatenate batches, ordered by the first chunk token of each.
    pub fn merge(run_id: RunId, mut batches: Vec<SummaryBatch>) -> Self {
        batches.sort_by(|a, b| a.first_token().cmp(&b.first_token()));

        let mut merged = Self {
            run_id,
            chunks: Vec::new(),
            articles: Vec::new(),
        };
        for batch in batches {
            merged.chunks.extend(batch.chunks);
            merged.articles.extend(batch.articles);
        }
        merged
    }

    fn first_token(&self) -> Option<ChunkToken> {
        self.chunks.iter().map(|c| c.token).min()
    }

    /// True when no chunk was truncated
    pub fn is_complete(&self) -> bool {
        self.chunks.iter().all(|c| c.complete)
    }

    pub fn titles(&self) -> Vec<String> {
        self.articles.iter().map(|a| a.article.title.clone()).collect()
    }

    /// Every hashtag in the batch, first occurrence order, without repeats
    pub fn hashtags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for tag in self.articles.iter().flat_map(|a| a.hashtags.iter()) {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
        tags
    }
}
