//! Shared helpers for paperthread integration tests
//!
//! Builders for articles, chunk artifacts and a test configuration, plus a
//! store wrapper that counts writes.

pub mod counting_store;

pub use counting_store::CountingStore;

use paperthread::storage::put_json;
use paperthread::{
    Article, ChunkRecord, ChunkToken, ObjectStore, PipelineConfig, ResultLayout, RunId, Summary,
    SummarizedArticle, SummaryBatch,
};

pub const RESULT_PREFIX: &str = "summaries/";

pub fn article(n: usize) -> Article {
    Article::new(format!("Paper {}", n), format!("https://arxiv.org/abs/2501.{:05}", n))
        .with_authors(vec![format!("Author {}", n)])
        .with_snippet(format!("Abstract of paper {}.", n))
}

pub fn articles(range: std::ops::Range<usize>) -> Vec<Article> {
    range.map(article).collect()
}

pub fn layout() -> ResultLayout {
    ResultLayout::new(RESULT_PREFIX)
}

/// Configuration with every wall-clock pause switched off and a short poll
pub fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.storage.result_prefix = RESULT_PREFIX.to_string();
    config.dispatch.throttle_base_ms = 0;
    config.dispatch.throttle_jitter_min_ms = 0;
    config.dispatch.throttle_jitter_max_ms = 0;
    config.worker.cooldown_min_ms = 0;
    config.worker.cooldown_max_ms = 0;
    config.poll.interval_secs = 1;
    config.poll.max_wait_secs = 30;
    config.thread.post_pause_ms = 0;
    config
}

/// Write a complete chunk artifact summarizing the numbered `items`.
pub async fn write_chunk(
    store: &dyn ObjectStore,
    run_id: &RunId,
    token: ChunkToken,
    items: &[usize],
) -> String {
    let summarized: Vec<SummarizedArticle> = items
        .iter()
        .map(|n| {
            SummarizedArticle::summarized(
                article(*n),
                Summary::new(format!("Summary of paper {}.", n), vec!["#AI".to_string()]),
            )
        })
        .collect();
    let record = ChunkRecord {
        token,
        complete: true,
        assigned: summarized.len(),
        summarized: summarized.len(),
        unavailable: 0,
    };
    let batch = SummaryBatch::for_chunk(run_id.clone(), record, summarized);
    let key = layout().chunk_key(run_id, &token);
    put_json(store, &key, &batch).await.unwrap();
    key
}
